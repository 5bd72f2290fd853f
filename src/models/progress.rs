use serde::Serialize;

/// Fixed per-record scale for folding byte progress into the overall
/// record-list fraction. Progress across records stays monotonic because
/// each record contributes exactly this many units regardless of size.
pub const RECORD_SCALE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub downloaded: u64,
    pub total: u64,
}

impl DownloadProgress {
    #[must_use]
    pub fn new(downloaded: u64, total: u64) -> Self {
        Self { downloaded, total }
    }

    /// Fraction in `[0, 1]`. A zero total reads as 0% rather than a fault.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.downloaded as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.fraction() * 100.0)
    }

    /// Overall progress for record `index` of `total_records`, with the
    /// in-flight record `record_fraction` complete. The record fraction is
    /// clamped before scaling so a provisional total that is later revised
    /// upward can never push the overall value past 100%.
    #[must_use]
    pub fn across_records(index: usize, total_records: usize, record_fraction: f64) -> Self {
        let record = record_fraction.clamp(0.0, 1.0);
        let downloaded = index as u64 * RECORD_SCALE + (RECORD_SCALE as f64 * record) as u64;
        Self {
            downloaded,
            total: total_records as u64 * RECORD_SCALE,
        }
    }
}
