use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use super::{cancel::CancelFlag, progress::DownloadProgress};

const CHUNK_SIZE: usize = 32 * 1024;

/// Stand-in remaining byte count while the server reports no content
/// length. The running total is corrected to the exact byte count in the
/// final progress report.
const ESTIMATED_REMAINING_BYTES: u64 = 1_000_000;

#[derive(Debug)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub content_length: Option<u64>,
}

/// Streams `url` to `temp_path` in bounded chunks, reporting progress
/// after every chunk flush and observing cancellation between chunks.
///
/// The caller owns the move into permanent storage; a half-written file
/// is only ever the temp file, never the destination. A stale temp file
/// from an interrupted run is replaced, and intermediate directories are
/// created as needed. The final progress report is always exact:
/// `(bytes, bytes)`.
pub fn fetch_to_temp<F>(
    client: &Client,
    url: &str,
    temp_path: &Path,
    cancel: &CancelFlag,
    mut on_progress: F,
) -> Result<FetchedFile>
where
    F: FnMut(DownloadProgress),
{
    cancel.check()?;

    if temp_path.exists() {
        fs::remove_file(temp_path).context("remove stale temp file")?;
    }
    if let Some(parent) = temp_path.parent() {
        fs::create_dir_all(parent).context("create temp directory")?;
    }

    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("request {url}"))?
        .error_for_status()
        .with_context(|| format!("download {url}"))?;
    let content_length = response.content_length().filter(|length| *length > 0);

    let mut file = File::create(temp_path).context("create temp file")?;
    let mut downloaded = 0u64;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        cancel.check()?;
        let read = response.read(&mut buffer).context("read download chunk")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("write download chunk")?;
        downloaded += read as u64;
        on_progress(DownloadProgress::new(
            downloaded,
            running_total(downloaded, content_length),
        ));
    }

    on_progress(DownloadProgress::new(downloaded, downloaded));

    Ok(FetchedFile {
        path: temp_path.to_path_buf(),
        bytes: downloaded,
        content_length,
    })
}

/// Total to report mid-stream. Falls back to a running estimate when the
/// server gave no content length, or when the byte count has already
/// passed the advertised length.
fn running_total(downloaded: u64, content_length: Option<u64>) -> u64 {
    match content_length {
        Some(expected) if downloaded <= expected => expected,
        _ => downloaded + ESTIMATED_REMAINING_BYTES,
    }
}
