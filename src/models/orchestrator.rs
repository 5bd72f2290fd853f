use std::{
    fmt, fs,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::Serialize;

use super::{
    cancel::{CancelFlag, Cancelled},
    fetch,
    layout::{Model, ModelPaths, StoreLayout},
    manifest::{MlcChatConfig, NdarrayCache},
    progress::DownloadProgress,
};

/// Pipeline position of a model download. Exactly one is current at any
/// time; progression is forward only, except that cancellation resets to
/// `NotStarted` and failures land in `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadPhase {
    NotStarted,
    Error,
    CreatingLocalDirectory,
    DownloadingChatConfig,
    DownloadingArrayCache,
    DownloadingTokenizerFiles(DownloadProgress),
    DownloadingNdArrayCacheRecords(DownloadProgress),
    DeletingTemporaryFiles,
    Finished,
}

impl DownloadPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadPhase::NotStarted | DownloadPhase::Error | DownloadPhase::Finished
        )
    }
}

impl fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadPhase::NotStarted => write!(f, "Not started"),
            DownloadPhase::Error => write!(f, "Error"),
            DownloadPhase::CreatingLocalDirectory => write!(f, "Creating local directory"),
            DownloadPhase::DownloadingChatConfig => write!(f, "Downloading chat config"),
            DownloadPhase::DownloadingArrayCache => write!(f, "Downloading array cache"),
            DownloadPhase::DownloadingTokenizerFiles(progress) => {
                write!(f, "Downloading tokenizer files ({})", progress.percent_label())
            }
            DownloadPhase::DownloadingNdArrayCacheRecords(progress) => {
                write!(
                    f,
                    "Downloading array cache records ({})",
                    progress.percent_label()
                )
            }
            DownloadPhase::DeletingTemporaryFiles => write!(f, "Deleting temporary files"),
            DownloadPhase::Finished => write!(f, "Finished"),
        }
    }
}

/// Drives the download pipeline for one model. One instance per model;
/// a single run is in flight at a time, executed on a background worker
/// thread. Phase updates are published to subscribers in step order.
pub struct DownloadOrchestrator {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    model: Model,
    paths: ModelPaths,
    client: Client,
    phase: Mutex<DownloadPhase>,
    subscribers: Mutex<Vec<Sender<DownloadPhase>>>,
    cancel: CancelFlag,
    running: AtomicBool,
}

impl DownloadOrchestrator {
    /// The initial phase comes from the finished marker: a store that
    /// completed on an earlier launch starts out `Finished` and a later
    /// `start()` performs no network work.
    pub fn new(model: Model, layout: &StoreLayout) -> Result<Self> {
        let paths = ModelPaths::new(layout, &model);
        let client = Client::builder().build().context("create http client")?;
        let phase = if paths.finished_marker().exists() {
            DownloadPhase::Finished
        } else {
            DownloadPhase::NotStarted
        };
        Ok(Self {
            inner: Arc::new(Inner {
                model,
                paths,
                client,
                phase: Mutex::new(phase),
                subscribers: Mutex::new(Vec::new()),
                cancel: CancelFlag::new(),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn phase(&self) -> DownloadPhase {
        self.inner.phase.lock().clone()
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    /// Directory the inference engine loads from once the phase has
    /// reached `Finished`.
    #[must_use]
    pub fn local_dir(&self) -> &std::path::Path {
        self.inner.paths.local_dir()
    }

    /// Registers a phase subscriber. Updates arrive in the order the
    /// pipeline produced them; disconnected receivers are dropped on the
    /// next publish.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<DownloadPhase> {
        let (sender, receiver) = unbounded();
        self.inner.subscribers.lock().push(sender);
        receiver
    }

    /// Begins the pipeline on a worker thread. A no-op while a run is
    /// already in flight.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.reset();
        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || {
            inner.execute();
            inner.running.store(false, Ordering::SeqCst);
        });
        *self.worker.lock() = Some(handle);
    }

    /// Requests cooperative cancellation. The run observes the flag at
    /// the next checkpoint and unwinds to `NotStarted`, leaving every
    /// already-placed file in the store.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Removes the model's store and scratch directories. Best-effort:
    /// failures are logged, disk state stays consistent either way.
    pub fn delete(&self) {
        let local_dir = self.inner.paths.local_dir();
        if local_dir.exists() {
            tracing::info!(model = %self.inner.model.model_id, "removing {}", local_dir.display());
            if let Err(error) = fs::remove_dir_all(local_dir) {
                tracing::warn!(model = %self.inner.model.model_id, "failed to remove model directory: {error:?}");
            }
        }
        let scratch_dir = self.inner.paths.scratch_dir();
        if scratch_dir.exists() {
            tracing::info!(model = %self.inner.model.model_id, "removing {}", scratch_dir.display());
            if let Err(error) = fs::remove_dir_all(scratch_dir) {
                tracing::warn!(model = %self.inner.model.model_id, "failed to remove scratch directory: {error:?}");
            }
        }
        self.inner.refresh_phase();
    }
}

impl Inner {
    fn execute(&self) {
        match self.run() {
            Ok(()) => {}
            Err(error) if error.is::<Cancelled>() => {
                tracing::info!(model = %self.model.model_id, "download cancelled");
                self.set_phase(DownloadPhase::NotStarted);
            }
            Err(error) => {
                tracing::error!(model = %self.model.model_id, "download failed: {error:?}");
                self.set_phase(DownloadPhase::Error);
            }
        }
    }

    fn run(&self) -> Result<()> {
        tracing::info!(model = %self.model.model_id, "starting model download");
        if self.is_finished() {
            self.set_phase(DownloadPhase::Finished);
            return Ok(());
        }
        self.create_model_dir()?;
        let chat_config = self.ensure_chat_config()?;
        let ndarray_cache = self.ensure_ndarray_cache()?;
        self.download_tokenizer_files(&chat_config)?;
        self.download_cache_records(&ndarray_cache)?;
        self.delete_scratch()?;
        self.mark_finished()?;
        Ok(())
    }

    fn create_model_dir(&self) -> Result<()> {
        self.cancel.check()?;
        self.set_phase(DownloadPhase::CreatingLocalDirectory);
        let dir = self.paths.local_dir();
        if !dir.exists() {
            fs::create_dir_all(dir).context("create model directory")?;
        }
        Ok(())
    }

    fn ensure_chat_config(&self) -> Result<MlcChatConfig> {
        self.cancel.check()?;
        self.set_phase(DownloadPhase::DownloadingChatConfig);
        let local = self.paths.chat_config();
        if local.exists() {
            let bytes = fs::read(&local).context("read cached mlc-chat-config.json")?;
            return MlcChatConfig::decode(&bytes);
        }
        let bytes = self.fetch_bytes(&self.paths.chat_config_url())?;
        self.cancel.check()?;
        // decode first so a malformed document never lands in the store
        let config = MlcChatConfig::decode(&bytes)?;
        fs::write(&local, &bytes).context("write mlc-chat-config.json")?;
        Ok(config)
    }

    fn ensure_ndarray_cache(&self) -> Result<NdarrayCache> {
        self.cancel.check()?;
        self.set_phase(DownloadPhase::DownloadingArrayCache);
        let local = self.paths.ndarray_cache();
        if local.exists() {
            let bytes = fs::read(&local).context("read cached ndarray-cache.json")?;
            return NdarrayCache::decode(&bytes);
        }
        let bytes = self.fetch_bytes(&self.paths.ndarray_cache_url())?;
        self.cancel.check()?;
        let cache = NdarrayCache::decode(&bytes)?;
        fs::write(&local, &bytes).context("write ndarray-cache.json")?;
        Ok(cache)
    }

    /// Tokenizer files are small enough to fetch whole and write straight
    /// into the store, no scratch staging.
    fn download_tokenizer_files(&self, config: &MlcChatConfig) -> Result<()> {
        self.cancel.check()?;
        let total = config.tokenizer_files.len();
        self.set_phase(DownloadPhase::DownloadingTokenizerFiles(
            DownloadProgress::new(0, total as u64),
        ));
        for (index, name) in config.tokenizer_files.iter().enumerate() {
            self.set_phase(DownloadPhase::DownloadingTokenizerFiles(
                DownloadProgress::new(index as u64, total as u64),
            ));
            let local = self.paths.tokenizer_file(name);
            if local.exists() {
                continue;
            }
            let bytes = self.fetch_bytes(&self.paths.file_url(name))?;
            self.cancel.check()?;
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent).context("create tokenizer file directory")?;
            }
            fs::write(&local, &bytes).with_context(|| format!("write tokenizer file {name}"))?;
        }
        Ok(())
    }

    /// Records stream to scratch and are renamed into the store once
    /// complete, so the store never holds a partial shard.
    fn download_cache_records(&self, cache: &NdarrayCache) -> Result<()> {
        self.cancel.check()?;
        let total = cache.records.len();
        self.set_phase(DownloadPhase::DownloadingNdArrayCacheRecords(
            DownloadProgress::across_records(0, total, 0.0),
        ));
        for (index, record) in cache.records.iter().enumerate() {
            self.set_phase(DownloadPhase::DownloadingNdArrayCacheRecords(
                DownloadProgress::across_records(index, total, 0.0),
            ));
            let local = self.paths.record(&record.data_path);
            if local.exists() {
                continue;
            }
            let scratch = self.paths.scratch_record(&record.data_path);
            let fetched = fetch::fetch_to_temp(
                &self.client,
                &self.paths.file_url(&record.data_path),
                &scratch,
                &self.cancel,
                |progress| {
                    self.set_phase(DownloadPhase::DownloadingNdArrayCacheRecords(
                        DownloadProgress::across_records(index, total, progress.fraction()),
                    ));
                },
            )?;
            self.cancel.check()?;
            if let Some(parent) = local.parent() {
                fs::create_dir_all(parent).context("create record directory")?;
            }
            fs::rename(&fetched.path, &local)
                .with_context(|| format!("move record {} into store", record.data_path))?;
        }
        Ok(())
    }

    fn delete_scratch(&self) -> Result<()> {
        self.set_phase(DownloadPhase::DeletingTemporaryFiles);
        let scratch = self.paths.scratch_dir();
        if scratch.exists() {
            fs::remove_dir_all(scratch).context("delete scratch directory")?;
        }
        Ok(())
    }

    fn mark_finished(&self) -> Result<()> {
        fs::write(self.paths.finished_marker(), b"").context("create finished marker")?;
        self.set_phase(DownloadPhase::Finished);
        Ok(())
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request {url}"))?
            .error_for_status()
            .with_context(|| format!("download {url}"))?;
        let bytes = response.bytes().context("read response body")?;
        Ok(bytes.to_vec())
    }

    fn is_finished(&self) -> bool {
        self.paths.finished_marker().exists()
    }

    fn refresh_phase(&self) {
        let phase = if self.is_finished() {
            DownloadPhase::Finished
        } else {
            DownloadPhase::NotStarted
        };
        self.set_phase(phase);
    }

    fn set_phase(&self, phase: DownloadPhase) {
        *self.phase.lock() = phase.clone();
        self.subscribers
            .lock()
            .retain(|sender| sender.send(phase.clone()).is_ok());
    }
}
