//! Asynchronous delivery of session records to the collector.
//!
//! Every finished session is submitted for immediate upload, and one backlog
//! pass per process retries records left behind by earlier runs. All
//! deliveries serialize through a single async gate, so the collector never
//! sees two concurrent requests from one installation, and the politeness
//! pause after a successful upload is spent while still holding the gate.
//!
//! A record is renamed to its delivered identity only after the collector
//! confirms receipt; anything else leaves it pending for a later backlog
//! pass.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::store::SessionStore;
use crate::store::StoreError;

pub struct Uploader {
    client: Client,
    config: UploadConfig,
    store: SessionStore,
    install_id: Uuid,
    /// Serializes all deliveries from this process.
    gate: Mutex<()>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    backlog_started: AtomicBool,
}

impl Uploader {
    pub fn new(
        config: UploadConfig,
        store: SessionStore,
        install_id: Uuid,
    ) -> Result<Arc<Self>, UploadError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Arc::new(Self {
            client,
            config,
            store,
            install_id,
            gate: Mutex::new(()),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            backlog_started: AtomicBool::new(false),
        }))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Uploads one record, holding the delivery gate for the whole exchange
    /// including the politeness pause.
    pub async fn deliver(&self, path: &Path) -> Result<(), UploadError> {
        let _gate = self.gate.lock().await;
        self.deliver_locked(path).await
    }

    async fn deliver_locked(&self, path: &Path) -> Result<(), UploadError> {
        if !path.exists() {
            // Renamed by an earlier delivery in this process.
            debug!(record = %path.display(), "record already delivered, skipping");
            return Ok(());
        }
        let payload = self.build_payload(path).await?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.post_once(&payload).await {
                Ok(()) => {
                    let delivered = self.store.mark_delivered(path)?;
                    info!(record = %delivered.display(), attempt, "session record uploaded");
                    if self.pause(self.config.upload_delay()).await.is_err() {
                        debug!("politeness pause cut short by shutdown");
                    }
                    return Ok(());
                }
                Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
                Err(err) if attempt >= self.config.max_attempts.max(1) => return Err(err),
                Err(err) => {
                    warn!(
                        record = %path.display(),
                        attempt,
                        "upload attempt failed, retrying: {err}"
                    );
                    self.pause(self.config.retry_delay()).await?;
                }
            }
        }
    }

    /// The wire payload is the stored record plus the installation id; the
    /// id never lands in the on-disk record.
    async fn build_payload(&self, path: &Path) -> Result<serde_json::Value, UploadError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| UploadError::ReadRecord {
                path: path.to_path_buf(),
                source,
            })?;
        let mut payload: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| UploadError::ParseRecord {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(object) = payload.as_object_mut() {
            object.insert(
                "userId".to_string(),
                serde_json::Value::String(self.install_id.to_string()),
            );
        }
        Ok(payload)
    }

    async fn post_once(&self, payload: &serde_json::Value) -> Result<(), UploadError> {
        let request = self
            .client
            .post(self.config.collector_url.clone())
            .json(payload)
            .send();
        let response = tokio::select! {
            () = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            result = request => result?,
        };
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(UploadError::Status(status.as_u16()))
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), UploadError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(UploadError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn run_backlog(self: Arc<Self>) {
        if self.pause(self.config.backlog_delay()).await.is_err() {
            return;
        }
        match self.backlog_pass().await {
            Ok(0) => debug!("no pending session records"),
            Ok(count) => info!(count, "backlog upload pass finished"),
            Err(UploadError::Cancelled) => debug!("backlog upload cancelled"),
            Err(err) => warn!("backlog upload pass failed: {err}"),
        }
    }

    /// Uploads pending records oldest first, up to the per-pass limit. A
    /// record that keeps failing is logged and skipped; it stays pending
    /// for the next process.
    pub async fn backlog_pass(&self) -> Result<usize, UploadError> {
        let pending = self.store.pending()?;
        let total = pending.len();
        if total > self.config.backlog_limit {
            debug!(
                total,
                limit = self.config.backlog_limit,
                "backlog exceeds per-pass limit"
            );
        }

        let mut delivered = 0usize;
        for path in pending.into_iter().take(self.config.backlog_limit) {
            match self.deliver(&path).await {
                Ok(()) => delivered += 1,
                Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
                Err(err) => {
                    warn!(record = %path.display(), "backlog upload failed, keeping record: {err}");
                }
            }
        }
        Ok(delivered)
    }

    /// Stops in-flight work and waits for every spawned task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Cheap clonable handle for submitting work from non-async code.
#[derive(Clone)]
pub struct UploadHandle {
    uploader: Arc<Uploader>,
    runtime: tokio::runtime::Handle,
}

impl UploadHandle {
    pub fn new(uploader: Arc<Uploader>, runtime: tokio::runtime::Handle) -> Self {
        Self { uploader, runtime }
    }

    /// Queues one record for upload and returns immediately.
    pub fn submit(&self, path: PathBuf) {
        let uploader = Arc::clone(&self.uploader);
        self.uploader.tracker.spawn_on(
            async move {
                match uploader.deliver(&path).await {
                    Ok(()) => {}
                    Err(UploadError::Cancelled) => {
                        debug!(record = %path.display(), "upload cancelled before delivery");
                    }
                    Err(err) => {
                        warn!(
                            record = %path.display(),
                            "upload failed, record kept for backlog: {err}"
                        );
                    }
                }
            },
            &self.runtime,
        );
    }

    /// Schedules the once-per-process backlog pass. Later calls are no-ops.
    pub fn start_backlog(&self) {
        if self.uploader.backlog_started.swap(true, Ordering::SeqCst) {
            debug!("backlog upload already scheduled");
            return;
        }
        let uploader = Arc::clone(&self.uploader);
        self.uploader
            .tracker
            .spawn_on(uploader.run_backlog(), &self.runtime);
    }

    pub async fn shutdown(&self) {
        self.uploader.shutdown().await;
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read session record {path}: {source}")]
    ReadRecord {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse session record {path}: {source}")]
    ParseRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("collector returned status {0}")]
    Status(u16),
    #[error("failed to reach collector: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upload cancelled by shutdown")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use crewlog_protocol::SessionRecord;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn uploader_in(dir: &TempDir) -> Arc<Uploader> {
        let store = SessionStore::new(dir.path().to_path_buf());
        Uploader::new(UploadConfig::default(), store, Uuid::nil()).expect("build uploader")
    }

    #[tokio::test]
    async fn payload_carries_record_plus_installation_id() {
        let dir = TempDir::new().expect("temp dir");
        let uploader = uploader_in(&dir);
        let record = SessionRecord::new(Uuid::new_v4(), Utc::now());
        let path = uploader.store().write(&record).expect("write record");

        let payload = uploader.build_payload(&path).await.expect("payload");
        assert_eq!(
            payload["userId"],
            serde_json::Value::String(Uuid::nil().to_string())
        );
        assert_eq!(
            payload["sessionId"],
            serde_json::Value::String(record.session_id.to_string())
        );
    }

    #[tokio::test]
    async fn missing_record_is_a_read_error() {
        let dir = TempDir::new().expect("temp dir");
        let uploader = uploader_in(&dir);

        let err = uploader
            .build_payload(&dir.path().join("session_20250301_100000_deadbeef.json"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, UploadError::ReadRecord { .. }));
    }

    #[tokio::test]
    async fn delivered_record_is_skipped_without_network() {
        let dir = TempDir::new().expect("temp dir");
        let uploader = uploader_in(&dir);
        let record = SessionRecord::new(Uuid::new_v4(), Utc::now());
        let path = uploader.store().write(&record).expect("write record");
        uploader.store().mark_delivered(&path).expect("mark delivered");

        // The original pending path no longer exists; delivery must treat
        // that as success rather than hammering the collector.
        uploader.deliver(&path).await.expect("skip delivered");
    }
}
