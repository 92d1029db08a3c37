use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::downloader::{self, PARTIAL_SUFFIX};
use super::extract::{self, STAGING_PREFIX};
use super::metadata::{url_key, CompressionMode, SnapshotMetadata, SqliteMode};
use crate::config::NetworkConfig;
use crate::errors::AcquisitionError;
use crate::state::data::EventRef;
use crate::state::library::{CatalogStore, SnapshotKind};

/// Progress of the most recent `download` call.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    NotDownloaded,
    FetchingMetadata,
    /// Fraction of the archive received, 0..=1.
    Downloading(f64),
    /// Fraction of uncompressed bytes written, 0..=1.
    Extracting(f64),
    Ready(PathBuf),
    Failed(String),
}

/// Supplies the bearer token for the metadata request.
///
/// `None` is sent as an empty token so offline or signed-out use still gets a
/// clean HTTP error rather than a local failure.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Fetches, downloads and installs snapshot files for the [`CatalogStore`].
pub struct AcquisitionPipeline {
    client: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
    sqlite_mode: SqliteMode,
    compression: CompressionMode,
    store: Arc<CatalogStore>,
    tokens: Arc<dyn TokenProvider>,
    /// Metadata per event number.
    metadata: Mutex<HashMap<i64, SnapshotMetadata>>,
    state: Arc<watch::Sender<DownloadState>>,
}

impl AcquisitionPipeline {
    pub fn new(
        config: &NetworkConfig,
        store: Arc<CatalogStore>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, AcquisitionError> {
        let request_timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        let (state, _) = watch::channel(DownloadState::NotDownloaded);

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            request_timeout,
            sqlite_mode: config.sqlite_mode,
            compression: config.compression,
            store,
            tokens,
            metadata: Mutex::new(HashMap::new()),
            state: Arc::new(state),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    fn publish(&self, state: DownloadState) {
        debug!(?state, "download state");
        self.state.send_replace(state);
    }

    /// Drop all cached metadata so the next download fetches it again.
    pub async fn forget_metadata(&self) {
        self.metadata.lock().await.clear();
    }

    /// Make the snapshot file of `kind` for `event` available locally.
    ///
    /// An existing file is returned without touching the network. On success the
    /// file is assigned to the store. Any failure yields `None` and a `Failed` state;
    /// files already on disk are left alone.
    pub async fn download(
        &self,
        event: EventRef,
        kind: SnapshotKind,
        cancel: &CancellationToken,
    ) -> Option<PathBuf> {
        let destination = self.store.snapshot_path(event.number, kind);
        if destination.exists() {
            debug!(path = %destination.display(), "snapshot already downloaded");
            self.store.set_file(kind, destination.clone());
            self.publish(DownloadState::Ready(destination.clone()));
            return Some(destination);
        }

        match self.fetch_and_install(event, kind, &destination, cancel).await {
            Ok(()) => {
                info!(event = event.number, kind = kind.label(), "snapshot ready");
                self.store.set_file(kind, destination.clone());
                self.publish(DownloadState::Ready(destination.clone()));
                Some(destination)
            }
            Err(e) => {
                error!(event = event.number, kind = kind.label(), error = %e, "snapshot download failed");
                self.publish(DownloadState::Failed(e.to_string()));
                None
            }
        }
    }

    async fn fetch_and_install(
        &self,
        event: EventRef,
        kind: SnapshotKind,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        let data_dir = self.store.data_dir().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let metadata = self.metadata(event).await?;
        let dataset = kind.into();
        let url = metadata
            .url_for(dataset, self.sqlite_mode, self.compression)
            .ok_or_else(|| {
                AcquisitionError::MissingUrl(url_key(dataset, self.sqlite_mode, self.compression))
            })?
            .to_string();

        self.publish(DownloadState::Downloading(0.0));
        let state = Arc::clone(&self.state);
        let archive = downloader::download_archive(&self.client, &url, &data_dir, cancel, |progress| {
            state.send_replace(DownloadState::Downloading(progress));
        })
        .await?;

        match self.compression {
            CompressionMode::Zip => self.extract(archive, data_dir, destination, cancel).await,
            CompressionMode::Gzip => {
                tokio::fs::rename(&archive, destination).await?;
                Ok(())
            }
        }
    }

    async fn extract(
        &self,
        archive: PathBuf,
        data_dir: PathBuf,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        self.publish(DownloadState::Extracting(0.0));
        let state = Arc::clone(&self.state);
        let cancel = cancel.clone();
        let archive_for_task = archive.clone();

        let extracted = tokio::task::spawn_blocking(move || {
            extract::extract_archive(&archive_for_task, &data_dir, &cancel, |progress| {
                state.send_replace(DownloadState::Extracting(progress));
            })
        })
        .await;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!(path = %archive.display(), error = %e, "failed to remove archive");
        }

        let files = extracted??;
        let first = files.first().ok_or(AcquisitionError::EmptyArchive)?;
        if first != destination {
            debug!(from = %first.display(), to = %destination.display(), "renaming extracted file");
            tokio::fs::rename(first, destination).await?;
        }
        Ok(())
    }

    async fn metadata(&self, event: EventRef) -> Result<SnapshotMetadata, AcquisitionError> {
        let mut cached = self.metadata.lock().await;
        if let Some(metadata) = cached.get(&event.number) {
            return Ok(metadata.clone());
        }

        self.publish(DownloadState::FetchingMetadata);
        let url = format!("{}/CatalogBase/All/", self.endpoint);
        let token = self.tokens.access_token().unwrap_or_default();
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .form(&[
                ("event_id", event.id.to_string()),
                ("event_no", event.number.to_string()),
            ])
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::MetadataStatus(status));
        }
        let metadata: SnapshotMetadata = response.json().await?;
        info!(event = event.number, update_date = %metadata.response.update_date, "fetched snapshot metadata");

        cached.insert(event.number, metadata.clone());
        Ok(metadata)
    }

    /// Remove `.part` files and staging directories left behind by an interrupted run.
    pub fn sweep_stale_partials(&self) -> usize {
        let data_dir = self.store.data_dir();
        if !data_dir.exists() {
            return 0;
        }

        let mut removed = 0;
        for entry in WalkDir::new(data_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let name = entry.file_name().to_string_lossy();
            let path = entry.path();
            let result = if entry.file_type().is_dir() && name.starts_with(STAGING_PREFIX) {
                std::fs::remove_dir_all(path)
            } else if entry.file_type().is_file() && name.ends_with(PARTIAL_SUFFIX) {
                std::fs::remove_file(path)
            } else {
                continue;
            };

            match result {
                Ok(()) => {
                    debug!(path = %path.display(), "removed stale partial");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale partial"),
            }
        }
        removed
    }
}

impl std::fmt::Debug for AcquisitionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionPipeline")
            .field("endpoint", &self.endpoint)
            .field("sqlite_mode", &self.sqlite_mode)
            .field("compression", &self.compression)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
