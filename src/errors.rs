/// Error types for each layer of the catalog reader.
///
/// The storage and query layer never lets these escape its public methods:
/// they are logged and turned into empty results. The acquisition pipeline
/// uses them internally and publishes a `Failed` state instead.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("snapshot file is not downloaded: {0}")]
    NotDownloaded(PathBuf),
    #[error("no snapshot file has been assigned")]
    NotPrepared,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("metadata request returned HTTP {0}")]
    MetadataStatus(reqwest::StatusCode),
    #[error("archive request returned HTTP {0}")]
    ArchiveStatus(reqwest::StatusCode),
    #[error("metadata has no url for key {0}")]
    MissingUrl(String),
    #[error("archive url has no file name: {0}")]
    BadArchiveUrl(String),
    #[error(transparent)]
    Network(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("archive entry escapes the destination directory: {entry}")]
    ExtractionSecurityViolation { entry: String },
    #[error("download ended after {received} of {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },
    #[error("archive contained no files")]
    EmptyArchive,
    #[error("transfer cancelled")]
    Cancelled,
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to decode image {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
