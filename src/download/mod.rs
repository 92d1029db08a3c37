/// Snapshot acquisition: metadata fetch, archive download and safe extraction.
pub mod acquisition;
pub mod downloader;
pub mod extract;
pub mod metadata;

pub use acquisition::{AcquisitionPipeline, DownloadState, StaticToken, TokenProvider};
pub use metadata::{CompressionMode, Dataset, SnapshotMetadata, SqliteMode};
