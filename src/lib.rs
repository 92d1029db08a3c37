//! Offline event catalog reader.
//!
//! Downloads the organizer's snapshot databases, serves typed and filtered
//! queries over them, caches decoded images and lays catalog records out on
//! the floor map.

pub mod config;
pub mod download;
pub mod errors;
pub mod images;
pub mod map;
pub mod state;

pub use config::AppConfig;
pub use download::{AcquisitionPipeline, DownloadState};
pub use images::ImageCache;
pub use map::SpatialMapper;
pub use state::{CatalogFilter, CatalogStore, FilterQueryEngine, PaginationCache};
