/// State management module
///
/// This module handles the catalog snapshot state, including:
/// - Database connections and typed queries (library.rs)
/// - Shared data structures (data.rs)
/// - Filter, search and cross-reference queries (query.rs)
/// - Paged result lists with stale-result protection (pagination.rs)

pub mod data;
pub mod library;
pub mod pagination;
pub mod query;

#[cfg(test)]
pub(crate) mod fixtures;

pub use library::{snapshot_file_name, CatalogStore, SnapshotKind};
pub use pagination::{PaginationCache, QueryTicket};
pub use query::{CatalogFilter, FilterQueryEngine, SelectBuilder};
