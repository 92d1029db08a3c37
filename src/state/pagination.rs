/// Paged view over the current filter and search results.
///
/// Every dispatched query carries a generation ticket. A completion whose
/// generation is no longer the latest is dropped, so a slow query for an old
/// filter can never overwrite a newer one.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::data::Circle;
use super::library::CatalogStore;
use super::query::{CatalogFilter, FilterQueryEngine};

/// Handle for one dispatched filter query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTicket {
    generation: u64,
    fingerprint: String,
}

impl QueryTicket {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[derive(Debug, Default)]
struct PageState {
    fingerprint: Option<String>,
    all_ids: Vec<i64>,
    visible: Vec<i64>,
    searched: Option<Vec<i64>>,
}

pub struct PaginationCache {
    page_size: usize,
    state: Mutex<PageState>,
    generation: AtomicU64,
    search_generation: AtomicU64,
    loading_more: AtomicBool,
}

/// Clears the in-flight flag when a load-more finishes or unwinds.
struct LoadGuard<'a>(&'a AtomicBool);

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PaginationCache {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(PageState::default()),
            generation: AtomicU64::new(0),
            search_generation: AtomicU64::new(0),
            loading_more: AtomicBool::new(false),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.state.lock().fingerprint.clone()
    }

    /// Start a query for `fingerprint`. Returns `None` when it matches the committed one.
    ///
    /// The fingerprint only becomes active once [`commit`](Self::commit) accepts
    /// the result, so a query that never completes can be retried.
    pub fn begin(&self, fingerprint: String) -> Option<QueryTicket> {
        let state = self.state.lock();
        if state.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            debug!(fingerprint = %fingerprint, "filter unchanged, keeping cached ids");
            return None;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        Some(QueryTicket {
            generation,
            fingerprint,
        })
    }

    /// Store the result of a query unless a newer one has been dispatched since.
    pub fn commit(&self, ticket: QueryTicket, ids: Vec<i64>) -> bool {
        let mut state = self.state.lock();
        if ticket.generation != self.generation.load(Ordering::Acquire) {
            debug!(
                fingerprint = %ticket.fingerprint,
                generation = ticket.generation,
                "discarding stale query result"
            );
            return false;
        }
        state.fingerprint = Some(ticket.fingerprint);
        self.replace_ids(&mut state, ids);
        true
    }

    /// Replace the full id list and reset the visible page to its first slice.
    pub fn set_filtered(&self, ids: Vec<i64>) {
        let mut state = self.state.lock();
        self.replace_ids(&mut state, ids);
    }

    fn replace_ids(&self, state: &mut PageState, ids: Vec<i64>) {
        state.visible = ids.iter().take(self.page_size).copied().collect();
        state.all_ids = ids;
    }

    /// Forget the active fingerprint so the next refresh queries again.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.fingerprint = None;
        state.all_ids.clear();
        state.visible.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current_page(&self) -> Vec<i64> {
        self.state.lock().visible.clone()
    }

    pub fn all_ids(&self) -> Vec<i64> {
        self.state.lock().all_ids.clone()
    }

    pub fn has_more(&self) -> bool {
        let state = self.state.lock();
        state.visible.len() < state.all_ids.len()
    }

    fn try_begin_load(&self) -> Option<LoadGuard<'_>> {
        self.loading_more
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadGuard(&self.loading_more))
    }

    fn next_slice(&self) -> Vec<i64> {
        let state = self.state.lock();
        let start = state.visible.len();
        let end = (start + self.page_size).min(state.all_ids.len());
        state.all_ids[start..end].to_vec()
    }

    fn append(&self, slice: &[i64]) {
        let mut state = self.state.lock();
        // The list may have been replaced while the slice was loading.
        let start = state.visible.len();
        if state.all_ids.get(start..start + slice.len()) == Some(slice) {
            state.visible.extend_from_slice(slice);
        }
    }

    /// Append the next slice to the visible page.
    ///
    /// Returns the appended ids, or `None` when everything is visible or
    /// another load is already running.
    pub fn load_more(&self) -> Option<Vec<i64>> {
        let _guard = self.try_begin_load()?;
        let slice = self.next_slice();
        if slice.is_empty() {
            return None;
        }
        self.append(&slice);
        Some(slice)
    }

    /// Re-query when the filter fingerprint changed. Returns true when new ids were committed.
    pub async fn refresh(&self, store: Arc<CatalogStore>, filter: CatalogFilter) -> bool {
        let Some(ticket) = self.begin(filter.fingerprint()) else {
            return false;
        };
        let page_size = self.page_size;

        let result = tokio::task::spawn_blocking(move || {
            if !store.open_text() {
                return None;
            }
            let ids = FilterQueryEngine::new(&store).circle_ids(&filter);
            let first_page = &ids[..ids.len().min(page_size)];
            store.prefetch_circle_images(first_page);
            Some(ids)
        })
        .await;

        match result {
            Ok(Some(ids)) => self.commit(ticket, ids),
            Ok(None) => {
                warn!(fingerprint = %ticket.fingerprint, "catalog not open, filter left pending");
                false
            }
            Err(e) => {
                warn!(error = %e, "filter query task failed");
                false
            }
        }
    }

    /// Run a free-text search. `None` clears the search state.
    pub async fn search(&self, store: Arc<CatalogStore>, term: String) -> Option<Vec<i64>> {
        let generation = self.search_generation.fetch_add(1, Ordering::AcqRel) + 1;

        let result =
            tokio::task::spawn_blocking(move || FilterQueryEngine::new(&store).search(&term)).await;

        let searched = match result {
            Ok(searched) => searched,
            Err(e) => {
                warn!(error = %e, "search task failed");
                return None;
            }
        };

        if generation != self.search_generation.load(Ordering::Acquire) {
            debug!(generation, "discarding stale search result");
            return None;
        }
        self.set_searched(searched.clone());
        searched
    }

    pub fn set_searched(&self, ids: Option<Vec<i64>>) {
        self.state.lock().searched = ids;
    }

    /// Ids of the active search; `None` when no search is active.
    pub fn searched(&self) -> Option<Vec<i64>> {
        self.state.lock().searched.clone()
    }

    /// Circles of the visible page, with their cut images prefetched.
    pub async fn page_circles(&self, store: Arc<CatalogStore>) -> Vec<Circle> {
        let ids = self.current_page();
        let result = tokio::task::spawn_blocking(move || {
            store.prefetch_circle_images(&ids);
            store.circles(&ids, false)
        })
        .await;
        result.unwrap_or_else(|e| {
            warn!(error = %e, "page load task failed");
            Vec::new()
        })
    }

    /// Load the circles of the next slice and append them to the visible page.
    pub async fn load_more_circles(&self, store: Arc<CatalogStore>) -> Option<Vec<Circle>> {
        let _guard = self.try_begin_load()?;
        let slice = self.next_slice();
        if slice.is_empty() {
            return None;
        }

        let ids = slice.clone();
        let result = tokio::task::spawn_blocking(move || {
            store.prefetch_circle_images(&ids);
            store.circles(&ids, false)
        })
        .await;

        match result {
            Ok(circles) => {
                self.append(&slice);
                Some(circles)
            }
            Err(e) => {
                warn!(error = %e, "load more task failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for PaginationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PaginationCache")
            .field("page_size", &self.page_size)
            .field("fingerprint", &state.fingerprint)
            .field("total", &state.all_ids.len())
            .field("visible", &state.visible.len())
            .finish()
    }
}
