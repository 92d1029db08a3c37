use std::collections::HashMap;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OptionalExtension};
use sysinfo::System;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::decode::{self, DecodedImage};
use crate::config::ImageCacheConfig;
use crate::errors::ImageError;
use crate::state::library::MAX_BIND_PARAMS;
use crate::state::query::SelectBuilder;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    Circle(i64),
    Common(String),
}

impl std::fmt::Display for ImageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageKey::Circle(id) => write!(f, "circle {}", id),
            ImageKey::Common(name) => write!(f, "common {}", name),
        }
    }
}

/// LRU whose capacity is counted in decoded bytes.
struct ByteBudgetLru {
    entries: LruCache<ImageKey, Arc<DecodedImage>>,
    used: usize,
    budget: usize,
}

impl ByteBudgetLru {
    fn new(budget: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            used: 0,
            budget,
        }
    }

    fn get(&mut self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        self.entries.get(key).cloned()
    }

    fn contains(&self, key: &ImageKey) -> bool {
        self.entries.contains(key)
    }

    fn put(&mut self, key: ImageKey, image: Arc<DecodedImage>) {
        let size = image.byte_size();
        if size > self.budget {
            debug!(key = %key, size, budget = self.budget, "image larger than cache budget, not cached");
            return;
        }
        if let Some(previous) = self.entries.put(key, image) {
            self.used -= previous.byte_size();
        }
        self.used += size;
        while self.used > self.budget {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.used -= evicted.byte_size(),
                None => break,
            }
        }
    }

    fn remove(&mut self, key: &ImageKey) {
        if let Some(evicted) = self.entries.pop(key) {
            self.used -= evicted.byte_size();
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }
}

/// Two-tier image cache.
///
/// Raw common-image bytes stay resident for the life of a snapshot; decoded
/// images of both kinds live in one byte-budgeted LRU.
pub struct ImageCache {
    decoded: Mutex<ByteBudgetLru>,
    common_raw: RwLock<HashMap<String, Arc<[u8]>>>,
    common_loads: watch::Sender<u64>,
    circle_loads: watch::Sender<u64>,
}

impl ImageCache {
    pub fn with_budget(budget_bytes: usize) -> Self {
        let (common_loads, _) = watch::channel(0);
        let (circle_loads, _) = watch::channel(0);
        Self {
            decoded: Mutex::new(ByteBudgetLru::new(budget_bytes)),
            common_raw: RwLock::new(HashMap::new()),
            common_loads,
            circle_loads,
        }
    }

    /// Size the budget as a fraction of currently available memory.
    pub fn from_config(config: &ImageCacheConfig) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();
        let budget = if available == 0 {
            warn!("could not detect available memory, using minimum image budget");
            config.min_budget_bytes
        } else {
            ((available as f64 * config.memory_fraction) as usize).max(config.min_budget_bytes)
        };
        info!(budget_bytes = budget, available_bytes = available, "image cache sized");
        Self::with_budget(budget)
    }

    pub fn budget_bytes(&self) -> usize {
        self.decoded.lock().budget
    }

    pub fn used_bytes(&self) -> usize {
        self.decoded.lock().used
    }

    pub fn len(&self) -> usize {
        self.decoded.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, key: ImageKey, image: Arc<DecodedImage>) {
        self.decoded.lock().put(key, image);
    }

    pub fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        self.decoded.lock().get(key)
    }

    /// Drop every decoded image and every resident common-image byte.
    pub fn evict_all(&self) {
        debug!("evicting all cached images");
        self.decoded.lock().clear();
        self.common_raw.write().clear();
    }

    /// Changes each time common images are (re)loaded.
    pub fn subscribe_common_loads(&self) -> watch::Receiver<u64> {
        self.common_loads.subscribe()
    }

    /// Changes each time circle images become available.
    pub fn subscribe_circle_loads(&self) -> watch::Receiver<u64> {
        self.circle_loads.subscribe()
    }

    pub fn mark_circle_images_ready(&self) {
        self.circle_loads.send_modify(|count| *count += 1);
    }

    /// Read every row of `ComiketCommonImage` into the resident tier.
    pub fn load_common(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let rows: Vec<(String, Vec<u8>)> = SelectBuilder::new("SELECT name, image FROM ComiketCommonImage")
            .query_map(conn, |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut raw = HashMap::with_capacity(rows.len());
        {
            let mut decoded = self.decoded.lock();
            for (name, bytes) in rows {
                decoded.remove(&ImageKey::Common(name.clone()));
                raw.insert(name, Arc::<[u8]>::from(bytes));
            }
        }

        let count = raw.len();
        *self.common_raw.write() = raw;
        self.common_loads.send_modify(|loads| *loads += 1);
        info!(count, "loaded common images");
        Ok(count)
    }

    /// A common image by name, decoded on first use.
    pub fn common(&self, name: &str) -> Option<Arc<DecodedImage>> {
        let key = ImageKey::Common(name.to_string());
        if let Some(hit) = self.get(&key) {
            return Some(hit);
        }

        let bytes = self.common_raw.read().get(name).cloned()?;
        let image = Arc::new(decode_logged(&key, || decode::decode_full(&bytes))?);
        self.insert(key, Arc::clone(&image));
        Some(image)
    }

    pub fn cached_circle(&self, id: i64) -> Option<Arc<DecodedImage>> {
        self.get(&ImageKey::Circle(id))
    }

    /// Circle cut image, decoded from the store on a cache miss.
    pub fn circle(&self, conn: &Connection, id: i64) -> rusqlite::Result<Option<Arc<DecodedImage>>> {
        let key = ImageKey::Circle(id);
        if let Some(hit) = self.get(&key) {
            return Ok(Some(hit));
        }

        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT cutImage FROM ComiketCircleImage WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let Some(image) = decode_logged(&key, || decode::decode_reduced(&bytes)) else {
            return Ok(None);
        };
        let image = Arc::new(image);
        self.insert(key, Arc::clone(&image));
        Ok(Some(image))
    }

    /// Decode every id not already cached. Undecodable rows are skipped.
    pub fn prefetch(&self, conn: &Connection, ids: &[i64]) -> rusqlite::Result<usize> {
        let missing: Vec<i64> = {
            let decoded = self.decoded.lock();
            ids.iter()
                .copied()
                .filter(|id| !decoded.contains(&ImageKey::Circle(*id)))
                .collect()
        };
        if missing.is_empty() {
            return Ok(0);
        }

        let mut loaded = 0;
        for chunk in missing.chunks(MAX_BIND_PARAMS) {
            let rows: Vec<(i64, Vec<u8>)> =
                SelectBuilder::new("SELECT id, cutImage FROM ComiketCircleImage")
                    .where_in("id", chunk)
                    .query_map(conn, |row| Ok((row.get(0)?, row.get(1)?)))?;

            for (id, bytes) in rows {
                let key = ImageKey::Circle(id);
                if let Some(image) = decode_logged(&key, || decode::decode_reduced(&bytes)) {
                    self.insert(key, Arc::new(image));
                    loaded += 1;
                }
            }
        }
        debug!(requested = ids.len(), loaded, "prefetched circle images");
        Ok(loaded)
    }
}

fn decode_logged(
    key: &ImageKey,
    decode: impl FnOnce() -> image::ImageResult<DecodedImage>,
) -> Option<DecodedImage> {
    match decode().map_err(|source| ImageError::Decode {
        key: key.to_string(),
        source,
    }) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(error = %e, "skipping undecodable image");
            None
        }
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let decoded = self.decoded.lock();
        f.debug_struct("ImageCache")
            .field("entries", &decoded.entries.len())
            .field("used", &decoded.used)
            .field("budget", &decoded.budget)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::decode::PixelFormat;
    use crate::state::fixtures;

    fn blank(bytes: usize) -> Arc<DecodedImage> {
        Arc::new(DecodedImage {
            width: bytes as u32,
            height: 1,
            format: PixelFormat::Rgba8,
            pixels: vec![0; bytes],
        })
    }

    #[test]
    fn test_budget_counts_bytes_not_entries() {
        let cache = ImageCache::with_budget(100);
        cache.insert(ImageKey::Circle(1), blank(40));
        cache.insert(ImageKey::Circle(2), blank(40));
        assert_eq!(cache.used_bytes(), 80);

        // Touch 1 so 2 becomes least recently used.
        assert!(cache.cached_circle(1).is_some());
        cache.insert(ImageKey::Circle(3), blank(40));

        assert!(cache.cached_circle(1).is_some());
        assert!(cache.cached_circle(2).is_none());
        assert!(cache.cached_circle(3).is_some());
        assert_eq!(cache.used_bytes(), 80);
    }

    #[test]
    fn test_oversized_image_is_not_cached() {
        let cache = ImageCache::with_budget(100);
        cache.insert(ImageKey::Circle(1), blank(60));
        cache.insert(ImageKey::Circle(2), blank(101));
        assert!(cache.cached_circle(2).is_none());
        assert!(cache.cached_circle(1).is_some());
    }

    #[test]
    fn test_replacing_a_key_adjusts_usage() {
        let cache = ImageCache::with_budget(100);
        cache.insert(ImageKey::Common("B1".into()), blank(30));
        cache.insert(ImageKey::Common("B1".into()), blank(10));
        assert_eq!(cache.used_bytes(), 10);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_common_images_decode_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());
        let cache = Arc::clone(store.image_cache());
        let loads = cache.subscribe_common_loads();

        assert_eq!(store.load_common_images(), fixtures::COMMON_NAMES.len() + 1);
        assert_eq!(*loads.borrow(), 1);
        assert!(cache.is_empty(), "nothing decoded until requested");

        let cover = store.cover_image().unwrap();
        assert_eq!(cover.format, PixelFormat::Rgba8);
        assert_eq!((cover.width, cover.height), (4, 4));
        assert!(store.jiko_image().is_some());
        assert!(store.block_image(1).is_some());
        assert!(store.block_image(2).is_none());
        assert!(store.common_image("BROKEN").is_none());
        assert_eq!(cache.len(), 3);

        cache.evict_all();
        assert!(store.cover_image().is_none());
    }

    #[test]
    fn test_circle_images_reduced_and_corrupt_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());
        let cache = Arc::clone(store.image_cache());

        assert!(store.cached_circle_image(1).is_none());
        let cut = store.circle_image(1).unwrap();
        assert_eq!(cut.format, PixelFormat::Rgb565);
        assert_eq!(cut.byte_size(), 2 * 3 * 2);
        assert!(store.cached_circle_image(1).is_some());

        assert!(store.circle_image(4).is_none(), "corrupt row decodes to nothing");
        assert!(store.circle_image(99).is_none());

        // 1 is cached, 4 is corrupt, 99 has no row.
        assert_eq!(store.prefetch_circle_images(&[1, 2, 3, 4, 99]), 2);
        assert_eq!(cache.len(), 3);
        assert_eq!(store.prefetch_circle_images(&[1, 2, 3]), 0);
    }

    #[test]
    fn test_circle_loads_counter() {
        let cache = ImageCache::with_budget(10);
        let loads = cache.subscribe_circle_loads();
        cache.mark_circle_images_ready();
        cache.mark_circle_images_ready();
        assert_eq!(*loads.borrow(), 2);
    }
}
