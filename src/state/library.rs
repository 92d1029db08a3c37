use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, error, info, warn};

use super::data::{
    Block, Circle, CircleCutConfiguration, Event, EventDate, ExtendedCircleInfo, Genre, Hall,
    LayoutEntry, LayoutType, Map, MapConfiguration, Point, Size,
};
use super::query::SelectBuilder;
use crate::errors::CatalogError;
use crate::images::{self, DecodedImage, ImageCache};
use crate::map::ResolutionTier;

/// Upper bound on bound parameters per statement; longer id lists are chunked.
pub(crate) const MAX_BIND_PARAMS: usize = 900;

/// The two relational files making up one event snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Attributes: circles, blocks, genres, dates, maps, layouts.
    Text,
    /// Cut images and common images.
    Images,
}

impl SnapshotKind {
    pub fn label(self) -> &'static str {
        match self {
            SnapshotKind::Text => "text",
            SnapshotKind::Images => "image",
        }
    }
}

/// File name of a snapshot file, derived from the event number.
pub fn snapshot_file_name(event_number: i64, kind: SnapshotKind) -> String {
    match kind {
        SnapshotKind::Text => format!("webcatalog{}.db", event_number),
        SnapshotKind::Images => format!("webcatalog{}Image1.db", event_number),
    }
}

/// One read-only SQLite file plus its lazily opened connection.
///
/// The mutex serializes open, query and close on the file.
struct StoreFile {
    kind: SnapshotKind,
    slot: Mutex<FileSlot>,
}

#[derive(Default)]
struct FileSlot {
    path: Option<PathBuf>,
    conn: Option<Connection>,
}

impl StoreFile {
    fn new(kind: SnapshotKind) -> Self {
        Self {
            kind,
            slot: Mutex::new(FileSlot::default()),
        }
    }

    fn assign(&self, path: PathBuf) {
        let mut slot = self.slot.lock();
        if slot.path.as_ref() != Some(&path) {
            slot.conn = None;
        }
        slot.path = Some(path);
    }

    fn path(&self) -> Option<PathBuf> {
        self.slot.lock().path.clone()
    }

    fn open(&self) -> bool {
        let mut slot = self.slot.lock();
        match Self::ensure_open(self.kind, &mut slot) {
            Ok(_) => true,
            Err(e) => {
                debug!(kind = self.kind.label(), error = %e, "snapshot file not available");
                false
            }
        }
    }

    fn ensure_open(kind: SnapshotKind, slot: &mut FileSlot) -> Result<&Connection, CatalogError> {
        if slot.conn.is_none() {
            let path = slot.path.as_ref().ok_or(CatalogError::NotPrepared)?;
            if !path.exists() {
                return Err(CatalogError::NotDownloaded(path.clone()));
            }
            debug!(kind = kind.label(), path = %path.display(), "connecting to snapshot database");
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            slot.conn = Some(conn);
        }
        slot.conn.as_ref().ok_or(CatalogError::NotPrepared)
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, CatalogError> {
        let mut slot = self.slot.lock();
        let conn = Self::ensure_open(self.kind, &mut slot)?;
        Ok(f(conn)?)
    }

    fn close(&self) {
        self.slot.lock().conn = None;
    }

    fn clear(&self) {
        let mut slot = self.slot.lock();
        slot.conn = None;
        slot.path = None;
    }

    /// Drop the file assignment only if it points at `path`.
    fn release_if(&self, path: &Path) -> bool {
        let mut slot = self.slot.lock();
        if slot.path.as_deref() == Some(path) {
            slot.conn = None;
            slot.path = None;
            true
        } else {
            false
        }
    }
}

/// The CatalogStore manages the two downloaded snapshot databases of one event.
///
/// Every query degrades to an empty result when the files are missing or a
/// statement fails; the failure is logged and never returned to the caller.
pub struct CatalogStore {
    data_dir: PathBuf,
    text: StoreFile,
    image: StoreFile,
    images: Arc<ImageCache>,
}

impl CatalogStore {
    pub fn new(data_dir: impl Into<PathBuf>, images: Arc<ImageCache>) -> Self {
        Self {
            data_dir: data_dir.into(),
            text: StoreFile::new(SnapshotKind::Text),
            image: StoreFile::new(SnapshotKind::Images),
            images,
        }
    }

    /// Directory holding the snapshot files
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.images
    }

    pub fn snapshot_path(&self, event_number: i64, kind: SnapshotKind) -> PathBuf {
        self.data_dir.join(snapshot_file_name(event_number, kind))
    }

    pub fn is_downloaded(&self, event_number: i64) -> bool {
        self.snapshot_path(event_number, SnapshotKind::Text).exists()
            && self.snapshot_path(event_number, SnapshotKind::Images).exists()
    }

    /// Disconnect, then adopt whichever snapshot files already exist for the event.
    pub fn prepare(&self, event_number: i64) {
        self.disconnect();
        debug!(event_number, "preparing catalog store");
        for (file, kind) in [
            (&self.text, SnapshotKind::Text),
            (&self.image, SnapshotKind::Images),
        ] {
            let path = self.snapshot_path(event_number, kind);
            if path.exists() {
                debug!(kind = kind.label(), "found snapshot file");
                file.assign(path);
            } else {
                file.clear();
            }
        }
    }

    pub fn set_file(&self, kind: SnapshotKind, path: PathBuf) {
        match kind {
            SnapshotKind::Text => self.text.assign(path),
            SnapshotKind::Images => self.image.assign(path),
        }
    }

    pub fn text_file(&self) -> Option<PathBuf> {
        self.text.path()
    }

    pub fn image_file(&self) -> Option<PathBuf> {
        self.image.path()
    }

    /// Open the attributes database. Returns false when it is absent or unreadable.
    pub fn open_text(&self) -> bool {
        self.text.open()
    }

    /// Open the image database. Returns false when it is absent or unreadable.
    pub fn open_image(&self) -> bool {
        self.image.open()
    }

    pub fn disconnect(&self) {
        debug!("disconnecting catalog store");
        self.text.close();
        self.image.close();
    }

    /// Close connections and drop in-memory caches; files stay on disk.
    pub fn reset(&self) {
        info!("resetting catalog store");
        self.text.clear();
        self.image.clear();
        self.images.evict_all();
    }

    /// Close connections, drop caches and remove every downloaded file.
    pub fn delete(&self) {
        self.reset();
        if self.data_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.data_dir) {
                error!(dir = %self.data_dir.display(), error = %e, "failed to delete data directory");
            } else {
                info!(dir = %self.data_dir.display(), "deleted downloaded snapshots");
            }
        }
    }

    /// Remove one event's snapshot files, releasing them first if active.
    pub fn delete_event(&self, event_number: i64) {
        let text_path = self.snapshot_path(event_number, SnapshotKind::Text);
        let image_path = self.snapshot_path(event_number, SnapshotKind::Images);

        self.text.release_if(&text_path);
        if self.image.release_if(&image_path) {
            self.images.evict_all();
        }

        for path in [text_path, image_path] {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to delete snapshot file");
                }
            }
        }
    }

    /// Run a query on the attributes database; failures are logged and yield `T::default()`.
    pub(crate) fn with_text<T: Default>(
        &self,
        operation: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> T {
        match self.text.with(f) {
            Ok(value) => value,
            Err(CatalogError::NotDownloaded(path)) => {
                warn!(operation, path = %path.display(), "text database not downloaded");
                T::default()
            }
            Err(CatalogError::NotPrepared) => {
                debug!(operation, "text database not prepared");
                T::default()
            }
            Err(e) => {
                error!(operation, error = %e, "text query failed");
                T::default()
            }
        }
    }

    pub(crate) fn with_image<T: Default>(
        &self,
        operation: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> T {
        match self.image.with(f) {
            Ok(value) => value,
            Err(CatalogError::Sqlite(e)) => {
                error!(operation, error = %e, "image query failed");
                T::default()
            }
            Err(e) => {
                debug!(operation, error = %e, "image database unavailable");
                T::default()
            }
        }
    }

    // ========== Text data ==========

    /// Circles for the given ids joined with extended info and block, sorted by id.
    pub fn circles(&self, ids: &[i64], reversed: bool) -> Vec<Circle> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut circles = self.with_text("circles", |conn| {
            let mut circles = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(MAX_BIND_PARAMS) {
                let query = SelectBuilder::new(CIRCLE_SELECT).where_in("c.id", chunk);
                circles.extend(query.query_map(conn, circle_from_row)?);
            }
            Ok(circles)
        });

        if reversed {
            circles.sort_by(|a, b| b.id.cmp(&a.id));
        } else {
            circles.sort_by_key(|c| c.id);
        }
        circles
    }

    pub fn genres(&self) -> Vec<Genre> {
        self.with_text("genres", |conn| {
            SelectBuilder::new("SELECT comiketNo, id, name, code, day FROM ComiketGenreWC")
                .order_by("id ASC")
                .query_map(conn, |row| {
                    Ok(Genre {
                        event_number: row.get(0)?,
                        id: row.get(1)?,
                        name: text(row, 2)?,
                        code: row.get(3)?,
                        day: int(row, 4)?,
                    })
                })
        })
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.with_text("blocks", |conn| {
            SelectBuilder::new("SELECT comiketNo, id, name, areaId FROM ComiketBlockWC")
                .order_by("id ASC")
                .query_map(conn, |row| {
                    Ok(Block {
                        event_number: row.get(0)?,
                        id: row.get(1)?,
                        name: text(row, 2)?,
                        area_id: row.get(3)?,
                    })
                })
        })
    }

    /// Event days; rows with an impossible calendar date are skipped.
    pub fn dates(&self) -> Vec<EventDate> {
        self.read_dates(None)
    }

    /// Days of one event only.
    pub fn dates_for_event(&self, event_number: i64) -> Vec<EventDate> {
        self.read_dates(Some(event_number))
    }

    fn read_dates(&self, event_number: Option<i64>) -> Vec<EventDate> {
        let rows: Vec<(i64, i64, i32, u32, u32)> = self.with_text("dates", |conn| {
            let mut query =
                SelectBuilder::new("SELECT comiketNo, id, year, month, day FROM ComiketDateWC");
            if let Some(event_number) = event_number {
                query = query.where_eq("comiketNo", event_number);
            }
            query.order_by("id ASC").query_map(conn, |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
        });

        rows.into_iter()
            .filter_map(|(event_number, id, year, month, day)| {
                match NaiveDate::from_ymd_opt(year, month, day) {
                    Some(date) => Some(EventDate {
                        event_number,
                        id,
                        date,
                    }),
                    None => {
                        warn!(id, year, month, day, "skipping invalid event date");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn maps(&self) -> Vec<Map> {
        self.with_text("maps", |conn| {
            SelectBuilder::new(
                "SELECT comiketNo, id, name, filename, allFilename, w, h, x, y, w2, h2, x2, y2, rotate \
                 FROM ComiketMapWC",
            )
            .order_by("id ASC")
            .query_map(conn, |row| {
                Ok(Map {
                    event_number: row.get(0)?,
                    id: row.get(1)?,
                    name: text(row, 2)?,
                    filename: text(row, 3)?,
                    all_filename: text(row, 4)?,
                    configuration: map_configuration(row, 5)?,
                    hd_configuration: map_configuration(row, 9)?,
                    rotation: row.get(13)?,
                })
            })
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.with_text("events", |conn| {
            SelectBuilder::new(
                "SELECT comiketNo, comiketName, \
                 cutSizeW, cutSizeH, cutOriginX, cutOriginY, cutOffsetX, cutOffsetY, \
                 mapSizeW, mapSizeH, mapOriginX, mapOriginY, \
                 map2SizeW, map2SizeH, map2OriginX, map2OriginY \
                 FROM ComiketInfoWC",
            )
            .order_by("comiketNo ASC")
            .query_map(conn, |row| {
                Ok(Event {
                    number: row.get(0)?,
                    name: text(row, 1)?,
                    cut_configuration: CircleCutConfiguration {
                        size: Size {
                            width: row.get(2)?,
                            height: row.get(3)?,
                        },
                        origin: Point {
                            x: row.get(4)?,
                            y: row.get(5)?,
                        },
                        offset: Point {
                            x: row.get(6)?,
                            y: row.get(7)?,
                        },
                    },
                    map_configuration: map_configuration(row, 8)?,
                    hd_map_configuration: map_configuration(row, 12)?,
                })
            })
        })
    }

    /// Raw layout rows for one map.
    pub fn layouts(&self, map_id: i64) -> Vec<LayoutEntry> {
        self.with_text("layouts", |conn| {
            SelectBuilder::new(
                "SELECT comiketNo, blockId, spaceNo, xpos, ypos, xpos2, ypos2, layout, mapId, hallId \
                 FROM ComiketLayoutWC",
            )
            .where_eq("mapId", map_id)
            .order_by("blockId ASC, spaceNo ASC")
            .query_map(conn, |row| {
                Ok(LayoutEntry {
                    event_number: row.get(0)?,
                    block_id: row.get(1)?,
                    space_number: row.get(2)?,
                    position: Point {
                        x: row.get(3)?,
                        y: row.get(4)?,
                    },
                    hd_position: Point {
                        x: row.get(5)?,
                        y: row.get(6)?,
                    },
                    layout: LayoutType::from_value(row.get(7)?),
                    map_id: row.get(8)?,
                    hall_id: row.get(9)?,
                })
            })
        })
    }

    // ========== Images ==========

    /// Load every common image from the image database into memory.
    pub fn load_common_images(&self) -> usize {
        let images = Arc::clone(&self.images);
        self.with_image("load_common_images", move |conn| images.load_common(conn))
    }

    /// Note that circle cut images are available; they are decoded on demand.
    pub fn load_circle_images(&self) {
        self.images.mark_circle_images_ready();
    }

    pub fn cached_circle_image(&self, id: i64) -> Option<Arc<DecodedImage>> {
        self.images.cached_circle(id)
    }

    pub fn circle_image(&self, id: i64) -> Option<Arc<DecodedImage>> {
        if let Some(hit) = self.images.cached_circle(id) {
            return Some(hit);
        }
        let images = Arc::clone(&self.images);
        self.with_image("circle_image", move |conn| images.circle(conn, id))
    }

    pub fn prefetch_circle_images(&self, ids: &[i64]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let images = Arc::clone(&self.images);
        self.with_image("prefetch_circle_images", move |conn| {
            images.prefetch(conn, ids)
        })
    }

    pub fn common_image(&self, name: &str) -> Option<Arc<DecodedImage>> {
        self.images.common(name)
    }

    pub fn cover_image(&self) -> Option<Arc<DecodedImage>> {
        self.common_image(images::COVER_IMAGE)
    }

    pub fn jiko_image(&self) -> Option<Arc<DecodedImage>> {
        self.common_image(images::JIKO_IMAGE)
    }

    pub fn block_image(&self, block_id: i64) -> Option<Arc<DecodedImage>> {
        self.common_image(&images::block_image_name(block_id))
    }

    pub fn map_image(&self, hall: Hall, day: i64, tier: ResolutionTier) -> Option<Arc<DecodedImage>> {
        self.common_image(&images::map_image_name(hall, day, tier))
    }

    pub fn genre_image(&self, hall: Hall, day: i64, tier: ResolutionTier) -> Option<Arc<DecodedImage>> {
        self.common_image(&images::genre_image_name(hall, day, tier))
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("data_dir", &self.data_dir)
            .field("text_file", &self.text.path())
            .field("image_file", &self.image.path())
            .finish()
    }
}

const CIRCLE_SELECT: &str = "SELECT c.comiketNo, c.id, c.pageNo, c.cutIndex, c.day, c.blockId, \
     c.spaceNo, c.spaceNoSub, c.genreId, c.circleName, c.circleKana, c.penName, c.bookName, \
     c.url, c.mailAddr, c.description, c.memo, c.updateId, c.updateData, c.circlems, c.rss, \
     c.updateFlag, e.WCId, e.twitterURL, e.pixivURL, e.CirclemsPortalURL, b.name, b.areaId \
     FROM ComiketCircleWC c \
     LEFT OUTER JOIN ComiketCircleExtend e ON c.id = e.id \
     LEFT OUTER JOIN ComiketBlockWC b ON c.blockId = b.id";

fn circle_from_row(row: &Row<'_>) -> rusqlite::Result<Circle> {
    let event_number: i64 = row.get(0)?;
    let id: i64 = row.get(1)?;
    let block_id = int(row, 5)?;

    let extended = match row.get::<_, Option<i64>>(22)? {
        Some(catalog_id) => Some(ExtendedCircleInfo {
            event_number,
            id,
            catalog_id,
            twitter_url: non_empty(row, 23)?,
            pixiv_url: non_empty(row, 24)?,
            portal_url: non_empty(row, 25)?,
        }),
        None => None,
    };

    let block = match row.get::<_, Option<String>>(26)? {
        Some(name) => Some(Block {
            event_number,
            id: block_id,
            name,
            area_id: row.get::<_, Option<i64>>(27)?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Circle {
        event_number,
        id,
        page_number: int(row, 2)?,
        cut_index: int(row, 3)?,
        day: row.get(4)?,
        block_id,
        space_number: int(row, 6)?,
        space_number_suffix: int(row, 7)?,
        genre_id: int(row, 8)?,
        name: text(row, 9)?,
        name_kana: text(row, 10)?,
        pen_name: text(row, 11)?,
        book_name: text(row, 12)?,
        url: non_empty(row, 13)?,
        mail_address: text(row, 14)?,
        description: text(row, 15)?,
        memo: text(row, 16)?,
        update_id: int(row, 17)?,
        update_data: text(row, 18)?,
        circle_ms_url: non_empty(row, 19)?,
        rss: text(row, 20)?,
        update_flag: int(row, 21)?,
        extended,
        block,
    })
}

fn map_configuration(row: &Row<'_>, first: usize) -> rusqlite::Result<MapConfiguration> {
    Ok(MapConfiguration {
        size: Size {
            width: row.get(first)?,
            height: row.get(first + 1)?,
        },
        origin: Point {
            x: row.get(first + 2)?,
            y: row.get(first + 3)?,
        },
    })
}

/// NULL text columns read as empty strings.
/// NULL integer columns read as 0.
fn int(row: &Row<'_>, idx: usize) -> rusqlite::Result<i64> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or_default())
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

/// Empty text columns read as None.
fn non_empty(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures;

    #[test]
    fn test_snapshot_file_names() {
        assert_eq!(snapshot_file_name(105, SnapshotKind::Text), "webcatalog105.db");
        assert_eq!(
            snapshot_file_name(105, SnapshotKind::Images),
            "webcatalog105Image1.db"
        );
    }

    #[test]
    fn test_missing_files_yield_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::empty_store(dir.path());

        assert!(!store.open_text());
        assert!(!store.open_image());
        store.prepare(105);
        assert!(!store.open_text());

        assert!(store.circles(&[1, 2], false).is_empty());
        assert!(store.genres().is_empty());
        assert!(store.blocks().is_empty());
        assert!(store.dates().is_empty());
        assert!(store.maps().is_empty());
        assert!(store.events().is_empty());
        assert!(store.circle_image(1).is_none());
        assert_eq!(store.load_common_images(), 0);
    }

    #[test]
    fn test_prepare_adopts_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());

        assert!(store.is_downloaded(fixtures::EVENT));
        assert!(store.open_text());
        assert!(store.open_text(), "opening twice is a no-op");
        assert!(store.open_image());
        assert_eq!(
            store.text_file(),
            Some(store.snapshot_path(fixtures::EVENT, SnapshotKind::Text))
        );
    }

    #[test]
    fn test_circles_join_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());

        let circles = store.circles(&[3, 1, 7], false);
        let ids: Vec<i64> = circles.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 7]);

        let first = &circles[0];
        assert_eq!(first.name, "Alpha Works");
        assert_eq!(first.block.as_ref().map(|b| b.name.as_str()), Some("ア"));
        assert_eq!(first.space_name().as_deref(), Some("ア01a"));
        let extended = first.extended.as_ref().unwrap();
        assert_eq!(extended.catalog_id, 1001);
        assert_eq!(extended.twitter_url.as_deref(), Some("https://x.com/alpha"));
        assert!(extended.pixiv_url.is_none());
        assert!(extended.has_accessible_urls());
        assert!(first.url.is_none(), "empty url column reads as None");

        // Circle 7 has no extended row.
        assert!(circles[2].extended.is_none());

        let reversed: Vec<i64> = store.circles(&[3, 1, 7], true).iter().map(|c| c.id).collect();
        assert_eq!(reversed, vec![7, 3, 1]);
    }

    #[test]
    fn test_null_integer_columns_keep_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());
        let path = store.snapshot_path(fixtures::EVENT, SnapshotKind::Text);
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "INSERT INTO ComiketCircleWC (comiketNo, id, day, blockId, spaceNo, circleName) \
                 VALUES (105, 8, 1, 2, 3, 'Eta');",
            )
            .unwrap();

        let circles = store.circles(&[1, 8, 2], false);
        assert_eq!(circles.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 8]);

        let eta = &circles[2];
        assert_eq!(eta.name, "Eta");
        assert_eq!(eta.page_number, 0);
        assert_eq!(eta.cut_index, 0);
        assert_eq!(eta.space_number_suffix, 0);
        assert_eq!(eta.genre_id, 0);
        assert_eq!(eta.update_id, 0);
        assert_eq!(eta.update_flag, 0);
        assert_eq!(eta.space_name().as_deref(), Some("イ03a"));
    }

    #[test]
    fn test_full_tables_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());

        let blocks: Vec<i64> = store.blocks().iter().map(|b| b.id).collect();
        assert_eq!(blocks, vec![1, 2, 3]);

        let genres = store.genres();
        assert_eq!(genres.iter().map(|g| g.id).collect::<Vec<_>>(), vec![100, 200]);
        assert_eq!(genres[0].name, "Creation");

        let dates = store.dates();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].date, NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());

        let maps = store.maps();
        assert_eq!(maps.iter().map(|m| m.id).collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(maps[0].hall(), Some(Hall::East123));
        assert_eq!(maps[0].hd_configuration.size.width, 2000);

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].number, fixtures::EVENT);
        assert_eq!(events[0].cut_configuration.size.width, 211);

        let layouts = store.layouts(5);
        assert_eq!(layouts.len(), 4);
        assert_eq!(layouts[1].layout, LayoutType::AOnRight);
    }

    #[test]
    fn test_reset_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());
        assert!(store.open_text());

        store.reset();
        assert!(store.text_file().is_none());
        assert!(store.blocks().is_empty());
        assert!(store.is_downloaded(fixtures::EVENT));

        store.prepare(fixtures::EVENT);
        assert_eq!(store.blocks().len(), 3);
    }

    #[test]
    fn test_delete_event_removes_only_that_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixtures::populated_store(dir.path());
        let other = store.snapshot_path(99, SnapshotKind::Text);
        fs::write(&other, b"placeholder").unwrap();

        store.delete_event(fixtures::EVENT);
        assert!(!store.is_downloaded(fixtures::EVENT));
        assert!(store.text_file().is_none());
        assert!(other.exists());

        store.delete();
        assert!(!dir.path().join("databases").exists());
    }
}
