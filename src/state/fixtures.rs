//! Small on-disk snapshot used by the unit tests.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rusqlite::{params, Connection};

use super::library::{snapshot_file_name, CatalogStore, SnapshotKind};
use crate::images::ImageCache;

pub const EVENT: i64 = 105;

/// Circles seated on map 5 on day 1 before any bulk rows are added.
pub const MAP5_DAY1: [i64; 5] = [1, 2, 3, 4, 7];

/// First id used by [`populated_store_with_bulk`].
pub const BULK_FIRST_ID: i64 = 100;

const TEXT_SCHEMA: &str = "
CREATE TABLE ComiketInfoWC (
    comiketNo INTEGER, comiketName TEXT,
    cutSizeW INTEGER, cutSizeH INTEGER, cutOriginX INTEGER, cutOriginY INTEGER,
    cutOffsetX INTEGER, cutOffsetY INTEGER,
    mapSizeW INTEGER, mapSizeH INTEGER, mapOriginX INTEGER, mapOriginY INTEGER,
    map2SizeW INTEGER, map2SizeH INTEGER, map2OriginX INTEGER, map2OriginY INTEGER
);
CREATE TABLE ComiketDateWC (comiketNo INTEGER, id INTEGER, year INTEGER, month INTEGER, day INTEGER);
CREATE TABLE ComiketBlockWC (comiketNo INTEGER, id INTEGER, name TEXT, areaId INTEGER);
CREATE TABLE ComiketGenreWC (comiketNo INTEGER, id INTEGER, name TEXT, code INTEGER, day INTEGER);
CREATE TABLE ComiketMapWC (
    comiketNo INTEGER, id INTEGER, name TEXT, filename TEXT, allFilename TEXT,
    w INTEGER, h INTEGER, x INTEGER, y INTEGER,
    w2 INTEGER, h2 INTEGER, x2 INTEGER, y2 INTEGER, rotate INTEGER
);
CREATE TABLE ComiketMappingWC (comiketNo INTEGER, mapId INTEGER, blockId INTEGER);
CREATE TABLE ComiketLayoutWC (
    comiketNo INTEGER, blockId INTEGER, spaceNo INTEGER,
    xpos INTEGER, ypos INTEGER, xpos2 INTEGER, ypos2 INTEGER,
    layout INTEGER, mapId INTEGER, hallId INTEGER
);
CREATE TABLE ComiketCircleWC (
    comiketNo INTEGER, id INTEGER, pageNo INTEGER, cutIndex INTEGER, day INTEGER,
    blockId INTEGER, spaceNo INTEGER, spaceNoSub INTEGER, genreId INTEGER,
    circleName TEXT, circleKana TEXT, penName TEXT, bookName TEXT, url TEXT,
    mailAddr TEXT, description TEXT, memo TEXT, updateId INTEGER, updateData TEXT,
    circlems TEXT, rss TEXT, updateFlag INTEGER
);
CREATE TABLE ComiketCircleExtend (
    comiketNo INTEGER, id INTEGER, WCId INTEGER,
    twitterURL TEXT, pixivURL TEXT, CirclemsPortalURL TEXT
);
";

const TEXT_DATA: &str = "
INSERT INTO ComiketInfoWC VALUES (105, 'Comic Market 105', 211, 300, 0, 0, 211, 300, 1000, 800, 0, 0, 2000, 1600, 0, 0);
INSERT INTO ComiketDateWC VALUES (105, 1, 2024, 12, 30), (105, 2, 2024, 12, 31), (105, 3, 2024, 2, 30);
INSERT INTO ComiketBlockWC VALUES (105, 2, 'イ', 1), (105, 1, 'ア', 1), (105, 3, 'シ', 2);
INSERT INTO ComiketGenreWC VALUES (105, 200, 'Games', 220, 1), (105, 100, 'Creation', 110, 1);
INSERT INTO ComiketMapWC VALUES
    (105, 6, 'West 1-2', 'W12', 'W12ALL', 1000, 800, 0, 0, 2000, 1600, 0, 0, 0),
    (105, 5, 'East 1-3', 'E123', 'E123ALL', 1000, 800, 0, 0, 2000, 1600, 0, 0, 0);
INSERT INTO ComiketMappingWC VALUES (105, 5, 1), (105, 5, 2), (105, 6, 3);
INSERT INTO ComiketLayoutWC VALUES
    (105, 2, 2, 120, 240, 240, 480, 2, 5, 1),
    (105, 1, 1, 100, 200, 200, 400, 1, 5, 1),
    (105, 2, 1, 100, 240, 200, 480, 4, 5, 1),
    (105, 1, 2, 120, 200, 240, 400, 3, 5, 1),
    (105, 3, 1, 300, 300, 600, 600, 1, 6, 2);
INSERT INTO ComiketCircleWC VALUES
    (105, 1, 1, 1, 1, 1, 1, 0, 100, 'Alpha Works', 'あるふぁわーくす', 'Ayumi', '', '', '', '', '', 0, '', '', '', 0),
    (105, 2, 1, 2, 1, 1, 1, 1, 100, 'Beta Studio', 'べーたすたじお', 'Bunta', '', 'https://beta.example', '', '', '', 0, '', '', '', 0),
    (105, 3, 1, 3, 1, 1, 2, 0, 200, 'Gamma House', 'がんまはうす', 'Chika', '', '', '', '', '', 0, '', '', '', 0),
    (105, 4, 1, 4, 1, 2, 1, 0, 200, '100% Orange', 'おれんじ', 'Daichi', '', '', '', '', '', 0, '', '', '', 0),
    (105, 5, 2, 1, 1, 3, 1, 0, 200, 'Delta', 'でるた', 'Eri', '', '', '', '', '', 0, '', '', '', 0),
    (105, 6, 2, 2, 2, 1, 1, 0, 100, 'Epsilon', 'いぷしろん', 'Fumio', '', '', '', '', '', 0, '', '', '', 0),
    (105, 7, 2, 3, 1, 2, 2, 0, 100, 'Zeta', 'ぜーた', 'Goro', '', NULL, '', '', '', 0, '', '', '', 0);
INSERT INTO ComiketCircleExtend VALUES
    (105, 1, 1001, 'https://x.com/alpha', '', ''),
    (105, 2, 1002, '', '', ''),
    (105, 3, 1003, '', 'https://pixiv.net/gamma', ''),
    (105, 4, 1004, '', '', ''),
    (105, 5, 1005, '', '', ''),
    (105, 6, 1006, '', '', '');
";

const IMAGE_SCHEMA: &str = "
CREATE TABLE ComiketCommonImage (name TEXT, image BLOB);
CREATE TABLE ComiketCircleImage (id INTEGER, cutImage BLOB);
";

/// Common images stored in the fixture; `BROKEN` does not decode.
pub const COMMON_NAMES: [&str; 6] = ["0001", "JIKO", "B1", "LWMP1E123", "WMP1E123", "LWGR1E123"];

/// A solid PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 90, 255]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode fixture png");
    buf.into_inner()
}

fn data_dir(root: &Path) -> PathBuf {
    root.join("databases")
}

/// A store whose data directory has no snapshot files.
pub fn empty_store(root: &Path) -> CatalogStore {
    CatalogStore::new(data_dir(root), Arc::new(ImageCache::with_budget(8 * 1024 * 1024)))
}

/// A store prepared on a fully written fixture snapshot.
pub fn populated_store(root: &Path) -> CatalogStore {
    populated_store_with_bulk(root, 0)
}

/// Same as [`populated_store`] plus `extra` circles on map 5, block 1, day 1,
/// with ids counting up from [`BULK_FIRST_ID`].
pub fn populated_store_with_bulk(root: &Path, extra: usize) -> CatalogStore {
    let dir = data_dir(root);
    fs::create_dir_all(&dir).expect("create fixture dir");
    write_text_db(&dir.join(snapshot_file_name(EVENT, SnapshotKind::Text)), extra);
    write_image_db(&dir.join(snapshot_file_name(EVENT, SnapshotKind::Images)));

    let store = empty_store(root);
    store.prepare(EVENT);
    store
}

fn write_text_db(path: &Path, extra: usize) {
    let conn = Connection::open(path).expect("open fixture text db");
    conn.execute_batch(TEXT_SCHEMA).expect("create text schema");
    conn.execute_batch(TEXT_DATA).expect("insert text rows");

    let mut stmt = conn
        .prepare(
            "INSERT INTO ComiketCircleWC (comiketNo, id, day, blockId, spaceNo, spaceNoSub, genreId, \
             circleName, circleKana, penName) VALUES (?1, ?2, 1, 1, ?3, 0, 100, ?4, '', '')",
        )
        .expect("prepare bulk insert");
    for i in 0..extra as i64 {
        stmt.execute(params![EVENT, BULK_FIRST_ID + i, 10 + i, format!("Bulk {}", i)])
            .expect("insert bulk circle");
    }
}

fn write_image_db(path: &Path) {
    let conn = Connection::open(path).expect("open fixture image db");
    conn.execute_batch(IMAGE_SCHEMA).expect("create image schema");

    for name in COMMON_NAMES {
        conn.execute(
            "INSERT INTO ComiketCommonImage (name, image) VALUES (?1, ?2)",
            params![name, png_bytes(4, 4)],
        )
        .expect("insert common image");
    }
    conn.execute(
        "INSERT INTO ComiketCommonImage (name, image) VALUES ('BROKEN', x'00010203')",
        [],
    )
    .expect("insert broken common image");

    for id in 1..=3i64 {
        conn.execute(
            "INSERT INTO ComiketCircleImage (id, cutImage) VALUES (?1, ?2)",
            params![id, png_bytes(2, 3)],
        )
        .expect("insert circle image");
    }
    conn.execute(
        "INSERT INTO ComiketCircleImage (id, cutImage) VALUES (4, x'deadbeef')",
        [],
    )
    .expect("insert corrupt circle image");
}
