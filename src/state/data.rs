/// Shared data structures for the catalog snapshot
///
/// These structs represent the rows of the downloaded snapshot database
/// and flow between the storage layer, the query layer and the map.
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Event days are expressed in the organizer's local time (UTC+9).
pub const EVENT_UTC_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Pixel size and origin of a map raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapConfiguration {
    pub size: Size,
    pub origin: Point,
}

/// Geometry of the circle cut images inside the printed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircleCutConfiguration {
    pub size: Size,
    pub origin: Point,
    pub offset: Point,
}

/// Minimal reference to an event, as supplied by the event list API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventRef {
    pub id: i64,
    pub number: i64,
}

/// A row of `ComiketInfoWC`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub number: i64,
    pub name: String,
    pub cut_configuration: CircleCutConfiguration,
    pub map_configuration: MapConfiguration,
    pub hd_map_configuration: MapConfiguration,
}

/// A row of `ComiketDateWC`: one day of the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDate {
    pub event_number: i64,
    pub id: i64,
    pub date: NaiveDate,
}

impl EventDate {
    /// Midnight of this day in event-local time.
    pub fn starts_at(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(EVENT_UTC_OFFSET_SECS)?;
        let midnight = self.date.and_hms_opt(0, 0, 0)?;
        offset.from_local_datetime(&midnight).single()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    pub event_number: i64,
    pub id: i64,
    pub name: String,
    pub filename: String,
    pub all_filename: String,
    pub configuration: MapConfiguration,
    pub hd_configuration: MapConfiguration,
    pub rotation: i32,
}

impl Map {
    /// Hall this map raster belongs to, when the filename names one.
    pub fn hall(&self) -> Option<Hall> {
        Hall::from_code(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub event_number: i64,
    pub id: i64,
    pub name: String,
    pub area_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub event_number: i64,
    pub id: i64,
    pub name: String,
    pub code: i64,
    pub day: i64,
}

/// Links from `ComiketCircleExtend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedCircleInfo {
    pub event_number: i64,
    pub id: i64,
    /// Id used by the organizer's web catalog; map layouts are keyed by it.
    pub catalog_id: i64,
    pub twitter_url: Option<String>,
    pub pixiv_url: Option<String>,
    pub portal_url: Option<String>,
}

impl ExtendedCircleInfo {
    pub fn has_accessible_urls(&self) -> bool {
        self.twitter_url.is_some() || self.pixiv_url.is_some() || self.portal_url.is_some()
    }
}

/// A row of `ComiketCircleWC`, optionally joined with its extended info and block.
#[derive(Debug, Clone)]
pub struct Circle {
    pub event_number: i64,
    pub id: i64,
    pub page_number: i64,
    pub cut_index: i64,
    pub day: i64,
    pub block_id: i64,
    pub space_number: i64,
    /// 0, 1 or 2; rendered as a, b or c.
    pub space_number_suffix: i64,
    pub genre_id: i64,
    pub name: String,
    pub name_kana: String,
    pub pen_name: String,
    pub book_name: String,
    pub url: Option<String>,
    pub mail_address: String,
    pub description: String,
    pub memo: String,
    pub update_id: i64,
    pub update_data: String,
    pub circle_ms_url: Option<String>,
    pub rss: String,
    pub update_flag: i64,
    pub extended: Option<ExtendedCircleInfo>,
    pub block: Option<Block>,
}

impl Circle {
    /// Zero-padded space number plus suffix letter, e.g. `07b`.
    pub fn space_number_combined(&self) -> String {
        let mut label = format!("{:02}", self.space_number);
        if let Some(letter) = suffix_letter(self.space_number_suffix) {
            label.push(letter);
        }
        label
    }

    /// Block name plus combined space number, e.g. `あ07b`. None without a joined block.
    pub fn space_name(&self) -> Option<String> {
        self.block
            .as_ref()
            .map(|block| format!("{}{}", block.name, self.space_number_combined()))
    }
}

// Identity is (id, event), not the full row.
impl PartialEq for Circle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.event_number == other.event_number
    }
}

impl Eq for Circle {}

/// Letter used to render a space-suffix.
pub fn suffix_letter(suffix: i64) -> Option<char> {
    match suffix {
        0 => Some('a'),
        1 => Some('b'),
        2 => Some('c'),
        _ => None,
    }
}

/// Side of a booth cell on which the `a` space sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutType {
    AOnLeft,
    AOnBottom,
    AOnRight,
    AOnTop,
    Unknown,
}

impl LayoutType {
    pub fn from_value(value: i64) -> Self {
        match value {
            1 => LayoutType::AOnLeft,
            2 => LayoutType::AOnBottom,
            3 => LayoutType::AOnRight,
            4 => LayoutType::AOnTop,
            _ => LayoutType::Unknown,
        }
    }

    /// RIGHT/BOTTOM cells enumerate their spaces back to front.
    pub fn is_reversed(self) -> bool {
        matches!(self, LayoutType::AOnRight | LayoutType::AOnBottom)
    }

    /// True when the cell is cut into side-by-side columns.
    pub fn slices_vertically(self) -> bool {
        !matches!(self, LayoutType::AOnTop | LayoutType::AOnBottom)
    }
}

/// A row of `ComiketLayoutWC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub event_number: i64,
    pub block_id: i64,
    pub space_number: i64,
    pub position: Point,
    pub hd_position: Point,
    pub layout: LayoutType,
    pub map_id: i64,
    pub hall_id: i64,
}

/// A layout cell projected onto one resolution tier plus the catalog ids seated there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutCatalogMapping {
    pub block_id: i64,
    pub space_number: i64,
    pub position: Point,
    pub layout: LayoutType,
    pub catalog_ids: Vec<i64>,
}

impl LayoutCatalogMapping {
    pub fn cell_key(&self) -> (i64, i64) {
        (self.block_id, self.space_number)
    }

    pub fn view_id(&self) -> String {
        format!("{},{}", self.block_id, self.space_number)
    }
}

/// Exhibition halls that have their own map raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hall {
    East123,
    East456,
    East7,
    East78,
    West12,
    West34,
    South12,
    South34,
}

impl Hall {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "E123" => Some(Hall::East123),
            "E456" => Some(Hall::East456),
            "E7" => Some(Hall::East7),
            "E78" => Some(Hall::East78),
            "W12" => Some(Hall::West12),
            "W34" => Some(Hall::West34),
            "S12" => Some(Hall::South12),
            "S34" => Some(Hall::South34),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Hall::East123 => "E123",
            Hall::East456 => "E456",
            Hall::East7 => "E7",
            Hall::East78 => "E78",
            Hall::West12 => "W12",
            Hall::West34 => "W34",
            Hall::South12 => "S12",
            Hall::South34 => "S34",
        }
    }
}
