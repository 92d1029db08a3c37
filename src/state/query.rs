/// Filter and search queries over the attributes database.
///
/// Statements are assembled by [`SelectBuilder`]: column names are static
/// strings and every value travels as a bound parameter, so variable-length
/// IN lists never splice user data into SQL.
use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::debug;

use super::data::{EventDate, LayoutCatalogMapping, LayoutEntry};
use super::library::{CatalogStore, MAX_BIND_PARAMS};
use crate::map::ResolutionTier;

/// Search terms shorter than this (after trimming) do not run a search.
pub const MIN_SEARCH_CHARS: usize = 2;

/// Parameterized SELECT assembled from ANDed predicates.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    select: &'static str,
    conditions: Vec<String>,
    params: Vec<Value>,
    order_by: Option<&'static str>,
}

impl SelectBuilder {
    pub fn new(select: &'static str) -> Self {
        Self {
            select,
            conditions: Vec::new(),
            params: Vec::new(),
            order_by: None,
        }
    }

    /// `column IN (?, ?, ...)`. An empty list matches nothing.
    pub fn where_in(mut self, column: &'static str, values: &[i64]) -> Self {
        if values.is_empty() {
            self.conditions.push("0".to_string());
            return self;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.conditions.push(format!("{} IN ({})", column, placeholders));
        self.params
            .extend(values.iter().map(|v| Value::Integer(*v)));
        self
    }

    pub fn where_eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(format!("{} = ?", column));
        self.params.push(value.into());
        self
    }

    /// `(a LIKE ? ESCAPE '\' OR b LIKE ? ...)` with `needle` matched as a substring.
    pub fn where_contains_any(mut self, columns: &[&'static str], needle: &str) -> Self {
        let pattern = format!("%{}%", escape_like(needle));
        let clauses: Vec<String> = columns
            .iter()
            .map(|column| format!("{} LIKE ? ESCAPE '\\'", column))
            .collect();
        self.conditions.push(format!("({})", clauses.join(" OR ")));
        for _ in columns {
            self.params.push(Value::Text(pattern.clone()));
        }
        self
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn sql(&self) -> String {
        let mut sql = self.select.to_string();
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if let Some(order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn query_map<T, F>(&self, conn: &Connection, mut f: F) -> rusqlite::Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = conn.prepare(&self.sql())?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), |row| f(row))?;
        rows.collect()
    }

    /// Run the query and read the first column as integers.
    pub fn query_ids(&self, conn: &Connection) -> rusqlite::Result<Vec<i64>> {
        self.query_map(conn, |row| row.get(0))
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// The user's current browse selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub map_id: Option<i64>,
    pub genre_ids: Vec<i64>,
    pub block_ids: Vec<i64>,
    pub day_id: Option<i64>,
}

impl CatalogFilter {
    pub fn is_empty(&self) -> bool {
        self.map_id.is_none()
            && self.day_id.is_none()
            && self.genre_ids.is_empty()
            && self.block_ids.is_empty()
    }

    /// Stable string identifying this selection; list order does not matter.
    pub fn fingerprint(&self) -> String {
        format!(
            "M{},D{},G[{}],B[{}]",
            self.map_id.unwrap_or(-1),
            self.day_id.unwrap_or(-1),
            sorted_join(&self.genre_ids),
            sorted_join(&self.block_ids),
        )
    }
}

fn sorted_join(ids: &[i64]) -> String {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Dynamic filter, search and cross-reference queries on a [`CatalogStore`].
#[derive(Debug, Clone, Copy)]
pub struct FilterQueryEngine<'a> {
    store: &'a CatalogStore,
}

impl<'a> FilterQueryEngine<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store }
    }

    /// Circle ids matching every active predicate, ascending.
    ///
    /// An empty filter returns nothing: browsing needs at least one dimension.
    pub fn circle_ids(&self, filter: &CatalogFilter) -> Vec<i64> {
        if filter.is_empty() {
            debug!("empty filter, returning no circles");
            return Vec::new();
        }

        self.store.with_text("circle_ids", |conn| {
            let mut query = SelectBuilder::new("SELECT id FROM ComiketCircleWC").order_by("id ASC");

            if let Some(map_id) = filter.map_id {
                let mapped = map_block_ids(conn, map_id)?;
                if mapped.is_empty() {
                    return Ok(Vec::new());
                }
                query = query.where_in("blockId", &mapped);
            }
            if !filter.genre_ids.is_empty() {
                query = query.where_in("genreId", &filter.genre_ids);
            }
            if !filter.block_ids.is_empty() {
                query = query.where_in("blockId", &filter.block_ids);
            }
            if let Some(day_id) = filter.day_id {
                query = query.where_eq("day", day_id);
            }

            query.query_ids(conn)
        })
    }

    /// Genres present on a map on a given day.
    pub fn genre_ids(&self, map_id: i64, day_id: i64) -> Vec<i64> {
        self.store.with_text("genre_ids", |conn| {
            let mapped = map_block_ids(conn, map_id)?;
            if mapped.is_empty() {
                return Ok(Vec::new());
            }
            SelectBuilder::new("SELECT DISTINCT genreId FROM ComiketCircleWC")
                .where_in("blockId", &mapped)
                .where_eq("day", day_id)
                .order_by("genreId ASC")
                .query_ids(conn)
        })
    }

    /// Blocks present on a map on a given day, optionally narrowed to genres.
    pub fn block_ids(&self, map_id: i64, day_id: i64, genre_ids: &[i64]) -> Vec<i64> {
        self.store.with_text("block_ids", |conn| {
            let mapped = map_block_ids(conn, map_id)?;
            if mapped.is_empty() {
                return Ok(Vec::new());
            }
            let mut query = SelectBuilder::new("SELECT DISTINCT blockId FROM ComiketCircleWC")
                .where_in("blockId", &mapped)
                .where_eq("day", day_id)
                .order_by("blockId ASC");
            if !genre_ids.is_empty() {
                query = query.where_in("genreId", genre_ids);
            }
            query.query_ids(conn)
        })
    }

    /// Substring search over circle name, kana and pen name.
    ///
    /// `None` means no search is active (term shorter than two characters),
    /// which is different from `Some(vec![])`.
    pub fn search(&self, term: &str) -> Option<Vec<i64>> {
        let trimmed = term.trim();
        if trimmed.chars().count() < MIN_SEARCH_CHARS {
            return None;
        }
        Some(self.store.with_text("search", |conn| {
            SelectBuilder::new("SELECT id FROM ComiketCircleWC")
                .where_contains_any(&["circleName", "circleKana", "penName"], trimmed)
                .order_by("id ASC")
                .query_ids(conn)
        }))
    }

    /// Circle ids for web catalog ids.
    pub fn circle_ids_for_catalog_ids(&self, catalog_ids: &[i64]) -> Vec<i64> {
        if catalog_ids.is_empty() {
            return Vec::new();
        }
        self.store.with_text("circle_ids_for_catalog_ids", |conn| {
            let mut ids = Vec::new();
            for chunk in catalog_ids.chunks(MAX_BIND_PARAMS) {
                ids.extend(
                    SelectBuilder::new("SELECT id FROM ComiketCircleExtend")
                        .where_in("WCId", chunk)
                        .order_by("id ASC")
                        .query_ids(conn)?,
                );
            }
            Ok(ids)
        })
    }

    /// Web catalog ids for circle ids.
    pub fn catalog_ids_for_circle_ids(&self, circle_ids: &[i64]) -> Vec<i64> {
        if circle_ids.is_empty() {
            return Vec::new();
        }
        self.store.with_text("catalog_ids_for_circle_ids", |conn| {
            let mut ids = Vec::new();
            for chunk in circle_ids.chunks(MAX_BIND_PARAMS) {
                ids.extend(
                    SelectBuilder::new("SELECT WCId FROM ComiketCircleExtend")
                        .where_in("id", chunk)
                        .order_by("id ASC")
                        .query_ids(conn)?,
                );
            }
            Ok(ids)
        })
    }

    /// Space-suffix per web catalog id. Missing rows default to 0.
    pub fn space_number_suffixes(&self, catalog_ids: &[i64]) -> HashMap<i64, i64> {
        if catalog_ids.is_empty() {
            return HashMap::new();
        }
        let mut found: HashMap<i64, i64> = self.store.with_text("space_number_suffixes", |conn| {
            let mut found = HashMap::with_capacity(catalog_ids.len());
            for chunk in catalog_ids.chunks(MAX_BIND_PARAMS) {
                let pairs = SelectBuilder::new(
                    "SELECT e.WCId, c.spaceNoSub FROM ComiketCircleWC c \
                     INNER JOIN ComiketCircleExtend e ON c.id = e.id",
                )
                .where_in("e.WCId", chunk)
                .query_map(conn, |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or_default()))
                })?;
                found.extend(pairs);
            }
            Ok(found)
        });
        for id in catalog_ids {
            found.entry(*id).or_insert(0);
        }
        found
    }

    /// The map a block is drawn on.
    pub fn map_id_for_block(&self, block_id: i64) -> Option<i64> {
        self.store
            .with_text("map_id_for_block", |conn| {
                SelectBuilder::new("SELECT mapId FROM ComiketMappingWC")
                    .where_eq("blockId", block_id)
                    .order_by("mapId ASC")
                    .query_ids(conn)
            })
            .into_iter()
            .next()
    }

    pub fn genre_name(&self, genre_id: i64) -> Option<String> {
        self.store
            .with_text("genre_name", |conn| {
                SelectBuilder::new("SELECT name FROM ComiketGenreWC")
                    .where_eq("id", genre_id)
                    .query_map(conn, |row| row.get::<_, String>(0))
            })
            .into_iter()
            .next()
    }

    /// Days of `event_number` keyed by their id.
    pub fn dates_by_id(&self, event_number: i64) -> HashMap<i64, EventDate> {
        self.store
            .dates_for_event(event_number)
            .into_iter()
            .map(|date| (date.id, date))
            .collect()
    }

    /// Layout cells of a map projected onto the resolution tier, with no ids attached yet.
    pub fn layout_mappings(&self, map_id: i64, tier: ResolutionTier) -> Vec<LayoutCatalogMapping> {
        self.store
            .layouts(map_id)
            .into_iter()
            .map(|entry| project_layout(entry, tier))
            .collect()
    }

    /// Attach the web catalog ids seated in each cell on `day_id`.
    ///
    /// Cells with nobody seated on that day are dropped. Ids within a cell are
    /// ordered by circle id.
    pub fn attach_catalog_ids(
        &self,
        mappings: Vec<LayoutCatalogMapping>,
        day_id: i64,
    ) -> Vec<LayoutCatalogMapping> {
        if mappings.is_empty() {
            return Vec::new();
        }

        let mut block_ids: Vec<i64> = mappings.iter().map(|m| m.block_id).collect();
        let mut space_numbers: Vec<i64> = mappings.iter().map(|m| m.space_number).collect();
        block_ids.sort_unstable();
        block_ids.dedup();
        space_numbers.sort_unstable();
        space_numbers.dedup();

        let rows: Vec<(i64, i64, Option<i64>)> = self.store.with_text("attach_catalog_ids", |conn| {
            SelectBuilder::new(
                "SELECT c.blockId, c.spaceNo, e.WCId FROM ComiketCircleWC c \
                 LEFT OUTER JOIN ComiketCircleExtend e ON c.id = e.id",
            )
            .where_in("c.blockId", &block_ids)
            .where_in("c.spaceNo", &space_numbers)
            .where_eq("c.day", day_id)
            .order_by("c.id ASC")
            .query_map(conn, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        });

        let mut seated: HashMap<(i64, i64), Vec<i64>> = HashMap::new();
        for (block_id, space_number, catalog_id) in rows {
            if let Some(catalog_id) = catalog_id {
                seated
                    .entry((block_id, space_number))
                    .or_default()
                    .push(catalog_id);
            }
        }

        mappings
            .into_iter()
            .filter_map(|mut mapping| {
                let ids = seated.remove(&mapping.cell_key())?;
                mapping.catalog_ids = ids;
                Some(mapping)
            })
            .collect()
    }
}

fn map_block_ids(conn: &Connection, map_id: i64) -> rusqlite::Result<Vec<i64>> {
    SelectBuilder::new("SELECT DISTINCT blockId FROM ComiketMappingWC")
        .where_eq("mapId", map_id)
        .order_by("blockId ASC")
        .query_ids(conn)
}

fn project_layout(entry: LayoutEntry, tier: ResolutionTier) -> LayoutCatalogMapping {
    let position = match tier {
        ResolutionTier::Standard => entry.position,
        ResolutionTier::High => entry.hd_position,
    };
    LayoutCatalogMapping {
        block_id: entry.block_id,
        space_number: entry.space_number,
        position,
        layout: entry.layout,
        catalog_ids: Vec::new(),
    }
}
