use std::sync::Arc;

use cgmath::Point2;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::geometry::{self, Rect};
use super::highlight::Blinker;
use super::popover::{place_popover, PopoverGeometry, PopoverPlacement};
use super::ResolutionTier;
use crate::state::data::{LayoutCatalogMapping, Map};
use crate::state::library::CatalogStore;
use crate::state::query::FilterQueryEngine;

/// Canvas extent in layout pixels at the active resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

/// The popover opened by tapping a layout cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PopoverData {
    pub mapping: LayoutCatalogMapping,
    pub ids: Vec<i64>,
    /// True when the cell lists its records back to front.
    pub reversed: bool,
    pub source_rect: Rect,
}

impl PopoverData {
    pub fn id(&self) -> String {
        self.mapping.view_id()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightData {
    pub rect: Rect,
    pub visible: bool,
}

/// The circle a highlight request points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightTarget {
    pub block_id: i64,
    pub space_number: i64,
    pub space_number_suffix: i64,
}

/// Observable mapper state. Each field is a watch channel the UI subscribes to.
pub(crate) struct MapperChannels {
    pub(crate) canvas: watch::Sender<CanvasSize>,
    pub(crate) layouts: watch::Sender<Arc<Vec<LayoutCatalogMapping>>>,
    pub(crate) popover: watch::Sender<Option<PopoverData>>,
    pub(crate) popover_position: watch::Sender<Option<PopoverPlacement>>,
    pub(crate) scroll_to: watch::Sender<Option<Point2<f32>>>,
    pub(crate) highlight: watch::Sender<Option<HighlightData>>,
    pub(crate) highlight_target: watch::Sender<Option<HighlightTarget>>,
}

impl MapperChannels {
    fn new() -> Self {
        Self {
            canvas: watch::channel(CanvasSize::default()).0,
            layouts: watch::channel(Arc::new(Vec::new())).0,
            popover: watch::channel(None).0,
            popover_position: watch::channel(None).0,
            scroll_to: watch::channel(None).0,
            highlight: watch::channel(None).0,
            highlight_target: watch::channel(None).0,
        }
    }
}

struct View {
    tier: ResolutionTier,
    zoom: f32,
    geometry: PopoverGeometry,
}

/// The SpatialMapper turns layout rows into canvas rectangles and drives the
/// popover and highlight state of the floor map.
pub struct SpatialMapper {
    channels: Arc<MapperChannels>,
    view: Mutex<View>,
    blinker: Blinker,
}

impl SpatialMapper {
    pub fn new(tier: ResolutionTier) -> Self {
        Self {
            channels: Arc::new(MapperChannels::new()),
            view: Mutex::new(View {
                tier,
                zoom: 1.0,
                geometry: PopoverGeometry::default(),
            }),
            blinker: Blinker::default(),
        }
    }

    pub fn tier(&self) -> ResolutionTier {
        self.view.lock().tier
    }

    /// Switch resolution tier. Layouts must be reloaded for the new coordinates.
    pub fn set_tier(&self, tier: ResolutionTier) {
        let changed = {
            let mut view = self.view.lock();
            let changed = view.tier != tier;
            view.tier = tier;
            changed
        };
        if changed {
            debug!(?tier, "resolution tier changed");
            self.close_popover();
            self.clear_highlight();
        }
    }

    pub fn space_size(&self) -> f32 {
        self.tier().space_size()
    }

    pub fn zoom(&self) -> f32 {
        self.view.lock().zoom
    }

    pub fn set_zoom(&self, zoom: f32) {
        if zoom > 0.0 && zoom.is_finite() {
            self.view.lock().zoom = zoom;
        } else {
            warn!(zoom, "ignoring invalid zoom");
        }
    }

    pub fn set_popover_geometry(&self, geometry: PopoverGeometry) {
        self.view.lock().geometry = geometry;
    }

    pub fn canvas_size(&self) -> CanvasSize {
        *self.channels.canvas.borrow()
    }

    pub fn set_canvas_size(&self, width: f32, height: f32) {
        self.channels.canvas.send_replace(CanvasSize { width, height });
    }

    pub fn layouts(&self) -> Arc<Vec<LayoutCatalogMapping>> {
        Arc::clone(&self.channels.layouts.borrow())
    }

    /// Replace the layout cells. Any open popover or highlight refers to the old set and is closed.
    pub fn set_layouts(&self, layouts: Vec<LayoutCatalogMapping>) {
        debug!(cells = layouts.len(), "layout cells updated");
        self.close_popover();
        self.clear_highlight();
        self.channels.layouts.send_replace(Arc::new(layouts));
    }

    /// Load the cells of `map` for `day_id` at the current tier and size the canvas to the map raster.
    pub fn load_map(&self, store: &CatalogStore, map: &Map, day_id: i64) {
        let tier = self.tier();
        let configuration = match tier {
            ResolutionTier::Standard => map.configuration,
            ResolutionTier::High => map.hd_configuration,
        };
        let engine = FilterQueryEngine::new(store);
        let layouts = engine.attach_catalog_ids(engine.layout_mappings(map.id, tier), day_id);
        info!(map_id = map.id, day_id, cells = layouts.len(), "loaded map layout");

        self.set_canvas_size(configuration.size.width as f32, configuration.size.height as f32);
        self.set_layouts(layouts);
    }

    /// [`Self::load_map`] with the queries on the blocking pool.
    pub async fn load_map_async(&self, store: Arc<CatalogStore>, map: Map, day_id: i64) {
        let tier = self.tier();
        let map_id = map.id;
        let result = tokio::task::spawn_blocking(move || {
            let engine = FilterQueryEngine::new(&store);
            engine.attach_catalog_ids(engine.layout_mappings(map_id, tier), day_id)
        })
        .await;

        match result {
            Ok(layouts) => {
                let configuration = match tier {
                    ResolutionTier::Standard => map.configuration,
                    ResolutionTier::High => map.hd_configuration,
                };
                self.set_canvas_size(configuration.size.width as f32, configuration.size.height as f32);
                self.set_layouts(layouts);
            }
            Err(e) => warn!(error = %e, map_id, "layout load task failed"),
        }
    }

    // ========== Popover ==========

    /// Handle a tap in canvas units. Returns the popover now open, if any.
    ///
    /// Tapping the cell whose popover is open closes it; tapping empty space
    /// closes any popover.
    pub fn tap(&self, point: Point2<f32>) -> Option<PopoverData> {
        let layouts = self.layouts();
        let space_size = self.space_size();

        let Some(mapping) = geometry::hit_test(&layouts, point, space_size) else {
            self.close_popover();
            return None;
        };

        let already_open = self
            .channels
            .popover
            .borrow()
            .as_ref()
            .map(|open| open.id() == mapping.view_id())
            .unwrap_or(false);
        if already_open {
            self.close_popover();
            return None;
        }

        let source_rect = geometry::cell_rect(mapping.position, space_size);
        let popover = PopoverData {
            mapping: mapping.clone(),
            ids: mapping.catalog_ids.clone(),
            reversed: mapping.layout.is_reversed(),
            source_rect,
        };
        self.open_popover(popover.clone());
        Some(popover)
    }

    fn open_popover(&self, popover: PopoverData) {
        let placement = {
            let view = self.view.lock();
            place_popover(popover.source_rect, self.canvas_size(), view.zoom, &view.geometry)
        };
        debug!(cell = %popover.id(), side = ?placement.side, "opening popover");
        self.channels.popover_position.send_replace(Some(placement));
        self.channels.popover.send_replace(Some(popover));
    }

    pub fn close_popover(&self) {
        self.channels.popover.send_replace(None);
        self.channels.popover_position.send_replace(None);
    }

    pub fn popover(&self) -> Option<PopoverData> {
        self.channels.popover.borrow().clone()
    }

    pub fn popover_position(&self) -> Option<PopoverPlacement> {
        *self.channels.popover_position.borrow()
    }

    // ========== Highlight ==========

    /// Highlight one circle's strip, scroll to it and start the blink sequence.
    ///
    /// Returns false when no loaded cell hosts the target; the caller can then
    /// switch map or day and retry.
    pub fn highlight(&self, target: HighlightTarget) -> bool {
        let layouts = self.layouts();
        let Some(mapping) = layouts.iter().find(|mapping| {
            mapping.block_id == target.block_id && mapping.space_number == target.space_number
        }) else {
            debug!(?target, "highlight target not on the current map");
            return false;
        };

        let count = mapping.catalog_ids.len();
        let cell = geometry::cell_rect(mapping.position, self.space_size());
        let Some(rect) = geometry::slice_rect(cell, mapping.layout, count, target.space_number_suffix)
        else {
            debug!(?target, count, "highlight target has no strip in its cell");
            return false;
        };

        self.close_popover();
        self.channels.scroll_to.send_replace(Some(rect.center()));
        self.channels
            .highlight
            .send_replace(Some(HighlightData { rect, visible: true }));
        self.channels.highlight_target.send_replace(Some(target));
        self.blinker.restart(Arc::clone(&self.channels));
        true
    }

    pub fn clear_highlight(&self) {
        self.blinker.cancel();
        self.channels.highlight.send_replace(None);
        self.channels.highlight_target.send_replace(None);
    }

    pub fn highlight_data(&self) -> Option<HighlightData> {
        *self.channels.highlight.borrow()
    }

    pub fn highlight_target(&self) -> Option<HighlightTarget> {
        *self.channels.highlight_target.borrow()
    }

    pub fn scroll_to(&self) -> Option<Point2<f32>> {
        *self.channels.scroll_to.borrow()
    }

    /// Acknowledge that the view finished scrolling to the requested point.
    pub fn clear_scroll(&self) {
        self.channels.scroll_to.send_replace(None);
    }

    // ========== Subscriptions ==========

    pub fn subscribe_canvas(&self) -> watch::Receiver<CanvasSize> {
        self.channels.canvas.subscribe()
    }

    pub fn subscribe_layouts(&self) -> watch::Receiver<Arc<Vec<LayoutCatalogMapping>>> {
        self.channels.layouts.subscribe()
    }

    pub fn subscribe_popover(&self) -> watch::Receiver<Option<PopoverData>> {
        self.channels.popover.subscribe()
    }

    pub fn subscribe_popover_position(&self) -> watch::Receiver<Option<PopoverPlacement>> {
        self.channels.popover_position.subscribe()
    }

    pub fn subscribe_scroll(&self) -> watch::Receiver<Option<Point2<f32>>> {
        self.channels.scroll_to.subscribe()
    }

    pub fn subscribe_highlight(&self) -> watch::Receiver<Option<HighlightData>> {
        self.channels.highlight.subscribe()
    }

    pub fn subscribe_highlight_target(&self) -> watch::Receiver<Option<HighlightTarget>> {
        self.channels.highlight_target.subscribe()
    }
}

impl std::fmt::Debug for SpatialMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialMapper")
            .field("tier", &self.tier())
            .field("canvas", &self.canvas_size())
            .field("cells", &self.layouts().len())
            .finish()
    }
}
