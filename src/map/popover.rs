/// Collision-avoiding placement of the circle popover next to a highlighted cell.
///
/// Candidates are tried in priority order; each carries its own feasibility
/// check. Whatever wins is clamped into the canvas minus the edge padding.
use cgmath::Point2;

use super::geometry::Rect;
use super::mapper::CanvasSize;

pub const POPOVER_WIDTH: f32 = 240.0;
/// Two 70px cut images plus 16px padding on each side and an 8px gap.
pub const POPOVER_HEIGHT: f32 = 16.0 * 2.0 + 70.0 * 2.0 + 8.0;
pub const POPOVER_MIN_HEIGHT: f32 = 150.0;
pub const POPOVER_DISTANCE: f32 = 8.0;
pub const POPOVER_EDGE_PADDING: f32 = 16.0;

/// Popover dimensions in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopoverGeometry {
    pub width: f32,
    pub height: f32,
    pub min_height: f32,
    pub distance: f32,
    pub edge_padding: f32,
}

impl Default for PopoverGeometry {
    fn default() -> Self {
        Self {
            width: POPOVER_WIDTH,
            height: POPOVER_HEIGHT,
            min_height: POPOVER_MIN_HEIGHT,
            distance: POPOVER_DISTANCE,
            edge_padding: POPOVER_EDGE_PADDING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopoverSide {
    Below,
    Above,
    Right,
    Left,
    /// Nothing fit; placed right of the cell and clamped.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopoverPlacement {
    /// Popover center in canvas units.
    pub center: Point2<f32>,
    pub side: PopoverSide,
    pub width: f32,
    pub height: f32,
}

impl PopoverPlacement {
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.center.x - self.width / 2.0,
            self.center.y - self.height / 2.0,
            self.width,
            self.height,
        )
    }
}

/// Place a popover beside `source` on a canvas viewed at `zoom`.
///
/// Screen-space sizes are divided by `zoom` so the popover keeps its on-screen
/// size while the canvas is scaled. The height never drops below `min_height`
/// canvas units.
pub fn place_popover(
    source: Rect,
    canvas: CanvasSize,
    zoom: f32,
    geometry: &PopoverGeometry,
) -> PopoverPlacement {
    let zoom = if zoom > 0.0 { zoom } else { 1.0 };
    let width = geometry.width / zoom;
    let height = (geometry.height / zoom).max(geometry.min_height);
    let distance = geometry.distance / zoom;
    let pad = geometry.edge_padding / zoom;

    let center = source.center();
    let min_offset_x = source.width / 2.0 + distance + width / 2.0;
    let min_offset_y = source.height / 2.0 + distance + height / 2.0;

    let fits_right = canvas.width - pad - (center.x + min_offset_x + width / 2.0) >= 0.0;
    let fits_left = (center.x - min_offset_x - width / 2.0) - pad >= 0.0;
    let fits_below = canvas.height - pad - (center.y + min_offset_y + height / 2.0) >= 0.0;
    let fits_above = (center.y - min_offset_y - height / 2.0) - pad >= 0.0;
    let near_top = center.y < canvas.height * 0.3;
    let near_bottom = center.y > canvas.height * 0.7;

    let clamp_y = |y: f32| clamp_span(y, pad + height / 2.0, canvas.height - pad - height / 2.0);

    let below = Point2::new(center.x, center.y + min_offset_y);
    let above = Point2::new(center.x, center.y - min_offset_y);
    let right = Point2::new(center.x + min_offset_x, clamp_y(center.y));
    let left = Point2::new(center.x - min_offset_x, clamp_y(center.y));

    let candidates = [
        (near_top && fits_below, PopoverSide::Below, below),
        (near_bottom && fits_above, PopoverSide::Above, above),
        (fits_right, PopoverSide::Right, right),
        (fits_left, PopoverSide::Left, left),
        (fits_below, PopoverSide::Below, below),
        (fits_above, PopoverSide::Above, above),
    ];

    let (side, position) = candidates
        .iter()
        .find(|(feasible, _, _)| *feasible)
        .map(|(_, side, position)| (*side, *position))
        .unwrap_or((
            PopoverSide::Fallback,
            Point2::new(center.x + min_offset_x, center.y),
        ));

    PopoverPlacement {
        center: Point2::new(
            clamp_span(position.x, pad + width / 2.0, canvas.width - pad - width / 2.0),
            clamp_span(position.y, pad + height / 2.0, canvas.height - pad - height / 2.0),
        ),
        side,
        width,
        height,
    }
}

/// Clamp into `[lo, hi]`; centers on the span when it is empty.
fn clamp_span(value: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        (lo + hi) / 2.0
    } else {
        value.max(lo).min(hi)
    }
}
