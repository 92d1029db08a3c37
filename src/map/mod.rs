/// Floor-map layout: cell geometry, hit-testing, popover placement and the
/// highlight blink sequence.
pub mod geometry;
pub mod highlight;
pub mod mapper;
pub mod popover;

pub use geometry::Rect;
pub use mapper::{CanvasSize, HighlightData, HighlightTarget, PopoverData, SpatialMapper};
pub use popover::{place_popover, PopoverGeometry, PopoverPlacement, PopoverSide};

use serde::Deserialize;

/// Which of the two pixel coordinate systems in the layout table is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionTier {
    Standard,
    #[default]
    High,
}

impl ResolutionTier {
    /// Edge length of one layout cell in layout pixels.
    pub fn space_size(self) -> f32 {
        match self {
            ResolutionTier::Standard => 20.0,
            ResolutionTier::High => 40.0,
        }
    }
}
