/// Decoded image caching for the image snapshot file.
///
/// Common images (cover, block banners, map rasters, genre overlays) are
/// loaded once as raw bytes and decoded on first use. Circle cut images are
/// decoded on demand at reduced color depth. Both share one LRU bounded by
/// decoded bytes.
pub mod cache;
pub mod decode;

pub use cache::{ImageCache, ImageKey};
pub use decode::{DecodedImage, PixelFormat};

use crate::map::ResolutionTier;
use crate::state::data::Hall;

pub const COVER_IMAGE: &str = "0001";
pub const JIKO_IMAGE: &str = "JIKO";

pub fn block_image_name(block_id: i64) -> String {
    format!("B{}", block_id)
}

pub fn map_image_name(hall: Hall, day: i64, tier: ResolutionTier) -> String {
    let prefix = match tier {
        ResolutionTier::High => "LWMP",
        ResolutionTier::Standard => "WMP",
    };
    format!("{}{}{}", prefix, day, hall.code())
}

pub fn genre_image_name(hall: Hall, day: i64, tier: ResolutionTier) -> String {
    let prefix = match tier {
        ResolutionTier::High => "LWGR",
        ResolutionTier::Standard => "WGR",
    };
    format!("{}{}{}", prefix, day, hall.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_image_names() {
        assert_eq!(block_image_name(12), "B12");
        assert_eq!(map_image_name(Hall::East123, 1, ResolutionTier::High), "LWMP1E123");
        assert_eq!(map_image_name(Hall::West34, 2, ResolutionTier::Standard), "WMP2W34");
        assert_eq!(genre_image_name(Hall::South12, 3, ResolutionTier::High), "LWGR3S12");
        assert_eq!(genre_image_name(Hall::East7, 1, ResolutionTier::Standard), "WGR1E7");
    }
}
