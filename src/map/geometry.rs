use cgmath::Point2;

use crate::state::data::{LayoutCatalogMapping, LayoutType, Point};

/// Axis-aligned rectangle in layout pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: Point2<f32>) -> bool {
        point.x >= self.x && point.x < self.max_x() && point.y >= self.y && point.y < self.max_y()
    }
}

/// Square occupied by a layout cell.
pub fn cell_rect(position: Point, space_size: f32) -> Rect {
    Rect::new(position.x as f32, position.y as f32, space_size, space_size)
}

/// Strip index for a space-suffix in a cell hosting `count` records.
///
/// Cells with the `a` space on the right or bottom list their records back to
/// front, so the index is mirrored there.
pub fn slice_index(layout: LayoutType, suffix: i64, count: usize) -> Option<usize> {
    let suffix = usize::try_from(suffix).ok()?;
    if suffix >= count {
        return None;
    }
    if layout.is_reversed() {
        Some(count - 1 - suffix)
    } else {
        Some(suffix)
    }
}

/// Cut a cell into `count` equal strips, in left-to-right or top-to-bottom order.
pub fn slice_rects(cell: Rect, layout: LayoutType, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let n = count as f32;
    (0..count)
        .map(|i| {
            let i = i as f32;
            if layout.slices_vertically() {
                let width = cell.width / n;
                Rect::new(cell.x + width * i, cell.y, width, cell.height)
            } else {
                let height = cell.height / n;
                Rect::new(cell.x, cell.y + height * i, cell.width, height)
            }
        })
        .collect()
}

/// The strip a given space-suffix occupies.
pub fn slice_rect(cell: Rect, layout: LayoutType, count: usize, suffix: i64) -> Option<Rect> {
    let index = slice_index(layout, suffix, count)?;
    slice_rects(cell, layout, count).get(index).copied()
}

/// First layout cell containing `point`.
pub fn hit_test(
    mappings: &[LayoutCatalogMapping],
    point: Point2<f32>,
    space_size: f32,
) -> Option<&LayoutCatalogMapping> {
    mappings
        .iter()
        .find(|mapping| cell_rect(mapping.position, space_size).contains(point))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn mapping(block_id: i64, x: i32, y: i32) -> LayoutCatalogMapping {
        LayoutCatalogMapping {
            block_id,
            space_number: 1,
            position: Point { x, y },
            layout: LayoutType::AOnLeft,
            catalog_ids: vec![block_id * 10],
        }
    }

    #[test]
    fn test_slices_tile_the_cell() {
        let cell = Rect::new(100.0, 200.0, 40.0, 40.0);
        for layout in [
            LayoutType::AOnLeft,
            LayoutType::AOnRight,
            LayoutType::AOnTop,
            LayoutType::AOnBottom,
            LayoutType::Unknown,
        ] {
            for count in 1..=3 {
                let strips = slice_rects(cell, layout, count);
                assert_eq!(strips.len(), count);

                let area: f32 = strips.iter().map(|r| r.width * r.height).sum();
                assert!((area - cell.width * cell.height).abs() < 0.01);

                assert!((strips[0].x - cell.x).abs() < EPS);
                assert!((strips[0].y - cell.y).abs() < EPS);
                let last = strips[count - 1];
                assert!((last.max_x() - cell.max_x()).abs() < EPS);
                assert!((last.max_y() - cell.max_y()).abs() < EPS);

                for pair in strips.windows(2) {
                    if layout.slices_vertically() {
                        assert!((pair[0].max_x() - pair[1].x).abs() < EPS);
                        assert_eq!(pair[0].height, cell.height);
                    } else {
                        assert!((pair[0].max_y() - pair[1].y).abs() < EPS);
                        assert_eq!(pair[0].width, cell.width);
                    }
                }
            }
        }
    }

    #[test]
    fn test_reversed_layouts_mirror_index() {
        for count in 1..=3usize {
            for suffix in 0..count as i64 {
                let natural = slice_index(LayoutType::AOnLeft, suffix, count).unwrap();
                let mirrored = slice_index(LayoutType::AOnRight, suffix, count).unwrap();
                assert_eq!(natural, suffix as usize);
                assert_eq!(mirrored, count - 1 - natural);
                assert_eq!(
                    slice_index(LayoutType::AOnTop, suffix, count),
                    Some(natural)
                );
                assert_eq!(
                    slice_index(LayoutType::AOnBottom, suffix, count),
                    Some(mirrored)
                );
            }
        }
        assert_eq!(slice_index(LayoutType::AOnLeft, 2, 2), None);
        assert_eq!(slice_index(LayoutType::AOnLeft, -1, 2), None);
    }

    #[test]
    fn test_slice_rect_for_right_layout() {
        let cell = Rect::new(0.0, 0.0, 40.0, 40.0);
        let a = slice_rect(cell, LayoutType::AOnRight, 2, 0).unwrap();
        assert_eq!(a, Rect::new(20.0, 0.0, 20.0, 40.0));
        let b = slice_rect(cell, LayoutType::AOnBottom, 2, 1).unwrap();
        assert_eq!(b, Rect::new(0.0, 0.0, 40.0, 20.0));
    }

    #[test]
    fn test_hit_test_half_open() {
        let cells = vec![mapping(1, 100, 100), mapping(2, 140, 100)];
        let size = 40.0;

        assert_eq!(hit_test(&cells, Point2::new(100.0, 100.0), size).map(|m| m.block_id), Some(1));
        assert_eq!(hit_test(&cells, Point2::new(139.9, 139.9), size).map(|m| m.block_id), Some(1));
        assert_eq!(hit_test(&cells, Point2::new(140.0, 120.0), size).map(|m| m.block_id), Some(2));
        assert!(hit_test(&cells, Point2::new(150.0, 140.0), size).is_none());
        assert!(hit_test(&cells, Point2::new(99.0, 120.0), size).is_none());
    }
}
