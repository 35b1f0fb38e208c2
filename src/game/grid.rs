//! Grid model: pure coordinate math for the battle map.
//!
//! Stored positions are always integer grid cells. Pixel ("world") positions
//! only exist at the input boundary and depend on the client's current zoom
//! (cell size 20–60px), so converting never touches stored coordinates.
//!
//! None of these functions clamp. Callers that need an in-bounds cell use
//! [`GridBounds::clamp`] explicitly.

use serde::{Deserialize, Serialize};

/// Game units per cell used by the distance readout (5 ft squares).
pub const DEFAULT_UNITS_PER_CELL: u32 = 5;

/// An integer grid cell address. May be out of bounds until clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A pixel position on the rendered map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f64,
    pub y: f64,
}

impl WorldPos {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Map dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    pub width: u32,
    pub height: u32,
}

impl GridBounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as i64) < self.width as i64 && (pos.y as i64) < self.height as i64
    }

    /// Nearest in-bounds cell. A zero-sized map clamps everything to (0, 0).
    pub fn clamp(&self, pos: GridPos) -> GridPos {
        let max_x = self.width.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_y = self.height.saturating_sub(1).min(i32::MAX as u32) as i32;
        GridPos::new(pos.x.clamp(0, max_x), pos.y.clamp(0, max_y))
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of an in-bounds cell.
    pub fn index_of(&self, pos: GridPos) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.y as usize * self.width as usize + pos.x as usize)
        } else {
            None
        }
    }

    /// Every cell, row by row.
    pub fn cells(&self) -> impl Iterator<Item = GridPos> + use<> {
        let (width, height) = (self.width as i32, self.height as i32);
        (0..height).flat_map(move |y| (0..width).map(move |x| GridPos::new(x, y)))
    }
}

/// Convert a pixel position into the grid cell that contains it.
pub fn to_grid_coord(world: WorldPos, cell_size_px: f64) -> GridPos {
    GridPos::new(
        (world.x / cell_size_px).floor() as i32,
        (world.y / cell_size_px).floor() as i32,
    )
}

/// Convert a grid cell to the pixel position of its centre.
pub fn to_world_coord(grid: GridPos, cell_size_px: f64) -> WorldPos {
    WorldPos::new(
        (grid.x as f64 + 0.5) * cell_size_px,
        (grid.y as f64 + 0.5) * cell_size_px,
    )
}

/// Euclidean distance between two cell centres in grid cells.
pub fn cell_distance(a: GridPos, b: GridPos) -> f64 {
    let dx = (a.x as i64 - b.x as i64) as f64;
    let dy = (a.y as i64 - b.y as i64) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Distance in game units, rounded to the nearest integer (half rounds up).
pub fn distance_in_units(a: GridPos, b: GridPos, units_per_cell: u32) -> u32 {
    let raw = cell_distance(a, b) * units_per_cell as f64;
    (raw + 0.5).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn world_to_grid_floors() {
        assert_eq!(to_grid_coord(WorldPos::new(0.0, 0.0), 40.0), GridPos::new(0, 0));
        assert_eq!(to_grid_coord(WorldPos::new(39.9, 80.0), 40.0), GridPos::new(0, 2));
        assert_eq!(to_grid_coord(WorldPos::new(-1.0, 5.0), 40.0), GridPos::new(-1, 0));
    }

    #[test]
    fn grid_to_world_is_cell_centre() {
        assert_eq!(to_world_coord(GridPos::new(2, 3), 20.0), WorldPos::new(50.0, 70.0));
    }

    #[test]
    fn distance_examples() {
        let o = GridPos::new(5, 5);
        assert_eq!(distance_in_units(o, GridPos::new(5, 8), 5), 15);
        assert_eq!(distance_in_units(o, GridPos::new(5, 8), 1), 3);
        // sqrt(2) * 5 = 7.07
        assert_eq!(distance_in_units(o, GridPos::new(6, 6), 5), 7);
        // sqrt(8) = 2.83 -> 3
        assert_eq!(distance_in_units(o, GridPos::new(7, 7), 1), 3);
        // sqrt(13) = 3.61 -> 4
        assert_eq!(distance_in_units(o, GridPos::new(8, 7), 1), 4);
    }

    #[test]
    fn rounds_to_nearest_unit() {
        // sqrt(5) * 5 = 11.18
        assert_eq!(distance_in_units(GridPos::new(0, 0), GridPos::new(1, 2), 5), 11);
        // sqrt(2) * 12 = 16.97 -> 17
        assert_eq!(distance_in_units(GridPos::new(0, 0), GridPos::new(1, 1), 12), 17);
    }

    #[test]
    fn clamp_pulls_into_bounds() {
        let b = GridBounds::new(20, 15);
        assert_eq!(b.clamp(GridPos::new(-1, 5)), GridPos::new(0, 5));
        assert_eq!(b.clamp(GridPos::new(25, 30)), GridPos::new(19, 14));
        assert_eq!(b.clamp(GridPos::new(3, 3)), GridPos::new(3, 3));
        assert!(!b.contains(GridPos::new(20, 0)));
        assert!(b.contains(GridPos::new(19, 14)));
    }

    #[test]
    fn index_is_row_major() {
        let b = GridBounds::new(4, 3);
        assert_eq!(b.index_of(GridPos::new(1, 2)), Some(9));
        assert_eq!(b.index_of(GridPos::new(4, 0)), None);
        assert_eq!(b.cells().count(), 12);
    }

    proptest! {
        #[test]
        fn grid_world_round_trip(gx in 0i32..500, gy in 0i32..500, cell in 20.0f64..60.0) {
            let g = GridPos::new(gx, gy);
            prop_assert_eq!(to_grid_coord(to_world_coord(g, cell), cell), g);
        }

        #[test]
        fn distance_is_symmetric(ax in -100i32..100, ay in -100i32..100, bx in -100i32..100, by in -100i32..100) {
            let a = GridPos::new(ax, ay);
            let b = GridPos::new(bx, by);
            prop_assert_eq!(distance_in_units(a, b, 5), distance_in_units(b, a, 5));
        }
    }
}
