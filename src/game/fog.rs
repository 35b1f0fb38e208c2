//! Fog-of-war overlay: one "revealed" bit per grid cell.
//!
//! The grid always matches the current map size; resizing throws every cell
//! back to hidden. Player clients render hidden cells as fog, the game
//! master sees through it.
//!
//! ## Wire form
//!
//! ```text
//! { "width": 20, "height": 15, "cells": "<base64url bitset>" }
//! bit i  = cell (i % width, i / width), LSB first within each byte
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, EngineResult};
use crate::game::grid::{GridBounds, GridPos, distance_in_units};
use crate::game::roster::Role;

/// Per-cell visibility bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FogGrid {
    bounds: GridBounds,
    revealed: Vec<bool>,
}

impl FogGrid {
    /// A fully hidden grid.
    pub fn new(bounds: GridBounds) -> Self {
        Self {
            bounds,
            revealed: vec![false; bounds.cell_count()],
        }
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    /// Reinitialise for a new map size. All cells become hidden.
    pub fn resize(&mut self, bounds: GridBounds) {
        *self = Self::new(bounds);
    }

    pub fn is_revealed(&self, pos: GridPos) -> bool {
        self.bounds
            .index_of(pos)
            .map(|i| self.revealed[i])
            .unwrap_or(false)
    }

    /// Whether a viewer with `role` can see into the cell.
    pub fn visible_to(&self, role: Role, pos: GridPos) -> bool {
        role == Role::GameMaster || self.is_revealed(pos)
    }

    /// Set one cell. Returns whether the cell changed.
    pub fn toggle_cell(&mut self, pos: GridPos, revealed: bool) -> EngineResult<bool> {
        let i = self
            .bounds
            .index_of(pos)
            .ok_or(EngineError::InvalidCoordinates { x: pos.x, y: pos.y })?;
        let changed = self.revealed[i] != revealed;
        self.revealed[i] = revealed;
        Ok(changed)
    }

    /// Cells within `radius` of `center`, measured centre to centre in whole
    /// cells with the grid distance rounding. Out-of-map centres are allowed;
    /// only in-bounds cells are returned.
    pub fn cells_in_radius(&self, center: GridPos, radius: u32) -> Vec<GridPos> {
        // Walk only the part of the bounding box that lies on the map.
        let r = radius as i64;
        let (cx, cy) = (center.x as i64, center.y as i64);
        let x_lo = (cx - r).max(0);
        let x_hi = (cx + r).min(self.bounds.width as i64 - 1);
        let y_lo = (cy - r).max(0);
        let y_hi = (cy + r).min(self.bounds.height as i64 - 1);

        let mut cells = Vec::new();
        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                let pos = GridPos::new(x as i32, y as i32);
                if distance_in_units(center, pos, 1) <= radius {
                    cells.push(pos);
                }
            }
        }
        cells
    }

    /// Reveal every cell within `radius` of `center`. Returns the cells that
    /// were newly revealed.
    pub fn reveal_radius(&mut self, center: GridPos, radius: u32) -> Vec<GridPos> {
        let mut newly = Vec::new();
        for pos in self.cells_in_radius(center, radius) {
            if let Some(i) = self.bounds.index_of(pos) {
                if !self.revealed[i] {
                    self.revealed[i] = true;
                    newly.push(pos);
                }
            }
        }
        newly
    }

    pub fn reveal_all(&mut self) {
        self.revealed.iter_mut().for_each(|c| *c = true);
    }

    pub fn hide_all(&mut self) {
        self.revealed.iter_mut().for_each(|c| *c = false);
    }

    /// Set several cells at once, skipping any outside the map.
    pub fn apply_cells(&mut self, cells: &[GridPos], revealed: bool) {
        for &pos in cells {
            if let Some(i) = self.bounds.index_of(pos) {
                self.revealed[i] = revealed;
            }
        }
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed.iter().filter(|c| **c).count()
    }

    pub fn revealed_cells(&self) -> Vec<GridPos> {
        self.bounds
            .cells()
            .filter(|p| self.is_revealed(*p))
            .collect()
    }

    /// Pack into the base64 bitset used on the wire.
    pub fn encode_cells(&self) -> String {
        let mut bytes = vec![0u8; self.revealed.len().div_ceil(8)];
        for (i, _) in self.revealed.iter().enumerate().filter(|(_, r)| **r) {
            bytes[i / 8] |= 1 << (i % 8);
        }
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Rebuild from the wire bitset.
    pub fn decode_cells(bounds: GridBounds, cells_b64: &str) -> EngineResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cells_b64)
            .map_err(|e| EngineError::Validation(format!("fog bitset decode error: {}", e)))?;
        let count = bounds.cell_count();
        if bytes.len() != count.div_ceil(8) {
            return Err(EngineError::Validation(format!(
                "fog bitset holds {} bytes, expected {} for a {}x{} map",
                bytes.len(),
                count.div_ceil(8),
                bounds.width,
                bounds.height
            )));
        }
        let revealed = (0..count).map(|i| bytes[i / 8] & (1 << (i % 8)) != 0).collect();
        Ok(Self { bounds, revealed })
    }
}

#[derive(Serialize, Deserialize)]
struct FogWire {
    width: u32,
    height: u32,
    cells: String,
}

impl Serialize for FogGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FogWire {
            width: self.bounds.width,
            height: self.bounds.height,
            cells: self.encode_cells(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FogGrid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = FogWire::deserialize(deserializer)?;
        FogGrid::decode_cells(GridBounds::new(wire.width, wire.height), &wire.cells)
            .map_err(serde::de::Error::custom)
    }
}

/// GM paint brush. Applies one cell at a time along a pointer drag and
/// skips cells that already have the brush's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FogPaint {
    pub reveal: bool,
    last: Option<GridPos>,
}

impl FogPaint {
    pub fn new(reveal: bool) -> Self {
        Self { reveal, last: None }
    }

    /// Paint the cell under the pointer. Returns the cell if it changed.
    pub fn stroke(&mut self, fog: &mut FogGrid, pos: GridPos) -> Option<GridPos> {
        if self.last == Some(pos) {
            return None;
        }
        self.last = Some(pos);
        match fog.toggle_cell(pos, self.reveal) {
            Ok(true) => Some(pos),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> FogGrid {
        FogGrid::new(GridBounds::new(20, 15))
    }

    #[test]
    fn reveal_radius_three_from_five_five() {
        let mut fog = grid();
        fog.reveal_radius(GridPos::new(5, 5), 3);
        assert!(fog.is_revealed(GridPos::new(5, 8)));
        assert!(!fog.is_revealed(GridPos::new(5, 9)));
        assert!(fog.is_revealed(GridPos::new(7, 7)));
        assert!(!fog.is_revealed(GridPos::new(8, 7)));
        assert!(fog.is_revealed(GridPos::new(2, 5)));
    }

    #[test]
    fn reveal_radius_near_edge_stays_in_bounds() {
        let mut fog = grid();
        let newly = fog.reveal_radius(GridPos::new(0, 0), 2);
        assert!(newly.iter().all(|p| p.x >= 0 && p.y >= 0));
        assert!(fog.is_revealed(GridPos::new(0, 2)));
        assert!(fog.is_revealed(GridPos::new(1, 1)));
    }

    #[test]
    fn huge_radius_reveals_the_whole_map() {
        let mut fog = grid();
        let newly = fog.reveal_radius(GridPos::new(5, 5), u32::MAX);
        assert_eq!(newly.len(), 300);

        let mut all = grid();
        all.reveal_all();
        assert_eq!(fog, all);
    }

    #[test]
    fn radius_around_far_off_centre_is_empty() {
        let fog = grid();
        assert!(fog.cells_in_radius(GridPos::new(i32::MIN, i32::MAX), 10).is_empty());
        assert!(fog.cells_in_radius(GridPos::new(-3, 5), 2).is_empty());
    }

    #[test]
    fn toggle_reports_change_and_rejects_out_of_bounds() {
        let mut fog = grid();
        assert_eq!(fog.toggle_cell(GridPos::new(3, 3), true), Ok(true));
        assert_eq!(fog.toggle_cell(GridPos::new(3, 3), true), Ok(false));
        assert!(fog.toggle_cell(GridPos::new(20, 0), true).is_err());
    }

    #[test]
    fn reveal_and_hide_all() {
        let mut fog = grid();
        fog.reveal_all();
        assert_eq!(fog.revealed_count(), 300);
        fog.hide_all();
        assert_eq!(fog.revealed_count(), 0);
    }

    #[test]
    fn resize_hides_everything() {
        let mut fog = grid();
        fog.reveal_all();
        fog.resize(GridBounds::new(10, 10));
        assert_eq!(fog.bounds(), GridBounds::new(10, 10));
        assert_eq!(fog.revealed_count(), 0);
    }

    #[test]
    fn gm_sees_through_fog() {
        let fog = grid();
        assert!(fog.visible_to(Role::GameMaster, GridPos::new(1, 1)));
        assert!(!fog.visible_to(Role::Player, GridPos::new(1, 1)));
    }

    #[test]
    fn wire_form_preserves_cells() {
        let mut fog = FogGrid::new(GridBounds::new(7, 3));
        fog.toggle_cell(GridPos::new(6, 2), true).unwrap();
        fog.toggle_cell(GridPos::new(0, 1), true).unwrap();
        let json = serde_json::to_string(&fog).unwrap();
        assert!(json.contains("\"width\":7"));
        let back: FogGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fog);
    }

    #[test]
    fn wire_form_rejects_wrong_length() {
        let json = r#"{"width":20,"height":15,"cells":"AA"}"#;
        assert!(serde_json::from_str::<FogGrid>(json).is_err());
    }

    #[test]
    fn paint_is_idempotent_per_cell() {
        let mut fog = grid();
        let mut brush = FogPaint::new(true);
        assert_eq!(brush.stroke(&mut fog, GridPos::new(1, 1)), Some(GridPos::new(1, 1)));
        assert_eq!(brush.stroke(&mut fog, GridPos::new(1, 1)), None);
        assert_eq!(brush.stroke(&mut fog, GridPos::new(2, 1)), Some(GridPos::new(2, 1)));
        // pointer comes back over an already revealed cell
        assert_eq!(brush.stroke(&mut fog, GridPos::new(1, 1)), None);
        assert_eq!(fog.revealed_count(), 2);

        let mut eraser = FogPaint::new(false);
        assert_eq!(eraser.stroke(&mut fog, GridPos::new(2, 1)), Some(GridPos::new(2, 1)));
        assert_eq!(eraser.stroke(&mut fog, GridPos::new(-3, 1)), None);
        assert_eq!(fog.revealed_count(), 1);
    }

    proptest! {
        #[test]
        fn reveal_radius_is_idempotent(cx in -5i32..25, cy in -5i32..20, r in 0u32..8) {
            let mut once = grid();
            once.reveal_radius(GridPos::new(cx, cy), r);
            let mut twice = once.clone();
            let newly = twice.reveal_radius(GridPos::new(cx, cy), r);
            prop_assert!(newly.is_empty());
            prop_assert_eq!(once, twice);
        }
    }
}
