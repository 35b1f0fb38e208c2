//! Measurement tool, an ephemeral ruler between two cells.
//!
//! Two-click protocol: the first click anchors the start, the second sets the
//! end and produces a distance. A further click chains on: the previous end
//! becomes the new start and the clicked cell the new end. Purely local;
//! nothing here is ever persisted or synchronised.

use serde::Serialize;

use crate::game::grid::{GridPos, distance_in_units};

/// A completed ruler span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeasurementSpan {
    pub start: GridPos,
    pub end: GridPos,
    /// Distance in game units.
    pub distance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Inactive,
    Anchored(GridPos),
    Measured(MeasurementSpan),
}

/// One ruler per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementTool {
    units_per_cell: u32,
    phase: Phase,
}

impl MeasurementTool {
    pub fn new(units_per_cell: u32) -> Self {
        Self {
            units_per_cell,
            phase: Phase::Inactive,
        }
    }

    /// Register a click on `pos`. Returns the span once one is complete.
    pub fn click(&mut self, pos: GridPos) -> Option<MeasurementSpan> {
        let start = match self.phase {
            Phase::Inactive => {
                self.phase = Phase::Anchored(pos);
                return None;
            }
            Phase::Anchored(start) => start,
            Phase::Measured(span) => span.end,
        };
        let span = MeasurementSpan {
            start,
            end: pos,
            distance: distance_in_units(start, pos, self.units_per_cell),
        };
        self.phase = Phase::Measured(span);
        Some(span)
    }

    /// Start cell while waiting for the second click.
    pub fn anchor(&self) -> Option<GridPos> {
        match self.phase {
            Phase::Anchored(p) => Some(p),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<MeasurementSpan> {
        match self.phase {
            Phase::Measured(span) => Some(span),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Inactive
    }

    /// Tool switched off: forget everything.
    pub fn deactivate(&mut self) {
        self.phase = Phase::Inactive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_clicks_measure() {
        let mut tool = MeasurementTool::new(5);
        assert_eq!(tool.click(GridPos::new(0, 0)), None);
        assert_eq!(tool.anchor(), Some(GridPos::new(0, 0)));
        let span = tool.click(GridPos::new(0, 4)).unwrap();
        assert_eq!(span.distance, 20);
        assert_eq!(tool.span(), Some(span));
    }

    #[test]
    fn third_click_chains_from_previous_end() {
        let mut tool = MeasurementTool::new(5);
        tool.click(GridPos::new(0, 0));
        tool.click(GridPos::new(3, 0));
        let span = tool.click(GridPos::new(3, 4)).unwrap();
        assert_eq!(span.start, GridPos::new(3, 0));
        assert_eq!(span.end, GridPos::new(3, 4));
        assert_eq!(span.distance, 20);
    }

    #[test]
    fn deactivate_clears() {
        let mut tool = MeasurementTool::new(5);
        tool.click(GridPos::new(1, 1));
        assert!(tool.is_active());
        tool.deactivate();
        assert!(!tool.is_active());
        assert_eq!(tool.span(), None);
        // next click anchors again rather than measuring
        assert_eq!(tool.click(GridPos::new(2, 2)), None);
    }
}
