//! Engine configuration.
//!
//! Defaults match the table conventions (20×15 map, 40 px cells, 5 units per
//! cell, 60 s turns, 500 ms drag debounce). `from_env` overrides any of them
//! from `BATTLEMAP_*` variables, reading a `.env` file first if present.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::game::grid::{DEFAULT_UNITS_PER_CELL, GridBounds};
use crate::game::turns::TurnDuration;

/// Cell zoom range in pixels.
pub const MIN_CELL_SIZE_PX: f64 = 20.0;
pub const MAX_CELL_SIZE_PX: f64 = 60.0;

/// Largest map edge, in cells.
pub const MAX_MAP_SIDE: u32 = 500;

/// Why `bounds` cannot be used as a map, if it cannot.
pub fn map_size_error(bounds: GridBounds) -> Option<String> {
    if bounds.width == 0 || bounds.height == 0 {
        Some(format!("map must be at least 1x1, got {}x{}", bounds.width, bounds.height))
    } else if bounds.width > MAX_MAP_SIDE || bounds.height > MAX_MAP_SIDE {
        Some(format!(
            "map must be at most {}x{}, got {}x{}",
            MAX_MAP_SIDE, MAX_MAP_SIDE, bounds.width, bounds.height
        ))
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub map: MapConfig,
    pub turn: TurnConfig,
    pub sync: SyncConfig,
    pub fog: FogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub width: u32,
    pub height: u32,
    pub cell_size_px: f64,
    pub units_per_cell: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 15,
            cell_size_px: 40.0,
            units_per_cell: DEFAULT_UNITS_PER_CELL,
        }
    }
}

impl MapConfig {
    pub fn bounds(&self) -> GridBounds {
        GridBounds::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    pub duration: TurnDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiescence before a drag position is persisted.
    pub debounce_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff: f64,
    pub retry_jitter_ms: u64,
    /// Capacity of the outbound engine event channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            retry_attempts: 3,
            retry_delay_ms: 100,
            retry_backoff: 2.0,
            retry_jitter_ms: 50,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogConfig {
    /// Radius in cells revealed around a moved player token.
    pub auto_reveal_radius: u32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self { auto_reveal_radius: 3 }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> EngineResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Configuration(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Load from the environment and validate.
    pub fn from_env() -> EngineResult<Self> {
        dotenv::dotenv().ok();
        let d = Self::default();

        let duration_secs: u64 = env_or("BATTLEMAP_TURN_SECONDS", d.turn.duration.seconds())?;
        let config = Self {
            map: MapConfig {
                width: env_or("BATTLEMAP_MAP_WIDTH", d.map.width)?,
                height: env_or("BATTLEMAP_MAP_HEIGHT", d.map.height)?,
                cell_size_px: env_or("BATTLEMAP_CELL_SIZE_PX", d.map.cell_size_px)?,
                units_per_cell: env_or("BATTLEMAP_UNITS_PER_CELL", d.map.units_per_cell)?,
            },
            turn: TurnConfig {
                duration: TurnDuration::try_from(duration_secs)
                    .map_err(|e| EngineError::Configuration(e.to_string()))?,
            },
            sync: SyncConfig {
                debounce_ms: env_or("BATTLEMAP_DEBOUNCE_MS", d.sync.debounce_ms)?,
                retry_attempts: env_or("BATTLEMAP_RETRY_ATTEMPTS", d.sync.retry_attempts)?,
                retry_delay_ms: env_or("BATTLEMAP_RETRY_DELAY_MS", d.sync.retry_delay_ms)?,
                retry_backoff: env_or("BATTLEMAP_RETRY_BACKOFF", d.sync.retry_backoff)?,
                retry_jitter_ms: env_or("BATTLEMAP_RETRY_JITTER_MS", d.sync.retry_jitter_ms)?,
                event_capacity: env_or("BATTLEMAP_EVENT_CAPACITY", d.sync.event_capacity)?,
            },
            fog: FogConfig {
                auto_reveal_radius: env_or("BATTLEMAP_AUTO_REVEAL_RADIUS", d.fog.auto_reveal_radius)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if let Some(reason) = map_size_error(self.map.bounds()) {
            return Err(EngineError::Configuration(reason));
        }
        if self.fog.auto_reveal_radius > MAX_MAP_SIDE {
            return Err(EngineError::Configuration(format!(
                "auto-reveal radius {} exceeds {}",
                self.fog.auto_reveal_radius, MAX_MAP_SIDE
            )));
        }
        if !(MIN_CELL_SIZE_PX..=MAX_CELL_SIZE_PX).contains(&self.map.cell_size_px) {
            return Err(EngineError::Configuration(format!(
                "cell size {} px outside {}-{} px",
                self.map.cell_size_px, MIN_CELL_SIZE_PX, MAX_CELL_SIZE_PX
            )));
        }
        if self.map.units_per_cell == 0 {
            return Err(EngineError::Configuration("units per cell must be positive".into()));
        }
        if self.sync.retry_attempts == 0 {
            return Err(EngineError::Configuration("retry attempts must be at least 1".into()));
        }
        if self.sync.retry_backoff < 1.0 {
            return Err(EngineError::Configuration("retry backoff must be >= 1.0".into()));
        }
        if self.sync.event_capacity == 0 {
            return Err(EngineError::Configuration("event capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = EngineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.map.bounds(), GridBounds::new(20, 15));
        assert_eq!(c.turn.duration.seconds(), 60);
        assert_eq!(c.sync.debounce_ms, 500);
        assert_eq!(c.fog.auto_reveal_radius, 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = EngineConfig::default();
        c.map.cell_size_px = 80.0;
        assert!(matches!(c.validate(), Err(EngineError::Configuration(_))));

        let mut c = EngineConfig::default();
        c.map.width = 0;
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.sync.retry_attempts = 0;
        assert!(c.validate().is_err());

        let mut c = EngineConfig::default();
        c.map.width = MAX_MAP_SIDE + 1;
        assert!(matches!(c.validate(), Err(EngineError::Configuration(_))));

        let mut c = EngineConfig::default();
        c.fog.auto_reveal_radius = u32::MAX;
        assert!(c.validate().is_err());
    }

    #[test]
    fn map_size_limits() {
        assert_eq!(map_size_error(GridBounds::new(20, 15)), None);
        assert_eq!(map_size_error(GridBounds::new(MAX_MAP_SIDE, MAX_MAP_SIDE)), None);
        assert!(map_size_error(GridBounds::new(0, 4)).is_some());
        assert!(map_size_error(GridBounds::new(MAX_MAP_SIDE + 1, 1)).is_some());
        assert!(map_size_error(GridBounds::new(u32::MAX, u32::MAX)).is_some());
    }

    #[test]
    fn config_serializes_turn_duration_as_seconds() {
        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(json["turn"]["duration"], 60);
    }
}
