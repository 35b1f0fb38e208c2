//! Turn tracker: initiative order, rounds and the per-turn countdown.
//!
//! ```text
//! Idle ──start──▶ Active ◀──resume── Paused
//!   ▲               │ ──pause──────────▲
//!   └────end────────┴──────end─────────┘
//! ```
//!
//! Only the game master drives transitions; that check lives in the access
//! gate, not here. The countdown is a pure recomputation of
//! `turn_ends_at - now`, so a backgrounded client self-corrects on the next
//! tick. Every transition bumps `epoch`, which lets a timer that was armed
//! for an older turn recognise it is stale.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::game::roster::{Combatant, Roster};

/// Selectable turn lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum TurnDuration {
    Thirty,
    #[default]
    Sixty,
    TwoMinutes,
    FiveMinutes,
}

impl TurnDuration {
    pub fn seconds(self) -> u64 {
        match self {
            TurnDuration::Thirty => 30,
            TurnDuration::Sixty => 60,
            TurnDuration::TwoMinutes => 120,
            TurnDuration::FiveMinutes => 300,
        }
    }

    pub fn as_chrono(self) -> Duration {
        Duration::seconds(self.seconds() as i64)
    }
}

impl TryFrom<u64> for TurnDuration {
    type Error = EngineError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        match secs {
            30 => Ok(TurnDuration::Thirty),
            60 => Ok(TurnDuration::Sixty),
            120 => Ok(TurnDuration::TwoMinutes),
            300 => Ok(TurnDuration::FiveMinutes),
            other => Err(EngineError::InvalidTurnDuration(other)),
        }
    }
}

impl From<TurnDuration> for u64 {
    fn from(d: TurnDuration) -> Self {
        d.seconds()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    #[default]
    Idle,
    Active,
    Paused,
}

/// What a transition did, for event emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnChange {
    Started { round: u32, combatant: Combatant },
    Advanced { round: u32, combatant: Combatant },
    Paused,
    Resumed,
    Ended,
    DurationSet(TurnDuration),
}

/// Full tracker state. This is also the synchronised payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    pub phase: CombatPhase,
    pub combatants: Vec<Combatant>,
    pub current: usize,
    /// 0 while idle, otherwise ≥ 1.
    pub round: u32,
    pub turn_started_at: Option<DateTime<Utc>>,
    pub turn_ends_at: Option<DateTime<Utc>>,
    pub duration: TurnDuration,
    pub epoch: u64,
}

impl TurnState {
    pub fn is_idle(&self) -> bool {
        self.phase == CombatPhase::Idle
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        if self.is_idle() {
            None
        } else {
            self.combatants.get(self.current)
        }
    }

    /// Time left on the current turn, floored at zero. `None` when idle.
    /// While paused the clock is frozen at the full duration, because resume
    /// restarts the turn from the full duration anyway.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.phase {
            CombatPhase::Idle => None,
            CombatPhase::Paused => Some(self.duration.as_chrono()),
            CombatPhase::Active => self
                .turn_ends_at
                .map(|end| (end - now).max(Duration::zero())),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.phase == CombatPhase::Active && self.turn_ends_at.is_some_and(|end| now >= end)
    }

    /// Start combat with the roster's players in roster order.
    pub fn start_combat(&mut self, roster: &Roster, now: DateTime<Utc>) -> EngineResult<Option<TurnChange>> {
        if !self.is_idle() {
            return Ok(None);
        }
        let combatants = roster.combatants();
        if combatants.is_empty() {
            return Err(EngineError::NoCombatants);
        }
        self.phase = CombatPhase::Active;
        self.combatants = combatants;
        self.current = 0;
        self.round = 1;
        self.restart_clock(now);
        Ok(Some(TurnChange::Started {
            round: self.round,
            combatant: self.combatants[0].clone(),
        }))
    }

    /// Advance to the next combatant. Wrapping back to the first starts a new
    /// round. A paused combat is reactivated.
    pub fn next_turn(&mut self, now: DateTime<Utc>) -> Option<TurnChange> {
        if self.is_idle() || self.combatants.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.combatants.len();
        if self.current == 0 {
            self.round += 1;
        }
        self.phase = CombatPhase::Active;
        self.restart_clock(now);
        Some(TurnChange::Advanced {
            round: self.round,
            combatant: self.combatants[self.current].clone(),
        })
    }

    pub fn pause(&mut self) -> Option<TurnChange> {
        if self.phase != CombatPhase::Active {
            return None;
        }
        self.phase = CombatPhase::Paused;
        self.epoch += 1;
        Some(TurnChange::Paused)
    }

    /// Resume a paused combat. The turn restarts from the full configured
    /// duration, not from whatever was left when it was paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<TurnChange> {
        if self.phase != CombatPhase::Paused {
            return None;
        }
        self.phase = CombatPhase::Active;
        self.restart_clock(now);
        Some(TurnChange::Resumed)
    }

    /// Clear everything back to idle. The configured duration survives.
    pub fn end_combat(&mut self) -> Option<TurnChange> {
        if self.is_idle() {
            return None;
        }
        let duration = self.duration;
        let epoch = self.epoch + 1;
        *self = TurnState {
            duration,
            epoch,
            ..TurnState::default()
        };
        Some(TurnChange::Ended)
    }

    /// Change the turn length. Takes effect the next time the clock restarts.
    pub fn set_duration(&mut self, duration: TurnDuration) -> Option<TurnChange> {
        if self.duration == duration {
            return None;
        }
        self.duration = duration;
        Some(TurnChange::DurationSet(duration))
    }

    fn restart_clock(&mut self, now: DateTime<Utc>) {
        self.turn_started_at = Some(now);
        self.turn_ends_at = Some(now + self.duration.as_chrono());
        self.epoch += 1;
    }
}
