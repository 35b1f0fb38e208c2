//! Session state container.
//!
//! One explicit value per client holding everything the battle map shows:
//! map bounds, tokens, fog, turn tracker, roster, and the set of entities
//! whose optimistic value has not been confirmed by the store yet. The sync
//! layer owns it and lends it out by reference; there is no ambient global.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::game::fog::FogGrid;
use crate::game::grid::{GridBounds, GridPos};
use crate::game::roster::Roster;
use crate::game::tokens::{Token, TokenId, TokenRegistry};
use crate::game::turns::TurnState;

/// Addressable unit of synchronisation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Token(TokenId),
    Fog,
    Turn,
    Map,
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::Token(id) => write!(f, "token:{}", id),
            EntityKey::Fog => f.write_str("fog"),
            EntityKey::Turn => f.write_str("turn"),
            EntityKey::Map => f.write_str("map"),
        }
    }
}

/// Everything a client knows about the live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub bounds: GridBounds,
    pub tokens: TokenRegistry,
    pub fog: FogGrid,
    pub turn: TurnState,
    pub roster: Roster,
    /// Entities written optimistically and not yet confirmed by a broadcast.
    pub stale: BTreeSet<EntityKey>,
    /// Highest store revision reconciled so far.
    pub revision: u64,
    pub confirmed: Confirmed,
}

/// Last values the store confirmed. Broadcasts are diffed against these,
/// not against optimistic local state, so the client that made a change
/// reports it the same way as everyone else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmed {
    pub positions: BTreeMap<TokenId, GridPos>,
    pub turn: TurnState,
}

impl Confirmed {
    fn from_state(tokens: &TokenRegistry, turn: &TurnState) -> Self {
        Self {
            positions: tokens.iter().map(|t| (t.id.clone(), t.position)).collect(),
            turn: turn.clone(),
        }
    }
}

impl SessionState {
    pub fn new(bounds: GridBounds) -> Self {
        Self {
            bounds,
            tokens: TokenRegistry::new(),
            fog: FogGrid::new(bounds),
            turn: TurnState::default(),
            roster: Roster::default(),
            stale: BTreeSet::new(),
            revision: 0,
            confirmed: Confirmed::default(),
        }
    }

    /// Change the map size: fog is reinitialised hidden and every token is
    /// pulled back inside the new bounds.
    pub fn resize(&mut self, bounds: GridBounds) {
        self.bounds = bounds;
        self.fog.resize(bounds);
        self.tokens.clamp_all(bounds);
        for pos in self.confirmed.positions.values_mut() {
            *pos = bounds.clamp(*pos);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            bounds: self.bounds,
            tokens: self.tokens.iter().cloned().collect(),
            fog: self.fog.clone(),
            turn: self.turn.clone(),
            revision: self.revision,
        }
    }

    /// Replace the synchronised parts of the state with an authoritative
    /// snapshot. The roster comes from the session service and is kept.
    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        let roster = std::mem::take(&mut self.roster);
        *self = SessionState::from(snapshot);
        self.roster = roster;
    }

    pub fn is_stale(&self, key: &EntityKey) -> bool {
        self.stale.contains(key)
    }
}

/// The full authoritative state, as fetched on join or reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub bounds: GridBounds,
    pub tokens: Vec<Token>,
    pub fog: FogGrid,
    pub turn: TurnState,
    pub revision: u64,
}

impl From<SessionSnapshot> for SessionState {
    fn from(snapshot: SessionSnapshot) -> Self {
        let mut state = SessionState::new(snapshot.bounds);
        for token in snapshot.tokens {
            state.tokens.upsert(token, snapshot.bounds);
        }
        if snapshot.fog.bounds() == snapshot.bounds {
            state.fog = snapshot.fog;
        }
        state.turn = snapshot.turn;
        state.revision = snapshot.revision;
        state.confirmed = Confirmed::from_state(&state.tokens, &state.turn);
        state
    }
}
