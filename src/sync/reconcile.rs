//! Broadcast reconciliation.
//!
//! [`reconcile`] is a pure reducer: it folds one store [`ChangeEvent`] into a
//! [`SessionState`] and reports the side effects the caller has to carry out
//! (re-fetches, auto-reveal, outbound events). It never performs I/O, so the
//! same event can be replayed against the same state with the same result.
//!
//! Rules, in order:
//!
//! 1. An event at or below the reconciled revision is already reflected and
//!    is skipped.
//! 2. A revision gap means events were missed; ask for a full resync.
//! 3. The broadcast value replaces the local one and clears its stale flag.
//! 4. An update for a token the client has never seen is a desync: re-fetch
//!    that token instead of patching.

use tracing::{debug, warn};

use crate::game::grid::GridPos;
use crate::game::roster::UserId;
use crate::game::state::{EntityKey, SessionState};
use crate::game::tokens::TokenId;
use crate::game::turns::TurnState;
use crate::sync::envelope::{ChangeEvent, FogChange, Mutation};
use crate::sync::events::EngineEvent;

/// Work the caller must do after a reconcile.
#[derive(Debug, Clone, PartialEq)]
pub enum Followup {
    /// Fetch the authoritative value of one entity.
    Refetch(EntityKey),
    /// Fetch the full snapshot.
    Resync,
    /// An owned token moved; the game master's client may reveal around it.
    AutoReveal {
        token_id: TokenId,
        owner: UserId,
        position: GridPos,
    },
    Emit(EngineEvent),
}

#[derive(Debug)]
pub struct Reconciled {
    pub state: SessionState,
    pub followups: Vec<Followup>,
}

pub fn reconcile(mut state: SessionState, event: &ChangeEvent) -> Reconciled {
    let mut followups = Vec::new();

    if event.revision <= state.revision {
        debug!("skipping r{} (at r{})", event.revision, state.revision);
        return Reconciled { state, followups };
    }
    if event.revision > state.revision + 1 {
        warn!(
            "revision gap: at r{}, received r{} - resyncing",
            state.revision, event.revision
        );
        followups.push(Followup::Resync);
        return Reconciled { state, followups };
    }

    let mutation = match Mutation::try_from(&event.envelope) {
        Ok(m) => m,
        Err(e) => {
            warn!("undecodable change r{}: {} - resyncing", event.revision, e);
            followups.push(Followup::Resync);
            return Reconciled { state, followups };
        }
    };

    let key = mutation.key();
    state.stale.remove(&key);
    let bounds = state.bounds;

    match mutation {
        Mutation::PlaceToken(token) => {
            state.confirmed.positions.insert(token.id.clone(), bounds.clamp(token.position));
            state.tokens.upsert(token, bounds);
        }
        Mutation::UpdateToken(token) => {
            if !state.tokens.contains(&token.id) {
                warn!("update for unknown {} - re-fetching", key);
                followups.push(Followup::Refetch(key));
            } else {
                let position = bounds.clamp(token.position);
                let previous = state.confirmed.positions.insert(token.id.clone(), position);
                if previous != Some(position) {
                    followups.push(Followup::Emit(EngineEvent::TokenMoved {
                        token_id: token.id.clone(),
                        x: position.x,
                        y: position.y,
                    }));
                    if let Some(owner) = token.owner.clone() {
                        followups.push(Followup::AutoReveal {
                            token_id: token.id.clone(),
                            owner,
                            position,
                        });
                    }
                }
                state.tokens.upsert(token, bounds);
            }
        }
        Mutation::RemoveToken(id) => {
            state.confirmed.positions.remove(&id);
            // Already gone locally is fine.
            let _ = state.tokens.remove(&id);
        }
        Mutation::Fog(FogChange::Cells { cells, revealed }) => state.fog.apply_cells(&cells, revealed),
        Mutation::Fog(FogChange::All { revealed: true }) => state.fog.reveal_all(),
        Mutation::Fog(FogChange::All { revealed: false }) => state.fog.hide_all(),
        Mutation::Fog(FogChange::Replace { grid }) => {
            if grid.bounds() == bounds {
                state.fog = grid;
            } else {
                followups.push(Followup::Resync);
            }
        }
        Mutation::Turn(turn) => {
            followups.extend(turn_events(&state.confirmed.turn, &turn).into_iter().map(Followup::Emit));
            state.confirmed.turn = turn.clone();
            state.turn = turn;
        }
        Mutation::Resize(new_bounds) => {
            if new_bounds != bounds {
                state.resize(new_bounds);
            }
        }
    }

    state.revision = event.revision;
    Reconciled { state, followups }
}

/// Events implied by going from one confirmed turn state to the next.
fn turn_events(old: &TurnState, new: &TurnState) -> Option<EngineEvent> {
    match (old.is_idle(), new.is_idle()) {
        (true, true) => None,
        (false, true) => Some(EngineEvent::CombatEnded),
        (true, false) => new.current_combatant().map(|c| EngineEvent::CombatStarted {
            round: new.round,
            combatant_id: c.user_id.clone(),
        }),
        (false, false) => {
            if (old.round, old.current) == (new.round, new.current) {
                None
            } else {
                new.current_combatant().map(|c| EngineEvent::TurnAdvanced {
                    round: new.round,
                    combatant_id: c.user_id.clone(),
                })
            }
        }
    }
}
