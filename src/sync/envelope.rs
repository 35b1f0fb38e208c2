//! Wire records exchanged with the store.
//!
//! A [`SyncEnvelope`] is the transport-only shape (`entity`, `operation`,
//! JSON `payload`). Inside the engine everything is a typed [`Mutation`];
//! the two convert into each other at the store boundary.
//!
//! | entity | operation | payload                    |
//! |--------|-----------|----------------------------|
//! | token  | insert    | `Token`                    |
//! | token  | update    | `Token` (full value, LWW)  |
//! | token  | delete    | `{ "id": TokenId }`        |
//! | fog    | update    | `FogChange`                |
//! | turn   | update    | `TurnState`                |
//! | map    | update    | `GridBounds`               |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{EngineError, EngineResult};
use crate::game::fog::FogGrid;
use crate::game::grid::{GridBounds, GridPos};
use crate::game::roster::UserId;
use crate::game::state::EntityKey;
use crate::game::tokens::{Token, TokenId};
use crate::game::turns::TurnState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Token,
    Fog,
    Turn,
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub entity: EntityKind,
    pub operation: Operation,
    pub payload: Value,
}

/// A change to the fog grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FogChange {
    /// Set the listed cells.
    Cells { cells: Vec<GridPos>, revealed: bool },
    /// Set every cell.
    All { revealed: bool },
    /// Replace the whole grid (entity re-fetch).
    Replace { grid: FogGrid },
}

/// Typed form of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    PlaceToken(Token),
    UpdateToken(Token),
    RemoveToken(TokenId),
    Fog(FogChange),
    Turn(TurnState),
    Resize(GridBounds),
}

impl Mutation {
    pub fn key(&self) -> EntityKey {
        match self {
            Mutation::PlaceToken(t) | Mutation::UpdateToken(t) => EntityKey::Token(t.id.clone()),
            Mutation::RemoveToken(id) => EntityKey::Token(id.clone()),
            Mutation::Fog(_) => EntityKey::Fog,
            Mutation::Turn(_) => EntityKey::Turn,
            Mutation::Resize(_) => EntityKey::Map,
        }
    }

    pub fn to_envelope(&self) -> EngineResult<SyncEnvelope> {
        let (entity, operation, payload) = match self {
            Mutation::PlaceToken(t) => (EntityKind::Token, Operation::Insert, serde_json::to_value(t)?),
            Mutation::UpdateToken(t) => (EntityKind::Token, Operation::Update, serde_json::to_value(t)?),
            Mutation::RemoveToken(id) => (EntityKind::Token, Operation::Delete, json!({ "id": id })),
            Mutation::Fog(change) => (EntityKind::Fog, Operation::Update, serde_json::to_value(change)?),
            Mutation::Turn(turn) => (EntityKind::Turn, Operation::Update, serde_json::to_value(turn)?),
            Mutation::Resize(bounds) => (EntityKind::Map, Operation::Update, serde_json::to_value(bounds)?),
        };
        Ok(SyncEnvelope {
            entity,
            operation,
            payload,
        })
    }
}

#[derive(Deserialize)]
struct RemovedToken {
    id: TokenId,
}

impl TryFrom<&SyncEnvelope> for Mutation {
    type Error = EngineError;

    fn try_from(env: &SyncEnvelope) -> Result<Self, Self::Error> {
        let payload = env.payload.clone();
        let mutation = match (env.entity, env.operation) {
            (EntityKind::Token, Operation::Insert) => Mutation::PlaceToken(serde_json::from_value(payload)?),
            (EntityKind::Token, Operation::Update) => Mutation::UpdateToken(serde_json::from_value(payload)?),
            (EntityKind::Token, Operation::Delete) => {
                let removed: RemovedToken = serde_json::from_value(payload)?;
                Mutation::RemoveToken(removed.id)
            }
            (EntityKind::Fog, Operation::Update) => Mutation::Fog(serde_json::from_value(payload)?),
            (EntityKind::Turn, Operation::Update) => Mutation::Turn(serde_json::from_value(payload)?),
            (EntityKind::Map, Operation::Update) => Mutation::Resize(serde_json::from_value(payload)?),
            (entity, operation) => {
                return Err(EngineError::Validation(format!(
                    "unsupported envelope: {:?} {:?}",
                    entity, operation
                )));
            }
        };
        Ok(mutation)
    }
}

/// A persisted write, as fanned out by the store to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Store arrival order. Strictly increasing per session.
    pub revision: u64,
    pub stored_at: DateTime<Utc>,
    /// User whose write produced this event.
    pub origin: UserId,
    pub envelope: SyncEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tokens::TokenKind;

    #[test]
    fn token_update_survives_transport() {
        let token = Token::new("orc", "Orc", TokenKind::Monster, GridPos::new(3, 4)).owned_by("gm");
        let env = Mutation::UpdateToken(token.clone()).to_envelope().unwrap();
        assert_eq!(env.entity, EntityKind::Token);
        assert_eq!(env.operation, Operation::Update);

        let wire = serde_json::to_string(&env).unwrap();
        assert!(wire.contains(r#""entity":"token""#));
        let back: SyncEnvelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(Mutation::try_from(&back).unwrap(), Mutation::UpdateToken(token));
    }

    #[test]
    fn delete_payload_is_just_the_id() {
        let env = Mutation::RemoveToken("orc".into()).to_envelope().unwrap();
        assert_eq!(env.payload, json!({ "id": "orc" }));
        assert_eq!(Mutation::try_from(&env).unwrap().key(), EntityKey::Token("orc".into()));
    }

    #[test]
    fn fog_change_is_tagged() {
        let env = Mutation::Fog(FogChange::All { revealed: true }).to_envelope().unwrap();
        assert_eq!(env.payload, json!({ "kind": "all", "revealed": true }));
    }

    #[test]
    fn unsupported_combination_is_rejected() {
        let env = SyncEnvelope {
            entity: EntityKind::Turn,
            operation: Operation::Delete,
            payload: Value::Null,
        };
        assert!(matches!(Mutation::try_from(&env), Err(EngineError::Validation(_))));
    }

    #[test]
    fn malformed_payload_is_json_error() {
        let env = SyncEnvelope {
            entity: EntityKind::Map,
            operation: Operation::Update,
            payload: json!({ "width": "wide" }),
        };
        assert!(matches!(Mutation::try_from(&env), Err(EngineError::Json(_))));
    }
}
