//! Outbound event stream for chat / combat-log consumers.
//!
//! Events are emitted while reconciling store broadcasts, never from
//! optimistic local state, so every client reports the same history.

use serde::Serialize;

use crate::game::roster::UserId;
use crate::game::tokens::TokenId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    TokenMoved { token_id: TokenId, x: i32, y: i32 },
    CombatStarted { round: u32, combatant_id: UserId },
    TurnAdvanced { round: u32, combatant_id: UserId },
    CombatEnded,
    /// A write gave up after its retries. The UI should offer a refresh.
    SyncFailed { entity: String, message: String },
    /// Local state was replaced by a full snapshot.
    Resynced { revision: u64 },
    /// Transient notice, e.g. a denied action.
    Notice { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let e = EngineEvent::TokenMoved {
            token_id: "orc".into(),
            x: 3,
            y: 7,
        };
        assert_eq!(
            serde_json::to_string(&e).unwrap(),
            r#"{"type":"token_moved","token_id":"orc","x":3,"y":7}"#
        );
        assert_eq!(
            serde_json::to_string(&EngineEvent::CombatEnded).unwrap(),
            r#"{"type":"combat_ended"}"#
        );
    }
}
