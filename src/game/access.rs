//! Session access control: the single capability gate in front of every
//! mutating operation.
//!
//! Callers present an [`Actor`] (the role token) and the [`Capability`] they
//! want to exercise. A denial is reported as `PermissionDenied`; the sync
//! layer turns that into a silent no-op.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::game::roster::{Role, UserId};

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn game_master(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::GameMaster)
    }

    pub fn player(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::Player)
    }

    pub fn is_gm(&self) -> bool {
        self.role == Role::GameMaster
    }

    /// Whether `owner` names this actor.
    pub fn owns(&self, owner: Option<&str>) -> bool {
        owner == Some(self.user_id.as_str())
    }
}

/// What the actor wants to do. Token capabilities carry the token's owner so
/// the gate can decide without looking anything up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<'a> {
    PlaceToken { owner: Option<&'a str> },
    MoveToken { owner: Option<&'a str> },
    RemoveToken { owner: Option<&'a str> },
    SetTokenVisibility,
    EditFog,
    ControlTurns,
    ResizeMap,
}

impl Capability<'_> {
    fn label(&self) -> &'static str {
        match self {
            Capability::PlaceToken { .. } => "place token",
            Capability::MoveToken { .. } => "move token",
            Capability::RemoveToken { .. } => "remove token",
            Capability::SetTokenVisibility => "set token visibility",
            Capability::EditFog => "edit fog of war",
            Capability::ControlTurns => "control turns",
            Capability::ResizeMap => "resize map",
        }
    }
}

/// Decide whether `actor` may exercise `capability`.
///
/// The game master may do anything. Players may place, move and remove
/// tokens they own. Spectators may not mutate.
pub fn authorize(actor: &Actor, capability: Capability<'_>) -> EngineResult<()> {
    let allowed = match actor.role {
        Role::GameMaster => true,
        Role::Spectator => false,
        Role::Player => match capability {
            Capability::PlaceToken { owner }
            | Capability::MoveToken { owner }
            | Capability::RemoveToken { owner } => actor.owns(owner),
            _ => false,
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied(format!(
            "{} ({:?}) may not {}",
            actor.user_id,
            actor.role,
            capability.label()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gm_may_do_everything() {
        let gm = Actor::game_master("gm");
        for cap in [
            Capability::PlaceToken { owner: None },
            Capability::MoveToken { owner: Some("p1") },
            Capability::RemoveToken { owner: None },
            Capability::SetTokenVisibility,
            Capability::EditFog,
            Capability::ControlTurns,
            Capability::ResizeMap,
        ] {
            assert!(authorize(&gm, cap).is_ok());
        }
    }

    #[test]
    fn player_limited_to_own_tokens() {
        let p = Actor::player("p1");
        assert!(authorize(&p, Capability::PlaceToken { owner: Some("p1") }).is_ok());
        assert!(authorize(&p, Capability::MoveToken { owner: Some("p1") }).is_ok());
        assert!(authorize(&p, Capability::RemoveToken { owner: Some("p1") }).is_ok());
        assert!(authorize(&p, Capability::MoveToken { owner: Some("p2") }).is_err());
        assert!(authorize(&p, Capability::MoveToken { owner: None }).is_err());
        assert!(authorize(&p, Capability::ControlTurns).is_err());
        assert!(authorize(&p, Capability::EditFog).is_err());
        assert!(authorize(&p, Capability::SetTokenVisibility).is_err());
    }

    #[test]
    fn spectator_cannot_mutate() {
        let s = Actor::new("s", Role::Spectator);
        let err = authorize(&s, Capability::MoveToken { owner: Some("s") }).unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(_)));
        assert!(err.to_string().contains("move token"));
    }
}
