//! Participant roster supplied by the external session service.
//!
//! The engine never creates participants; the host hands over the current
//! roster and refreshes it whenever someone joins or leaves.

use serde::{Deserialize, Serialize};

pub type UserId = String;

/// Session role. Advisory only: nothing here is cryptographically enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    GameMaster,
    Player,
    Spectator,
}

/// A single roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub role: Role,
    /// Linked character sheet, if the participant has one.
    pub character_id: Option<String>,
}

impl Participant {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            character_id: None,
        }
    }

    pub fn with_character(mut self, character_id: impl Into<String>) -> Self {
        self.character_id = Some(character_id.into());
        self
    }
}

/// A roster entry eligible for a turn, captured when combat starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub user_id: UserId,
    pub character_id: Option<String>,
}

/// Ordered list of session participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self { participants }
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        self.participants
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.role)
    }

    /// Player-role participants in roster order.
    pub fn combatants(&self) -> Vec<Combatant> {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Player)
            .map(|p| Combatant {
                user_id: p.user_id.clone(),
                character_id: p.character_id.clone(),
            })
            .collect()
    }

    /// Add or replace a participant, keeping the original position on replace.
    pub fn upsert(&mut self, participant: Participant) {
        match self
            .participants
            .iter_mut()
            .find(|p| p.user_id == participant.user_id)
        {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }
    }

    pub fn remove(&mut self, user_id: &str) {
        self.participants.retain(|p| p.user_id != user_id);
    }
}
