//! Token registry: the authoritative set of placed tokens for one client.
//!
//! Positions are clamped into the map on every write so a token always sits
//! on a real cell. Concurrent moves of the same token are not merged: the
//! reconcile path simply overwrites with whatever the store broadcast last.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::game::access::Actor;
use crate::game::grid::{GridBounds, GridPos};
use crate::game::roster::{Role, UserId};

pub type TokenId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    PlayerCharacter,
    Monster,
    Npc,
    Object,
}

/// Footprint multiplier. Only the five table sizes exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum TokenSize {
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    Huge,
}

impl TokenSize {
    pub fn multiplier(self) -> f32 {
        match self {
            TokenSize::Tiny => 0.5,
            TokenSize::Small => 0.8,
            TokenSize::Medium => 1.0,
            TokenSize::Large => 2.0,
            TokenSize::Huge => 3.0,
        }
    }
}

impl TryFrom<f32> for TokenSize {
    type Error = EngineError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        [
            TokenSize::Tiny,
            TokenSize::Small,
            TokenSize::Medium,
            TokenSize::Large,
            TokenSize::Huge,
        ]
        .into_iter()
        .find(|s| (s.multiplier() - value).abs() < f32::EPSILON)
        .ok_or(EngineError::InvalidSize(value))
    }
}

impl From<TokenSize> for f32 {
    fn from(size: TokenSize) -> Self {
        size.multiplier()
    }
}

/// A placed marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub name: String,
    pub kind: TokenKind,
    pub position: GridPos,
    #[serde(default)]
    pub size: TokenSize,
    pub owner: Option<UserId>,
    /// Whether player clients can see this token.
    pub visible: bool,
    /// Colour or sprite reference, opaque to the engine.
    #[serde(default)]
    pub appearance: String,
}

impl Token {
    pub fn new(id: impl Into<TokenId>, name: impl Into<String>, kind: TokenKind, position: GridPos) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            position,
            size: TokenSize::Medium,
            owner: None,
            visible: true,
            appearance: String::new(),
        }
    }

    pub fn owned_by(mut self, owner: impl Into<UserId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_size(mut self, size: TokenSize) -> Self {
        self.size = size;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}

/// Token set keyed by id. Ordered so listings are stable across clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenRegistry {
    tokens: BTreeMap<TokenId, Token>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tokens.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    /// Add a new token, clamping its position into the map.
    pub fn place(&mut self, mut token: Token, bounds: GridBounds) -> EngineResult<&Token> {
        if token.id.is_empty() {
            return Err(EngineError::Validation("token id must not be empty".into()));
        }
        if self.tokens.contains_key(&token.id) {
            return Err(EngineError::Validation(format!(
                "token {} already placed",
                token.id
            )));
        }
        token.position = bounds.clamp(token.position);
        let id = token.id.clone();
        Ok(self.tokens.entry(id).or_insert(token))
    }

    /// Move a token. Out-of-bounds targets clamp to the nearest valid cell.
    /// Returns the cell the token actually landed on.
    pub fn move_to(&mut self, id: &str, target: GridPos, bounds: GridBounds) -> EngineResult<GridPos> {
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownToken(id.to_string()))?;
        token.position = bounds.clamp(target);
        Ok(token.position)
    }

    pub fn set_visible(&mut self, id: &str, visible: bool) -> EngineResult<()> {
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownToken(id.to_string()))?;
        token.visible = visible;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> EngineResult<Token> {
        self.tokens
            .remove(id)
            .ok_or_else(|| EngineError::UnknownToken(id.to_string()))
    }

    /// Insert or overwrite a token wholesale (reconcile path).
    pub fn upsert(&mut self, mut token: Token, bounds: GridBounds) {
        token.position = bounds.clamp(token.position);
        self.tokens.insert(token.id.clone(), token);
    }

    /// Pull every token back inside the map after a resize.
    pub fn clamp_all(&mut self, bounds: GridBounds) {
        for token in self.tokens.values_mut() {
            token.position = bounds.clamp(token.position);
        }
    }

    /// Tokens the viewer is allowed to see. Game masters see everything;
    /// everyone else sees visible tokens plus hidden ones they own.
    pub fn list_visible(&self, viewer: &Actor) -> Vec<&Token> {
        self.tokens
            .values()
            .filter(|t| viewer.role == Role::GameMaster || t.visible || viewer.owns(t.owner()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}
