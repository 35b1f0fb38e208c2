//! Engine error taxonomy.
//!
//! Every failure is local-first: an error rejects (or clamps) the single
//! operation that caused it and never tears down the session. Errors are
//! grouped into four kinds that map onto how the caller recovers.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::game::tokens::TokenId;

/// Errors raised by the battle map engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid coordinates ({x}, {y})")]
    InvalidCoordinates { x: i32, y: i32 },

    #[error("unknown token: {0}")]
    UnknownToken(TokenId),

    #[error("invalid token size: {0} (expected one of 0.5, 0.8, 1, 2, 3)")]
    InvalidSize(f32),

    #[error("invalid turn duration: {0}s (expected one of 30, 60, 120, 300)")]
    InvalidTurnDuration(u64),

    #[error("cannot start combat without at least one player combatant")]
    NoCombatants,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("sync failed after {attempts} attempt(s): {message}")]
    SyncFailure { attempts: u32, message: String },

    #[error("state desync: {0}")]
    StateDesync(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed payload: {0}")]
    Json(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Json(e.to_string())
    }
}

/// Errors reported by a [`SessionStore`](crate::sync::store::SessionStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store write timed out after {0}ms")]
    Timeout(u64),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Transient failures are worth another attempt; the rest are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// How a failure is recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: clamp or reject the single operation.
    Validation,
    /// Caller lacks the capability: silent no-op.
    Permission,
    /// Persistence failed: keep optimistic state, flag stale, retry (bounded).
    Sync,
    /// Local view is missing something the broadcast references: re-fetch.
    Desync,
    /// Startup misconfiguration.
    Config,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidCoordinates { .. }
            | EngineError::UnknownToken(_)
            | EngineError::InvalidSize(_)
            | EngineError::InvalidTurnDuration(_)
            | EngineError::NoCombatants
            | EngineError::Validation(_)
            | EngineError::Json(_) => ErrorKind::Validation,
            EngineError::PermissionDenied(_) => ErrorKind::Permission,
            EngineError::SyncFailure { .. } => ErrorKind::Sync,
            EngineError::Store(e) if e.is_retryable() => ErrorKind::Sync,
            EngineError::Store(StoreError::NotFound(_)) => ErrorKind::Desync,
            EngineError::Store(_) => ErrorKind::Validation,
            EngineError::StateDesync(_) => ErrorKind::Desync,
            EngineError::Configuration(_) => ErrorKind::Config,
        }
    }

    /// Log the error at a level matching its kind.
    pub fn log(&self, context: &str) {
        match self.kind() {
            ErrorKind::Permission => debug!("{} - {}", context, self),
            ErrorKind::Validation => info!("{} - {}", context, self),
            ErrorKind::Desync => warn!("{} - {}", context, self),
            ErrorKind::Sync | ErrorKind::Config => error!("{} - {}", context, self),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_recovery_strategy() {
        assert_eq!(EngineError::InvalidSize(1.5).kind(), ErrorKind::Validation);
        assert_eq!(
            EngineError::PermissionDenied("x".into()).kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            EngineError::Store(StoreError::Timeout(500)).kind(),
            ErrorKind::Sync
        );
        assert_eq!(
            EngineError::Store(StoreError::NotFound("token:a".into())).kind(),
            ErrorKind::Desync
        );
        assert_eq!(
            EngineError::Store(StoreError::Rejected("bad".into())).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn only_transient_store_errors_retry() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(StoreError::Timeout(100).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(!StoreError::Rejected("x".into()).is_retryable());
    }

    #[test]
    fn display_messages_are_readable() {
        let e = EngineError::SyncFailure {
            attempts: 3,
            message: "store unavailable: offline".into(),
        };
        assert_eq!(
            e.to_string(),
            "sync failed after 3 attempt(s): store unavailable: offline"
        );
    }
}
