//! The shared, authoritative session store.
//!
//! A [`SessionStore`] persists one entity change at a time, assigns it the
//! next revision in arrival order, and fans the resulting [`ChangeEvent`] out
//! to every subscriber of the session. Concurrent writes to the same entity
//! resolve by that order: the later arrival wins.
//!
//! [`MemoryStore`] is the in-process implementation. It also carries a
//! failure-injection queue so the retry and stale-flag paths can be driven
//! deterministically.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{EngineConfig, map_size_error};
use crate::error::StoreError;
use crate::game::state::{EntityKey, SessionSnapshot, SessionState};
use crate::sync::envelope::{ChangeEvent, FogChange, Mutation, SyncEnvelope};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist one change and broadcast it. Returns the stored event.
    async fn write(
        &self,
        session_id: &str,
        origin: &str,
        envelope: SyncEnvelope,
    ) -> Result<ChangeEvent, StoreError>;

    /// Full authoritative state.
    async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, StoreError>;

    /// Current value of one entity, as an envelope that recreates it.
    /// `None` means the entity no longer exists.
    async fn fetch(&self, session_id: &str, key: &EntityKey) -> Result<Option<SyncEnvelope>, StoreError>;

    /// Subscribe to the session's change feed.
    fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<ChangeEvent>, StoreError>;
}

struct StoredSession {
    state: SessionState,
    sender: broadcast::Sender<ChangeEvent>,
}

pub struct MemoryStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
    capacity: usize,
    injected: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    /// `capacity` bounds how many undelivered events a subscriber may fall
    /// behind before it is told it lagged.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            injected: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a session with the configured map size and turn length if it
    /// does not exist yet. Idempotent.
    pub fn open_session(&self, session_id: &str, config: &EngineConfig) {
        let mut sessions = self.sessions.lock();
        sessions.entry(session_id.to_string()).or_insert_with(|| {
            let bounds = config.map.bounds();
            info!("opening session {} ({}x{})", session_id, bounds.width, bounds.height);
            let (sender, _) = broadcast::channel(self.capacity);
            let mut state = SessionState::new(bounds);
            state.turn.duration = config.turn.duration;
            StoredSession { state, sender }
        });
    }

    /// Make the next `count` calls to `write` fail with `error`.
    pub fn fail_next(&self, count: usize, error: StoreError) {
        let mut injected = self.injected.lock();
        injected.extend(std::iter::repeat_n(error, count));
    }

    /// Latest revision stored for the session.
    pub fn revision(&self, session_id: &str) -> Option<u64> {
        self.sessions.lock().get(session_id).map(|s| s.state.revision)
    }

    fn take_injected(&self) -> Option<StoreError> {
        self.injected.lock().pop_front()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Apply a write to the authoritative state, rejecting anything that does
/// not line up with what is stored.
fn apply_authoritative(state: &mut SessionState, mutation: Mutation) -> Result<(), StoreError> {
    let bounds = state.bounds;
    match mutation {
        Mutation::PlaceToken(token) => {
            state
                .tokens
                .place(token, bounds)
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
        }
        Mutation::UpdateToken(token) => {
            if !state.tokens.contains(&token.id) {
                return Err(StoreError::NotFound(EntityKey::Token(token.id).to_string()));
            }
            state.tokens.upsert(token, bounds);
        }
        Mutation::RemoveToken(id) => {
            state
                .tokens
                .remove(&id)
                .map_err(|_| StoreError::NotFound(EntityKey::Token(id).to_string()))?;
        }
        Mutation::Fog(FogChange::Cells { cells, revealed }) => {
            if let Some(bad) = cells.iter().find(|c| !bounds.contains(**c)) {
                return Err(StoreError::Rejected(format!(
                    "fog cell ({}, {}) outside the map",
                    bad.x, bad.y
                )));
            }
            state.fog.apply_cells(&cells, revealed);
        }
        Mutation::Fog(FogChange::All { revealed: true }) => state.fog.reveal_all(),
        Mutation::Fog(FogChange::All { revealed: false }) => state.fog.hide_all(),
        Mutation::Fog(FogChange::Replace { grid }) => {
            if grid.bounds() != bounds {
                return Err(StoreError::Rejected("fog grid does not match the map".into()));
            }
            state.fog = grid;
        }
        Mutation::Turn(turn) => state.turn = turn,
        Mutation::Resize(new_bounds) => {
            if let Some(reason) = map_size_error(new_bounds) {
                return Err(StoreError::Rejected(reason));
            }
            state.resize(new_bounds);
        }
    }
    Ok(())
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn write(
        &self,
        session_id: &str,
        origin: &str,
        envelope: SyncEnvelope,
    ) -> Result<ChangeEvent, StoreError> {
        if let Some(e) = self.take_injected() {
            debug!("injected store failure for {}: {}", session_id, e);
            return Err(e);
        }
        let mutation = Mutation::try_from(&envelope).map_err(|e| StoreError::Rejected(e.to_string()))?;

        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;

        apply_authoritative(&mut session.state, mutation)?;
        session.state.revision += 1;

        let event = ChangeEvent {
            revision: session.state.revision,
            stored_at: Utc::now(),
            origin: origin.to_string(),
            envelope,
        };
        debug!(
            "stored r{} {:?}/{:?} from {}",
            event.revision, event.envelope.entity, event.envelope.operation, origin
        );
        // No subscribers is fine; the write is still persisted.
        let _ = session.sender.send(event.clone());
        Ok(event)
    }

    async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, StoreError> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.state.snapshot())
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))
    }

    async fn fetch(&self, session_id: &str, key: &EntityKey) -> Result<Option<SyncEnvelope>, StoreError> {
        let sessions = self.sessions.lock();
        let state = &sessions
            .get(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?
            .state;

        let mutation = match key {
            EntityKey::Token(id) => match state.tokens.get(id) {
                Some(token) => Mutation::UpdateToken(token.clone()),
                None => return Ok(None),
            },
            EntityKey::Fog => Mutation::Fog(FogChange::Replace {
                grid: state.fog.clone(),
            }),
            EntityKey::Turn => Mutation::Turn(state.turn.clone()),
            EntityKey::Map => Mutation::Resize(state.bounds),
        };
        mutation
            .to_envelope()
            .map(Some)
            .map_err(|e| StoreError::Rejected(e.to_string()))
    }

    fn subscribe(&self, session_id: &str) -> Result<broadcast::Receiver<ChangeEvent>, StoreError> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.sender.subscribe())
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::{GridBounds, GridPos};
    use crate::game::tokens::{Token, TokenKind};

    const SESSION: &str = "table-1";

    fn store() -> MemoryStore {
        let mut config = EngineConfig::default();
        config.map.width = 10;
        config.map.height = 10;
        let store = MemoryStore::new(16);
        store.open_session(SESSION, &config);
        store
    }

    fn orc(x: i32, y: i32) -> Token {
        Token::new("orc", "Orc", TokenKind::Monster, GridPos::new(x, y))
    }

    fn env(m: Mutation) -> SyncEnvelope {
        m.to_envelope().unwrap()
    }

    #[tokio::test]
    async fn writes_get_increasing_revisions_and_broadcast() {
        let store = store();
        let mut rx = store.subscribe(SESSION).unwrap();

        let first = store.write(SESSION, "gm", env(Mutation::PlaceToken(orc(1, 1)))).await.unwrap();
        let second = store.write(SESSION, "gm", env(Mutation::UpdateToken(orc(2, 2)))).await.unwrap();
        assert_eq!((first.revision, second.revision), (1, 2));

        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
        assert_eq!(store.revision(SESSION), Some(2));
    }

    #[tokio::test]
    async fn later_arrival_wins() {
        let store = store();
        store.write(SESSION, "gm", env(Mutation::PlaceToken(orc(0, 0)))).await.unwrap();
        store.write(SESSION, "a", env(Mutation::UpdateToken(orc(3, 7)))).await.unwrap();
        store.write(SESSION, "b", env(Mutation::UpdateToken(orc(5, 2)))).await.unwrap();

        let snap = store.snapshot(SESSION).await.unwrap();
        assert_eq!(snap.tokens[0].position, GridPos::new(5, 2));
        assert_eq!(snap.revision, 3);
    }

    #[tokio::test]
    async fn update_of_missing_token_is_not_found() {
        let store = store();
        let err = store
            .write(SESSION, "gm", env(Mutation::UpdateToken(orc(1, 1))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.revision(SESSION), Some(0));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = store();
        store.fail_next(2, StoreError::Unavailable("offline".into()));
        for _ in 0..2 {
            assert_eq!(
                store.write(SESSION, "gm", env(Mutation::PlaceToken(orc(1, 1)))).await,
                Err(StoreError::Unavailable("offline".into()))
            );
        }
        assert!(store.write(SESSION, "gm", env(Mutation::PlaceToken(orc(1, 1)))).await.is_ok());
    }

    #[tokio::test]
    async fn fetch_returns_current_value_or_none() {
        let store = store();
        store.write(SESSION, "gm", env(Mutation::PlaceToken(orc(4, 4)))).await.unwrap();
        let key = EntityKey::Token("orc".into());

        let fetched = store.fetch(SESSION, &key).await.unwrap().unwrap();
        assert_eq!(Mutation::try_from(&fetched).unwrap(), Mutation::UpdateToken(orc(4, 4)));

        store.write(SESSION, "gm", env(Mutation::RemoveToken("orc".into()))).await.unwrap();
        assert_eq!(store.fetch(SESSION, &key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn out_of_bounds_fog_is_rejected() {
        let store = store();
        let change = FogChange::Cells {
            cells: vec![GridPos::new(10, 0)],
            revealed: true,
        };
        assert!(matches!(
            store.write(SESSION, "gm", env(Mutation::Fog(change))).await,
            Err(StoreError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn oversized_resize_is_rejected() {
        let store = store();
        let huge = env(Mutation::Resize(GridBounds::new(u32::MAX, u32::MAX)));
        assert!(matches!(
            store.write(SESSION, "gm", huge).await,
            Err(StoreError::Rejected(_))
        ));
        let snap = store.snapshot(SESSION).await.unwrap();
        assert_eq!(snap.bounds, GridBounds::new(10, 10));
        assert_eq!(snap.revision, 0);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = MemoryStore::default();
        assert!(store.subscribe("nope").is_err());
        assert!(store.snapshot("nope").await.is_err());
    }
}
