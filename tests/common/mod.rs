#![allow(dead_code)]

use std::sync::Arc;
use tokio::sync::broadcast;

use battlemap_server::game::access::Actor;
use battlemap_server::game::grid::{GridPos, WorldPos, to_world_coord};
use battlemap_server::game::roster::{Participant, Role, Roster};
use battlemap_server::{EngineConfig, EngineEvent, MemoryStore, SessionStore, SyncSession};

pub const SESSION: &str = "table-7";

pub fn roster() -> Roster {
    Roster::new(vec![
        Participant::new("gm", Role::GameMaster),
        Participant::new("p1", Role::Player).with_character("aria"),
        Participant::new("p2", Role::Player).with_character("brom"),
        Participant::new("watcher", Role::Spectator),
    ])
}

/// Defaults with fast, deterministic retries.
pub fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sync.retry_delay_ms = 10;
    config.sync.retry_jitter_ms = 0;
    config
}

pub fn store(config: &EngineConfig, capacity: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new(capacity));
    store.open_session(SESSION, config);
    store
}

pub async fn join(store: &Arc<MemoryStore>, actor: Actor, config: &EngineConfig) -> SyncSession {
    let store: Arc<dyn SessionStore> = store.clone();
    SyncSession::join(SESSION, actor, roster(), store, config.clone())
        .await
        .expect("join")
}

pub struct Table {
    pub store: Arc<MemoryStore>,
    pub gm: SyncSession,
    pub p1: SyncSession,
    pub p2: SyncSession,
}

pub async fn table_with(config: EngineConfig) -> Table {
    let store = store(&config, 256);
    let gm = join(&store, Actor::game_master("gm"), &config).await;
    let p1 = join(&store, Actor::player("p1"), &config).await;
    let p2 = join(&store, Actor::player("p2"), &config).await;
    Table { store, gm, p1, p2 }
}

pub async fn table() -> Table {
    table_with(config()).await
}

impl Table {
    /// Let every client reconcile what has been broadcast so far.
    pub async fn sync_all(&mut self) {
        self.gm.sync().await.expect("gm sync");
        self.p1.sync().await.expect("p1 sync");
        self.p2.sync().await.expect("p2 sync");
    }
}

/// Pixel centre of a cell at the default 40 px zoom.
pub fn px(x: i32, y: i32) -> WorldPos {
    to_world_coord(GridPos::new(x, y), 40.0)
}

pub async fn position_of(session: &SyncSession, id: &str) -> Option<GridPos> {
    session
        .with_state(|s| s.tokens.get(id).map(|t| t.position))
        .await
}

pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
