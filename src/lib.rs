//! Battle map session engine.
//!
//! A live tabletop combat session shared between one game master and any
//! number of players: a grid map with tokens, fog of war, a measuring
//! ruler and an initiative tracker with a per-turn countdown. Each client
//! runs a [`SyncSession`] that applies intents optimistically, persists them
//! through a [`SessionStore`], and reconciles the store's broadcasts so all
//! clients converge.
//!
//! Hosts drive it either through the typed [`SyncSession`] API or through
//! [`routes::handle_request`], which maps `method + path + JSON body` onto
//! the same operations using `matchit`.

pub mod config;
pub mod error;
pub mod game;
pub mod logging;
pub mod routes;
pub mod sync;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, StoreError};
pub use routes::handle_request;
pub use sync::{EngineEvent, MemoryStore, Outcome, SessionStore, SyncSession};
