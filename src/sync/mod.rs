//! Realtime synchronisation: optimistic writes, the shared store, broadcast
//! reconciliation and the background tasks (drag debounce, turn countdown)
//! that keep every client's [`SessionState`](crate::game::state::SessionState)
//! converging on the same values.

pub mod drag;
pub mod envelope;
pub mod events;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod store;
pub mod timer;

pub use envelope::{ChangeEvent, EntityKind, FogChange, Mutation, Operation, SyncEnvelope};
pub use events::EngineEvent;
pub use session::{Outcome, SyncSession};
pub use store::{MemoryStore, SessionStore};
