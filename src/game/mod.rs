//! Game model: grid geometry, tokens, fog of war, the measuring tool, turn
//! tracking and the access gate. Everything here is plain synchronous data
//! with no I/O; the `sync` layer wraps it with persistence and fan-out.

pub mod access;
pub mod fog;
pub mod grid;
pub mod measure;
pub mod roster;
pub mod state;
pub mod tokens;
pub mod turns;
