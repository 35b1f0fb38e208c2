//! `/api/turn/*` routes — combat tracker. Transitions by anyone but the game
//! master come back as `ignored`.

use serde::Deserialize;
use serde_json::json;

use crate::routes::util::{parse_body, respond, respond_outcome};
use crate::sync::SyncSession;

#[derive(Deserialize)]
struct DurationBody {
    seconds: u64,
}

// ── GET /api/turn ──────────────────────────────────────────────────

/// Current tracker state plus the live countdown in whole seconds.
pub async fn handle_turn_get(session: &SyncSession) -> String {
    let remaining = session.turn_remaining().await.map(|d| d.num_seconds());
    let view = session
        .with_state(|s| {
            json!({
                "phase": s.turn.phase,
                "round": s.turn.round,
                "current": s.turn.current_combatant(),
                "combatants": s.turn.combatants,
                "duration": s.turn.duration,
                "turn_ends_at": s.turn.turn_ends_at,
                "remaining_seconds": remaining,
            })
        })
        .await;
    respond(Ok(view))
}

// ── POST /api/turn/{transition} ────────────────────────────────────

pub async fn handle_start_post(session: &mut SyncSession) -> String {
    respond_outcome(session.start_combat().await)
}

pub async fn handle_next_post(session: &mut SyncSession) -> String {
    respond_outcome(session.next_turn().await)
}

pub async fn handle_pause_post(session: &mut SyncSession) -> String {
    respond_outcome(session.pause_combat().await)
}

pub async fn handle_resume_post(session: &mut SyncSession) -> String {
    respond_outcome(session.resume_combat().await)
}

pub async fn handle_end_post(session: &mut SyncSession) -> String {
    respond_outcome(session.end_combat().await)
}

/// POST /api/turn/duration `{"seconds": 30|60|120|300}`
pub async fn handle_duration_post(session: &mut SyncSession, body: &str) -> String {
    let b: DurationBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.set_turn_duration(b.seconds).await)
}
