//! `/api/tokens/*` and `/api/drag/*` routes — placing, moving and removing
//! tokens, plus the pointer-drag stream.

use serde::Deserialize;
use serde_json::json;

use crate::game::grid::{GridPos, WorldPos};
use crate::game::tokens::{Token, TokenKind, TokenSize};
use crate::routes::util::{engine_error, parse_body, respond, respond_outcome};
use crate::sync::SyncSession;

#[derive(Deserialize)]
struct PlaceBody {
    id: String,
    name: String,
    kind: TokenKind,
    x: i32,
    y: i32,
    #[serde(default)]
    size: TokenSize,
    owner: Option<String>,
    #[serde(default = "visible_by_default")]
    visible: bool,
    #[serde(default)]
    appearance: String,
}

fn visible_by_default() -> bool {
    true
}

#[derive(Deserialize)]
struct CellBody {
    x: i32,
    y: i32,
}

#[derive(Deserialize)]
struct PointerBody {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct VisibilityBody {
    visible: bool,
}

// ── GET /api/tokens ────────────────────────────────────────────────

/// Tokens visible to this client's actor.
pub async fn handle_list_get(session: &SyncSession) -> String {
    respond(Ok(session.list_visible().await))
}

// ── POST /api/tokens ───────────────────────────────────────────────

/// Body: `{"id","name","kind","x","y", "size"?, "owner"?, "visible"?, "appearance"?}`
pub async fn handle_place_post(session: &mut SyncSession, body: &str) -> String {
    let b: PlaceBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let mut token = Token::new(b.id, b.name, b.kind, GridPos::new(b.x, b.y)).with_size(b.size);
    token.owner = b.owner;
    token.visible = b.visible;
    token.appearance = b.appearance;
    respond_outcome(session.place_token(token).await)
}

// ── POST /api/tokens/{id}/move ─────────────────────────────────────

/// Body: `{"x","y"}` in grid cells.
pub async fn handle_move_post(session: &mut SyncSession, id: &str, body: &str) -> String {
    let b: CellBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.move_token(id, GridPos::new(b.x, b.y)).await)
}

// ── POST /api/tokens/{id}/visibility ───────────────────────────────

pub async fn handle_visibility_post(session: &mut SyncSession, id: &str, body: &str) -> String {
    let b: VisibilityBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.set_token_visible(id, b.visible).await)
}

// ── POST /api/tokens/{id}/remove ───────────────────────────────────

pub async fn handle_remove_post(session: &mut SyncSession, id: &str) -> String {
    respond_outcome(session.remove_token(id).await)
}

// ── POST /api/tokens/{id}/drag ─────────────────────────────────────

pub async fn handle_drag_begin_post(session: &mut SyncSession, id: &str) -> String {
    respond_outcome(session.begin_drag(id).await)
}

// ── POST /api/drag/move ────────────────────────────────────────────

/// Body: `{"x","y"}` in pixels. Returns the cell the token now shows in.
pub async fn handle_drag_move_post(session: &mut SyncSession, body: &str) -> String {
    let b: PointerBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match session.drag_to(WorldPos::new(b.x, b.y)).await {
        Ok(cell) => respond(Ok(json!({ "x": cell.x, "y": cell.y }))),
        Err(e) => engine_error(&e),
    }
}

// ── POST /api/drag/end ─────────────────────────────────────────────

/// Body: `{"x","y"}` in pixels where the pointer was released.
pub async fn handle_drag_end_post(session: &mut SyncSession, body: &str) -> String {
    let b: PointerBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.end_drag(WorldPos::new(b.x, b.y)).await)
}
