//! `/api/fog/*` routes — game master fog editing.

use serde::Deserialize;

use crate::game::grid::{GridPos, WorldPos};
use crate::routes::util::{parse_body, respond_outcome};
use crate::sync::SyncSession;

#[derive(Deserialize)]
struct CellBody {
    x: i32,
    y: i32,
    revealed: bool,
}

#[derive(Deserialize)]
struct RevealBody {
    x: i32,
    y: i32,
    radius: u32,
}

#[derive(Deserialize)]
struct PaintBeginBody {
    #[serde(default = "reveal_by_default")]
    reveal: bool,
}

fn reveal_by_default() -> bool {
    true
}

#[derive(Deserialize)]
struct PointerBody {
    x: f64,
    y: f64,
}

/// POST /api/fog/cell `{"x","y","revealed"}`
pub async fn handle_cell_post(session: &mut SyncSession, body: &str) -> String {
    let b: CellBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.toggle_fog_cell(GridPos::new(b.x, b.y), b.revealed).await)
}

/// POST /api/fog/reveal `{"x","y","radius"}`
pub async fn handle_reveal_post(session: &mut SyncSession, body: &str) -> String {
    let b: RevealBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.reveal_radius(GridPos::new(b.x, b.y), b.radius).await)
}

/// POST /api/fog/all
pub async fn handle_all_post(session: &mut SyncSession) -> String {
    respond_outcome(session.reveal_all().await)
}

/// POST /api/fog/hide
pub async fn handle_hide_post(session: &mut SyncSession) -> String {
    respond_outcome(session.hide_all().await)
}

/// POST /api/fog/paint/begin `{"reveal"?}`
pub async fn handle_paint_begin_post(session: &mut SyncSession, body: &str) -> String {
    let b: PaintBeginBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(Ok(session.begin_fog_paint(b.reveal)))
}

/// POST /api/fog/paint/stroke `{"x","y"}` in pixels
pub async fn handle_paint_stroke_post(session: &mut SyncSession, body: &str) -> String {
    let b: PointerBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.paint_fog_at(WorldPos::new(b.x, b.y)).await)
}

/// POST /api/fog/paint/end
pub async fn handle_paint_end_post(session: &mut SyncSession) -> String {
    session.end_fog_paint();
    respond_outcome(Ok(crate::sync::Outcome::Applied))
}
