//! `/api/state`, `/api/map/*`, `/api/measure/*` and `/api/sync/*` routes.

use serde::Deserialize;
use serde_json::json;

use crate::game::grid::{GridBounds, WorldPos};
use crate::routes::util::{engine_error, parse_body, respond, respond_outcome};
use crate::sync::SyncSession;

#[derive(Deserialize)]
struct ResizeBody {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct ZoomBody {
    cell_size_px: f64,
}

#[derive(Deserialize)]
struct PointerBody {
    x: f64,
    y: f64,
}

// ── GET /api/state ─────────────────────────────────────────────────

/// Everything this client renders: map size, visible tokens, fog, turn,
/// the reconciled revision and which entities still await confirmation.
pub async fn handle_state_get(session: &SyncSession) -> String {
    let tokens = session.list_visible().await;
    let view = session
        .with_state(|s| {
            json!({
                "bounds": s.bounds,
                "cell_size_px": session.cell_size_px(),
                "tokens": tokens,
                "fog": s.fog,
                "turn": s.turn,
                "revision": s.revision,
                "stale": s.stale.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            })
        })
        .await;
    respond(Ok(view))
}

// ── POST /api/map/resize ───────────────────────────────────────────

pub async fn handle_resize_post(session: &mut SyncSession, body: &str) -> String {
    let b: ResizeBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    respond_outcome(session.resize_map(GridBounds::new(b.width, b.height)).await)
}

// ── POST /api/map/zoom ─────────────────────────────────────────────

/// Local only. Returns the clamped cell size.
pub async fn handle_zoom_post(session: &mut SyncSession, body: &str) -> String {
    let b: ZoomBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let cell_size_px = session.set_zoom(b.cell_size_px);
    respond(Ok(json!({ "cell_size_px": cell_size_px })))
}

// ── /api/measure ───────────────────────────────────────────────────

pub async fn handle_measure_get(session: &SyncSession) -> String {
    let tool = session.measurement();
    respond(Ok(json!({ "anchor": tool.anchor(), "span": tool.span() })))
}

/// POST /api/measure/click `{"x","y"}` in pixels. `span` is null until the
/// second click.
pub async fn handle_measure_click_post(session: &mut SyncSession, body: &str) -> String {
    let b: PointerBody = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let span = session.measure_click(WorldPos::new(b.x, b.y));
    respond(Ok(json!({ "span": span })))
}

pub async fn handle_measure_clear_post(session: &mut SyncSession) -> String {
    session.measure_clear();
    respond(Ok(json!({ "span": null })))
}

// ── /api/sync ──────────────────────────────────────────────────────

/// Reconcile everything that has arrived.
pub async fn handle_sync_post(session: &mut SyncSession) -> String {
    respond(session.sync().await.map(|processed| json!({ "processed": processed })))
}

/// Manual recovery: re-fetch the full snapshot.
pub async fn handle_refresh_post(session: &mut SyncSession) -> String {
    match session.refresh().await {
        Ok(()) => {
            let revision = session.with_state(|s| s.revision).await;
            respond(Ok(json!({ "revision": revision })))
        }
        Err(e) => engine_error(&e),
    }
}
