//! Intent routing. A host (UI bridge, websocket, test) hands every user
//! intent to [`handle_request`] as a method + path + JSON body and gets a
//! JSON string back. Uses `matchit` for URL matching.

pub mod fog;
pub mod map;
pub mod tokens;
pub mod turn;
pub mod util;

use crate::sync::SyncSession;
use util::json_error;

fn build_router() -> matchit::Router<&'static str> {
    let mut router = matchit::Router::new();

    router.insert("/api/state", "state").ok();

    // Tokens
    router.insert("/api/tokens", "tokens").ok();
    router.insert("/api/tokens/{id}/move", "token_move").ok();
    router.insert("/api/tokens/{id}/visibility", "token_visibility").ok();
    router.insert("/api/tokens/{id}/remove", "token_remove").ok();
    router.insert("/api/tokens/{id}/drag", "token_drag").ok();
    router.insert("/api/drag/move", "drag_move").ok();
    router.insert("/api/drag/end", "drag_end").ok();

    // Fog
    router.insert("/api/fog/cell", "fog_cell").ok();
    router.insert("/api/fog/reveal", "fog_reveal").ok();
    router.insert("/api/fog/all", "fog_all").ok();
    router.insert("/api/fog/hide", "fog_hide").ok();
    router.insert("/api/fog/paint/begin", "fog_paint_begin").ok();
    router.insert("/api/fog/paint/stroke", "fog_paint_stroke").ok();
    router.insert("/api/fog/paint/end", "fog_paint_end").ok();

    // Map
    router.insert("/api/map/resize", "map_resize").ok();
    router.insert("/api/map/zoom", "map_zoom").ok();

    // Turns
    router.insert("/api/turn", "turn").ok();
    router.insert("/api/turn/start", "turn_start").ok();
    router.insert("/api/turn/next", "turn_next").ok();
    router.insert("/api/turn/pause", "turn_pause").ok();
    router.insert("/api/turn/resume", "turn_resume").ok();
    router.insert("/api/turn/end", "turn_end").ok();
    router.insert("/api/turn/duration", "turn_duration").ok();

    // Measurement
    router.insert("/api/measure", "measure").ok();
    router.insert("/api/measure/click", "measure_click").ok();
    router.insert("/api/measure/clear", "measure_clear").ok();

    // Sync
    router.insert("/api/sync", "sync").ok();
    router.insert("/api/sync/refresh", "sync_refresh").ok();

    router
}

/// Dispatch one intent against `session`.
///
/// # Arguments
/// * `method` — `"GET"` or `"POST"`
/// * `path`   — e.g. `"/api/tokens/orc-1/move"`
/// * `body`   — JSON body, empty for GET
pub async fn handle_request(session: &mut SyncSession, method: &str, path: &str, body: &str) -> String {
    let router = build_router();
    let (route, id) = match router.at(path) {
        Ok(matched) => (
            *matched.value,
            matched.params.get("id").unwrap_or_default().to_string(),
        ),
        Err(_) => return not_found(path),
    };

    match (route, method) {
        ("state", "GET") => map::handle_state_get(session).await,

        ("tokens", "GET") => tokens::handle_list_get(session).await,
        ("tokens", "POST") => tokens::handle_place_post(session, body).await,
        ("token_move", "POST") => tokens::handle_move_post(session, &id, body).await,
        ("token_visibility", "POST") => tokens::handle_visibility_post(session, &id, body).await,
        ("token_remove", "POST") => tokens::handle_remove_post(session, &id).await,
        ("token_drag", "POST") => tokens::handle_drag_begin_post(session, &id).await,
        ("drag_move", "POST") => tokens::handle_drag_move_post(session, body).await,
        ("drag_end", "POST") => tokens::handle_drag_end_post(session, body).await,

        ("fog_cell", "POST") => fog::handle_cell_post(session, body).await,
        ("fog_reveal", "POST") => fog::handle_reveal_post(session, body).await,
        ("fog_all", "POST") => fog::handle_all_post(session).await,
        ("fog_hide", "POST") => fog::handle_hide_post(session).await,
        ("fog_paint_begin", "POST") => fog::handle_paint_begin_post(session, body).await,
        ("fog_paint_stroke", "POST") => fog::handle_paint_stroke_post(session, body).await,
        ("fog_paint_end", "POST") => fog::handle_paint_end_post(session).await,

        ("map_resize", "POST") => map::handle_resize_post(session, body).await,
        ("map_zoom", "POST") => map::handle_zoom_post(session, body).await,

        ("turn", "GET") => turn::handle_turn_get(session).await,
        ("turn_start", "POST") => turn::handle_start_post(session).await,
        ("turn_next", "POST") => turn::handle_next_post(session).await,
        ("turn_pause", "POST") => turn::handle_pause_post(session).await,
        ("turn_resume", "POST") => turn::handle_resume_post(session).await,
        ("turn_end", "POST") => turn::handle_end_post(session).await,
        ("turn_duration", "POST") => turn::handle_duration_post(session, body).await,

        ("measure", "GET") => map::handle_measure_get(session).await,
        ("measure_click", "POST") => map::handle_measure_click_post(session, body).await,
        ("measure_clear", "POST") => map::handle_measure_clear_post(session).await,

        ("sync", "POST") => map::handle_sync_post(session).await,
        ("sync_refresh", "POST") => map::handle_refresh_post(session).await,

        _ => method_not_allowed(method, path),
    }
}

fn not_found(path: &str) -> String {
    json_error(404, format!("route not found: {}", path))
}

fn method_not_allowed(method: &str, path: &str) -> String {
    json_error(405, format!("method {} not allowed on {}", method, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_registers() {
        let router = build_router();
        for path in [
            "/api/state",
            "/api/tokens",
            "/api/tokens/orc-1/move",
            "/api/drag/end",
            "/api/fog/paint/stroke",
            "/api/turn/duration",
            "/api/measure/click",
            "/api/sync/refresh",
        ] {
            assert!(router.at(path).is_ok(), "{} should route", path);
        }
        let matched = router.at("/api/tokens/orc-1/remove").unwrap();
        assert_eq!(*matched.value, "token_remove");
        assert_eq!(matched.params.get("id"), Some("orc-1"));
    }

    #[test]
    fn unknown_paths_do_not_route() {
        let router = build_router();
        assert!(router.at("/api/nonexistent").is_err());
        assert!(router.at("/api/tokens/orc-1").is_err());
    }
}
