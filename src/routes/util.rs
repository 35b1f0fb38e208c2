//! Shared request/response helpers for route handlers.
//!
//! Every response is a JSON object: `{"ok": true, "data": ...}` on success,
//! `{"ok": false, "status": <http-like code>, "error": "..."}` otherwise.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Display;

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::sync::Outcome;

/// Parse a JSON request body. An empty body parses as `{}` so handlers with
/// all-default parameters accept a bare POST.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| json_error(400, format!("malformed body: {}", e)))
}

pub fn json_ok<T: Serialize>(data: &T) -> String {
    json!({ "ok": true, "data": data }).to_string()
}

pub fn json_error(status: u16, message: impl Display) -> String {
    json!({ "ok": false, "status": status, "error": message.to_string() }).to_string()
}

/// Status code for an engine error.
pub fn status_of(err: &EngineError) -> u16 {
    match err.kind() {
        ErrorKind::Validation => 400,
        ErrorKind::Permission => 403,
        ErrorKind::Desync => 409,
        ErrorKind::Sync => 503,
        ErrorKind::Config => 500,
    }
}

pub fn engine_error(err: &EngineError) -> String {
    json_error(status_of(err), err)
}

pub fn respond<T: Serialize>(result: EngineResult<T>) -> String {
    match result {
        Ok(data) => json_ok(&data),
        Err(e) => engine_error(&e),
    }
}

pub fn respond_outcome(result: EngineResult<Outcome>) -> String {
    respond(result.map(|outcome| json!({ "outcome": outcome })))
}
