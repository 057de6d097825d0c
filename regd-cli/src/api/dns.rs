//! DNS root zone endpoint.

// axum handlers must be async even when they never await
#![allow(clippy::unused_async)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::{AppState, registry_cached};

/// `GET /api/dns/root-zone?format=bind|json` - the synthesized root
/// zone. JSON is the default.
pub async fn root_zone(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let zone = state.dns.load();

    match query.get("format").map(String::as_str) {
        Some("bind") => registry_cached(
            &zone.commit,
            ([(header::CONTENT_TYPE, "text/plain")], zone.to_bind()).into_response(),
        ),
        _ => registry_cached(&zone.commit, Json(&*zone)),
    }
}
