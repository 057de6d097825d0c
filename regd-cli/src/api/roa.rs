//! ROA endpoints: GoRTR JSON, BIRD config fragments and the parsed
//! filter files.

// axum handlers must be async even when they never await
#![allow(clippy::unused_async)]

use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use super::{AppState, roa_cached, roa_unavailable};

/// `GET /api/roa/filter/{4|6|46}` - the loaded filter table as JSON.
pub async fn filter(State(state): State<Arc<AppState>>, Path(ipv): Path<String>) -> Response {
    let snapshot = state.roa.load();
    let Some(roa) = snapshot.as_ref() else {
        return roa_unavailable();
    };

    let filters = roa.filters_for(ipv.contains('4'), ipv.contains('6'));
    roa_cached(&roa.commit, Json(filters))
}

/// `GET /api/roa/json` - GoRTR-compatible ROA document.
pub async fn json(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.roa.load();
    let Some(roa) = snapshot.as_ref() else {
        return roa_unavailable();
    };

    // nudge the validity window forward when it nears expiry, so RTR
    // consumers keep the table through long quiescent periods
    let now = u32::try_from(Utc::now().timestamp()).unwrap_or_default();
    roa.json.refresh_validity(now);

    roa_cached(&roa.commit, Json(&roa.json))
}

/// `GET /api/roa/bird/{1|2}/{4|6|46}` - BIRD route table fragment.
pub async fn bird(
    State(state): State<Arc<AppState>>,
    Path((birdv, ipv)): Path<(String, String)>,
) -> Response {
    let snapshot = state.roa.load();
    let Some(roa) = snapshot.as_ref() else {
        return roa_unavailable();
    };

    // bird 1 and bird 2 differ only in the keyword
    let keyword = if birdv == "2" { "route" } else { "roa" };

    let mut body = format!(
        "#\n# DN42 ROA Generator\n# Last Updated: {}\n# Commit: {}\n#\n",
        roa.generated, roa.commit
    );
    let v4 = ipv.contains('4');
    let v6 = ipv.contains('6');
    for triple in roa
        .v4
        .iter()
        .filter(|_| v4)
        .chain(roa.v6.iter().filter(|_| v6))
    {
        let _ = writeln!(
            body,
            "{keyword} {} max {} as {};",
            triple.prefix,
            triple.max_len,
            triple.asn_number()
        );
    }

    roa_cached(
        &roa.commit,
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            body,
        )
            .into_response(),
    )
}
