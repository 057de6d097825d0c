//! API handlers and shared handler state.

pub mod dns;
pub mod registry;
pub mod roa;

use std::path::PathBuf;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use regd::{DnsZone, Registry, RoaData, Store};

/// Shared handler state: one atomic store per published dataset.
///
/// Handlers load a snapshot once at entry and use it for the whole
/// request; only the refresh worker stores. The ROA slot is `None` until
/// the first successful ROA build.
#[derive(Debug)]
pub struct AppState {
    pub registry: Store<Registry>,
    pub roa: Store<Option<RoaData>>,
    pub dns: Store<DnsZone>,
    /// Registry data root, where the ROA pipeline finds its filter files.
    pub data_root: PathBuf,
}

/// `Cache-Control` for registry and DNS responses.
const CACHE_REGISTRY: &str = "public, max-age=7200, stale-if-error=86400";
/// `Cache-Control` for ROA responses, which may stay stale for a week.
const CACHE_ROA: &str = "public, max-age=7200, stale-if-error=604800";

fn with_cache(body: Response, cache_control: &'static str, commit: &str) -> Response {
    let mut response = body;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Ok(etag) = HeaderValue::from_str(commit) {
        response.headers_mut().insert(header::ETAG, etag);
    }
    response
}

/// Cacheable registry/DNS response with the snapshot commit as `ETag`.
pub(crate) fn registry_cached(commit: &str, body: impl IntoResponse) -> Response {
    with_cache(body.into_response(), CACHE_REGISTRY, commit)
}

/// Cacheable ROA response with the snapshot commit as `ETag`.
pub(crate) fn roa_cached(commit: &str, body: impl IntoResponse) -> Response {
    with_cache(body.into_response(), CACHE_ROA, commit)
}

/// Plain-text 404 in the registry API wording.
pub(crate) fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, message).into_response()
}

/// 503 for the window before the first ROA snapshot exists.
pub(crate) fn roa_unavailable() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "ROA data not yet available").into_response()
}
