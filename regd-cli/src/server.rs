//! HTTP server assembly: routing, middleware, static files and graceful
//! shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::http::{HeaderValue, header};
use axum::routing::get;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{self, AppState};

/// Bound on connection draining at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Static files may be cached for a month.
const STATIC_CACHE_CONTROL: &str = "public, max-age=2592000, stale-if-error=86400";

/// Assemble the full application router.
///
/// `static_root` adds a fallback file server when given; API routes live
/// under `/api` regardless.
pub fn build_router(state: Arc<AppState>, static_root: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/registry/", get(api::registry::root))
        .route("/registry/.meta", get(api::registry::meta))
        .route("/registry/{type}", get(api::registry::by_type))
        .route("/registry/{type}/{object}", get(api::registry::by_object))
        .route(
            "/registry/{type}/{object}/{key}",
            get(api::registry::by_key),
        )
        .route(
            "/registry/{type}/{object}/{key}/{attribute}",
            get(api::registry::by_attribute),
        )
        .route("/dns/root-zone", get(api::dns::root_zone))
        .route("/roa/filter/{ipv}", get(api::roa::filter))
        .route("/roa/json", get(api::roa::json))
        .route("/roa/bird/{birdv}/{ipv}", get(api::roa::bird))
        .with_state(state);

    let mut router = Router::new().nest("/api", api);

    if let Some(root) = static_root {
        let static_files = ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::if_not_present(
                header::CACHE_CONTROL,
                HeaderValue::from_static(STATIC_CACHE_CONTROL),
            ))
            .service(ServeDir::new(root));
        router = router.fallback_service(static_files);
        info!(path = %root.display(), "Static route installed");
    } else {
        info!("Disabling static route serving");
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(CompressionLayer::new())
}

/// Serve until SIGINT/SIGTERM, then drain with a bounded deadline.
///
/// The shutdown sender doubles as the refresh worker's cancellation
/// signal: it flips before draining starts.
///
/// # Errors
///
/// Returns an error when the listener cannot bind or the server fails.
pub async fn serve(
    bind_address: &str,
    router: Router,
    shutdown: watch::Sender<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("unable to bind to {bind_address}"))?;

    info!(bind_address, "Starting server");

    let mut signal_rx = shutdown.subscribe();
    let server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // begins the drain once the shutdown flag flips
                let _ = signal_rx.changed().await;
            })
            .into_future(),
    );

    shutdown_signal().await;
    info!("Server shutting down");
    let _ = shutdown.send(true);

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
        Ok(joined) => joined.context("server task")??,
        Err(_) => warn!("Shutdown deadline exceeded, aborting in-flight requests"),
    }

    info!("Shutdown complete, all done");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
