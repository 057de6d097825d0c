//! DN42 registry API server.
//!
//! Thin HTTP surface over the `regd` engine: clap flag parsing, tracing
//! setup, the periodic git refresh worker and the axum routers serving
//! the registry, ROA and DNS endpoints.

pub mod api;
pub mod cli;
pub mod logging;
pub mod refresh;
pub mod server;
