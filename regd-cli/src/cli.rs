//! Command line interface and startup sequencing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use regd::{DnsZone, Registry, RoaData, Store};
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::AppState;
use crate::refresh::{self, RefreshConfig};
use crate::{logging, server};

#[derive(Parser, Debug)]
#[command(name = "regd", version, about = "DN42 registry API server")]
pub struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Registry data directory (a git working tree containing data/)
    #[arg(short = 'd', long = "reg-dir", default_value = "registry")]
    pub reg_dir: PathBuf,

    /// Server bind address
    #[arg(short = 'b', long = "bind-address", default_value = "[::]:8042")]
    pub bind_address: String,

    /// Static page directory; an empty value disables static serving
    #[arg(short = 's', long = "static-root", default_value = "StaticRoot")]
    pub static_root: PathBuf,

    /// Refresh interval (minimum 10m is enforced)
    #[arg(
        short = 'i',
        long = "refresh",
        default_value = "60m",
        value_parser = humantime::parse_duration
    )]
    pub refresh: Duration,

    /// Path to the git executable
    #[arg(short = 'g', long = "git-path", default_value = "/usr/bin/git")]
    pub git_path: PathBuf,

    /// Automatically pull the registry before checking for changes
    #[arg(
        short = 'a',
        long = "auto-pull",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub auto_pull: bool,

    /// Git branch (or pull URL) handed to git pull
    #[arg(short = 'p', long = "branch", default_value = "master")]
    pub branch: String,
}

/// Parse flags, run the startup sequence and serve until shutdown.
///
/// # Errors
///
/// Fails fast on configuration problems: a missing registry data
/// directory, a missing git executable, a missing static root or an
/// unbindable listen address.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);
    info!("DN42 registry API server starting");

    let data_root = args.reg_dir.join("data");
    anyhow::ensure!(
        data_root.is_dir(),
        "registry data directory {} is missing or not a directory",
        data_root.display()
    );
    anyhow::ensure!(
        args.git_path.is_file(),
        "git executable {} not found",
        args.git_path.display()
    );

    let static_root = if args.static_root.as_os_str().is_empty() {
        None
    } else {
        anyhow::ensure!(
            args.static_root.is_dir(),
            "static page directory {} is missing or not a directory",
            args.static_root.display()
        );
        Some(args.static_root.clone())
    };

    let interval = refresh::effective_interval(args.refresh);

    // initial load: hash first, then a full build and publication
    let commit = match refresh::commit_hash(&args.reg_dir, &args.git_path).await {
        Ok(commit) => commit,
        Err(err) => {
            error!(error = %err, "Failed to read registry commit hash");
            String::new()
        }
    };

    let build_root = data_root.clone();
    let build_commit = commit.clone();
    let registry =
        tokio::task::spawn_blocking(move || Registry::build(&build_root, build_commit))
            .await
            .context("initial registry build")?;

    let roa = match RoaData::build(&registry, &data_root) {
        Ok(roa) => Some(roa),
        Err(err) => {
            error!(error = %err, "Initial ROA build failed, endpoints unavailable until retry");
            None
        }
    };
    let dns = DnsZone::build(&registry);

    let state = Arc::new(AppState {
        registry: Store::new(registry),
        roa: Store::new(roa),
        dns: Store::new(dns),
        data_root: data_root.clone(),
    });

    // refresh worker, cancelled through the same channel the server
    // flips at shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_config = RefreshConfig {
        reg_dir: args.reg_dir.clone(),
        data_root,
        git_path: args.git_path.clone(),
        auto_pull: args.auto_pull,
        pull_url: args.branch.clone(),
        interval,
    };
    tokio::spawn(refresh::run(
        Arc::clone(&state),
        refresh_config,
        commit,
        shutdown_rx,
    ));

    let router = server::build_router(state, static_root.as_deref());
    server::serve(&args.bind_address, router, shutdown_tx).await
}
