//! Periodic registry refresh worker.
//!
//! One dedicated task: optionally pull the registry repo, compare the
//! HEAD commit hash against the last published snapshot and, on change,
//! rebuild the registry and republish every derived dataset. Publication
//! order is fixed - registry first, then ROA, then DNS - so derived
//! snapshots never precede the registry they came from.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use regd::{DnsZone, Registry, RoaData};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::AppState;

/// Updates more frequent than this would hammer the registry remote for
/// a dataset that changes a few times a day.
const MIN_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Settings for the refresh worker, resolved from the CLI flags.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub reg_dir: PathBuf,
    pub data_root: PathBuf,
    pub git_path: PathBuf,
    pub auto_pull: bool,
    pub pull_url: String,
    pub interval: Duration,
}

/// Clamp the requested refresh interval to the enforced minimum.
#[must_use]
pub fn effective_interval(requested: Duration) -> Duration {
    if requested < MIN_INTERVAL {
        warn!(
            interval = %humantime::format_duration(requested),
            "Enforcing minimum update time of 10 minutes"
        );
        return MIN_INTERVAL;
    }
    requested
}

/// Current HEAD commit hash of the registry working tree.
///
/// # Errors
///
/// Returns an error when git cannot be executed or exits non-zero.
pub async fn commit_hash(reg_dir: &Path, git_path: &Path) -> anyhow::Result<String> {
    let output = Command::new(git_path)
        .args(["log", "-1", "--format=%H"])
        .current_dir(reg_dir)
        .output()
        .await
        .with_context(|| format!("executing {}", git_path.display()))?;

    anyhow::ensure!(
        output.status.success(),
        "git log exited with {}",
        output.status
    );
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

/// Run `git pull` in the registry working tree. Failures are logged and
/// otherwise ignored; the next tick retries.
pub async fn pull(reg_dir: &Path, git_path: &Path, pull_url: &str) {
    let result = Command::new(git_path)
        .args(["pull", pull_url])
        .current_dir(reg_dir)
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            debug!(output = %String::from_utf8_lossy(&output.stdout).trim(), "git pull");
        }
        Ok(output) => error!(
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Failed to execute git pull"
        ),
        Err(err) => error!(
            git_path = %git_path.display(),
            error = %err,
            "Failed to execute git pull"
        ),
    }
}

/// Publish a freshly built registry and recompute the datasets derived
/// from it, in order: registry, ROA, DNS.
pub fn publish_snapshots(state: &AppState, registry: Registry) {
    let roa = RoaData::build(&registry, &state.data_root);
    let dns = DnsZone::build(&registry);

    state.registry.store(registry);

    match roa {
        Ok(roa) => {
            debug!(ipv4 = roa.v4.len(), ipv6 = roa.v6.len(), "ROA data updated");
            state.roa.store(Some(roa));
        }
        // the previous ROA snapshot stays live
        Err(err) => error!(error = %err, "ROA update failed, keeping previous data"),
    }

    state.dns.store(dns);
}

/// The refresh loop. Runs until `shutdown` flips.
pub async fn run(
    state: Arc<AppState>,
    config: RefreshConfig,
    initial_commit: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the first tick fires immediately; the initial build already ran
    ticker.tick().await;

    let mut previous = initial_commit;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("Refresh worker stopping");
                return;
            }
        }
        debug!("Refresh timer");

        if config.auto_pull {
            pull(&config.reg_dir, &config.git_path, &config.pull_url).await;
        }

        let current = match commit_hash(&config.reg_dir, &config.git_path).await {
            Ok(hash) => hash,
            Err(err) => {
                error!(error = %err, "Failed to read registry commit hash");
                continue;
            }
        };
        if current == previous {
            continue;
        }

        info!(%current, %previous, "Registry has changed, refresh started");

        let data_root = config.data_root.clone();
        let commit = current.clone();
        let built =
            tokio::task::spawn_blocking(move || Registry::build(&data_root, commit)).await;

        match built {
            Ok(registry) => {
                publish_snapshots(&state, registry);
                // only advance once the new snapshots are live
                previous = current;
            }
            Err(err) => error!(error = %err, "Registry rebuild task failed"),
        }
    }
}
