//! Route Origin Authorization pipeline.
//!
//! Recomputed on every registry publication: loads the textual prefix
//! filter files, scans every `route`/`route6` object through them and
//! emits the validated `(prefix, maxLength, asn)` triples consumed by the
//! GoRTR JSON and BIRD endpoints. A filter file failure aborts the whole
//! update so the previous ROA snapshot stays live.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::registry::Registry;

/// ROA validity period in seconds. Deliberately long: registry updates
/// can be infrequent and downstream RTR consumers must not expire the
/// table between them.
pub const ROA_VALIDITY_SECS: u32 = 7 * 24 * 3600;

/// Errors that abort a ROA update.
#[derive(Debug, Error)]
pub enum RoaError {
    /// A prefix filter file could not be read.
    #[error("unable to read filter file {path}: {source}")]
    FilterRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// IP family a filter line applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// One validated ROA triple.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PrefixRoa {
    pub prefix: String,
    #[serde(rename = "maxLength")]
    pub max_len: u8,
    pub asn: String,
}

impl PrefixRoa {
    /// The origin ASN without its `AS` prefix, as BIRD wants it.
    #[must_use]
    pub fn asn_number(&self) -> &str {
        self.asn.get(2..).unwrap_or(&self.asn)
    }
}

/// One line of a prefix filter file.
#[derive(Debug, Clone, Serialize)]
pub struct RoaFilter {
    #[serde(rename = "nr")]
    pub number: u32,
    pub action: String,
    pub prefix: String,
    #[serde(rename = "minlen")]
    pub min_len: u8,
    #[serde(rename = "maxlen")]
    pub max_len: u8,
    #[serde(skip)]
    pub network: IpNet,
    #[serde(skip)]
    pub family: IpFamily,
}

/// Metadata of the GoRTR JSON document.
///
/// `valid` is the one piece of published state that moves after
/// publication: handlers extend it in place when it nears expiry. It only
/// ever grows, so racing readers are harmless.
#[derive(Debug, Serialize)]
pub struct RoaMetaData {
    pub counts: u32,
    pub generated: u32,
    pub valid: AtomicU32,
}

/// GoRTR-compatible JSON document, precomputed at publication.
#[derive(Debug, Serialize)]
pub struct RoaJson {
    pub metadata: RoaMetaData,
    pub roas: Vec<PrefixRoa>,
}

impl RoaJson {
    /// Extend the validity window when less than a quarter of it
    /// remains, keeping long-quiescent registries from expiring
    /// downstream.
    pub fn refresh_validity(&self, now: u32) {
        let valid = self.metadata.valid.load(Ordering::Relaxed);
        if now >= valid || valid - now < ROA_VALIDITY_SECS / 4 {
            self.metadata
                .valid
                .fetch_add(ROA_VALIDITY_SECS, Ordering::Relaxed);
        }
    }
}

/// One published ROA snapshot.
#[derive(Debug)]
pub struct RoaData {
    pub generated: DateTime<Utc>,
    pub commit: String,
    pub filters: Vec<RoaFilter>,
    pub v4: Vec<PrefixRoa>,
    pub v6: Vec<PrefixRoa>,
    /// The precomputed `/roa/json` document.
    pub json: RoaJson,
}

impl RoaData {
    /// Compile a fresh ROA snapshot from the registry and the filter
    /// files under `data_root`.
    ///
    /// # Errors
    ///
    /// Returns [`RoaError`] when either filter file cannot be read; the
    /// caller keeps the previous snapshot in that case.
    pub fn build(registry: &Registry, data_root: &Path) -> Result<RoaData, RoaError> {
        let generated = Utc::now();

        let mut filters = load_filter(&data_root.join("filter.txt"), IpFamily::V4)?;
        filters.extend(load_filter(&data_root.join("filter6.txt"), IpFamily::V6)?);

        let v4 = compile_roa(registry, "route", &filters);
        let v6 = compile_roa(registry, "route6", &filters);
        debug!(ipv4 = v4.len(), ipv6 = v6.len(), "ROA data compiled");

        let utime = u32::try_from(generated.timestamp()).unwrap_or_default();
        let mut roas = v4.clone();
        roas.extend(v6.iter().cloned());

        let json = RoaJson {
            metadata: RoaMetaData {
                counts: u32::try_from(roas.len()).unwrap_or(u32::MAX),
                generated: utime,
                valid: AtomicU32::new(utime + ROA_VALIDITY_SECS),
            },
            roas,
        };

        Ok(RoaData {
            generated,
            commit: registry.commit.clone(),
            filters,
            v4,
            v6,
            json,
        })
    }

    /// The filters for the requested families, in matching order.
    #[must_use]
    pub fn filters_for(&self, v4: bool, v6: bool) -> Vec<&RoaFilter> {
        self.filters
            .iter()
            .filter(|f| match f.family {
                IpFamily::V4 => v4,
                IpFamily::V6 => v6,
            })
            .collect()
    }
}

/// Load one prefix filter file.
///
/// `#` starts a line comment; each remaining line with at least five
/// whitespace-separated fields parses as
/// `number action prefix min_len max_len`. Lines with malformed numbers
/// or CIDRs are logged and dropped. Filters sort by their own `number`,
/// ascending, which fixes the match order.
fn load_filter(path: &Path, family: IpFamily) -> Result<Vec<RoaFilter>, RoaError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        error!(path = %path.display(), error = %source, "Unable to open filter file");
        RoaError::FilterRead {
            path: path.to_owned(),
            source,
        }
    })?;

    let mut filters = Vec::new();
    for line in content.lines() {
        let line = match line.split_once('#') {
            Some((data, _comment)) => data,
            None => line,
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            continue;
        }

        let Ok(network) = fields[2].parse::<IpNet>() else {
            error!(path = %path.display(), prefix = fields[2], "Unable to parse CIDR in filter file");
            continue;
        };
        let (Ok(number), Ok(min_len), Ok(max_len)) = (
            fields[0].parse::<u32>(),
            fields[3].parse::<u8>(),
            fields[4].parse::<u8>(),
        ) else {
            error!(path = %path.display(), line, "Unable to parse number in filter file");
            continue;
        };

        filters.push(RoaFilter {
            number,
            action: fields[1].to_owned(),
            prefix: fields[2].to_owned(),
            min_len,
            max_len,
            network: network.trunc(),
            family,
        });
    }

    filters.sort_by_key(|f| f.number);
    Ok(filters)
}

/// First filter whose network contains `ip`, scanning in number order.
fn match_filter<'a>(filters: &'a [RoaFilter], ip: IpAddr) -> Option<&'a RoaFilter> {
    let found = filters.iter().find(|f| f.network.contains(&ip));
    if found.is_none() {
        error!(ip = %ip, "Couldn't match address to filter");
    }
    found
}

/// Scan every object of `type_name` (`route` or `route6`) and emit the
/// triples its filters permit.
fn compile_roa(registry: &Registry, type_name: &str, filters: &[RoaFilter]) -> Vec<PrefixRoa> {
    let Some(schema) = registry.schema.get(type_name) else {
        return Vec::new();
    };
    let Some(route_index) = schema.key_index.get(type_name) else {
        return Vec::new();
    };
    let origin_index = schema.key_index.get("origin");
    let mlen_index = schema.key_index.get("max-length");

    let mut roas = Vec::with_capacity(route_index.len());

    for (object_path, route_ixs) in route_index {
        let Some(object) = registry.get_object(object_path) else {
            continue;
        };
        if route_ixs.len() > 1 {
            warn!(object = %object_path, "Found object with multiple route attributes");
        }

        let prefix = &object.attributes[route_ixs[0]].raw_value;
        let Ok(network) = prefix.parse::<IpNet>() else {
            error!(object = %object_path, %prefix, "Unable to parse CIDR in ROA");
            continue;
        };

        // reject prefixes with host bits set
        if network.addr() != network.network() {
            warn!(%prefix, "Denied ROA: invalid CIDR");
            continue;
        }

        let Some(filter) = match_filter(filters, network.network()) else {
            continue;
        };
        if filter.action == "deny" {
            warn!(
                object = %object_path,
                %prefix,
                filter = %filter.prefix,
                "Denied ROA: through filter rule"
            );
            continue;
        }

        let mut max_len = filter.max_len;
        if let Some(mlen_ixs) = mlen_index.and_then(|m| m.get(object_path)) {
            let raw = &object.attributes[mlen_ixs[0]].raw_value;
            match raw.parse::<u8>() {
                // filter rules keep precedence over local values
                Ok(local) if local < max_len && local > filter.min_len => max_len = local,
                Ok(_) => {}
                Err(err) => warn!(
                    object = %object_path,
                    max_length = %raw,
                    error = %err,
                    "Unable to convert max-length attribute"
                ),
            }
        }

        // a prefix longer than the max length could never be announced
        if network.prefix_len() > max_len {
            warn!(
                object = %object_path,
                %prefix,
                maxlen = max_len,
                "Denied ROA: prefix exceeds max length"
            );
            continue;
        }

        match origin_index.and_then(|m| m.get(object_path)) {
            None => warn!(object = %object_path, "Route object without origin"),
            Some(origin_ixs) => {
                for &origin_ix in origin_ixs {
                    roas.push(PrefixRoa {
                        prefix: network.to_string(),
                        max_len,
                        asn: object.attributes[origin_ix].raw_value.clone(),
                    });
                }
            }
        }
    }

    roas
}
