//! DN42 root zone synthesis.
//!
//! Rebuilt on every registry publication: the fixed set of zones that are
//! authoritative within DN42 plus a stub delegation for every TLD
//! `domain` object, rendered as JSON or as BIND zone file lines.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::registry::Registry;

/// Zones authoritative within DN42, as `(zone name, registry object
/// path)`. Kept in emission order.
pub const ROOT_AUTH_ZONES: &[(&str, &str)] = &[
    ("dn42", "domain/dn42"),
    ("recursive-servers.dn42", "domain/recursive-servers.dn42"),
    ("delegation-servers.dn42", "domain/delegation-servers.dn42"),
    ("d.f.ip6.arpa", "inet6num/fd00::_8"),
    ("20.172.in-addr.arpa", "inetnum/172.20.0.0_16"),
    ("21.172.in-addr.arpa", "inetnum/172.21.0.0_16"),
    ("22.172.in-addr.arpa", "inetnum/172.22.0.0_16"),
    ("23.172.in-addr.arpa", "inetnum/172.23.0.0_16"),
    ("31.172.in-addr.arpa", "inetnum/172.31.0.0_16"),
    ("10.in-addr.arpa", "inetnum/10.0.0.0_8"),
];

const AUTH_COMMENT: &str = "DN42 Authoritative Zone";
const FORWARD_COMMENT: &str = "Forward Zone";

/// One root zone record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DnsRecord {
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl DnsRecord {
    /// Render as one BIND zone file line.
    #[must_use]
    pub fn to_bind_line(&self) -> String {
        let comment = if self.comment.is_empty() {
            String::new()
        } else {
            format!("\t; {}", self.comment)
        };
        format!(
            "{}\tIN\t{}\t{}{}",
            self.name, self.record_type, self.content, comment
        )
    }
}

/// One published root zone snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DnsZone {
    pub records: Vec<DnsRecord>,
    pub commit: String,
    pub generated: DateTime<Utc>,
}

impl DnsZone {
    /// Synthesize the root zone from a registry snapshot.
    #[must_use]
    pub fn build(registry: &Registry) -> DnsZone {
        let mut zone = DnsZone {
            records: Vec::new(),
            commit: registry.commit.clone(),
            generated: Utc::now(),
        };

        // zones that are authoritative within DN42
        for &(name, path) in ROOT_AUTH_ZONES {
            zone.add_records(registry, name, path, AUTH_COMMENT);
        }

        // stub records for every TLD domain object
        if let Some(domains) = registry.types.get("domain") {
            for (name, object) in &domains.objects {
                // a domain is a TLD if its name has no '.'; zones already
                // authoritative above are not repeated
                if !name.contains('.')
                    && !ROOT_AUTH_ZONES.iter().any(|&(auth, _)| auth == name.as_str())
                {
                    zone.add_records(registry, name, &object.path, FORWARD_COMMENT);
                }
            }
        }

        zone
    }

    /// Render the whole zone in BIND format with its header.
    #[must_use]
    pub fn to_bind(&self) -> String {
        let mut out = format!(
            ";; DN42 Root Zone Records\n;; Commit Reference: {}\n;; Generated: {}\n",
            self.commit, self.generated
        );
        for record in &self.records {
            out.push_str(&record.to_bind_line());
            out.push('\n');
        }
        out
    }

    fn add_record(&mut self, name: &str, record_type: &str, content: String, comment: &str) {
        self.records.push(DnsRecord {
            name: name.to_owned(),
            record_type: record_type.to_owned(),
            content,
            comment: comment.to_owned(),
        });
    }

    /// Emit the `nserver` and `ds-rdata` records of one registry object
    /// into the zone.
    fn add_records(&mut self, registry: &Registry, name: &str, path: &str, comment: &str) {
        let Some(object) = registry.get_object(path) else {
            error!(zone = name, path, "Unable to find object in registry");
            return;
        };

        for nserver in object.get_key("nserver") {
            self.add_nserver(name, &nserver.raw_value, comment);
        }
        for ds in object.get_key("ds-rdata") {
            self.add_record(name, "DS", ds.raw_value.clone(), comment);
        }
    }

    /// One NS record, with a glue A/AAAA stub when the value carries an
    /// address.
    fn add_nserver(&mut self, zone: &str, raw_value: &str, comment: &str) {
        let fields: Vec<&str> = raw_value.split(' ').collect();
        if let [host, glue_ip] = fields[..] {
            let stub_type = if glue_ip.contains(':') { "AAAA" } else { "A" };
            self.add_record(zone, "NS", format!("{host}."), comment);
            self.add_record(host, stub_type, glue_ip.to_owned(), comment);
        } else {
            self.add_record(zone, "NS", format!("{raw_value}."), comment);
        }
    }
}
