#![allow(clippy::unwrap_used)]
//! Shared on-disk fixtures for the library tests.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::registry::Registry;

/// Write one registry object file in the column-20 layout.
pub(crate) fn write_object(dir: &Path, name: &str, attributes: &[(&str, &str)]) {
    fs::create_dir_all(dir).unwrap();
    let mut out = String::new();
    for (key, value) in attributes {
        let mut lines = value.split('\n');
        let first = lines.next().unwrap_or("");
        writeln!(out, "{:<20}{}", format!("{key}:"), first).unwrap();
        for line in lines {
            if line.is_empty() {
                out.push_str("+\n");
            } else {
                writeln!(out, "{:<20}{}", "", line).unwrap();
            }
        }
    }
    fs::write(dir.join(name), out).unwrap();
}

/// Write a schema object declaring `type_name` with the given `key`
/// attribute values.
pub(crate) fn write_schema(data_root: &Path, type_name: &str, keys: &[&str]) {
    let ref_value = format!("dn42.{type_name}");
    let mut attributes: Vec<(&str, &str)> = vec![("ref", ref_value.as_str())];
    for key in keys {
        attributes.push(("key", key));
    }
    write_object(&data_root.join("schema"), type_name, &attributes);
}

/// A small mntner/person registry: two maintainers referencing one
/// person (one of them under both `admin-c` and `tech-c`).
pub(crate) fn mnt_person_registry() -> (TempDir, Registry) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path();

    write_schema(
        data,
        "schema",
        &["ref required single", "key required multiple"],
    );
    write_schema(
        data,
        "mntner",
        &[
            "mntner required single",
            "admin-c optional multiple lookup=dn42.person",
            "tech-c optional multiple lookup=dn42.person",
            "source required single",
        ],
    );
    write_schema(
        data,
        "person",
        &["person required single", "nic-hdl required single"],
    );

    write_object(
        &data.join("mntner"),
        "FOO-MNT",
        &[
            ("mntner", "FOO-MNT"),
            ("admin-c", "ALICE-DN42"),
            ("source", "DN42"),
        ],
    );
    write_object(
        &data.join("mntner"),
        "BAR-MNT",
        &[
            ("mntner", "BAR-MNT"),
            ("admin-c", "ALICE-DN42"),
            ("tech-c", "ALICE-DN42"),
            ("source", "DN42"),
        ],
    );
    write_object(
        &data.join("person"),
        "ALICE-DN42",
        &[("person", "Alice Example"), ("nic-hdl", "ALICE-DN42")],
    );

    let registry = Registry::build(data, "deadbeef");
    (tmp, registry)
}
