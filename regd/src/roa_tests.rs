#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::registry::Registry;
use crate::roa::{IpFamily, ROA_VALIDITY_SECS, RoaData};
use crate::test_fixtures::{write_object, write_schema};

fn write_route_schemas(data: &Path) {
    write_schema(data, "schema", &["ref", "key"]);
    write_schema(
        data,
        "route",
        &["route required single", "origin required multiple", "max-length optional single"],
    );
    write_schema(
        data,
        "route6",
        &["route6 required single", "origin required multiple", "max-length optional single"],
    );
}

/// Build a registry with the given route objects and filter files.
fn route_fixture(
    filter: &str,
    filter6: &str,
    routes: &[(&str, &[(&str, &str)])],
) -> (TempDir, Registry) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path();

    write_route_schemas(data);
    for (name, attributes) in routes {
        write_object(&data.join("route"), name, attributes);
    }
    fs::write(data.join("filter.txt"), filter).unwrap();
    fs::write(data.join("filter6.txt"), filter6).unwrap();

    let registry = Registry::build(data, "deadbeef");
    (tmp, registry)
}

#[test]
fn test_roa_happy_path() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[
                ("route", "172.20.0.0/16"),
                ("origin", "AS4242420000"),
                ("max-length", "22"),
            ],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert_eq!(roa.v4.len(), 1);
    assert_eq!(roa.v4[0].prefix, "172.20.0.0/16");
    assert_eq!(roa.v4[0].max_len, 22);
    assert_eq!(roa.v4[0].asn, "AS4242420000");
    assert!(roa.v6.is_empty());
}

#[test]
fn test_roa_filter_max_len_wins_over_local() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[
                ("route", "172.20.0.0/16"),
                ("origin", "AS4242420000"),
                ("max-length", "30"),
            ],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert_eq!(roa.v4[0].max_len, 24, "filter cap has precedence");
}

#[test]
fn test_roa_local_max_len_below_filter_min_is_ignored() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[
                ("route", "172.20.0.0/16"),
                ("origin", "AS4242420000"),
                ("max-length", "10"),
            ],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert_eq!(roa.v4[0].max_len, 24);
}

#[test]
fn test_roa_deny_filter_emits_nothing() {
    let (tmp, registry) = route_fixture(
        "1 deny 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[("route", "172.20.0.0/16"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert!(roa.v4.is_empty());
}

#[test]
fn test_roa_filters_match_by_number_order() {
    // the deny rule carries the lower number, so it matches first even
    // though the file lists it second
    let (tmp, registry) = route_fixture(
        "2 permit 172.20.0.0/14 14 24\n1 deny 172.20.0.0/16 16 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[("route", "172.20.0.0/16"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert!(roa.v4.is_empty());
}

#[test]
fn test_roa_prefix_longer_than_max_len_is_dropped() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_26",
            &[("route", "172.20.0.0/26"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert!(roa.v4.is_empty());
}

#[test]
fn test_roa_non_canonical_cidr_is_dropped() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.1_16",
            &[("route", "172.20.0.1/16"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert!(roa.v4.is_empty());
}

#[test]
fn test_roa_unmatched_prefix_is_dropped() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "10.1.0.0_16",
            &[("route", "10.1.0.0/16"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert!(roa.v4.is_empty());
}

#[test]
fn test_roa_route_without_origin_is_dropped() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[("172.20.0.0_16", &[("route", "172.20.0.0/16")])],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert!(roa.v4.is_empty());
}

#[test]
fn test_roa_multiple_origins_emit_multiple_triples() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[
                ("route", "172.20.0.0/16"),
                ("origin", "AS4242420000"),
                ("origin", "AS4242420001"),
            ],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    let asns: Vec<&str> = roa.v4.iter().map(|r| r.asn.as_str()).collect();
    assert_eq!(asns, ["AS4242420000", "AS4242420001"]);
}

#[test]
fn test_roa_missing_filter_file_aborts() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[("route", "172.20.0.0/16"), ("origin", "AS4242420000")],
        )],
    );

    fs::remove_file(tmp.path().join("filter6.txt")).unwrap();
    assert!(RoaData::build(&registry, tmp.path()).is_err());
}

#[test]
fn test_roa_filter_file_comments_and_bad_lines() {
    let filter = "\
# prefix filters
1 permit 172.20.0.0/14 14 24   # the main block
not-a-number permit 172.24.0.0/16 16 24
3 permit not-a-cidr 16 24
short line
";
    let (tmp, registry) = route_fixture(
        filter,
        "",
        &[(
            "172.20.0.0_16",
            &[("route", "172.20.0.0/16"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert_eq!(roa.filters.len(), 1);
    assert_eq!(roa.v4.len(), 1);
}

#[test]
fn test_roa_ipv6_routes_compile() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path();
    write_route_schemas(data);
    write_object(
        &data.join("route6"),
        "fd42:1::_48",
        &[("route6", "fd42:1::/48"), ("origin", "AS4242420000")],
    );
    fs::write(data.join("filter.txt"), "").unwrap();
    fs::write(data.join("filter6.txt"), "1 permit fd00::/8 8 64\n").unwrap();

    let registry = Registry::build(data, "deadbeef");
    let roa = RoaData::build(&registry, data).unwrap();
    assert!(roa.v4.is_empty());
    assert_eq!(roa.v6.len(), 1);
    assert_eq!(roa.v6[0].prefix, "fd42:1::/48");
    assert_eq!(roa.v6[0].max_len, 64);
}

#[test]
fn test_roa_emitted_triples_satisfy_filter_bounds() {
    let filter = "\
1 permit 172.20.0.0/14 21 29
2 permit 172.31.0.0/16 16 24
";
    let (tmp, registry) = route_fixture(
        filter,
        "",
        &[
            (
                "172.20.0.0_24",
                &[
                    ("route", "172.20.0.0/24"),
                    ("origin", "AS4242420000"),
                    ("max-length", "28"),
                ],
            ),
            (
                "172.31.1.0_24",
                &[("route", "172.31.1.0/24"), ("origin", "AS4242420001")],
            ),
        ],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert_eq!(roa.v4.len(), 2);

    for triple in &roa.v4 {
        let network: ipnet::IpNet = triple.prefix.parse().unwrap();
        let filter = roa
            .filters
            .iter()
            .find(|f| f.network.contains(&network.network()))
            .unwrap();
        assert_eq!(filter.action, "permit");
        assert!(network.prefix_len() <= triple.max_len);
        assert!(triple.max_len <= filter.max_len);
        assert!(triple.max_len > filter.min_len);
    }
}

#[test]
fn test_roa_json_document() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[("route", "172.20.0.0/16"), ("origin", "AS4242420000")],
        )],
    );

    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    assert_eq!(roa.json.metadata.counts, 1);
    let generated = roa.json.metadata.generated;
    let valid = roa.json.metadata.valid.load(std::sync::atomic::Ordering::Relaxed);
    assert_eq!(valid, generated + ROA_VALIDITY_SECS);

    let value = serde_json::to_value(&roa.json).unwrap();
    assert_eq!(value["roas"][0]["prefix"], "172.20.0.0/16");
    assert_eq!(value["roas"][0]["maxLength"], 24);
    assert_eq!(value["roas"][0]["asn"], "AS4242420000");
    assert_eq!(value["metadata"]["counts"], 1);
}

#[test]
fn test_roa_validity_extension_near_expiry() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "",
        &[(
            "172.20.0.0_16",
            &[("route", "172.20.0.0/16"), ("origin", "AS4242420000")],
        )],
    );
    let roa = RoaData::build(&registry, tmp.path()).unwrap();
    let initial = roa.json.metadata.valid.load(std::sync::atomic::Ordering::Relaxed);

    // plenty of validity left: untouched
    roa.json.refresh_validity(initial - ROA_VALIDITY_SECS / 2);
    assert_eq!(
        roa.json.metadata.valid.load(std::sync::atomic::Ordering::Relaxed),
        initial
    );

    // inside the final quarter of the window: extended by a full period
    roa.json.refresh_validity(initial - ROA_VALIDITY_SECS / 8);
    assert_eq!(
        roa.json.metadata.valid.load(std::sync::atomic::Ordering::Relaxed),
        initial + ROA_VALIDITY_SECS
    );
}

#[test]
fn test_roa_filters_for_families() {
    let (tmp, registry) = route_fixture(
        "1 permit 172.20.0.0/14 14 24\n",
        "1 permit fd00::/8 8 64\n",
        &[],
    );
    let roa = RoaData::build(&registry, tmp.path()).unwrap();

    assert_eq!(roa.filters_for(true, false).len(), 1);
    assert_eq!(roa.filters_for(false, true).len(), 1);
    assert_eq!(roa.filters_for(true, true).len(), 2);
    assert_eq!(roa.filters_for(true, false)[0].family, IpFamily::V4);
}
