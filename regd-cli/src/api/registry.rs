//! Registry query endpoints.

// axum handlers must be async even when they never await
#![allow(clippy::unused_async)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use regd::{filter_attributes, filter_keys, filter_objects, filter_types};

use super::{AppState, not_found, registry_cached};

/// Registry metadata, uncacheable by design: clients poll it to detect
/// new commits.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegMeta {
    commit: String,
}

/// Decorated object body: ordered `(key, value)` pairs plus backlink
/// paths.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectResponse {
    attributes: Vec<(String, String)>,
    backlinks: Vec<String>,
}

/// `?raw` switches any registry endpoint to undecorated values.
fn is_raw(query: &HashMap<String, String>) -> bool {
    query.contains_key("raw")
}

/// `GET /api/registry/` - object counts per type.
pub async fn root(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.registry.load();

    let response: BTreeMap<&str, usize> = registry
        .types
        .values()
        .map(|rtype| (rtype.name.as_str(), rtype.objects.len()))
        .collect();

    registry_cached(&registry.commit, Json(response))
}

/// `GET /api/registry/.meta` - current commit hash.
pub async fn meta(State(state): State<Arc<AppState>>) -> Response {
    let registry = state.registry.load();

    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(RegMeta {
            commit: registry.commit.clone(),
        }),
    )
        .into_response()
}

/// `GET /api/registry/{type}` - object names per matching type.
pub async fn by_type(
    State(state): State<Arc<AppState>>,
    Path(type_filter): Path<String>,
) -> Response {
    let registry = state.registry.load();

    let types = filter_types(&registry, &type_filter);
    if types.is_empty() {
        return not_found(format!("No objects matching '{type_filter}' found"));
    }

    let response: BTreeMap<&str, Vec<&String>> = types
        .iter()
        .map(|rtype| (rtype.name.as_str(), rtype.objects.keys().collect()))
        .collect();

    registry_cached(&registry.commit, Json(response))
}

/// `GET /api/registry/{type}/{object}` - matching objects, decorated or
/// raw.
pub async fn by_object(
    State(state): State<Arc<AppState>>,
    Path((type_filter, object_filter)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let registry = state.registry.load();

    let types = filter_types(&registry, &type_filter);
    if types.is_empty() {
        return not_found(format!("No objects matching '{type_filter}' found"));
    }
    let objects = filter_objects(&types, &object_filter);
    if objects.is_empty() {
        return not_found(format!(
            "No objects matching '{type_filter}/{object_filter}' found"
        ));
    }

    if is_raw(&query) {
        let response: BTreeMap<&str, Vec<(&str, &str)>> = objects
            .iter()
            .map(|object| {
                let attributes = object
                    .attributes
                    .iter()
                    .map(|a| (a.key.as_str(), a.raw_value.as_str()))
                    .collect();
                (object.path.as_str(), attributes)
            })
            .collect();
        return registry_cached(&registry.commit, Json(response));
    }

    let response: BTreeMap<&str, ObjectResponse> = objects
        .iter()
        .map(|object| {
            let attributes = object
                .attributes
                .iter()
                .map(|a| (a.key.clone(), a.value.clone()))
                .collect();
            let backlinks = object.backlinks.iter().cloned().collect();
            (
                object.path.as_str(),
                ObjectResponse {
                    attributes,
                    backlinks,
                },
            )
        })
        .collect();

    registry_cached(&registry.commit, Json(response))
}

/// `GET /api/registry/{type}/{object}/{key}` - attribute values under
/// matching keys.
pub async fn by_key(
    State(state): State<Arc<AppState>>,
    Path((type_filter, object_filter, key_filter)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    attribute_query(
        &state,
        &type_filter,
        &object_filter,
        &key_filter,
        None,
        is_raw(&query),
    )
}

/// `GET /api/registry/{type}/{object}/{key}/{attribute}` - attribute
/// values matching the final filter.
pub async fn by_attribute(
    State(state): State<Arc<AppState>>,
    Path((type_filter, object_filter, key_filter, attribute_filter)): Path<(
        String,
        String,
        String,
        String,
    )>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    attribute_query(
        &state,
        &type_filter,
        &object_filter,
        &key_filter,
        Some(&attribute_filter),
        is_raw(&query),
    )
}

/// Shared resolution for the key and attribute levels. A `None`
/// attribute filter matches every value (the key-level endpoint).
fn attribute_query(
    state: &AppState,
    type_filter: &str,
    object_filter: &str,
    key_filter: &str,
    attribute_filter: Option<&str>,
    raw: bool,
) -> Response {
    let registry = state.registry.load();

    let types = filter_types(&registry, type_filter);
    if types.is_empty() {
        return not_found(format!("No objects matching '{type_filter}' found"));
    }
    // a key filter matching no schema key does not gate on its own: an
    // empty index set simply yields no attributes below
    let indices = filter_keys(&registry, &types, key_filter);
    let objects = filter_objects(&types, object_filter);
    if objects.is_empty() {
        return not_found(format!(
            "No objects matching '{type_filter}/{object_filter}' found"
        ));
    }

    let attributes = filter_attributes(&indices, &objects, attribute_filter.unwrap_or("*"), raw);
    if attributes.is_empty() {
        let miss = match attribute_filter {
            Some(attribute_filter) => format!(
                "No attributes matching '{type_filter}/{object_filter}/{key_filter}/{attribute_filter}' found"
            ),
            None => format!(
                "No attributes matching '{type_filter}/{object_filter}/{key_filter}' found"
            ),
        };
        return not_found(miss);
    }

    registry_cached(&registry.commit, Json(attributes))
}
