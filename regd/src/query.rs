//! Hierarchical registry queries.
//!
//! Queries narrow through four levels, `type / object / key / attribute`,
//! each with the same filter semantics: a filter starting with `*` is a
//! case-insensitive substring match (`*` alone matches everything), any
//! other filter is an exact, case-sensitive lookup returning at most one
//! item per parent.

use std::collections::BTreeMap;

use crate::attributes::Attribute;
use crate::registry::{Object, RegType, Registry};

/// One key's slice of a type's inverted index, as matched by
/// [`filter_keys`].
#[derive(Debug, Clone, Copy)]
pub struct KeyIndexRef<'a> {
    /// The attribute key this index covers.
    pub key: &'a str,
    /// object path -> ordered attribute indices.
    pub entries: &'a BTreeMap<String, Vec<usize>>,
}

/// Split a filter into its match mode.
enum Filter<'a> {
    Exact(&'a str),
    /// Lowercased substring; empty matches everything.
    Substring(String),
}

impl<'a> Filter<'a> {
    fn parse(filter: &'a str) -> Self {
        match filter.strip_prefix('*') {
            Some(rest) => Filter::Substring(rest.to_lowercase()),
            None => Filter::Exact(filter),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            Filter::Exact(wanted) => *wanted == candidate,
            Filter::Substring(wanted) => {
                wanted.is_empty() || candidate.to_lowercase().contains(wanted.as_str())
            }
        }
    }
}

/// Types matching the filter. Exact filters return at most one type.
#[must_use]
pub fn filter_types<'a>(registry: &'a Registry, filter: &str) -> Vec<&'a RegType> {
    match Filter::parse(filter) {
        Filter::Exact(name) => registry.types.get(name).into_iter().collect(),
        substring => registry
            .types
            .values()
            .filter(|rtype| substring.matches(&rtype.name))
            .collect(),
    }
}

/// Objects from `types` matching the filter.
///
/// Exact filters look up the object name in each type; wildcard filters
/// substring-match the full object path.
#[must_use]
pub fn filter_objects<'a>(types: &[&'a RegType], filter: &str) -> Vec<&'a Object> {
    match Filter::parse(filter) {
        Filter::Exact(name) => types
            .iter()
            .filter_map(|rtype| rtype.objects.get(name))
            .collect(),
        substring => types
            .iter()
            .flat_map(|rtype| rtype.objects.values())
            .filter(|object| substring.matches(&object.path))
            .collect(),
    }
}

/// Key indices from the schemas of `types` matching the filter.
#[must_use]
pub fn filter_keys<'a>(
    registry: &'a Registry,
    types: &[&'a RegType],
    filter: &str,
) -> Vec<KeyIndexRef<'a>> {
    let filter = Filter::parse(filter);
    let mut indices = Vec::new();

    for rtype in types {
        let Some(schema) = registry.schema.get(&rtype.name) else {
            continue;
        };
        match &filter {
            Filter::Exact(name) => {
                if let Some((key, entries)) = schema.key_index.get_key_value(*name) {
                    indices.push(KeyIndexRef {
                        key: key.as_str(),
                        entries,
                    });
                }
            }
            substring => {
                for (key, entries) in &schema.key_index {
                    if substring.matches(key) {
                        indices.push(KeyIndexRef {
                            key: key.as_str(),
                            entries,
                        });
                    }
                }
            }
        }
    }

    indices
}

/// Attribute values under the given key indices and objects that match
/// the filter, as `object path -> key -> values`.
///
/// Values are raw when `raw` is set, decorated otherwise; matching always
/// runs against the raw value.
#[must_use]
pub fn filter_attributes(
    indices: &[KeyIndexRef<'_>],
    objects: &[&Object],
    filter: &str,
    raw: bool,
) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    let filter = Filter::parse(filter);
    let mut result: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();

    for index in indices {
        for object in objects {
            let Some(attr_ixs) = index.entries.get(&object.path) else {
                continue;
            };

            for &attr_ix in attr_ixs {
                let attribute = &object.attributes[attr_ix];
                if !matches_attribute(attribute, &filter) {
                    continue;
                }
                let value = if raw {
                    attribute.raw_value.clone()
                } else {
                    attribute.value.clone()
                };
                result
                    .entry(object.path.clone())
                    .or_default()
                    .entry(index.key.to_owned())
                    .or_default()
                    .push(value);
            }
        }
    }

    result
}

fn matches_attribute(attribute: &Attribute, filter: &Filter<'_>) -> bool {
    filter.matches(&attribute.raw_value)
}
