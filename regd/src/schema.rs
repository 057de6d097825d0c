//! Registry type schemas.
//!
//! The registry schema is itself registry data: every object under
//! `schema/` declares one registry type, its permitted attribute keys and
//! the `lookup=` relations that link attribute values to objects of other
//! types. [`crate::Registry::parse_schema`] populates these structures from
//! the bootstrap-loaded `schema` type.

use std::collections::BTreeMap;

use tracing::error;

use crate::attributes::Attribute;

/// Schema for a single attribute key.
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    /// Schema directive tokens following the key name, verbatim
    /// (e.g. `["schema-of", "aut-num", "lookup=aut-num"]`).
    pub fields: Vec<String>,
    /// Type names resolved from the first `lookup=` directive, in
    /// declaration order. Stored by name rather than by reference so the
    /// object graph carries no ownership cycles.
    pub relations: Vec<String>,
}

/// Per-key inverted index: key -> object path -> ordered indices into
/// that object's attribute list.
pub type KeyIndex = BTreeMap<String, BTreeMap<String, Vec<usize>>>;

/// Schema for one registry type.
#[derive(Debug, Clone, Default)]
pub struct TypeSchema {
    pub name: String,
    pub attributes: BTreeMap<String, AttributeSchema>,
    pub key_index: KeyIndex,
}

impl TypeSchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        TypeSchema {
            name: name.into(),
            ..TypeSchema::default()
        }
    }

    /// Validate attributes against this schema.
    ///
    /// Keys beginning with `x-` are user defined and bypass validation.
    /// Any other key missing from the schema drops its attribute with an
    /// error log.
    #[must_use]
    pub fn validate(&self, attributes: Vec<Attribute>) -> Vec<Attribute> {
        attributes
            .into_iter()
            .filter(|attribute| {
                if attribute.key.starts_with("x-") || self.attributes.contains_key(&attribute.key)
                {
                    true
                } else {
                    error!(
                        key = %attribute.key,
                        schema = %self.name,
                        "Schema validation failed"
                    );
                    false
                }
            })
            .collect()
    }

    /// Record that `object_path` carries `key` at attribute position
    /// `attr_ix`. Indices are appended in file order, preserving the
    /// in-object ordering of repeated keys.
    pub fn add_key_index(&mut self, object_path: &str, key: &str, attr_ix: usize) {
        self.key_index
            .entry(key.to_owned())
            .or_default()
            .entry(object_path.to_owned())
            .or_default()
            .push(attr_ix);
    }
}
