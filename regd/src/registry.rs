//! In-memory registry data model and snapshot builder.
//!
//! A [`Registry`] is one immutable snapshot of the whole registry tree:
//! every type directory loaded, every attribute validated against the
//! schema, relation values decorated as `[raw](type/name)` and backlinks
//! recorded on the referenced objects. Snapshots are built from scratch on
//! every commit change and swapped in whole; nothing in here mutates a
//! published snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::attributes::{Attribute, load_attributes};
use crate::schema::TypeSchema;

/// Build an object path from its type and name.
#[must_use]
pub fn make_path(type_name: &str, object_name: &str) -> String {
    format!("{type_name}/{object_name}")
}

/// One registry object: an ordered attribute list plus the paths of the
/// objects that reference this one.
#[derive(Debug, Clone, Default)]
pub struct Object {
    /// Full path of this object, `<type>/<name>`.
    pub path: String,
    pub attributes: Vec<Attribute>,
    /// Paths of objects whose attributes resolve to this object.
    /// A set: an object referencing this one under several keys
    /// (`admin-c` and `tech-c`, typically) appears once.
    pub backlinks: BTreeSet<String>,
}

impl Object {
    /// Attributes exactly matching `key`, in file order.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Vec<&Attribute> {
        self.attributes.iter().filter(|a| a.key == key).collect()
    }

    /// The single attribute for `key`, or `None` (logged) when the key is
    /// missing or repeated.
    #[must_use]
    pub fn get_single_key(&self, key: &str) -> Option<&Attribute> {
        let attributes = self.get_key(key);
        if attributes.len() != 1 {
            error!(key, object = %self.path, "Unable to find unique key in object");
            return None;
        }
        Some(attributes[0])
    }
}

/// A registry type: a named collection of objects.
#[derive(Debug, Clone, Default)]
pub struct RegType {
    pub name: String,
    pub objects: BTreeMap<String, Object>,
}

impl RegType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        RegType {
            name: name.into(),
            objects: BTreeMap::new(),
        }
    }

    /// Load every object file in `dir` into this type.
    ///
    /// Dotfiles and subdirectories are skipped. When a schema is given,
    /// attributes are validated against it; the bootstrap pass for the
    /// `schema` type itself runs without one.
    fn load_objects(&mut self, schema: Option<&TypeSchema>, dir: &Path) {
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    error!(
                        path = %dir.display(),
                        r#type = %self.name,
                        error = %err,
                        "Failed to read registry type directory"
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                warn!(path = %entry.path().display(), "Skipping non-UTF-8 file name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let mut attributes = load_attributes(entry.path());
            if let Some(schema) = schema {
                attributes = schema.validate(attributes);
            }

            self.objects.insert(
                name.to_owned(),
                Object {
                    path: make_path(&self.name, name),
                    attributes,
                    backlinks: BTreeSet::new(),
                },
            );
        }

        debug!(
            r#type = %self.name,
            path = %dir.display(),
            count = self.objects.len(),
            "Loaded registry type"
        );
    }
}

/// One immutable registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Git commit hash this snapshot was built from.
    pub commit: String,
    pub schema: BTreeMap<String, TypeSchema>,
    pub types: BTreeMap<String, RegType>,
}

impl Registry {
    /// Build a full snapshot from the registry data tree.
    ///
    /// The build is best-effort: unreadable files and schema violations
    /// are logged and elided rather than failing the whole snapshot.
    #[must_use]
    pub fn build(data_root: &Path, commit: impl Into<String>) -> Registry {
        debug!("Reloading registry");

        let mut registry = Registry {
            commit: commit.into(),
            ..Registry::default()
        };

        // bootstrap the schema registry type, then parse it to discover
        // the remaining types
        registry
            .types
            .insert("schema".to_owned(), RegType::new("schema"));
        registry.load_type("schema", data_root);
        registry.parse_schema();

        // load every type, including a second validated pass over the
        // schema type itself
        let type_names: Vec<String> = registry.types.keys().cloned().collect();
        for type_name in &type_names {
            registry.load_type(type_name, data_root);
        }

        registry.decorate();
        registry
    }

    /// Look up an object by its `<type>/<name>` path.
    #[must_use]
    pub fn get_object(&self, path: &str) -> Option<&Object> {
        let (type_name, object_name) = path.split_once('/')?;
        self.types.get(type_name)?.objects.get(object_name)
    }

    /// Load the objects of one type from its data directory.
    fn load_type(&mut self, type_name: &str, data_root: &Path) {
        // the domain type lives under dns/, every other type under its
        // own name
        let dir = if type_name == "domain" {
            data_root.join("dns")
        } else {
            data_root.join(type_name)
        };

        let Registry { schema, types, .. } = self;
        let Some(rtype) = types.get_mut(type_name) else {
            return;
        };
        rtype.load_objects(schema.get(type_name), &dir);
    }

    /// Parse the bootstrap-loaded `schema` objects into type schemas.
    ///
    /// Runs two passes: the first creates a [`TypeSchema`] per schema
    /// object (pre-creating an empty [`RegType`] for each discovered type
    /// name), the second resolves `lookup=` relation directives against
    /// the now-complete type set.
    fn parse_schema(&mut self) {
        let mut declared: Vec<(String, Vec<String>)> = Vec::new();

        if let Some(schema_type) = self.types.get("schema") {
            for object in schema_type.objects.values() {
                let Some(ref_attr) = object.get_single_key("ref") else {
                    error!(object = %object.path, "Schema record without ref");
                    continue;
                };
                let type_name = strip_dn42(&ref_attr.raw_value).to_owned();
                let keys = object
                    .get_key("key")
                    .iter()
                    .map(|a| a.raw_value.clone())
                    .collect();
                declared.push((type_name, keys));
            }
        }

        for (type_name, keys) in declared {
            let mut type_schema = TypeSchema::new(&type_name);
            for raw in keys {
                let mut tokens = raw.split_whitespace().map(str::to_owned);
                let Some(key_name) = tokens.next() else {
                    warn!(schema = %type_name, "Empty key attribute in schema");
                    continue;
                };
                type_schema.attributes.insert(
                    key_name,
                    crate::schema::AttributeSchema {
                        fields: tokens.collect(),
                        relations: Vec::new(),
                    },
                );
            }

            // ensure the type exists so later relation resolution always
            // finds its target
            self.types
                .entry(type_name.clone())
                .or_insert_with(|| RegType::new(&type_name));
            self.schema.insert(type_name, type_schema);
        }

        // second pass: resolve lookup= relations now that every type has
        // been pre-created
        let Registry { schema, types, .. } = self;
        for type_schema in schema.values_mut() {
            for (attr_name, attr_schema) in &mut type_schema.attributes {
                for field in &attr_schema.fields {
                    let Some(rels) = field.strip_prefix("lookup=") else {
                        continue;
                    };

                    let mut relations = Vec::new();
                    for rel in rels.split(',') {
                        let rel_name = strip_dn42(rel);
                        if types.contains_key(rel_name) {
                            relations.push(rel_name.to_owned());
                        } else if type_schema.name != "schema" {
                            // the schema type's own lookup= fields
                            // reference pseudo-types by design
                            error!(
                                relation = rel_name,
                                attribute = %attr_name,
                                r#type = %type_schema.name,
                                "Relation to type that does not exist"
                            );
                        }
                    }
                    attr_schema.relations = relations;

                    // only the first lookup= directive counts
                    break;
                }
            }
        }

        debug!("Schema parsing complete");
    }

    /// Decorate every attribute and build the key indices.
    ///
    /// Decoration fills `Attribute::value` (plain copy, or
    /// `[raw](type/name)` on the first matching relation), records a
    /// backlink on the referenced object and appends each attribute to
    /// its type's key index. Computed against the immutable object maps
    /// first, then applied, so relation probes always see the complete
    /// snapshot.
    fn decorate(&mut self) {
        let mut total = 0usize;
        let mut matched = 0usize;
        let mut patches: Vec<Patch> = Vec::new();

        let Registry { schema, types, .. } = self;
        for (type_name, rtype) in types.iter() {
            let Some(type_schema) = schema.get_mut(type_name) else {
                warn!(r#type = %type_name, "Type without schema, attributes left undecorated");
                for (object_name, object) in &rtype.objects {
                    for (attr_ix, attribute) in object.attributes.iter().enumerate() {
                        patches.push(Patch {
                            source: (type_name.clone(), object_name.clone()),
                            attr_ix,
                            value: attribute.raw_value.clone(),
                            backlink: None,
                        });
                    }
                }
                continue;
            };

            for (object_name, object) in &rtype.objects {
                for (attr_ix, attribute) in object.attributes.iter().enumerate() {
                    total += 1;
                    type_schema.add_key_index(&object.path, &attribute.key, attr_ix);

                    // relations may be absent entirely for user defined
                    // (x-*) keys
                    let relations = type_schema
                        .attributes
                        .get(&attribute.key)
                        .map_or(&[] as &[String], |a| a.relations.as_slice());

                    let target = relations.iter().find_map(|rel_name| {
                        types
                            .get(rel_name)
                            .and_then(|rel| rel.objects.get(&attribute.raw_value))
                            .map(|target| (rel_name.clone(), target.path.clone()))
                    });

                    let (value, backlink) = match target {
                        Some((rel_name, target_path)) => {
                            matched += 1;
                            (
                                format!("[{}]({})", attribute.raw_value, target_path),
                                Some((rel_name, attribute.raw_value.clone())),
                            )
                        }
                        None => (attribute.raw_value.clone(), None),
                    };

                    patches.push(Patch {
                        source: (type_name.clone(), object_name.clone()),
                        attr_ix,
                        value,
                        backlink,
                    });
                }
            }
        }

        for patch in patches {
            let (source_type, source_name) = &patch.source;
            let source_path = make_path(source_type, source_name);

            if let Some((target_type, target_name)) = &patch.backlink
                && let Some(target) = self
                    .types
                    .get_mut(target_type)
                    .and_then(|t| t.objects.get_mut(target_name))
            {
                target.backlinks.insert(source_path);
            }

            if let Some(object) = self
                .types
                .get_mut(source_type)
                .and_then(|t| t.objects.get_mut(source_name))
            {
                object.attributes[patch.attr_ix].value = patch.value;
            }
        }

        debug!(attributes = total, matched, "Decoration complete");
    }
}

/// One deferred decoration: the value to assign to an attribute and the
/// backlink to record for it.
struct Patch {
    /// `(type name, object name)` of the attribute's owner.
    source: (String, String),
    attr_ix: usize,
    value: String,
    /// `(type name, object name)` of the resolved relation target.
    backlink: Option<(String, String)>,
}

/// Strip the `dn42.` namespace prefix used in schema directives.
fn strip_dn42(name: &str) -> &str {
    name.strip_prefix("dn42.").unwrap_or(name)
}
