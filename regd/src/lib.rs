pub mod attributes;
pub mod dns;
pub mod query;
pub mod registry;
pub mod roa;
pub mod schema;
pub mod store;





#[cfg(test)]
mod roa_tests;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types
pub use attributes::Attribute;
pub use dns::{DnsRecord, DnsZone};
pub use query::{KeyIndexRef, filter_attributes, filter_keys, filter_objects, filter_types};
pub use registry::{Object, RegType, Registry, make_path};
pub use roa::{IpFamily, PrefixRoa, RoaData, RoaError, RoaFilter, RoaJson};
pub use schema::{AttributeSchema, TypeSchema};
pub use store::Store;
