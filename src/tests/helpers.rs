//! Shared test utilities for building entry fixtures

use crate::properties::{LinkDescriptor, ResolvedEntry};
use serde_json::Value;

pub const LOCALE: &str = "en-US";

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// An entry of `content_type` whose `name` is `name`.
pub fn named(id: &str, content_type: &str, name: &str) -> ResolvedEntry {
    let mut entry = ResolvedEntry::new(id, content_type);
    entry.set_field("name", LOCALE, Value::String(name.to_string()));
    entry
}

/// A `place` named after its id, referencing `children` through `linkedItems`.
pub fn place(id: &str, children: &[&str]) -> ResolvedEntry {
    let mut entry = named(id, "place", id);
    let links: Vec<_> = children
        .iter()
        .map(|child| LinkDescriptor::internal(*child))
        .collect();
    entry.set_links("linkedItems", LOCALE, &links);
    entry
}

/// A `poi` leaf named after its id.
pub fn poi(id: &str) -> ResolvedEntry {
    named(id, "poi", id)
}

/// A variant entry of the given channel content type.
pub fn variant(id: &str, content_type: &str) -> ResolvedEntry {
    named(id, content_type, id)
}
