//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use reftree_core::{
    config::ReftreeConfig,
    properties::{LinkDescriptor, ResolvedEntry},
    source::MemorySource,
};
use serde_json::json;

pub const LOCALE: &str = "en-US";

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Default configuration without the inter-batch pause.
#[allow(dead_code)]
pub fn fast_config() -> ReftreeConfig {
    let mut config = ReftreeConfig::default();
    config.batch.delay_ms = 0;
    config
}

#[allow(dead_code)]
pub fn entry(id: &str, content_type: &str) -> ResolvedEntry {
    let mut entry = ResolvedEntry::new(id, content_type);
    entry.set_field("name", LOCALE, json!(id));
    entry
}

/// An entry whose `field` links to `targets`, in order.
#[allow(dead_code)]
pub fn linking(mut entry: ResolvedEntry, field: &str, targets: &[&str]) -> ResolvedEntry {
    let links: Vec<_> = targets
        .iter()
        .map(|id| LinkDescriptor::internal(*id))
        .collect();
    entry.set_links(field, LOCALE, &links);
    entry
}

/// Ids referenced from `id.field` in the store, in array order.
#[allow(dead_code)]
pub fn stored_targets(source: &MemorySource, id: &str, field: &str) -> Vec<String> {
    source
        .peek(id)
        .map(|entry| {
            entry
                .links(field, LOCALE)
                .unwrap()
                .into_iter()
                .map(|link| link.target_id)
                .collect()
        })
        .unwrap_or_default()
}

/// A trip (a `place`) listing one place `P` through `places`. `P` contains two points of
/// interest and a sub-place, and links an app and a web variant.
///
/// ```text
/// trip --places--> P --linkedItems--> [poi1, sub, poi2]
///                    --linkedVariants--> [vApp, vWeb]
/// ```
#[allow(dead_code)]
pub fn trip_fixture() -> MemorySource {
    let source = MemorySource::new(LOCALE);
    source.insert(linking(entry("trip", "place"), "places", &["P"]));
    let place = linking(entry("P", "place"), "linkedItems", &["poi1", "sub", "poi2"]);
    source.insert(linking(place, "linkedVariants", &["vApp", "vWeb"]));
    source.insert(entry("poi1", "poi"));
    source.insert(entry("poi2", "poi"));
    source.insert(entry("sub", "place"));
    let mut app = entry("vApp", "poiVariantApp");
    app.set_field("description", LOCALE, json!("Harbour walk"));
    source.insert(app);
    source.insert(entry("vWeb", "poiVariantWeb"));
    source
}
