// Content-type registry
//
// Maps a content type id to the role it plays in a reference tree and to the
// fields that carry its child references. Entries whose content type is not
// registered are still attached to the tree, as opaque leaves.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

use crate::config::ContentTypesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Aggregates child references (e.g. a place).
    Container,
    /// Terminal entry (e.g. a point of interest).
    Leaf,
    /// Channel-specific alternate of a container or leaf.
    Variant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeSchema {
    pub role: NodeRole,
    /// Reference-bearing fields expanded when a node of this type recurses.
    pub reference_fields: Vec<String>,
    /// Siblings of a demoted type are moved behind all other siblings.
    pub demoted: bool,
}

impl ContentTypeSchema {
    pub fn container(fields: &[&str]) -> Self {
        ContentTypeSchema {
            role: NodeRole::Container,
            reference_fields: fields.iter().map(|f| f.to_string()).collect(),
            demoted: false,
        }
    }

    pub fn leaf() -> Self {
        ContentTypeSchema {
            role: NodeRole::Leaf,
            reference_fields: Vec::new(),
            demoted: false,
        }
    }

    pub fn variant() -> Self {
        ContentTypeSchema {
            role: NodeRole::Variant,
            reference_fields: Vec::new(),
            demoted: false,
        }
    }
}

/// Thread-safe registry of content-type schemas. Clones share the same table.
#[derive(Debug, Default)]
pub struct ContentTypeRegistry(Arc<RwLock<HashMap<String, Arc<ContentTypeSchema>>>>);

impl Clone for ContentTypeRegistry {
    fn clone(&self) -> Self {
        ContentTypeRegistry(self.0.clone())
    }
}

impl ContentTypeRegistry {
    /// Build the registry described by the `[content_types]` config section.
    pub fn from_config(config: &ContentTypesConfig) -> Self {
        let registry = ContentTypeRegistry::default();
        registry.register(
            &config.container,
            ContentTypeSchema::container(&["linkedItems", "places", "linkedVariants"]),
        );
        if let Some(taxonomy) = &config.taxonomy {
            registry.register(taxonomy, ContentTypeSchema::container(&["taxonomy"]));
        }
        for leaf in &config.leaf {
            registry.register(leaf, ContentTypeSchema::leaf());
        }
        for variant in &config.variant {
            registry.register(variant, ContentTypeSchema::variant());
        }
        if let Some(low) = &config.low_priority {
            registry.demote(low);
        }
        registry
    }

    /// Register a schema, replacing (and logging) any previous one under the same name.
    pub fn register(&self, content_type: &str, schema: ContentTypeSchema) {
        let mut writer = self.0.write();
        if writer.contains_key(content_type) {
            tracing::info!(
                "[ContentTypeRegistry::register] Overwriting existing schema: {}",
                content_type
            );
        }
        writer.insert(content_type.to_string(), Arc::new(schema));
    }

    /// Mark a content type as demoted in sibling ordering, registering it as a leaf if unknown.
    pub fn demote(&self, content_type: &str) {
        let mut writer = self.0.write();
        let mut schema = writer
            .get(content_type)
            .map(|s| ContentTypeSchema::clone(s))
            .unwrap_or_else(ContentTypeSchema::leaf);
        schema.demoted = true;
        writer.insert(content_type.to_string(), Arc::new(schema));
    }

    pub fn get(&self, content_type: &str) -> Option<Arc<ContentTypeSchema>> {
        self.0.read().get(content_type).cloned()
    }

    pub fn role_of(&self, content_type: &str) -> Option<NodeRole> {
        self.get(content_type).map(|s| s.role)
    }

    pub fn is_demoted(&self, content_type: &str) -> bool {
        self.get(content_type).is_some_and(|s| s.demoted)
    }

    pub fn list_content_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.read().keys().cloned().collect();
        names.sort();
        names
    }
}
