//! Materialization of an entry's reference tree.
//!
//! Starting from a root entry, every reference-bearing field of a container is resolved (through
//! the batch scheduler) and each resolved child is classified by its content type:
//!
//! - **container** types recurse until `max_depth`; a container at the depth cap is attached
//!   with [`LoadState::Pending`] and no children,
//! - **leaf** and **variant** types are attached without recursing,
//! - anything unregistered is attached as an opaque leaf labelled [`PLACEHOLDER_LABEL`].
//!
//! Failed lookups and references back to an ancestor are dropped from `children` and recorded in
//! [`Materialized::dropped`]. Within a container, children of a demoted content type are moved
//! behind their siblings by a stable partition; everything else keeps source order.
//!
//! Trees are never patched: every refresh builds a new one.

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    batch::{BatchScheduler, FixedDelay, Throttle},
    error::ReftreeError,
    event::TreeEvent,
    properties::{display_content_type, LinkDescriptor, ResolvedEntry},
    resolver::resolve_all,
    schema::{ContentTypeRegistry, NodeRole},
    source::ContentSource,
};

/// Label given to entries whose content type has no registered schema.
pub const PLACEHOLDER_LABEL: &str = "To Do";

const TAXONOMY_NAME_FIELD: &str = "taxonomyName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// Not expanded (depth cap reached).
    Pending,
    Loaded,
    /// Expanded, but one or more references could not be resolved and were dropped.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub entry: ResolvedEntry,
    pub role: NodeRole,
    /// True when the content type is not registered.
    pub opaque: bool,
    pub label: String,
    /// Field of the parent this node was linked from; `None` for the root.
    pub via_field: Option<String>,
    pub children: Vec<TreeNode>,
    pub load_state: LoadState,
}

impl TreeNode {
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }

    /// Pre-order `(id, role)` sequence of the subtree.
    pub fn outline(&self) -> Vec<(String, NodeRole)> {
        let mut out = Vec::with_capacity(self.node_count());
        self.walk(&mut |node, _depth| out.push((node.entry.id.clone(), node.role)));
        out
    }

    /// Visit every node pre-order with its depth relative to self.
    pub fn walk<F: FnMut(&TreeNode, usize)>(&self, visit: &mut F) {
        fn inner<F: FnMut(&TreeNode, usize)>(node: &TreeNode, depth: usize, visit: &mut F) {
            visit(node, depth);
            for child in &node.children {
                inner(child, depth + 1, visit);
            }
        }
        inner(self, 0, visit)
    }

    /// First node with `id`, pre-order.
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        if self.entry.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Direct children linked through `field`.
    pub fn children_via<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a TreeNode> + 'a {
        self.children
            .iter()
            .filter(move |child| child.via_field.as_deref() == Some(field))
    }
}

/// A reference that did not make it into the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedChild {
    pub parent_id: String,
    pub field: String,
    pub target: LinkDescriptor,
    pub reason: ReftreeError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    pub root: TreeNode,
    pub dropped: Vec<DroppedChild>,
}

pub struct Materializer<'s, S, T: Throttle = FixedDelay> {
    source: &'s S,
    registry: ContentTypeRegistry,
    locale: String,
    scheduler: BatchScheduler<T>,
    events: Option<UnboundedSender<TreeEvent>>,
}

impl<'s, S: ContentSource, T: Throttle> Materializer<'s, S, T> {
    pub fn new<L: Into<String>>(
        source: &'s S,
        registry: ContentTypeRegistry,
        locale: L,
        scheduler: BatchScheduler<T>,
    ) -> Self {
        Materializer {
            source,
            registry,
            locale: locale.into(),
            scheduler,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: UnboundedSender<TreeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Read `root_id` and expand its references up to `max_depth` levels below it.
    ///
    /// Only a failure to read the root itself is an error.
    #[tracing::instrument(skip(self))]
    pub async fn materialize(
        &mut self,
        root_id: &str,
        max_depth: usize,
    ) -> Result<Materialized, ReftreeError> {
        let root_entry = self.source.get_entry(root_id).await?;
        let mut dropped = Vec::new();
        let mut ancestors = Vec::new();
        let root = self
            .expand(root_entry, None, 0, max_depth, &mut ancestors, &mut dropped)
            .await;
        tracing::info!(
            "Materialized {root_id}: {} nodes, {} dropped references",
            root.node_count(),
            dropped.len()
        );
        Ok(Materialized { root, dropped })
    }

    fn label_for(&self, entry: &ResolvedEntry, opaque: bool) -> String {
        if opaque {
            return PLACEHOLDER_LABEL.to_string();
        }
        let name = entry
            .name(&self.locale)
            .or_else(|| {
                entry
                    .field(TAXONOMY_NAME_FIELD, &self.locale)
                    .and_then(|v| v.as_str())
            })
            .unwrap_or("Untitled");
        format!("{} - {}", display_content_type(&entry.content_type), name)
    }

    fn drop_child(
        &self,
        dropped: &mut Vec<DroppedChild>,
        parent_id: &str,
        field: &str,
        target: LinkDescriptor,
        reason: ReftreeError,
    ) {
        if let Some(tx) = &self.events {
            let event = TreeEvent::ChildDropped(
                parent_id.to_string(),
                target.target_id.clone(),
                reason.to_string(),
            );
            if tx.send(event).is_err() {
                tracing::debug!("Tree event listener is gone");
            }
        }
        dropped.push(DroppedChild {
            parent_id: parent_id.to_string(),
            field: field.to_string(),
            target,
            reason,
        });
    }

    fn expand<'a>(
        &'a mut self,
        entry: ResolvedEntry,
        via_field: Option<String>,
        depth: usize,
        max_depth: usize,
        ancestors: &'a mut Vec<String>,
        dropped: &'a mut Vec<DroppedChild>,
    ) -> BoxFuture<'a, TreeNode> {
        async move {
            let schema = self.registry.get(&entry.content_type);
            let Some(schema) = schema else {
                tracing::debug!(
                    "Unknown content type '{}' for {}, attaching placeholder",
                    entry.content_type,
                    entry.id
                );
                let label = self.label_for(&entry, true);
                return TreeNode {
                    entry,
                    role: NodeRole::Leaf,
                    opaque: true,
                    label,
                    via_field,
                    children: Vec::new(),
                    load_state: LoadState::Loaded,
                };
            };
            let label = self.label_for(&entry, false);
            if schema.role != NodeRole::Container {
                return TreeNode {
                    entry,
                    role: schema.role,
                    opaque: false,
                    label,
                    via_field,
                    children: Vec::new(),
                    load_state: LoadState::Loaded,
                };
            }
            if depth >= max_depth {
                return TreeNode {
                    entry,
                    role: NodeRole::Container,
                    opaque: false,
                    label,
                    via_field,
                    children: Vec::new(),
                    load_state: LoadState::Pending,
                };
            }

            ancestors.push(entry.id.clone());
            let mut children = Vec::new();
            let mut failed = false;
            for field in &schema.reference_fields {
                let links = match entry.links(field, &self.locale) {
                    Ok(links) => links,
                    Err(e) => {
                        tracing::warn!("Treating {}.{field} as empty: {e}", entry.id);
                        Vec::new()
                    }
                };
                let mut fetchable = Vec::with_capacity(links.len());
                for link in links {
                    if ancestors.contains(&link.target_id) {
                        tracing::warn!(
                            "Dropping reference {}.{field} -> {}: it points back to an ancestor",
                            entry.id,
                            link.target_id
                        );
                        let reason = ReftreeError::CycleDetected(format!(
                            "{} -> {}",
                            ancestors.join(" -> "),
                            link.target_id
                        ));
                        self.drop_child(dropped, &entry.id, field, link, reason);
                    } else {
                        fetchable.push(link);
                    }
                }
                let report = resolve_all(&mut self.scheduler, self.source, &fetchable).await;
                for (link, result) in report.results {
                    match result {
                        Ok(child) => {
                            let node = self
                                .expand(
                                    child,
                                    Some(field.clone()),
                                    depth + 1,
                                    max_depth,
                                    ancestors,
                                    dropped,
                                )
                                .await;
                            children.push(node);
                        }
                        Err(reason) => {
                            failed = true;
                            self.drop_child(dropped, &entry.id, field, link, reason);
                        }
                    }
                }
            }
            ancestors.pop();

            demote_siblings(&mut children, &self.registry);
            TreeNode {
                entry,
                role: NodeRole::Container,
                opaque: false,
                label,
                via_field,
                children,
                load_state: if failed {
                    LoadState::Failed
                } else {
                    LoadState::Loaded
                },
            }
        }
        .boxed()
    }
}

/// Stable partition: demoted content types go last, all relative orders are kept.
pub fn demote_siblings(children: &mut Vec<TreeNode>, registry: &ContentTypeRegistry) {
    let (front, back): (Vec<TreeNode>, Vec<TreeNode>) = children
        .drain(..)
        .partition(|child| !registry.is_demoted(&child.entry.content_type));
    children.extend(front);
    children.extend(back);
}
