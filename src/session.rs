//! Materialization sessions.
//!
//! A [`TreeSession`] owns the tree for one root entry. Every refresh throws the tree away and
//! materializes a new one. Each pass is tagged with a generation number taken when it starts; a
//! pass that finishes after a newer one has started is discarded instead of committed, so a slow
//! materialization for an old root can never overwrite the tree of the current one.
//!
//! Edits go through the [`Gateway`] and are followed by a refresh.

use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    batch::BatchScheduler,
    config::ReftreeConfig,
    error::ReftreeError,
    event::{RefreshTrigger, TreeEvent},
    gateway::{Gateway, Notifier, TracingNotifier, LINKED_VARIANTS_FIELD},
    paging::Pager,
    properties::ResolvedEntry,
    resolver::resolve_all,
    schema::{ContentTypeRegistry, NodeRole},
    source::ContentSource,
    tree::{LoadState, Materialized, Materializer, TreeNode},
    variant::{VariantSelector, DEFAULT_SELECTION_FIELD},
};

pub struct TreeSession<S, N: Notifier = TracingNotifier> {
    source: Arc<S>,
    config: ReftreeConfig,
    registry: ContentTypeRegistry,
    notifier: N,
    generation: AtomicU64,
    root_id: RwLock<Option<String>>,
    current: RwLock<Option<Arc<Materialized>>>,
    pagers: RwLock<BTreeMap<String, Pager>>,
    events: Option<UnboundedSender<TreeEvent>>,
}

impl<S: ContentSource> TreeSession<S, TracingNotifier> {
    pub fn new(source: Arc<S>, config: ReftreeConfig) -> Self {
        TreeSession::with_notifier(source, config, TracingNotifier)
    }
}

impl<S: ContentSource, N: Notifier> TreeSession<S, N> {
    pub fn with_notifier(source: Arc<S>, config: ReftreeConfig, notifier: N) -> Self {
        let registry = ContentTypeRegistry::from_config(&config.content_types);
        TreeSession {
            source,
            config,
            registry,
            notifier,
            generation: AtomicU64::new(0),
            root_id: RwLock::new(None),
            current: RwLock::new(None),
            pagers: RwLock::new(BTreeMap::new()),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: UnboundedSender<TreeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn registry(&self) -> &ContentTypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ReftreeConfig {
        &self.config
    }

    pub fn root_id(&self) -> Option<String> {
        self.root_id.read().clone()
    }

    /// Generation of the most recently started pass.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The last committed tree, if any.
    pub fn current(&self) -> Option<Arc<Materialized>> {
        self.current.read().clone()
    }

    fn emit(&self, event: TreeEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.send(event) {
                tracing::debug!("Session event dropped: {}", ReftreeError::from(e));
            }
        }
    }

    fn gateway(&self) -> Gateway<'_, S, &N> {
        Gateway::with_notifier(
            self.source.as_ref(),
            self.config.locale.clone(),
            self.config.content_types.clone_target.clone(),
            &self.notifier,
        )
    }

    fn selector(&self) -> VariantSelector {
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, self.config.locale.clone());
        match &self.config.api.shared {
            Some(space) => selector.with_space(space.clone()),
            None => selector,
        }
    }

    /// Switch to a new root. Nothing from the previous root survives.
    pub fn set_root<I: Into<String>>(&self, root_id: I) {
        *self.root_id.write() = Some(root_id.into());
        *self.current.write() = None;
        self.pagers.write().clear();
    }

    /// React to a host notification by re-materializing.
    pub async fn on_trigger(
        &self,
        trigger: RefreshTrigger,
    ) -> Result<Option<Arc<Materialized>>, ReftreeError> {
        tracing::debug!("Refresh triggered by {trigger}");
        if let RefreshTrigger::RootChanged(root_id) = trigger {
            self.set_root(root_id);
        }
        self.refresh().await
    }

    /// Materialize the current root and commit the result.
    ///
    /// Returns `Ok(None)` when a newer pass started while this one was running; its result is
    /// dropped and the newer pass's tree wins.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Option<Arc<Materialized>>, ReftreeError> {
        let root_id = self
            .root_id()
            .ok_or_else(|| ReftreeError::Validation("no root entry selected".to_string()))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit(TreeEvent::Started(generation, root_id.clone()));

        let scheduler = BatchScheduler::from_config(&self.config.batch)?;
        let mut materializer = Materializer::new(
            self.source.as_ref(),
            self.registry.clone(),
            self.config.locale.clone(),
            scheduler,
        );
        if let Some(tx) = &self.events {
            materializer = materializer.with_events(tx.clone());
        }
        let result = materializer
            .materialize(&root_id, self.config.tree.max_depth)
            .await;

        let mut current = self.current.write();
        if self.generation() != generation {
            tracing::debug!("Discarding stale materialization {generation} of {root_id}");
            self.emit(TreeEvent::Discarded(generation));
            return Ok(None);
        }
        let materialized = Arc::new(result?);
        *current = Some(materialized.clone());
        drop(current);
        self.emit(TreeEvent::Materialized(
            generation,
            root_id,
            materialized.root.node_count(),
        ));
        Ok(Some(materialized))
    }

    /// Refresh after an edit. Without a root there is no tree to rebuild.
    async fn refresh_if_rooted(&self) -> Result<(), ReftreeError> {
        if self.root_id().is_some() {
            self.refresh().await?;
        }
        Ok(())
    }

    fn find_node(&self, id: &str) -> Option<TreeNode> {
        self.current()
            .and_then(|tree| tree.root.find(id).cloned())
    }

    /// Variants linked from `container_id`, taken from the current tree when it expanded them and
    /// fetched otherwise (leaves and pending containers carry no children).
    pub async fn variants_of(&self, container_id: &str) -> Result<Vec<ResolvedEntry>, ReftreeError> {
        if let Some(node) = self.find_node(container_id) {
            if node.role == NodeRole::Container && node.load_state != LoadState::Pending {
                return Ok(node
                    .children_via(LINKED_VARIANTS_FIELD)
                    .map(|child| child.entry.clone())
                    .collect());
            }
        }
        let container = self.source.get_entry(container_id).await?;
        let links = container.links(LINKED_VARIANTS_FIELD, &self.config.locale)?;
        let mut scheduler = BatchScheduler::from_config(&self.config.batch)?;
        let report = resolve_all(&mut scheduler, self.source.as_ref(), &links).await;
        Ok(report.into_entries())
    }

    /// Select or deselect `variant_id` (one of `place_id`'s variants) on `parent_id`.
    pub async fn toggle_variant(
        &self,
        parent_id: &str,
        place_id: &str,
        variant_id: &str,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let variants = self.variants_of(place_id).await?;
        let selected = variants
            .iter()
            .find(|v| v.id == variant_id)
            .cloned()
            .ok_or_else(|| {
                ReftreeError::Validation(format!("{variant_id} is not a variant of {place_id}"))
            })?;
        let updated = self
            .gateway()
            .toggle_variant(&self.selector(), parent_id, &variants, &selected)
            .await?;
        self.emit(TreeEvent::ReferencesUpdated(
            parent_id.to_string(),
            DEFAULT_SELECTION_FIELD.to_string(),
        ));
        self.refresh_if_rooted().await?;
        Ok(updated)
    }

    /// Remove the last reference to `target_id` from `container_id.field`, touch the root, and
    /// refresh.
    pub async fn remove_reference(
        &self,
        container_id: &str,
        field: &str,
        target_id: &str,
    ) -> Result<(), ReftreeError> {
        let root_id = self.root_id();
        self.gateway()
            .remove_reference(container_id, field, target_id, root_id.as_deref())
            .await?;
        self.emit(TreeEvent::ReferencesUpdated(
            container_id.to_string(),
            field.to_string(),
        ));
        self.refresh_if_rooted().await?;
        Ok(())
    }

    /// Remove `container_id` and all of its variants from `parent_id.field`, then refresh.
    pub async fn remove_container_and_variants(
        &self,
        parent_id: &str,
        field: &str,
        container_id: &str,
    ) -> Result<(), ReftreeError> {
        let variant_ids: Vec<String> = self
            .variants_of(container_id)
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();
        self.gateway()
            .remove_container_and_variants(parent_id, field, container_id, &variant_ids)
            .await?;
        self.emit(TreeEvent::ReferencesUpdated(
            parent_id.to_string(),
            field.to_string(),
        ));
        self.refresh_if_rooted().await?;
        Ok(())
    }

    /// Clone `variant_id` under `owner_id`. The tree is refreshed whether or not the clone
    /// succeeded, since a failure part way through may still have written.
    pub async fn clone_variant(
        &self,
        owner_id: &str,
        variant_id: &str,
        new_name: &str,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let result = async {
            let variant = self.source.get_entry(variant_id).await?;
            self.gateway()
                .clone_variant(owner_id, &variant, new_name)
                .await
        }
        .await;
        if let Ok(clone) = &result {
            self.emit(TreeEvent::VariantCloned(
                variant_id.to_string(),
                clone.id.clone(),
            ));
        }
        if let Err(e) = self.refresh_if_rooted().await {
            tracing::warn!("Refresh after clone failed: {e}");
        }
        result
    }

    /// Page state of `container_id`; containers start on the first page at the configured size.
    pub fn pager(&self, container_id: &str) -> Result<Pager, ReftreeError> {
        match self.pagers.read().get(container_id) {
            Some(pager) => Ok(*pager),
            None => Pager::new(self.config.tree.page_size),
        }
    }

    /// The children of `container_id` on its current page.
    pub fn visible_children(&self, container_id: &str) -> Result<Vec<TreeNode>, ReftreeError> {
        let Some(node) = self.find_node(container_id) else {
            return Err(ReftreeError::NotFound(format!(
                "{container_id} is not in the current tree"
            )));
        };
        let pager = self.pager(container_id)?;
        Ok(pager.page(&node.children).to_vec())
    }

    pub fn go_to_page(&self, container_id: &str, page_index: usize) -> Result<Pager, ReftreeError> {
        let total = self
            .find_node(container_id)
            .map(|node| node.children.len())
            .unwrap_or_default();
        let mut pager = self.pager(container_id)?;
        pager.go_to(page_index, total);
        self.pagers.write().insert(container_id.to_string(), pager);
        Ok(pager)
    }

    pub fn set_page_size(&self, container_id: &str, page_size: usize) -> Result<Pager, ReftreeError> {
        let mut pager = self.pager(container_id)?;
        pager.set_page_size(page_size)?;
        self.pagers.write().insert(container_id.to_string(), pager);
        Ok(pager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{properties::LinkDescriptor, source::MemorySource, tests::helpers::*};
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    fn config() -> ReftreeConfig {
        let mut config = ReftreeConfig::default();
        config.batch.delay_ms = 0;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_pass_is_discarded() {
        init_logging();
        let source = Arc::new(MemorySource::new("en-US").with_latency(Duration::from_millis(10)));
        source.insert(place("old", &["A"]));
        source.insert(place("A", &[]));
        source.insert(place("new", &[]));
        let (tx, mut rx) = unbounded_channel();
        let session = TreeSession::new(source, config()).with_events(tx);
        session.set_root("old");

        let (old, new) = tokio::join!(
            session.refresh(),
            session.on_trigger(RefreshTrigger::RootChanged("new".to_string()))
        );
        assert_eq!(old.unwrap(), None);
        assert_eq!(new.unwrap().unwrap().root.id(), "new");
        assert_eq!(session.current().unwrap().root.id(), "new");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&TreeEvent::Discarded(1)));
        assert!(events.contains(&TreeEvent::Materialized(2, "new".to_string(), 1)));
    }

    #[tokio::test]
    async fn test_refresh_without_root_is_an_error() {
        let session = TreeSession::new(Arc::new(MemorySource::new("en-US")), config());
        assert!(matches!(
            session.refresh().await,
            Err(ReftreeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_reference_refreshes_tree() {
        let source = Arc::new(MemorySource::new("en-US"));
        source.insert(place("root", &["A", "B"]));
        source.insert(place("A", &[]));
        source.insert(place("B", &[]));
        let session = TreeSession::new(source.clone(), config());
        session.on_trigger(RefreshTrigger::RootChanged("root".to_string())).await.unwrap();
        assert_eq!(session.current().unwrap().root.children.len(), 2);

        session
            .remove_reference("root", "linkedItems", "A")
            .await
            .unwrap();
        let tree = session.current().unwrap();
        let ids: Vec<&str> = tree.root.children.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["B"]);
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test]
    async fn test_page_state_is_per_container_and_reset_on_root_change() {
        let source = Arc::new(MemorySource::new("en-US"));
        let children: Vec<String> = (0..7).map(|i| format!("c{i}")).collect();
        let refs: Vec<&str> = children.iter().map(String::as_str).collect();
        source.insert(place("root", &refs));
        for child in &children {
            source.insert(place(child, &[]));
        }
        let session = TreeSession::new(source, config());
        session.set_root("root");
        session.refresh().await.unwrap();

        assert_eq!(session.visible_children("root").unwrap().len(), 3);
        session.go_to_page("root", 2).unwrap();
        let last: Vec<String> = session
            .visible_children("root")
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(last, vec!["c6"]);

        let pager = session.set_page_size("root", 10).unwrap();
        assert_eq!(pager.page_index(), 0);
        assert_eq!(session.visible_children("root").unwrap().len(), 7);

        session.set_root("root");
        assert_eq!(session.pager("root").unwrap().page_size(), 3);
    }

    #[tokio::test]
    async fn test_host_notifications_rebuild_tree() {
        let source = Arc::new(MemorySource::new("en-US"));
        source.insert(place("root", &["A"]));
        for id in ["A", "B", "C"] {
            source.insert(place(id, &[]));
        }
        let session = TreeSession::new(source.clone(), config());
        session.set_root("root");
        session.refresh().await.unwrap();
        fn ids(tree: &Materialized) -> Vec<String> {
            tree.root.children.iter().map(|c| c.id().to_string()).collect()
        }

        source.insert(place("root", &["A", "B"]));
        let tree = session
            .on_trigger(RefreshTrigger::EntrySystemChanged)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids(&tree), vec!["A", "B"]);
        assert_eq!(session.generation(), 2);

        source.insert(place("root", &["C", "A"]));
        let tree = session
            .on_trigger(RefreshTrigger::EditorClosed("C".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids(&tree), vec!["C", "A"]);
        assert_eq!(session.generation(), 3);
        assert_eq!(session.root_id().as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn test_failed_clone_still_refreshes() {
        let source = Arc::new(MemorySource::new("en-US"));
        let mut owner = place("P", &[]);
        owner.set_links("linkedVariants", "en-US", &[LinkDescriptor::internal("v1")]);
        source.insert(owner);
        source.insert(variant("v1", "poiVariantWeb"));
        let session = TreeSession::new(source.clone(), config());
        session.set_root("P");
        session.refresh().await.unwrap();
        assert_eq!(session.generation(), 1);

        source.fail_writes("P", ReftreeError::Transport("503".to_string()));
        let result = session.clone_variant("P", "v1", "copy").await;
        assert!(matches!(result, Err(ReftreeError::Transport(_))));
        assert_eq!(session.generation(), 2);
        assert!(session.current().is_some());
    }
}
