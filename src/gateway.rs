//! Read-modify-write edits of reference fields.
//!
//! Every operation reads the entry it changes immediately before writing and sends back the
//! version it read, so a concurrent edit surfaces as [`ReftreeError::Conflict`] instead of being
//! silently overwritten. Nothing is retried or rolled back. Outcomes are reported to a
//! [`Notifier`] and returned to the caller.

use serde_json::Value;
use std::collections::HashSet;

use crate::{
    error::ReftreeError,
    properties::{Fields, LinkDescriptor, ResolvedEntry, DESCRIPTION_FIELD, NAME_FIELD},
    source::ContentSource,
    variant::VariantSelector,
};

pub const LINKED_VARIANTS_FIELD: &str = "linkedVariants";

/// Fields copied from a variant onto its clone when present.
const CLONED_FIELDS: &[&str] = &[DESCRIPTION_FIELD, "media", "migrationLocked"];

/// User-facing notifications.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn success(&self, message: &str) {
        (**self).success(message)
    }

    fn error(&self, message: &str) {
        (**self).error(message)
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

pub struct Gateway<'s, S, N: Notifier = TracingNotifier> {
    source: &'s S,
    locale: String,
    clone_target: String,
    notifier: N,
}

impl<'s, S: ContentSource> Gateway<'s, S, TracingNotifier> {
    pub fn new<L: Into<String>, C: Into<String>>(source: &'s S, locale: L, clone_target: C) -> Self {
        Gateway::with_notifier(source, locale, clone_target, TracingNotifier)
    }
}

impl<'s, S: ContentSource, N: Notifier> Gateway<'s, S, N> {
    pub fn with_notifier<L: Into<String>, C: Into<String>>(
        source: &'s S,
        locale: L,
        clone_target: C,
        notifier: N,
    ) -> Self {
        Gateway {
            source,
            locale: locale.into(),
            clone_target: clone_target.into(),
            notifier,
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    async fn write_references(
        &self,
        entry: &ResolvedEntry,
        field: &str,
        values: Vec<Value>,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let mut fields: Fields = entry.fields.clone();
        fields
            .entry(field.to_string())
            .or_default()
            .insert(self.locale.clone(), Value::Array(values));
        self.source
            .update_entry(&entry.id, entry.version, &fields)
            .await
    }

    fn report<T>(
        &self,
        result: Result<T, ReftreeError>,
        success: &str,
        failure: &str,
    ) -> Result<T, ReftreeError> {
        match &result {
            Ok(_) => self.notifier.success(success),
            Err(e) => {
                tracing::error!("{failure}: {e}");
                self.notifier.error(failure);
            }
        }
        result
    }

    /// Remove the last reference to `target_id` from `container_id.field`; earlier duplicates
    /// stay. When `root_container_id` is given, that entry is re-saved unchanged afterwards so
    /// its version moves and downstream caches notice.
    #[tracing::instrument(skip(self))]
    pub async fn remove_reference(
        &self,
        container_id: &str,
        field: &str,
        target_id: &str,
        root_container_id: Option<&str>,
    ) -> Result<(), ReftreeError> {
        let result = async {
            let container = self.source.get_entry(container_id).await?;
            let mut values = container.reference_values(field, &self.locale)?;
            match values
                .iter()
                .rposition(|v| LinkDescriptor::target_of(v).as_deref() == Some(target_id))
            {
                Some(index) => {
                    values.remove(index);
                    self.write_references(&container, field, values).await?;
                }
                None => {
                    tracing::info!("{container_id}.{field} has no reference to {target_id}");
                }
            }
            Ok::<_, ReftreeError>(())
        }
        .await;
        self.report(
            result,
            "Reference removed successfully!",
            "Failed to remove reference.",
        )?;

        // The removal is already persisted; a failed re-save only leaves caches stale.
        if let Some(root_id) = root_container_id {
            if let Err(e) = self.touch(root_id).await {
                tracing::warn!("Re-saving root {root_id} after removal failed: {e}");
                self.notifier
                    .error("Reference removed, but re-saving the root entry failed.");
            }
        }
        Ok(())
    }

    /// Re-save an entry unchanged.
    pub async fn touch(&self, id: &str) -> Result<ResolvedEntry, ReftreeError> {
        let entry = self.source.get_entry(id).await?;
        self.source
            .update_entry(&entry.id, entry.version, &entry.fields)
            .await
    }

    /// Persist a reference array computed from `container` as read at `container.version`.
    pub async fn set_references(
        &self,
        container: &ResolvedEntry,
        field: &str,
        references: &[LinkDescriptor],
    ) -> Result<ResolvedEntry, ReftreeError> {
        let values = references.iter().map(LinkDescriptor::to_link_value).collect();
        let result = self.write_references(container, field, values).await;
        self.report(
            result,
            "Updated linked variant successfully!",
            "Failed to update linked variant.",
        )
    }

    /// Read `container_id` fresh, toggle `selected` among `variants`, and write the result back.
    #[tracing::instrument(skip(self, selector, variants, selected), fields(selected = %selected.id))]
    pub async fn toggle_variant(
        &self,
        selector: &VariantSelector,
        container_id: &str,
        variants: &[ResolvedEntry],
        selected: &ResolvedEntry,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let result = async {
            let container = self.source.get_entry(container_id).await?;
            let values = selector.toggle(&container, variants, selected)?;
            self.write_references(&container, selector.field(), values)
                .await
        }
        .await;
        self.report(
            result,
            "Updated linked variant successfully!",
            "Failed to update linked variant.",
        )
    }

    /// Drop a place and every one of its variants from `parent_id.field` in one write.
    #[tracing::instrument(skip(self, variant_ids))]
    pub async fn remove_container_and_variants(
        &self,
        parent_id: &str,
        field: &str,
        container_id: &str,
        variant_ids: &[String],
    ) -> Result<(), ReftreeError> {
        let result = async {
            let parent = self.source.get_entry(parent_id).await?;
            let mut doomed: HashSet<&str> = variant_ids.iter().map(String::as_str).collect();
            doomed.insert(container_id);
            let values: Vec<Value> = parent
                .reference_values(field, &self.locale)?
                .into_iter()
                .filter(|v| {
                    LinkDescriptor::target_of(v)
                        .map(|id| !doomed.contains(id.as_str()))
                        .unwrap_or(true)
                })
                .collect();
            self.write_references(&parent, field, values).await?;
            Ok::<_, ReftreeError>(())
        }
        .await;
        self.report(
            result,
            "Removed place and variants successfully!",
            "Failed to remove place and variants.",
        )
    }

    /// Copy `variant` into a new published entry named `new_name` and link the copy from
    /// `owner_id.linkedVariants`.
    ///
    /// Only the name plus the description, media and lock flag (when present) are carried
    /// over. The new entry is created under the configured clone content type.
    #[tracing::instrument(skip(self, variant), fields(variant = %variant.id))]
    pub async fn clone_variant(
        &self,
        owner_id: &str,
        variant: &ResolvedEntry,
        new_name: &str,
    ) -> Result<ResolvedEntry, ReftreeError> {
        let result = async {
            let mut fields = Fields::new();
            fields
                .entry(NAME_FIELD.to_string())
                .or_default()
                .insert(self.locale.clone(), Value::String(new_name.to_string()));
            for key in CLONED_FIELDS {
                if let Some(value) = variant.field(key, &self.locale) {
                    fields
                        .entry(key.to_string())
                        .or_default()
                        .insert(self.locale.clone(), value.clone());
                }
            }

            let created = self
                .source
                .create_entry(&self.clone_target, &fields)
                .await?;
            let published = self
                .source
                .publish_entry(&created.id, created.version)
                .await?;
            tracing::debug!("Created and published clone {}", published.id);

            let owner = self.source.get_entry(owner_id).await?;
            let mut values = owner.reference_values(LINKED_VARIANTS_FIELD, &self.locale)?;
            values.push(LinkDescriptor::internal(published.id.clone()).to_link_value());
            self.write_references(&owner, LINKED_VARIANTS_FIELD, values)
                .await?;
            Ok::<_, ReftreeError>(published)
        }
        .await;
        self.report(
            result,
            "Cloned variant successfully!",
            "Failed to clone variant.",
        )
    }
}
