//! Single-active-variant selection.
//!
//! A parent entry (e.g. an itinerary) lists the places it uses in one reference field. Each place
//! offers several variants; at most one variant of a given place may appear in the parent's field
//! at a time. [`VariantSelector::toggle`] computes the rewritten reference array; persisting it is
//! the gateway's job.
//!
//! Clearing is scoped to the variant set passed in, which must be the variants of the one place
//! being edited. Passing the variants of every place on the parent would also clear selections
//! made for sibling places whose variant ids overlap.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
};

use crate::{
    error::ReftreeError,
    locator::SpaceLocator,
    properties::{LinkDescriptor, ResolvedEntry},
};

pub const DEFAULT_SELECTION_FIELD: &str = "places";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    App,
    Web,
    Print,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::App, Channel::Web, Channel::Print];

    pub fn content_type(&self) -> &'static str {
        match self {
            Channel::App => "poiVariantApp",
            Channel::Web => "poiVariantWeb",
            Channel::Print => "poiVariantPrint",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.content_type() == content_type)
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Channel::App => write!(f, "App"),
            Channel::Web => write!(f, "Web"),
            Channel::Print => write!(f, "Print"),
        }
    }
}

/// Variants published for `channel`, in their original order.
pub fn filter_by_channel(variants: &[ResolvedEntry], channel: Channel) -> Vec<&ResolvedEntry> {
    variants
        .iter()
        .filter(|v| v.content_type == channel.content_type())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSelector {
    field: String,
    locale: String,
    /// When set, new selections are written as resource links into this space.
    space: Option<SpaceLocator>,
}

impl VariantSelector {
    pub fn new<F: Into<String>, L: Into<String>>(field: F, locale: L) -> Self {
        VariantSelector {
            field: field.into(),
            locale: locale.into(),
            space: None,
        }
    }

    pub fn with_space(mut self, space: SpaceLocator) -> Self {
        self.space = Some(space);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn link_for(&self, variant: &ResolvedEntry) -> LinkDescriptor {
        match &self.space {
            Some(space) => LinkDescriptor::external(space.entry(&variant.id).to_string()),
            None => LinkDescriptor::internal(variant.id.clone()),
        }
    }

    /// Id of the variant from `variants` currently referenced by `container`, if any.
    pub fn active_variant(
        &self,
        container: &ResolvedEntry,
        variants: &[ResolvedEntry],
    ) -> Result<Option<String>, ReftreeError> {
        let ids: HashSet<&str> = variants.iter().map(|v| v.id.as_str()).collect();
        Ok(container
            .reference_values(&self.field, &self.locale)?
            .iter()
            .filter_map(LinkDescriptor::target_of)
            .find(|id| ids.contains(id.as_str())))
    }

    /// Select `selected`, or deselect it if it is already the active variant.
    ///
    /// Works on the raw reference array: only elements pointing at a member of `variants` are
    /// removed, everything else (asset links, elements we cannot parse) is returned untouched and
    /// in place. Selecting then appends one reference to `selected`.
    pub fn toggle(
        &self,
        container: &ResolvedEntry,
        variants: &[ResolvedEntry],
        selected: &ResolvedEntry,
    ) -> Result<Vec<Value>, ReftreeError> {
        if !variants.iter().any(|v| v.id == selected.id) {
            return Err(ReftreeError::Validation(format!(
                "{} is not one of the variants offered for this place",
                selected.id
            )));
        }
        let mut references = container.reference_values(&self.field, &self.locale)?;
        let active = self.active_variant(container, variants)?;
        if active.as_deref() == Some(selected.id.as_str()) {
            tracing::debug!("Deselecting variant {} on {}", selected.id, container.id);
            references.retain(|value| {
                LinkDescriptor::target_of(value).as_deref() != Some(selected.id.as_str())
            });
        } else {
            tracing::debug!(
                "Selecting variant {} on {} (previously {:?})",
                selected.id,
                container.id,
                active
            );
            let ids: HashSet<&str> = variants.iter().map(|v| v.id.as_str()).collect();
            references.retain(|value| match LinkDescriptor::target_of(value) {
                Some(id) => !ids.contains(id.as_str()),
                None => true,
            });
            references.push(self.link_for(selected).to_link_value());
        }
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{locator::entry_id_from_urn, properties::LinkKind, tests::helpers::*};
    use serde_json::json;
    use test_log::test;

    fn parent(refs: &[&str]) -> ResolvedEntry {
        let mut entry = ResolvedEntry::new("itinerary", "itinerary");
        let links: Vec<_> = refs.iter().map(|id| LinkDescriptor::internal(*id)).collect();
        entry.set_links(DEFAULT_SELECTION_FIELD, "en-US", &links);
        entry
    }

    fn targets(values: &[Value]) -> Vec<String> {
        values.iter().filter_map(LinkDescriptor::target_of).collect()
    }

    #[test]
    fn test_select_replaces_previous_variant_of_same_place() {
        let variants = vec![
            variant("a1", "poiVariantApp"),
            variant("a2", "poiVariantWeb"),
        ];
        let container = parent(&["x", "a1", "y"]);
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, "en-US");

        assert_eq!(
            selector.active_variant(&container, &variants).unwrap(),
            Some("a1".to_string())
        );
        let updated = selector.toggle(&container, &variants, &variants[1]).unwrap();
        assert_eq!(targets(&updated), vec!["x", "y", "a2"]);
    }

    #[test]
    fn test_select_then_reselect_restores_original() {
        let variants = vec![variant("a1", "poiVariantApp"), variant("a2", "poiVariantApp")];
        let mut container = parent(&["x", "y"]);
        let original = container
            .reference_values(DEFAULT_SELECTION_FIELD, "en-US")
            .unwrap();
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, "en-US");

        let selected = selector.toggle(&container, &variants, &variants[0]).unwrap();
        assert_eq!(targets(&selected), vec!["x", "y", "a1"]);
        container.set_field(DEFAULT_SELECTION_FIELD, "en-US", Value::Array(selected));

        let deselected = selector.toggle(&container, &variants, &variants[0]).unwrap();
        assert_eq!(deselected, original);
    }

    #[test]
    fn test_sibling_place_selection_is_untouched() {
        // b1 belongs to a different place; selecting for place A must keep it.
        let place_a = vec![variant("a1", "poiVariantApp"), variant("a2", "poiVariantApp")];
        let container = parent(&["b1", "a1"]);
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, "en-US");
        let updated = selector.toggle(&container, &place_a, &place_a[1]).unwrap();
        assert_eq!(targets(&updated), vec!["b1", "a2"]);
    }

    #[test]
    fn test_selected_must_belong_to_variant_set() {
        let place_a = vec![variant("a1", "poiVariantApp")];
        let stranger = variant("b1", "poiVariantApp");
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, "en-US");
        assert!(matches!(
            selector.toggle(&parent(&[]), &place_a, &stranger),
            Err(ReftreeError::Validation(_))
        ));
    }

    #[test]
    fn test_external_space_selection_writes_resource_link() {
        let variants = vec![variant("a1", "poiVariantApp")];
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, "en-US")
            .with_space(SpaceLocator::new("shared", "master"));
        let updated = selector.toggle(&parent(&[]), &variants, &variants[0]).unwrap();
        let link = LinkDescriptor::from_link_value(&updated[0]).unwrap();
        assert_eq!(link.kind, LinkKind::ExternalUrn);
        let urn = link.locator.as_deref().unwrap();
        assert_eq!(entry_id_from_urn(urn), "a1");
    }

    #[test]
    fn test_toggle_leaves_foreign_elements_in_place() {
        let variants = vec![variant("a1", "poiVariantApp"), variant("a2", "poiVariantApp")];
        let mut container = parent(&[]);
        let asset = json!({"sys": {"type": "Link", "linkType": "Asset", "id": "img"}});
        let note = json!({"note": "keep me"});
        container.set_field(
            DEFAULT_SELECTION_FIELD,
            "en-US",
            json!([LinkDescriptor::internal("a2").to_link_value(), asset, note]),
        );
        let selector = VariantSelector::new(DEFAULT_SELECTION_FIELD, "en-US");

        let updated = selector.toggle(&container, &variants, &variants[0]).unwrap();
        assert_eq!(updated.len(), 3);
        assert_eq!(updated[0], asset);
        assert_eq!(updated[1], note);
        assert_eq!(targets(&updated), vec!["img", "a1"]);
    }

    #[test]
    fn test_channel_filter() {
        let variants = vec![
            variant("a", "poiVariantApp"),
            variant("w", "poiVariantWeb"),
            variant("a2", "poiVariantApp"),
        ];
        let app: Vec<_> = filter_by_channel(&variants, Channel::App)
            .into_iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(app, vec!["a", "a2"]);
        assert!(filter_by_channel(&variants, Channel::Print).is_empty());
        assert_eq!(
            Channel::from_content_type("poiVariantWeb"),
            Some(Channel::Web)
        );
    }
}
