//! Content records as the tree sees them.
//!
//! Entries arrive from the content API as `sys` metadata plus a `fields` map in which every value is
//! keyed by locale. [`ResolvedEntry`] keeps the `fields` map as raw JSON (so write-back preserves
//! everything we don't understand) and lifts the parts the tree needs into typed members.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use crate::{error::ReftreeError, locator::entry_id_from_urn};

/// Field names that may carry entry references, in the order they are scanned.
pub const REFERENCE_FIELDS: &[&str] = &["linkedItems", "places", "linkedVariants", "taxonomy"];

pub const NAME_FIELD: &str = "name";
pub const DESCRIPTION_FIELD: &str = "description";
pub const IMAGE_FIELD: &str = "image";

/// Locale-keyed value of a single field: `{"en-US": <value>}`.
pub type LocalizedValue = BTreeMap<String, Value>;

/// All fields of an entry.
pub type Fields = BTreeMap<String, LocalizedValue>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    #[default]
    Draft,
    Changed,
    Published,
    Archived,
}

impl Display for FieldStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            FieldStatus::Draft => write!(f, "draft"),
            FieldStatus::Changed => write!(f, "changed"),
            FieldStatus::Published => write!(f, "published"),
            FieldStatus::Archived => write!(f, "archived"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    /// Plain entry link within the current space.
    Internal,
    /// Resource link into another space, addressed by URN.
    ExternalUrn,
}

/// An unresolved reference found inside a field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub target_id: String,
    pub kind: LinkKind,
    /// Full URN for [`LinkKind::ExternalUrn`] links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

impl LinkDescriptor {
    pub fn internal<S: Into<String>>(target_id: S) -> LinkDescriptor {
        LinkDescriptor {
            target_id: target_id.into(),
            kind: LinkKind::Internal,
            locator: None,
        }
    }

    pub fn external<S: Into<String>>(urn: S) -> LinkDescriptor {
        let urn = urn.into();
        LinkDescriptor {
            target_id: entry_id_from_urn(&urn).to_string(),
            kind: LinkKind::ExternalUrn,
            locator: Some(urn),
        }
    }

    /// Parse a single element of a reference array.
    ///
    /// Accepts both `{"sys": {"type": "Link", "id": ..}}` and
    /// `{"sys": {"type": "ResourceLink", "urn": ..}}`.
    pub fn from_link_value(value: &Value) -> Result<LinkDescriptor, ReftreeError> {
        let sys = value
            .get("sys")
            .and_then(Value::as_object)
            .ok_or_else(|| ReftreeError::Validation(format!("link without sys: {value}")))?;
        if let Some(urn) = sys.get("urn").and_then(Value::as_str) {
            return Ok(LinkDescriptor::external(urn));
        }
        match sys.get("id").and_then(Value::as_str) {
            Some(id) => Ok(LinkDescriptor::internal(id)),
            None => Err(ReftreeError::Validation(format!(
                "link has neither id nor urn: {value}"
            ))),
        }
    }

    /// Target id of a raw reference element, or `None` when it is not a link we understand.
    pub fn target_of(value: &Value) -> Option<String> {
        LinkDescriptor::from_link_value(value)
            .ok()
            .map(|link| link.target_id)
    }

    pub fn to_link_value(&self) -> Value {
        match (self.kind, &self.locator) {
            (LinkKind::ExternalUrn, Some(urn)) => json!({
                "sys": {"type": "ResourceLink", "linkType": "Contentful:Entry", "urn": urn}
            }),
            _ => json!({
                "sys": {"type": "Link", "linkType": "Entry", "id": self.target_id}
            }),
        }
    }
}

impl Display for LinkDescriptor {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.locator {
            Some(urn) => write!(f, "{urn}"),
            None => write!(f, "entry:{}", self.target_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SysLink {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LinkWrapper {
    sys: SysLink,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSys {
    id: String,
    #[serde(default)]
    version: u64,
    content_type: Option<LinkWrapper>,
    #[serde(default)]
    field_status: BTreeMap<String, BTreeMap<String, FieldStatus>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    sys: RawSys,
    #[serde(default)]
    fields: Fields,
}

/// A fully fetched entry.
///
/// `version` is the server version at last read; writes must send it back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub id: String,
    pub version: u64,
    pub content_type: String,
    pub field_status: FieldStatus,
    pub fields: Fields,
    pub raw_links: Vec<LinkDescriptor>,
}

impl ResolvedEntry {
    pub fn new<I: Into<String>, C: Into<String>>(id: I, content_type: C) -> ResolvedEntry {
        ResolvedEntry {
            id: id.into(),
            version: 1,
            content_type: content_type.into(),
            field_status: FieldStatus::Draft,
            fields: Fields::new(),
            raw_links: Vec::new(),
        }
    }

    /// Build from a content-management API entry payload, reading locale-specific data for
    /// `locale`.
    pub fn from_cma_value(value: Value, locale: &str) -> Result<ResolvedEntry, ReftreeError> {
        let raw: RawEntry = serde_json::from_value(value)?;
        let field_status = raw
            .sys
            .field_status
            .get("*")
            .and_then(|by_locale| by_locale.get(locale))
            .copied()
            .unwrap_or_default();
        let mut entry = ResolvedEntry {
            id: raw.sys.id,
            version: raw.sys.version,
            content_type: raw
                .sys
                .content_type
                .map(|ct| ct.sys.id)
                .unwrap_or_default(),
            field_status,
            fields: raw.fields,
            raw_links: Vec::new(),
        };
        entry.refresh_links(locale);
        Ok(entry)
    }

    /// Serialize back into the payload shape accepted by the content API.
    pub fn to_cma_value(&self, locale: &str) -> Value {
        json!({
            "sys": {
                "id": self.id,
                "version": self.version,
                "contentType": {"sys": {"type": "Link", "linkType": "ContentType", "id": self.content_type}},
                "fieldStatus": {"*": {locale: self.field_status}},
            },
            "fields": self.fields,
        })
    }

    /// Recompute [`Self::raw_links`] from the reference-bearing fields.
    pub fn refresh_links(&mut self, locale: &str) {
        self.raw_links = REFERENCE_FIELDS
            .iter()
            .flat_map(|field| self.links(field, locale).unwrap_or_default())
            .collect();
    }

    pub fn field(&self, key: &str, locale: &str) -> Option<&Value> {
        self.fields.get(key).and_then(|values| values.get(locale))
    }

    pub fn set_field(&mut self, key: &str, locale: &str, value: Value) {
        self.fields
            .entry(key.to_string())
            .or_default()
            .insert(locale.to_string(), value);
    }

    pub fn name(&self, locale: &str) -> Option<&str> {
        self.field(NAME_FIELD, locale).and_then(Value::as_str)
    }

    /// Reference descriptors stored under `key` for `locale`, in array order.
    ///
    /// A missing field or locale is an empty list. A value that is not an array is a
    /// [`ReftreeError::Validation`]; malformed elements are skipped.
    pub fn links(&self, key: &str, locale: &str) -> Result<Vec<LinkDescriptor>, ReftreeError> {
        let Some(value) = self.field(key, locale) else {
            return Ok(Vec::new());
        };
        let Some(items) = value.as_array() else {
            return Err(ReftreeError::Validation(format!(
                "{}.{key}[{locale}] is not an array",
                self.id
            )));
        };
        Ok(items
            .iter()
            .filter_map(|item| match LinkDescriptor::from_link_value(item) {
                Ok(link) => Some(link),
                Err(e) => {
                    tracing::warn!("Skipping malformed reference in {}.{key}: {e}", self.id);
                    None
                }
            })
            .collect())
    }

    /// Raw elements of the reference array under `key`, unparsed and in order. Absent is empty;
    /// anything but an array is refused, so a write never replaces data we could not parse.
    pub fn reference_values(&self, key: &str, locale: &str) -> Result<Vec<Value>, ReftreeError> {
        match self.field(key, locale) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(ReftreeError::Validation(format!(
                "{}.{key}[{locale}] is not an array",
                self.id
            ))),
        }
    }

    pub fn set_links(&mut self, key: &str, locale: &str, links: &[LinkDescriptor]) {
        let value = Value::Array(links.iter().map(LinkDescriptor::to_link_value).collect());
        self.set_field(key, locale, value);
        self.refresh_links(locale);
    }

    /// Id of the first image asset linked from the `image` field, if any.
    pub fn image_asset_id(&self, locale: &str) -> Option<&str> {
        let value = self.field(IMAGE_FIELD, locale)?;
        let link = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };
        link.get("sys")?.get("id")?.as_str()
    }

    /// Plain-text rendering of the description field.
    pub fn description(&self, locale: &str) -> String {
        plain_description(self.field(DESCRIPTION_FIELD, locale))
    }
}

/// An asset (image) record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl AssetRecord {
    pub fn from_cma_value(value: &Value, locale: &str) -> Result<AssetRecord, ReftreeError> {
        let id = value
            .get("sys")
            .and_then(|sys| sys.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ReftreeError::Validation("asset without sys.id".to_string()))?;
        let fields = value.get("fields");
        let localized = |key: &str| {
            fields
                .and_then(|f| f.get(key))
                .and_then(|v| v.get(locale))
        };
        Ok(AssetRecord {
            id: id.to_string(),
            title: localized("title").and_then(Value::as_str).map(str::to_string),
            description: localized("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            url: localized("file")
                .and_then(|file| file.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Human label for a content type id: `"poi"` becomes `"PoI"`, camelCase becomes
/// `"Capitalized Words"`.
pub fn display_content_type(content_type: &str) -> String {
    if content_type == "poi" {
        return "PoI".to_string();
    }
    let mut words: Vec<String> = Vec::new();
    for ch in content_type.chars() {
        if ch.is_uppercase() || words.is_empty() {
            words.push(String::new());
        }
        if let Some(word) = words.last_mut() {
            if word.is_empty() {
                word.extend(ch.to_uppercase());
            } else {
                word.push(ch);
            }
        }
    }
    words.join(" ")
}

/// Flatten a rich-text document (paragraphs of text nodes) to plain text.
pub fn plain_description(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(doc)) => flatten_blocks(doc),
        Some(other) => other.to_string(),
    }
}

fn flatten_blocks(doc: &Map<String, Value>) -> String {
    doc.get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| {
                    block
                        .get("content")
                        .and_then(Value::as_array)
                        .map(|nodes| {
                            nodes
                                .iter()
                                .filter_map(|node| node.get("value").and_then(Value::as_str))
                                .collect::<String>()
                        })
                        .unwrap_or_default()
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_entry_from_cma_payload() {
        let payload = json!({
            "sys": {
                "id": "place-1",
                "version": 7,
                "contentType": {"sys": {"id": "place"}},
                "fieldStatus": {"*": {"en-US": "changed"}}
            },
            "fields": {
                "name": {"en-US": "Harbour"},
                "linkedItems": {"en-US": [
                    {"sys": {"type": "Link", "linkType": "Entry", "id": "a"}},
                    {"sys": {"type": "ResourceLink", "linkType": "Contentful:Entry",
                             "urn": "crn:contentful:::content:spaces/s1/environments/master/entries/b"}}
                ]}
            }
        });
        let entry = ResolvedEntry::from_cma_value(payload, "en-US").unwrap();
        assert_eq!(entry.version, 7);
        assert_eq!(entry.content_type, "place");
        assert_eq!(entry.field_status, FieldStatus::Changed);
        assert_eq!(entry.name("en-US"), Some("Harbour"));
        let ids: Vec<_> = entry.raw_links.iter().map(|l| l.target_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(entry.raw_links[1].kind, LinkKind::ExternalUrn);
    }

    #[test]
    fn test_missing_locale_is_empty_not_error() {
        let mut entry = ResolvedEntry::new("p", "place");
        entry.set_field("linkedItems", "de-DE", json!([{"sys": {"id": "x"}}]));
        assert!(entry.links("linkedItems", "en-US").unwrap().is_empty());
        assert!(entry.links("places", "en-US").unwrap().is_empty());

        entry.set_field("places", "en-US", json!("oops"));
        assert!(matches!(
            entry.links("places", "en-US"),
            Err(ReftreeError::Validation(_))
        ));
    }

    #[test]
    fn test_link_shapes_survive_write_back() {
        let mut entry = ResolvedEntry::new("p", "place");
        let links = vec![
            LinkDescriptor::internal("a"),
            LinkDescriptor::external(
                "crn:contentful:::content:spaces/s/environments/e/entries/b",
            ),
        ];
        entry.set_links("places", "en-US", &links);
        assert_eq!(entry.links("places", "en-US").unwrap(), links);
        assert_eq!(
            entry.field("places", "en-US").unwrap()[1]["sys"]["type"],
            "ResourceLink"
        );
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(display_content_type("poi"), "PoI");
        assert_eq!(display_content_type("poiVariantApp"), "Poi Variant App");
        assert_eq!(display_content_type("place"), "Place");

        let rich = json!({
            "nodeType": "document",
            "content": [
                {"nodeType": "paragraph", "content": [{"value": "Hello "}, {"value": "there"}]},
                {"nodeType": "paragraph", "content": [{"value": "."}]}
            ]
        });
        assert_eq!(plain_description(Some(&rich)), "Hello there.");
        assert_eq!(plain_description(Some(&json!("plain"))), "plain");
        assert_eq!(plain_description(None), "");
    }

    #[test]
    fn test_image_asset_id_accepts_single_or_array() {
        let mut entry = ResolvedEntry::new("p", "poi");
        entry.set_field("image", "en-US", json!([{"sys": {"id": "img-1"}}]));
        assert_eq!(entry.image_asset_id("en-US"), Some("img-1"));
        entry.set_field("image", "en-US", json!({"sys": {"id": "img-2"}}));
        assert_eq!(entry.image_asset_id("en-US"), Some("img-2"));
    }
}
