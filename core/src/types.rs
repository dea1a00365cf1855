//! Wire-level DTOs for the delivery API.
//!
//! # Design
//! User-defined content types make entry fields dynamically typed, so field
//! values are a tagged union (`FieldValue`) rather than loosely typed JSON.
//! Links start out as `FieldValue::Link` and are rewritten to
//! `FieldValue::Entry` / `FieldValue::Asset` handles by the resolver; the
//! handles index into the `LinkGraph` that owns every resource of one
//! response, so cyclic references need no shared ownership.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::GeoPoint;

// ---------------------------------------------------------------------------
// Links and system metadata
// ---------------------------------------------------------------------------

/// Kind of resource a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    Entry,
    Asset,
    ContentType,
    Space,
    #[serde(other)]
    Other,
}

/// An unresolved pointer to another resource.
///
/// The API only sends `linkType` and `id`; `content_type` narrows the match
/// when the producer knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "LinkWire", into = "LinkWire")]
pub struct Link {
    pub link_type: LinkType,
    pub id: String,
    pub content_type: Option<String>,
}

impl Link {
    pub fn entry(id: impl Into<String>) -> Self {
        Self {
            link_type: LinkType::Entry,
            id: id.into(),
            content_type: None,
        }
    }

    pub fn asset(id: impl Into<String>) -> Self {
        Self {
            link_type: LinkType::Asset,
            id: id.into(),
            content_type: None,
        }
    }

    /// True if `value` has the `{"sys": {"type": "Link", ...}}` shape.
    pub fn is_link_json(value: &Value) -> bool {
        value
            .get("sys")
            .and_then(|sys| sys.get("type"))
            .and_then(Value::as_str)
            == Some("Link")
    }
}

#[derive(Serialize, Deserialize)]
struct LinkWire {
    sys: LinkSysWire,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkSysWire {
    #[serde(rename = "type")]
    kind: String,
    link_type: LinkType,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

impl From<LinkWire> for Link {
    fn from(wire: LinkWire) -> Self {
        Link {
            link_type: wire.sys.link_type,
            id: wire.sys.id,
            content_type: wire.sys.content_type,
        }
    }
}

impl From<Link> for LinkWire {
    fn from(link: Link) -> Self {
        LinkWire {
            sys: LinkSysWire {
                kind: "Link".to_string(),
                link_type: link.link_type,
                id: link.id,
                content_type: link.content_type,
            },
        }
    }
}

/// Read-only, system-managed metadata present on every resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sys {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Present only when a single locale was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Sys {
    pub fn content_type_id(&self) -> Option<&str> {
        self.content_type.as_ref().map(|link| link.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// Handle to an entry owned by a `LinkGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef(pub(crate) usize);

/// Handle to an asset owned by a `LinkGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetRef(pub(crate) usize);

/// A dynamically typed entry field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Location(GeoPoint),
    /// JSON objects and nulls with no more specific shape.
    Object(Value),
    List(Vec<FieldValue>),
    /// A link that has not been (or could not be) resolved.
    Link(Link),
    Entry(EntryRef),
    Asset(AssetRef),
    /// Values keyed by locale code, as returned for wildcard-locale fetches.
    Localized(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => FieldValue::Text(s),
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_json).collect())
            }
            Value::Object(_) if Link::is_link_json(&value) => {
                match serde_json::from_value::<Link>(value.clone()) {
                    Ok(link) => FieldValue::Link(link),
                    Err(_) => FieldValue::Object(value),
                }
            }
            Value::Object(ref map) if map.len() == 2 => {
                match (
                    map.get("lat").and_then(Value::as_f64),
                    map.get("lon").and_then(Value::as_f64),
                ) {
                    (Some(lat), Some(lon)) => FieldValue::Location(GeoPoint { lat, lon }),
                    _ => FieldValue::Object(value),
                }
            }
            other => FieldValue::Object(other),
        }
    }

    /// Parse a field sent as `{ "<locale>": <value>, ... }`.
    pub fn localized_from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => FieldValue::Localized(
                map.into_iter()
                    .map(|(locale, v)| (locale, FieldValue::from_json(v)))
                    .collect(),
            ),
            other => FieldValue::from_json(other),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Text items of a list field, skipping anything that is not text.
    pub fn as_str_list(&self) -> Option<Vec<&str>> {
        self.as_list()
            .map(|items| items.iter().filter_map(FieldValue::as_str).collect())
    }

    pub fn as_location(&self) -> Option<GeoPoint> {
        match self {
            FieldValue::Location(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            FieldValue::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<EntryRef> {
        match self {
            FieldValue::Entry(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_asset(&self) -> Option<AssetRef> {
        match self {
            FieldValue::Asset(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, FieldValue::Link(_))
    }
}

// ---------------------------------------------------------------------------
// Spaces and content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub default: bool,
}

/// Top-level content container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub sys: Sys,
    pub name: String,
    #[serde(default)]
    pub locales: Vec<Locale>,
}

impl Space {
    pub fn default_locale(&self) -> Option<&str> {
        self.locales
            .iter()
            .find(|locale| locale.default)
            .map(|locale| locale.code.as_str())
    }
}

/// One field declared by a content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeField {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub localized: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
    /// Item schema of `Array` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

/// Schema of the fields an entry may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    pub sys: Sys,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<ContentTypeField>,
}

impl ContentType {
    pub fn field(&self, id: &str) -> Option<&ContentTypeField> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// One page of a collection endpoint with typed items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: u64,
    pub items: Vec<T>,
}
