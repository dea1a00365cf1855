//! Typed mapping of entries onto plain structs.
//!
//! # Design
//! `EntryView` pairs an entry with the `LinkGraph` that owns it, so field
//! reads can follow resolved links. `FromField` converts a single field
//! value; `FromEntry` builds a whole struct from a view. Linked entries are
//! kept as views and converted explicitly with [`EntryView::typed`], since
//! a link field may point at any content type and links may form cycles.
//!
//! A missing field and a link whose target was not included both read as
//! `None`. A value of the wrong kind is a `FieldType` error.

use chrono::{DateTime, Utc};

use crate::error::{ApiError, ApiResult};
use crate::query::GeoPoint;
use crate::resolve::LinkGraph;
use crate::resource::{Asset, Entry};
use crate::types::FieldValue;

/// Conversion of an entry into a typed value.
pub trait FromEntry<'a>: Sized {
    /// Content type this mapping reads. `None` accepts any entry.
    const CONTENT_TYPE: Option<&'static str> = None;

    fn from_entry(entry: EntryView<'a>) -> ApiResult<Self>;
}

/// Conversion of one field value.
pub trait FromField<'a>: Sized {
    /// What the value must look like, for error messages.
    const EXPECTED: &'static str;

    fn from_field(value: &'a FieldValue, graph: &'a LinkGraph) -> Option<Self>;
}

impl<'a> FromField<'a> for String {
    const EXPECTED: &'static str = "text";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl<'a> FromField<'a> for &'a str {
    const EXPECTED: &'static str = "text";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value.as_str()
    }
}

impl<'a> FromField<'a> for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value.as_i64()
    }
}

impl<'a> FromField<'a> for f64 {
    const EXPECTED: &'static str = "a number";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value.as_f64()
    }
}

impl<'a> FromField<'a> for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value.as_bool()
    }
}

impl<'a> FromField<'a> for GeoPoint {
    const EXPECTED: &'static str = "a location";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value.as_location()
    }
}

impl<'a> FromField<'a> for DateTime<Utc> {
    const EXPECTED: &'static str = "an RFC 3339 date";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        DateTime::parse_from_rfc3339(value.as_str()?)
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }
}

/// Every item must be text.
impl<'a> FromField<'a> for Vec<String> {
    const EXPECTED: &'static str = "a list of text";

    fn from_field(value: &'a FieldValue, _: &'a LinkGraph) -> Option<Self> {
        value
            .as_list()?
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }
}

impl<'a> FromField<'a> for &'a Asset {
    const EXPECTED: &'static str = "an asset link";

    fn from_field(value: &'a FieldValue, graph: &'a LinkGraph) -> Option<Self> {
        value.as_asset().and_then(|r| graph.asset(r))
    }
}

impl<'a> FromField<'a> for EntryView<'a> {
    const EXPECTED: &'static str = "an entry link";

    fn from_field(value: &'a FieldValue, graph: &'a LinkGraph) -> Option<Self> {
        value
            .as_entry()
            .and_then(|r| graph.entry(r))
            .map(|entry| EntryView::new(graph, entry))
    }
}

/// Linked entries, in order. Unresolved links are skipped.
impl<'a> FromField<'a> for Vec<EntryView<'a>> {
    const EXPECTED: &'static str = "a list of entry links";

    fn from_field(value: &'a FieldValue, graph: &'a LinkGraph) -> Option<Self> {
        let items = value.as_list()?;
        let mut views = Vec::with_capacity(items.len());
        for item in items {
            if item.is_unresolved() {
                continue;
            }
            views.push(EntryView::from_field(item, graph)?);
        }
        Some(views)
    }
}

/// An entry read in its active locale, with its links followed through the
/// graph that owns it.
#[derive(Debug, Clone, Copy)]
pub struct EntryView<'a> {
    graph: &'a LinkGraph,
    entry: &'a Entry,
}

impl<'a> EntryView<'a> {
    pub fn new(graph: &'a LinkGraph, entry: &'a Entry) -> Self {
        Self { graph, entry }
    }

    pub fn entry(&self) -> &'a Entry {
        self.entry
    }

    pub fn graph(&self) -> &'a LinkGraph {
        self.graph
    }

    pub fn id(&self) -> &'a str {
        self.entry.id()
    }

    /// Field `name` as `T`, or `None` when it is absent or an unresolved
    /// link.
    pub fn get<T: FromField<'a>>(&self, name: &str) -> ApiResult<Option<T>> {
        let entry = self.entry;
        let Some(value) = entry.field(name) else {
            return Ok(None);
        };
        if value.is_unresolved() {
            return Ok(None);
        }
        T::from_field(value, self.graph)
            .map(Some)
            .ok_or_else(|| ApiError::FieldType {
                id: entry.id().to_string(),
                field: name.to_string(),
                expected: T::EXPECTED,
            })
    }

    /// Field `name` as `T`; absence is an error.
    pub fn require<T: FromField<'a>>(&self, name: &str) -> ApiResult<T> {
        self.get(name)?.ok_or_else(|| ApiError::MissingField {
            id: self.entry.id().to_string(),
            field: name.to_string(),
        })
    }

    /// Convert this entry with `T`'s mapping, after checking its content
    /// type.
    pub fn typed<T: FromEntry<'a>>(self) -> ApiResult<T> {
        if let Some(expected) = T::CONTENT_TYPE {
            let found = self.entry.content_type_id();
            if found != Some(expected) {
                return Err(ApiError::ContentTypeMismatch {
                    id: self.entry.id().to_string(),
                    expected,
                    found: found.map(str::to_string),
                });
            }
        }
        T::from_entry(self)
    }

    /// Entry linked from field `name`, converted with `T`'s mapping.
    pub fn linked<T: FromEntry<'a>>(&self, name: &str) -> ApiResult<Option<T>> {
        self.get::<EntryView<'a>>(name)?
            .map(EntryView::typed)
            .transpose()
    }
}

impl LinkGraph {
    pub fn view<'a>(&'a self, entry: &'a Entry) -> EntryView<'a> {
        EntryView::new(self, entry)
    }
}
