//! Entries and assets as returned by a fetch.
//!
//! # Design
//! Both resources carry a `LocaleState`. For single-locale fetches the
//! fields already hold that locale's values and lookups return them as-is.
//! For wildcard fetches the per-locale maps are kept intact; switching the
//! active locale only swaps the lookup key, and lookups fall back to the
//! space's default locale when a field has no value for the active one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::locale::{LocaleMode, LocaleState};
use crate::types::{FieldValue, Sys};

#[derive(Deserialize)]
struct RawResource {
    sys: Sys,
    #[serde(default)]
    fields: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A structured content record with user-defined fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    sys: Sys,
    fields: BTreeMap<String, FieldValue>,
    locale: LocaleState,
}

impl Entry {
    pub fn new(sys: Sys, fields: BTreeMap<String, FieldValue>, locale: LocaleState) -> Self {
        Self { sys, fields, locale }
    }

    /// Parse an entry from its JSON form. A missing `sys.locale` means the
    /// entry was fetched with the wildcard locale.
    pub fn from_json(value: Value, default_locale: &str) -> ApiResult<Self> {
        let raw: RawResource = serde_json::from_value(value)?;
        let (locale, fields) = match raw.sys.locale.clone() {
            Some(code) => (
                LocaleState::single(code, default_locale),
                raw.fields
                    .into_iter()
                    .map(|(name, v)| (name, FieldValue::from_json(v)))
                    .collect(),
            ),
            None => (
                LocaleState::wildcard(default_locale),
                raw.fields
                    .into_iter()
                    .map(|(name, v)| (name, FieldValue::localized_from_json(v)))
                    .collect(),
            ),
        };
        Ok(Self {
            sys: raw.sys,
            fields,
            locale,
        })
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn sys(&self) -> &Sys {
        &self.sys
    }

    pub fn content_type_id(&self) -> Option<&str> {
        self.sys.content_type_id()
    }

    /// Currently selected locale.
    pub fn locale(&self) -> &str {
        self.locale.active()
    }

    pub fn default_locale(&self) -> &str {
        self.locale.default_locale()
    }

    pub fn locale_mode(&self) -> LocaleMode {
        self.locale.mode()
    }

    /// Select the locale that `field` resolves through. Only valid for
    /// entries fetched with the wildcard locale.
    pub fn set_locale(&mut self, locale: &str) -> ApiResult<()> {
        self.locale.select(&self.sys.id, locale)
    }

    /// Value of `name` in the active locale, falling back to the default
    /// locale on wildcard entries.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        let value = self.fields.get(name)?;
        match (self.locale.mode(), value) {
            (LocaleMode::Wildcard, FieldValue::Localized(per_locale)) => self
                .locale
                .lookup_order()
                .into_iter()
                .find_map(|code| per_locale.get(code)),
            _ => Some(value),
        }
    }

    /// Value of `name` exactly as stored, per-locale map included.
    pub fn raw_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub(crate) fn field_values_mut(&mut self) -> impl Iterator<Item = &mut FieldValue> {
        self.fields.values_mut()
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageDimensions>,
}

/// Locator and metadata of an asset's binary data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub details: FileDetails,
}

impl FileInfo {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"))
    }
}

/// The fixed attribute set of an asset in one locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpg,
    Png,
    Webp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFit {
    Pad,
    Fill,
    Scale,
    Crop,
    Thumb,
}

/// Server-side image transformations appended to an image URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<ImageFormat>,
    /// 1..=100, only honoured for JPEG output.
    pub quality: Option<u8>,
    pub fit: Option<ImageFit>,
}

impl ImageOptions {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(w) = self.width {
            params.push(("w", w.to_string()));
        }
        if let Some(h) = self.height {
            params.push(("h", h.to_string()));
        }
        if let Some(format) = self.format {
            let fm = match format {
                ImageFormat::Jpg => "jpg",
                ImageFormat::Png => "png",
                ImageFormat::Webp => "webp",
            };
            params.push(("fm", fm.to_string()));
        }
        if let Some(q) = self.quality {
            params.push(("q", q.to_string()));
        }
        if let Some(fit) = self.fit {
            let fit = match fit {
                ImageFit::Pad => "pad",
                ImageFit::Fill => "fill",
                ImageFit::Scale => "scale",
                ImageFit::Crop => "crop",
                ImageFit::Thumb => "thumb",
            };
            params.push(("fit", fit.to_string()));
        }
        params
    }
}

/// A binary media resource with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    sys: Sys,
    /// Attribute sets keyed by locale code.
    fields: BTreeMap<String, AssetFields>,
    locale: LocaleState,
}

impl Asset {
    pub fn new(sys: Sys, fields: BTreeMap<String, AssetFields>, locale: LocaleState) -> Self {
        Self { sys, fields, locale }
    }

    pub fn from_json(value: Value, default_locale: &str) -> ApiResult<Self> {
        let raw: RawResource = serde_json::from_value(value)?;
        let (locale, fields) = match raw.sys.locale.clone() {
            Some(code) => {
                let fields: AssetFields = serde_json::from_value(Value::Object(raw.fields))?;
                (
                    LocaleState::single(code.clone(), default_locale),
                    BTreeMap::from([(code, fields)]),
                )
            }
            None => {
                // `{"title": {"en-US": ..}, "file": {"en-US": ..}}` becomes
                // `{"en-US": {"title": .., "file": ..}}`.
                let mut per_locale: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
                for (name, value) in raw.fields {
                    if let Value::Object(by_locale) = value {
                        for (code, v) in by_locale {
                            per_locale.entry(code).or_default().insert(name.clone(), v);
                        }
                    }
                }
                let fields = per_locale
                    .into_iter()
                    .map(|(code, map)| {
                        serde_json::from_value::<AssetFields>(Value::Object(map))
                            .map(|fields| (code, fields))
                            .map_err(ApiError::from)
                    })
                    .collect::<ApiResult<BTreeMap<_, _>>>()?;
                (LocaleState::wildcard(default_locale), fields)
            }
        };
        Ok(Self {
            sys: raw.sys,
            fields,
            locale,
        })
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn sys(&self) -> &Sys {
        &self.sys
    }

    pub fn locale(&self) -> &str {
        self.locale.active()
    }

    pub fn locale_mode(&self) -> LocaleMode {
        self.locale.mode()
    }

    pub fn set_locale(&mut self, locale: &str) -> ApiResult<()> {
        self.locale.select(&self.sys.id, locale)
    }

    pub fn title(&self) -> Option<&str> {
        self.pick(|f| f.title.as_deref())
    }

    pub fn description(&self) -> Option<&str> {
        self.pick(|f| f.description.as_deref())
    }

    pub fn file(&self) -> Option<&FileInfo> {
        self.pick(|f| f.file.as_ref())
    }

    /// Absolute URL of the binary data. Protocol-relative URLs get `https:`.
    pub fn url(&self) -> Option<String> {
        let url = &self.file()?.url;
        if url.starts_with("//") {
            Some(format!("https:{url}"))
        } else {
            Some(url.clone())
        }
    }

    /// URL of a server-side transformed rendition. `None` if the asset is
    /// not an image.
    pub fn image_url(&self, options: &ImageOptions) -> Option<String> {
        if !self.file()?.is_image() {
            return None;
        }
        let mut url = Url::parse(&self.url()?).ok()?;
        let params = options.params();
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &params {
                pairs.append_pair(key, value);
            }
        }
        Some(url.to_string())
    }

    fn pick<T: ?Sized>(&self, get: impl Fn(&AssetFields) -> Option<&T>) -> Option<&T> {
        self.locale
            .lookup_order()
            .into_iter()
            .find_map(|code| self.fields.get(code).and_then(|fields| get(fields)))
    }
}
