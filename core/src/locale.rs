//! Active-locale state carried by every entry and asset.

use crate::error::{ApiError, ApiResult};

/// How a resource was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocaleMode {
    /// One explicit locale; fields already hold that locale's values.
    Single,
    /// `locale=*`; every field is a per-locale map.
    Wildcard,
}

/// Which locale field lookups resolve through, plus the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleState {
    mode: LocaleMode,
    active: String,
    default: String,
}

impl LocaleState {
    /// A resource fetched for `locale`. Its active locale cannot change.
    pub fn single(locale: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            mode: LocaleMode::Single,
            active: locale.into(),
            default: default.into(),
        }
    }

    /// A resource fetched with every locale, starting on the default one.
    pub fn wildcard(default: impl Into<String>) -> Self {
        let default = default.into();
        Self {
            mode: LocaleMode::Wildcard,
            active: default.clone(),
            default,
        }
    }

    pub fn mode(&self) -> LocaleMode {
        self.mode
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn default_locale(&self) -> &str {
        &self.default
    }

    pub(crate) fn select(&mut self, id: &str, locale: &str) -> ApiResult<()> {
        if self.mode != LocaleMode::Wildcard {
            return Err(ApiError::LocaleNotWildcardFetched { id: id.to_string() });
        }
        self.active = locale.to_string();
        Ok(())
    }

    /// Active locale first, then the default.
    pub(crate) fn lookup_order(&self) -> [&str; 2] {
        [&self.active, &self.default]
    }
}
