//! Client configuration.
//!
//! Values come from code, from any serde source, or from `DELIVERY_*`
//! environment variables. `validate` runs before a client is built.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::types::Space;

pub const DEFAULT_HOST: &str = "cdn.contentful.com";
pub const DEFAULT_LOCALE: &str = "en-US";

pub const ENV_SPACE_ID: &str = "DELIVERY_SPACE_ID";
pub const ENV_HOST: &str = "DELIVERY_HOST";
pub const ENV_SECURE: &str = "DELIVERY_SECURE";
pub const ENV_DEFAULT_LOCALE: &str = "DELIVERY_DEFAULT_LOCALE";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_secure() -> bool {
    true
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

/// Where the delivery API lives and how to read its responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub space_id: String,
    /// Host, optionally with a port.
    #[serde(default = "default_host")]
    pub host: String,
    /// `https` when true, `http` otherwise.
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Fallback locale for wildcard-locale lookups.
    #[serde(default = "default_locale")]
    pub default_locale: String,
}

impl ClientConfig {
    pub fn new(space_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            host: default_host(),
            secure: default_secure(),
            default_locale: default_locale(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    /// Fall back to the default locale of `space`. A space that marks no
    /// locale as default leaves the current fallback in place.
    pub fn with_space(mut self, space: &Space) -> Self {
        if let Some(code) = space.default_locale() {
            self.default_locale = code.to_string();
        }
        self
    }

    /// Read the configuration from `DELIVERY_*` environment variables.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps variable names
    /// to values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let space_id = lookup(ENV_SPACE_ID)
            .ok_or_else(|| ApiError::Config(format!("{ENV_SPACE_ID} is not set")))?;
        let mut config = ClientConfig::new(space_id);
        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }
        if let Some(secure) = lookup(ENV_SECURE) {
            config.secure = match secure.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ApiError::Config(format!(
                        "{ENV_SECURE} must be a boolean, got {other:?}"
                    )))
                }
            };
        }
        if let Some(locale) = lookup(ENV_DEFAULT_LOCALE) {
            config.default_locale = locale;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.space_id.is_empty() || self.space_id.contains(['/', '?', '#']) {
            return Err(ApiError::Config(format!(
                "invalid space id {:?}",
                self.space_id
            )));
        }
        if self.default_locale.is_empty() {
            return Err(ApiError::Config("default locale is empty".to_string()));
        }
        Url::parse(&self.base_url())
            .map_err(|e| ApiError::Config(format!("invalid host {:?}: {e}", self.host)))?;
        Ok(())
    }

    /// `scheme://host/spaces/{space_id}` with no trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{scheme}://{}/spaces/{}",
            self.host.trim_end_matches('/'),
            self.space_id
        )
    }
}
