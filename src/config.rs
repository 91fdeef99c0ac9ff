//! Dispatcher configuration.

use crate::error::ConfigError;
use crate::stack::DEFAULT_PREVIEW_RADIUS;

pub const DOMAIN_ENV: &str = "DEBUGMATE_DOMAIN";
pub const TOKEN_ENV: &str = "DEBUGMATE_TOKEN";
pub const ENABLED_ENV: &str = "DEBUGMATE_ENABLED";

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Base URL of the collection service, e.g. `https://debugmate.example.com`
    pub domain: Option<String>,
    /// API token sent in the `X-DEBUGMATE-TOKEN` header
    pub token: Option<String>,
    /// Master switch
    pub enabled: bool,
    /// Fetch source files to attach line previews to frames
    pub previews: bool,
    /// Lines shown on each side of the error line in previews
    pub preview_radius: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            domain: None,
            token: None,
            enabled: true,
            previews: false,
            preview_radius: DEFAULT_PREVIEW_RADIUS,
        }
    }
}

impl DispatcherConfig {
    /// Enabled configuration with explicit credentials and previews off.
    pub fn new(domain: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Reads `DEBUGMATE_DOMAIN`, `DEBUGMATE_TOKEN` and `DEBUGMATE_ENABLED`.
    ///
    /// Reporting stays enabled when `DEBUGMATE_ENABLED` is unset; any value
    /// other than `true` (case-insensitive) disables it.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            domain: lookup(DOMAIN_ENV),
            token: lookup(TOKEN_ENV),
            enabled: lookup(ENABLED_ENV)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            ..Self::default()
        }
    }

    /// Turns reporting on or off without touching credentials.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enables source previews covering `radius` lines around each frame.
    pub fn with_previews(mut self, radius: u32) -> Self {
        self.previews = true;
        self.preview_radius = radius;
        self
    }

    /// Returns `(domain, token)` when reporting may proceed.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        if !self.enabled {
            return Err(ConfigError::Disabled);
        }
        let domain = non_empty(self.domain.as_deref()).ok_or(ConfigError::MissingDomain)?;
        let token = non_empty(self.token.as_deref()).ok_or(ConfigError::MissingToken)?;
        Ok((domain, token))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
