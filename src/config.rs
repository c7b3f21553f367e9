//! Configuration file parser for ~/.config/postfeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as likely typos. Environment
//! variables and command-line flags are layered on top by the caller.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Environment variable overriding `endpoint`.
pub const ENV_GRAPHQL_URL: &str = "POSTFEED_GRAPHQL_URL";

/// Environment variable overriding `api_token`.
pub const ENV_API_TOKEN: &str = "POSTFEED_API_TOKEN";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4000/graphql/v1";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `api_token` is masked in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Theme variant name ("dark" or "light").
    pub theme: String,

    /// GraphQL endpoint serving `filteredPosts` and `categories`.
    pub endpoint: String,

    /// Public site root, used to open posts in the browser.
    pub site_url: Option<String>,

    /// Posts requested per page.
    pub page_size: usize,

    /// Quiet period before filter edits take effect, in milliseconds.
    pub debounce_ms: u64,

    /// Rows per post in the list.
    pub item_height: u16,

    /// Extra posts built above and below the viewport.
    pub overscan: usize,

    /// Rows of lookahead below the viewport for the load-more sentinel.
    pub root_margin: u32,

    /// Fraction of the sentinel that must be in range to load more.
    pub threshold: f32,

    /// Per-request timeout for the GraphQL endpoint, in seconds.
    pub request_timeout_secs: u64,

    /// Bearer token for the endpoint (alternative to POSTFEED_API_TOKEN).
    /// Held as a secret from the moment it is parsed.
    pub api_token: Option<SecretString>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            site_url: None,
            page_size: 12,
            debounce_ms: 300,
            item_height: 4,
            overscan: 2,
            root_margin: 4,
            threshold: 0.1,
            request_timeout_secs: 30,
            api_token: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("theme", &self.theme)
            .field("endpoint", &self.endpoint)
            .field("site_url", &self.site_url)
            .field("page_size", &self.page_size)
            .field("debounce_ms", &self.debounce_ms)
            .field("item_height", &self.item_height)
            .field("overscan", &self.overscan)
            .field("root_margin", &self.root_margin)
            .field("threshold", &self.threshold)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

const KNOWN_KEYS: [&str; 11] = [
    "theme",
    "endpoint",
    "site_url",
    "page_size",
    "debounce_ms",
    "item_height",
    "overscan",
    "root_margin",
    "threshold",
    "request_timeout_secs",
    "api_token",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(endpoint = %config.endpoint, theme = %config.theme, "Loaded configuration");
        Ok(config)
    }

    /// Apply environment overrides. Env vars take precedence over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_GRAPHQL_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(var = ENV_GRAPHQL_URL, "Endpoint overridden from environment");
            self.endpoint = endpoint;
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.is_empty()) {
            self.api_token = Some(SecretString::from(token));
        }
    }

    /// Check every value the feed depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("endpoint", &self.endpoint)?;
        if let Some(site) = &self.site_url {
            validate_http_url("site_url", site)?;
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(invalid("page_size", "must be between 1 and 100"));
        }
        if !(2..=12).contains(&self.item_height) {
            return Err(invalid("item_height", "must be between 2 and 12 rows"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(invalid("threshold", "must be between 0.0 and 1.0"));
        }
        if self.debounce_ms > 10_000 {
            return Err(invalid("debounce_ms", "must be at most 10000"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    pub fn api_token(&self) -> Option<SecretString> {
        self.api_token.clone()
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

fn validate_http_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{} ({})", e, value),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("scheme {:?} not allowed, use http or https", other),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
