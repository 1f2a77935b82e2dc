//! Reporter configuration.
//!
//! A [`ReporterConfig`] can be built in code, deserialized from JSON, or read
//! from `TG_REPORTS_*` environment variables.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::provenance::ProvenanceConfig;
use crate::sink::LogSinkConfig;
use crate::transport::TELEGRAM_API_BASE;
use crate::types::Mode;

/// Environment variable holding the deployment mode.
pub const ENV_MODE: &str = "TG_REPORTS_MODE";
/// Environment variable holding the bot token.
pub const ENV_TOKEN: &str = "TG_REPORTS_TOKEN";
/// Environment variable holding the destination chat id.
pub const ENV_CHAT: &str = "TG_REPORTS_CHAT";
/// Environment variable overriding the Bot API base URL.
pub const ENV_API_BASE: &str = "TG_REPORTS_API_BASE";
/// Environment variable holding the low-channel log file.
pub const ENV_INFO_LOG: &str = "TG_REPORTS_INFO_LOG";
/// Environment variable holding the high-channel log file.
pub const ENV_ERROR_LOG: &str = "TG_REPORTS_ERROR_LOG";
/// Environment variable enabling debug lines in the file sink.
pub const ENV_DEBUG: &str = "TG_REPORTS_DEBUG";

/// Everything needed to build a [`Reporter`](crate::Reporter).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Deployment mode.
    pub mode: Mode,
    /// Telegram bot token. Without one, notifications are only logged.
    pub token: Option<String>,
    /// Destination chat or channel id.
    pub chat: Option<String>,
    /// Bot API base URL.
    pub api_base: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// File sink locations. Without them, lines go to `tracing`.
    pub sinks: Option<LogSinkConfig>,
    /// Provenance resolution settings.
    pub provenance: ProvenanceConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            token: None,
            chat: None,
            api_base: TELEGRAM_API_BASE.to_string(),
            timeout_secs: 10,
            sinks: None,
            provenance: ProvenanceConfig::default(),
        }
    }
}

impl fmt::Debug for ReporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterConfig")
            .field("mode", &self.mode)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("chat", &self.chat)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("sinks", &self.sinks)
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl ReporterConfig {
    /// Creates a configuration for the given mode.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Sets the Telegram credential and destination.
    #[must_use]
    pub fn with_telegram(mut self, token: impl Into<String>, chat: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.chat = Some(chat.into());
        self
    }

    /// Sets the Bot API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the file sink configuration.
    #[must_use]
    pub fn with_sinks(mut self, sinks: LogSinkConfig) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Sets the provenance configuration.
    #[must_use]
    pub fn with_provenance(mut self, provenance: ProvenanceConfig) -> Self {
        self.provenance = provenance;
        self
    }

    /// Reads the configuration from `TG_REPORTS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode is unknown or the result is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode is unknown or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        if let Some(mode) = get(ENV_MODE) {
            config.mode = mode.parse()?;
        }
        config.token = get(ENV_TOKEN);
        config.chat = get(ENV_CHAT);
        if let Some(api_base) = get(ENV_API_BASE) {
            config.api_base = api_base;
        }

        let info_path = get(ENV_INFO_LOG);
        let error_path = get(ENV_ERROR_LOG);
        if info_path.is_some() || error_path.is_some() {
            let defaults = LogSinkConfig::default();
            let debug = get(ENV_DEBUG).is_some_and(|v| {
                matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
            });
            config.sinks = Some(
                LogSinkConfig::new(
                    info_path.map_or(defaults.info_path, PathBuf::from),
                    error_path.map_or(defaults.error_path, PathBuf::from),
                )
                .with_debug(debug),
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidConfig` if a token is set without a
    /// destination chat.
    pub fn validate(&self) -> Result<()> {
        let has_chat = self.chat.as_deref().is_some_and(|c| !c.trim().is_empty());
        if self.token.is_some() && !has_chat {
            return Err(ReportError::InvalidConfig {
                reason: "telegram token set without a destination chat".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ReportError::InvalidConfig {
                reason: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}
