//! Remote delivery transports.
//!
//! This module provides the [`Transport`] trait and its implementations:
//! - [`TelegramTransport`]: sends through the Telegram Bot API
//! - [`LogTransport`]: logs what would have been sent

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};

/// Default Telegram Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Boxed future returned by [`Transport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Formatting markup applied by the chat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    /// HTML tags.
    #[serde(rename = "HTML")]
    Html,
    /// Legacy Markdown.
    Markdown,
    /// MarkdownV2.
    MarkdownV2,
}

/// Trait for remote delivery clients.
///
/// Implementations must be safe for concurrent use; the reporter shares one
/// instance across every report.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Returns the name of this transport.
    fn name(&self) -> &str;

    /// Sends a text message to a destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the message was not accepted. The reporter treats
    /// every error the same way.
    fn send<'a>(
        &'a self,
        destination: &'a str,
        text: &'a str,
        markup: Option<ParseMode>,
    ) -> SendFuture<'a>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn send<'a>(
        &'a self,
        destination: &'a str,
        text: &'a str,
        markup: Option<ParseMode>,
    ) -> SendFuture<'a> {
        (**self).send(destination, text, markup)
    }
}

/// Configuration for the Telegram transport.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by `@BotFather`.
    pub token: String,
    /// Bot API base URL.
    pub api_base: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Whether link previews are suppressed.
    pub disable_web_page_preview: bool,
}

impl TelegramConfig {
    /// Creates a configuration for the given bot token.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidConfig` if the token is empty.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ReportError::InvalidConfig {
                reason: "telegram token cannot be empty".to_string(),
            });
        }

        Ok(Self {
            token,
            api_base: TELEGRAM_API_BASE.to_string(),
            timeout_secs: 10,
            disable_web_page_preview: true,
        })
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("disable_web_page_preview", &self.disable_web_page_preview)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    error_code: Option<u16>,
}

/// Sends messages through the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    config: TelegramConfig,
    client: Client,
}

impl TelegramTransport {
    /// Creates a new Telegram transport.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Http` if the HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.token
        )
    }

    async fn send_message(
        &self,
        destination: &str,
        text: &str,
        markup: Option<ParseMode>,
    ) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: destination,
            text,
            parse_mode: markup,
            disable_web_page_preview: self.config.disable_web_page_preview,
        };

        // Strip the URL from client errors: it embeds the bot token.
        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let body: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                return Err(ReportError::transport(format!(
                    "unexpected response (status {status}): {}",
                    err.without_url()
                )));
            }
        };

        if status.is_success() && body.ok {
            debug!(chat = %destination, chars = text.chars().count(), "telegram message sent");
            return Ok(());
        }

        let code = body.error_code.unwrap_or_else(|| status.as_u16());
        let description = body
            .description
            .unwrap_or_else(|| "no description".to_string());
        warn!(chat = %destination, code, description = %description, "telegram rejected message");
        Err(ReportError::transport(format!(
            "telegram error {code}: {description}"
        )))
    }
}

impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send<'a>(
        &'a self,
        destination: &'a str,
        text: &'a str,
        markup: Option<ParseMode>,
    ) -> SendFuture<'a> {
        Box::pin(self.send_message(destination, text, markup))
    }
}

/// A transport that only logs, for deployments without a chat credential.
#[derive(Debug, Clone)]
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    /// Creates a new log transport.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new("log")
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(
        &'a self,
        destination: &'a str,
        text: &'a str,
        markup: Option<ParseMode>,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            info!(
                transport = %self.name,
                destination = %destination,
                markup = ?markup,
                "would send notification"
            );
            debug!(text = %text, "notification text");
            Ok(())
        })
    }
}
