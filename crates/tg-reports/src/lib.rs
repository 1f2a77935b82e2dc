//! Severity-routed reporting bridge for chat bots and services.
//!
//! `tg-reports` writes every report to local log sinks and forwards the ones
//! that matter to a Telegram chat, decorated with where they came from.
//!
//! # Features
//!
//! - **Seven severities**: debug, info, warning, error, critical, important, request
//! - **Mode gating**: info reports reach the chat only in PRE and PROD
//! - **Provenance**: caller file, line, function and a dotted logical path
//! - **Escalation**: an extra with `name = "Error"` is promoted to an error
//! - **Fallback**: a rejected message is retried without its extra block
//!
//! # Example
//!
//! ```rust
//! use tg_reports::{Delivery, Fields, LogTransport, Mode, Reporter, SkipReason};
//!
//! # async fn run() {
//! let reporter = Reporter::new(Mode::Dev, LogTransport::default(), "-100500");
//!
//! // Info is gated outside PRE and PROD.
//! let delivery = reporter.info("user joined").await;
//! assert_eq!(delivery, Delivery::Skipped(SkipReason::ModeGated));
//!
//! // Everything else is forwarded.
//! let delivery = reporter
//!     .request("access requested")
//!     .extra(Fields::new().field("user", "alice").field("role", "admin"))
//!     .tags(["access"])
//!     .await;
//! assert!(delivery.is_sent());
//! # }
//! ```
//!
//! # Configuration
//!
//! [`ReporterConfig`] reads `TG_REPORTS_*` environment variables or JSON:
//!
//! ```rust,no_run
//! use tg_reports::{Reporter, ReporterConfig};
//!
//! # fn main() -> tg_reports::Result<()> {
//! let reporter = Reporter::from_config(ReporterConfig::from_env()?)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod message;
pub mod payload;
pub mod provenance;
pub mod reporter;
pub mod sink;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use config::ReporterConfig;
pub use error::{ReportError, Result};
pub use message::Message;
pub use payload::{Extra, Fields, Payload};
pub use provenance::{CallSite, Frame, Provenance, ProvenanceConfig, TracedError};
pub use reporter::{Delivery, Report, Reporter, SkipReason};
pub use sink::{FileSink, LogSink, LogSinkConfig, MemorySink, MultiSink, TracingSink};
pub use transport::{LogTransport, ParseMode, TelegramConfig, TelegramTransport, Transport};
pub use types::{Mode, Severity, SinkLevel};
