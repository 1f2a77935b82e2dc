//! Message composition.
//!
//! Builds the chat text for a report. The layout is fixed:
//!
//! ```text
//! {symbol} {MODE} {SEVERITY}
//! {dotted.logical.path}
//!
//! {free text}
//!
//! {key1} = {value1}
//!
//! {filename}:{line}
//! #{mode} #{tag1} #{tag2}
//! ```
//!
//! The logical path line and the extra block disappear, separators included,
//! when absent.

use crate::payload::Payload;
use crate::provenance::Provenance;
use crate::types::{Mode, Severity};

/// A composed notification in its two delivery forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The message without the extra block.
    pub base: String,
    /// The message with the extra block, when there is one.
    pub extended: Option<String>,
}

impl Message {
    /// Returns the text to attempt first.
    #[must_use]
    pub fn preferred(&self) -> &str {
        self.extended.as_deref().unwrap_or(&self.base)
    }

    /// Returns true if an extra block was rendered.
    #[must_use]
    pub const fn has_extra(&self) -> bool {
        self.extended.is_some()
    }
}

/// Composes the base and extended messages for a report.
#[must_use]
pub fn compose(
    mode: Mode,
    severity: Severity,
    text: &str,
    provenance: Option<&Provenance>,
    payload: Option<&Payload>,
    tags: &[String],
) -> Message {
    let headline = headline(mode, severity, text, provenance);
    let footer = footer(mode, provenance, tags);

    let extended = payload
        .filter(|p| !p.is_empty())
        .map(|p| format!("{headline}\n\n{}{footer}", p.block()));

    Message {
        base: format!("{headline}{footer}"),
        extended,
    }
}

/// Renders `{symbol} {MODE} {SEVERITY}{logical_path}\n\n{text}`.
#[must_use]
pub fn headline(
    mode: Mode,
    severity: Severity,
    text: &str,
    provenance: Option<&Provenance>,
) -> String {
    let path = provenance.map_or("", |p| p.logical_path.as_str());
    format!(
        "{} {mode} {}{path}\n\n{text}",
        severity.symbol(),
        severity.label()
    )
}

/// Renders the location line and the hashtag line, with the leading separator.
#[must_use]
pub fn footer(mode: Mode, provenance: Option<&Provenance>, tags: &[String]) -> String {
    let location = provenance.map(Provenance::location).unwrap_or_default();
    format!("\n\n{location}\n{}", hashtags(mode, tags))
}

/// Renders `#{mode} #{tag}…` with the lowercase mode first.
#[must_use]
pub fn hashtags(mode: Mode, tags: &[String]) -> String {
    std::iter::once(mode.tag())
        .chain(tags.iter().map(String::as_str))
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}
