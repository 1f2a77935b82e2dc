//! Core enumerations for the reporting bridge.
//!
//! - [`Mode`]: the deployment environment a reporter is bound to
//! - [`Severity`]: the classification of a single report
//! - [`SinkLevel`]: the local log level a report is written at

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// The deployment mode a reporter runs in.
///
/// Only [`Mode::Pre`] and [`Mode::Prod`] forward info-level reports to chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// A developer machine.
    #[default]
    Local,
    /// Automated test runs.
    Test,
    /// Shared development environment.
    Dev,
    /// Pre-production / staging.
    Pre,
    /// Production.
    Prod,
}

impl Mode {
    /// Returns the mode label as used in message headlines.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Test => "TEST",
            Self::Dev => "DEV",
            Self::Pre => "PRE",
            Self::Prod => "PROD",
        }
    }

    /// Returns the lowercase label used as the first hashtag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Test => "test",
            Self::Dev => "dev",
            Self::Pre => "pre",
            Self::Prod => "prod",
        }
    }

    /// Returns true if info-level reports are forwarded in this mode.
    #[must_use]
    pub const fn forwards_info(&self) -> bool {
        matches!(self, Self::Pre | Self::Prod)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ReportError;

    /// Parses a mode label case-insensitively. An empty label is [`Mode::Local`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "LOCAL" => Ok(Self::Local),
            "TEST" => Ok(Self::Test),
            "DEV" => Ok(Self::Dev),
            "PRE" => Ok(Self::Pre),
            "PROD" => Ok(Self::Prod),
            _ => Err(ReportError::InvalidMode(s.to_string())),
        }
    }
}

/// The local log level (and channel) a report is written at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkLevel {
    /// Debug level, low channel.
    Debug,
    /// Info level, low channel.
    Info,
    /// Warning level, high channel.
    Warning,
    /// Error level, high channel.
    Error,
    /// Critical level, high channel.
    Critical,
}

impl SinkLevel {
    /// Returns the level as an uppercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    /// Returns true if this level belongs to the high-severity channel.
    #[must_use]
    pub const fn is_high(&self) -> bool {
        matches!(self, Self::Warning | Self::Error | Self::Critical)
    }
}

impl fmt::Display for SinkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The severity of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Sequence of calls, internal values. Never leaves the process.
    Debug,
    /// System logs and event journal.
    Info,
    /// Unexpected behavior without consequences.
    Warning,
    /// An unhandled error occurred.
    Error,
    /// An error that affects the operation of the service.
    Critical,
    /// A tracked user action fired.
    Important,
    /// A user request that needs an administrator.
    Request,
}

impl Severity {
    /// All severities, in display order.
    pub const ALL: [Self; 7] = [
        Self::Debug,
        Self::Info,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Important,
        Self::Request,
    ];

    /// Returns the symbol that opens the headline.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Debug => "💬",
            Self::Info => "🟢",
            Self::Warning => "🟡",
            Self::Error => "🔴",
            Self::Critical => "❗️",
            Self::Important => "✅",
            Self::Request => "🛎",
        }
    }

    /// Returns the uppercase label used in the headline.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Important => "IMPORTANT",
            Self::Request => "REQUEST",
        }
    }

    /// Returns true if reports of this severity carry call-site provenance.
    #[must_use]
    pub const fn carries_call_site(&self) -> bool {
        !matches!(self, Self::Debug)
    }

    /// Returns true if an attached error's frames may supply provenance.
    #[must_use]
    pub const fn is_traceback_eligible(&self) -> bool {
        matches!(self, Self::Warning | Self::Error | Self::Critical)
    }

    /// Returns true if reports of this severity may be sent to chat at all.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        !matches!(self, Self::Debug)
    }

    /// Returns true if remote delivery depends on the deployment mode.
    #[must_use]
    pub const fn is_mode_gated(&self) -> bool {
        matches!(self, Self::Info)
    }

    /// Returns the local sink level for this severity.
    #[must_use]
    pub const fn sink_level(&self) -> SinkLevel {
        match self {
            Self::Debug => SinkLevel::Debug,
            Self::Info | Self::Important | Self::Request => SinkLevel::Info,
            Self::Warning => SinkLevel::Warning,
            Self::Error => SinkLevel::Error,
            Self::Critical => SinkLevel::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod mode_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("LOCAL", Mode::Local ; "local")]
        #[test_case("test", Mode::Test ; "lowercase test")]
        #[test_case("Dev", Mode::Dev ; "mixed case dev")]
        #[test_case("PRE", Mode::Pre ; "pre")]
        #[test_case(" PROD ", Mode::Prod ; "padded prod")]
        #[test_case("", Mode::Local ; "empty defaults to local")]
        fn parse(label: &str, expected: Mode) {
            assert_eq!(label.parse::<Mode>().unwrap(), expected);
        }

        #[test]
        fn parse_unknown() {
            let err = "STAGING".parse::<Mode>().unwrap_err();
            assert!(matches!(err, ReportError::InvalidMode(ref m) if m == "STAGING"));
        }

        #[test]
        fn default_is_local() {
            assert_eq!(Mode::default(), Mode::Local);
            assert!(!Mode::default().forwards_info());
        }

        #[test]
        fn forwards_info_only_pre_and_prod() {
            assert!(Mode::Pre.forwards_info());
            assert!(Mode::Prod.forwards_info());
            assert!(!Mode::Local.forwards_info());
            assert!(!Mode::Test.forwards_info());
            assert!(!Mode::Dev.forwards_info());
        }

        #[test]
        fn tag_is_lowercase_label() {
            for mode in [Mode::Local, Mode::Test, Mode::Dev, Mode::Pre, Mode::Prod] {
                assert_eq!(mode.tag(), mode.as_str().to_lowercase());
            }
        }

        #[test]
        fn serde_uses_uppercase() {
            let json = serde_json::to_string(&Mode::Prod).unwrap();
            assert_eq!(json, "\"PROD\"");
            let mode: Mode = serde_json::from_str("\"PRE\"").unwrap();
            assert_eq!(mode, Mode::Pre);
        }
    }

    mod severity_tests {
        use super::*;
        use test_case::test_case;

        #[test]
        fn traceback_eligibility() {
            let eligible: Vec<_> = Severity::ALL
                .iter()
                .filter(|s| s.is_traceback_eligible())
                .copied()
                .collect();
            assert_eq!(
                eligible,
                vec![Severity::Warning, Severity::Error, Severity::Critical]
            );
        }

        #[test]
        fn only_debug_is_local() {
            for severity in Severity::ALL {
                assert_eq!(severity.is_remote(), severity != Severity::Debug);
            }
        }

        #[test]
        fn only_info_is_mode_gated() {
            for severity in Severity::ALL {
                assert_eq!(severity.is_mode_gated(), severity == Severity::Info);
            }
        }

        #[test_case(Severity::Debug, SinkLevel::Debug)]
        #[test_case(Severity::Info, SinkLevel::Info)]
        #[test_case(Severity::Warning, SinkLevel::Warning)]
        #[test_case(Severity::Error, SinkLevel::Error)]
        #[test_case(Severity::Critical, SinkLevel::Critical)]
        #[test_case(Severity::Important, SinkLevel::Info)]
        #[test_case(Severity::Request, SinkLevel::Info)]
        fn sink_routing(severity: Severity, level: SinkLevel) {
            assert_eq!(severity.sink_level(), level);
        }

        #[test]
        fn symbols_are_distinct() {
            let mut symbols: Vec<_> = Severity::ALL.iter().map(Severity::symbol).collect();
            symbols.sort_unstable();
            symbols.dedup();
            assert_eq!(symbols.len(), Severity::ALL.len());
        }

        #[test]
        fn display_is_label() {
            assert_eq!(Severity::Critical.to_string(), "CRITICAL");
            assert_eq!(Severity::Request.to_string(), "REQUEST");
        }
    }

    #[test]
    fn sink_level_channels() {
        assert!(!SinkLevel::Debug.is_high());
        assert!(!SinkLevel::Info.is_high());
        assert!(SinkLevel::Warning.is_high());
        assert!(SinkLevel::Error.is_high());
        assert!(SinkLevel::Critical.is_high());
    }
}
