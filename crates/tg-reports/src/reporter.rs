//! The reporter and its severity-named entry points.
//!
//! This module provides the [`Reporter`], the main entry point of the crate.
//! Each call writes a local log line, then composes a chat message and hands
//! it to the [`Transport`], falling back to a shorter message when the full
//! one is rejected. Nothing here returns an error to the caller: the outcome
//! is reported as a [`Delivery`] value instead.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use tracing::{debug, warn};

use crate::config::ReporterConfig;
use crate::error::Result;
use crate::message::{compose, Message};
use crate::payload::{classify, normalize, to_json_string, Extra, Payload};
use crate::provenance::{CallSite, ProvenanceConfig, ProvenanceResolver, TracedError};
use crate::sink::{FileSink, LogSink, TracingSink};
use crate::transport::{LogTransport, TelegramConfig, TelegramTransport, Transport};
use crate::types::{Mode, Severity, SinkLevel};

/// Why a report was not sent to chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Debug reports stay in the local logs.
    LocalOnly,
    /// Info reports are only forwarded in PRE and PROD.
    ModeGated,
    /// The caller asked for a silent report.
    Silenced,
}

/// The outcome of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The full message was delivered.
    Sent,
    /// The full message was rejected; the message without extra was delivered.
    SentWithoutExtra,
    /// No delivery was attempted.
    Skipped(SkipReason),
    /// Delivery failed and the failure was logged locally.
    Failed,
}

impl Delivery {
    /// Returns true if some form of the message reached the chat.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent | Self::SentWithoutExtra)
    }
}

/// Severity-routed reporter bound to one deployment.
///
/// Create one per process and share it; every field is fixed at
/// construction.
///
/// ```rust,no_run
/// use tg_reports::{Fields, Mode, Reporter, ReporterConfig};
///
/// # async fn example() -> tg_reports::Result<()> {
/// let reporter = Reporter::from_config(
///     ReporterConfig::new(Mode::Prod).with_telegram("123:abc", "-100500"),
/// )?;
///
/// reporter
///     .warning("payment retried")
///     .extra(Fields::new().field("order", 1042).field("attempt", 2))
///     .tags(["billing"])
///     .await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Reporter {
    mode: Mode,
    destination: String,
    transport: Box<dyn Transport>,
    sink: Box<dyn LogSink>,
    resolver: ProvenanceResolver,
}

impl Reporter {
    /// Creates a reporter that logs through `tracing`.
    pub fn new(
        mode: Mode,
        transport: impl Transport + 'static,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            destination: destination.into(),
            transport: Box::new(transport),
            sink: Box::new(TracingSink),
            resolver: ProvenanceResolver::new(ProvenanceConfig::default()),
        }
    }

    /// Builds a reporter and its collaborators from configuration.
    ///
    /// A token selects [`TelegramTransport`], otherwise [`LogTransport`] is
    /// used. Sink paths select [`FileSink`], otherwise [`TracingSink`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the HTTP client
    /// cannot be built, or the log files cannot be opened.
    pub fn from_config(config: ReporterConfig) -> Result<Self> {
        config.validate()?;

        let destination = config.chat.clone().unwrap_or_default();
        let transport: Box<dyn Transport> = match &config.token {
            Some(token) => Box::new(TelegramTransport::new(
                TelegramConfig::new(token.as_str())?
                    .with_api_base(config.api_base.as_str())
                    .with_timeout_secs(config.timeout_secs),
            )?),
            None => Box::new(LogTransport::default()),
        };
        let sink: Box<dyn LogSink> = match config.sinks {
            Some(sinks) => Box::new(FileSink::new(sinks)?),
            None => Box::new(TracingSink),
        };

        debug!(
            mode = %config.mode,
            transport = %transport.name(),
            "reporter configured"
        );

        Ok(Self {
            mode: config.mode,
            destination,
            transport,
            sink,
            resolver: ProvenanceResolver::new(config.provenance),
        })
    }

    /// Replaces the local sink.
    #[must_use]
    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Replaces the provenance settings.
    #[must_use]
    pub fn with_provenance(mut self, config: ProvenanceConfig) -> Self {
        self.resolver = ProvenanceResolver::new(config);
        self
    }

    /// Returns the deployment mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the destination chat id.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Returns the name of the transport in use.
    #[must_use]
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Sequence of calls, internal values. Local only.
    #[track_caller]
    pub fn debug(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Debug, text)
    }

    /// System logs and event journal. Sent in PRE and PROD only.
    #[track_caller]
    pub fn info(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Info, text)
    }

    /// Unexpected behavior that has no consequences.
    #[track_caller]
    pub fn warning(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Warning, text)
    }

    /// An unhandled error occurred.
    #[track_caller]
    pub fn error(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Error, text)
    }

    /// An error that affects the operation of the service.
    #[track_caller]
    pub fn critical(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Critical, text)
    }

    /// A tracked user action fired.
    #[track_caller]
    pub fn important(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Important, text)
    }

    /// A user request that needs an administrator.
    #[track_caller]
    pub fn request(&self, text: impl Into<String>) -> Report<'_> {
        self.report(Severity::Request, text)
    }

    /// Starts a report of any severity, capturing the caller's location.
    #[track_caller]
    pub fn report(&self, severity: Severity, text: impl Into<String>) -> Report<'_> {
        let resolve = severity.carries_call_site() && self.resolver.config().resolve_functions;
        Report {
            reporter: self,
            severity,
            text: text.into(),
            extra: None,
            tags: Vec::new(),
            error: None,
            silent: false,
            call_site: CallSite::capture(resolve),
        }
    }

    fn write_local(
        &self,
        severity: Severity,
        text: &str,
        payload: Option<&Payload>,
        error: Option<&TracedError>,
    ) {
        let content = match error {
            Some(error) => error.render(),
            None => format!("{text}  {}", to_json_string(payload)),
        };
        self.write_sink(severity.sink_level(), &format!("{}  {content}", severity.symbol()));
    }

    fn write_sink(&self, level: SinkLevel, line: &str) {
        if let Err(err) = self.sink.write(level, line) {
            warn!(error = %err, level = %level, "local sink write failed");
        }
    }

    async fn dispatch(
        &self,
        severity: Severity,
        text: &str,
        payload: Option<Payload>,
        tags: &[String],
        error: Option<&TracedError>,
        call_site: &CallSite,
    ) -> Delivery {
        let (escalation, payload) = classify(payload);
        let severity = match escalation {
            Some(escalated) => {
                debug!(from = %severity, to = %escalated, "report escalated by payload");
                escalated
            }
            None => severity,
        };

        if severity.is_mode_gated() && !self.mode.forwards_info() {
            debug!(mode = %self.mode, severity = %severity, "notification suppressed by mode");
            return Delivery::Skipped(SkipReason::ModeGated);
        }

        let provenance = self.resolver.resolve(severity, call_site, error);
        let message = compose(
            self.mode,
            severity,
            text,
            provenance.as_ref(),
            payload.as_ref(),
            tags,
        );
        self.deliver(severity, &message, payload.as_ref()).await
    }

    async fn deliver(
        &self,
        severity: Severity,
        message: &Message,
        payload: Option<&Payload>,
    ) -> Delivery {
        let symbol = Severity::Error.symbol();

        let Err(err) = self
            .transport
            .send(&self.destination, message.preferred(), None)
            .await
        else {
            return Delivery::Sent;
        };

        if !message.has_extra() {
            self.log_failure(&format!(
                "{symbol}  Send report  {severity}  {}  {err}",
                message.base
            ));
            return Delivery::Failed;
        }

        self.log_failure(&format!(
            "{symbol}  Send report  {}  {err}",
            to_json_string(payload)
        ));

        match self
            .transport
            .send(&self.destination, &message.base, None)
            .await
        {
            Ok(()) => Delivery::SentWithoutExtra,
            Err(err) => {
                self.log_failure(&format!(
                    "{symbol}  Send report  {severity}  {}  {err}",
                    message.base
                ));
                Delivery::Failed
            }
        }
    }

    fn log_failure(&self, line: &str) {
        warn!(transport = %self.transport.name(), "notification delivery failed");
        self.write_sink(SinkLevel::Error, line);
    }
}

/// A report being assembled. Await it (or call [`Report::send`]) to emit it.
#[derive(Debug)]
#[must_use = "reports do nothing unless awaited"]
pub struct Report<'r> {
    reporter: &'r Reporter,
    severity: Severity,
    text: String,
    extra: Option<Extra>,
    tags: Vec<String>,
    error: Option<TracedError>,
    silent: bool,
    call_site: CallSite,
}

impl<'r> Report<'r> {
    /// Attaches auxiliary data.
    pub fn extra(mut self, extra: impl Into<Extra>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Appends hashtags (without the `#`).
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Appends one hashtag (without the `#`).
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Attaches the error that caused this report.
    ///
    /// Only warning, error and critical reports use it; other severities
    /// ignore it.
    pub fn error(mut self, error: impl Into<TracedError>) -> Self {
        if self.severity.is_traceback_eligible() {
            self.error = Some(error.into());
        } else {
            debug!(severity = %self.severity, "error ignored for severity");
        }
        self
    }

    /// Writes locally but skips the chat notification.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Overrides the call site, for wrappers reporting on behalf of a caller.
    pub fn at(mut self, call_site: CallSite) -> Self {
        self.call_site = call_site;
        self
    }

    /// Returns the severity this report was created with.
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Writes the local line and attempts delivery.
    pub async fn send(self) -> Delivery {
        let Self {
            reporter,
            severity,
            text,
            extra,
            tags,
            error,
            silent,
            call_site,
        } = self;

        let payload = normalize(extra);
        reporter.write_local(severity, &text, payload.as_ref(), error.as_ref());

        if !severity.is_remote() {
            return Delivery::Skipped(SkipReason::LocalOnly);
        }
        if silent {
            return Delivery::Skipped(SkipReason::Silenced);
        }

        reporter
            .dispatch(severity, &text, payload, &tags, error.as_ref(), &call_site)
            .await
    }
}

impl<'r> IntoFuture for Report<'r> {
    type Output = Delivery;
    type IntoFuture = Pin<Box<dyn Future<Output = Delivery> + Send + 'r>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::payload::Fields;
    use crate::provenance::Frame;
    use crate::sink::MemorySink;
    use crate::transport::{ParseMode, SendFuture};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Records every send; fails according to a script, then succeeds.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        failures: Mutex<VecDeque<bool>>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn failing(script: &[bool]) -> Self {
            Self {
                failures: Mutex::new(script.iter().copied().collect()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        fn send<'a>(
            &'a self,
            _destination: &'a str,
            text: &'a str,
            _markup: Option<ParseMode>,
        ) -> SendFuture<'a> {
            self.sent.lock().push(text.to_string());
            let fail = self.failures.lock().pop_front().unwrap_or(false);
            Box::pin(async move {
                if fail {
                    Err(ReportError::transport("rate limited"))
                } else {
                    Ok(())
                }
            })
        }
    }

    struct Harness {
        reporter: Reporter,
        transport: Arc<ScriptedTransport>,
        sink: Arc<MemorySink>,
    }

    fn harness(mode: Mode, script: &[bool]) -> Harness {
        let transport = Arc::new(ScriptedTransport::failing(script));
        let sink = Arc::new(MemorySink::new());
        let reporter = Reporter::new(mode, Arc::clone(&transport), "-100")
            .with_sink(Arc::clone(&sink))
            .with_provenance(
                ProvenanceConfig::default()
                    .strip_working_dir(false)
                    .resolve_functions(false),
            );
        Harness {
            reporter,
            transport,
            sink,
        }
    }

    fn site() -> CallSite {
        CallSite {
            file: "src/service/worker.rs",
            line: 7,
            function: Some("run".to_string()),
        }
    }

    mod local_sink_tests {
        use super::*;

        #[tokio::test]
        async fn info_line_contains_json_payload() {
            let h = harness(Mode::Local, &[]);
            h.reporter
                .info("user joined")
                .extra(Fields::new().field("id", 7))
                .await;
            assert_eq!(
                h.sink.lines(),
                vec![(SinkLevel::Info, r#"🟢  user joined  {"id": "7"}"#.to_string())]
            );
        }

        #[tokio::test]
        async fn local_json_escapes_non_ascii() {
            let h = harness(Mode::Local, &[]);
            h.reporter
                .important("order placed")
                .extra(Fields::new().field("city", "Zürich").field("items", [1, 2]))
                .await;
            assert_eq!(
                h.sink.lines()[0].1,
                r#"✅  order placed  {"city": "Z\u00fcrich", "items": "[1, 2]"}"#
            );
        }

        #[tokio::test]
        async fn missing_payload_renders_null() {
            let h = harness(Mode::Local, &[]);
            h.reporter.debug("tick").await;
            assert_eq!(
                h.sink.lines(),
                vec![(SinkLevel::Debug, "💬  tick  null".to_string())]
            );
        }

        #[tokio::test]
        async fn error_line_is_trace_when_error_attached() {
            let h = harness(Mode::Prod, &[]);
            let error = TracedError::with_frames(
                "db down",
                vec![Frame::new("/app/src/db.rs", 3, Some("connect"))],
            );
            h.reporter.error("query failed").error(error).await;

            let high = h.sink.high_lines();
            assert_eq!(high.len(), 1);
            assert!(high[0].starts_with("🔴  db down"));
            assert!(high[0].contains("at connect (/app/src/db.rs:3)"));
        }

        #[tokio::test]
        async fn error_ignored_for_request() {
            let h = harness(Mode::Prod, &[]);
            let error = TracedError::with_frames("ignored", Vec::new());
            h.reporter.request("help").error(error).await;
            assert_eq!(h.sink.lines()[0].1, "🛎  help  null");
        }

        #[tokio::test]
        async fn critical_routes_to_high_channel() {
            let h = harness(Mode::Prod, &[]);
            h.reporter.critical("down").silent(true).await;
            assert_eq!(
                h.sink.lines(),
                vec![(SinkLevel::Critical, "❗️  down  null".to_string())]
            );
        }
    }

    mod dispatch_tests {
        use super::*;

        #[tokio::test]
        async fn sends_extended_message() {
            let h = harness(Mode::Prod, &[]);
            let delivery = h
                .reporter
                .warning("slow")
                .extra(Fields::new().field("ms", 1500))
                .tag("perf")
                .at(site())
                .await;

            assert_eq!(delivery, Delivery::Sent);
            assert_eq!(
                h.transport.sent(),
                vec![
                    concat!(
                        "🟡 PROD WARNING\nservice.worker.run\n\nslow\n\n",
                        "ms = 1500\n\nsrc/service/worker.rs:7\n#prod #perf",
                    )
                    .to_string()
                ]
            );
        }

        #[tokio::test]
        async fn fallback_sends_base_message() {
            let h = harness(Mode::Prod, &[true]);
            let delivery = h
                .reporter
                .error("boom")
                .extra(Fields::new().field("huge", "x"))
                .at(site())
                .await;

            assert_eq!(delivery, Delivery::SentWithoutExtra);
            let sent = h.transport.sent();
            assert_eq!(sent.len(), 2);
            assert!(sent[0].contains("huge = x"));
            assert!(!sent[1].contains("huge = x"));
            assert_eq!(
                sent[1],
                "🔴 PROD ERROR\nservice.worker.run\n\nboom\n\nsrc/service/worker.rs:7\n#prod"
            );

            let failures: Vec<_> = h
                .sink
                .high_lines()
                .into_iter()
                .filter(|l| l.contains("Send report"))
                .collect();
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains(r#"{"huge": "x"}"#));
            assert!(failures[0].contains("rate limited"));
        }

        #[tokio::test]
        async fn double_failure_logs_twice_and_gives_up() {
            let h = harness(Mode::Prod, &[true, true]);
            let delivery = h
                .reporter
                .critical("boom")
                .extra("context")
                .await;

            assert_eq!(delivery, Delivery::Failed);
            assert_eq!(h.transport.sent().len(), 2);
            let failures = h
                .sink
                .high_lines()
                .into_iter()
                .filter(|l| l.contains("Send report"))
                .count();
            assert_eq!(failures, 2);
        }

        #[tokio::test]
        async fn failure_without_extra_does_not_retry() {
            let h = harness(Mode::Prod, &[true]);
            let delivery = h.reporter.important("signup").await;

            assert_eq!(delivery, Delivery::Failed);
            assert_eq!(h.transport.sent().len(), 1);
            let failures = h.sink.high_lines();
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("Send report  IMPORTANT"));
        }

        #[tokio::test]
        async fn info_gated_outside_pre_and_prod() {
            for (mode, sent) in [
                (Mode::Local, false),
                (Mode::Test, false),
                (Mode::Dev, false),
                (Mode::Pre, true),
                (Mode::Prod, true),
            ] {
                let h = harness(mode, &[]);
                let delivery = h.reporter.info("hello").await;
                assert_eq!(delivery.is_sent(), sent, "mode {mode}");
                assert_eq!(h.transport.sent().len(), usize::from(sent));
                assert_eq!(h.sink.lines().len(), 1);
            }
        }

        #[tokio::test]
        async fn silent_skips_remote_only() {
            let h = harness(Mode::Prod, &[]);
            let delivery = h.reporter.warning("quiet").silent(true).await;
            assert_eq!(delivery, Delivery::Skipped(SkipReason::Silenced));
            assert!(h.transport.sent().is_empty());
            assert_eq!(h.sink.lines().len(), 1);
        }

        #[tokio::test]
        async fn debug_is_local_only() {
            let h = harness(Mode::Prod, &[]);
            let delivery = h.reporter.debug("trace").await;
            assert_eq!(delivery, Delivery::Skipped(SkipReason::LocalOnly));
            assert!(h.transport.sent().is_empty());
        }

        #[tokio::test]
        async fn escalation_overrides_mode_gate() {
            let h = harness(Mode::Local, &[]);
            let delivery = h
                .reporter
                .info("soft failure")
                .extra(Fields::new().field("name", "Error").field("code", 5))
                .await;

            assert_eq!(delivery, Delivery::Sent);
            let sent = h.transport.sent();
            assert!(sent[0].starts_with("🔴 LOCAL ERROR"));
            assert!(sent[0].contains("code = 5"));
            assert!(!sent[0].contains("name = Error"));
        }

        #[tokio::test]
        async fn traceback_frame_supplies_provenance() {
            let h = harness(Mode::Prod, &[]);
            let error = TracedError::with_frames(
                "timeout",
                vec![
                    Frame::new("/rustc/abc/library/std/src/net.rs", 1, Some("connect")),
                    Frame::new("/app/src/api/users/create.rs", 55, Some("handle")),
                ],
            );
            h.reporter.error("request failed").error(error).at(site()).await;

            let sent = h.transport.sent();
            assert_eq!(
                sent[0],
                concat!(
                    "🔴 PROD ERROR\nusers.create\n\nrequest failed\n\n",
                    "src/api/users/create.rs:55\n#prod",
                )
            );
        }
    }

    #[test]
    fn entry_points_capture_call_site_line() {
        let h = harness(Mode::Prod, &[]);
        let report = h.reporter.warning("x");
        assert_eq!(report.call_site.line, line!() - 1);
        assert!(report.call_site.file.ends_with("reporter.rs"));
        assert_eq!(report.severity(), Severity::Warning);
    }

    #[test]
    fn reporter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Reporter>();
    }

    #[test]
    fn report_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let h = harness(Mode::Prod, &[]);
        let future = h.reporter.info("x").into_future();
        assert_send(&future);
    }

    #[test]
    fn from_config_without_token_uses_log_transport() {
        let reporter = Reporter::from_config(ReporterConfig::new(Mode::Dev)).unwrap();
        assert_eq!(reporter.transport_name(), "log");
        assert_eq!(reporter.mode(), Mode::Dev);
        assert_eq!(reporter.destination(), "");
    }

    #[test]
    fn from_config_with_token_uses_telegram() {
        let reporter = Reporter::from_config(
            ReporterConfig::new(Mode::Prod).with_telegram("123:abc", "-1001"),
        )
        .unwrap();
        assert_eq!(reporter.transport_name(), "telegram");
        assert_eq!(reporter.destination(), "-1001");
    }

    #[test]
    fn from_config_opens_file_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = crate::sink::LogSinkConfig::new(
            dir.path().join("info.log"),
            dir.path().join("error.log"),
        );
        let reporter = Reporter::from_config(ReporterConfig::new(Mode::Test).with_sinks(sinks));
        assert!(reporter.is_ok());
        assert!(dir.path().join("error.log").exists());
    }
}
