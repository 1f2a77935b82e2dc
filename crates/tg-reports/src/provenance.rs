//! Provenance resolution.
//!
//! Works out where a report came from: the source file and line, the
//! enclosing function, and the dotted logical path shown under the headline.
//!
//! Raw stack walking is confined to this module. Everything else sees
//! [`Frame`] descriptors:
//! - [`CallSite`] is captured in the public entry points through
//!   `#[track_caller]`, with the function name looked up via `backtrace`
//! - [`TracedError`] snapshots the frames around a caught error
//! - [`ProvenanceResolver`] picks one of the two and cleans it up

use std::error::Error as StdError;
use std::fmt::{self, Write as _};
use std::panic::Location;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// Crate path prefix used to recognize our own frames.
const CRATE_PREFIX: &str = "tg_reports::";

/// Function name treated as a transparent wrapper.
const WRAPPER_FUNCTION: &str = "handle";

/// Upper bound on frames kept from one capture.
const MAX_FRAMES: usize = 64;

/// A single resolved stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Source file path as recorded in debug info.
    pub filename: String,
    /// Line number in the source file.
    pub line: u32,
    /// Name of the enclosing function, if symbols are available.
    pub function: Option<String>,
}

impl Frame {
    /// Creates a frame descriptor.
    pub fn new(filename: impl Into<String>, line: u32, function: Option<&str>) -> Self {
        Self {
            filename: filename.into(),
            line,
            function: function.map(str::to_string),
        }
    }
}

/// The location a public report method was called from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Source file of the caller.
    pub file: &'static str,
    /// Line of the call.
    pub line: u32,
    /// Enclosing function of the caller, when it could be resolved.
    pub function: Option<String>,
}

impl CallSite {
    /// Captures the caller's location.
    ///
    /// Propagates through `#[track_caller]` functions, so called from a
    /// report entry point it records the line that invoked that entry point.
    ///
    /// The function name is taken from the stack frame at that exact file
    /// and line. It stays `None` if no such frame survived optimization.
    #[track_caller]
    #[must_use]
    pub fn capture(resolve_function: bool) -> Self {
        let location = Location::caller();
        let mut site = Self::at(location);
        if resolve_function {
            site.function = function_at(location);
        }
        site
    }

    /// Creates a call site from an explicit location, without a function name.
    #[must_use]
    pub fn at(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            function: None,
        }
    }

    /// Sets the enclosing function name.
    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

/// An error captured together with the frames around the point it was caught.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedError {
    message: String,
    causes: Vec<String>,
    frames: Vec<Frame>,
}

impl TracedError {
    /// Captures an error, its `source()` chain and the current stack.
    pub fn new(err: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            causes,
            frames: capture_frames(),
        }
    }

    /// Creates a traced error from explicit frames, innermost first.
    pub fn with_frames(message: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
            frames,
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the messages of the error's sources, outermost first.
    #[must_use]
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Returns the captured frames, innermost first.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Renders the full trace written to the local error log.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for cause in &self.causes {
            let _ = write!(out, "\nCaused by: {cause}");
        }
        if !self.frames.is_empty() {
            out.push_str("\n\nStack (innermost first):");
            for frame in &self.frames {
                let function = frame.function.as_deref().unwrap_or("<unknown>");
                let _ = write!(out, "\n  at {function} ({}:{})", frame.filename, frame.line);
            }
        }
        out
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: StdError + 'static> From<E> for TracedError {
    fn from(err: E) -> Self {
        Self::new(&err)
    }
}

/// Settings for provenance resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Path fragments identifying standard-library and dependency frames.
    pub library_markers: Vec<String>,
    /// Prefixes stripped from filenames to make them app-relative.
    pub strip_prefixes: Vec<String>,
    /// Whether the process working directory is also stripped.
    pub strip_working_dir: bool,
    /// Whether call-site function names are resolved from the stack.
    pub resolve_functions: bool,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            library_markers: vec![
                "/rustc/".to_string(),
                "/.cargo/registry/".to_string(),
                "/rustlib/".to_string(),
            ],
            strip_prefixes: vec!["/app/".to_string(), "/./".to_string()],
            strip_working_dir: true,
            resolve_functions: true,
        }
    }
}

impl ProvenanceConfig {
    /// Replaces the library markers.
    #[must_use]
    pub fn with_library_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.library_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a filename prefix to strip.
    #[must_use]
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefixes.push(prefix.into());
        self
    }

    /// Sets whether the working directory is stripped.
    #[must_use]
    pub const fn strip_working_dir(mut self, strip: bool) -> Self {
        self.strip_working_dir = strip;
        self
    }

    /// Sets whether call-site function names are resolved.
    #[must_use]
    pub const fn resolve_functions(mut self, resolve: bool) -> Self {
        self.resolve_functions = resolve;
        self
    }
}

/// Resolved provenance of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// App-relative source file.
    pub filename: String,
    /// Line number.
    pub line: u32,
    /// Enclosing function, if known.
    pub function: Option<String>,
    /// Dotted logical path prefixed with a newline, or empty.
    pub logical_path: String,
}

impl Provenance {
    /// Returns the `filename:line` location string.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}", self.filename, self.line)
    }
}

/// Picks and cleans the provenance of a report.
#[derive(Debug, Clone)]
pub struct ProvenanceResolver {
    config: ProvenanceConfig,
    working_dir: Option<String>,
}

impl ProvenanceResolver {
    /// Creates a resolver, snapshotting the working directory if configured.
    #[must_use]
    pub fn new(config: ProvenanceConfig) -> Self {
        let working_dir = if config.strip_working_dir {
            std::env::current_dir()
                .ok()
                .map(|dir| dir.to_string_lossy().into_owned())
        } else {
            None
        };
        Self {
            config,
            working_dir,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ProvenanceConfig {
        &self.config
    }

    /// Resolves provenance for a report.
    ///
    /// Traceback-eligible severities prefer the attached error's frames;
    /// otherwise the call site is used if the severity carries one.
    #[must_use]
    pub fn resolve(
        &self,
        severity: Severity,
        call_site: &CallSite,
        error: Option<&TracedError>,
    ) -> Option<Provenance> {
        if severity.is_traceback_eligible() {
            if let Some(frame) = error.and_then(|e| self.select_frame(e.frames())) {
                return Some(self.build(&frame.filename, frame.line, frame.function.as_deref()));
            }
        }

        severity.carries_call_site().then(|| {
            self.build(call_site.file, call_site.line, call_site.function.as_deref())
        })
    }

    /// Selects the innermost frame outside library code.
    ///
    /// Falls back to the innermost frame when every frame is library code.
    #[must_use]
    pub fn select_frame<'a>(&self, frames: &'a [Frame]) -> Option<&'a Frame> {
        frames
            .iter()
            .find(|frame| !self.is_library_path(&frame.filename))
            .or_else(|| frames.first())
    }

    /// Returns true if the path contains one of the library markers.
    #[must_use]
    pub fn is_library_path(&self, path: &str) -> bool {
        self.config
            .library_markers
            .iter()
            .any(|marker| path.contains(marker.as_str()))
    }

    /// Strips deployment prefixes so the path is app-relative.
    #[must_use]
    pub fn clean_filename(&self, filename: &str) -> String {
        let mut path = filename;
        if let Some(dir) = &self.working_dir {
            if !dir.is_empty() && dir != "/" {
                path = path.strip_prefix(dir.as_str()).unwrap_or(path);
            }
        }
        for prefix in &self.config.strip_prefixes {
            path = path.strip_prefix(prefix.as_str()).unwrap_or(path);
        }
        let path = path.strip_prefix("./").unwrap_or(path);
        path.trim_start_matches(['/', '\\']).to_string()
    }

    fn build(&self, filename: &str, line: u32, function: Option<&str>) -> Provenance {
        let filename = self.clean_filename(filename);
        let logical_path = logical_path(&filename, function);
        Provenance {
            filename,
            line,
            function: function.map(str::to_string),
            logical_path,
        }
    }
}

/// Derives the dotted logical path from a cleaned filename and function.
///
/// `src/service/worker.rs` + `run` becomes `"\nservice.worker.run"`. A
/// leading `src` and then `api` segment are dropped, as are `mod` file stems
/// and the `handle` wrapper function.
#[must_use]
pub fn logical_path(filename: &str, function: Option<&str>) -> String {
    let mut segments: Vec<&str> = filename
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if let Some(file) = segments.pop() {
        let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
        if stem != "mod" {
            segments.extend(stem.split('.').filter(|s| !s.is_empty()));
        }
    }

    for root in ["src", "api"] {
        if segments.first() == Some(&root) {
            segments.remove(0);
        }
    }

    if let Some(function) = function {
        if !function.is_empty() && function != WRAPPER_FUNCTION {
            segments.push(function);
        }
    }

    if segments.is_empty() {
        String::new()
    } else {
        format!("\n{}", segments.join("."))
    }
}

/// Extracts the bare function name from a demangled symbol.
///
/// `app::worker::run::{{closure}}` and `<app::Worker as app::Job>::run` both
/// yield `run`.
#[must_use]
pub fn function_name(symbol: &str) -> String {
    let mut symbol = symbol.trim();
    // Closure and async-block suffixes: `::{{closure}}`, `::{async_block#0}`.
    while symbol.ends_with('}') {
        match symbol.rfind("::{") {
            Some(i) => symbol = &symbol[..i],
            None => break,
        }
    }

    // Last `::` outside of generic brackets, ignoring turbofish.
    let mut depth = 0usize;
    let mut split_at = None;
    let bytes = symbol.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0
                && bytes.get(i + 1) == Some(&b':')
                && bytes.get(i + 2) != Some(&b'<') =>
            {
                split_at = Some(i + 2);
            }
            _ => {}
        }
    }
    let last = split_at.map_or(symbol, |i| &symbol[i..]);
    let last = last.split_once("::<").map_or(last, |(name, _)| name);
    last.to_string()
}

fn is_internal_symbol(symbol: &str) -> bool {
    symbol.starts_with("backtrace::")
        || symbol.starts_with(CRATE_PREFIX)
        || symbol.starts_with("<tg_reports::")
        || symbol.contains(" as tg_reports::")
}

/// `From`/`Into` glue between the caller and this crate.
fn is_conversion_shim(symbol: &str) -> bool {
    symbol.starts_with("core::convert::") || symbol.contains(" as core::convert::")
}

/// Finds the function of the frame executing at `location`.
fn function_at(location: &Location<'_>) -> Option<String> {
    let target = Path::new(location.file());
    let mut found = None;
    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            if found.is_some() {
                return;
            }
            let (Some(name), Some(file), Some(line)) =
                (symbol.name(), symbol.filename(), symbol.lineno())
            else {
                return;
            };
            if line == location.line() && file.ends_with(target) {
                found = Some(function_name(&format!("{name:#}")));
            }
        });
        found.is_none()
    });
    found
}

/// Captures the stack, leaving out this crate's frames and conversion glue.
fn capture_frames() -> Vec<Frame> {
    let mut frames = Vec::new();
    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            let Some(name) = symbol.name() else {
                return;
            };
            let name = format!("{name:#}");
            if is_internal_symbol(&name) || is_conversion_shim(&name) {
                return;
            }
            if let (Some(path), Some(line)) = (symbol.filename(), symbol.lineno()) {
                frames.push(Frame {
                    filename: path.to_string_lossy().into_owned(),
                    line,
                    function: Some(function_name(&name)),
                });
            }
        });
        frames.len() < MAX_FRAMES
    });
    frames
}
