//! Extra payload normalization.
//!
//! Callers attach arbitrary auxiliary data to a report as an [`Extra`]. Before
//! anything is logged or sent it is flattened into a [`Payload`]: an ordered
//! map of rendered strings, or a single rendered string.
//!
//! ```rust
//! use tg_reports::payload::{normalize, Fields, Payload};
//!
//! let extra = Fields::new()
//!     .field("user", "alice")
//!     .field("attempts", 3)
//!     .field("note", Option::<String>::None);
//!
//! let payload = normalize(Some(extra.into())).unwrap();
//! assert_eq!(payload.block(), "user = alice\nattempts = 3");
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Write};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::types::Severity;

/// Value of the `name`/`title` field that escalates a report to an error.
pub const ESCALATION_SENTINEL: &str = "Error";

/// Field keys inspected for the escalation sentinel.
pub const ESCALATION_KEYS: [&str; 2] = ["name", "title"];

/// A single field value before rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    /// A serialized value. Strings pass through unquoted, nulls are dropped.
    Json(Value),
    /// A value that was already rendered with `Display` or `Debug`.
    Rendered(String),
}

impl ExtraValue {
    /// Renders the value, or `None` for JSON null.
    fn render(self) -> Option<String> {
        match self {
            Self::Json(Value::Null) => None,
            Self::Json(Value::String(s)) | Self::Rendered(s) => Some(s),
            Self::Json(other) => Some(to_compat_json(&other)),
        }
    }
}

/// Ordered key/value builder for mapping-shaped extras.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(IndexMap<String, ExtraValue>);

impl Fields {
    /// Creates an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a serializable field.
    ///
    /// Values that fail to serialize (for example maps with non-string keys)
    /// fall back to their `Debug` rendering.
    #[must_use]
    pub fn field<T>(mut self, key: impl Into<String>, value: T) -> Self
    where
        T: Serialize + fmt::Debug,
    {
        let value = match serde_json::to_value(&value) {
            Ok(json) => ExtraValue::Json(json),
            Err(_) => ExtraValue::Rendered(format!("{value:?}")),
        };
        self.0.insert(key.into(), value);
        self
    }

    /// Adds a field rendered with `Display`.
    #[must_use]
    pub fn field_display(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.0
            .insert(key.into(), ExtraValue::Rendered(value.to_string()));
        self
    }

    /// Adds a field rendered with `Debug`.
    #[must_use]
    pub fn field_debug(mut self, key: impl Into<String>, value: impl fmt::Debug) -> Self {
        self.0
            .insert(key.into(), ExtraValue::Rendered(format!("{value:?}")));
        self
    }

    /// Returns the number of fields, including null ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no fields were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), ExtraValue::Json(v)))
                .collect(),
        )
    }
}

/// Caller-supplied auxiliary data, in any of the shapes a report accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Extra {
    /// A key/value mapping.
    Fields(Fields),
    /// A scalar or collection, kept as its string rendering.
    Scalar(String),
    /// An error value, kept as its message.
    Error(String),
}

impl Extra {
    /// Creates a scalar extra from any displayable value.
    pub fn scalar(value: impl fmt::Display) -> Self {
        Self::Scalar(value.to_string())
    }

    /// Creates an extra from an error value.
    pub fn error(err: &(dyn StdError + 'static)) -> Self {
        Self::Error(err.to_string())
    }
}

impl From<Fields> for Extra {
    fn from(fields: Fields) -> Self {
        Self::Fields(fields)
    }
}

impl From<&str> for Extra {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for Extra {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Value> for Extra {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Fields(map.into_iter().collect()),
            Value::Null => Self::Fields(Fields::new()),
            Value::String(s) => Self::Scalar(s),
            other => Self::Scalar(to_compat_json(&other)),
        }
    }
}

/// A normalized payload, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Rendered fields, in insertion order, without null entries.
    Fields(IndexMap<String, String>),
    /// A single rendered value.
    Text(String),
}

impl Payload {
    /// Returns true if there is nothing to render.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(fields) => fields.is_empty(),
            Self::Text(text) => text.is_empty(),
        }
    }

    /// Returns the rendered value of a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Self::Fields(fields) => fields.get(key).map(String::as_str),
            Self::Text(_) => None,
        }
    }

    /// Renders the extra block: `key = value` lines or the text itself.
    #[must_use]
    pub fn block(&self) -> String {
        match self {
            Self::Fields(fields) => fields
                .iter()
                .map(|(k, v)| format!("{k} = {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Text(text) => text.clone(),
        }
    }

    /// Converts the payload into a JSON value for local log lines.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Fields(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            Self::Text(text) => Value::String(text.clone()),
        }
    }
}

/// Renders an optional payload as JSON for local lines (`null` when absent).
#[must_use]
pub fn to_json_string(payload: Option<&Payload>) -> String {
    to_compat_json(&payload.map_or(Value::Null, Payload::to_json))
}

/// Renders a JSON value in the conventional log layout: `", "` and `": "`
/// separators, with everything outside ASCII written as `\uXXXX` escapes.
///
/// ```rust
/// use serde_json::json;
/// use tg_reports::payload::to_compat_json;
///
/// let value = json!({"ids": [1, 2], "city": "Zürich"});
/// assert_eq!(to_compat_json(&value), r#"{"ids": [1, 2], "city": "Z\u00fcrich"}"#);
/// ```
#[must_use]
pub fn to_compat_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, CompatFormatter);
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    // The formatter only ever writes ASCII.
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

/// `serde_json` formatter behind [`to_compat_json`].
struct CompatFormatter;

impl serde_json::ser::Formatter for CompatFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

/// Flattens caller-supplied data into a [`Payload`]. Never fails.
#[must_use]
pub fn normalize(extra: Option<Extra>) -> Option<Payload> {
    let payload = match extra? {
        Extra::Fields(Fields(map)) => Payload::Fields(
            map.into_iter()
                .filter_map(|(k, v)| v.render().map(|v| (k, v)))
                .collect(),
        ),
        Extra::Scalar(text) | Extra::Error(text) => Payload::Text(text),
    };
    Some(payload)
}

/// Detects the escalation sentinel and returns a cleaned payload.
///
/// A `name` or `title` field equal to [`ESCALATION_SENTINEL`] reclassifies the
/// report as [`Severity::Error`]; the sentinel fields are removed. A payload
/// left empty is returned as `None`.
#[must_use]
pub fn classify(payload: Option<Payload>) -> (Option<Severity>, Option<Payload>) {
    let Some(payload) = payload else {
        return (None, None);
    };

    let (escalation, payload) = match payload {
        Payload::Fields(mut fields) => {
            let before = fields.len();
            fields.retain(|k, v| {
                !(ESCALATION_KEYS.contains(&k.as_str()) && v.as_str() == ESCALATION_SENTINEL)
            });
            let escalation = (fields.len() != before).then_some(Severity::Error);
            (escalation, Payload::Fields(fields))
        }
        text @ Payload::Text(_) => (None, text),
    };

    let payload = (!payload.is_empty()).then_some(payload);
    (escalation, payload)
}
