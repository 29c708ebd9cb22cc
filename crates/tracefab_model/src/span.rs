//! Span vocabulary shared by the engine, exporters and observers.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// The kind of span (client, server, internal, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// An internal operation within an application.
    #[default]
    Internal,
    /// Handling a synchronous request from a client.
    Server,
    /// Making a synchronous request to a server.
    Client,
    /// Initiating an asynchronous request.
    Producer,
    /// Handling an asynchronous request.
    Consumer,
}

/// Status code indicating span success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Status not set.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation resulted in an error.
    Error,
}

impl StatusCode {
    /// Returns true if this status represents an error.
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// Status of a span operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanStatus {
    /// The status code.
    pub code: StatusCode,
    /// Optional status message (typically for errors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SpanStatus {
    /// Creates an error status with a message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }

    /// Creates an OK status.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    /// Returns true if this status represents an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code.is_error()
    }
}

/// A value that can be stored as a span attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A boolean value.
    Bool(bool),
    /// A 64-bit integer value.
    Int(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// An array of string values.
    StringArray(Vec<String>),
}

impl AttributeValue {
    /// Converts this value to a string representation.
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::StringArray(arr) => arr.join(","),
        }
    }

    /// Returns the value as a string reference if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a bool if it is a bool.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// A single key/value attribute. Order-preserving lists of these are used
/// instead of a map so emission order is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: AttributeValue,
}

impl KeyValue {
    /// Creates a new key/value pair.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A fully-formed span as handed to exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Trace identifier shared by every span of one trace (32 hex chars).
    pub trace_id: String,
    /// Span identifier (16 hex chars).
    pub span_id: String,
    /// Parent span ID, if this span has a parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// The service name that generated this span.
    pub service: String,
    /// The operation name.
    pub name: String,
    /// The kind of span.
    #[serde(default)]
    pub kind: SpanKind,
    /// Start time in nanoseconds since the Unix epoch.
    pub start_time_ns: u64,
    /// End time in nanoseconds since the Unix epoch.
    pub end_time_ns: u64,
    /// The span status.
    #[serde(default)]
    pub status: SpanStatus,
    /// Span attributes, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<KeyValue>,
}

impl Span {
    /// The span duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_nanos(self.end_time_ns.saturating_sub(self.start_time_ns))
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Returns true if this span represents an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Gets an attribute value by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|kv| kv.key == key).map(|kv| &kv.value)
    }
}

/// Per-span summary delivered synchronously to observers after a span ends.
///
/// The attribute list is a copy owned by the observer call, so downstream
/// mutation cannot reach engine state.
#[derive(Debug, Clone)]
pub struct SpanInfo {
    /// Service that emitted the span.
    pub service: String,
    /// Operation name.
    pub operation: String,
    /// Wall-clock end timestamp (offset-adjusted like the span itself).
    pub timestamp: SystemTime,
    /// Span duration.
    pub duration: Duration,
    /// Whether the span ended in error.
    pub is_error: bool,
    /// Span kind.
    pub kind: SpanKind,
    /// Copied attribute list.
    pub attributes: Vec<KeyValue>,
    /// Names of the scenarios active when the span was produced.
    pub scenarios: Vec<String>,
}
