//! Typed, type-erased property values and their coercion rules.
//!
//! A property keeps whatever representation it was set with. Typed reads
//! convert on every access: a number stored as text is parsed each time it
//! is read, and a number read as a string is formatted each time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::properties::Properties;
use crate::time::Position;

/// Converts opaque data into a string for serialization.
pub type Serializer = fn(&(dyn Any + Send + Sync), usize) -> Option<String>;

/// Opaque data held by a property.
///
/// The payload is shared: cloning a `DataValue` bumps the reference count
/// and the payload's `Drop` runs once, when the last holder lets go.
#[derive(Clone)]
pub struct DataValue {
    payload: Arc<dyn Any + Send + Sync>,
    length: usize,
    serializer: Option<Serializer>,
}

impl DataValue {
    pub fn new<T: Any + Send + Sync>(value: T, length: usize) -> Self {
        Self::from_arc(Arc::new(value), length)
    }

    pub fn from_arc<T: Any + Send + Sync>(payload: Arc<T>, length: usize) -> Self {
        Self {
            payload,
            length,
            serializer: None,
        }
    }

    /// Attach a serializer used by `get_string`, dumps and YAML export.
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Declared length in bytes (or elements); informational only.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Downcast to a shared handle on the payload.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Number of live handles on the payload.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.payload)
    }

    pub fn serialize(&self) -> Option<String> {
        self.serializer
            .and_then(|serialize| serialize(self.payload.as_ref(), self.length))
    }

    pub fn is_serializable(&self) -> bool {
        self.serializer.is_some()
    }
}

impl fmt::Debug for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataValue")
            .field("length", &self.length)
            .field("serializable", &self.serializer.is_some())
            .finish()
    }
}

/// A property value.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Int(i32),
    Int64(i64),
    Double(f64),
    Position(Position),
    Data(DataValue),
    Properties(Properties),
}

impl Value {
    /// String form of the value, if it has one.
    ///
    /// Opaque data only has a string form when a serializer was registered;
    /// nested properties never do.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(v) => Some(v.to_string()),
            Value::Int64(v) => Some(v.to_string()),
            Value::Double(v) => Some(format_double(*v)),
            Value::Position(v) => Some(v.to_string()),
            Value::Data(data) => data.serialize(),
            Value::Properties(_) => None,
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::String(s) => parse_int(s) as i32,
            Value::Int(v) => *v,
            Value::Int64(v) => *v as i32,
            Value::Double(v) => *v as i32,
            Value::Position(v) => *v as i32,
            Value::Data(_) | Value::Properties(_) => 0,
        }
    }

    pub fn as_int64(&self) -> i64 {
        match self {
            Value::String(s) => parse_int(s),
            Value::Int(v) => *v as i64,
            Value::Int64(v) => *v,
            Value::Double(v) => *v as i64,
            Value::Position(v) => *v,
            Value::Data(_) | Value::Properties(_) => 0,
        }
    }

    pub fn as_double(&self) -> f64 {
        match self {
            Value::String(s) => parse_double(s),
            Value::Int(v) => *v as f64,
            Value::Int64(v) => *v as f64,
            Value::Double(v) => *v,
            Value::Position(v) => *v as f64,
            Value::Data(_) | Value::Properties(_) => 0.0,
        }
    }

    pub fn as_position(&self) -> Position {
        match self {
            Value::Double(v) => *v as Position,
            other => other.as_int64(),
        }
    }

    pub fn as_data(&self) -> Option<&DataValue> {
        match self {
            Value::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_properties(&self) -> Option<&Properties> {
        match self {
            Value::Properties(props) => Some(props),
            _ => None,
        }
    }

    /// Whether the value survives a text dump.
    pub fn is_serializable(&self) -> bool {
        match self {
            Value::Data(data) => data.is_serializable(),
            Value::Properties(_) => false,
            _ => true,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Properties> for Value {
    fn from(value: Properties) -> Self {
        Value::Properties(value)
    }
}

/// Format a double with the shortest representation that reads back equal.
pub fn format_double(value: f64) -> String {
    if value.is_finite() && value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Parse the integer prefix of `text` the way `strtol` would.
///
/// Leading whitespace and a sign are accepted, a `0x` prefix switches to
/// hexadecimal, parsing stops at the first character that is not a digit.
/// Text with no digits reads as 0.
pub fn parse_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match rest.get(..2) {
        Some("0x") | Some("0X") => (16, &rest[2..]),
        _ => (10, rest),
    };
    let mut value: i64 = 0;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => value = value.wrapping_mul(radix as i64).wrapping_add(d as i64),
            None => break,
        }
    }
    if negative {
        value.wrapping_neg()
    } else {
        value
    }
}

/// Parse the floating point prefix of `text` the way `strtod` would.
///
/// A trailing `%` divides by 100. Hexadecimal integers are accepted so that
/// colour-like values read consistently through both accessors.
pub fn parse_double(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        return parse_int(trimmed) as f64;
    }
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let c = bytes[end];
        match c {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 => {}
            b'+' | b'-' if seen_exp && matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    // Back off a dangling exponent marker ("1e" or "1e-").
    while end > 0 && matches!(bytes[end - 1], b'e' | b'E' | b'+' | b'-') {
        end -= 1;
    }
    let value = trimmed[..end].parse::<f64>().unwrap_or(0.0);
    if trimmed[end..].starts_with('%') {
        value / 100.0
    } else {
        value
    }
}
