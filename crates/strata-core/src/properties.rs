//! Reference-counted, ordered property store.
//!
//! Every object in the framework (frames, services, profiles' observers,
//! the event registry itself) is built on a [`Properties`] store: an ordered
//! list of uniquely named, typed values.
//!
//! - Cloning a `Properties` handle shares the same store; the store is
//!   destroyed when the last handle is dropped, at which point every held
//!   opaque value is dropped exactly once.
//! - Names keep their insertion order for the life of the store. `clear`
//!   drops a value but keeps its slot, so indices handed out by
//!   [`Properties::name_at`] remain valid.
//! - Typed getters coerce between representations on every read; a missing
//!   name reads as the empty value (`0`, `0.0`, `None`).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Result, StrataError};
use crate::events::{Events, EVENTS_PROPERTY, PROPERTY_CHANGED};
use crate::time::{self, Position};
use crate::value::{DataValue, Value};

#[derive(Default)]
struct PropertyList {
    names: Vec<String>,
    values: Vec<Option<Value>>,
    index: HashMap<String, usize>,
}

impl PropertyList {
    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Empty the slot of `name`, returning what it held.
    fn take(&mut self, name: &str) -> Option<Value> {
        let i = self.position(name)?;
        self.values[i].take()
    }

    /// Bind `value` to `name`, returning the value it displaced.
    fn bind(&mut self, name: &str, value: Option<Value>) -> Option<Value> {
        match self.position(name) {
            Some(i) => std::mem::replace(&mut self.values[i], value),
            None => {
                self.index.insert(name.to_string(), self.names.len());
                self.names.push(name.to_string());
                self.values.push(value);
                None
            }
        }
    }
}

struct Inner {
    list: Mutex<PropertyList>,
    user_lock: Mutex<()>,
}

/// Shared handle on a property store.
#[derive(Clone)]
pub struct Properties {
    inner: Arc<Inner>,
}

impl Default for Properties {
    fn default() -> Self {
        Self::new()
    }
}

impl Properties {
    /// Create an empty store with a reference count of one.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                list: Mutex::new(PropertyList::default()),
                user_lock: Mutex::new(()),
            }),
        }
    }

    /// Number of live handles on this store.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles refer to the same store.
    pub fn ptr_eq(a: &Properties, b: &Properties) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Caller-side lock for multi-step mutations.
    ///
    /// Individual accessors are always consistent on their own; this lock
    /// only serializes callers that cooperate by taking it.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.user_lock.lock()
    }

    // ── Setters ────────────────────────────────────────────────

    /// Bind a value to `name`, replacing (and dropping) any previous value.
    pub fn set_value(&self, name: &str, value: Value) -> Result<()> {
        self.bind(name, Some(value))
    }

    fn bind(&self, name: &str, value: Option<Value>) -> Result<()> {
        if name.is_empty() {
            return Err(StrataError::InvalidName(name.to_string()));
        }
        // The old value is dropped before the name is rebound, outside the
        // lock so that its destructor may use this store.
        let previous = self.inner.list.lock().take(name);
        drop(previous);
        let displaced = self.inner.list.lock().bind(name, value);
        drop(displaced);
        if name != EVENTS_PROPERTY {
            self.fire(PROPERTY_CHANGED, &[Value::from(name)]);
        }
        Ok(())
    }

    /// Set a string value.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        self.set_value(name, Value::String(value.to_string()))
    }

    pub fn set_int(&self, name: &str, value: i32) -> Result<()> {
        self.set_value(name, Value::Int(value))
    }

    pub fn set_int64(&self, name: &str, value: i64) -> Result<()> {
        self.set_value(name, Value::Int64(value))
    }

    pub fn set_double(&self, name: &str, value: f64) -> Result<()> {
        self.set_value(name, Value::Double(value))
    }

    pub fn set_position(&self, name: &str, value: Position) -> Result<()> {
        self.set_value(name, Value::Position(value))
    }

    /// Store a position as a `hh:mm:ss:ff` timecode string.
    pub fn set_time(&self, name: &str, value: Position, fps: f64) -> Result<()> {
        self.set(name, &time::to_timecode(value, fps))
    }

    /// Store opaque data; ownership moves into the store.
    ///
    /// The value's `Drop` runs exactly once: when the name is rebound or
    /// cleared, or when the store is destroyed, whichever comes first (and
    /// only if no reader still holds the handle returned by `get_data`).
    pub fn set_data<T: Any + Send + Sync>(&self, name: &str, value: T, length: usize) -> Result<()> {
        self.set_value(name, Value::Data(DataValue::new(value, length)))
    }

    /// Store opaque data already shared with other owners.
    pub fn set_shared_data<T: Any + Send + Sync>(
        &self,
        name: &str,
        value: Arc<T>,
        length: usize,
    ) -> Result<()> {
        self.set_value(name, Value::Data(DataValue::from_arc(value, length)))
    }

    pub fn set_data_value(&self, name: &str, value: DataValue) -> Result<()> {
        self.set_value(name, Value::Data(value))
    }

    /// Nest another store under `name`.
    pub fn set_properties(&self, name: &str, value: &Properties) -> Result<()> {
        self.set_value(name, Value::Properties(value.clone()))
    }

    /// Drop the value bound to `name`, keeping the name's slot.
    pub fn clear(&self, name: &str) -> Result<()> {
        if !self.exists(name) {
            return Ok(());
        }
        self.bind(name, None)
    }

    /// Rename a property in place. Fails if `new_name` is already bound.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        if new_name.is_empty() {
            return Err(StrataError::InvalidName(new_name.to_string()));
        }
        let mut list = self.inner.list.lock();
        if list.index.contains_key(new_name) {
            return Err(StrataError::InvalidName(format!(
                "{} already exists",
                new_name
            )));
        }
        let i = list
            .index
            .remove(old_name)
            .ok_or_else(|| StrataError::InvalidName(format!("{} does not exist", old_name)))?;
        list.names[i] = new_name.to_string();
        list.index.insert(new_name.to_string(), i);
        Ok(())
    }

    // ── Getters ────────────────────────────────────────────────

    /// Raw value bound to `name`.
    pub fn get_value(&self, name: &str) -> Option<Value> {
        let list = self.inner.list.lock();
        list.position(name).and_then(|i| list.values[i].clone())
    }

    /// Whether `name` currently holds a value.
    pub fn exists(&self, name: &str) -> bool {
        let list = self.inner.list.lock();
        list.position(name)
            .map(|i| list.values[i].is_some())
            .unwrap_or(false)
    }

    /// String form of the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.get_value(name).and_then(|v| v.as_string())
    }

    pub fn get_int(&self, name: &str) -> i32 {
        self.get_value(name).map(|v| v.as_int()).unwrap_or(0)
    }

    pub fn get_int64(&self, name: &str) -> i64 {
        self.get_value(name).map(|v| v.as_int64()).unwrap_or(0)
    }

    pub fn get_double(&self, name: &str) -> f64 {
        self.get_value(name).map(|v| v.as_double()).unwrap_or(0.0)
    }

    pub fn get_position(&self, name: &str) -> Position {
        self.get_value(name).map(|v| v.as_position()).unwrap_or(0)
    }

    /// Read a position that may be stored as a timecode or clock string.
    pub fn get_time(&self, name: &str, fps: f64) -> Position {
        match self.get_value(name) {
            Some(Value::String(s)) => time::parse_time(&s, fps)
                .unwrap_or_else(|| crate::value::parse_int(&s)),
            Some(other) => other.as_position(),
            None => 0,
        }
    }

    /// Typed handle on opaque data bound to `name`.
    pub fn get_data<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get_data_value(name).and_then(|d| d.downcast::<T>())
    }

    pub fn get_data_value(&self, name: &str) -> Option<DataValue> {
        match self.get_value(name) {
            Some(Value::Data(data)) => Some(data),
            _ => None,
        }
    }

    /// Nested store bound to `name`.
    pub fn get_properties(&self, name: &str) -> Option<Properties> {
        match self.get_value(name) {
            Some(Value::Properties(props)) => Some(props),
            _ => None,
        }
    }

    // ── Indexed access ─────────────────────────────────────────

    /// Number of names in the store (including cleared ones).
    pub fn count(&self) -> usize {
        self.inner.list.lock().names.len()
    }

    pub fn name_at(&self, index: usize) -> Option<String> {
        self.inner.list.lock().names.get(index).cloned()
    }

    pub fn value_at(&self, index: usize) -> Option<Value> {
        self.inner.list.lock().values.get(index).cloned().flatten()
    }

    /// String form of the value at `index`.
    pub fn get_at(&self, index: usize) -> Option<String> {
        self.value_at(index).and_then(|v| v.as_string())
    }

    pub fn get_data_at<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        match self.value_at(index) {
            Some(Value::Data(data)) => data.downcast::<T>(),
            _ => None,
        }
    }

    /// Index of `name`, if bound.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.list.lock().position(name)
    }

    /// Snapshot of every bound (name, value) pair in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let list = self.inner.list.lock();
        list.names
            .iter()
            .zip(list.values.iter())
            .filter_map(|(n, v)| v.as_ref().map(|v| (n.clone(), v.clone())))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.list.lock().names.clone()
    }

    // ── Bulk operations ────────────────────────────────────────

    /// Copy every binding of `src` into this store, overwriting collisions.
    ///
    /// Opaque data is shared with `src`, not duplicated. Private names
    /// (leading `_`) are copied as well.
    pub fn inherit(&self, src: &Properties) -> Result<()> {
        for (name, value) in src.entries() {
            self.set_value(&name, value)?;
        }
        Ok(())
    }

    /// Copy bindings whose name starts with `prefix`, stripping the prefix.
    pub fn pass(&self, src: &Properties, prefix: &str) -> Result<()> {
        for (name, value) in src.entries() {
            if let Some(stripped) = name.strip_prefix(prefix) {
                if !stripped.is_empty() {
                    self.set_value(stripped, value)?;
                }
            }
        }
        Ok(())
    }

    /// Copy the bindings named in a comma or space separated list.
    pub fn pass_list(&self, src: &Properties, list: &str) -> Result<()> {
        for name in list
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|n| !n.is_empty())
        {
            if let Some(value) = src.get_value(name) {
                self.set_value(name, value)?;
            }
        }
        Ok(())
    }

    /// Apply a `name=value` assignment. Double quotes around the value are
    /// stripped; an assignment without `=` binds the empty string.
    pub fn parse(&self, assignment: &str) -> Result<()> {
        let (name, value) = match assignment.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (assignment.trim(), ""),
        };
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        self.set(name, value)
    }

    /// Apply one assignment per line; blank lines and `#` comments are skipped.
    pub fn load_text(&self, text: &str) -> Result<()> {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.parse(line)?;
        }
        Ok(())
    }

    /// Build a store from `name=value` lines.
    pub fn from_text(text: &str) -> Result<Self> {
        let props = Self::new();
        props.load_text(text)?;
        Ok(props)
    }

    /// Build a store from a `name=value` file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    // ── Events ─────────────────────────────────────────────────

    /// The event registry of this store, if one was created.
    pub fn events(&self) -> Option<Arc<Events>> {
        self.get_data::<Events>(EVENTS_PROPERTY)
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Properties")
            .field("names", &self.names())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Access to the property store an object is built on.
pub trait AsProperties {
    fn properties(&self) -> &Properties;
}

impl AsProperties for Properties {
    fn properties(&self) -> &Properties {
        self
    }
}
