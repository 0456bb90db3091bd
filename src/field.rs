//! Tri-state field values
//!
//! YAML collapses `key:`, `key: null` and a missing key into the same
//! `Null`/`None`. Frontmatter rules need all three apart, so every
//! declaration carries a [`Presence`].

use serde_yaml::Value;

/// How a key appeared in the frontmatter
#[derive(Debug, Clone, PartialEq)]
pub enum Presence<V> {
    /// Key not written at all
    Absent,
    /// Key written bare (`edit:`), no value
    Marker,
    /// Key written with a value. An explicit `null`/`~` is `Value(Null)`.
    Value(V),
}

impl<V> Presence<V> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Presence::Absent)
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Presence::Marker)
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Presence::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Presence<&V> {
        match self {
            Presence::Absent => Presence::Absent,
            Presence::Marker => Presence::Marker,
            Presence::Value(v) => Presence::Value(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Presence<U> {
        match self {
            Presence::Absent => Presence::Absent,
            Presence::Marker => Presence::Marker,
            Presence::Value(v) => Presence::Value(f(v)),
        }
    }
}

impl<V> Default for Presence<V> {
    fn default() -> Self {
        Presence::Absent
    }
}

impl Presence<Value> {
    /// Short description of the written shape, for messages
    pub fn describe(&self) -> &'static str {
        match self {
            Presence::Absent => "nothing",
            Presence::Marker => "a bare key",
            Presence::Value(v) => describe_value(v),
        }
    }

    /// The mapping under this key, if the key holds one
    pub fn as_mapping(&self) -> Option<&serde_yaml::Mapping> {
        self.value().and_then(Value::as_mapping)
    }
}

/// A top-level section whose container type is checked before its entries
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    Absent,
    Present(T),
    /// Container has the wrong YAML type (e.g. a sequence where a mapping
    /// is required). `found` describes what was written.
    Malformed { found: &'static str },
}

impl<T> Section<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Section::Present(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Section::Absent)
    }
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Absent
    }
}

/// Human-readable YAML type name
pub fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "an explicit null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_distinguishes_marker_from_null() {
        assert_eq!(Presence::<Value>::Marker.describe(), "a bare key");
        assert_eq!(Presence::Value(Value::Null).describe(), "an explicit null");
        assert_eq!(Presence::Value(Value::Bool(true)).describe(), "a boolean");
    }

    #[test]
    fn map_keeps_variant() {
        let p: Presence<i32> = Presence::Value(2);
        assert_eq!(p.map(|v| v * 2), Presence::Value(4));
        assert_eq!(Presence::<i32>::Marker.map(|v| v * 2), Presence::Marker);
        assert!(Presence::<i32>::Absent.map(|v| v * 2).is_absent());
    }

    #[test]
    fn section_default_is_absent() {
        let s: Section<Vec<String>> = Section::default();
        assert!(s.is_absent());
        assert!(s.present().is_none());
    }
}
