//! Identity keys used to match children across rebuilds.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::collections::key_hash;

/// Explicit identity attached to a widget or VNode.
///
/// Two children with equal keys are treated as the same logical child even
/// when their position in the parent changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl Key {
    /// Derive a key by hashing an arbitrary value.
    pub fn hashed<T: Hash + ?Sized>(value: &T) -> Self {
        Key::Int(key_hash(value) as i64)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(value) => write!(f, "#{value}"),
            Key::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value as i64)
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(value as i64)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

/// Key derived from a source location, for call sites that want a stable
/// identity without naming one.
pub fn location_key(file: &str, line: u32, column: u32) -> Key {
    Key::hashed(&(file, line, column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_preserve_identity() {
        assert_eq!(Key::from(3usize), Key::from(3i64));
        assert_eq!(Key::from("row"), Key::from(String::from("row")));
        assert_ne!(Key::from("1"), Key::from(1));
    }

    #[test]
    fn hashed_keys_are_stable() {
        assert_eq!(Key::hashed("item"), Key::hashed("item"));
        assert_eq!(location_key("a.rs", 1, 2), location_key("a.rs", 1, 2));
        assert_ne!(location_key("a.rs", 1, 2), location_key("a.rs", 1, 3));
    }
}
