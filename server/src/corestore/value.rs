/*
 * This file is a part of spd
 *
 * spd is an in-memory key-value server speaking the Serialization Protocol (SP)
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
*/

//! # Stored value types
//!
//! A key's value is one of four shapes. Actions that expect one shape and find another get
//! [`WrongTypeError`] back rather than silently coercing.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// The value stored under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
}

/// The kind of a [`Value`], used in type-mismatch error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    List,
    Hash,
    Set,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::List(_) => ValueKind::List,
            Value::Hash(_) => ValueKind::Hash,
            Value::Set(_) => ValueKind::Set,
        }
    }

    pub fn as_str(&self) -> Result<&Bytes, WrongTypeError> {
        match self {
            Value::Str(b) => Ok(b),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    pub fn as_list(&self) -> Result<&VecDeque<Bytes>, WrongTypeError> {
        match self {
            Value::List(l) => Ok(l),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut VecDeque<Bytes>, WrongTypeError> {
        match self {
            Value::List(l) => Ok(l),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    pub fn as_hash(&self) -> Result<&HashMap<Bytes, Bytes>, WrongTypeError> {
        match self {
            Value::Hash(h) => Ok(h),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashMap<Bytes, Bytes>, WrongTypeError> {
        match self {
            Value::Hash(h) => Ok(h),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    pub fn as_set(&self) -> Result<&HashSet<Bytes>, WrongTypeError> {
        match self {
            Value::Set(s) => Ok(s),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut HashSet<Bytes>, WrongTypeError> {
        match self {
            Value::Set(s) => Ok(s),
            other => Err(WrongTypeError(other.kind())),
        }
    }

    /// Whether this value is a container (list/hash/set) that's now empty and should cause the
    /// key to be deleted.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
        }
    }
}

/// Raised when a command expects one [`Value`] variant and finds another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongTypeError(pub ValueKind);

impl WrongTypeError {
    pub const MESSAGE: &'static str =
        "WRONGTYPE Operation against a key holding the wrong kind of value";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_type_on_mismatch() {
        let v = Value::Str(Bytes::from("x"));
        assert!(v.as_list().is_err());
        assert!(v.as_str().is_ok());
    }

    #[test]
    fn empty_container_detection() {
        assert!(Value::List(VecDeque::new()).is_empty_container());
        assert!(!Value::Str(Bytes::from("x")).is_empty_container());
        let mut h = HashMap::new();
        h.insert(Bytes::from("a"), Bytes::from("b"));
        assert!(!Value::Hash(h).is_empty_container());
    }
}
