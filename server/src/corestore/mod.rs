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

//! # Corestore
//!
//! `Corestore` is the database façade: the sharded value map, the sharded TTL map, and the
//! key-lock array, plus the lazy-expiry check every handler must run before touching a key.
//!
//! One instance is built at startup and shared (via `Arc`) across every connection; there is no
//! per-connection state here, unlike the teacher's multi-keyspace `Corestore`, since this server
//! has exactly one flat keyspace.

pub mod hash;
pub mod keylock;
pub mod shard;
pub mod value;

use self::keylock::KeyLocks;
use self::shard::{TtlMap, ValueMap};
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Corestore {
    pub map: ValueMap,
    pub ttl_map: TtlMap,
    pub locks: KeyLocks,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

impl Corestore {
    pub fn new(shard_count: usize) -> Self {
        Self {
            map: ValueMap::new(shard_count),
            ttl_map: TtlMap::new(shard_count),
            locks: KeyLocks::new(shard_count),
        }
    }

    /// Lazy TTL check. Returns `true` if the key is live (no TTL, or TTL still in the future).
    /// Returns `false` and deletes both the value and the TTL entry if the TTL has passed.
    ///
    /// Must be called *before* the caller acquires its own key-lock: on expiry this takes the
    /// write lock for `key` internally, and a caller already holding it would deadlock.
    pub fn check_ttl(&self, key: &[u8]) -> bool {
        keylock::mark_ttl_checked();
        let expiry = match self.ttl_map.get(key) {
            Some(e) => e,
            None => return true,
        };
        if expiry > now_unix() {
            return true;
        }
        let _guard = self.locks.raw_write(key);
        self.map.delete(key);
        self.ttl_map.delete(key);
        false
    }

    /// Set an absolute expiry (unix seconds) on `key`. Returns `1` if `key` exists in the value
    /// map, `0` otherwise (in which case nothing is written).
    pub fn set_ttl(&self, key: &[u8], expiry: i64) -> i64 {
        if !self.map.contains(key) {
            return 0;
        }
        self.ttl_map.set(Bytes::copy_from_slice(key), expiry);
        1
    }

    /// Remove any TTL on `key`. Returns `1` if one was removed, `0` otherwise.
    pub fn del_ttl(&self, key: &[u8]) -> i64 {
        match self.ttl_map.delete(key) {
            Some(_) => 1,
            None => 0,
        }
    }

    /// Remaining TTL in seconds: `-2` if the key doesn't exist, `-1` if it has no TTL, else the
    /// number of seconds left (at least 0).
    pub fn ttl_secs(&self, key: &[u8]) -> i64 {
        if !self.check_ttl(key) || !self.map.contains(key) {
            return -2;
        }
        match self.ttl_map.get(key) {
            None => -1,
            Some(expiry) => (expiry - now_unix()).max(0),
        }
    }

    pub fn dbsize(&self) -> usize {
        self.map.len()
    }

    pub fn flushdb(&self) {
        self.map.clear();
        self.ttl_map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use self::value::Value;

    #[test]
    fn check_ttl_true_when_absent() {
        let db = Corestore::new(4);
        assert!(db.check_ttl(b"nope"));
    }

    #[test]
    fn check_ttl_expires_and_cleans_up() {
        let db = Corestore::new(4);
        db.map.set(Bytes::from("k"), Value::Str(Bytes::from("v")));
        db.set_ttl(b"k", now_unix() - 10);
        assert!(!db.check_ttl(b"k"));
        assert!(!db.map.contains(b"k"));
        assert!(!db.ttl_map.contains(b"k"));
    }

    #[test]
    fn check_ttl_future_stays_live() {
        let db = Corestore::new(4);
        db.map.set(Bytes::from("k"), Value::Str(Bytes::from("v")));
        db.set_ttl(b"k", now_unix() + 1000);
        assert!(db.check_ttl(b"k"));
        assert!(db.map.contains(b"k"));
    }

    #[test]
    fn set_ttl_requires_existing_key() {
        let db = Corestore::new(4);
        assert_eq!(db.set_ttl(b"missing", now_unix() + 10), 0);
        db.map.set(Bytes::from("k"), Value::Str(Bytes::from("v")));
        assert_eq!(db.set_ttl(b"k", now_unix() + 10), 1);
    }

    #[test]
    fn ttl_secs_reports_absent_and_no_ttl() {
        let db = Corestore::new(4);
        assert_eq!(db.ttl_secs(b"missing"), -2);
        db.map.set(Bytes::from("k"), Value::Str(Bytes::from("v")));
        assert_eq!(db.ttl_secs(b"k"), -1);
        db.set_ttl(b"k", now_unix() + 100);
        let left = db.ttl_secs(b"k");
        assert!((99..=100).contains(&left));
    }

    #[test]
    fn dbsize_and_flushdb() {
        let db = Corestore::new(4);
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        db.map.set(Bytes::from("b"), Value::Str(Bytes::from("2")));
        assert_eq!(db.dbsize(), 2);
        db.flushdb();
        assert_eq!(db.dbsize(), 0);
    }
}
