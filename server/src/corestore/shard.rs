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

//! # The sharded keyspace
//!
//! [`ShardedMap`] is a fixed number of independent `HashMap`s, each behind its own
//! `parking_lot::RwLock`, indexed by [`super::hash::hash`]. Splitting the keyspace this way means
//! two commands touching unrelated keys never contend on the same lock, while a command touching
//! one key only ever blocks commands touching keys that hash into the same shard.
//!
//! The same sharding scheme backs both the value map (`ShardedMap<Value>`) and the TTL map
//! (`ShardedMap<i64>`) -- they are independent instances that happen to share a key universe.

use super::hash::hash;
use super::value::Value;
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;

/// Default shard count when a config doesn't override it.
pub const DEFAULT_SHARD_COUNT: usize = 1024;

pub struct ShardedMap<V> {
    shards: Vec<RwLock<HashMap<Bytes, V>>>,
}

pub type ValueMap = ShardedMap<Value>;
/// key -> absolute expiry instant, unix seconds
pub type TtlMap = ShardedMap<i64>;

impl<V> ShardedMap<V> {
    /// Build a keyspace with `n` shards. `n` must be at least 1.
    pub fn new(n: usize) -> Self {
        let n = n.max(1);
        let mut shards = Vec::with_capacity(n);
        for _ in 0..n {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn index_for(&self, key: &[u8]) -> usize {
        (hash(key) as usize) % self.shards.len()
    }

    pub fn read_shard(&self, key: &[u8]) -> RwLockReadGuard<'_, HashMap<Bytes, V>> {
        self.shards[self.index_for(key)].read()
    }

    pub fn write_shard(&self, key: &[u8]) -> RwLockWriteGuard<'_, HashMap<Bytes, V>> {
        self.shards[self.index_for(key)].write()
    }

    pub fn get(&self, key: &[u8]) -> Option<V>
    where
        V: Clone,
    {
        self.read_shard(key).get(key).cloned()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.read_shard(key).contains_key(key)
    }

    /// Insert unconditionally, returning the previous value if any.
    pub fn set(&self, key: Bytes, value: V) -> Option<V> {
        self.write_shard(&key).insert(key, value)
    }

    /// Insert only if the key is already present. Returns whether it happened.
    pub fn set_if_exist(&self, key: &[u8], value: V) -> bool {
        let mut shard = self.write_shard(key);
        match shard.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Insert only if the key is absent. Returns whether it happened.
    pub fn set_if_not_exist(&self, key: Bytes, value: V) -> bool {
        let mut shard = self.write_shard(&key);
        if shard.contains_key(&key) {
            false
        } else {
            shard.insert(key, value);
            true
        }
    }

    /// Remove a key, returning its value if it was present.
    pub fn delete(&self, key: &[u8]) -> Option<V> {
        self.write_shard(key).remove(key)
    }

    /// Total number of keys across every shard.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap every shard's map for a fresh, empty one. Each shard is swapped under its own write
    /// lock, one at a time, rather than locking the whole keyspace at once.
    pub fn clear(&self) {
        for shard in &self.shards {
            *shard.write() = HashMap::new();
        }
    }

    /// Snapshot of all keys currently stored. Each shard is read-locked only for the duration of
    /// its own copy, so this never holds more than one shard lock at a time and isn't atomic
    /// across the whole keyspace.
    pub fn keys(&self) -> Vec<Bytes> {
        let mut out = Vec::new();
        for shard in &self.shards {
            out.extend(shard.read().keys().cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_always_same_shard() {
        let map: ShardedMap<Value> = ShardedMap::new(DEFAULT_SHARD_COUNT);
        let a = map.index_for(b"hello");
        let b = map.index_for(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn insert_and_read_back() {
        let map: ValueMap = ShardedMap::new(16);
        map.set(Bytes::from("k"), Value::Str(Bytes::from("v")));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(b"k"), Some(Value::Str(Bytes::from("v"))));
    }

    #[test]
    fn set_if_exist_and_not_exist() {
        let map: ValueMap = ShardedMap::new(16);
        assert!(!map.set_if_exist(b"k", Value::Str(Bytes::from("v"))));
        assert!(map.set_if_not_exist(Bytes::from("k"), Value::Str(Bytes::from("1"))));
        assert!(!map.set_if_not_exist(Bytes::from("k"), Value::Str(Bytes::from("2"))));
        assert!(map.set_if_exist(b"k", Value::Str(Bytes::from("3"))));
        assert_eq!(map.get(b"k"), Some(Value::Str(Bytes::from("3"))));
    }

    #[test]
    fn clear_empties_every_shard() {
        let map: ValueMap = ShardedMap::new(16);
        for i in 0..100 {
            let k = Bytes::from(format!("k{i}"));
            map.set(k.clone(), Value::Str(k));
        }
        assert_eq!(map.len(), 100);
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn single_shard_still_works() {
        let map: ValueMap = ShardedMap::new(1);
        map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        map.set(Bytes::from("b"), Value::Str(Bytes::from("2")));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn delete_decrements_count() {
        let map: ValueMap = ShardedMap::new(16);
        map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        assert_eq!(map.len(), 1);
        assert!(map.delete(b"a").is_some());
        assert_eq!(map.len(), 0);
    }
}
