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

//! # Per-key locking
//!
//! A command needs atomicity across the one or more keys it touches, but the shard locks in
//! [`super::shard`] are too coarse: two unrelated keys can land in the same shard, and a command
//! that locks a whole shard to serialize one key would block every other key hashing there too.
//!
//! [`KeyLocks`] is a separate array of `M = 2 * N` `RwLock<()>` slots (`N` the shard count),
//! indexed by the same hash as the shard map. A handler acquires the slots for every key it's
//! about to touch *before* mutating anything. The only deadlock-avoidance rule in this module:
//! when a command needs more than one key, it must sort and dedup the key list before acquiring
//! locks, so that two concurrent commands over overlapping key sets always acquire shared slots
//! in the same order.

use super::hash::hash;
use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;

thread_local! {
    /// Set by [`super::Corestore::check_ttl`], consumed by the public lock-acquisition methods
    /// below. Debug-only tripwire for the "CheckTTL before your own key-lock" calling convention
    /// documented on `check_ttl`; `check_ttl`'s own internal cleanup lock goes through
    /// [`KeyLocks::raw_write`] instead, so it doesn't consume the flag it just set.
    static TTL_CHECKED: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn mark_ttl_checked() {
    TTL_CHECKED.with(|c| c.set(true));
}

fn assert_ttl_was_checked() {
    debug_assert!(
        TTL_CHECKED.with(|c| c.replace(false)),
        "key-lock acquired without a preceding Corestore::check_ttl call on this thread"
    );
}

pub struct KeyLocks {
    slots: Vec<RwLock<()>>,
}

impl KeyLocks {
    /// Build a key-lock array sized `2 * shard_count`.
    pub fn new(shard_count: usize) -> Self {
        let m = (shard_count.max(1)) * 2;
        let mut slots = Vec::with_capacity(m);
        for _ in 0..m {
            slots.push(RwLock::new(()));
        }
        Self { slots }
    }

    fn slot_for(&self, key: &[u8]) -> usize {
        (hash(key) as usize) % self.slots.len()
    }

    /// Acquire one key's slot for reading.
    pub fn read_one(&self, key: &[u8]) -> RwLockReadGuard<'_, ()> {
        assert_ttl_was_checked();
        self.slots[self.slot_for(key)].read()
    }

    /// Acquire one key's slot for writing.
    pub fn write_one(&self, key: &[u8]) -> RwLockWriteGuard<'_, ()> {
        assert_ttl_was_checked();
        self.slots[self.slot_for(key)].write()
    }

    /// Used only by `Corestore::check_ttl` for its own cleanup-on-expiry write lock. Bypasses the
    /// `TTL_CHECKED` tripwire since this *is* the TTL check, not a caller downstream of one.
    pub(crate) fn raw_write(&self, key: &[u8]) -> RwLockWriteGuard<'_, ()> {
        self.slots[self.slot_for(key)].write()
    }

    /// Acquire write locks for every key in `keys`, after sorting and deduping the *slot indices*
    /// so that two calls racing over overlapping key sets always take shared slots in the same
    /// order. This is the sole rule that keeps multi-key commands deadlock-free: callers must
    /// never acquire key locks any other way.
    pub fn write_many(&self, keys: &[Bytes]) -> Vec<RwLockWriteGuard<'_, ()>> {
        assert_ttl_was_checked();
        let mut indices: Vec<usize> = keys.iter().map(|k| self.slot_for(k)).collect();
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|i| self.slots[i].write()).collect()
    }

    /// As [`Self::write_many`], but with read locks. Used by commands that touch several keys
    /// read-only, e.g. `MGET`.
    pub fn read_many(&self, keys: &[Bytes]) -> Vec<RwLockReadGuard<'_, ()>> {
        assert_ttl_was_checked();
        let mut indices: Vec<usize> = keys.iter().map(|k| self.slot_for(k)).collect();
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|i| self.slots[i].read()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_slot() {
        let locks = KeyLocks::new(16);
        assert_eq!(locks.slot_for(b"a"), locks.slot_for(b"a"));
    }

    #[test]
    fn write_many_dedups_shared_slots() {
        let locks = KeyLocks::new(16);
        let keys = vec![Bytes::from("dup"), Bytes::from("dup")];
        mark_ttl_checked();
        let guards = locks.write_many(&keys);
        assert_eq!(guards.len(), 1);
    }

    #[test]
    fn write_many_covers_distinct_keys() {
        let locks = KeyLocks::new(16);
        let keys = vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")];
        mark_ttl_checked();
        let guards = locks.write_many(&keys);
        assert!(!guards.is_empty());
        assert!(guards.len() <= keys.len());
    }

    #[test]
    fn slot_count_is_double_shard_count() {
        let locks = KeyLocks::new(16);
        assert_eq!(locks.slots.len(), 32);
    }
}
