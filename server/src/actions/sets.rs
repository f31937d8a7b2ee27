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

//! # Set commands
//!
//! `SADD`, `SREM`, `SCARD`, `SISMEMBER`, `SMEMBERS`, `SMOVE`, `SPOP`, `SRANDMEMBER`, `SDIFF`,
//! `SDIFFSTORE`, `SINTER`, `SINTERSTORE`, `SUNION`, `SUNIONSTORE`.
//!
//! `*STORE` variants compute the result under read locks on the source keys, release those
//! locks, then take the destination's write lock and hold it across both the existing-value
//! check and the store. Releasing the destination lock between the check and the store would
//! open a window for a concurrent writer to slip in between them.

use super::{ensure_arity, parse_i64};
use crate::corestore::value::Value;
use crate::corestore::Corestore;
use crate::error::ActionResult;
use crate::resp::Frame;
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

fn cleanup_if_empty(db: &Corestore, key: &Bytes, value: Value) {
    if value.is_empty_container() {
        db.ttl_map.delete(key);
    } else {
        db.map.set(key.clone(), value);
    }
}

pub fn sadd(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_set()?;
    }
    let mut value = db.map.delete(key).unwrap_or_else(|| Value::Set(HashSet::new()));
    let added = {
        let set = value.as_set_mut().expect("type checked above");
        args[1..].iter().filter(|m| set.insert((*m).clone())).count() as i64
    };
    db.map.set(key.clone(), value);
    Ok(Frame::Int(added))
}

pub fn srem(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_set()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => return Ok(Frame::Int(0)),
    };
    let removed = {
        let set = value.as_set_mut().expect("type checked above");
        args[1..].iter().filter(|m| set.remove(*m)).count() as i64
    };
    cleanup_if_empty(db, key, value);
    Ok(Frame::Int(removed))
}

pub fn scard(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(v.as_set()?.len() as i64)),
    }
}

pub fn sismember(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(v.as_set()?.contains(&args[1]) as i64)),
    }
}

pub fn smembers(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::array(Vec::new()));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::array(Vec::new())),
        Some(v) => Ok(Frame::array(
            v.as_set()?.iter().cloned().map(Frame::bulk).collect(),
        )),
    }
}

pub fn smove(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let (src, dst, member) = (&args[0], &args[1], &args[2]);
    db.check_ttl(src);
    db.check_ttl(dst);
    let _guards = db.locks.write_many(&[src.clone(), dst.clone()]);
    // Validate both ends before mutating anything: once `member` leaves `src` it must not be
    // lost to a `dst` type error.
    if let Some(existing) = db.map.get(src) {
        existing.as_set()?;
    }
    if let Some(existing) = db.map.get(dst) {
        existing.as_set()?;
    }
    let mut src_value = match db.map.delete(src) {
        Some(v) => v,
        None => return Ok(Frame::Int(0)),
    };
    let moved = src_value.as_set_mut().expect("type checked above").remove(member);
    if !moved {
        db.map.set(src.clone(), src_value);
        return Ok(Frame::Int(0));
    }
    cleanup_if_empty(db, src, src_value);
    let mut dst_value = db.map.delete(dst).unwrap_or_else(|| Value::Set(HashSet::new()));
    dst_value.as_set_mut().expect("type checked above").insert(member.clone());
    db.map.set(dst.clone(), dst_value);
    Ok(Frame::Int(1))
}

pub fn spop(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1 || args.len() == 2)?;
    let key = &args[0];
    let count = match args.get(1) {
        Some(c) => Some(parse_i64(c)?.max(0) as usize),
        None => None,
    };
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_set()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => {
            return Ok(match count {
                Some(_) => Frame::array(Vec::new()),
                None => Frame::null_bulk(),
            })
        }
    };
    let mut rng = rand::thread_rng();
    let result = {
        let set = value.as_set_mut().expect("type checked above");
        match count {
            None => {
                let chosen = set.iter().next().cloned();
                if let Some(m) = &chosen {
                    set.remove(m);
                }
                chosen.map(Frame::bulk).unwrap_or_else(Frame::null_bulk)
            }
            Some(n) => {
                let mut members: Vec<Bytes> = set.iter().cloned().collect();
                members.shuffle(&mut rng);
                members.truncate(n);
                for m in &members {
                    set.remove(m);
                }
                Frame::array(members.into_iter().map(Frame::bulk).collect())
            }
        }
    };
    cleanup_if_empty(db, key, value);
    Ok(result)
}

pub fn srandmember(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1 || args.len() == 2)?;
    let key = &args[0];
    let count = match args.get(1) {
        Some(c) => Some(parse_i64(c)?),
        None => None,
    };
    if !db.check_ttl(key) {
        return Ok(match count {
            Some(_) => Frame::array(Vec::new()),
            None => Frame::null_bulk(),
        });
    }
    let _guard = db.locks.read_one(key);
    let value = db.map.get(key);
    let set = match &value {
        None => {
            return Ok(match count {
                Some(_) => Frame::array(Vec::new()),
                None => Frame::null_bulk(),
            })
        }
        Some(v) => v.as_set()?,
    };
    let members: Vec<&Bytes> = set.iter().collect();
    if members.is_empty() {
        return Ok(match count {
            Some(_) => Frame::array(Vec::new()),
            None => Frame::null_bulk(),
        });
    }
    let mut rng = rand::thread_rng();
    match count {
        None => Ok(Frame::bulk(members[rng.gen_range(0..members.len())].clone())),
        Some(n) if n >= 0 => {
            let n = (n as usize).min(members.len());
            let mut chosen = members;
            chosen.shuffle(&mut rng);
            chosen.truncate(n);
            Ok(Frame::array(chosen.into_iter().cloned().map(Frame::bulk).collect()))
        }
        Some(n) => {
            let n = (-n) as usize;
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.push(Frame::bulk(members[rng.gen_range(0..members.len())].clone()));
            }
            Ok(Frame::array(out))
        }
    }
}

fn load_set(db: &Corestore, key: &Bytes) -> ActionResult<HashSet<Bytes>> {
    db.check_ttl(key);
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(HashSet::new()),
        Some(v) => Ok(v.as_set()?.clone()),
    }
}

pub fn sdiff(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty())?;
    let result = compute_sdiff(db, args)?;
    Ok(Frame::array(result.into_iter().map(Frame::bulk).collect()))
}

fn compute_sdiff(db: &Corestore, keys: &[Bytes]) -> ActionResult<HashSet<Bytes>> {
    let mut result = load_set(db, &keys[0])?;
    for key in &keys[1..] {
        let other = load_set(db, key)?;
        result.retain(|m| !other.contains(m));
    }
    Ok(result)
}

pub fn sdiffstore(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let (dst, srcs) = (&args[0], &args[1..]);
    let result = compute_sdiff(db, srcs)?;
    store_result(db, dst, result)
}

pub fn sinter(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty())?;
    let result = compute_sinter(db, args)?;
    Ok(Frame::array(result.into_iter().map(Frame::bulk).collect()))
}

/// Loads every source set, then intersects starting from the smallest one so each comparison
/// scans as little as possible.
fn compute_sinter(db: &Corestore, keys: &[Bytes]) -> ActionResult<HashSet<Bytes>> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(load_set(db, key)?);
    }
    sets.sort_by_key(|s| s.len());
    let mut iter = sets.into_iter();
    let mut result = match iter.next() {
        Some(s) => s,
        None => return Ok(HashSet::new()),
    };
    for other in iter {
        if result.is_empty() {
            break;
        }
        result.retain(|m| other.contains(m));
    }
    Ok(result)
}

pub fn sinterstore(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let (dst, srcs) = (&args[0], &args[1..]);
    let result = compute_sinter(db, srcs)?;
    store_result(db, dst, result)
}

pub fn sunion(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty())?;
    let result = compute_sunion(db, args)?;
    Ok(Frame::array(result.into_iter().map(Frame::bulk).collect()))
}

fn compute_sunion(db: &Corestore, keys: &[Bytes]) -> ActionResult<HashSet<Bytes>> {
    let mut result = HashSet::new();
    for key in keys {
        result.extend(load_set(db, key)?);
    }
    Ok(result)
}

pub fn sunionstore(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let (dst, srcs) = (&args[0], &args[1..]);
    let result = compute_sunion(db, srcs)?;
    store_result(db, dst, result)
}

fn store_result(db: &Corestore, dst: &Bytes, result: HashSet<Bytes>) -> ActionResult<Frame> {
    db.check_ttl(dst);
    let _guard = db.locks.write_one(dst);
    if let Some(existing) = db.map.get(dst) {
        existing.as_set()?;
    }
    let len = result.len() as i64;
    db.map.delete(dst);
    db.ttl_map.delete(dst);
    if !result.is_empty() {
        db.map.set(dst.clone(), Value::Set(result));
    }
    Ok(Frame::Int(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Corestore {
        Corestore::new(4)
    }

    fn set_of(members: &[&str]) -> HashSet<Bytes> {
        members.iter().map(|m| Bytes::from(m.to_string())).collect()
    }

    #[test]
    fn sadd_dedups_and_scard_counts() {
        let db = db();
        assert_eq!(
            sadd(&db, &[Bytes::from("s"), Bytes::from("a"), Bytes::from("b"), Bytes::from("a")]).unwrap(),
            Frame::Int(2)
        );
        assert_eq!(scard(&db, &[Bytes::from("s")]).unwrap(), Frame::Int(2));
    }

    #[test]
    fn srem_cleans_up_empty_set() {
        let db = db();
        sadd(&db, &[Bytes::from("s"), Bytes::from("a")]).unwrap();
        assert_eq!(srem(&db, &[Bytes::from("s"), Bytes::from("a")]).unwrap(), Frame::Int(1));
        assert!(!db.map.contains(b"s"));
    }

    #[test]
    fn smove_moves_member_between_sets() {
        let db = db();
        sadd(&db, &[Bytes::from("src"), Bytes::from("a")]).unwrap();
        assert_eq!(
            smove(&db, &[Bytes::from("src"), Bytes::from("dst"), Bytes::from("a")]).unwrap(),
            Frame::Int(1)
        );
        assert!(!db.map.contains(b"src"));
        assert_eq!(sismember(&db, &[Bytes::from("dst"), Bytes::from("a")]).unwrap(), Frame::Int(1));
    }

    #[test]
    fn sinter_uses_smallest_set_and_is_correct() {
        let db = db();
        sadd(&db, &[Bytes::from("a"), Bytes::from("1"), Bytes::from("2"), Bytes::from("3")]).unwrap();
        sadd(&db, &[Bytes::from("b"), Bytes::from("2"), Bytes::from("3"), Bytes::from("4")]).unwrap();
        let result = compute_sinter(&db, &[Bytes::from("a"), Bytes::from("b")]).unwrap();
        assert_eq!(result, set_of(&["2", "3"]));
    }

    #[test]
    fn sunionstore_writes_destination() {
        let db = db();
        sadd(&db, &[Bytes::from("a"), Bytes::from("1")]).unwrap();
        sadd(&db, &[Bytes::from("b"), Bytes::from("2")]).unwrap();
        let r = sunionstore(&db, &[Bytes::from("dst"), Bytes::from("a"), Bytes::from("b")]).unwrap();
        assert_eq!(r, Frame::Int(2));
        assert_eq!(scard(&db, &[Bytes::from("dst")]).unwrap(), Frame::Int(2));
    }

    #[test]
    fn sdiffstore_empty_result_deletes_destination() {
        let db = db();
        sadd(&db, &[Bytes::from("dst"), Bytes::from("stale")]).unwrap();
        sadd(&db, &[Bytes::from("a"), Bytes::from("1")]).unwrap();
        sadd(&db, &[Bytes::from("b"), Bytes::from("1")]).unwrap();
        let r = sdiffstore(&db, &[Bytes::from("dst"), Bytes::from("a"), Bytes::from("b")]).unwrap();
        assert_eq!(r, Frame::Int(0));
        assert!(!db.map.contains(b"dst"));
    }

    #[test]
    fn spop_with_count_removes_and_returns_members() {
        let db = db();
        sadd(&db, &[Bytes::from("s"), Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]).unwrap();
        let r = spop(&db, &[Bytes::from("s"), Bytes::from("2")]).unwrap();
        match r {
            Frame::Array(Some(items)) => assert_eq!(items.len(), 2),
            _ => panic!("expected array"),
        }
        assert_eq!(scard(&db, &[Bytes::from("s")]).unwrap(), Frame::Int(1));
    }

    #[test]
    fn sadd_on_wrong_type_leaves_existing_value_untouched() {
        let db = db();
        db.map.set(Bytes::from("s"), Value::Str(Bytes::from("not a set")));
        assert_eq!(
            sadd(&db, &[Bytes::from("s"), Bytes::from("a")]).unwrap_err(),
            crate::error::ActionError::WRONGTYPE
        );
        assert_eq!(db.map.get(b"s"), Some(Value::Str(Bytes::from("not a set"))));
    }

    #[test]
    fn smove_wrong_destination_type_does_not_lose_member() {
        let db = db();
        sadd(&db, &[Bytes::from("src"), Bytes::from("a")]).unwrap();
        db.map.set(Bytes::from("dst"), Value::Str(Bytes::from("not a set")));
        let err = smove(&db, &[Bytes::from("src"), Bytes::from("dst"), Bytes::from("a")]).unwrap_err();
        assert_eq!(err, crate::error::ActionError::WRONGTYPE);
        assert_eq!(sismember(&db, &[Bytes::from("src"), Bytes::from("a")]).unwrap(), Frame::Int(1));
    }

    #[test]
    fn sunionstore_wrong_destination_type_is_rejected() {
        let db = db();
        sadd(&db, &[Bytes::from("a"), Bytes::from("1")]).unwrap();
        db.map.set(Bytes::from("dst"), Value::Str(Bytes::from("not a set")));
        let err = sunionstore(&db, &[Bytes::from("dst"), Bytes::from("a")]).unwrap_err();
        assert_eq!(err, crate::error::ActionError::WRONGTYPE);
        assert_eq!(db.map.get(b"dst"), Some(Value::Str(Bytes::from("not a set"))));
    }
}
