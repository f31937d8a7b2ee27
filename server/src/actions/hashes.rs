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

//! # Hash commands
//!
//! `HSET`, `HSETNX`, `HGET`, `HDEL`, `HEXISTS`, `HLEN`, `HKEYS`, `HVALS`, `HGETALL`, `HMGET`,
//! `HSTRLEN`, `HINCRBY`, `HINCRBYFLOAT`, `HRANDFIELD`.

use super::{ensure_arity, format_f64, parse_f64, parse_i64};
use crate::corestore::value::Value;
use crate::corestore::Corestore;
use crate::error::{ActionError, ActionResult};
use crate::resp::Frame;
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

fn cleanup_if_empty(db: &Corestore, key: &Bytes, value: Value) {
    if value.is_empty_container() {
        db.ttl_map.delete(key);
    } else {
        db.map.set(key.clone(), value);
    }
}

pub fn hset(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 3 && (args.len() - 1) % 2 == 0)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_hash()?;
    }
    let mut value = db.map.delete(key).unwrap_or_else(|| Value::Hash(HashMap::new()));
    {
        let hash = value.as_hash_mut().expect("type checked above");
        for pair in args[1..].chunks(2) {
            hash.insert(pair[0].clone(), pair[1].clone());
        }
    }
    db.map.set(key.clone(), value);
    Ok(Frame::OK)
}

pub fn hsetnx(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_hash()?;
    }
    let mut value = db.map.delete(key).unwrap_or_else(|| Value::Hash(HashMap::new()));
    let set = {
        let hash = value.as_hash_mut().expect("type checked above");
        if hash.contains_key(&args[1]) {
            false
        } else {
            hash.insert(args[1].clone(), args[2].clone());
            true
        }
    };
    db.map.set(key.clone(), value);
    Ok(Frame::Int(set as i64))
}

pub fn hget(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::null_bulk());
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::null_bulk()),
        Some(v) => Ok(match v.as_hash()?.get(&args[1]) {
            Some(val) => Frame::bulk(val.clone()),
            None => Frame::null_bulk(),
        }),
    }
}

pub fn hdel(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_hash()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => return Ok(Frame::Int(0)),
    };
    let removed = {
        let hash = value.as_hash_mut().expect("type checked above");
        args[1..].iter().filter(|f| hash.remove(*f).is_some()).count() as i64
    };
    cleanup_if_empty(db, key, value);
    Ok(Frame::Int(removed))
}

pub fn hexists(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(v.as_hash()?.contains_key(&args[1]) as i64)),
    }
}

pub fn hlen(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(v.as_hash()?.len() as i64)),
    }
}

pub fn hkeys(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::array(Vec::new()));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::array(Vec::new())),
        Some(v) => Ok(Frame::array(
            v.as_hash()?.keys().cloned().map(Frame::bulk).collect(),
        )),
    }
}

pub fn hvals(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::array(Vec::new()));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::array(Vec::new())),
        Some(v) => Ok(Frame::array(
            v.as_hash()?.values().cloned().map(Frame::bulk).collect(),
        )),
    }
}

pub fn hgetall(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::array(Vec::new()));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::array(Vec::new())),
        Some(v) => {
            let mut out = Vec::new();
            for (f, val) in v.as_hash()? {
                out.push(Frame::bulk(f.clone()));
                out.push(Frame::bulk(val.clone()));
            }
            Ok(Frame::array(out))
        }
    }
}

pub fn hmget(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::array(args[1..].iter().map(|_| Frame::null_bulk()).collect()));
    }
    let _guard = db.locks.read_one(key);
    let value = db.map.get(key);
    let hash = match &value {
        None => return Ok(Frame::array(args[1..].iter().map(|_| Frame::null_bulk()).collect())),
        Some(v) => v.as_hash()?,
    };
    Ok(Frame::array(
        args[1..]
            .iter()
            .map(|f| match hash.get(f) {
                Some(v) => Frame::bulk(v.clone()),
                None => Frame::null_bulk(),
            })
            .collect(),
    ))
}

pub fn hstrlen(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(
            v.as_hash()?.get(&args[1]).map_or(0, |b| b.len() as i64),
        )),
    }
}

pub fn hincrby(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let delta = parse_i64(&args[2])?;
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_hash()?;
    }
    let mut value = db.map.delete(key).unwrap_or_else(|| Value::Hash(HashMap::new()));
    // Bind the outcome instead of using `?` directly: a non-numeric existing field must not
    // destroy the hash, so the value is always reinserted before the error (if any) propagates.
    let result: ActionResult<i64> = {
        let hash = value.as_hash_mut().expect("type checked above");
        let current = match hash.get(&args[1]) {
            Some(b) => parse_i64(b),
            None => Ok(0),
        };
        current.and_then(|current| {
            let updated = current.checked_add(delta).ok_or(ActionError::NOT_AN_INTEGER)?;
            hash.insert(args[1].clone(), Bytes::from(updated.to_string()));
            Ok(updated)
        })
    };
    db.map.set(key.clone(), value);
    Ok(Frame::Int(result?))
}

pub fn hincrbyfloat(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let delta = parse_f64(&args[2])?;
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_hash()?;
    }
    let mut value = db.map.delete(key).unwrap_or_else(|| Value::Hash(HashMap::new()));
    let result: ActionResult<Bytes> = {
        let hash = value.as_hash_mut().expect("type checked above");
        let current = match hash.get(&args[1]) {
            Some(b) => parse_f64(b),
            None => Ok(0.0),
        };
        current.map(|current| {
            let formatted = format_f64(current + delta);
            hash.insert(args[1].clone(), formatted.clone());
            formatted
        })
    };
    db.map.set(key.clone(), value);
    Ok(Frame::bulk(result?))
}

pub fn hrandfield(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty() && args.len() <= 3)?;
    let key = &args[0];
    let count = match args.get(1) {
        Some(c) => Some(parse_i64(c)?),
        None => None,
    };
    let with_values = match args.get(2) {
        Some(o) if o.eq_ignore_ascii_case(b"withvalues") => true,
        Some(_) => return Err(ActionError::SYNTAX_ERROR),
        None => false,
    };
    if !db.check_ttl(key) {
        return Ok(match count {
            Some(_) => Frame::array(Vec::new()),
            None => Frame::null_bulk(),
        });
    }
    let _guard = db.locks.read_one(key);
    let value = db.map.get(key);
    let hash = match &value {
        None => {
            return Ok(match count {
                Some(_) => Frame::array(Vec::new()),
                None => Frame::null_bulk(),
            })
        }
        Some(v) => v.as_hash()?,
    };
    let fields: Vec<&Bytes> = hash.keys().collect();
    if fields.is_empty() {
        return Ok(match count {
            Some(_) => Frame::array(Vec::new()),
            None => Frame::null_bulk(),
        });
    }
    let mut rng = rand::thread_rng();
    match count {
        None => {
            let f = fields[rng.gen_range(0..fields.len())];
            Ok(Frame::bulk(f.clone()))
        }
        Some(n) if n >= 0 => {
            let n = (n as usize).min(fields.len());
            let mut chosen: Vec<&Bytes> = fields.clone();
            chosen.shuffle(&mut rng);
            chosen.truncate(n);
            let mut out = Vec::new();
            for f in chosen {
                out.push(Frame::bulk(f.clone()));
                if with_values {
                    out.push(Frame::bulk(hash[f].clone()));
                }
            }
            Ok(Frame::array(out))
        }
        Some(n) => {
            let n = (-n) as usize;
            let mut out = Vec::new();
            for _ in 0..n {
                let f = fields[rng.gen_range(0..fields.len())];
                out.push(Frame::bulk(f.clone()));
                if with_values {
                    out.push(Frame::bulk(hash[f].clone()));
                }
            }
            Ok(Frame::array(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Corestore {
        Corestore::new(4)
    }

    #[test]
    fn hset_and_hgetall() {
        let db = db();
        hset(&db, &[Bytes::from("h"), Bytes::from("f1"), Bytes::from("v1"), Bytes::from("f2"), Bytes::from("v2")]).unwrap();
        let r = hgetall(&db, &[Bytes::from("h")]).unwrap();
        match r {
            Frame::Array(Some(items)) => assert_eq!(items.len(), 4),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn hsetnx_only_sets_once() {
        let db = db();
        assert_eq!(hsetnx(&db, &[Bytes::from("h"), Bytes::from("f"), Bytes::from("v1")]).unwrap(), Frame::Int(1));
        assert_eq!(hsetnx(&db, &[Bytes::from("h"), Bytes::from("f"), Bytes::from("v2")]).unwrap(), Frame::Int(0));
        assert_eq!(hget(&db, &[Bytes::from("h"), Bytes::from("f")]).unwrap(), Frame::bulk("v1"));
    }

    #[test]
    fn hdel_cleans_up_empty_hash() {
        let db = db();
        hset(&db, &[Bytes::from("h"), Bytes::from("f"), Bytes::from("v")]).unwrap();
        assert_eq!(hdel(&db, &[Bytes::from("h"), Bytes::from("f")]).unwrap(), Frame::Int(1));
        assert!(!db.map.contains(b"h"));
    }

    #[test]
    fn hincrby_creates_field_at_zero() {
        let db = db();
        assert_eq!(hincrby(&db, &[Bytes::from("h"), Bytes::from("f"), Bytes::from("5")]).unwrap(), Frame::Int(5));
        assert_eq!(hincrby(&db, &[Bytes::from("h"), Bytes::from("f"), Bytes::from("3")]).unwrap(), Frame::Int(8));
    }

    #[test]
    fn hmget_mixes_present_and_missing() {
        let db = db();
        hset(&db, &[Bytes::from("h"), Bytes::from("a"), Bytes::from("1")]).unwrap();
        let r = hmget(&db, &[Bytes::from("h"), Bytes::from("a"), Bytes::from("b")]).unwrap();
        assert_eq!(r, Frame::array(vec![Frame::bulk("1"), Frame::null_bulk()]));
    }

    #[test]
    fn hrandfield_positive_count_is_distinct() {
        let db = db();
        hset(
            &db,
            &[Bytes::from("h"), Bytes::from("a"), Bytes::from("1"), Bytes::from("b"), Bytes::from("2")],
        )
        .unwrap();
        let r = hrandfield(&db, &[Bytes::from("h"), Bytes::from("2")]).unwrap();
        match r {
            Frame::Array(Some(items)) => assert_eq!(items.len(), 2),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn hset_on_wrong_type_leaves_existing_value_untouched() {
        let db = db();
        db.map.set(Bytes::from("h"), Value::Str(Bytes::from("not a hash")));
        assert_eq!(
            hset(&db, &[Bytes::from("h"), Bytes::from("f"), Bytes::from("v")]).unwrap_err(),
            ActionError::WRONGTYPE
        );
        assert_eq!(db.map.get(b"h"), Some(Value::Str(Bytes::from("not a hash"))));
    }

    #[test]
    fn hincrby_on_non_numeric_field_leaves_rest_of_hash_untouched() {
        let db = db();
        hset(
            &db,
            &[Bytes::from("h"), Bytes::from("n"), Bytes::from("nope"), Bytes::from("other"), Bytes::from("kept")],
        )
        .unwrap();
        assert_eq!(
            hincrby(&db, &[Bytes::from("h"), Bytes::from("n"), Bytes::from("1")]).unwrap_err(),
            ActionError::NOT_AN_INTEGER
        );
        assert_eq!(hget(&db, &[Bytes::from("h"), Bytes::from("n")]).unwrap(), Frame::bulk("nope"));
        assert_eq!(hget(&db, &[Bytes::from("h"), Bytes::from("other")]).unwrap(), Frame::bulk("kept"));
    }
}
