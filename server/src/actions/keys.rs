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

//! # Key-space commands
//!
//! `DEL`, `EXISTS`, `KEYS`, `EXPIRE`, `PERSIST`, `TTL`, `TYPE`, `RENAME`.

use super::{ensure_arity, parse_i64};
use crate::corestore::hash::glob_match;
use crate::corestore::value::ValueKind;
use crate::corestore::Corestore;
use crate::error::{ActionError, ActionResult};
use crate::resp::Frame;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

pub fn del(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty())?;
    let mut count = 0i64;
    for key in args {
        db.check_ttl(key);
        let _guard = db.locks.write_one(key);
        if db.map.delete(key).is_some() {
            db.ttl_map.delete(key);
            count += 1;
        }
    }
    Ok(Frame::Int(count))
}

pub fn exists(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty())?;
    let mut count = 0i64;
    for key in args {
        if !db.check_ttl(key) {
            continue;
        }
        let _guard = db.locks.read_one(key);
        if db.map.contains(key) {
            count += 1;
        }
    }
    Ok(Frame::Int(count))
}

pub fn keys(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let pattern = &args[0];
    let mut out = Vec::new();
    for key in db.map.keys() {
        if !db.check_ttl(&key) {
            continue;
        }
        if glob_match(pattern, &key) {
            out.push(Frame::bulk(key));
        }
    }
    Ok(Frame::array(out))
}

pub fn expire(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2 || args.len() == 3)?;
    let key = &args[0];
    let secs = parse_i64(&args[1])?;
    let opt = args
        .get(2)
        .map(|o| o.to_ascii_lowercase())
        .unwrap_or_default();
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.write_one(key);
    if !db.map.contains(key) {
        return Ok(Frame::Int(0));
    }
    let old_ttl = db.ttl_map.get(key);
    let condition_ok = match opt.as_slice() {
        b"" => true,
        b"nx" => old_ttl.is_none(),
        b"xx" => old_ttl.is_some(),
        b"gt" => old_ttl.map_or(false, |old| secs + now_unix() > old),
        b"lt" => old_ttl.map_or(true, |old| secs + now_unix() < old),
        _ => return Err(ActionError::SYNTAX_ERROR),
    };
    if !condition_ok {
        return Ok(Frame::Int(0));
    }
    let set = db.set_ttl(key, now_unix() + secs);
    Ok(Frame::Int(set))
}

pub fn persist(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.write_one(key);
    if !db.map.contains(key) {
        return Ok(Frame::Int(0));
    }
    Ok(Frame::Int(db.del_ttl(key)))
}

pub fn ttl(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    Ok(Frame::Int(db.ttl_secs(&args[0])))
}

pub fn type_of(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::simple("none"));
    }
    let _guard = db.locks.read_one(key);
    let name = match db.map.get(key).map(|v| v.kind()) {
        None => "none",
        Some(ValueKind::Str) => "string",
        Some(ValueKind::List) => "list",
        Some(ValueKind::Hash) => "hash",
        Some(ValueKind::Set) => "set",
    };
    Ok(Frame::simple(name))
}

pub fn rename(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let (src, dst) = (&args[0], &args[1]);
    db.check_ttl(src);
    db.check_ttl(dst);
    let _guards = db.locks.write_many(&[src.clone(), dst.clone()]);
    let value = match db.map.delete(src) {
        Some(v) => v,
        None => return Err(ActionError::KEY_NOT_EXIST),
    };
    db.ttl_map.delete(src);
    db.map.delete(dst);
    db.ttl_map.delete(dst);
    db.map.set(dst.clone(), value);
    Ok(Frame::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corestore::value::Value;

    fn db() -> Corestore {
        Corestore::new(4)
    }

    #[test]
    fn del_counts_only_existing() {
        let db = db();
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        let r = del(&db, &[Bytes::from("a"), Bytes::from("missing")]).unwrap();
        assert_eq!(r, Frame::Int(1));
        assert!(!db.map.contains(b"a"));
    }

    #[test]
    fn exists_counts_live_keys() {
        let db = db();
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        let r = exists(&db, &[Bytes::from("a"), Bytes::from("a"), Bytes::from("b")]).unwrap();
        assert_eq!(r, Frame::Int(2));
    }

    #[test]
    fn keys_filters_by_glob() {
        let db = db();
        db.map.set(Bytes::from("foo"), Value::Str(Bytes::from("1")));
        db.map.set(Bytes::from("bar"), Value::Str(Bytes::from("1")));
        let r = keys(&db, &[Bytes::from("f*")]).unwrap();
        assert_eq!(r, Frame::array(vec![Frame::bulk("foo")]));
    }

    #[test]
    fn rename_moves_value_without_ttl() {
        let db = db();
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        db.set_ttl(b"a", now_unix() + 1000);
        let r = rename(&db, &[Bytes::from("a"), Bytes::from("b")]).unwrap();
        assert_eq!(r, Frame::OK);
        assert!(!db.map.contains(b"a"));
        assert!(db.map.contains(b"b"));
        assert_eq!(db.ttl_secs(b"b"), -1);
    }

    #[test]
    fn rename_missing_source_errors() {
        let db = db();
        let r = rename(&db, &[Bytes::from("missing"), Bytes::from("b")]);
        assert_eq!(r, Err(ActionError::KEY_NOT_EXIST));
    }

    #[test]
    fn expire_respects_nx_xx() {
        let db = db();
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        let r = expire(&db, &[Bytes::from("a"), Bytes::from("100"), Bytes::from("xx")]).unwrap();
        assert_eq!(r, Frame::Int(0));
        let r = expire(&db, &[Bytes::from("a"), Bytes::from("100"), Bytes::from("nx")]).unwrap();
        assert_eq!(r, Frame::Int(1));
        let r = expire(&db, &[Bytes::from("a"), Bytes::from("100"), Bytes::from("nx")]).unwrap();
        assert_eq!(r, Frame::Int(0));
    }

    #[test]
    fn persist_removes_ttl() {
        let db = db();
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        db.set_ttl(b"a", now_unix() + 100);
        assert_eq!(persist(&db, &[Bytes::from("a")]).unwrap(), Frame::Int(1));
        assert_eq!(persist(&db, &[Bytes::from("a")]).unwrap(), Frame::Int(0));
    }

    #[test]
    fn type_of_reports_none_and_variants() {
        let db = db();
        assert_eq!(type_of(&db, &[Bytes::from("missing")]).unwrap(), Frame::simple("none"));
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        assert_eq!(type_of(&db, &[Bytes::from("a")]).unwrap(), Frame::simple("string"));
    }
}
