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

//! # List commands
//!
//! `LLEN`, `LINDEX`, `LPOS`, `LPUSH`, `LPUSHX`, `RPUSH`, `RPUSHX`, `LPOP`, `RPOP`, `LSET`, `LREM`,
//! `LTRIM`, `LRANGE`, `LMOVE`.
//!
//! `LREM` with `count == 0`: the source this spec was distilled from remaps that to "remove all
//! but the last element", which is almost certainly a transcription bug (see the design notes).
//! This implementation uses the conventional meaning instead: `count == 0` removes every
//! matching element.

use super::{ensure_arity, normalize_index, normalize_range, parse_i64};
use crate::corestore::value::Value;
use crate::corestore::Corestore;
use crate::error::{ActionError, ActionResult};
use crate::resp::Frame;
use bytes::Bytes;
use std::collections::VecDeque;

pub fn llen(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(v.as_list()?.len() as i64)),
    }
}

pub fn lindex(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    let idx = parse_i64(&args[1])?;
    if !db.check_ttl(key) {
        return Ok(Frame::null_bulk());
    }
    let _guard = db.locks.read_one(key);
    let value = db.map.get(key);
    let list = match &value {
        None => return Ok(Frame::null_bulk()),
        Some(v) => v.as_list()?,
    };
    match normalize_index(idx, list.len()) {
        None => Ok(Frame::null_bulk()),
        Some(i) => Ok(Frame::bulk(list[i].clone())),
    }
}

fn push(db: &Corestore, args: &[Bytes], front: bool, require_exist: bool) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if require_exist && !db.map.contains(key) {
        return Ok(Frame::Int(0));
    }
    if let Some(existing) = db.map.get(key) {
        existing.as_list()?;
    }
    let mut list = match db.map.delete(key) {
        Some(Value::List(l)) => l,
        Some(_) => unreachable!("type checked above"),
        None => VecDeque::new(),
    };
    for item in &args[1..] {
        if front {
            list.push_front(item.clone());
        } else {
            list.push_back(item.clone());
        }
    }
    let len = list.len() as i64;
    db.map.set(key.clone(), Value::List(list));
    Ok(Frame::Int(len))
}

pub fn lpush(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    push(db, args, true, false)
}

pub fn rpush(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    push(db, args, false, false)
}

pub fn lpushx(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    push(db, args, true, true)
}

pub fn rpushx(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    push(db, args, false, true)
}

fn pop(db: &Corestore, args: &[Bytes], front: bool) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_list()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => return Ok(Frame::null_bulk()),
    };
    let list = value.as_list_mut().expect("type checked above");
    let popped = if front {
        list.pop_front()
    } else {
        list.pop_back()
    };
    let is_empty = list.is_empty();
    if !is_empty {
        db.map.set(key.clone(), value);
    } else {
        db.ttl_map.delete(key);
    }
    Ok(match popped {
        Some(b) => Frame::bulk(b),
        None => Frame::null_bulk(),
    })
}

pub fn lpop(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    pop(db, args, true)
}

pub fn rpop(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    pop(db, args, false)
}

pub fn lset(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let idx = parse_i64(&args[1])?;
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_list()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => return Err(ActionError::KEY_NOT_EXIST),
    };
    let result = {
        let list = value.as_list_mut().expect("type checked above");
        match normalize_index(idx, list.len()) {
            None => Err(ActionError::INDEX_OUT_OF_RANGE),
            Some(i) => {
                list[i] = args[2].clone();
                Ok(())
            }
        }
    };
    db.map.set(key.clone(), value);
    result?;
    Ok(Frame::OK)
}

pub fn lrange(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let start = parse_i64(&args[1])?;
    let end = parse_i64(&args[2])?;
    if !db.check_ttl(key) {
        return Ok(Frame::array(Vec::new()));
    }
    let _guard = db.locks.read_one(key);
    let value = db.map.get(key);
    let list = match &value {
        None => return Ok(Frame::array(Vec::new())),
        Some(v) => v.as_list()?,
    };
    match normalize_range(start, end, list.len()) {
        None => Ok(Frame::array(Vec::new())),
        Some((s, e)) => Ok(Frame::array(
            (s..=e).map(|i| Frame::bulk(list[i].clone())).collect(),
        )),
    }
}

pub fn ltrim(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let start = parse_i64(&args[1])?;
    let end = parse_i64(&args[2])?;
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_list()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => return Ok(Frame::OK),
    };
    {
        let list = value.as_list_mut().expect("type checked above");
        match normalize_range(start, end, list.len()) {
            None => list.clear(),
            Some((s, e)) => {
                let trimmed: VecDeque<Bytes> = list.iter().cloned().skip(s).take(e - s + 1).collect();
                *list = trimmed;
            }
        }
    }
    if value.is_empty_container() {
        db.ttl_map.delete(key);
    } else {
        db.map.set(key.clone(), value);
    }
    Ok(Frame::OK)
}

pub fn lrem(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let count = parse_i64(&args[1])?;
    let target = &args[2];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if let Some(existing) = db.map.get(key) {
        existing.as_list()?;
    }
    let mut value = match db.map.delete(key) {
        Some(v) => v,
        None => return Ok(Frame::Int(0)),
    };
    let removed = {
        let list = value.as_list_mut().expect("type checked above");
        if count == 0 {
            let before = list.len();
            list.retain(|v| v != target);
            (before - list.len()) as i64
        } else if count > 0 {
            remove_n(list, target, count as usize, true)
        } else {
            remove_n(list, target, (-count) as usize, false)
        }
    };
    cleanup_if_empty_value(db, key, value);
    Ok(Frame::Int(removed))
}

fn remove_n(list: &mut VecDeque<Bytes>, target: &Bytes, n: usize, from_head: bool) -> i64 {
    let mut removed = 0i64;
    if from_head {
        let mut i = 0;
        while i < list.len() && (removed as usize) < n {
            if &list[i] == target {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && (removed as usize) < n {
            i -= 1;
            if &list[i] == target {
                list.remove(i);
                removed += 1;
            }
        }
    }
    removed
}

fn cleanup_if_empty_value(db: &Corestore, key: &Bytes, value: Value) {
    if value.is_empty_container() {
        db.ttl_map.delete(key);
    } else {
        db.map.set(key.clone(), value);
    }
}

struct LposOpts {
    rank: i64,
    count: Option<usize>,
    maxlen: usize,
}

fn parse_lpos_opts(args: &[Bytes]) -> ActionResult<LposOpts> {
    let mut opts = LposOpts {
        rank: 1,
        count: None,
        maxlen: 0,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].to_ascii_lowercase().as_slice() {
            b"rank" => {
                i += 1;
                let raw = args.get(i).ok_or(ActionError::SYNTAX_ERROR)?;
                opts.rank = parse_i64(raw)?;
                if opts.rank == 0 {
                    return Err(ActionError::SYNTAX_ERROR);
                }
            }
            b"count" => {
                i += 1;
                let raw = args.get(i).ok_or(ActionError::SYNTAX_ERROR)?;
                opts.count = Some(parse_i64(raw)? as usize);
            }
            b"maxlen" => {
                i += 1;
                let raw = args.get(i).ok_or(ActionError::SYNTAX_ERROR)?;
                opts.maxlen = parse_i64(raw)? as usize;
            }
            _ => return Err(ActionError::SYNTAX_ERROR),
        }
        i += 1;
    }
    Ok(opts)
}

pub fn lpos(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    let target = &args[1];
    let opts = parse_lpos_opts(&args[2..])?;
    if !db.check_ttl(key) {
        return Ok(match opts.count {
            Some(_) => Frame::array(Vec::new()),
            None => Frame::null_bulk(),
        });
    }
    let _guard = db.locks.read_one(key);
    let value = db.map.get(key);
    let list = match &value {
        None => {
            return Ok(match opts.count {
                Some(_) => Frame::array(Vec::new()),
                None => Frame::null_bulk(),
            })
        }
        Some(v) => v.as_list()?,
    };
    let len = list.len();
    let limit = if opts.maxlen == 0 { len } else { opts.maxlen.min(len) };
    let mut positions = Vec::new();
    let unlimited = opts.count == Some(0);
    let want = match opts.count {
        None => 1,
        Some(0) => usize::MAX,
        Some(n) => n,
    };

    if opts.rank > 0 {
        let mut skip = opts.rank - 1;
        for (i, item) in list.iter().enumerate().take(limit) {
            if item == target {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                positions.push(i as i64);
                if !unlimited && positions.len() >= want {
                    break;
                }
            }
        }
    } else {
        let mut skip = -opts.rank - 1;
        let scan_from = len.saturating_sub(limit);
        for i in (scan_from..len).rev() {
            if list[i] == *target {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                positions.push(i as i64);
                if !unlimited && positions.len() >= want {
                    break;
                }
            }
        }
    }

    match opts.count {
        None => Ok(match positions.first() {
            Some(p) => Frame::Int(*p),
            None => Frame::null_bulk(),
        }),
        Some(_) => Ok(Frame::array(positions.into_iter().map(Frame::Int).collect())),
    }
}

pub fn lmove(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 4)?;
    let src = &args[0];
    let dst = &args[1];
    let src_left = match args[2].to_ascii_lowercase().as_slice() {
        b"left" => true,
        b"right" => false,
        _ => return Err(ActionError::SYNTAX_ERROR),
    };
    let dst_left = match args[3].to_ascii_lowercase().as_slice() {
        b"left" => true,
        b"right" => false,
        _ => return Err(ActionError::SYNTAX_ERROR),
    };
    db.check_ttl(src);
    db.check_ttl(dst);
    let _guards = db.locks.write_many(&[src.clone(), dst.clone()]);

    // Validate both ends before mutating anything: once the popped element leaves `src` it must
    // not be lost to a `dst` type error.
    if let Some(existing) = db.map.get(src) {
        existing.as_list()?;
    }
    if let Some(existing) = db.map.get(dst) {
        existing.as_list()?;
    }

    let mut src_value = match db.map.delete(src) {
        Some(v) => v,
        None => return Ok(Frame::null_bulk()),
    };
    let popped = {
        let list = src_value.as_list_mut().expect("type checked above");
        if src_left {
            list.pop_front()
        } else {
            list.pop_back()
        }
    };
    let popped = match popped {
        Some(v) => v,
        None => {
            db.map.set(src.clone(), src_value);
            return Ok(Frame::null_bulk());
        }
    };
    if src_value.is_empty_container() {
        db.ttl_map.delete(src);
    } else {
        db.map.set(src.clone(), src_value);
    }

    let mut dst_value = match db.map.delete(dst) {
        Some(v) => v,
        None => Value::List(VecDeque::new()),
    };
    {
        let list = dst_value.as_list_mut().expect("type checked above");
        if dst_left {
            list.push_front(popped.clone());
        } else {
            list.push_back(popped.clone());
        }
    }
    db.map.set(dst.clone(), dst_value);
    Ok(Frame::bulk(popped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Corestore {
        Corestore::new(4)
    }

    #[test]
    fn lpush_builds_reverse_order() {
        let db = db();
        lpush(&db, &[Bytes::from("k"), Bytes::from("a"), Bytes::from("b"), Bytes::from("c")])
            .unwrap();
        let r = lrange(&db, &[Bytes::from("k"), Bytes::from("0"), Bytes::from("-1")]).unwrap();
        assert_eq!(
            r,
            Frame::array(vec![Frame::bulk("c"), Frame::bulk("b"), Frame::bulk("a")])
        );
    }

    #[test]
    fn pushx_requires_existing_key() {
        let db = db();
        assert_eq!(lpushx(&db, &[Bytes::from("k"), Bytes::from("a")]).unwrap(), Frame::Int(0));
        lpush(&db, &[Bytes::from("k"), Bytes::from("a")]).unwrap();
        assert_eq!(lpushx(&db, &[Bytes::from("k"), Bytes::from("b")]).unwrap(), Frame::Int(2));
    }

    #[test]
    fn pop_cleans_up_empty_list() {
        let db = db();
        lpush(&db, &[Bytes::from("k"), Bytes::from("a")]).unwrap();
        assert_eq!(lpop(&db, &[Bytes::from("k")]).unwrap(), Frame::bulk("a"));
        assert!(!db.map.contains(b"k"));
        assert_eq!(lpop(&db, &[Bytes::from("k")]).unwrap(), Frame::null_bulk());
    }

    #[test]
    fn lindex_and_lset() {
        let db = db();
        rpush(&db, &[Bytes::from("k"), Bytes::from("a"), Bytes::from("b"), Bytes::from("c")])
            .unwrap();
        assert_eq!(lindex(&db, &[Bytes::from("k"), Bytes::from("-1")]).unwrap(), Frame::bulk("c"));
        lset(&db, &[Bytes::from("k"), Bytes::from("0"), Bytes::from("z")]).unwrap();
        assert_eq!(lindex(&db, &[Bytes::from("k"), Bytes::from("0")]).unwrap(), Frame::bulk("z"));
    }

    #[test]
    fn lrem_zero_removes_all_matches() {
        let db = db();
        rpush(
            &db,
            &[
                Bytes::from("k"),
                Bytes::from("a"),
                Bytes::from("b"),
                Bytes::from("a"),
                Bytes::from("a"),
            ],
        )
        .unwrap();
        let r = lrem(&db, &[Bytes::from("k"), Bytes::from("0"), Bytes::from("a")]).unwrap();
        assert_eq!(r, Frame::Int(3));
        let remaining = lrange(&db, &[Bytes::from("k"), Bytes::from("0"), Bytes::from("-1")]).unwrap();
        assert_eq!(remaining, Frame::array(vec![Frame::bulk("b")]));
    }

    #[test]
    fn lrem_negative_count_removes_from_tail() {
        let db = db();
        rpush(
            &db,
            &[Bytes::from("k"), Bytes::from("a"), Bytes::from("a"), Bytes::from("a")],
        )
        .unwrap();
        let r = lrem(&db, &[Bytes::from("k"), Bytes::from("-2"), Bytes::from("a")]).unwrap();
        assert_eq!(r, Frame::Int(2));
        let remaining = lrange(&db, &[Bytes::from("k"), Bytes::from("0"), Bytes::from("-1")]).unwrap();
        assert_eq!(remaining, Frame::array(vec![Frame::bulk("a")]));
    }

    #[test]
    fn ltrim_keeps_only_range() {
        let db = db();
        rpush(
            &db,
            &[
                Bytes::from("k"),
                Bytes::from("a"),
                Bytes::from("b"),
                Bytes::from("c"),
                Bytes::from("d"),
            ],
        )
        .unwrap();
        ltrim(&db, &[Bytes::from("k"), Bytes::from("1"), Bytes::from("2")]).unwrap();
        let remaining = lrange(&db, &[Bytes::from("k"), Bytes::from("0"), Bytes::from("-1")]).unwrap();
        assert_eq!(remaining, Frame::array(vec![Frame::bulk("b"), Frame::bulk("c")]));
    }

    #[test]
    fn lpos_rank_negative_scans_from_tail() {
        let db = db();
        rpush(
            &db,
            &[
                Bytes::from("k"),
                Bytes::from("a"),
                Bytes::from("b"),
                Bytes::from("c"),
                Bytes::from("b"),
            ],
        )
        .unwrap();
        let r = lpos(
            &db,
            &[Bytes::from("k"), Bytes::from("b"), Bytes::from("rank"), Bytes::from("-1"), Bytes::from("count"), Bytes::from("0")],
        )
        .unwrap();
        assert_eq!(r, Frame::array(vec![Frame::Int(3), Frame::Int(1)]));
    }

    #[test]
    fn lmove_moves_between_lists() {
        let db = db();
        rpush(&db, &[Bytes::from("src"), Bytes::from("a"), Bytes::from("b")]).unwrap();
        let r = lmove(
            &db,
            &[Bytes::from("src"), Bytes::from("dst"), Bytes::from("left"), Bytes::from("right")],
        )
        .unwrap();
        assert_eq!(r, Frame::bulk("a"));
        let dst = lrange(&db, &[Bytes::from("dst"), Bytes::from("0"), Bytes::from("-1")]).unwrap();
        assert_eq!(dst, Frame::array(vec![Frame::bulk("a")]));
    }

    #[test]
    fn lmove_missing_source_returns_null() {
        let db = db();
        let r = lmove(
            &db,
            &[Bytes::from("src"), Bytes::from("dst"), Bytes::from("left"), Bytes::from("right")],
        )
        .unwrap();
        assert_eq!(r, Frame::null_bulk());
    }

    #[test]
    fn push_on_wrong_type_leaves_existing_value_untouched() {
        let db = db();
        db.map.set(Bytes::from("k"), Value::Set(std::collections::HashSet::new()));
        assert_eq!(
            lpush(&db, &[Bytes::from("k"), Bytes::from("a")]).unwrap_err(),
            ActionError::WRONGTYPE
        );
        assert_eq!(db.map.get(b"k").unwrap().kind(), crate::corestore::value::ValueKind::Set);
    }

    #[test]
    fn pop_on_wrong_type_leaves_existing_value_untouched() {
        let db = db();
        db.map.set(Bytes::from("k"), Value::Set(std::collections::HashSet::new()));
        assert_eq!(lpop(&db, &[Bytes::from("k")]).unwrap_err(), ActionError::WRONGTYPE);
        assert_eq!(db.map.get(b"k").unwrap().kind(), crate::corestore::value::ValueKind::Set);
    }

    #[test]
    fn lmove_wrong_destination_type_does_not_lose_source_element() {
        let db = db();
        rpush(&db, &[Bytes::from("src"), Bytes::from("a")]).unwrap();
        db.map.set(Bytes::from("dst"), Value::Set(std::collections::HashSet::new()));
        let err = lmove(
            &db,
            &[Bytes::from("src"), Bytes::from("dst"), Bytes::from("left"), Bytes::from("right")],
        )
        .unwrap_err();
        assert_eq!(err, ActionError::WRONGTYPE);
        let remaining = lrange(&db, &[Bytes::from("src"), Bytes::from("0"), Bytes::from("-1")]).unwrap();
        assert_eq!(remaining, Frame::array(vec![Frame::bulk("a")]));
    }
}
