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

//! # String commands
//!
//! `SET`, `GET`, `GETRANGE`, `SETRANGE`, `MGET`, `MSET`, `SETEX`, `SETNX`, `STRLEN`, `INCR`,
//! `INCRBY`, `DECR`, `DECRBY`, `INCRBYFLOAT`, `APPEND`, `GETSET`.

use super::{ensure_arity, format_f64, parse_f64, parse_i64};
use crate::corestore::value::Value;
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

pub fn get(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::null_bulk());
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::null_bulk()),
        Some(v) => Ok(Frame::bulk(v.as_str()?.clone())),
    }
}

struct SetOpts {
    nx: bool,
    xx: bool,
    ex: Option<i64>,
    keepttl: bool,
    get: bool,
}

fn parse_set_opts(args: &[Bytes]) -> ActionResult<SetOpts> {
    let mut opts = SetOpts {
        nx: false,
        xx: false,
        ex: None,
        keepttl: false,
        get: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].to_ascii_lowercase().as_slice() {
            b"nx" => opts.nx = true,
            b"xx" => opts.xx = true,
            b"keepttl" => opts.keepttl = true,
            b"get" => opts.get = true,
            b"ex" => {
                i += 1;
                let raw = args.get(i).ok_or(ActionError::SYNTAX_ERROR)?;
                opts.ex = Some(super::parse_i64(raw)?);
            }
            _ => return Err(ActionError::SYNTAX_ERROR),
        }
        i += 1;
    }
    if opts.nx && opts.xx {
        return Err(ActionError::SYNTAX_ERROR);
    }
    if opts.ex.is_some() && opts.keepttl {
        return Err(ActionError::SYNTAX_ERROR);
    }
    Ok(opts)
}

pub fn set(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() >= 2)?;
    let key = &args[0];
    let val = &args[1];
    let opts = parse_set_opts(&args[2..])?;

    db.check_ttl(key);
    let _guard = db.locks.write_one(key);

    let exists = db.map.contains(key);
    let previous = if opts.get {
        match db.map.get(key) {
            Some(v) => Some(v.as_str()?.clone()),
            None => None,
        }
    } else {
        None
    };

    if (opts.nx && exists) || (opts.xx && !exists) {
        return Ok(if opts.get {
            match previous {
                Some(b) => Frame::bulk(b),
                None => Frame::null_bulk(),
            }
        } else {
            Frame::null_bulk()
        });
    }

    db.map.set(key.clone(), Value::Str(val.clone()));
    if let Some(secs) = opts.ex {
        db.ttl_map.set(key.clone(), now_unix() + secs);
    } else if !opts.keepttl {
        db.ttl_map.delete(key);
    }

    Ok(if opts.get {
        match previous {
            Some(b) => Frame::bulk(b),
            None => Frame::null_bulk(),
        }
    } else {
        Frame::OK
    })
}

pub fn getset(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    let previous = match db.map.get(key) {
        Some(v) => Some(v.as_str()?.clone()),
        None => None,
    };
    db.map.set(key.clone(), Value::Str(args[1].clone()));
    db.ttl_map.delete(key);
    Ok(match previous {
        Some(b) => Frame::bulk(b),
        None => Frame::null_bulk(),
    })
}

pub fn setnx(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    if db.map.contains(key) {
        return Ok(Frame::Int(0));
    }
    db.map.set(key.clone(), Value::Str(args[1].clone()));
    Ok(Frame::Int(1))
}

pub fn setex(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let secs = parse_i64(&args[1])?;
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    db.map.set(key.clone(), Value::Str(args[2].clone()));
    db.ttl_map.set(key.clone(), now_unix() + secs);
    Ok(Frame::OK)
}

pub fn mget(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty())?;
    let mut out = Vec::with_capacity(args.len());
    for key in args {
        if !db.check_ttl(key) {
            out.push(Frame::null_bulk());
            continue;
        }
        let _guard = db.locks.read_one(key);
        out.push(match db.map.get(key) {
            Some(Value::Str(b)) => Frame::bulk(b),
            _ => Frame::null_bulk(),
        });
    }
    Ok(Frame::array(out))
}

pub fn mset(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(!args.is_empty() && args.len() % 2 == 0)?;
    let keys: Vec<Bytes> = args.iter().step_by(2).cloned().collect();
    for key in &keys {
        db.check_ttl(key);
    }
    let _guards = db.locks.write_many(&keys);
    for pair in args.chunks(2) {
        db.map.set(pair[0].clone(), Value::Str(pair[1].clone()));
        db.ttl_map.delete(&pair[0]);
    }
    Ok(Frame::OK)
}

pub fn strlen(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    let key = &args[0];
    if !db.check_ttl(key) {
        return Ok(Frame::Int(0));
    }
    let _guard = db.locks.read_one(key);
    match db.map.get(key) {
        None => Ok(Frame::Int(0)),
        Some(v) => Ok(Frame::Int(v.as_str()?.len() as i64)),
    }
}

pub fn append(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    let mut buf = match db.map.get(key) {
        Some(v) => v.as_str()?.to_vec(),
        None => Vec::new(),
    };
    buf.extend_from_slice(&args[1]);
    let len = buf.len() as i64;
    db.map.set(key.clone(), Value::Str(Bytes::from(buf)));
    Ok(Frame::Int(len))
}

pub fn getrange(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let start = parse_i64(&args[1])?;
    let end = parse_i64(&args[2])?;
    if !db.check_ttl(key) {
        return Ok(Frame::bulk(""));
    }
    let _guard = db.locks.read_one(key);
    let value = match db.map.get(key) {
        None => return Ok(Frame::bulk("")),
        Some(v) => v.as_str()?.clone(),
    };
    match super::normalize_range(start, end, value.len()) {
        None => Ok(Frame::bulk("")),
        Some((s, e)) => Ok(Frame::bulk(value.slice(s..=e))),
    }
}

pub fn setrange(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 3)?;
    let key = &args[0];
    let offset = parse_i64(&args[1])?;
    if offset < 0 {
        return Err(ActionError::INDEX_OUT_OF_RANGE);
    }
    let offset = offset as usize;
    let patch = &args[2];
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    let mut buf = match db.map.get(key) {
        Some(v) => v.as_str()?.to_vec(),
        None => Vec::new(),
    };
    if buf.len() < offset + patch.len() {
        buf.resize(offset + patch.len(), 0);
    }
    buf[offset..offset + patch.len()].copy_from_slice(patch);
    let len = buf.len() as i64;
    db.map.set(key.clone(), Value::Str(Bytes::from(buf)));
    Ok(Frame::Int(len))
}

fn incr_by(db: &Corestore, key: &Bytes, delta: i64) -> ActionResult<Frame> {
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    let current = match db.map.get(key) {
        None => 0,
        Some(v) => super::parse_i64(v.as_str()?)?,
    };
    let updated = current
        .checked_add(delta)
        .ok_or(ActionError::NOT_AN_INTEGER)?;
    db.map
        .set(key.clone(), Value::Str(Bytes::from(updated.to_string())));
    Ok(Frame::Int(updated))
}

pub fn incr(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    incr_by(db, &args[0], 1)
}

pub fn decr(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    incr_by(db, &args[0], -1)
}

pub fn incrby(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let delta = parse_i64(&args[1])?;
    incr_by(db, &args[0], delta)
}

pub fn decrby(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let delta = parse_i64(&args[1])?;
    incr_by(db, &args[0], -delta)
}

pub fn incrbyfloat(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 2)?;
    let key = &args[0];
    let delta = parse_f64(&args[1])?;
    db.check_ttl(key);
    let _guard = db.locks.write_one(key);
    let current = match db.map.get(key) {
        None => 0.0,
        Some(v) => parse_f64(v.as_str()?)?,
    };
    let updated = current + delta;
    let formatted = format_f64(updated);
    db.map.set(key.clone(), Value::Str(formatted.clone()));
    Ok(Frame::bulk(formatted))
}
