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

//! # Admin / connection commands
//!
//! `PING`, `ECHO`, `DBSIZE`, `FLUSHDB`.

use super::ensure_arity;
use crate::corestore::Corestore;
use crate::error::ActionResult;
use crate::resp::Frame;
use bytes::Bytes;

pub fn ping(_db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() <= 1)?;
    match args.first() {
        Some(msg) => Ok(Frame::bulk(msg.clone())),
        None => Ok(Frame::simple("PONG")),
    }
}

pub fn echo(_db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.len() == 1)?;
    Ok(Frame::bulk(args[0].clone()))
}

pub fn dbsize(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.is_empty())?;
    Ok(Frame::Int(db.dbsize() as i64))
}

pub fn flushdb(db: &Corestore, args: &[Bytes]) -> ActionResult<Frame> {
    ensure_arity(args.is_empty())?;
    db.flushdb();
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
    fn ping_without_message_is_pong() {
        let db = db();
        assert_eq!(ping(&db, &[]).unwrap(), Frame::simple("PONG"));
    }

    #[test]
    fn ping_with_message_echoes_it_as_bulk() {
        let db = db();
        assert_eq!(ping(&db, &[Bytes::from("hello")]).unwrap(), Frame::bulk("hello"));
    }

    #[test]
    fn echo_returns_bulk() {
        let db = db();
        assert_eq!(echo(&db, &[Bytes::from("hi")]).unwrap(), Frame::bulk("hi"));
    }

    #[test]
    fn dbsize_and_flushdb_roundtrip() {
        let db = db();
        db.map.set(Bytes::from("a"), Value::Str(Bytes::from("1")));
        assert_eq!(dbsize(&db, &[]).unwrap(), Frame::Int(1));
        assert_eq!(flushdb(&db, &[]).unwrap(), Frame::OK);
        assert_eq!(dbsize(&db, &[]).unwrap(), Frame::Int(0));
    }
}
