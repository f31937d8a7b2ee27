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

//! # The query engine
//!
//! `execute_command` takes a raw command vector (as produced by `Frame::into_command_vec`),
//! case-folds the command name, and dispatches to the matching `actions::*` handler.

use crate::actions;
use crate::corestore::Corestore;
use crate::error::ActionError;
use crate::resp::Frame;
use bytes::Bytes;

/// Builds a `match` over lowercase command names, each arm calling the named handler with the
/// remaining arguments. Keeps the dispatch table next to the command list instead of scattered
/// across a lookup structure built at runtime.
macro_rules! dispatch_table {
    ($name:expr, $args:expr, $db:expr, { $($command:literal => $handler:path),* $(,)? }) => {
        match $name {
            $($command => $handler($db, $args),)*
            _ => Err(ActionError::UNSUPPORTED_COMMAND),
        }
    };
}

fn dispatch(db: &Corestore, name: &[u8], args: &[Bytes]) -> Result<Frame, ActionError> {
    dispatch_table!(name, args, db, {
        b"ping" => actions::admin::ping,
        b"echo" => actions::admin::echo,
        b"dbsize" => actions::admin::dbsize,
        b"flushdb" => actions::admin::flushdb,

        b"del" => actions::keys::del,
        b"exists" => actions::keys::exists,
        b"keys" => actions::keys::keys,
        b"expire" => actions::keys::expire,
        b"persist" => actions::keys::persist,
        b"ttl" => actions::keys::ttl,
        b"type" => actions::keys::type_of,
        b"rename" => actions::keys::rename,

        b"get" => actions::strings::get,
        b"set" => actions::strings::set,
        b"getset" => actions::strings::getset,
        b"setnx" => actions::strings::setnx,
        b"setex" => actions::strings::setex,
        b"mget" => actions::strings::mget,
        b"mset" => actions::strings::mset,
        b"strlen" => actions::strings::strlen,
        b"append" => actions::strings::append,
        b"getrange" => actions::strings::getrange,
        b"setrange" => actions::strings::setrange,
        b"incr" => actions::strings::incr,
        b"decr" => actions::strings::decr,
        b"incrby" => actions::strings::incrby,
        b"decrby" => actions::strings::decrby,
        b"incrbyfloat" => actions::strings::incrbyfloat,

        b"llen" => actions::lists::llen,
        b"lindex" => actions::lists::lindex,
        b"lpush" => actions::lists::lpush,
        b"rpush" => actions::lists::rpush,
        b"lpushx" => actions::lists::lpushx,
        b"rpushx" => actions::lists::rpushx,
        b"lpop" => actions::lists::lpop,
        b"rpop" => actions::lists::rpop,
        b"lset" => actions::lists::lset,
        b"lrange" => actions::lists::lrange,
        b"ltrim" => actions::lists::ltrim,
        b"lrem" => actions::lists::lrem,
        b"lpos" => actions::lists::lpos,
        b"lmove" => actions::lists::lmove,

        b"hset" => actions::hashes::hset,
        b"hsetnx" => actions::hashes::hsetnx,
        b"hget" => actions::hashes::hget,
        b"hdel" => actions::hashes::hdel,
        b"hexists" => actions::hashes::hexists,
        b"hlen" => actions::hashes::hlen,
        b"hkeys" => actions::hashes::hkeys,
        b"hvals" => actions::hashes::hvals,
        b"hgetall" => actions::hashes::hgetall,
        b"hmget" => actions::hashes::hmget,
        b"hstrlen" => actions::hashes::hstrlen,
        b"hincrby" => actions::hashes::hincrby,
        b"hincrbyfloat" => actions::hashes::hincrbyfloat,
        b"hrandfield" => actions::hashes::hrandfield,

        b"sadd" => actions::sets::sadd,
        b"srem" => actions::sets::srem,
        b"scard" => actions::sets::scard,
        b"sismember" => actions::sets::sismember,
        b"smembers" => actions::sets::smembers,
        b"smove" => actions::sets::smove,
        b"spop" => actions::sets::spop,
        b"srandmember" => actions::sets::srandmember,
        b"sdiff" => actions::sets::sdiff,
        b"sdiffstore" => actions::sets::sdiffstore,
        b"sinter" => actions::sets::sinter,
        b"sinterstore" => actions::sets::sinterstore,
        b"sunion" => actions::sets::sunion,
        b"sunionstore" => actions::sets::sunionstore,
    })
}

/// Run a raw command vector against `db`. `argv[0]` is the command name (matched
/// case-insensitively); the rest are arguments. An empty `argv` or an unknown command name both
/// produce `UNSUPPORTED_COMMAND`.
pub fn execute_command(db: &Corestore, argv: Vec<Bytes>) -> Frame {
    let Some((name, args)) = argv.split_first() else {
        return ActionError::UNSUPPORTED_COMMAND.into_frame();
    };
    let lowered = name.to_ascii_lowercase();
    match dispatch(db, &lowered, args) {
        Ok(frame) => frame,
        Err(e) => e.into_frame(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Corestore {
        Corestore::new(4)
    }

    #[test]
    fn dispatches_case_insensitively() {
        let db = db();
        let argv = vec![Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")];
        assert_eq!(execute_command(&db, argv), Frame::OK);
        let argv = vec![Bytes::from("get"), Bytes::from("k")];
        assert_eq!(execute_command(&db, argv), Frame::bulk("v"));
    }

    #[test]
    fn unknown_command_is_an_error_frame() {
        let db = db();
        let argv = vec![Bytes::from("frobnicate")];
        match execute_command(&db, argv) {
            Frame::Error(_) => {}
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn empty_argv_is_an_error_frame() {
        let db = db();
        match execute_command(&db, Vec::new()) {
            Frame::Error(_) => {}
            other => panic!("expected error frame, got {other:?}"),
        }
    }
}
