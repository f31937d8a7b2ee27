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

//! # Actions
//!
//! One handler per command. A handler validates arity and options, runs `CheckTTL` on every key
//! it touches before acquiring its own lock, performs the operation, applies empty-container
//! cleanup, and returns a reply value.

pub mod admin;
pub mod hashes;
pub mod keys;
pub mod lists;
pub mod sets;
pub mod strings;

use crate::error::{ActionError, ActionResult};

/// Every handler's signature: the shared database and the argument vector with the command name
/// already stripped off.
pub type Handler = fn(&crate::corestore::Corestore, &[bytes::Bytes]) -> ActionResult<crate::resp::Frame>;

pub(crate) fn ensure_arity(ok: bool) -> ActionResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ActionError::WRONG_ARGS)
    }
}

pub(crate) fn parse_i64(b: &[u8]) -> ActionResult<i64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ActionError::NOT_AN_INTEGER)
}

pub(crate) fn parse_f64(b: &[u8]) -> ActionResult<f64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or(ActionError::NOT_A_FLOAT)
}

/// `f64`'s `Display` already produces the shortest decimal string that round-trips, which is all
/// "minimal-length float formatting" means here (`3.0` -> `"3"`, `3.15` -> `"3.15"`).
pub(crate) fn format_f64(f: f64) -> bytes::Bytes {
    bytes::Bytes::from(format!("{f}"))
}

/// Resolve a possibly-negative index against a container of length `len`. Returns `None` if out
/// of range after normalization.
pub(crate) fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { len + i } else { i };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(idx as usize)
    }
}

/// Resolve an inclusive `[start, end]` range with negative indexing and clamping, as `LRANGE`
/// and `LTRIM` both need. Returns `None` if the normalized range is empty.
pub(crate) fn normalize_range(start: i64, end: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let l = len as i64;
    let mut s = if start < 0 { l + start } else { start };
    let mut e = if end < 0 { l + end } else { end };
    if e >= l {
        e = l - 1;
    }
    if s < 0 {
        s = 0;
    }
    if s > e || s >= l || e < 0 {
        return None;
    }
    Some((s as usize, e as usize))
}
