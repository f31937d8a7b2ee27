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

//! # Action errors
//!
//! Command handlers never write to the socket directly; they return a reply value or one of
//! these errors, which the connection layer turns into a `-message\r\n` frame. Framing errors
//! (`crate::protocol::FramingError`) are a different, connection-fatal thing -- this type is for
//! recoverable, per-command errors only.

use crate::corestore::value::WrongTypeError;
use crate::resp::Frame;

/// A recoverable, per-command error. Carries the exact reply message (without the leading `-` or
/// trailing CRLF, which `into_frame` adds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionError(pub &'static str);

pub type ActionResult<T> = Result<T, ActionError>;

impl ActionError {
    pub const UNSUPPORTED_COMMAND: Self = Self("error: unsupported command");
    pub const WRONGTYPE: Self =
        Self("WRONGTYPE Operation against a key holding the wrong kind of value");
    pub const NOT_AN_INTEGER: Self = Self("value is not an integer");
    pub const NOT_A_FLOAT: Self = Self("value is not a float");
    pub const KEY_NOT_EXIST: Self = Self("error: key not exist");
    pub const INDEX_OUT_OF_RANGE: Self = Self("index out of range");
    pub const SYNTAX_ERROR: Self = Self("error: syntax error");
    pub const WRONG_ARGS: Self = Self("error: wrong number of arguments");

    pub fn into_frame(self) -> Frame {
        Frame::error(self.0)
    }
}

impl From<WrongTypeError> for ActionError {
    fn from(_: WrongTypeError) -> Self {
        ActionError::WRONGTYPE
    }
}
