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

//! # The reply/frame value model
//!
//! [`Frame`] is used both for parsed input (see `crate::protocol`) and for constructed replies:
//! the wire format is symmetric, so one type serves both directions.

use bytes::{Bytes, BytesMut};

/// A single SP frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+s\r\n`
    Simple(Bytes),
    /// `-s\r\n`
    Error(Bytes),
    /// `:<decimal>\r\n`
    Int(i64),
    /// `$<len>\r\n<b>\r\n`, or `$-1\r\n` when `None`
    Bulk(Option<Bytes>),
    /// `*<len>\r\n` followed by each element's encoding, or `*-1\r\n` when `None`
    Array(Option<Vec<Frame>>),
    /// `s\r\n`, used only for lines with an unrecognized header byte
    Plain(Bytes),
}

impl Frame {
    pub fn simple(s: impl Into<Bytes>) -> Self {
        Frame::Simple(s.into())
    }
    pub fn error(s: impl Into<Bytes>) -> Self {
        Frame::Error(s.into())
    }
    pub fn bulk(b: impl Into<Bytes>) -> Self {
        Frame::Bulk(Some(b.into()))
    }
    pub const fn null_bulk() -> Self {
        Frame::Bulk(None)
    }
    pub const fn null_array() -> Self {
        Frame::Array(None)
    }
    pub fn array(items: Vec<Frame>) -> Self {
        Frame::Array(Some(items))
    }
    pub const OK: Frame = Frame::Simple(Bytes::from_static(b"OK"));

    /// Encode this frame as SP wire bytes, appending to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                out.extend_from_slice(b"+");
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            Frame::Error(s) => {
                out.extend_from_slice(b"-");
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            Frame::Int(n) => {
                out.extend_from_slice(b":");
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Frame::Bulk(Some(b)) => {
                out.extend_from_slice(b"$");
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Frame::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            Frame::Array(Some(items)) => {
                out.extend_from_slice(b"*");
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
            Frame::Plain(s) => {
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Convert an array-of-bulk-strings frame into a raw command vector, taking each child's
    /// raw payload (bulk -> bytes, simple string -> utf8 bytes, int -> decimal bytes).
    /// Returns `None` if this isn't an array, contains a nested array, or is a null array.
    pub fn into_command_vec(self) -> Option<Vec<Bytes>> {
        match self {
            Frame::Array(Some(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let b = match item {
                        Frame::Bulk(Some(b)) => b,
                        Frame::Bulk(None) => Bytes::new(),
                        Frame::Simple(s) => s,
                        Frame::Plain(s) => s,
                        Frame::Int(n) => Bytes::from(n.to_string().into_bytes()),
                        Frame::Error(s) => s,
                        Frame::Array(_) => return None,
                    };
                    out.push(b);
                }
                Some(out)
            }
            _ => None,
        }
    }

    pub const fn is_array(&self) -> bool {
        matches!(self, Frame::Array(_))
    }
}
