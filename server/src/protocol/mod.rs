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

//! # The SP stream parser
//!
//! [`FrameDecoder`] turns a byte stream into a sequence of [`Frame`]s without blocking on frame
//! boundaries: each call to [`FrameDecoder::decode`] either returns a completed frame, reports
//! that more bytes are needed, or reports a framing error. State persists across calls (the
//! `Idle`/`InBulkBody`/`InArray` state machine from the design doc) so that partially-received
//! bulk bodies and nested arrays don't need to be re-scanned from the start on every call.

use crate::resp::Frame;
use bytes::{Buf, Bytes, BytesMut};

/// A malformed SP byte sequence. Fatal to the connection it was read on.
#[derive(Debug, PartialEq, Eq)]
pub enum FramingError {
    /// A line wasn't terminated by CRLF (bare LF, or buffer ended without any LF -- the latter
    /// is actually folded into `NeedMore` by the caller; this variant is for a confirmed bad
    /// terminator).
    BadLineTerminator,
    /// An integer/length field contained non-digit bytes.
    NonNumericLength,
    /// A declared length was less than -1.
    LengthTooSmall,
    /// A bulk body's declared length of bytes was not followed by CRLF.
    BadBulkTerminator,
}

impl FramingError {
    pub fn message(&self) -> &'static str {
        match self {
            FramingError::BadLineTerminator => "protocol error: expected CRLF line terminator",
            FramingError::NonNumericLength => "protocol error: invalid length",
            FramingError::LengthTooSmall => "protocol error: invalid length",
            FramingError::BadBulkTerminator => "protocol error: expected CRLF after bulk body",
        }
    }
}

struct PendingArray {
    remaining: usize,
    items: Vec<Frame>,
}

enum Pending {
    /// Waiting for a header line.
    Idle,
    /// Waiting for `len` body bytes plus a trailing CRLF.
    InBulkBody(usize),
}

/// Incremental SP frame decoder. One instance lives per connection.
pub struct FrameDecoder {
    pending: Pending,
    stack: Vec<PendingArray>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one decode attempt.
pub enum Decoded {
    /// A complete top-level frame, and how many bytes of `buf` it consumed.
    Frame(Frame),
    /// Not enough bytes buffered yet; call again after reading more from the socket.
    NeedMore,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            pending: Pending::Idle,
            stack: Vec::new(),
        }
    }

    /// Attempt to decode one top-level frame from `buf`, advancing it past whatever bytes were
    /// consumed. On `NeedMore`, `buf` is left untouched (aside from bytes that completed earlier,
    /// now-buffered sub-frames of an in-progress array).
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Decoded, FramingError> {
        loop {
            match self.pending {
                Pending::InBulkBody(len) => {
                    if buf.len() < len + 2 {
                        return Ok(Decoded::NeedMore);
                    }
                    if buf[len] != b'\r' || buf[len + 1] != b'\n' {
                        return Err(FramingError::BadBulkTerminator);
                    }
                    let body = Bytes::copy_from_slice(&buf[..len]);
                    buf.advance(len + 2);
                    self.pending = Pending::Idle;
                    if let Some(done) = self.bubble(Frame::Bulk(Some(body))) {
                        return Ok(Decoded::Frame(done));
                    }
                }
                Pending::Idle => {
                    let idx = match buf.iter().position(|&b| b == b'\n') {
                        Some(idx) => idx,
                        None => return Ok(Decoded::NeedMore),
                    };
                    if idx == 0 || buf[idx - 1] != b'\r' {
                        return Err(FramingError::BadLineTerminator);
                    }
                    let line_len = idx - 1;
                    let line = buf.split_to(idx + 1).freeze().slice(..line_len);
                    if line.is_empty() {
                        return Err(FramingError::BadLineTerminator);
                    }
                    let header = line[0];
                    let rest = line.slice(1..);
                    let leaf = match header {
                        b'+' => Some(Frame::Simple(rest)),
                        b'-' => Some(Frame::Error(rest)),
                        b':' => Some(Frame::Int(parse_i64(&rest)?)),
                        b'$' => {
                            let len = parse_i64(&rest)?;
                            if len < -1 {
                                return Err(FramingError::LengthTooSmall);
                            } else if len == -1 {
                                Some(Frame::Bulk(None))
                            } else {
                                self.pending = Pending::InBulkBody(len as usize);
                                None
                            }
                        }
                        b'*' => {
                            let len = parse_i64(&rest)?;
                            if len < -1 {
                                return Err(FramingError::LengthTooSmall);
                            } else if len == -1 {
                                Some(Frame::Array(None))
                            } else if len == 0 {
                                Some(Frame::Array(Some(Vec::new())))
                            } else {
                                self.stack.push(PendingArray {
                                    remaining: len as usize,
                                    items: Vec::with_capacity(len as usize),
                                });
                                None
                            }
                        }
                        _ => Some(Frame::Plain(line)),
                    };
                    if let Some(leaf) = leaf {
                        if let Some(done) = self.bubble(leaf) {
                            return Ok(Decoded::Frame(done));
                        }
                    }
                }
            }
        }
    }

    /// Fold a completed leaf/array frame into the innermost pending array, recursively
    /// completing and bubbling up any arrays that become full as a result. Returns `Some(frame)`
    /// once there is no enclosing array left, i.e. a full top-level frame is ready.
    fn bubble(&mut self, frame: Frame) -> Option<Frame> {
        let mut current = frame;
        loop {
            match self.stack.last_mut() {
                None => return Some(current),
                Some(top) => {
                    top.items.push(current);
                    if top.items.len() == top.remaining {
                        let top = self.stack.pop().unwrap();
                        current = Frame::Array(Some(top.items));
                    } else {
                        return None;
                    }
                }
            }
        }
    }
}

fn parse_i64(digits: &[u8]) -> Result<i64, FramingError> {
    let s = std::str::from_utf8(digits).map_err(|_| FramingError::NonNumericLength)?;
    s.parse::<i64>().map_err(|_| FramingError::NonNumericLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(input);
        let mut dec = FrameDecoder::new();
        let mut out = Vec::new();
        loop {
            match dec.decode(&mut buf).unwrap() {
                Decoded::Frame(f) => out.push(f),
                Decoded::NeedMore => break,
            }
        }
        out
    }

    #[test]
    fn parses_simple_string() {
        let frames = decode_all(b"+OK\r\n");
        assert_eq!(frames, vec![Frame::Simple(Bytes::from("OK"))]);
    }

    #[test]
    fn parses_array_of_bulks() {
        let frames = decode_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert_eq!(
            frames,
            vec![Frame::array(vec![Frame::bulk("GET"), Frame::bulk("k")])]
        );
    }

    #[test]
    fn parses_nested_arrays() {
        let frames = decode_all(b"*2\r\n*1\r\n:1\r\n$1\r\nx\r\n");
        assert_eq!(
            frames,
            vec![Frame::array(vec![
                Frame::array(vec![Frame::Int(1)]),
                Frame::bulk("x")
            ])]
        );
    }

    #[test]
    fn incomplete_array_waits_for_more_bytes() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n"[..]);
        let mut dec = FrameDecoder::new();
        assert!(matches!(dec.decode(&mut buf).unwrap(), Decoded::NeedMore));
        buf.extend_from_slice(b"$1\r\nk\r\n");
        match dec.decode(&mut buf).unwrap() {
            Decoded::Frame(f) => {
                assert_eq!(f, Frame::array(vec![Frame::bulk("GET"), Frame::bulk("k")]))
            }
            Decoded::NeedMore => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn null_bulk_and_array() {
        assert_eq!(decode_all(b"$-1\r\n"), vec![Frame::null_bulk()]);
        assert_eq!(decode_all(b"*-1\r\n"), vec![Frame::null_array()]);
        assert_eq!(decode_all(b"*0\r\n"), vec![Frame::array(vec![])]);
    }

    #[test]
    fn bare_lf_is_a_framing_error() {
        let mut buf = BytesMut::from(&b"+OK\n"[..]);
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.decode(&mut buf), Err(FramingError::BadLineTerminator));
    }

    #[test]
    fn non_numeric_length_is_a_framing_error() {
        let mut buf = BytesMut::from(&b"$abc\r\n"[..]);
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.decode(&mut buf), Err(FramingError::NonNumericLength));
    }

    #[test]
    fn bad_bulk_terminator_is_a_framing_error() {
        let mut buf = BytesMut::from(&b"$3\r\nabcXX"[..]);
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.decode(&mut buf), Err(FramingError::BadBulkTerminator));
    }

    #[test]
    fn plain_line_for_unrecognized_header() {
        assert_eq!(decode_all(b"PING\r\n"), vec![Frame::Plain(Bytes::from("PING"))]);
    }

    #[test]
    fn encode_decode_round_trip() {
        let original = Frame::array(vec![
            Frame::bulk("SET"),
            Frame::bulk("k"),
            Frame::bulk("v"),
        ]);
        let bytes = original.to_bytes();
        let frames = decode_all(&bytes);
        assert_eq!(frames, vec![original]);
    }
}
