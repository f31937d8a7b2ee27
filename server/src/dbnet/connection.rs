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

//! # The per-connection read/execute/write loop

use super::tcp::Connection;
use crate::corestore::Corestore;
use crate::protocol::{Decoded, FrameDecoder, FramingError};
use crate::queryengine;
use crate::resp::Frame;
use bytes::BytesMut;
use std::io::Result as IoResult;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, Semaphore};

enum NextFrame {
    Frame(Frame),
    /// The remote end closed the connection cleanly (no partial frame pending).
    Eof,
    /// The byte stream was not valid SP. Fatal.
    Framing(FramingError),
}

/// Drives one TCP connection: reads bytes, decodes frames, dispatches completed commands through
/// `queryengine::execute_command`, and writes back replies.
pub struct ConnectionHandler {
    db: Arc<Corestore>,
    con: Connection,
    decoder: FrameDecoder,
    climit: Arc<Semaphore>,
    termination_signal: broadcast::Receiver<()>,
    _term_sig_tx: mpsc::Sender<()>,
}

impl ConnectionHandler {
    pub fn new(
        db: Arc<Corestore>,
        con: Connection,
        climit: Arc<Semaphore>,
        termination_signal: broadcast::Receiver<()>,
        _term_sig_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            db,
            con,
            decoder: FrameDecoder::new(),
            climit,
            termination_signal,
            _term_sig_tx,
        }
    }

    /// Takes `con` and `decoder` as separate borrows (rather than `&mut self`) so this can sit in
    /// one `tokio::select!` arm alongside a `self.termination_signal.recv()` arm without the two
    /// fighting over a whole-`self` borrow.
    async fn next_frame(con: &mut Connection, decoder: &mut FrameDecoder) -> IoResult<NextFrame> {
        loop {
            match decoder.decode(&mut con.buffer) {
                Ok(Decoded::Frame(frame)) => return Ok(NextFrame::Frame(frame)),
                Ok(Decoded::NeedMore) => {
                    let read = con.stream.read_buf(&mut con.buffer).await?;
                    if read == 0 {
                        return Ok(NextFrame::Eof);
                    }
                }
                Err(e) => return Ok(NextFrame::Framing(e)),
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> IoResult<()> {
        let mut out = BytesMut::new();
        frame.encode(&mut out);
        self.con.stream.write_all(&out).await?;
        self.con.stream.flush().await
    }

    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            let next = tokio::select! {
                next = Self::next_frame(&mut self.con, &mut self.decoder) => next?,
                _ = self.termination_signal.recv() => return Ok(()),
            };
            match next {
                NextFrame::Eof => return Ok(()),
                NextFrame::Framing(e) => {
                    // Best-effort; the connection is closing either way.
                    let _ = self.write_frame(&Frame::error(e.message())).await;
                    return Ok(());
                }
                NextFrame::Frame(frame) => {
                    let argv = match frame.into_command_vec() {
                        Some(argv) => argv,
                        None => {
                            log::debug!("ignoring non-command frame at the top level");
                            continue;
                        }
                    };
                    let reply = queryengine::execute_command(&self.db, argv);
                    self.write_frame(&reply).await?;
                }
            }
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        // Make sure the permit is returned even if this task panics mid-connection.
        self.climit.add_permits(1);
    }
}
