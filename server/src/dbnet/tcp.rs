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

use bytes::BytesMut;
use libsky::BUF_CAP;
use tokio::io::BufWriter;
use tokio::net::TcpStream;

/// A buffered connection: an accumulating read buffer in front of the socket, and a `BufWriter`
/// behind it so replies get coalesced into fewer syscalls.
pub struct Connection {
    pub buffer: BytesMut,
    pub stream: BufWriter<TcpStream>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            buffer: BytesMut::with_capacity(BUF_CAP),
            stream: BufWriter::new(stream),
        }
    }
}
