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

//! # Database networking
//!
//! One task per TCP connection. `BaseListener` owns the bound socket, the connection-count
//! semaphore and the shutdown broadcaster; `Listener::run` accepts connections (with a backoff
//! around `accept()` errors) and spawns a `ConnectionHandler` for each.

mod connection;
mod listener;
mod tcp;

pub use connection::ConnectionHandler;
pub use listener::{connect, BaseListener, Listener};

use std::cell::Cell;
use std::time::Duration;
use tokio::time;

/// A backoff implementation used in the accept loop: waits progressively longer between retries
/// and gives up once the wait would exceed `MAX_BACKOFF` seconds.
pub(self) struct NetBackoff {
    c: Cell<u8>,
}

impl NetBackoff {
    const MAX_BACKOFF: u8 = 64;

    pub const fn new() -> Self {
        Self { c: Cell::new(1) }
    }
    pub async fn spin(&self) {
        time::sleep(Duration::from_secs(self.c.get() as _)).await;
        self.c.set(self.c.get().saturating_mul(2));
    }
    pub fn should_disconnect(&self) -> bool {
        self.c.get() > Self::MAX_BACKOFF
    }
}
