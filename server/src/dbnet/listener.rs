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

use super::{tcp::Connection, ConnectionHandler, NetBackoff};
use crate::corestore::Corestore;
use std::io::Result as IoResult;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};

/// Owns the bound socket and everything a `ConnectionHandler` needs a handle to: the shared
/// database, the connection-count semaphore, and the shutdown broadcaster.
pub struct BaseListener {
    pub db: Arc<Corestore>,
    pub listener: TcpListener,
    pub climit: Arc<Semaphore>,
    pub signal: broadcast::Sender<()>,
    // When every `Sender` clone handed to a `ConnectionHandler` is dropped, `recv` on this
    // returns `None` -- that's how `release_self` knows every connection has wound down.
    terminate_tx: mpsc::Sender<()>,
    terminate_rx: mpsc::Receiver<()>,
}

impl BaseListener {
    pub async fn init(
        db: Arc<Corestore>,
        host: IpAddr,
        port: u16,
        climit: Arc<Semaphore>,
        signal: broadcast::Sender<()>,
    ) -> IoResult<Self> {
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let listener = TcpListener::bind((host, port)).await?;
        Ok(Self {
            db,
            listener,
            climit,
            signal,
            terminate_tx,
            terminate_rx,
        })
    }

    /// Drop this listener's handles to the shutdown machinery and wait for every spawned
    /// connection task to drop its own clone of `terminate_tx`.
    pub async fn release_self(self) {
        let Self {
            mut terminate_rx,
            terminate_tx,
            signal,
            ..
        } = self;
        drop(signal);
        drop(terminate_tx);
        let _ = terminate_rx.recv().await;
    }
}

pub struct Listener {
    base: BaseListener,
}

impl Listener {
    pub fn new(base: BaseListener) -> Self {
        Self { base }
    }

    async fn accept(&self) -> IoResult<tokio::net::TcpStream> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                Ok((stream, _)) => return Ok(stream),
                Err(e) => {
                    if backoff.should_disconnect() {
                        return Err(e);
                    }
                }
            }
            backoff.spin().await;
        }
    }

    /// Accept connections until the listener socket itself fails. Errors from individual
    /// `accept()` calls are retried with backoff rather than propagated, since a single flaky
    /// accept shouldn't bring the whole server down.
    pub async fn run(&self) -> IoResult<()> {
        loop {
            // Acquire a permit before accepting so a connection burst can't outrun the limit;
            // `forget` hands ownership of the permit to the spawned task via the Drop impl below.
            self.base.climit.acquire().await.unwrap().forget();
            let stream = match self.accept().await {
                Ok(s) => s,
                Err(e) => return Err(e),
            };
            let mut handler = ConnectionHandler::new(
                self.base.db.clone(),
                Connection::new(stream),
                self.base.climit.clone(),
                self.base.signal.subscribe(),
                self.base.terminate_tx.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = handler.run().await {
                    log::error!("connection handler exited with an error: {e}");
                }
            });
        }
    }

    pub async fn finish_with_termsig(self) {
        self.base.release_self().await;
    }
}

/// Bind the listening socket and start the accept loop as a background task.
pub async fn connect(
    host: IpAddr,
    port: u16,
    maxcon: usize,
    db: Arc<Corestore>,
    signal: broadcast::Sender<()>,
) -> IoResult<Listener> {
    let climit = Arc::new(Semaphore::new(maxcon));
    let base = BaseListener::init(db, host, port, climit, signal).await?;
    log::info!("server started on {}:{}", base.listener.local_addr()?.ip(), port);
    Ok(Listener::new(base))
}
