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

//! # spd
//!
//! `spd` is an in-memory key-value server speaking the Serialization Protocol (SP). There are
//! several modules within this crate; see the modules for their respective documentation.

mod actions;
mod config;
mod corestore;
mod dbnet;
mod error;
mod protocol;
mod queryengine;
mod resp;

use corestore::Corestore;
use env_logger::Builder;
use libsky::util::terminal;
use libsky::VERSION;
use std::env;
use std::process;
use std::sync::Arc;
use tokio::signal;

#[cfg(not(any(target_env = "msvc", miri)))]
use jemallocator::Jemalloc;

#[cfg(not(any(target_env = "msvc", miri)))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() {
    Builder::new()
        .parse_filters(&env::var("SPD_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("configuration error: {e}");
            process::exit(0x100);
        }
    };
    println!("spd v{VERSION}");
    log::info!(
        "starting with {} shards, listening on {}:{}",
        cfg.shard_count,
        cfg.host,
        cfg.port
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("spd")
        .enable_all()
        .build()
        .expect("failed to start the async runtime");
    runtime.block_on(run(cfg));
    terminal::write_info("Goodbye :)\n").unwrap();
}

fn load_config() -> Result<config::ConfigurationSet, config::ConfigError> {
    let path = env::args().nth(1);
    config::load(path.as_deref())
}

const MAX_CONNECTIONS: usize = 50000;

async fn run(cfg: config::ConfigurationSet) {
    let db = Arc::new(Corestore::new(cfg.shard_count));
    let (signal_tx, _) = tokio::sync::broadcast::channel(1);
    let listener = match dbnet::connect(cfg.host, cfg.port, MAX_CONNECTIONS, db, signal_tx).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to bind {}:{}: {e}", cfg.host, cfg.port);
            process::exit(0x100);
        }
    };
    tokio::select! {
        res = listener.run() => {
            if let Err(e) = res {
                log::error!("accept loop exited with an error: {e}");
            }
        }
        _ = signal::ctrl_c() => {
            log::info!("received shutdown signal, waiting for connections to finish");
        }
    }
    listener.finish_with_termsig().await;
    log::info!("stopped accepting incoming connections");
}
