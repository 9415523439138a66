// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! respd
//!
//! A single-node, in-memory key-value server speaking RESP2:
//! - Local development caches and test fixtures
//! - Embedding a throwaway cache alongside a larger service
//! - Learning/experimenting with the wire protocol
//!
//! # Usage
//!
//! ```bash
//! # Start server on default port (6369)
//! respd
//!
//! # Custom port and config; flags override whatever the config file sets
//! respd --port 7000 --config respd.json
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod codec;
mod config;
mod dispatch;
mod keyspace;
mod server;

pub use config::ServerConfig;
pub use server::Server;

/// respd - a single-node, in-memory RESP2 key-value server
#[derive(Parser, Debug)]
#[command(name = "respd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on (overrides --config if both are given)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides --config if both are given)
    #[arg(short, long)]
    bind: Option<String>,

    /// Configuration file (JSON format); flags above override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum pending-input buffer size per connection, in bytes (overrides --config)
    #[arg(long)]
    max_buffer_size: Option<usize>,

    /// Log level: trace, debug, info, warn, error (overrides --config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config file (if any) fills in the base; explicitly-given flags then
    // override its fields one by one, so flags are always authoritative.
    let mut config = match &args.config {
        Some(config_path) => ServerConfig::from_file(config_path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_address = bind.parse()?;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_buffer_size) = args.max_buffer_size {
        config.max_buffer_size = max_buffer_size;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }

    let level = match config.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(config_path) = &args.config {
        info!("loaded config from {:?}", config_path);
    }

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;

    info!("+----------------------------------------------------+");
    info!(
        "|       respd v{}                               |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:        {:40} |", addr);
    info!(
        "|  Max buffer:  {:40} |",
        format!("{} bytes", config.max_buffer_size)
    );
    info!("+----------------------------------------------------+");

    let server = Server::new(config)?;

    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received, stopping server...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("respd stopped");
    Ok(())
}
