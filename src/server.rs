// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server core: accept loop, per-connection dispatch, and the active
//! expiration reaper.

use crate::config::ServerConfig;
use crate::keyspace::Keyspace;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod connection;

pub use connection::ClientConnection;

/// Interval between active-expiration reaper sweeps.
const REAPER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// The RESP key-value server.
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    keyspace: Arc<Keyspace>,
    shutdown: Arc<tokio::sync::Notify>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl Server {
    /// Create a new server from a validated configuration.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            keyspace: Arc::new(Keyspace::new()),
            shutdown: Arc::new(tokio::sync::Notify::new()),
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    /// Bind the listener, spawn the reaper, and accept connections until
    /// shutdown is signaled.
    pub async fn run(&self) -> Result<(), ServerError> {
        use std::sync::atomic::Ordering;
        use tokio::net::TcpListener;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        info!("respd listening on {}", addr);

        let keyspace = self.keyspace.clone();
        let reaper_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(REAPER_INTERVAL) => {
                        let reaped = keyspace.reap_once();
                        if reaped > 0 {
                            debug!("reaper removed {} expired key(s)", reaped);
                        }
                    }
                    _ = reaper_shutdown.notified() => {
                        debug!("reaper shutting down");
                        break;
                    }
                }
            }
        });

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            info!("new connection from {}", peer_addr);

                            let keyspace = self.keyspace.clone();
                            let max_buffer_size = self.config.max_buffer_size;

                            tokio::spawn(async move {
                                let mut conn = ClientConnection::new(stream, peer_addr, max_buffer_size);
                                match conn.serve(&keyspace).await {
                                    Ok(()) => info!("connection closed: {}", peer_addr),
                                    Err(e) => warn!("connection error from {}: {}", peer_addr, e),
                                }
                            });
                        }
                        Err(e) => warn!("accept error: {}", e),
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("shutdown signal received");
                    break Ok(());
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Signal the server (and its reaper) to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of entries currently held in the keyspace. For diagnostics,
    /// not part of the wire protocol.
    pub fn key_count(&self) -> usize {
        self.keyspace.len()
    }
}

/// Server error types.
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Bind(String),
    AlreadyRunning,
    Io(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "configuration error: {}", s),
            Self::Bind(s) => write!(f, "bind error: {}", s),
            Self::AlreadyRunning => write!(f, "server already running"),
            Self::Io(s) => write!(f, "I/O error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
