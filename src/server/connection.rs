// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection buffered I/O and command pipelining.

use crate::codec::{self, Decoded, Frame};
use crate::dispatch::dispatch;
use crate::keyspace::Keyspace;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Bytes read into the staging buffer per `read()` call.
const READ_CHUNK: usize = 1024;

/// A connected client. Owns the per-connection pending-input buffer.
pub struct ClientConnection {
    stream: TcpStream,
    #[allow(dead_code)]
    peer_addr: SocketAddr,
    max_buffer_size: usize,
    buf: Vec<u8>,
}

impl ClientConnection {
    /// Create a new client connection.
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, max_buffer_size: usize) -> Self {
        Self {
            stream,
            peer_addr,
            max_buffer_size,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Get the peer address.
    #[allow(dead_code)]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run the read-decode-dispatch-write loop until the peer disconnects,
    /// a protocol error occurs, or a transport error occurs.
    pub async fn serve(&mut self, keyspace: &Keyspace) -> Result<(), ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(()); // EOF: peer closed gracefully
            }
            self.buf.extend_from_slice(&chunk[..n]);

            if self.buf.len() > self.max_buffer_size {
                self.write_frame(&Frame::error("ERR protocol error: buffer too large"))
                    .await
                    .ok();
                return Err(ConnectionError::Protocol(
                    "connection buffer exceeded maximum size".into(),
                ));
            }

            loop {
                match codec::decode(&self.buf) {
                    Decoded::Frame(frame, consumed) => {
                        self.buf.drain(..consumed);
                        let reply = Self::handle_frame(keyspace, frame);
                        self.write_frame(&reply).await?;
                    }
                    Decoded::NeedMore => break,
                    Decoded::Malformed => {
                        self.write_frame(&Frame::error("ERR protocol error"))
                            .await
                            .ok();
                        return Err(ConnectionError::Protocol("malformed RESP frame".into()));
                    }
                }
            }
        }
    }

    fn handle_frame(keyspace: &Keyspace, frame: Frame) -> Frame {
        let argv = match flatten_argv(frame) {
            Ok(argv) => argv,
            Err(reply) => return reply,
        };
        dispatch(keyspace, &argv)
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let bytes = codec::encode(frame);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Flatten a top-level `Array` frame into its byte-string arguments.
///
/// A non-Array top-level frame, a null array, or a non-bulk-string element
/// is a command error, not a protocol error: the connection stays open.
fn flatten_argv(frame: Frame) -> Result<Vec<Vec<u8>>, Frame> {
    let items = match frame {
        Frame::Array(Some(items)) => items,
        _ => return Err(Frame::error("ERR expected command array")),
    };

    let mut argv = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Frame::BulkString(Some(bytes)) => argv.push(bytes),
            _ => return Err(Frame::error("ERR expected bulk string argument")),
        }
    }
    Ok(argv)
}

/// Connection error types.
#[derive(Debug)]
pub enum ConnectionError {
    Io(String),
    Protocol(String),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Protocol(s) => write!(f, "protocol error: {}", s),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
