// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command dispatcher: maps a decoded command array onto keyspace
//! operations and produces a reply frame.
//!
//! Stateless between invocations - all state lives in the [`Keyspace`].

use crate::codec::Frame;
use crate::keyspace::{Keyspace, NotAnInteger};

/// Dispatch one already-flattened command array and produce a reply frame.
///
/// Always returns a well-formed reply frame; arity/command errors are
/// encoded as RESP `Error` frames rather than propagated as Rust errors.
pub fn dispatch(keyspace: &Keyspace, argv: &[Vec<u8>]) -> Frame {
    let Some(cmd) = argv.first() else {
        return Frame::error("ERR empty command");
    };
    let name = cmd.to_ascii_uppercase();

    match name.as_slice() {
        b"PING" => ping(&argv[1..]),
        b"ECHO" => echo(&argv[1..]),
        b"SET" => set(keyspace, &argv[1..]),
        b"GET" => get(keyspace, &argv[1..]),
        b"INCR" => incr(keyspace, &argv[1..]),
        b"DEL" => del(keyspace, &argv[1..]),
        b"TTL" => ttl(keyspace, &argv[1..]),
        b"EXISTS" => exists(keyspace, &argv[1..]),
        _ => Frame::error("ERR unknown command"),
    }
}

fn ping(args: &[Vec<u8>]) -> Frame {
    match args.len() {
        0 => Frame::simple("PONG"),
        1 => Frame::bulk(args[0].clone()),
        _ => Frame::error("ERR wrong number of arguments for 'ping' command"),
    }
}

fn echo(args: &[Vec<u8>]) -> Frame {
    match args {
        [arg] => Frame::bulk(arg.clone()),
        _ => Frame::error("ERR wrong number of arguments for 'echo' command"),
    }
}

fn set(keyspace: &Keyspace, args: &[Vec<u8>]) -> Frame {
    let ttl_secs = match args {
        [_key, _value] => 0u64,
        [_key, _value, opt, ttl] => {
            if !opt.eq_ignore_ascii_case(b"EX") {
                return Frame::error("ERR syntax error");
            }
            match parse_positive_ttl(ttl) {
                Some(secs) => secs,
                None => return Frame::error("ERR invalid expire time in 'set' command"),
            }
        }
        _ => return Frame::error("ERR wrong number of arguments for 'set' command"),
    };

    let key = args[0].clone();
    let value = args[1].clone();
    keyspace.set(key, value, ttl_secs);
    Frame::simple("OK")
}

/// Parses a TTL that must be a positive (`> 0`) decimal integer of seconds.
///
/// `n <= 0` is a command error, not a silently-ignored zero TTL.
fn parse_positive_ttl(bytes: &[u8]) -> Option<u64> {
    let s = std::str::from_utf8(bytes).ok()?;
    let n: i64 = s.parse().ok()?;
    if n > 0 {
        Some(n as u64)
    } else {
        None
    }
}

fn get(keyspace: &Keyspace, args: &[Vec<u8>]) -> Frame {
    match args {
        [key] => match keyspace.get(key) {
            Some(value) => Frame::bulk(value),
            None => Frame::null_bulk(),
        },
        _ => Frame::error("ERR wrong number of arguments for 'get' command"),
    }
}

fn incr(keyspace: &Keyspace, args: &[Vec<u8>]) -> Frame {
    match args {
        [key] => match keyspace.incr(key) {
            Ok(n) => Frame::Integer(n),
            Err(NotAnInteger) => Frame::error("ERR value is not an integer or out of range"),
        },
        _ => Frame::error("ERR wrong number of arguments for 'incr' command"),
    }
}

fn del(keyspace: &Keyspace, args: &[Vec<u8>]) -> Frame {
    if args.is_empty() {
        return Frame::error("ERR wrong number of arguments for 'del' command");
    }
    Frame::Integer(keyspace.del(args) as i64)
}

fn ttl(keyspace: &Keyspace, args: &[Vec<u8>]) -> Frame {
    match args {
        [key] => Frame::Integer(keyspace.ttl(key)),
        _ => Frame::error("ERR wrong number of arguments for 'ttl' command"),
    }
}

fn exists(keyspace: &Keyspace, args: &[Vec<u8>]) -> Frame {
    if args.is_empty() {
        return Frame::error("ERR wrong number of arguments for 'exists' command");
    }
    Frame::Integer(keyspace.exists(args) as i64)
}
