// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RESP2 wire protocol: frame decoding and encoding.
//!
//! Simple length/tag-prefixed protocol, the same one spoken by the cache this
//! server is wire-compatible with.
//!
//! Wire format (each line terminated by CRLF):
//! ```text
//! +<text>\r\n              SimpleString
//! -<text>\r\n              Error
//! :<i64>\r\n               Integer
//! $<len>\r\n<bytes>\r\n    BulkString (or $-1\r\n for null)
//! *<n>\r\n<frame>...       Array of n frames (or *-1\r\n for null)
//! ```

/// Maximum array nesting depth accepted from the wire.
///
/// Bounds stack usage while decoding a maliciously deep `*...*...*...` frame.
const MAX_DEPTH: usize = 128;

/// One complete RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SimpleString(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    /// `None` is the null bulk string (`$-1\r\n`).
    BulkString(Option<Vec<u8>>),
    /// `None` is the null array (`*-1\r\n`).
    Array(Option<Vec<Frame>>),
}

impl Frame {
    pub fn simple(text: impl Into<Vec<u8>>) -> Self {
        Frame::SimpleString(text.into())
    }

    pub fn error(text: impl Into<Vec<u8>>) -> Self {
        Frame::Error(text.into())
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Frame::BulkString(Some(bytes.into()))
    }

    pub fn null_bulk() -> Self {
        Frame::BulkString(None)
    }

    pub fn array(items: Vec<Frame>) -> Self {
        Frame::Array(Some(items))
    }
}

/// Outcome of a decode attempt against a buffer prefix.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame, plus the number of bytes of `buf` it consumed.
    Frame(Frame, usize),
    /// `buf` is a valid, possibly-extensible prefix of a frame.
    NeedMore,
    /// No extension of `buf` can form a valid frame at position 0.
    Malformed,
}

/// Attempt to decode one frame from the start of `buf`.
///
/// Non-destructive: never mutates or consumes `buf` itself. The caller is
/// expected to advance its own buffer by the returned `consumed` on success.
pub fn decode(buf: &[u8]) -> Decoded {
    decode_at_depth(buf, 0)
}

fn decode_at_depth(buf: &[u8], depth: usize) -> Decoded {
    if depth > MAX_DEPTH {
        return Decoded::Malformed;
    }
    let Some(&tag) = buf.first() else {
        return Decoded::NeedMore;
    };

    match tag {
        b'+' => match decode_line(buf) {
            Ok((line, consumed)) => Decoded::Frame(Frame::SimpleString(line.to_vec()), consumed),
            Err(d) => d,
        },
        b'-' => match decode_line(buf) {
            Ok((line, consumed)) => Decoded::Frame(Frame::Error(line.to_vec()), consumed),
            Err(d) => d,
        },
        b':' => match decode_line(buf) {
            Ok((line, consumed)) => match parse_i64(line) {
                Some(n) => Decoded::Frame(Frame::Integer(n), consumed),
                None => Decoded::Malformed,
            },
            Err(d) => d,
        },
        b'$' => decode_bulk(buf),
        b'*' => decode_array(buf, depth),
        _ => Decoded::Malformed,
    }
}

/// Find a CRLF-terminated line after the 1-byte tag.
///
/// Returns the line contents (without tag or CRLF) and the total bytes
/// consumed (tag + line + CRLF), or `Err(Decoded::NeedMore/Malformed)`.
fn decode_line(buf: &[u8]) -> Result<(&[u8], usize), Decoded> {
    let body = &buf[1..];
    match find_crlf(body) {
        Some(idx) => {
            let line = &body[..idx];
            if line.iter().any(|&b| b == b'\r' || b == b'\n') {
                return Err(Decoded::Malformed);
            }
            Ok((line, 1 + idx + 2))
        }
        None => Err(Decoded::NeedMore),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse a signed decimal integer with the strictness the grammar demands:
/// no leading `+`, no leading zeros beyond a bare `0`, optional single `-`.
fn parse_i64(text: &[u8]) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    let s = std::str::from_utf8(text).ok()?;
    if s.starts_with('+') {
        return None;
    }
    s.parse::<i64>().ok()
}

/// Parse a non-negative (or exactly `-1`) decimal length field.
fn parse_len(text: &[u8]) -> Option<i64> {
    if text == b"-1" {
        return Some(-1);
    }
    let s = std::str::from_utf8(text).ok()?;
    if s.starts_with('+') || s.starts_with('-') {
        return None;
    }
    s.parse::<i64>().ok()
}

fn decode_bulk(buf: &[u8]) -> Decoded {
    let body = &buf[1..];
    let Some(idx) = find_crlf(body) else {
        return Decoded::NeedMore;
    };
    let len_field = &body[..idx];
    let Some(len) = parse_len(len_field) else {
        return Decoded::Malformed;
    };
    let header_len = 1 + idx + 2;

    if len == -1 {
        return Decoded::Frame(Frame::BulkString(None), header_len);
    }
    if len < 0 {
        return Decoded::Malformed;
    }
    let len = len as usize;

    let payload_start = header_len;
    let payload_end = payload_start + len;
    if buf.len() < payload_end + 2 {
        return Decoded::NeedMore;
    }
    if &buf[payload_end..payload_end + 2] != b"\r\n" {
        return Decoded::Malformed;
    }

    let payload = buf[payload_start..payload_end].to_vec();
    Decoded::Frame(Frame::BulkString(Some(payload)), payload_end + 2)
}

fn decode_array(buf: &[u8], depth: usize) -> Decoded {
    let body = &buf[1..];
    let Some(idx) = find_crlf(body) else {
        return Decoded::NeedMore;
    };
    let len_field = &body[..idx];
    let Some(n) = parse_len(len_field) else {
        return Decoded::Malformed;
    };
    let mut consumed = 1 + idx + 2;

    if n == -1 {
        return Decoded::Frame(Frame::Array(None), consumed);
    }
    if n < 0 {
        return Decoded::Malformed;
    }

    let mut items = Vec::with_capacity(n as usize);
    for _ in 0..n {
        match decode_at_depth(&buf[consumed..], depth + 1) {
            Decoded::Frame(f, used) => {
                items.push(f);
                consumed += used;
            }
            Decoded::NeedMore => return Decoded::NeedMore,
            Decoded::Malformed => return Decoded::Malformed,
        }
    }

    Decoded::Frame(Frame::Array(Some(items)), consumed)
}

/// Encode a frame to its wire representation. Total for all well-formed
/// frames; the inverse of `decode`.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(frame, &mut out);
    out
}

fn encode_into(frame: &Frame, out: &mut Vec<u8>) {
    match frame {
        Frame::SimpleString(s) => {
            out.push(b'+');
            out.extend_from_slice(s);
            out.extend_from_slice(b"\r\n");
        }
        Frame::Error(s) => {
            out.push(b'-');
            out.extend_from_slice(s);
            out.extend_from_slice(b"\r\n");
        }
        Frame::Integer(n) => {
            out.push(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Frame::BulkString(None) => out.extend_from_slice(b"$-1\r\n"),
        Frame::BulkString(Some(bytes)) => {
            out.push(b'$');
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        Frame::Array(None) => out.extend_from_slice(b"*-1\r\n"),
        Frame::Array(Some(items)) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_into(item, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(frame: Frame) {
        let encoded = encode(&frame);
        match decode(&encoded) {
            Decoded::Frame(decoded, consumed) => {
                assert_eq!(decoded, frame);
                assert_eq!(consumed, encoded.len());
            }
            other => panic!("expected complete frame, got {:?}", other),
        }
    }

    #[test]
    fn roundtrip_simple_string() {
        assert_roundtrip(Frame::simple("PONG"));
    }

    #[test]
    fn roundtrip_error() {
        assert_roundtrip(Frame::error("ERR unknown command"));
    }

    #[test]
    fn roundtrip_integer() {
        assert_roundtrip(Frame::Integer(0));
        assert_roundtrip(Frame::Integer(-1));
        assert_roundtrip(Frame::Integer(i64::MAX));
        assert_roundtrip(Frame::Integer(i64::MIN));
    }

    #[test]
    fn roundtrip_bulk_string() {
        assert_roundtrip(Frame::bulk("hello"));
        assert_roundtrip(Frame::bulk(vec![]));
        assert_roundtrip(Frame::bulk(vec![0x00, b'\r', b'\n', 0xff]));
    }

    #[test]
    fn roundtrip_null_bulk() {
        assert_roundtrip(Frame::null_bulk());
    }

    #[test]
    fn roundtrip_array() {
        assert_roundtrip(Frame::array(vec![
            Frame::bulk("SET"),
            Frame::bulk("k"),
            Frame::bulk("v"),
        ]));
        assert_roundtrip(Frame::Array(None));
        assert_roundtrip(Frame::array(vec![]));
    }

    #[test]
    fn roundtrip_nested_array() {
        assert_roundtrip(Frame::array(vec![
            Frame::array(vec![Frame::Integer(1), Frame::Integer(2)]),
            Frame::bulk("x"),
        ]));
    }

    #[test]
    fn resumability_every_prefix_needs_more() {
        let frame = Frame::array(vec![Frame::bulk("ECHO"), Frame::bulk("hello")]);
        let encoded = encode(&frame);
        for k in 0..encoded.len() {
            assert_eq!(
                decode(&encoded[..k]),
                Decoded::NeedMore,
                "prefix of length {k} should need more"
            );
        }
    }

    #[test]
    fn prefix_safety_trailing_garbage_not_consumed() {
        let frame = Frame::simple("OK");
        let mut encoded = encode(&frame);
        let expected_len = encoded.len();
        encoded.extend_from_slice(b"garbage-that-follows");
        match decode(&encoded) {
            Decoded::Frame(decoded, consumed) => {
                assert_eq!(decoded, frame);
                assert_eq!(consumed, expected_len);
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn depth_bound_rejects_excessive_nesting() {
        let mut buf = Vec::new();
        for _ in 0..=MAX_DEPTH {
            buf.extend_from_slice(b"*1\r\n");
        }
        buf.extend_from_slice(b":1\r\n");
        assert_eq!(decode(&buf), Decoded::Malformed);
    }

    #[test]
    fn missing_trailing_crlf_after_bulk_is_malformed() {
        assert_eq!(decode(b"$3\r\nabcXY"), Decoded::Malformed);
    }

    #[test]
    fn bulk_payload_not_yet_arrived_needs_more() {
        assert_eq!(decode(b"$5\r\nhel"), Decoded::NeedMore);
    }

    #[test]
    fn unknown_leading_byte_is_malformed() {
        assert_eq!(decode(b"!hello\r\n"), Decoded::Malformed);
    }

    #[test]
    fn leading_plus_sign_forbidden_on_integer() {
        assert_eq!(decode(b":+5\r\n"), Decoded::Malformed);
    }

    #[test]
    fn bare_minus_forbidden_in_length_field() {
        assert_eq!(decode(b"$-2\r\n"), Decoded::Malformed);
        assert_eq!(decode(b"*-2\r\n"), Decoded::Malformed);
    }

    #[test]
    fn array_child_needs_more_propagates_with_zero_consumed() {
        // *2\r\n$3\r\nfoo\r\n  (second element not yet arrived)
        assert_eq!(decode(b"*2\r\n$3\r\nfoo\r\n"), Decoded::NeedMore);
    }

    #[test]
    fn array_child_malformed_propagates() {
        assert_eq!(decode(b"*1\r\n!bad\r\n"), Decoded::Malformed);
    }

    #[test]
    fn empty_buffer_needs_more() {
        assert_eq!(decode(b""), Decoded::NeedMore);
    }
}
