// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The in-memory keyspace: a concurrent key -> value map with TTL semantics
//! and a probabilistic background reaper.

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which representation of a value is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    String,
    Integer,
}

/// A single keyspace entry.
#[derive(Debug, Clone)]
struct Value {
    encoding: Encoding,
    str_val: Vec<u8>,
    int_val: i64,
    /// Absolute deadline in epoch milliseconds, or `0` for "no expiry".
    expires_at_ms: u64,
}

impl Value {
    fn from_string(bytes: Vec<u8>, expires_at_ms: u64) -> Self {
        Self {
            encoding: Encoding::String,
            str_val: bytes,
            int_val: 0,
            expires_at_ms,
        }
    }

    fn from_int(n: i64, expires_at_ms: u64) -> Self {
        Self {
            encoding: Encoding::Integer,
            str_val: Vec::new(),
            int_val: n,
            expires_at_ms,
        }
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms > 0 && now_ms >= self.expires_at_ms
    }

    /// Render the value as its canonical byte-string form. An integer-encoded
    /// value always renders as its decimal string.
    fn render(&self) -> Vec<u8> {
        match self.encoding {
            Encoding::String => self.str_val.clone(),
            Encoding::Integer => self.int_val.to_string().into_bytes(),
        }
    }
}

/// Result of an `incr` on a value that cannot be interpreted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotAnInteger;

impl fmt::Display for NotAnInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value is not an integer or out of range")
    }
}

impl std::error::Error for NotAnInteger {}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// The shared, concurrent keyspace.
///
/// A single reader-writer lock guards the map. Reads take the shared lock;
/// lazy expiration and all mutations take the exclusive lock.
pub struct Keyspace {
    map: RwLock<HashMap<Vec<u8>, Value>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Store `value` under `key`, overwriting any existing entry.
    ///
    /// `ttl_secs == 0` means no expiry.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl_secs: u64) {
        let expires_at_ms = if ttl_secs > 0 {
            now_ms() + ttl_secs * 1000
        } else {
            0
        };
        let mut map = self.map.write();
        map.insert(key, Value::from_string(value, expires_at_ms));
    }

    /// Look up `key`, applying lazy expiration. Returns the canonical
    /// rendering of the value (decimal string for integer-encoded values).
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = now_ms();
        {
            let map = self.map.read();
            match map.get(key) {
                None => return None,
                Some(v) if !v.is_expired(now) => return Some(v.render()),
                Some(_) => {} // expired: fall through to remove it
            }
        }
        let mut map = self.map.write();
        if let Some(v) = map.get(key) {
            if v.is_expired(now) {
                map.remove(key);
            } else {
                return Some(v.render());
            }
        }
        None
    }

    /// Increment the integer value stored at `key`, creating it at `1` if
    /// absent or expired. One atomic critical section.
    pub fn incr(&self, key: &[u8]) -> Result<i64, NotAnInteger> {
        let now = now_ms();
        let mut map = self.map.write();

        let live = map
            .get(key)
            .filter(|v| !v.is_expired(now));

        let (next, expires_at_ms) = match live {
            None => (1i64, 0u64),
            Some(v) => match v.encoding {
                Encoding::Integer => {
                    let next = v.int_val.checked_add(1).ok_or(NotAnInteger)?;
                    (next, v.expires_at_ms)
                }
                Encoding::String => {
                    let parsed = std::str::from_utf8(&v.str_val)
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or(NotAnInteger)?;
                    let next = parsed.checked_add(1).ok_or(NotAnInteger)?;
                    (next, v.expires_at_ms)
                }
            },
        };

        map.insert(key.to_vec(), Value::from_int(next, expires_at_ms));
        Ok(next)
    }

    /// Delete the given keys, returning the count of keys that were live
    /// (present and unexpired) immediately before removal.
    pub fn del(&self, keys: &[Vec<u8>]) -> u64 {
        let now = now_ms();
        let mut map = self.map.write();
        let mut count = 0;
        for key in keys {
            if let Some(v) = map.remove(key) {
                if !v.is_expired(now) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Seconds remaining before `key` expires: `-1` if it has no expiry,
    /// `-2` if it is absent (or already expired). Truncates toward zero.
    ///
    /// Like `get`, an expired entry is removed by the read that finds it
    /// rather than left for the reaper.
    pub fn ttl(&self, key: &[u8]) -> i64 {
        let now = now_ms();
        {
            let map = self.map.read();
            match map.get(key) {
                None => return -2,
                Some(v) if !v.is_expired(now) => {
                    return if v.expires_at_ms == 0 {
                        -1
                    } else {
                        ((v.expires_at_ms - now) / 1000) as i64
                    };
                }
                Some(_) => {} // expired: fall through to remove it
            }
        }
        let mut map = self.map.write();
        if let Some(v) = map.get(key) {
            if v.is_expired(now) {
                map.remove(key);
            }
        }
        -2
    }

    /// Count of the given keys that are currently live.
    pub fn exists(&self, keys: &[Vec<u8>]) -> u64 {
        let now = now_ms();
        let map = self.map.read();
        keys.iter()
            .filter(|k| map.get(k.as_slice()).is_some_and(|v| !v.is_expired(now)))
            .count() as u64
    }

    /// Number of entries currently in the map, including any not yet reaped
    /// expired entries. Exposed for metrics/tests, not part of the wire
    /// protocol.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One active-expiration sweep: sample up to 20% of the keys that carry
    /// an expiry and delete whichever of those are currently expired.
    ///
    /// Mirrors the "Powers of Two" probabilistic sweep: amortizes cleanup
    /// without scanning the whole map. The sample is built and consumed
    /// while holding the exclusive lock; no I/O happens under the lock.
    pub fn reap_once(&self) -> usize {
        let now = now_ms();
        let mut map = self.map.write();

        let mut with_ttl: Vec<Vec<u8>> = map
            .iter()
            .filter(|(_, v)| v.expires_at_ms > 0)
            .map(|(k, _)| k.clone())
            .collect();

        if with_ttl.is_empty() {
            return 0;
        }

        let sample_size = (with_ttl.len() as f64 * 0.2).floor() as usize;
        let sample_size = sample_size.min(with_ttl.len());

        let mut rng = rand::thread_rng();
        with_ttl.shuffle(&mut rng);
        with_ttl.truncate(sample_size);

        let mut reaped = 0;
        for key in with_ttl {
            if let Some(v) = map.get(&key) {
                if v.is_expired(now) {
                    map.remove(&key);
                    reaped += 1;
                }
            }
        }
        reaped
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn set_without_ttl_has_no_expiry() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("v"), 0);
        assert_eq!(ks.get(b"a"), Some(k("v")));
        assert_eq!(ks.ttl(b"a"), -1);
    }

    #[test]
    fn set_with_ttl_counts_down() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("v"), 10);
        let t = ks.ttl(b"a");
        assert!((9..=10).contains(&t), "ttl was {t}");
    }

    #[test]
    fn get_missing_key_is_none() {
        let ks = Keyspace::new();
        assert_eq!(ks.get(b"missing"), None);
        assert_eq!(ks.ttl(b"missing"), -2);
    }

    #[test]
    fn expired_key_is_lazily_invisible_and_removed_on_access() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("v"), 1);
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(ks.get(b"a"), None);
        assert_eq!(ks.len(), 0, "expired key must be removed by the read that found it");
    }

    #[test]
    fn expired_key_is_removed_by_ttl_probe_too() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("v"), 1);
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(ks.ttl(b"a"), -2);
        assert_eq!(ks.len(), 0, "expired key must be removed by the ttl probe that found it");
    }

    #[test]
    fn del_counts_only_live_keys() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("1"), 0);
        let deleted = ks.del(&[k("a"), k("b")]);
        assert_eq!(deleted, 1);
        assert_eq!(ks.get(b"a"), None);
    }

    #[test]
    fn incr_from_absence_counts_up() {
        let ks = Keyspace::new();
        for expected in 1..=3 {
            assert_eq!(ks.incr(b"c"), Ok(expected));
        }
    }

    #[test]
    fn incr_on_numeric_string_reencodes() {
        let ks = Keyspace::new();
        ks.set(k("n"), k("42"), 0);
        assert_eq!(ks.incr(b"n"), Ok(43));
        assert_eq!(ks.get(b"n"), Some(k("43")));
    }

    #[test]
    fn incr_on_non_numeric_string_fails_and_leaves_value_unchanged() {
        let ks = Keyspace::new();
        ks.set(k("s"), k("abc"), 0);
        assert_eq!(ks.incr(b"s"), Err(NotAnInteger));
        assert_eq!(ks.get(b"s"), Some(k("abc")));
    }

    #[test]
    fn incr_preserves_ttl_when_reencoding() {
        let ks = Keyspace::new();
        ks.set(k("n"), k("1"), 100);
        ks.incr(b"n").unwrap();
        let t = ks.ttl(b"n");
        assert!((99..=100).contains(&t), "ttl was {t}");
    }

    #[test]
    fn incr_overflow_is_not_an_integer() {
        let ks = Keyspace::new();
        ks.set(k("n"), i64::MAX.to_string().into_bytes(), 0);
        assert_eq!(ks.incr(b"n"), Err(NotAnInteger));
    }

    #[test]
    fn exists_counts_live_keys_only() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("1"), 0);
        assert_eq!(ks.exists(&[k("a"), k("b")]), 1);
    }

    #[test]
    fn reap_once_on_empty_map_is_noop() {
        let ks = Keyspace::new();
        assert_eq!(ks.reap_once(), 0);
    }

    #[test]
    fn reap_once_ignores_keys_without_ttl() {
        let ks = Keyspace::new();
        ks.set(k("a"), k("v"), 0);
        assert_eq!(ks.reap_once(), 0);
        assert_eq!(ks.len(), 1);
    }
}
