// SPDX-License-Identifier: MIT
//! Stream identifiers, timestamps and the sources that produce them

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::format::{FieldError, ID_WIDTH};

/// Identifier of a table or stream, at most [`ID_WIDTH`] printable ASCII bytes.
///
/// The empty id marks a record that has not been attached to a table yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    /// Sentinel id of the reserved metadata record
    pub const METADATA: &'static str = "0";

    /// Sentinel id of the reserved cross-reference record
    pub const CROSS_REFERENCE: &'static str = "1";

    pub fn new(value: impl Into<String>) -> Result<Self, FieldError> {
        let value = value.into();
        if value.len() > ID_WIDTH {
            return Err(FieldError::TooLong {
                field: "id",
                len: value.len(),
                max: ID_WIDTH,
            });
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(FieldError::NotPrintable { field: "id" });
        }
        Ok(Self(value))
    }

    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn metadata() -> Self {
        Self(Self::METADATA.to_string())
    }

    pub fn cross_reference() -> Self {
        Self(Self::CROSS_REFERENCE.to_string())
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }

    /// True for the metadata and cross-reference sentinels
    pub fn is_reserved(&self) -> bool {
        self.0 == Self::METADATA || self.0 == Self::CROSS_REFERENCE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StreamId {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl PartialEq<str> for StreamId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StreamId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Whole seconds since the Unix epoch, as stored on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0);

    pub fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    pub fn as_unix_seconds(&self) -> i64 {
        self.0
    }

    /// `None` when the value is outside chrono's representable range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "{}s", self.0),
        }
    }
}

/// Supplies fresh identifiers and the current time to a table.
///
/// `now` must never go backwards between calls on the same source.
pub trait IdentitySource: Send + Sync {
    fn next_id(&self) -> StreamId;

    fn now(&self) -> Timestamp;
}

/// Wall clock clamped so successive readings never decrease
#[derive(Debug, Default)]
struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    fn now(&self) -> Timestamp {
        let wall = Utc::now().timestamp();
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        Timestamp(prev.max(wall))
    }
}

/// Random v4 UUIDs in hyphenated form, which fill the id field exactly
#[derive(Debug, Default)]
pub struct UuidSource {
    clock: MonotonicClock,
}

impl UuidSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentitySource for UuidSource {
    fn next_id(&self) -> StreamId {
        StreamId(Uuid::new_v4().hyphenated().to_string())
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

/// Random tokens over `0-9A-Z`
#[derive(Debug)]
pub struct TokenSource {
    len: usize,
    clock: MonotonicClock,
}

impl TokenSource {
    pub const ALPHABET: &'static [u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// Token length leaving room for a terminator in the id field
    pub const DEFAULT_LEN: usize = ID_WIDTH - 1;

    pub fn new() -> Self {
        Self::with_len(Self::DEFAULT_LEN)
    }

    /// Lengths are clamped to `1..=ID_WIDTH`
    pub fn with_len(len: usize) -> Self {
        Self {
            len: len.clamp(1, ID_WIDTH),
            clock: MonotonicClock::default(),
        }
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for TokenSource {
    fn next_id(&self) -> StreamId {
        let mut rng = rand::rng();
        let token = (0..self.len)
            .map(|_| Self::ALPHABET[rng.random_range(0..Self::ALPHABET.len())] as char)
            .collect();
        StreamId(token)
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

/// Deterministic source: ids `<prefix><n>` and a clock that only moves when told.
///
/// Useful for reproducible dumps and tests.
#[derive(Debug)]
pub struct SequenceSource {
    prefix: String,
    next: AtomicU64,
    clock: AtomicI64,
}

impl SequenceSource {
    /// Characters of `prefix` that cannot appear in an id are dropped
    pub fn new(prefix: impl Into<String>, start: Timestamp) -> Self {
        let mut prefix: String = prefix
            .into()
            .chars()
            .filter(|c| c.is_ascii_graphic())
            .collect();
        prefix.truncate(ID_WIDTH - 1);
        Self {
            prefix,
            next: AtomicU64::new(0),
            clock: AtomicI64::new(start.as_unix_seconds()),
        }
    }

    /// Move the clock forward; moving it backwards is ignored
    pub fn advance_to(&self, at: Timestamp) {
        self.clock.fetch_max(at.as_unix_seconds(), Ordering::AcqRel);
    }

    pub fn advance_by(&self, seconds: i64) {
        self.clock.fetch_add(seconds.max(0), Ordering::AcqRel);
    }

    /// Rewind the id counter so the next ids repeat earlier ones
    pub fn rewind_ids(&self, to: u64) {
        self.next.store(to, Ordering::Release);
    }
}

impl Default for SequenceSource {
    fn default() -> Self {
        Self::new("S", Timestamp::EPOCH)
    }
}

impl IdentitySource for SequenceSource {
    fn next_id(&self) -> StreamId {
        let n = self.next.fetch_add(1, Ordering::AcqRel);
        let mut id = format!("{}{}", self.prefix, n);
        id.truncate(ID_WIDTH);
        StreamId(id)
    }

    fn now(&self) -> Timestamp {
        Timestamp(self.clock.load(Ordering::Acquire))
    }
}
