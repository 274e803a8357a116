// SPDX-License-Identifier: MIT
//! Running cross-reference offset.
//!
//! The cursor is the sum of the serialized sizes of all active records and is
//! only ever moved by the size of the record being added or removed. Offsets
//! already handed out are never reassigned, so removing from the middle of a
//! table leaves the remaining records where they were.

use crate::identity::StreamId;
use crate::stream::StreamRecord;

/// Bookkeeping failure: a delta would take the cursor out of `u64` range
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OffsetError {
    #[error("cross-reference offset overflow: {cursor} + {size}")]
    Overflow { cursor: u64, size: u64 },

    #[error("cross-reference offset underflow: {cursor} - {size}")]
    Underflow { cursor: u64, size: u64 },
}

/// One row of the cross-reference listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefEntry {
    pub reading_index: u64,
    pub id: StreamId,
    pub byte_offset: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetIndex {
    cursor: u64,
}

impl OffsetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously recorded cursor (used when loading)
    pub fn at(cursor: u64) -> Self {
        Self { cursor }
    }

    /// Current cross-reference offset: where the next record would begin
    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Hand out the current cursor as an offset and advance past `size` bytes
    pub fn reserve(&mut self, size: u64) -> Result<u64, OffsetError> {
        let offset = self.cursor;
        self.cursor = offset
            .checked_add(size)
            .ok_or(OffsetError::Overflow { cursor: offset, size })?;
        Ok(offset)
    }

    /// Give back `size` bytes; the cursor is untouched on error
    pub fn release(&mut self, size: u64) -> Result<(), OffsetError> {
        self.cursor = self.cursor.checked_sub(size).ok_or(OffsetError::Underflow {
            cursor: self.cursor,
            size,
        })?;
        Ok(())
    }

    /// Sum of serialized sizes, computed from scratch
    pub fn recomputed<'a>(records: impl IntoIterator<Item = &'a StreamRecord>) -> Option<u64> {
        records
            .into_iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.serialized_size()))
    }

    /// Cross-reference rows for the data records, ordered by byte offset
    pub fn entries<'a>(records: impl IntoIterator<Item = &'a StreamRecord>) -> Vec<XrefEntry> {
        let mut entries: Vec<XrefEntry> = records
            .into_iter()
            .filter(|r| !r.kind().is_reserved())
            .map(|r| XrefEntry {
                reading_index: r.reading_index(),
                id: r.id().clone(),
                byte_offset: r.byte_offset(),
            })
            .collect();
        entries.sort_by_key(|e| (e.byte_offset, e.reading_index));
        entries
    }
}
