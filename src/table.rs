// SPDX-License-Identifier: MIT
//! Fixed-capacity stream table.
//!
//! Slots `0` and `1` hold the reserved metadata and cross-reference records;
//! every other slot holds a data stream or is empty. New records go to the
//! lowest empty slot. Removal clears the slot in place: nothing is compacted
//! and no other record's offset or reading index changes.
//!
//! All mutation happens under one read-write lock per table. `count` is
//! mirrored in an atomic so doomed adds and removals can be rejected without
//! waiting for the lock; the authoritative check is repeated under it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::config::TableConfig;
use crate::format::{StreamKind, FORMAT_VERSION};
use crate::identity::{IdentitySource, StreamId, Timestamp, UuidSource};
use crate::offset_index::{OffsetError, OffsetIndex, XrefEntry};
use crate::snapshot::{TableSnapshot, TableStats};
use crate::stream::StreamRecord;

/// Slots taken by the metadata and cross-reference records
pub const RESERVED_SLOTS: usize = 2;

/// Default number of ids drawn before giving up on a collision
pub const DEFAULT_ID_ATTEMPTS: usize = 8;

/// Errors returned by table operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("Could not allocate {slots} slots")]
    Allocation { slots: usize },

    #[error("Table is full ({capacity} slots)")]
    Full { capacity: usize },

    #[error("Stream already present: {0}")]
    AlreadyPresent(String),

    #[error("Stream is protected: {0}")]
    Protected(String),

    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Offset(#[from] OffsetError),
}

/// Table contents as decoded from bytes, before slots are allocated
#[derive(Debug)]
pub(crate) struct LoadedTable {
    pub id: StreamId,
    pub format_version: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub cross_reference_offset: u64,
    pub records: Vec<StreamRecord>,
}

struct TableState {
    updated_at: Timestamp,
    count: usize,
    slots: Vec<Option<StreamRecord>>,
    index: OffsetIndex,
}

impl TableState {
    fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn active(&self) -> impl Iterator<Item = &StreamRecord> {
        self.slots.iter().flatten()
    }

    fn data_slot_of(&self, id: &str) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|r| r.kind == StreamKind::Data && r.id == id)
        })
    }

    fn has_kind(&self, kind: StreamKind) -> bool {
        self.active().any(|r| r.kind == kind)
    }

    fn is_active_id(&self, id: &StreamId) -> bool {
        self.active().any(|r| &r.id == id)
    }

    fn touch(&mut self, at: Timestamp) {
        self.updated_at = self.updated_at.max(at);
    }
}

/// A document: fixed number of slots holding stream records
pub struct StreamTable {
    id: StreamId,
    format_version: String,
    created_at: Timestamp,
    capacity: usize,
    id_attempts: usize,
    count: AtomicUsize,
    identity: Arc<dyn IdentitySource>,
    state: RwLock<TableState>,
}

impl StreamTable {
    /// Create a table accepting `data_capacity` data streams, identified by UUIDs
    pub fn new(data_capacity: usize) -> Result<Self, TableError> {
        Self::with_identity(data_capacity, Arc::new(UuidSource::new()))
    }

    pub fn with_identity(
        data_capacity: usize,
        identity: Arc<dyn IdentitySource>,
    ) -> Result<Self, TableError> {
        Self::with_options(data_capacity, identity, DEFAULT_ID_ATTEMPTS)
    }

    pub fn from_config(config: &TableConfig) -> Result<Self, TableError> {
        Self::with_options(
            config.data_capacity,
            config.identity_source(),
            config.id_attempts,
        )
    }

    pub fn with_options(
        data_capacity: usize,
        identity: Arc<dyn IdentitySource>,
        id_attempts: usize,
    ) -> Result<Self, TableError> {
        let capacity = data_capacity
            .checked_add(RESERVED_SLOTS)
            .ok_or(TableError::Allocation { slots: usize::MAX })?;
        let slots = allocate_slots(capacity)?;

        let id = identity.next_id();
        let created_at = identity.now();
        let table = Self {
            id,
            format_version: FORMAT_VERSION.to_string(),
            created_at,
            capacity,
            id_attempts: id_attempts.max(1),
            count: AtomicUsize::new(0),
            identity,
            state: RwLock::new(TableState {
                updated_at: created_at,
                count: 0,
                slots,
                index: OffsetIndex::new(),
            }),
        };

        table.add(StreamRecord::metadata())?;
        table.add(StreamRecord::cross_reference())?;

        info!(table = %table.id, capacity, "Created stream table");
        Ok(table)
    }

    /// Rebuild a table from decoded contents, records landing in slots `0..n`
    pub(crate) fn from_loaded(
        loaded: LoadedTable,
        data_capacity: Option<usize>,
        identity: Arc<dyn IdentitySource>,
    ) -> Result<Self, TableError> {
        let count = loaded.records.len();
        let requested = match data_capacity {
            Some(n) => n
                .checked_add(RESERVED_SLOTS)
                .ok_or(TableError::Allocation { slots: usize::MAX })?,
            None => count,
        };
        if requested < count {
            return Err(TableError::Full { capacity: requested });
        }

        let mut slots = allocate_slots(requested)?;
        for (slot, record) in slots.iter_mut().zip(loaded.records) {
            *slot = Some(record);
        }

        Ok(Self {
            id: loaded.id,
            format_version: loaded.format_version,
            created_at: loaded.created_at,
            capacity: requested,
            id_attempts: DEFAULT_ID_ATTEMPTS,
            count: AtomicUsize::new(count),
            identity,
            state: RwLock::new(TableState {
                updated_at: loaded.updated_at,
                count,
                slots,
                index: OffsetIndex::at(loaded.cross_reference_offset),
            }),
        })
    }

    /// Insert `record` into the lowest empty slot and return its id.
    ///
    /// Data records get a freshly generated id that does not collide with any
    /// active record. A second metadata or cross-reference record is refused.
    pub fn add(&self, mut record: StreamRecord) -> Result<StreamId, TableError> {
        if self.count.load(Ordering::Acquire) >= self.capacity {
            debug!(table = %self.id, "Add rejected: table full");
            return Err(TableError::Full {
                capacity: self.capacity,
            });
        }

        let mut state = self.state.write();
        trace!(table = %self.id, "Write lock acquired for add");

        if state.count >= self.capacity {
            return Err(TableError::Full {
                capacity: self.capacity,
            });
        }

        match record.kind {
            StreamKind::Data => record.id = self.fresh_id(&state)?,
            kind => {
                if state.has_kind(kind) {
                    return Err(TableError::AlreadyPresent(record.id.to_string()));
                }
            }
        }

        let slot = state.first_free_slot().ok_or(TableError::Full {
            capacity: self.capacity,
        })?;
        let size = record.serialized_size();
        let now = self.identity.now();

        record.byte_offset = state.index.reserve(size)?;
        record.reading_index = state.count as u64;
        record.stamp_created(now);

        let id = record.id.clone();
        debug!(
            table = %self.id,
            stream = %id,
            kind = record.kind.name(),
            slot,
            offset = record.byte_offset,
            size,
            "Added stream"
        );

        state.slots[slot] = Some(record);
        state.count += 1;
        state.touch(now);
        self.count.store(state.count, Ordering::Release);
        Ok(id)
    }

    /// Remove the active data stream with this id, releasing its payload.
    ///
    /// Reserved records cannot be removed, and nothing can be removed once only
    /// the reserved records remain.
    pub fn remove(&self, id: &str) -> Result<(), TableError> {
        if id == StreamId::METADATA || id == StreamId::CROSS_REFERENCE {
            return Err(TableError::Protected(id.to_string()));
        }
        if self.count.load(Ordering::Acquire) <= RESERVED_SLOTS {
            return Err(TableError::Protected(id.to_string()));
        }

        let mut state = self.state.write();
        trace!(table = %self.id, "Write lock acquired for remove");

        if state.count <= RESERVED_SLOTS {
            return Err(TableError::Protected(id.to_string()));
        }

        let slot = state
            .data_slot_of(id)
            .ok_or_else(|| TableError::NotFound(id.to_string()))?;
        let size = state.slots[slot]
            .as_ref()
            .map(StreamRecord::serialized_size)
            .ok_or_else(|| TableError::NotFound(id.to_string()))?;

        state.index.release(size)?;
        let released = state.slots[slot].take();
        state.count -= 1;
        state.touch(self.identity.now());
        self.count.store(state.count, Ordering::Release);

        debug!(table = %self.id, stream = %id, slot, size, "Removed stream");
        drop(released);
        Ok(())
    }

    /// Remove by the id carried on `record`, which need not be the stored instance
    pub fn remove_record(&self, record: &StreamRecord) -> Result<(), TableError> {
        if record.kind.is_reserved() {
            return Err(TableError::Protected(record.id.to_string()));
        }
        self.remove(record.id.as_str())
    }

    /// Copy of any active record, reserved ones included.
    ///
    /// The payload is shared with the table, not duplicated. The lock is
    /// released before returning.
    pub fn find_by_id(&self, id: &str) -> Result<StreamRecord, TableError> {
        self.state
            .read()
            .active()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| TableError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().active().any(|r| r.id == id)
    }

    /// Ids of the active data streams in slot order
    pub fn ids(&self) -> Vec<StreamId> {
        self.state
            .read()
            .active()
            .filter(|r| r.kind == StreamKind::Data)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Slot index currently holding `id`
    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.state
            .read()
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|r| r.id == id))
    }

    /// Cross-reference rows for the active data streams
    pub fn xref_entries(&self) -> Vec<XrefEntry> {
        OffsetIndex::entries(self.state.read().active())
    }

    /// Consistent copy of the table; payloads are shared, not copied.
    ///
    /// The shared lock is held only while the slot array is cloned.
    pub fn snapshot(&self) -> TableSnapshot {
        let state = self.state.read();
        TableSnapshot {
            id: self.id.clone(),
            format_version: self.format_version.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
            capacity: self.capacity,
            cross_reference_offset: state.index.cursor(),
            records: state.active().cloned().collect(),
        }
    }

    pub fn stats(&self) -> TableStats {
        self.snapshot().stats()
    }

    fn fresh_id(&self, state: &TableState) -> Result<StreamId, TableError> {
        let mut last = StreamId::unassigned();
        for attempt in 1..=self.id_attempts {
            let candidate = self.identity.next_id();
            if !candidate.is_unassigned()
                && !candidate.is_reserved()
                && !state.is_active_id(&candidate)
            {
                return Ok(candidate);
            }
            warn!(
                table = %self.id,
                stream = %candidate,
                attempt,
                "Generated stream id collides, drawing another"
            );
            last = candidate;
        }
        Err(TableError::AlreadyPresent(last.to_string()))
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.state.read().updated_at
    }

    /// Total slots, reserved ones included
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn data_capacity(&self) -> usize {
        self.capacity - RESERVED_SLOTS
    }

    /// Occupied slots, reserved ones included
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn data_count(&self) -> usize {
        self.count().saturating_sub(RESERVED_SLOTS)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    pub fn cross_reference_offset(&self) -> u64 {
        self.state.read().index.cursor()
    }
}

fn allocate_slots(capacity: usize) -> Result<Vec<Option<StreamRecord>>, TableError> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| TableError::Allocation { slots: capacity })?;
    slots.resize_with(capacity, || None);
    Ok(slots)
}

impl fmt::Debug for StreamTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTable")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("count", &self.count())
            .field("cross_reference_offset", &self.cross_reference_offset())
            .finish_non_exhaustive()
    }
}

impl Drop for StreamTable {
    fn drop(&mut self) {
        trace!(table = %self.id, streams = self.count(), "Releasing stream table");
    }
}
