// SPDX-License-Identifier: MIT
//! Deserialization of SPDF bytes back into a stream table

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::format::{
    Compression, Encoding, FieldCursor, FieldError, MimeClass, StreamKind, ID_WIDTH,
    RECORD_HEADER_SIZE, SPDF_FOOTER, SPDF_MAGIC, TABLE_HEADER_SIZE, VERSION_WIDTH, WORD_WIDTH,
};
use crate::identity::{IdentitySource, StreamId, Timestamp, UuidSource};
use crate::offset_index::OffsetIndex;
use crate::stream::StreamRecord;
use crate::table::{LoadedTable, StreamTable, TableError, RESERVED_SLOTS};

/// Upper bound on records reserved up front; the rest grow as they are read
const MAX_PREALLOCATED_RECORDS: usize = 1024;

/// Errors that can occur during reading
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<FieldError> for ReadError {
    fn from(err: FieldError) -> Self {
        ReadError::CorruptData(err.to_string())
    }
}

impl ReadError {
    fn corrupt(message: impl Into<String>) -> Self {
        ReadError::CorruptData(message.into())
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, ReadError::CorruptData(_))
    }
}

/// Fill `buffer` completely; running out of input means the data is corrupt
fn read_block<R: Read>(input: &mut R, buffer: &mut [u8], what: &str) -> Result<(), ReadError> {
    input.read_exact(buffer).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ReadError::corrupt(format!("truncated {}", what)),
        _ => ReadError::Io(e),
    })
}

/// Reader for serialized stream tables
pub struct TableReader {
    data_capacity: Option<usize>,
    identity: Arc<dyn IdentitySource>,
}

impl TableReader {
    /// Loaded tables are sized to exactly the records they contain
    pub fn new() -> Self {
        Self {
            data_capacity: None,
            identity: Arc::new(UuidSource::new()),
        }
    }

    /// Leave room for `data_capacity` data streams in the loaded table
    pub fn with_data_capacity(mut self, data_capacity: usize) -> Self {
        self.data_capacity = Some(data_capacity);
        self
    }

    /// Identity source used for streams added after loading
    pub fn with_identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = identity;
        self
    }

    pub fn read<R: Read>(&self, input: &mut R) -> Result<StreamTable, ReadError> {
        let mut magic = [0u8; SPDF_MAGIC.len()];
        read_block(input, &mut magic, "magic header")?;
        if &magic != SPDF_MAGIC {
            return Err(ReadError::corrupt(format!(
                "invalid magic header: {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }

        let mut block = [0u8; TABLE_HEADER_SIZE - SPDF_MAGIC.len()];
        read_block(input, &mut block, "table header")?;
        let mut cursor = FieldCursor::new(&block);
        let format_version = cursor.str("version", VERSION_WIDTH)?;
        let id = StreamId::new(cursor.str("id", ID_WIDTH)?)?;
        let created_at = Timestamp::from_unix_seconds(cursor.i64());
        let updated_at = Timestamp::from_unix_seconds(cursor.i64());
        let cross_reference_offset = cursor.u64();
        let declared = cursor.u64();
        debug_assert_eq!(cursor.consumed(), block.len());

        let count = usize::try_from(declared)
            .map_err(|_| ReadError::corrupt(format!("record count {} out of range", declared)))?;
        if count < RESERVED_SLOTS {
            return Err(ReadError::corrupt(format!(
                "record count {} is below the {} reserved records",
                count, RESERVED_SLOTS
            )));
        }
        if let Some(data_capacity) = self.data_capacity {
            if count - RESERVED_SLOTS > data_capacity {
                return Err(ReadError::corrupt(format!(
                    "{} data streams exceed requested capacity {}",
                    count - RESERVED_SLOTS,
                    data_capacity
                )));
            }
        }

        let mut records = Vec::with_capacity(count.min(MAX_PREALLOCATED_RECORDS));
        for slot in 0..count {
            records.push(read_record(input, slot)?);
        }

        let mut trailer = [0u8; WORD_WIDTH];
        read_block(input, &mut trailer, "cross-reference trailer")?;
        let trailer = u64::from_le_bytes(trailer);
        if trailer != cross_reference_offset {
            return Err(ReadError::corrupt(format!(
                "trailer offset {} does not match header offset {}",
                trailer, cross_reference_offset
            )));
        }

        let mut footer = [0u8; SPDF_FOOTER.len()];
        read_block(input, &mut footer, "footer")?;
        if &footer != SPDF_FOOTER {
            return Err(ReadError::corrupt("missing EOF%% footer"));
        }

        validate_records(&records, cross_reference_offset)?;

        let loaded = LoadedTable {
            id,
            format_version,
            created_at,
            updated_at,
            cross_reference_offset,
            records,
        };
        let table = StreamTable::from_loaded(loaded, self.data_capacity, Arc::clone(&self.identity))?;
        debug!(table = %table.id(), records = count, "Deserialized stream table");
        Ok(table)
    }

    pub fn from_slice(&self, mut data: &[u8]) -> Result<StreamTable, ReadError> {
        self.read(&mut data)
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<StreamTable, ReadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(ReadError::Io)?;
        let table = self.read(&mut BufReader::new(file))?;
        info!(table = %table.id(), path = %path.display(), "Loaded stream table");
        Ok(table)
    }
}

impl Default for TableReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a table sized to the records it contains
pub fn deserialize<R: Read>(input: &mut R) -> Result<StreamTable, ReadError> {
    TableReader::new().read(input)
}

/// Read a table with room for `data_capacity` data streams
pub fn deserialize_with_capacity<R: Read>(
    input: &mut R,
    data_capacity: usize,
) -> Result<StreamTable, ReadError> {
    TableReader::new().with_data_capacity(data_capacity).read(input)
}

pub fn from_slice(data: &[u8]) -> Result<StreamTable, ReadError> {
    TableReader::new().from_slice(data)
}

pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<StreamTable, ReadError> {
    TableReader::new().load_file(path)
}

fn read_record<R: Read>(input: &mut R, slot: usize) -> Result<StreamRecord, ReadError> {
    let mut block = [0u8; RECORD_HEADER_SIZE];
    read_block(input, &mut block, "stream header")?;
    let mut cursor = FieldCursor::new(&block);

    let kind = StreamKind::try_from(cursor.u8())?;
    let format_version = cursor.str("version", VERSION_WIDTH)?;
    let id = StreamId::new(cursor.str("id", ID_WIDTH)?)?;
    let created_at = Timestamp::from_unix_seconds(cursor.i64());
    let updated_at = Timestamp::from_unix_seconds(cursor.i64());
    let position = [cursor.f64(), cursor.f64()];
    let encoding = Encoding::try_from(cursor.u8())?;
    let mime_class = MimeClass::try_from(cursor.u8())?;
    let compression = Compression::try_from(cursor.u8())?;
    let byte_offset = cursor.u64();
    let reading_index = cursor.u64();
    let payload_size = cursor.u64();
    debug_assert_eq!(cursor.consumed(), RECORD_HEADER_SIZE);

    // take() bounds the allocation by what the input actually holds
    let mut payload = Vec::new();
    input
        .by_ref()
        .take(payload_size)
        .read_to_end(&mut payload)
        .map_err(ReadError::Io)?;
    if payload.len() as u64 != payload_size {
        return Err(ReadError::corrupt(format!(
            "stream {} in slot {} declares {} payload bytes, found {}",
            id,
            slot,
            payload_size,
            payload.len()
        )));
    }

    Ok(StreamRecord {
        kind,
        format_version,
        id,
        created_at,
        updated_at,
        position,
        encoding,
        mime_class,
        compression,
        byte_offset,
        reading_index,
        payload: Bytes::from(payload),
    })
}

/// Structural checks a freshly built table would always satisfy
fn validate_records(records: &[StreamRecord], cross_reference_offset: u64) -> Result<(), ReadError> {
    if records[0].kind != StreamKind::Metadata {
        return Err(ReadError::corrupt("slot 0 does not hold the metadata record"));
    }
    if records[1].kind != StreamKind::CrossReference {
        return Err(ReadError::corrupt(
            "slot 1 does not hold the cross-reference record",
        ));
    }
    let sentinels = [StreamId::METADATA, StreamId::CROSS_REFERENCE];
    for (slot, sentinel) in sentinels.into_iter().enumerate() {
        if records[slot].id != sentinel {
            return Err(ReadError::corrupt(format!(
                "reserved record in slot {} has id {:?}, expected {:?}",
                slot,
                records[slot].id.as_str(),
                sentinel
            )));
        }
    }

    let mut seen = HashSet::with_capacity(records.len());
    for (slot, record) in records.iter().enumerate().skip(RESERVED_SLOTS) {
        if record.kind != StreamKind::Data {
            return Err(ReadError::corrupt(format!(
                "slot {} holds a second {} record",
                slot,
                record.kind.name()
            )));
        }
        if record.id.is_unassigned() || record.id.is_reserved() {
            return Err(ReadError::corrupt(format!(
                "slot {} holds a data stream with invalid id {:?}",
                slot,
                record.id.as_str()
            )));
        }
        if !seen.insert(record.id.as_str()) {
            return Err(ReadError::corrupt(format!("duplicate stream id {}", record.id)));
        }
    }

    let expected = OffsetIndex::recomputed(records)
        .ok_or_else(|| ReadError::corrupt("record sizes overflow the offset range"))?;
    if expected != cross_reference_offset {
        return Err(ReadError::corrupt(format!(
            "cross-reference offset {} does not match record sizes {}",
            cross_reference_offset, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequenceSource;
    use crate::writer;

    fn encoded() -> Vec<u8> {
        let source = SequenceSource::new("r", Timestamp::from_unix_seconds(1_700_000_000));
        let table = StreamTable::with_identity(3, Arc::new(source)).unwrap();
        table.add(StreamRecord::new(b"first".to_vec())).unwrap();
        table
            .add(StreamRecord::new(vec![9u8; 10]).with_position(3.0, 4.0))
            .unwrap();
        writer::to_vec(&table).unwrap()
    }

    #[test]
    fn test_read_back() {
        let table = from_slice(&encoded()).unwrap();
        assert_eq!(table.count(), 4);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.id(), "r0");
        assert_eq!(table.find_by_id("r1").unwrap().payload(), b"first");
        assert_eq!(table.find_by_id("r2").unwrap().position(), [3.0, 4.0]);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = encoded();
        data[0] = b'#';
        let err = from_slice(&data).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_missing_footer() {
        let mut data = encoded();
        data.truncate(data.len() - 5);
        assert!(from_slice(&data).unwrap_err().is_corrupt());

        let mut data = encoded();
        let last = data.len() - 1;
        data[last] = b'X';
        assert!(from_slice(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_every_truncation_is_corrupt() {
        let data = encoded();
        for len in 0..data.len() {
            let err = from_slice(&data[..len]).unwrap_err();
            assert!(err.is_corrupt(), "truncated at {} gave {:?}", len, err);
        }
    }

    #[test]
    fn test_trailer_mismatch() {
        let mut data = encoded();
        let at = data.len() - 13;
        data[at] ^= 0xFF;
        assert!(from_slice(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_unknown_kind_tag() {
        let mut data = encoded();
        data[TABLE_HEADER_SIZE] = 7;
        let err = from_slice(&data).unwrap_err();
        assert!(matches!(err, ReadError::CorruptData(msg) if msg.contains("stream kind")));
    }

    #[test]
    fn test_forged_payload_size_does_not_allocate() {
        let mut data = encoded();
        let size_at = TABLE_HEADER_SIZE + RECORD_HEADER_SIZE - WORD_WIDTH;
        data[size_at..size_at + WORD_WIDTH].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(from_slice(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_count_below_reserved() {
        let mut data = encoded();
        let count_at = TABLE_HEADER_SIZE - WORD_WIDTH;
        data[count_at..TABLE_HEADER_SIZE].copy_from_slice(&1u64.to_le_bytes());
        assert!(from_slice(&data).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_capacity_too_small() {
        let data = encoded();
        let err = deserialize_with_capacity(&mut data.as_slice(), 1).unwrap_err();
        assert!(err.is_corrupt());

        let table = deserialize_with_capacity(&mut data.as_slice(), 3).unwrap();
        assert_eq!(table.capacity(), 5);
        assert!(!table.is_full());
    }

    #[test]
    fn test_swapped_reserved_records() {
        let mut data = encoded();
        data[TABLE_HEADER_SIZE] = StreamKind::CrossReference.tag();
        let err = from_slice(&data).unwrap_err();
        assert!(matches!(err, ReadError::CorruptData(msg) if msg.contains("slot 0")));
    }

    #[test]
    fn test_reserved_record_with_foreign_id() {
        let id_at = TABLE_HEADER_SIZE + 1 + VERSION_WIDTH;
        for record_at in [0, RECORD_HEADER_SIZE] {
            let mut data = encoded();
            data[id_at + record_at] = b'7';
            let err = from_slice(&data).unwrap_err();
            assert!(
                matches!(&err, ReadError::CorruptData(msg) if msg.contains("reserved record")),
                "{:?}",
                err
            );
        }
    }
}
