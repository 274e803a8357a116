// SPDX-License-Identifier: MIT
//! Serialization of a stream table to the SPDF layout
//!
//! The table is snapshotted first, so the lock is only held while the slot
//! array is copied; encoding and I/O run without it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::format::{
    put_fixed_str, FieldError, ID_WIDTH, RECORD_HEADER_SIZE, SPDF_FOOTER, SPDF_MAGIC,
    TABLE_HEADER_SIZE, TRAILER_SIZE, VERSION_WIDTH,
};
use crate::snapshot::TableSnapshot;
use crate::stream::StreamRecord;
use crate::table::StreamTable;

/// Errors that can occur during writing
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid field: {0}")]
    Field(#[from] FieldError),
}

/// Write `table` to `out`, returning the number of bytes written
pub fn serialize<W: Write>(table: &StreamTable, out: &mut W) -> Result<u64, WriteError> {
    write_snapshot(&table.snapshot(), out)
}

/// Serialize into a freshly allocated buffer of exactly the encoded size
pub fn to_vec(table: &StreamTable) -> Result<Vec<u8>, WriteError> {
    let snapshot = table.snapshot();
    let mut buffer = Vec::with_capacity(snapshot.encoded_size() as usize);
    write_snapshot(&snapshot, &mut buffer)?;
    Ok(buffer)
}

/// Write the table to `path` with one buffered pass and a final flush
pub fn save_to_file<P: AsRef<Path>>(table: &StreamTable, path: P) -> Result<u64, WriteError> {
    let path = path.as_ref();
    let mut out = BufWriter::new(File::create(path)?);
    let written = serialize(table, &mut out)?;
    out.flush()?;
    info!(table = %table.id(), path = %path.display(), bytes = written, "Saved stream table");
    Ok(written)
}

pub fn write_snapshot<W: Write>(snapshot: &TableSnapshot, out: &mut W) -> Result<u64, WriteError> {
    let mut header = Vec::with_capacity(TABLE_HEADER_SIZE.max(RECORD_HEADER_SIZE));
    encode_table_header(snapshot, &mut header)?;
    out.write_all(&header)?;
    let mut written = header.len() as u64;

    for record in &snapshot.records {
        header.clear();
        encode_record_header(record, &mut header)?;
        out.write_all(&header)?;
        if !record.payload().is_empty() {
            out.write_all(record.payload())?;
        }
        written += record.serialized_size();
    }

    out.write_all(&snapshot.cross_reference_offset.to_le_bytes())?;
    out.write_all(SPDF_FOOTER)?;
    written += TRAILER_SIZE as u64;

    debug!(
        table = %snapshot.id,
        records = snapshot.records.len(),
        bytes = written,
        "Serialized stream table"
    );
    debug_assert_eq!(written, snapshot.encoded_size());
    Ok(written)
}

/// Magic and table metadata block
pub(crate) fn encode_table_header(
    snapshot: &TableSnapshot,
    buffer: &mut Vec<u8>,
) -> Result<(), FieldError> {
    buffer.extend_from_slice(SPDF_MAGIC);
    put_fixed_str(buffer, "version", &snapshot.format_version, VERSION_WIDTH)?;
    put_fixed_str(buffer, "id", snapshot.id.as_str(), ID_WIDTH)?;
    buffer.extend_from_slice(&snapshot.created_at.as_unix_seconds().to_le_bytes());
    buffer.extend_from_slice(&snapshot.updated_at.as_unix_seconds().to_le_bytes());
    buffer.extend_from_slice(&snapshot.cross_reference_offset.to_le_bytes());
    buffer.extend_from_slice(&(snapshot.records.len() as u64).to_le_bytes());
    Ok(())
}

/// Fixed-width part of a stream record, payload excluded
pub(crate) fn encode_record_header(
    record: &StreamRecord,
    buffer: &mut Vec<u8>,
) -> Result<(), FieldError> {
    let start = buffer.len();
    buffer.push(record.kind().tag());
    put_fixed_str(buffer, "version", record.format_version(), VERSION_WIDTH)?;
    put_fixed_str(buffer, "id", record.id().as_str(), ID_WIDTH)?;
    buffer.extend_from_slice(&record.created_at().as_unix_seconds().to_le_bytes());
    buffer.extend_from_slice(&record.updated_at().as_unix_seconds().to_le_bytes());
    let [x, y] = record.position();
    buffer.extend_from_slice(&x.to_le_bytes());
    buffer.extend_from_slice(&y.to_le_bytes());
    buffer.push(record.encoding().tag());
    buffer.push(record.mime_class().tag());
    buffer.push(record.compression().tag());
    buffer.extend_from_slice(&record.byte_offset().to_le_bytes());
    buffer.extend_from_slice(&record.reading_index().to_le_bytes());
    buffer.extend_from_slice(&(record.payload_size() as u64).to_le_bytes());
    debug_assert_eq!(buffer.len() - start, RECORD_HEADER_SIZE);
    Ok(())
}
