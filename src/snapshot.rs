// SPDX-License-Identifier: MIT
//! Point-in-time copies of a table, their statistics and the text dump

use std::fmt;

use serde::Serialize;

use crate::format::{MimeClass, StreamKind, RECORD_HEADER_SIZE, TABLE_HEADER_SIZE, TRAILER_SIZE};
use crate::identity::{StreamId, Timestamp};
use crate::offset_index::{OffsetIndex, XrefEntry};
use crate::stream::StreamRecord;
use crate::table::RESERVED_SLOTS;

/// Bytes shown at each end of a binary payload preview
const PREVIEW_BYTES: usize = 5;

/// Characters shown of a text payload
const PREVIEW_CHARS: usize = 48;

/// Consistent copy of a table: active records in slot order
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub id: StreamId,
    pub format_version: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub capacity: usize,
    pub cross_reference_offset: u64,
    pub records: Vec<StreamRecord>,
}

impl TableSnapshot {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn data_records(&self) -> impl Iterator<Item = &StreamRecord> {
        self.records.iter().filter(|r| r.kind() == StreamKind::Data)
    }

    pub fn xref_entries(&self) -> Vec<XrefEntry> {
        OffsetIndex::entries(&self.records)
    }

    /// Exact length of the serialized form
    pub fn encoded_size(&self) -> u64 {
        let records: u64 = self.records.iter().map(StreamRecord::serialized_size).sum();
        (TABLE_HEADER_SIZE + TRAILER_SIZE) as u64 + records
    }

    pub fn stats(&self) -> TableStats {
        let data_streams = self.data_records().count();
        TableStats {
            capacity: self.capacity,
            count: self.count(),
            data_streams,
            free_slots: self.capacity.saturating_sub(self.count()),
            payload_bytes: self.records.iter().map(|r| r.payload_size() as u64).sum(),
            cross_reference_offset: self.cross_reference_offset,
            encoded_size: self.encoded_size(),
        }
    }
}

/// Table statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub capacity: usize,
    pub count: usize,
    pub data_streams: usize,
    pub free_slots: usize,
    pub payload_bytes: u64,
    pub cross_reference_offset: u64,
    pub encoded_size: u64,
}

impl TableStats {
    /// Share of the encoded size taken by fixed headers rather than payload
    pub fn overhead_ratio(&self) -> f64 {
        if self.encoded_size == 0 {
            return 0.0;
        }
        let overhead = (TABLE_HEADER_SIZE + TRAILER_SIZE + RECORD_HEADER_SIZE * self.count) as f64;
        overhead / self.encoded_size as f64
    }
}

struct Preview<'a>(&'a StreamRecord);

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = self.0.payload();
        if payload.is_empty() {
            return f.write_str("<empty>");
        }

        if self.0.mime_class() == MimeClass::Text {
            if let Ok(text) = std::str::from_utf8(payload) {
                let shown: String = text.chars().take(PREVIEW_CHARS).collect();
                let more = if shown.len() < text.len() { "..." } else { "" };
                return write!(f, "{:?}{}", shown, more);
            }
        }

        let head = &payload[..payload.len().min(PREVIEW_BYTES)];
        for b in head {
            write!(f, "{:02x} ", b)?;
        }
        if payload.len() > PREVIEW_BYTES * 2 {
            write!(f, "...[{} bytes omitted]... ", payload.len() - PREVIEW_BYTES * 2)?;
            for b in &payload[payload.len() - PREVIEW_BYTES..] {
                write!(f, "{:02x} ", b)?;
            }
        } else {
            for b in &payload[head.len()..] {
                write!(f, "{:02x} ", b)?;
            }
        }
        Ok(())
    }
}

/// Human-readable dump of the document
impl fmt::Display for TableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "%%SPDF")?;
        writeln!(f, "  Version      {}", self.format_version)?;
        writeln!(f, "  ID           {}", self.id)?;
        writeln!(f, "  Created      {}", self.created_at)?;
        writeln!(f, "  Updated      {}", self.updated_at)?;
        writeln!(f, "  XRef Offset  {}", self.cross_reference_offset)?;
        writeln!(
            f,
            "  Data Streams {} / {}",
            self.data_records().count(),
            self.capacity.saturating_sub(RESERVED_SLOTS)
        )?;

        for record in self.data_records() {
            writeln!(f)?;
            writeln!(f, "=== STREAM {:03} ===", record.reading_index())?;
            writeln!(f, "  ID            {}", record.id())?;
            writeln!(f, "  Created       {}", record.created_at())?;
            writeln!(f, "  Updated       {}", record.updated_at())?;
            writeln!(f, "  Offset        {}", record.byte_offset())?;
            let [x, y] = record.position();
            writeln!(f, "  Position      ({:.2}, {:.2})", x, y)?;
            writeln!(
                f,
                "  Format        {:?} / {:?} / {:?}",
                record.encoding(),
                record.mime_class(),
                record.compression()
            )?;
            writeln!(f, "  Data Size     {}", record.payload_size())?;
            writeln!(f, "  Data          {}", Preview(record))?;
        }

        writeln!(f)?;
        writeln!(f, "=== XREF ===")?;
        for entry in self.xref_entries() {
            writeln!(
                f,
                "  {:03}: {} {}",
                entry.reading_index, entry.id, entry.byte_offset
            )?;
        }
        writeln!(f, "  Cross Reference Offset {}", self.cross_reference_offset)?;
        write!(f, "EOF%%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequenceSource;
    use crate::table::StreamTable;
    use std::sync::Arc;

    fn sample() -> StreamTable {
        let source = SequenceSource::new("d", Timestamp::from_unix_seconds(0));
        let table = StreamTable::with_identity(4, Arc::new(source)).unwrap();
        table.add(StreamRecord::new(b"Hello World!".to_vec())).unwrap();
        table
            .add(StreamRecord::new((0u8..16).collect::<Vec<_>>()).with_mime_class(MimeClass::Binary))
            .unwrap();
        table
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.capacity, 6);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.data_streams, 2);
        assert_eq!(stats.free_slots, 2);
        assert_eq!(stats.payload_bytes, 28);
        assert_eq!(
            stats.cross_reference_offset,
            4 * RECORD_HEADER_SIZE as u64 + 28
        );
        assert_eq!(
            stats.encoded_size,
            (TABLE_HEADER_SIZE + TRAILER_SIZE) as u64 + stats.cross_reference_offset
        );
        assert!(stats.overhead_ratio() > 0.9);
    }

    #[test]
    fn test_stats_serialize() {
        let json = serde_json::to_value(sample().stats()).unwrap();
        assert_eq!(json["data_streams"], 2);
        assert_eq!(json["free_slots"], 2);
    }

    #[test]
    fn test_dump_lists_streams_and_xref() {
        let dump = sample().snapshot().to_string();
        assert!(dump.starts_with("%%SPDF"));
        assert!(dump.ends_with("EOF%%"));
        assert!(dump.contains("ID           d0"));
        assert!(dump.contains("\"Hello World!\""));
        assert!(dump.contains("00 01 02 03 04 ...[6 bytes omitted]... 0b 0c 0d 0e 0f"));
        assert!(dump.contains("=== XREF ==="));
        assert!(dump.contains("  002: d1 216"));
        assert!(dump.contains("Data Streams 2 / 4"));
    }

    #[test]
    fn test_preview_short_binary() {
        let record = StreamRecord::new(vec![0xde, 0xad]).with_mime_class(MimeClass::Binary);
        assert_eq!(Preview(&record).to_string(), "de ad ");
        assert_eq!(Preview(&StreamRecord::new(Vec::new())).to_string(), "<empty>");
    }
}
