// SPDX-License-Identifier: MIT
//! Stream records: typed metadata plus an owned payload

use bytes::Bytes;

use crate::format::{Compression, Encoding, MimeClass, StreamKind, FORMAT_VERSION, RECORD_HEADER_SIZE};
use crate::identity::{StreamId, Timestamp};

/// A single stream.
///
/// Records are built unattached (empty id, zero offset) and only receive an id
/// and a byte offset when a table accepts them.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub(crate) kind: StreamKind,
    pub(crate) format_version: String,
    pub(crate) id: StreamId,
    pub(crate) created_at: Timestamp,
    pub(crate) updated_at: Timestamp,
    pub(crate) position: [f64; 2],
    pub(crate) encoding: Encoding,
    pub(crate) mime_class: MimeClass,
    pub(crate) compression: Compression,
    pub(crate) byte_offset: u64,
    pub(crate) reading_index: u64,
    pub(crate) payload: Bytes,
}

impl StreamRecord {
    fn with_kind(kind: StreamKind, id: StreamId, payload: Bytes) -> Self {
        Self {
            kind,
            format_version: FORMAT_VERSION.to_string(),
            id,
            created_at: Timestamp::EPOCH,
            updated_at: Timestamp::EPOCH,
            position: [0.0, 0.0],
            encoding: Encoding::default(),
            mime_class: MimeClass::default(),
            compression: Compression::default(),
            byte_offset: 0,
            reading_index: 0,
            payload,
        }
    }

    /// Create an unattached data stream owning `payload`
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_kind(StreamKind::Data, StreamId::unassigned(), payload.into())
    }

    /// Empty reserved metadata record
    pub fn metadata() -> Self {
        Self::with_kind(StreamKind::Metadata, StreamId::metadata(), Bytes::new())
    }

    /// Empty reserved cross-reference record
    pub fn cross_reference() -> Self {
        Self::with_kind(StreamKind::CrossReference, StreamId::cross_reference(), Bytes::new())
    }

    /// An unattached data record carrying `id`, used as a removal target
    pub fn detached_with_id(id: StreamId) -> Self {
        Self::with_kind(StreamKind::Data, id, Bytes::new())
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = [x, y];
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_mime_class(mut self, mime_class: MimeClass) -> Self {
        self.mime_class = mime_class;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub(crate) fn stamp_created(&mut self, at: Timestamp) {
        self.created_at = at;
        self.updated_at = at;
    }

    /// Bytes this record occupies once serialized
    #[inline]
    pub fn serialized_size(&self) -> u64 {
        (RECORD_HEADER_SIZE + self.payload.len()) as u64
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn position(&self) -> [f64; 2] {
        self.position
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn mime_class(&self) -> MimeClass {
        self.mime_class
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    pub fn reading_index(&self) -> u64 {
        self.reading_index
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_attached(&self) -> bool {
        !self.id.is_unassigned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unattached() {
        let record = StreamRecord::new(b"hello".to_vec());
        assert_eq!(record.kind(), StreamKind::Data);
        assert!(!record.is_attached());
        assert_eq!(record.byte_offset(), 0);
        assert_eq!(record.format_version(), FORMAT_VERSION);
        assert_eq!(record.payload(), b"hello");
    }

    #[test]
    fn test_reserved_records_have_sentinels_and_no_payload() {
        let meta = StreamRecord::metadata();
        let xref = StreamRecord::cross_reference();
        assert_eq!(meta.id(), "0");
        assert_eq!(xref.id(), "1");
        assert_eq!(meta.payload_size(), 0);
        assert_eq!(xref.kind(), StreamKind::CrossReference);
    }

    #[test]
    fn test_serialized_size() {
        assert_eq!(StreamRecord::metadata().serialized_size(), RECORD_HEADER_SIZE as u64);
        assert_eq!(
            StreamRecord::new(vec![0u8; 10]).serialized_size(),
            RECORD_HEADER_SIZE as u64 + 10
        );
    }

    #[test]
    fn test_builder_fields() {
        let record = StreamRecord::new(Bytes::from_static(&[1, 2, 3]))
            .with_position(1.5, -2.0)
            .with_mime_class(MimeClass::Binary)
            .with_compression(Compression::Zip);
        assert_eq!(record.position(), [1.5, -2.0]);
        assert_eq!(record.mime_class(), MimeClass::Binary);
        assert_eq!(record.compression(), Compression::Zip);
        assert_eq!(record.encoding(), Encoding::Utf8);
    }

    #[test]
    fn test_stamp_sets_both_timestamps() {
        let mut record = StreamRecord::new(Vec::new());
        assert_eq!(record.created_at(), Timestamp::EPOCH);
        record.stamp_created(Timestamp::from_unix_seconds(10));
        assert_eq!(record.created_at().as_unix_seconds(), 10);
        assert_eq!(record.updated_at().as_unix_seconds(), 10);
    }
}
