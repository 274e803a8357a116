// SPDX-License-Identifier: MIT
//! # SPDF Stream Table
//!
//! A fixed-capacity container of binary streams with a linear on-disk layout.
//!
//! ## Overview
//!
//! A [`StreamTable`] holds a fixed number of slots. Slot 0 always holds the
//! document's metadata record and slot 1 its cross-reference record; the rest
//! hold caller-supplied data streams. Each accepted stream gets a generated id
//! and the byte offset it will occupy once serialized.
//!
//! - **First-fit slots**: new streams take the lowest empty slot
//! - **No compaction**: removal clears a slot in place; other offsets stay put
//! - **One lock per table**: mutations are exclusive, lookups shared
//! - **Exact round-trip**: the codec restores every field and payload byte
//!
//! ## Format Specification
//!
//! ```text
//! SPDF Format v000.000.001 (integers little-endian)
//! =================================================
//!
//! Table header (86 bytes):
//! - Magic: "%%SPDF" (6 bytes)
//! - Version: NUL padded (12 bytes)
//! - ID: NUL padded (36 bytes)
//! - Created, Updated: i64 seconds (8 + 8 bytes)
//! - XRef offset: u64 (8 bytes)
//! - Count: u64 (8 bytes)
//!
//! Records, `count` times (108-byte header, then payload):
//! - Kind (1), Version (12), ID (36), Created (8), Updated (8)
//! - Position: 2 x f64 (16)
//! - Encoding, Mime class, Compression (1 + 1 + 1)
//! - Byte offset, Reading index, Payload size: u64 (8 + 8 + 8)
//! - Payload bytes
//!
//! Trailer:
//! - XRef offset again: u64 (8 bytes)
//! - Footer: "EOF%%" (5 bytes)
//! ```
//!
//! Byte offsets count from the first record, so a stream's absolute position
//! in the file is `TABLE_HEADER_SIZE + byte_offset`.
//!
//! ## Usage
//!
//! ```rust
//! use spdf::{reader, writer, StreamRecord, StreamTable};
//!
//! let table = StreamTable::new(4).unwrap();
//! let id = table.add(StreamRecord::new(b"Hello World!".to_vec())).unwrap();
//!
//! let bytes = writer::to_vec(&table).unwrap();
//! let loaded = reader::from_slice(&bytes).unwrap();
//! assert_eq!(loaded.find_by_id(id.as_str()).unwrap().payload(), b"Hello World!");
//!
//! table.remove(id.as_str()).unwrap();
//! assert_eq!(table.count(), 2);
//! ```

pub mod config;
pub mod format;
pub mod identity;
pub mod offset_index;
pub mod reader;
pub mod snapshot;
pub mod stream;
pub mod table;
pub mod writer;

// Re-export main types
pub use config::{ConfigError, IdStrategy, TableConfig};
pub use format::{Compression, Encoding, MimeClass, StreamKind};
pub use format::{RECORD_HEADER_SIZE, SPDF_FOOTER, SPDF_MAGIC, TABLE_HEADER_SIZE};
pub use identity::{IdentitySource, SequenceSource, StreamId, Timestamp, TokenSource, UuidSource};
pub use offset_index::{OffsetIndex, XrefEntry};
pub use reader::{ReadError, TableReader};
pub use snapshot::{TableSnapshot, TableStats};
pub use stream::StreamRecord;
pub use table::{StreamTable, TableError};
pub use writer::WriteError;
