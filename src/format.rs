// SPDX-License-Identifier: MIT
//! SPDF binary layout: markers, field widths and the closed enumerations
//! stored in every stream record.
//!
//! All sizes are derived from the individual field widths below; nothing in
//! the crate hard-codes a record or header size.

/// Magic bytes opening every serialized table
pub const SPDF_MAGIC: &[u8; 6] = b"%%SPDF";

/// Marker closing every serialized table
pub const SPDF_FOOTER: &[u8; 5] = b"EOF%%";

/// Format version stamped on tables and records
pub const FORMAT_VERSION: &str = "000.000.001";

/// Width of the NUL-padded version field
pub const VERSION_WIDTH: usize = 12;

/// Width of the NUL-padded identifier field
pub const ID_WIDTH: usize = 36;

/// Width of a timestamp (i64 seconds since the Unix epoch)
pub const TIMESTAMP_WIDTH: usize = 8;

/// Width of offsets, counts and sizes (u64)
pub const WORD_WIDTH: usize = 8;

/// Width of the position field (two f64)
pub const POSITION_WIDTH: usize = 16;

/// Width of each single-byte enum field
pub const TAG_WIDTH: usize = 1;

/// Fixed part of a serialized stream record, excluding the payload.
///
/// kind, version, id, created, updated, position, encoding, mime class,
/// compression, byte offset, reading index, payload size.
pub const RECORD_HEADER_SIZE: usize = TAG_WIDTH
    + VERSION_WIDTH
    + ID_WIDTH
    + TIMESTAMP_WIDTH * 2
    + POSITION_WIDTH
    + TAG_WIDTH * 3
    + WORD_WIDTH * 3;

/// Magic plus table metadata: version, id, created, updated, xref offset, count.
pub const TABLE_HEADER_SIZE: usize =
    SPDF_MAGIC.len() + VERSION_WIDTH + ID_WIDTH + TIMESTAMP_WIDTH * 2 + WORD_WIDTH * 2;

/// Repeated xref offset plus footer marker
pub const TRAILER_SIZE: usize = WORD_WIDTH + SPDF_FOOTER.len();

/// Errors converting between in-memory values and fixed-width fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("{field} is {len} bytes, field holds at most {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains non-printable or non-ASCII bytes")]
    NotPrintable { field: &'static str },

    #[error("unknown {field} tag: {value}")]
    UnknownTag { field: &'static str, value: u8 },
}

macro_rules! tag_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(u8)]
        pub enum $name {
            #[default]
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $name {
            /// Tag byte written to the wire
            #[inline]
            pub fn tag(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = FieldError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(FieldError::UnknownTag { field: $field, value }),
                }
            }
        }
    };
}

tag_enum! {
    /// Role of a stream inside a table
    StreamKind, "stream kind" {
        /// Reserved document metadata record (slot 0)
        Metadata = 0,
        /// Reserved cross-reference record (slot 1)
        CrossReference = 1,
        /// Caller-supplied payload
        Data = 2,
    }
}

tag_enum! {
    /// Payload text encoding (stored, not interpreted)
    Encoding, "encoding" {
        Utf8 = 0,
    }
}

tag_enum! {
    /// Coarse payload content class (stored, not interpreted)
    MimeClass, "mime class" {
        Text = 0,
        Binary = 1,
    }
}

tag_enum! {
    /// Payload compression marker (stored, not applied)
    Compression, "compression" {
        None = 0,
        Zip = 1,
        Tar = 2,
    }
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Metadata => "metadata",
            StreamKind::CrossReference => "xref",
            StreamKind::Data => "data",
        }
    }

    /// Metadata and cross-reference records are reserved
    #[inline]
    pub fn is_reserved(&self) -> bool {
        !matches!(self, StreamKind::Data)
    }
}

/// Append `value` to `buffer` as a NUL-padded field of exactly `width` bytes
pub fn put_fixed_str(
    buffer: &mut Vec<u8>,
    field: &'static str,
    value: &str,
    width: usize,
) -> Result<(), FieldError> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(FieldError::TooLong {
            field,
            len: bytes.len(),
            max: width,
        });
    }
    buffer.extend_from_slice(bytes);
    buffer.resize(buffer.len() + (width - bytes.len()), 0);
    Ok(())
}

/// Decode a NUL-padded field; everything after the first NUL is ignored
pub fn parse_fixed_str(field: &'static str, bytes: &[u8]) -> Result<String, FieldError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = &bytes[..end];
    if !text.iter().all(u8::is_ascii_graphic) {
        return Err(FieldError::NotPrintable { field });
    }
    // ASCII graphic bytes are always valid UTF-8
    Ok(text.iter().map(|&b| b as char).collect())
}

/// Little-endian field reader over a fixed-size block.
///
/// Callers size the block from the width constants above, so every read is in
/// bounds; a short block is the caller's bug and surfaces as a panic in tests.
pub(crate) struct FieldCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn take(&mut self, width: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + width];
        self.pos += width;
        slice
    }

    pub(crate) fn u8(&mut self) -> u8 {
        self.take(TAG_WIDTH)[0]
    }

    pub(crate) fn u64(&mut self) -> u64 {
        let mut word = [0u8; WORD_WIDTH];
        word.copy_from_slice(self.take(WORD_WIDTH));
        u64::from_le_bytes(word)
    }

    pub(crate) fn i64(&mut self) -> i64 {
        let mut word = [0u8; TIMESTAMP_WIDTH];
        word.copy_from_slice(self.take(TIMESTAMP_WIDTH));
        i64::from_le_bytes(word)
    }

    pub(crate) fn f64(&mut self) -> f64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8));
        f64::from_le_bytes(word)
    }

    pub(crate) fn str(&mut self, field: &'static str, width: usize) -> Result<String, FieldError> {
        parse_fixed_str(field, self.take(width))
    }

    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }
}
