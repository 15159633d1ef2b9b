//! ZIP record layouts seen while scanning an archive front to back
//!
//! A forward-only scanner never looks at the central directory. It walks the
//! local file headers, each followed by the entry payload and, when general
//! purpose flag bit 3 is set, a data descriptor carrying the CRC and sizes.

use crate::error::{ExtractError, Result};

/// ZIP local file header signature
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory signature
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;

/// ZIP64 end of central directory locator signature
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// Data descriptor signature (optional in front of the descriptor fields)
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// Digital signature record, sits between the central directory and EOCD
pub const DIGITAL_SIGNATURE: u32 = 0x05054b50;

/// Fixed part of a local file header, signature included
pub const LOCAL_FILE_HEADER_LEN: usize = 30;

/// Upper bound of a data descriptor: signature + crc + two 8-byte sizes
pub const MAX_DATA_DESCRIPTOR_LEN: usize = 24;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const FLAG_UTF8: u16 = 0x0800;

const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;
const ZIP64_PLACEHOLDER: u32 = 0xFFFF_FFFF;

/// Compression method of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored)
    Stored,
    /// DEFLATE compression
    Deflate,
    /// Zstd compression (method 93)
    Zstd,
    /// Anything else; can be skipped when sizes are known, never decoded
    Other(u16),
}

impl CompressionMethod {
    pub fn from_zip_method(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            93 => CompressionMethod::Zstd,
            other => CompressionMethod::Other(other),
        }
    }

    pub fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Other(method) => method,
        }
    }
}

/// What the scanner learns about an entry from its local file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Stored relative path, forward slashes
    pub path: String,
    pub method: CompressionMethod,
    pub flags: u16,
    /// CRC-32 from the header; only meaningful when there is no data descriptor
    pub crc32: u32,
    /// None when the size is deferred to the data descriptor
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
    /// Sizes in the data descriptor are 8 bytes wide
    pub zip64: bool,
}

impl EntryHeader {
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Parse the variable part of a local header
    ///
    /// `fixed` is the 30-byte fixed header (signature included), `name` and
    /// `extra` are the bytes that immediately follow it.
    pub fn parse(fixed: &[u8; LOCAL_FILE_HEADER_LEN], name: &[u8], extra: &[u8]) -> Self {
        let flags = le_u16(&fixed[6..8]);
        let method = CompressionMethod::from_zip_method(le_u16(&fixed[8..10]));
        let crc32 = le_u32(&fixed[14..18]);
        let compressed_32 = le_u32(&fixed[18..22]);
        let uncompressed_32 = le_u32(&fixed[22..26]);

        let path = if flags & FLAG_UTF8 != 0 {
            match std::str::from_utf8(name) {
                Ok(s) => s.to_string(),
                Err(_) => String::from_utf8_lossy(name).into_owned(),
            }
        } else {
            String::from_utf8_lossy(name).into_owned()
        };

        let mut compressed = compressed_32 as u64;
        let mut uncompressed = uncompressed_32 as u64;
        let mut zip64 = false;

        if let Some(data) = find_extra_field(extra, ZIP64_EXTRA_FIELD_ID) {
            zip64 = true;
            // Values appear in this order, each only when its 32-bit slot is the placeholder
            let mut cursor = 0usize;
            if uncompressed_32 == ZIP64_PLACEHOLDER && cursor + 8 <= data.len() {
                uncompressed = le_u64(&data[cursor..cursor + 8]);
                cursor += 8;
            }
            if compressed_32 == ZIP64_PLACEHOLDER && cursor + 8 <= data.len() {
                compressed = le_u64(&data[cursor..cursor + 8]);
            }
        }

        let deferred = flags & FLAG_DATA_DESCRIPTOR != 0;
        // Streaming writers leave zeros here and fill in the descriptor later.
        // A non-zero value is trusted even with bit 3 set.
        let compressed_size = match (deferred, compressed) {
            (true, 0) => None,
            _ => Some(compressed),
        };
        let uncompressed_size = match (deferred, uncompressed) {
            (true, 0) => None,
            _ => Some(uncompressed),
        };

        EntryHeader {
            path,
            method,
            flags,
            crc32,
            compressed_size,
            uncompressed_size,
            zip64,
        }
    }
}

/// Lengths of the name and extra field announced by a fixed local header
pub fn variable_lengths(fixed: &[u8; LOCAL_FILE_HEADER_LEN]) -> (usize, usize) {
    (
        le_u16(&fixed[26..28]) as usize,
        le_u16(&fixed[28..30]) as usize,
    )
}

/// What a 4-byte signature between entries tells the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    LocalFile,
    /// Central directory or any trailing record: no more entries follow
    EndOfEntries,
    /// Split-archive marker at the very start; skip it
    SpanMarker,
}

pub fn classify_signature(signature: u32) -> Result<Record> {
    match signature {
        LOCAL_FILE_HEADER_SIGNATURE => Ok(Record::LocalFile),
        CENTRAL_DIRECTORY_SIGNATURE
        | END_OF_CENTRAL_DIRECTORY_SIGNATURE
        | ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE
        | ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE
        | DIGITAL_SIGNATURE => Ok(Record::EndOfEntries),
        DATA_DESCRIPTOR_SIGNATURE => Ok(Record::SpanMarker),
        other => Err(ExtractError::InvalidFormat(format!(
            "Unexpected record signature: 0x{:08x}",
            other
        ))),
    }
}

/// CRC and sizes written after an entry's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Number of bytes the descriptor occupies, given whether it starts with
    /// the optional signature
    pub fn encoded_len(has_signature: bool, zip64: bool) -> usize {
        let fields = if zip64 { 4 + 8 + 8 } else { 4 + 4 + 4 };
        if has_signature {
            fields + 4
        } else {
            fields
        }
    }

    /// Parse a descriptor whose fields start at `bytes[0]` (signature already stripped)
    pub fn parse(bytes: &[u8], zip64: bool) -> Self {
        if zip64 {
            DataDescriptor {
                crc32: le_u32(&bytes[0..4]),
                compressed_size: le_u64(&bytes[4..12]),
                uncompressed_size: le_u64(&bytes[12..20]),
            }
        } else {
            DataDescriptor {
                crc32: le_u32(&bytes[0..4]),
                compressed_size: le_u32(&bytes[4..8]) as u64,
                uncompressed_size: le_u32(&bytes[8..12]) as u64,
            }
        }
    }
}

fn find_extra_field(extra: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let id = le_u16(&extra[i..i + 2]);
        let len = le_u16(&extra[i + 2..i + 4]) as usize;
        i += 4;
        if i + len > extra.len() {
            return None;
        }
        if id == wanted {
            return Some(&extra[i..i + len]);
        }
        i += len;
    }
    None
}

pub(crate) fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

pub(crate) fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
