//! In-memory ZIP fixtures for the integration tests
//!
//! Archives are laid out the way streaming writers produce them: local header,
//! payload, optional data descriptor, then a central directory and EOCD.

#![allow(dead_code)]

use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflate,
    #[cfg(feature = "zstd-support")]
    Zstd,
    /// Payload is written as given under this method number
    Raw(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    /// Sizes and CRC in the local header
    None,
    /// Bit 3 set, descriptor with its optional signature
    Signed,
    /// Bit 3 set, descriptor without signature
    Unsigned,
}

#[derive(Debug, Clone, Copy)]
pub struct EntrySpec {
    pub method: Method,
    pub descriptor: Descriptor,
    pub encrypted: bool,
    /// Store a CRC that does not match the payload
    pub corrupt_crc: bool,
}

impl Default for EntrySpec {
    fn default() -> Self {
        Self {
            method: Method::Deflate,
            descriptor: Descriptor::None,
            encrypted: false,
            corrupt_crc: false,
        }
    }
}

struct CentralRecord {
    name: String,
    flags: u16,
    method: u16,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    offset: u32,
}

/// Builds a ZIP archive in memory
#[derive(Default)]
pub struct ArchiveBuilder {
    output: Vec<u8>,
    central: Vec<CentralRecord>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(
            name,
            data,
            EntrySpec {
                method: Method::Stored,
                ..EntrySpec::default()
            },
        )
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, data, EntrySpec::default())
    }

    /// Deflate entry whose sizes follow the payload in a data descriptor
    pub fn streamed(self, name: &str, data: &[u8], signed: bool) -> Self {
        let descriptor = if signed {
            Descriptor::Signed
        } else {
            Descriptor::Unsigned
        };
        self.entry(
            name,
            data,
            EntrySpec {
                descriptor,
                ..EntrySpec::default()
            },
        )
    }

    /// Stored entry with zero sizes in the header and a signed descriptor,
    /// as writers targeting unseekable output produce
    pub fn stored_streamed(self, name: &str, data: &[u8]) -> Self {
        self.entry(
            name,
            data,
            EntrySpec {
                method: Method::Stored,
                descriptor: Descriptor::Signed,
                ..EntrySpec::default()
            },
        )
    }

    pub fn directory(self, name: &str) -> Self {
        assert!(name.ends_with('/'));
        self.stored(name, b"")
    }

    pub fn entry(mut self, name: &str, data: &[u8], spec: EntrySpec) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(data);
        let mut crc = hasher.finalize();
        if spec.corrupt_crc {
            crc ^= 0xDEAD_BEEF;
        }

        let (method, payload) = match spec.method {
            Method::Stored => (0u16, data.to_vec()),
            Method::Deflate => (8, deflate(data)),
            #[cfg(feature = "zstd-support")]
            Method::Zstd => (93, zstd::bulk::compress(data, 3).unwrap()),
            Method::Raw(method) => (method, data.to_vec()),
        };

        let mut flags = 0u16;
        if spec.encrypted {
            flags |= 0x0001;
        }
        if spec.descriptor != Descriptor::None {
            flags |= 0x0008;
        }
        let in_header = spec.descriptor == Descriptor::None;
        let offset = self.output.len() as u32;

        let out = &mut self.output;
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // mod date
        if in_header {
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        } else {
            out.extend_from_slice(&[0u8; 12]);
        }
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra length
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        if spec.descriptor == Descriptor::Signed {
            out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        }
        if !in_header {
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        }

        self.central.push(CentralRecord {
            name: name.to_string(),
            flags,
            method,
            crc,
            compressed_size: payload.len() as u32,
            uncompressed_size: data.len() as u32,
            offset,
        });
        self
    }

    /// Append raw bytes, for building malformed archives
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.output.extend_from_slice(bytes);
        self
    }

    /// Local entries only, as a truncated download would leave them
    pub fn finish_without_directory(self) -> Vec<u8> {
        self.output
    }

    pub fn finish(mut self) -> Vec<u8> {
        let central_offset = self.output.len() as u32;
        let out = &mut self.output;
        for record in &self.central {
            out.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes()); // version made by
            out.extend_from_slice(&20u16.to_le_bytes()); // version needed
            out.extend_from_slice(&record.flags.to_le_bytes());
            out.extend_from_slice(&record.method.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&record.crc.to_le_bytes());
            out.extend_from_slice(&record.compressed_size.to_le_bytes());
            out.extend_from_slice(&record.uncompressed_size.to_le_bytes());
            out.extend_from_slice(&(record.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes()); // extra length
            out.extend_from_slice(&0u16.to_le_bytes()); // comment length
            out.extend_from_slice(&0u16.to_le_bytes()); // disk number
            out.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            out.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            out.extend_from_slice(&record.offset.to_le_bytes());
            out.extend_from_slice(record.name.as_bytes());
        }
        let central_size = out.len() as u32 - central_offset;

        out.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(self.central.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.central.len() as u16).to_le_bytes());
        out.extend_from_slice(&central_size.to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length
        self.output
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Bytes that compress poorly, so payloads span several read buffers
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}
