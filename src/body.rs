//! Entry payload decoding as a push-style state machine
//!
//! `EntryBody` never touches I/O. The sync and async readers hand it whatever
//! bytes their buffered source currently holds, it reports how many of those it
//! consumed and how many decompressed bytes it produced. This keeps the byte
//! accounting exact, so the source is positioned right after the payload when
//! the entry ends and the next header can be read without any seeking.

use crate::error::{ExtractError, Result};
use crate::header::{CompressionMethod, DataDescriptor, EntryHeader, DATA_DESCRIPTOR_SIGNATURE};
use crc32fast::Hasher as Crc32;
use flate2::{Decompress, FlushDecompress, Status};

#[cfg(feature = "zstd-support")]
use zstd::stream::raw::{Decoder as ZstdDecoder, InBuffer, Operation, OutBuffer};

enum Decoder {
    Stored,
    /// Stored payload of unknown length, ended by a signed data descriptor
    StoredScan(Box<DescriptorScan>),
    Deflate(Box<Decompress>),
    #[cfg(feature = "zstd-support")]
    Zstd(Box<ZstdDecoder<'static>>),
    /// Raw bytes are consumed and thrown away
    Skip,
}

/// Result of one decoding step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    pub consumed: usize,
    pub produced: usize,
}

pub(crate) struct EntryBody {
    path: String,
    decoder: Decoder,
    /// Compressed bytes still belonging to this entry, when the header knows
    remaining: Option<u64>,
    /// The decoder saw the end of its compressed stream
    decoder_done: bool,
    crc: Crc32,
    consumed: u64,
    produced: u64,
    skipped: bool,
    /// Why the payload cannot be decoded, if it cannot
    blocked: Option<Blocked>,
}

#[derive(Debug, Clone)]
enum Blocked {
    Encrypted,
    Method(u16),
}

impl EntryBody {
    /// Prepare to decode the payload described by `header`
    ///
    /// Entries that cannot be decoded still get a body as long as their
    /// compressed size is known, so they can be skipped; reading from such a
    /// body fails with the reason it cannot be decoded.
    pub fn new(header: &EntryHeader) -> Result<Self> {
        match Self::decoder_for(header) {
            Ok(decoder) => Ok(Self::with_decoder(header, decoder, None)),
            Err(err) if header.compressed_size.is_some() => {
                let blocked = match err {
                    ExtractError::Encrypted(_) => Blocked::Encrypted,
                    ExtractError::UnsupportedCompression { method, .. } => Blocked::Method(method),
                    other => return Err(other),
                };
                Ok(Self::with_decoder(header, Decoder::Skip, Some(blocked)))
            }
            Err(err) => Err(err),
        }
    }

    fn with_decoder(header: &EntryHeader, decoder: Decoder, blocked: Option<Blocked>) -> Self {
        EntryBody {
            path: header.path.clone(),
            decoder,
            remaining: header.compressed_size,
            decoder_done: false,
            crc: Crc32::new(),
            consumed: 0,
            produced: 0,
            skipped: blocked.is_some(),
            blocked,
        }
    }

    fn decoder_for(header: &EntryHeader) -> Result<Decoder> {
        if header.is_encrypted() {
            return Err(ExtractError::Encrypted(header.path.clone()));
        }
        match header.method {
            CompressionMethod::Stored => match header.compressed_size {
                Some(_) => Ok(Decoder::Stored),
                None => Ok(Decoder::StoredScan(Box::new(DescriptorScan::new(header.zip64)))),
            },
            CompressionMethod::Deflate => Ok(Decoder::Deflate(Box::new(Decompress::new(false)))),
            #[cfg(feature = "zstd-support")]
            CompressionMethod::Zstd => {
                let decoder = ZstdDecoder::new().map_err(ExtractError::Io)?;
                Ok(Decoder::Zstd(Box::new(decoder)))
            }
            other => Err(ExtractError::UnsupportedCompression {
                path: header.path.clone(),
                method: other.to_zip_method(),
            }),
        }
    }

    /// Stop decompressing and only consume the remaining raw bytes
    ///
    /// Possible only when the compressed size is known; returns whether the
    /// switch happened.
    pub fn skip_rest(&mut self) -> bool {
        if self.remaining.is_none() {
            return false;
        }
        self.decoder = Decoder::Skip;
        self.skipped = true;
        self.blocked = None;
        true
    }

    /// True once every payload byte of this entry has been consumed
    pub fn is_done(&self) -> bool {
        let input_done = matches!(self.remaining, None | Some(0));
        match &self.decoder {
            Decoder::Stored | Decoder::Skip => self.remaining == Some(0),
            Decoder::StoredScan(scan) => scan.found.is_some(),
            _ => self.decoder_done && input_done,
        }
    }

    /// Feed `input` (what the source currently has buffered, empty at EOF)
    /// and decode into `out`
    pub fn decode(&mut self, input: &[u8], out: &mut [u8]) -> Result<Step> {
        if self.is_done() || out.is_empty() {
            return Ok(Step {
                consumed: 0,
                produced: 0,
            });
        }
        self.check_decodable()?;

        let bounded = match self.remaining {
            Some(remaining) => &input[..input.len().min(clamp(remaining))],
            None => input,
        };
        let at_eof = input.is_empty();

        let step = match &mut self.decoder {
            Decoder::Skip => Step {
                consumed: bounded.len(),
                produced: 0,
            },
            Decoder::Stored => {
                let n = bounded.len().min(out.len());
                out[..n].copy_from_slice(&bounded[..n]);
                Step {
                    consumed: n,
                    produced: n,
                }
            }
            Decoder::StoredScan(scan) => scan.step(bounded, out, self.produced),
            Decoder::Deflate(inflater) => {
                if self.decoder_done {
                    // Trailing bytes the header counted past the deflate end
                    Step {
                        consumed: bounded.len(),
                        produced: 0,
                    }
                } else {
                    let before_in = inflater.total_in();
                    let before_out = inflater.total_out();
                    let flush = if bounded.is_empty() {
                        FlushDecompress::Finish
                    } else {
                        FlushDecompress::None
                    };
                    let status = inflater.decompress(bounded, out, flush).map_err(|e| {
                        ExtractError::InvalidFormat(format!(
                            "Corrupt deflate data in {}: {}",
                            self.path, e
                        ))
                    })?;
                    if status == Status::StreamEnd {
                        self.decoder_done = true;
                    }
                    Step {
                        consumed: (inflater.total_in() - before_in) as usize,
                        produced: (inflater.total_out() - before_out) as usize,
                    }
                }
            }
            #[cfg(feature = "zstd-support")]
            Decoder::Zstd(decoder) => {
                if self.decoder_done {
                    Step {
                        consumed: bounded.len(),
                        produced: 0,
                    }
                } else {
                    let mut in_buf = InBuffer::around(bounded);
                    let mut out_buf = OutBuffer::around(out);
                    let hint = decoder.run(&mut in_buf, &mut out_buf).map_err(|e| {
                        ExtractError::InvalidFormat(format!(
                            "Corrupt zstd data in {}: {}",
                            self.path, e
                        ))
                    })?;
                    if hint == 0 {
                        self.decoder_done = true;
                    }
                    Step {
                        consumed: in_buf.pos(),
                        produced: out_buf.pos(),
                    }
                }
            }
        };

        if step.produced > 0 {
            self.crc.update(&out[..step.produced]);
        }
        // The descriptor found by a scan is consumed too but is not payload
        let payload_in = match self.decoder {
            Decoder::StoredScan(_) => step.produced,
            _ => step.consumed,
        };
        self.consumed += payload_in as u64;
        self.produced += step.produced as u64;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= step.consumed as u64;
        }

        if step.consumed == 0 && step.produced == 0 && !self.is_done() {
            // Nothing moved: either the source is exhausted or the header's
            // compressed size ran out before the compressed stream ended.
            if at_eof || bounded.is_empty() {
                return Err(ExtractError::InvalidFormat(format!(
                    "Unexpected end of data in {}",
                    self.path
                )));
            }
        }

        Ok(step)
    }

    /// Check the decoded bytes against the header or data descriptor
    ///
    /// Skipped entries are not verified, their bytes were never decoded.
    pub fn verify(&self, header: &EntryHeader, descriptor: Option<&DataDescriptor>) -> Result<()> {
        if self.skipped {
            return Ok(());
        }

        let (expected_crc, expected_size, expected_compressed) = match descriptor {
            Some(dd) => (dd.crc32, Some(dd.uncompressed_size), Some(dd.compressed_size)),
            None => (header.crc32, header.uncompressed_size, header.compressed_size),
        };

        let actual_crc = self.crc.clone().finalize();
        if actual_crc != expected_crc {
            return Err(ExtractError::ChecksumMismatch {
                path: header.path.clone(),
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let width_mask = if header.zip64 { u64::MAX } else { 0xFFFF_FFFF };
        if let Some(expected) = expected_size {
            if self.produced & width_mask != expected {
                return Err(ExtractError::SizeMismatch {
                    path: header.path.clone(),
                    expected,
                    actual: self.produced,
                });
            }
        }
        if let Some(expected) = expected_compressed {
            if self.consumed & width_mask != expected {
                return Err(ExtractError::InvalidFormat(format!(
                    "Compressed size of {} is {} bytes but {} were recorded",
                    header.path, self.consumed, expected
                )));
            }
        }
        Ok(())
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Data descriptor already consumed while looking for the end of the payload
    pub fn descriptor(&self) -> Option<DataDescriptor> {
        match &self.decoder {
            Decoder::StoredScan(scan) => scan.found,
            _ => None,
        }
    }

    fn check_decodable(&self) -> Result<()> {
        match self.blocked {
            None => Ok(()),
            Some(Blocked::Encrypted) => Err(ExtractError::Encrypted(self.path.clone())),
            Some(Blocked::Method(method)) => Err(ExtractError::UnsupportedCompression {
                path: self.path.clone(),
                method,
            }),
        }
    }
}

fn clamp(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

const SIGNATURE_BYTES: [u8; 4] = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();

/// What the bytes at some offset of a deferred stored payload turn out to be
enum Boundary {
    Payload,
    End(DataDescriptor),
    /// Could be a descriptor, more input is needed to tell
    Undecided,
}

/// Finds the end of a stored payload whose size only follows it
///
/// A descriptor signature counts as the end only when the sizes recorded after
/// it equal the payload length up to that point. Bytes that might start a
/// descriptor but are cut off by the end of the input are held back until
/// the next call.
struct DescriptorScan {
    held: Vec<u8>,
    zip64: bool,
    found: Option<DataDescriptor>,
}

impl DescriptorScan {
    fn new(zip64: bool) -> Self {
        Self {
            held: Vec::new(),
            zip64,
            found: None,
        }
    }

    fn descriptor_len(&self) -> usize {
        DataDescriptor::encoded_len(true, self.zip64)
    }

    /// `emitted` is the payload length handed out before this call
    fn step(&mut self, input: &[u8], out: &mut [u8], emitted: u64) -> Step {
        if self.held.is_empty() {
            self.scan_input(input, out, emitted)
        } else {
            self.scan_held(input, out, emitted)
        }
    }

    fn classify(&self, data: &[u8], at: usize, payload_len: u64) -> Boundary {
        let rest = &data[at..];
        if rest.len() < SIGNATURE_BYTES.len() {
            return if SIGNATURE_BYTES.starts_with(rest) {
                Boundary::Undecided
            } else {
                Boundary::Payload
            };
        }
        if rest[..4] != SIGNATURE_BYTES {
            return Boundary::Payload;
        }
        let len = self.descriptor_len();
        if rest.len() < len {
            return Boundary::Undecided;
        }

        let descriptor = DataDescriptor::parse(&rest[4..len], self.zip64);
        let expected = if self.zip64 {
            payload_len
        } else {
            payload_len & 0xFFFF_FFFF
        };
        if descriptor.compressed_size == expected && descriptor.uncompressed_size == expected {
            Boundary::End(descriptor)
        } else {
            Boundary::Payload
        }
    }

    fn scan_input(&mut self, input: &[u8], out: &mut [u8], emitted: u64) -> Step {
        let n = input.len().min(out.len());
        let mut at = 0;
        while let Some(offset) = input[at..n].iter().position(|&b| b == SIGNATURE_BYTES[0]) {
            at += offset;
            match self.classify(input, at, emitted + at as u64) {
                Boundary::Payload => at += 1,
                Boundary::End(descriptor) => {
                    out[..at].copy_from_slice(&input[..at]);
                    self.found = Some(descriptor);
                    return Step {
                        consumed: at + self.descriptor_len(),
                        produced: at,
                    };
                }
                Boundary::Undecided => {
                    out[..at].copy_from_slice(&input[..at]);
                    self.held.extend_from_slice(&input[at..]);
                    return Step {
                        consumed: input.len(),
                        produced: at,
                    };
                }
            }
        }

        out[..n].copy_from_slice(&input[..n]);
        Step {
            consumed: n,
            produced: n,
        }
    }

    fn scan_held(&mut self, input: &[u8], out: &mut [u8], emitted: u64) -> Step {
        let len = self.descriptor_len();
        let held = self.held.len();
        let mut data = self.held.clone();
        data.extend_from_slice(&input[..input.len().min(len)]);

        let n = held.min(out.len());
        for at in 0..n {
            match self.classify(&data, at, emitted + at as u64) {
                Boundary::Payload => {}
                Boundary::End(descriptor) => {
                    out[..at].copy_from_slice(&self.held[..at]);
                    self.held.clear();
                    self.found = Some(descriptor);
                    return Step {
                        consumed: at + len - held,
                        produced: at,
                    };
                }
                Boundary::Undecided => {
                    out[..at].copy_from_slice(&self.held[..at]);
                    self.held.drain(..at);
                    self.held.extend_from_slice(input);
                    return Step {
                        consumed: input.len(),
                        produced: at,
                    };
                }
            }
        }

        out[..n].copy_from_slice(&self.held[..n]);
        self.held.drain(..n);
        Step {
            consumed: 0,
            produced: n,
        }
    }
}
