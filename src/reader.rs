//! Forward-only ZIP stream reader - walks local file headers without seeking
//!
//! Unlike a central-directory reader this works on any `Read`: pipes, sockets,
//! HTTP bodies, or a nested archive held in memory. Entries come out in archive
//! order and every entry is either read or drained before the next one starts.

use crate::body::EntryBody;
use crate::error::{ExtractError, Result};
use crate::header::{
    classify_signature, le_u32, variable_lengths, DataDescriptor, EntryHeader, Record,
    DATA_DESCRIPTOR_SIGNATURE, LOCAL_FILE_HEADER_LEN,
};
use crate::options::{ExtractOptions, MIN_BUFFER_SIZE};
use std::io::{self, BufRead, BufReader, Read};
use tracing::trace;

/// Scratch space used when an entry has to be decompressed just to find its end
const DRAIN_CHUNK: usize = 32 * 1024;

/// Cap on the up-front allocation made from an entry's declared size
pub(crate) const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

struct Current {
    header: EntryHeader,
    body: EntryBody,
    completed: bool,
}

/// Streaming ZIP reader over any `Read`
pub struct ZipStreamReader<R: Read> {
    source: BufReader<R>,
    current: Option<Current>,
    finished: bool,
    started: bool,
    verify: bool,
}

impl<R: Read> ZipStreamReader<R> {
    /// Create a reader with default options
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, &ExtractOptions::default())
    }

    pub fn with_options(reader: R, options: &ExtractOptions) -> Self {
        ZipStreamReader {
            source: BufReader::with_capacity(options.buffer_size.max(MIN_BUFFER_SIZE), reader),
            current: None,
            finished: false,
            started: false,
            verify: options.verify_checksums,
        }
    }

    /// Advance to the next entry
    ///
    /// Whatever is left of the previous entry is drained first. Returns
    /// `Ok(None)` once the central directory (or a clean end of input) is reached.
    pub fn next_entry(&mut self) -> Result<Option<ZipEntry<'_, R>>> {
        self.finish_current()?;
        if self.finished {
            return Ok(None);
        }

        let header = loop {
            let Some(signature) = self.read_signature()? else {
                self.finished = true;
                return Ok(None);
            };
            let first = !self.started;
            self.started = true;
            match classify_signature(signature)? {
                Record::LocalFile => break self.read_local_header()?,
                Record::SpanMarker if first => continue,
                Record::SpanMarker => {
                    return Err(ExtractError::InvalidFormat(
                        "Data descriptor found where a local header was expected".to_string(),
                    ))
                }
                Record::EndOfEntries => {
                    self.finished = true;
                    return Ok(None);
                }
            }
        };

        trace!(path = %header.path, method = ?header.method, "entry");
        let body = EntryBody::new(&header)?;
        self.current = Some(Current {
            header,
            body,
            completed: false,
        });
        Ok(Some(ZipEntry { reader: self }))
    }

    /// Drain every remaining entry until the end of the archive's entries
    pub fn finish(&mut self) -> Result<()> {
        while self.next_entry()?.is_some() {}
        Ok(())
    }

    /// True once the end of the entries has been reached
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Give back the underlying reader
    ///
    /// Bytes already buffered from it are lost.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    fn read_signature(&mut self) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(ExtractError::InvalidFormat(
                        "Archive ends inside a record signature".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_local_header(&mut self) -> Result<EntryHeader> {
        let mut fixed = [0u8; LOCAL_FILE_HEADER_LEN];
        fixed[..4].copy_from_slice(&crate::header::LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        self.read_exact(&mut fixed[4..], "local file header")?;

        let (name_len, extra_len) = variable_lengths(&fixed);
        let mut name = vec![0u8; name_len];
        self.read_exact(&mut name, "entry name")?;
        let mut extra = vec![0u8; extra_len];
        self.read_exact(&mut extra, "extra field")?;

        Ok(EntryHeader::parse(&fixed, &name, &extra))
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.source.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                ExtractError::InvalidFormat(format!("Archive truncated inside {}", what))
            }
            _ => ExtractError::from(e),
        })
    }

    /// Decode the current entry's payload into `out`; 0 means the entry is complete
    fn read_payload(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(current) = self.current.as_mut() else {
                return Ok(0);
            };
            if current.body.is_done() {
                self.complete_current()?;
                return Ok(0);
            }

            let input = self.source.fill_buf()?;
            let step = current.body.decode(input, out)?;
            self.source.consume(step.consumed);

            if step.produced > 0 {
                return Ok(step.produced);
            }
        }
    }

    /// Consume the rest of the current entry without keeping its bytes
    fn drain_current(&mut self) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        if !current.completed && !current.body.is_done() {
            let raw = current.body.skip_rest();
            trace!(path = %current.header.path, raw, "draining entry");
        }

        let mut scratch = vec![0u8; DRAIN_CHUNK];
        while self.read_payload(&mut scratch)? > 0 {}
        Ok(())
    }

    fn finish_current(&mut self) -> Result<()> {
        self.drain_current()?;
        self.current = None;
        Ok(())
    }

    /// Read the data descriptor if any, then verify the entry
    fn complete_current(&mut self) -> Result<()> {
        let Some(current) = self.current.as_ref() else {
            return Ok(());
        };
        if current.completed {
            return Ok(());
        }

        let zip64 = current.header.zip64;
        let descriptor = match (current.header.has_data_descriptor(), current.body.descriptor()) {
            (false, _) => None,
            (true, Some(found)) => Some(found),
            (true, None) => Some(self.read_data_descriptor(zip64)?),
        };

        if let Some(current) = self.current.as_mut() {
            if self.verify {
                current.body.verify(&current.header, descriptor.as_ref())?;
            }
            current.completed = true;
        }
        Ok(())
    }

    fn read_data_descriptor(&mut self, zip64: bool) -> Result<DataDescriptor> {
        let mut first = [0u8; 4];
        self.read_exact(&mut first, "data descriptor")?;
        let has_signature = le_u32(&first) == DATA_DESCRIPTOR_SIGNATURE;

        let fields_len = DataDescriptor::encoded_len(false, zip64);
        let mut fields = vec![0u8; fields_len];
        if has_signature {
            self.read_exact(&mut fields, "data descriptor")?;
        } else {
            fields[..4].copy_from_slice(&first);
            self.read_exact(&mut fields[4..], "data descriptor")?;
        }
        Ok(DataDescriptor::parse(&fields, zip64))
    }
}

/// One entry of a [`ZipStreamReader`], borrowed until the next call to `next_entry`
///
/// Reading it yields the decompressed payload. Dropping it early is fine: the
/// reader drains what is left before moving on.
pub struct ZipEntry<'a, R: Read> {
    reader: &'a mut ZipStreamReader<R>,
}

impl<R: Read> ZipEntry<'_, R> {
    pub fn header(&self) -> &EntryHeader {
        // `current` is always set while an entry handle exists
        match self.reader.current.as_ref() {
            Some(current) => &current.header,
            None => unreachable!("entry handle outlived its entry"),
        }
    }

    /// Stored path of the entry
    pub fn path(&self) -> &str {
        &self.header().path
    }

    pub fn is_directory(&self) -> bool {
        self.header().is_directory()
    }

    /// Decompressed bytes produced so far
    pub fn bytes_read(&self) -> u64 {
        self.reader
            .current
            .as_ref()
            .map(|current| current.body.produced())
            .unwrap_or_default()
    }

    /// Buffer the whole payload
    ///
    /// `limit` caps the decompressed size; exceeding it fails with
    /// [`ExtractError::LimitExceeded`].
    pub fn read_to_vec(&mut self, limit: Option<u64>) -> Result<Vec<u8>> {
        let declared = self.header().uncompressed_size.unwrap_or(0);
        let mut data = Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
        let mut chunk = vec![0u8; DRAIN_CHUNK];

        loop {
            let n = self.reader.read_payload(&mut chunk)?;
            if n == 0 {
                return Ok(data);
            }
            if let Some(limit) = limit {
                if (data.len() + n) as u64 > limit {
                    return Err(ExtractError::LimitExceeded {
                        path: self.path().to_string(),
                        limit,
                    });
                }
            }
            data.extend_from_slice(&chunk[..n]);
        }
    }

    /// Discard the rest of the payload
    pub fn drain(self) -> Result<()> {
        self.reader.drain_current()
    }
}

impl<R: Read> Read for ZipEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_payload(buf).map_err(io::Error::from)
    }
}

impl<R: Read> std::fmt::Debug for ZipEntry<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipEntry")
            .field("header", self.header())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_entries() {
        let mut reader = ZipStreamReader::new(&[][..]);
        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.is_finished());
    }

    #[test]
    fn empty_archive_is_just_an_eocd() {
        let mut eocd = vec![0x50, 0x4b, 0x05, 0x06];
        eocd.extend_from_slice(&[0u8; 18]);
        let mut reader = ZipStreamReader::new(&eocd[..]);
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        let mut reader = ZipStreamReader::new(&b"not a zip file"[..]);
        let err = reader.next_entry().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidFormat(_)));
    }

    #[test]
    fn truncated_signature_is_an_error() {
        let mut reader = ZipStreamReader::new(&[0x50, 0x4b][..]);
        assert!(reader.next_entry().is_err());
    }

    #[test]
    fn truncated_header_is_an_error() {
        let mut reader = ZipStreamReader::new(&[0x50, 0x4b, 0x03, 0x04, 0x14, 0x00][..]);
        match reader.next_entry() {
            Err(ExtractError::InvalidFormat(msg)) => assert!(msg.contains("truncated")),
            other => panic!("unexpected: {:?}", other.map(|e| e.is_some())),
        }
    }
}
