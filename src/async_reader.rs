//! Async forward-only ZIP stream reader for any tokio `AsyncRead`
//!
//! Same scanning rules as [`crate::reader::ZipStreamReader`]; every read from
//! the source is an await point, so many extractions can share one runtime.

use crate::body::EntryBody;
use crate::error::{ExtractError, Result};
use crate::header::{
    classify_signature, le_u32, variable_lengths, DataDescriptor, EntryHeader, Record,
    DATA_DESCRIPTOR_SIGNATURE, LOCAL_FILE_HEADER_LEN, LOCAL_FILE_HEADER_SIGNATURE,
};
use crate::options::{ExtractOptions, MIN_BUFFER_SIZE};
use crate::reader::MAX_PREALLOCATION;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tracing::trace;

const DRAIN_CHUNK: usize = 32 * 1024;

struct Current {
    header: EntryHeader,
    body: EntryBody,
    completed: bool,
}

/// Async streaming ZIP reader over any `AsyncRead + Unpin`
pub struct AsyncZipStreamReader<R: AsyncRead + Unpin> {
    source: BufReader<R>,
    current: Option<Current>,
    finished: bool,
    started: bool,
    verify: bool,
}

impl<R: AsyncRead + Unpin> AsyncZipStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, &ExtractOptions::default())
    }

    pub fn with_options(reader: R, options: &ExtractOptions) -> Self {
        AsyncZipStreamReader {
            source: BufReader::with_capacity(options.buffer_size.max(MIN_BUFFER_SIZE), reader),
            current: None,
            finished: false,
            started: false,
            verify: options.verify_checksums,
        }
    }

    /// Advance to the next entry, draining what is left of the previous one
    pub async fn next_entry(&mut self) -> Result<Option<AsyncZipEntry<'_, R>>> {
        self.finish_current().await?;
        if self.finished {
            return Ok(None);
        }

        let header = loop {
            let Some(signature) = self.read_signature().await? else {
                self.finished = true;
                return Ok(None);
            };
            let first = !self.started;
            self.started = true;
            match classify_signature(signature)? {
                Record::LocalFile => break self.read_local_header().await?,
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
        Ok(Some(AsyncZipEntry { reader: self }))
    }

    /// Drain every remaining entry
    pub async fn finish(&mut self) -> Result<()> {
        while self.next_entry().await?.is_some() {}
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    async fn read_signature(&mut self) -> Result<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]).await? {
                0 if filled == 0 => return Ok(None),
                0 => {
                    return Err(ExtractError::InvalidFormat(
                        "Archive ends inside a record signature".to_string(),
                    ))
                }
                n => filled += n,
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    async fn read_local_header(&mut self) -> Result<EntryHeader> {
        let mut fixed = [0u8; LOCAL_FILE_HEADER_LEN];
        fixed[..4].copy_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        self.read_exact(&mut fixed[4..], "local file header").await?;

        let (name_len, extra_len) = variable_lengths(&fixed);
        let mut name = vec![0u8; name_len];
        self.read_exact(&mut name, "entry name").await?;
        let mut extra = vec![0u8; extra_len];
        self.read_exact(&mut extra, "extra field").await?;

        Ok(EntryHeader::parse(&fixed, &name, &extra))
    }

    async fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        match self.source.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(
                ExtractError::InvalidFormat(format!("Archive truncated inside {}", what)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_payload(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(current) = self.current.as_mut() else {
                return Ok(0);
            };
            if current.body.is_done() {
                self.complete_current().await?;
                return Ok(0);
            }

            let input = self.source.fill_buf().await?;
            let step = current.body.decode(input, out)?;
            self.source.consume(step.consumed);

            if step.produced > 0 {
                return Ok(step.produced);
            }
        }
    }

    /// Poll-based payload read used by the `AsyncRead` impl
    ///
    /// Stops at the end of the payload; the data descriptor is read and the
    /// entry verified by the next `next_entry`, `read_to_vec` or `drain`.
    fn poll_payload(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            let Some(current) = self.current.as_mut() else {
                return Poll::Ready(Ok(()));
            };
            if current.body.is_done() {
                return Poll::Ready(Ok(()));
            }

            let input = ready!(Pin::new(&mut self.source).poll_fill_buf(cx))?;
            let step = current
                .body
                .decode(input, buf.initialize_unfilled())
                .map_err(io::Error::from)?;
            Pin::new(&mut self.source).consume(step.consumed);

            if step.produced > 0 {
                buf.advance(step.produced);
                return Poll::Ready(Ok(()));
            }
        }
    }

    async fn drain_current(&mut self) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        if !current.completed && !current.body.is_done() {
            let raw = current.body.skip_rest();
            trace!(path = %current.header.path, raw, "draining entry");
        }

        let mut scratch = vec![0u8; DRAIN_CHUNK];
        while self.read_payload(&mut scratch).await? > 0 {}
        Ok(())
    }

    async fn finish_current(&mut self) -> Result<()> {
        self.drain_current().await?;
        self.current = None;
        Ok(())
    }

    async fn complete_current(&mut self) -> Result<()> {
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
            (true, None) => Some(self.read_data_descriptor(zip64).await?),
        };

        if let Some(current) = self.current.as_mut() {
            if self.verify {
                current.body.verify(&current.header, descriptor.as_ref())?;
            }
            current.completed = true;
        }
        Ok(())
    }

    async fn read_data_descriptor(&mut self, zip64: bool) -> Result<DataDescriptor> {
        let mut first = [0u8; 4];
        self.read_exact(&mut first, "data descriptor").await?;
        let has_signature = le_u32(&first) == DATA_DESCRIPTOR_SIGNATURE;

        let mut fields = vec![0u8; DataDescriptor::encoded_len(false, zip64)];
        if has_signature {
            self.read_exact(&mut fields, "data descriptor").await?;
        } else {
            fields[..4].copy_from_slice(&first);
            self.read_exact(&mut fields[4..], "data descriptor").await?;
        }
        Ok(DataDescriptor::parse(&fields, zip64))
    }
}

/// One entry of an [`AsyncZipStreamReader`]
pub struct AsyncZipEntry<'a, R: AsyncRead + Unpin> {
    reader: &'a mut AsyncZipStreamReader<R>,
}

impl<R: AsyncRead + Unpin> AsyncZipEntry<'_, R> {
    pub fn header(&self) -> &EntryHeader {
        match self.reader.current.as_ref() {
            Some(current) => &current.header,
            None => unreachable!("entry handle outlived its entry"),
        }
    }

    pub fn path(&self) -> &str {
        &self.header().path
    }

    pub fn is_directory(&self) -> bool {
        self.header().is_directory()
    }

    /// Buffer the whole payload, failing past `limit` decompressed bytes
    pub async fn read_to_vec(&mut self, limit: Option<u64>) -> Result<Vec<u8>> {
        let declared = self.header().uncompressed_size.unwrap_or(0);
        let mut data = Vec::with_capacity(declared.min(MAX_PREALLOCATION) as usize);
        let mut chunk = vec![0u8; DRAIN_CHUNK];

        loop {
            let n = self.reader.read_payload(&mut chunk).await?;
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

    pub async fn drain(self) -> Result<()> {
        self.reader.drain_current().await
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AsyncZipEntry<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().reader.poll_payload(cx, buf)
    }
}
