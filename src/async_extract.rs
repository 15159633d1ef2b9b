//! Pattern-driven extraction over a tokio `AsyncRead`
//!
//! Mirrors [`crate::extract`]. The source is owned by the call, so dropping the
//! returned future releases it on every path.

use crate::async_reader::AsyncZipStreamReader;
use crate::error::{ExtractError, Result};
use crate::extract::{entry_limit, is_candidate, total_limit_error};
use crate::files::ExtractedFiles;
use crate::header::EntryHeader;
use crate::options::ExtractOptions;
use crate::pattern::{Pattern, PatternSet};
use crate::persist;
use std::path::Path;
use tokio::io::AsyncRead;
use tracing::{debug, instrument, trace};

/// Async counterpart of [`crate::Extractor`]
#[derive(Debug, Clone, Default)]
pub struct AsyncExtractor {
    options: ExtractOptions,
}

impl AsyncExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Buffer the first file entry matching `pattern`
    #[instrument(skip_all, fields(pattern = %pattern))]
    pub async fn extract_one<R>(&self, reader: R, pattern: &str) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let pattern = Pattern::new(pattern);
        let mut zip = AsyncZipStreamReader::with_options(reader, &self.options);

        let mut found = None;
        while let Some(mut entry) = zip.next_entry().await? {
            if !is_candidate(entry.header()) || !pattern.matches(entry.path()) {
                trace!(path = entry.path(), "skip");
                continue;
            }
            let data = entry.read_to_vec(self.options.max_entry_size).await?;
            debug!(path = entry.path(), bytes = data.len(), "matched");
            found = Some(data);
            break;
        }

        if self.options.drain_remaining {
            zip.finish().await?;
        }

        match found {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(ExtractError::EntryNotFound(pattern.to_string())),
        }
    }

    /// Buffer every file entry matching any of `patterns`
    #[instrument(skip_all, fields(patterns = patterns.len()))]
    pub async fn extract_many<R, S>(&self, reader: R, patterns: &[S]) -> Result<ExtractedFiles>
    where
        R: AsyncRead + Unpin,
        S: AsRef<str>,
    {
        let patterns = PatternSet::new(patterns.iter().map(|p| p.as_ref()));
        let mut zip = AsyncZipStreamReader::with_options(reader, &self.options);
        let mut files = ExtractedFiles::new();
        let mut total = 0u64;

        while let Some(mut entry) = zip.next_entry().await? {
            if !is_candidate(entry.header()) || !patterns.matches(entry.path()) {
                trace!(path = entry.path(), "skip");
                continue;
            }
            let limit = entry_limit(&self.options, total);
            let data = entry
                .read_to_vec(limit)
                .await
                .map_err(|e| total_limit_error(e, &self.options))?;
            total += data.len() as u64;
            debug!(path = entry.path(), bytes = data.len(), "matched");
            files.insert(entry.path().to_string(), data);
        }

        debug!(count = files.len(), "done");
        Ok(files)
    }

    /// Follow a chain of patterns through nested archives
    pub async fn extract_chain<R, S>(&self, reader: R, chain: &[S]) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
        S: AsRef<str>,
    {
        let Some((first, rest)) = chain.split_first() else {
            return Err(ExtractError::InvalidArgument(
                "pattern chain must not be empty".to_string(),
            ));
        };

        let mut data = self.extract_one(reader, first.as_ref()).await?;
        for pattern in rest {
            let next = self.extract_one(&data[..], pattern.as_ref()).await?;
            data = next;
        }
        Ok(data)
    }

    /// Extract `target` from the archive `inner` found inside `reader`, and
    /// save it at `destination`
    #[instrument(skip_all, fields(inner = %inner, target = %target))]
    pub async fn extract_nested<R>(
        &self,
        reader: R,
        inner: &str,
        target: &str,
        destination: impl AsRef<Path>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let data = self.extract_chain(reader, &[inner, target]).await?;
        persist::save_async(data, destination).await
    }

    /// Headers of every entry, in archive order
    pub async fn list_entries<R>(&self, reader: R) -> Result<Vec<EntryHeader>>
    where
        R: AsyncRead + Unpin,
    {
        let mut zip = AsyncZipStreamReader::with_options(reader, &self.options);
        let mut headers = Vec::new();
        while let Some(entry) = zip.next_entry().await? {
            headers.push(entry.header().clone());
        }
        Ok(headers)
    }
}

/// Extract the first file matching `pattern` with default options
pub async fn extract_one_async<R: AsyncRead + Unpin>(reader: R, pattern: &str) -> Result<Vec<u8>> {
    AsyncExtractor::default().extract_one(reader, pattern).await
}

/// Extract every file matching any of `patterns` with default options
pub async fn extract_many_async<R, S>(reader: R, patterns: &[S]) -> Result<ExtractedFiles>
where
    R: AsyncRead + Unpin,
    S: AsRef<str>,
{
    AsyncExtractor::default().extract_many(reader, patterns).await
}

/// Follow `chain` through nested archives with default options
pub async fn extract_chain_async<R, S>(reader: R, chain: &[S]) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    S: AsRef<str>,
{
    AsyncExtractor::default().extract_chain(reader, chain).await
}

/// Extract `target` from the nested archive `inner` and save it to `destination`
pub async fn extract_nested_async<R: AsyncRead + Unpin>(
    reader: R,
    inner: &str,
    target: &str,
    destination: impl AsRef<Path>,
) -> Result<()> {
    AsyncExtractor::default()
        .extract_nested(reader, inner, target, destination)
        .await
}
