//! Pattern-driven extraction over a blocking `Read`
//!
//! Three operations share one scanning loop:
//!
//! - [`Extractor::extract_one`] returns the first matching entry and stops
//! - [`Extractor::extract_many`] collects every matching entry until the end
//! - [`Extractor::extract_nested`] pulls an archive out of an archive, then a
//!   file out of that, and saves it

use crate::error::{ExtractError, Result};
use crate::files::ExtractedFiles;
use crate::header::EntryHeader;
use crate::options::ExtractOptions;
use crate::pattern::{Pattern, PatternSet};
use crate::persist;
use crate::reader::ZipStreamReader;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, instrument, trace};

/// Extract files from ZIP streams with a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Buffer the first file entry matching `pattern`
    ///
    /// Entries before it are drained, and so are the ones after it unless
    /// [`ExtractOptions::drain_remaining`] is off. Fails with
    /// [`ExtractError::EntryNotFound`] if the stream ends without a match or the
    /// match has no content.
    #[instrument(skip_all, fields(pattern = %pattern))]
    pub fn extract_one<R: Read>(&self, reader: R, pattern: &str) -> Result<Vec<u8>> {
        let pattern = Pattern::new(pattern);
        let mut zip = ZipStreamReader::with_options(reader, &self.options);

        let mut found = None;
        while let Some(mut entry) = zip.next_entry()? {
            if !is_candidate(entry.header()) || !pattern.matches(entry.path()) {
                trace!(path = entry.path(), "skip");
                continue;
            }
            let data = entry.read_to_vec(self.options.max_entry_size)?;
            debug!(path = entry.path(), bytes = data.len(), "matched");
            found = Some(data);
            break;
        }

        if self.options.drain_remaining {
            zip.finish()?;
        }

        match found {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(ExtractError::EntryNotFound(pattern.to_string())),
        }
    }

    /// Buffer every file entry matching any of `patterns`
    ///
    /// Keys are the entry paths as stored in the archive. No match at all is
    /// an empty result, not an error.
    #[instrument(skip_all, fields(patterns = patterns.len()))]
    pub fn extract_many<R, S>(&self, reader: R, patterns: &[S]) -> Result<ExtractedFiles>
    where
        R: Read,
        S: AsRef<str>,
    {
        let patterns = PatternSet::new(patterns.iter().map(|p| p.as_ref()));
        let mut zip = ZipStreamReader::with_options(reader, &self.options);
        let mut files = ExtractedFiles::new();
        let mut total = 0u64;

        while let Some(mut entry) = zip.next_entry()? {
            if !is_candidate(entry.header()) || !patterns.matches(entry.path()) {
                trace!(path = entry.path(), "skip");
                continue;
            }
            let limit = entry_limit(&self.options, total);
            let data = entry.read_to_vec(limit).map_err(|e| total_limit_error(e, &self.options))?;
            total += data.len() as u64;
            debug!(path = entry.path(), bytes = data.len(), "matched");
            files.insert(entry.path().to_string(), data);
        }

        debug!(count = files.len(), "done");
        Ok(files)
    }

    /// Follow a chain of patterns through nested archives
    ///
    /// Every pattern but the last selects an archive inside the previous one;
    /// the last selects the file to return.
    pub fn extract_chain<R, S>(&self, reader: R, chain: &[S]) -> Result<Vec<u8>>
    where
        R: Read,
        S: AsRef<str>,
    {
        let Some((first, rest)) = chain.split_first() else {
            return Err(ExtractError::InvalidArgument(
                "pattern chain must not be empty".to_string(),
            ));
        };

        let mut data = self.extract_one(reader, first.as_ref())?;
        for pattern in rest {
            data = self.extract_one(Cursor::new(data), pattern.as_ref())?;
        }
        Ok(data)
    }

    /// Extract `target` from the archive `inner` found inside `reader`, and
    /// save it at `destination`
    #[instrument(skip_all, fields(inner = %inner, target = %target, destination = %destination.as_ref().display()))]
    pub fn extract_nested<R: Read>(
        &self,
        reader: R,
        inner: &str,
        target: &str,
        destination: impl AsRef<Path>,
    ) -> Result<()> {
        let data = self.extract_chain(reader, &[inner, target])?;
        persist::save(&data, destination)
    }

    /// Headers of every entry, in archive order
    pub fn list_entries<R: Read>(&self, reader: R) -> Result<Vec<EntryHeader>> {
        let mut zip = ZipStreamReader::with_options(reader, &self.options);
        let mut headers = Vec::new();
        while let Some(entry) = zip.next_entry()? {
            headers.push(entry.header().clone());
        }
        Ok(headers)
    }
}

/// Directory entries carry no content and are never extracted
pub(crate) fn is_candidate(header: &EntryHeader) -> bool {
    !header.is_directory()
}

/// Per-entry cap, tightened by whatever is left of the total budget
pub(crate) fn entry_limit(options: &ExtractOptions, buffered: u64) -> Option<u64> {
    let left = options
        .max_total_size
        .map(|total| total.saturating_sub(buffered));
    match (options.max_entry_size, left) {
        (Some(entry), Some(left)) => Some(entry.min(left)),
        (entry, left) => entry.or(left),
    }
}

/// Report the total cap rather than the tightened per-entry cap when that is what tripped
pub(crate) fn total_limit_error(err: ExtractError, options: &ExtractOptions) -> ExtractError {
    match (err, options.max_total_size) {
        (ExtractError::LimitExceeded { path, limit }, Some(total))
            if options.max_entry_size.map_or(true, |entry| limit < entry) =>
        {
            ExtractError::LimitExceeded { path, limit: total }
        }
        (err, _) => err,
    }
}

/// Extract the first file matching `pattern` with default options
pub fn extract_one<R: Read>(reader: R, pattern: &str) -> Result<Vec<u8>> {
    Extractor::default().extract_one(reader, pattern)
}

/// Extract every file matching any of `patterns` with default options
pub fn extract_many<R: Read, S: AsRef<str>>(reader: R, patterns: &[S]) -> Result<ExtractedFiles> {
    Extractor::default().extract_many(reader, patterns)
}

/// Follow `chain` through nested archives with default options
pub fn extract_chain<R: Read, S: AsRef<str>>(reader: R, chain: &[S]) -> Result<Vec<u8>> {
    Extractor::default().extract_chain(reader, chain)
}

/// Extract `target` from the nested archive `inner` and save it to `destination`
pub fn extract_nested<R: Read>(
    reader: R,
    inner: &str,
    target: &str,
    destination: impl AsRef<Path>,
) -> Result<()> {
    Extractor::default().extract_nested(reader, inner, target, destination)
}

/// List entry headers with default options
pub fn list_entries<R: Read>(reader: R) -> Result<Vec<EntryHeader>> {
    Extractor::default().list_entries(reader)
}
