//! Streaming `.gz` decompression straight to a file
//!
//! Some downloads come gzip-compressed rather than zipped. These helpers
//! decode them chunk by chunk into the destination without holding the whole
//! file in memory, using the same write-then-rename policy as [`crate::persist`].

use crate::error::{ExtractError, Result};
use crate::persist::write_atomically;
use flate2::read::MultiGzDecoder;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

const CHUNK: usize = 64 * 1024;

/// Decompress a gzip stream into `destination`; returns the decompressed size
///
/// Concatenated gzip members are decoded back to back, as `gunzip` does.
pub fn decompress_gzip<R: Read>(reader: R, destination: impl AsRef<Path>) -> Result<u64> {
    let destination = destination.as_ref();
    let mut decoder = MultiGzDecoder::new(reader);

    let written = write_atomically(destination, |file| {
        let mut chunk = vec![0u8; CHUNK];
        let mut written = 0u64;
        loop {
            let n = decoder.read(&mut chunk).map_err(ExtractError::from)?;
            if n == 0 {
                return Ok(written);
            }
            file.write_all(&chunk[..n])
                .map_err(|e| ExtractError::persist(destination, e))?;
            written += n as u64;
        }
    })?;

    debug!(path = %destination.display(), bytes = written, "gunzipped");
    Ok(written)
}

/// Async variant of [`decompress_gzip`]
#[cfg(feature = "async")]
pub async fn decompress_gzip_async<R>(reader: R, destination: impl AsRef<Path>) -> Result<u64>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use async_compression::tokio::bufread::GzipDecoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

    let destination = destination.as_ref();
    let parent = crate::persist::parent_dir(destination);
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ExtractError::persist(parent, e))?;

    let dir = parent.to_path_buf();
    let temp = tokio::task::spawn_blocking(move || tempfile::NamedTempFile::new_in(dir))
        .await
        .map_err(|e| ExtractError::persist(parent, std::io::Error::other(e)))?
        .map_err(|e| ExtractError::persist(parent, e))?;
    let (file, temp_path) = temp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut decoder = GzipDecoder::new(BufReader::new(reader));
    decoder.multiple_members(true);

    let mut chunk = vec![0u8; CHUNK];
    let mut written = 0u64;
    loop {
        let n = decoder.read(&mut chunk).await.map_err(ExtractError::from)?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n])
            .await
            .map_err(|e| ExtractError::persist(destination, e))?;
        written += n as u64;
    }
    file.flush()
        .await
        .map_err(|e| ExtractError::persist(destination, e))?;
    file.sync_all()
        .await
        .map_err(|e| ExtractError::persist(destination, e))?;
    drop(file);

    let target = destination.to_path_buf();
    tokio::task::spawn_blocking(move || temp_path.persist(target))
        .await
        .map_err(|e| ExtractError::persist(destination, std::io::Error::other(e)))?
        .map_err(|e| ExtractError::persist(destination, e.error))?;

    debug!(path = %destination.display(), bytes = written, "gunzipped");
    Ok(written)
}
