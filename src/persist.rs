//! Writing extracted bytes to disk
//!
//! The whole buffer is written to a temporary file next to the destination and
//! then renamed over it, so readers of the destination never observe a half
//! written file.

use crate::error::{ExtractError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Save `data` to `destination`, creating missing parent directories
///
/// An existing file at `destination` is replaced.
pub fn save(data: &[u8], destination: impl AsRef<Path>) -> Result<()> {
    let destination = destination.as_ref();
    write_atomically(destination, |file| {
        file.write_all(data)
            .map_err(|e| ExtractError::persist(destination, e))?;
        Ok(data.len() as u64)
    })?;
    debug!(path = %destination.display(), bytes = data.len(), "saved");
    Ok(())
}

/// Parent directory to create for `destination`, `.` for bare file names
pub(crate) fn parent_dir(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Create the parent directories, let `fill` write a sibling temporary file,
/// then rename it over `destination`
///
/// Returns what `fill` returned, usually the number of bytes written. If
/// `fill` fails the temporary file is removed and the destination untouched.
pub(crate) fn write_atomically<F>(destination: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut fs::File) -> Result<u64>,
{
    let parent = parent_dir(destination);
    fs::create_dir_all(parent).map_err(|e| ExtractError::persist(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| ExtractError::persist(parent, e))?;
    let written = fill(temp.as_file_mut())?;
    temp.as_file()
        .sync_all()
        .map_err(|e| ExtractError::persist(destination, e))?;
    temp.persist(destination)
        .map_err(|e| ExtractError::persist(destination, e.error))?;
    Ok(written)
}

/// Async variant of [`save`], run on tokio's blocking pool
#[cfg(feature = "async")]
pub async fn save_async(data: Vec<u8>, destination: impl AsRef<Path>) -> Result<()> {
    let destination = destination.as_ref().to_path_buf();
    let target = destination.clone();
    tokio::task::spawn_blocking(move || save(&data, &target))
        .await
        .map_err(|e| ExtractError::persist(destination, std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c/out.db");
        save(b"payload", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn overwrites_instead_of_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        save(b"first version", &path).unwrap();
        save(b"second", &path).unwrap();
        save(b"second", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn leaves_no_temporary_files_behind() {
        let dir = tempdir().unwrap();
        save(b"x", dir.path().join("only.txt")).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("only.txt")]);
    }

    #[test]
    fn failure_names_the_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file, not a directory").unwrap();

        let err = save(b"x", blocker.join("out.txt")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
        assert!(err.to_string().contains("blocker"));
    }
}
