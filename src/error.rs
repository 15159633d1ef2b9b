//! Error types for s-unzip

use std::io;
use std::path::PathBuf;

/// Result type for s-unzip operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Coarse classification of an [`ExtractError`]
///
/// Callers that only need to decide between "nothing to return" and
/// "something broke" can match on this instead of every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No archive entry matched the requested pattern
    NotFound,
    /// Reading, parsing or decoding the archive stream failed
    Stream,
    /// Persisting extracted bytes to disk failed
    Io,
}

/// Error types that can occur while extracting from a ZIP stream
#[derive(Debug)]
pub enum ExtractError {
    /// I/O error from the underlying byte source
    Io(io::Error),
    /// Invalid ZIP format or structure (bad signature, truncated header, ...)
    InvalidFormat(String),
    /// No entry matched the pattern before the end of the stream
    EntryNotFound(String),
    /// Entry uses a compression method this build cannot decode
    UnsupportedCompression { path: String, method: u16 },
    /// Entry is encrypted
    Encrypted(String),
    /// Decompressed data does not match the stored CRC-32
    ChecksumMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },
    /// Decompressed length does not match the stored size
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },
    /// A configured buffering cap was exceeded
    LimitExceeded { path: String, limit: u64 },
    /// The caller passed arguments that cannot describe an extraction
    InvalidArgument(String),
    /// Creating the destination directory or writing the file failed
    Persist { path: PathBuf, source: io::Error },
}

impl ExtractError {
    /// Classify this error into one of the three error kinds
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::EntryNotFound(_) => ErrorKind::NotFound,
            ExtractError::Persist { .. } => ErrorKind::Io,
            _ => ErrorKind::Stream,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn persist(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Persist {
            path: path.into(),
            source,
        }
    }

    /// Recover an `ExtractError` that was tunnelled through an `io::Error`
    pub(crate) fn from_io(err: io::Error) -> Self {
        if !err
            .get_ref()
            .is_some_and(|inner| inner.is::<ExtractError>())
        {
            return ExtractError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<ExtractError>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => ExtractError::Io(io::Error::other(other)),
            None => ExtractError::Io(io::Error::other("empty wrapped error")),
        }
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "I/O error: {}", e),
            ExtractError::InvalidFormat(msg) => write!(f, "Invalid ZIP format: {}", msg),
            ExtractError::EntryNotFound(pattern) => {
                write!(f, "File matching pattern \"{}\" not found in zip", pattern)
            }
            ExtractError::UnsupportedCompression { path, method } => {
                write!(f, "Unsupported compression method {} for {}", method, path)
            }
            ExtractError::Encrypted(path) => write!(f, "Entry is encrypted: {}", path),
            ExtractError::ChecksumMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "CRC-32 mismatch for {}: expected 0x{:08x}, got 0x{:08x}",
                path, expected, actual
            ),
            ExtractError::SizeMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "Size mismatch for {}: expected {} bytes, got {}",
                path, expected, actual
            ),
            ExtractError::LimitExceeded { path, limit } => {
                write!(f, "Entry {} exceeds the {} byte buffering limit", path, limit)
            }
            ExtractError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ExtractError::Persist { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io(e) => Some(e),
            ExtractError::Persist { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ExtractError {
    fn from(err: io::Error) -> Self {
        ExtractError::from_io(err)
    }
}

impl From<ExtractError> for io::Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}
