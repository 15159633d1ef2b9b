//! # s-unzip: Streaming ZIP Extraction
//!
//! `s-unzip` pulls files out of ZIP archives while the archive is still
//! arriving. It walks local file headers front to back, so it works on
//! sockets, HTTP bodies and pipes where the central directory at the end of
//! the file is not reachable yet.
//!
//! ## Features
//!
//! - **Forward-only**: Never seeks; entries are decoded as they stream past
//! - **Pattern Matching**: Exact paths, path suffixes and `*`/`?` globs on file names
//! - **Nested Archives**: Extract a ZIP from a ZIP, then a file from that
//! - **Verified**: CRC-32 and sizes are checked for every entry that is read
//! - **Async**: Tokio variants of every operation (`async` feature)
//!
//! ## Quick Start
//!
//! ### Extracting one file
//!
//! ```no_run
//! use std::fs::File;
//!
//! let archive = File::open("download.zip")?;
//! let data = s_unzip::extract_one(archive, "*.db")?;
//! println!("{} bytes", data.len());
//! # Ok::<(), s_unzip::ExtractError>(())
//! ```
//!
//! ### Extracting several files
//!
//! ```no_run
//! use std::fs::File;
//!
//! let archive = File::open("release.zip")?;
//! let files = s_unzip::extract_many(archive, &["README.md", "*.json"])?;
//! for (path, data) in files.iter() {
//!     println!("{}: {} bytes", path, data.len());
//! }
//! # Ok::<(), s_unzip::ExtractError>(())
//! ```
//!
//! ### Nested archives
//!
//! ```no_run
//! use s_unzip::{ExtractOptions, Extractor};
//! use std::fs::File;
//!
//! let extractor = Extractor::new(ExtractOptions::strict());
//! let archive = File::open("bundle.zip")?;
//! extractor.extract_nested(archive, "contents", "app.db", "data/app.db")?;
//! # Ok::<(), s_unzip::ExtractError>(())
//! ```

pub mod error;
pub mod extract;
pub mod files;
pub mod gzip;
pub mod header;
pub mod options;
pub mod pattern;
pub mod persist;
pub mod reader;

mod body;

#[cfg(feature = "async")]
pub mod async_reader;

#[cfg(feature = "async")]
pub mod async_extract;

#[cfg(feature = "async")]
pub mod stream;

pub use error::{ErrorKind, ExtractError, Result};
pub use extract::{extract_chain, extract_many, extract_nested, extract_one, list_entries, Extractor};
pub use files::ExtractedFiles;
pub use gzip::decompress_gzip;
pub use header::{CompressionMethod, EntryHeader};
pub use options::ExtractOptions;
pub use pattern::{matches, Pattern, PatternSet};
pub use persist::save;
pub use reader::{ZipEntry, ZipStreamReader};

#[cfg(feature = "async")]
pub use async_reader::{AsyncZipEntry, AsyncZipStreamReader};

#[cfg(feature = "async")]
pub use async_extract::{
    extract_chain_async, extract_many_async, extract_nested_async, extract_one_async,
    AsyncExtractor,
};

#[cfg(feature = "async")]
pub use gzip::decompress_gzip_async;

#[cfg(feature = "async")]
pub use persist::save_async;

#[cfg(feature = "async")]
pub use stream::ChunkStreamReader;
