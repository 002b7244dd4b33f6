#![forbid(unsafe_code)]

//! Read-side core of a log-structured, chunked, transparently-transformed random-access
//! byte stream. A producer (not part of this crate's public surface) writes a file as a
//! sequence of independently transformable chunks terminated by a chunk directory; this
//! crate provides random access over the logical (post-transform) byte space as if it were
//! a flat file, despite the physical file being append-only, chunked, possibly containing
//! overwrites, and potentially lacking a valid directory.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cache;
pub mod cursor;
pub mod directory;
pub mod error;
pub mod format;
pub mod pool;
pub mod raw;
pub mod reader;
pub mod transform;

pub mod util {
    pub mod varint;
}

use std::path::Path;
use std::sync::Arc;

pub use crate::cache::DecompressionCache;
pub use crate::cursor::LogicalCursor;
pub use crate::directory::{ChunkDirectory, ChunkRecord};
pub use crate::error::{Error, Result};
pub use crate::pool::{SharedBuffer, SharedBufferPool};
pub use crate::raw::{FileInput, RawInput};
pub use crate::reader::ChunkReader;
pub use crate::transform::{IdentityTransform, ReadTransform, ZstdTransform};

/// Options controlling a reader's decompression cache. The transform itself is not an
/// option here: the caller constructs the concrete `Box<dyn ReadTransform>` it wants and
/// hands it to [`open`]/[`open_with`] directly.
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Number of distinct chunks the `DecompressionCache` retains. `0` disables the cache.
    pub cache_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { cache_capacity: 256 }
    }
}

/// Opens a chunk stream file at `path` and returns a cursor positioned at logical offset 0.
pub fn open(
    path: impl AsRef<Path>,
    transform: Box<dyn ReadTransform>,
    options: ReaderOptions,
) -> Result<LogicalCursor> {
    open_with(raw::open_file(path)?, transform, options)
}

/// Opens a chunk stream over an already-constructed [`RawInput`].
pub fn open_with(
    raw: Box<dyn RawInput>,
    transform: Box<dyn ReadTransform>,
    options: ReaderOptions,
) -> Result<LogicalCursor> {
    let pool = Arc::new(SharedBufferPool::new());
    let cache = (options.cache_capacity > 0)
        .then(|| Arc::new(DecompressionCache::new(options.cache_capacity)));
    let reader = ChunkReader::open(raw, transform, pool, cache)?;
    Ok(LogicalCursor::new(reader))
}

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::transform::{IdentityTransform, ReadTransform, ZstdTransform};
    pub use crate::{LogicalCursor, ReaderOptions, open, open_with};
}
