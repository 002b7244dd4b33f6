use std::panic::Location;

use thiserror::Error;

/// Every error this crate's public API can return.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("not a valid chunk stream: {0}")]
    InvalidFile(String),

    #[error("chunk directory is corrupt: {0}")]
    DirectoryCorrupt(String),

    #[error("on-disk logical start {on_disk} does not match expected position {expected}")]
    FramingMismatch { expected: u64, on_disk: u64 },

    #[error(
        "CRC mismatch for chunk at logical offset {logical_start}: expected {expected:#010x}, got {actual:#010x}"
    )]
    CrcMismatch {
        logical_start: u64,
        expected: u32,
        actual: u32,
    },

    #[error("transform produced {actual} bytes, expected {expected}")]
    DecodeSizeMismatch { expected: u64, actual: u64 },

    #[error("read past end of stream at logical length {0}")]
    EndOfStream(u64),

    #[error("logical position {0} is out of range")]
    OutOfRange(u64),

    #[error("no chunk owns logical position {0} (producer-side hole)")]
    ChunkNotFound(u64),

    #[error("cursor already closed (first closed at {0})")]
    AlreadyClosed(&'static Location<'static>),

    #[error("operation aborted")]
    OperationAborted,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
