//! The seekable byte source a [`crate::reader::ChunkReader`] reads a physical file through.
//!
//! The writer side that produces chunk-stream files is not part of this crate's public
//! surface; [`FileInput`] is the one concrete, production-grade implementation shipped here,
//! wrapping a plain [`std::fs::File`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::util::varint::read_uvarint;

/// A seekable, clonable byte source.
///
/// `try_clone` must produce a handle with an independent seek position - implementations
/// backed by an OS file descriptor should reopen the path rather than `dup` the descriptor,
/// since a duplicated descriptor shares its offset with the original on most platforms.
pub trait RawInput: Send {
    fn seek(&mut self, pos: u64) -> Result<()>;
    fn tell(&mut self) -> Result<u64>;
    fn length(&mut self) -> Result<u64>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    fn read_u64_be(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_uvarint(&mut self) -> Result<u64>;

    fn close(&mut self) -> Result<()>;

    fn try_clone(&self) -> Result<Box<dyn RawInput>>;
}

/// A [`RawInput`] backed by a real file on disk.
pub struct FileInput {
    path: PathBuf,
    file: File,
}

impl FileInput {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }
}

impl RawInput for FileInput {
    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn length(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        Read::read_exact(&mut self.file, buf)?;
        Ok(())
    }

    fn read_uvarint(&mut self) -> Result<u64> {
        read_uvarint(&mut self.file)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn RawInput>> {
        Ok(Box::new(FileInput::open(&self.path)?))
    }
}

/// Convenience used by tests and small embedders that already have a path handy.
pub fn open_file(path: impl AsRef<Path>) -> Result<Box<dyn RawInput>> {
    Ok(Box::new(FileInput::open(path.as_ref())?))
}
