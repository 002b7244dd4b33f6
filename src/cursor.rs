//! The user-facing handle: sequential and random-access reads over the logical byte stream,
//! with cheap cloning and zero-copy logical slicing.

use std::panic::Location;

use crate::error::{Error, Result};
use crate::reader::ChunkReader;

/// A read cursor over a chunk stream's logical byte space.
pub struct LogicalCursor {
    reader: ChunkReader,
    logical_base: u64,
    max_logical_length: Option<u64>,
    close_site: Option<&'static Location<'static>>,
}

impl LogicalCursor {
    pub fn new(reader: ChunkReader) -> Self {
        Self {
            reader,
            logical_base: 0,
            max_logical_length: None,
            close_site: None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if let Some(site) = self.close_site {
            return Err(Error::AlreadyClosed(site));
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure_open()?;
        if self.at_slice_bound()? {
            return Err(Error::EndOfStream(self.length()));
        }
        if self.reader.buffer_offset >= self.reader.buffer_fill_size {
            self.reader.refill_buffer(true)?;
        }
        let b = self.reader.buffer_byte(self.reader.buffer_offset);
        self.reader.buffer_offset += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let mut filled = 0usize;
        while filled < dst.len() {
            if self.at_slice_bound()? {
                return Err(Error::EndOfStream(self.length()));
            }
            if self.reader.buffer_offset >= self.reader.buffer_fill_size {
                self.reader.refill_buffer(true)?;
            }
            let available = (self.reader.buffer_fill_size - self.reader.buffer_offset) as usize;
            let take = available.min(dst.len() - filled);
            let src = self.reader.buffer_slice(self.reader.buffer_offset, take as u64);
            dst[filled..filled + take].copy_from_slice(src);
            self.reader.buffer_offset += take as u64;
            filled += take;
        }
        Ok(())
    }

    /// `true` once a bounded slice has been fully consumed, so the next read reports
    /// `EndOfStream` instead of reading into the parent stream beyond the slice's bound.
    fn at_slice_bound(&self) -> Result<bool> {
        Ok(match self.max_logical_length {
            Some(max) => self.tell() >= max,
            None => false,
        })
    }

    pub fn tell(&self) -> u64 {
        self.reader.buffer_logical_start + self.reader.buffer_offset - self.logical_base
    }

    pub fn length(&self) -> u64 {
        self.max_logical_length
            .unwrap_or_else(|| self.reader.total_logical_length())
    }

    pub fn seek(&mut self, p: u64) -> Result<()> {
        self.ensure_open()?;
        self.reader.seek(p + self.logical_base)
    }

    /// Deep-clones the raw handle and transform, shares the directory, pool, cache, current
    /// buffer (refcount++) and compressed scratch buffer with `self`.
    pub fn try_clone(&self) -> Result<LogicalCursor> {
        self.ensure_open()?;
        Ok(LogicalCursor {
            reader: self.reader.try_clone()?,
            logical_base: self.logical_base,
            max_logical_length: self.max_logical_length,
            close_site: None,
        })
    }

    /// A cloned cursor windowed to `[base, base + length)` of `self`'s logical space.
    pub fn slice(&self, base: u64, length: u64) -> Result<LogicalCursor> {
        self.ensure_open()?;
        let mut cloned = self.try_clone()?;
        cloned.logical_base = self.logical_base + base;
        cloned.max_logical_length = Some(length);
        cloned.seek(0)?;
        Ok(cloned)
    }

    #[track_caller]
    pub fn close(&mut self) -> Result<()> {
        if let Some(site) = self.close_site {
            return Err(Error::AlreadyClosed(site));
        }
        self.close_site = Some(Location::caller());
        self.reader.close()
    }
}
