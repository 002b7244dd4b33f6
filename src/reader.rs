//! Parses the file header, loads or reconstructs the chunk directory, decompresses chunks
//! on demand, enforces CRC, and orchestrates the directory/pool/cache collaborators.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::DecompressionCache;
use crate::directory::ChunkDirectory;
use crate::error::{Error, Result};
use crate::format;
use crate::pool::{SharedBuffer, SharedBufferPool};
use crate::raw::RawInput;
use crate::transform::ReadTransform;
use crate::util::varint::uvarint_len;

pub struct ChunkReader {
    raw: Box<dyn RawInput>,
    transform: Box<dyn ReadTransform>,
    directory: Arc<ChunkDirectory>,
    pool: Arc<SharedBufferPool>,
    cache: Option<Arc<DecompressionCache>>,
    compressed_buffer: Arc<Mutex<Vec<u8>>>,
    buffer: SharedBuffer,
    pub(crate) buffer_logical_start: u64,
    pub(crate) buffer_offset: u64,
    pub(crate) buffer_fill_size: u64,
    current_chunk_idx: usize,
    buffer_inflated_physical_pos: Option<u64>,
    max_logical_chunk_size: u64,
}

impl ChunkReader {
    pub fn open(
        mut raw: Box<dyn RawInput>,
        mut transform: Box<dyn ReadTransform>,
        pool: Arc<SharedBufferPool>,
        cache: Option<Arc<DecompressionCache>>,
    ) -> Result<Self> {
        let file_len = raw.length()?;
        if file_len < format::MIN_FILE_LEN {
            return Err(Error::InvalidFile(format!(
                "file is {file_len} bytes, need at least {}",
                format::MIN_FILE_LEN
            )));
        }

        raw.seek(0)?;
        let magic = raw.read_u64_be()?;
        if magic != format::HEADER_MAGIC {
            return Err(Error::InvalidFile(format!("bad header magic {magic:#x}")));
        }
        let config_len = raw.read_uvarint()?;
        let mut config = vec![0u8; config_len as usize];
        raw.read_exact(&mut config)?;
        transform.set_config(&config)?;
        let header_len = 8 + uvarint_len(config_len) as u64 + config_len;

        let directory = ChunkDirectory::load(raw.as_mut(), transform.as_mut(), header_len, file_len)?;
        info!(
            chunks = directory.len(),
            total_logical_length = directory.total_logical_length(),
            "opened chunk stream"
        );

        let max_logical_chunk_size = directory.max_logical_length();
        let buffer = pool.acquire(max_logical_chunk_size as usize);

        if let Some(first) = directory.entries().first() {
            raw.seek(first.physical_start)?;
        }

        Ok(Self {
            raw,
            transform,
            directory: Arc::new(directory),
            pool,
            cache,
            compressed_buffer: Arc::new(Mutex::new(Vec::new())),
            buffer,
            buffer_logical_start: 0,
            buffer_offset: 0,
            buffer_fill_size: 0,
            current_chunk_idx: 0,
            buffer_inflated_physical_pos: None,
            max_logical_chunk_size,
        })
    }

    pub fn total_logical_length(&self) -> u64 {
        self.directory.total_logical_length()
    }

    pub(crate) fn buffer_byte(&self, at: u64) -> u8 {
        self.buffer.as_slice()[at as usize]
    }

    pub(crate) fn buffer_slice(&self, from: u64, len: u64) -> &[u8] {
        &self.buffer.as_slice()[from as usize..(from + len) as usize]
    }

    /// Deep-clones the raw handle and transform, and shares the directory, pool, cache,
    /// current buffer (refcount++) and compressed scratch buffer with the original.
    pub fn try_clone(&self) -> Result<ChunkReader> {
        Ok(ChunkReader {
            raw: self.raw.try_clone()?,
            transform: self.transform.copy(),
            directory: self.directory.clone(),
            pool: self.pool.clone(),
            cache: self.cache.clone(),
            compressed_buffer: self.compressed_buffer.clone(),
            buffer: self.buffer.clone(),
            buffer_logical_start: self.buffer_logical_start,
            buffer_offset: self.buffer_offset,
            buffer_fill_size: self.buffer_fill_size,
            current_chunk_idx: self.current_chunk_idx,
            buffer_inflated_physical_pos: self.buffer_inflated_physical_pos,
            max_logical_chunk_size: self.max_logical_chunk_size,
        })
    }

    /// Refills the current buffer with the next (or, with logical context, the
    /// position-appropriate) chunk's decompressed payload.
    pub(crate) fn refill_buffer(&mut self, has_logical_context: bool) -> Result<()> {
        self.refill_buffer_toward(has_logical_context, None)
    }

    /// Like [`Self::refill_buffer`], but for a `seek` caller: `seek_target` is the actual
    /// logical position being sought, which may be past the owning entry's own start (e.g.
    /// a seek into the un-shadowed tail of a chunk partially overwritten by a later one).
    /// The visibility clamp must be computed against that real target, not the entry's
    /// start, or a later overwrite starting *before* the target would wrongly clamp it out.
    pub(crate) fn refill_buffer_toward(
        &mut self,
        has_logical_context: bool,
        seek_target: Option<u64>,
    ) -> Result<()> {
        self.buffer_logical_start += self.buffer_fill_size;
        if has_logical_context && self.buffer_logical_start >= self.directory.total_logical_length()
        {
            return Err(Error::EndOfStream(self.buffer_logical_start));
        }

        // The position this refill is actually meant to serve. `reconcile_position` may walk
        // `buffer_logical_start` back to the start of the owning entry (e.g. resuming an
        // earlier chunk's tail past an overwrite that shadowed its middle); `target` keeps
        // the true position so the visibility clamp below knows what's still ahead of it
        // versus what's already been served.
        let target = seek_target.unwrap_or(self.buffer_logical_start);
        let mut initial_offset = 0u64;
        if has_logical_context {
            initial_offset = self.reconcile_position(target)?;
        }

        let physical_start = self.raw.tell()?;

        let _guard = if has_logical_context {
            self.cache.as_ref().map(|c| c.lock(self.buffer_logical_start))
        } else {
            None
        };

        if let Some(cache) = self.cache.as_ref().filter(|_| has_logical_context) {
            if let Some(bytes) = cache.get(self.buffer_logical_start) {
                let min_cap = bytes.len().max(self.max_logical_chunk_size as usize);
                let dst = self.buffer.make_mut(&self.pool, min_cap);
                dst[..bytes.len()].copy_from_slice(&bytes);
                let next_physical = self.directory.physical_after(self.current_chunk_idx);
                self.raw.seek(next_physical)?;
                let visible_end = self.directory.visible_end(self.current_chunk_idx, target);
                self.buffer_fill_size =
                    (bytes.len() as u64).min(visible_end - self.buffer_logical_start);
                self.buffer_offset = initial_offset;
                // No prefetch-memoization path exists in this implementation (§9); a cache
                // hit has no physical frame identity to remember.
                self.buffer_inflated_physical_pos = None;
                self.current_chunk_idx += 1;
                return Ok(());
            }
        }

        let header = format::read_frame_header(self.raw.as_mut())?;
        if has_logical_context && header.logical_start != self.buffer_logical_start {
            return Err(Error::FramingMismatch {
                expected: self.buffer_logical_start,
                on_disk: header.logical_start,
            });
        }

        let min_cap = header
            .logical_length
            .max(header.compressed_size)
            .max(self.max_logical_chunk_size) as usize;

        let mut comp_guard = self.compressed_buffer.lock();
        let dst = self.buffer.make_mut(&self.pool, min_cap);
        let effective_len = format::decompress_and_verify_frame(
            self.raw.as_mut(),
            self.transform.as_mut(),
            &header,
            &mut comp_guard,
            dst,
        )?;
        drop(comp_guard);

        if let Some(cache) = self.cache.as_ref().filter(|_| has_logical_context) {
            cache.put(
                self.buffer_logical_start,
                &self.buffer.as_slice()[..effective_len as usize],
            );
        }

        let visible_end = self.directory.visible_end(self.current_chunk_idx, target);
        self.buffer_fill_size = effective_len.min(visible_end - self.buffer_logical_start);
        self.buffer_offset = initial_offset;
        self.buffer_inflated_physical_pos = Some(physical_start);
        self.current_chunk_idx += 1;
        Ok(())
    }

    /// Ensures the raw input is positioned at the chunk that currently owns logical position
    /// `p`, resolving overwrites in favor of the most recent write. May rewind
    /// `self.buffer_logical_start` to an earlier entry's own start when resuming that entry's
    /// shadowed-then-exposed tail; the returned offset is how far into that entry's buffer `p`
    /// actually falls.
    fn reconcile_position(&mut self, p: u64) -> Result<u64> {
        let entries = self.directory.entries();

        if let Some(cur) = entries.get(self.current_chunk_idx) {
            if cur.logical_start == p {
                return Ok(0);
            }
        }
        if let Some(next) = entries.get(self.current_chunk_idx + 1) {
            if next.logical_start == p {
                self.current_chunk_idx += 1;
                return Ok(0);
            }
        }

        // Neither append-order fast path applies: either an overwrite has shadowed the
        // expected next chunk, or we're resuming an earlier chunk's tail after having already
        // walked `currentChunkIdx` past it. Either way, a direct owner lookup is authoritative;
        // `find_owning_chunk` cannot fail here since `p < totalLogicalLength` is guaranteed by
        // the caller and every in-range position has a covering entry by construction.
        let i = self
            .directory
            .find_owning_chunk(p)
            .map_err(|_| Error::ChunkNotFound(p))?;
        let rec = self.directory.entry(i);
        self.current_chunk_idx = i;
        self.raw.seek(rec.physical_start)?;
        if rec.logical_start != p {
            self.buffer_logical_start = rec.logical_start;
            return Ok(p - rec.logical_start);
        }
        Ok(0)
    }

    /// Seeks to absolute logical position `p` (already adjusted for any slice base).
    pub(crate) fn seek(&mut self, p: u64) -> Result<()> {
        if self.buffer_fill_size > 0
            && p >= self.buffer_logical_start
            && p < self.buffer_logical_start + self.buffer_fill_size
        {
            self.buffer_offset = p - self.buffer_logical_start;
            return Ok(());
        }

        let i = self
            .directory
            .find_owning_chunk(p)
            .map_err(|_| Error::OutOfRange(p))?;
        let rec = self.directory.entry(i);

        if rec.logical_start != self.buffer_logical_start || self.buffer_fill_size == 0 {
            self.buffer_logical_start = rec.logical_start;
            self.current_chunk_idx = i;
            self.buffer_fill_size = 0;
            self.raw.seek(rec.physical_start)?;
            self.refill_buffer_toward(true, Some(p))?;
        }

        self.buffer_offset = p - self.buffer_logical_start;
        if self.buffer_offset > self.buffer_fill_size {
            return Err(Error::OutOfRange(p));
        }
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.raw.close()
    }
}
