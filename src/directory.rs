//! In-memory index mapping logical ranges to physical chunk frames.
//!
//! Entries are kept in append order, the order the producer wrote them in, which is also
//! physical order in an append-only file. Logical ranges may overlap; [`ChunkDirectory::find_owning_chunk`]
//! always resolves overlaps to the highest-append-index (most recently written) covering entry.

use std::io::Cursor;

use tracing::warn;

use crate::error::{Error, Result};
use crate::format::{self, FrameHeader, TRAILER_FIXED_LEN};
use crate::raw::RawInput;
use crate::transform::ReadTransform;
use crate::util::varint::read_uvarint;

/// Below this entry count, `find_owning_chunk` scans every entry rather than bracketing a
/// window with a sorted side table - not worth the second allocation for small directories.
const LINEAR_SCAN_THRESHOLD: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    pub logical_start: u64,
    pub physical_start: u64,
    pub logical_length: u64,
}

impl ChunkRecord {
    fn covers(&self, p: u64) -> bool {
        self.logical_start <= p && p < self.logical_start + self.logical_length
    }
}

pub struct ChunkDirectory {
    /// Append order: entries[i] was the i-th chunk frame the producer wrote.
    entries: Vec<ChunkRecord>,
    /// `(logical_start, append_index)`, sorted by `logical_start` then `append_index`, used
    /// to bracket a search window for large directories.
    by_logical_start: Vec<(u64, usize)>,
    total_logical_length: u64,
    max_logical_length: u64,
    /// Physical start to resume sequential reads at after the last append-order entry:
    /// the directory frame's own offset when loaded from a trailer, or the file length
    /// when recovered by scan (there is nothing to read after the last chunk).
    post_entries_physical: u64,
}

impl ChunkDirectory {
    pub fn entries(&self) -> &[ChunkRecord] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> ChunkRecord {
        self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_logical_length(&self) -> u64 {
        self.total_logical_length
    }

    pub fn max_logical_length(&self) -> u64 {
        self.max_logical_length
    }

    /// Physical offset to resume at once `idx`'s frame has been fully consumed: the next
    /// entry's physical start in append order, or the tail of the chunk body if `idx` is
    /// the last entry.
    pub fn physical_after(&self, idx: usize) -> u64 {
        self.entries
            .get(idx + 1)
            .map(|e| e.physical_start)
            .unwrap_or(self.post_entries_physical)
    }

    /// The logical position at which entry `idx` stops being servable when read starting
    /// from `from` (`entries[idx].logical_start <= from < entries[idx].logical_start +
    /// entries[idx].logical_length`): either `idx`'s own end, or the start of the nearest
    /// entry written after `idx` whose range begins at or past `from`. Entries that start
    /// before `from` are already behind the read and don't shadow what's ahead of it - this
    /// lets a chunk whose middle was overwritten be resumed past the overwrite without
    /// immediately re-clamping to the same boundary that was already served.
    pub fn visible_end(&self, idx: usize, from: u64) -> u64 {
        let rec = self.entries[idx];
        let mut end = rec.logical_start + rec.logical_length;
        for other in &self.entries[idx + 1..] {
            if other.logical_start >= from && other.logical_start < end {
                end = other.logical_start;
            }
        }
        end
    }

    /// Returns the append-order index of the authoritative (highest-append-index, i.e.
    /// most-recently-written) entry covering logical position `p`.
    pub fn find_owning_chunk(&self, p: u64) -> Result<usize> {
        if p >= self.total_logical_length {
            return Err(Error::OutOfRange(p));
        }

        if self.entries.len() < LINEAR_SCAN_THRESHOLD {
            let mut best: Option<usize> = None;
            for (idx, rec) in self.entries.iter().enumerate() {
                if rec.covers(p) && best.is_none_or(|b| idx > b) {
                    best = Some(idx);
                }
            }
            return best.ok_or(Error::OutOfRange(p));
        }

        let lower_bound = p.saturating_sub(self.max_logical_length.saturating_add(1));
        let start = self.by_logical_start.partition_point(|&(ls, _)| ls < lower_bound);
        let mut best: Option<usize> = None;
        for &(ls, idx) in &self.by_logical_start[start..] {
            if ls > p {
                break;
            }
            let rec = self.entries[idx];
            if rec.covers(p) && best.is_none_or(|b| idx > b) {
                best = Some(idx);
            }
        }
        best.ok_or(Error::OutOfRange(p))
    }

    pub fn load(
        raw: &mut dyn RawInput,
        transform: &mut dyn ReadTransform,
        header_len: u64,
        file_len: u64,
    ) -> Result<Self> {
        match Self::build_from_trailer(raw, transform, file_len) {
            Ok(Some(dir)) => return Ok(dir),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "directory trailer invalid, falling back to scan recovery"),
        }
        Self::build_from_scan(raw, header_len, file_len)
    }

    fn build_from_trailer(
        raw: &mut dyn RawInput,
        transform: &mut dyn ReadTransform,
        file_len: u64,
    ) -> Result<Option<Self>> {
        if file_len < TRAILER_FIXED_LEN {
            return Ok(None);
        }
        raw.seek(file_len - 16)?;
        let total_logical_length = raw.read_u64_be()?;
        let trailer_magic = raw.read_u64_be()?;
        // §3/§4.A/§6: the gate is "magic >= the sentinel", not equality - a producer is
        // free to write any magic at or above `TRAILER_MAGIC`.
        if trailer_magic < format::TRAILER_MAGIC {
            return Ok(None);
        }
        raw.seek(file_len - 24)?;
        let directory_start = raw.read_u64_be()?;
        if directory_start >= file_len - TRAILER_FIXED_LEN {
            return Ok(None);
        }

        raw.seek(directory_start)?;
        let header = format::read_frame_header(raw)?;
        let dst_len = header.logical_length.max(header.compressed_size) as usize;
        let mut dst = vec![0u8; dst_len];
        let mut scratch = Vec::new();
        let effective_len =
            format::decompress_and_verify_frame(raw, transform, &header, &mut scratch, &mut dst)?;

        let Some(entries) =
            parse_directory_payload(&dst[..effective_len as usize], total_logical_length)?
        else {
            return Ok(None);
        };

        let max_logical_length = entries.iter().map(|e| e.logical_length).max().unwrap_or(0);
        let by_logical_start = sorted_side_table(&entries);

        Ok(Some(ChunkDirectory {
            entries,
            by_logical_start,
            total_logical_length,
            max_logical_length,
            post_entries_physical: directory_start,
        }))
    }

    fn build_from_scan(raw: &mut dyn RawInput, header_len: u64, file_len: u64) -> Result<Self> {
        let mut entries = Vec::new();
        let mut total_logical_length = 0u64;
        let mut pos = header_len;

        loop {
            if pos >= file_len {
                break;
            }
            raw.seek(pos)?;
            let header = match format::read_frame_header(raw) {
                Ok(h) => h,
                Err(_) => break,
            };
            let frame_start = pos;
            let physical_payload = raw.tell()?;
            let frame_end = physical_payload + header.compressed_size;
            if frame_end > file_len {
                break;
            }
            entries.push(ChunkRecord {
                logical_start: header.logical_start,
                physical_start: frame_start,
                logical_length: header.logical_length,
            });
            total_logical_length += header.logical_length;
            pos = frame_end;
        }

        if entries.is_empty() {
            return Err(Error::InvalidFile(
                "scan recovery could not parse a single chunk frame".into(),
            ));
        }

        let max_logical_length = entries.iter().map(|e| e.logical_length).max().unwrap_or(0);
        let by_logical_start = sorted_side_table(&entries);

        Ok(ChunkDirectory {
            entries,
            by_logical_start,
            total_logical_length,
            max_logical_length,
            post_entries_physical: pos,
        })
    }
}

fn sorted_side_table(entries: &[ChunkRecord]) -> Vec<(u64, usize)> {
    let mut table: Vec<(u64, usize)> = entries
        .iter()
        .enumerate()
        .map(|(idx, e)| (e.logical_start, idx))
        .collect();
    table.sort_by_key(|&(ls, idx)| (ls, idx));
    table
}

/// Parses the decompressed directory payload. Returns `Ok(None)` (rather than an error) when
/// an entry fails its bounds check, so the caller falls back to scan recovery per §4.A.
fn parse_directory_payload(
    payload: &[u8],
    total_logical_length: u64,
) -> Result<Option<Vec<ChunkRecord>>> {
    let mut cur = Cursor::new(payload);
    let count = read_uvarint(&mut cur)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let logical_start = read_uvarint(&mut cur)?;
        let physical_start = read_uvarint(&mut cur)?;
        let logical_length = read_uvarint(&mut cur)?;
        let valid = logical_start <= total_logical_length
            && logical_start.saturating_add(logical_length) <= total_logical_length;
        if !valid {
            return Ok(None);
        }
        entries.push(ChunkRecord {
            logical_start,
            physical_start,
            logical_length,
        });
    }
    Ok(Some(entries))
}
