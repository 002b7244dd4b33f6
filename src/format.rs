//! On-disk constants and the ChunkFrame wire format shared by directory construction
//! (trailer parsing and scan recovery) and the reader's steady-state refill path.

use crate::error::{Error, Result};
use crate::raw::RawInput;
use crate::transform::ReadTransform;

/// Header magic: big-endian `0x0000_0000_0249_8634`.
pub const HEADER_MAGIC: u64 = 0x0000_0000_0249_8634;

/// Trailer magic sentinel. ASCII "CHKDIREC", read as a big-endian `u64`.
pub const TRAILER_MAGIC: u64 = u64::from_be_bytes(*b"CHKDIREC");

/// Smallest legal file: 8-byte magic + 1-byte (zero-length) config varint + 7 bytes of
/// nothing is already invalid, but the distilled spec's floor is a flat 16 bytes.
pub const MIN_FILE_LEN: u64 = 16;

/// Trailer region: directory_start(8) + total_logical_length(8) + trailer_magic(8).
pub const TRAILER_FIXED_LEN: u64 = 24;

pub struct FrameHeader {
    pub logical_start: u64,
    pub chunk_crc: u32,
    pub compressed_size: u64,
    pub logical_length: u64,
}

/// Reads the four varint fields of a ChunkFrame header. Does not touch the payload bytes.
pub fn read_frame_header(raw: &mut dyn RawInput) -> Result<FrameHeader> {
    let logical_start = raw.read_uvarint()?;
    // §9: the high bits of the on-disk CRC varint are accepted silently, matching the
    // source this crate's design was distilled from.
    let chunk_crc = (raw.read_uvarint()? & 0xffff_ffff) as u32;
    let compressed_size = raw.read_uvarint()?;
    let logical_length = raw.read_uvarint()?;
    Ok(FrameHeader {
        logical_start,
        chunk_crc,
        compressed_size,
        logical_length,
    })
}

/// Reads a frame's compressed payload into `scratch`, runs it through `transform`, verifies
/// its CRC-32 against `header.chunk_crc`, and returns the effective decoded length (the
/// transform's output length, or `compressed_size` when the transform reports passthrough).
///
/// `dst` must be at least `max(header.logical_length, header.compressed_size)` bytes.
pub fn decompress_and_verify_frame(
    raw: &mut dyn RawInput,
    transform: &mut dyn ReadTransform,
    header: &FrameHeader,
    scratch: &mut Vec<u8>,
    dst: &mut [u8],
) -> Result<u64> {
    let compressed_size = header.compressed_size as usize;
    scratch.clear();
    scratch.resize(compressed_size, 0);
    raw.read_exact(scratch)?;

    let actual = transform.transform(scratch, dst, header.logical_length)?;
    let effective_len = if actual < 0 {
        dst[..compressed_size].copy_from_slice(scratch);
        header.compressed_size
    } else {
        if actual as u64 != header.logical_length {
            return Err(Error::DecodeSizeMismatch {
                expected: header.logical_length,
                actual: actual as u64,
            });
        }
        header.logical_length
    };

    let computed = crc32fast::hash(&dst[..effective_len as usize]);
    if computed != header.chunk_crc {
        return Err(Error::CrcMismatch {
            logical_start: header.logical_start,
            expected: header.chunk_crc,
            actual: computed,
        });
    }
    Ok(effective_len)
}
