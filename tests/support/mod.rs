//! A minimal producer used only to build chunk-stream files for this crate's own tests.
//! Not part of the public API; every chunk here is stored uncompressed (identity transform).

use std::io::Write;

use chunkstream::util::varint::put_uvarint;

pub struct ChunkSpec {
    pub logical_start: u64,
    pub payload: Vec<u8>,
}

/// Where a written chunk's frame and payload landed in the file, for tests that need to
/// corrupt specific bytes.
#[derive(Clone, Copy, Debug)]
pub struct ChunkLocation {
    pub logical_start: u64,
    pub physical_start: u64,
    pub payload_start: u64,
    pub logical_length: u64,
}

pub fn chunk(logical_start: u64, payload: &[u8]) -> ChunkSpec {
    ChunkSpec {
        logical_start,
        payload: payload.to_vec(),
    }
}

fn encode_frame(out: &mut Vec<u8>, logical_start: u64, payload: &[u8]) {
    let crc = crc32fast::hash(payload);
    put_uvarint(out, logical_start);
    put_uvarint(out, crc as u64);
    put_uvarint(out, payload.len() as u64);
    put_uvarint(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

/// Writes a chunk stream file with the given chunks (in append order) and an optional
/// directory trailer. `total_logical_length` is the declared stream length, normally the
/// sum of each chunk's logical extent but left explicit so overwrite scenarios can pass it.
/// Returns each written chunk's physical location, in the same order as `chunks`.
pub fn write_chunk_stream(
    path: &std::path::Path,
    chunks: &[ChunkSpec],
    total_logical_length: u64,
    with_trailer: bool,
) -> Vec<ChunkLocation> {
    let mut out = Vec::new();
    out.extend_from_slice(&chunkstream::format::HEADER_MAGIC.to_be_bytes());
    put_uvarint(&mut out, 0); // empty config

    let mut locations = Vec::with_capacity(chunks.len());
    for c in chunks {
        let physical_start = out.len() as u64;
        encode_frame(&mut out, c.logical_start, &c.payload);
        let payload_start = out.len() as u64 - c.payload.len() as u64;
        locations.push(ChunkLocation {
            logical_start: c.logical_start,
            physical_start,
            payload_start,
            logical_length: c.payload.len() as u64,
        });
    }

    if with_trailer {
        let mut dir_payload = Vec::new();
        put_uvarint(&mut dir_payload, locations.len() as u64);
        for loc in &locations {
            put_uvarint(&mut dir_payload, loc.logical_start);
            put_uvarint(&mut dir_payload, loc.physical_start);
            put_uvarint(&mut dir_payload, loc.logical_length);
        }
        let directory_start = out.len() as u64;
        encode_frame(&mut out, 0, &dir_payload);
        out.extend_from_slice(&directory_start.to_be_bytes());
        out.extend_from_slice(&total_logical_length.to_be_bytes());
        out.extend_from_slice(&chunkstream::format::TRAILER_MAGIC.to_be_bytes());
    }

    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&out).unwrap();
    locations
}

/// Convenience: chunks with no overwrites, trailer included, total length derived.
pub fn write_simple(path: &std::path::Path, chunks: &[ChunkSpec]) -> Vec<ChunkLocation> {
    let total = chunks.iter().map(|c| c.payload.len() as u64).sum();
    write_chunk_stream(path, chunks, total, true)
}
