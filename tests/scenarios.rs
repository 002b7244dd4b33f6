mod support;

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use chunkstream::{IdentityTransform, ReaderOptions};
use support::chunk;
use tempfile::tempdir;

fn open(path: &std::path::Path) -> chunkstream::LogicalCursor {
    chunkstream::open(path, Box::new(IdentityTransform), ReaderOptions::default()).unwrap()
}

#[test]
fn s1_single_chunk_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1.bin");
    support::write_simple(&path, &[chunk(0, b"hello")]);

    let mut cur = open(&path);
    cur.seek(0).unwrap();
    let mut buf = [0u8; 5];
    cur.read_bytes(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
    assert_eq!(cur.tell(), 5);
}

#[test]
fn s2_overwrite_shadows_prefix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s2.bin");
    support::write_chunk_stream(
        &path,
        &[chunk(0, b"ABCDEFGH"), chunk(2, b"xy")],
        8,
        true,
    );

    let mut cur = open(&path);
    cur.seek(0).unwrap();
    let mut buf = [0u8; 8];
    cur.read_bytes(&mut buf).unwrap();
    assert_eq!(&buf, b"ABxyEFGH");
}

#[test]
fn seek_into_every_position_of_an_overwrite_file_matches_reconstructed_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s2_seek.bin");
    support::write_chunk_stream(
        &path,
        &[chunk(0, b"ABCDEFGH"), chunk(2, b"xy")],
        8,
        true,
    );
    let expected = b"ABxyEFGH";

    let mut cur = open(&path);
    for p in 0..expected.len() as u64 {
        cur.seek(p).unwrap();
        assert_eq!(cur.tell(), p);
        let byte = cur.read_byte().unwrap();
        assert_eq!(byte, expected[p as usize], "mismatch seeking to {p}");
    }
}

#[test]
fn s3_random_seeks_across_ten_chunks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s3.bin");

    let mut expected = Vec::new();
    let mut specs = Vec::new();
    for i in 0..10u64 {
        let payload: Vec<u8> = (0..100).map(|b| (i * 31 + b) as u8).collect();
        expected.extend_from_slice(&payload);
        specs.push(chunk(i * 100, &payload));
    }
    support::write_simple(&path, &specs);

    let mut cur = open(&path);
    for &p in &[0u64, 50, 150, 999, 500] {
        cur.seek(p).unwrap();
        let mut b = [0u8; 1];
        cur.read_bytes(&mut b).unwrap();
        assert_eq!(b[0], expected[p as usize], "mismatch at {p}");
    }
}

#[test]
fn s4_corrupted_payload_raises_crc_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s4.bin");
    let locations = support::write_chunk_stream(
        &path,
        &[chunk(0, b"first!!!"), chunk(8, b"middle!!"), chunk(16, b"last!!!!")],
        24,
        true,
    );
    let middle = locations[1];

    let mut f = OpenOptions::new().write(true).open(&path).unwrap();
    f.seek(SeekFrom::Start(middle.payload_start)).unwrap();
    f.write_all(&[0xffu8]).unwrap();
    drop(f);

    let mut cur = open(&path);
    let err = cur.seek(middle.logical_start).unwrap_err();
    assert!(matches!(err, chunkstream::Error::CrcMismatch { .. }));
}

#[test]
fn s5_scan_recovery_after_trailer_truncation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s5.bin");
    support::write_simple(&path, &[chunk(0, b"hello")]);

    let len = std::fs::metadata(&path).unwrap().len();
    let f = OpenOptions::new().write(true).open(&path).unwrap();
    f.set_len(len - 24).unwrap();

    let mut cur = open(&path);
    cur.seek(0).unwrap();
    let mut buf = [0u8; 5];
    cur.read_bytes(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
}

#[test]
fn s6_two_clones_read_independent_regions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s6.bin");

    let mut specs = Vec::new();
    let mut expected = Vec::new();
    for i in 0..20u64 {
        let payload: Vec<u8> = (0..100).map(|b| (i * 7 + b) as u8).collect();
        expected.extend_from_slice(&payload);
        specs.push(chunk(i * 100, &payload));
    }
    support::write_simple(&path, &specs);

    let mut x = open(&path);
    let mut y = x.try_clone().unwrap();

    x.seek(0).unwrap();
    y.seek(1000).unwrap();

    let mut bx = [0u8; 10];
    let mut by = [0u8; 10];
    x.read_bytes(&mut bx).unwrap();
    y.read_bytes(&mut by).unwrap();

    assert_eq!(&bx, &expected[0..10]);
    assert_eq!(&by, &expected[1000..1010]);
}

#[test]
fn empty_file_has_zero_length_and_raises_eof() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    support::write_chunk_stream(&path, &[], 0, true);

    let mut cur = open(&path);
    assert_eq!(cur.length(), 0);
    assert!(matches!(
        cur.read_byte().unwrap_err(),
        chunkstream::Error::EndOfStream(0)
    ));
}

#[test]
fn single_chunk_boundary_raises_eof_after_last_byte() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("boundary.bin");
    support::write_simple(&path, &[chunk(0, b"abc")]);

    let mut cur = open(&path);
    cur.seek(2).unwrap();
    assert_eq!(cur.read_byte().unwrap(), b'c');
    assert!(matches!(
        cur.read_byte().unwrap_err(),
        chunkstream::Error::EndOfStream(_)
    ));
}

#[test]
fn slice_matches_equivalent_seek_and_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("slice.bin");
    support::write_simple(&path, &[chunk(0, b"0123456789")]);

    let mut whole = open(&path);
    whole.seek(3).unwrap();
    let mut direct = [0u8; 4];
    whole.read_bytes(&mut direct).unwrap();

    let mut sliced = open(&path).slice(3, 4).unwrap();
    let mut via_slice = [0u8; 4];
    sliced.read_bytes(&mut via_slice).unwrap();

    assert_eq!(direct, via_slice);
}

#[test]
fn double_close_reports_first_close_site() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("close.bin");
    support::write_simple(&path, &[chunk(0, b"x")]);

    let mut cur = open(&path);
    cur.close().unwrap();
    let err = cur.close().unwrap_err();
    assert!(matches!(err, chunkstream::Error::AlreadyClosed(_)));
}
