#![cfg(feature = "lzma")]

use std::io::{self, Read, Write};

use zip_engine::{CompressionMethod, OpenMode, ZipArchive, ZipFileData};

const CONTENT: &str = "Lorem ipsum dolor sit amet";

/// Builds an archive with one LZMA entry. The payload is written raw since
/// the codec only decodes.
fn lzma_archive(content: &[u8]) -> Vec<u8> {
    let mut lzma = Vec::new();
    lzma_rs::lzma_compress(&mut io::Cursor::new(content), &mut lzma).unwrap();
    // .lzma files carry properties (5 bytes) and the unpacked size (8 bytes);
    // ZIP entries carry a version and properties size instead
    let mut payload = vec![9, 20, 5, 0];
    payload.extend_from_slice(&lzma[..5]);
    payload.extend_from_slice(&lzma[13..]);

    let mut zip = ZipArchive::open(io::Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    let info = ZipFileData::new("ipsum.txt").compression_method(CompressionMethod::Lzma);
    zip.entry_write_open(&info, None, true, None).unwrap();
    zip.write_all(&payload).unwrap();
    zip.entry_write_close(crc32fast::hash(content), None, Some(content.len() as u64))
        .unwrap();
    zip.finish().unwrap().into_inner()
}

#[test]
fn lzma_file() {
    let mut archive =
        ZipArchive::new(io::Cursor::new(lzma_archive(CONTENT.as_bytes()))).expect("couldn't open test zip file");
    archive
        .locate_entry("ipsum.txt", false)
        .expect("couldn't find file in archive");
    let info = archive.entry_info().unwrap();
    assert_eq!(info.compression_method, CompressionMethod::Lzma);
    // end of stream marker present
    assert_ne!(info.flag & 0x2, 0);

    archive.entry_read_open(false, None).unwrap();
    let mut content = String::new();
    archive
        .read_to_string(&mut content)
        .expect("couldn't read lzma file");
    let totals = archive.entry_read_close().unwrap();
    assert_eq!(CONTENT, content);
    assert_eq!(totals.uncompressed_size, CONTENT.len() as u64);
}

#[test]
fn lzma_larger_file() {
    let data: Vec<u8> = (0..300_000u32).map(|i| (i % 13) as u8 + b'a').collect();
    let mut archive = ZipArchive::new(io::Cursor::new(lzma_archive(&data))).unwrap();
    archive.goto_first_entry().unwrap();
    archive.entry_read_open(false, None).unwrap();
    let mut content = Vec::new();
    archive.read_to_end(&mut content).unwrap();
    archive.entry_read_close().unwrap();
    assert_eq!(content, data);
}
