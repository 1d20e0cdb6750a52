use std::io::prelude::*;
use std::io::{Cursor, SeekFrom};

use zip_engine::result::ZipError;
use zip_engine::{CompressionMethod, Config, OpenMode, ZipArchive, ZipFileData};

fn add_entries<S: Read + Write + Seek>(zip: &mut ZipArchive<S>, names: &[&str]) {
    for name in names {
        let info = ZipFileData::new(*name).compression_method(CompressionMethod::Stored);
        zip.entry_write_open(&info, None, false, None).unwrap();
        zip.write_all(name.as_bytes()).unwrap();
        zip.entry_close().unwrap();
    }
}

fn names_and_contents<S: Read + Seek>(zip: &mut ZipArchive<S>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut more = zip.goto_first_entry().unwrap();
    while more {
        let name = zip.entry_info().unwrap().file_name.clone();
        zip.entry_read_open(false, None).unwrap();
        let mut contents = String::new();
        zip.read_to_string(&mut contents).unwrap();
        zip.entry_read_close().unwrap();
        out.push((name, contents));
        more = zip.goto_next_entry().unwrap();
    }
    out
}

fn pairs(names: &[&str]) -> Vec<(String, String)> {
    names.iter().map(|n| (n.to_string(), n.to_string())).collect()
}

#[test]
fn append_to_an_empty_stream_starts_fresh() {
    let mut zip = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Append).unwrap();
    add_entries(&mut zip, &["first"]);
    let mut zip = ZipArchive::new(zip.finish().unwrap()).unwrap();
    assert_eq!(names_and_contents(&mut zip), pairs(&["first"]));
}

#[test]
fn reopening_without_changes_is_idempotent() {
    let mut zip = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    add_entries(&mut zip, &["a", "b"]);
    zip.set_comment("kept");
    let original = zip.finish().unwrap().into_inner();

    let zip = ZipArchive::open(Cursor::new(original.clone()), OpenMode::Append).unwrap();
    let rewritten = zip.finish().unwrap().into_inner();
    assert_eq!(rewritten, original);
}

#[test]
fn appended_entries_follow_the_old_ones() {
    let file = tempfile::tempfile().unwrap();
    let mut zip = ZipArchive::open(file, OpenMode::Write).unwrap();
    add_entries(&mut zip, &["one", "two"]);
    let file = zip.finish().unwrap();

    let mut zip = ZipArchive::open(file, OpenMode::Append).unwrap();
    assert_eq!(zip.number_entry(), 2);
    add_entries(&mut zip, &["three"]);
    let mut file = zip.finish().unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut zip = ZipArchive::new(file).unwrap();
    assert_eq!(zip.number_entry(), 3);
    assert_eq!(names_and_contents(&mut zip), pairs(&["one", "two", "three"]));
}

#[test]
fn append_to_an_archive_without_entries() {
    let zip = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    let empty = zip.finish().unwrap().into_inner();
    assert_eq!(empty.len(), 22);

    let mut zip = ZipArchive::open(Cursor::new(empty), OpenMode::Append).unwrap();
    add_entries(&mut zip, &["only"]);
    let data = zip.finish().unwrap().into_inner();
    // the new entry replaces the old end record
    assert_eq!(&data[..4], b"PK\x03\x04");
    let mut zip = ZipArchive::new(Cursor::new(data)).unwrap();
    assert_eq!(names_and_contents(&mut zip), pairs(&["only"]));
}

// data in front of an archive, such as a self-extractor stub, moves every
// recorded offset by the same amount
#[test]
fn prepended_data_is_detected() {
    let mut zip = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    add_entries(&mut zip, &["x", "y"]);
    let archive = zip.finish().unwrap().into_inner();

    let mut data = vec![0xAA; 1000];
    data.extend_from_slice(&archive);
    let mut zip = ZipArchive::new(Cursor::new(data.clone())).unwrap();
    assert_eq!(zip.disk_offset_shift(), 1000);
    assert_eq!(names_and_contents(&mut zip), pairs(&["x", "y"]));
    zip.goto_first_entry().unwrap();
    assert_eq!(zip.entry_seek_local_header().unwrap(), 1000);

    // appending keeps offsets relative to the archive start
    let mut zip = ZipArchive::open(Cursor::new(data), OpenMode::Append).unwrap();
    add_entries(&mut zip, &["z"]);
    let data = zip.finish().unwrap().into_inner();
    assert_eq!(&data[..1000], &[0xAA; 1000][..]);
    let mut zip = ZipArchive::new(Cursor::new(data)).unwrap();
    assert_eq!(zip.disk_offset_shift(), 1000);
    assert_eq!(names_and_contents(&mut zip), pairs(&["x", "y", "z"]));
}

#[test]
fn damaged_directory_is_recovered_and_extended() {
    let mut zip = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    add_entries(&mut zip, &["kept", "also kept"]);
    let data = zip.finish().unwrap().into_inner();

    // cut inside the central directory
    let cut = data.len() - 40;
    let damaged = data[..cut].to_vec();
    assert!(matches!(
        ZipArchive::open(Cursor::new(damaged.clone()), OpenMode::Append),
        Err(ZipError::InvalidArchive(_))
    ));

    let config = Config::default().recover(true);
    let mut zip =
        ZipArchive::with_config(Cursor::new(damaged), OpenMode::Append, config).unwrap();
    assert_eq!(zip.number_entry(), 2);
    add_entries(&mut zip, &["new"]);
    let data = zip.finish().unwrap().into_inner();

    let mut zip = ZipArchive::new(Cursor::new(data)).unwrap();
    assert_eq!(
        names_and_contents(&mut zip),
        pairs(&["kept", "also kept", "new"])
    );
}

#[test]
fn prepended_data_before_zip64_end_records() {
    let count = u16::MAX as u64;
    let config = Config::default().data_descriptor(false);
    let mut zip =
        ZipArchive::with_config(Cursor::new(Vec::new()), OpenMode::Write, config).unwrap();
    for i in 0..count {
        let info = ZipFileData::new(format!("{:05}", i))
            .compression_method(CompressionMethod::Stored)
            .size_hint(1);
        zip.entry_write_open(&info, None, false, None).unwrap();
        zip.write_all(&[i as u8]).unwrap();
        zip.entry_close().unwrap();
    }
    let archive = zip.finish().unwrap().into_inner();

    let mut data = vec![0xAA; 1000];
    data.extend_from_slice(&archive);
    let mut zip = ZipArchive::new(Cursor::new(data)).unwrap();
    assert_eq!(zip.disk_offset_shift(), 1000);
    assert_eq!(zip.number_entry(), count);

    zip.goto_entry(count - 1).unwrap();
    assert_eq!(zip.entry_info().unwrap().file_name, format!("{:05}", count - 1));
    zip.entry_read_open(false, None).unwrap();
    let mut contents = Vec::new();
    zip.read_to_end(&mut contents).unwrap();
    zip.entry_read_close().unwrap();
    assert_eq!(contents, [(count - 1) as u8]);
}
