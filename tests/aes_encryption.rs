use std::io::{self, Read, Write};

use zip_engine::{
    result::ZipError, AesMode, AesVendorVersion, CompressionMethod, OpenMode, ZipArchive,
    ZipFileData,
};

const SECRET_CONTENT: &str = "Lorem ipsum dolor sit amet";

const PASSWORD: &[u8] = b"helloworld";

fn encrypted_archive(entries: &[ZipFileData]) -> Vec<u8> {
    let mut zip = ZipArchive::open(io::Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    for info in entries {
        zip.entry_write_open(info, None, false, Some(PASSWORD))
            .expect("couldn't start encrypted entry");
        zip.write_all(SECRET_CONTENT.as_bytes()).unwrap();
        zip.entry_close().unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn read_secret(
    zip: &mut ZipArchive<io::Cursor<Vec<u8>>>,
    name: &str,
    password: &[u8],
) -> zip_engine::ZipResult<String> {
    zip.locate_entry(name, false)?;
    zip.entry_read_open(false, Some(password))?;
    let mut content = String::new();
    zip.read_to_string(&mut content)?;
    zip.entry_read_close()?;
    Ok(content)
}

#[test]
fn every_aes_strength() {
    let entries = [
        ZipFileData::new("secret_data_128")
            .compression_method(CompressionMethod::Stored)
            .aes(AesMode::Aes128, AesVendorVersion::Ae2),
        ZipFileData::new("secret_data_192")
            .compression_method(CompressionMethod::Stored)
            .aes(AesMode::Aes192, AesVendorVersion::Ae2),
        ZipFileData::new("secret_data_256_uncompressed")
            .compression_method(CompressionMethod::Stored)
            .aes(AesMode::Aes256, AesVendorVersion::Ae2),
    ];
    let mut zip = ZipArchive::new(io::Cursor::new(encrypted_archive(&entries)))
        .expect("couldn't open test zip file");

    for (info, salt) in entries.iter().zip([8u64, 12, 16]) {
        let content = read_secret(&mut zip, &info.file_name, PASSWORD).expect("invalid password");
        assert_eq!(SECRET_CONTENT, content);
        let stored = zip.entry_info().unwrap();
        assert_eq!(stored.aes_mode, info.aes_mode);
        assert_eq!(stored.compression_method, CompressionMethod::Stored);
        // salt, verifier and authentication code around the ciphertext
        assert_eq!(
            stored.compressed_size,
            SECRET_CONTENT.len() as u64 + salt + 2 + 10
        );
    }
}

#[cfg(feature = "deflate")]
#[test]
fn aes256_encrypted_file() {
    let entries = [ZipFileData::new("secret_data_256")
        .compression_method(CompressionMethod::Deflated)
        .aes(AesMode::Aes256, AesVendorVersion::Ae2)];
    let mut zip = ZipArchive::new(io::Cursor::new(encrypted_archive(&entries))).unwrap();
    assert_eq!(
        SECRET_CONTENT,
        read_secret(&mut zip, "secret_data_256", PASSWORD).unwrap()
    );
    assert_eq!(
        zip.entry_info().unwrap().compression_method,
        CompressionMethod::Deflated
    );
}

#[test]
fn ae1_records_crc_and_ae2_does_not() {
    let entries = [
        ZipFileData::new("ae1").aes(AesMode::Aes256, AesVendorVersion::Ae1),
        ZipFileData::new("ae2").aes(AesMode::Aes256, AesVendorVersion::Ae2),
    ];
    let mut zip = ZipArchive::new(io::Cursor::new(encrypted_archive(&entries))).unwrap();

    zip.locate_entry("ae1", false).unwrap();
    assert_eq!(
        zip.entry_info().unwrap().crc32,
        crc32fast::hash(SECRET_CONTENT.as_bytes())
    );
    zip.locate_entry("ae2", false).unwrap();
    assert_eq!(zip.entry_info().unwrap().crc32, 0);

    assert_eq!(read_secret(&mut zip, "ae1", PASSWORD).unwrap(), SECRET_CONTENT);
    assert_eq!(read_secret(&mut zip, "ae2", PASSWORD).unwrap(), SECRET_CONTENT);
}

#[test]
fn aes_wrong_password() {
    let entries = [ZipFileData::new("secret_data_256")];
    let mut zip = ZipArchive::new(io::Cursor::new(encrypted_archive(&entries))).unwrap();

    let result = read_secret(&mut zip, "secret_data_256", b"wrong password");
    assert!(matches!(result, Err(ZipError::InvalidPassword)));
}

#[test]
fn aes_tampered_ciphertext() {
    let entries = [ZipFileData::new("tampered")
        .compression_method(CompressionMethod::Stored)
        .aes(AesMode::Aes128, AesVendorVersion::Ae2)];
    let mut data = encrypted_archive(&entries);

    let mut zip = ZipArchive::new(io::Cursor::new(data.clone())).unwrap();
    zip.goto_first_entry().unwrap();
    zip.entry_read_open(true, None).unwrap();
    let header_pos = zip.entry_info().unwrap().disk_offset as usize;
    let local = zip.entry_local_info().unwrap();
    let payload = header_pos + 30 + local.file_name.len() + local.extra_field.len();
    // past the 8 byte salt and the verifier
    data[payload + 8 + 2 + 3] ^= 0x01;

    let mut zip = ZipArchive::new(io::Cursor::new(data)).unwrap();
    let result = read_secret(&mut zip, "tampered", PASSWORD);
    assert!(matches!(result, Err(ZipError::AuthenticationFailed)));
}

#[test]
fn legacy_encryption() {
    let entries = [
        ZipFileData::new("legacy").legacy_encryption(),
        ZipFileData::new("legacy_stored")
            .compression_method(CompressionMethod::Stored)
            .legacy_encryption(),
    ];
    let mut zip = ZipArchive::new(io::Cursor::new(encrypted_archive(&entries))).unwrap();

    for info in &entries {
        assert_eq!(
            read_secret(&mut zip, &info.file_name, PASSWORD).unwrap(),
            SECRET_CONTENT
        );
        let stored = zip.entry_info().unwrap();
        assert!(stored.is_encrypted());
        assert!(stored.aes_version.is_none());
        assert_eq!(stored.crc32, crc32fast::hash(SECRET_CONTENT.as_bytes()));
    }
}

// tools writing a local DOS time next to UTC NTFS times make the two disagree
#[test]
fn legacy_verifier_uses_the_header_time() {
    let modified = 1_714_635_024;
    let entries = [ZipFileData::new("stamped")
        .timestamps(modified, modified, modified)
        .legacy_encryption()];
    let mut data = encrypted_archive(&entries);

    let central = data.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
    let ntfs = central
        + data[central..]
            .windows(4)
            .position(|w| w == [0x0a, 0x00, 0x20, 0x00])
            .unwrap();
    let mtime = ntfs + 12;
    let ticks = u64::from_le_bytes(data[mtime..mtime + 8].try_into().unwrap());
    let hour = 3600 * 10_000_000;
    data[mtime..mtime + 8].copy_from_slice(&(ticks + hour).to_le_bytes());

    let mut zip = ZipArchive::new(io::Cursor::new(data)).unwrap();
    assert_eq!(read_secret(&mut zip, "stamped", PASSWORD).unwrap(), SECRET_CONTENT);
    let stored = zip.entry_info().unwrap();
    assert!(stored.has_data_descriptor());
    assert_eq!(stored.modified_date, modified + 3600);
}

#[test]
fn reading_raw_without_a_password() {
    let entries = [ZipFileData::new("raw").compression_method(CompressionMethod::Stored)];
    let mut zip = ZipArchive::new(io::Cursor::new(encrypted_archive(&entries))).unwrap();
    zip.goto_first_entry().unwrap();
    zip.entry_read_open(true, None).unwrap();
    let mut sealed = Vec::new();
    zip.read_to_end(&mut sealed).unwrap();
    zip.entry_read_close().unwrap();
    assert_eq!(sealed.len() as u64, zip.entry_info().unwrap().compressed_size);
    assert!(!sealed
        .windows(SECRET_CONTENT.len())
        .any(|w| w == SECRET_CONTENT.as_bytes()));
}

#[test]
fn oversized_password() {
    let mut zip = ZipArchive::open(io::Cursor::new(Vec::new()), OpenMode::Write).unwrap();
    let password = vec![b'x'; 129];
    assert!(matches!(
        zip.entry_write_open(&ZipFileData::new("x"), None, false, Some(&password)),
        Err(ZipError::CapacityExceeded(_))
    ));
}
