//! Finding the central directory of an existing archive and writing the
//! end records of a new one.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::result::{ZipError, ZipResult};
use crate::spec::{
    self, CentralDirectoryEnd, Zip64CentralDirectoryEnd, Zip64CentralDirectoryEndLocator,
    CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_HEADER_SIGNATURE,
    ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE, ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE,
};
use crate::stream;
use crate::types::VERSION_ZIP64;

/// Where the central directory of an archive lives, as found on open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralDirectory {
    /// Position of the classic end record.
    pub end_pos: u64,
    /// Stream position of the first central record, prefix included.
    pub offset: u64,
    pub size: u64,
    pub number_entry: u64,
    pub disk_number_with_cd: u32,
    /// Bytes found in front of the archive, added to every recorded offset.
    pub disk_offset_shift: u64,
    /// From the ZIP64 end record, when there is one.
    pub version_made_by: Option<u16>,
    pub comment: Vec<u8>,
}

impl CentralDirectory {
    /// Locates and validates the central directory of the archive in `reader`.
    pub fn load<R: Read + Seek>(reader: &mut R) -> ZipResult<CentralDirectory> {
        let stream_len = stream::stream_len(reader)?;
        let max_back = spec::END_RECORD_SEARCH_LIMIT.min(stream_len);
        reader.seek(SeekFrom::End(0))?;
        let end_pos =
            stream::find_reverse(reader, &CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes(), max_back)?
                .ok_or(ZipError::InvalidArchive("Could not find central directory end"))?;
        reader.seek(SeekFrom::Start(end_pos + 4))?;
        let footer = CentralDirectoryEnd::load(reader)?;
        if footer.number_of_files_on_this_disk != footer.number_of_files {
            return Err(ZipError::InvalidArchive(
                "Entry counts of the end record disagree",
            ));
        }

        let mut directory = CentralDirectory {
            end_pos,
            offset: footer.central_directory_offset as u64,
            size: footer.central_directory_size as u64,
            number_entry: footer.number_of_files as u64,
            disk_number_with_cd: footer.disk_with_central_directory as u32,
            comment: footer.zip_file_comment,
            ..Default::default()
        };

        // first end record after the central directory
        let mut records_pos = end_pos;
        let mut zip64 = false;
        if footer.number_of_files == u16::MAX
            || footer.central_directory_offset == u32::MAX
            || footer.central_directory_size == u32::MAX
        {
            let (record_pos, record) = find_zip64_end(reader, end_pos)?.ok_or(ZipError::InvalidArchive(
                "ZIP64 end of central directory record not found",
            ))?;
            if record.number_of_files_on_this_disk != record.number_of_files {
                return Err(ZipError::InvalidArchive(
                    "Entry counts of the ZIP64 end record disagree",
                ));
            }
            directory.offset = record.central_directory_offset;
            directory.size = record.central_directory_size;
            directory.number_entry = record.number_of_files;
            directory.disk_number_with_cd = record.disk_with_central_directory;
            directory.version_made_by = Some(record.version_made_by);
            records_pos = record_pos;
            zip64 = true;
        }

        debug!(
            disk = directory.disk_number_with_cd,
            entries = directory.number_entry,
            offset = directory.offset,
            size = directory.size,
            "read central directory"
        );

        if !signature_at(reader, directory.offset, CENTRAL_DIRECTORY_HEADER_SIGNATURE)? {
            if end_pos > u32::MAX as u64 && !zip64 {
                return Err(ZipError::InvalidArchive(
                    "Central directory beyond 4 GiB without ZIP64 records",
                ));
            }
            // data prepended to the archive moves everything by the same amount
            let actual = records_pos
                .checked_sub(directory.size)
                .filter(|&actual| actual > directory.offset);
            match actual {
                Some(actual)
                    if signature_at(reader, actual, CENTRAL_DIRECTORY_HEADER_SIGNATURE)? =>
                {
                    directory.disk_offset_shift = actual - directory.offset;
                    warn!(
                        declared = directory.offset,
                        actual,
                        shift = directory.disk_offset_shift,
                        "central directory is not at its declared offset"
                    );
                    directory.offset = actual;
                }
                _ if directory.number_entry > 0 => {
                    return Err(ZipError::InvalidArchive(
                        "Central directory not found at its declared offset",
                    ))
                }
                _ => {}
            }
        }

        if records_pos < directory.offset {
            return Err(ZipError::InvalidArchive(
                "Central directory starts after the end record",
            ));
        }
        if records_pos < directory.offset + directory.size {
            directory.size = records_pos - directory.offset;
        }
        Ok(directory)
    }
}

/// Follows the ZIP64 locator right before the classic end record, returning
/// the record and the position it was found at.
fn find_zip64_end<R: Read + Seek>(
    reader: &mut R,
    end_pos: u64,
) -> ZipResult<Option<(u64, Zip64CentralDirectoryEnd)>> {
    let locator_pos = match end_pos.checked_sub(Zip64CentralDirectoryEndLocator::SIZE) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    reader.seek(SeekFrom::Start(locator_pos))?;
    if reader.read_u32::<LittleEndian>()? != ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let locator = Zip64CentralDirectoryEndLocator::load(reader)?;
    // with prepended data the record is found right before its locator instead
    let candidates = [
        Some(locator.end_of_central_directory_offset),
        locator_pos.checked_sub(Zip64CentralDirectoryEnd::SIZE),
    ];
    for pos in candidates.into_iter().flatten() {
        if signature_at(reader, pos, ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE)? {
            return Zip64CentralDirectoryEnd::load(reader).map(|record| Some((pos, record)));
        }
    }
    Ok(None)
}

/// Whether `signature` is stored at `pos`; leaves the stream right after it.
fn signature_at<R: Read + Seek>(reader: &mut R, pos: u64, signature: u32) -> ZipResult<bool> {
    reader.seek(SeekFrom::Start(pos))?;
    match reader.read_u32::<LittleEndian>() {
        Ok(found) => Ok(found == signature),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Values of the end records written when an archive is closed.
///
/// Offsets are relative to the start of the archive.
#[derive(Debug, Clone, Default)]
pub struct Footer<'a> {
    pub offset: u64,
    pub size: u64,
    pub number_entry: u64,
    pub disk_number_with_cd: u32,
    pub version_made_by: u16,
    pub comment: &'a [u8],
}

impl Footer<'_> {
    /// Whether the ZIP64 end record and locator are needed.
    pub fn needs_zip64(&self) -> bool {
        self.offset >= u32::MAX as u64
            || self.size >= u32::MAX as u64
            || self.number_entry >= u16::MAX as u64
    }

    /// Writes the end records. `position` is where the first of them lands,
    /// relative to the start of the archive.
    pub fn write<W: Write>(&self, writer: &mut W, position: u64) -> ZipResult<()> {
        if self.needs_zip64() {
            debug!(
                offset = self.offset,
                size = self.size,
                entries = self.number_entry,
                "writing ZIP64 end records"
            );
            Zip64CentralDirectoryEnd {
                version_made_by: self.version_made_by,
                version_needed_to_extract: VERSION_ZIP64,
                disk_number: self.disk_number_with_cd,
                disk_with_central_directory: self.disk_number_with_cd,
                number_of_files_on_this_disk: self.number_entry,
                number_of_files: self.number_entry,
                central_directory_size: self.size,
                central_directory_offset: self.offset,
            }
            .write(writer)?;
            Zip64CentralDirectoryEndLocator {
                disk_with_central_directory: self.disk_number_with_cd,
                end_of_central_directory_offset: position,
                number_of_disks: self.disk_number_with_cd + 1,
            }
            .write(writer)?;
        }

        let number_of_files = self.number_entry.min(u16::MAX as u64) as u16;
        let disk = self.disk_number_with_cd.min(u16::MAX as u32) as u16;
        CentralDirectoryEnd {
            disk_number: disk,
            disk_with_central_directory: disk,
            number_of_files_on_this_disk: number_of_files,
            number_of_files,
            central_directory_size: self.size.min(u32::MAX as u64) as u32,
            central_directory_offset: self.offset.min(u32::MAX as u64) as u32,
            zip_file_comment: self.comment.to_vec(),
        }
        .write(writer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn empty_archive(prefix: &[u8], comment: &[u8]) -> Vec<u8> {
        let mut out = prefix.to_vec();
        Footer {
            comment,
            ..Default::default()
        }
        .write(&mut out, 0)
        .unwrap();
        out
    }

    #[test]
    fn empty_archive_is_found() {
        let data = empty_archive(b"", b"note");
        let directory = CentralDirectory::load(&mut Cursor::new(data)).unwrap();
        assert_eq!(directory.number_entry, 0);
        assert_eq!(directory.end_pos, 0);
        assert_eq!(directory.comment, b"note");
        assert_eq!(directory.disk_offset_shift, 0);
    }

    #[test]
    fn missing_end_record() {
        assert!(matches!(
            CentralDirectory::load(&mut Cursor::new(vec![0u8; 100])),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn zip64_records_are_followed() {
        let mut out = vec![0u8; 8];
        // a sentinel count forces the ZIP64 layout
        let footer = Footer {
            number_entry: u16::MAX as u64,
            version_made_by: 0x031e,
            ..Default::default()
        };
        footer.write(&mut out, 8).unwrap();
        // entries > 0 with no central record at offset 0 cannot validate
        assert!(matches!(
            CentralDirectory::load(&mut Cursor::new(out.clone())),
            Err(ZipError::InvalidArchive(_))
        ));

        let (_, record) = find_zip64_end(
            &mut Cursor::new(out.clone()),
            8 + Zip64CentralDirectoryEnd::SIZE + Zip64CentralDirectoryEndLocator::SIZE,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.number_of_files, u16::MAX as u64);
        assert_eq!(record.version_made_by, 0x031e);
    }

    #[test]
    fn footer_sentinels() {
        let footer = Footer {
            offset: u32::MAX as u64,
            size: 10,
            number_entry: 3,
            ..Default::default()
        };
        assert!(footer.needs_zip64());
        let mut out = Vec::new();
        footer.write(&mut out, 0x1_0000_0000).unwrap();
        let classic = &out[out.len() - CentralDirectoryEnd::SIZE as usize..];
        // offset field holds the sentinel
        assert_eq!(&classic[16..20], &[0xff; 4]);
        assert_eq!(&classic[10..12], &[3, 0]);

        let footer = Footer {
            offset: u32::MAX as u64 - 1,
            number_entry: u16::MAX as u64 - 1,
            ..Default::default()
        };
        assert!(!footer.needs_zip64());
    }
}
