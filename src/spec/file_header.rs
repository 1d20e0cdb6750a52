use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{
    u16_len, CENTRAL_DIRECTORY_END_SIGNATURE, CENTRAL_DIRECTORY_HEADER_SIGNATURE,
    LOCAL_FILE_HEADER_SIGNATURE, U16_SENTINEL, U32_SENTINEL, UNCOMPRESSED_CUSHION,
    ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE,
};
use crate::compression::CompressionMethod;
use crate::extra_fields::{
    self, AesExtraField, ExtraField, NtfsTimestamps, Sentinels, Unix1Field, Zip64ExtraField,
    AES_TAG, NTFS_TAG, UNIX1_TAG, ZIP64_TAG,
};
use crate::result::{ZipError, ZipResult};
use crate::types::{
    self,
    dos_date_to_unix, flags, ntfs_to_unix, unix_to_dos_date, unix_to_ntfs, AesVendorVersion,
    ZipFileData, Zip64Mode, VERSION_AES, VERSION_DEFAULT, VERSION_LZMA, VERSION_ZIP64,
};

/*
Local file header
      local file header signature     4 bytes  (0x04034b50)
      version needed to extract       2 bytes
      general purpose bit flag        2 bytes
      compression method              2 bytes
      last mod file time              2 bytes
      last mod file date              2 bytes
      crc-32                          4 bytes
      compressed size                 4 bytes
      uncompressed size               4 bytes
      file name length                2 bytes
      extra field length              2 bytes
      file name (variable size)
      extra field (variable size)

Central directory header
      central file header signature   4 bytes  (0x02014b50)
      version made by                 2 bytes
      (then the local fields from version needed to extra field length)
      file comment length             2 bytes
      disk number start               2 bytes
      internal file attributes        2 bytes
      external file attributes        4 bytes
      relative offset of local header 4 bytes
      file name (variable size)
      extra field (variable size)
      file comment (variable size)
*/

/// What a written header looked like, for patching it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Whether the sizes went to a ZIP64 record, which then leads the extra area.
    pub zip64: bool,
    pub name_len: u16,
    pub extra_len: u16,
}

/// Reads one central header.
///
/// Returns `None` when the end of directory record (classic or ZIP64) is
/// found instead, which ends the entry list.
pub fn read_central_header<R: Read>(reader: &mut R) -> ZipResult<Option<ZipFileData>> {
    match reader.read_u32::<LittleEndian>()? {
        CENTRAL_DIRECTORY_HEADER_SIGNATURE => read_header_fields(reader, false).map(Some),
        CENTRAL_DIRECTORY_END_SIGNATURE | ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE => Ok(None),
        _ => Err(ZipError::InvalidArchive(
            "Invalid central directory header signature",
        )),
    }
}

/// Reads one local header.
pub fn read_local_header<R: Read>(reader: &mut R) -> ZipResult<ZipFileData> {
    if reader.read_u32::<LittleEndian>()? != LOCAL_FILE_HEADER_SIGNATURE {
        return Err(ZipError::InvalidArchive("Invalid local file header signature"));
    }
    read_header_fields(reader, true)
}

fn read_header_fields<R: Read>(reader: &mut R, local: bool) -> ZipResult<ZipFileData> {
    let mut file = ZipFileData {
        version_made_by: 0,
        ..Default::default()
    };
    if !local {
        file.version_made_by = reader.read_u16::<LittleEndian>()?;
    }
    file.version_needed = reader.read_u16::<LittleEndian>()?;
    file.flag = reader.read_u16::<LittleEndian>()?;
    file.compression_method = CompressionMethod::from_u16(reader.read_u16::<LittleEndian>()?);
    let dos_date = reader.read_u32::<LittleEndian>()?;
    file.modified_date = dos_date_to_unix(dos_date);
    file.crc32 = reader.read_u32::<LittleEndian>()?;
    let compressed_size = reader.read_u32::<LittleEndian>()?;
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    file.compressed_size = compressed_size as u64;
    file.uncompressed_size = uncompressed_size as u64;
    let name_len = reader.read_u16::<LittleEndian>()? as usize;
    let extra_len = reader.read_u16::<LittleEndian>()? as usize;

    let mut sentinels = Sentinels {
        uncompressed_size: uncompressed_size == U32_SENTINEL,
        compressed_size: compressed_size == U32_SENTINEL,
        ..Default::default()
    };
    let mut comment_len = 0;
    if !local {
        comment_len = reader.read_u16::<LittleEndian>()? as usize;
        let disk_number = reader.read_u16::<LittleEndian>()?;
        file.internal_fa = reader.read_u16::<LittleEndian>()?;
        file.external_fa = reader.read_u32::<LittleEndian>()?;
        let disk_offset = reader.read_u32::<LittleEndian>()?;
        file.disk_number = disk_number as u32;
        file.disk_offset = disk_offset as u64;
        sentinels.disk_number = disk_number == U16_SENTINEL;
        sentinels.disk_offset = disk_offset == U32_SENTINEL;
    }

    let mut name = vec![0; name_len];
    reader.read_exact(&mut name)?;
    file.file_name = String::from_utf8_lossy(&name).into_owned();
    file.extra_field = vec![0; extra_len];
    reader.read_exact(&mut file.extra_field)?;
    if comment_len > 0 {
        let mut comment = vec![0; comment_len];
        reader.read_exact(&mut comment)?;
        file.file_comment = String::from_utf8_lossy(&comment).into_owned();
    }

    file.pk_verify = types::legacy_verifier(file.has_data_descriptor(), dos_date, file.crc32);
    apply_extra_fields(&mut file, sentinels)?;
    Ok(file)
}

/// Folds the decoded extra records into the entry.
fn apply_extra_fields(file: &mut ZipFileData, sentinels: Sentinels) -> ZipResult<()> {
    for field in extra_fields::parse_all(&file.extra_field, sentinels)? {
        match field {
            ExtraField::Zip64(zip64) => {
                if let Some(size) = zip64.uncompressed_size {
                    file.uncompressed_size = size;
                }
                if let Some(size) = zip64.compressed_size {
                    file.compressed_size = size;
                }
                if let Some(offset) = zip64.disk_offset {
                    file.disk_offset = offset;
                }
                if let Some(disk) = zip64.disk_number {
                    file.disk_number = disk;
                }
            }
            ExtraField::Ntfs(times) => {
                file.modified_date = ntfs_to_unix(times.modified);
                file.accessed_date = ntfs_to_unix(times.accessed);
                file.creation_date = ntfs_to_unix(times.creation);
            }
            ExtraField::Unix1(unix) => {
                if file.accessed_date == 0 {
                    file.accessed_date = unix.accessed as i64;
                }
                if file.modified_date == 0 {
                    file.modified_date = unix.modified as i64;
                }
                if !unix.linkname.is_empty() {
                    file.linkname = String::from_utf8_lossy(&unix.linkname).into_owned();
                }
            }
            ExtraField::Aes(aes) => {
                file.aes_version = Some(aes.vendor_version);
                file.aes_mode = aes.mode;
                file.compression_method = aes.compression_method;
            }
            ExtraField::Unknown { .. } => {}
        }
    }
    Ok(())
}

/// Whether the entry's sizes or position overflow the 32-bit fields.
///
/// A local header is promoted a little early since the final compressed size
/// is not known yet.
pub fn needs_zip64(file: &ZipFileData, local: bool) -> bool {
    let max_uncompressed = if local {
        U32_SENTINEL as u64 - UNCOMPRESSED_CUSHION
    } else {
        U32_SENTINEL as u64
    };
    let mut needs = file.uncompressed_size >= max_uncompressed
        || file.compressed_size >= U32_SENTINEL as u64;
    if !local {
        needs |= file.disk_offset >= U32_SENTINEL as u64
            || file.disk_number >= U16_SENTINEL as u32;
    }
    needs
}

/// Applies the entry's ZIP64 policy to [`needs_zip64`].
///
/// Under `Auto`, a local header of a file with no known size is promoted so
/// that any final size can be patched in.
pub fn zip64_decision(file: &ZipFileData, local: bool) -> ZipResult<bool> {
    let needs = needs_zip64(file, local);
    match file.zip64 {
        Zip64Mode::Force => Ok(true),
        Zip64Mode::Disable if needs => Err(ZipError::Zip64Required(
            "entry sizes or offset do not fit 32 bits",
        )),
        Zip64Mode::Disable => Ok(false),
        Zip64Mode::Auto => Ok(needs || (local && file.uncompressed_size == 0 && !file.is_dir())),
    }
}

/// Writes a local or central header for `file`.
///
/// The extra area is rebuilt: a ZIP64 record first when needed, then the
/// caller's records minus those regenerated here, then AES, NTFS and UNIX1
/// records. A local header of an entry with [`flags::MASK_LOCAL_INFO`] hides
/// its name, time and uncompressed size.
pub fn write_header<W: Write>(
    writer: &mut W,
    local: bool,
    file: &ZipFileData,
) -> ZipResult<HeaderLayout> {
    let zip64 = zip64_decision(file, local)?;
    let mask = local && file.is_masked();
    let aes = file.is_encrypted() && file.aes_version.is_some();

    let mut fields = Vec::new();
    if zip64 {
        let mut record = Zip64ExtraField {
            uncompressed_size: Some(if mask { 0 } else { file.uncompressed_size }),
            compressed_size: Some(file.compressed_size),
            ..Default::default()
        };
        if !local && file.disk_offset >= U32_SENTINEL as u64 {
            record.disk_offset = Some(file.disk_offset);
        }
        if !local && file.disk_number >= U16_SENTINEL as u32 {
            record.disk_number = Some(file.disk_number);
        }
        fields.push(ExtraField::Zip64(record));
    }
    let mut has_aes = false;
    for (tag, data) in extra_fields::records(&file.extra_field) {
        match tag {
            ZIP64_TAG | NTFS_TAG | UNIX1_TAG => continue,
            AES_TAG if !aes => continue,
            AES_TAG => has_aes = true,
            _ => {}
        }
        fields.push(ExtraField::Unknown {
            tag,
            data: data.to_vec(),
        });
    }
    if aes && !has_aes {
        fields.push(ExtraField::Aes(AesExtraField {
            vendor_version: file.aes_version.unwrap_or(AesVendorVersion::Ae2),
            mode: file.aes_mode,
            compression_method: file.compression_method,
        }));
    }
    if !mask && file.modified_date != 0 && file.accessed_date != 0 && file.creation_date != 0 {
        fields.push(ExtraField::Ntfs(NtfsTimestamps {
            modified: unix_to_ntfs(file.modified_date),
            accessed: unix_to_ntfs(file.accessed_date),
            creation: unix_to_ntfs(file.creation_date),
        }));
    }
    if !file.linkname.is_empty() {
        fields.push(ExtraField::Unix1(Unix1Field {
            accessed: file.accessed_date.clamp(0, u32::MAX as i64) as u32,
            modified: file.modified_date.clamp(0, u32::MAX as i64) as u32,
            linkname: file.linkname.as_bytes().to_vec(),
            ..Default::default()
        }));
    }
    let extra_len = u16_len(
        fields.iter().map(ExtraField::encoded_len).sum(),
        "extra field is too long",
    )?;

    let name = if mask {
        format!("{:x}_{:x}", file.disk_number, file.disk_offset)
    } else if file.is_dir() && !file.file_name.ends_with(['/', '\\']) {
        format!("{}/", file.file_name)
    } else {
        file.file_name.clone()
    };
    let name_len = u16_len(name.len(), "file name is too long")?;
    let comment_len = if local {
        0
    } else {
        u16_len(file.file_comment.len(), "file comment is too long")?
    };

    let mut version_needed = VERSION_DEFAULT;
    if zip64 {
        version_needed = VERSION_ZIP64;
    }
    if aes {
        version_needed = VERSION_AES;
    }
    if file.compression_method == CompressionMethod::Lzma {
        version_needed = VERSION_LZMA;
    }
    version_needed = version_needed.max(file.version_needed);

    let mut flag = file.flag;
    if !name.is_ascii() {
        flag |= flags::UTF8;
    }
    let method = if aes {
        CompressionMethod::Aes
    } else {
        file.compression_method
    };

    let mut header = Vec::with_capacity(64 + name.len() + extra_len as usize);
    if local {
        header.write_u32::<LittleEndian>(LOCAL_FILE_HEADER_SIGNATURE)?;
    } else {
        header.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_HEADER_SIGNATURE)?;
        header.write_u16::<LittleEndian>(file.version_made_by)?;
    }
    header.write_u16::<LittleEndian>(version_needed)?;
    header.write_u16::<LittleEndian>(flag)?;
    header.write_u16::<LittleEndian>(method.to_u16())?;
    header.write_u32::<LittleEndian>(if mask {
        0
    } else {
        unix_to_dos_date(file.modified_date)
    })?;
    header.write_u32::<LittleEndian>(if mask { 0 } else { file.crc32 })?;
    if zip64 {
        header.write_u32::<LittleEndian>(U32_SENTINEL)?;
        header.write_u32::<LittleEndian>(U32_SENTINEL)?;
    } else {
        header.write_u32::<LittleEndian>(file.compressed_size as u32)?;
        header.write_u32::<LittleEndian>(if mask {
            0
        } else {
            file.uncompressed_size as u32
        })?;
    }
    header.write_u16::<LittleEndian>(name_len)?;
    header.write_u16::<LittleEndian>(extra_len)?;
    if !local {
        header.write_u16::<LittleEndian>(comment_len)?;
        header.write_u16::<LittleEndian>(if file.disk_number >= U16_SENTINEL as u32 {
            U16_SENTINEL
        } else {
            file.disk_number as u16
        })?;
        header.write_u16::<LittleEndian>(file.internal_fa)?;
        header.write_u32::<LittleEndian>(file.external_fa)?;
        header.write_u32::<LittleEndian>(if file.disk_offset >= U32_SENTINEL as u64 {
            U32_SENTINEL
        } else {
            file.disk_offset as u32
        })?;
    }
    header.write_all(name.as_bytes())?;
    for field in &fields {
        field.write(&mut header)?;
    }
    if !local {
        header.write_all(file.file_comment.as_bytes())?;
    }
    writer.write_all(&header)?;

    Ok(HeaderLayout {
        zip64,
        name_len,
        extra_len,
    })
}
