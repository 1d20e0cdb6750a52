//! Rebuilding a central directory from the local headers of a damaged
//! archive.

use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, trace};

use crate::extra_fields;
use crate::result::{ZipError, ZipResult};
use crate::spec::{
    self, DataDescriptor, CENTRAL_DIRECTORY_HEADER_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
    LOCAL_FILE_HEADER_SIGNATURE, MAX_DATA_DESCRIPTOR_SIZE,
};
use crate::stream;

/// Central records rebuilt by [`recover_central_directory`].
#[derive(Debug, Default)]
pub(crate) struct RecoveredDirectory {
    pub(crate) cd: Vec<u8>,
    pub(crate) number_entry: u64,
    /// End of the last entry found; new entries or a new directory go here.
    pub(crate) end_pos: u64,
}

/// Walks the stream from the start, one local header after another, and
/// writes a central record for each entry found.
///
/// Entries that defer their sizes to a data descriptor are measured up to
/// the descriptor in front of the next header. Offsets are recorded as
/// found on the stream.
pub(crate) fn recover_central_directory<R: Read + Seek>(
    reader: &mut R,
) -> ZipResult<RecoveredDirectory> {
    let local_magic = LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes();
    let central_magic = CENTRAL_DIRECTORY_HEADER_SIGNATURE.to_le_bytes();
    let descriptor_magic = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();

    reader.seek(SeekFrom::Start(0))?;
    if stream::find(reader, &local_magic, u64::MAX)?.is_none() {
        return Err(ZipError::InvalidArchive("No local file header found"));
    }

    let mut recovered = RecoveredDirectory::default();
    let mut eof = false;
    while !eof {
        let disk_offset = reader.stream_position()?;
        let mut file = match spec::read_local_header(reader) {
            Ok(file) => file,
            Err(e) => {
                debug!(offset = disk_offset, error = %e, "stopping at unreadable local header");
                break;
            }
        };
        let data_start = reader.stream_position()?;
        if file.compressed_size > 0 {
            reader.seek(SeekFrom::Start(data_start.saturating_add(file.compressed_size)))?;
        }
        let zip64 = extra_fields::has_zip64(&file.extra_field);

        let (next, end) = loop {
            let next = match stream::find(reader, &local_magic, u64::MAX)? {
                Some(pos) => pos,
                None => {
                    eof = true;
                    match stream::find(reader, &central_magic, u64::MAX)? {
                        Some(pos) => pos,
                        None => stream::stream_len(reader)?,
                    }
                }
            };
            if !file.has_data_descriptor() && file.compressed_size > 0 {
                break (next, next);
            }

            reader.seek(SeekFrom::Start(next))?;
            match stream::find_reverse(reader, &descriptor_magic, MAX_DATA_DESCRIPTOR_SIZE)? {
                Some(pos) if pos >= data_start => {
                    let descriptor = DataDescriptor::load(reader, zip64)?;
                    trace!(?descriptor, pos, "found data descriptor");
                    if file.crc32 == 0 {
                        file.crc32 = descriptor.crc32;
                    }
                    if file.compressed_size == 0 {
                        file.compressed_size = descriptor.compressed_size;
                    }
                    if file.uncompressed_size == 0 {
                        file.uncompressed_size = descriptor.uncompressed_size;
                    }
                    break (next, pos);
                }
                _ if eof || !file.has_data_descriptor() => break (next, next),
                // a signature inside the payload, keep looking
                _ => {
                    reader.seek(SeekFrom::Start(next + 1))?;
                }
            }
        };

        let span = end.saturating_sub(data_start);
        if file.compressed_size == 0 {
            file.compressed_size = span;
        }
        if span > u32::MAX as u64 && file.uncompressed_size < u32::MAX as u64 {
            file.compressed_size = span;
            file.uncompressed_size = 0;
        }
        file.disk_offset = disk_offset;

        debug!(
            name = %file.file_name,
            offset = disk_offset,
            compressed = file.compressed_size,
            uncompressed = file.uncompressed_size,
            "recovered entry"
        );
        spec::write_header(&mut recovered.cd, false, &file)?;
        recovered.number_entry += 1;
        recovered.end_pos = next;
        reader.seek(SeekFrom::Start(next))?;
    }

    if recovered.number_entry == 0 {
        return Err(ZipError::InvalidArchive("No entries could be recovered"));
    }
    Ok(recovered)
}
