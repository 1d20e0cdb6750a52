use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{u16_len, CENTRAL_DIRECTORY_END_SIGNATURE};
use crate::result::ZipResult;

/*
End of central directory record
      end of central dir signature    4 bytes  (0x06054b50)
      number of this disk             2 bytes
      number of the disk with the
      start of the central directory  2 bytes
      total number of entries in the
      central directory on this disk  2 bytes
      total number of entries in
      the central directory           2 bytes
      size of the central directory   4 bytes
      offset of start of central
      directory with respect to
      the starting disk number        4 bytes
      .ZIP file comment length        2 bytes
      .ZIP file comment       (variable size)
*/

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralDirectoryEnd {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_files_on_this_disk: u16,
    pub number_of_files: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub zip_file_comment: Vec<u8>,
}

impl CentralDirectoryEnd {
    /// Size without the comment.
    pub const SIZE: u64 = 22;

    /// Reads the record whose signature was just consumed.
    ///
    /// A comment cut short by the end of the stream is kept as far as it goes.
    pub fn load<R: Read>(reader: &mut R) -> ZipResult<CentralDirectoryEnd> {
        let disk_number = reader.read_u16::<LittleEndian>()?;
        let disk_with_central_directory = reader.read_u16::<LittleEndian>()?;
        let number_of_files_on_this_disk = reader.read_u16::<LittleEndian>()?;
        let number_of_files = reader.read_u16::<LittleEndian>()?;
        let central_directory_size = reader.read_u32::<LittleEndian>()?;
        let central_directory_offset = reader.read_u32::<LittleEndian>()?;
        let comment_length = reader.read_u16::<LittleEndian>()? as u64;
        let mut zip_file_comment = Vec::new();
        reader
            .take(comment_length)
            .read_to_end(&mut zip_file_comment)?;
        Ok(CentralDirectoryEnd {
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            zip_file_comment,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        let comment_length = u16_len(self.zip_file_comment.len(), "archive comment is too long")?;
        writer.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_END_SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        writer.write_u16::<LittleEndian>(self.disk_with_central_directory)?;
        writer.write_u16::<LittleEndian>(self.number_of_files_on_this_disk)?;
        writer.write_u16::<LittleEndian>(self.number_of_files)?;
        writer.write_u32::<LittleEndian>(self.central_directory_size)?;
        writer.write_u32::<LittleEndian>(self.central_directory_offset)?;
        writer.write_u16::<LittleEndian>(comment_length)?;
        writer.write_all(&self.zip_file_comment)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::result::ZipError;
    use std::io::Cursor;

    #[test]
    fn write_then_load() {
        let record = CentralDirectoryEnd {
            number_of_files_on_this_disk: 3,
            number_of_files: 3,
            central_directory_size: 150,
            central_directory_offset: 1024,
            zip_file_comment: b"hello".to_vec(),
            ..Default::default()
        };
        let mut out = Vec::new();
        record.write(&mut out).unwrap();
        assert_eq!(out.len() as u64, CentralDirectoryEnd::SIZE + 5);
        assert_eq!(&out[..4], &[0x50, 0x4b, 0x05, 0x06]);

        let mut reader = Cursor::new(&out[4..]);
        assert_eq!(CentralDirectoryEnd::load(&mut reader).unwrap(), record);
    }

    #[test]
    fn truncated_comment_is_kept() {
        let mut out = Vec::new();
        CentralDirectoryEnd {
            zip_file_comment: b"a long comment".to_vec(),
            ..Default::default()
        }
        .write(&mut out)
        .unwrap();
        out.truncate(out.len() - 8);
        let record = CentralDirectoryEnd::load(&mut Cursor::new(&out[4..])).unwrap();
        assert_eq!(record.zip_file_comment, b"a long");
    }

    #[test]
    fn oversized_comment_is_refused() {
        let record = CentralDirectoryEnd {
            zip_file_comment: vec![b'x'; 70_000],
            ..Default::default()
        };
        assert!(matches!(
            record.write(&mut Vec::new()),
            Err(ZipError::CapacityExceeded(_))
        ));
    }
}
