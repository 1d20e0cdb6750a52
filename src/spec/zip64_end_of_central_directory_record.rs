use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE;
use crate::result::ZipResult;

/*
Zip64 end of central directory record
        zip64 end of central dir
        signature                       4 bytes  (0x06064b50)
        size of zip64 end of central
        directory record                8 bytes
        version made by                 2 bytes
        version needed to extract       2 bytes
        number of this disk             4 bytes
        number of the disk with the
        start of the central directory  4 bytes
        total number of entries in the
        central directory on this disk  8 bytes
        total number of entries in the
        central directory               8 bytes
        size of the central directory   8 bytes
        offset of start of central
        directory with respect to
        the starting disk number        8 bytes
        zip64 extensible data sector    (variable size)
*/

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64CentralDirectoryEnd {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub number_of_files_on_this_disk: u64,
    pub number_of_files: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64CentralDirectoryEnd {
    pub const SIZE: u64 = 56;

    /// Reads the record whose signature was just consumed. The extensible
    /// data sector is not interpreted.
    pub fn load<R: Read>(reader: &mut R) -> ZipResult<Self> {
        let _size_of_rest = reader.read_u64::<LittleEndian>()?;
        Ok(Zip64CentralDirectoryEnd {
            version_made_by: reader.read_u16::<LittleEndian>()?,
            version_needed_to_extract: reader.read_u16::<LittleEndian>()?,
            disk_number: reader.read_u32::<LittleEndian>()?,
            disk_with_central_directory: reader.read_u32::<LittleEndian>()?,
            number_of_files_on_this_disk: reader.read_u64::<LittleEndian>()?,
            number_of_files: reader.read_u64::<LittleEndian>()?,
            central_directory_size: reader.read_u64::<LittleEndian>()?,
            central_directory_offset: reader.read_u64::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_u32::<LittleEndian>(ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE)?;
        // size of the rest of the record
        writer.write_u64::<LittleEndian>(Self::SIZE - 12)?;
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        writer.write_u16::<LittleEndian>(self.version_needed_to_extract)?;
        writer.write_u32::<LittleEndian>(self.disk_number)?;
        writer.write_u32::<LittleEndian>(self.disk_with_central_directory)?;
        writer.write_u64::<LittleEndian>(self.number_of_files_on_this_disk)?;
        writer.write_u64::<LittleEndian>(self.number_of_files)?;
        writer.write_u64::<LittleEndian>(self.central_directory_size)?;
        writer.write_u64::<LittleEndian>(self.central_directory_offset)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spec::Zip64CentralDirectoryEndLocator;
    use std::io::Cursor;

    #[test]
    fn record_and_locator_layout() {
        let record = Zip64CentralDirectoryEnd {
            version_made_by: 0x032d,
            version_needed_to_extract: 45,
            number_of_files_on_this_disk: 70_000,
            number_of_files: 70_000,
            central_directory_size: 0x1_2345_6789,
            central_directory_offset: 0x2_0000_0000,
            ..Default::default()
        };
        let locator = Zip64CentralDirectoryEndLocator {
            disk_with_central_directory: 0,
            end_of_central_directory_offset: 0x3_0000_0000,
            number_of_disks: 1,
        };
        let mut out = Vec::new();
        record.write(&mut out).unwrap();
        assert_eq!(out.len() as u64, Zip64CentralDirectoryEnd::SIZE);
        locator.write(&mut out).unwrap();
        assert_eq!(
            out.len() as u64,
            Zip64CentralDirectoryEnd::SIZE + Zip64CentralDirectoryEndLocator::SIZE
        );

        let mut reader = Cursor::new(&out[4..]);
        assert_eq!(Zip64CentralDirectoryEnd::load(&mut reader).unwrap(), record);
        reader.set_position(Zip64CentralDirectoryEnd::SIZE);
        assert_eq!(
            Zip64CentralDirectoryEndLocator::load(&mut reader).unwrap(),
            locator
        );
    }
}
