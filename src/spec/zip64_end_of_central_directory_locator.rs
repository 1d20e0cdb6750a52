use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE;
use crate::result::ZipResult;

/*
Zip64 end of central directory locator
      zip64 end of central dir locator
      signature                       4 bytes  (0x07064b50)
      number of the disk with the
      start of the zip64 end of
      central directory               4 bytes
      relative offset of the zip64
      end of central directory record 8 bytes
      total number of disks           4 bytes
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64CentralDirectoryEndLocator {
    /// number of the disk with the start of the zip64 end of central directory
    pub disk_with_central_directory: u32,
    /// relative offset of the zip64 end of central directory record
    pub end_of_central_directory_offset: u64,
    /// total number of disks
    pub number_of_disks: u32,
}

impl Zip64CentralDirectoryEndLocator {
    pub const SIZE: u64 = 20;

    pub fn load<R: Read>(reader: &mut R) -> ZipResult<Self> {
        Ok(Zip64CentralDirectoryEndLocator {
            disk_with_central_directory: reader.read_u32::<LittleEndian>()?,
            end_of_central_directory_offset: reader.read_u64::<LittleEndian>()?,
            number_of_disks: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_u32::<LittleEndian>(ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.disk_with_central_directory)?;
        writer.write_u64::<LittleEndian>(self.end_of_central_directory_offset)?;
        writer.write_u32::<LittleEndian>(self.number_of_disks)?;
        Ok(())
    }
}
