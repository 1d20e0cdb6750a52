use std::io::prelude::*;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::DATA_DESCRIPTOR_SIGNATURE;
use crate::result::ZipResult;

/*
Data descriptor
        data descriptor signature       4 bytes  (0x08074b50, optional)
        crc-32                          4 bytes
        compressed size                 4 bytes  (8 bytes with zip64)
        uncompressed size               4 bytes  (8 bytes with zip64)
*/

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Reads a descriptor, with or without its signature.
    pub fn load<R: Read>(reader: &mut R, zip64: bool) -> ZipResult<Self> {
        let mut crc32 = reader.read_u32::<LittleEndian>()?;
        if crc32 == DATA_DESCRIPTOR_SIGNATURE {
            crc32 = reader.read_u32::<LittleEndian>()?;
        }
        let (compressed_size, uncompressed_size) = if zip64 {
            (
                reader.read_u64::<LittleEndian>()?,
                reader.read_u64::<LittleEndian>()?,
            )
        } else {
            (
                reader.read_u32::<LittleEndian>()? as u64,
                reader.read_u32::<LittleEndian>()? as u64,
            )
        };
        Ok(DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Writes the descriptor, always with its signature. Without `zip64`
    /// the sizes must already fit 32 bits.
    pub fn write<W: Write>(&self, writer: &mut W, zip64: bool) -> ZipResult<()> {
        writer.write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIGNATURE)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        if zip64 {
            writer.write_u64::<LittleEndian>(self.compressed_size)?;
            writer.write_u64::<LittleEndian>(self.uncompressed_size)?;
        } else {
            writer.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            writer.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }
        Ok(())
    }

    pub fn encoded_len(zip64: bool) -> u64 {
        if zip64 {
            24
        } else {
            16
        }
    }
}
