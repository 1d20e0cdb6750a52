use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::read_err;
use crate::result::ZipResult;

/// Which base header fields held their all-ones sentinel.
///
/// Only those values are present in the ZIP64 record, in the order
/// uncompressed size, compressed size, disk offset, disk number.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Sentinels {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub disk_offset: bool,
    pub disk_number: bool,
}

/// Zip64 extended information extra field
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Zip64ExtraField {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub disk_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

impl Zip64ExtraField {
    pub fn parse(mut data: &[u8], sentinels: Sentinels) -> ZipResult<Self> {
        let mut field = Zip64ExtraField::default();
        if sentinels.uncompressed_size {
            field.uncompressed_size = Some(data.read_u64::<LittleEndian>().map_err(read_err)?);
        }
        if sentinels.compressed_size {
            field.compressed_size = Some(data.read_u64::<LittleEndian>().map_err(read_err)?);
        }
        if sentinels.disk_offset {
            field.disk_offset = Some(data.read_u64::<LittleEndian>().map_err(read_err)?);
        }
        if sentinels.disk_number {
            field.disk_number = Some(data.read_u32::<LittleEndian>().map_err(read_err)?);
        }
        Ok(field)
    }

    pub fn data_len(&self) -> usize {
        [
            self.uncompressed_size.map(|_| 8),
            self.compressed_size.map(|_| 8),
            self.disk_offset.map(|_| 8),
            self.disk_number.map(|_| 4),
        ]
        .iter()
        .flatten()
        .sum()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if let Some(size) = self.uncompressed_size {
            writer.write_u64::<LittleEndian>(size)?;
        }
        if let Some(size) = self.compressed_size {
            writer.write_u64::<LittleEndian>(size)?;
        }
        if let Some(offset) = self.disk_offset {
            writer.write_u64::<LittleEndian>(offset)?;
        }
        if let Some(disk) = self.disk_number {
            writer.write_u32::<LittleEndian>(disk)?;
        }
        Ok(())
    }
}
