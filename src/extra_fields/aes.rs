use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{read_err, invalid_field};
use crate::compression::CompressionMethod;
use crate::result::ZipResult;
use crate::types::{AesMode, AesVendorVersion};

/// WinZip AES extra field: vendor version, strength and the real method.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AesExtraField {
    pub vendor_version: AesVendorVersion,
    pub mode: AesMode,
    pub compression_method: CompressionMethod,
}

impl AesExtraField {
    pub const DATA_LEN: usize = 7;

    pub fn parse(mut data: &[u8]) -> ZipResult<AesExtraField> {
        let vendor_version = AesVendorVersion::from_u16(data.read_u16::<LittleEndian>().map_err(read_err)?)
            .ok_or_else(|| invalid_field("unsupported AES vendor version"))?;
        let mut vendor_id = [0u8; 2];
        io::Read::read_exact(&mut data, &mut vendor_id).map_err(read_err)?;
        if &vendor_id != b"AE" {
            return Err(invalid_field("AES extra field has an invalid vendor id"));
        }
        let mode = AesMode::from_u8(data.read_u8().map_err(read_err)?)
            .ok_or_else(|| invalid_field("invalid AES encryption strength"))?;
        let compression_method =
            CompressionMethod::from_u16(data.read_u16::<LittleEndian>().map_err(read_err)?);
        Ok(AesExtraField {
            vendor_version,
            mode,
            compression_method,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.vendor_version as u16)?;
        writer.write_all(b"AE")?;
        writer.write_u8(self.mode as u8)?;
        writer.write_u16::<LittleEndian>(self.compression_method.to_u16())
    }
}
