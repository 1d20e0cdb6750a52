use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::read_err;
use crate::result::ZipResult;

/// The Info-ZIP UNIX1 record: times, owner and the target of a symlink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Unix1Field {
    pub accessed: u32,
    pub modified: u32,
    pub uid: u16,
    pub gid: u16,
    pub linkname: Vec<u8>,
}

impl Unix1Field {
    pub fn parse(mut data: &[u8]) -> ZipResult<Unix1Field> {
        Ok(Unix1Field {
            accessed: data.read_u32::<LittleEndian>().map_err(read_err)?,
            modified: data.read_u32::<LittleEndian>().map_err(read_err)?,
            uid: data.read_u16::<LittleEndian>().map_err(read_err)?,
            gid: data.read_u16::<LittleEndian>().map_err(read_err)?,
            linkname: data.to_vec(),
        })
    }

    pub fn data_len(&self) -> usize {
        12 + self.linkname.len()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.accessed)?;
        writer.write_u32::<LittleEndian>(self.modified)?;
        writer.write_u16::<LittleEndian>(self.uid)?;
        writer.write_u16::<LittleEndian>(self.gid)?;
        writer.write_all(&self.linkname)
    }
}
