use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Attribute tag of the modification/access/creation triple.
const TIMES_TAG: u16 = 0x0001;
const TIMES_LEN: usize = 24;

/// NTFS timestamps, in 100ns ticks since 1601-01-01.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NtfsTimestamps {
    pub modified: u64,
    pub accessed: u64,
    pub creation: u64,
}

impl NtfsTimestamps {
    /// Reserved word, attribute tag, attribute size and the three times.
    pub const DATA_LEN: usize = 4 + 2 + 2 + TIMES_LEN;

    /// Looks for the timestamp attribute after the reserved word.
    pub fn parse(data: &[u8]) -> Option<NtfsTimestamps> {
        let mut attributes = data.get(4..)?;
        while attributes.len() >= 4 {
            let tag = attributes.read_u16::<LittleEndian>().ok()?;
            let size = (attributes.read_u16::<LittleEndian>().ok()? as usize).min(attributes.len());
            let (mut value, rest) = attributes.split_at(size);
            if tag == TIMES_TAG && size == TIMES_LEN {
                return Some(NtfsTimestamps {
                    modified: value.read_u64::<LittleEndian>().ok()?,
                    accessed: value.read_u64::<LittleEndian>().ok()?,
                    creation: value.read_u64::<LittleEndian>().ok()?,
                });
            }
            attributes = rest;
        }
        None
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        // reserved
        writer.write_u32::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(TIMES_TAG)?;
        writer.write_u16::<LittleEndian>(TIMES_LEN as u16)?;
        writer.write_u64::<LittleEndian>(self.modified)?;
        writer.write_u64::<LittleEndian>(self.accessed)?;
        writer.write_u64::<LittleEndian>(self.creation)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skips_other_attributes() {
        let mut data = vec![0, 0, 0, 0];
        // attribute 2 with 3 bytes of payload
        data.extend_from_slice(&[2, 0, 3, 0, 9, 9, 9]);
        data.extend_from_slice(&[1, 0, 24, 0]);
        for value in [10u64, 20, 30] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let times = NtfsTimestamps::parse(&data).unwrap();
        assert_eq!(
            times,
            NtfsTimestamps {
                modified: 10,
                accessed: 20,
                creation: 30
            }
        );
    }

    #[test]
    fn truncated_times_are_ignored() {
        let data = [0, 0, 0, 0, 1, 0, 24, 0, 1, 2, 3];
        assert_eq!(NtfsTimestamps::parse(&data), None);
    }

    #[test]
    fn written_record_parses_back() {
        let times = NtfsTimestamps {
            modified: 1,
            accessed: 2,
            creation: 3,
        };
        let mut out = Vec::new();
        times.write(&mut out).unwrap();
        assert_eq!(out.len(), NtfsTimestamps::DATA_LEN);
        assert_eq!(NtfsTimestamps::parse(&out), Some(times));
    }
}
