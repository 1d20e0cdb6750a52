//! Extra field records attached to local and central headers.
//!
//! The extra area is a sequence of `(tag, length, data)` records. Known tags
//! decode to typed variants; anything else is kept as [`ExtraField::Unknown`]
//! so it can be written back unchanged.

use std::io::{self, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::result::{ZipError, ZipResult};

mod aes;
mod ntfs;
mod unix;
mod zip64;

pub use self::aes::AesExtraField;
pub use self::ntfs::NtfsTimestamps;
pub use self::unix::Unix1Field;
pub use self::zip64::{Sentinels, Zip64ExtraField};

pub const ZIP64_TAG: u16 = 0x0001;
pub const NTFS_TAG: u16 = 0x000a;
pub const UNIX1_TAG: u16 = 0x000d;
pub const AES_TAG: u16 = 0x9901;

/// A decoded extra field record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Zip64(Zip64ExtraField),
    Ntfs(NtfsTimestamps),
    Unix1(Unix1Field),
    Aes(AesExtraField),
    Unknown { tag: u16, data: Vec<u8> },
}

impl ExtraField {
    /// Decodes one record. `sentinels` tells which ZIP64 values the base
    /// header left to the ZIP64 record.
    pub fn parse(tag: u16, data: &[u8], sentinels: Sentinels) -> ZipResult<ExtraField> {
        let unknown = || ExtraField::Unknown {
            tag,
            data: data.to_vec(),
        };
        Ok(match tag {
            ZIP64_TAG if data.len() >= 8 => {
                ExtraField::Zip64(Zip64ExtraField::parse(data, sentinels)?)
            }
            NTFS_TAG if data.len() > 4 => match NtfsTimestamps::parse(data) {
                Some(times) => ExtraField::Ntfs(times),
                None => unknown(),
            },
            UNIX1_TAG if data.len() >= 12 => ExtraField::Unix1(Unix1Field::parse(data)?),
            AES_TAG if data.len() == 7 => ExtraField::Aes(AesExtraField::parse(data)?),
            _ => unknown(),
        })
    }

    pub fn tag(&self) -> u16 {
        match self {
            ExtraField::Zip64(_) => ZIP64_TAG,
            ExtraField::Ntfs(_) => NTFS_TAG,
            ExtraField::Unix1(_) => UNIX1_TAG,
            ExtraField::Aes(_) => AES_TAG,
            ExtraField::Unknown { tag, .. } => *tag,
        }
    }

    /// Encoded size including the 4 byte record header.
    pub fn encoded_len(&self) -> usize {
        4 + match self {
            ExtraField::Zip64(field) => field.data_len(),
            ExtraField::Ntfs(_) => NtfsTimestamps::DATA_LEN,
            ExtraField::Unix1(field) => field.data_len(),
            ExtraField::Aes(_) => AesExtraField::DATA_LEN,
            ExtraField::Unknown { data, .. } => data.len(),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        let data_len = u16::try_from(self.encoded_len() - 4)
            .map_err(|_| ZipError::CapacityExceeded("extra field record is too long"))?;
        writer.write_u16::<LittleEndian>(self.tag())?;
        writer.write_u16::<LittleEndian>(data_len)?;
        match self {
            ExtraField::Zip64(field) => field.write(writer)?,
            ExtraField::Ntfs(field) => field.write(writer)?,
            ExtraField::Unix1(field) => field.write(writer)?,
            ExtraField::Aes(field) => field.write(writer)?,
            ExtraField::Unknown { data, .. } => writer.write_all(data)?,
        }
        Ok(())
    }
}

/// Iterates the raw `(tag, data)` records of an extra area.
///
/// A record whose declared length runs past the end of the area is clamped
/// to the bytes that remain, which also ends the walk.
pub fn records(extra: &[u8]) -> Records<'_> {
    Records { extra, pos: 0 }
}

#[derive(Debug, Clone)]
pub struct Records<'a> {
    extra: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Records<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 4 > self.extra.len() {
            return None;
        }
        let mut header = &self.extra[self.pos..self.pos + 4];
        let tag = header.read_u16::<LittleEndian>().ok()?;
        let declared = header.read_u16::<LittleEndian>().ok()? as usize;
        let start = self.pos + 4;
        let len = declared.min(self.extra.len() - start);
        self.pos = start + len;
        Some((tag, &self.extra[start..start + len]))
    }
}

/// Decodes every record of an extra area.
pub fn parse_all(extra: &[u8], sentinels: Sentinels) -> ZipResult<Vec<ExtraField>> {
    records(extra)
        .map(|(tag, data)| ExtraField::parse(tag, data, sentinels))
        .collect()
}

/// Whether the extra area carries a ZIP64 record.
pub fn has_zip64(extra: &[u8]) -> bool {
    records(extra).any(|(tag, data)| tag == ZIP64_TAG && data.len() >= 8)
}

pub(crate) fn invalid_field(what: &'static str) -> ZipError {
    ZipError::InvalidArchive(what)
}

pub(crate) fn read_err(_: io::Error) -> ZipError {
    ZipError::InvalidArchive("extra field record is truncated")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn walks_records_and_clamps_the_last() {
        let extra = [
            0x34, 0x12, 2, 0, 0xaa, 0xbb, // tag 0x1234
            0x78, 0x56, 10, 0, 1, 2, 3, // claims 10 bytes, only 3 remain
        ];
        let records: Vec<_> = records(&extra).collect();
        assert_eq!(
            records,
            vec![(0x1234, &[0xaa, 0xbb][..]), (0x5678, &[1, 2, 3][..])]
        );
    }

    #[test]
    fn ignores_trailing_partial_header() {
        let extra = [0x34, 0x12, 0, 0, 0x01];
        assert_eq!(records(&extra).count(), 1);
    }

    #[test]
    fn unknown_records_round_trip() {
        let field = ExtraField::parse(0x7875, &[1, 4, 0xe8, 3, 0, 0], Sentinels::default()).unwrap();
        assert!(matches!(field, ExtraField::Unknown { tag: 0x7875, .. }));
        let mut out = Vec::new();
        field.write(&mut out).unwrap();
        assert_eq!(out, [0x75, 0x78, 6, 0, 1, 4, 0xe8, 3, 0, 0]);
        assert_eq!(field.encoded_len(), out.len());
    }

    #[test]
    fn short_known_records_are_kept_raw() {
        let field = ExtraField::parse(ZIP64_TAG, &[1, 2, 3], Sentinels::default()).unwrap();
        assert!(matches!(field, ExtraField::Unknown { tag: ZIP64_TAG, .. }));
        assert!(!has_zip64(&[1, 0, 3, 0, 1, 2, 3]));
    }
}
