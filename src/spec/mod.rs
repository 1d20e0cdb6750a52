//! On-disk records of the archive format.
//!
//! Every multi-byte field is little-endian. Each record type has a `load`
//! reading it after its signature was matched, and a `write` emitting it
//! signature first.

mod data_descriptor;
mod end_of_central_directory_record;
mod file_header;
mod zip64_end_of_central_directory_locator;
mod zip64_end_of_central_directory_record;

pub use self::data_descriptor::DataDescriptor;
pub use self::end_of_central_directory_record::CentralDirectoryEnd;
pub use self::file_header::{
    needs_zip64, read_central_header, read_local_header, write_header, zip64_decision,
    HeaderLayout,
};
pub use self::zip64_end_of_central_directory_locator::Zip64CentralDirectoryEndLocator;
pub use self::zip64_end_of_central_directory_record::Zip64CentralDirectoryEnd;

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_DIRECTORY_HEADER_SIGNATURE: u32 = 0x02014b50;
pub const CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06054b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06064b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE: u32 = 0x07064b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// Fixed part of a local header, signature included.
pub const LOCAL_HEADER_SIZE: u64 = 30;
/// Fixed part of a central header, signature included.
pub const CENTRAL_HEADER_SIZE: u64 = 46;
/// Offset of the CRC inside a local header; the two sizes follow it.
pub const LOCAL_CRC_OFFSET: u64 = 14;
/// Largest data descriptor: signature, CRC and two 64-bit sizes.
pub const MAX_DATA_DESCRIPTOR_SIZE: u64 = 24;
/// How far back from the end of the stream the end record is searched for.
pub const END_RECORD_SEARCH_LIMIT: u64 = 1 << 20;
/// Headroom below 4 GiB at which a local header is promoted to ZIP64, since
/// compressed output can exceed its input.
pub const UNCOMPRESSED_CUSHION: u64 = 2 * 1024 * 1024;

pub(crate) const U16_SENTINEL: u16 = u16::MAX;
pub(crate) const U32_SENTINEL: u32 = u32::MAX;

/// Converts a length to a 16-bit field, failing with `what`.
pub(crate) fn u16_len(len: usize, what: &'static str) -> crate::result::ZipResult<u16> {
    u16::try_from(len).map_err(|_| crate::result::ZipError::CapacityExceeded(what))
}
