//! Types that specify what is contained in a ZIP.

use std::fmt;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::compression::CompressionMethod;
use crate::result::DateTimeRangeError;
use crate::system::{self, ffi, System};

/// Version needed to extract a plain entry.
pub const VERSION_DEFAULT: u16 = 20;
/// Version needed to extract an entry carrying ZIP64 fields.
pub const VERSION_ZIP64: u16 = 45;
/// Version needed to extract a WinZip AES entry.
pub const VERSION_AES: u16 = 51;
/// Version needed to extract an LZMA entry.
pub const VERSION_LZMA: u16 = 63;
/// `version made by` written by default: unix host, specification 4.5.
pub const DEFAULT_VERSION_MADE_BY: u16 = (System::Unix as u16) << 8 | VERSION_ZIP64;

/// General purpose flag bits.
pub mod flags {
    pub const ENCRYPTED: u16 = 1 << 0;
    pub const LZMA_EOS_MARKER: u16 = 1 << 1;
    pub const DEFLATE_MAX: u16 = 1 << 1;
    pub const DEFLATE_FAST: u16 = 1 << 2;
    pub const DEFLATE_SUPER_FAST: u16 = DEFLATE_FAST | DEFLATE_MAX;
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    pub const UTF8: u16 = 1 << 11;
    /// Local header metadata is hidden and only the central record is authoritative.
    pub const MASK_LOCAL_INFO: u16 = 1 << 13;
}

/// Offset between the NTFS epoch (1601-01-01) and the unix epoch in 100ns ticks.
const NTFS_UNIX_EPOCH_DIFF: i128 = 116_444_736_000_000_000;
const NTFS_TICKS_PER_SECOND: i128 = 10_000_000;

/// Representation of a moment in time.
///
/// Zip files use an old format from DOS to store timestamps,
/// with its own set of peculiarities.
/// For example, it has a resolution of 2 seconds!
///
/// Timestamps are interpreted as UTC.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    datepart: u16,
    timepart: u16,
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::default() {
            return f.write_str("DateTime::default()");
        }
        write!(
            f,
            "DateTime::from_date_and_time({}, {}, {}, {}, {}, {})?",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

impl DateTime {
    /// Converts an msdos (u16, u16) pair to a DateTime object if it represents a valid date and
    /// time.
    pub fn try_from_msdos(datepart: u16, timepart: u16) -> Result<DateTime, DateTimeRangeError> {
        let seconds = (timepart & 0b0000000000011111) << 1;
        let minutes = (timepart & 0b0000011111100000) >> 5;
        let hours = (timepart & 0b1111100000000000) >> 11;
        let days = datepart & 0b0000000000011111;
        let months = (datepart & 0b0000000111100000) >> 5;
        let years = (datepart & 0b1111111000000000) >> 9;
        Self::from_date_and_time(
            years + 1980,
            months as u8,
            days as u8,
            hours as u8,
            minutes as u8,
            seconds as u8,
        )
    }

    /// Constructs a DateTime from a specific date and time
    ///
    /// The bounds are:
    /// * year: [1980, 2107]
    /// * month: [1, 12]
    /// * day: [1, 28..=31]
    /// * hour: [0, 23]
    /// * minute: [0, 59]
    /// * second: [0, 58]
    pub fn from_date_and_time(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<DateTime, DateTimeRangeError> {
        fn is_leap_year(year: u16) -> bool {
            (year % 4 == 0) && ((year % 100 != 0) || (year % 400 == 0))
        }

        if !((1980..=2107).contains(&year)
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour <= 23
            && minute <= 59
            && second <= 60)
        {
            return Err(DateTimeRangeError);
        }
        let max_day = match month {
            4 | 6 | 9 | 11 => 30,
            2 if is_leap_year(year) => 29,
            2 => 28,
            _ => 31,
        };
        if day > max_day {
            return Err(DateTimeRangeError);
        }
        let second = second.min(58);
        let datepart = (day as u16) | ((month as u16) << 5) | ((year - 1980) << 9);
        let timepart = ((second as u16) >> 1) | ((minute as u16) << 5) | ((hour as u16) << 11);
        Ok(DateTime { datepart, timepart })
    }

    /// Splits a 32-bit header field (date in the high word) into a DateTime.
    pub fn try_from_dos_date(dos_date: u32) -> Result<DateTime, DateTimeRangeError> {
        Self::try_from_msdos((dos_date >> 16) as u16, dos_date as u16)
    }

    /// Packs the date in the high word and the time in the low word.
    pub const fn to_dos_date(&self) -> u32 {
        (self.datepart as u32) << 16 | self.timepart as u32
    }

    /// Gets the time portion of this datetime in the msdos representation
    pub const fn timepart(&self) -> u16 {
        self.timepart
    }

    /// Gets the date portion of this datetime in the msdos representation
    pub const fn datepart(&self) -> u16 {
        self.datepart
    }

    /// Get the year. There is no epoch, i.e. 2018 will be returned as 2018.
    pub const fn year(&self) -> u16 {
        (self.datepart >> 9) + 1980
    }

    /// Get the month, where 1 = january and 12 = december
    pub const fn month(&self) -> u8 {
        ((self.datepart & 0b0000000111100000) >> 5) as u8
    }

    /// Get the day
    pub const fn day(&self) -> u8 {
        (self.datepart & 0b0000000000011111) as u8
    }

    /// Get the hour
    pub const fn hour(&self) -> u8 {
        (self.timepart >> 11) as u8
    }

    /// Get the minute
    pub const fn minute(&self) -> u8 {
        ((self.timepart & 0b0000011111100000) >> 5) as u8
    }

    /// Get the second
    pub const fn second(&self) -> u8 {
        ((self.timepart & 0b0000000000011111) << 1) as u8
    }
}

impl TryFrom<OffsetDateTime> for DateTime {
    type Error = DateTimeRangeError;

    fn try_from(dt: OffsetDateTime) -> Result<Self, Self::Error> {
        let year = u16::try_from(dt.year()).map_err(|_| DateTimeRangeError)?;
        Self::from_date_and_time(
            year,
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
        )
    }
}

impl TryFrom<DateTime> for OffsetDateTime {
    type Error = DateTimeRangeError;

    fn try_from(dt: DateTime) -> Result<Self, Self::Error> {
        let month = Month::try_from(dt.month()).map_err(|_| DateTimeRangeError)?;
        let date = Date::from_calendar_date(dt.year() as i32, month, dt.day())
            .map_err(|_| DateTimeRangeError)?;
        let time =
            Time::from_hms(dt.hour(), dt.minute(), dt.second()).map_err(|_| DateTimeRangeError)?;
        Ok(PrimitiveDateTime::new(date, time).assume_utc())
    }
}

/// Converts a DOS date field to unix seconds; invalid dates yield 0.
pub fn dos_date_to_unix(dos_date: u32) -> i64 {
    DateTime::try_from_dos_date(dos_date)
        .and_then(OffsetDateTime::try_from)
        .map(|dt| dt.unix_timestamp())
        .unwrap_or(0)
}

/// Converts unix seconds to a DOS date field; unrepresentable times yield 0.
pub fn unix_to_dos_date(unix_time: i64) -> u32 {
    OffsetDateTime::from_unix_timestamp(unix_time)
        .map_err(|_| DateTimeRangeError)
        .and_then(DateTime::try_from)
        .map(|dt| dt.to_dos_date())
        .unwrap_or(0)
}

/// Converts an NTFS timestamp (100ns ticks since 1601) to unix seconds.
pub fn ntfs_to_unix(ntfs_time: u64) -> i64 {
    ((ntfs_time as i128 - NTFS_UNIX_EPOCH_DIFF) / NTFS_TICKS_PER_SECOND) as i64
}

/// Converts unix seconds to an NTFS timestamp.
pub fn unix_to_ntfs(unix_time: i64) -> u64 {
    let ticks = unix_time as i128 * NTFS_TICKS_PER_SECOND + NTFS_UNIX_EPOCH_DIFF;
    ticks.clamp(0, u64::MAX as i128) as u64
}

/// AES variant used.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AesMode {
    Aes128 = 1,
    Aes192 = 2,
    Aes256 = 3,
}

impl AesMode {
    /// Decodes the strength byte of the AES extra field.
    pub fn from_u8(strength: u8) -> Option<AesMode> {
        match strength {
            1 => Some(AesMode::Aes128),
            2 => Some(AesMode::Aes192),
            3 => Some(AesMode::Aes256),
            _ => None,
        }
    }

    pub fn salt_length(&self) -> usize {
        4 * (*self as usize) + 4
    }

    pub fn key_length(&self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }
}

/// AES vendor version as recorded in the AES extra field.
///
/// AE-2 entries do not carry a usable CRC; the authentication code covers
/// their integrity instead.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AesVendorVersion {
    Ae1 = 1,
    Ae2 = 2,
}

impl AesVendorVersion {
    pub fn from_u16(version: u16) -> Option<AesVendorVersion> {
        match version {
            1 => Some(AesVendorVersion::Ae1),
            2 => Some(AesVendorVersion::Ae2),
            _ => None,
        }
    }
}

/// Whether an entry may, must, or must not use ZIP64 fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Zip64Mode {
    /// Promote when a size or offset needs it, or when the size is not known up front.
    #[default]
    Auto,
    Force,
    /// Fail instead of promoting.
    Disable,
}

/// CRC and sizes of an entry as observed when it was closed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct EntryTotals {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// Structure representing a ZIP file.
///
/// The same record describes an entry read from the central directory, the
/// re-parsed local header of an open entry, and the metadata handed to
/// [`crate::ZipArchive::entry_write_open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipFileData {
    /// Host system in the high byte, specification version in the low byte
    pub version_made_by: u16,
    pub version_needed: u16,
    /// General purpose bit flag, see [`flags`]
    pub flag: u16,
    /// Compression method used to store the file
    pub compression_method: CompressionMethod,
    /// Last modified time as unix seconds, 0 when unknown
    pub modified_date: i64,
    pub accessed_date: i64,
    pub creation_date: i64,
    /// CRC32 checksum
    pub crc32: u32,
    /// Size of the file in the ZIP
    pub compressed_size: u64,
    /// Size of the file when extracted
    pub uncompressed_size: u64,
    /// Name of the file
    pub file_name: String,
    /// Raw extra field bytes
    pub extra_field: Vec<u8>,
    pub file_comment: String,
    /// Target of a symbolic link, from the UNIX1 extra field
    pub linkname: String,
    pub disk_number: u32,
    /// Specifies where the local header of the file starts
    pub disk_offset: u64,
    pub internal_fa: u16,
    /// External file attributes
    pub external_fa: u32,
    pub zip64: Zip64Mode,
    /// `None` for plain entries, and for legacy encryption when the entry is encrypted
    pub aes_version: Option<AesVendorVersion>,
    pub aes_mode: AesMode,
    /// Verification word of the legacy encryption header
    pub pk_verify: u16,
}

impl Default for ZipFileData {
    fn default() -> Self {
        ZipFileData {
            version_made_by: DEFAULT_VERSION_MADE_BY,
            version_needed: VERSION_DEFAULT,
            flag: 0,
            compression_method: CompressionMethod::default(),
            modified_date: 0,
            accessed_date: 0,
            creation_date: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: String::new(),
            extra_field: Vec::new(),
            file_comment: String::new(),
            linkname: String::new(),
            disk_number: 0,
            disk_offset: 0,
            internal_fa: 0,
            external_fa: 0,
            zip64: Zip64Mode::Auto,
            aes_version: None,
            aes_mode: AesMode::Aes256,
            pk_verify: 0,
        }
    }
}

impl ZipFileData {
    /// Metadata for a regular file about to be written.
    ///
    /// Encrypted writes default to AES-256 (AE-2).
    pub fn new<S: Into<String>>(name: S) -> ZipFileData {
        ZipFileData {
            file_name: name.into(),
            external_fa: (ffi::S_IFREG | 0o644) << 16,
            aes_version: Some(AesVendorVersion::Ae2),
            ..Default::default()
        }
    }

    /// Metadata for a directory entry. A trailing `/` is added when written.
    pub fn directory<S: Into<String>>(name: S) -> ZipFileData {
        ZipFileData {
            file_name: name.into(),
            external_fa: (ffi::S_IFDIR | 0o755) << 16 | ffi::FILE_ATTRIBUTE_DIRECTORY,
            compression_method: CompressionMethod::Stored,
            ..Default::default()
        }
    }

    /// Set the compression method for the new file
    pub fn compression_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    /// Set the permissions for the new file.
    ///
    /// The format is represented with unix-style permissions.
    pub fn unix_permissions(mut self, mode: u32) -> Self {
        let kind = if self.is_dir() { ffi::S_IFDIR } else { ffi::S_IFREG };
        self.version_made_by = (System::Unix as u16) << 8 | (self.version_made_by & 0xff);
        self.external_fa = ((kind | (mode & 0o7777)) << 16) | (self.external_fa & 0xffff);
        self
    }

    /// Set the last modified time, in unix seconds.
    pub fn modified(mut self, unix_time: i64) -> Self {
        self.modified_date = unix_time;
        self
    }

    /// Set all three timestamps; when all are non-zero an NTFS extra field is written.
    pub fn timestamps(mut self, modified: i64, accessed: i64, creation: i64) -> Self {
        self.modified_date = modified;
        self.accessed_date = accessed;
        self.creation_date = creation;
        self
    }

    /// Use WinZip AES when the entry is written with a password.
    pub fn aes(mut self, mode: AesMode, version: AesVendorVersion) -> Self {
        self.aes_mode = mode;
        self.aes_version = Some(version);
        self
    }

    /// Use the legacy PKWARE encryption when the entry is written with a password.
    pub fn legacy_encryption(mut self) -> Self {
        self.aes_version = None;
        self
    }

    pub fn zip64(mut self, mode: Zip64Mode) -> Self {
        self.zip64 = mode;
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.file_comment = comment.into();
        self
    }

    /// Mark the entry as a symbolic link pointing at `target`.
    pub fn symlink<S: Into<String>>(mut self, target: S) -> Self {
        self.linkname = target.into();
        self.version_made_by = (System::Unix as u16) << 8 | (self.version_made_by & 0xff);
        self.external_fa = (ffi::S_IFLNK | 0o777) << 16;
        self
    }

    /// Declare the expected uncompressed size; it decides ZIP64 promotion of the local header.
    pub fn size_hint(mut self, uncompressed_size: u64) -> Self {
        self.uncompressed_size = uncompressed_size;
        self
    }

    /// Host system that wrote the attributes.
    pub fn system(&self) -> System {
        System::from_version_made_by(self.version_made_by)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flag & flags::ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flag & flags::DATA_DESCRIPTOR != 0
    }

    pub fn is_masked(&self) -> bool {
        self.flag & flags::MASK_LOCAL_INFO != 0
    }

    /// Whether the entry is a directory, from its attributes or a trailing separator.
    pub fn is_dir(&self) -> bool {
        system::attrib_is_dir(self.external_fa, self.version_made_by)
            || self.file_name.ends_with('/')
            || self.file_name.ends_with('\\')
    }

    /// Whether the entry is a symbolic link with a recorded target.
    pub fn is_symlink(&self) -> bool {
        !self.linkname.is_empty()
            && system::attrib_is_symlink(self.external_fa, self.version_made_by)
    }

    /// Get unix mode for the file
    pub fn unix_mode(&self) -> Option<u32> {
        if self.external_fa == 0 {
            return None;
        }
        system::attrib_convert(self.system(), self.external_fa, System::Unix)
    }

    /// Whether the CRC must match on read. AE-2 entries rely on the authentication code.
    pub fn crc_is_verified(&self) -> bool {
        !(self.is_encrypted() && self.aes_version == Some(AesVendorVersion::Ae2))
    }

    /// Verification word of the legacy encryption header.
    ///
    /// With a data descriptor the CRC is not known up front, so the DOS time is used.
    pub fn legacy_verifier(&self) -> u16 {
        legacy_verifier(
            self.has_data_descriptor(),
            unix_to_dos_date(self.modified_date),
            self.crc32,
        )
    }
}

/// Verification word from the raw header values. Readers must use the DOS
/// time stored in the header, since extra fields may carry a different one.
pub(crate) fn legacy_verifier(data_descriptor: bool, dos_date: u32, crc32: u32) -> u16 {
    if data_descriptor {
        (((dos_date >> 16) & 0xff) << 8 | ((dos_date >> 8) & 0xff)) as u16
    } else {
        (((crc32 >> 16) & 0xff) << 8 | ((crc32 >> 24) & 0xff)) as u16
    }
}
