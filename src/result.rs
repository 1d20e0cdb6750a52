//! Error types that can be emitted from this library

use displaydoc::Display;
use thiserror::Error;

use std::io;

/// Generic result type with ZipError as its error variant
pub type ZipResult<T> = Result<T, ZipError>;

/// Error type for Zip
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ZipError {
    /// i/o error: {0}
    Io(#[from] io::Error),

    /// invalid Zip archive: {0}
    InvalidArchive(&'static str),

    /// unsupported Zip archive: {0}
    UnsupportedArchive(&'static str),

    /// specified file not found in archive
    FileNotFound,

    /// the password provided is incorrect
    InvalidPassword,

    /// checksum mismatch: expected {expected}, computed {actual}
    ChecksumMismatch {
        /// CRC-32 recorded in the archive.
        expected: u32,
        /// CRC-32 of the bytes actually delivered.
        actual: u32,
    },

    /// authentication code of the encrypted entry does not match
    AuthenticationFailed,

    /// ZIP64 extensions are required but disabled: {0}
    Zip64Required(&'static str),

    /// capacity exceeded: {0}
    CapacityExceeded(&'static str),

    /// invalid session state: {0}
    InvalidState(&'static str),
}

impl ZipError {
    /// The text used as an error when a password is required and not supplied
    ///
    /// ```rust,no_run
    /// # use zip_engine::result::ZipError;
    /// # let mut archive = zip_engine::ZipArchive::new(std::io::Cursor::new(&[])).unwrap();
    /// match archive.entry_read_open(false, None) {
    ///     Err(ZipError::UnsupportedArchive(ZipError::PASSWORD_REQUIRED)) => eprintln!("a password is needed to unzip this file"),
    ///     _ => (),
    /// }
    /// # ()
    /// ```
    pub const PASSWORD_REQUIRED: &'static str = "Password required to decrypt file";

    /// Whether the error reports bad content or a bad password rather than a
    /// malformed archive.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ZipError::InvalidPassword
                | ZipError::ChecksumMismatch { .. }
                | ZipError::AuthenticationFailed
        )
    }
}

/// Error type for time parsing
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
/// date or time is out of the range a ZIP archive can record
pub struct DateTimeRangeError;

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> io::Error {
        match err {
            ZipError::Io(err) => err,
            ZipError::ChecksumMismatch { .. } | ZipError::AuthenticationFailed => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            ZipError::FileNotFound => io::Error::new(io::ErrorKind::NotFound, err),
            _ => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}
