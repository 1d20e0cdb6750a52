//! Possible ZIP compression methods.

use std::fmt;

use crate::codec;

/// Identifies the storage format used to compress a file within a ZIP archive.
///
/// Each file's compression method is stored alongside it, allowing the
/// contents to be read without context. Whether a method can actually be
/// encoded or decoded depends on the codec backends compiled in, see
/// [`CompressionMethod::is_supported`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompressionMethod {
    /// Store the file as is
    Stored,
    /// Compress the file using Deflate
    Deflated,
    /// Compress the file using BZIP2
    Bzip2,
    /// Compress the file using LZMA
    Lzma,
    /// Compress the file using Zstandard
    Zstd,
    /// Compress the file using XZ
    Xz,
    /// Marker written in the header of WinZip AES entries; the real method
    /// lives in the AES extra field
    Aes,
    /// Unsupported compression method
    Unsupported(u16),
}

impl CompressionMethod {
    /// Converts an u16 to its corresponding CompressionMethod
    pub fn from_u16(val: u16) -> CompressionMethod {
        match val {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            93 => CompressionMethod::Zstd,
            95 => CompressionMethod::Xz,
            99 => CompressionMethod::Aes,
            v => CompressionMethod::Unsupported(v),
        }
    }

    /// Converts a CompressionMethod to a u16
    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Xz => 95,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unsupported(v) => v,
        }
    }

    /// Whether a codec for this method is compiled in.
    pub fn is_supported(self) -> bool {
        codec::codec_for(self).is_some()
    }
}

impl Default for CompressionMethod {
    /// Deflate when available, store otherwise.
    fn default() -> Self {
        if CompressionMethod::Deflated.is_supported() {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Just duplicate what the Debug format looks like, i.e, the enum key:
        write!(f, "{:?}", self)
    }
}
