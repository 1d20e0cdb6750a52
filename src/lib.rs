//! A library for reading and writing ZIP archives.
//!
//! A [`ZipArchive`] is a session over one seekable stream. Entries are
//! reached through a cursor over the central directory and opened one at a
//! time; an open entry is read with [`std::io::Read`] or written with
//! [`std::io::Write`] directly on the session.
//!
//! ZIP64 sizes and offsets, WinZip AES and the legacy PKWARE encryption are
//! supported. An archive whose central directory is missing or damaged can be
//! rebuilt from its local headers, see [`Config::recover`].
//!
//! ```
//! use std::io::prelude::*;
//! use std::io::Cursor;
//! use zip_engine::{OpenMode, ZipArchive, ZipFileData};
//!
//! let mut zip = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write)?;
//! zip.entry_write_open(&ZipFileData::new("hello.txt"), None, false, None)?;
//! zip.write_all(b"Hello, World!")?;
//! let stream = zip.finish()?;
//!
//! let mut zip = ZipArchive::new(stream)?;
//! zip.locate_entry("hello.txt", false)?;
//! zip.entry_read_open(false, None)?;
//! let mut contents = String::new();
//! zip.read_to_string(&mut contents)?;
//! zip.entry_read_close()?;
//! assert_eq!(contents, "Hello, World!");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_debug_implementations)]

pub use crate::archive::{Config, OpenMode, ZipArchive};
pub use crate::compression::CompressionMethod;
pub use crate::result::{ZipError, ZipResult};
pub use crate::system::System;
pub use crate::types::{
    AesMode, AesVendorVersion, DateTime, EntryTotals, Zip64Mode, ZipFileData,
};

pub mod aes;
mod aes_ctr;
mod archive;
pub mod central_directory;
pub mod codec;
mod compression;
pub mod extra_fields;
mod read;
mod recover;
pub mod result;
pub mod spec;
pub mod stream;
pub mod system;
pub mod types;
mod write;
pub mod zipcrypto;
