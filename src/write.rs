//! Writing entries into an archive.
//!
//! A local header goes out as soon as an entry is opened. Payload bytes are
//! compressed, then encrypted, then written. On close, the CRC and sizes are
//! either appended in a data descriptor or patched into the local header,
//! and the central record is added to the in-memory directory.

use std::fmt;
use std::io::{self, prelude::*, SeekFrom};
use std::mem;

use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use tracing::{debug, trace};

use crate::aes::{self, AesStream};
use crate::archive::{CurrentEntry, EntryState, ZipArchive};
use crate::codec::{self, Encoder, EntryCodec, StoreCodec};
use crate::compression::CompressionMethod;
use crate::result::{ZipError, ZipResult};
use crate::spec::{self, DataDescriptor, HeaderLayout};
use crate::types::{flags, AesVendorVersion, ZipFileData};
use crate::zipcrypto::ZipCryptoStream;

enum Encryptor {
    Aes(AesStream),
    ZipCrypto(ZipCryptoStream),
}

impl Encryptor {
    fn encrypt(&mut self, buf: &mut [u8]) -> ZipResult<()> {
        match self {
            Encryptor::Aes(stream) => stream.encrypt(buf),
            Encryptor::ZipCrypto(stream) => {
                stream.encrypt_in_place(buf);
                Ok(())
            }
        }
    }
}

/// State of an entry open for writing.
pub(crate) struct WriteState {
    /// What ends up in the central record.
    pub(crate) file: ZipFileData,
    /// The local header as written.
    pub(crate) local: ZipFileData,
    raw: bool,
    encoder: Box<dyn Encoder>,
    crypt: Option<Encryptor>,
    layout: HeaderLayout,
    header_pos: u64,
    hasher: Hasher,
    total_in: u64,
    total_out: u64,
    scratch: Vec<u8>,
}

impl fmt::Debug for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteState")
            .field("file_name", &self.file.file_name)
            .field("raw", &self.raw)
            .field("layout", &self.layout)
            .field("header_pos", &self.header_pos)
            .field("total_in", &self.total_in)
            .field("total_out", &self.total_out)
            .finish()
    }
}

/// Flag bits recording the compression level, as other tools expect them.
fn level_flags(method: CompressionMethod, level: Option<i32>) -> u16 {
    match (method, level) {
        (CompressionMethod::Deflated, Some(8 | 9)) => flags::DEFLATE_MAX,
        (CompressionMethod::Deflated, Some(2)) => flags::DEFLATE_FAST,
        (CompressionMethod::Deflated, Some(1)) => flags::DEFLATE_SUPER_FAST,
        (CompressionMethod::Lzma | CompressionMethod::Xz, _) => flags::LZMA_EOS_MARKER,
        _ => 0,
    }
}

impl<S: Read + Write + Seek> ZipArchive<S> {
    /// Starts a new entry described by `info` and writes its local header.
    ///
    /// `level` is the compression level; `Some(0)` stores the entry. With
    /// `raw` the payload is written as given, already compressed, and the
    /// CRC and uncompressed size must be supplied to
    /// [`Self::entry_write_close`]. A `password` encrypts the entry with AES
    /// or, when [`ZipFileData::legacy_encryption`] was chosen, with the
    /// legacy algorithm.
    ///
    /// An entry still being written is closed first.
    pub fn entry_write_open(
        &mut self,
        info: &ZipFileData,
        level: Option<i32>,
        raw: bool,
        password: Option<&[u8]>,
    ) -> ZipResult<()> {
        self.ensure_open()?;
        if !self.mode.writes() {
            return Err(ZipError::InvalidState("archive is not open for writing"));
        }
        match self.entry {
            EntryState::Writing(_) => self.entry_write_close(0, None, None)?,
            EntryState::Reading(_) => self.entry = EntryState::Idle,
            EntryState::Idle => {}
        }
        if info.file_name.is_empty() {
            return Err(ZipError::InvalidState("entry name is empty"));
        }
        if password.map_or(false, |pw| pw.len() > aes::MAX_PASSWORD_LENGTH) {
            return Err(ZipError::CapacityExceeded("password is too long"));
        }

        let mut file = info.clone();
        if level == Some(0) || file.is_dir() {
            file.compression_method = CompressionMethod::Stored;
        }
        let codec: &dyn EntryCodec = if raw || file.compression_method == CompressionMethod::Stored {
            &StoreCodec
        } else {
            codec::codec_for(file.compression_method).ok_or(ZipError::UnsupportedArchive(
                "Compression method not supported",
            ))?
        };
        let encoder = codec.encoder(level.filter(|level| *level > 0))?;

        if !raw {
            file.flag &= !flags::ENCRYPTED;
        }
        file.flag |= level_flags(file.compression_method, level);
        if !file.is_dir() {
            if self.data_descriptor {
                file.flag |= flags::DATA_DESCRIPTOR;
            }
            if password.is_some() {
                file.flag |= flags::ENCRYPTED;
            }
        }
        let encrypted = password.is_some() && file.is_encrypted();
        if encrypted && file.aes_version.is_none() && file.crc32 == 0 && !raw {
            // the legacy header needs a verifier before the CRC is known
            file.flag |= flags::DATA_DESCRIPTOR;
        }
        file.disk_number = self.disk_number_with_cd;
        file.disk_offset = self
            .write_pos
            .checked_sub(self.disk_offset_shift)
            .ok_or(ZipError::InvalidState("write position precedes the archive"))?;
        file.pk_verify = file.legacy_verifier();
        if !raw {
            file.crc32 = 0;
        }
        file.compressed_size = 0;

        let mut header = Vec::new();
        let layout = spec::write_header(&mut header, true, &file)?;
        let header_pos = self.write_pos;
        self.stream.seek(SeekFrom::Start(header_pos))?;
        self.stream.write_all(&header)?;
        self.write_pos += header.len() as u64;
        let local = spec::read_local_header(&mut io::Cursor::new(&header))?;

        let crypt = match password {
            Some(password) if encrypted && !raw => Some(self.start_encryption(&file, password)?),
            _ => None,
        };

        debug!(
            name = %file.file_name,
            method = %file.compression_method,
            raw,
            encrypted,
            zip64 = layout.zip64,
            offset = file.disk_offset,
            "opened entry for writing"
        );
        self.entry = EntryState::Writing(Box::new(WriteState {
            file,
            local,
            raw,
            encoder,
            crypt,
            layout,
            header_pos,
            hasher: Hasher::new(),
            total_in: 0,
            total_out: 0,
            scratch: Vec::new(),
        }));
        Ok(())
    }

    /// Writes the encryption header and returns the keyed stream.
    fn start_encryption(&mut self, file: &ZipFileData, password: &[u8]) -> ZipResult<Encryptor> {
        if file.aes_version.is_some() {
            let mut stream = AesStream::new(file.aes_mode, password)?;
            let header = stream.start_encrypt()?;
            self.stream.write_all(&header)?;
            self.write_pos += header.len() as u64;
            Ok(Encryptor::Aes(stream))
        } else {
            let (stream, header) = ZipCryptoStream::encrypt(password, file.pk_verify)?;
            self.stream.write_all(&header)?;
            self.write_pos += header.len() as u64;
            Ok(Encryptor::ZipCrypto(stream))
        }
    }

    /// Adds bytes to the entry open for writing.
    pub fn entry_write(&mut self, buf: &[u8]) -> ZipResult<usize> {
        let state = match &mut self.entry {
            EntryState::Writing(state) => state,
            _ => return Err(ZipError::InvalidState("no entry is open for writing")),
        };
        state.hasher.update(buf);
        state.total_in += buf.len() as u64;
        state.scratch.clear();
        state.encoder.encode(buf, &mut state.scratch)?;
        if let Some(crypt) = state.crypt.as_mut() {
            crypt.encrypt(&mut state.scratch)?;
        }
        self.stream.write_all(&state.scratch)?;
        state.total_out += state.scratch.len() as u64;
        self.write_pos += state.scratch.len() as u64;
        Ok(buf.len())
    }

    /// Finishes the entry open for writing and records it in the central
    /// directory.
    ///
    /// `crc32` and the sizes are only used for raw entries; otherwise they
    /// come from the bytes written. Sizes left `None` default to what went
    /// through the entry.
    pub fn entry_write_close(
        &mut self,
        crc32: u32,
        compressed_size: Option<u64>,
        uncompressed_size: Option<u64>,
    ) -> ZipResult<()> {
        let mut state = match mem::take(&mut self.entry) {
            EntryState::Writing(state) => *state,
            other => {
                self.entry = other;
                return Err(ZipError::InvalidState("no entry is open for writing"));
            }
        };

        let mut tail = Vec::new();
        state.encoder.finish(&mut tail)?;
        match state.crypt.as_mut() {
            Some(Encryptor::Aes(stream)) => {
                stream.encrypt(&mut tail)?;
                tail.extend_from_slice(&stream.finish()?);
            }
            Some(crypt) => crypt.encrypt(&mut tail)?,
            None => {}
        }
        self.stream.write_all(&tail)?;
        self.write_pos += tail.len() as u64;
        let payload_len = self.write_pos - state.header_pos - state.local_header_len();

        let mut file = state.file;
        file.crc32 = if state.raw {
            crc32
        } else {
            mem::take(&mut state.hasher).finalize()
        };
        if file.is_encrypted() && file.aes_version == Some(AesVendorVersion::Ae2) {
            file.crc32 = 0;
        }
        file.compressed_size = compressed_size.unwrap_or(payload_len);
        file.uncompressed_size = uncompressed_size.unwrap_or(state.total_in);
        if !state.layout.zip64
            && (file.compressed_size >= u32::MAX as u64 || file.uncompressed_size >= u32::MAX as u64)
        {
            return Err(ZipError::Zip64Required(
                "entry outgrew a local header without ZIP64 fields",
            ));
        }

        let mut record = Vec::new();
        spec::write_header(&mut record, false, &file)?;

        if file.has_data_descriptor() {
            let masked = file.is_masked();
            let descriptor = DataDescriptor {
                crc32: if masked { 0 } else { file.crc32 },
                compressed_size: file.compressed_size,
                uncompressed_size: if masked { 0 } else { file.uncompressed_size },
            };
            trace!(?descriptor, zip64 = state.layout.zip64, "writing data descriptor");
            let mut bytes = Vec::new();
            descriptor.write(&mut bytes, state.layout.zip64)?;
            self.stream.write_all(&bytes)?;
            self.write_pos += bytes.len() as u64;
        } else if !file.is_masked() {
            self.patch_local_header(&state.layout, state.header_pos, &file)?;
        }

        let offset = self.cd.len();
        let len = record.len();
        self.cd.extend_from_slice(&record);
        self.number_entry += 1;
        let info = match spec::read_central_header(&mut io::Cursor::new(&record))? {
            Some(info) => info,
            None => return Err(ZipError::InvalidState("central record did not round trip")),
        };
        debug!(
            name = %info.file_name,
            crc32 = info.crc32,
            compressed = info.compressed_size,
            uncompressed = info.uncompressed_size,
            "closed entry"
        );
        self.current = Some(CurrentEntry {
            index: self.number_entry - 1,
            offset,
            len,
            info,
        });
        Ok(())
    }

    /// Overwrites the CRC and sizes of a local header already on the stream.
    fn patch_local_header(
        &mut self,
        layout: &HeaderLayout,
        header_pos: u64,
        file: &ZipFileData,
    ) -> ZipResult<()> {
        let mut fixed = Vec::with_capacity(12);
        fixed.write_u32::<LittleEndian>(file.crc32)?;
        if layout.zip64 {
            fixed.write_u32::<LittleEndian>(u32::MAX)?;
            fixed.write_u32::<LittleEndian>(u32::MAX)?;
        } else {
            fixed.write_u32::<LittleEndian>(file.compressed_size as u32)?;
            fixed.write_u32::<LittleEndian>(file.uncompressed_size as u32)?;
        }
        self.stream
            .seek(SeekFrom::Start(header_pos + spec::LOCAL_CRC_OFFSET))?;
        self.stream.write_all(&fixed)?;

        if layout.zip64 {
            // the ZIP64 record leads the extra area: tag, size, then the two sizes
            let sizes_pos =
                header_pos + spec::LOCAL_HEADER_SIZE + layout.name_len as u64 + 4;
            self.stream.seek(SeekFrom::Start(sizes_pos))?;
            self.stream.write_u64::<LittleEndian>(file.uncompressed_size)?;
            self.stream.write_u64::<LittleEndian>(file.compressed_size)?;
        }
        self.stream.seek(SeekFrom::Start(self.write_pos))?;
        Ok(())
    }
}

impl WriteState {
    fn local_header_len(&self) -> u64 {
        spec::LOCAL_HEADER_SIZE + self.layout.name_len as u64 + self.layout.extra_len as u64
    }
}

impl<S: Read + Write + Seek> Write for ZipArchive<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.entry_write(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
