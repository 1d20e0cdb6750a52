//! Reading entry payloads.
//!
//! Bytes flow from the stream through the decryption layer, in place, and
//! then through the codec of the entry into the caller's buffer.

use std::fmt;
use std::io::{self, prelude::*, SeekFrom};
use std::mem;

use crc32fast::Hasher;
use tracing::{debug, trace, warn};

use crate::aes::{self, AesStream, AUTH_CODE_LENGTH, PWD_VERIFY_LENGTH};
use crate::archive::{EntryState, ZipArchive};
use crate::codec::{self, Decoder, EntryCodec, StoreCodec};
use crate::compression::CompressionMethod;
use crate::extra_fields;
use crate::result::{ZipError, ZipResult};
use crate::spec::{self, DataDescriptor};
use crate::stream;
use crate::types::{flags, EntryTotals, ZipFileData};
use crate::zipcrypto::{self, ZipCryptoStream};

/// Compressed bytes read from the stream at a time.
const READ_BUFFER_SIZE: usize = 64 * 1024;

enum Decryptor {
    Aes(AesStream),
    ZipCrypto(ZipCryptoStream),
}

impl Decryptor {
    fn decrypt(&mut self, buf: &mut [u8]) -> ZipResult<()> {
        match self {
            Decryptor::Aes(stream) => stream.decrypt(buf),
            Decryptor::ZipCrypto(stream) => {
                stream.decrypt_in_place(buf);
                Ok(())
            }
        }
    }
}

/// State of an entry open for reading.
pub(crate) struct ReadState {
    /// The local header as found on the stream.
    pub(crate) local: ZipFileData,
    raw: bool,
    decoder: Box<dyn Decoder>,
    crypt: Option<Decryptor>,
    /// First byte after the local header.
    data_start: u64,
    /// Next compressed byte to read.
    pos: u64,
    /// Compressed bytes not yet read.
    remaining: u64,
    /// Where the AES authentication code is stored.
    footer_pos: u64,
    buffer: Box<[u8]>,
    buffer_pos: usize,
    buffer_len: usize,
    hasher: Hasher,
    total_in: u64,
    total_out: u64,
    /// Output limit for codecs that end on a marker rather than a size.
    max_out: Option<u64>,
    /// Set once a read reported the end of the entry.
    at_end: bool,
}

impl fmt::Debug for ReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadState")
            .field("file_name", &self.local.file_name)
            .field("raw", &self.raw)
            .field("remaining", &self.remaining)
            .field("total_in", &self.total_in)
            .field("total_out", &self.total_out)
            .finish()
    }
}

impl ReadState {
    fn fill<R: Read + Seek>(&mut self, reader: &mut R) -> ZipResult<()> {
        let want = (self.buffer.len() as u64).min(self.remaining) as usize;
        reader.seek(SeekFrom::Start(self.pos))?;
        let read = stream::read_full(reader, &mut self.buffer[..want])?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "entry data is truncated").into());
        }
        if let Some(crypt) = self.crypt.as_mut() {
            crypt.decrypt(&mut self.buffer[..read])?;
        }
        self.pos += read as u64;
        self.remaining -= read as u64;
        self.total_in += read as u64;
        self.buffer_pos = 0;
        self.buffer_len = read;
        Ok(())
    }

    /// Reads the compressed bytes left after the decoder stopped, so the
    /// authentication code covers the whole payload.
    fn skip_rest<R: Read + Seek>(&mut self, reader: &mut R) -> ZipResult<()> {
        while self.remaining > 0 {
            self.fill(reader)?;
        }
        self.buffer_pos = self.buffer_len;
        Ok(())
    }

    /// Whether every byte the header declares has been delivered.
    fn delivered_all(&self) -> bool {
        self.max_out.map_or(false, |max_out| self.total_out >= max_out)
    }

    fn read<R: Read + Seek>(&mut self, reader: &mut R, buf: &mut [u8]) -> ZipResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut out_len = buf.len();
        if let Some(max_out) = self.max_out {
            let left = max_out.saturating_sub(self.total_out);
            if left == 0 {
                self.at_end = true;
                return Ok(0);
            }
            out_len = out_len.min(usize::try_from(left).unwrap_or(usize::MAX));
        }

        loop {
            if self.buffer_pos == self.buffer_len && self.remaining > 0 {
                self.fill(reader)?;
            }
            let input = &self.buffer[self.buffer_pos..self.buffer_len];
            if input.is_empty() && self.total_in == 0 {
                // nothing is stored
                self.at_end = true;
                return Ok(0);
            }
            let progress = self.decoder.decode(input, &mut buf[..out_len])?;
            let exhausted = input.is_empty();
            self.buffer_pos += progress.consumed;
            if progress.produced > 0 {
                self.hasher.update(&buf[..progress.produced]);
                self.total_out += progress.produced as u64;
                return Ok(progress.produced);
            }
            if exhausted || self.decoder.is_finished() {
                self.at_end = true;
                return Ok(0);
            }
            if progress.consumed == 0 {
                return Err(ZipError::InvalidArchive("compressed data makes no progress"));
            }
        }
    }
}

impl<S: Read + Seek> ZipArchive<S> {
    /// Reads the local header of `info`, dropping the offset shift when the
    /// header is only found without it.
    fn read_local_header_of(&mut self, info: &ZipFileData) -> ZipResult<ZipFileData> {
        let shifted = info
            .disk_offset
            .checked_add(self.disk_offset_shift)
            .ok_or(ZipError::InvalidArchive("local header offset overflows"))?;
        self.stream.seek(SeekFrom::Start(shifted))?;
        match spec::read_local_header(&mut self.stream) {
            Ok(local) => Ok(local),
            Err(e) if self.disk_offset_shift > 0 => {
                self.stream.seek(SeekFrom::Start(info.disk_offset))?;
                let local = spec::read_local_header(&mut self.stream).map_err(|_| e)?;
                warn!(
                    shift = self.disk_offset_shift,
                    "local header found at its recorded offset, dropping the offset shift"
                );
                self.disk_offset_shift = 0;
                Ok(local)
            }
            Err(e) => Err(e),
        }
    }

    /// Opens the current entry for reading.
    ///
    /// With `raw` the payload is returned as stored, without decompression;
    /// it is still decrypted when a password is given. An encrypted entry
    /// needs a password unless read raw. A wrong password fails here, before
    /// any data is returned.
    ///
    /// An entry already open for reading is abandoned without verification.
    pub fn entry_read_open(&mut self, raw: bool, password: Option<&[u8]>) -> ZipResult<()> {
        self.ensure_open()?;
        match self.entry {
            EntryState::Writing(_) => {
                return Err(ZipError::InvalidState("an entry is being written"));
            }
            EntryState::Reading(_) => {
                debug!("abandoning the entry open for reading");
                self.entry = EntryState::Idle;
            }
            EntryState::Idle => {}
        }
        let info = match &self.current {
            Some(current) => current.info.clone(),
            None => return Err(ZipError::InvalidState("no entry selected")),
        };

        let encrypted = info.is_encrypted();
        if encrypted && !raw && password.is_none() {
            return Err(ZipError::UnsupportedArchive(ZipError::PASSWORD_REQUIRED));
        }
        let decoder = if raw {
            StoreCodec.decoder(&info)?
        } else {
            codec::codec_for(info.compression_method)
                .ok_or(ZipError::UnsupportedArchive(
                    "Compression method not supported",
                ))?
                .decoder(&info)?
        };

        let local = self.read_local_header_of(&info)?;
        let data_start = self.stream.stream_position()?;
        let mut remaining = info.compressed_size;
        let mut footer_pos = 0;
        let crypt = match password {
            Some(password) if encrypted => {
                if info.aes_version.is_some() {
                    let mut aes = AesStream::new(info.aes_mode, password)?;
                    let mut salt = vec![0; info.aes_mode.salt_length()];
                    self.stream.read_exact(&mut salt)?;
                    let mut verifier = [0; PWD_VERIFY_LENGTH];
                    self.stream.read_exact(&mut verifier)?;
                    aes.start_decrypt(&salt, verifier)?;
                    remaining = remaining
                        .checked_sub(aes::overhead(info.aes_mode))
                        .ok_or(ZipError::InvalidArchive("encrypted entry is too short"))?;
                    footer_pos = data_start + info.compressed_size - AUTH_CODE_LENGTH as u64;
                    Some(Decryptor::Aes(aes))
                } else {
                    let mut header = [0; zipcrypto::HEADER_LENGTH];
                    self.stream.read_exact(&mut header)?;
                    let crypt = ZipCryptoStream::decrypt(password, header, info.pk_verify)?;
                    remaining = remaining
                        .checked_sub(zipcrypto::HEADER_LENGTH as u64)
                        .ok_or(ZipError::InvalidArchive("encrypted entry is too short"))?;
                    Some(Decryptor::ZipCrypto(crypt))
                }
            }
            _ => None,
        };
        let pos = self.stream.stream_position()?;

        let end_marker = match info.compression_method {
            CompressionMethod::Lzma => info.flag & flags::LZMA_EOS_MARKER != 0,
            CompressionMethod::Zstd => true,
            _ => false,
        };
        let max_out = if !raw && end_marker {
            Some(info.uncompressed_size)
        } else {
            None
        };

        debug!(
            name = %info.file_name,
            method = %info.compression_method,
            raw,
            encrypted,
            compressed = remaining,
            "opened entry for reading"
        );
        self.entry = EntryState::Reading(Box::new(ReadState {
            local,
            raw,
            decoder,
            crypt,
            data_start,
            pos,
            remaining,
            footer_pos,
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            buffer_pos: 0,
            buffer_len: 0,
            hasher: Hasher::new(),
            total_in: 0,
            total_out: 0,
            max_out,
            at_end: false,
        }));
        Ok(())
    }

    /// Reads decompressed bytes of the open entry; `0` marks its end.
    pub fn entry_read(&mut self, buf: &mut [u8]) -> ZipResult<usize> {
        match &mut self.entry {
            EntryState::Reading(state) => state.read(&mut self.stream, buf),
            _ => Err(ZipError::InvalidState("no entry is open for reading")),
        }
    }

    /// Closes the entry open for reading and returns its CRC and sizes.
    ///
    /// Values from a data descriptor take precedence over the central
    /// record. When the entry was read to its end, the authentication code
    /// of an AES entry and the CRC of the delivered bytes are verified; AE-2
    /// entries rely on the authentication code alone.
    pub fn entry_read_close(&mut self) -> ZipResult<EntryTotals> {
        let mut state = match mem::take(&mut self.entry) {
            EntryState::Reading(state) => state,
            other => {
                self.entry = other;
                return Err(ZipError::InvalidState("no entry is open for reading"));
            }
        };
        let info = match &self.current {
            Some(current) => &current.info,
            None => return Err(ZipError::InvalidState("no entry selected")),
        };
        let mut totals = EntryTotals {
            crc32: info.crc32,
            compressed_size: info.compressed_size,
            uncompressed_size: info.uncompressed_size,
        };

        if state.at_end && state.remaining > 0 && state.delivered_all() {
            state.skip_rest(&mut self.stream)?;
        }
        let at_end = state.at_end && state.remaining == 0;
        if let (Some(Decryptor::Aes(aes)), true) = (state.crypt.as_mut(), at_end) {
            let mut stored = [0; AUTH_CODE_LENGTH];
            self.stream.seek(SeekFrom::Start(state.footer_pos))?;
            self.stream.read_exact(&mut stored)?;
            if let Err(e) = aes.verify(&stored) {
                warn!(name = %info.file_name, "authentication code mismatch");
                return Err(e);
            }
        }

        if info.has_data_descriptor() && !info.is_masked() {
            let zip64 = extra_fields::has_zip64(&state.local.extra_field);
            self.stream
                .seek(SeekFrom::Start(state.data_start + info.compressed_size))?;
            let descriptor = DataDescriptor::load(&mut self.stream, zip64)?;
            trace!(?descriptor, "read data descriptor");
            totals = EntryTotals {
                crc32: descriptor.crc32,
                compressed_size: descriptor.compressed_size,
                uncompressed_size: descriptor.uncompressed_size,
            };
        }

        if at_end && state.total_in > 0 && !state.raw && info.crc_is_verified() {
            let actual = mem::take(&mut state.hasher).finalize();
            if actual != totals.crc32 {
                warn!(
                    name = %info.file_name,
                    expected = totals.crc32,
                    actual,
                    "checksum mismatch"
                );
                return Err(ZipError::ChecksumMismatch {
                    expected: totals.crc32,
                    actual,
                });
            }
        }
        debug!(name = %info.file_name, out = state.total_out, "closed entry");
        Ok(totals)
    }
}

impl<S: Read + Seek> Read for ZipArchive<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.entry_read(buf).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::OpenMode;
    use std::io::Cursor;

    fn single_entry(info: ZipFileData, data: &[u8], password: Option<&[u8]>) -> Vec<u8> {
        let mut archive = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
        archive.entry_write_open(&info, None, false, password).unwrap();
        archive.write_all(data).unwrap();
        archive.finish().unwrap().into_inner()
    }

    fn open_first(data: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        assert!(archive.goto_first_entry().unwrap());
        archive
    }

    #[test]
    fn stored_entry_reads_back() {
        let info = ZipFileData::new("a.txt").compression_method(CompressionMethod::Stored);
        let mut archive = open_first(single_entry(info, b"hello, stored world", None));
        archive.entry_read_open(false, None).unwrap();
        let mut contents = String::new();
        archive.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello, stored world");
        let totals = archive.entry_read_close().unwrap();
        assert_eq!(totals.uncompressed_size, 19);
        assert_eq!(totals.crc32, crc32fast::hash(b"hello, stored world"));
    }

    #[test]
    fn small_reads_cross_buffers() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut archive = open_first(single_entry(ZipFileData::new("big"), &data, None));
        archive.entry_read_open(false, None).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 333];
        loop {
            let n = archive.entry_read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        archive.entry_read_close().unwrap();
    }

    #[test]
    fn raw_read_returns_stored_bytes() {
        let mut archive = open_first(single_entry(ZipFileData::new("z"), &[b'z'; 4096], None));
        let compressed = archive.entry_info().unwrap().compressed_size;
        archive.entry_read_open(true, None).unwrap();
        let mut raw = Vec::new();
        archive.read_to_end(&mut raw).unwrap();
        assert_eq!(raw.len() as u64, compressed);
        assert!(raw.len() < 4096);
        archive.entry_read_close().unwrap();
    }

    #[test]
    fn password_is_required() {
        let data = single_entry(ZipFileData::new("locked"), b"secret", Some(b"pw"));
        let mut archive = open_first(data);
        match archive.entry_read_open(false, None) {
            Err(ZipError::UnsupportedArchive(msg)) => assert_eq!(msg, ZipError::PASSWORD_REQUIRED),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(!archive.entry_is_open());
        // the encrypted bytes are still reachable raw
        archive.entry_read_open(true, None).unwrap();
        let mut raw = Vec::new();
        archive.read_to_end(&mut raw).unwrap();
        assert_eq!(raw.len() as u64, archive.entry_info().unwrap().compressed_size);
    }

    #[test]
    fn reading_requires_an_open_entry() {
        let mut archive = open_first(single_entry(ZipFileData::new("x"), b"x", None));
        assert!(matches!(
            archive.entry_read(&mut [0; 4]),
            Err(ZipError::InvalidState(_))
        ));
        assert!(matches!(
            archive.entry_read_close(),
            Err(ZipError::InvalidState(_))
        ));
        let mut archive = ZipArchive::new(Cursor::new(single_entry(ZipFileData::new("x"), b"x", None))).unwrap();
        assert!(matches!(
            archive.entry_read_open(false, None),
            Err(ZipError::InvalidState(_))
        ));
    }

    #[test]
    fn reopening_abandons_the_previous_read() {
        let mut archive = open_first(single_entry(ZipFileData::new("x"), &[1; 1000], None));
        archive.entry_read_open(false, None).unwrap();
        let mut buf = [0u8; 10];
        archive.entry_read(&mut buf).unwrap();
        archive.entry_read_open(false, None).unwrap();
        let mut out = Vec::new();
        archive.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![1; 1000]);
        archive.entry_read_close().unwrap();
    }

    #[test]
    fn data_descriptor_values_are_returned() {
        let mut archive = open_first(single_entry(ZipFileData::new("dd"), b"described", None));
        let info = archive.entry_info().unwrap().clone();
        assert!(info.has_data_descriptor());
        archive.entry_read_open(false, None).unwrap();
        let local = archive.entry_local_info().unwrap();
        // sizes are only known after the payload
        assert_eq!(local.crc32, 0);
        let mut out = Vec::new();
        archive.read_to_end(&mut out).unwrap();
        let totals = archive.entry_read_close().unwrap();
        assert_eq!(totals.crc32, info.crc32);
        assert_eq!(totals.compressed_size, info.compressed_size);
        assert_eq!(totals.uncompressed_size, 9);
    }

    /// A zstd frame followed by a skippable frame too large for one buffer fill.
    #[cfg(feature = "zstd")]
    fn zstd_with_trailer(data: &[u8], crc32: u32) -> Vec<u8> {
        let mut payload = zstd::encode_all(data, 3).unwrap();
        let trailer = 100 * 1024;
        payload.extend_from_slice(&[0x50, 0x2a, 0x4d, 0x18]);
        payload.extend_from_slice(&(trailer as u32).to_le_bytes());
        payload.extend(std::iter::repeat(0).take(trailer));

        let info = ZipFileData::new("framed").compression_method(CompressionMethod::Zstd);
        let mut archive = ZipArchive::open(Cursor::new(Vec::new()), OpenMode::Write).unwrap();
        archive.entry_write_open(&info, None, true, None).unwrap();
        archive.write_all(&payload).unwrap();
        archive
            .entry_write_close(crc32, None, Some(data.len() as u64))
            .unwrap();
        archive.finish().unwrap().into_inner()
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn bytes_after_the_declared_size_are_still_verified() {
        let data = vec![7u8; 5000];
        let mut archive = open_first(zstd_with_trailer(&data, crc32fast::hash(&data)));
        archive.entry_read_open(false, None).unwrap();
        let mut out = Vec::new();
        archive.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        let totals = archive.entry_read_close().unwrap();
        assert_eq!(totals.crc32, crc32fast::hash(&data));

        let mut archive = open_first(zstd_with_trailer(&data, 0xdead_beef));
        archive.entry_read_open(false, None).unwrap();
        archive.read_to_end(&mut Vec::new()).unwrap();
        assert!(matches!(
            archive.entry_read_close(),
            Err(ZipError::ChecksumMismatch { .. })
        ));
    }
}
