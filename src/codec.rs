//! Compression backends behind one strategy trait.
//!
//! Codecs work on byte buffers rather than wrapping a reader or writer: the
//! archive session owns the stream and moves bytes between it, the
//! encryption layer and the codec. The codec for an entry is looked up by
//! its method with [`codec_for`]; which backends exist is decided by cargo
//! features here and nowhere else.

use std::io;

use crate::compression::CompressionMethod;
use crate::result::ZipResult;
use crate::types::ZipFileData;

/// Scratch size used when an encoder needs room to write.
const CHUNK_SIZE: usize = 32 * 1024;

/// Bytes taken from the input and written to the output by one decode call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    pub produced: usize,
}

/// Incremental decompressor.
pub trait Decoder {
    /// Decodes from `input` into `output`. An empty `input` means no more
    /// compressed bytes will follow.
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<Progress>;

    /// Whether the compressed stream carried its own end marker and it was reached.
    fn is_finished(&self) -> bool;
}

/// Incremental compressor appending its output to a buffer.
pub trait Encoder {
    fn encode(&mut self, input: &[u8], output: &mut Vec<u8>) -> io::Result<()>;

    /// Flushes everything still buffered and terminates the compressed stream.
    fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()>;
}

/// A compression method the session can read and possibly write.
pub trait EntryCodec: Sync {
    fn method(&self) -> CompressionMethod;

    fn decoder(&self, file: &ZipFileData) -> ZipResult<Box<dyn Decoder>>;

    /// `level` follows the usual 1..=9 scale; `None` picks the backend default.
    fn encoder(&self, level: Option<i32>) -> ZipResult<Box<dyn Encoder>>;
}

/// Returns the codec for `method`, if one is compiled in.
pub fn codec_for(method: CompressionMethod) -> Option<&'static dyn EntryCodec> {
    match method {
        CompressionMethod::Stored => Some(&StoreCodec),
        #[cfg(feature = "deflate")]
        CompressionMethod::Deflated => Some(&deflate::DeflateCodec),
        #[cfg(feature = "bzip2")]
        CompressionMethod::Bzip2 => Some(&bzip::Bzip2Codec),
        #[cfg(feature = "lzma")]
        CompressionMethod::Lzma => Some(&lzma::LzmaCodec),
        #[cfg(feature = "zstd")]
        CompressionMethod::Zstd => Some(&zstandard::ZstdCodec),
        _ => None,
    }
}

fn corrupt(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what)
}

/// The store method, also used for raw entry access.
#[derive(Debug)]
pub struct StoreCodec;

impl EntryCodec for StoreCodec {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }

    fn decoder(&self, _file: &ZipFileData) -> ZipResult<Box<dyn Decoder>> {
        Ok(Box::new(Passthrough))
    }

    fn encoder(&self, _level: Option<i32>) -> ZipResult<Box<dyn Encoder>> {
        Ok(Box::new(Passthrough))
    }
}

struct Passthrough;

impl Decoder for Passthrough {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<Progress> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok(Progress {
            consumed: n,
            produced: n,
        })
    }

    fn is_finished(&self) -> bool {
        false
    }
}

impl Encoder for Passthrough {
    fn encode(&mut self, input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
        output.extend_from_slice(input);
        Ok(())
    }

    fn finish(&mut self, _output: &mut Vec<u8>) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "deflate")]
mod deflate {
    use std::io;

    use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

    use super::{corrupt, Decoder, Encoder, EntryCodec, Progress, CHUNK_SIZE};
    use crate::compression::CompressionMethod;
    use crate::result::ZipResult;
    use crate::types::ZipFileData;

    pub struct DeflateCodec;

    impl EntryCodec for DeflateCodec {
        fn method(&self) -> CompressionMethod {
            CompressionMethod::Deflated
        }

        fn decoder(&self, _file: &ZipFileData) -> ZipResult<Box<dyn Decoder>> {
            Ok(Box::new(Inflater {
                transformer: Decompress::new(false),
                finished: false,
            }))
        }

        fn encoder(&self, level: Option<i32>) -> ZipResult<Box<dyn Encoder>> {
            let level = match level {
                Some(level) => Compression::new(level.clamp(1, 9) as u32),
                None => Compression::default(),
            };
            Ok(Box::new(Deflater {
                transformer: Compress::new(level, false),
            }))
        }
    }

    struct Inflater {
        transformer: Decompress,
        finished: bool,
    }

    impl Decoder for Inflater {
        fn decode(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<Progress> {
            if self.finished {
                return Ok(Progress::default());
            }
            let before_in = self.transformer.total_in();
            let before_out = self.transformer.total_out();
            let flush = if input.is_empty() {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let status = self
                .transformer
                .decompress(input, output, flush)
                .map_err(|_| corrupt("corrupt deflate stream"))?;
            if status == Status::StreamEnd {
                self.finished = true;
            }
            Ok(Progress {
                consumed: (self.transformer.total_in() - before_in) as usize,
                produced: (self.transformer.total_out() - before_out) as usize,
            })
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    struct Deflater {
        transformer: Compress,
    }

    impl Encoder for Deflater {
        fn encode(&mut self, mut input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
            while !input.is_empty() {
                output.reserve(CHUNK_SIZE);
                let before_in = self.transformer.total_in();
                self.transformer
                    .compress_vec(input, output, FlushCompress::None)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                let consumed = (self.transformer.total_in() - before_in) as usize;
                input = &input[consumed..];
            }
            Ok(())
        }

        fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()> {
            loop {
                output.reserve(CHUNK_SIZE);
                let status = self
                    .transformer
                    .compress_vec(&[], output, FlushCompress::Finish)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                if status == Status::StreamEnd {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(feature = "bzip2")]
mod bzip {
    use std::io;

    use bzip2::{Action, Compress, Compression, Decompress, Status};

    use super::{corrupt, Decoder, Encoder, EntryCodec, Progress, CHUNK_SIZE};
    use crate::compression::CompressionMethod;
    use crate::result::ZipResult;
    use crate::types::ZipFileData;

    /// Work factor recommended by libbzip2.
    const WORK_FACTOR: u32 = 30;

    pub struct Bzip2Codec;

    impl EntryCodec for Bzip2Codec {
        fn method(&self) -> CompressionMethod {
            CompressionMethod::Bzip2
        }

        fn decoder(&self, _file: &ZipFileData) -> ZipResult<Box<dyn Decoder>> {
            Ok(Box::new(BzDecoder {
                inner: Decompress::new(false),
                finished: false,
            }))
        }

        fn encoder(&self, level: Option<i32>) -> ZipResult<Box<dyn Encoder>> {
            let level = match level {
                Some(level) => Compression::new(level.clamp(1, 9) as u32),
                None => Compression::default(),
            };
            Ok(Box::new(BzEncoder {
                inner: Compress::new(level, WORK_FACTOR),
            }))
        }
    }

    struct BzDecoder {
        inner: Decompress,
        finished: bool,
    }

    impl Decoder for BzDecoder {
        fn decode(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<Progress> {
            if self.finished {
                return Ok(Progress::default());
            }
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .decompress(input, output)
                .map_err(|_| corrupt("corrupt bzip2 stream"))?;
            if status == Status::StreamEnd {
                self.finished = true;
            }
            Ok(Progress {
                consumed: (self.inner.total_in() - before_in) as usize,
                produced: (self.inner.total_out() - before_out) as usize,
            })
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    struct BzEncoder {
        inner: Compress,
    }

    impl Encoder for BzEncoder {
        fn encode(&mut self, mut input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
            while !input.is_empty() {
                output.reserve(CHUNK_SIZE);
                let before_in = self.inner.total_in();
                self.inner
                    .compress_vec(input, output, Action::Run)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                let consumed = (self.inner.total_in() - before_in) as usize;
                input = &input[consumed..];
            }
            Ok(())
        }

        fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()> {
            loop {
                output.reserve(CHUNK_SIZE);
                let status = self
                    .inner
                    .compress_vec(&[], output, Action::Finish)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                if status == Status::StreamEnd {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(feature = "lzma")]
mod lzma {
    use std::io::{self, Write};
    use std::mem;

    use lzma_rs::decompress::{Options, Stream, UnpackedSize};

    use super::{corrupt, Decoder, Encoder, EntryCodec, Progress};
    use crate::compression::CompressionMethod;
    use crate::result::{ZipError, ZipResult};
    use crate::types::{flags, ZipFileData};

    /// Version (2 bytes) and properties size (2 bytes) preceding the LZMA properties.
    const ZIP_LZMA_HEADER_SIZE: usize = 4;
    /// Compressed bytes handed to the decoder at a time; feeding stops as
    /// soon as decoded output shows up.
    const FEED_SIZE: usize = 1024;

    pub struct LzmaCodec;

    impl EntryCodec for LzmaCodec {
        fn method(&self) -> CompressionMethod {
            CompressionMethod::Lzma
        }

        fn decoder(&self, file: &ZipFileData) -> ZipResult<Box<dyn Decoder>> {
            // with an end marker the declared size is only an upper bound
            let end_marker = file.flag & flags::LZMA_EOS_MARKER != 0;
            let unpacked_size = if end_marker {
                UnpackedSize::UseProvided(None)
            } else {
                UnpackedSize::UseProvided(Some(file.uncompressed_size))
            };
            let options = Options {
                unpacked_size,
                ..Default::default()
            };
            Ok(Box::new(LzmaDecoder {
                header_left: ZIP_LZMA_HEADER_SIZE,
                stream: Some(Stream::new_with_options(&options, Vec::new())),
                pending: Vec::new(),
                pending_pos: 0,
                decoded: 0,
                limit: file.uncompressed_size,
            }))
        }

        fn encoder(&self, _level: Option<i32>) -> ZipResult<Box<dyn Encoder>> {
            Err(ZipError::UnsupportedArchive(
                "LZMA compression is only supported for reading",
            ))
        }
    }

    struct LzmaDecoder {
        header_left: usize,
        stream: Option<Stream<Vec<u8>>>,
        pending: Vec<u8>,
        pending_pos: usize,
        decoded: u64,
        /// Declared uncompressed size; nothing past it is kept.
        limit: u64,
    }

    impl LzmaDecoder {
        fn take_output(&mut self, mut out: Vec<u8>) {
            let left = self.limit.saturating_sub(self.decoded);
            out.truncate(usize::try_from(left).unwrap_or(usize::MAX));
            self.decoded += out.len() as u64;
            self.pending = out;
            self.pending_pos = 0;
        }

        fn drain(&mut self, output: &mut [u8]) -> usize {
            let available = &self.pending[self.pending_pos..];
            let n = available.len().min(output.len());
            output[..n].copy_from_slice(&available[..n]);
            self.pending_pos += n;
            if self.pending_pos == self.pending.len() {
                self.pending.clear();
                self.pending_pos = 0;
            }
            n
        }
    }

    impl Decoder for LzmaDecoder {
        fn decode(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<Progress> {
            if self.pending_pos < self.pending.len() {
                return Ok(Progress {
                    consumed: 0,
                    produced: self.drain(output),
                });
            }

            let mut consumed = input.len().min(self.header_left);
            self.header_left -= consumed;

            if self.decoded >= self.limit && self.stream.is_some() {
                // everything declared was delivered, only the end marker is left
                self.stream = None;
            }

            if consumed < input.len() {
                match self.stream.as_mut() {
                    Some(stream) => {
                        let mut out = Vec::new();
                        while consumed < input.len() && out.is_empty() {
                            let end = input.len().min(consumed + FEED_SIZE);
                            stream.write_all(&input[consumed..end])?;
                            consumed = end;
                            if let Some(decoded) = stream.get_output_mut() {
                                out = mem::take(decoded);
                            }
                        }
                        self.take_output(out);
                    }
                    None => consumed = input.len(),
                }
            } else if input.is_empty() {
                if let Some(stream) = self.stream.take() {
                    let out = stream
                        .finish()
                        .map_err(|_| corrupt("corrupt lzma stream"))?;
                    self.take_output(out);
                }
            }

            Ok(Progress {
                consumed,
                produced: self.drain(output),
            })
        }

        fn is_finished(&self) -> bool {
            self.stream.is_none() && self.pending_pos == self.pending.len()
        }
    }
}

#[cfg(feature = "zstd")]
mod zstandard {
    use std::io;

    use zstd::stream::raw::{
        Decoder as RawDecoder, Encoder as RawEncoder, Operation, OutBuffer,
    };

    use super::{Decoder, Encoder, EntryCodec, Progress, CHUNK_SIZE};
    use crate::compression::CompressionMethod;
    use crate::result::ZipResult;
    use crate::types::ZipFileData;

    pub struct ZstdCodec;

    impl EntryCodec for ZstdCodec {
        fn method(&self) -> CompressionMethod {
            CompressionMethod::Zstd
        }

        fn decoder(&self, _file: &ZipFileData) -> ZipResult<Box<dyn Decoder>> {
            Ok(Box::new(ZstdDecoder {
                inner: RawDecoder::new()?,
                finished: false,
            }))
        }

        fn encoder(&self, level: Option<i32>) -> ZipResult<Box<dyn Encoder>> {
            let level = level.unwrap_or(zstd::DEFAULT_COMPRESSION_LEVEL);
            Ok(Box::new(ZstdEncoder {
                inner: RawEncoder::new(level)?,
                scratch: vec![0; CHUNK_SIZE],
            }))
        }
    }

    struct ZstdDecoder {
        inner: RawDecoder<'static>,
        finished: bool,
    }

    impl Decoder for ZstdDecoder {
        fn decode(&mut self, input: &[u8], output: &mut [u8]) -> io::Result<Progress> {
            if self.finished {
                return Ok(Progress::default());
            }
            let status = self.inner.run_on_buffers(input, output)?;
            if status.remaining == 0 {
                self.finished = true;
            }
            Ok(Progress {
                consumed: status.bytes_read,
                produced: status.bytes_written,
            })
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    struct ZstdEncoder {
        inner: RawEncoder<'static>,
        scratch: Vec<u8>,
    }

    impl Encoder for ZstdEncoder {
        fn encode(&mut self, mut input: &[u8], output: &mut Vec<u8>) -> io::Result<()> {
            while !input.is_empty() {
                let status = self.inner.run_on_buffers(input, &mut self.scratch)?;
                output.extend_from_slice(&self.scratch[..status.bytes_written]);
                input = &input[status.bytes_read..];
            }
            Ok(())
        }

        fn finish(&mut self, output: &mut Vec<u8>) -> io::Result<()> {
            loop {
                let (written, remaining) = {
                    let mut out = OutBuffer::around(&mut self.scratch[..]);
                    let remaining = self.inner.finish(&mut out, true)?;
                    (out.pos(), remaining)
                };
                output.extend_from_slice(&self.scratch[..written]);
                if remaining == 0 {
                    return Ok(());
                }
            }
        }
    }
}
