//! Seeking and signature search helpers over `Read + Seek` streams.

use std::io::{self, Read, Seek, SeekFrom};

const SEARCH_CHUNK: usize = 32 * 1024;

/// Length of the stream; the position is left unchanged.
pub fn stream_len<S: Seek>(stream: &mut S) -> io::Result<u64> {
    let pos = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    if pos != len {
        stream.seek(SeekFrom::Start(pos))?;
    }
    Ok(len)
}

/// Searches forward from the current position for `pattern`, looking at
/// most `max_seek` bytes ahead for its start.
///
/// On success the stream is left at the match and its position returned. On
/// a miss the stream is put back where it was.
pub fn find<R: Read + Seek>(reader: &mut R, pattern: &[u8], max_seek: u64) -> io::Result<Option<u64>> {
    let start = reader.stream_position()?;
    let overlap = pattern.len().saturating_sub(1);
    let mut window: Vec<u8> = Vec::with_capacity(SEARCH_CHUNK + overlap);
    // absolute position of window[0]
    let mut window_pos = start;
    let mut chunk = vec![0; SEARCH_CHUNK];
    loop {
        let read = read_full(reader, &mut chunk)?;
        window.extend_from_slice(&chunk[..read]);
        if let Some(i) = window.windows(pattern.len()).position(|w| w == pattern) {
            let found = window_pos + i as u64;
            if found - start >= max_seek {
                break;
            }
            reader.seek(SeekFrom::Start(found))?;
            return Ok(Some(found));
        }
        if read < chunk.len() || window_pos + window.len() as u64 - start >= max_seek {
            break;
        }
        let keep = window.len().min(overlap);
        window_pos += (window.len() - keep) as u64;
        window.drain(..window.len() - keep);
    }
    reader.seek(SeekFrom::Start(start))?;
    Ok(None)
}

/// Searches backward from the current position for the last `pattern` that
/// ends at or before it and starts no more than `max_back` bytes earlier.
///
/// Leaves the stream at the match on success, or where it was on a miss.
pub fn find_reverse<R: Read + Seek>(
    reader: &mut R,
    pattern: &[u8],
    max_back: u64,
) -> io::Result<Option<u64>> {
    let end = reader.stream_position()?;
    let lower = end.saturating_sub(max_back);
    let overlap = pattern.len().saturating_sub(1) as u64;
    let mut chunk_end = end;
    let mut buf = Vec::with_capacity(SEARCH_CHUNK + overlap as usize);
    while chunk_end > lower {
        let chunk_start = chunk_end.saturating_sub(SEARCH_CHUNK as u64).max(lower);
        let read_end = (chunk_end + overlap).min(end);
        buf.resize((read_end - chunk_start) as usize, 0);
        reader.seek(SeekFrom::Start(chunk_start))?;
        let read = read_full(reader, &mut buf)?;
        buf.truncate(read);
        if let Some(i) = buf.windows(pattern.len()).rposition(|w| w == pattern) {
            let found = chunk_start + i as u64;
            reader.seek(SeekFrom::Start(found))?;
            return Ok(Some(found));
        }
        chunk_end = chunk_start;
    }
    reader.seek(SeekFrom::Start(end))?;
    Ok(None)
}

/// Reads until `buf` is full or the stream ends.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
