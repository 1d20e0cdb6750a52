//! The archive session: one stream, its central directory, and at most one
//! open entry.

use std::io::{self, prelude::*, SeekFrom};

use tracing::{debug, warn};

use crate::central_directory::{CentralDirectory, Footer};
use crate::read::ReadState;
use crate::recover;
use crate::result::{ZipError, ZipResult};
use crate::spec;
use crate::stream;
use crate::system;
use crate::types::{ZipFileData, DEFAULT_VERSION_MADE_BY};
use crate::write::WriteState;

/// How an archive is opened.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read an existing archive.
    Read,
    /// Start a new archive at the current stream position. Existing content
    /// is not looked at.
    Write,
    /// Add entries to an existing archive, or start one if the stream is empty.
    Append,
}

impl OpenMode {
    pub(crate) fn writes(self) -> bool {
        self != OpenMode::Read
    }
}

/// Session settings used when opening an archive.
///
/// ```
/// use zip_engine::{Config, OpenMode, ZipArchive};
/// use std::io::Cursor;
///
/// let config = Config::default().data_descriptor(false).comment("built today");
/// let mut archive = ZipArchive::with_config(Cursor::new(Vec::new()), OpenMode::Write, config)?;
/// archive.close()?;
/// # Ok::<(), zip_engine::ZipError>(())
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    recover: bool,
    data_descriptor: bool,
    version_made_by: u16,
    comment: Option<Vec<u8>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recover: false,
            data_descriptor: true,
            version_made_by: DEFAULT_VERSION_MADE_BY,
            comment: None,
        }
    }
}

impl Config {
    /// Rebuild the central directory from the local headers when it cannot
    /// be found or read.
    pub fn recover(mut self, recover: bool) -> Self {
        self.recover = recover;
        self
    }

    /// Write sizes and CRC after the payload instead of patching the local
    /// header. On by default.
    pub fn data_descriptor(mut self, data_descriptor: bool) -> Self {
        self.data_descriptor = data_descriptor;
        self
    }

    /// `version made by` of the ZIP64 end record.
    pub fn version_made_by(mut self, version_made_by: u16) -> Self {
        self.version_made_by = version_made_by;
        self
    }

    /// Archive comment, replacing the one of an appended archive.
    pub fn comment<C: Into<Vec<u8>>>(mut self, comment: C) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// The central record the session is positioned on.
#[derive(Debug)]
pub(crate) struct CurrentEntry {
    pub(crate) index: u64,
    /// Where the record starts in the central directory buffer.
    pub(crate) offset: usize,
    pub(crate) len: usize,
    pub(crate) info: ZipFileData,
}

#[derive(Debug, Default)]
pub(crate) enum EntryState {
    #[default]
    Idle,
    Reading(Box<ReadState>),
    Writing(Box<WriteState>),
}

/// A ZIP archive session over a seekable stream.
///
/// Entries are reached by moving a cursor over the central directory and
/// then opened one at a time for reading or writing.
///
/// ```no_run
/// use std::io::prelude::*;
///
/// fn list_zip_contents(reader: impl Read + Seek) -> zip_engine::ZipResult<()> {
///     let mut zip = zip_engine::ZipArchive::new(reader)?;
///
///     let mut more = zip.goto_first_entry()?;
///     while more {
///         let info = zip.entry_info().expect("positioned on an entry");
///         println!("Filename: {}", info.file_name);
///         zip.entry_read_open(false, None)?;
///         let mut contents = Vec::new();
///         zip.read_to_end(&mut contents)?;
///         zip.entry_read_close()?;
///         more = zip.goto_next_entry()?;
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct ZipArchive<S> {
    pub(crate) stream: S,
    pub(crate) mode: OpenMode,
    pub(crate) closed: bool,
    pub(crate) recover: bool,
    pub(crate) data_descriptor: bool,
    pub(crate) version_made_by: u16,
    pub(crate) comment: Vec<u8>,
    /// Central directory records, read from the stream or built in memory.
    pub(crate) cd: Vec<u8>,
    pub(crate) number_entry: u64,
    pub(crate) disk_number_with_cd: u32,
    /// Length of data found in front of the archive.
    pub(crate) disk_offset_shift: u64,
    /// Where the next local header, or the central directory, is written.
    pub(crate) write_pos: u64,
    pub(crate) current: Option<CurrentEntry>,
    pub(crate) entry: EntryState,
}

impl<S: Read + Seek> ZipArchive<S> {
    /// Opens an existing archive for reading.
    pub fn new(stream: S) -> ZipResult<ZipArchive<S>> {
        ZipArchive::start(stream, OpenMode::Read, Config::default())
    }

    pub(crate) fn start(mut stream: S, mode: OpenMode, config: Config) -> ZipResult<ZipArchive<S>> {
        let write_pos = stream.stream_position()?;
        let mut archive = ZipArchive {
            stream,
            mode,
            closed: false,
            recover: config.recover,
            data_descriptor: config.data_descriptor,
            version_made_by: config.version_made_by,
            comment: Vec::new(),
            cd: Vec::new(),
            number_entry: 0,
            disk_number_with_cd: 0,
            disk_offset_shift: 0,
            write_pos,
            current: None,
            entry: EntryState::Idle,
        };

        let fresh = match mode {
            OpenMode::Read => false,
            OpenMode::Write => true,
            OpenMode::Append => stream::stream_len(&mut archive.stream)? == 0,
        };
        if !fresh {
            archive.load()?;
        }
        if let Some(comment) = config.comment {
            archive.comment = comment;
        }
        debug!(?mode, fresh, entries = archive.number_entry, "opened archive");
        Ok(archive)
    }

    /// Reads the central directory, falling back to recovery when allowed.
    fn load(&mut self) -> ZipResult<()> {
        let directory = match CentralDirectory::load(&mut self.stream) {
            Ok(directory) => directory,
            Err(e) if self.recover => {
                warn!(error = %e, "central directory unusable, recovering from local headers");
                let recovered = recover::recover_central_directory(&mut self.stream)?;
                self.cd = recovered.cd;
                self.number_entry = recovered.number_entry;
                self.write_pos = recovered.end_pos;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.stream.seek(SeekFrom::Start(directory.offset))?;
        let mut cd = vec![0; directory.size as usize];
        self.stream.read_exact(&mut cd)?;
        self.cd = cd;
        self.number_entry = directory.number_entry;
        self.disk_number_with_cd = directory.disk_number_with_cd;
        self.disk_offset_shift = directory.disk_offset_shift;
        self.comment = directory.comment;
        if let Some(version_made_by) = directory.version_made_by {
            self.version_made_by = version_made_by;
        }
        // new entries replace the old directory, or the end record of an empty archive
        self.write_pos = if directory.size > 0 {
            directory.offset
        } else {
            directory.end_pos
        };
        Ok(())
    }

    /// Returns the stream, abandoning any open entry.
    ///
    /// A writing session that was not closed has no central directory.
    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Moving the stream position while an entry is open corrupts it.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Archive comment, written on close.
    pub fn set_comment<C: Into<Vec<u8>>>(&mut self, comment: C) {
        self.comment = comment.into();
    }

    pub fn version_made_by(&self) -> u16 {
        self.version_made_by
    }

    pub fn set_version_made_by(&mut self, version_made_by: u16) {
        self.version_made_by = version_made_by;
    }

    /// Only has an effect on archives opened afterwards with the same settings;
    /// see [`Config::recover`].
    pub fn set_recover(&mut self, recover: bool) {
        self.recover = recover;
    }

    /// Applies to entries opened for writing afterwards.
    pub fn set_data_descriptor(&mut self, data_descriptor: bool) {
        self.data_descriptor = data_descriptor;
    }

    /// Number of entries in the central directory.
    pub fn number_entry(&self) -> u64 {
        self.number_entry
    }

    pub fn set_number_entry(&mut self, number_entry: u64) {
        self.number_entry = number_entry;
    }

    pub fn disk_number_with_cd(&self) -> u32 {
        self.disk_number_with_cd
    }

    pub fn set_disk_number_with_cd(&mut self, disk_number: u32) {
        self.disk_number_with_cd = disk_number;
    }

    /// Bytes found in front of the archive; recorded offsets are relative to its start.
    pub fn disk_offset_shift(&self) -> u64 {
        self.disk_offset_shift
    }

    /// Replaces the central directory with externally supplied records.
    ///
    /// The entry count is not changed; set it with [`Self::set_number_entry`].
    pub fn set_cd_stream(&mut self, cd: Vec<u8>) -> ZipResult<()> {
        self.ensure_idle()?;
        self.cd = cd;
        self.current = None;
        Ok(())
    }

    /// The raw central directory records.
    pub fn central_directory(&self) -> &[u8] {
        &self.cd
    }

    pub(crate) fn ensure_open(&self) -> ZipResult<()> {
        if self.closed {
            return Err(ZipError::InvalidState("archive is closed"));
        }
        Ok(())
    }

    pub(crate) fn ensure_idle(&self) -> ZipResult<()> {
        self.ensure_open()?;
        if self.entry_is_open() {
            return Err(ZipError::InvalidState("an entry is open"));
        }
        Ok(())
    }

    /// Positions on the record at `offset` of the central directory buffer.
    fn scan_entry(&mut self, index: u64, offset: usize) -> ZipResult<bool> {
        self.current = None;
        if self.cd.len().saturating_sub(offset) < 4 {
            return Ok(false);
        }
        let mut reader = io::Cursor::new(&self.cd[offset..]);
        match spec::read_central_header(&mut reader)? {
            Some(info) => {
                self.current = Some(CurrentEntry {
                    index,
                    offset,
                    len: reader.position() as usize,
                    info,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Moves to the first entry. Returns `false` for an archive without entries.
    pub fn goto_first_entry(&mut self) -> ZipResult<bool> {
        self.ensure_idle()?;
        self.scan_entry(0, 0)
    }

    /// Moves to the entry after the current one. Returns `false` past the
    /// last entry, after which no entry is selected.
    pub fn goto_next_entry(&mut self) -> ZipResult<bool> {
        self.ensure_idle()?;
        match self.current.as_ref() {
            Some(current) => {
                let (index, offset) = (current.index + 1, current.offset + current.len);
                self.scan_entry(index, offset)
            }
            None => Err(ZipError::InvalidState("no entry selected")),
        }
    }

    /// Moves to the entry at `index`, walking from the first entry when it
    /// lies before the current one.
    pub fn goto_entry(&mut self, index: u64) -> ZipResult<()> {
        self.ensure_idle()?;
        if index >= self.number_entry {
            return Err(ZipError::FileNotFound);
        }
        let mut found = match &self.current {
            Some(current) if current.index <= index => true,
            _ => self.goto_first_entry()?,
        };
        while found {
            match self.entry_index() {
                Some(current) if current == index => return Ok(()),
                _ => found = self.goto_next_entry()?,
            }
        }
        Err(ZipError::FileNotFound)
    }

    /// Index of the current entry.
    pub fn entry_index(&self) -> Option<u64> {
        self.current.as_ref().map(|current| current.index)
    }

    /// Moves to the entry named `name`. Separators `/` and `\` compare equal.
    pub fn locate_entry(&mut self, name: &str, ignore_case: bool) -> ZipResult<()> {
        self.ensure_idle()?;
        if let Some(current) = &self.current {
            if system::path_compare(&current.info.file_name, name, ignore_case) {
                return Ok(());
            }
        }
        let mut found = self.goto_first_entry()?;
        while found {
            if let Some(current) = &self.current {
                if system::path_compare(&current.info.file_name, name, ignore_case) {
                    return Ok(());
                }
            }
            found = self.goto_next_entry()?;
        }
        Err(ZipError::FileNotFound)
    }

    /// Moves to the first entry accepted by `matches`.
    pub fn locate_first_entry<F>(&mut self, mut matches: F) -> ZipResult<bool>
    where
        F: FnMut(&ZipFileData) -> bool,
    {
        if !self.goto_first_entry()? {
            return Ok(false);
        }
        if self.current.as_ref().map_or(false, |current| matches(&current.info)) {
            return Ok(true);
        }
        self.locate_next_entry(matches)
    }

    /// Moves to the next entry after the current one accepted by `matches`.
    pub fn locate_next_entry<F>(&mut self, mut matches: F) -> ZipResult<bool>
    where
        F: FnMut(&ZipFileData) -> bool,
    {
        while self.goto_next_entry()? {
            if self.current.as_ref().map_or(false, |current| matches(&current.info)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Metadata of the current entry, or of the entry being written.
    pub fn entry_info(&self) -> Option<&ZipFileData> {
        match &self.entry {
            EntryState::Writing(state) => Some(&state.file),
            _ => self.current.as_ref().map(|current| &current.info),
        }
    }

    /// The local header of the open entry.
    pub fn entry_local_info(&self) -> Option<&ZipFileData> {
        match &self.entry {
            EntryState::Reading(state) => Some(&state.local),
            EntryState::Writing(state) => Some(&state.local),
            EntryState::Idle => None,
        }
    }

    pub fn entry_is_open(&self) -> bool {
        !matches!(self.entry, EntryState::Idle)
    }

    pub fn entry_is_dir(&self) -> ZipResult<bool> {
        self.entry_info()
            .map(ZipFileData::is_dir)
            .ok_or(ZipError::InvalidState("no entry selected"))
    }

    pub fn entry_is_symlink(&self) -> ZipResult<bool> {
        self.entry_info()
            .map(ZipFileData::is_symlink)
            .ok_or(ZipError::InvalidState("no entry selected"))
    }

    /// Replaces the extra field of the open entry. For an entry being
    /// written it ends up in the central record.
    pub fn entry_set_extra_field(&mut self, extra_field: &[u8]) -> ZipResult<()> {
        let info = match &mut self.entry {
            EntryState::Writing(state) => &mut state.file,
            EntryState::Reading(_) => match self.current.as_mut() {
                Some(current) => &mut current.info,
                None => return Err(ZipError::InvalidState("no entry selected")),
            },
            EntryState::Idle => return Err(ZipError::InvalidState("no entry is open")),
        };
        spec::u16_len(extra_field.len(), "extra field is too long")?;
        info.extra_field = extra_field.to_vec();
        Ok(())
    }

    /// Seeks the stream to the local header of the current entry.
    pub fn entry_seek_local_header(&mut self) -> ZipResult<u64> {
        self.ensure_open()?;
        if matches!(self.entry, EntryState::Writing(_)) {
            return Err(ZipError::InvalidState("an entry is being written"));
        }
        let info = self
            .current
            .as_ref()
            .map(|current| &current.info)
            .ok_or(ZipError::InvalidState("no entry selected"))?;
        let pos = info
            .disk_offset
            .checked_add(self.disk_offset_shift)
            .ok_or(ZipError::InvalidArchive("local header offset overflows"))?;
        Ok(self.stream.seek(SeekFrom::Start(pos))?)
    }
}

impl<S: Read + Write + Seek> ZipArchive<S> {
    /// Opens `stream` in `mode` with the default [`Config`].
    pub fn open(stream: S, mode: OpenMode) -> ZipResult<ZipArchive<S>> {
        ZipArchive::start(stream, mode, Config::default())
    }

    pub fn with_config(stream: S, mode: OpenMode, config: Config) -> ZipResult<ZipArchive<S>> {
        ZipArchive::start(stream, mode, config)
    }

    /// Closes the open entry. A written entry is finalized, a read one verified.
    pub fn entry_close(&mut self) -> ZipResult<()> {
        match self.entry {
            EntryState::Idle => Err(ZipError::InvalidState("no entry is open")),
            EntryState::Reading(_) => self.entry_read_close().map(|_| ()),
            EntryState::Writing(_) => self.entry_write_close(0, None, None),
        }
    }

    /// Finishes the archive. Writing sessions emit the central directory and
    /// the end records; an entry still being written is finalized first.
    pub fn close(&mut self) -> ZipResult<()> {
        if self.closed {
            return Ok(());
        }
        match self.entry {
            EntryState::Writing(_) => self.entry_write_close(0, None, None)?,
            EntryState::Reading(_) => self.entry = EntryState::Idle,
            EntryState::Idle => {}
        }

        if self.mode.writes() {
            self.write_central_directory()?;
        }
        self.closed = true;
        self.current = None;
        Ok(())
    }

    fn write_central_directory(&mut self) -> ZipResult<()> {
        let relative_pos = self
            .write_pos
            .checked_sub(self.disk_offset_shift)
            .ok_or(ZipError::InvalidState("write position precedes the archive"))?;
        self.stream.seek(SeekFrom::Start(self.write_pos))?;
        self.stream.write_all(&self.cd)?;

        let footer = Footer {
            offset: relative_pos,
            size: self.cd.len() as u64,
            number_entry: self.number_entry,
            disk_number_with_cd: self.disk_number_with_cd,
            version_made_by: self.version_made_by,
            comment: &self.comment,
        };
        debug!(
            offset = footer.offset,
            size = footer.size,
            entries = footer.number_entry,
            "writing central directory"
        );
        footer.write(&mut self.stream, relative_pos + self.cd.len() as u64)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Closes the archive and returns the stream.
    pub fn finish(mut self) -> ZipResult<S> {
        self.close()?;
        Ok(self.stream)
    }
}
