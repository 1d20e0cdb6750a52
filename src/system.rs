//! Host systems recorded in `version made by` and the conversion of file
//! attributes between them.

/// Compatibility of the file attribute information
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum System {
    Dos = 0,
    Unix = 3,
    WindowsNtfs = 10,
    RiscOs = 13,
    OsxDarwin = 19,
    Unknown,
}

impl System {
    pub fn from_u8(system: u8) -> System {
        use self::System::*;

        match system {
            0 => Dos,
            3 => Unix,
            10 => WindowsNtfs,
            13 => RiscOs,
            19 => OsxDarwin,
            _ => Unknown,
        }
    }

    /// Host system encoded in the high byte of a `version made by` field.
    pub fn from_version_made_by(version_made_by: u16) -> System {
        System::from_u8((version_made_by >> 8) as u8)
    }

    fn is_windows_like(self) -> bool {
        matches!(self, System::Dos | System::WindowsNtfs)
    }

    fn is_posix_like(self) -> bool {
        matches!(self, System::Unix | System::OsxDarwin | System::RiscOs)
    }
}

pub mod ffi {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;

    pub const FILE_ATTRIBUTE_READONLY: u32 = 0x01;
    pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;
    pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;
    pub const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
}

/// Converts POSIX mode bits to Windows file attributes.
pub fn posix_to_win32(posix_attrib: u32) -> u32 {
    let mut win32_attrib = 0;
    // no write or execute bits but something readable
    if posix_attrib & 0o333 == 0 && posix_attrib & 0o444 != 0 {
        win32_attrib |= ffi::FILE_ATTRIBUTE_READONLY;
    }
    win32_attrib |= match posix_attrib & ffi::S_IFMT {
        ffi::S_IFLNK => ffi::FILE_ATTRIBUTE_REPARSE_POINT,
        ffi::S_IFDIR => ffi::FILE_ATTRIBUTE_DIRECTORY,
        _ => ffi::FILE_ATTRIBUTE_NORMAL,
    };
    win32_attrib
}

/// Converts Windows file attributes to POSIX mode bits.
pub fn win32_to_posix(win32_attrib: u32) -> u32 {
    let mut posix_attrib = 0o444;
    if win32_attrib & ffi::FILE_ATTRIBUTE_READONLY == 0 {
        posix_attrib |= 0o222;
    }
    if win32_attrib & ffi::FILE_ATTRIBUTE_REPARSE_POINT != 0 {
        posix_attrib |= ffi::S_IFLNK;
    } else if win32_attrib & ffi::FILE_ATTRIBUTE_DIRECTORY != 0 {
        posix_attrib |= ffi::S_IFDIR | 0o111;
    } else {
        posix_attrib |= ffi::S_IFREG;
    }
    posix_attrib
}

/// Converts external attributes written on `src` to the representation used
/// on `target`. Returns `None` when either host is not understood.
pub fn attrib_convert(src: System, attrib: u32, target: System) -> Option<u32> {
    if src.is_windows_like() {
        if target.is_windows_like() {
            return Some(attrib);
        }
        if target.is_posix_like() {
            return Some(win32_to_posix(attrib));
        }
    } else if src.is_posix_like() {
        // unix attributes live in the high word when present
        let attrib = if attrib >> 16 != 0 { attrib >> 16 } else { attrib };
        if target.is_posix_like() {
            return Some(attrib);
        }
        if target.is_windows_like() {
            return Some(posix_to_win32(attrib));
        }
    }
    None
}

/// Whether the external attributes describe a directory.
pub fn attrib_is_dir(attrib: u32, version_made_by: u16) -> bool {
    let host = System::from_version_made_by(version_made_by);
    match attrib_convert(host, attrib, System::Dos) {
        Some(win32) => win32 & ffi::FILE_ATTRIBUTE_DIRECTORY != 0,
        None => false,
    }
}

/// Whether the external attributes describe a symbolic link.
pub fn attrib_is_symlink(attrib: u32, version_made_by: u16) -> bool {
    let host = System::from_version_made_by(version_made_by);
    match attrib_convert(host, attrib, System::Unix) {
        Some(posix) => posix & ffi::S_IFMT == ffi::S_IFLNK,
        None => false,
    }
}

/// Compares two archive paths, treating `\` and `/` as the same separator.
pub fn path_compare(a: &str, b: &str, ignore_case: bool) -> bool {
    fn normalize(c: char, ignore_case: bool) -> char {
        match c {
            '\\' => '/',
            c if ignore_case => c.to_ascii_lowercase(),
            c => c,
        }
    }

    a.chars().count() == b.chars().count()
        && a
            .chars()
            .zip(b.chars())
            .all(|(x, y)| normalize(x, ignore_case) == normalize(y, ignore_case))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn system() {
        assert_eq!(System::Dos as u16, 0u16);
        assert_eq!(System::Unix as u16, 3u16);
        assert_eq!(System::from_u8(0), System::Dos);
        assert_eq!(System::from_u8(3), System::Unix);
        assert_eq!(System::from_u8(10), System::WindowsNtfs);
        assert_eq!(System::from_u8(42), System::Unknown);
        assert_eq!(System::from_version_made_by(0x0314), System::Unix);
    }

    #[test]
    fn directory_attributes() {
        // unix directory, mode in the high word
        assert!(attrib_is_dir((0o040755) << 16, 3 << 8));
        assert!(!attrib_is_dir((0o100644) << 16, 3 << 8));
        // dos directory bit
        assert!(attrib_is_dir(0x10, 0));
        assert!(!attrib_is_dir(0x20, 0));
        // unknown host
        assert!(!attrib_is_dir(0x10, 42 << 8));
    }

    #[test]
    fn symlink_attributes() {
        assert!(attrib_is_symlink((0o120777) << 16, 3 << 8));
        assert!(attrib_is_symlink(0x400, 10 << 8));
        assert!(!attrib_is_symlink(0x10, 0));
    }

    #[test]
    fn win32_posix_conversion() {
        assert_eq!(posix_to_win32(0o100444), 0x01 | 0x80);
        assert_eq!(posix_to_win32(0o100644), 0x80);
        assert_eq!(posix_to_win32(0o040755), 0x10);
        assert_eq!(win32_to_posix(0x10), 0o040777);
        assert_eq!(win32_to_posix(0x01), 0o100444);
        assert_eq!(win32_to_posix(0x80), 0o100666);
    }

    #[test]
    fn separators_and_case() {
        assert!(path_compare("a/b/c.txt", "a\\b\\c.txt", false));
        assert!(!path_compare("A/b.TXT", "a/b.txt", false));
        assert!(path_compare("A/b.TXT", "a\\b.txt", true));
        assert!(!path_compare("a/b", "a/bc", true));
    }
}
