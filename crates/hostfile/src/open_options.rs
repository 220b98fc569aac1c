#![forbid(unsafe_code)]

//! Open option flags.
//!
//! The bit positions are shared with a remote file-open protocol and must not
//! be renumbered:
//!
//! | Flag | Bit |
//! |------|-----|
//! | `READ` | 0 |
//! | `WRITE` | 1 |
//! | `APPEND` | 2 |
//! | `TRUNCATE` | 3 |
//! | `NON_BLOCKING` | 4 |
//! | `CAN_CREATE` | 5 |
//! | `CAN_CREATE_EXCLUSIVE` | 6 |
//! | `NO_FOLLOW_SYMLINKS` | 7 |
//! | `CLOSE_ON_EXEC` | 8 |
//!
//! Not every combination is meaningful to the host `open` call (for example
//! `TRUNCATE` without `WRITE`); the set records what was requested and leaves
//! validation to whoever performs the open.

use std::fs;

use bitflags::bitflags;

use crate::error::{FileError, Result};

bitflags! {
    /// How a file was, or should be, opened.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenOptions: u32 {
        /// Open for reading.
        const READ                 = 1 << 0;
        /// Open for writing.
        const WRITE                = 1 << 1;
        /// Position every write at the end of the file.
        const APPEND               = 1 << 2;
        /// Truncate the file when opening.
        const TRUNCATE             = 1 << 3;
        /// Reads and writes do not block.
        const NON_BLOCKING         = 1 << 4;
        /// Create the file if it does not exist.
        const CAN_CREATE           = 1 << 5;
        /// Create the file, failing if it already exists.
        const CAN_CREATE_EXCLUSIVE = 1 << 6;
        /// Fail instead of following a trailing symlink.
        const NO_FOLLOW_SYMLINKS   = 1 << 7;
        /// Close the descriptor across `exec`.
        const CLOSE_ON_EXEC        = 1 << 8;
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::empty()
    }
}

impl OpenOptions {
    /// Parse a POSIX `fopen`-style mode string.
    ///
    /// ```
    /// use hostfile::open_options::OpenOptions;
    ///
    /// let opts = OpenOptions::from_mode("a+").unwrap();
    /// assert!(opts.contains(OpenOptions::READ | OpenOptions::WRITE | OpenOptions::APPEND));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`FileError::InvalidArgument`] for an unrecognized mode.
    pub fn from_mode(mode: &str) -> Result<Self> {
        let opts = match mode {
            "r" | "rb" => Self::READ,
            "w" | "wb" => Self::WRITE | Self::CAN_CREATE | Self::TRUNCATE,
            "a" | "ab" => Self::WRITE | Self::CAN_CREATE | Self::APPEND,
            "r+" | "rb+" | "r+b" => Self::READ | Self::WRITE,
            "w+" | "wb+" | "w+b" => Self::READ | Self::WRITE | Self::CAN_CREATE | Self::TRUNCATE,
            "a+" | "ab+" | "a+b" => Self::READ | Self::WRITE | Self::CAN_CREATE | Self::APPEND,
            _ => {
                return Err(FileError::InvalidArgument(format!(
                    "invalid mode {mode:?}, cannot convert to open options"
                )));
            }
        };
        Ok(opts)
    }

    /// Stream mode string equivalent to these options.
    ///
    /// Returns `None` when neither `READ` nor `WRITE` is set.
    #[must_use]
    pub fn to_mode(self) -> Option<&'static str> {
        let exclusive = self.contains(Self::CAN_CREATE_EXCLUSIVE);
        let read = self.contains(Self::READ);
        let write = self.contains(Self::WRITE);

        if self.contains(Self::APPEND) && (read || write) {
            return Some(match (read, exclusive) {
                (true, true) => "a+x",
                (true, false) => "a+",
                (false, true) => "ax",
                (false, false) => "a",
            });
        }
        match (read, write) {
            (true, true) if self.contains(Self::CAN_CREATE) => {
                Some(if exclusive { "w+x" } else { "w+" })
            }
            (true, true) => Some("r+"),
            (true, false) => Some("r"),
            (false, true) => Some("w"),
            (false, false) => None,
        }
    }

    /// Build the std open request for these options.
    ///
    /// `permissions` is applied only when the file is created.
    /// `CLOSE_ON_EXEC` needs no mapping: std always opens close-on-exec.
    #[must_use]
    pub fn to_std(self, permissions: u32) -> fs::OpenOptions {
        use std::os::unix::fs::OpenOptionsExt;

        let mut opts = fs::OpenOptions::new();
        opts.read(self.contains(Self::READ))
            .write(self.contains(Self::WRITE))
            .append(self.contains(Self::APPEND))
            .truncate(self.contains(Self::TRUNCATE))
            .create(self.contains(Self::CAN_CREATE))
            .create_new(self.contains(Self::CAN_CREATE_EXCLUSIVE))
            .mode(permissions);

        let mut custom = 0;
        if self.contains(Self::NON_BLOCKING) {
            custom |= libc::O_NONBLOCK;
        }
        if self.contains(Self::NO_FOLLOW_SYMLINKS) {
            custom |= libc::O_NOFOLLOW;
        }
        opts.custom_flags(custom);
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout_is_fixed() {
        assert_eq!(OpenOptions::READ.bits(), 0x001);
        assert_eq!(OpenOptions::WRITE.bits(), 0x002);
        assert_eq!(OpenOptions::APPEND.bits(), 0x004);
        assert_eq!(OpenOptions::TRUNCATE.bits(), 0x008);
        assert_eq!(OpenOptions::NON_BLOCKING.bits(), 0x010);
        assert_eq!(OpenOptions::CAN_CREATE.bits(), 0x020);
        assert_eq!(OpenOptions::CAN_CREATE_EXCLUSIVE.bits(), 0x040);
        assert_eq!(OpenOptions::NO_FOLLOW_SYMLINKS.bits(), 0x080);
        assert_eq!(OpenOptions::CLOSE_ON_EXEC.bits(), 0x100);
    }

    #[test]
    fn basic_modes() {
        assert_eq!(OpenOptions::from_mode("r").unwrap(), OpenOptions::READ);
        assert_eq!(
            OpenOptions::from_mode("w").unwrap(),
            OpenOptions::WRITE | OpenOptions::CAN_CREATE | OpenOptions::TRUNCATE
        );
        assert_eq!(
            OpenOptions::from_mode("a").unwrap(),
            OpenOptions::WRITE | OpenOptions::CAN_CREATE | OpenOptions::APPEND
        );
    }

    #[test]
    fn plus_adds_complementary_access() {
        assert_eq!(
            OpenOptions::from_mode("r+").unwrap(),
            OpenOptions::READ | OpenOptions::WRITE
        );
        assert!(OpenOptions::from_mode("w+").unwrap().contains(OpenOptions::READ));
        assert!(OpenOptions::from_mode("a+b").unwrap().contains(OpenOptions::READ));
    }

    #[test]
    fn unknown_mode_is_invalid_argument() {
        for mode in ["", "x", "rw", "r++", "+r"] {
            assert!(
                matches!(OpenOptions::from_mode(mode), Err(FileError::InvalidArgument(_))),
                "mode {mode:?} should be rejected"
            );
        }
    }

    #[test]
    fn to_mode_inverts_parse() {
        for mode in ["r", "w", "a", "r+", "w+", "a+"] {
            let opts = OpenOptions::from_mode(mode).unwrap();
            assert_eq!(opts.to_mode(), Some(mode));
        }
    }

    #[test]
    fn to_mode_exclusive_and_empty() {
        let opts = OpenOptions::READ
            | OpenOptions::WRITE
            | OpenOptions::CAN_CREATE
            | OpenOptions::CAN_CREATE_EXCLUSIVE;
        assert_eq!(opts.to_mode(), Some("w+x"));
        assert_eq!((OpenOptions::WRITE | OpenOptions::APPEND | OpenOptions::CAN_CREATE_EXCLUSIVE).to_mode(), Some("ax"));
        assert_eq!(OpenOptions::CLOSE_ON_EXEC.to_mode(), None);
        assert_eq!(OpenOptions::default().to_mode(), None);
    }

    #[test]
    fn to_std_opens_and_creates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("created.txt");
        let opts = OpenOptions::from_mode("w").unwrap();
        assert!(opts.to_std(0o600).open(&path).is_ok());
        assert!(path.exists());

        let exclusive = OpenOptions::WRITE | OpenOptions::CAN_CREATE_EXCLUSIVE;
        assert!(exclusive.to_std(0o600).open(&path).is_err());
    }
}
