#![forbid(unsafe_code)]

//! Error taxonomy shared by every handle operation.
//!
//! Partial transfers are not errors: a short read reports success with the
//! reduced count, and writes retry internally until the full count is moved
//! or a hard error surfaces.

use std::fmt;
use std::io;

/// Errors returned by file handle operations.
#[derive(Debug)]
pub enum FileError {
    /// The handle has no resource able to perform `operation`.
    Unsupported { operation: &'static str },
    /// The handle was closed or never held a resource.
    InvalidHandle,
    /// The underlying OS call failed.
    Io(io::Error),
    /// Malformed input, such as an unrecognized mode string.
    InvalidArgument(String),
}

impl FileError {
    /// OS error code carried by an [`FileError::Io`] failure.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) const fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { operation } => write!(f, "{operation} is not supported by this file"),
            Self::InvalidHandle => write!(f, "invalid file handle"),
            Self::Io(err) => write!(f, "i/o failure: {err}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<FileError> for io::Error {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Io(inner) => inner,
            FileError::Unsupported { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            FileError::InvalidHandle => io::Error::from_raw_os_error(libc::EBADF),
            FileError::InvalidArgument(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = FileError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation() {
        let err = FileError::unsupported("seek");
        assert_eq!(err.to_string(), "seek is not supported by this file");
    }

    #[test]
    fn io_errors_keep_os_code() {
        let err = FileError::from(io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_handle_maps_to_ebadf() {
        let err: io::Error = FileError::InvalidHandle.into();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn invalid_argument_maps_to_invalid_input() {
        let err: io::Error = FileError::InvalidArgument("mode \"q\"".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
