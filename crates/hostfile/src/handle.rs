#![forbid(unsafe_code)]

//! The capability contract every file handle implements.
//!
//! Callers program against [`FileHandle`] and never need to know whether a
//! handle is backed by a raw descriptor, a buffered stream, or both. Every
//! method has a default that reports the capability as missing, so a handle
//! kind only implements what it can actually do.
//!
//! # Threading
//!
//! Implicit-position operations (`read`, `write`, `seek_*`) take `&mut self`:
//! they share one cursor and callers must serialize them. The positioned
//! operations (`read_at`, `write_at`) take `&self` and may run concurrently
//! against the same handle, each caller advancing its own offset.

use std::fmt::{self, Write as _};
use std::path::PathBuf;

use crate::error::{FileError, Result};
use crate::stream::Stream;
use crate::sys::{INVALID_DESCRIPTOR, RawDescriptor};
use crate::terminal::TerminalClassifier;

/// Identifier usable only for readiness polling, never for I/O.
pub type WaitableHandle = RawDescriptor;

/// Sentinel returned when a handle has nothing to poll.
pub const INVALID_WAITABLE_HANDLE: WaitableHandle = INVALID_DESCRIPTOR;

/// Read/write/seek/flush/sync/close/classification contract.
pub trait FileHandle: Send + Sync {
    /// Read up to `buf.len()` bytes at the implicit position.
    ///
    /// `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let _ = buf;
        Err(FileError::unsupported("read"))
    }

    /// Write all of `buf` at the implicit position.
    ///
    /// Returns `buf.len()` on success; a short transfer is always an error.
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let _ = buf;
        Err(FileError::unsupported("write"))
    }

    /// Whether the handle still holds a resource.
    fn is_valid(&self) -> bool {
        false
    }

    /// Release owned resources. Closing an already closed handle succeeds.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Identifier for readiness polling, or [`INVALID_WAITABLE_HANDLE`].
    fn waitable_handle(&self) -> WaitableHandle {
        INVALID_WAITABLE_HANDLE
    }

    /// Filesystem path this handle refers to.
    fn file_spec(&self) -> Result<PathBuf> {
        Err(FileError::unsupported("file_spec"))
    }

    /// Detach the buffered stream, leaving the handle invalid.
    fn take_stream_and_clear(&mut self) -> Option<Stream> {
        None
    }

    /// Raw descriptor for the handle, or [`INVALID_DESCRIPTOR`].
    fn descriptor(&self) -> RawDescriptor {
        INVALID_DESCRIPTOR
    }

    /// Buffered stream for the handle, if one exists or can be made.
    fn stream(&mut self) -> Option<Stream> {
        None
    }

    fn seek_from_start(&mut self, offset: u64) -> Result<u64> {
        let _ = offset;
        Err(FileError::unsupported("seek"))
    }

    fn seek_from_current(&mut self, offset: i64) -> Result<u64> {
        let _ = offset;
        Err(FileError::unsupported("seek"))
    }

    fn seek_from_end(&mut self, offset: i64) -> Result<u64> {
        let _ = offset;
        Err(FileError::unsupported("seek"))
    }

    /// Read at `*offset` without disturbing the implicit position.
    ///
    /// On success `*offset` advances by the bytes read.
    fn read_at(&self, buf: &mut [u8], offset: &mut u64) -> Result<usize> {
        let _ = (buf, offset);
        Err(FileError::unsupported("read_at"))
    }

    /// Write all of `buf` at `*offset` without disturbing the implicit
    /// position.
    ///
    /// On success `*offset` advances by the bytes written.
    fn write_at(&self, buf: &[u8], offset: &mut u64) -> Result<usize> {
        let _ = (buf, offset);
        Err(FileError::unsupported("write_at"))
    }

    fn flush(&mut self) -> Result<()> {
        Err(FileError::unsupported("flush"))
    }

    fn sync(&mut self) -> Result<()> {
        Err(FileError::unsupported("sync"))
    }

    /// Format `args` and write the result at the implicit position.
    ///
    /// Returns the number of bytes written.
    fn printf(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        let mut text = String::new();
        text.write_fmt(args)
            .map_err(|_| FileError::InvalidArgument("formatting failed".into()))?;
        if text.is_empty() {
            return Ok(0);
        }
        self.write(text.as_bytes())
    }

    /// Classification cache for this handle.
    fn classifier(&self) -> &TerminalClassifier;

    /// Is the handle a tty or pty? Resolved once, then cached.
    fn is_interactive(&self) -> bool {
        self.classifier().is_interactive(self.descriptor())
    }

    /// Is the handle a terminal with a non-zero size? Resolved once, then
    /// cached.
    fn is_real_terminal(&self) -> bool {
        self.classifier().is_real_terminal(self.descriptor())
    }

    /// Is the handle a real terminal that renders color? Resolved once, then
    /// cached.
    fn is_terminal_with_colors(&self) -> bool {
        self.classifier().is_terminal_with_colors(self.descriptor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Handle kind with no resources at all.
    #[derive(Default)]
    struct Bare {
        classifier: TerminalClassifier,
    }

    impl FileHandle for Bare {
        fn classifier(&self) -> &TerminalClassifier {
            &self.classifier
        }
    }

    #[test]
    fn defaults_report_unsupported() {
        let mut bare = Bare::default();
        let mut buf = [0u8; 4];
        let mut offset = 0;
        assert!(matches!(bare.read(&mut buf), Err(FileError::Unsupported { operation: "read" })));
        assert!(matches!(bare.write(b"x"), Err(FileError::Unsupported { .. })));
        assert!(matches!(bare.seek_from_end(0), Err(FileError::Unsupported { .. })));
        assert!(matches!(bare.read_at(&mut buf, &mut offset), Err(FileError::Unsupported { .. })));
        assert!(matches!(bare.flush(), Err(FileError::Unsupported { .. })));
        assert!(matches!(bare.file_spec(), Err(FileError::Unsupported { .. })));
        assert_eq!(offset, 0);
    }

    #[test]
    fn defaults_are_invalid_and_closable() {
        let mut bare = Bare::default();
        assert!(!bare.is_valid());
        assert!(bare.close().is_ok());
        assert_eq!(bare.waitable_handle(), INVALID_WAITABLE_HANDLE);
        assert_eq!(bare.descriptor(), INVALID_DESCRIPTOR);
        assert!(bare.take_stream_and_clear().is_none());
        assert!(!bare.is_interactive());
    }

    #[test]
    fn printf_routes_through_write() {
        let mut bare = Bare::default();
        assert_eq!(bare.printf(format_args!("")).unwrap(), 0);
        assert!(matches!(
            bare.printf(format_args!("{}", 42)),
            Err(FileError::Unsupported { operation: "write" })
        ));
    }
}
