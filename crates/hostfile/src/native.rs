#![forbid(unsafe_code)]

//! Host file backed by a raw descriptor, a buffered stream, or both.
//!
//! # Resource Slots
//!
//! A [`DualResourceFile`] holds up to two OS handles, each with its own
//! ownership flag:
//!
//! | Slot | Invalid value | Owned | Not owned |
//! |------|---------------|-------|-----------|
//! | descriptor | [`INVALID_DESCRIPTOR`] | closed on close/drop | forgotten |
//! | stream | `None` | closed on close/drop | flushed, then forgotten |
//!
//! The two may name the same open file or different ones; nothing here keeps
//! their positions in sync.
//!
//! # Preference
//!
//! Operations either slot can satisfy go to the descriptor, bypassing
//! user-space buffering, and fall back to the stream when there is none.
//!
//! # Close Precedence
//!
//! When both slots are owned and the stream wraps the descriptor, closing the
//! stream releases the shared descriptor and the descriptor slot is cleared
//! without a second release.
//!
//! # Positioned I/O
//!
//! `read_at`/`write_at` use `pread`/`pwrite` on a descriptor. A stream-only
//! handle emulates them under an offset lock: save position, seek, transfer,
//! restore. The lock covers only that sequence.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{FileError, Result};
use crate::handle::{FileHandle, INVALID_WAITABLE_HANDLE, WaitableHandle};
use crate::open_options::OpenOptions;
use crate::stream::Stream;
use crate::sys::{self, INVALID_DESCRIPTOR, RawDescriptor, descriptor_is_valid};
use crate::terminal::{TerminalClassifier, TerminalProbe};

/// File over a raw descriptor and/or a buffered stream.
pub struct DualResourceFile {
    descriptor: RawDescriptor,
    own_descriptor: bool,
    stream: Option<Stream>,
    own_stream: bool,
    options: OpenOptions,
    offset_lock: Mutex<()>,
    classifier: TerminalClassifier,
}

impl DualResourceFile {
    /// A handle with no resources; [`is_valid`](FileHandle::is_valid) is false.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(INVALID_DESCRIPTOR, false, None, false, OpenOptions::empty())
    }

    /// Wrap a descriptor. With `transfer_ownership` the handle closes it.
    #[must_use]
    pub fn from_descriptor(fd: RawDescriptor, options: OpenOptions, transfer_ownership: bool) -> Self {
        Self::from_parts(fd, transfer_ownership, None, false, options)
    }

    /// Wrap a stream. With `transfer_ownership` the handle closes it.
    #[must_use]
    pub fn from_stream(stream: Stream, transfer_ownership: bool) -> Self {
        let options = stream.options();
        Self::from_parts(INVALID_DESCRIPTOR, false, Some(stream), transfer_ownership, options)
    }

    /// Wrap a descriptor and a stream with independent ownership.
    #[must_use]
    pub fn from_parts(
        fd: RawDescriptor,
        own_descriptor: bool,
        stream: Option<Stream>,
        own_stream: bool,
        options: OpenOptions,
    ) -> Self {
        let own_descriptor = own_descriptor && descriptor_is_valid(fd);
        let own_stream = own_stream && stream.is_some();
        if descriptor_is_valid(fd) || stream.is_some() {
            tracing::debug!(
                fd,
                own_descriptor,
                has_stream = stream.is_some(),
                own_stream,
                options = ?options,
                "file handle created"
            );
        }
        Self {
            descriptor: fd,
            own_descriptor,
            stream,
            own_stream,
            options,
            offset_lock: Mutex::new(()),
            classifier: TerminalClassifier::default(),
        }
    }

    /// Open `path` and own the resulting descriptor.
    ///
    /// `permissions` applies only when the file is created.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the host open fails.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions, permissions: u32) -> Result<Self> {
        let fd = sys::open(path.as_ref(), options, permissions)?;
        Ok(Self::from_descriptor(fd, options, true))
    }

    /// Use `probe` for terminal classification instead of the host probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn TerminalProbe>) -> Self {
        self.classifier.set_probe(probe);
        self
    }

    /// Options recorded at construction. Descriptive only.
    #[must_use]
    pub fn options(&self) -> OpenOptions {
        self.options
    }

    fn descriptor_is_valid(&self) -> bool {
        descriptor_is_valid(self.descriptor)
    }

    /// The stream slot, unless its owner has closed the stream since.
    fn open_stream(&self) -> Option<&Stream> {
        self.stream.as_ref().filter(|stream| stream.is_open())
    }

    fn stream_is_valid(&self) -> bool {
        self.open_stream().is_some()
    }

    fn missing(&self, operation: &'static str) -> FileError {
        if self.is_valid() {
            FileError::unsupported(operation)
        } else {
            FileError::InvalidHandle
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        if self.descriptor_is_valid() {
            return Ok(sys::seek(self.descriptor, pos)?);
        }
        match self.open_stream() {
            Some(stream) => Ok(stream.seek(pos)?),
            None => Err(FileError::InvalidHandle),
        }
    }

    /// Run `op` on the stream with its position moved to `offset`, then put
    /// the position back.
    fn with_stream_at<T>(
        &self,
        stream: &Stream,
        offset: u64,
        op: impl FnOnce(&Stream) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.offset_lock.lock().unwrap_or_else(|e| e.into_inner());
        let saved = stream.position()?;
        stream.seek(SeekFrom::Start(offset))?;
        let result = op(stream);
        let restored = stream.seek(SeekFrom::Start(saved));
        match (result, restored) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err.into()),
        }
    }

    fn reset(&mut self) {
        self.descriptor = INVALID_DESCRIPTOR;
        self.own_descriptor = false;
        self.stream = None;
        self.own_stream = false;
        self.options = OpenOptions::empty();
        self.classifier.reset();
    }
}

/// Call `write` until all of `buf` is transferred.
fn write_fully(buf: &[u8], mut write: impl FnMut(&[u8]) -> io::Result<usize>) -> Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        let n = write(&buf[written..])?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero).into());
        }
        written += n;
    }
    Ok(written)
}

impl Default for DualResourceFile {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHandle for DualResourceFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.descriptor_is_valid() {
            return Ok(sys::read(self.descriptor, buf)?);
        }
        match self.open_stream() {
            Some(stream) => Ok(stream.read(buf)?),
            None => Err(FileError::InvalidHandle),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.descriptor_is_valid() {
            let fd = self.descriptor;
            return write_fully(buf, |chunk| sys::write(fd, chunk));
        }
        match self.open_stream() {
            Some(stream) => write_fully(buf, |chunk| stream.write(chunk)),
            None => Err(FileError::InvalidHandle),
        }
    }

    fn is_valid(&self) -> bool {
        self.descriptor_is_valid() || self.stream_is_valid()
    }

    fn close(&mut self) -> Result<()> {
        if !self.is_valid() {
            self.reset();
            return Ok(());
        }
        let mut first_error: Option<FileError> = None;
        let mut released_fd = INVALID_DESCRIPTOR;

        if let Some(stream) = self.stream.take() {
            let fd = stream.descriptor();
            let result = if self.own_stream {
                if stream.owns_descriptor() {
                    released_fd = fd;
                }
                stream.close()
            } else if stream.is_open() {
                stream.flush()
            } else {
                Ok(())
            };
            if let Err(err) = result {
                first_error.get_or_insert(err.into());
            }
        }

        if self.descriptor_is_valid() && self.own_descriptor {
            if self.descriptor == released_fd {
                tracing::trace!(fd = self.descriptor, "descriptor released with its stream");
            } else if let Err(err) = sys::close(self.descriptor) {
                first_error.get_or_insert(err.into());
            }
        }

        tracing::debug!(
            fd = self.descriptor,
            failed = first_error.is_some(),
            "file handle closed"
        );
        self.reset();
        first_error.map_or(Ok(()), Err)
    }

    fn waitable_handle(&self) -> WaitableHandle {
        let fd = self.descriptor();
        if descriptor_is_valid(fd) {
            fd
        } else {
            INVALID_WAITABLE_HANDLE
        }
    }

    fn file_spec(&self) -> Result<PathBuf> {
        let fd = self.descriptor();
        if !descriptor_is_valid(fd) {
            return Err(self.missing("file_spec"));
        }
        sys::descriptor_path(fd).ok_or(FileError::unsupported("file_spec"))
    }

    fn take_stream_and_clear(&mut self) -> Option<Stream> {
        let stream = self.stream.take()?;
        if self.own_descriptor {
            if self.descriptor == stream.descriptor() {
                stream.adopt_descriptor();
            } else if let Err(err) = sys::close(self.descriptor) {
                tracing::warn!(fd = self.descriptor, error = %err, "descriptor release failed during stream extraction");
            }
        }
        tracing::debug!(fd = stream.descriptor(), "stream extracted");
        self.reset();
        Some(stream)
    }

    fn descriptor(&self) -> RawDescriptor {
        if self.descriptor_is_valid() {
            return self.descriptor;
        }
        self.stream
            .as_ref()
            .map_or(INVALID_DESCRIPTOR, Stream::descriptor)
    }

    fn stream(&mut self) -> Option<Stream> {
        if !self.stream_is_valid() && self.descriptor_is_valid() {
            self.options.to_mode()?;
            let stream = Stream::from_descriptor(self.descriptor, self.options, self.own_descriptor);
            tracing::debug!(
                fd = self.descriptor,
                transferred = self.own_descriptor,
                "stream created over descriptor"
            );
            self.own_descriptor = false;
            self.own_stream = true;
            self.stream = Some(stream);
        }
        self.open_stream().cloned()
    }

    fn seek_from_start(&mut self, offset: u64) -> Result<u64> {
        self.seek(SeekFrom::Start(offset))
    }

    fn seek_from_current(&mut self, offset: i64) -> Result<u64> {
        self.seek(SeekFrom::Current(offset))
    }

    fn seek_from_end(&mut self, offset: i64) -> Result<u64> {
        self.seek(SeekFrom::End(offset))
    }

    fn read_at(&self, buf: &mut [u8], offset: &mut u64) -> Result<usize> {
        let n = if self.descriptor_is_valid() {
            sys::pread(self.descriptor, buf, *offset)?
        } else if let Some(stream) = self.open_stream() {
            self.with_stream_at(stream, *offset, |s| Ok(s.read(buf)?))?
        } else {
            return Err(FileError::InvalidHandle);
        };
        *offset += n as u64;
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: &mut u64) -> Result<usize> {
        let n = if self.descriptor_is_valid() {
            let fd = self.descriptor;
            let start = *offset;
            let mut done = 0u64;
            write_fully(buf, |chunk| {
                let n = sys::pwrite(fd, chunk, start + done)?;
                done += n as u64;
                Ok(n)
            })?
        } else if let Some(stream) = self.open_stream() {
            self.with_stream_at(stream, *offset, |s| write_fully(buf, |chunk| s.write(chunk)))?
        } else {
            return Err(FileError::InvalidHandle);
        };
        *offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        match self.open_stream() {
            Some(stream) => Ok(stream.flush()?),
            None if self.descriptor_is_valid() => Ok(()),
            None => Err(FileError::InvalidHandle),
        }
    }

    fn sync(&mut self) -> Result<()> {
        if let Some(stream) = self.open_stream() {
            stream.flush()?;
        }
        let fd = self.descriptor();
        if !descriptor_is_valid(fd) {
            return Err(self.missing("sync"));
        }
        Ok(sys::fsync(fd)?)
    }

    fn classifier(&self) -> &TerminalClassifier {
        &self.classifier
    }
}

impl Drop for DualResourceFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "file release failed during drop");
        }
    }
}

impl fmt::Debug for DualResourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualResourceFile")
            .field("descriptor", &self.descriptor)
            .field("own_descriptor", &self.own_descriptor)
            .field("stream", &self.stream)
            .field("own_stream", &self.own_stream)
            .field("options", &self.options)
            .field("classifier", &self.classifier)
            .finish()
    }
}

impl io::Read for DualResourceFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(FileHandle::read(self, buf)?)
    }
}

impl io::Write for DualResourceFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FileHandle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(FileHandle::flush(self)?)
    }
}
