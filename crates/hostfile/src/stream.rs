#![forbid(unsafe_code)]

//! Buffered byte stream over a raw descriptor.
//!
//! A [`Stream`] is a shared handle: clones refer to the same buffers and the
//! same descriptor, and every operation takes the stream's internal lock, so
//! a single call is atomic with respect to other clones. Sequences of calls
//! (seek then read) are not.
//!
//! # Buffering
//!
//! - Reads fill a read-ahead buffer of `capacity` bytes; requests at least
//!   that large bypass it.
//! - Writes accumulate until the buffer would overflow, then flush.
//! - Switching from reading to writing gives unread read-ahead back by
//!   seeking the descriptor to the logical position.
//! - Seeking flushes pending writes and drops read-ahead.
//!
//! # Ownership
//!
//! A stream built with `transfer_ownership = true` releases its descriptor on
//! [`Stream::close`] or when the last clone drops. Otherwise the descriptor is
//! only flushed to and forgotten.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;
use crate::open_options::OpenOptions;
use crate::sys::{self, INVALID_DESCRIPTOR, RawDescriptor, descriptor_is_valid};

/// Default user-space buffer size.
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Permissions for files created by [`Stream::open`], before the umask.
const DEFAULT_CREATE_PERMISSIONS: u32 = 0o666;

struct StreamState {
    fd: RawDescriptor,
    owns_descriptor: bool,
    options: OpenOptions,
    capacity: usize,
    read_ahead: Vec<u8>,
    read_pos: usize,
    pending: Vec<u8>,
}

impl StreamState {
    fn ensure_open(&self) -> io::Result<()> {
        if descriptor_is_valid(self.fd) {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::EBADF))
        }
    }

    fn unread(&self) -> usize {
        self.read_ahead.len() - self.read_pos
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        while !self.pending.is_empty() {
            let n = sys::write(self.fd, &self.pending)?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            self.pending.drain(..n);
        }
        Ok(())
    }

    /// Hand unread read-ahead back to the descriptor so the next write lands
    /// at the logical position.
    fn give_back_read_ahead(&mut self) -> io::Result<()> {
        let unread = self.unread();
        self.read_ahead.clear();
        self.read_pos = 0;
        if unread == 0 {
            return Ok(());
        }
        match sys::seek(self.fd, SeekFrom::Current(-(unread as i64))) {
            Ok(_) => Ok(()),
            // Pipes and terminals cannot rewind; the bytes are simply dropped.
            Err(err) if err.raw_os_error() == Some(libc::ESPIPE) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.flush_pending()?;

        if self.unread() == 0 {
            if buf.len() >= self.capacity {
                return sys::read(self.fd, buf);
            }
            self.read_ahead.resize(self.capacity, 0);
            self.read_pos = 0;
            match sys::read(self.fd, &mut self.read_ahead) {
                Ok(n) => self.read_ahead.truncate(n),
                Err(err) => {
                    self.read_ahead.clear();
                    return Err(err);
                }
            }
        }

        let available = &self.read_ahead[self.read_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.give_back_read_ahead()?;

        if self.pending.len() + buf.len() > self.capacity {
            self.flush_pending()?;
        }
        if buf.len() >= self.capacity {
            let mut written = 0;
            while written < buf.len() {
                let n = sys::write(self.fd, &buf[written..])?;
                if n == 0 {
                    return Err(io::ErrorKind::WriteZero.into());
                }
                written += n;
            }
            return Ok(written);
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.ensure_open()?;
        self.flush_pending()?;
        let pos = match pos {
            SeekFrom::Current(n) => i64::try_from(self.unread())
                .ok()
                .and_then(|unread| n.checked_sub(unread))
                .map(SeekFrom::Current)
                .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?,
            other => other,
        };
        self.read_ahead.clear();
        self.read_pos = 0;
        sys::seek(self.fd, pos)
    }

    fn close(&mut self) -> io::Result<()> {
        if !descriptor_is_valid(self.fd) {
            return Ok(());
        }
        let flushed = self.flush_pending();
        self.pending.clear();
        self.read_ahead.clear();
        self.read_pos = 0;

        let fd = std::mem::replace(&mut self.fd, INVALID_DESCRIPTOR);
        let released = if self.owns_descriptor {
            sys::close(fd)
        } else {
            Ok(())
        };
        self.owns_descriptor = false;
        flushed.and(released)
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "stream release failed during drop");
        }
    }
}

/// Shared, internally locked, buffered stream.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Mutex<StreamState>>,
}

impl Stream {
    /// Wrap `fd` in a stream with the default buffer size.
    #[must_use]
    pub fn from_descriptor(fd: RawDescriptor, options: OpenOptions, transfer_ownership: bool) -> Self {
        Self::with_capacity(fd, options, transfer_ownership, DEFAULT_CAPACITY)
    }

    /// Wrap `fd` in a stream buffering up to `capacity` bytes.
    #[must_use]
    pub fn with_capacity(
        fd: RawDescriptor,
        options: OpenOptions,
        transfer_ownership: bool,
        capacity: usize,
    ) -> Self {
        tracing::debug!(fd, owned = transfer_ownership, capacity, "stream created");
        Self {
            inner: Arc::new(Mutex::new(StreamState {
                fd,
                owns_descriptor: transfer_ownership && descriptor_is_valid(fd),
                options,
                capacity: capacity.max(1),
                read_ahead: Vec::new(),
                read_pos: 0,
                pending: Vec::new(),
            })),
        }
    }

    /// Open `path` with an `fopen`-style mode string.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` for a bad mode, or `Io` if the open fails.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let options = OpenOptions::from_mode(mode)?;
        let fd = sys::open(path.as_ref(), options, DEFAULT_CREATE_PERMISSIONS)?;
        Ok(Self::from_descriptor(fd, options, true))
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read up to `buf.len()` bytes. Zero means end of stream.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.state().read(buf)
    }

    /// Buffer `buf` for writing, flushing as needed.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.state().write(buf)
    }

    /// Push buffered writes to the descriptor.
    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.flush_pending()
    }

    /// Reposition the stream, returning the new absolute offset.
    pub fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.state().seek(pos)
    }

    /// Logical position, accounting for buffered bytes.
    pub fn position(&self) -> io::Result<u64> {
        self.seek(SeekFrom::Current(0))
    }

    /// Flush buffered writes, then the kernel's buffers.
    pub fn sync(&self) -> io::Result<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.flush_pending()?;
        sys::fsync(state.fd)
    }

    /// Flush and release the descriptor if owned. Closing again is a no-op.
    pub fn close(&self) -> io::Result<()> {
        self.state().close()
    }

    /// Underlying descriptor, or the invalid sentinel once closed.
    #[must_use]
    pub fn descriptor(&self) -> RawDescriptor {
        self.state().fd
    }

    /// Whether closing the stream releases its descriptor.
    #[must_use]
    pub fn owns_descriptor(&self) -> bool {
        self.state().owns_descriptor
    }

    /// Make closing the stream release its descriptor.
    pub(crate) fn adopt_descriptor(&self) {
        let mut state = self.state();
        state.owns_descriptor = descriptor_is_valid(state.fd);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        descriptor_is_valid(self.state().fd)
    }

    #[must_use]
    pub fn options(&self) -> OpenOptions {
        self.state().options
    }

    /// True when both handles share the same stream state.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Stream")
            .field("fd", &state.fd)
            .field("owns_descriptor", &state.owns_descriptor)
            .field("options", &state.options)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Stream::read(self, buf)
    }
}

impl io::Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Stream::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Stream::flush(self)
    }
}

impl io::Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Stream::seek(self, pos)
    }
}

/// True when `stream` names an open stream; `None` is the invalid sentinel.
#[must_use]
pub fn stream_is_valid(stream: Option<&Stream>) -> bool {
    stream.is_some_and(Stream::is_open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn temp_stream(capacity: usize) -> (tempfile::TempDir, std::path::PathBuf, Stream) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.bin");
        let options = OpenOptions::from_mode("w+").unwrap();
        let fd = sys::open(&path, options, 0o600).unwrap();
        let stream = Stream::with_capacity(fd, options, true, capacity);
        (dir, path, stream)
    }

    #[test]
    fn writes_stay_buffered_until_flush() {
        let (_dir, path, stream) = temp_stream(64);
        stream.write(b"abc").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"");
        stream.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn overflowing_buffer_flushes() {
        let (_dir, path, stream) = temp_stream(4);
        stream.write(b"abc").unwrap();
        stream.write(b"de").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        stream.write(b"0123456789").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcde0123456789");
    }

    #[test]
    fn position_accounts_for_buffers() {
        let (_dir, _path, stream) = temp_stream(16);
        stream.write(b"hello world").unwrap();
        assert_eq!(stream.position().unwrap(), 11);

        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 2];
        stream.read(&mut buf).unwrap();
        assert_eq!(&buf, b"he");
        assert_eq!(stream.position().unwrap(), 2);
    }

    #[test]
    fn write_after_read_lands_at_logical_position() {
        let (_dir, path, stream) = temp_stream(16);
        stream.write(b"0123456789").unwrap();
        stream.seek(SeekFrom::Start(0)).unwrap();

        let mut buf = [0u8; 3];
        stream.read(&mut buf).unwrap();
        stream.write(b"xyz").unwrap();
        stream.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"012xyz6789");
    }

    #[test]
    fn read_returns_zero_at_end() {
        let (_dir, _path, stream) = temp_stream(8);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent_and_invalidates() {
        let (_dir, path, stream) = temp_stream(8);
        stream.write(b"tail").unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(!stream.is_open());
        assert_eq!(stream.descriptor(), INVALID_DESCRIPTOR);
        assert_eq!(std::fs::read(&path).unwrap(), b"tail");

        let err = stream.write(b"more").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn non_owning_close_leaves_descriptor_open() {
        let mut file = tempfile::tempfile().unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
        let stream = Stream::from_descriptor(fd, OpenOptions::WRITE, false);
        stream.write(b"kept").unwrap();
        stream.close().unwrap();

        io::Seek::seek(&mut file, SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        assert_eq!(text, "kept");
    }

    #[test]
    fn last_clone_drop_flushes() {
        let (_dir, path, stream) = temp_stream(64);
        let other = stream.clone();
        assert!(Stream::ptr_eq(&stream, &other));
        other.write(b"dropped").unwrap();
        drop(stream);
        assert_eq!(std::fs::read(&path).unwrap(), b"");
        drop(other);
        assert_eq!(std::fs::read(&path).unwrap(), b"dropped");
    }

    #[test]
    fn open_rejects_bad_mode() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Stream::open(dir.path().join("x"), "rw").is_err());
        assert!(Stream::open(dir.path().join("missing"), "r").is_err());
    }

    #[test]
    fn sentinel_predicate() {
        let (_dir, _path, stream) = temp_stream(8);
        assert!(stream_is_valid(Some(&stream)));
        assert!(!stream_is_valid(None));
        stream.close().unwrap();
        assert!(!stream_is_valid(Some(&stream)));
    }

    #[test]
    fn relative_seek_past_buffered_bytes_does_not_overflow() {
        let (_dir, _path, stream) = temp_stream(16);
        stream.write(b"0123456789").unwrap();
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 2];
        stream.read(&mut buf).unwrap();

        let err = stream.seek(SeekFrom::Current(i64::MIN)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert_eq!(stream.position().unwrap(), 2);
    }

    #[test]
    fn adopted_descriptor_is_released_on_close() {
        use std::os::fd::IntoRawFd;

        let (ours, mut peer) = std::os::unix::net::UnixStream::pair().unwrap();
        let stream = Stream::from_descriptor(ours.into_raw_fd(), OpenOptions::WRITE, false);
        assert!(!stream.owns_descriptor());
        stream.adopt_descriptor();
        assert!(stream.owns_descriptor());

        stream.close().unwrap();
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }
}
