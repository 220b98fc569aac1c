#![forbid(unsafe_code)]

//! Reference-counted facade over any [`FileHandle`].
//!
//! [`SharedFile`] is the object handed across API boundaries: cheap to clone,
//! possibly empty, and agnostic to the handle kind behind it. Clones share
//! one handle; closing through any clone closes it for all.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{FileError, Result};
use crate::handle::FileHandle;
use crate::native::DualResourceFile;
use crate::open_options::OpenOptions;
use crate::stream::Stream;
use crate::sys::RawDescriptor;

type SharedHandle = Arc<Mutex<Box<dyn FileHandle>>>;

/// Cloneable handle to a shared file, or to nothing.
#[derive(Clone, Default)]
pub struct SharedFile {
    inner: Option<SharedHandle>,
}

impl SharedFile {
    /// An empty facade; I/O fails with `InvalidHandle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing handle.
    #[must_use]
    pub fn from_handle(handle: impl FileHandle + 'static) -> Self {
        let handle: Box<dyn FileHandle> = Box::new(handle);
        Self {
            inner: Some(Arc::new(Mutex::new(handle))),
        }
    }

    /// Share a stream.
    #[must_use]
    pub fn from_stream(stream: Stream, transfer_ownership: bool) -> Self {
        Self::from_handle(DualResourceFile::from_stream(stream, transfer_ownership))
    }

    /// Share a descriptor, recording `mode` as its open options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `mode` is not a recognized mode string.
    pub fn from_descriptor(fd: RawDescriptor, mode: &str, transfer_ownership: bool) -> Result<Self> {
        let options = OpenOptions::from_mode(mode)?;
        Ok(Self::from_handle(DualResourceFile::from_descriptor(
            fd,
            options,
            transfer_ownership,
        )))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn FileHandle>>> {
        let inner = self.inner.as_ref().ok_or(FileError::InvalidHandle)?;
        Ok(inner.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Read up to `buf.len()` bytes at the implicit position.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.lock()?.read(buf)
    }

    /// Write all of `buf` at the implicit position.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.lock()?.write(buf)
    }

    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush()
    }

    /// Close the shared handle for every clone. An empty facade has nothing
    /// to close.
    pub fn close(&self) -> Result<()> {
        match self.lock() {
            Ok(mut handle) => handle.close(),
            Err(_) => Ok(()),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lock().is_ok_and(|handle| handle.is_valid())
    }

    /// Run `f` against the underlying handle.
    pub fn with_handle<T>(&self, f: impl FnOnce(&mut dyn FileHandle) -> T) -> Result<T> {
        let mut guard = self.lock()?;
        Ok(f(&mut **guard))
    }
}

impl fmt::Debug for SharedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFile")
            .field("valid", &self.is_valid())
            .finish()
    }
}
