//! OS primitive layer.
//!
//! Thin wrappers over the host descriptor calls, built on `rustix`. Handles
//! store raw descriptors, so each call borrows one for its own duration
//! through [`borrow`]; that and [`close`] are the only `unsafe` in the crate.
//!
//! Transfers retry on `EINTR` and clamp each call to [`MAX_IO_CHUNK`] bytes.
//! `close` is never retried: on Linux the descriptor is gone even when the
//! call reports `EINTR`.

use std::io::{self, SeekFrom};
use std::os::fd::{BorrowedFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

use rustix::io::Errno;

use crate::open_options::OpenOptions;

/// Raw OS descriptor.
pub type RawDescriptor = RawFd;

/// Sentinel for "no descriptor".
pub const INVALID_DESCRIPTOR: RawDescriptor = -1;

/// Largest byte count handed to a single read/write call. Some hosts reject
/// transfers at or beyond `INT_MAX`.
pub const MAX_IO_CHUNK: usize = i32::MAX as usize;

/// True when `fd` could name an open descriptor.
#[must_use]
pub const fn descriptor_is_valid(fd: RawDescriptor) -> bool {
    fd >= 0
}

/// Borrow `fd` for a single call.
#[allow(unsafe_code)]
fn borrow<'fd>(fd: RawDescriptor) -> io::Result<BorrowedFd<'fd>> {
    if !descriptor_is_valid(fd) {
        return Err(Errno::BADF.into());
    }
    // SAFETY: the borrow never outlives the wrapper call that made it, and
    // nothing closes `fd` through it. A descriptor the owner already released
    // fails inside the kernel with EBADF.
    Ok(unsafe { BorrowedFd::borrow_raw(fd) })
}

fn retry_interrupted<T>(
    fd: RawDescriptor,
    mut call: impl FnMut(BorrowedFd<'_>) -> rustix::io::Result<T>,
) -> io::Result<T> {
    let fd = borrow(fd)?;
    loop {
        match call(fd) {
            Err(err) if err == Errno::INTR => continue,
            other => return other.map_err(io::Error::from),
        }
    }
}

/// Read at the descriptor's current position.
pub fn read(fd: RawDescriptor, buf: &mut [u8]) -> io::Result<usize> {
    let len = buf.len().min(MAX_IO_CHUNK);
    retry_interrupted(fd, |fd| rustix::io::read(fd, &mut buf[..len]))
}

/// Write at the descriptor's current position. May transfer fewer bytes.
pub fn write(fd: RawDescriptor, buf: &[u8]) -> io::Result<usize> {
    let len = buf.len().min(MAX_IO_CHUNK);
    retry_interrupted(fd, |fd| rustix::io::write(fd, &buf[..len]))
}

/// Read at `offset` without moving the descriptor's position.
pub fn pread(fd: RawDescriptor, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let len = buf.len().min(MAX_IO_CHUNK);
    retry_interrupted(fd, |fd| rustix::io::pread(fd, &mut buf[..len], offset))
}

/// Write at `offset` without moving the descriptor's position.
pub fn pwrite(fd: RawDescriptor, buf: &[u8], offset: u64) -> io::Result<usize> {
    let len = buf.len().min(MAX_IO_CHUNK);
    retry_interrupted(fd, |fd| rustix::io::pwrite(fd, &buf[..len], offset))
}

/// Reposition the descriptor, returning the new absolute offset.
pub fn seek(fd: RawDescriptor, pos: SeekFrom) -> io::Result<u64> {
    let pos = match pos {
        SeekFrom::Start(n) => rustix::fs::SeekFrom::Start(n),
        SeekFrom::Current(n) => rustix::fs::SeekFrom::Current(n),
        SeekFrom::End(n) => rustix::fs::SeekFrom::End(n),
    };
    Ok(rustix::fs::seek(borrow(fd)?, pos)?)
}

/// Flush kernel buffers for the descriptor to storage.
pub fn fsync(fd: RawDescriptor) -> io::Result<()> {
    retry_interrupted(fd, |fd| rustix::fs::fsync(fd))
}

/// Release the descriptor.
#[allow(unsafe_code)]
pub fn close(fd: RawDescriptor) -> io::Result<()> {
    if !descriptor_is_valid(fd) {
        return Err(Errno::BADF.into());
    }
    // SAFETY: close takes no pointers; the caller gives up `fd` and never
    // uses it again.
    if unsafe { libc::close(fd) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::Interrupted {
        return Ok(());
    }
    Err(err)
}

/// True when `fd` refers to a terminal (tty or pty).
#[must_use]
pub fn is_terminal(fd: RawDescriptor) -> bool {
    borrow(fd).is_ok_and(rustix::termios::isatty)
}

/// Terminal window size as `(columns, rows)`.
#[must_use]
pub fn window_size(fd: RawDescriptor) -> Option<(u16, u16)> {
    let ws = rustix::termios::tcgetwinsize(borrow(fd).ok()?).ok()?;
    Some((ws.ws_col, ws.ws_row))
}

/// Open `path` and hand back the raw descriptor; the caller owns it.
pub fn open(path: &Path, options: OpenOptions, permissions: u32) -> io::Result<RawDescriptor> {
    let file = options.to_std(permissions).open(path)?;
    Ok(file.into_raw_fd())
}

/// Filesystem path the descriptor refers to, if it names one.
///
/// Pipes, sockets and other anonymous objects resolve to `None`.
#[must_use]
pub fn descriptor_path(fd: RawDescriptor) -> Option<PathBuf> {
    if !descriptor_is_valid(fd) {
        return None;
    }
    descriptor_path_impl(fd)
}

#[cfg(target_os = "linux")]
fn descriptor_path_impl(fd: RawDescriptor) -> Option<PathBuf> {
    let target = std::fs::read_link(format!("/proc/self/fd/{fd}")).ok()?;
    target.is_absolute().then_some(target)
}

#[cfg(not(target_os = "linux"))]
fn descriptor_path_impl(_fd: RawDescriptor) -> Option<PathBuf> {
    None
}
