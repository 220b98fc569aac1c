//! Host file abstraction.
//!
//! A uniform handle over OS descriptors and buffered streams, so callers can
//! do I/O against program files, terminals and pipes without knowing which
//! kind of resource backs them.
//!
//! - [`handle::FileHandle`]: the capability contract.
//! - [`native::DualResourceFile`]: descriptor and/or stream, with
//!   per-resource ownership.
//! - [`stream::Stream`]: buffered stream over a descriptor.
//! - [`terminal`]: cached interactive / real-terminal / color answers.
//! - [`open_options::OpenOptions`]: open flags with a fixed bit layout.
//! - [`shared::SharedFile`]: cloneable facade over any handle.
//!
//! # Example
//!
//! ```no_run
//! use hostfile::{DualResourceFile, FileHandle, OpenOptions};
//!
//! let mut file = DualResourceFile::open("/tmp/log.txt", OpenOptions::from_mode("w+")?, 0o644)?;
//! file.write(b"hello")?;
//! file.seek_from_start(0)?;
//! let mut buf = [0u8; 5];
//! file.read(&mut buf)?;
//! file.close()?;
//! # Ok::<(), hostfile::FileError>(())
//! ```

#![cfg(unix)]
#![deny(unsafe_code)]

pub mod error;
pub mod handle;
pub mod native;
pub mod open_options;
pub mod shared;
pub mod stream;
pub mod sys;
pub mod terminal;

pub use error::{FileError, Result};
pub use handle::{FileHandle, INVALID_WAITABLE_HANDLE, WaitableHandle};
pub use native::DualResourceFile;
pub use open_options::OpenOptions;
pub use shared::SharedFile;
pub use stream::{Stream, stream_is_valid};
pub use sys::{INVALID_DESCRIPTOR, RawDescriptor, descriptor_is_valid};
pub use terminal::{ColorEnv, HostTerminalProbe, LazyBool, TerminalClassifier, TerminalProbe};
