//! Property-based tests for positioned I/O and mode parsing.
//!
//! 1. `read_at` returns exactly the bytes in range and leaves the implicit
//!    position alone, for descriptor-backed and stream-backed handles.
//! 2. `write_at` followed by `read_at` observes the written bytes.
//! 3. Every recognized mode round-trips through `to_mode` to an equivalent
//!    option set; everything else is rejected.

use std::io::{self, SeekFrom};
use std::os::fd::IntoRawFd;

use hostfile::{DualResourceFile, FileError, FileHandle, OpenOptions, Stream};
use proptest::prelude::*;

const LEN: usize = 512;

fn contents() -> Vec<u8> {
    (0..LEN).map(|i| (i * 7 % 256) as u8).collect()
}

fn backing_fd(data: &[u8]) -> i32 {
    let mut file = tempfile::tempfile().unwrap();
    io::Write::write_all(&mut file, data).unwrap();
    io::Seek::seek(&mut file, SeekFrom::Start(0)).unwrap();
    file.into_raw_fd()
}

fn handle(data: &[u8], via_stream: bool, capacity: usize) -> DualResourceFile {
    let rw = OpenOptions::READ | OpenOptions::WRITE;
    let fd = backing_fd(data);
    if via_stream {
        DualResourceFile::from_stream(Stream::with_capacity(fd, rw, true, capacity), true)
    } else {
        DualResourceFile::from_descriptor(fd, rw, true)
    }
}

fn range_strategy() -> impl Strategy<Value = (usize, usize)> {
    (0..LEN).prop_flat_map(|start| (Just(start), 0..=(LEN - start)))
}

// ═════════════════════════════════════════════════════════════════════════
// 1. read_at is exact and position-neutral
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn read_at_is_exact(
        (start, len) in range_strategy(),
        cursor in 0..LEN as u64,
        via_stream in any::<bool>(),
        capacity in 1usize..1024,
    ) {
        let data = contents();
        let mut file = handle(&data, via_stream, capacity);
        file.seek_from_start(cursor).unwrap();

        let mut buf = vec![0u8; len];
        let mut offset = start as u64;
        let mut filled = 0;
        while filled < len {
            let n = file.read_at(&mut buf[filled..], &mut offset).unwrap();
            prop_assert!(n > 0, "premature end at offset {}", offset);
            filled += n;
        }

        prop_assert_eq!(&buf[..], &data[start..start + len]);
        prop_assert_eq!(offset, (start + len) as u64);
        prop_assert_eq!(file.seek_from_current(0).unwrap(), cursor);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. write_at is visible to read_at
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn write_at_then_read_at(
        start in 0..LEN as u64,
        payload in proptest::collection::vec(any::<u8>(), 1..64),
        via_stream in any::<bool>(),
    ) {
        let data = contents();
        let file = handle(&data, via_stream, 32);

        let mut offset = start;
        prop_assert_eq!(file.write_at(&payload, &mut offset).unwrap(), payload.len());
        prop_assert_eq!(offset, start + payload.len() as u64);

        let mut back = vec![0u8; payload.len()];
        let mut offset = start;
        let mut filled = 0;
        while filled < back.len() {
            filled += file.read_at(&mut back[filled..], &mut offset).unwrap();
        }
        prop_assert_eq!(back, payload);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Mode strings
// ═════════════════════════════════════════════════════════════════════════

const MODES: &[&str] = &[
    "r", "rb", "w", "wb", "a", "ab", "r+", "rb+", "r+b", "w+", "wb+", "w+b", "a+", "ab+", "a+b",
];

proptest! {
    #[test]
    fn recognized_modes_round_trip(idx in 0..MODES.len()) {
        let opts = OpenOptions::from_mode(MODES[idx]).unwrap();
        let canonical = opts.to_mode().unwrap();
        prop_assert_eq!(OpenOptions::from_mode(canonical).unwrap(), opts);
    }

    #[test]
    fn unknown_modes_are_rejected(mode in "[rwab+x]{0,4}") {
        prop_assume!(!MODES.contains(&mode.as_str()));
        prop_assert!(matches!(
            OpenOptions::from_mode(&mode),
            Err(FileError::InvalidArgument(_))
        ));
    }
}
