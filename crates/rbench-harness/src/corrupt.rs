//! Deterministic byte-range corruption.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

const MIB: u64 = 1024 * 1024;

/// Upper bound on the fill buffer written per `write_all` call.
const FILL_CHUNK_BYTES: usize = 1024 * 1024;

/// Mutation applied to every working copy: `length` bytes starting at
/// `offset` are overwritten with `fill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptionSpec {
    pub offset: u64,
    pub length: u64,
    pub fill: u8,
}

impl CorruptionSpec {
    #[must_use]
    pub const fn new(offset: u64, length: u64, fill: u8) -> Self {
        Self {
            offset,
            length,
            fill,
        }
    }

    /// Exclusive end of the corrupted range, `None` on overflow.
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Whether the range fits in a file of `file_len` bytes.
    #[must_use]
    pub fn fits(&self, file_len: u64) -> bool {
        self.end().is_some_and(|end| end <= file_len)
    }
}

impl Default for CorruptionSpec {
    /// 1 MiB of zeros at the 50 MiB mark.
    fn default() -> Self {
        Self::new(50 * MIB, MIB, 0x00)
    }
}

/// Overwrite `spec.length` bytes of `path` at `spec.offset` with `spec.fill`.
///
/// Every byte outside the range is left untouched. The file length never
/// changes: a range that does not fit is rejected before anything is written.
pub fn corrupt(path: &Path, spec: &CorruptionSpec) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| BenchError::io("open for corruption", path, err))?;

    let file_len = file
        .metadata()
        .map_err(|err| BenchError::io("stat for corruption", path, err))?
        .len();
    if !spec.fits(file_len) {
        return Err(BenchError::CorruptionOutOfBounds {
            path: path.to_path_buf(),
            offset: spec.offset,
            length: spec.length,
            file_len,
        });
    }

    file.seek(SeekFrom::Start(spec.offset))
        .map_err(|err| BenchError::io("seek for corruption", path, err))?;

    let chunk_len = usize::try_from(spec.length)
        .unwrap_or(usize::MAX)
        .min(FILL_CHUNK_BYTES);
    let chunk = vec![spec.fill; chunk_len];
    let mut remaining = spec.length;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(chunk_len, |r| r.min(chunk_len));
        file.write_all(&chunk[..n])
            .map_err(|err| BenchError::io("write corruption", path, err))?;
        remaining -= n as u64;
    }
    file.flush()
        .map_err(|err| BenchError::io("flush corruption", path, err))?;
    file.sync_all()
        .map_err(|err| BenchError::io("sync corruption", path, err))?;

    trace!(
        target: "rbench::corrupt",
        path = %path.display(),
        offset = spec.offset,
        length = spec.length,
        fill = spec.fill,
        "corruption applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| u8::try_from(i % 251).unwrap_or(0) | 1).collect()
    }

    #[test]
    fn overwrites_exactly_the_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        let original = patterned(4096);
        fs::write(&path, &original).expect("write");

        corrupt(&path, &CorruptionSpec::new(1000, 300, 0x00)).expect("corrupt");

        let after = fs::read(&path).expect("read");
        assert_eq!(after.len(), original.len());
        assert_eq!(&after[..1000], &original[..1000]);
        assert!(after[1000..1300].iter().all(|&b| b == 0x00));
        assert_eq!(&after[1300..], &original[1300..]);
    }

    #[test]
    fn range_ending_at_eof_is_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        fs::write(&path, patterned(64)).expect("write");

        corrupt(&path, &CorruptionSpec::new(48, 16, 0xAB)).expect("corrupt");

        let after = fs::read(&path).expect("read");
        assert_eq!(after.len(), 64);
        assert!(after[48..].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn range_larger_than_chunk_is_fully_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        let len = FILL_CHUNK_BYTES * 2 + 17;
        fs::write(&path, vec![0xFF_u8; len + 10]).expect("write");

        corrupt(&path, &CorruptionSpec::new(5, len as u64, 0x11)).expect("corrupt");

        let after = fs::read(&path).expect("read");
        assert!(after[..5].iter().all(|&b| b == 0xFF));
        assert!(after[5..5 + len].iter().all(|&b| b == 0x11));
        assert!(after[5 + len..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn out_of_bounds_is_rejected_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        let original = patterned(100);
        fs::write(&path, &original).expect("write");

        let err = corrupt(&path, &CorruptionSpec::new(90, 11, 0)).expect_err("out of bounds");
        assert!(
            matches!(err, BenchError::CorruptionOutOfBounds { file_len: 100, .. }),
            "got {err:?}"
        );
        assert_eq!(fs::read(&path).expect("read"), original);
    }

    #[test]
    fn overflowing_range_is_rejected() {
        let spec = CorruptionSpec::new(u64::MAX, 2, 0);
        assert_eq!(spec.end(), None);
        assert!(!spec.fits(u64::MAX));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = corrupt(&dir.path().join("missing"), &CorruptionSpec::new(0, 1, 0))
            .expect_err("missing file");
        assert!(matches!(err, BenchError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn repeated_application_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact");
        fs::write(&path, patterned(2048)).expect("write");
        let spec = CorruptionSpec::new(512, 256, 0x00);

        corrupt(&path, &spec).expect("first");
        let first = fs::read(&path).expect("read");
        corrupt(&path, &spec).expect("second");
        assert_eq!(fs::read(&path).expect("read"), first);
    }

    #[test]
    fn default_matches_fifty_mib_offset_one_mib_zeros() {
        let spec = CorruptionSpec::default();
        assert_eq!(spec.offset, 50 * MIB);
        assert_eq!(spec.length, MIB);
        assert_eq!(spec.fill, 0);
        assert!(spec.fits(100 * MIB));
    }
}
