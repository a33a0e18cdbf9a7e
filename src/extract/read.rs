//! Budgeted streaming reads with blake3 hashing.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use blake3::Hasher;

use super::{Budget, Failure, FailureKind};

const CHUNK: usize = 64 * 1024;

/// Result of [`read_hashed`].
#[derive(Debug, Clone)]
pub struct HashedRead {
    /// Leading bytes kept for parsing.
    pub bytes: Vec<u8>,
    /// blake3 hex digest of the whole file.
    pub hash: String,
    /// Total bytes read.
    pub total: u64,
}

impl HashedRead {
    /// Whether bytes were read past the kept prefix.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.total > self.bytes.len() as u64
    }
}

/// Read a whole file, hashing every byte and keeping the first `keep` bytes.
///
/// # Errors
///
/// Returns [`FailureKind::Io`] on read errors and
/// [`FailureKind::ResourceExceeded`] if the file grows past the budget's size
/// or the read outlives its deadline.
pub fn read_hashed(path: &Path, keep: usize, budget: &Budget) -> Result<HashedRead, Failure> {
    let deadline = budget.deadline();
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    let mut bytes = Vec::new();
    let mut total: u64 = 0;
    let mut buf = vec![0u8; CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }

        total += n as u64;
        if total > budget.max_size {
            return Err(Failure::new(
                FailureKind::ResourceExceeded,
                format!("read more than {} bytes", budget.max_size),
            ));
        }
        if Instant::now() > deadline {
            return Err(Failure::new(
                FailureKind::ResourceExceeded,
                format!("read exceeded {:?}", budget.timeout),
            ));
        }

        hasher.update(&buf[..n]);
        let room = keep.saturating_sub(bytes.len());
        bytes.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok(HashedRead {
        bytes,
        hash: hasher.finalize().to_hex().to_string(),
        total,
    })
}

/// Hash a file without keeping any content.
///
/// # Errors
///
/// Same as [`read_hashed`].
pub fn hash_file(path: &Path, budget: &Budget) -> Result<String, Failure> {
    read_hashed(path, 0, budget).map(|r| r.hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn budget(max: u64) -> Budget {
        Budget::new(max, Duration::from_secs(10))
    }

    #[test]
    fn test_hash_matches_blake3() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, b"hello").unwrap();

        let read = read_hashed(&path, 1024, &budget(1024)).unwrap();
        assert_eq!(read.hash, blake3::hash(b"hello").to_hex().to_string());
        assert_eq!(read.bytes, b"hello");
        assert_eq!(read.total, 5);
        assert!(!read.truncated());
    }

    #[test]
    fn test_keep_prefix_but_hash_everything() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        let data = vec![7u8; 200_000];
        fs::write(&path, &data).unwrap();

        let read = read_hashed(&path, 10, &budget(1_000_000)).unwrap();
        assert_eq!(read.bytes.len(), 10);
        assert_eq!(read.total, 200_000);
        assert!(read.truncated());
        assert_eq!(read.hash, blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn test_size_budget_exceeded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, vec![1u8; 100]).unwrap();

        let err = read_hashed(&path, 100, &budget(50)).unwrap_err();
        assert_eq!(err.kind, FailureKind::ResourceExceeded);
    }

    #[test]
    fn test_missing_file_is_io() {
        let tmp = TempDir::new().unwrap();
        let err = hash_file(&tmp.path().join("missing"), &budget(10)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Io);
    }
}
