//! SHA-256 checksum gate.
//!
//! Every stage of the install pipeline asks this module whether work can be
//! skipped: a cached download, an installed payload and a patched executable
//! are all accepted or rejected by comparing digests.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Errors raised while hashing or verifying files.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// The file could not be opened or read.
    #[error("failed to read {} for checksum: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file's digest differs from the expected one.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .file.display())]
    Mismatch {
        file: PathBuf,
        expected: Digest,
        actual: Digest,
    },
}

/// A lowercase hexadecimal SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// Wrap a digest string, normalizing case and surrounding whitespace.
    pub fn new(hex: impl AsRef<str>) -> Self {
        Self(hex.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(hex: &str) -> Self {
        Self::new(hex)
    }
}

impl From<String> for Digest {
    fn from(hex: String) -> Self {
        Self::new(hex)
    }
}

/// One side of a checksum comparison: a known digest or a file to hash.
#[derive(Debug, Clone, Copy)]
pub enum ChecksumSource<'a> {
    Digest(&'a Digest),
    File(&'a Path),
}

impl ChecksumSource<'_> {
    /// Resolve this source to a digest, hashing the file if needed.
    pub fn digest(&self) -> Result<Digest, ChecksumError> {
        match self {
            Self::Digest(digest) => Ok((*digest).clone()),
            Self::File(path) => hash(path),
        }
    }
}

impl<'a> From<&'a Digest> for ChecksumSource<'a> {
    fn from(digest: &'a Digest) -> Self {
        Self::Digest(digest)
    }
}

impl<'a> From<&'a Path> for ChecksumSource<'a> {
    fn from(path: &'a Path) -> Self {
        Self::File(path)
    }
}

impl<'a> From<&'a PathBuf> for ChecksumSource<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Self::File(path.as_path())
    }
}

/// Calculate the SHA-256 digest of a file's full byte stream.
///
/// # Errors
///
/// Returns [`ChecksumError::Read`] if the file cannot be opened or read.
pub fn hash(path: &Path) -> Result<Digest, ChecksumError> {
    let read_err = |source| ChecksumError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let digest = Digest(format!("{:x}", hasher.finalize()));
    tracing::trace!(path = %path.display(), %digest, "Calculated checksum");
    Ok(digest)
}

/// Compare two checksum sources, hashing whichever side is a file.
pub fn matches<'a, 'b>(
    a: impl Into<ChecksumSource<'a>>,
    b: impl Into<ChecksumSource<'b>>,
) -> Result<bool, ChecksumError> {
    let a = a.into().digest()?;
    let b = b.into().digest()?;
    let equal = a == b;
    if equal {
        tracing::trace!(digest = %a, "Checksum match");
    } else {
        tracing::trace!(left = %a, right = %b, "Checksum mismatch");
    }
    Ok(equal)
}

/// Verify that a file matches an expected digest.
///
/// # Errors
///
/// Returns [`ChecksumError::Mismatch`] carrying both digests when they differ.
pub fn verify(path: &Path, expected: &Digest) -> Result<(), ChecksumError> {
    let actual = hash(path)?;
    if &actual != expected {
        return Err(ChecksumError::Mismatch {
            file: path.to_path_buf(),
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_hash_known_content() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();

        assert_eq!(hash(&file_path).unwrap().as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_hash_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");
        fs::write(&file_path, b"").unwrap();

        assert_eq!(
            hash(&file_path).unwrap().as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_larger_than_buffer() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");
        fs::write(&file_path, vec![0xABu8; BUFFER_SIZE * 2 + 17]).unwrap();

        assert_eq!(hash(&file_path).unwrap(), hash(&file_path).unwrap());
    }

    #[test]
    fn test_hash_nonexistent_file() {
        let result = hash(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(ChecksumError::Read { .. })));
    }

    #[test]
    fn test_digest_normalizes_case() {
        assert_eq!(Digest::new("  ABCDEF \n"), Digest::new("abcdef"));
    }

    #[test]
    fn test_matches_file_against_digest() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();
        let expected = Digest::new(HELLO_WORLD.to_uppercase());

        assert!(matches(file_path.as_path(), &expected).unwrap());
        assert!(!matches(file_path.as_path(), &Digest::new("deadbeef")).unwrap());
    }

    #[test]
    fn test_matches_two_files() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        let c = temp.path().join("c");
        fs::write(&a, b"same").unwrap();
        fs::write(&b, b"same").unwrap();
        fs::write(&c, b"different").unwrap();

        assert!(matches(&a, &b).unwrap());
        assert!(!matches(&a, &c).unwrap());
    }

    #[test]
    fn test_verify_mismatch_reports_both_digests() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();

        let err = verify(&file_path, &Digest::new("wrong_checksum")).unwrap_err();
        match &err {
            ChecksumError::Mismatch {
                file,
                expected,
                actual,
            } => {
                assert_eq!(file, &file_path);
                assert_eq!(expected.as_str(), "wrong_checksum");
                assert_eq!(actual.as_str(), HELLO_WORLD);
            }
            other => panic!("Expected Mismatch, got {other:?}"),
        }
        assert!(err.to_string().contains("wrong_checksum"));
    }

    #[test]
    fn test_verify_match() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();

        assert!(verify(&file_path, &Digest::new(HELLO_WORLD)).is_ok());
    }
}
