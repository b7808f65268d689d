//! Content hashing and copy verification.
//!
//! Files are streamed through the hasher in fixed 64 KiB chunks, so memory
//! use does not grow with file size.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::error::EngineError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// SHA-256 (cryptographic, 256-bit)
    #[default]
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl ChecksumAlgorithm {
    /// Parse algorithm from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Some(Self::Sha256),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Incremental hasher over a byte stream.
pub trait ChecksumHasher {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> ChecksumValue;
}

struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let Self { hasher } = *self;
        let digest = hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute the checksum of a file by streaming it in chunks.
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    let read_err = |source| EngineError::ReadError {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Outcome of comparing a source file with its copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Match(ChecksumValue),
    Mismatch {
        source: ChecksumValue,
        destination: ChecksumValue,
    },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match(_))
    }
}

/// Hash both files and compare digests.
///
/// A mismatch is a normal outcome; only a failure to hash either side is an
/// error.
pub fn compare_files(
    source: &Path,
    destination: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<Verification, EngineError> {
    let src = compute_file_checksum(source, algorithm)?;
    let dst = compute_file_checksum(destination, algorithm)?;

    if src == dst {
        Ok(Verification::Match(src))
    } else {
        Ok(Verification::Mismatch {
            source: src,
            destination: dst,
        })
    }
}

/// Returns true only when both files hash to the same digest.
///
/// Digest mismatch and hashing failures both yield false.
pub fn verify_copy(source: &Path, destination: &Path, algorithm: ChecksumAlgorithm) -> bool {
    match compare_files(source, destination, algorithm) {
        Ok(Verification::Match(_)) => true,
        Ok(Verification::Mismatch { .. }) => {
            warn!(
                source = %source.display(),
                destination = %destination.display(),
                "Hash mismatch"
            );
            false
        }
        Err(e) => {
            warn!(error = %e, "Could not verify copy");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!(ChecksumAlgorithm::from_name("SHA256"), Some(ChecksumAlgorithm::Sha256));
        assert_eq!(ChecksumAlgorithm::from_name("blake3"), Some(ChecksumAlgorithm::Blake3));
        assert_eq!(ChecksumAlgorithm::from_name("md4"), None);
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Sha256);
    }

    #[test]
    fn test_sha256_hasher() {
        let mut hasher = create_hasher(ChecksumAlgorithm::Sha256);
        hasher.update(b"hello");
        let checksum = hasher.finalize();
        assert_eq!(checksum.algorithm(), ChecksumAlgorithm::Sha256);
        assert_eq!(
            checksum.hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_blake3_matches_one_shot_hash() {
        let mut hasher = create_hasher(ChecksumAlgorithm::Blake3);
        hasher.update(b"hel");
        hasher.update(b"lo");
        let checksum = hasher.finalize();
        assert_eq!(checksum.hex(), blake3::hash(b"hello").to_hex().as_str());
    }

    #[test]
    fn test_file_checksum_spans_multiple_chunks() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).expect("Failed to write file");

        let checksum =
            compute_file_checksum(&path, ChecksumAlgorithm::Blake3).expect("Failed to hash");
        assert_eq!(checksum.hex(), blake3::hash(&data).to_hex().as_str());
    }

    #[test]
    fn test_verify_copy_matching_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.txt");
        let dst = temp_dir.path().join("dest.txt");
        fs::write(&src, b"identical content").expect("Failed to write source");
        fs::write(&dst, b"identical content").expect("Failed to write dest");

        assert!(verify_copy(&src, &dst, ChecksumAlgorithm::Sha256));
    }

    #[test]
    fn test_verify_copy_mismatched_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.txt");
        let dst = temp_dir.path().join("dest.txt");
        fs::write(&src, b"source content").expect("Failed to write source");
        fs::write(&dst, b"different content").expect("Failed to write dest");

        let outcome = compare_files(&src, &dst, ChecksumAlgorithm::Sha256)
            .expect("Comparison should succeed even with mismatch");
        assert!(!outcome.is_match());
        assert!(!verify_copy(&src, &dst, ChecksumAlgorithm::Sha256));
    }

    #[test]
    fn test_verify_copy_missing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.txt");
        fs::write(&src, b"content").expect("Failed to write source");
        let dst = temp_dir.path().join("missing.txt");

        assert!(compare_files(&src, &dst, ChecksumAlgorithm::Sha256).is_err());
        assert!(!verify_copy(&src, &dst, ChecksumAlgorithm::Sha256));
    }
}
