//! Content fingerprints used to assert byte-exact recovery.
//!
//! The digest is only ever compared for equality within one run, so the
//! algorithm is a configuration choice. BLAKE3 is the default because it keeps
//! hashing a 100 MiB artifact well below the cost of a repair.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// Digest used for fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl DigestAlgorithm {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blake3" => Ok(Self::Blake3),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(BenchError::Config(format!(
                "unknown digest algorithm {other:?} (expected blake3 or sha256)"
            ))),
        }
    }
}

/// Hex digest of a file's full content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

enum StreamHasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl StreamHasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Blake3(hasher) => hex::encode(hasher.finalize().as_bytes()),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Fingerprint an in-memory buffer.
#[must_use]
pub fn fingerprint_bytes(data: &[u8], algorithm: DigestAlgorithm) -> Fingerprint {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(data);
    Fingerprint {
        algorithm,
        hex: hasher.finish_hex(),
    }
}

/// Stream the whole file at `path` through `algorithm`.
pub fn fingerprint(path: &Path, algorithm: DigestAlgorithm) -> Result<Fingerprint> {
    let mut file = File::open(path).map_err(|err| BenchError::io("fingerprint", path, err))?;
    let mut hasher = StreamHasher::new(algorithm);
    let mut buf = vec![0_u8; READ_BUFFER_BYTES];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(BenchError::io("fingerprint", path, err)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint {
        algorithm,
        hex: hasher.finish_hex(),
    })
}

/// Whether `path` currently has the content described by `expected`.
///
/// Uses the expected fingerprint's own algorithm. Never mutates the file.
pub fn verify(path: &Path, expected: &Fingerprint) -> Result<bool> {
    Ok(fingerprint(path, expected.algorithm)? == *expected)
}
