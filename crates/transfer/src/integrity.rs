use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest applied to each chunk before transfer.
///
/// This is a transport-corruption check, not an authenticity guarantee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// What the media server verifies against.
    #[default]
    Md5,
    Sha256,
    Crc32,
    /// Upload without checksums (degraded integrity).
    None,
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "crc32" => Ok(ChecksumAlgorithm::Crc32),
            "none" => Ok(ChecksumAlgorithm::None),
            other => Err(format!("unknown checksum algorithm: {other}")),
        }
    }
}

type DigestFn = fn(&[u8]) -> String;

/// Chunk hasher with its capability resolved once, at construction.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityHasher {
    algorithm: ChecksumAlgorithm,
    digest: Option<DigestFn>,
}

impl IntegrityHasher {
    /// Resolves the digest function for `algorithm`.
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        let digest: Option<DigestFn> = match algorithm {
            ChecksumAlgorithm::Md5 => Some(md5_hex),
            ChecksumAlgorithm::Sha256 => Some(sha256_hex),
            ChecksumAlgorithm::Crc32 => Some(crc32_hex),
            ChecksumAlgorithm::None => None,
        };
        Self { algorithm, digest }
    }

    /// A hasher that never produces a checksum.
    pub fn unavailable() -> Self {
        Self::new(ChecksumAlgorithm::None)
    }

    /// Returns `true` if [`checksum`](Self::checksum) yields digests.
    pub fn is_available(&self) -> bool {
        self.digest.is_some()
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest of `data`, or `None` when unavailable.
    pub fn checksum(&self, data: &[u8]) -> Option<String> {
        self.digest.map(|digest| digest(data))
    }
}

impl Default for IntegrityHasher {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default())
    }
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(data))
}
