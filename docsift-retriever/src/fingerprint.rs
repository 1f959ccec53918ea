//! Content fingerprints for documents.
//!
//! A [`Fingerprint`] is the BLAKE3 digest of a document's full byte content. It is the
//! only identity a document has: equal bytes give equal fingerprints across processes
//! and restarts, and any change to the bytes (including reordering) gives a different one.
//!
//! Readers are consumed in fixed [`BLOCK_SIZE`] blocks so large documents never have to
//! be held in memory just to be identified.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncReadExt;

/// Size of the blocks folded into the running hash.
pub const BLOCK_SIZE: usize = 8192;

/// Failure while computing or parsing a fingerprint.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid fingerprint '{input}': {reason}")]
    InvalidHex { input: String, reason: String },
}

/// BLAKE3 digest (32 bytes) identifying a document by content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a stored blob, returning `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines and summaries.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| FingerprintError::InvalidHex {
            input: s.to_string(),
            reason,
        };
        let bytes = hex::decode(s.trim()).map_err(|e| invalid(e.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            invalid(format!(
                "expected {} bytes ({} hex characters), got {}",
                Self::LEN,
                Self::LEN * 2,
                bytes.len()
            ))
        })
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fingerprint an in-memory document.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint(*blake3::hash(bytes).as_bytes())
}

/// Fingerprint the whole stream, independent of where its cursor currently is.
///
/// The stream is rewound to the start, hashed to the end, and the cursor is put back
/// where it was, even if reading fails part way.
pub fn fingerprint_reader<R: Read + Seek>(reader: &mut R) -> Result<Fingerprint, FingerprintError> {
    let original = reader.stream_position()?;
    reader.seek(SeekFrom::Start(0))?;
    let hashed = hash_blocks(reader);
    let restored = reader.seek(SeekFrom::Start(original));
    let fingerprint = hashed?;
    restored?;
    Ok(fingerprint)
}

fn hash_blocks<R: Read>(reader: &mut R) -> Result<Fingerprint, FingerprintError> {
    let mut hasher = blake3::Hasher::new();
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&block[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}

/// Fingerprint a file on disk without loading it into memory.
pub async fn fingerprint_file(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    tracing::debug!("Fingerprinted {}", path.display());
    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}
