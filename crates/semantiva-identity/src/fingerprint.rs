//! Content-addressed hashing primitives
//!
//! Provides [`Fingerprint`], a strongly-typed 32-byte SHA-256 digest used for
//! provenance and change detection throughout the workspace: run-source files,
//! sweep-value sequences, and context values all reduce to fingerprints.

use crate::canon::canonical_json;
use crate::error::IdentityError;
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// A 32-byte SHA-256 content fingerprint
///
/// Immutable and cheap to clone (Copy). The wire form is lowercase hex,
/// optionally carried with a `sha256-` prefix (see [`Fingerprint::prefixed`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a fingerprint from raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Reference to the underlying digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the SHA-256 fingerprint of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.into())
    }

    /// Compute the fingerprint of a value's canonical JSON encoding
    ///
    /// # Errors
    /// Returns an error if the value cannot be canonicalized.
    #[inline]
    pub fn of_canonical_json<T: serde::Serialize>(value: &T) -> Result<Self, IdentityError> {
        let json = canonical_json(value)?;
        Ok(Self::compute(json.as_bytes()))
    }

    /// Compute the whole-file fingerprint of `path`, streaming in 64 KiB chunks
    ///
    /// # Errors
    /// Returns [`IdentityError::Io`] if the file cannot be read.
    pub fn of_file(path: &Path) -> Result<Self, IdentityError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    /// Hex form with the `sha256-` scheme prefix
    #[inline]
    #[must_use]
    pub fn prefixed(&self) -> String {
        format!("sha256-{}", self)
    }

    /// Short form (first 8 bytes as hex), for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = IdentityError;

    /// Parse from hex, accepting an optional `sha256-` prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix("sha256-").unwrap_or(s);
        let bytes = hex::decode(hex_part)?;
        if bytes.len() != 32 {
            return Err(IdentityError::InvalidFingerprint {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
