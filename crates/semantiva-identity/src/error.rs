//! Error types for identity computation

/// Errors raised while computing identities and fingerprints
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Expression could not be parsed into an AST
    #[error("expression parse error at byte {position}: {message}")]
    ExpressionParse {
        /// Byte offset of the offending token
        position: usize,
        /// Human-readable reason
        message: String,
    },

    /// Value could not be canonicalized to JSON
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] serde_json::Error),

    /// File referenced by a fingerprint request could not be read
    #[error("i/o error while fingerprinting: {0}")]
    Io(#[from] std::io::Error),

    /// Fingerprint string had the wrong shape
    #[error("invalid fingerprint: expected {expected} hex bytes, got {actual}")]
    InvalidFingerprint {
        /// Expected digest length in bytes
        expected: usize,
        /// Actual decoded length
        actual: usize,
    },

    /// Fingerprint string was not valid hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
