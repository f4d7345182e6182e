//! Error types for the trust material subsystem.

/// Errors from key stores, certificate stores, and signing backends.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// The key store rejected the supplied passphrase.
    #[error("bad passphrase")]
    BadPassphrase,

    /// No key with the given identifier exists in the store.
    #[error("no key with id `{0}`")]
    KeyNotFound(String),

    /// A certificate could not be parsed or minted.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// A certificate chain failed verification against the trust anchors.
    #[error("untrusted chain: {0}")]
    Chain(String),

    /// A cryptographic operation failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// The sealed key envelope could not be encoded or decoded.
    #[error("key envelope error: {0}")]
    Envelope(#[from] serde_json::Error),

    /// Underlying store I/O failed.
    #[error("trust store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
