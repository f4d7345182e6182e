//! Error types for the client.
//!
//! Errors keep their kind end-to-end: verification failures, rollbacks, and
//! passphrase problems all surface as what they are, never swallowed or
//! downgraded. The only error the client reinterprets is a remote 404 for
//! root during publish bootstrap, which selects the first-publish path.

use crate::remote::RemoteError;
use tessera_trust::TrustError;
use tessera_tuf::TufError;

/// Errors surfaced across the library boundary.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Publish was attempted with no local or remote root.
    #[error("repository has not been initialized")]
    NotInitialized,

    /// Root verification failed: no pinned certificate, no CA chain, or
    /// signatures below threshold.
    #[error("untrusted root: {0}")]
    UntrustedRoot(String),

    /// The requested target does not exist in the trusted targets body.
    #[error("target `{0}` not found")]
    TargetNotFound(String),

    /// The changelist is corrupt, locked, or otherwise unusable.
    #[error("changelist error: {0}")]
    Changelist(String),

    /// The passphrase provider declined to produce a passphrase.
    #[error(transparent)]
    Passphrase(#[from] PassphraseError),

    /// A metadata-level failure: expiry, rollback, threshold, hash.
    #[error(transparent)]
    Tuf(#[from] TufError),

    /// A key store or certificate store failure.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// A remote store failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Local cache or changelist I/O failed.
    #[error("local store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Locally produced metadata could not be encoded or decoded.
    #[error("metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An invariant was violated; indicates a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Reported by a passphrase provider that cannot produce a passphrase.
///
/// Surfacing this from the provider aborts the publish before any network
/// write happens.
#[derive(Debug, thiserror::Error)]
#[error("passphrase unavailable: {0}")]
pub struct PassphraseError(pub String);
