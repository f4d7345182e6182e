//! Error types for the TUF metadata subsystem.

use chrono::{DateTime, Utc};

use crate::meta::RoleName;

/// Errors from TUF metadata handling and verification.
#[derive(Debug, thiserror::Error)]
pub enum TufError {
    /// A role's metadata has expired; verification fails closed.
    #[error("{role} metadata expired at {expired_at}")]
    Expired {
        /// The role whose metadata expired.
        role: RoleName,
        /// The recorded expiry timestamp.
        expired_at: DateTime<Utc>,
    },

    /// A fetched role's version is lower than the locally trusted version.
    #[error("rollback on {role}: trusted version {trusted}, fetched {fetched}")]
    Rollback {
        /// The role being updated.
        role: RoleName,
        /// The version already trusted locally.
        trusted: u64,
        /// The lower version the remote returned.
        fetched: u64,
    },

    /// Too few valid signatures under the authorized key set.
    #[error("{role} signature threshold not met: need {required}, got {valid}")]
    ThresholdNotMet {
        /// The role whose signatures were checked.
        role: RoleName,
        /// The threshold declared for the role.
        required: u32,
        /// How many signatures actually verified.
        valid: u32,
    },

    /// A role file's canonical hash does not match its recorded reference.
    #[error("{role} hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// The role whose content hash was checked.
        role: RoleName,
        /// The hash recorded by the referencing role.
        expected: String,
        /// The hash of the bytes actually fetched.
        actual: String,
    },

    /// A role file's version disagrees with the version recorded for it.
    #[error("{role} version {actual} does not match the recorded version {expected}")]
    VersionMismatch {
        /// The role whose version was checked.
        role: RoleName,
        /// The version recorded by the referencing role.
        expected: u64,
        /// The version inside the fetched role file.
        actual: u64,
    },

    /// The role graph has no materialized body for a required role.
    #[error("no {0} metadata loaded")]
    MissingRole(RoleName),

    /// A string did not name one of the four top-level roles.
    #[error("unknown role name `{0}`")]
    UnknownRole(String),

    /// Public key material could not be decoded or used.
    #[error("bad key material: {0}")]
    BadKey(String),

    /// A signing operation failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Metadata could not be serialized or parsed.
    #[error("metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
