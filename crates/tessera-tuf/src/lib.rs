//! TUF metadata model for Tessera trust collections.
//!
//! `tessera-tuf` defines the four role bodies (root, targets, snapshot,
//! timestamp), their canonical-JSON encoding, public-key material, and the
//! in-memory role graph that tracks versions, dirty flags, and the signing
//! order between roles. Cross-references between roles are always by version
//! and canonical hash, never by pointer.

pub mod canonical;
pub mod error;
pub mod graph;
pub mod keys;
pub mod meta;
pub mod sign;
pub mod verify;

pub use error::TufError;
pub use graph::RoleGraph;
pub use keys::{KeyCipher, PublicKey};
pub use meta::{RoleName, Signature, Signed};
