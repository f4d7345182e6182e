//! The signing backend seam.
//!
//! The role graph signs bodies through this trait so the key handling
//! (encrypted stores, passphrase unlocking) stays outside this crate.

use crate::error::TufError;

/// A backend able to produce detached signatures for role metadata.
pub trait Sign {
    /// The key identifier the produced signatures are attributed to.
    fn key_id(&self) -> &str;

    /// Sign the canonical message bytes, returning the raw signature.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TufError>;
}
