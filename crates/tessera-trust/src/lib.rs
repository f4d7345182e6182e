//! Trust material for Tessera collections.
//!
//! `tessera-trust` keeps the secrets and anchors: encrypted private keys in
//! a file store, pinned certificates and certificate authorities in X.509
//! file stores, and the ECDSA signing backends that turn role bodies into
//! signed metadata.

pub mod certificate;
pub mod certstore;
pub mod error;
pub mod keystore;
pub mod signer;

pub use certstore::CertificateStore;
pub use error::TrustError;
pub use keystore::{FileKeyStore, KeyStore};
pub use signer::{EcdsaSigner, UnlockedSigner};
