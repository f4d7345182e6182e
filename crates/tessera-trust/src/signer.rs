//! ECDSA P-256 signing backends for role metadata.
//!
//! [`EcdsaSigner`] wraps an in-memory key pair and implements the role
//! graph's [`Sign`] seam. [`UnlockedSigner`] additionally keeps the
//! decrypted PKCS#8 bytes of a root key so it can mint the root's trust
//! anchor certificate during initialization.

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

use tessera_tuf::error::TufError;
use tessera_tuf::keys::{KeyCipher, PublicKey};
use tessera_tuf::sign::Sign;

use crate::certificate;
use crate::error::TrustError;

/// A signing backend holding an unlocked ECDSA P-256 key pair.
#[derive(Debug)]
pub struct EcdsaSigner {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
    public: PublicKey,
    key_id: String,
}

impl EcdsaSigner {
    /// Generate a fresh key pair, returning the signer and the PKCS#8 DER
    /// to hand to a key store.
    pub fn generate() -> Result<(Self, Vec<u8>), TrustError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| TrustError::Crypto(format!("key generation failed: {e}")))?;
        let signer = Self::from_pkcs8(pkcs8.as_ref())?;
        Ok((signer, pkcs8.as_ref().to_vec()))
    }

    /// Reconstruct a signer from PKCS#8 DER bytes.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, TrustError> {
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8_der)
            .map_err(|e| TrustError::Crypto(format!("failed to parse PKCS#8 key: {e}")))?;
        let spki = encode_p256_spki(key_pair.public_key().as_ref());
        let public = PublicKey::new(KeyCipher::Ecdsa, &spki);
        let key_id = public.key_id();
        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
            public,
            key_id,
        })
    }

    /// Attribute signatures to a different key identifier.
    ///
    /// Root signatures are attributed to the certificate-form key listed in
    /// the root body rather than the raw key's own identifier.
    pub fn with_attribution(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// The public half of this key, in raw SPKI form.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The key identifier signatures are attributed to.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl Sign for EcdsaSigner {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TufError> {
        let sig = self
            .key_pair
            .sign(&self.rng, message)
            .map_err(|e| TufError::Signing(format!("ECDSA sign failed: {e}")))?;
        Ok(sig.as_ref().to_vec())
    }
}

/// An unlocked root key: the decrypted private material plus its signer.
pub struct UnlockedSigner {
    pkcs8: Vec<u8>,
    signer: EcdsaSigner,
}

impl UnlockedSigner {
    /// Wrap decrypted PKCS#8 bytes of a root key.
    pub fn new(pkcs8: Vec<u8>) -> Result<Self, TrustError> {
        let signer = EcdsaSigner::from_pkcs8(&pkcs8)?;
        Ok(Self { pkcs8, signer })
    }

    /// The identifier of the raw key (the id it is stored under).
    pub fn key_id(&self) -> &str {
        self.signer.key_id()
    }

    /// The public half of the root key, in raw SPKI form.
    pub fn public_key(&self) -> &PublicKey {
        self.signer.public_key()
    }

    /// Mint the self-signed trust anchor certificate for `gun`.
    pub fn generate_certificate(&self, gun: &str) -> Result<Vec<u8>, TrustError> {
        certificate::generate_leaf(gun, &self.pkcs8)
    }

    /// A signing backend whose signatures are attributed to `key_id`.
    pub fn signer_for(&self, key_id: &str) -> Result<EcdsaSigner, TrustError> {
        Ok(EcdsaSigner::from_pkcs8(&self.pkcs8)?.with_attribution(key_id))
    }
}

/// Encode a raw P-256 public key (uncompressed point, 65 bytes) as
/// `SubjectPublicKeyInfo` DER.
pub fn encode_p256_spki(point: &[u8]) -> Vec<u8> {
    // Fixed SPKI header for a P-256 uncompressed public key.
    #[rustfmt::skip]
    const SPKI_HEADER: [u8; 26] = [
        0x30, 0x59,                                     // SEQUENCE (89 bytes total)
        0x30, 0x13,                                     // SEQUENCE (19 bytes)
        0x06, 0x07,                                     // OID (7 bytes)
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01,       // 1.2.840.10045.2.1
        0x06, 0x08,                                     // OID (8 bytes)
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, // 1.2.840.10045.3.1.7
        0x03, 0x42, 0x00,                               // BIT STRING (66 bytes, 0 unused)
    ];

    let mut spki = Vec::with_capacity(SPKI_HEADER.len() + point.len());
    spki.extend_from_slice(&SPKI_HEADER);
    spki.extend_from_slice(point);
    spki
}
