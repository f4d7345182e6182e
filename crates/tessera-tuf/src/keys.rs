//! Public key material and stable key identifiers.
//!
//! A key's identity is the SHA-256 digest of the canonical JSON of its
//! public form, so two keys are equal exactly when their identifiers are.
//! Private counterparts never appear in this crate; they live behind the
//! key store in `tessera-trust`.

use aws_lc_rs::signature::{self, ECDSA_P256_SHA256_ASN1};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::error::TufError;

/// The fixed size of the SPKI ASN.1 header for P-256 keys.
const P256_SPKI_HEADER_LEN: usize = 26;

/// The cipher tag of a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyCipher {
    /// ECDSA P-256; public material is SPKI DER.
    Ecdsa,
    /// ECDSA P-256 wrapped in a PEM X.509 certificate (possibly a chain).
    /// Used for root keys, whose material doubles as the trust anchor
    /// certificate.
    EcdsaX509,
}

/// A public key as it appears in role metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// The cipher tag.
    #[serde(rename = "keytype")]
    pub cipher: KeyCipher,
    /// The encoded public material.
    #[serde(rename = "keyval")]
    pub keyval: KeyVal,
}

/// Container for the encoded public material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    /// Base64 of the raw public encoding (SPKI DER, or a PEM certificate
    /// chain for [`KeyCipher::EcdsaX509`]).
    pub public: String,
}

impl PublicKey {
    /// Wrap raw public material under the given cipher tag.
    pub fn new(cipher: KeyCipher, material: &[u8]) -> Self {
        Self {
            cipher,
            keyval: KeyVal {
                public: base64::engine::general_purpose::STANDARD.encode(material),
            },
        }
    }

    /// The stable identifier of this key: the SHA-256 hex digest of the
    /// canonical JSON of its public form.
    pub fn key_id(&self) -> String {
        // Canonicalizing a fully-owned struct cannot fail.
        let encoded = canonical::to_canonical_json(self).unwrap_or_default();
        canonical::sha256_hex(&encoded)
    }

    /// Decode the raw public material.
    pub fn material(&self) -> Result<Vec<u8>, TufError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.keyval.public)
            .map_err(|e| TufError::BadKey(format!("invalid base64 public material: {e}")))
    }

    /// Verify `sig` (ASN.1 DER ECDSA) over `message` with this key.
    pub fn verify(&self, message: &[u8], sig: &[u8]) -> Result<(), TufError> {
        let material = self.material()?;
        let point = match self.cipher {
            KeyCipher::Ecdsa => spki_point(&material)?.to_vec(),
            KeyCipher::EcdsaX509 => certificate_point(&material)?,
        };
        let key = signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &point);
        key.verify(message, sig)
            .map_err(|e| TufError::BadKey(format!("ECDSA verification failed: {e}")))
    }
}

/// Strip the SPKI header from a P-256 SubjectPublicKeyInfo, returning the
/// uncompressed EC point.
fn spki_point(spki_der: &[u8]) -> Result<&[u8], TufError> {
    if spki_der.len() <= P256_SPKI_HEADER_LEN {
        return Err(TufError::BadKey(
            "public key DER too short for SPKI".to_owned(),
        ));
    }
    Ok(&spki_der[P256_SPKI_HEADER_LEN..])
}

/// Extract the EC point from the leaf certificate of a PEM chain.
fn certificate_point(pem: &[u8]) -> Result<Vec<u8>, TufError> {
    let block = x509_parser::pem::Pem::iter_from_buffer(pem)
        .next()
        .ok_or_else(|| TufError::BadKey("no PEM block in certificate material".to_owned()))?
        .map_err(|e| TufError::BadKey(format!("invalid PEM: {e}")))?;
    let cert = block
        .parse_x509()
        .map_err(|e| TufError::BadKey(format!("invalid certificate: {e}")))?;
    Ok(cert.public_key().subject_public_key.data.as_ref().to_vec())
}
