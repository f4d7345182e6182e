//! X.509 certificate minting, parsing, and inspection helpers.
//!
//! Root keys are anchored in self-signed leaf certificates whose
//! CommonName (and DNS SAN) carry the collection's GUN. Only ECDSA P-256
//! with SHA-256 is minted or accepted for chain signatures.

use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1, UnparsedPublicKey};
use base64::Engine;
use x509_parser::prelude::*;

use crate::error::TrustError;

/// PEM label for certificates.
pub const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// Validity of freshly minted leaf certificates, in days.
pub const LEAF_VALIDITY_DAYS: i64 = 3650;

/// ECDSA with SHA-256, the only chain signature algorithm accepted.
const ECDSA_WITH_SHA256_OID: &str = "1.2.840.10045.4.3.2";

/// SHA-1-family signature algorithms, rejected everywhere.
const SHA1_SIGNATURE_OIDS: [&str; 3] = [
    "1.2.840.113549.1.1.5", // sha1WithRSAEncryption
    "1.2.840.10040.4.3",    // dsa-with-sha1
    "1.2.840.10045.4.1",    // ecdsa-with-SHA1
];

/// Wrap DER bytes in PEM with the given label.
pub fn pem_encode(der: &[u8], label: &str) -> String {
    use std::fmt::Write;

    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).expect("base64 is ASCII"));
        pem.push('\n');
    }
    let _ = writeln!(pem, "-----END {label}-----");
    pem
}

/// Decode every certificate block in a PEM buffer, leaf first.
pub fn parse_pem_chain(pem: &[u8]) -> Result<Vec<Vec<u8>>, TrustError> {
    let mut chain = Vec::new();
    for block in Pem::iter_from_buffer(pem) {
        let block = block.map_err(|e| TrustError::Certificate(format!("invalid PEM: {e}")))?;
        if block.label == CERTIFICATE_PEM_LABEL {
            chain.push(block.contents);
        }
    }
    Ok(chain)
}

/// Parse a single DER certificate, rejecting trailing bytes.
pub fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, TrustError> {
    let (rest, cert) = parse_x509_certificate(der)
        .map_err(|e| TrustError::Certificate(format!("invalid DER certificate: {e}")))?;
    if !rest.is_empty() {
        return Err(TrustError::Certificate(
            "trailing bytes after certificate".to_owned(),
        ));
    }
    Ok(cert)
}

/// The content-hash fingerprint of a certificate: SHA-256 hex of its DER.
pub fn fingerprint(der: &[u8]) -> String {
    tessera_tuf::canonical::sha256_hex(der)
}

/// Mint a self-signed leaf certificate for `gun` from a PKCS#8 P-256 key.
pub fn generate_leaf(gun: &str, pkcs8_der: &[u8]) -> Result<Vec<u8>, TrustError> {
    let key = rcgen::KeyPair::try_from(pkcs8_der)
        .map_err(|e| TrustError::Certificate(format!("unusable signing key: {e}")))?;

    let mut params = rcgen::CertificateParams::new(vec![gun.to_owned()])
        .map_err(|e| TrustError::Certificate(e.to_string()))?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, gun);
    params.not_before = ::time::OffsetDateTime::now_utc();
    params.not_after = params.not_before + ::time::Duration::days(LEAF_VALIDITY_DAYS);
    params.is_ca = rcgen::IsCa::ExplicitNoCa;

    let cert = params
        .self_signed(&key)
        .map_err(|e| TrustError::Certificate(format!("failed to mint certificate: {e}")))?;
    Ok(cert.der().as_ref().to_vec())
}

/// The certificate's subject CommonName, if present and printable.
pub fn common_name(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_owned)
}

/// Whether the certificate's CommonName or a DNS SAN equals `gun`.
pub fn matches_gun(cert: &X509Certificate<'_>, gun: &str) -> bool {
    if common_name(cert).as_deref() == Some(gun) {
        return true;
    }
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return false;
    };
    san.value.general_names.iter().any(|name| match name {
        GeneralName::DNSName(dns) => *dns == gun,
        _ => false,
    })
}

/// Whether the certificate carries the CA basic constraint.
pub fn is_ca(cert: &X509Certificate<'_>) -> bool {
    cert.basic_constraints()
        .ok()
        .flatten()
        .is_some_and(|bc| bc.value.ca)
}

/// Whether the certificate was signed with a SHA-1-family algorithm.
pub fn is_sha1_signed(cert: &X509Certificate<'_>) -> bool {
    let oid = cert.signature_algorithm.algorithm.to_id_string();
    SHA1_SIGNATURE_OIDS.contains(&oid.as_str())
}

/// Whether the certificate may sign other certificates. A missing key-usage
/// extension places no restriction.
pub fn can_sign_certificates(cert: &X509Certificate<'_>) -> bool {
    match cert.key_usage() {
        Ok(Some(usage)) => usage.value.key_cert_sign(),
        Ok(None) => true,
        Err(_) => false,
    }
}

/// Verify that `child`'s signature was produced by the key in
/// `issuer_spki`. Only ECDSA P-256 with SHA-256 is supported.
pub fn verify_issued_by(
    child: &X509Certificate<'_>,
    issuer_spki: &SubjectPublicKeyInfo<'_>,
) -> Result<(), TrustError> {
    let alg = child.signature_algorithm.algorithm.to_id_string();
    if alg != ECDSA_WITH_SHA256_OID {
        return Err(TrustError::Chain(format!(
            "unsupported chain signature algorithm {alg}"
        )));
    }
    let point = issuer_spki.subject_public_key.data.as_ref();
    let key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, point);
    key.verify(
        child.tbs_certificate.as_ref(),
        child.signature_value.data.as_ref(),
    )
    .map_err(|_| TrustError::Chain("certificate signature verification failed".to_owned()))
}
