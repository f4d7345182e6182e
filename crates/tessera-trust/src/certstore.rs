//! On-disk X.509 certificate stores.
//!
//! One PEM file per certificate, named by the hex content hash of its DER.
//! Two store profiles exist over the same directory layout: an authority
//! store that keeps only CA certificates, and a leaf store that keeps only
//! end-entity certificates (the pinned trust anchors). Both drop expired
//! certificates and SHA-1-family signatures at load time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use x509_parser::prelude::X509Certificate;

use crate::certificate;
use crate::error::TrustError;

const CERT_FILE_EXT: &str = "pem";

/// Which certificates a store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    /// Certificate authorities: CA certificates only.
    Authorities,
    /// Pinned end-entity certificates only.
    Leaves,
}

/// A certificate held in a store.
#[derive(Debug, Clone)]
pub struct StoredCertificate {
    /// The certificate's DER bytes.
    pub der: Vec<u8>,
    /// SHA-256 hex of the DER; doubles as the file name.
    pub fingerprint: String,
}

/// A filtered, on-disk X.509 certificate store.
pub struct CertificateStore {
    dir: PathBuf,
    kind: StoreKind,
    certs: BTreeMap<String, StoredCertificate>,
}

impl CertificateStore {
    /// Open a certificate-authority store at `dir`.
    pub fn open_authorities(dir: &Path) -> Result<Self, TrustError> {
        Self::open(dir, StoreKind::Authorities)
    }

    /// Open a pinned-leaf store at `dir`.
    pub fn open_leaves(dir: &Path) -> Result<Self, TrustError> {
        Self::open(dir, StoreKind::Leaves)
    }

    fn open(dir: &Path, kind: StoreKind) -> Result<Self, TrustError> {
        fs::create_dir_all(dir)?;
        let mut store = Self {
            dir: dir.to_owned(),
            kind,
            certs: BTreeMap::new(),
        };
        store.load()?;
        Ok(store)
    }

    fn load(&mut self) -> Result<(), TrustError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext == CERT_FILE_EXT) {
                continue;
            }
            let Ok(data) = fs::read(&path) else {
                continue;
            };
            let Ok(chain) = certificate::parse_pem_chain(&data) else {
                tracing::debug!(path = %path.display(), "skipping unparseable certificate file");
                continue;
            };
            let Some(der) = chain.into_iter().next() else {
                continue;
            };
            let Ok(cert) = certificate::parse_certificate(&der) else {
                tracing::debug!(path = %path.display(), "skipping invalid certificate");
                continue;
            };
            if !self.accepts(&cert) {
                continue;
            }
            let fingerprint = certificate::fingerprint(&der);
            self.certs
                .insert(fingerprint.clone(), StoredCertificate { der, fingerprint });
        }
        Ok(())
    }

    fn accepts(&self, cert: &X509Certificate<'_>) -> bool {
        if !cert.validity().is_valid() || certificate::is_sha1_signed(cert) {
            return false;
        }
        match self.kind {
            StoreKind::Authorities => certificate::is_ca(cert),
            StoreKind::Leaves => !certificate::is_ca(cert),
        }
    }

    /// Add a certificate, persisting it as a PEM file named by fingerprint.
    ///
    /// Returns the fingerprint. Fails if the certificate does not satisfy
    /// this store's filter.
    pub fn add(&mut self, der: &[u8]) -> Result<String, TrustError> {
        let cert = certificate::parse_certificate(der)?;
        if !self.accepts(&cert) {
            return Err(TrustError::Certificate(
                "certificate not acceptable for this store".to_owned(),
            ));
        }

        let fingerprint = certificate::fingerprint(der);
        let pem = certificate::pem_encode(der, certificate::CERTIFICATE_PEM_LABEL);
        fs::write(
            self.dir.join(format!("{fingerprint}.{CERT_FILE_EXT}")),
            pem,
        )?;
        self.certs.insert(
            fingerprint.clone(),
            StoredCertificate {
                der: der.to_vec(),
                fingerprint: fingerprint.clone(),
            },
        );
        Ok(fingerprint)
    }

    /// Look up a certificate by fingerprint.
    pub fn get(&self, fingerprint: &str) -> Option<&StoredCertificate> {
        self.certs.get(fingerprint)
    }

    /// Number of certificates currently held.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Whether the store holds no certificates.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Verify that a leaf-first chain anchors in this authority store for
    /// the given GUN.
    ///
    /// The leaf must be an end-entity certificate naming `gun`; a chain
    /// whose first certificate is a CA is rejected as malformed. Every
    /// certificate must be within its validity window and free of SHA-1
    /// signatures; intermediates must be CAs allowed to sign certificates.
    pub fn verify_chain(&self, gun: &str, chain: &[Vec<u8>]) -> Result<(), TrustError> {
        let parsed = chain
            .iter()
            .map(|der| certificate::parse_certificate(der))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(leaf) = parsed.first() else {
            return Err(TrustError::Chain("empty certificate chain".to_owned()));
        };

        if certificate::is_ca(leaf) {
            return Err(TrustError::Chain(
                "chain leads with a CA certificate".to_owned(),
            ));
        }
        if !certificate::matches_gun(leaf, gun) {
            return Err(TrustError::Chain(format!(
                "certificate subject does not match `{gun}`"
            )));
        }
        for cert in &parsed {
            if !cert.validity().is_valid() {
                return Err(TrustError::Chain(
                    "certificate in chain is expired or not yet valid".to_owned(),
                ));
            }
            if certificate::is_sha1_signed(cert) {
                return Err(TrustError::Chain(
                    "SHA-1 signatures are not accepted".to_owned(),
                ));
            }
        }

        // Walk issuer links from the leaf until a stored authority signs.
        let mut visited = vec![false; parsed.len()];
        visited[0] = true;
        let mut idx = 0;
        loop {
            let current = &parsed[idx];

            for stored in self.certs.values() {
                let Ok(authority) = certificate::parse_certificate(&stored.der) else {
                    continue;
                };
                if authority.tbs_certificate.subject.as_raw()
                    == current.tbs_certificate.issuer.as_raw()
                    && certificate::can_sign_certificates(&authority)
                    && certificate::verify_issued_by(current, authority.public_key()).is_ok()
                {
                    return Ok(());
                }
            }

            let next = (0..parsed.len()).find(|&i| {
                !visited[i]
                    && parsed[i].tbs_certificate.subject.as_raw()
                        == current.tbs_certificate.issuer.as_raw()
                    && certificate::is_ca(&parsed[i])
                    && certificate::can_sign_certificates(&parsed[i])
                    && certificate::verify_issued_by(current, parsed[i].public_key()).is_ok()
            });
            match next {
                Some(i) => {
                    visited[i] = true;
                    idx = i;
                }
                None => {
                    return Err(TrustError::Chain(
                        "no path to a trusted certificate authority".to_owned(),
                    ));
                }
            }
        }
    }
}
