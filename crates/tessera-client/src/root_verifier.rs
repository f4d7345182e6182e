//! Trust-pinning and root-rotation verification.
//!
//! Decides whether a fetched root file is acceptable for a GUN. Each key
//! listed for the root role carries an X.509 certificate chain; a key is
//! accepted when its leaf is already pinned for this GUN, or when the
//! chain anchors in the local certificate-authority store. The root file
//! must then carry at least one valid signature by an accepted key
//! (trust-on-first-use; the body's own thresholds govern every other
//! role).

use std::collections::BTreeMap;

use tessera_trust::certificate;
use tessera_trust::certstore::CertificateStore;
use tessera_tuf::keys::PublicKey;
use tessera_tuf::meta::{RoleName, RoleSpec, RootMeta, Signed};
use tessera_tuf::verify::verify_signed;

use crate::error::ClientError;

/// Signature threshold applied to the root file itself on first contact.
const ROOT_TOFU_THRESHOLD: u32 = 1;

/// Verifies fetched root files against the local trust anchors.
pub struct RootVerifier<'a> {
    cert_store: &'a CertificateStore,
    ca_store: &'a CertificateStore,
    gun: &'a str,
}

impl<'a> RootVerifier<'a> {
    /// Build a verifier over the pinned-certificate and CA stores.
    pub fn new(
        cert_store: &'a CertificateStore,
        ca_store: &'a CertificateStore,
        gun: &'a str,
    ) -> Self {
        Self {
            cert_store,
            ca_store,
            gun,
        }
    }

    /// Accept or reject a root file.
    ///
    /// On accept, returns the set of public keys authorized to have signed
    /// this root; the rest of the collection is verified under these keys.
    pub fn verify(
        &self,
        root: &Signed<RootMeta>,
    ) -> Result<BTreeMap<String, PublicKey>, ClientError> {
        let spec = root.signed.roles.get(&RoleName::Root).ok_or_else(|| {
            ClientError::UntrustedRoot("root role missing from the role table".to_owned())
        })?;

        let mut accepted = BTreeMap::new();
        for key_id in &spec.keyids {
            let Some(key) = root.signed.keys.get(key_id) else {
                continue;
            };
            if self.key_is_anchored(key) {
                accepted.insert(key_id.clone(), key.clone());
            }
        }

        if accepted.is_empty() {
            return Err(ClientError::UntrustedRoot(
                "no root key is pinned or chains to a trusted authority".to_owned(),
            ));
        }

        let tofu_spec = RoleSpec {
            keyids: accepted.keys().cloned().collect(),
            threshold: ROOT_TOFU_THRESHOLD,
        };
        verify_signed(root, RoleName::Root, &accepted, &tofu_spec)
            .map_err(|e| ClientError::UntrustedRoot(e.to_string()))?;

        Ok(accepted)
    }

    /// Whether a root key's certificate chain reaches a local trust anchor.
    fn key_is_anchored(&self, key: &PublicKey) -> bool {
        let Ok(material) = key.material() else {
            return false;
        };
        let Ok(chain) = certificate::parse_pem_chain(&material) else {
            return false;
        };
        let Some(leaf_der) = chain.first() else {
            return false;
        };
        let Ok(leaf) = certificate::parse_certificate(leaf_der) else {
            return false;
        };

        // Leaf-first chains only; a chain led by a CA is malformed and
        // fails closed rather than pinning the wrong certificate.
        if certificate::is_ca(&leaf) {
            tracing::warn!(gun = %self.gun, "root key chain leads with a CA certificate; rejecting");
            return false;
        }

        // Pinned path: exact fingerprint match plus CommonName check.
        let fingerprint = certificate::fingerprint(leaf_der);
        if self.cert_store.get(&fingerprint).is_some()
            && certificate::common_name(&leaf).as_deref() == Some(self.gun)
        {
            tracing::debug!(%fingerprint, "root key accepted via pinned certificate");
            return true;
        }

        // CA path: the chain must anchor in the authority store.
        if self.ca_store.verify_chain(self.gun, &chain).is_ok() {
            tracing::debug!(%fingerprint, "root key accepted via certificate authority");
            return true;
        }

        false
    }
}
