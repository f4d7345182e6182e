//! Per-role key selection for the publish pipeline.
//!
//! Targets and snapshot keys are process-local: sealed under the empty
//! passphrase and resolved through a `{gun}/{role}` alias. The root key is
//! resolved through the certificate-form key id recorded in the root body
//! and unsealed with the caller-supplied passphrase.

use tessera_trust::keystore::{FileKeyStore, KeyStore};
use tessera_trust::signer::EcdsaSigner;
use tessera_tuf::keys::PublicKey;
use tessera_tuf::meta::RoleName;

use crate::error::ClientError;

fn role_alias(gun: &str, role: RoleName) -> String {
    format!("{gun}/{role}")
}

/// Generate a fresh key for a role, seal it into the store, and register
/// its alias. Returns the public half for the root body.
pub(crate) fn generate_role_key(
    store: &mut FileKeyStore,
    gun: &str,
    role: RoleName,
) -> Result<PublicKey, ClientError> {
    let (signer, pkcs8) = EcdsaSigner::generate()?;
    let key_id = signer.key_id().to_owned();
    store.add_encrypted(&key_id, &pkcs8, "")?;
    store.link(&role_alias(gun, role), &key_id)?;
    tracing::debug!(%role, %key_id, "generated role key");
    Ok(signer.public_key().clone())
}

/// Unseal the signing key registered for a role.
pub(crate) fn role_signer(
    store: &FileKeyStore,
    gun: &str,
    role: RoleName,
) -> Result<EcdsaSigner, ClientError> {
    let alias = role_alias(gun, role);
    let key_id = store.resolve(&alias).ok_or_else(|| {
        ClientError::Internal(format!("no {role} key registered for `{gun}`"))
    })?;
    let pkcs8 = store.get_decrypted(&key_id, "")?;
    Ok(EcdsaSigner::from_pkcs8(&pkcs8)?)
}

/// Unseal the root key behind a certificate-form key id, attributing its
/// signatures to that id.
pub(crate) fn unlock_root_signer(
    store: &FileKeyStore,
    root_key_id: &str,
    passphrase: &str,
) -> Result<EcdsaSigner, ClientError> {
    let stored_id = store
        .resolve(root_key_id)
        .unwrap_or_else(|| root_key_id.to_owned());
    let pkcs8 = store.get_decrypted(&stored_id, passphrase)?;
    Ok(EcdsaSigner::from_pkcs8(&pkcs8)?.with_attribution(root_key_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_trust::TrustError;
    use tessera_tuf::sign::Sign;

    const GUN: &str = "example.com/app";

    #[test]
    fn generated_role_key_can_be_resolved_and_signs() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileKeyStore::open(dir.path()).unwrap();

        let public = generate_role_key(&mut store, GUN, RoleName::Targets).unwrap();
        let signer = role_signer(&store, GUN, RoleName::Targets).unwrap();
        assert_eq!(signer.key_id(), public.key_id());

        let sig = Sign::sign(&signer, b"message").unwrap();
        public.verify(b"message", &sig).expect("should verify");
    }

    #[test]
    fn missing_role_key_is_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        let err = role_signer(&store, GUN, RoleName::Snapshot).unwrap_err();
        assert!(matches!(err, ClientError::Internal(_)));
    }

    #[test]
    fn root_signer_resolves_link_and_checks_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileKeyStore::open(dir.path()).unwrap();

        let (signer, pkcs8) = EcdsaSigner::generate().unwrap();
        let private_id = signer.key_id().to_owned();
        store.add_encrypted(&private_id, &pkcs8, "rootpw").unwrap();
        store.link("cert-form-id", &private_id).unwrap();

        let unlocked = unlock_root_signer(&store, "cert-form-id", "rootpw").unwrap();
        assert_eq!(unlocked.key_id(), "cert-form-id");

        let err = unlock_root_signer(&store, "cert-form-id", "wrong").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Trust(TrustError::BadPassphrase)
        ));
    }
}
