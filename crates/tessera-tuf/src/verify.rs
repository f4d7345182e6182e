//! Signature, threshold, expiry, and rollback checks for role files.

use std::collections::{BTreeMap, BTreeSet};

use base64::Engine;
use chrono::Utc;
use serde::Serialize;

use crate::canonical;
use crate::error::TufError;
use crate::keys::PublicKey;
use crate::meta::{Role, RoleName, RoleSpec, Signed};

/// Verify a signed role file against an authorized key set and threshold.
///
/// Only signatures whose key id appears in `spec.keyids` are considered;
/// a signature by any other key is ignored even if its bytes are valid.
/// Each key counts at most once toward the threshold.
pub fn verify_signed<T: Serialize>(
    signed: &Signed<T>,
    role: RoleName,
    keys: &BTreeMap<String, PublicKey>,
    spec: &RoleSpec,
) -> Result<(), TufError> {
    let message = canonical::to_canonical_json(&signed.signed)?;

    let mut counted: BTreeSet<&str> = BTreeSet::new();
    for sig in &signed.signatures {
        if !spec.keyids.iter().any(|id| id == &sig.keyid) {
            continue;
        }
        if counted.contains(sig.keyid.as_str()) {
            continue;
        }
        let Some(key) = keys.get(&sig.keyid) else {
            continue;
        };
        let Ok(raw) = base64::engine::general_purpose::STANDARD.decode(&sig.sig) else {
            continue;
        };
        if key.verify(&message, &raw).is_ok() {
            counted.insert(&sig.keyid);
        }
    }

    let valid = counted.len() as u32;
    if valid < spec.threshold {
        return Err(TufError::ThresholdNotMet {
            role,
            required: spec.threshold,
            valid,
        });
    }
    Ok(())
}

/// Reject a role body whose expiry is in the past.
pub fn check_expiry<T: Role>(body: &T) -> Result<(), TufError> {
    let expires = body.expires();
    if expires <= Utc::now() {
        return Err(TufError::Expired {
            role: T::TYPE,
            expired_at: expires,
        });
    }
    Ok(())
}

/// Reject a fetched version lower than the locally trusted one.
///
/// Re-fetching the currently trusted version is allowed; only a strictly
/// lower version is a rollback.
pub fn check_version(role: RoleName, trusted: u64, fetched: u64) -> Result<(), TufError> {
    if fetched < trusted {
        return Err(TufError::Rollback {
            role,
            trusted,
            fetched,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyCipher;
    use crate::meta::{METHOD_ECDSA, Signature, TargetsMeta};
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};
    use chrono::TimeDelta;
    use std::collections::BTreeMap;

    #[rustfmt::skip]
    const SPKI_HEADER: [u8; 26] = [
        0x30, 0x59,
        0x30, 0x13,
        0x06, 0x07,
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01,
        0x06, 0x08,
        0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07,
        0x03, 0x42, 0x00,
    ];

    struct TestKey {
        key_pair: EcdsaKeyPair,
        public: PublicKey,
    }

    fn test_key() -> TestKey {
        let rng = SystemRandom::new();
        let pkcs8 =
            EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).expect("keygen");
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref())
            .expect("parse");
        let mut spki = SPKI_HEADER.to_vec();
        spki.extend_from_slice(key_pair.public_key().as_ref());
        let public = PublicKey::new(KeyCipher::Ecdsa, &spki);
        TestKey { key_pair, public }
    }

    fn targets_body() -> TargetsMeta {
        TargetsMeta {
            version: 1,
            expires: Utc::now() + TimeDelta::days(90),
            targets: BTreeMap::new(),
        }
    }

    fn sign_body(key: &TestKey, body: &TargetsMeta) -> Signature {
        let rng = SystemRandom::new();
        let message = canonical::to_canonical_json(body).unwrap();
        let sig = key.key_pair.sign(&rng, &message).expect("sign");
        Signature {
            keyid: key.public.key_id(),
            method: METHOD_ECDSA.to_owned(),
            sig: base64::engine::general_purpose::STANDARD.encode(sig.as_ref()),
        }
    }

    #[test]
    fn threshold_met_with_authorized_key() {
        let key = test_key();
        let body = targets_body();
        let signed = Signed {
            signatures: vec![sign_body(&key, &body)],
            signed: body,
        };

        let mut keys = BTreeMap::new();
        keys.insert(key.public.key_id(), key.public.clone());
        let spec = RoleSpec {
            keyids: vec![key.public.key_id()],
            threshold: 1,
        };
        verify_signed(&signed, RoleName::Targets, &keys, &spec).expect("should verify");
    }

    #[test]
    fn unauthorized_signature_does_not_count() {
        let authorized = test_key();
        let rogue = test_key();
        let body = targets_body();
        // Valid signature bytes, but by a key outside the role spec.
        let signed = Signed {
            signatures: vec![sign_body(&rogue, &body)],
            signed: body,
        };

        let mut keys = BTreeMap::new();
        keys.insert(authorized.public.key_id(), authorized.public.clone());
        keys.insert(rogue.public.key_id(), rogue.public.clone());
        let spec = RoleSpec {
            keyids: vec![authorized.public.key_id()],
            threshold: 1,
        };
        let err = verify_signed(&signed, RoleName::Targets, &keys, &spec).unwrap_err();
        assert!(matches!(
            err,
            TufError::ThresholdNotMet {
                required: 1,
                valid: 0,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_signatures_count_once() {
        let key = test_key();
        let body = targets_body();
        let sig = sign_body(&key, &body);
        let signed = Signed {
            signatures: vec![sig.clone(), sig],
            signed: body,
        };

        let mut keys = BTreeMap::new();
        keys.insert(key.public.key_id(), key.public.clone());
        let spec = RoleSpec {
            keyids: vec![key.public.key_id()],
            threshold: 2,
        };
        let err = verify_signed(&signed, RoleName::Targets, &keys, &spec).unwrap_err();
        assert!(matches!(err, TufError::ThresholdNotMet { valid: 1, .. }));
    }

    #[test]
    fn corrupted_signature_is_skipped() {
        let key = test_key();
        let body = targets_body();
        let mut sig = sign_body(&key, &body);
        sig.sig = "!!not base64!!".to_owned();
        let signed = Signed {
            signatures: vec![sig],
            signed: body,
        };

        let mut keys = BTreeMap::new();
        keys.insert(key.public.key_id(), key.public.clone());
        let spec = RoleSpec {
            keyids: vec![key.public.key_id()],
            threshold: 1,
        };
        assert!(verify_signed(&signed, RoleName::Targets, &keys, &spec).is_err());
    }

    #[test]
    fn expired_body_fails_closed() {
        let mut body = targets_body();
        body.expires = Utc::now() - TimeDelta::hours(1);
        let err = check_expiry(&body).unwrap_err();
        assert!(matches!(err, TufError::Expired { .. }));
    }

    #[test]
    fn version_rollback_is_rejected() {
        assert!(check_version(RoleName::Targets, 2, 1).is_err());
        check_version(RoleName::Targets, 2, 2).expect("same version is not a rollback");
        check_version(RoleName::Targets, 2, 3).expect("newer version accepted");
    }
}
