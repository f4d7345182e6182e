//! The in-memory role graph.
//!
//! Holds the materialized bodies of root, targets, and snapshot together
//! with each role's dirty flag and the canonical bytes of its current
//! signed file. Snapshot references the other roles by version and hash
//! taken from those bytes, so roles never hold pointers to each other.
//!
//! Signing order is enforced structurally: snapshot cannot be signed until
//! root and targets have signed bytes to reference.

use std::collections::BTreeMap;

use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};

use crate::canonical;
use crate::error::TufError;
use crate::keys::PublicKey;
use crate::meta::{
    METHOD_ECDSA, MetaRef, Role, RoleName, RoleSpec, RootMeta, Signature, Signed, SnapshotMeta,
    TargetMeta, TargetsMeta,
};
use crate::sign::Sign;

/// One materialized role: its signed file plus local bookkeeping.
#[derive(Debug, Clone)]
struct RoleSlot<T> {
    signed: Signed<T>,
    /// Canonical bytes of the current signed file, present after signing
    /// or after loading verified bytes.
    raw: Option<Vec<u8>>,
    dirty: bool,
}

impl<T> RoleSlot<T> {
    fn fresh(body: T) -> Self {
        Self {
            signed: Signed {
                signed: body,
                signatures: Vec::new(),
            },
            raw: None,
            dirty: true,
        }
    }

    fn loaded(signed: Signed<T>, raw: Vec<u8>) -> Self {
        Self {
            signed,
            raw: Some(raw),
            dirty: false,
        }
    }
}

/// The in-memory graph of materialized roles for one collection.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    root: Option<RoleSlot<RootMeta>>,
    targets: Option<RoleSlot<TargetsMeta>>,
    snapshot: Option<RoleSlot<SnapshotMeta>>,
}

impl RoleGraph {
    /// An empty graph with no materialized roles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial role set for a brand-new collection.
    ///
    /// Every role gets a single authorized key and a threshold of 1. The
    /// bodies start at version 0 and are bumped to 1 by the first signing
    /// pass.
    pub fn init(
        root_key: PublicKey,
        targets_key: PublicKey,
        snapshot_key: PublicKey,
        timestamp_key: PublicKey,
    ) -> Self {
        let mut keys = BTreeMap::new();
        let mut roles = BTreeMap::new();
        for (role, key) in [
            (RoleName::Root, &root_key),
            (RoleName::Targets, &targets_key),
            (RoleName::Snapshot, &snapshot_key),
            (RoleName::Timestamp, &timestamp_key),
        ] {
            let id = key.key_id();
            roles.insert(
                role,
                RoleSpec {
                    keyids: vec![id.clone()],
                    threshold: 1,
                },
            );
            keys.insert(id, key.clone());
        }

        let root = RootMeta {
            version: 0,
            expires: Utc::now(),
            consistent_snapshot: false,
            keys,
            roles,
        };
        let targets = TargetsMeta {
            version: 0,
            expires: Utc::now(),
            targets: BTreeMap::new(),
        };
        let snapshot = SnapshotMeta {
            version: 0,
            expires: Utc::now(),
            meta: BTreeMap::new(),
        };

        Self {
            root: Some(RoleSlot::fresh(root)),
            targets: Some(RoleSlot::fresh(targets)),
            snapshot: Some(RoleSlot::fresh(snapshot)),
        }
    }

    /// Install a verified root file and its raw bytes.
    pub fn set_root(&mut self, signed: Signed<RootMeta>, raw: Vec<u8>) {
        self.root = Some(RoleSlot::loaded(signed, raw));
    }

    /// Install a verified targets file and its raw bytes.
    pub fn set_targets(&mut self, signed: Signed<TargetsMeta>, raw: Vec<u8>) {
        self.targets = Some(RoleSlot::loaded(signed, raw));
    }

    /// Install a verified snapshot file and its raw bytes.
    pub fn set_snapshot(&mut self, signed: Signed<SnapshotMeta>, raw: Vec<u8>) {
        self.snapshot = Some(RoleSlot::loaded(signed, raw));
    }

    /// The current root file, if materialized.
    pub fn root(&self) -> Option<&Signed<RootMeta>> {
        self.root.as_ref().map(|s| &s.signed)
    }

    /// The current targets file, if materialized.
    pub fn targets(&self) -> Option<&Signed<TargetsMeta>> {
        self.targets.as_ref().map(|s| &s.signed)
    }

    /// The current snapshot file, if materialized.
    pub fn snapshot(&self) -> Option<&Signed<SnapshotMeta>> {
        self.snapshot.as_ref().map(|s| &s.signed)
    }

    /// Canonical bytes of the current signed root file.
    pub fn root_raw(&self) -> Option<&[u8]> {
        self.root.as_ref().and_then(|s| s.raw.as_deref())
    }

    /// Canonical bytes of the current signed targets file.
    pub fn targets_raw(&self) -> Option<&[u8]> {
        self.targets.as_ref().and_then(|s| s.raw.as_deref())
    }

    /// Canonical bytes of the current signed snapshot file.
    pub fn snapshot_raw(&self) -> Option<&[u8]> {
        self.snapshot.as_ref().and_then(|s| s.raw.as_deref())
    }

    /// Whether the root body has unsigned modifications.
    pub fn root_dirty(&self) -> bool {
        self.root.as_ref().is_some_and(|s| s.dirty)
    }

    /// Whether the targets body has unsigned modifications.
    pub fn targets_dirty(&self) -> bool {
        self.targets.as_ref().is_some_and(|s| s.dirty)
    }

    /// Whether root expires within the given window from now.
    pub fn root_near_expiry(&self, window: TimeDelta) -> bool {
        self.root
            .as_ref()
            .is_some_and(|s| s.signed.signed.expires <= Utc::now() + window)
    }

    /// Insert or overwrite a target in the targets body.
    pub fn add_target(&mut self, name: &str, meta: TargetMeta) -> Result<(), TufError> {
        let slot = self
            .targets
            .as_mut()
            .ok_or(TufError::MissingRole(RoleName::Targets))?;
        slot.signed.signed.targets.insert(name.to_owned(), meta);
        slot.dirty = true;
        Ok(())
    }

    /// Remove a target from the targets body. Removing a name that is not
    /// present is not an error, but still marks targets dirty.
    pub fn remove_target(&mut self, name: &str) -> Result<(), TufError> {
        let slot = self
            .targets
            .as_mut()
            .ok_or(TufError::MissingRole(RoleName::Targets))?;
        slot.signed.signed.targets.remove(name);
        slot.dirty = true;
        Ok(())
    }

    /// Re-sign root with a refreshed expiry, bumping its version.
    ///
    /// Returns the canonical bytes of the new signed file.
    pub fn sign_root(
        &mut self,
        expires: DateTime<Utc>,
        signer: &dyn Sign,
    ) -> Result<Vec<u8>, TufError> {
        let slot = self
            .root
            .as_mut()
            .ok_or(TufError::MissingRole(RoleName::Root))?;
        slot.signed.signed.version += 1;
        slot.signed.signed.expires = expires;
        let (signed, raw) = sign_body(&slot.signed.signed, signer)?;
        slot.signed = signed;
        slot.raw = Some(raw.clone());
        slot.dirty = false;
        Ok(raw)
    }

    /// Re-sign targets with a refreshed expiry, bumping its version.
    pub fn sign_targets(
        &mut self,
        expires: DateTime<Utc>,
        signer: &dyn Sign,
    ) -> Result<Vec<u8>, TufError> {
        let slot = self
            .targets
            .as_mut()
            .ok_or(TufError::MissingRole(RoleName::Targets))?;
        slot.signed.signed.version += 1;
        slot.signed.signed.expires = expires;
        let (signed, raw) = sign_body(&slot.signed.signed, signer)?;
        slot.signed = signed;
        slot.raw = Some(raw.clone());
        slot.dirty = false;
        Ok(raw)
    }

    /// Re-sign snapshot with a refreshed expiry, bumping its version.
    ///
    /// The snapshot body is first refreshed to reference the current signed
    /// root and targets files, so those must have been signed (or loaded)
    /// before this is called.
    pub fn sign_snapshot(
        &mut self,
        expires: DateTime<Utc>,
        signer: &dyn Sign,
    ) -> Result<Vec<u8>, TufError> {
        let root_ref = {
            let slot = self
                .root
                .as_ref()
                .ok_or(TufError::MissingRole(RoleName::Root))?;
            let raw = slot
                .raw
                .as_deref()
                .ok_or(TufError::MissingRole(RoleName::Root))?;
            MetaRef::for_bytes(slot.signed.signed.version, raw)
        };
        let targets_ref = {
            let slot = self
                .targets
                .as_ref()
                .ok_or(TufError::MissingRole(RoleName::Targets))?;
            let raw = slot
                .raw
                .as_deref()
                .ok_or(TufError::MissingRole(RoleName::Targets))?;
            MetaRef::for_bytes(slot.signed.signed.version, raw)
        };

        let slot = self
            .snapshot
            .as_mut()
            .ok_or(TufError::MissingRole(RoleName::Snapshot))?;
        slot.signed.signed.meta.insert(RoleName::Root, root_ref);
        slot.signed
            .signed
            .meta
            .insert(RoleName::Targets, targets_ref);
        slot.signed.signed.version += 1;
        slot.signed.signed.expires = expires;
        let (signed, raw) = sign_body(&slot.signed.signed, signer)?;
        slot.signed = signed;
        slot.raw = Some(raw.clone());
        slot.dirty = false;
        Ok(raw)
    }
}

/// Sign a role body, producing the signed file and its canonical bytes.
fn sign_body<T: Role + Clone>(body: &T, signer: &dyn Sign) -> Result<(Signed<T>, Vec<u8>), TufError> {
    let message = body.canonical_form()?;
    let raw_sig = signer.sign(&message)?;
    let signed = Signed {
        signed: body.clone(),
        signatures: vec![Signature {
            keyid: signer.key_id().to_owned(),
            method: METHOD_ECDSA.to_owned(),
            sig: base64::engine::general_purpose::STANDARD.encode(&raw_sig),
        }],
    };
    let raw = canonical::to_canonical_json(&signed)?;
    Ok((signed, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyCipher;
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

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

    struct TestSigner {
        key_pair: EcdsaKeyPair,
        rng: SystemRandom,
        key_id: String,
        public: PublicKey,
    }

    impl TestSigner {
        fn generate() -> Self {
            let rng = SystemRandom::new();
            let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
                .expect("keygen");
            let key_pair =
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref())
                    .expect("parse");
            let mut spki = SPKI_HEADER.to_vec();
            spki.extend_from_slice(key_pair.public_key().as_ref());
            let public = PublicKey::new(KeyCipher::Ecdsa, &spki);
            let key_id = public.key_id();
            Self {
                key_pair,
                rng,
                key_id,
                public,
            }
        }
    }

    impl Sign for TestSigner {
        fn key_id(&self) -> &str {
            &self.key_id
        }

        fn sign(&self, message: &[u8]) -> Result<Vec<u8>, TufError> {
            let sig = self
                .key_pair
                .sign(&self.rng, message)
                .map_err(|e| TufError::Signing(e.to_string()))?;
            Ok(sig.as_ref().to_vec())
        }
    }

    fn signed_graph() -> (RoleGraph, TestSigner, TestSigner, TestSigner) {
        let root = TestSigner::generate();
        let targets = TestSigner::generate();
        let snapshot = TestSigner::generate();
        let timestamp = TestSigner::generate();
        let mut graph = RoleGraph::init(
            root.public.clone(),
            targets.public.clone(),
            snapshot.public.clone(),
            timestamp.public.clone(),
        );
        graph
            .sign_root(crate::meta::default_expiry(RoleName::Root), &root)
            .expect("sign root");
        graph
            .sign_targets(crate::meta::default_expiry(RoleName::Targets), &targets)
            .expect("sign targets");
        graph
            .sign_snapshot(crate::meta::default_expiry(RoleName::Snapshot), &snapshot)
            .expect("sign snapshot");
        (graph, root, targets, snapshot)
    }

    #[test]
    fn init_and_sign_produces_version_one_everywhere() {
        let (graph, ..) = signed_graph();
        assert_eq!(graph.root().unwrap().signed.version, 1);
        assert_eq!(graph.targets().unwrap().signed.version, 1);
        assert_eq!(graph.snapshot().unwrap().signed.version, 1);
        assert!(!graph.root_dirty());
        assert!(!graph.targets_dirty());
    }

    #[test]
    fn snapshot_references_current_signed_bytes() {
        let (graph, ..) = signed_graph();
        let snapshot = &graph.snapshot().unwrap().signed;

        let root_ref = snapshot.meta.get(&RoleName::Root).expect("root ref");
        let root_raw = graph.root_raw().expect("root raw");
        assert_eq!(root_ref.version, 1);
        assert_eq!(root_ref.length, root_raw.len() as u64);
        assert_eq!(root_ref.sha256().unwrap(), canonical::sha256_hex(root_raw));

        let targets_ref = snapshot.meta.get(&RoleName::Targets).expect("targets ref");
        let targets_raw = graph.targets_raw().expect("targets raw");
        assert_eq!(
            targets_ref.sha256().unwrap(),
            canonical::sha256_hex(targets_raw)
        );
    }

    #[test]
    fn signed_files_carry_verifiable_signatures() {
        let (graph, root_signer, ..) = signed_graph();
        let root = graph.root().unwrap();
        let sig = &root.signatures[0];
        assert_eq!(sig.keyid, root_signer.key_id);

        let message = root.signed.canonical_form().unwrap();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&sig.sig)
            .unwrap();
        root_signer
            .public
            .verify(&message, &raw)
            .expect("root signature should verify under the root key");
    }

    #[test]
    fn add_target_marks_dirty_and_resign_bumps_version() {
        let (mut graph, _, targets_signer, snapshot_signer) = signed_graph();

        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_owned(), "00".repeat(32));
        graph
            .add_target("linux-amd64", TargetMeta { length: 1024, hashes })
            .expect("add");
        assert!(graph.targets_dirty());

        let before = graph.targets_raw().unwrap().to_vec();
        graph
            .sign_targets(
                crate::meta::default_expiry(RoleName::Targets),
                &targets_signer,
            )
            .expect("resign targets");
        graph
            .sign_snapshot(
                crate::meta::default_expiry(RoleName::Snapshot),
                &snapshot_signer,
            )
            .expect("resign snapshot");

        assert!(!graph.targets_dirty());
        assert_eq!(graph.targets().unwrap().signed.version, 2);
        assert_ne!(graph.targets_raw().unwrap(), &before[..]);
        let snap_ref = &graph.snapshot().unwrap().signed.meta[&RoleName::Targets];
        assert_eq!(snap_ref.version, 2);
    }

    #[test]
    fn remove_missing_target_is_not_an_error() {
        let (mut graph, ..) = signed_graph();
        graph.remove_target("never-added").expect("no error");
        assert!(graph.targets_dirty());
    }

    #[test]
    fn snapshot_cannot_sign_before_targets() {
        let root = TestSigner::generate();
        let targets = TestSigner::generate();
        let snapshot = TestSigner::generate();
        let timestamp = TestSigner::generate();
        let mut graph = RoleGraph::init(
            root.public.clone(),
            targets.public.clone(),
            snapshot.public.clone(),
            timestamp.public.clone(),
        );
        // Root and targets have no signed bytes yet.
        let err = graph
            .sign_snapshot(crate::meta::default_expiry(RoleName::Snapshot), &snapshot)
            .unwrap_err();
        assert!(matches!(err, TufError::MissingRole(RoleName::Root)));
    }

    #[test]
    fn near_expiry_window() {
        let (mut graph, root_signer, ..) = signed_graph();
        assert!(!graph.root_near_expiry(TimeDelta::days(7)));
        assert!(graph.root_near_expiry(TimeDelta::days(366)));

        // Re-sign with a close expiry and check the 7-day window trips.
        graph
            .sign_root(Utc::now() + TimeDelta::days(3), &root_signer)
            .expect("resign");
        assert!(graph.root_near_expiry(TimeDelta::days(7)));
    }

    #[test]
    fn empty_graph_reports_missing_roles() {
        let mut graph = RoleGraph::new();
        let signer = TestSigner::generate();
        assert!(matches!(
            graph.sign_root(Utc::now(), &signer),
            Err(TufError::MissingRole(RoleName::Root))
        ));
        assert!(graph.root().is_none());
        assert!(!graph.root_near_expiry(TimeDelta::days(7)));
    }
}
