//! The repository controller: lifecycle orchestration for one collection.
//!
//! A `Repository` binds a GUN to a base directory of trust stores and a
//! remote store. It is logically single-threaded: callers that need
//! parallelism create independent instances, which share the on-disk
//! stores and rely on the changelist lock during publish.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;

use tessera_trust::certificate;
use tessera_trust::certstore::CertificateStore;
use tessera_trust::keystore::{FileKeyStore, KeyStore};
use tessera_trust::signer::{EcdsaSigner, UnlockedSigner};
use tessera_tuf::canonical;
use tessera_tuf::graph::RoleGraph;
use tessera_tuf::keys::{KeyCipher, PublicKey};
use tessera_tuf::meta::{
    RoleName, RootMeta, Signed, SnapshotMeta, TargetMeta, TargetsMeta, default_expiry,
};
use tessera_tuf::verify::{check_expiry, check_version};

use crate::apply::apply_changes;
use crate::cache::MetadataCache;
use crate::changelist::{Change, Changelist, ChangelistLock};
use crate::error::{ClientError, PassphraseError};
use crate::remote::{DEFAULT_META_SIZE_LIMIT, RemoteError, RemoteStore};
use crate::root_verifier::RootVerifier;
use crate::signing;
use crate::updater::TrustedView;

const TRUST_DIR: &str = "trusted_certificates";
const PRIVATE_DIR: &str = "private";
const ROOT_KEYS_DIR: &str = "root_keys";
const TUF_DIR: &str = "tuf";
const METADATA_DIR: &str = "metadata";
const CHANGELIST_DIR: &str = "changelist";

/// How close to expiry root may get before publish proactively re-signs it.
pub const ROOT_NEAR_EXPIRY_DAYS: i64 = 7;

/// Supplies the root-key passphrase during publish.
///
/// Called at most once per publish, and only when root re-signing is
/// required. An error aborts the publish before any network write.
pub trait PassphraseProvider {
    /// Produce the passphrase, or decline.
    fn passphrase(&self) -> Result<String, PassphraseError>;
}

impl<F> PassphraseProvider for F
where
    F: Fn() -> Result<String, PassphraseError>,
{
    fn passphrase(&self) -> Result<String, PassphraseError> {
        self()
    }
}

/// A caller-facing target record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The target's name (a UTF-8 path).
    pub name: String,
    /// Length in bytes.
    pub length: u64,
    /// Hash algorithm name to hex digest.
    pub hashes: BTreeMap<String, String>,
}

impl Target {
    /// Build a target record by hashing a local file.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self, ClientError> {
        let data = std::fs::read(path)?;
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_owned(), canonical::sha256_hex(&data));
        Ok(Self {
            name: name.into(),
            length: data.len() as u64,
            hashes,
        })
    }
}

/// Configuration for opening a [`Repository`].
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Base directory for every on-disk store.
    pub base_dir: PathBuf,
    /// The collection's globally unique name.
    pub gun: String,
    /// Ceiling for remote metadata responses.
    pub meta_size_limit: u64,
    /// Window before root expiry that triggers proactive re-signing.
    pub root_near_expiry: TimeDelta,
}

impl RepositoryConfig {
    /// Defaults for the given base directory and GUN.
    pub fn new(base_dir: impl Into<PathBuf>, gun: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            gun: gun.into(),
            meta_size_limit: DEFAULT_META_SIZE_LIMIT,
            root_near_expiry: TimeDelta::days(ROOT_NEAR_EXPIRY_DAYS),
        }
    }
}

/// A client handle on one trust collection.
pub struct Repository<R> {
    config: RepositoryConfig,
    remote: R,
    ca_store: CertificateStore,
    cert_store: CertificateStore,
    key_store: FileKeyStore,
    root_key_store: FileKeyStore,
    cache: MetadataCache,
    graph: RoleGraph,
}

impl<R: RemoteStore> Repository<R> {
    /// Open the stores under the configured base directory.
    pub fn open(config: RepositoryConfig, remote: R) -> Result<Self, ClientError> {
        let trust_dir = config.base_dir.join(TRUST_DIR);
        let ca_store = CertificateStore::open_authorities(&trust_dir)?;
        let cert_store = CertificateStore::open_leaves(&trust_dir)?;

        let private_dir = config.base_dir.join(PRIVATE_DIR);
        let key_store = FileKeyStore::open(&private_dir)?;
        let root_key_store = FileKeyStore::open(&private_dir.join(ROOT_KEYS_DIR))?;

        let cache = MetadataCache::open(
            &config
                .base_dir
                .join(TUF_DIR)
                .join(&config.gun)
                .join(METADATA_DIR),
        )?;

        Ok(Self {
            config,
            remote,
            ca_store,
            cert_store,
            key_store,
            root_key_store,
            cache,
            graph: RoleGraph::new(),
        })
    }

    /// The collection's GUN.
    pub fn gun(&self) -> &str {
        &self.config.gun
    }

    fn changelist_dir(&self) -> PathBuf {
        self.config
            .base_dir
            .join(TUF_DIR)
            .join(&self.config.gun)
            .join(CHANGELIST_DIR)
    }

    /// Create the collection, bound to the caller's root key.
    ///
    /// Mints a self-signed certificate naming the GUN, pins it, links its
    /// content-hash identifier to the root key, fetches the server's
    /// timestamp key, generates targets and snapshot keys, and signs and
    /// caches the initial root, targets, and snapshot files.
    pub async fn initialize(&mut self, signer: &UnlockedSigner) -> Result<(), ClientError> {
        let cert_der = signer.generate_certificate(&self.config.gun)?;
        let fingerprint = self.cert_store.add(&cert_der)?;
        tracing::debug!(%fingerprint, "pinned root certificate");

        let cert_pem = certificate::pem_encode(&cert_der, certificate::CERTIFICATE_PEM_LABEL);
        let root_key = PublicKey::new(KeyCipher::EcdsaX509, cert_pem.as_bytes());
        let root_key_id = root_key.key_id();
        self.root_key_store.link(&root_key_id, signer.key_id())?;

        // The server signs timestamp; pin its key on first use.
        let ts_bytes = self.remote.get_key(RoleName::Timestamp).await?;
        let timestamp_key: PublicKey = serde_json::from_slice(&ts_bytes).map_err(|e| {
            ClientError::Remote(RemoteError::Malformed(format!("timestamp key: {e}")))
        })?;

        let targets_key =
            signing::generate_role_key(&mut self.key_store, &self.config.gun, RoleName::Targets)?;
        let snapshot_key =
            signing::generate_role_key(&mut self.key_store, &self.config.gun, RoleName::Snapshot)?;

        self.graph = RoleGraph::init(root_key, targets_key, snapshot_key, timestamp_key);

        let root_signer = signer.signer_for(&root_key_id)?;
        let root_raw = self
            .graph
            .sign_root(default_expiry(RoleName::Root), &root_signer)?;
        let targets_signer =
            signing::role_signer(&self.key_store, &self.config.gun, RoleName::Targets)?;
        let targets_raw = self
            .graph
            .sign_targets(default_expiry(RoleName::Targets), &targets_signer)?;
        let snapshot_signer =
            signing::role_signer(&self.key_store, &self.config.gun, RoleName::Snapshot)?;
        let snapshot_raw = self
            .graph
            .sign_snapshot(default_expiry(RoleName::Snapshot), &snapshot_signer)?;

        self.cache.set(RoleName::Root, &root_raw)?;
        self.cache.set(RoleName::Targets, &targets_raw)?;
        self.cache.set(RoleName::Snapshot, &snapshot_raw)?;

        tracing::info!(gun = %self.config.gun, "initialized trust collection");
        Ok(())
    }

    /// Stage a target for addition. Durable once this returns; nothing is
    /// signed or sent until publish.
    pub fn add_target(&self, target: &Target) -> Result<(), ClientError> {
        let meta = TargetMeta {
            length: target.length,
            hashes: target.hashes.clone(),
        };
        let payload = canonical::to_canonical_json(&meta)?;
        let change = Change::create(
            Change::SCOPE_TARGETS,
            Change::TYPE_TARGET,
            &target.name,
            &payload,
        );
        let mut changelist = Changelist::open(&self.changelist_dir())?;
        changelist.add(&change)
    }

    /// Stage a target for removal.
    pub fn remove_target(&self, name: &str) -> Result<(), ClientError> {
        let change = Change::delete(Change::SCOPE_TARGETS, Change::TYPE_TARGET, name);
        let mut changelist = Changelist::open(&self.changelist_dir())?;
        changelist.add(&change)
    }

    /// Fetch, verify, and list the collection's targets.
    pub async fn list_targets(&mut self) -> Result<Vec<Target>, ClientError> {
        self.bootstrap_remote().await?;
        self.refresh_view().await?;

        let targets = self
            .graph
            .targets()
            .ok_or_else(|| ClientError::Internal("view ready without targets".to_owned()))?;
        Ok(targets
            .signed
            .targets
            .iter()
            .map(|(name, meta)| Target {
                name: name.clone(),
                length: meta.length,
                hashes: meta.hashes.clone(),
            })
            .collect())
    }

    /// Fetch, verify, and return a single target record.
    pub async fn target_by_name(&mut self, name: &str) -> Result<Target, ClientError> {
        let mut targets = self.list_targets().await?;
        targets
            .iter()
            .position(|t| t.name == name)
            .map(|i| targets.swap_remove(i))
            .ok_or_else(|| ClientError::TargetNotFound(name.to_owned()))
    }

    /// Publish staged changes as a freshly signed, consistent role set.
    ///
    /// Bootstraps from the remote (or from the local cache on first
    /// publish), replays the changelist, re-signs root when dirty or near
    /// expiry, always re-signs targets and snapshot, then pushes in
    /// dependency order. The changelist drains only after every push
    /// succeeds, so a failed publish is always safe to retry.
    pub async fn publish(&mut self, passphrase: &impl PassphraseProvider) -> Result<(), ClientError> {
        let changelist_dir = self.changelist_dir();
        let _lock = ChangelistLock::acquire(&changelist_dir)?;

        let mut update_root = false;
        match self.bootstrap_remote().await {
            Ok(()) => self.refresh_view().await?,
            Err(ClientError::Remote(RemoteError::NotFound(_))) => {
                // The server has never seen this collection; fall back to
                // the local cache and push root along with everything else.
                tracing::debug!(gun = %self.config.gun, "remote has no root; first publish");
                if self.bootstrap_local().is_err() {
                    return Err(ClientError::NotInitialized);
                }
                update_root = true;
            }
            Err(e) => return Err(e),
        }

        let mut changelist = Changelist::open(&changelist_dir)?;
        let changes = changelist.list()?;
        apply_changes(&mut self.graph, &changes)?;

        if self.graph.root_dirty() || self.graph.root_near_expiry(self.config.root_near_expiry) {
            tracing::debug!("root is dirty or near expiry; re-signing");
            let pw = passphrase.passphrase()?;
            let root_key_id = self.root_role_key_id()?;
            let root_signer = signing::unlock_root_signer(&self.root_key_store, &root_key_id, &pw)?;
            self.graph
                .sign_root(default_expiry(RoleName::Root), &root_signer)?;
            update_root = true;
        }

        // Targets and snapshot are re-signed on every publish so snapshot
        // always references a stable, current hash.
        let targets_signer =
            signing::role_signer(&self.key_store, &self.config.gun, RoleName::Targets)?;
        let targets_raw = self
            .graph
            .sign_targets(default_expiry(RoleName::Targets), &targets_signer)?;
        let snapshot_signer =
            signing::role_signer(&self.key_store, &self.config.gun, RoleName::Snapshot)?;
        let snapshot_raw = self
            .graph
            .sign_snapshot(default_expiry(RoleName::Snapshot), &snapshot_signer)?;

        let root_raw = if update_root {
            Some(
                self.graph
                    .root_raw()
                    .ok_or_else(|| ClientError::Internal("no signed root to upload".to_owned()))?
                    .to_vec(),
            )
        } else {
            None
        };

        // Push in dependency order; timestamp is the server's to sign.
        if let Some(ref raw) = root_raw {
            self.remote.set_meta(RoleName::Root, raw.clone()).await?;
        }
        self.remote
            .set_meta(RoleName::Targets, targets_raw.clone())
            .await?;
        self.remote
            .set_meta(RoleName::Snapshot, snapshot_raw.clone())
            .await?;

        if let Some(ref raw) = root_raw {
            self.cache.set(RoleName::Root, raw)?;
        }
        self.cache.set(RoleName::Targets, &targets_raw)?;
        self.cache.set(RoleName::Snapshot, &snapshot_raw)?;

        changelist.clear()?;
        tracing::info!(
            gun = %self.config.gun,
            changes = changes.len(),
            pushed_root = update_root,
            "published collection"
        );
        Ok(())
    }

    /// Identifiers of the stored root keys.
    pub fn list_root_keys(&self) -> Vec<String> {
        self.root_key_store.list_keys()
    }

    /// Generate a root key sealed under `passphrase`; returns its id.
    pub fn gen_root_key(&mut self, passphrase: &str) -> Result<String, ClientError> {
        let (signer, pkcs8) = EcdsaSigner::generate()?;
        let key_id = signer.key_id().to_owned();
        self.root_key_store
            .add_encrypted(&key_id, &pkcs8, passphrase)?;
        tracing::debug!(%key_id, "generated root key");
        Ok(key_id)
    }

    /// Unlock a stored root key for use with [`Repository::initialize`].
    pub fn root_signer(
        &self,
        key_id: &str,
        passphrase: &str,
    ) -> Result<UnlockedSigner, ClientError> {
        let pkcs8 = self.root_key_store.get_decrypted(key_id, passphrase)?;
        Ok(UnlockedSigner::new(pkcs8)?)
    }

    /// Import a certificate authority into the local CA store.
    pub fn import_certificate_authority(&mut self, der: &[u8]) -> Result<String, ClientError> {
        Ok(self.ca_store.add(der)?)
    }

    /// Pin an end-entity certificate into the local certificate store.
    pub fn import_trusted_certificate(&mut self, der: &[u8]) -> Result<String, ClientError> {
        Ok(self.cert_store.add(der)?)
    }

    /// Fetch and verify root from the remote, replacing the in-memory
    /// graph on success.
    async fn bootstrap_remote(&mut self) -> Result<(), ClientError> {
        let bytes = self
            .remote
            .get_meta(RoleName::Root, self.config.meta_size_limit)
            .await?;
        let signed: Signed<RootMeta> = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::Remote(RemoteError::Malformed(format!("root: {e}"))))?;

        let verifier = RootVerifier::new(&self.cert_store, &self.ca_store, &self.config.gun);
        verifier.verify(&signed)?;
        check_expiry(&signed.signed)?;

        let trusted = self.cache.trusted_version::<RootMeta>(RoleName::Root)?;
        check_version(RoleName::Root, trusted, signed.signed.version)?;

        self.cache.set(RoleName::Root, &bytes)?;
        let mut graph = RoleGraph::new();
        graph.set_root(signed, bytes);
        self.graph = graph;
        Ok(())
    }

    /// Load the collection from the local cache without re-verification;
    /// the cache holds only bytes this client wrote after verifying or
    /// signing them.
    fn bootstrap_local(&mut self) -> Result<(), ClientError> {
        let mut graph = RoleGraph::new();

        let root_bytes = self
            .cache
            .get(RoleName::Root)?
            .ok_or(ClientError::NotInitialized)?;
        let root: Signed<RootMeta> = serde_json::from_slice(&root_bytes)?;
        graph.set_root(root, root_bytes);

        let targets_bytes = self
            .cache
            .get(RoleName::Targets)?
            .ok_or(ClientError::NotInitialized)?;
        let targets: Signed<TargetsMeta> = serde_json::from_slice(&targets_bytes)?;
        graph.set_targets(targets, targets_bytes);

        let snapshot_bytes = self
            .cache
            .get(RoleName::Snapshot)?
            .ok_or(ClientError::NotInitialized)?;
        let snapshot: Signed<SnapshotMeta> = serde_json::from_slice(&snapshot_bytes)?;
        graph.set_snapshot(snapshot, snapshot_bytes);

        self.graph = graph;
        Ok(())
    }

    /// Bring snapshot and targets current through a fresh trusted view.
    async fn refresh_view(&mut self) -> Result<(), ClientError> {
        let mut view = TrustedView::new(
            &self.remote,
            &self.cache,
            &mut self.graph,
            self.config.meta_size_limit,
        );
        view.update().await
    }

    /// The first key id listed for the root role in the current root body.
    fn root_role_key_id(&self) -> Result<String, ClientError> {
        let root = &self
            .graph
            .root()
            .ok_or_else(|| ClientError::Internal("no root loaded".to_owned()))?
            .signed;
        root.roles
            .get(&RoleName::Root)
            .and_then(|spec| spec.keyids.first())
            .cloned()
            .ok_or_else(|| ClientError::Internal("root role has no keys".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_from_file_hashes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        std::fs::write(&path, b"artifact bytes").unwrap();

        let target = Target::from_file("artifact.bin", &path).unwrap();
        assert_eq!(target.name, "artifact.bin");
        assert_eq!(target.length, 14);
        assert_eq!(
            target.hashes.get("sha256").unwrap(),
            &canonical::sha256_hex(b"artifact bytes")
        );
    }

    #[test]
    fn config_defaults() {
        let config = RepositoryConfig::new("/tmp/trust", "example.com/app");
        assert_eq!(config.meta_size_limit, DEFAULT_META_SIZE_LIMIT);
        assert_eq!(config.root_near_expiry, TimeDelta::days(ROOT_NEAR_EXPIRY_DAYS));
    }
}
