//! The verified client view of a remote collection.
//!
//! Starting from a trusted root, the view fetches snapshot under root's
//! authorized snapshot keys, then targets under snapshot's recorded
//! version and hash, verifying signatures, expiry, and version monotonicity
//! at each step.
//!
//! State machine: `Empty → RootTrusted → SnapshotTrusted → Ready`. Any
//! failure moves the view to `Invalid`, which is terminal; callers build a
//! new view to retry.

use tessera_tuf::canonical;
use tessera_tuf::error::TufError;
use tessera_tuf::graph::RoleGraph;
use tessera_tuf::meta::{RoleName, RoleSpec, SnapshotMeta, TargetsMeta};
use tessera_tuf::verify::{check_expiry, check_version, verify_signed};
use tessera_tuf::{PublicKey, Signed};

use crate::cache::MetadataCache;
use crate::error::ClientError;
use crate::remote::{RemoteError, RemoteStore};

/// Where a view stands in its verification sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// No trusted root yet.
    Empty,
    /// Root verified; snapshot not yet fetched.
    RootTrusted,
    /// Snapshot verified under root's keys.
    SnapshotTrusted,
    /// Targets verified under snapshot's reference; the view is usable.
    Ready,
    /// A step failed; the view is unusable.
    Invalid,
}

/// A single-use updater that brings a role graph current with the remote.
pub struct TrustedView<'a, R> {
    remote: &'a R,
    cache: &'a MetadataCache,
    graph: &'a mut RoleGraph,
    limit: u64,
    state: ViewState,
}

impl<'a, R: RemoteStore> TrustedView<'a, R> {
    /// Build a view over a graph that already holds a verified root.
    pub fn new(
        remote: &'a R,
        cache: &'a MetadataCache,
        graph: &'a mut RoleGraph,
        limit: u64,
    ) -> Self {
        let state = if graph.root().is_some() {
            ViewState::RootTrusted
        } else {
            ViewState::Empty
        };
        Self {
            remote,
            cache,
            graph,
            limit,
            state,
        }
    }

    /// The view's current state.
    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Fetch and verify snapshot and targets. Any failure is terminal for
    /// this view.
    pub async fn update(&mut self) -> Result<(), ClientError> {
        match self.update_inner().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ViewState::Invalid;
                Err(e)
            }
        }
    }

    async fn update_inner(&mut self) -> Result<(), ClientError> {
        if self.state != ViewState::RootTrusted {
            return Err(ClientError::Internal(
                "view must start from a trusted root".to_owned(),
            ));
        }
        self.fetch_snapshot().await?;
        self.fetch_targets().await?;
        Ok(())
    }

    async fn fetch_snapshot(&mut self) -> Result<(), ClientError> {
        let bytes = self.remote.get_meta(RoleName::Snapshot, self.limit).await?;
        let signed: Signed<SnapshotMeta> = serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::Remote(RemoteError::Malformed(format!("snapshot: {e}")))
        })?;

        let (keys, spec) = self.role_authority(RoleName::Snapshot)?;
        verify_signed(&signed, RoleName::Snapshot, &keys, &spec)?;
        check_expiry(&signed.signed)?;

        let trusted = self
            .cache
            .trusted_version::<SnapshotMeta>(RoleName::Snapshot)?;
        check_version(RoleName::Snapshot, trusted, signed.signed.version)?;

        self.cache.set(RoleName::Snapshot, &bytes)?;
        self.graph.set_snapshot(signed, bytes);
        self.state = ViewState::SnapshotTrusted;
        tracing::debug!("snapshot trusted");
        Ok(())
    }

    async fn fetch_targets(&mut self) -> Result<(), ClientError> {
        let (expected_hash, expected_version) = {
            let snapshot = &self
                .graph
                .snapshot()
                .ok_or_else(|| ClientError::Internal("no trusted snapshot".to_owned()))?
                .signed;
            let meta_ref = snapshot.meta.get(&RoleName::Targets).ok_or_else(|| {
                ClientError::Remote(RemoteError::Malformed(
                    "snapshot does not reference targets".to_owned(),
                ))
            })?;
            let hash = meta_ref.sha256().ok_or_else(|| {
                ClientError::Remote(RemoteError::Malformed(
                    "snapshot records no sha256 for targets".to_owned(),
                ))
            })?;
            (hash.to_owned(), meta_ref.version)
        };

        let bytes = self.remote.get_meta(RoleName::Targets, self.limit).await?;

        let actual_hash = canonical::sha256_hex(&bytes);
        if actual_hash != expected_hash {
            return Err(TufError::HashMismatch {
                role: RoleName::Targets,
                expected: expected_hash,
                actual: actual_hash,
            }
            .into());
        }

        let signed: Signed<TargetsMeta> = serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::Remote(RemoteError::Malformed(format!("targets: {e}")))
        })?;
        if signed.signed.version != expected_version {
            return Err(TufError::VersionMismatch {
                role: RoleName::Targets,
                expected: expected_version,
                actual: signed.signed.version,
            }
            .into());
        }

        let (keys, spec) = self.role_authority(RoleName::Targets)?;
        verify_signed(&signed, RoleName::Targets, &keys, &spec)?;
        check_expiry(&signed.signed)?;
        validate_target_hashes(&signed.signed)?;

        let trusted = self.cache.trusted_version::<TargetsMeta>(RoleName::Targets)?;
        check_version(RoleName::Targets, trusted, signed.signed.version)?;

        self.cache.set(RoleName::Targets, &bytes)?;
        self.graph.set_targets(signed, bytes);
        self.state = ViewState::Ready;
        tracing::debug!("targets trusted; view ready");
        Ok(())
    }

    /// The key set and role spec root declares for a role.
    fn role_authority(
        &self,
        role: RoleName,
    ) -> Result<(std::collections::BTreeMap<String, PublicKey>, RoleSpec), ClientError> {
        let root = &self
            .graph
            .root()
            .ok_or_else(|| ClientError::Internal("view lost its trusted root".to_owned()))?
            .signed;
        let spec = root.roles.get(&role).cloned().ok_or_else(|| {
            ClientError::Remote(RemoteError::Malformed(format!(
                "root declares no {role} role"
            )))
        })?;
        Ok((root.keys.clone(), spec))
    }
}

/// Reject a targets body whose records carry empty or malformed hash sets.
fn validate_target_hashes(targets: &TargetsMeta) -> Result<(), ClientError> {
    for (name, meta) in &targets.targets {
        let well_formed = !meta.hashes.is_empty()
            && meta.hashes.iter().all(|(algorithm, digest)| {
                digest.chars().all(|c| c.is_ascii_hexdigit())
                    && match algorithm.as_str() {
                        "sha256" => digest.len() == 64,
                        "sha512" => digest.len() == 128,
                        _ => !digest.is_empty(),
                    }
            });
        if !well_formed {
            return Err(ClientError::Remote(RemoteError::Malformed(format!(
                "target `{name}` carries a malformed hash set"
            ))));
        }
    }
    Ok(())
}
