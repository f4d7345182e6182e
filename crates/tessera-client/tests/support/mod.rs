//! Shared test fixtures: an in-memory remote store emulating the trust
//! server's view of the wire contract, plus passphrase providers.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tessera_client::error::PassphraseError;
use tessera_client::remote::{RemoteError, RemoteStore};
use tessera_client::repository::PassphraseProvider;
use tessera_trust::signer::EcdsaSigner;
use tessera_tuf::keys::PublicKey;
use tessera_tuf::meta::RoleName;

/// In-memory remote store. Clones share state, so tests can keep a handle
/// for inspection while the repository owns another.
#[derive(Clone)]
pub struct TestRemote {
    inner: Arc<Mutex<State>>,
}

struct State {
    meta: BTreeMap<RoleName, Vec<u8>>,
    puts: Vec<RoleName>,
    conflict_next_set: bool,
    timestamp_key: PublicKey,
}

impl TestRemote {
    pub fn new() -> Self {
        let (signer, _) = EcdsaSigner::generate().expect("timestamp key");
        Self {
            inner: Arc::new(Mutex::new(State {
                meta: BTreeMap::new(),
                puts: Vec::new(),
                conflict_next_set: false,
                timestamp_key: signer.public_key().clone(),
            })),
        }
    }

    /// Drain and return the roles pushed since the last call.
    pub fn take_puts(&self) -> Vec<RoleName> {
        std::mem::take(&mut self.inner.lock().unwrap().puts)
    }

    /// The currently stored bytes for a role.
    pub fn stored(&self, role: RoleName) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().meta.get(&role).cloned()
    }

    /// Overwrite stored bytes directly, bypassing the server's version
    /// check, to simulate a manipulated or rolled-back remote.
    pub fn store_raw(&self, role: RoleName, bytes: Vec<u8>) {
        self.inner.lock().unwrap().meta.insert(role, bytes);
    }

    /// Make the next `set_meta` fail with `Conflict`, simulating a
    /// concurrent publisher winning the race.
    pub fn conflict_on_next_set(&self) {
        self.inner.lock().unwrap().conflict_next_set = true;
    }
}

impl RemoteStore for TestRemote {
    async fn get_meta(&self, role: RoleName, limit: u64) -> Result<Vec<u8>, RemoteError> {
        let state = self.inner.lock().unwrap();
        let Some(bytes) = state.meta.get(&role) else {
            return Err(RemoteError::NotFound(role));
        };
        if bytes.len() as u64 > limit {
            return Err(RemoteError::Malformed(format!(
                "{role} response exceeds the {limit}-byte ceiling"
            )));
        }
        Ok(bytes.clone())
    }

    async fn set_meta(&self, role: RoleName, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let mut state = self.inner.lock().unwrap();
        if state.conflict_next_set {
            state.conflict_next_set = false;
            return Err(RemoteError::Conflict(role));
        }
        // The server rejects non-increasing versions.
        if let Some(existing) = state.meta.get(&role) {
            if version_of(existing) >= version_of(&bytes) {
                return Err(RemoteError::Conflict(role));
            }
        }
        state.meta.insert(role, bytes);
        state.puts.push(role);
        Ok(())
    }

    async fn get_key(&self, role: RoleName) -> Result<Vec<u8>, RemoteError> {
        let state = self.inner.lock().unwrap();
        if role == RoleName::Timestamp {
            Ok(serde_json::to_vec(&state.timestamp_key).expect("encode key"))
        } else {
            Err(RemoteError::NotFound(role))
        }
    }
}

fn version_of(bytes: &[u8]) -> u64 {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .and_then(|v| v.pointer("/signed/version")?.as_u64())
        .unwrap_or(0)
}

/// A provider that returns the given passphrase.
pub fn pw(passphrase: &'static str) -> impl PassphraseProvider {
    move || -> Result<String, PassphraseError> { Ok(passphrase.to_owned()) }
}

/// A provider that declines; publishes that prompt with it must abort
/// before any network write.
pub fn no_pw() -> impl PassphraseProvider {
    || -> Result<String, PassphraseError> {
        Err(PassphraseError(
            "passphrase should not be requested".to_owned(),
        ))
    }
}
