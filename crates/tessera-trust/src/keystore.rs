//! Encrypted private-key file store.
//!
//! Keys are PKCS#8 DER blobs sealed with AES-256-GCM under a key derived
//! from the caller's passphrase via PBKDF2-HMAC-SHA256. Process-local keys
//! (targets, snapshot) are sealed under the empty passphrase; root keys use
//! a caller-chosen one. Passphrases are never persisted.
//!
//! Layout: one `<id>.key` envelope per key at the store root, plus
//! `<alias>.link` files mapping aliases (certificate ids, role aliases) to
//! key ids.

use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use aws_lc_rs::pbkdf2;
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;

const KEY_FILE_EXT: &str = "key";
const LINK_FILE_EXT: &str = "link";
const SALT_LEN: usize = 16;
const DERIVED_KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: NonZeroU32 = NonZeroU32::new(210_000).unwrap();

/// Capability surface of a private-key store.
///
/// Backends are chosen at construction; the rest of the system only sees
/// this trait.
pub trait KeyStore: Send + Sync {
    /// Seal a private key under `passphrase` and persist it as `key_id`.
    fn add_encrypted(
        &mut self,
        key_id: &str,
        pkcs8_der: &[u8],
        passphrase: &str,
    ) -> Result<(), TrustError>;

    /// Decrypt and return the private key stored as `key_id`.
    fn get_decrypted(&self, key_id: &str, passphrase: &str) -> Result<Vec<u8>, TrustError>;

    /// Record that `alias` refers to `key_id`.
    fn link(&mut self, alias: &str, key_id: &str) -> Result<(), TrustError>;

    /// Follow an alias to a key id, if the alias exists.
    fn resolve(&self, alias: &str) -> Option<String>;

    /// Identifiers of the stored keys. Link entries are not included.
    fn list_keys(&self) -> Vec<String>;
}

/// The sealed on-disk form of a private key.
#[derive(Serialize, Deserialize)]
struct SealedKey {
    salt: String,
    nonce: String,
    ciphertext: String,
}

/// A [`KeyStore`] backed by one file per key under a directory.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (creating if needed) a key store at `dir`.
    pub fn open(dir: &Path) -> Result<Self, TrustError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_owned(),
        })
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.{KEY_FILE_EXT}"))
    }

    fn link_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{alias}.{LINK_FILE_EXT}"))
    }
}

impl KeyStore for FileKeyStore {
    fn add_encrypted(
        &mut self,
        key_id: &str,
        pkcs8_der: &[u8],
        passphrase: &str,
    ) -> Result<(), TrustError> {
        let rng = SystemRandom::new();
        let mut salt = [0u8; SALT_LEN];
        rng.fill(&mut salt)
            .map_err(|_| TrustError::Crypto("random salt generation failed".to_owned()))?;
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill(&mut nonce)
            .map_err(|_| TrustError::Crypto("random nonce generation failed".to_owned()))?;

        let sealing = aead_key(passphrase, &salt)?;
        let mut buf = pkcs8_der.to_vec();
        sealing
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut buf,
            )
            .map_err(|_| TrustError::Crypto("key sealing failed".to_owned()))?;

        let b64 = base64::engine::general_purpose::STANDARD;
        let envelope = SealedKey {
            salt: b64.encode(salt),
            nonce: b64.encode(nonce),
            ciphertext: b64.encode(&buf),
        };

        write_atomic(&self.key_path(key_id), &serde_json::to_vec(&envelope)?)?;
        Ok(())
    }

    fn get_decrypted(&self, key_id: &str, passphrase: &str) -> Result<Vec<u8>, TrustError> {
        let path = self.key_path(key_id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrustError::KeyNotFound(key_id.to_owned()));
            }
            Err(e) => return Err(TrustError::Io(e)),
        };
        let envelope: SealedKey = serde_json::from_slice(&data)?;

        let b64 = base64::engine::general_purpose::STANDARD;
        let salt = b64
            .decode(&envelope.salt)
            .map_err(|_| TrustError::Crypto("corrupt key envelope salt".to_owned()))?;
        let nonce_bytes = b64
            .decode(&envelope.nonce)
            .map_err(|_| TrustError::Crypto("corrupt key envelope nonce".to_owned()))?;
        let mut buf = b64
            .decode(&envelope.ciphertext)
            .map_err(|_| TrustError::Crypto("corrupt key envelope ciphertext".to_owned()))?;

        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| TrustError::Crypto("corrupt key envelope nonce".to_owned()))?;
        let opening = aead_key(passphrase, &salt)?;
        let plaintext = opening
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| TrustError::BadPassphrase)?;
        Ok(plaintext.to_vec())
    }

    fn link(&mut self, alias: &str, key_id: &str) -> Result<(), TrustError> {
        let path = self.link_path(alias);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, key_id.as_bytes())?;
        Ok(())
    }

    fn resolve(&self, alias: &str) -> Option<String> {
        let content = fs::read_to_string(self.link_path(alias)).ok()?;
        let id = content.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.to_owned())
        }
    }

    fn list_keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == KEY_FILE_EXT))
            .filter_map(|p| p.file_stem()?.to_str().map(str::to_owned))
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Derive the AEAD key for a passphrase and salt.
fn aead_key(passphrase: &str, salt: &[u8]) -> Result<LessSafeKey, TrustError> {
    let mut derived = [0u8; DERIVED_KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ITERATIONS,
        salt,
        passphrase.as_bytes(),
        &mut derived,
    );
    let unbound = UnboundKey::new(&AES_256_GCM, &derived)
        .map_err(|_| TrustError::Crypto("key derivation failed".to_owned()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Write a file via a temp sibling and rename, so readers never observe a
/// torn entry.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), TrustError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
