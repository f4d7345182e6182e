//! Local cache of signed role files.
//!
//! One JSON file per role under `{base}/tuf/{gun}/metadata/`. The cache is
//! written after `initialize` and after every verified fetch, and is what
//! the first-publish fallback loads when the remote has never seen the
//! collection.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use tessera_tuf::meta::{Role, RoleName, Signed};

use crate::error::ClientError;

/// The on-disk role file cache for one collection.
pub struct MetadataCache {
    dir: PathBuf,
}

impl MetadataCache {
    /// Open (creating if needed) the cache at `dir`.
    pub fn open(dir: &Path) -> Result<Self, ClientError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_owned(),
        })
    }

    fn path(&self, role: RoleName) -> PathBuf {
        self.dir.join(format!("{role}.json"))
    }

    /// Read a cached role file, `None` if the role was never cached.
    pub fn get(&self, role: RoleName) -> Result<Option<Vec<u8>>, ClientError> {
        match fs::read(self.path(role)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    /// Replace a cached role file atomically.
    pub fn set(&self, role: RoleName, bytes: &[u8]) -> Result<(), ClientError> {
        let path = self.path(role);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// The locally trusted version of a role, 0 if never cached.
    ///
    /// Fetched role files are rejected when their version falls below this.
    pub fn trusted_version<T>(&self, role: RoleName) -> Result<u64, ClientError>
    where
        T: Role + DeserializeOwned,
    {
        match self.get(role)? {
            Some(bytes) => {
                let signed: Signed<T> = serde_json::from_slice(&bytes)?;
                Ok(signed.signed.version())
            }
            None => Ok(0),
        }
    }
}
