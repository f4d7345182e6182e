//! Remote metadata store client.
//!
//! A thin wire layer over the trust server: GET for role files and
//! server-managed public keys, multipart POST for publishing signed role
//! files. Responses are read through a caller-supplied size ceiling so an
//! endless body cannot exhaust memory.

use futures_util::TryStreamExt;

use tessera_tuf::meta::RoleName;

/// Default ceiling for role metadata responses.
pub const DEFAULT_META_SIZE_LIMIT: u64 = 5 * 1024 * 1024;

/// Ceiling for server-managed public key responses.
pub const KEY_SIZE_LIMIT: u64 = 64 * 1024;

/// Wire-level failures, mapped to a small set of kinds.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The remote has no such role file (HTTP 404).
    #[error("{0} not found on remote")]
    NotFound(RoleName),

    /// The remote rejected an update, likely due to a concurrent publisher.
    #[error("remote rejected the {0} update")]
    Conflict(RoleName),

    /// Network or HTTP-level failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Unparseable or oversized response.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Client view of the remote trust server's wire contract.
#[expect(async_fn_in_trait, reason = "internal seam; all implementations are Send")]
pub trait RemoteStore: Send + Sync {
    /// Fetch a role file, failing with [`RemoteError::Malformed`] if the
    /// response exceeds `limit` bytes.
    async fn get_meta(&self, role: RoleName, limit: u64) -> Result<Vec<u8>, RemoteError>;

    /// Push a signed role file.
    async fn set_meta(&self, role: RoleName, bytes: Vec<u8>) -> Result<(), RemoteError>;

    /// Fetch the public key the server uses for a server-managed role.
    async fn get_key(&self, role: RoleName) -> Result<Vec<u8>, RemoteError>;
}

/// [`RemoteStore`] over HTTPS. The caller supplies the `reqwest::Client`,
/// keeping transport construction and timeouts outside the core.
pub struct HttpRemoteStore {
    base_url: String,
    gun: String,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Address a collection under `base_url` (scheme and host, no trailing
    /// slash required).
    pub fn new(
        base_url: impl Into<String>,
        gun: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            gun: gun.into(),
            client,
        }
    }

    fn tuf_path(&self) -> String {
        format!("{}/v2/{}/_trust/tuf/", self.base_url, self.gun)
    }

    fn meta_url(&self, role: RoleName) -> String {
        format!("{}{role}.json", self.tuf_path())
    }

    fn key_url(&self, role: RoleName) -> String {
        format!("{}{role}.key", self.tuf_path())
    }

    async fn fetch(&self, url: String, role: RoleName, limit: u64) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(RemoteError::NotFound(role));
        }
        if !status.is_success() {
            return Err(RemoteError::Transport(format!(
                "unexpected status {status} from {url}"
            )));
        }

        // Stream the body so no more than the ceiling is ever buffered.
        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(RemoteError::Malformed(format!(
                    "{role} response exceeds the {limit}-byte ceiling"
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn get_meta(&self, role: RoleName, limit: u64) -> Result<Vec<u8>, RemoteError> {
        self.fetch(self.meta_url(role), role, limit).await
    }

    async fn set_meta(&self, role: RoleName, bytes: Vec<u8>) -> Result<(), RemoteError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("{role}.json"))
            .mime_str("application/json")
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("files", part);

        let resp = self
            .client
            .post(self.tuf_path())
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(%role, "pushed role file");
            return Ok(());
        }
        match status.as_u16() {
            404 => Err(RemoteError::NotFound(role)),
            409 => Err(RemoteError::Conflict(role)),
            s => Err(RemoteError::Transport(format!(
                "unexpected status {s} publishing {role}"
            ))),
        }
    }

    async fn get_key(&self, role: RoleName) -> Result<Vec<u8>, RemoteError> {
        self.fetch(self.key_url(role), role, KEY_SIZE_LIMIT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_carry_the_gun_path_segment() {
        let store = HttpRemoteStore::new(
            "https://trust.example/",
            "example.com/app",
            reqwest::Client::new(),
        );
        assert_eq!(
            store.meta_url(RoleName::Root),
            "https://trust.example/v2/example.com/app/_trust/tuf/root.json"
        );
        assert_eq!(
            store.key_url(RoleName::Timestamp),
            "https://trust.example/v2/example.com/app/_trust/tuf/timestamp.key"
        );
        assert_eq!(
            store.tuf_path(),
            "https://trust.example/v2/example.com/app/_trust/tuf/"
        );
    }
}
