//! Role bodies and signed metadata files.
//!
//! Each top-level role materializes as a body struct plus a [`Signed`]
//! wrapper pairing the body with detached signatures over its canonical
//! form. Snapshot references root and targets by version and hash;
//! timestamp references snapshot the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::error::TufError;
use crate::keys::PublicKey;

/// The signing method tag recorded next to each signature.
pub const METHOD_ECDSA: &str = "ecdsa";

/// One of the four top-level TUF roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    /// Trust anchor: declares every role's keys and thresholds.
    Root,
    /// Maps target names to lengths and content hashes.
    Targets,
    /// Records the current version and hash of every non-timestamp role.
    Snapshot,
    /// Signed by the server only; references the current snapshot.
    Timestamp,
}

impl RoleName {
    /// All four roles, in signing dependency order.
    pub const ALL: [Self; 4] = [Self::Root, Self::Targets, Self::Snapshot, Self::Timestamp];

    /// The lowercase wire name of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Targets => "targets",
            Self::Snapshot => "snapshot",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = TufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(Self::Root),
            "targets" => Ok(Self::Targets),
            "snapshot" => Ok(Self::Snapshot),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(TufError::UnknownRole(other.to_owned())),
        }
    }
}

/// Default expiry for freshly signed metadata of the given role.
pub fn default_expiry(role: RoleName) -> DateTime<Utc> {
    let days = match role {
        RoleName::Root => 365,
        RoleName::Targets => 90,
        RoleName::Snapshot => 7,
        RoleName::Timestamp => 1,
    };
    Utc::now() + TimeDelta::days(days)
}

/// A detached signature over a role body's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// The identifier of the key that produced this signature.
    pub keyid: String,
    /// The signing method (see [`METHOD_ECDSA`]).
    pub method: String,
    /// Base64 of the raw signature bytes.
    pub sig: String,
}

/// A signed role file: the body plus the signatures over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<T> {
    /// The role body.
    pub signed: T,
    /// Signatures over the body's canonical JSON.
    pub signatures: Vec<Signature>,
}

/// A role's entry in root's role table: its authorized keys and threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Identifiers of the keys authorized to sign for the role.
    pub keyids: Vec<String>,
    /// Minimum number of valid signatures required.
    pub threshold: u32,
}

/// Common surface of the four role bodies.
pub trait Role: Serialize {
    /// The role this body belongs to.
    const TYPE: RoleName;

    /// The body's monotonically increasing version.
    fn version(&self) -> u64;

    /// When this body stops being trustworthy.
    fn expires(&self) -> DateTime<Utc>;

    /// The canonical JSON bytes that get hashed and signed.
    fn canonical_form(&self) -> Result<Vec<u8>, TufError> {
        canonical::to_canonical_json(self)
    }
}

/// The root body: the trust anchor of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "root")]
pub struct RootMeta {
    /// Monotonically increasing version.
    pub version: u64,
    /// Expiry timestamp.
    pub expires: DateTime<Utc>,
    /// Whether the collection uses consistent-snapshot naming.
    pub consistent_snapshot: bool,
    /// Every known public key, indexed by key identifier.
    pub keys: BTreeMap<String, PublicKey>,
    /// Role table: authorized key ids and threshold per role.
    pub roles: BTreeMap<RoleName, RoleSpec>,
}

impl Role for RootMeta {
    const TYPE: RoleName = RoleName::Root;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

/// Metadata for a single target: its length and content hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMeta {
    /// Length of the target in bytes.
    pub length: u64,
    /// Hash algorithm name to hex digest.
    pub hashes: BTreeMap<String, String>,
}

/// The targets body: the mapping from target names to their metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "targets")]
pub struct TargetsMeta {
    /// Monotonically increasing version.
    pub version: u64,
    /// Expiry timestamp.
    pub expires: DateTime<Utc>,
    /// Target name to target metadata.
    pub targets: BTreeMap<String, TargetMeta>,
}

impl Role for TargetsMeta {
    const TYPE: RoleName = RoleName::Targets;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

/// A reference to another role file by version, length, and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRef {
    /// The referenced role file's version.
    pub version: u64,
    /// The referenced role file's length in bytes.
    pub length: u64,
    /// Hash algorithm name to hex digest of the referenced file.
    pub hashes: BTreeMap<String, String>,
}

impl MetaRef {
    /// Build a reference to a role file from its canonical bytes.
    pub fn for_bytes(version: u64, bytes: &[u8]) -> Self {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_owned(), canonical::sha256_hex(bytes));
        Self {
            version,
            length: bytes.len() as u64,
            hashes,
        }
    }

    /// The recorded SHA-256 digest, if any.
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get("sha256").map(String::as_str)
    }
}

/// The snapshot body: current version and hash of every non-timestamp role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "snapshot")]
pub struct SnapshotMeta {
    /// Monotonically increasing version.
    pub version: u64,
    /// Expiry timestamp.
    pub expires: DateTime<Utc>,
    /// Role name to role file reference.
    pub meta: BTreeMap<RoleName, MetaRef>,
}

impl Role for SnapshotMeta {
    const TYPE: RoleName = RoleName::Snapshot;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

/// The timestamp body: a short-lived reference to the current snapshot.
/// Always signed by the remote, never by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "timestamp")]
pub struct TimestampMeta {
    /// Monotonically increasing version.
    pub version: u64,
    /// Expiry timestamp (short).
    pub expires: DateTime<Utc>,
    /// Reference to the current snapshot.
    pub meta: BTreeMap<RoleName, MetaRef>,
}

impl Role for TimestampMeta {
    const TYPE: RoleName = RoleName::Timestamp;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyCipher;

    #[test]
    fn role_name_round_trips() {
        for role in RoleName::ALL {
            assert_eq!(role.as_str().parse::<RoleName>().unwrap(), role);
        }
        assert!(matches!(
            "delegation".parse::<RoleName>(),
            Err(TufError::UnknownRole(_))
        ));
    }

    #[test]
    fn default_expiries_are_ordered() {
        // Longer-lived roles expire after shorter-lived ones.
        assert!(default_expiry(RoleName::Root) > default_expiry(RoleName::Targets));
        assert!(default_expiry(RoleName::Targets) > default_expiry(RoleName::Snapshot));
        assert!(default_expiry(RoleName::Snapshot) > default_expiry(RoleName::Timestamp));
        assert!(default_expiry(RoleName::Timestamp) > Utc::now());
    }

    #[test]
    fn root_body_round_trips_through_canonical_json() {
        let key = PublicKey::new(KeyCipher::Ecdsa, b"material");
        let mut keys = BTreeMap::new();
        keys.insert(key.key_id(), key.clone());
        let mut roles = BTreeMap::new();
        roles.insert(
            RoleName::Root,
            RoleSpec {
                keyids: vec![key.key_id()],
                threshold: 1,
            },
        );
        let root = RootMeta {
            version: 3,
            expires: Utc::now() + TimeDelta::days(1),
            consistent_snapshot: false,
            keys,
            roles,
        };

        let bytes = root.canonical_form().expect("canonicalize");
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(r#""_type":"root""#));

        let parsed: RootMeta = serde_json::from_slice(&bytes).expect("parse back");
        assert_eq!(parsed, root);
    }

    #[test]
    fn snapshot_body_records_role_refs() {
        let bytes = b"targets file bytes";
        let re = MetaRef::for_bytes(7, bytes);
        assert_eq!(re.version, 7);
        assert_eq!(re.length, bytes.len() as u64);
        assert_eq!(re.sha256().unwrap(), canonical::sha256_hex(bytes));

        let mut meta = BTreeMap::new();
        meta.insert(RoleName::Targets, re);
        let snapshot = SnapshotMeta {
            version: 1,
            expires: Utc::now() + TimeDelta::days(7),
            meta,
        };
        let encoded = snapshot.canonical_form().unwrap();
        let parsed: SnapshotMeta = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn timestamp_body_round_trips() {
        let mut meta = BTreeMap::new();
        meta.insert(RoleName::Snapshot, MetaRef::for_bytes(2, b"snapshot"));
        let ts = TimestampMeta {
            version: 2,
            expires: Utc::now() + TimeDelta::days(1),
            meta,
        };
        let encoded = serde_json::to_vec(&ts).unwrap();
        let parsed: TimestampMeta = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn signed_wrapper_round_trips() {
        let targets = TargetsMeta {
            version: 1,
            expires: Utc::now() + TimeDelta::days(90),
            targets: BTreeMap::new(),
        };
        let signed = Signed {
            signed: targets,
            signatures: vec![Signature {
                keyid: "abc".to_owned(),
                method: METHOD_ECDSA.to_owned(),
                sig: "c2ln".to_owned(),
            }],
        };
        let encoded = canonical::to_canonical_json(&signed).unwrap();
        let parsed: Signed<TargetsMeta> = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(parsed, signed);
    }
}
