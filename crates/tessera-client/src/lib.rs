//! Client for signed, tamper-evident trust collections.
//!
//! `tessera-client` manages a collection of content metadata for a named
//! repository (a GUN) under the TUF trust model: initialize a collection
//! bound to a caller-held root key, stage target mutations as a durable
//! changelist, publish them as a consistently re-signed role set, and
//! fetch-and-verify remote collections before exposing their targets.
//!
//! The controller is [`Repository`]; one instance addresses one GUN and is
//! not safe for concurrent mutation. Independent instances sharing a base
//! directory coordinate through the changelist lock.

pub mod apply;
pub mod cache;
pub mod changelist;
pub mod error;
pub mod remote;
pub mod repository;
pub mod root_verifier;
mod signing;
pub mod updater;

pub use changelist::{Change, ChangeAction, Changelist};
pub use error::{ClientError, PassphraseError};
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore};
pub use repository::{PassphraseProvider, Repository, RepositoryConfig, Target};
pub use root_verifier::RootVerifier;
pub use updater::{TrustedView, ViewState};

pub use tessera_trust::UnlockedSigner;
