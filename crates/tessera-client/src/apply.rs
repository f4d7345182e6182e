//! Replays changelist entries into the in-memory role graph.
//!
//! Entries are applied in insertion order; each entry observes the effect
//! of every earlier one, so replaying the same changelist against the same
//! starting state is deterministic. Applying marks the touched role dirty.

use tessera_tuf::graph::RoleGraph;
use tessera_tuf::meta::TargetMeta;

use crate::changelist::{Change, ChangeAction};
use crate::error::ClientError;

/// Apply staged changes to the role graph.
///
/// Only the targets scope is supported; delegation scopes are reserved and
/// fail closed.
pub fn apply_changes(graph: &mut RoleGraph, changes: &[Change]) -> Result<(), ClientError> {
    for change in changes {
        if change.scope != Change::SCOPE_TARGETS {
            return Err(ClientError::Changelist(format!(
                "unsupported changelist scope `{}`",
                change.scope
            )));
        }
        match change.action {
            ChangeAction::Create | ChangeAction::Update => {
                let meta: TargetMeta = serde_json::from_slice(&change.payload()?)
                    .map_err(|e| {
                        ClientError::Changelist(format!(
                            "unparseable target payload for `{}`: {e}",
                            change.name
                        ))
                    })?;
                tracing::debug!(target = %change.name, "applying target create");
                graph.add_target(&change.name, meta)?;
            }
            ChangeAction::Delete => {
                tracing::debug!(target = %change.name, "applying target delete");
                graph.remove_target(&change.name)?;
            }
        }
    }
    Ok(())
}
