//! Minimal edits driven by coalesced file-change batches.
//!
//! One transaction per batch: a burst of file operations (a bulk move, a
//! mass reimport) produces one durable write rather than N. Deletions and
//! move-sources are applied before imports and move-destinations, so a
//! move never leaves the store without a record for content that is still
//! live under its new path.

use tracing::{debug, warn};

use super::types::FileRecord;
use crate::batch::ChangeBatch;
use crate::error::{ProviderError, Result};
use crate::provider::DependencyProvider;
use crate::store::UsageStore;

/// Apply an already-coalesced batch. Idempotent: re-applying the same
/// batch yields the same end state.
pub fn apply_batch<P: DependencyProvider>(
    store: &UsageStore,
    provider: &P,
    batch: &ChangeBatch,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let tx = store.begin()?;

    // Phase 1: removals, keyed by path since the files are gone and their
    // ids can no longer be recomputed. An absent record is a no-op.
    for path in batch.removals() {
        let removed = store.delete_file_by_path(path)?;
        if removed.is_empty() {
            debug!(path = %path.display(), "delete for unknown path, ignoring");
        } else {
            debug!(path = %path.display(), count = removed.len(), "record removed");
        }
    }

    // Phase 2: (re)index imports and move-destinations. Unresolvable paths
    // vanished between event emission and processing; skip them silently.
    for path in batch.updates() {
        let Some(id) = provider.path_to_id(path) else {
            debug!(path = %path.display(), "path no longer resolves, skipping");
            continue;
        };

        store.upsert_file(&FileRecord::new(id, path))?;

        match provider.direct_dependencies(path) {
            Ok(deps) => store.replace_edges_for(id, &deps)?,
            Err(ProviderError::Extraction { reason, .. }) => {
                warn!(path = %path.display(), %reason, "extraction failed, edges left as-is");
            }
            Err(fatal @ ProviderError::Unrecoverable(_)) => {
                return Err(fatal.into());
            }
        }
    }

    tx.commit()?;
    debug!(
        updated = batch.updates().len(),
        removed = batch.removals().len(),
        "change batch applied"
    );
    Ok(())
}
