//! Full rebuild of the registry and edge store from ground truth.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{FileRecord, ScanStats};
use crate::batch::ChangeBatch;
use crate::error::{Error, ProviderError, Result};
use crate::provider::DependencyProvider;
use crate::store::UsageStore;

/// Cooperative cancellation flag, checked between files.
///
/// Cancelling mid-scan discards the whole transaction: the store is either
/// fully rebuilt or untouched, never half-updated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Rebuild the entire store from the provider's view of the world.
///
/// Every candidate path is re-resolved and re-extracted; stored records not
/// re-observed are deleted with their edges. Returns the scan counters and
/// a [`ChangeBatch`] listing the indexed paths as `imported`, for update
/// notification.
pub fn rescan<P: DependencyProvider>(
    store: &UsageStore,
    provider: &P,
    cancel: &CancelToken,
) -> Result<(ScanStats, ChangeBatch)> {
    let tx = store.begin()?;

    // Snapshot of what we currently believe exists; survivors are removed
    // as they are re-observed, leaving the orphans.
    let mut orphans: HashMap<Uuid, PathBuf> = store
        .all_files()?
        .into_iter()
        .map(|r| (r.id, r.path))
        .collect();

    let mut candidates = provider.all_paths();
    candidates.sort();

    let mut stats = ScanStats::default();
    let mut batch = ChangeBatch::new();

    for path in candidates {
        if cancel.is_cancelled() {
            warn!(
                scanned = stats.scanned,
                "rescan cancelled, discarding transaction"
            );
            // tx drops uncommitted: full rollback
            return Err(Error::ScanCancelled);
        }

        if !provider.is_indexable(&path) {
            stats.skipped += 1;
            continue;
        }
        let Some(id) = provider.path_to_id(&path) else {
            debug!(path = %path.display(), "no identifier, skipping");
            stats.skipped += 1;
            continue;
        };

        orphans.remove(&id);
        store.upsert_file(&FileRecord::new(id, path.clone()))?;

        match provider.direct_dependencies(&path) {
            Ok(deps) => store.replace_edges_for(id, &deps)?,
            Err(ProviderError::Extraction { reason, .. }) => {
                warn!(path = %path.display(), %reason, "extraction failed, keeping previous edges");
            }
            Err(fatal @ ProviderError::Unrecoverable(_)) => {
                return Err(fatal.into());
            }
        }

        batch.imported.insert(path);
        stats.scanned += 1;
    }

    for (id, path) in orphans {
        debug!(%id, path = %path.display(), "removing orphaned record");
        store.delete_file(id)?;
        stats.removed += 1;
    }

    store.set_last_full_scan(chrono::Utc::now())?;
    tx.commit()?;

    info!(
        scanned = stats.scanned,
        skipped = stats.skipped,
        removed = stats.removed,
        "full rescan complete"
    );
    Ok((stats, batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};

    fn ids(list: &[Uuid]) -> BTreeSet<Uuid> {
        list.iter().copied().collect()
    }

    #[test]
    fn rescan_builds_records_and_edges() {
        let store = UsageStore::in_memory().unwrap();
        let mut provider = MemoryProvider::new();
        let scene = provider.add("scene.level");
        let material = provider.add("wood.mat");
        let texture = provider.add("wood.png");
        provider.depend(scene, material);
        provider.depend(material, texture);

        let (stats, batch) = rescan(&store, &provider, &CancelToken::new()).unwrap();
        assert_eq!(stats.scanned, 3);
        assert_eq!(stats.removed, 0);
        assert_eq!(batch.imported.len(), 3);

        assert_eq!(store.file_count().unwrap(), 3);
        let users = store.find_used_by(&ids(&[texture])).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, material);
    }

    #[test]
    fn rescan_converges_from_arbitrary_state() {
        let store = UsageStore::in_memory().unwrap();

        // Garbage that the provider knows nothing about.
        let stale = Uuid::new_v4();
        store
            .upsert_file(&FileRecord::new(stale, "stale.asset"))
            .unwrap();
        store
            .replace_edges_for(stale, &ids(&[Uuid::new_v4()]))
            .unwrap();

        let mut provider = MemoryProvider::new();
        let a = provider.add("a.asset");
        let b = provider.add("b.asset");
        provider.depend(a, b);

        let (stats, _) = rescan(&store, &provider, &CancelToken::new()).unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.removed, 1);

        let files: BTreeSet<Uuid> = store.all_files().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(files, ids(&[a, b]));

        let edges = store.all_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!((edges[0].user, edges[0].resource), (a, b));
    }

    #[test]
    fn cancellation_discards_all_progress() {
        let store = UsageStore::in_memory().unwrap();
        let before_id = Uuid::new_v4();
        store
            .upsert_file(&FileRecord::new(before_id, "preexisting.asset"))
            .unwrap();

        let mut provider = MemoryProvider::new();
        for i in 0..10 {
            provider.add(format!("file_{i}.asset"));
        }

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = rescan(&store, &provider, &cancel).unwrap_err();
        assert!(matches!(err, Error::ScanCancelled));

        // Store equals the pre-scan state.
        let files = store.all_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, before_id);
    }

    /// Trips a cancel token partway through a scan, from inside
    /// dependency extraction.
    struct TripwireProvider {
        inner: MemoryProvider,
        cancel: CancelToken,
        trip_on_call: usize,
        calls: std::cell::Cell<usize>,
    }

    impl DependencyProvider for TripwireProvider {
        fn all_paths(&self) -> Vec<PathBuf> {
            self.inner.all_paths()
        }

        fn is_indexable(&self, path: &Path) -> bool {
            self.inner.is_indexable(path)
        }

        fn path_to_id(&self, path: &Path) -> Option<Uuid> {
            self.inner.path_to_id(path)
        }

        fn id_to_path(&self, id: Uuid) -> Option<PathBuf> {
            self.inner.id_to_path(id)
        }

        fn direct_dependencies(
            &self,
            path: &Path,
        ) -> std::result::Result<BTreeSet<Uuid>, ProviderError> {
            let calls = self.calls.get() + 1;
            self.calls.set(calls);
            if calls == self.trip_on_call {
                self.cancel.cancel();
            }
            self.inner.direct_dependencies(path)
        }
    }

    #[test]
    fn cancellation_after_partial_progress_rolls_back() {
        let store = UsageStore::in_memory().unwrap();

        // Pre-scan state built from one provider's world.
        let mut seed = MemoryProvider::new();
        let a = seed.add("seeded_a.asset");
        let b = seed.add("seeded_b.asset");
        seed.depend(a, b);
        rescan(&store, &seed, &CancelToken::new()).unwrap();
        let before = (store.all_files().unwrap(), store.all_edges().unwrap());

        // A 10-file world whose scan cancels itself on the 3rd extraction;
        // three files have already been written inside the transaction.
        let mut world = MemoryProvider::new();
        for i in 0..10 {
            world.add(format!("file_{i}.asset"));
        }
        let cancel = CancelToken::new();
        let provider = TripwireProvider {
            inner: world,
            cancel: cancel.clone(),
            trip_on_call: 3,
            calls: std::cell::Cell::new(0),
        };

        let err = rescan(&store, &provider, &cancel).unwrap_err();
        assert!(matches!(err, Error::ScanCancelled));
        assert_eq!(provider.calls.get(), 3, "scan must stop at the tripwire");

        assert_eq!(
            (store.all_files().unwrap(), store.all_edges().unwrap()),
            before,
            "partial writes must be rolled back"
        );
    }

    #[test]
    fn per_file_extraction_failure_does_not_abort() {
        let store = UsageStore::in_memory().unwrap();
        let mut provider = MemoryProvider::new();
        let good = provider.add("good.asset");
        let dep = provider.add("dep.asset");
        provider.add("bad.asset");
        provider.depend(good, dep);
        provider.fail_extraction("bad.asset");

        let (stats, _) = rescan(&store, &provider, &CancelToken::new()).unwrap();
        // the failing file is still registered, its edges just stay empty
        assert_eq!(stats.scanned, 3);
        assert!(store.find_by_path(Path::new("bad.asset")).unwrap().is_some());
        assert_eq!(store.find_using(&ids(&[good])).unwrap().len(), 1);
    }

    #[test]
    fn rescan_records_completion_timestamp() {
        let store = UsageStore::in_memory().unwrap();
        let provider = MemoryProvider::new();
        assert!(store.last_full_scan().unwrap().is_none());
        rescan(&store, &provider, &CancelToken::new()).unwrap();
        assert!(store.last_full_scan().unwrap().is_some());
    }

    #[test]
    fn rescan_refreshes_moved_paths() {
        let store = UsageStore::in_memory().unwrap();
        let mut provider = MemoryProvider::new();
        let id = provider.add("old_home.asset");
        rescan(&store, &provider, &CancelToken::new()).unwrap();

        provider.rename("old_home.asset", "new_home.asset");
        rescan(&store, &provider, &CancelToken::new()).unwrap();

        let record = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(record.path, PathBuf::from("new_home.asset"));
        assert_eq!(store.file_count().unwrap(), 1);
    }
}
