//! The reference graph service — lifecycle, staleness policy, and the
//! query surface handed to callers.

use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::ChangeBatch;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{apply_batch, rescan, CancelToken, FileRecord, ScanStats};
use crate::provider::DependencyProvider;
use crate::store::UsageStore;

/// Fired after any successful mutation, full or incremental, with the
/// batch that caused it. Subscriber order is unspecified.
pub type UpdateObserver = Box<dyn Fn(&ChangeBatch)>;

enum StoreState {
    /// `init` has not been called yet.
    Closed,
    Open(UsageStore),
    /// The driver failed to open the store; queries serve empty results
    /// and no retry happens until the process restarts.
    Disabled,
}

/// One store per process, explicit lifecycle, injected dependencies.
///
/// All operations run on the host's single cooperative thread: one logical
/// operation in flight at a time. Batches handed to [`notify`](Self::notify)
/// must arrive in the order the external watcher emitted them; sequencing
/// is the caller's responsibility.
pub struct ReferenceService<P: DependencyProvider> {
    config: Config,
    provider: P,
    state: StoreState,
    observers: Vec<UpdateObserver>,
}

impl<P: DependencyProvider> ReferenceService<P> {
    pub fn new(config: Config, provider: P) -> Self {
        Self {
            config,
            provider,
            state: StoreState::Closed,
            observers: Vec::new(),
        }
    }

    /// Open (or create) the store and bring it up to date. Idempotent.
    ///
    /// A full rescan runs when the store is brand new, when its schema is
    /// malformed (after a drop-and-recreate), or when the last completed
    /// rescan is older than the configured budget and periodic rescanning
    /// is enabled. Otherwise the service relies on incremental updates.
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            StoreState::Open(_) => return Ok(()),
            StoreState::Disabled => {
                debug!("service disabled, skipping init");
                return Ok(());
            }
            StoreState::Closed => {}
        }

        let db_path = PathBuf::from(&self.config.store.db_path);
        let store = match UsageStore::open(&db_path) {
            Ok(store) => store,
            Err(Error::StorageUnavailable(reason)) => {
                error!(%reason, "storage unavailable, entering disabled mode");
                self.state = StoreState::Disabled;
                return Err(Error::StorageUnavailable(reason));
            }
            Err(other) => return Err(other),
        };

        let mut force_rescan = false;
        match store.check_schema() {
            Ok(()) => {}
            Err(Error::MalformedSchema) => {
                warn!("malformed schema detected, dropping and recreating tables");
                store.reset_schema()?;
                force_rescan = true;
            }
            Err(other) => return Err(other),
        }

        let stale = force_rescan || self.is_stale(&store)?;
        self.state = StoreState::Open(store);

        if stale {
            self.refresh()?;
        }
        Ok(())
    }

    /// Force a full rescan.
    pub fn refresh(&mut self) -> Result<ScanStats> {
        self.refresh_cancellable(&CancelToken::new())
    }

    /// Force a full rescan with cooperative cancellation. On cancellation
    /// the in-flight transaction is discarded and prior data stays valid.
    pub fn refresh_cancellable(&mut self, cancel: &CancelToken) -> Result<ScanStats> {
        let Some(store) = self.store() else {
            warn!("refresh requested but store is not open, skipping");
            return Ok(ScanStats::default());
        };
        let (stats, batch) = rescan(store, &self.provider, cancel)?;
        self.fire(&batch);
        Ok(stats)
    }

    /// Apply an already-coalesced change batch. A disabled or unopened
    /// service ignores the batch rather than failing the watcher.
    pub fn notify(&mut self, batch: ChangeBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let Some(store) = self.store() else {
            debug!("change batch dropped, store is not open");
            return Ok(());
        };
        apply_batch(store, &self.provider, &batch)?;
        self.fire(&batch);
        Ok(())
    }

    /// Register an update observer.
    pub fn subscribe(&mut self, observer: impl Fn(&ChangeBatch) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Drop the store handle. A later [`init`](Self::init) reopens it; a
    /// disabled service stays disabled.
    pub fn close(&mut self) {
        if matches!(self.state, StoreState::Open(_)) {
            self.state = StoreState::Closed;
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, StoreState::Open(_))
    }

    // ─── Query surface ──────────────────────────────────────────
    //
    // When the store is disabled these return empty rather than failing:
    // callers render "no data" instead of crashing.

    /// Files that reference any id in `ids`.
    pub fn find_used_by(&self, ids: &BTreeSet<Uuid>) -> Result<Vec<FileRecord>> {
        match self.store() {
            Some(store) => store.find_used_by(ids),
            None => Ok(Vec::new()),
        }
    }

    /// Files referenced by any id in `ids`.
    pub fn find_using(&self, ids: &BTreeSet<Uuid>) -> Result<Vec<FileRecord>> {
        match self.store() {
            Some(store) => store.find_using(ids),
            None => Ok(Vec::new()),
        }
    }

    /// Direct record lookup by id set.
    pub fn find_files(&self, ids: &BTreeSet<Uuid>) -> Result<Vec<FileRecord>> {
        match self.store() {
            Some(store) => store.find_files(ids),
            None => Ok(Vec::new()),
        }
    }

    /// Most-depended-upon resources with their distinct-user counts.
    pub fn most_referenced(&self, limit: Option<usize>) -> Result<Vec<(FileRecord, u64)>> {
        match self.store() {
            Some(store) => store.most_referenced(limit),
            None => Ok(Vec::new()),
        }
    }

    // ─── Internal ───────────────────────────────────────────────

    fn store(&self) -> Option<&UsageStore> {
        match &self.state {
            StoreState::Open(store) => Some(store),
            _ => None,
        }
    }

    fn is_stale(&self, store: &UsageStore) -> Result<bool> {
        match store.last_full_scan()? {
            None => Ok(true), // never scanned
            Some(last) => {
                if !self.config.scan.periodic_rescan {
                    return Ok(false);
                }
                let budget = Duration::days(self.config.scan.rescan_interval_days as i64);
                let stale = Utc::now() - last > budget;
                if stale {
                    info!(last_scan = %last, "scan budget exceeded, full rescan due");
                }
                Ok(stale)
            }
        }
    }

    fn fire(&self, batch: &ChangeBatch) {
        for observer in &self.observers {
            observer(batch);
        }
    }
}
