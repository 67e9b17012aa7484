//! Change batches and debounce coalescing.
//!
//! A [`ChangeBatch`] is the unit of input to the incremental updater: four
//! sets of paths describing what an external file watcher observed. Rapid
//! event streams are merged through [`BatchDebouncer`] so a bulk move of a
//! thousand files costs one durable write instead of a thousand.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A coalesced set of file-change events.
///
/// `imported` is a superset that also contains every `moved_to` path. A
/// batch with all four sets empty is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub imported: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub deleted: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub moved_from: BTreeSet<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub moved_to: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch of freshly imported (created or re-saved) paths.
    pub fn imported<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            imported: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A batch of deleted paths.
    pub fn deleted<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            deleted: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A batch describing a single move. The destination also lands in
    /// `imported`, preserving the superset invariant.
    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let to = to.into();
        let mut batch = Self::default();
        batch.moved_from.insert(from.into());
        batch.imported.insert(to.clone());
        batch.moved_to.insert(to);
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.imported.is_empty()
            && self.deleted.is_empty()
            && self.moved_from.is_empty()
            && self.moved_to.is_empty()
    }

    /// Set-union merge, category by category.
    pub fn merge(&mut self, other: ChangeBatch) {
        self.imported.extend(other.imported);
        self.deleted.extend(other.deleted);
        self.moved_from.extend(other.moved_from);
        self.moved_to.extend(other.moved_to);
    }

    /// Paths whose records must be removed: `deleted ∪ moved_from`.
    pub fn removals(&self) -> BTreeSet<&Path> {
        self.deleted
            .iter()
            .chain(self.moved_from.iter())
            .map(PathBuf::as_path)
            .collect()
    }

    /// Paths whose records must be (re)indexed: `imported ∪ moved_to`,
    /// collapsed to one update per distinct path.
    pub fn updates(&self) -> BTreeSet<&Path> {
        self.imported
            .iter()
            .chain(self.moved_to.iter())
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Coalesces change batches over a debounce window.
///
/// Timer-free by design: the host pushes batches and polls with its own
/// clock. Every push extends the deadline, so a burst of events flushes as
/// one batch once the stream goes quiet for a full window.
#[derive(Debug)]
pub struct BatchDebouncer {
    window: Duration,
    pending: ChangeBatch,
    deadline: Option<Instant>,
}

impl BatchDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: ChangeBatch::new(),
            deadline: None,
        }
    }

    /// Merge a batch into the pending set and (re)arm the deadline.
    /// Empty batches are ignored.
    pub fn push(&mut self, batch: ChangeBatch, now: Instant) {
        if batch.is_empty() {
            return;
        }
        self.pending.merge(batch);
        self.deadline = Some(now + self.window);
    }

    /// Take the coalesced batch if the window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<ChangeBatch> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(std::mem::take(&mut self.pending))
            }
            _ => None,
        }
    }

    /// True when nothing is waiting to flush.
    pub fn is_idle(&self) -> bool {
        self.deadline.is_none()
    }
}
