//! The dependency provider seam.
//!
//! How a file maps to a stable identifier and what it directly references
//! is host-specific (an asset importer, a parser, a sidecar manifest). The
//! core only consumes this trait; it never inspects file contents itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ProviderError;

/// Resolves stable identifiers and direct dependencies for files.
///
/// Implementations must be deterministic for a given file content and free
/// of side effects: the scan engines may call these methods any number of
/// times, in any order, and discard the results on cancellation.
pub trait DependencyProvider {
    /// Every candidate path the full rescan should consider.
    fn all_paths(&self) -> Vec<PathBuf>;

    /// Cheap validity filter applied before a path is indexed (exists on
    /// disk, lives under the indexed root, and so on).
    fn is_indexable(&self, path: &Path) -> bool;

    /// The stable identifier for a path, or `None` if the path no longer
    /// resolves (vanished between event emission and processing).
    fn path_to_id(&self, path: &Path) -> Option<Uuid>;

    /// The current path for an identifier, or `None` if it is dangling.
    ///
    /// The scan engines key everything by path and never call this; it is
    /// part of the seam so hosts and their reporting tools resolve ids
    /// through the same provider that minted them.
    fn id_to_path(&self, id: Uuid) -> Option<PathBuf>;

    /// The identifiers of everything `path` directly references.
    fn direct_dependencies(&self, path: &Path) -> Result<BTreeSet<Uuid>, ProviderError>;
}

/// Derive a stable identifier from a path.
///
/// Only a convenience for hosts whose identifiers are minted once at first
/// sight of a file; the id must be carried through renames by the provider,
/// not re-derived.
pub fn stable_id(path: &Path) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes())
}

/// An in-memory provider for tests and embedding experiments.
///
/// Identifiers are minted when a path is first added and survive renames,
/// mirroring how a real asset pipeline keeps its GUIDs.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    by_path: BTreeMap<PathBuf, Uuid>,
    deps: HashMap<Uuid, BTreeSet<Uuid>>,
    failing: BTreeSet<PathBuf>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path with a freshly derived stable id. Returns the id.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> Uuid {
        let path = path.into();
        let id = stable_id(&path);
        self.by_path.insert(path, id);
        id
    }

    /// Register a path under a caller-chosen id.
    pub fn add_with_id(&mut self, path: impl Into<PathBuf>, id: Uuid) {
        self.by_path.insert(path.into(), id);
    }

    /// Declare that `user` directly references `resource`.
    pub fn depend(&mut self, user: Uuid, resource: Uuid) {
        self.deps.entry(user).or_default().insert(resource);
    }

    /// Replace `user`'s full dependency set.
    pub fn set_dependencies(&mut self, user: Uuid, resources: impl IntoIterator<Item = Uuid>) {
        self.deps.insert(user, resources.into_iter().collect());
    }

    /// Forget a path entirely. Returns the id it was registered under.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<Uuid> {
        self.by_path.remove(path.as_ref())
    }

    /// Move a path, keeping its identifier. Returns false if `from` was
    /// not registered.
    pub fn rename(&mut self, from: impl AsRef<Path>, to: impl Into<PathBuf>) -> bool {
        match self.by_path.remove(from.as_ref()) {
            Some(id) => {
                self.by_path.insert(to.into(), id);
                true
            }
            None => false,
        }
    }

    /// Make dependency extraction fail for a path (test hook).
    pub fn fail_extraction(&mut self, path: impl Into<PathBuf>) {
        self.failing.insert(path.into());
    }
}

impl DependencyProvider for MemoryProvider {
    fn all_paths(&self) -> Vec<PathBuf> {
        self.by_path.keys().cloned().collect()
    }

    fn is_indexable(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    fn path_to_id(&self, path: &Path) -> Option<Uuid> {
        self.by_path.get(path).copied()
    }

    fn id_to_path(&self, id: Uuid) -> Option<PathBuf> {
        self.by_path
            .iter()
            .find(|(_, &candidate)| candidate == id)
            .map(|(path, _)| path.clone())
    }

    fn direct_dependencies(&self, path: &Path) -> Result<BTreeSet<Uuid>, ProviderError> {
        if self.failing.contains(path) {
            return Err(ProviderError::Extraction {
                path: path.to_path_buf(),
                reason: "simulated extraction failure".to_string(),
            });
        }
        let id = self.path_to_id(path).ok_or_else(|| ProviderError::Extraction {
            path: path.to_path_buf(),
            reason: "unknown path".to_string(),
        })?;
        Ok(self.deps.get(&id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic() {
        let a = stable_id(Path::new("textures/wood.mat"));
        let b = stable_id(Path::new("textures/wood.mat"));
        let c = stable_id(Path::new("textures/stone.mat"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rename_keeps_identifier() {
        let mut provider = MemoryProvider::new();
        let id = provider.add("a.asset");
        assert!(provider.rename("a.asset", "b.asset"));
        assert_eq!(provider.path_to_id(Path::new("b.asset")), Some(id));
        assert_eq!(provider.path_to_id(Path::new("a.asset")), None);
        assert_eq!(provider.id_to_path(id), Some(PathBuf::from("b.asset")));
    }

    #[test]
    fn dependencies_default_to_empty() {
        let mut provider = MemoryProvider::new();
        provider.add("lonely.asset");
        let deps = provider
            .direct_dependencies(Path::new("lonely.asset"))
            .unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn failing_path_reports_extraction_error() {
        let mut provider = MemoryProvider::new();
        provider.add("broken.asset");
        provider.fail_extraction("broken.asset");
        let err = provider
            .direct_dependencies(Path::new("broken.asset"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Extraction { .. }));
    }
}
