//! A persistent, incrementally maintained graph of which file references
//! which other file, keyed by stable identifiers that survive renames.
//!
//! The store is a small SQLite database with a file registry (identifier to
//! current path) and a directed usage-edge table. Two maintenance paths keep
//! it truthful: a transactional full [`rescan`](index::rescan) with
//! cooperative cancellation, and an incremental updater that applies
//! coalesced [`ChangeBatch`]es from an external file watcher. Queries are
//! bidirectional and chunk large identifier sets below SQLite's bound
//! parameter limit.
//!
//! How identifiers and direct dependencies are computed is injected through
//! the [`DependencyProvider`] trait; the crate never inspects file contents
//! itself.
//!
//! ```no_run
//! use refgraph::{ChangeBatch, Config, MemoryProvider, ReferenceService};
//!
//! let mut provider = MemoryProvider::new();
//! let material = provider.add("textures/wood.mat");
//! let scene = provider.add("scenes/cabin.level");
//! provider.depend(scene, material);
//!
//! let mut service = ReferenceService::new(Config::default(), provider);
//! service.init().unwrap();
//!
//! let users = service.find_used_by(&[material].into_iter().collect()).unwrap();
//! assert_eq!(users[0].path.to_str(), Some("scenes/cabin.level"));
//!
//! service
//!     .notify(ChangeBatch::deleted(["scenes/cabin.level"]))
//!     .unwrap();
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod index;
pub mod provider;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil {
    /// Route test logs through `RUST_LOG`, quiet by default. Safe to call
    /// from every test; only the first registration wins.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

pub use batch::{BatchDebouncer, ChangeBatch};
pub use config::Config;
pub use error::{Error, ProviderError, Result};
pub use index::{CancelToken, FileRecord, ScanStats, UsageEdge};
pub use provider::{stable_id, DependencyProvider, MemoryProvider};
pub use service::ReferenceService;
pub use store::UsageStore;
