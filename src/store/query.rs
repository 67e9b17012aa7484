//! Bidirectional usage queries.
//!
//! All three lookup operations take identifier *sets* so a large
//! multi-selection is one call. Sets bigger than [`MAX_QUERY_PARAMS`] are
//! split into sub-batches internally — SQLite rejects statements with too
//! many bound parameters, so the chunking is a correctness requirement,
//! not an optimization.

use rusqlite::params_from_iter;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

use super::{row_to_record, UsageStore};
use crate::error::Result;
use crate::index::types::FileRecord;

/// Upper bound on identifiers bound into a single statement. SQLite's
/// default variable limit is 999; 900 leaves headroom for fixed parameters.
pub const MAX_QUERY_PARAMS: usize = 900;

const USED_BY_SQL: &str = "\
SELECT DISTINCT f.id, f.path FROM usages u
JOIN files f ON f.id = u.user_id
WHERE u.resource_id IN";

const USING_SQL: &str = "\
SELECT DISTINCT f.id, f.path FROM usages u
JOIN files f ON f.id = u.resource_id
WHERE u.user_id IN";

const FILES_SQL: &str = "SELECT id, path FROM files WHERE id IN";

impl UsageStore {
    /// Files that reference any id in `ids` (the ids are resources; find
    /// their users). Deduplicated by path, sorted by path ascending, with
    /// the queried ids excluded from their own result.
    pub fn find_used_by(&self, ids: &BTreeSet<Uuid>) -> Result<Vec<FileRecord>> {
        self.chunked_lookup(USED_BY_SQL, ids, true)
    }

    /// Files referenced by any id in `ids` (the ids are users; find their
    /// resources). Same dedup, sort, and self-exclusion rules.
    pub fn find_using(&self, ids: &BTreeSet<Uuid>) -> Result<Vec<FileRecord>> {
        self.chunked_lookup(USING_SQL, ids, true)
    }

    /// Direct record lookup for a set of ids.
    pub fn find_files(&self, ids: &BTreeSet<Uuid>) -> Result<Vec<FileRecord>> {
        self.chunked_lookup(FILES_SQL, ids, false)
    }

    /// Resources ordered by how many distinct users reference them,
    /// descending. Dangling edges are filtered by the join.
    pub fn most_referenced(&self, limit: Option<usize>) -> Result<Vec<(FileRecord, u64)>> {
        let sql = "\
SELECT f.id, f.path, COUNT(DISTINCT u.user_id) AS users FROM usages u
JOIN files f ON f.id = u.resource_id
GROUP BY u.resource_id
ORDER BY users DESC, f.path ASC
LIMIT ?1";
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn().prepare_cached(sql)?;
        let rows = stmt.query_and_then([limit], |row| {
            let record = row_to_record(row)?;
            let users: i64 = row.get(2)?;
            Ok((record, users as u64))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Run `sql_prefix IN (...)` per chunk of ids and merge the results.
    ///
    /// Self-exclusion is a post-filter against the full input set (not the
    /// chunk), matching the original's reported behavior: a queried id
    /// never appears in its own result even when self-referential edges
    /// exist.
    fn chunked_lookup(
        &self,
        sql_prefix: &str,
        ids: &BTreeSet<Uuid>,
        exclude_queried: bool,
    ) -> Result<Vec<FileRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let mut by_path: BTreeMap<PathBuf, FileRecord> = BTreeMap::new();

        for chunk in keys.chunks(MAX_QUERY_PARAMS) {
            let sql = format!("{sql_prefix} ({})", placeholders(chunk.len()));
            let mut stmt = self.conn().prepare_cached(&sql)?;
            let rows = stmt.query_and_then(params_from_iter(chunk.iter()), row_to_record)?;
            for record in rows {
                let record = record?;
                if exclude_queried && ids.contains(&record.id) {
                    continue;
                }
                by_path.insert(record.path.clone(), record);
            }
        }

        Ok(by_path.into_values().collect())
    }
}

fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::FileRecord;

    fn setup() -> UsageStore {
        UsageStore::in_memory().unwrap()
    }

    fn add_file(store: &UsageStore, path: &str) -> Uuid {
        let id = Uuid::new_v4();
        store.upsert_file(&FileRecord::new(id, path)).unwrap();
        id
    }

    fn link(store: &UsageStore, user: Uuid, resources: &[Uuid]) {
        store
            .replace_edges_for(user, &resources.iter().copied().collect())
            .unwrap();
    }

    fn ids(list: &[Uuid]) -> BTreeSet<Uuid> {
        list.iter().copied().collect()
    }

    #[test]
    fn used_by_and_using_are_symmetric() {
        let store = setup();
        let user = add_file(&store, "A.asset");
        let resource = add_file(&store, "B.asset");
        link(&store, user, &[resource]);

        let users = store.find_used_by(&ids(&[resource])).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, user);
        assert_eq!(users[0].path, PathBuf::from("A.asset"));

        let resources = store.find_using(&ids(&[user])).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id, resource);
        assert_eq!(resources[0].path, PathBuf::from("B.asset"));
    }

    #[test]
    fn empty_input_returns_empty_without_querying() {
        let store = setup();
        assert!(store.find_used_by(&BTreeSet::new()).unwrap().is_empty());
        assert!(store.find_using(&BTreeSet::new()).unwrap().is_empty());
        assert!(store.find_files(&BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn queried_ids_are_excluded_from_their_own_result() {
        let store = setup();
        let a = add_file(&store, "a.asset");
        let b = add_file(&store, "b.asset");
        // both reference b, including b itself
        link(&store, a, &[b]);
        link(&store, b, &[b]);

        let users = store.find_used_by(&ids(&[b])).unwrap();
        assert_eq!(users.len(), 1, "self-referential b must be filtered");
        assert_eq!(users[0].id, a);
    }

    #[test]
    fn results_are_deduped_by_path_and_sorted() {
        let store = setup();
        let user = add_file(&store, "z_user.asset");
        let user2 = add_file(&store, "a_user.asset");
        let r1 = add_file(&store, "r1.asset");
        let r2 = add_file(&store, "r2.asset");
        // both users reference both resources
        link(&store, user, &[r1, r2]);
        link(&store, user2, &[r1, r2]);

        let users = store.find_used_by(&ids(&[r1, r2])).unwrap();
        let paths: Vec<PathBuf> = users.into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("a_user.asset"), PathBuf::from("z_user.asset")]
        );
    }

    #[test]
    fn dangling_edges_are_filtered_by_the_join() {
        let store = setup();
        let user = add_file(&store, "user.asset");
        let ghost = Uuid::new_v4(); // never registered
        link(&store, user, &[ghost]);

        // the dangling resource never materializes in results
        assert!(store.find_using(&ids(&[user])).unwrap().is_empty());
        // but the edge still answers the reverse direction
        let users = store.find_used_by(&ids(&[ghost])).unwrap();
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn find_files_looks_up_records_directly() {
        let store = setup();
        let a = add_file(&store, "a.asset");
        let b = add_file(&store, "b.asset");
        add_file(&store, "c.asset");

        let found = store.find_files(&ids(&[a, b])).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn large_id_sets_are_chunked() {
        let store = setup();
        let user = add_file(&store, "mega_user.asset");

        // 2500 resources forces three chunks of <= 900.
        let resources: Vec<Uuid> = (0..2500)
            .map(|i| add_file(&store, &format!("res_{i:04}.asset")))
            .collect();
        link(&store, user, &resources);

        let all: BTreeSet<Uuid> = resources.iter().copied().collect();
        let merged = store.find_used_by(&all).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, user);

        // identical to three manual sub-batches of <= 900 merged
        let mut manual: BTreeSet<FileRecord> = BTreeSet::new();
        for chunk in resources.chunks(900) {
            manual.extend(store.find_used_by(&chunk.iter().copied().collect()).unwrap());
        }
        assert_eq!(manual.into_iter().collect::<Vec<_>>(), merged);

        // forward direction sees all 2500, sorted
        let used = store.find_using(&ids(&[user])).unwrap();
        assert_eq!(used.len(), 2500);
        assert!(used.windows(2).all(|w| w[0].path < w[1].path));
    }

    #[test]
    fn most_referenced_orders_by_distinct_users() {
        let store = setup();
        let popular = add_file(&store, "popular.asset");
        let niche = add_file(&store, "niche.asset");
        let u1 = add_file(&store, "u1.asset");
        let u2 = add_file(&store, "u2.asset");
        let u3 = add_file(&store, "u3.asset");
        link(&store, u1, &[popular, niche]);
        link(&store, u2, &[popular]);
        link(&store, u3, &[popular]);

        let top = store.most_referenced(None).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0.id, popular);
        assert_eq!(top[0].1, 3);
        assert_eq!(top[1].0.id, niche);
        assert_eq!(top[1].1, 1);

        let limited = store.most_referenced(Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].0.id, popular);
    }
}
