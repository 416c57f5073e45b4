//! Read side: top-N members for one or more storage keys.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use flux_store::CollectionStore;
use flux_types::{Score, StorageKey};
use serde::Serialize;

use crate::QueryError;

/// Members found for a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Each requested key's members in collection order, truncated.
    pub by_key: BTreeMap<String, Vec<String>>,
    /// Union across keys, highest score first, truncated.
    pub merged: Vec<String>,
}

struct Candidate {
    score: Score,
    key_index: usize,
    rank: usize,
}

/// Reads collections for clients.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn CollectionStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self { store }
    }

    /// Returns up to `max_results` members per key plus a merged view.
    ///
    /// Keys without a collection yield empty lists. In the merged view a
    /// member reachable through several keys appears once, at its best
    /// score; ties go to the earlier key and then the earlier rank.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoKeys`] or [`QueryError::InvalidMaxResults`]
    /// for malformed input, and [`QueryError::Store`] if a read fails.
    pub fn query(&self, keys: &[StorageKey], max_results: usize) -> Result<QueryResult, QueryError> {
        if keys.is_empty() {
            return Err(QueryError::NoKeys);
        }
        if max_results == 0 {
            return Err(QueryError::InvalidMaxResults);
        }

        let mut result = QueryResult::default();
        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        for (key_index, key) in keys.iter().enumerate() {
            let members = self.store.range(key, max_results)?;
            for (rank, scored) in members.iter().enumerate() {
                let candidate = Candidate {
                    score: scored.score,
                    key_index,
                    rank,
                };
                match candidates.get_mut(&scored.member) {
                    Some(best) if candidate.score > best.score => *best = candidate,
                    Some(_) => {}
                    None => {
                        candidates.insert(scored.member.clone(), candidate);
                    }
                }
            }
            let names: Vec<String> = members.into_iter().map(|m| m.member).collect();
            if keys.len() == 1 {
                result.merged.clone_from(&names);
            }
            result.by_key.insert(key.to_string(), names);
        }

        if keys.len() > 1 {
            let mut merged: Vec<(String, Candidate)> = candidates.into_iter().collect();
            merged.sort_by(|(_, a), (_, b)| {
                b.score
                    .total_cmp(&a.score)
                    .then(a.key_index.cmp(&b.key_index))
                    .then(a.rank.cmp(&b.rank))
            });
            merged.truncate(max_results);
            result.merged = merged.into_iter().map(|(member, _)| member).collect();
        }

        tracing::debug!(
            keys = keys.len(),
            max_results,
            returned = result.merged.len(),
            "served query"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_store::MemoryStore;
    use flux_types::{CollectionKind, Mutation, MutationOp};

    fn service_with(entries: &[(&str, &str, Score, CollectionKind)]) -> QueryService {
        let store = MemoryStore::new();
        let mutations: Vec<Mutation> = entries
            .iter()
            .map(|&(key, member, score, kind)| Mutation {
                key: StorageKey::from_raw(key),
                op: MutationOp::Add,
                member: member.to_string(),
                score,
                kind,
            })
            .collect();
        store.apply(&mutations).expect("apply");
        QueryService::new(Arc::new(store))
    }

    fn keys(raw: &[&str]) -> Vec<StorageKey> {
        raw.iter().copied().map(StorageKey::from_raw).collect()
    }

    #[test]
    fn rejects_malformed_input() {
        let service = service_with(&[]);
        assert!(matches!(service.query(&[], 10), Err(QueryError::NoKeys)));
        assert!(matches!(
            service.query(&keys(&["a:feed"]), 0),
            Err(QueryError::InvalidMaxResults)
        ));
    }

    #[test]
    fn missing_key_is_empty() {
        let service = service_with(&[]);
        let result = service.query(&keys(&["user1:followers"]), 10).expect("query");
        assert!(result.merged.is_empty());
        assert_eq!(result.by_key["user1:followers"], Vec::<String>::new());
    }

    #[test]
    fn single_set_key_merged_matches_its_list() {
        use CollectionKind::Set;
        let service = service_with(&[
            ("u:followers", "carol", 3.0, Set),
            ("u:followers", "alice", 1.0, Set),
            ("u:followers", "bob", 2.0, Set),
        ]);
        let result = service.query(&keys(&["u:followers"]), 2).expect("query");
        assert_eq!(result.merged, vec!["alice", "bob"]);
        assert_eq!(result.by_key["u:followers"], result.merged);
    }

    #[test]
    fn merged_view_dedupes_at_best_score() {
        use CollectionKind::Ordered;
        let service = service_with(&[
            ("a:feed", "p1", 1.0, Ordered),
            ("a:feed", "p3", 3.0, Ordered),
            ("b:feed", "p2", 2.0, Ordered),
            ("b:feed", "p3", 3.0, Ordered),
            ("b:feed", "p4", 4.0, Ordered),
        ]);

        let result = service.query(&keys(&["a:feed", "b:feed"]), 3).expect("query");
        assert_eq!(result.merged, vec!["p4", "p3", "p2"]);
        assert_eq!(result.by_key["a:feed"], vec!["p3", "p1"]);
        assert_eq!(result.by_key["b:feed"], vec!["p4", "p3", "p2"]);
    }
}
