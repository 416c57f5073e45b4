//! In-process collection store.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::RwLock;

use flux_types::{CollectionKind, Mutation, MutationOp, Score, ScoredMember, StorageKey};

use crate::{ApplyOutcome, CollectionStore, StoreError};

/// Rank of a member in an ordered collection: score descending, then
/// insertion order ascending.
#[derive(Debug, Clone, Copy)]
struct Rank {
    score: Score,
    seq: u64,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

#[derive(Debug)]
struct Collection {
    kind: CollectionKind,
    members: BTreeMap<String, Rank>,
    ranking: BTreeMap<Rank, String>,
}

impl Collection {
    fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            members: BTreeMap::new(),
            ranking: BTreeMap::new(),
        }
    }

    fn insert(&mut self, member: &str, rank: Rank) -> bool {
        if self.members.contains_key(member) {
            return false;
        }
        self.members.insert(member.to_string(), rank);
        self.ranking.insert(rank, member.to_string());
        true
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.members.remove(member) {
            Some(rank) => {
                self.ranking.remove(&rank);
                true
            }
            None => false,
        }
    }

    fn top(&self, limit: usize) -> Vec<ScoredMember> {
        match self.kind {
            CollectionKind::Ordered => self
                .ranking
                .iter()
                .take(limit)
                .map(|(rank, member)| ScoredMember {
                    member: member.clone(),
                    score: rank.score,
                })
                .collect(),
            CollectionKind::Set => self
                .members
                .iter()
                .take(limit)
                .map(|(member, rank)| ScoredMember {
                    member: member.clone(),
                    score: rank.score,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct Collections {
    by_key: HashMap<StorageKey, Collection>,
    next_seq: u64,
}

/// Collection store held entirely in memory.
///
/// A single `RwLock` guards every collection, so one `apply` call is
/// atomic across all the keys it touches. The score counter is a separate
/// atomic and never takes the lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    score_counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collections created so far.
    pub fn collection_count(&self) -> Result<usize, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections.by_key.len())
    }
}

impl CollectionStore for MemoryStore {
    fn next_score(&self) -> Result<Score, StoreError> {
        let value = self.score_counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        Ok(value as Score)
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<ApplyOutcome, StoreError> {
        let mut guard = self
            .collections
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let collections = &mut *guard;

        let mut outcome = ApplyOutcome::default();
        for mutation in mutations {
            match mutation.op {
                MutationOp::Add => {
                    let collection = collections
                        .by_key
                        .entry(mutation.key.clone())
                        .or_insert_with(|| Collection::new(mutation.kind));
                    if collection.members.contains_key(&mutation.member) {
                        outcome.unchanged += 1;
                        continue;
                    }
                    let rank = Rank {
                        score: mutation.score,
                        seq: collections.next_seq,
                    };
                    collections.next_seq += 1;
                    collection.insert(&mutation.member, rank);
                    outcome.added += 1;
                }
                MutationOp::Remove => {
                    let removed = collections
                        .by_key
                        .get_mut(&mutation.key)
                        .is_some_and(|collection| collection.remove(&mutation.member));
                    if removed {
                        outcome.removed += 1;
                    } else {
                        outcome.unchanged += 1;
                    }
                }
            }
        }

        tracing::trace!(
            added = outcome.added,
            removed = outcome.removed,
            unchanged = outcome.unchanged,
            "applied mutations to memory store"
        );
        Ok(outcome)
    }

    fn range(&self, key: &StorageKey, limit: usize) -> Result<Vec<ScoredMember>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections
            .by_key
            .get(key)
            .map(|collection| collection.top(limit))
            .unwrap_or_default())
    }

    fn contains(&self, key: &StorageKey, member: &str) -> Result<bool, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections
            .by_key
            .get(key)
            .is_some_and(|collection| collection.members.contains_key(member)))
    }

    fn len(&self, key: &StorageKey) -> Result<usize, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(collections
            .by_key
            .get(key)
            .map_or(0, |collection| collection.members.len()))
    }
}
