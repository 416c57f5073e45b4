//! Behaviour shared by every `CollectionStore` backend.
//!
//! Each check runs against both the in-memory store and a SQLite store in a
//! temporary directory.

use std::sync::Arc;
use std::thread;

use flux_db::DbRuntimeSettings;
use flux_store::{CollectionStore, MemoryStore, SqliteStore};
use flux_types::{CollectionKind, Mutation, MutationOp, Score, StorageKey};

fn backends() -> Vec<(&'static str, Arc<dyn CollectionStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("contract.db");
    let sqlite = SqliteStore::open(
        path.to_str().expect("temp path should be utf-8"),
        DbRuntimeSettings::default(),
    )
    .expect("sqlite store should open");

    let memory: Arc<dyn CollectionStore> = Arc::new(MemoryStore::new());
    let sqlite: Arc<dyn CollectionStore> = Arc::new(sqlite);
    vec![("memory", memory, None), ("sqlite", sqlite, Some(dir))]
}

fn add(key: &str, member: &str, score: Score) -> Mutation {
    Mutation {
        key: StorageKey::from_raw(key),
        op: MutationOp::Add,
        member: member.to_string(),
        score,
        kind: CollectionKind::Ordered,
    }
}

fn remove(key: &str, member: &str) -> Mutation {
    Mutation {
        op: MutationOp::Remove,
        ..add(key, member, 0.0)
    }
}

fn members(store: &dyn CollectionStore, key: &str) -> Vec<String> {
    store
        .members(&StorageKey::from_raw(key))
        .expect("members should read")
}

#[test]
fn missing_collection_reads_empty() {
    for (name, store, _dir) in backends() {
        let key = StorageKey::from_raw("nobody:followers");
        assert!(members(store.as_ref(), "nobody:followers").is_empty(), "{name}");
        assert_eq!(store.len(&key).expect("len"), 0, "{name}");
        assert!(!store.contains(&key, "x").expect("contains"), "{name}");
    }
}

#[test]
fn repeated_add_is_idempotent() {
    for (name, store, _dir) in backends() {
        for _ in 0..10 {
            store
                .apply(&[add("user1:followers", "user2", 1.0)])
                .expect("apply");
            store
                .apply(&[add("user1:followers", "user3", 2.0)])
                .expect("apply");
        }
        let mut found = members(store.as_ref(), "user1:followers");
        found.sort();
        assert_eq!(found, vec!["user2", "user3"], "{name}");
    }
}

#[test]
fn remove_of_non_member_changes_nothing() {
    for (name, store, _dir) in backends() {
        store
            .apply(&[add("user1:followers", "user2", 1.0)])
            .expect("apply");
        let outcome = store
            .apply(&[remove("user1:followers", "user4"), remove("ghost:followers", "x")])
            .expect("apply");

        assert_eq!(outcome.removed, 0, "{name}");
        assert_eq!(outcome.unchanged, 2, "{name}");
        assert_eq!(members(store.as_ref(), "user1:followers"), vec!["user2"], "{name}");
    }
}

#[test]
fn ordered_range_is_score_descending_and_truncated() {
    for (name, store, _dir) in backends() {
        store
            .apply(&[
                add("user4:feed_items", "post1", 1.0),
                add("user4:feed_items", "post2", 2.0),
                add("user4:feed_items", "post3", 3.0),
                add("user4:feed_items", "post4", 0.5),
            ])
            .expect("apply");

        let top = store
            .range(&StorageKey::from_raw("user4:feed_items"), 3)
            .expect("range");
        let ids: Vec<_> = top.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(ids, vec!["post3", "post2", "post1"], "{name}");
        assert_eq!(top[0].score, 3.0, "{name}");
    }
}

#[test]
fn score_counter_is_strictly_increasing_under_contention() {
    for (name, store, _dir) in backends() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| store.next_score().expect("next_score"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut scores: Vec<Score> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("thread should not panic"))
            .collect();

        // No value is ever handed out twice.
        scores.sort_by(|a, b| a.total_cmp(b));
        scores.dedup();
        assert_eq!(scores.len(), 400, "{name}");
        assert_eq!(scores[0], 1.0, "{name}");
        assert_eq!(scores[399], 400.0, "{name}");
    }
}

#[test]
fn concurrent_adds_to_one_key_keep_members_unique() {
    for (name, store, _dir) in backends() {
        let handles: Vec<_> = (0..8)
            .map(|thread_idx| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        // Every thread races on the same 25 members.
                        let member = format!("user{i}");
                        store
                            .apply(&[add("hub:followers", &member, f64::from(thread_idx))])
                            .expect("apply");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread should not panic");
        }

        let key = StorageKey::from_raw("hub:followers");
        assert_eq!(store.len(&key).expect("len"), 25, "{name}");
    }
}
