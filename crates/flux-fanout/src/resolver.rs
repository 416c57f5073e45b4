//! Path resolution: target expression plus payload to storage keys.

use std::collections::HashSet;

use flux_store::CollectionStore;
use flux_types::{Payload, StorageKey, TargetPath};

use crate::FanoutError;

/// Resolves one target expression against an event payload.
///
/// The root attribute's value seeds the entity set. Each intermediate hop
/// replaces the set with the union of members of `<id>:<hop>` for every id
/// in it; collections that do not exist contribute nothing. The final
/// relation is never read: it names the keys `<id>:<relation>` that the
/// event mutates.
///
/// # Errors
///
/// Returns [`FanoutError::Event`] if the root attribute is absent from the
/// payload, or [`FanoutError::Store`] if a hop cannot be read.
pub fn resolve(
    store: &dyn CollectionStore,
    payload: &Payload,
    path: &TargetPath,
) -> Result<Vec<StorageKey>, FanoutError> {
    let root = payload.get(path.root_attribute())?;
    let mut entities = vec![root.to_string()];

    for hop in path.hops() {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for entity in &entities {
            for member in store.members(&StorageKey::new(entity, hop))? {
                if seen.insert(member.clone()) {
                    next.push(member);
                }
            }
        }
        tracing::trace!(%path, hop = %hop, fan_out = next.len(), "resolved hop");
        entities = next;
        if entities.is_empty() {
            break;
        }
    }

    Ok(entities
        .iter()
        .map(|entity| StorageKey::new(entity, path.relation()))
        .collect())
}

/// Resolves several target expressions and concatenates their keys.
///
/// Keys are not de-duplicated across expressions; set semantics in the
/// store make a repeated mutation of the same key harmless.
pub fn resolve_all(
    store: &dyn CollectionStore,
    payload: &Payload,
    paths: &[TargetPath],
) -> Result<Vec<StorageKey>, FanoutError> {
    let mut keys = Vec::new();
    for path in paths {
        keys.extend(resolve(store, payload, path)?);
    }
    Ok(keys)
}
