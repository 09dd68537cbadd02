//! Field-level merge rules that `Reducer` implementations compose.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::error::ReduceError;

/// Union of two maps whose key sets must not intersect. Used to combine
/// writes from branches that each own a slice of the key space; any
/// overlap means the ownership split is broken, so the whole merge fails
/// and `acc` is left untouched.
pub fn disjoint_union<K, V>(acc: &mut BTreeMap<K, V>, next: BTreeMap<K, V>) -> Result<(), ReduceError>
where
    K: Ord + Display,
{
    if let Some(key) = next.keys().find(|k| acc.contains_key(k)) {
        return Err(ReduceError::KeyCollision {
            key: key.to_string(),
        });
    }
    acc.extend(next);
    Ok(())
}

/// Per-key append. Existing entries are never replaced, so applying updates
/// from successive supersteps only grows the map.
pub fn extend_keys<K, V>(acc: &mut BTreeMap<K, Vec<V>>, next: BTreeMap<K, Vec<V>>)
where
    K: Ord,
{
    for (key, values) in next {
        acc.entry(key).or_default().extend(values);
    }
}

pub fn append<T>(acc: &mut Vec<T>, next: Vec<T>) {
    acc.extend(next);
}

/// Write-once slot. Writing `None` is a no-op.
pub fn set_once<T>(slot: &mut Option<T>, value: Option<T>, field: &str) -> Result<(), ReduceError> {
    match (slot.as_ref(), value) {
        (_, None) => Ok(()),
        (Some(_), Some(_)) => Err(ReduceError::AlreadySet {
            field: field.to_string(),
        }),
        (None, Some(v)) => {
            *slot = Some(v);
            Ok(())
        }
    }
}
