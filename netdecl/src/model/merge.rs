//! Field-level merging of definitions read from successive documents.
//!
//! A later value replaces an earlier one; nested settings merge key by key;
//! sequences are replaced wholesale. An explicit `null` in a later document
//! unsets the field it names, at any depth below the definition.

use indexmap::IndexMap;

pub trait Merge {
    fn merge(&mut self, later: Self);
}

/// Replace `slot` when the later document sets the field.
pub fn merge_opt<T>(slot: &mut Option<T>, later: Option<T>) {
    if later.is_some() {
        *slot = later;
    }
}

/// Merge nested settings recursively.
pub fn merge_nested<T: Merge>(slot: &mut Option<T>, later: Option<T>) {
    match (slot.as_mut(), later) {
        (Some(current), Some(later)) => current.merge(later),
        (None, Some(later)) => *slot = Some(later),
        _ => {}
    }
}

/// Merge keyed maps: new keys append, existing keys are replaced in place.
pub fn merge_map<V>(slot: &mut Option<IndexMap<String, V>>, later: Option<IndexMap<String, V>>) {
    let Some(later) = later else {
        return;
    };
    match slot {
        Some(current) => current.extend(later),
        None => *slot = Some(later),
    }
}

/// Merge keyed maps whose values merge recursively.
pub fn merge_map_nested<V: Merge>(
    slot: &mut Option<IndexMap<String, V>>,
    later: Option<IndexMap<String, V>>,
) {
    let Some(later) = later else {
        return;
    };
    let current = slot.get_or_insert_with(IndexMap::new);
    for (key, value) in later {
        match current.get_mut(&key) {
            Some(existing) => existing.merge(value),
            None => {
                current.insert(key, value);
            }
        }
    }
}

/// Union of two lists, keeping first-seen order.
pub fn merge_union(slot: &mut Option<Vec<String>>, later: Option<Vec<String>>) {
    let Some(later) = later else {
        return;
    };
    let current = slot.get_or_insert_with(Vec::new);
    for item in later {
        if !current.contains(&item) {
            current.push(item);
        }
    }
}

/// Unsetting of a field named by its document path relative to the value.
pub trait Clear {
    /// Returns false when the path names no field.
    fn clear(&mut self, path: &[String]) -> bool;
}

/// Unset nested settings, or one field inside them.
pub fn clear_nested<T: Clear>(slot: &mut Option<T>, path: &[String]) -> bool {
    if path.is_empty() {
        *slot = None;
        return true;
    }
    slot.as_mut().map_or(true, |current| current.clear(path))
}

/// Unset a keyed map, or remove one key from it.
pub fn clear_map<V>(slot: &mut Option<IndexMap<String, V>>, path: &[String]) -> bool {
    match path {
        [] => *slot = None,
        [key] => {
            if let Some(map) = slot {
                map.shift_remove(key);
            }
        }
        _ => return false,
    }
    true
}

/// Like [`clear_map`], descending into the value of a key.
pub fn clear_map_nested<V: Clear>(
    slot: &mut Option<IndexMap<String, V>>,
    path: &[String],
) -> bool {
    match path {
        [key, rest @ ..] if !rest.is_empty() => slot
            .as_mut()
            .and_then(|map| map.get_mut(key))
            .map_or(true, |value| value.clear(rest)),
        _ => clear_map(slot, path),
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{clear_map, merge_map, merge_opt, merge_union};

    #[test]
    fn later_value_wins_only_when_set() {
        let mut slot = Some(1);
        merge_opt(&mut slot, None);
        assert_eq!(slot, Some(1));
        merge_opt(&mut slot, Some(2));
        assert_eq!(slot, Some(2));
    }

    #[test]
    fn union_keeps_first_seen_order() {
        let mut slot = Some(vec!["eth0".to_string(), "eth1".to_string()]);
        merge_union(&mut slot, Some(vec!["eth2".to_string(), "eth0".to_string()]));
        assert_eq!(
            slot,
            Some(vec!["eth0".to_string(), "eth1".to_string(), "eth2".to_string()])
        );
    }

    #[test]
    fn map_merge_replaces_existing_key_in_place() {
        let mut slot = Some(IndexMap::from([
            ("a".to_string(), 1),
            ("b".to_string(), 2),
        ]));
        merge_map(
            &mut slot,
            Some(IndexMap::from([("a".to_string(), 3), ("c".to_string(), 4)])),
        );
        let pairs: Vec<_> = slot.expect("map").into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), 3),
                ("b".to_string(), 2),
                ("c".to_string(), 4)
            ]
        );
    }

    #[test]
    fn clearing_a_map_key_keeps_the_others_in_order() {
        let mut slot = Some(IndexMap::from([
            ("a".to_string(), 1),
            ("b".to_string(), 2),
            ("c".to_string(), 3),
        ]));
        assert!(clear_map(&mut slot, &["b".to_string()]));
        let keys: Vec<_> = slot.as_ref().expect("map").keys().cloned().collect();
        assert_eq!(keys, ["a", "c"]);
        assert!(!clear_map(&mut slot, &["a".to_string(), "x".to_string()]));
        assert!(clear_map(&mut slot, &[]));
        assert_eq!(slot, None);
    }
}
