//! Set operations over table-name lists.
//!
//! Names compare case-insensitively and come back upper-cased, in the order
//! of the first list, without duplicates.

use std::collections::HashSet;

fn upper_set(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_uppercase()).collect()
}

/// Items of `a` that are also in `b`.
pub fn filter_intersection(a: &[String], b: &[String]) -> Vec<String> {
    let b = upper_set(b);
    let mut seen = HashSet::new();
    a.iter()
        .map(|s| s.to_uppercase())
        .filter(|s| b.contains(s) && seen.insert(s.clone()))
        .collect()
}

/// Items of `a` that are not in `b`.
pub fn filter_difference(a: &[String], b: &[String]) -> Vec<String> {
    let b = upper_set(b);
    let mut seen = HashSet::new();
    a.iter()
        .map(|s| s.to_uppercase())
        .filter(|s| !b.contains(s) && seen.insert(s.clone()))
        .collect()
}
