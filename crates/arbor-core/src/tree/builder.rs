//! Flat category records to an ordered forest.
//!
//! # Algorithm
//!
//! 1. Drop inactive records (they stay in the store for audit, never in the
//!    forest).
//! 2. Group the rest by parent. A record whose parent is not among the
//!    active records is an **orphan** and joins the root group.
//! 3. Sort each group by `display_order`, then `id`, so equal orders never
//!    shuffle between renders.
//! 4. Walk top-down from the roots assigning depth (roots are 0). A record
//!    that is never reached sits on a parent cycle; it is excluded and
//!    reported instead of looping or panicking.

use std::collections::{BTreeMap, HashSet};

use super::forest::Forest;
use crate::model::{Category, CategoryId};

/// Build an ordered forest from one owner's flat category list.
///
/// Stored `depth` values are ignored and recomputed from the parent chain.
/// Duplicate ids keep the first record seen.
pub fn build_forest(records: &[Category]) -> Forest {
    let mut nodes: BTreeMap<CategoryId, Category> = BTreeMap::new();
    for record in records.iter().filter(|c| c.is_active) {
        if nodes.contains_key(&record.id) {
            tracing::warn!(id = record.id, "duplicate category id in snapshot; keeping first");
            continue;
        }
        nodes.insert(record.id, record.clone());
    }

    let mut groups: BTreeMap<Option<CategoryId>, Vec<CategoryId>> = BTreeMap::new();
    let mut orphans = Vec::new();
    for category in nodes.values() {
        let key = match category.parent_id {
            Some(parent) if nodes.contains_key(&parent) => Some(parent),
            Some(parent) => {
                tracing::debug!(id = category.id, parent, "orphaned category promoted to root");
                orphans.push(category.id);
                None
            }
            None => None,
        };
        groups.entry(key).or_default().push(category.id);
    }

    for ids in groups.values_mut() {
        ids.sort_by_key(|id| (nodes[id].display_order, *id));
    }

    let mut parents: BTreeMap<CategoryId, Option<CategoryId>> = BTreeMap::new();
    let mut children: BTreeMap<Option<CategoryId>, Vec<CategoryId>> = BTreeMap::new();
    let mut visited: HashSet<CategoryId> = HashSet::new();

    let roots = groups.remove(&None).unwrap_or_default();
    let mut stack: Vec<(CategoryId, Option<CategoryId>, u32)> =
        roots.iter().rev().map(|id| (*id, None, 0)).collect();
    children.insert(None, roots);

    while let Some((id, parent, depth)) = stack.pop() {
        if !visited.insert(id) {
            continue; // cycle guard
        }
        parents.insert(id, parent);
        if let Some(node) = nodes.get_mut(&id) {
            node.depth = depth;
        }
        if let Some(kids) = groups.remove(&Some(id)) {
            for child in kids.iter().rev() {
                if !visited.contains(child) {
                    stack.push((*child, Some(id), depth + 1));
                }
            }
            children.insert(Some(id), kids);
        }
    }

    let excluded: Vec<CategoryId> = nodes
        .keys()
        .filter(|id| !visited.contains(id))
        .copied()
        .collect();
    if !excluded.is_empty() {
        tracing::warn!(
            ids = ?excluded,
            "categories unreachable from any root (parent cycle); excluded from forest"
        );
        for id in &excluded {
            nodes.remove(id);
        }
        for kids in children.values_mut() {
            kids.retain(|id| !excluded.contains(id));
        }
        children.retain(|parent, _| parent.is_none_or(|p| !excluded.contains(&p)));
    }

    Forest::from_parts(nodes, parents, children, orphans, excluded)
}
