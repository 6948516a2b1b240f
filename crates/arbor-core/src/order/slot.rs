//! `display_order` arithmetic shared by category and content moves.
//!
//! A sibling group is passed as `(id, display_order)` pairs in display order
//! with the moving item already removed. Placement between two neighbours
//! takes the integer midpoint when the gap is wider than 1. When no gap is
//! left (or the neighbours collide), the whole group is renumbered to
//! `baseline + i * step` and the midpoint is taken from the renumbered
//! values. With `step >= 2` a renumbered group always has room.

use crate::config::OrderingConfig;

/// Which side of the anchor the moving item lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

/// Result of placing one item inside a sibling group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Order assigned to the moving item.
    pub order: i64,
    /// Siblings whose order changed because the group was renumbered.
    pub renumbered: Vec<(i64, i64)>,
}

/// Order for an item placed directly before or after `group[anchor]`.
///
/// An out-of-range `anchor` is treated as "append".
pub fn slot_beside(group: &[(i64, i64)], anchor: usize, side: Side, cfg: &OrderingConfig) -> Slot {
    if anchor >= group.len() {
        return Slot {
            order: append_order(group.iter().map(|(_, order)| *order), cfg),
            renumbered: Vec::new(),
        };
    }

    if let Some(order) = try_slot(group, anchor, side, cfg.step) {
        return Slot {
            order,
            renumbered: Vec::new(),
        };
    }

    let respaced = renumber(group, cfg);
    let renumbered = group
        .iter()
        .zip(&respaced)
        .filter(|(old, new)| old.1 != new.1)
        .map(|(_, new)| *new)
        .collect();

    let order = try_slot(&respaced, anchor, side, cfg.step).unwrap_or_else(|| {
        // Only reachable when the renumbered values themselves overflow.
        tracing::warn!(anchor, "renumbered group still has no gap; appending");
        append_order(respaced.iter().map(|(_, order)| *order), cfg)
    });

    Slot { order, renumbered }
}

/// Order for an item appended after every member of a group: one step past
/// the current maximum, or the baseline for an empty group.
pub fn append_order(orders: impl IntoIterator<Item = i64>, cfg: &OrderingConfig) -> i64 {
    orders
        .into_iter()
        .max()
        .map_or(cfg.baseline, |max| max.saturating_add(cfg.step))
}

/// Respace a group to `baseline + i * step`, keeping its current order.
pub fn renumber(group: &[(i64, i64)], cfg: &OrderingConfig) -> Vec<(i64, i64)> {
    let mut next = cfg.baseline;
    group
        .iter()
        .map(|(id, _)| {
            let order = next;
            next = next.saturating_add(cfg.step);
            (*id, order)
        })
        .collect()
}

fn try_slot(group: &[(i64, i64)], anchor: usize, side: Side, step: i64) -> Option<i64> {
    let (lower, upper) = match side {
        Side::Before => (
            anchor.checked_sub(1).map(|i| group[i].1),
            Some(group[anchor].1),
        ),
        Side::After => (Some(group[anchor].1), group.get(anchor + 1).map(|e| e.1)),
    };

    match (lower, upper) {
        (Some(lo), Some(hi)) => {
            let gap = hi.checked_sub(lo)?;
            (gap > 1).then(|| lo + gap / 2)
        }
        (None, Some(hi)) => hi.checked_sub(step),
        (Some(lo), None) => lo.checked_add(step),
        (None, None) => None,
    }
}
