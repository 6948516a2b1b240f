//! Reorder/re-parent planning for categories.
//!
//! [`plan_move`] turns one drop gesture into a [`PatchSet`]. It validates
//! the request first and returns either the complete patch set or an error;
//! it never produces a partial result and never touches the forest.

use super::patch::{CategoryPatch, PatchSet};
use super::slot::{Side, append_order, slot_beside};
use super::Position;
use crate::config::OrderingConfig;
use crate::error::OrderError;
use crate::model::{CategoryId, EntityRef};
use crate::tree::Forest;

/// Plan dropping `moving_id` before, after or inside `target_id`.
///
/// The patch set lists the moving category first, then any siblings that
/// were renumbered to open a gap, then descendant depth updates when the
/// parent changed. Dropping a category where it already sits yields an
/// empty patch set.
///
/// # Errors
///
/// - [`OrderError::NotFound`] if either id is not in `forest`.
/// - [`OrderError::InvalidMove`] if the ids are equal or `target_id` lies
///   inside the subtree of `moving_id`.
pub fn plan_move(
    forest: &Forest,
    moving_id: CategoryId,
    target_id: CategoryId,
    position: Position,
    cfg: &OrderingConfig,
) -> Result<PatchSet, OrderError> {
    let moving = EntityRef::Category(moving_id);
    let target = EntityRef::Category(target_id);

    let mover = forest.get(moving_id).ok_or(OrderError::NotFound(moving))?;
    if !forest.contains(target_id) {
        return Err(OrderError::NotFound(target));
    }
    if moving_id == target_id {
        return Err(OrderError::InvalidMove {
            moving,
            target,
            reason: "a category cannot be placed relative to itself",
        });
    }
    if forest.is_descendant(moving_id, target_id) {
        return Err(OrderError::InvalidMove {
            moving,
            target,
            reason: "target is a descendant of the moving category",
        });
    }

    if is_in_place(forest, moving_id, target_id, position) {
        tracing::debug!(moving_id, target_id, ?position, "category already in place");
        return Ok(PatchSet::Categories(Vec::new()));
    }

    let old_parent = forest.parent(moving_id);
    let new_parent = match position {
        Position::Inside => Some(target_id),
        Position::Before | Position::After => forest.parent(target_id),
    };

    let group: Vec<(CategoryId, i64)> = forest
        .children(new_parent)
        .iter()
        .filter(|id| **id != moving_id)
        .filter_map(|id| forest.get(*id).map(|c| (c.id, c.display_order)))
        .collect();

    let (order, renumbered) = match position {
        Position::Inside => (
            append_order(group.iter().map(|(_, order)| *order), cfg),
            Vec::new(),
        ),
        Position::Before | Position::After => {
            let anchor = group
                .iter()
                .position(|(id, _)| *id == target_id)
                .ok_or(OrderError::NotFound(target))?;
            let side = if position == Position::Before {
                Side::Before
            } else {
                Side::After
            };
            let slot = slot_beside(&group, anchor, side, cfg);
            (slot.order, slot.renumbered)
        }
    };

    let new_depth = new_parent
        .and_then(|p| forest.depth(p))
        .map_or(0, |d| d + 1);

    let mut patches = vec![CategoryPatch {
        id: moving_id,
        parent_id: new_parent,
        display_order: order,
        depth: new_depth,
    }];

    for (id, display_order) in renumbered {
        if let Some(sibling) = forest.get(id) {
            patches.push(CategoryPatch {
                display_order,
                ..CategoryPatch::capture(sibling)
            });
        }
    }

    let delta = i64::from(new_depth) - i64::from(mover.depth);
    if old_parent != new_parent && delta != 0 {
        for id in forest.descendants(moving_id) {
            if let Some(descendant) = forest.get(id) {
                let depth = u32::try_from(i64::from(descendant.depth) + delta).unwrap_or(0);
                patches.push(CategoryPatch {
                    depth,
                    ..CategoryPatch::capture(descendant)
                });
            }
        }
    }

    tracing::debug!(
        moving_id,
        target_id,
        ?position,
        patches = patches.len(),
        "planned category move"
    );
    Ok(PatchSet::Categories(patches))
}

/// `true` when the drop would leave `moving_id` exactly where it is.
fn is_in_place(forest: &Forest, moving_id: CategoryId, target_id: CategoryId, position: Position) -> bool {
    let parent = forest.parent(moving_id);
    match position {
        Position::Inside => {
            parent == Some(target_id) && forest.children(Some(target_id)).last() == Some(&moving_id)
        }
        Position::Before | Position::After => {
            if parent != forest.parent(target_id) {
                return false;
            }
            let siblings = forest.children(parent);
            let find = |id| siblings.iter().position(|s| *s == id);
            match (find(moving_id), find(target_id)) {
                (Some(m), Some(t)) if position == Position::Before => m + 1 == t,
                (Some(m), Some(t)) => t + 1 == m,
                _ => false,
            }
        }
    }
}
