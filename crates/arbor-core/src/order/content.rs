//! Ordering for content leaves.
//!
//! Content items live in a single level under their category, so a move is
//! only ever `before`/`after` another item of the same category. Changing the
//! owning category is a separate operation, [`plan_recategorize`], which
//! appends the item to the destination list.

use super::Position;
use super::patch::{ContentPatch, PatchSet};
use super::slot::{Side, append_order, slot_beside};
use crate::config::OrderingConfig;
use crate::error::OrderError;
use crate::model::{CategoryId, ContentId, EntityRef};
use crate::tree::{ContentLists, Forest};

/// Plan dropping content `moving_id` before or after `target_id`.
///
/// # Errors
///
/// - [`OrderError::NotFound`] if either id is absent from `lists`.
/// - [`OrderError::InvalidMove`] for `inside`, a self-target, or a target in
///   a different category.
pub fn plan_content_move(
    lists: &ContentLists,
    moving_id: ContentId,
    target_id: ContentId,
    position: Position,
    cfg: &OrderingConfig,
) -> Result<PatchSet, OrderError> {
    let moving = EntityRef::Content(moving_id);
    let target = EntityRef::Content(target_id);

    let mover = lists.get(moving_id).ok_or(OrderError::NotFound(moving))?;
    let anchor_item = lists.get(target_id).ok_or(OrderError::NotFound(target))?;

    let side = match position {
        Position::Before => Side::Before,
        Position::After => Side::After,
        Position::Inside => {
            return Err(OrderError::InvalidMove {
                moving,
                target,
                reason: "content items cannot contain other items",
            });
        }
    };
    if moving_id == target_id {
        return Err(OrderError::InvalidMove {
            moving,
            target,
            reason: "a content item cannot be placed relative to itself",
        });
    }
    if mover.category_id != anchor_item.category_id {
        return Err(OrderError::InvalidMove {
            moving,
            target,
            reason: "content can only be reordered within its category; recategorize it first",
        });
    }

    let list = lists.list(mover.category_id);
    let find = |id| list.iter().position(|c| c.id == id);
    if let (Some(m), Some(t)) = (find(moving_id), find(target_id)) {
        let in_place = match side {
            Side::Before => m + 1 == t,
            Side::After => t + 1 == m,
        };
        if in_place {
            return Ok(PatchSet::Contents(Vec::new()));
        }
    }

    let group: Vec<(ContentId, i64)> = list
        .iter()
        .filter(|c| c.id != moving_id)
        .map(|c| (c.id, c.display_order))
        .collect();
    let anchor = group
        .iter()
        .position(|(id, _)| *id == target_id)
        .ok_or(OrderError::NotFound(target))?;
    let slot = slot_beside(&group, anchor, side, cfg);

    let mut patches = vec![ContentPatch {
        id: moving_id,
        category_id: mover.category_id,
        display_order: slot.order,
    }];
    for (id, display_order) in slot.renumbered {
        if let Some(sibling) = lists.get(id) {
            patches.push(ContentPatch {
                display_order,
                ..ContentPatch::capture(sibling)
            });
        }
    }

    tracing::debug!(moving_id, target_id, ?position, patches = patches.len(), "planned content move");
    Ok(PatchSet::Contents(patches))
}

/// Plan moving content `content_id` to the end of `new_category_id`.
///
/// Re-categorizing into the current category is a no-op.
///
/// # Errors
///
/// [`OrderError::NotFound`] if the content item is absent from `lists` or
/// the destination is not an active category in `forest`.
pub fn plan_recategorize(
    forest: &Forest,
    lists: &ContentLists,
    content_id: ContentId,
    new_category_id: CategoryId,
    cfg: &OrderingConfig,
) -> Result<PatchSet, OrderError> {
    let content = lists
        .get(content_id)
        .ok_or(OrderError::NotFound(EntityRef::Content(content_id)))?;
    if !forest.contains(new_category_id) {
        return Err(OrderError::NotFound(EntityRef::Category(new_category_id)));
    }
    if content.category_id == new_category_id {
        return Ok(PatchSet::Contents(Vec::new()));
    }

    let order = append_order(
        lists.list(new_category_id).iter().map(|c| c.display_order),
        cfg,
    );
    Ok(PatchSet::Contents(vec![ContentPatch {
        id: content_id,
        category_id: new_category_id,
        display_order: order,
    }]))
}

#[cfg(test)]
mod tests {
    use super::{plan_content_move, plan_recategorize};
    use crate::config::OrderingConfig;
    use crate::error::OrderError;
    use crate::model::{Category, Content, EntityRef};
    use crate::order::{ContentPatch, PatchSet, Position};
    use crate::tree::{ContentLists, build_forest};

    fn lists() -> ContentLists {
        ContentLists::build(&[
            Content::new(1, 10, 1, "a", 0),
            Content::new(2, 10, 1, "b", 1),
            Content::new(3, 10, 1, "c", 2),
            Content::new(4, 20, 1, "d", 0),
        ])
    }

    fn patches(set: PatchSet) -> Vec<ContentPatch> {
        match set {
            PatchSet::Contents(p) => p,
            PatchSet::Categories(_) => panic!("expected content patches"),
        }
    }

    #[test]
    fn before_reorders_within_category() {
        let cfg = OrderingConfig::default();
        let out = patches(plan_content_move(&lists(), 3, 1, Position::Before, &cfg).unwrap());
        assert_eq!(out[0].id, 3);
        assert_eq!(out[0].category_id, 10);
        assert!(out[0].display_order < 0);
    }

    #[test]
    fn between_adjacent_orders_renumbers() {
        let cfg = OrderingConfig::default();
        let out = patches(plan_content_move(&lists(), 3, 1, Position::After, &cfg).unwrap());
        let order = |id| out.iter().find(|p| p.id == id).map(|p| p.display_order);
        assert_eq!(order(1), None, "first item already at baseline");
        assert_eq!(order(2), Some(1000));
        assert_eq!(order(3), Some(500));
    }

    #[test]
    fn inside_is_invalid() {
        let err = plan_content_move(&lists(), 1, 2, Position::Inside, &OrderingConfig::default())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidMove { .. }));
    }

    #[test]
    fn cross_category_is_invalid() {
        let err = plan_content_move(&lists(), 1, 4, Position::After, &OrderingConfig::default())
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidMove { .. }));
    }

    #[test]
    fn missing_content_is_not_found() {
        let err = plan_content_move(&lists(), 1, 99, Position::After, &OrderingConfig::default())
            .unwrap_err();
        assert_eq!(err, OrderError::NotFound(EntityRef::Content(99)));
    }

    #[test]
    fn in_place_is_empty() {
        let cfg = OrderingConfig::default();
        assert!(plan_content_move(&lists(), 1, 2, Position::Before, &cfg).unwrap().is_empty());
        assert!(plan_content_move(&lists(), 2, 1, Position::After, &cfg).unwrap().is_empty());
    }

    #[test]
    fn recategorize_appends_to_destination() {
        let forest = build_forest(&[Category::new(10, 1, "A", 0), Category::new(20, 1, "B", 1)]);
        let out = patches(
            plan_recategorize(&forest, &lists(), 1, 20, &OrderingConfig::default()).unwrap(),
        );
        assert_eq!(
            out,
            vec![ContentPatch {
                id: 1,
                category_id: 20,
                display_order: 1000
            }]
        );
    }

    #[test]
    fn recategorize_into_empty_category_uses_baseline() {
        let forest = build_forest(&[Category::new(10, 1, "A", 0), Category::new(30, 1, "C", 1)]);
        let out = patches(
            plan_recategorize(&forest, &lists(), 2, 30, &OrderingConfig::default()).unwrap(),
        );
        assert_eq!(out[0].display_order, 0);
    }

    #[test]
    fn recategorize_to_unknown_category_is_not_found() {
        let forest = build_forest(&[Category::new(10, 1, "A", 0)]);
        let err = plan_recategorize(&forest, &lists(), 1, 77, &OrderingConfig::default())
            .unwrap_err();
        assert_eq!(err, OrderError::NotFound(EntityRef::Category(77)));
    }

    #[test]
    fn recategorize_same_category_is_noop() {
        let forest = build_forest(&[Category::new(10, 1, "A", 0)]);
        let set = plan_recategorize(&forest, &lists(), 1, 10, &OrderingConfig::default()).unwrap();
        assert!(set.is_empty());
    }
}
