//! Invariant checks run after every simulated step and after the final
//! reload.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use arbor_core::model::{Category, CategoryId, Content, EntityRef};
use arbor_core::store::Snapshot;
use arbor_core::tree::Forest;
use serde::{Deserialize, Serialize};

use crate::simulator::StepOutcome;

/// One failed invariant, tagged with the step that exposed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A category's depth is not its parent's depth + 1 (or 0 for a root).
    DepthMismatch {
        step: usize,
        category: CategoryId,
        expected: u32,
        actual: Option<u32>,
    },

    /// A sibling group is not sorted by `(display_order, id)`.
    UnsortedSiblings {
        step: usize,
        parent: Option<CategoryId>,
    },

    /// The store's forest dropped categories onto a parent cycle.
    Cycle {
        step: usize,
        excluded: Vec<CategoryId>,
    },

    /// A provisional (negative) id outlived the operation that created it.
    ProvisionalRecord { step: usize, entity: EntityRef },

    /// A rolled-back operation did not restore the prior snapshot exactly.
    RollbackMismatch { step: usize },

    /// A rolled-back operation published no `RolledBack` event, or a
    /// successful one published one.
    RollbackEvent { step: usize, events: usize },

    /// A locally rejected operation changed the snapshot or wrote to the
    /// backend.
    RejectedButMutated { step: usize, code: String },

    /// An error that a sequential run never produces.
    UnexpectedError { step: usize, error: String },

    /// A store record disagrees with the backend after the step settled.
    Mirror { step: usize, entity: EntityRef },

    /// Reloading from the backend produced different forest or content
    /// lists than the settled store held.
    Divergence { entities: Vec<EntityRef> },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthMismatch {
                step,
                category,
                expected,
                actual,
            } => write!(
                f,
                "step {step}: category {category} has depth {actual:?}, expected {expected}"
            ),
            Self::UnsortedSiblings { step, parent } => {
                write!(f, "step {step}: children of {parent:?} are out of order")
            }
            Self::Cycle { step, excluded } => {
                write!(f, "step {step}: categories {excluded:?} sit on a parent cycle")
            }
            Self::ProvisionalRecord { step, entity } => {
                write!(f, "step {step}: provisional {entity} left in the store")
            }
            Self::RollbackMismatch { step } => {
                write!(f, "step {step}: rollback did not restore the prior snapshot")
            }
            Self::RollbackEvent { step, events } => {
                write!(f, "step {step}: {events} rollback events published")
            }
            Self::RejectedButMutated { step, code } => {
                write!(f, "step {step}: rejected ({code}) but state changed")
            }
            Self::UnexpectedError { step, error } => {
                write!(f, "step {step}: unexpected error: {error}")
            }
            Self::Mirror { step, entity } => {
                write!(f, "step {step}: {entity} differs between store and backend")
            }
            Self::Divergence { entities } => {
                write!(f, "reload diverged from settled store on {entities:?}")
            }
        }
    }
}

/// Structural checks on a built forest.
pub fn check_forest(step: usize, forest: &Forest) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if !forest.excluded().is_empty() {
        violations.push(InvariantViolation::Cycle {
            step,
            excluded: forest.excluded().to_vec(),
        });
    }

    let mut parents = vec![None];
    for category in forest.categories() {
        parents.push(Some(category.id));
        let expected = forest
            .parent(category.id)
            .and_then(|p| forest.depth(p))
            .map_or(0, |d| d + 1);
        let actual = forest.depth(category.id);
        if actual != Some(expected) {
            violations.push(InvariantViolation::DepthMismatch {
                step,
                category: category.id,
                expected,
                actual,
            });
        }
        if category.is_provisional() {
            violations.push(InvariantViolation::ProvisionalRecord {
                step,
                entity: EntityRef::Category(category.id),
            });
        }
    }

    for parent in parents {
        let keys: Vec<(i64, CategoryId)> = forest
            .children(parent)
            .iter()
            .filter_map(|id| forest.get(*id).map(|c| (c.display_order, c.id)))
            .collect();
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            violations.push(InvariantViolation::UnsortedSiblings { step, parent });
        }
    }

    violations
}

/// What one step may and may not have changed, given its outcome.
pub fn check_step(
    step: usize,
    outcome: &StepOutcome,
    before: &Snapshot,
    after: &Snapshot,
    writes: (usize, usize),
    rollback_events: usize,
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    match outcome {
        StepOutcome::Applied => {
            if rollback_events != 0 {
                violations.push(InvariantViolation::RollbackEvent {
                    step,
                    events: rollback_events,
                });
            }
            violations.extend(
                after
                    .content_records()
                    .filter(|c| c.is_provisional())
                    .map(|c| InvariantViolation::ProvisionalRecord {
                        step,
                        entity: EntityRef::Content(c.id),
                    }),
            );
        }
        StepOutcome::RolledBack { .. } => {
            if after != before {
                violations.push(InvariantViolation::RollbackMismatch { step });
            }
            if rollback_events != 1 {
                violations.push(InvariantViolation::RollbackEvent {
                    step,
                    events: rollback_events,
                });
            }
        }
        StepOutcome::Rejected { code } => {
            if after != before || writes.0 != writes.1 {
                violations.push(InvariantViolation::RejectedButMutated {
                    step,
                    code: code.clone(),
                });
            }
        }
        StepOutcome::Failed { error } => violations.push(InvariantViolation::UnexpectedError {
            step,
            error: error.clone(),
        }),
    }
    violations
}

/// The store's records against the backend's rows.
///
/// Every category record must match exactly. Content is compared for every
/// item the store holds, and every backend item filed under an active
/// category must be held by the store.
pub fn check_mirror(
    step: usize,
    store: &Snapshot,
    categories: &[Category],
    contents: &[Content],
) -> Vec<InvariantViolation> {
    let mut differing = BTreeSet::new();

    let backend: BTreeMap<CategoryId, &Category> = categories.iter().map(|c| (c.id, c)).collect();
    let held: BTreeMap<CategoryId, &Category> = store.category_records().map(|c| (c.id, c)).collect();
    for id in backend.keys().chain(held.keys()) {
        if backend.get(id) != held.get(id) {
            differing.insert(EntityRef::Category(*id));
        }
    }

    let backend: BTreeMap<i64, &Content> = contents.iter().map(|c| (c.id, c)).collect();
    for content in store.content_records() {
        if backend.get(&content.id) != Some(&content) {
            differing.insert(EntityRef::Content(content.id));
        }
    }
    for content in backend.values() {
        if store.forest().contains(content.category_id) && store.content(content.id).is_none() {
            differing.insert(EntityRef::Content(content.id));
        }
    }

    differing
        .into_iter()
        .map(|entity| InvariantViolation::Mirror { step, entity })
        .collect()
}

/// A reload must reproduce the forest and content lists the store had
/// settled on.
pub fn check_convergence(settled: &Snapshot, reloaded: &Snapshot) -> Vec<InvariantViolation> {
    let mut entities = BTreeSet::new();

    let ids: BTreeSet<CategoryId> = settled
        .forest()
        .categories()
        .chain(reloaded.forest().categories())
        .map(|c| c.id)
        .collect();
    for id in ids {
        let same = settled.forest().get(id) == reloaded.forest().get(id)
            && settled.forest().parent(id) == reloaded.forest().parent(id)
            && settled.forest().children(Some(id)) == reloaded.forest().children(Some(id));
        if !same {
            entities.insert(EntityRef::Category(id));
        }
        if settled.contents().list(id) != reloaded.contents().list(id) {
            entities.insert(EntityRef::Category(id));
        }
    }
    if settled.forest().roots() != reloaded.forest().roots() {
        entities.extend(reloaded.forest().roots().iter().map(|id| EntityRef::Category(*id)));
    }

    if entities.is_empty() {
        Vec::new()
    } else {
        vec![InvariantViolation::Divergence {
            entities: entities.into_iter().collect(),
        }]
    }
}
