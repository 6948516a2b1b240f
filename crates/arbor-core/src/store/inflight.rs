use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::EntityRef;

/// Per-record queue for mutations that are waiting on persistence.
///
/// Each entity maps to an async mutex. A mutation acquires the mutexes of
/// every record it touches, always in `EntityRef` order, so two mutations on
/// the same record run one after the other while disjoint ones overlap and
/// no two acquisitions can deadlock.
#[derive(Debug, Default)]
pub struct InFlight {
    slots: Mutex<BTreeMap<EntityRef, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one mutation; releases its records on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    entities: BTreeSet<EntityRef>,
    _held: Vec<OwnedMutexGuard<()>>,
}

impl InFlightGuard {
    pub fn covers(&self, entity: &EntityRef) -> bool {
        self.entities.contains(entity)
    }

    pub const fn entities(&self) -> &BTreeSet<EntityRef> {
        &self.entities
    }
}

impl InFlight {
    /// Wait until every record in `entities` is free, then hold them all.
    pub async fn acquire(&self, entities: impl IntoIterator<Item = EntityRef>) -> InFlightGuard {
        let entities: BTreeSet<EntityRef> = entities.into_iter().collect();
        let slots: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Slots nobody holds or waits on are only referenced by the map.
            map.retain(|_, slot| Arc::strong_count(slot) > 1);
            entities
                .iter()
                .map(|entity| Arc::clone(map.entry(*entity).or_default()))
                .collect()
        };

        let mut held = Vec::with_capacity(slots.len());
        for slot in slots {
            held.push(slot.lock_owned().await);
        }
        InFlightGuard {
            entities,
            _held: held,
        }
    }

    /// `true` while some mutation holds `entity`.
    pub fn is_busy(&self, entity: &EntityRef) -> bool {
        let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(entity).is_some_and(|slot| slot.try_lock().is_err())
    }
}
