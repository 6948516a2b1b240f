//! End-to-end store scenarios against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use arbor_core::config::ArborConfig;
use arbor_core::error::{ErrorCode, PersistenceError, StoreError};
use arbor_core::model::{Category, CategoryKind, Content, Domain, EntityRef, OwnerScope};
use arbor_core::order::Position;
use arbor_core::persist::{MemoryBackend, NewCategory, Persistence, WriteOp};
use arbor_core::store::{CategoryStore, ContentDraft, LoadOutcome, StoreEvent};
use tokio::sync::broadcast::Receiver;

const NOTES: OwnerScope = OwnerScope::new(7, Domain::Note);
const REVIEWS: OwnerScope = OwnerScope::new(7, Domain::Review);

async fn store_with(
    categories: Vec<Category>,
    contents: Vec<Content>,
) -> (Arc<MemoryBackend>, CategoryStore<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::seeded(NOTES, categories, contents));
    let store = CategoryStore::new(Arc::clone(&backend), NOTES, ArborConfig::default());
    store.load(NOTES).await.unwrap();
    (backend, store)
}

fn cat(id: i64, parent: Option<i64>, order: i64) -> Category {
    let c = Category::new(id, 7, format!("c{id}"), order);
    match parent {
        Some(p) => c.with_parent(p),
        None => c,
    }
}

fn drain(rx: &mut Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn stored(backend: &MemoryBackend, id: i64) -> Category {
    backend
        .categories(&NOTES)
        .into_iter()
        .find(|c| c.id == id)
        .unwrap()
}

#[tokio::test]
async fn sibling_moves_before_first_root() {
    let (backend, store) = store_with(vec![cat(1, None, 0), cat(2, None, 1)], vec![]).await;

    store.move_category(2, 1, Position::Before).await.unwrap();

    let forest = store.forest();
    assert_eq!(forest.roots(), &[2, 1]);
    assert_eq!(forest.get(1).unwrap().display_order, 0);
    assert!(forest.get(2).unwrap().display_order < 0);
    assert_eq!(stored(&backend, 2).display_order, forest.get(2).unwrap().display_order);
    assert_eq!(stored(&backend, 1).display_order, 0);
}

#[tokio::test]
async fn reparent_cascades_depth_to_descendants() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, None, 1000), cat(3, Some(1), 0)],
        vec![],
    )
    .await;

    let set = store.move_category(1, 2, Position::Inside).await.unwrap();
    assert_eq!(
        set.entities(),
        vec![EntityRef::Category(1), EntityRef::Category(3)]
    );

    let forest = store.forest();
    assert_eq!(forest.parent(1), Some(2));
    assert_eq!(forest.depth(1), Some(1));
    assert_eq!(forest.depth(3), Some(2));
    assert_eq!(stored(&backend, 1).parent_id, Some(2));
    assert_eq!(stored(&backend, 1).depth, 1);
    assert_eq!(stored(&backend, 3).depth, 2);
}

#[tokio::test]
async fn first_content_of_empty_category_starts_at_baseline() {
    let (backend, store) = store_with(vec![cat(4, None, 0)], vec![]).await;

    let created = store
        .create_content(4, ContentDraft::new("Kickoff").with_body("agenda"))
        .await
        .unwrap();

    assert_eq!(created.display_order, 0);
    assert_eq!(created.category_id, 4);
    assert_eq!(store.contents(4), vec![created.clone()]);
    assert_eq!(backend.contents(&NOTES), vec![created]);
}

#[tokio::test]
async fn content_moves_and_recategorizes() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, None, 1)],
        vec![
            Content::new(10, 1, 7, "a", 0),
            Content::new(11, 1, 7, "b", 1000),
            Content::new(12, 1, 7, "c", 2000),
            Content::new(20, 2, 7, "z", 0),
        ],
    )
    .await;
    let mut rx = store.subscribe();

    store.move_content(12, 10, Position::Before).await.unwrap();
    let order: Vec<i64> = store.contents(1).iter().map(|c| c.id).collect();
    assert_eq!(order, vec![12, 10, 11]);

    store.recategorize_content(10, 2).await.unwrap();
    let moved: Vec<i64> = store.contents(2).iter().map(|c| c.id).collect();
    assert_eq!(moved, vec![20, 10]);
    let record = backend.contents(&NOTES).into_iter().find(|c| c.id == 10).unwrap();
    assert_eq!(record.category_id, 2);
    assert_eq!(record.display_order, 1000);

    let events = drain(&mut rx);
    assert!(events.contains(&StoreEvent::ContentsChanged { category_id: 1 }));
    assert!(events.contains(&StoreEvent::ContentsChanged { category_id: 2 }));
    assert!(!events.contains(&StoreEvent::ForestChanged));
}

#[tokio::test]
async fn failed_move_restores_prior_snapshot() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, None, 1000), cat(3, Some(1), 0)],
        vec![Content::new(9, 3, 7, "leaf", 0)],
    )
    .await;
    let before = store.snapshot();
    let mut rx = store.subscribe();

    backend.fail_next_writes(1);
    let err = store.move_category(1, 2, Position::Inside).await.unwrap_err();

    assert!(matches!(err, StoreError::PersistenceFailure(_)));
    assert_eq!(err.code(), ErrorCode::PersistenceRejected);
    assert_eq!(*store.snapshot(), *before);
    assert!(!store.is_in_flight(EntityRef::Category(1)));

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(StoreEvent::RolledBack { entities, .. }) if entities.contains(&EntityRef::Category(1))
    ));
}

#[tokio::test]
async fn partial_failure_reverts_confirmed_writes() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, Some(1), 0), cat(3, Some(2), 0)],
        vec![],
    )
    .await;
    let before = store.snapshot();

    backend.set_fault_hook(|op| *op == WriteOp::UpdateCategory(3));
    let err = store.deactivate_category(1).await.unwrap_err();
    backend.clear_fault_hook();

    assert!(matches!(err, StoreError::PersistenceFailure(_)));
    assert_eq!(*store.snapshot(), *before);
    assert!(backend.categories(&NOTES).iter().all(|c| c.is_active));
}

#[tokio::test]
async fn failed_create_drops_provisional_record() {
    let (backend, store) = store_with(vec![cat(1, None, 0)], vec![]).await;
    let before = store.snapshot();

    backend.fail_next_writes(1);
    let err = store
        .create_category(Some(1), "Drafts", CategoryKind::Note)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::PersistenceFailure(_)));
    assert_eq!(*store.snapshot(), *before);
    assert!(store.forest().categories().all(|c| c.id > 0));
}

#[tokio::test]
async fn stale_load_response_is_discarded() {
    let (backend, store) = store_with(vec![cat(1, None, 0)], vec![]).await;
    backend
        .create_category(
            &REVIEWS,
            NewCategory {
                name: "Inbox".into(),
                kind: CategoryKind::Root,
                parent_id: None,
                depth: 0,
                display_order: 0,
            },
        )
        .await
        .unwrap();

    backend.set_latency(Some(Duration::from_millis(50)));
    let (first, second) = tokio::join!(store.load(NOTES), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.set_latency(None);
        store.load(REVIEWS).await
    });

    assert_eq!(
        first.unwrap(),
        LoadOutcome::Superseded {
            token: 2,
            latest: 3
        }
    );
    assert!(matches!(second.unwrap(), LoadOutcome::Applied { generation: 2, categories: 1, .. }));
    assert_eq!(store.scope(), REVIEWS);
    let names: Vec<String> = store.forest().categories().map(|c| c.name.clone()).collect();
    assert_eq!(names, vec!["Inbox".to_string()]);
}

#[tokio::test]
async fn failed_load_keeps_state() {
    let (backend, store) = store_with(vec![cat(1, None, 0)], vec![]).await;
    let before = store.snapshot();

    backend.set_unavailable(true);
    let err = store.load(NOTES).await.unwrap_err();

    assert!(matches!(err, StoreError::Load(_)));
    assert_eq!(err.code(), ErrorCode::PersistenceUnavailable);
    assert_eq!(store.generation(), 1);
    assert_eq!(*store.snapshot(), *before);
}

#[tokio::test]
async fn same_record_mutations_queue() {
    let (backend, store) = store_with(vec![cat(1, None, 0)], vec![]).await;
    backend.set_latency(Some(Duration::from_millis(30)));

    let (first, second) = tokio::join!(store.rename_category(1, "One"), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.is_in_flight(EntityRef::Category(1)));
        store.rename_category(1, "Two").await
    });

    first.unwrap();
    second.unwrap();
    assert_eq!(store.forest().get(1).unwrap().name, "Two");
    assert_eq!(stored(&backend, 1).name, "Two");
    assert!(!store.is_in_flight(EntityRef::Category(1)));
}

#[tokio::test]
async fn load_during_write_reports_conflict() {
    let (backend, store) = store_with(vec![cat(1, None, 0)], vec![]).await;
    backend.set_latency(Some(Duration::from_millis(50)));

    let (write, load) = tokio::join!(store.rename_category(1, "Renamed"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.set_latency(None);
        store.load(NOTES).await
    });

    assert!(matches!(load.unwrap(), LoadOutcome::Applied { generation: 2, .. }));
    let err = write.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { current: 2, .. }));
    assert_eq!(err.code(), ErrorCode::Conflict);
    // The reload saw the row before the write landed.
    assert_eq!(store.forest().get(1).unwrap().name, "c1");

    store.load(NOTES).await.unwrap();
    assert_eq!(store.forest().get(1).unwrap().name, "Renamed");
}

#[tokio::test]
async fn subscribers_see_optimistic_and_rollback_events() {
    let (backend, store) = store_with(vec![cat(1, None, 0), cat(2, None, 1000)], vec![]).await;
    let mut rx = store.subscribe();

    store.move_category(2, 1, Position::Before).await.unwrap();
    assert_eq!(drain(&mut rx), vec![StoreEvent::ForestChanged]);

    backend.fail_next_writes(1);
    store.rename_category(1, "Renamed").await.unwrap_err();
    let events = drain(&mut rx);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], StoreEvent::ForestChanged);
    assert_eq!(events[1], StoreEvent::ForestChanged);
    assert!(matches!(&events[2], StoreEvent::RolledBack { entities, .. } if entities == &[EntityRef::Category(1)]));

    store.load(NOTES).await.unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![StoreEvent::Loaded {
            scope: NOTES,
            generation: 2
        }]
    );
}

#[tokio::test]
async fn invalid_moves_leave_store_untouched() {
    let (backend, store) = store_with(vec![cat(1, None, 0), cat(2, Some(1), 0)], vec![]).await;
    let before = store.snapshot();
    let writes = backend.writes();

    let err = store.move_category(1, 2, Position::Inside).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMove);
    let err = store.move_category(1, 99, Position::After).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    assert_eq!(*store.snapshot(), *before);
    assert_eq!(backend.writes(), writes);
}

#[tokio::test]
async fn planned_patch_set_applies_and_persists() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, None, 1000), cat(3, Some(1), 0)],
        vec![],
    )
    .await;
    let mut rx = store.subscribe();

    let set = store.plan_move(1, 2, Position::Inside).unwrap();
    // Planning alone changes nothing.
    assert_eq!(store.forest().parent(1), None);

    store.apply_move(set).await.unwrap();

    let forest = store.forest();
    assert_eq!(forest.parent(1), Some(2));
    assert_eq!(forest.depth(3), Some(2));
    assert_eq!(stored(&backend, 1).parent_id, Some(2));
    assert_eq!(stored(&backend, 3).depth, 2);
    assert_eq!(drain(&mut rx), vec![StoreEvent::ForestChanged]);
}

#[tokio::test]
async fn reapplying_a_patch_set_changes_nothing() {
    let (backend, store) = store_with(vec![cat(1, None, 0), cat(2, None, 1000)], vec![]).await;

    let set = store.plan_move(2, 1, Position::Before).unwrap();
    store.apply_move(set.clone()).await.unwrap();
    let once = store.snapshot();
    let rows = backend.categories(&NOTES);

    store.apply_move(set).await.unwrap();

    assert_eq!(*store.snapshot(), *once);
    assert_eq!(backend.categories(&NOTES), rows);
    assert_eq!(store.forest().roots(), &[2, 1]);
}

#[tokio::test]
async fn failed_patch_set_rolls_back() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, None, 1000), cat(3, Some(1), 0)],
        vec![],
    )
    .await;
    let before = store.snapshot();
    let rows = backend.categories(&NOTES);
    let mut rx = store.subscribe();

    let set = store.plan_move(1, 2, Position::Inside).unwrap();
    // First write (category 1) lands, the cascade to 3 is refused.
    backend.set_fault_hook(|op| *op == WriteOp::UpdateCategory(3));
    let err = store.apply_move(set).await.unwrap_err();

    assert!(matches!(err, StoreError::PersistenceFailure(_)));
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(backend.categories(&NOTES), rows);
    assert!(matches!(
        drain(&mut rx).last(),
        Some(StoreEvent::RolledBack { entities, .. })
            if entities == &[EntityRef::Category(1), EntityRef::Category(3)]
    ));
}

#[tokio::test]
async fn patch_sets_that_would_form_a_cycle_are_rejected() {
    let (backend, store) = store_with(vec![cat(1, None, 0), cat(2, None, 1000)], vec![]).await;

    // Both planned from the same snapshot; each is valid on its own.
    let first = store.plan_move(1, 2, Position::Inside).unwrap();
    let second = store.plan_move(2, 1, Position::Inside).unwrap();

    store.apply_move(first).await.unwrap();
    let before = store.snapshot();
    let writes = backend.writes();

    let err = store.apply_move(second).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMove);
    assert!(err.is_local());

    assert_eq!(*store.snapshot(), *before);
    assert_eq!(backend.writes(), writes);
    assert_eq!(store.forest().len(), 2);
    assert_eq!(stored(&backend, 2).parent_id, None);
}

#[tokio::test]
async fn stale_patch_sets_are_rejected() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, None, 1000), cat(3, None, 2000)],
        vec![],
    )
    .await;

    // Planned while 1 is a root, so 3 would sit at depth 1.
    let stale = store.plan_move(3, 1, Position::Inside).unwrap();
    store.move_category(1, 2, Position::Inside).await.unwrap();
    let writes = backend.writes();

    let err = store.apply_move(stale).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMove);
    assert_eq!(store.forest().parent(3), None);
    assert_eq!(backend.writes(), writes);

    // Replanning against the current forest works.
    let fresh = store.plan_move(3, 1, Position::Inside).unwrap();
    store.apply_move(fresh).await.unwrap();
    assert_eq!(store.forest().depth(3), Some(2));
}

#[tokio::test]
async fn rollback_restores_selection() {
    let (backend, store) = store_with(
        vec![cat(1, None, 0), cat(2, Some(1), 0)],
        vec![Content::new(9, 2, 7, "leaf", 0)],
    )
    .await;
    store.select_category(Some(2)).unwrap();
    store.select_content(Some(9)).unwrap();
    let selected = store.selection();

    backend.fail_next_writes(1);
    store.deactivate_category(1).await.unwrap_err();
    assert_eq!(store.selection(), selected);
    assert!(store.forest().contains(2));

    backend.fail_next_writes(1);
    store.delete_content(9).await.unwrap_err();
    assert_eq!(store.selection(), selected);

    // A successful deactivation still clears it.
    store.deactivate_category(1).await.unwrap();
    assert_eq!(store.selection().category, None);
}

#[tokio::test]
async fn conflict_carries_the_rejected_write() {
    let (backend, store) = store_with(vec![cat(1, None, 0)], vec![]).await;
    backend.set_latency(Some(Duration::from_millis(50)));
    backend.fail_next_writes(1);

    let (write, load) = tokio::join!(store.rename_category(1, "Renamed"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.set_latency(None);
        store.load(NOTES).await
    });

    assert!(matches!(load.unwrap(), LoadOutcome::Applied { generation: 2, .. }));
    let err = write.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert!(matches!(
        err,
        StoreError::Conflict {
            rejected: Some(PersistenceError::Rejected(_)),
            ..
        }
    ));
    assert_eq!(stored(&backend, 1).name, "c1");
}
