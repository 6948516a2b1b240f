//! Optimistic category store for one owner scope.
//!
//! The store holds an immutable [`Snapshot`] behind a short-lived mutex.
//! Every mutation follows the same path:
//!
//! 1. Take the in-flight locks for every record it touches ([`InFlight`]).
//! 2. Plan against the current snapshot and swap in a new snapshot with the
//!    change applied, remembering the prior records.
//! 3. Issue the persistence calls.
//! 4. Settle: keep the change on success, restore the prior records on
//!    failure, or drop the change with [`StoreError::Conflict`] when a
//!    `load()` replaced the state in the meantime.
//!
//! The state mutex is never held across an `.await`.

pub mod events;
pub mod inflight;
pub mod selection;
pub mod snapshot;

pub use events::{EventBus, StoreEvent};
pub use inflight::{InFlight, InFlightGuard};
pub use selection::Selection;
pub use snapshot::{Change, Snapshot};

use std::collections::BTreeSet;
use std::sync::atomic::{self, AtomicI64, AtomicU64};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::try_join_all;
use tokio::sync::broadcast;

use crate::config::ArborConfig;
use crate::error::{OrderError, PersistenceError, StoreError};
use crate::model::{
    Category, CategoryId, CategoryKind, Content, ContentId, ContentKind, EntityRef, OwnerScope,
};
use crate::order::slot::append_order;
use crate::order::{PatchSet, Position, plan_content_move, plan_move, plan_recategorize};
use crate::persist::{CategoryUpdate, ContentUpdate, NewCategory, NewContent, Persistence};
use crate::tree::Forest;

/// Result of [`CategoryStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The response replaced the store state.
    Applied {
        generation: u64,
        categories: usize,
        contents: usize,
    },
    /// A newer load was issued before this one finished; its response was
    /// discarded.
    Superseded { token: u64, latest: u64 },
}

/// Fields for a new content item. The store assigns its category and order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDraft {
    pub title: String,
    pub body: String,
    pub kind: ContentKind,
    pub metadata: serde_json::Value,
}

impl ContentDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug)]
struct State {
    scope: OwnerScope,
    snapshot: Arc<Snapshot>,
    generation: u64,
    selection: Selection,
}

impl State {
    /// Swap in a snapshot with `changes` applied and report what changed.
    fn apply(&mut self, changes: &[Change]) -> Vec<StoreEvent> {
        if changes.is_empty() {
            return Vec::new();
        }
        let mut forest_changed = false;
        let mut touched_lists = BTreeSet::new();
        for change in changes {
            match change {
                Change::PutCategory(_) | Change::RemoveCategory(_) => forest_changed = true,
                Change::PutContent(content) => {
                    touched_lists.insert(content.category_id);
                    if let Some(prior) = self.snapshot.content(content.id) {
                        touched_lists.insert(prior.category_id);
                    }
                }
                Change::RemoveContent(id) => {
                    if let Some(prior) = self.snapshot.content(*id) {
                        touched_lists.insert(prior.category_id);
                    }
                }
            }
        }

        self.snapshot = Arc::new(self.snapshot.with_changes(changes));
        self.selection.prune(&self.snapshot);

        let mut events = Vec::new();
        if forest_changed {
            events.push(StoreEvent::ForestChanged);
        }
        events.extend(
            touched_lists
                .into_iter()
                .map(|category_id| StoreEvent::ContentsChanged { category_id }),
        );
        events
    }
}

/// An optimistic change between apply and settle.
#[derive(Debug)]
struct Pending {
    entity: EntityRef,
    scope: OwnerScope,
    generation: u64,
    undo: Vec<Change>,
    selection: Selection,
}

/// One persistence call issued for a mutation.
#[derive(Debug)]
enum RemoteWrite {
    Category(CategoryId, CategoryUpdate),
    Content(ContentId, ContentUpdate),
    DeleteCategory(CategoryId),
    DeleteContent(ContentId),
}

impl RemoteWrite {
    const fn entity(&self) -> EntityRef {
        match self {
            Self::Category(id, _) | Self::DeleteCategory(id) => EntityRef::Category(*id),
            Self::Content(id, _) | Self::DeleteContent(id) => EntityRef::Content(*id),
        }
    }
}

/// Client-side store of one owner scope's category forest and content lists.
pub struct CategoryStore<P> {
    persistence: Arc<P>,
    config: ArborConfig,
    state: Mutex<State>,
    inflight: InFlight,
    events: EventBus,
    load_seq: AtomicU64,
    next_provisional: AtomicI64,
}

impl<P: Persistence> CategoryStore<P> {
    /// An empty store for `scope`. Call [`Self::load`] to fill it.
    pub fn new(persistence: Arc<P>, scope: OwnerScope, config: ArborConfig) -> Self {
        Self {
            events: EventBus::new(config.store.event_capacity),
            persistence,
            config,
            state: Mutex::new(State {
                scope,
                snapshot: Arc::default(),
                generation: 0,
                selection: Selection::default(),
            }),
            inflight: InFlight::default(),
            load_seq: AtomicU64::new(0),
            next_provisional: AtomicI64::new(-1),
        }
    }

    pub const fn persistence(&self) -> &Arc<P> {
        &self.persistence
    }

    pub const fn config(&self) -> &ArborConfig {
        &self.config
    }

    pub fn scope(&self) -> OwnerScope {
        self.lock_state().scope
    }

    /// Number of loads applied so far.
    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    /// The current snapshot. Cheap: shares the store's `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.lock_state().snapshot)
    }

    pub fn forest(&self) -> Forest {
        self.snapshot().forest().clone()
    }

    /// Active content of `category_id` in display order.
    pub fn contents(&self, category_id: CategoryId) -> Vec<Content> {
        self.snapshot().contents().list(category_id).to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// `true` while a mutation touching `entity` is waiting on persistence.
    pub fn is_in_flight(&self, entity: EntityRef) -> bool {
        self.inflight.is_busy(&entity)
    }

    pub fn selection(&self) -> Selection {
        self.lock_state().selection
    }

    /// Focus a category, or clear the focus with `None`. A selected content
    /// item outside the new category is deselected.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`] if the category is not in the forest.
    pub fn select_category(&self, id: Option<CategoryId>) -> Result<(), StoreError> {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        if let Some(id) = id.filter(|id| !state.snapshot.forest().contains(*id)) {
            return Err(OrderError::NotFound(EntityRef::Category(id)).into());
        }
        state.selection.category = id;
        let content_elsewhere = state
            .selection
            .content
            .and_then(|c| state.snapshot.contents().get(c))
            .is_some_and(|c| Some(c.category_id) != id);
        if content_elsewhere {
            state.selection.content = None;
        }
        Ok(())
    }

    /// Focus a content item (and its category), or clear it with `None`.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`] if the item is not in any content list.
    pub fn select_content(&self, id: Option<ContentId>) -> Result<(), StoreError> {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        match id {
            Some(id) => {
                let category_id = state
                    .snapshot
                    .contents()
                    .get(id)
                    .map(|c| c.category_id)
                    .ok_or(OrderError::NotFound(EntityRef::Content(id)))?;
                state.selection = Selection {
                    category: Some(category_id),
                    content: Some(id),
                };
            }
            None => state.selection.content = None,
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Load
    // -----------------------------------------------------------------------

    /// Fetch the categories of `scope`, then the content of every active
    /// category, and replace the store state with the result.
    ///
    /// Each call takes the next request token. If another load was issued
    /// while this one was waiting, the response is discarded and
    /// [`LoadOutcome::Superseded`] is returned.
    ///
    /// # Errors
    ///
    /// [`StoreError::Load`] if any fetch fails; the state is unchanged.
    pub async fn load(&self, scope: OwnerScope) -> Result<LoadOutcome, StoreError> {
        let token = self.load_seq.fetch_add(1, atomic::Ordering::SeqCst) + 1;
        tracing::debug!(%scope, token, "load started");

        let categories = self
            .persistence
            .list_categories(&scope)
            .await
            .map_err(StoreError::Load)?;
        let active: Vec<CategoryId> = categories
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect();
        let per_category = try_join_all(
            active
                .iter()
                .map(|id| self.persistence.list_contents(&scope, *id)),
        )
        .await
        .map_err(StoreError::Load)?;
        let snapshot = Snapshot::new(categories, per_category.into_iter().flatten());

        let (outcome, orphans, excluded) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let latest = self.load_seq.load(atomic::Ordering::SeqCst);
            if token != latest {
                tracing::debug!(%scope, token, latest, "discarding stale load response");
                return Ok(LoadOutcome::Superseded { token, latest });
            }
            if state.scope != scope {
                state.scope = scope;
                state.selection = Selection::default();
            }
            state.generation += 1;
            state.snapshot = Arc::new(snapshot);
            state.selection.prune(&state.snapshot);
            (
                LoadOutcome::Applied {
                    generation: state.generation,
                    categories: state.snapshot.forest().len(),
                    contents: state.snapshot.contents().len(),
                },
                state.snapshot.forest().orphans().len(),
                state.snapshot.forest().excluded().len(),
            )
        };

        if let LoadOutcome::Applied {
            generation,
            categories,
            contents,
        } = outcome
        {
            tracing::info!(
                %scope,
                generation,
                categories,
                contents,
                orphans,
                excluded,
                "category snapshot loaded"
            );
            self.events.publish(StoreEvent::Loaded { scope, generation });
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Moves
    // -----------------------------------------------------------------------

    /// Plan a category drop against the current snapshot without applying it.
    ///
    /// # Errors
    ///
    /// See [`crate::order::plan_move`].
    pub fn plan_move(
        &self,
        moving_id: CategoryId,
        target_id: CategoryId,
        position: Position,
    ) -> Result<PatchSet, StoreError> {
        let snapshot = self.snapshot();
        Ok(plan_move(
            snapshot.forest(),
            moving_id,
            target_id,
            position,
            &self.config.ordering,
        )?)
    }

    /// Apply a patch set optimistically and persist every entry.
    ///
    /// The set is checked against the current snapshot first, so one planned
    /// before another move landed cannot leave a cycle behind.
    ///
    /// # Errors
    ///
    /// - [`OrderError::NotFound`] if a patched or referenced record is gone.
    /// - [`OrderError::InvalidMove`] if the set no longer fits the forest.
    /// - [`StoreError::PersistenceFailure`] after rolling back.
    /// - [`StoreError::Conflict`] if a load replaced the state meanwhile.
    pub async fn apply_move(&self, set: PatchSet) -> Result<(), StoreError> {
        let entities = set.entities();
        let Some(&entity) = entities.first() else {
            return Ok(());
        };
        let _guard = self.inflight.acquire(entities).await;
        self.apply_planned(entity, |snapshot| {
            snapshot.check_patch(&set)?;
            Ok(set)
        })
        .await
        .map(|_| ())
    }

    /// Plan and apply a category drop in one step, holding the in-flight
    /// locks of every record the plan touches.
    ///
    /// # Errors
    ///
    /// As [`Self::plan_move`] and [`Self::apply_move`].
    pub async fn move_category(
        &self,
        moving_id: CategoryId,
        target_id: CategoryId,
        position: Position,
    ) -> Result<PatchSet, StoreError> {
        let cfg = self.config.ordering;
        let plan = move |s: &Snapshot| plan_move(s.forest(), moving_id, target_id, position, &cfg);
        let _guard = self
            .lock_stable(|s| {
                let mut touched = plan(s)?.entities();
                touched.extend([
                    EntityRef::Category(moving_id),
                    EntityRef::Category(target_id),
                ]);
                Ok(touched)
            })
            .await?;
        self.apply_planned(EntityRef::Category(moving_id), plan).await
    }

    /// Reorder a content item before or after another item of its category.
    ///
    /// # Errors
    ///
    /// As [`crate::order::plan_content_move`] and [`Self::apply_move`].
    pub async fn move_content(
        &self,
        moving_id: ContentId,
        target_id: ContentId,
        position: Position,
    ) -> Result<PatchSet, StoreError> {
        let cfg = self.config.ordering;
        let plan = move |s: &Snapshot| {
            plan_content_move(s.contents(), moving_id, target_id, position, &cfg)
        };
        let _guard = self
            .lock_stable(|s| {
                let mut touched = plan(s)?.entities();
                touched.extend([EntityRef::Content(moving_id), EntityRef::Content(target_id)]);
                Ok(touched)
            })
            .await?;
        self.apply_planned(EntityRef::Content(moving_id), plan).await
    }

    /// Move a content item to the end of another category.
    ///
    /// # Errors
    ///
    /// As [`crate::order::plan_recategorize`] and [`Self::apply_move`].
    pub async fn recategorize_content(
        &self,
        content_id: ContentId,
        new_category_id: CategoryId,
    ) -> Result<PatchSet, StoreError> {
        let cfg = self.config.ordering;
        let plan = move |s: &Snapshot| {
            plan_recategorize(s.forest(), s.contents(), content_id, new_category_id, &cfg)
        };
        let _guard = self
            .lock_stable(|s| {
                let mut touched = plan(s)?.entities();
                touched.extend([
                    EntityRef::Content(content_id),
                    EntityRef::Category(new_category_id),
                ]);
                Ok(touched)
            })
            .await?;
        self.apply_planned(EntityRef::Content(content_id), plan).await
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Create a category as the last child of `parent_id` (or the last root).
    ///
    /// The category appears immediately under a provisional negative id,
    /// which is swapped for the persisted record once the backend confirms.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] for a blank name.
    /// - [`OrderError::NotFound`] if the parent is not in the forest.
    /// - [`StoreError::PersistenceFailure`] after removing the provisional
    ///   record.
    pub async fn create_category(
        &self,
        parent_id: Option<CategoryId>,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Category, StoreError> {
        let name = validated("category name", name)?;
        let id = self.next_provisional.fetch_sub(1, atomic::Ordering::SeqCst);
        let entity = EntityRef::Category(id);
        let _guard = self
            .inflight
            .acquire(std::iter::once(entity).chain(parent_id.map(EntityRef::Category)))
            .await;

        let cfg = self.config.ordering;
        let (pending, request) = self.apply_local(entity, |snapshot, scope| {
            let forest = snapshot.forest();
            let depth = match parent_id {
                Some(parent) => {
                    forest
                        .depth(parent)
                        .ok_or(OrderError::NotFound(EntityRef::Category(parent)))?
                        + 1
                }
                None => 0,
            };
            let display_order = append_order(
                forest
                    .children(parent_id)
                    .iter()
                    .filter_map(|c| forest.get(*c))
                    .map(|c| c.display_order),
                &cfg,
            );
            let request = NewCategory {
                name,
                kind,
                parent_id,
                depth,
                display_order,
            };
            let provisional = request.clone().into_category(id, scope);
            Ok((vec![Change::PutCategory(provisional)], request))
        })?;

        let result = self
            .persistence
            .create_category(&pending.scope, request)
            .await;
        let created = self.settle(pending, result, |created: &Category, selection| {
            selection.remap_category(id, created.id);
            vec![
                Change::RemoveCategory(id),
                Change::PutCategory(created.clone()),
            ]
        })?;
        tracing::debug!(provisional = id, id = created.id, "category created");
        Ok(created)
    }

    /// Create a content item as the last item of `category_id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] for a blank title.
    /// - [`OrderError::NotFound`] if the category is not in the forest.
    /// - [`StoreError::PersistenceFailure`] after removing the provisional
    ///   record.
    pub async fn create_content(
        &self,
        category_id: CategoryId,
        draft: ContentDraft,
    ) -> Result<Content, StoreError> {
        let title = validated("content title", &draft.title)?;
        let id = self.next_provisional.fetch_sub(1, atomic::Ordering::SeqCst);
        let entity = EntityRef::Content(id);
        let _guard = self
            .inflight
            .acquire([entity, EntityRef::Category(category_id)])
            .await;

        let cfg = self.config.ordering;
        let (pending, request) = self.apply_local(entity, |snapshot, scope| {
            if !snapshot.forest().contains(category_id) {
                return Err(OrderError::NotFound(EntityRef::Category(category_id)).into());
            }
            let display_order = append_order(
                snapshot
                    .contents()
                    .list(category_id)
                    .iter()
                    .map(|c| c.display_order),
                &cfg,
            );
            let request = NewContent {
                category_id,
                title,
                body: draft.body,
                kind: draft.kind,
                metadata: draft.metadata,
                display_order,
            };
            let provisional = request.clone().into_content(id, scope);
            Ok((vec![Change::PutContent(provisional)], request))
        })?;

        let result = self
            .persistence
            .create_content(&pending.scope, request)
            .await;
        let created = self.settle(pending, result, |created: &Content, selection| {
            selection.remap_content(id, created.id);
            vec![Change::RemoveContent(id), Change::PutContent(created.clone())]
        })?;
        tracing::debug!(provisional = id, id = created.id, "content created");
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Rename / deactivate / delete
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// [`StoreError::Validation`], [`OrderError::NotFound`], or a
    /// persistence failure after rollback.
    pub async fn rename_category(&self, id: CategoryId, name: &str) -> Result<(), StoreError> {
        let name = validated("category name", name)?;
        let entity = EntityRef::Category(id);
        let _guard = self.inflight.acquire([entity]).await;
        let (pending, ()) = self.apply_local(entity, |snapshot, _| {
            let mut record = active_category(snapshot, id)?;
            record.name.clone_from(&name);
            Ok((vec![Change::PutCategory(record)], ()))
        })?;
        let result = self
            .persist_writes(&pending, vec![RemoteWrite::Category(id, CategoryUpdate::rename(name))])
            .await;
        self.settle(pending, result, |_, _| Vec::new())
    }

    /// # Errors
    ///
    /// [`StoreError::Validation`], [`OrderError::NotFound`], or a
    /// persistence failure after rollback.
    pub async fn rename_content(&self, id: ContentId, title: &str) -> Result<(), StoreError> {
        let title = validated("content title", title)?;
        let entity = EntityRef::Content(id);
        let _guard = self.inflight.acquire([entity]).await;
        let (pending, ()) = self.apply_local(entity, |snapshot, _| {
            let mut record = active_content(snapshot, id)?;
            record.title.clone_from(&title);
            Ok((vec![Change::PutContent(record)], ()))
        })?;
        let result = self
            .persist_writes(&pending, vec![RemoteWrite::Content(id, ContentUpdate::rename(title))])
            .await;
        self.settle(pending, result, |_, _| Vec::new())
    }

    /// Soft-delete a category and every active descendant category.
    ///
    /// Content items are left active. Returns the deactivated ids, the
    /// requested one first.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`], or a persistence failure after rollback.
    pub async fn deactivate_category(&self, id: CategoryId) -> Result<Vec<CategoryId>, StoreError> {
        let entity = EntityRef::Category(id);
        let subtree = |s: &Snapshot| -> Result<Vec<CategoryId>, StoreError> {
            if !s.forest().contains(id) {
                return Err(OrderError::NotFound(entity).into());
            }
            let mut ids = vec![id];
            ids.extend(s.forest().descendants(id));
            Ok(ids)
        };
        let _guard = self
            .lock_stable(|s| Ok(subtree(s)?.into_iter().map(EntityRef::Category).collect()))
            .await?;

        let (pending, ids) = self.apply_local(entity, |snapshot, _| {
            let ids = subtree(snapshot)?;
            let changes = ids
                .iter()
                .filter_map(|id| snapshot.category(*id).cloned())
                .map(|mut category| {
                    category.is_active = false;
                    Change::PutCategory(category)
                })
                .collect();
            Ok((changes, ids))
        })?;
        let writes = ids
            .iter()
            .map(|id| RemoteWrite::Category(*id, CategoryUpdate::active(false)))
            .collect();
        let result = self.persist_writes(&pending, writes).await;
        self.settle(pending, result, |_, _| Vec::new())?;
        tracing::debug!(id, cascaded = ids.len() - 1, "category deactivated");
        Ok(ids)
    }

    /// Soft-delete one content item.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`], or a persistence failure after rollback.
    pub async fn deactivate_content(&self, id: ContentId) -> Result<(), StoreError> {
        let entity = EntityRef::Content(id);
        let _guard = self.inflight.acquire([entity]).await;
        let (pending, ()) = self.apply_local(entity, |snapshot, _| {
            let mut record = active_content(snapshot, id)?;
            record.is_active = false;
            Ok((vec![Change::PutContent(record)], ()))
        })?;
        let result = self
            .persist_writes(&pending, vec![RemoteWrite::Content(id, ContentUpdate::active(false))])
            .await;
        self.settle(pending, result, |_, _| Vec::new())
    }

    /// Permanently remove an empty category.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] if it still has child categories or
    ///   content.
    /// - [`OrderError::NotFound`], or a persistence failure after rollback.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        let entity = EntityRef::Category(id);
        let _guard = self.inflight.acquire([entity]).await;
        let (pending, ()) = self.apply_local(entity, |snapshot, _| {
            active_category(snapshot, id)?;
            if !snapshot.forest().children(Some(id)).is_empty()
                || !snapshot.contents().list(id).is_empty()
            {
                return Err(StoreError::Validation(format!(
                    "category {id} still has child categories or content"
                )));
            }
            Ok((vec![Change::RemoveCategory(id)], ()))
        })?;
        let result = self
            .persist_writes(&pending, vec![RemoteWrite::DeleteCategory(id)])
            .await;
        self.settle(pending, result, |_, _| Vec::new())
    }

    /// Permanently remove a content item.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`], or a persistence failure after rollback.
    pub async fn delete_content(&self, id: ContentId) -> Result<(), StoreError> {
        let entity = EntityRef::Content(id);
        let _guard = self.inflight.acquire([entity]).await;
        let (pending, ()) = self.apply_local(entity, |snapshot, _| {
            active_content(snapshot, id)?;
            Ok((vec![Change::RemoveContent(id)], ()))
        })?;
        let result = self
            .persist_writes(&pending, vec![RemoteWrite::DeleteContent(id)])
            .await;
        self.settle(pending, result, |_, _| Vec::new())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, events: Vec<StoreEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }

    /// Hold the in-flight locks of every record `touched` names, re-checking
    /// after acquisition in case the set grew while waiting.
    async fn lock_stable(
        &self,
        touched: impl Fn(&Snapshot) -> Result<Vec<EntityRef>, StoreError>,
    ) -> Result<InFlightGuard, StoreError> {
        let mut wanted: BTreeSet<EntityRef> = touched(&self.snapshot())?.into_iter().collect();
        loop {
            let guard = self.inflight.acquire(wanted.iter().copied()).await;
            let now = touched(&self.snapshot())?;
            if now.iter().all(|e| guard.covers(e)) {
                return Ok(guard);
            }
            drop(guard);
            wanted.extend(now);
        }
    }

    /// Build changes against the current snapshot and swap them in.
    fn apply_local<T>(
        &self,
        entity: EntityRef,
        build: impl FnOnce(&Snapshot, &OwnerScope) -> Result<(Vec<Change>, T), StoreError>,
    ) -> Result<(Pending, T), StoreError> {
        let (pending, value, events) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let (changes, value) = build(&state.snapshot, &state.scope)?;
            let undo = changes
                .iter()
                .map(|c| state.snapshot.capture(c.entity()))
                .collect();
            let selection = state.selection;
            let events = state.apply(&changes);
            if !changes.is_empty() {
                tracing::debug!(
                    %entity,
                    changes = changes.len(),
                    generation = state.generation,
                    "applied optimistic change"
                );
            }
            let pending = Pending {
                entity,
                scope: state.scope,
                generation: state.generation,
                undo,
                selection,
            };
            (pending, value, events)
        };
        self.publish(events);
        Ok((pending, value))
    }

    async fn apply_planned(
        &self,
        entity: EntityRef,
        plan: impl FnOnce(&Snapshot) -> Result<PatchSet, OrderError>,
    ) -> Result<PatchSet, StoreError> {
        let (pending, set) = self.apply_local(entity, |snapshot, _| {
            let set = plan(snapshot)?;
            let changes = snapshot.patch_changes(&set)?;
            Ok((changes, set))
        })?;
        if set.is_empty() {
            return Ok(set);
        }
        let writes = match &set {
            PatchSet::Categories(patches) => patches
                .iter()
                .map(|p| RemoteWrite::Category(p.id, CategoryUpdate::from(p)))
                .collect(),
            PatchSet::Contents(patches) => patches
                .iter()
                .map(|p| RemoteWrite::Content(p.id, ContentUpdate::from(p)))
                .collect(),
        };
        let result = self.persist_writes(&pending, writes).await;
        self.settle(pending, result, |_, _| Vec::new())?;
        Ok(set)
    }

    /// Issue `writes` in order. On the first failure, best-effort revert the
    /// writes that already succeeded and return the failure.
    async fn persist_writes(
        &self,
        pending: &Pending,
        writes: Vec<RemoteWrite>,
    ) -> Result<(), PersistenceError> {
        let mut confirmed = Vec::with_capacity(writes.len());
        for write in writes {
            let entity = write.entity();
            if let Err(err) = self.send(&pending.scope, write).await {
                if !confirmed.is_empty() {
                    self.compensate(pending, &confirmed).await;
                }
                return Err(err);
            }
            confirmed.push(entity);
        }
        Ok(())
    }

    async fn send(&self, scope: &OwnerScope, write: RemoteWrite) -> Result<(), PersistenceError> {
        let p = &self.persistence;
        match write {
            RemoteWrite::Category(id, update) => p.update_category(scope, id, update).await.map(|_| ()),
            RemoteWrite::Content(id, update) => p.update_content(scope, id, update).await.map(|_| ()),
            RemoteWrite::DeleteCategory(id) => p.delete_category(scope, id).await,
            RemoteWrite::DeleteContent(id) => p.delete_content(scope, id).await,
        }
    }

    async fn compensate(&self, pending: &Pending, confirmed: &[EntityRef]) {
        for entity in confirmed {
            let prior = pending.undo.iter().find(|c| c.entity() == *entity);
            let result = match prior {
                Some(Change::PutCategory(category)) => self
                    .persistence
                    .update_category(&pending.scope, category.id, CategoryUpdate::restore(category))
                    .await
                    .map(|_| ()),
                Some(Change::PutContent(content)) => self
                    .persistence
                    .update_content(&pending.scope, content.id, ContentUpdate::restore(content))
                    .await
                    .map(|_| ()),
                _ => continue,
            };
            if let Err(err) = result {
                tracing::warn!(%entity, error = %err, "could not revert confirmed write; next load reconciles");
            }
        }
    }

    /// Resolve a pending change against the persistence result.
    fn settle<T>(
        &self,
        pending: Pending,
        result: Result<T, PersistenceError>,
        confirm: impl FnOnce(&T, &mut Selection) -> Vec<Change>,
    ) -> Result<T, StoreError> {
        let (outcome, events) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            if state.generation != pending.generation {
                let rejected = result.err();
                tracing::warn!(
                    entity = %pending.entity,
                    started = pending.generation,
                    current = state.generation,
                    error = rejected.as_ref().map(tracing::field::display),
                    "change superseded by a newer load; dropping it"
                );
                return Err(StoreError::Conflict {
                    entity: pending.entity,
                    current: state.generation,
                    rejected,
                });
            }
            match result {
                Ok(value) => {
                    let changes = confirm(&value, &mut state.selection);
                    let events = state.apply(&changes);
                    (Ok(value), events)
                }
                Err(err) => {
                    tracing::warn!(entity = %pending.entity, error = %err, "persistence failed; rolling back");
                    let mut events = state.apply(&pending.undo);
                    state.selection = pending.selection;
                    events.push(StoreEvent::RolledBack {
                        reason: err.to_string(),
                        entities: pending.undo.iter().map(Change::entity).collect(),
                    });
                    (Err(StoreError::PersistenceFailure(err)), events)
                }
            }
        };
        self.publish(events);
        outcome
    }
}

fn validated(field: &str, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn active_category(snapshot: &Snapshot, id: CategoryId) -> Result<Category, OrderError> {
    snapshot
        .category(id)
        .filter(|_| snapshot.forest().contains(id))
        .cloned()
        .ok_or(OrderError::NotFound(EntityRef::Category(id)))
}

fn active_content(snapshot: &Snapshot, id: ContentId) -> Result<Content, OrderError> {
    snapshot
        .contents()
        .get(id)
        .cloned()
        .ok_or(OrderError::NotFound(EntityRef::Content(id)))
}

#[cfg(test)]
mod tests {
    use super::{CategoryStore, ContentDraft, LoadOutcome, validated};
    use crate::config::ArborConfig;
    use crate::error::StoreError;
    use crate::model::{Category, CategoryKind, Content, Domain, EntityRef, OwnerScope};
    use crate::persist::MemoryBackend;
    use std::sync::Arc;

    const SCOPE: OwnerScope = OwnerScope::new(1, Domain::Note);

    async fn loaded(categories: Vec<Category>, contents: Vec<Content>) -> CategoryStore<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::seeded(SCOPE, categories, contents));
        let store = CategoryStore::new(backend, SCOPE, ArborConfig::default());
        store.load(SCOPE).await.unwrap();
        store
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(matches!(validated("name", "  \t"), Err(StoreError::Validation(_))));
        assert_eq!(validated("name", "  Docs ").unwrap(), "Docs");
    }

    #[tokio::test]
    async fn load_bumps_generation() {
        let store = loaded(vec![Category::new(1, 1, "a", 0)], vec![]).await;
        assert_eq!(store.generation(), 1);
        let outcome = store.load(SCOPE).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Applied { generation: 2, categories: 1, .. }));
    }

    #[tokio::test]
    async fn selection_follows_content_category() {
        let store = loaded(
            vec![Category::new(1, 1, "a", 0), Category::new(2, 1, "b", 1)],
            vec![Content::new(5, 2, 1, "x", 0)],
        )
        .await;
        store.select_content(Some(5)).unwrap();
        assert_eq!(store.selection().category, Some(2));

        store.select_category(Some(1)).unwrap();
        assert_eq!(store.selection().content, None);
        assert!(store.select_category(Some(9)).is_err());
    }

    #[tokio::test]
    async fn selection_cleared_on_deactivate() {
        let store = loaded(
            vec![Category::new(1, 1, "a", 0), Category::new(2, 1, "b", 0).with_parent(1)],
            vec![],
        )
        .await;
        store.select_category(Some(2)).unwrap();
        let ids = store.deactivate_category(1).await.unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.selection().category, None);
        assert!(store.forest().is_empty());
    }

    #[tokio::test]
    async fn create_replaces_provisional_id() {
        let store = loaded(vec![Category::new(1, 1, "a", 0)], vec![]).await;
        let created = store
            .create_content(1, ContentDraft::new("Readme"))
            .await
            .unwrap();
        assert!(created.id > 0);
        let ids: Vec<i64> = store.contents(1).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![created.id]);
        assert!(!store.is_in_flight(EntityRef::Content(created.id)));

        let child = store
            .create_category(Some(1), "Child", CategoryKind::Note)
            .await
            .unwrap();
        assert_eq!(store.forest().parent(child.id), Some(1));
        assert_eq!(store.forest().depth(child.id), Some(1));
    }

    #[tokio::test]
    async fn delete_requires_empty_category() {
        let store = loaded(
            vec![Category::new(1, 1, "a", 0)],
            vec![Content::new(5, 1, 1, "x", 0)],
        )
        .await;
        let err = store.delete_category(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        store.delete_content(5).await.unwrap();
        store.delete_category(1).await.unwrap();
        assert!(store.forest().is_empty());
        assert!(store.persistence().categories(&SCOPE).is_empty());
    }
}
