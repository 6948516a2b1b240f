use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{CategoryUpdate, ContentUpdate, NewCategory, NewContent, Persistence};
use crate::error::PersistenceError;
use crate::model::{Category, CategoryId, Content, ContentId, EntityRef, OwnerScope};

type FaultHook = Box<dyn FnMut(&WriteOp) -> bool + Send>;

/// Which mutation a write-fault hook is being asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    CreateCategory,
    UpdateCategory(CategoryId),
    DeleteCategory(CategoryId),
    CreateContent,
    UpdateContent(ContentId),
    DeleteContent(ContentId),
}

/// In-process [`Persistence`] implementation.
///
/// Records of every scope share one id space, so ids are unique across
/// scopes the way a server-side sequence would make them. Writes can be
/// made to fail on demand to exercise the store's rollback path.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    categories: BTreeMap<CategoryId, (OwnerScope, Category)>,
    contents: BTreeMap<ContentId, (OwnerScope, Content)>,
    next_id: i64,
    fail_next: usize,
    unavailable: bool,
    latency: Option<Duration>,
    fault_hook: Option<FaultHook>,
    writes: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `categories` and `contents` for `scope`.
    ///
    /// The id sequence continues after the largest seeded id.
    pub fn seeded(
        scope: OwnerScope,
        categories: impl IntoIterator<Item = Category>,
        contents: impl IntoIterator<Item = Content>,
    ) -> Self {
        let backend = Self::new();
        {
            let mut inner = backend.lock();
            for category in categories {
                inner.next_id = inner.next_id.max(category.id);
                inner.categories.insert(category.id, (scope, category));
            }
            for content in contents {
                inner.next_id = inner.next_id.max(content.id);
                inner.contents.insert(content.id, (scope, content));
            }
        }
        backend
    }

    /// Make the next `n` writes fail with [`PersistenceError::Rejected`].
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Fail every call, reads included, with [`PersistenceError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Delay every call by `latency` before it touches state.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Consult `hook` before each write; returning `true` rejects the write.
    pub fn set_fault_hook(&self, hook: impl FnMut(&WriteOp) -> bool + Send + 'static) {
        self.lock().fault_hook = Some(Box::new(hook));
    }

    pub fn clear_fault_hook(&self) {
        self.lock().fault_hook = None;
    }

    /// Number of writes that reached state.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Stored categories of `scope`, sorted by id.
    pub fn categories(&self, scope: &OwnerScope) -> Vec<Category> {
        self.lock()
            .categories
            .values()
            .filter(|(s, _)| s == scope)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Stored content items of `scope`, sorted by id.
    pub fn contents(&self, scope: &OwnerScope) -> Vec<Content> {
        self.lock()
            .contents
            .values()
            .filter(|(s, _)| s == scope)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every write is a single map operation; a poisoned lock holds consistent state.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn begin_read(&self) -> Result<MutexGuard<'_, Inner>, PersistenceError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(PersistenceError::Unavailable("memory backend offline".into()));
        }
        Ok(inner)
    }

    fn begin_write(&self, op: WriteOp) -> Result<MutexGuard<'_, Inner>, PersistenceError> {
        let mut inner = self.begin_read()?;
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            tracing::debug!(?op, "injected write failure");
            return Err(PersistenceError::Rejected(format!("injected failure for {op:?}")));
        }
        if inner.fault_hook.as_mut().is_some_and(|hook| hook(&op)) {
            tracing::debug!(?op, "fault hook rejected write");
            return Err(PersistenceError::Rejected(format!("fault hook rejected {op:?}")));
        }
        inner.writes += 1;
        Ok(inner)
    }
}

impl Inner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn category_mut(
        &mut self,
        scope: &OwnerScope,
        id: CategoryId,
    ) -> Result<&mut Category, PersistenceError> {
        match self.categories.get_mut(&id) {
            Some((s, category)) if s == scope => Ok(category),
            _ => Err(PersistenceError::NotFound(EntityRef::Category(id))),
        }
    }

    fn content_mut(
        &mut self,
        scope: &OwnerScope,
        id: ContentId,
    ) -> Result<&mut Content, PersistenceError> {
        match self.contents.get_mut(&id) {
            Some((s, content)) if s == scope => Ok(content),
            _ => Err(PersistenceError::NotFound(EntityRef::Content(id))),
        }
    }
}

#[async_trait]
impl Persistence for MemoryBackend {
    async fn list_categories(&self, scope: &OwnerScope) -> Result<Vec<Category>, PersistenceError> {
        self.delay().await;
        let inner = self.begin_read()?;
        Ok(inner
            .categories
            .values()
            .filter(|(s, _)| s == scope)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn create_category(
        &self,
        scope: &OwnerScope,
        new: NewCategory,
    ) -> Result<Category, PersistenceError> {
        self.delay().await;
        let mut inner = self.begin_write(WriteOp::CreateCategory)?;
        if let Some(parent_id) = new.parent_id {
            inner.category_mut(scope, parent_id)?;
        }
        let id = inner.allocate_id();
        let category = new.into_category(id, scope);
        inner.categories.insert(id, (*scope, category.clone()));
        Ok(category)
    }

    async fn update_category(
        &self,
        scope: &OwnerScope,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, PersistenceError> {
        self.delay().await;
        let mut inner = self.begin_write(WriteOp::UpdateCategory(id))?;
        let category = inner.category_mut(scope, id)?;
        update.apply_to(category);
        Ok(category.clone())
    }

    async fn delete_category(&self, scope: &OwnerScope, id: CategoryId) -> Result<(), PersistenceError> {
        self.delay().await;
        let mut inner = self.begin_write(WriteOp::DeleteCategory(id))?;
        inner.category_mut(scope, id)?;
        inner.categories.remove(&id);
        Ok(())
    }

    async fn list_contents(
        &self,
        scope: &OwnerScope,
        category_id: CategoryId,
    ) -> Result<Vec<Content>, PersistenceError> {
        self.delay().await;
        let inner = self.begin_read()?;
        Ok(inner
            .contents
            .values()
            .filter(|(s, c)| s == scope && c.category_id == category_id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn create_content(
        &self,
        scope: &OwnerScope,
        new: NewContent,
    ) -> Result<Content, PersistenceError> {
        self.delay().await;
        let mut inner = self.begin_write(WriteOp::CreateContent)?;
        inner.category_mut(scope, new.category_id)?;
        let id = inner.allocate_id();
        let content = new.into_content(id, scope);
        inner.contents.insert(id, (*scope, content.clone()));
        Ok(content)
    }

    async fn update_content(
        &self,
        scope: &OwnerScope,
        id: ContentId,
        update: ContentUpdate,
    ) -> Result<Content, PersistenceError> {
        self.delay().await;
        let mut inner = self.begin_write(WriteOp::UpdateContent(id))?;
        if let Some(category_id) = update.category_id {
            inner.category_mut(scope, category_id)?;
        }
        let content = inner.content_mut(scope, id)?;
        update.apply_to(content);
        Ok(content.clone())
    }

    async fn delete_content(&self, scope: &OwnerScope, id: ContentId) -> Result<(), PersistenceError> {
        self.delay().await;
        let mut inner = self.begin_write(WriteOp::DeleteContent(id))?;
        inner.content_mut(scope, id)?;
        inner.contents.remove(&id);
        Ok(())
    }
}
