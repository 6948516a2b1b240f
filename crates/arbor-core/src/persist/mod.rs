//! Persistence contract consumed by the category store.
//!
//! The store never talks to a database or network directly: every durable
//! change goes through a [`Persistence`] implementation scoped to one
//! [`OwnerScope`]. Two implementations ship with the crate:
//!
//! - [`MemoryBackend`]: in-process, with write-failure injection for tests
//!   and the simulator.
//! - [`crate::db::SqliteBackend`]: local SQLite file.

pub mod memory;

pub use memory::{MemoryBackend, WriteOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::model::{
    Category, CategoryId, CategoryKind, Content, ContentId, ContentKind, OwnerScope,
};
use crate::order::{CategoryPatch, ContentPatch};

/// Async collaborator that stores categories and content for an owner scope.
///
/// Implementations must be safe to call concurrently; the store may have
/// several calls outstanding for disjoint records.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Every category of the scope, active or not, in no particular order.
    async fn list_categories(&self, scope: &OwnerScope) -> Result<Vec<Category>, PersistenceError>;

    async fn create_category(
        &self,
        scope: &OwnerScope,
        new: NewCategory,
    ) -> Result<Category, PersistenceError>;

    /// Apply the `Some` fields of `update` and return the stored record.
    async fn update_category(
        &self,
        scope: &OwnerScope,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, PersistenceError>;

    async fn delete_category(&self, scope: &OwnerScope, id: CategoryId) -> Result<(), PersistenceError>;

    /// Content items of one category, active or not.
    async fn list_contents(
        &self,
        scope: &OwnerScope,
        category_id: CategoryId,
    ) -> Result<Vec<Content>, PersistenceError>;

    async fn create_content(
        &self,
        scope: &OwnerScope,
        new: NewContent,
    ) -> Result<Content, PersistenceError>;

    async fn update_content(
        &self,
        scope: &OwnerScope,
        id: ContentId,
        update: ContentUpdate,
    ) -> Result<Content, PersistenceError>;

    async fn delete_content(&self, scope: &OwnerScope, id: ContentId) -> Result<(), PersistenceError>;
}

/// Fields for a category that does not have an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub kind: CategoryKind,
    pub parent_id: Option<CategoryId>,
    pub depth: u32,
    pub display_order: i64,
}

impl NewCategory {
    /// The record a backend stores for this request under `id`.
    pub fn into_category(self, id: CategoryId, scope: &OwnerScope) -> Category {
        Category {
            id,
            owner_id: scope.owner_id,
            name: self.name,
            kind: self.kind,
            parent_id: self.parent_id,
            depth: self.depth,
            display_order: self.display_order,
            is_active: true,
        }
    }
}

/// Fields for a content item that does not have an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContent {
    pub category_id: CategoryId,
    pub title: String,
    pub body: String,
    pub kind: ContentKind,
    pub metadata: serde_json::Value,
    pub display_order: i64,
}

impl NewContent {
    pub fn into_content(self, id: ContentId, scope: &OwnerScope) -> Content {
        Content {
            id,
            category_id: self.category_id,
            owner_id: scope.owner_id,
            title: self.title,
            body: self.body,
            kind: self.kind,
            metadata: self.metadata,
            display_order: self.display_order,
            is_active: true,
        }
    }
}

/// Partial category update. `None` leaves a field alone; `parent_id` is
/// doubly optional so a move to the root level is `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub parent_id: Option<Option<CategoryId>>,
    pub depth: Option<u32>,
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
}

impl CategoryUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    /// Update that brings a stored record back to `category`.
    pub fn restore(category: &Category) -> Self {
        Self {
            name: Some(category.name.clone()),
            parent_id: Some(category.parent_id),
            depth: Some(category.depth),
            display_order: Some(category.display_order),
            is_active: Some(category.is_active),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name.clone_from(name);
        }
        if let Some(parent_id) = self.parent_id {
            category.parent_id = parent_id;
        }
        if let Some(depth) = self.depth {
            category.depth = depth;
        }
        if let Some(display_order) = self.display_order {
            category.display_order = display_order;
        }
        if let Some(is_active) = self.is_active {
            category.is_active = is_active;
        }
    }
}

impl From<&CategoryPatch> for CategoryUpdate {
    fn from(patch: &CategoryPatch) -> Self {
        Self {
            parent_id: Some(patch.parent_id),
            depth: Some(patch.depth),
            display_order: Some(patch.display_order),
            ..Self::default()
        }
    }
}

/// Partial content update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub category_id: Option<CategoryId>,
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
}

impl ContentUpdate {
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    pub fn restore(content: &Content) -> Self {
        Self {
            title: Some(content.title.clone()),
            category_id: Some(content.category_id),
            display_order: Some(content.display_order),
            is_active: Some(content.is_active),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, content: &mut Content) {
        if let Some(title) = &self.title {
            content.title.clone_from(title);
        }
        if let Some(category_id) = self.category_id {
            content.category_id = category_id;
        }
        if let Some(display_order) = self.display_order {
            content.display_order = display_order;
        }
        if let Some(is_active) = self.is_active {
            content.is_active = is_active;
        }
    }
}

impl From<&ContentPatch> for ContentUpdate {
    fn from(patch: &ContentPatch) -> Self {
        Self {
            category_id: Some(patch.category_id),
            display_order: Some(patch.display_order),
            ..Self::default()
        }
    }
}
