use serde::{Deserialize, Serialize};

use super::{CategoryId, ContentId, ContentKind, OwnerId};

/// A leaf item ordered underneath exactly one category.
///
/// `body` and `metadata` are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub category_id: CategoryId,
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub display_order: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl Content {
    pub fn new(
        id: ContentId,
        category_id: CategoryId,
        owner_id: OwnerId,
        title: impl Into<String>,
        display_order: i64,
    ) -> Self {
        Self {
            id,
            category_id,
            owner_id,
            title: title.into(),
            body: String::new(),
            kind: ContentKind::default(),
            metadata: serde_json::Value::Null,
            display_order,
            is_active: true,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    pub const fn is_provisional(&self) -> bool {
        self.id < 0
    }
}
