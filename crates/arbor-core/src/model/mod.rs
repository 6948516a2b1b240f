//! Records held by a category forest: categories, content leaves, and the
//! owner scope that bounds them.

pub mod category;
pub mod content;
pub mod kind;

pub use category::{Category, CategoryNode};
pub use content::Content;
pub use kind::{CategoryKind, ContentKind, Domain, ParseEnumError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persistence-assigned category id. Negative values are provisional ids
/// held by optimistically created records.
pub type CategoryId = i64;

/// Persistence-assigned content id.
pub type ContentId = i64;

/// User or account that owns a forest.
pub type OwnerId = i64;

/// The user/account boundary within which a category forest is independent
/// from all others, further split by document domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerScope {
    pub owner_id: OwnerId,
    pub domain: Domain,
}

impl OwnerScope {
    pub const fn new(owner_id: OwnerId, domain: Domain) -> Self {
        Self { owner_id, domain }
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.owner_id)
    }
}

/// Reference to a record of either type, used in errors and the in-flight
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Category(CategoryId),
    Content(ContentId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(id) => write!(f, "category {id}"),
            Self::Content(id) => write!(f, "content {id}"),
        }
    }
}
