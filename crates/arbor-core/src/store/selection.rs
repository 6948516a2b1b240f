use serde::{Deserialize, Serialize};

use super::Snapshot;
use crate::model::{CategoryId, ContentId};

/// The category and content item currently focused in the UI for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub category: Option<CategoryId>,
    pub content: Option<ContentId>,
}

impl Selection {
    /// Drop ids that are no longer visible in `snapshot`.
    ///
    /// Returns `true` if anything was cleared.
    pub fn prune(&mut self, snapshot: &Snapshot) -> bool {
        let before = *self;
        if self.category.is_some_and(|id| !snapshot.forest().contains(id)) {
            self.category = None;
        }
        if self.content.is_some_and(|id| snapshot.contents().get(id).is_none()) {
            self.content = None;
        }
        before != *self
    }

    /// Follow a provisional id to the id persistence assigned.
    pub fn remap_category(&mut self, from: CategoryId, to: CategoryId) {
        if self.category == Some(from) {
            self.category = Some(to);
        }
    }

    pub fn remap_content(&mut self, from: ContentId, to: ContentId) {
        if self.content == Some(from) {
            self.content = Some(to);
        }
    }
}
