use serde::{Deserialize, Serialize};

use crate::model::{Category, CategoryId, Content, ContentId, EntityRef};

/// Absolute placement of one category after a move.
///
/// Entries carry full values rather than deltas so that applying the same
/// patch set twice lands on the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub display_order: i64,
    pub depth: u32,
}

impl CategoryPatch {
    /// The placement `category` currently has. Used to build rollbacks.
    pub const fn capture(category: &Category) -> Self {
        Self {
            id: category.id,
            parent_id: category.parent_id,
            display_order: category.display_order,
            depth: category.depth,
        }
    }

    pub const fn apply_to(&self, category: &mut Category) {
        category.parent_id = self.parent_id;
        category.display_order = self.display_order;
        category.depth = self.depth;
    }

    /// `true` when applying would leave `category` unchanged.
    pub fn matches(&self, category: &Category) -> bool {
        *self == Self::capture(category)
    }
}

/// Absolute placement of one content item after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPatch {
    pub id: ContentId,
    pub category_id: CategoryId,
    pub display_order: i64,
}

impl ContentPatch {
    pub const fn capture(content: &Content) -> Self {
        Self {
            id: content.id,
            category_id: content.category_id,
            display_order: content.display_order,
        }
    }

    pub const fn apply_to(&self, content: &mut Content) {
        content.category_id = self.category_id;
        content.display_order = self.display_order;
    }

    pub fn matches(&self, content: &Content) -> bool {
        *self == Self::capture(content)
    }
}

/// The minimal list of placement changes produced by a move plan, applied
/// atomically by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "patches", rename_all = "snake_case")]
pub enum PatchSet {
    Categories(Vec<CategoryPatch>),
    Contents(Vec<ContentPatch>),
}

impl PatchSet {
    pub fn len(&self) -> usize {
        match self {
            Self::Categories(p) => p.len(),
            Self::Contents(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record the patch set touches, in patch order.
    pub fn entities(&self) -> Vec<EntityRef> {
        match self {
            Self::Categories(p) => p.iter().map(|e| EntityRef::Category(e.id)).collect(),
            Self::Contents(p) => p.iter().map(|e| EntityRef::Content(e.id)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CategoryPatch, ContentPatch, PatchSet};
    use crate::model::{Category, Content, EntityRef};

    #[test]
    fn capture_then_apply_is_identity() {
        let mut category = Category::new(4, 1, "Specs", 300).with_parent(2);
        category.depth = 1;
        let before = category.clone();
        CategoryPatch::capture(&before).apply_to(&mut category);
        assert_eq!(category, before);
    }

    #[test]
    fn apply_twice_equals_apply_once() {
        let mut content = Content::new(9, 1, 1, "Diagram", 0);
        let patch = ContentPatch {
            id: 9,
            category_id: 3,
            display_order: 1000,
        };
        patch.apply_to(&mut content);
        let once = content.clone();
        patch.apply_to(&mut content);
        assert_eq!(content, once);
        assert!(patch.matches(&content));
    }

    #[test]
    fn entities_follow_patch_kind() {
        let set = PatchSet::Categories(vec![CategoryPatch {
            id: 1,
            parent_id: None,
            display_order: 0,
            depth: 0,
        }]);
        assert_eq!(set.entities(), vec![EntityRef::Category(1)]);
        assert!(PatchSet::Contents(vec![]).is_empty());
    }

    #[test]
    fn serializes_with_target_tag() {
        let set = PatchSet::Contents(vec![ContentPatch {
            id: 2,
            category_id: 5,
            display_order: -1000,
        }]);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["target"], "contents");
        assert_eq!(json["patches"][0]["display_order"], -1000);
    }
}
