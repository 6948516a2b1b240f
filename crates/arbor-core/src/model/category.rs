use serde::{Deserialize, Serialize};

use super::{CategoryId, CategoryKind, OwnerId};

/// A node in an owner's category forest.
///
/// `depth` is a cached value: the tree builder recomputes it from the parent
/// chain and never trusts what a snapshot carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub kind: CategoryKind,
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub depth: u32,
    pub display_order: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl Category {
    /// Active top-level category with the given id, name and order.
    pub fn new(id: CategoryId, owner_id: OwnerId, name: impl Into<String>, display_order: i64) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            kind: CategoryKind::default(),
            parent_id: None,
            depth: 0,
            display_order,
            is_active: true,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: CategoryId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: CategoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub const fn is_provisional(&self) -> bool {
        self.id < 0
    }
}

/// Nested view of a category with its ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Self::size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, CategoryNode};
    use crate::model::CategoryKind;

    #[test]
    fn deserialize_fills_defaults() {
        let json = r#"{"id":3,"owner_id":1,"name":"Specs","parent_id":null,"display_order":10}"#;
        let category: Category = serde_json::from_str(json).unwrap();
        assert!(category.is_active);
        assert_eq!(category.depth, 0);
        assert_eq!(category.kind, CategoryKind::Note);
    }

    #[test]
    fn node_size_counts_subtree() {
        let leaf = |id| CategoryNode {
            category: Category::new(id, 1, "leaf", 0),
            children: Vec::new(),
        };
        let root = CategoryNode {
            category: Category::new(1, 1, "root", 0),
            children: vec![leaf(2), leaf(3)],
        };
        assert_eq!(root.size(), 3);
    }
}
