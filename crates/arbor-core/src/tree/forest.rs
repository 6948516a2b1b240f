use std::collections::{BTreeMap, HashSet};

use crate::model::{Category, CategoryId, CategoryNode};

/// One owner's active categories arranged as ordered trees.
///
/// Built by [`super::build_forest`]. Every record held here has a depth that
/// matches its parent chain, and every sibling list is in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forest {
    nodes: BTreeMap<CategoryId, Category>,
    parents: BTreeMap<CategoryId, Option<CategoryId>>,
    children: BTreeMap<Option<CategoryId>, Vec<CategoryId>>,
    orphans: Vec<CategoryId>,
    excluded: Vec<CategoryId>,
}

impl Forest {
    pub(crate) fn from_parts(
        nodes: BTreeMap<CategoryId, Category>,
        parents: BTreeMap<CategoryId, Option<CategoryId>>,
        children: BTreeMap<Option<CategoryId>, Vec<CategoryId>>,
        orphans: Vec<CategoryId>,
        excluded: Vec<CategoryId>,
    ) -> Self {
        Self {
            nodes,
            parents,
            children,
            orphans,
            excluded,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.nodes.get(&id)
    }

    /// All categories in the forest, ordered by id.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.nodes.values()
    }

    /// Top-level ids in display order, orphans included.
    pub fn roots(&self) -> &[CategoryId] {
        self.children(None)
    }

    /// Ordered children of `parent` (`None` for the root group).
    pub fn children(&self, parent: Option<CategoryId>) -> &[CategoryId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Effective parent: `None` for roots (including orphans) and unknown ids.
    pub fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        self.parents.get(&id).copied().flatten()
    }

    /// The sibling group `id` belongs to, itself included.
    pub fn siblings(&self, id: CategoryId) -> &[CategoryId] {
        if !self.contains(id) {
            return &[];
        }
        self.children(self.parent(id))
    }

    pub fn depth(&self, id: CategoryId) -> Option<u32> {
        self.nodes.get(&id).map(|c| c.depth)
    }

    /// Ancestor chain from the immediate parent up to the root.
    pub fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break; // cycle guard
            }
            chain.push(parent);
            current = self.parent(parent);
        }
        chain
    }

    /// Every descendant of `id` in pre-order, `id` itself excluded.
    pub fn descendants(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut out = Vec::new();
        let mut stack: Vec<CategoryId> = self.children(Some(id)).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(Some(next)).iter().rev());
        }
        out
    }

    /// `true` if `ancestor` appears on the parent chain of `id`.
    pub fn is_descendant(&self, ancestor: CategoryId, id: CategoryId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Pre-order rows of `(depth, category)` for indented tree rendering.
    pub fn flatten(&self) -> Vec<(u32, &Category)> {
        let mut rows = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<CategoryId> = self.roots().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(category) = self.nodes.get(&id) {
                rows.push((category.depth, category));
            }
            stack.extend(self.children(Some(id)).iter().rev());
        }
        rows
    }

    /// Nested view with owned copies of each record.
    pub fn nodes(&self) -> Vec<CategoryNode> {
        self.roots().iter().map(|id| self.node(*id)).collect()
    }

    fn node(&self, id: CategoryId) -> CategoryNode {
        CategoryNode {
            category: self.nodes[&id].clone(),
            children: self.children(Some(id)).iter().map(|c| self.node(*c)).collect(),
        }
    }

    /// Records whose declared parent was missing; they were placed at the root.
    pub fn orphans(&self) -> &[CategoryId] {
        &self.orphans
    }

    /// Records left out because they are only reachable through a cycle.
    pub fn excluded(&self) -> &[CategoryId] {
        &self.excluded
    }
}
