use std::collections::BTreeMap;

use crate::error::OrderError;
use crate::model::{Category, CategoryId, Content, ContentId, EntityRef};
use crate::order::PatchSet;
use crate::tree::{ContentLists, Forest, build_forest};

/// One record-level edit to a snapshot.
///
/// Rollbacks are expressed in the same vocabulary: the prior state of each
/// touched record captured as a `Put*` (it existed) or `Remove*` (it did
/// not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    PutCategory(Category),
    RemoveCategory(CategoryId),
    PutContent(Content),
    RemoveContent(ContentId),
}

impl Change {
    pub const fn entity(&self) -> EntityRef {
        match self {
            Self::PutCategory(c) => EntityRef::Category(c.id),
            Self::RemoveCategory(id) => EntityRef::Category(*id),
            Self::PutContent(c) => EntityRef::Content(c.id),
            Self::RemoveContent(id) => EntityRef::Content(*id),
        }
    }
}

/// Immutable view of one scope's records and the forest and content lists
/// derived from them.
///
/// Raw records are kept even when inactive; the derived structures only
/// show active ones. Snapshots are never edited in place: every change
/// produces a new snapshot, so a reader holding one never sees a
/// half-applied patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    categories: BTreeMap<CategoryId, Category>,
    contents: BTreeMap<ContentId, Content>,
    forest: Forest,
    lists: ContentLists,
}

impl Snapshot {
    /// Build from persisted records. Duplicate ids keep the first record.
    pub fn new(
        categories: impl IntoIterator<Item = Category>,
        contents: impl IntoIterator<Item = Content>,
    ) -> Self {
        let mut category_map = BTreeMap::new();
        for category in categories {
            category_map.entry(category.id).or_insert(category);
        }
        let mut content_map = BTreeMap::new();
        for content in contents {
            content_map.entry(content.id).or_insert(content);
        }
        Self::derive(category_map, content_map)
    }

    fn derive(
        categories: BTreeMap<CategoryId, Category>,
        contents: BTreeMap<ContentId, Content>,
    ) -> Self {
        let records: Vec<Category> = categories.values().cloned().collect();
        let forest = build_forest(&records);
        let lists = ContentLists::build(contents.values());
        Self {
            categories,
            contents,
            forest,
            lists,
        }
    }

    pub const fn forest(&self) -> &Forest {
        &self.forest
    }

    pub const fn contents(&self) -> &ContentLists {
        &self.lists
    }

    /// Raw category record, active or not.
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    /// Raw content record, active or not.
    pub fn content(&self, id: ContentId) -> Option<&Content> {
        self.contents.get(&id)
    }

    pub fn category_records(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn content_records(&self) -> impl Iterator<Item = &Content> {
        self.contents.values()
    }

    /// The change that would restore `entity` to its current state.
    pub fn capture(&self, entity: EntityRef) -> Change {
        match entity {
            EntityRef::Category(id) => self
                .categories
                .get(&id)
                .map_or(Change::RemoveCategory(id), |c| Change::PutCategory(c.clone())),
            EntityRef::Content(id) => self
                .contents
                .get(&id)
                .map_or(Change::RemoveContent(id), |c| Change::PutContent(c.clone())),
        }
    }

    /// A new snapshot with `changes` applied in order.
    #[must_use]
    pub fn with_changes(&self, changes: &[Change]) -> Self {
        let mut categories = self.categories.clone();
        let mut contents = self.contents.clone();
        for change in changes {
            match change {
                Change::PutCategory(c) => {
                    categories.insert(c.id, c.clone());
                }
                Change::RemoveCategory(id) => {
                    categories.remove(id);
                }
                Change::PutContent(c) => {
                    contents.insert(c.id, c.clone());
                }
                Change::RemoveContent(id) => {
                    contents.remove(id);
                }
            }
        }
        Self::derive(categories, contents)
    }

    /// Record-level changes that carry out `set` on this snapshot.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`] if a patch names a record that is not active
    /// here.
    pub fn patch_changes(&self, set: &PatchSet) -> Result<Vec<Change>, OrderError> {
        match set {
            PatchSet::Categories(patches) => patches
                .iter()
                .map(|patch| {
                    let mut record = self
                        .categories
                        .get(&patch.id)
                        .filter(|_| self.forest.contains(patch.id))
                        .cloned()
                        .ok_or(OrderError::NotFound(EntityRef::Category(patch.id)))?;
                    patch.apply_to(&mut record);
                    Ok(Change::PutCategory(record))
                })
                .collect(),
            PatchSet::Contents(patches) => patches
                .iter()
                .map(|patch| {
                    let mut record = self
                        .lists
                        .get(patch.id)
                        .cloned()
                        .ok_or(OrderError::NotFound(EntityRef::Content(patch.id)))?;
                    patch.apply_to(&mut record);
                    Ok(Change::PutContent(record))
                })
                .collect(),
        }
    }

    /// Check a patch set planned elsewhere against this snapshot.
    ///
    /// Every parent or category it points at must be active here, and the
    /// result must keep each patched category in the forest at the depth
    /// the patch claims. A set planned against an older forest shape fails
    /// the depth check.
    ///
    /// # Errors
    ///
    /// - [`OrderError::NotFound`] for a patched or referenced record that is
    ///   not active here.
    /// - [`OrderError::InvalidMove`] if applying `set` would put a category
    ///   on a parent cycle or at a depth other than the one planned.
    pub fn check_patch(&self, set: &PatchSet) -> Result<(), OrderError> {
        let changes = self.patch_changes(set)?;
        match set {
            PatchSet::Categories(patches) => {
                for parent in patches.iter().filter_map(|p| p.parent_id) {
                    if !self.forest.contains(parent) {
                        return Err(OrderError::NotFound(EntityRef::Category(parent)));
                    }
                }
                let candidate = self.with_changes(&changes);
                for patch in patches {
                    let moving = EntityRef::Category(patch.id);
                    let target = EntityRef::Category(patch.parent_id.unwrap_or(patch.id));
                    if !candidate.forest.contains(patch.id) {
                        return Err(OrderError::InvalidMove {
                            moving,
                            target,
                            reason: "patch would place a category inside its own subtree",
                        });
                    }
                    if candidate.forest.depth(patch.id) != Some(patch.depth) {
                        return Err(OrderError::InvalidMove {
                            moving,
                            target,
                            reason: "patch was planned against a different forest",
                        });
                    }
                }
            }
            PatchSet::Contents(patches) => {
                for patch in patches {
                    if !self.forest.contains(patch.category_id) {
                        return Err(OrderError::NotFound(EntityRef::Category(patch.category_id)));
                    }
                }
            }
        }
        Ok(())
    }
}
