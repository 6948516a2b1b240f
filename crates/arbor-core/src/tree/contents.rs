use std::collections::BTreeMap;

use crate::model::{CategoryId, Content, ContentId};

/// Active content items grouped by category, each list in display order
/// (ties broken by id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentLists {
    lists: BTreeMap<CategoryId, Vec<Content>>,
    index: BTreeMap<ContentId, CategoryId>,
}

impl ContentLists {
    /// Group and sort a flat list. Inactive records are skipped; duplicate
    /// ids keep the first record seen.
    pub fn build<'a>(records: impl IntoIterator<Item = &'a Content>) -> Self {
        let mut lists: BTreeMap<CategoryId, Vec<Content>> = BTreeMap::new();
        let mut index = BTreeMap::new();
        for content in records.into_iter().filter(|c| c.is_active) {
            if index.contains_key(&content.id) {
                tracing::warn!(id = content.id, "duplicate content id in snapshot; keeping first");
                continue;
            }
            index.insert(content.id, content.category_id);
            lists.entry(content.category_id).or_default().push(content.clone());
        }
        for list in lists.values_mut() {
            list.sort_by_key(|c| (c.display_order, c.id));
        }
        Self { lists, index }
    }

    /// Ordered items of one category; empty when it has none.
    pub fn list(&self, category_id: CategoryId) -> &[Content] {
        self.lists.get(&category_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: ContentId) -> Option<&Content> {
        let category_id = self.index.get(&id)?;
        self.list(*category_id).iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of items per category, for badges next to tree rows.
    pub fn counts(&self) -> BTreeMap<CategoryId, usize> {
        self.lists.iter().map(|(id, list)| (*id, list.len())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ContentLists;
    use crate::model::Content;

    #[test]
    fn groups_by_category_in_order() {
        let records = [
            Content::new(1, 10, 1, "a", 5),
            Content::new(2, 10, 1, "b", 0),
            Content::new(3, 20, 1, "c", 0),
            Content::new(4, 10, 1, "d", 5),
        ];
        let lists = ContentLists::build(&records);
        let ids: Vec<i64> = lists.list(10).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1, 4]);
        assert_eq!(lists.list(20).len(), 1);
        assert!(lists.list(30).is_empty());
        assert_eq!(lists.get(4).map(|c| c.category_id), Some(10));
        assert_eq!(lists.counts().get(&10), Some(&3));
    }

    #[test]
    fn skips_inactive_and_duplicates() {
        let mut hidden = Content::new(2, 10, 1, "hidden", 1);
        hidden.is_active = false;
        let records = [
            Content::new(1, 10, 1, "first", 0),
            hidden,
            Content::new(1, 20, 1, "dupe", 0),
        ];
        let lists = ContentLists::build(&records);
        assert_eq!(lists.len(), 1);
        assert!(lists.get(2).is_none());
        assert_eq!(lists.get(1).map(|c| c.category_id), Some(10));
        assert!(lists.list(20).is_empty());
    }
}
