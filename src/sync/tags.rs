use std::collections::{BTreeSet, HashMap};

use crate::models::{NewTag, RemoteTag, Tag};

#[derive(Debug, Clone)]
struct IndexedTag {
    /// `None` until the tag has been written to the mirror.
    id: Option<i64>,
    label: String,
}

/// Tag writes waiting for the next flush, by remote tag id.
#[derive(Debug, Default)]
pub struct PendingTags {
    pub to_insert: Vec<i64>,
    pub to_update: BTreeSet<i64>,
}

impl PendingTags {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }

    pub fn clear(&mut self) {
        self.to_insert.clear();
        self.to_update.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagResolution {
    Created,
    Relabeled,
    Unchanged,
}

/// Every tag known during one sync, keyed by remote tag id, so that all
/// articles naming the same remote tag share one local row.
#[derive(Debug, Default)]
pub struct TagIndex {
    tags: HashMap<i64, IndexedTag>,
}

impl TagIndex {
    pub fn from_tags(tags: Vec<Tag>) -> Self {
        let tags = tags
            .into_iter()
            .map(|tag| {
                (
                    tag.remote_id,
                    IndexedTag {
                        id: Some(tag.id),
                        label: tag.label,
                    },
                )
            })
            .collect();
        Self { tags }
    }

    pub(crate) fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn local_id(&self, remote_id: i64) -> Option<i64> {
        self.tags.get(&remote_id).and_then(|tag| tag.id)
    }

    /// Maps a remote tag onto its local tag, creating or relabeling it and
    /// queueing the matching write in `pending`.
    pub fn resolve(&mut self, remote: &RemoteTag, pending: &mut PendingTags) -> TagResolution {
        match self.tags.get_mut(&remote.id) {
            None => {
                self.tags.insert(
                    remote.id,
                    IndexedTag {
                        id: None,
                        label: remote.label.clone(),
                    },
                );
                pending.to_insert.push(remote.id);
                TagResolution::Created
            }
            Some(tag) if tag.label != remote.label => {
                tag.label = remote.label.clone();
                // Unwritten tags are inserted with whatever label they end up with.
                if tag.id.is_some() {
                    pending.to_update.insert(remote.id);
                }
                TagResolution::Relabeled
            }
            Some(_) => TagResolution::Unchanged,
        }
    }

    pub fn new_tag(&self, remote_id: i64) -> Option<NewTag> {
        self.tags.get(&remote_id).map(|tag| NewTag {
            remote_id,
            label: tag.label.clone(),
        })
    }

    pub fn stored_tag(&self, remote_id: i64) -> Option<Tag> {
        let tag = self.tags.get(&remote_id)?;
        Some(Tag {
            id: tag.id?,
            remote_id,
            label: tag.label.clone(),
        })
    }

    pub fn assign_id(&mut self, remote_id: i64, id: i64) {
        if let Some(tag) = self.tags.get_mut(&remote_id) {
            tag.id = Some(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: i64, label: &str) -> RemoteTag {
        RemoteTag {
            id,
            label: label.to_string(),
        }
    }

    fn stored(id: i64, remote_id: i64, label: &str) -> Tag {
        Tag {
            id,
            remote_id,
            label: label.to_string(),
        }
    }

    #[test]
    fn unknown_tag_is_created_once() {
        let mut index = TagIndex::default();
        let mut pending = PendingTags::default();

        assert_eq!(index.resolve(&remote(9, "go"), &mut pending), TagResolution::Created);
        assert_eq!(index.resolve(&remote(9, "go"), &mut pending), TagResolution::Unchanged);

        assert_eq!(pending.to_insert, vec![9]);
        assert!(pending.to_update.is_empty());
        assert_eq!(index.local_id(9), None);
    }

    #[test]
    fn relabel_of_stored_tag_is_queued_once() {
        let mut index = TagIndex::from_tags(vec![stored(1, 9, "go")]);
        let mut pending = PendingTags::default();

        assert_eq!(
            index.resolve(&remote(9, "golang"), &mut pending),
            TagResolution::Relabeled
        );
        index.resolve(&remote(9, "golang"), &mut pending);

        assert_eq!(pending.to_update.len(), 1);
        assert_eq!(index.stored_tag(9), Some(stored(1, 9, "golang")));
    }

    #[test]
    fn relabel_of_unwritten_tag_only_changes_the_insert() {
        let mut index = TagIndex::default();
        let mut pending = PendingTags::default();

        index.resolve(&remote(4, "old"), &mut pending);
        index.resolve(&remote(4, "new"), &mut pending);

        assert!(pending.to_update.is_empty());
        assert_eq!(index.new_tag(4).unwrap().label, "new");

        index.assign_id(4, 12);
        assert_eq!(index.local_id(4), Some(12));
    }
}
