use std::collections::{HashMap, HashSet};

use crate::models::{RemoteTag, Tag};

use super::tags::{PendingTags, TagIndex};

/// How an article's local tag associations relate to its remote tag list.
#[derive(Debug, Default, PartialEq)]
pub struct JoinPlan<'a> {
    /// Local tags still listed remotely, with the remote record they matched.
    pub kept: Vec<(&'a Tag, &'a RemoteTag)>,
    /// Local tags the remote no longer lists.
    pub removed: Vec<&'a Tag>,
    /// Remote tags with no local association yet, first occurrence only.
    pub added: Vec<&'a RemoteTag>,
}

/// Splits `current` and `remote` into kept, removed, and added tags without
/// mutating either list. Repeated remote ids collapse onto their first entry.
pub fn plan_joins<'a>(current: &'a [Tag], remote: &'a [RemoteTag]) -> JoinPlan<'a> {
    let mut remote_by_id: HashMap<i64, &RemoteTag> = HashMap::with_capacity(remote.len());
    for tag in remote {
        remote_by_id.entry(tag.id).or_insert(tag);
    }
    let associated: HashSet<i64> = current.iter().map(|tag| tag.remote_id).collect();

    let mut plan = JoinPlan::default();
    for tag in current {
        match remote_by_id.get(&tag.remote_id) {
            Some(remote_tag) => plan.kept.push((tag, *remote_tag)),
            None => plan.removed.push(tag),
        }
    }

    let mut seen = HashSet::new();
    plan.added = remote
        .iter()
        .filter(|tag| !associated.contains(&tag.id) && seen.insert(tag.id))
        .collect();

    plan
}

/// The join writes one article needs.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct JoinChanges {
    /// Remote ids of the article's tags once the changes are applied.
    pub associated: Vec<i64>,
    /// Local tag ids whose joins to the article must be deleted.
    pub to_remove: Vec<i64>,
    /// Remote tag ids that need a new join to the article.
    pub to_insert: Vec<i64>,
    /// A tag the article keeps was relabeled.
    pub relabeled: bool,
}

impl JoinChanges {
    pub fn changes_article(&self) -> bool {
        self.relabeled || !self.to_remove.is_empty() || !self.to_insert.is_empty()
    }
}

/// Reconciles one article's tags, resolving every remote tag it keeps or
/// gains through `index`.
pub fn reconcile_joins(
    current: &[Tag],
    remote: &[RemoteTag],
    index: &mut TagIndex,
    pending: &mut PendingTags,
) -> JoinChanges {
    let plan = plan_joins(current, remote);
    let mut changes = JoinChanges::default();

    for (tag, remote_tag) in &plan.kept {
        // Every holder of a relabeled tag changed, not only the first one seen.
        if tag.label != remote_tag.label {
            changes.relabeled = true;
        }
        index.resolve(remote_tag, pending);
        changes.associated.push(tag.remote_id);
    }

    changes.to_remove = plan.removed.iter().map(|tag| tag.id).collect();

    for remote_tag in &plan.added {
        index.resolve(remote_tag, pending);
        changes.associated.push(remote_tag.id);
        changes.to_insert.push(remote_tag.id);
    }

    changes
}
