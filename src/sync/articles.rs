use crate::models::{Article, NewArticle, RemoteArticle};

use super::batch::PageBatch;
use super::changes::{ChangeKind, ChangeSet};
use super::joins::reconcile_joins;
use super::tags::TagIndex;

/// State carried across every page of one sync.
#[derive(Debug, Default)]
pub struct PassState {
    pub tags: TagIndex,
    pub changes: ChangeSet,
    /// Highest remote update time seen so far, in epoch milliseconds.
    pub latest_updated: i64,
}

impl PassState {
    pub fn new(tags: TagIndex, changes: ChangeSet, latest_updated: i64) -> Self {
        Self {
            tags,
            changes,
            latest_updated,
        }
    }
}

/// Merges one remote article into the page batch. `existing` is the stored
/// article with the same remote id, if there is one.
///
/// New articles are always queued. A stored article is rewritten only when
/// one of its fields differs from the remote, and reported only when a field,
/// a tag association, or the label of one of its tags changed.
pub fn reconcile_article(
    state: &mut PassState,
    batch: &mut PageBatch,
    remote: RemoteArticle,
    existing: Option<Article>,
) -> Option<ChangeKind> {
    let current_tags = existing
        .as_ref()
        .map(|a| a.tags.as_slice())
        .unwrap_or_default();
    let joins = reconcile_joins(current_tags, &remote.tags, &mut state.tags, &mut batch.tags);

    let updated_millis = remote.updated_at.timestamp_millis();
    if updated_millis > state.latest_updated {
        state.latest_updated = updated_millis;
    }

    let remote_id = remote.id;
    let change = match existing {
        None => {
            batch.queue_insert(
                NewArticle {
                    remote_id: remote.id,
                    title: remote.title,
                    content: remote.content,
                    url: remote.url,
                    updated_at: remote.updated_at,
                    is_archived: remote.archived,
                    is_starred: remote.starred,
                    images_downloaded: false,
                },
                joins,
            );
            Some(ChangeKind::Added)
        }
        Some(mut article) => {
            // Cached images belong to the old content.
            let images_downloaded = article.images_downloaded && article.content == remote.content;
            let fields_changed = apply_remote(&mut article, remote, images_downloaded);
            let changed = fields_changed || joins.changes_article();
            batch.queue_stored(article, joins, fields_changed);
            changed.then_some(ChangeKind::Unspecified)
        }
    };

    if let Some(kind) = change {
        state.changes.record(remote_id, kind);
    }
    change
}

/// Overwrites the remote-owned fields and reports whether any of them changed.
fn apply_remote(article: &mut Article, remote: RemoteArticle, images_downloaded: bool) -> bool {
    let changed = article.title != remote.title
        || article.content != remote.content
        || article.url != remote.url
        || article.remote_id != remote.id
        || article.updated_at != remote.updated_at
        || article.is_archived != remote.archived
        || article.is_starred != remote.starred
        || article.images_downloaded != images_downloaded;

    article.title = remote.title;
    article.content = remote.content;
    article.url = remote.url;
    article.remote_id = remote.id;
    article.updated_at = remote.updated_at;
    article.is_archived = remote.archived;
    article.is_starred = remote.starred;
    article.images_downloaded = images_downloaded;

    changed
}
