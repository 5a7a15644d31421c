use std::collections::{BTreeMap, HashMap};
use std::ops::AddAssign;

use anyhow::anyhow;

use crate::db::MirrorTransaction;
use crate::error::Result;
use crate::models::{Article, NewArticle};

use super::joins::JoinChanges;
use super::tags::{PendingTags, TagIndex};

/// Row counts written by one or more flushes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub articles_inserted: usize,
    pub articles_updated: usize,
    pub tags_inserted: usize,
    pub tags_updated: usize,
    pub joins_removed: usize,
    pub joins_inserted: usize,
}

impl AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.articles_inserted += other.articles_inserted;
        self.articles_updated += other.articles_updated;
        self.tags_inserted += other.tags_inserted;
        self.tags_updated += other.tags_updated;
        self.joins_removed += other.joins_removed;
        self.joins_inserted += other.joins_inserted;
    }
}

/// Writes collected while reconciling one page, flushed in bulk at the end
/// of the page and then cleared.
#[derive(Debug, Default)]
pub struct PageBatch {
    pub articles_to_update: Vec<Article>,
    pub articles_to_insert: Vec<NewArticle>,
    pub tags: PendingTags,
    /// Local article id to the local tag ids whose joins must be deleted.
    pub joins_to_remove: BTreeMap<i64, Vec<i64>>,
    /// Remote article id to the remote tag ids that need a join.
    pub joins_to_insert: BTreeMap<i64, Vec<i64>>,
    /// Local ids of the page's articles, by remote id, once known.
    article_ids: HashMap<i64, i64>,
}

impl PageBatch {
    pub fn queue_insert(&mut self, article: NewArticle, joins: JoinChanges) {
        if !joins.to_insert.is_empty() {
            self.joins_to_insert.insert(article.remote_id, joins.to_insert);
        }
        self.articles_to_insert.push(article);
    }

    /// Queues the join changes of a stored article, and the article itself when
    /// `update` is set.
    pub fn queue_stored(&mut self, article: Article, joins: JoinChanges, update: bool) {
        self.article_ids.insert(article.remote_id, article.id);
        if !joins.to_remove.is_empty() {
            self.joins_to_remove.insert(article.id, joins.to_remove);
        }
        if !joins.to_insert.is_empty() {
            self.joins_to_insert.insert(article.remote_id, joins.to_insert);
        }
        if update {
            self.articles_to_update.push(article);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.articles_to_update.is_empty()
            && self.articles_to_insert.is_empty()
            && self.tags.is_empty()
            && self.joins_to_remove.is_empty()
            && self.joins_to_insert.is_empty()
    }

    pub fn clear(&mut self) {
        self.articles_to_update.clear();
        self.articles_to_insert.clear();
        self.tags.clear();
        self.joins_to_remove.clear();
        self.joins_to_insert.clear();
        self.article_ids.clear();
    }

    /// Writes every non-empty collection to the mirror, articles and tags
    /// before the joins that reference them, then clears the batch.
    pub async fn flush(
        &mut self,
        tx: &MirrorTransaction,
        index: &mut TagIndex,
    ) -> Result<FlushStats> {
        let mut stats = FlushStats::default();

        if !self.articles_to_update.is_empty() {
            let articles = std::mem::take(&mut self.articles_to_update);
            stats.articles_updated = articles.len();
            tracing::trace!("Updating {} articles", articles.len());
            tx.update_articles(articles).await?;
        }

        if !self.articles_to_insert.is_empty() {
            let articles = std::mem::take(&mut self.articles_to_insert);
            let remote_ids: Vec<i64> = articles.iter().map(|a| a.remote_id).collect();
            stats.articles_inserted = articles.len();
            tracing::trace!("Inserting {} articles", articles.len());
            let ids = tx.insert_articles(articles).await?;
            self.article_ids.extend(remote_ids.into_iter().zip(ids));
        }

        if !self.tags.to_update.is_empty() {
            let tags: Vec<_> = self
                .tags
                .to_update
                .iter()
                .filter_map(|remote_id| index.stored_tag(*remote_id))
                .collect();
            stats.tags_updated = tags.len();
            tracing::trace!("Updating {} tags", tags.len());
            tx.update_tags(tags).await?;
        }

        if !self.tags.to_insert.is_empty() {
            let tags: Vec<_> = self
                .tags
                .to_insert
                .iter()
                .filter_map(|remote_id| index.new_tag(*remote_id))
                .collect();
            stats.tags_inserted = tags.len();
            tracing::trace!("Inserting {} tags", tags.len());
            let remote_ids: Vec<i64> = tags.iter().map(|t| t.remote_id).collect();
            let ids = tx.insert_tags(tags).await?;
            for (remote_id, id) in remote_ids.into_iter().zip(ids) {
                index.assign_id(remote_id, id);
            }
        }

        if !self.joins_to_remove.is_empty() {
            let mut join_ids = Vec::new();
            for (article_id, tag_ids) in std::mem::take(&mut self.joins_to_remove) {
                join_ids.extend(tx.find_joins(article_id, tag_ids).await?);
            }
            stats.joins_removed = join_ids.len();
            tracing::trace!("Deleting {} joins", join_ids.len());
            tx.delete_joins(join_ids).await?;
        }

        if !self.joins_to_insert.is_empty() {
            let mut joins = Vec::new();
            for (remote_article_id, remote_tag_ids) in std::mem::take(&mut self.joins_to_insert) {
                let article_id = *self.article_ids.get(&remote_article_id).ok_or_else(|| {
                    anyhow!("article {} has no local id", remote_article_id)
                })?;
                for remote_tag_id in remote_tag_ids {
                    let tag_id = index
                        .local_id(remote_tag_id)
                        .ok_or_else(|| anyhow!("tag {} has no local id", remote_tag_id))?;
                    joins.push((article_id, tag_id));
                }
            }
            stats.joins_inserted = joins.len();
            tracing::trace!("Inserting {} joins", joins.len());
            tx.insert_joins(joins).await?;
        }

        self.clear();
        Ok(stats)
    }
}
