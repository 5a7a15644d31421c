use std::collections::HashSet;

use chrono::Utc;

use crate::db::{MirrorTransaction, Repository};
use crate::error::Result;
use crate::models::{NewTag, Tag};
use crate::remote::{ArticleQuery, PageSource, SortKey};
use crate::state::WatermarkStore;

use super::articles::{reconcile_article, PassState};
use super::batch::{FlushStats, PageBatch};
use super::changes::ChangeSet;
use super::tags::TagIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Wipe the mirror and download everything again.
    Full,
    /// Merge only what changed since the stored watermark.
    Incremental,
}

impl SyncMode {
    /// An incremental sync has nothing to build on until a first sync completed.
    pub fn effective(self, first_sync_completed: bool) -> Self {
        if first_sync_completed {
            self
        } else {
            SyncMode::Full
        }
    }
}

/// Drives one sync of the mirror against a page source.
///
/// Runs must not overlap: the tag index and the open transaction belong to a
/// single pass.
pub struct Updater<S, W> {
    repository: Repository,
    source: S,
    state: W,
    page_size: u32,
}

impl<S: PageSource, W: WatermarkStore> Updater<S, W> {
    pub fn new(repository: Repository, source: S, state: W, page_size: u32) -> Self {
        Self {
            repository,
            source,
            state,
            page_size,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> &W {
        &self.state
    }

    /// Runs one sync inside a single transaction. Nothing is written to the
    /// mirror or the watermark store unless the whole pass succeeds.
    pub async fn run(&mut self, mode: SyncMode) -> Result<ChangeSet> {
        let clean = mode == SyncMode::Full;
        tracing::info!("Sync started (full: {})", clean);

        let tx = self.repository.begin().await?;
        let result = self.reconcile(&tx, clean).await;
        let (changes, watermark) = tx.finish(result).await?;

        self.state.set_watermark(watermark)?;
        self.state.set_last_run_time(Utc::now())?;
        self.state.set_first_sync_completed(true)?;

        tracing::info!(
            "Sync finished: {} articles changed, watermark {}",
            changes.len(),
            watermark
        );
        Ok(changes)
    }

    async fn reconcile(&self, tx: &MirrorTransaction, clean: bool) -> Result<(ChangeSet, i64)> {
        let mut changes = ChangeSet::new();

        if clean {
            tracing::debug!("Deleting old mirror entries");
            tx.delete_all_joins().await?;
            tx.delete_all_tags().await?;
            tx.delete_all_articles().await?;
            changes.invalidate_all = true;
        }

        let watermark = if clean { 0 } else { self.state.watermark() };
        tracing::debug!("Starting from watermark {}", watermark);

        let tags = self.preload_tags(tx, clean).await?;
        tracing::debug!("{} tags preloaded", tags.len());

        let query = if clean {
            ArticleQuery::new(SortKey::Created)
        } else {
            // The watermark is kept in milliseconds, the query cutoff is in seconds.
            ArticleQuery::new(SortKey::Updated).since(watermark / 1000)
        }
        .per_page(self.page_size);

        let mut state = PassState::new(tags, changes, watermark);
        let mut batch = PageBatch::default();
        let mut totals = FlushStats::default();

        let mut pages = self.source.pages(query);
        while pages.has_next() {
            let page = pages.next().await?;
            tracing::debug!(
                "Page {}/{}, {} articles total",
                page.page,
                page.pages,
                page.total
            );

            if page.items.is_empty() {
                tracing::debug!("No items on page {}, skipping", page.page);
                continue;
            }

            for remote in page.items {
                // A full sync has just emptied the mirror.
                let existing = if clean {
                    None
                } else {
                    tx.find_article_by_remote_id(remote.id).await?
                };
                reconcile_article(&mut state, &mut batch, remote, existing);
            }

            totals += batch.flush(tx, &mut state.tags).await?;
        }

        tracing::debug!("Flushed {:?}", totals);
        Ok((state.changes, state.latest_updated))
    }

    async fn preload_tags(&self, tx: &MirrorTransaction, clean: bool) -> Result<TagIndex> {
        if !clean {
            return Ok(TagIndex::from_tags(tx.get_all_tags().await?));
        }

        let mut seen = HashSet::new();
        let new_tags: Vec<NewTag> = self
            .source
            .fetch_tags()
            .await?
            .into_iter()
            .filter(|tag| seen.insert(tag.id))
            .map(|tag| NewTag {
                remote_id: tag.id,
                label: tag.label,
            })
            .collect();

        let ids = tx.insert_tags(new_tags.clone()).await?;
        let tags = new_tags
            .into_iter()
            .zip(ids)
            .map(|(tag, id)| Tag {
                id,
                remote_id: tag.remote_id,
                label: tag.label,
            })
            .collect();
        Ok(TagIndex::from_tags(tags))
    }
}
