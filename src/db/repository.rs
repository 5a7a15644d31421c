use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Article, NewArticle, NewTag, Tag};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "id, remote_id, title, content, url, updated_at, is_archived, is_starred, images_downloaded";

pub struct Repository {
    conn: Connection,
    /// Bumped on the connection thread each time a transaction begins.
    generation: Arc<AtomicU64>,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Opens a transaction spanning every write until `commit`, `rollback`, or
    /// `finish` is called. Dropping the guard while it is still open rolls back
    /// that transaction, and never a later one.
    pub async fn begin(&self) -> Result<MirrorTransaction> {
        let counter = Arc::clone(&self.generation);
        let generation = self
            .conn
            .call(move |conn| {
                // A guard dropped outside a runtime can leave a transaction behind.
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK")?;
                }
                conn.execute_batch("BEGIN IMMEDIATE")?;
                Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
            })
            .await?;

        Ok(MirrorTransaction {
            conn: self.conn.clone(),
            generation,
            current: Arc::clone(&self.generation),
            open: true,
        })
    }

    // Read operations

    pub async fn get_all_articles(&self) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY remote_id"
                ))?;
                let mut articles = stmt
                    .query_map([], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for article in &mut articles {
                    article.tags = tags_for_article(conn, article.id)?;
                }
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn find_article_by_remote_id(&self, remote_id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| Ok(article_by_remote_id(conn, remote_id)?))
            .await?;
        Ok(article)
    }

    pub async fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let tags = self.conn.call(|conn| Ok(all_tags(conn)?)).await?;
        Ok(tags)
    }

    pub async fn count_joins(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM article_tags", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }
}

/// Write access to the mirror inside one open transaction.
pub struct MirrorTransaction {
    conn: Connection,
    generation: u64,
    current: Arc<AtomicU64>,
    open: bool,
}

impl MirrorTransaction {
    /// Commits on `Ok`, rolls back on `Err`, and hands the result back.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!("Rollback failed after {}: {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    pub async fn commit(mut self) -> Result<()> {
        self.end("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.end("ROLLBACK").await
    }

    async fn end(&mut self, statement: &'static str) -> Result<()> {
        if !self.open {
            return Err(AppError::Transaction("transaction already closed".to_string()));
        }
        self.open = false;
        self.conn
            .call(move |conn| {
                conn.execute_batch(statement)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Lookups

    pub async fn find_article_by_remote_id(&self, remote_id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| Ok(article_by_remote_id(conn, remote_id)?))
            .await?;
        Ok(article)
    }

    pub async fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let tags = self.conn.call(|conn| Ok(all_tags(conn)?)).await?;
        Ok(tags)
    }

    /// Returns the row ids of the joins between `article_id` and any of `tag_ids`.
    pub async fn find_joins(&self, article_id: i64, tag_ids: Vec<i64>) -> Result<Vec<i64>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self
            .conn
            .call(move |conn| {
                let placeholders = vec!["?"; tag_ids.len()].join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT id FROM article_tags WHERE article_id = ? AND tag_id IN ({placeholders})"
                ))?;
                let args = std::iter::once(article_id).chain(tag_ids);
                let ids = stmt
                    .query_map(params_from_iter(args), |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    // Bulk deletes

    pub async fn delete_all_joins(&self) -> Result<()> {
        self.execute("DELETE FROM article_tags").await
    }

    pub async fn delete_all_tags(&self) -> Result<()> {
        self.execute("DELETE FROM tags").await
    }

    pub async fn delete_all_articles(&self) -> Result<()> {
        self.execute("DELETE FROM articles").await
    }

    async fn execute(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(sql, [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Article batches

    /// Inserts the articles and returns their new row ids in input order.
    pub async fn insert_articles(&self, articles: Vec<NewArticle>) -> Result<Vec<i64>> {
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r#"INSERT INTO articles (remote_id, title, content, url, updated_at,
                                             is_archived, is_starred, images_downloaded)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                )?;
                let mut ids = Vec::with_capacity(articles.len());
                for article in &articles {
                    stmt.execute(params![
                        article.remote_id,
                        article.title,
                        article.content,
                        article.url,
                        article.updated_at,
                        article.is_archived,
                        article.is_starred,
                        article.images_downloaded,
                    ])?;
                    ids.push(conn.last_insert_rowid());
                }
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    pub async fn update_articles(&self, articles: Vec<Article>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r#"UPDATE articles SET remote_id = ?1, title = ?2, content = ?3, url = ?4,
                              updated_at = ?5, is_archived = ?6, is_starred = ?7,
                              images_downloaded = ?8
                       WHERE id = ?9"#,
                )?;
                for article in &articles {
                    stmt.execute(params![
                        article.remote_id,
                        article.title,
                        article.content,
                        article.url,
                        article.updated_at,
                        article.is_archived,
                        article.is_starred,
                        article.images_downloaded,
                        article.id,
                    ])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Tag batches

    /// Inserts the tags and returns their new row ids in input order.
    pub async fn insert_tags(&self, tags: Vec<NewTag>) -> Result<Vec<i64>> {
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare_cached("INSERT INTO tags (remote_id, label) VALUES (?1, ?2)")?;
                let mut ids = Vec::with_capacity(tags.len());
                for tag in &tags {
                    stmt.execute(params![tag.remote_id, tag.label])?;
                    ids.push(conn.last_insert_rowid());
                }
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    pub async fn update_tags(&self, tags: Vec<Tag>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare_cached("UPDATE tags SET remote_id = ?1, label = ?2 WHERE id = ?3")?;
                for tag in &tags {
                    stmt.execute(params![tag.remote_id, tag.label, tag.id])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Join batches

    /// Inserts `(article_id, tag_id)` pairs.
    pub async fn insert_joins(&self, joins: Vec<(i64, i64)>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
                )?;
                for (article_id, tag_id) in &joins {
                    stmt.execute(params![article_id, tag_id])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_joins(&self, ids: Vec<i64>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached("DELETE FROM article_tags WHERE id = ?1")?;
                for id in &ids {
                    stmt.execute(params![id])?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl Drop for MirrorTransaction {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        tracing::warn!("Transaction dropped while open, rolling back");
        let conn = self.conn.clone();
        let generation = self.generation;
        let current = Arc::clone(&self.current);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let result = conn
                    .call(move |conn| {
                        // A newer `begin` already rolled this one back and owns the connection.
                        let superseded = current.load(Ordering::SeqCst) != generation;
                        if !superseded && !conn.is_autocommit() {
                            conn.execute_batch("ROLLBACK")?;
                        }
                        Ok(())
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!("Deferred rollback failed: {}", e);
                }
            });
        }
    }
}

fn article_by_remote_id(
    conn: &rusqlite::Connection,
    remote_id: i64,
) -> rusqlite::Result<Option<Article>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles WHERE remote_id = ?1"
    ))?;
    let article = stmt
        .query_row(params![remote_id], article_from_row)
        .optional()?;
    match article {
        Some(mut article) => {
            article.tags = tags_for_article(conn, article.id)?;
            Ok(Some(article))
        }
        None => Ok(None),
    }
}

fn tags_for_article(conn: &rusqlite::Connection, article_id: i64) -> rusqlite::Result<Vec<Tag>> {
    let mut stmt = conn.prepare_cached(
        r#"SELECT t.id, t.remote_id, t.label
           FROM tags t
           JOIN article_tags j ON j.tag_id = t.id
           WHERE j.article_id = ?1
           ORDER BY j.id"#,
    )?;
    let tags = stmt
        .query_map(params![article_id], tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn all_tags(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<Tag>> {
    let mut stmt = conn.prepare("SELECT id, remote_id, label FROM tags ORDER BY remote_id")?;
    let tags = stmt
        .query_map([], tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        url: row.get(4)?,
        updated_at: row.get(5)?,
        is_archived: row.get(6)?,
        is_starred: row.get(7)?,
        images_downloaded: row.get(8)?,
        tags: Vec::new(),
    })
}

fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        label: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn new_article(remote_id: i64) -> NewArticle {
        NewArticle {
            remote_id,
            title: format!("Article {remote_id}"),
            content: "<p>body</p>".to_string(),
            url: format!("https://example.org/{remote_id}"),
            updated_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            is_archived: false,
            is_starred: true,
            images_downloaded: false,
        }
    }

    #[tokio::test]
    async fn committed_rows_are_readable_with_tags() {
        let repo = Repository::open_in_memory().await.unwrap();

        let tx = repo.begin().await.unwrap();
        let article_ids = tx.insert_articles(vec![new_article(7)]).await.unwrap();
        let tag_ids = tx
            .insert_tags(vec![NewTag {
                remote_id: 3,
                label: "rust".to_string(),
            }])
            .await
            .unwrap();
        tx.insert_joins(vec![(article_ids[0], tag_ids[0])])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let article = repo.find_article_by_remote_id(7).await.unwrap().unwrap();
        assert_eq!(article.id, article_ids[0]);
        assert!(article.is_starred);
        assert_eq!(article.updated_at, new_article(7).updated_at);
        assert_eq!(article.tags.len(), 1);
        assert_eq!(article.tags[0].label, "rust");
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let repo = Repository::open_in_memory().await.unwrap();

        let tx = repo.begin().await.unwrap();
        tx.insert_articles(vec![new_article(1), new_article(2)])
            .await
            .unwrap();
        tx.finish::<()>(Err(AppError::Transaction("boom".to_string())))
            .await
            .unwrap_err();

        assert!(repo.get_all_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_guard_never_rolls_back_a_later_transaction() {
        let repo = Repository::open_in_memory().await.unwrap();

        let abandoned = repo.begin().await.unwrap();
        drop(abandoned);
        let tx = repo.begin().await.unwrap();
        // Give the deferred rollback of the dropped guard a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        tx.insert_articles(vec![new_article(1)]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.get_all_articles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_joins_matches_only_requested_tags() {
        let repo = Repository::open_in_memory().await.unwrap();

        let tx = repo.begin().await.unwrap();
        let article_ids = tx.insert_articles(vec![new_article(1)]).await.unwrap();
        let tag_ids = tx
            .insert_tags(vec![
                NewTag {
                    remote_id: 10,
                    label: "a".to_string(),
                },
                NewTag {
                    remote_id: 11,
                    label: "b".to_string(),
                },
            ])
            .await
            .unwrap();
        tx.insert_joins(vec![(article_ids[0], tag_ids[0]), (article_ids[0], tag_ids[1])])
            .await
            .unwrap();

        let found = tx.find_joins(article_ids[0], vec![tag_ids[1]]).await.unwrap();
        assert_eq!(found.len(), 1);
        tx.delete_joins(found).await.unwrap();
        tx.commit().await.unwrap();

        let article = repo.find_article_by_remote_id(1).await.unwrap().unwrap();
        assert_eq!(article.tags.len(), 1);
        assert_eq!(article.tags[0].remote_id, 10);
        assert_eq!(repo.get_all_tags().await.unwrap().len(), 2);
    }
}
