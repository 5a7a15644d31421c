mod wallabag;

use std::future::Future;

use crate::error::Result;
use crate::models::{ArticlePage, RemoteTag};

pub use wallabag::WallabagClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Created,
    Updated,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Created => "created",
            SortKey::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Parameters of a paginated article query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    /// Only articles updated at or after this many seconds since the epoch.
    pub since: Option<i64>,
    pub per_page: u32,
}

impl ArticleQuery {
    pub fn new(sort: SortKey) -> Self {
        Self {
            sort,
            order: SortOrder::Ascending,
            since: None,
            per_page: 30,
        }
    }

    pub fn since(mut self, epoch_seconds: i64) -> Self {
        self.since = Some(epoch_seconds);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }
}

/// A remote collection of tagged articles.
pub trait PageSource {
    /// The complete remote tag vocabulary.
    fn fetch_tags(&self) -> impl Future<Output = Result<Vec<RemoteTag>>> + Send;

    /// Fetches one page (1-based) of the query.
    fn fetch_page(
        &self,
        query: &ArticleQuery,
        page: u32,
    ) -> impl Future<Output = Result<ArticlePage>> + Send;

    fn pages(&self, query: ArticleQuery) -> PageIterator<'_, Self>
    where
        Self: Sized,
    {
        PageIterator::new(self, query)
    }
}

/// Walks the pages of one query in order. Restarting means building a new
/// iterator from the same query.
pub struct PageIterator<'a, S> {
    source: &'a S,
    query: ArticleQuery,
    next_page: u32,
    total_pages: Option<u32>,
}

impl<'a, S: PageSource> PageIterator<'a, S> {
    pub fn new(source: &'a S, query: ArticleQuery) -> Self {
        Self {
            source,
            query,
            next_page: 1,
            total_pages: None,
        }
    }

    pub fn has_next(&self) -> bool {
        match self.total_pages {
            None => true,
            Some(total) => self.next_page <= total,
        }
    }

    pub async fn next(&mut self) -> Result<ArticlePage> {
        let page = self.source.fetch_page(&self.query, self.next_page).await?;
        self.total_pages = Some(page.pages);
        self.next_page += 1;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingSource {
        pages: u32,
        calls: AtomicU32,
    }

    impl PageSource for CountingSource {
        async fn fetch_tags(&self) -> Result<Vec<RemoteTag>> {
            Ok(Vec::new())
        }

        async fn fetch_page(&self, _query: &ArticleQuery, page: u32) -> Result<ArticlePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ArticlePage {
                page,
                pages: self.pages,
                total: 0,
                items: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn iterates_every_page_once() {
        let source = CountingSource {
            pages: 3,
            calls: AtomicU32::new(0),
        };
        let mut pages = source.pages(ArticleQuery::new(SortKey::Created));

        let mut seen = Vec::new();
        while pages.has_next() {
            seen.push(pages.next().await.unwrap().page);
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_collection_stops_after_first_page() {
        let source = CountingSource {
            pages: 0,
            calls: AtomicU32::new(0),
        };
        let mut pages = source.pages(ArticleQuery::new(SortKey::Updated).since(10));

        assert!(pages.has_next());
        pages.next().await.unwrap();
        assert!(!pages.has_next());
    }
}
