use chrono::{DateTime, Utc};

/// A tag as reported by the remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTag {
    pub id: i64,
    pub label: String,
}

/// An article as reported by the remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteArticle {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    pub archived: bool,
    pub starred: bool,
    pub tags: Vec<RemoteTag>,
}

/// One page of a paginated article query. `items` may be empty even when
/// later pages exist.
#[derive(Debug, Clone, Default)]
pub struct ArticlePage {
    pub page: u32,
    pub pages: u32,
    pub total: u64,
    pub items: Vec<RemoteArticle>,
}
