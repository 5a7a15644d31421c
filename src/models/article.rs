use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// An article row in the local mirror together with its current tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub remote_id: i64,
    pub title: String,
    pub content: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    pub is_starred: bool,
    pub images_downloaded: bool,
    pub tags: Vec<Tag>,
}

/// An article that has not been written to the mirror yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub remote_id: i64,
    pub title: String,
    pub content: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
    pub is_archived: bool,
    pub is_starred: bool,
    pub images_downloaded: bool,
}
