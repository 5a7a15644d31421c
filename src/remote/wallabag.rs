use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{ArticlePage, RemoteArticle, RemoteTag};

use super::{ArticleQuery, PageSource};

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    page: u32,
    pages: u32,
    total: u64,
    #[serde(rename = "_embedded")]
    embedded: Embedded,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    items: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_archived: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_starred: bool,
    #[serde(default)]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    id: i64,
    label: String,
}

impl From<TagEntry> for RemoteTag {
    fn from(tag: TagEntry) -> Self {
        RemoteTag {
            id: tag.id,
            label: tag.label,
        }
    }
}

impl From<Entry> for RemoteArticle {
    fn from(entry: Entry) -> Self {
        RemoteArticle {
            id: entry.id,
            title: entry.title.unwrap_or_default(),
            content: entry.content.unwrap_or_default(),
            url: entry.url.unwrap_or_default(),
            updated_at: entry.updated_at,
            archived: entry.is_archived,
            starred: entry.is_starred,
            tags: entry.tags.into_iter().map(RemoteTag::from).collect(),
        }
    }
}

impl From<EntriesResponse> for ArticlePage {
    fn from(response: EntriesResponse) -> Self {
        ArticlePage {
            page: response.page,
            pages: response.pages,
            total: response.total,
            items: response
                .embedded
                .items
                .into_iter()
                .map(RemoteArticle::from)
                .collect(),
        }
    }
}

/// wallabag sends `2016-04-07T14:58:37+0200`, newer servers send RFC 3339.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}

pub struct WallabagClient {
    client: Client,
    base_url: Url,
    access_token: String,
}

impl WallabagClient {
    pub fn new(api_url: &str, access_token: String, timeout: Duration) -> Result<Self> {
        // Without the trailing slash `Url::join` would drop the last path segment.
        let mut base_url = Url::parse(api_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("wallabag-mirror/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config
            .access_token
            .clone()
            .ok_or_else(|| AppError::Config("access_token is not set".to_string()))?;
        Self::new(
            &config.api_url,
            token,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = self.base_url.join(path)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await?;
            return Err(AppError::Api { status, message });
        }

        Ok(response)
    }
}

impl PageSource for WallabagClient {
    async fn fetch_tags(&self) -> Result<Vec<RemoteTag>> {
        let response = self.get("api/tags.json", &[]).await?;
        let tags: Vec<TagEntry> = response.json().await?;
        Ok(tags.into_iter().map(RemoteTag::from).collect())
    }

    async fn fetch_page(&self, query: &ArticleQuery, page: u32) -> Result<ArticlePage> {
        let mut params = vec![
            ("sort", query.sort.as_str().to_string()),
            ("order", query.order.as_str().to_string()),
            ("perPage", query.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(since) = query.since {
            params.push(("since", since.to_string()));
        }

        let response = self.get("api/entries.json", &params).await?;
        let entries: EntriesResponse = response.json().await?;
        tracing::debug!(
            "Fetched page {}/{} ({} items total)",
            entries.page,
            entries.pages,
            entries.total
        );
        Ok(entries.into())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const PAGE_JSON: &str = r#"{
        "page": 2,
        "limit": 30,
        "pages": 4,
        "total": 95,
        "_embedded": {
            "items": [
                {
                    "id": 42,
                    "title": "Ownership explained",
                    "content": "<p>borrow</p>",
                    "url": "https://example.org/ownership",
                    "updated_at": "2016-04-07T14:58:37+0200",
                    "is_archived": 1,
                    "is_starred": false,
                    "tags": [{"id": 5, "label": "rust", "slug": "rust"}]
                },
                {
                    "id": 43,
                    "title": null,
                    "updated_at": "2021-01-02T03:04:05+00:00",
                    "is_archived": 0,
                    "is_starred": 1
                }
            ]
        }
    }"#;

    #[test]
    fn decodes_entries_page() {
        let response: EntriesResponse = serde_json::from_str(PAGE_JSON).unwrap();
        let page = ArticlePage::from(response);

        assert_eq!((page.page, page.pages, page.total), (2, 4, 95));
        assert_eq!(page.items.len(), 2);

        let first = &page.items[0];
        assert_eq!(first.id, 42);
        assert!(first.archived);
        assert!(!first.starred);
        assert_eq!(
            first.updated_at,
            Utc.with_ymd_and_hms(2016, 4, 7, 12, 58, 37).unwrap()
        );
        assert_eq!(
            first.tags,
            vec![RemoteTag {
                id: 5,
                label: "rust".to_string()
            }]
        );

        let second = &page.items[1];
        assert_eq!(second.title, "");
        assert!(second.starred);
        assert!(second.tags.is_empty());
    }

    #[test]
    fn rejects_unparseable_timestamp() {
        let json = r#"{"id": 1, "updated_at": "yesterday"}"#;
        assert!(serde_json::from_str::<Entry>(json).is_err());
    }

    #[test]
    fn base_url_keeps_its_path() {
        let client = WallabagClient::new(
            "https://example.org/wallabag",
            "token".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        let url = client.base_url.join("api/entries.json").unwrap();
        assert_eq!(url.as_str(), "https://example.org/wallabag/api/entries.json");
    }
}
