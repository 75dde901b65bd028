use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Article, SourceError};

/// Page size requested from the provider.
const PAGE_LIMIT: &str = "50";

/// `{ meta: {...}, data: [...] }`; only `data` is consumed.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<SearchArticle>,
}

#[derive(Debug, Deserialize)]
struct SearchArticle {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Keyword/category search against a thenewsapi.com-compatible provider.
///
/// Results are a bounded page and are not assumed to be sorted.
pub struct SearchClient {
    http_client: reqwest::Client,
    api_token: String,
    base_url: String,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(
        http_client: reqwest::Client,
        api_token: String,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Free-text search across all news.
    pub async fn search(&self, query: &str) -> Result<Vec<Article>, SourceError> {
        let url = format!("{}/v1/news/all", self.base_url);
        self.fetch(&url, &[("search", query)], None).await
    }

    /// Top stories for a provider category code; articles are tagged with `label`.
    pub async fn top_by_category(
        &self,
        category_code: &str,
        label: &str,
    ) -> Result<Vec<Article>, SourceError> {
        let url = format!("{}/v1/news/top", self.base_url);
        self.fetch(&url, &[("categories", category_code)], Some(label))
            .await
    }

    async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        category: Option<&str>,
    ) -> Result<Vec<Article>, SourceError> {
        let response = self
            .http_client
            .get(url)
            .query(&[
                ("api_token", self.api_token.as_str()),
                ("limit", PAGE_LIMIT),
                ("sort", "published_at"),
            ])
            .query(params)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        let parsed: SearchResponse = serde_json::from_slice(&body)
            .map_err(|e| SourceError::MalformedBody(e.to_string()))?;

        Ok(parsed
            .data
            .into_iter()
            .map(|item| into_article(item, category))
            .collect())
    }
}

fn into_article(item: SearchArticle, category: Option<&str>) -> Article {
    let published_at = item
        .published_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Article {
        title: item.title.unwrap_or_default(),
        url: item.url.unwrap_or_default(),
        source: item.source.unwrap_or_default(),
        description: item.description.or(item.snippet).unwrap_or_default(),
        published_at,
        image_url: item.image_url.filter(|u| !u.is_empty()),
        category: category.map(String::from),
        guid: item.uuid,
    }
}
