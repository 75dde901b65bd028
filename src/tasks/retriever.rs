use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::NewsSettings;
use crate::tasks::filters::keyword::KeywordFilter;
use crate::tasks::filters::Filter;
use crate::tasks::sources::search::SearchClient;
use crate::tasks::sources::{rss, Article, SourceError};

/// Answers "candidate articles for this query".
#[async_trait]
pub trait ArticleRetriever: Send + Sync {
    async fn fetch_by_keywords(&self, keywords: &[String]) -> Result<Vec<Article>, SourceError>;
    async fn fetch_by_category(&self, category: &str) -> Result<Vec<Article>, SourceError>;
}

/// Search provider first, then every configured feed.
///
/// Provider results are trusted as relevant and returned as-is. Feed entries
/// are always keyword-filtered locally before being unioned. Feed failures
/// are logged and skipped; the fallback path never returns an error.
pub struct FallbackRetriever {
    http_client: reqwest::Client,
    search: Option<SearchClient>,
    feeds: Vec<String>,
    categories: HashMap<String, String>,
    default_category: String,
    timeout: Duration,
}

impl FallbackRetriever {
    pub fn new(
        http_client: reqwest::Client,
        search: Option<SearchClient>,
        settings: &NewsSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            search,
            feeds: settings.feeds.clone(),
            categories: settings
                .categories
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            default_category: settings.default_category.clone(),
            timeout,
        }
    }

    /// Provider category code for a free-text category name.
    pub fn category_code(&self, category: &str) -> &str {
        self.categories
            .get(&category.to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.default_category)
    }

    /// Query every feed in order and union the keyword-matching entries.
    async fn fetch_from_feeds<S: AsRef<str> + Sync>(&self, keywords: &[S]) -> Vec<Article> {
        let filter = KeywordFilter::new(keywords);
        let mut matched = Vec::new();

        for url in &self.feeds {
            match rss::fetch_feed(&self.http_client, url, self.timeout).await {
                Ok(entries) => {
                    let total = entries.len();
                    let kept = filter.apply(entries);
                    tracing::debug!(url = %url, total, matched = kept.len(), "Fetched feed");
                    matched.extend(kept);
                }
                Err(e) => {
                    tracing::error!(url = %url, timeout = e.is_timeout(), error = %e, "Failed to fetch feed, skipping");
                }
            }
        }

        matched
    }
}

#[async_trait]
impl ArticleRetriever for FallbackRetriever {
    #[tracing::instrument(skip(self), fields(provider = self.search.is_some()))]
    async fn fetch_by_keywords(&self, keywords: &[String]) -> Result<Vec<Article>, SourceError> {
        if let Some(search) = &self.search {
            let query = keywords.join(" ");
            match search.search(&query).await {
                Ok(articles) => {
                    tracing::debug!(count = articles.len(), "Search provider answered");
                    return Ok(articles);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Search provider failed, falling back to feeds");
                }
            }
        }

        Ok(self.fetch_from_feeds(keywords).await)
    }

    #[tracing::instrument(skip(self), fields(provider = self.search.is_some()))]
    async fn fetch_by_category(&self, category: &str) -> Result<Vec<Article>, SourceError> {
        if let Some(search) = &self.search {
            let code = self.category_code(category);
            match search.top_by_category(code, category).await {
                Ok(articles) => return Ok(articles),
                Err(e) => {
                    tracing::error!(error = %e, code = %code, "Search provider failed, falling back to feeds");
                }
            }
        }

        Ok(self.fetch_from_feeds(&[category]).await)
    }
}
