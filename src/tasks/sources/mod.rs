pub mod rss;
pub mod search;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One candidate article, normalized from whichever source produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub source: String,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    /// Feed entry identifier; provider articles carry their uuid here.
    pub guid: Option<String>,
}

/// Failure of a single outbound article fetch.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// Connection failure or timeout.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },

    #[error("malformed provider body: {0}")]
    MalformedBody(String),

    #[error("unparseable feed: {0}")]
    Feed(String),
}

impl SourceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Transport(e) if e.is_timeout())
    }
}

#[cfg(test)]
pub(crate) fn article(title: &str, description: &str) -> Article {
    Article {
        title: title.to_string(),
        url: format!("https://example.com/{}", title.to_lowercase().replace(' ', "-")),
        source: "Test Source".to_string(),
        description: description.to_string(),
        published_at: None,
        image_url: None,
        category: None,
        guid: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_displays_url_and_code() {
        let err = SourceError::Status {
            status: 503,
            url: "https://example.com/feed".into(),
        };
        assert_eq!(err.to_string(), "https://example.com/feed returned status 503");
        assert!(!err.is_timeout());
    }

    #[test]
    fn malformed_and_feed_display() {
        assert_eq!(
            SourceError::MalformedBody("expected value".into()).to_string(),
            "malformed provider body: expected value"
        );
        assert_eq!(
            SourceError::Feed("no root element".into()).to_string(),
            "unparseable feed: no root element"
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SourceError>();
    }
}
