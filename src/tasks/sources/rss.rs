use std::time::Duration;

use super::{Article, SourceError};

/// Fetch a syndication feed and return every entry as an article.
///
/// No keyword filtering happens here; feeds are unfiltered by nature and the
/// retriever post-filters them.
#[tracing::instrument(skip(client, timeout), level = "debug")]
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<Article>, SourceError> {
    let response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let bytes = response.bytes().await?;
    parse_feed(&bytes[..], url)
}

/// Parse RSS/Atom bytes. `fallback_source` labels entries of untitled feeds.
pub fn parse_feed(bytes: &[u8], fallback_source: &str) -> Result<Vec<Article>, SourceError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| SourceError::Feed(e.to_string()))?;

    let source = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_source.to_string());

    let articles = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let guid = Some(entry.id).filter(|id| !id.is_empty());

            Article {
                title,
                url,
                source: source.clone(),
                description,
                published_at: entry.published.or(entry.updated),
                image_url: None,
                category: None,
                guid,
            }
        })
        .collect();

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
          <channel>
            <title>Test Feed</title>
            <item>
              <title>Article One</title>
              <link>https://example.com/1</link>
              <description>Summary of article one</description>
              <pubDate>Mon, 01 Jan 2024 10:30:00 +0000</pubDate>
              <guid>urn:article:1</guid>
            </item>
            <item>
              <title>Article Two</title>
              <link>https://example.com/2</link>
              <description>Summary of article two</description>
            </item>
          </channel>
        </rss>"#;

    #[test]
    fn test_parse_rss2_feed() {
        let articles = parse_feed(RSS.as_bytes(), "https://example.com/feed").unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Article One");
        assert_eq!(first.url, "https://example.com/1");
        assert_eq!(first.source, "Test Feed");
        assert_eq!(first.description, "Summary of article one");
        assert_eq!(first.guid.as_deref(), Some("urn:article:1"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap())
        );

        assert!(articles[1].published_at.is_none());
    }

    #[test]
    fn test_parse_atom_feed() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
          <title>Test Atom Feed</title>
          <id>urn:feed</id>
          <entry>
            <id>urn:entry:1</id>
            <title>Atom Entry</title>
            <link href="https://example.com/atom/1"/>
            <summary>Atom summary</summary>
            <updated>2024-01-01T00:00:00Z</updated>
          </entry>
        </feed>"#;

        let articles = parse_feed(xml.as_bytes(), "fallback").unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Atom Entry");
        assert_eq!(articles[0].source, "Test Atom Feed");
        assert_eq!(articles[0].description, "Atom summary");
        assert_eq!(
            articles[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_untitled_feed_uses_fallback_source() {
        let xml = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
          <item><title>Lonely</title><link>https://example.com/x</link></item>
        </channel></rss>"#;
        let articles = parse_feed(xml.as_bytes(), "https://example.com/feed").unwrap();
        assert_eq!(articles[0].source, "https://example.com/feed");
    }

    #[test]
    fn test_malformed_feed_is_feed_error() {
        let err = parse_feed(b"this is not xml at all", "x").unwrap_err();
        assert!(matches!(err, SourceError::Feed(_)));
    }

    #[tokio::test]
    async fn test_fetch_feed_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed.xml", server.uri());
        let articles = fetch_feed(&client, &url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(articles.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_feed_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/missing.xml", server.uri());
        let err = fetch_feed(&client, &url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_feed_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(RSS)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/slow.xml", server.uri());
        let err = fetch_feed(&client, &url, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
