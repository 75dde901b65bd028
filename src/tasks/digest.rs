use crate::alerts::Subscription;
use crate::tasks::sources::Article;

/// Articles listed before the message is cut off.
pub const MAX_DIGEST_ARTICLES: usize = 3;

const MORE_SUFFIX: &str = "... and more";

/// Render the plain-text digest sent to a subscriber.
///
/// Articles keep their given order. Nothing is escaped for the transport.
pub fn render(subscription: &Subscription, articles: &[Article]) -> String {
    if articles.is_empty() {
        return format!("No new articles found for your alert: {}", subscription.topic);
    }

    let mut message = format!("🔔 News Alert: {}\n\n", subscription.topic);

    for (i, article) in articles.iter().take(MAX_DIGEST_ARTICLES).enumerate() {
        message.push_str(&format!("{}. {}\n{}\n\n", i + 1, article.title, article.url));
    }

    if articles.len() > MAX_DIGEST_ARTICLES {
        message.push_str(MORE_SUFFIX);
    }

    message
}
