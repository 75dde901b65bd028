use super::Filter;
use crate::tasks::sources::Article;

/// Case-insensitive substring match on title + description, any keyword wins.
///
/// Partial words count ("Mac" matches "MacBook"); there is no token
/// boundary handling and no dedup.
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, article: &Article) -> bool {
        let content = format!("{} {}", article.title, article.description).to_lowercase();
        self.keywords.iter().any(|kw| content.contains(kw.as_str()))
    }
}

impl Filter for KeywordFilter {
    fn apply(&self, articles: Vec<Article>) -> Vec<Article> {
        articles.into_iter().filter(|a| self.matches(a)).collect()
    }
}
