pub mod keyword;

use crate::tasks::sources::Article;

pub trait Filter: Send + Sync {
    fn apply(&self, articles: Vec<Article>) -> Vec<Article>;
}
