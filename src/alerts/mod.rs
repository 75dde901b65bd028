pub mod error;
pub mod evaluator;
pub mod file_store;
pub mod scheduler;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::sources::Article;
use error::AlertError;

/// Evaluation frequency class of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Realtime,
    Hourly,
    Daily,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Realtime, Cadence::Hourly, Cadence::Daily];

    /// Minimum time between two evaluations of the same subscription.
    pub fn min_interval(self) -> Duration {
        match self {
            Cadence::Realtime => Duration::minutes(5),
            Cadence::Hourly => Duration::hours(1),
            Cadence::Daily => Duration::hours(24),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Realtime => "realtime",
            Cadence::Hourly => "hourly",
            Cadence::Daily => "daily",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "realtime" | "real-time" => Ok(Cadence::Realtime),
            "hourly" => Ok(Cadence::Hourly),
            "daily" => Ok(Cadence::Daily),
            other => Err(format!("unknown cadence '{other}', expected realtime, hourly or daily")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub owner_id: String,
    /// Where digests are delivered (a phone number for SMS).
    pub destination: String,
    pub topic: String,
    pub keywords: Vec<String>,
    pub cadence: Cadence,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Subscription {
    pub fn new(
        owner_id: &str,
        destination: &str,
        topic: &str,
        keywords: Vec<String>,
        cadence: Cadence,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            destination: destination.to_string(),
            topic: topic.to_string(),
            keywords,
            cadence,
            active: true,
            last_checked: None,
            created_at: Utc::now(),
        }
    }

    /// Only the owner may trigger, change or remove a subscription.
    pub fn authorize(&self, requester: &str) -> Result<(), AlertError> {
        if self.owner_id == requester {
            Ok(())
        } else {
            Err(AlertError::Unauthorized {
                subscription: self.id.clone(),
                requester: requester.to_string(),
            })
        }
    }

    /// Never checked, or checked at least one cadence interval ago.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            None => true,
            Some(last) => now - last >= self.cadence.min_interval(),
        }
    }

    /// Keep only articles published strictly after `last_checked`.
    ///
    /// With no `last_checked` everything is kept. Articles without a
    /// publish time cannot be placed in the window and are dropped.
    pub fn within_window(&self, articles: Vec<Article>) -> Vec<Article> {
        let Some(since) = self.last_checked else {
            return articles;
        };
        articles
            .into_iter()
            .filter(|a| a.published_at.is_some_and(|p| p > since))
            .collect()
    }
}

/// Partial edit of a subscription. `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub topic: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub cadence: Option<Cadence>,
    pub active: Option<bool>,
}

impl SubscriptionUpdate {
    pub fn apply(self, sub: &mut Subscription) {
        if let Some(topic) = self.topic {
            sub.topic = topic;
        }
        if let Some(keywords) = self.keywords {
            sub.keywords = keywords;
        }
        if let Some(cadence) = self.cadence {
            sub.cadence = cadence;
        }
        if let Some(active) = self.active {
            sub.active = active;
        }
    }
}

/// One delivered (or attempted) alert message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub subscription_id: String,
    pub owner_id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub article_count: usize,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
