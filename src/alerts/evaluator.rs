use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::AlertError;
use super::scheduler::CycleRunner;
use super::store::SubscriptionStore;
use super::{Cadence, DeliveryRecord, Subscription};
use crate::tasks::digest;
use crate::tasks::retriever::ArticleRetriever;
use crate::tasks::sinks::Notifier;

/// Tally of one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cadence: Cadence,
    /// Active subscriptions of this cadence.
    pub considered: usize,
    /// Not yet due.
    pub skipped: usize,
    /// Evaluated, but nothing new to send.
    pub empty: usize,
    pub notified: usize,
    pub delivery_failed: usize,
    pub retrieval_failed: usize,
}

impl CycleReport {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            considered: 0,
            skipped: 0,
            empty: 0,
            notified: 0,
            delivery_failed: 0,
            retrieval_failed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestAlertOutcome {
    pub subscription_id: String,
    pub message: String,
    pub article_count: usize,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum Outcome {
    Empty,
    Notified,
    DeliveryFailed,
    RetrievalFailed,
}

/// Loads due subscriptions, fetches and filters articles, sends digests and
/// advances staleness timestamps.
pub struct AlertEvaluator {
    store: Arc<dyn SubscriptionStore>,
    retriever: Arc<dyn ArticleRetriever>,
    notifier: Arc<dyn Notifier>,
}

impl AlertEvaluator {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        retriever: Arc<dyn ArticleRetriever>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            retriever,
            notifier,
        }
    }

    pub async fn run_cycle(&self, cadence: Cadence) -> Result<CycleReport> {
        self.run_cycle_at(cadence, Utc::now()).await
    }

    /// One cycle as observed at `now`. Only a store failure while listing
    /// subscriptions aborts the cycle; everything per-subscription is isolated.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle_at(&self, cadence: Cadence, now: DateTime<Utc>) -> Result<CycleReport> {
        let subscriptions = self
            .store
            .list_active()
            .await
            .context("failed to load active subscriptions")?;

        let mut report = CycleReport::new(cadence);

        for sub in subscriptions.iter().filter(|s| s.cadence == cadence) {
            report.considered += 1;

            if !sub.is_eligible(now) {
                report.skipped += 1;
                continue;
            }

            match self.evaluate(sub, now).await {
                Outcome::Empty => report.empty += 1,
                Outcome::Notified => report.notified += 1,
                Outcome::DeliveryFailed => report.delivery_failed += 1,
                Outcome::RetrievalFailed => report.retrieval_failed += 1,
            }
        }

        tracing::info!(
            considered = report.considered,
            skipped = report.skipped,
            empty = report.empty,
            notified = report.notified,
            delivery_failed = report.delivery_failed,
            retrieval_failed = report.retrieval_failed,
            "Cycle finished"
        );

        Ok(report)
    }

    async fn evaluate(&self, sub: &Subscription, now: DateTime<Utc>) -> Outcome {
        let articles = match self.retriever.fetch_by_keywords(&sub.keywords).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::error!(subscription = %sub.id, error = %e, "Article retrieval failed");
                return Outcome::RetrievalFailed;
            }
        };

        let fresh = sub.within_window(articles);
        if fresh.is_empty() {
            // last_checked stays put so late-arriving articles are still caught.
            tracing::debug!(subscription = %sub.id, "No new articles");
            return Outcome::Empty;
        }

        tracing::info!(subscription = %sub.id, count = fresh.len(), "Found new articles");

        let message = digest::render(sub, &fresh);
        let outcome = match self.notifier.send(&sub.destination, &message).await {
            Ok(()) => {
                tracing::info!(subscription = %sub.id, "Sent notification");
                Outcome::Notified
            }
            Err(e) => {
                tracing::error!(subscription = %sub.id, error = %e, "Failed to send notification");
                Outcome::DeliveryFailed
            }
        };

        // Advanced even when the send failed; a failed send is not retried.
        if let Err(e) = self.store.update_last_checked(&sub.id, now).await {
            tracing::error!(subscription = %sub.id, error = %e, "Failed to update last checked time");
        }

        outcome
    }

    /// On-demand evaluation of one subscription for its owner.
    ///
    /// Ignores staleness and the time window, always sends a message and
    /// always records a history entry. Leaves `last_checked` untouched.
    #[tracing::instrument(skip(self))]
    pub async fn trigger_test_alert(
        &self,
        subscription_id: &str,
        requester: &str,
    ) -> Result<TestAlertOutcome, AlertError> {
        let sub = self
            .store
            .get(subscription_id)
            .await?
            .ok_or_else(|| AlertError::NotFound(subscription_id.to_string()))?;

        sub.authorize(requester)?;

        let articles = match self.retriever.fetch_by_keywords(&sub.keywords).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(subscription = %sub.id, error = %e, "Retrieval failed for test alert");
                Vec::new()
            }
        };

        let message = digest::render(&sub, &articles);
        let send_result = self.notifier.send(&sub.destination, &message).await;
        let error = send_result.err().map(|e| e.to_string());

        let (title, url, source) = match articles.first() {
            Some(a) => (a.title.clone(), a.url.clone(), a.source.clone()),
            None => (format!("Test Alert - {}", sub.topic), String::new(), String::new()),
        };

        self.store
            .record_delivery(DeliveryRecord {
                id: uuid::Uuid::new_v4().to_string(),
                subscription_id: sub.id.clone(),
                owner_id: sub.owner_id.clone(),
                title,
                url,
                source,
                article_count: articles.len(),
                sent_at: Utc::now(),
                success: error.is_none(),
                error: error.clone(),
            })
            .await?;

        Ok(TestAlertOutcome {
            subscription_id: sub.id,
            message,
            article_count: articles.len(),
            delivered: error.is_none(),
            error,
        })
    }
}

#[async_trait]
impl CycleRunner for AlertEvaluator {
    async fn run_cycle(&self, cadence: Cadence) -> Result<CycleReport> {
        AlertEvaluator::run_cycle(self, cadence).await
    }
}
