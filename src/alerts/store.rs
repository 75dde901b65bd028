use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DeliveryRecord, Subscription};

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    // Subscriptions
    async fn list_active(&self) -> Result<Vec<Subscription>>;
    async fn get(&self, id: &str) -> Result<Option<Subscription>>;
    /// Must never move an existing timestamp backwards.
    async fn update_last_checked(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    // Delivery history
    async fn record_delivery(&self, record: DeliveryRecord) -> Result<()>;
    async fn history_for_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<DeliveryRecord>>;
}
