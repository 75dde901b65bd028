use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::error::AlertError;
use super::store::SubscriptionStore;
use super::{DeliveryRecord, Subscription, SubscriptionUpdate};

pub const MAX_HISTORY_PER_SUBSCRIPTION: usize = 100;

/// JSON-on-disk subscription store, fully loaded into memory at start-up.
///
/// Layout under `base_dir`:
/// - `subscriptions/<id>.json`
/// - `history/<subscription id>.json` (array, oldest first)
pub struct FileSubscriptionStore {
    base_dir: PathBuf,
    subscriptions: RwLock<HashMap<String, Subscription>>,
    history: RwLock<HashMap<String, VecDeque<DeliveryRecord>>>,
}

impl FileSubscriptionStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            subscriptions: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    fn subscriptions_dir(&self) -> PathBuf {
        self.base_dir.join("subscriptions")
    }

    fn history_dir(&self) -> PathBuf {
        self.base_dir.join("history")
    }

    fn subscription_path(&self, id: &str) -> PathBuf {
        self.subscriptions_dir().join(format!("{id}.json"))
    }

    pub async fn load_all(&self) -> Result<()> {
        let mut subscriptions = HashMap::new();
        for (path, sub) in read_json_dir::<Subscription>(&self.subscriptions_dir())? {
            if sub.keywords.is_empty() {
                tracing::warn!(path = %path.display(), "Skipping subscription without keywords");
                continue;
            }
            subscriptions.insert(sub.id.clone(), sub);
        }

        let mut history = HashMap::new();
        for (path, records) in read_json_dir::<VecDeque<DeliveryRecord>>(&self.history_dir())? {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            history.insert(id.to_string(), records);
        }

        tracing::info!(
            subscriptions = subscriptions.len(),
            histories = history.len(),
            dir = %self.base_dir.display(),
            "Loaded subscription store"
        );

        *self.subscriptions.write().await = subscriptions;
        *self.history.write().await = history;
        Ok(())
    }

    pub async fn save(&self, subscription: Subscription) -> Result<()> {
        if subscription.keywords.is_empty() {
            bail!("subscription {} has no keywords", subscription.id);
        }
        write_json_atomic(&self.subscription_path(&subscription.id), &subscription)?;
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription);
        Ok(())
    }

    pub async fn list_all(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.values().cloned().collect()
    }

    /// Apply an owner's edit. Keywords may change but never become empty.
    pub async fn update(
        &self,
        id: &str,
        requester: &str,
        changes: SubscriptionUpdate,
    ) -> Result<Subscription, AlertError> {
        let mut subscriptions = self.subscriptions.write().await;
        let sub = subscriptions
            .get_mut(id)
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?;
        sub.authorize(requester)?;

        let mut updated = sub.clone();
        changes.apply(&mut updated);
        if updated.keywords.is_empty() {
            return Err(anyhow!("subscription {id} has no keywords").into());
        }

        write_json_atomic(&self.subscription_path(id), &updated)?;
        *sub = updated.clone();
        tracing::info!(id, active = updated.active, cadence = %updated.cadence, "Updated subscription");
        Ok(updated)
    }

    /// Remove an owner's subscription. Its delivery history is kept.
    pub async fn delete(&self, id: &str, requester: &str) -> Result<Subscription, AlertError> {
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions
            .get(id)
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?
            .authorize(requester)?;

        let path = self.subscription_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to remove {}", path.display()))
                    .into());
            }
        }

        let removed = subscriptions
            .remove(id)
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?;
        tracing::info!(id, "Deleted subscription");
        Ok(removed)
    }
}

#[async_trait]
impl SubscriptionStore for FileSubscriptionStore {
    async fn list_active(&self) -> Result<Vec<Subscription>> {
        let mut active: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn get(&self, id: &str) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }

    async fn update_last_checked(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(sub) = subscriptions.get_mut(id) else {
            bail!("subscription {id} not found");
        };

        if sub.last_checked.is_some_and(|current| current >= at) {
            return Ok(());
        }

        let mut updated = sub.clone();
        updated.last_checked = Some(at);
        write_json_atomic(&self.subscription_path(id), &updated)?;
        *sub = updated;
        Ok(())
    }

    async fn record_delivery(&self, record: DeliveryRecord) -> Result<()> {
        let mut history = self.history.write().await;
        let queue = history.entry(record.subscription_id.clone()).or_default();
        queue.push_back(record.clone());
        while queue.len() > MAX_HISTORY_PER_SUBSCRIPTION {
            queue.pop_front();
        }

        let path = self
            .history_dir()
            .join(format!("{}.json", record.subscription_id));
        write_json_atomic(&path, &*queue)
    }

    async fn history_for_owner(&self, owner_id: &str, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let history = self.history.read().await;
        let mut records: Vec<DeliveryRecord> = history
            .values()
            .flatten()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        records.truncate(limit);
        Ok(records)
    }
}

fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;

    let mut loaded = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: T = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        loaded.push((path, value));
    }
    Ok(loaded)
}

/// Write through a sibling temp file and rename so readers never see a torn record.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("no parent directory for {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    let content = serde_json::to_string_pretty(value).context("failed to serialize record")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Cadence;
    use chrono::Duration;
    use tempfile::tempdir;

    fn subscription(owner: &str, topic: &str) -> Subscription {
        Subscription::new(owner, "+15550001111", topic, vec!["rust".into()], Cadence::Hourly)
    }

    fn record(sub: &Subscription, title: &str, sent_at: DateTime<Utc>) -> DeliveryRecord {
        DeliveryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            subscription_id: sub.id.clone(),
            owner_id: sub.owner_id.clone(),
            title: title.to_string(),
            url: "https://example.com".to_string(),
            source: "Example".to_string(),
            article_count: 1,
            sent_at,
            success: true,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        store.load_all().await.unwrap();

        let sub = subscription("u1", "Rust");
        store.save(sub.clone()).await.unwrap();

        let store2 = FileSubscriptionStore::new(dir.path().to_path_buf());
        store2.load_all().await.unwrap();
        assert_eq!(store2.get(&sub.id).await.unwrap(), Some(sub));

        let leftovers = std::fs::read_dir(dir.path().join("subscriptions"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_list_active_excludes_inactive() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());

        let active = subscription("u1", "On");
        let mut inactive = subscription("u1", "Off");
        inactive.active = false;
        store.save(active.clone()).await.unwrap();
        store.save(inactive).await.unwrap();

        let listed = store.list_active().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active.id);
        assert_eq!(store.list_all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_keywords() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let mut sub = subscription("u1", "Empty");
        sub.keywords.clear();
        assert!(store.save(sub).await.is_err());
    }

    #[tokio::test]
    async fn test_update_last_checked_is_monotonic_and_persisted() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let sub = subscription("u1", "Rust");
        store.save(sub.clone()).await.unwrap();

        let t1 = Utc::now();
        store.update_last_checked(&sub.id, t1).await.unwrap();
        store
            .update_last_checked(&sub.id, t1 - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.get(&sub.id).await.unwrap().unwrap().last_checked, Some(t1));

        let reloaded = FileSubscriptionStore::new(dir.path().to_path_buf());
        reloaded.load_all().await.unwrap();
        assert_eq!(
            reloaded.get(&sub.id).await.unwrap().unwrap().last_checked,
            Some(t1)
        );
    }

    #[tokio::test]
    async fn test_update_toggles_active_and_persists() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let sub = subscription("u1", "Rust");
        store.save(sub.clone()).await.unwrap();

        let updated = store
            .update(
                &sub.id,
                "u1",
                SubscriptionUpdate {
                    active: Some(false),
                    cadence: Some(Cadence::Daily),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.active);
        assert_eq!(updated.cadence, Cadence::Daily);
        assert!(store.list_active().await.unwrap().is_empty());

        let reloaded = FileSubscriptionStore::new(dir.path().to_path_buf());
        reloaded.load_all().await.unwrap();
        let stored = reloaded.get(&sub.id).await.unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.keywords, vec!["rust"]);
    }

    #[tokio::test]
    async fn test_update_checks_owner_and_keywords() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let sub = subscription("u1", "Rust");
        store.save(sub.clone()).await.unwrap();

        let err = store
            .update("missing", "u1", SubscriptionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::NotFound(_)));

        let pause = SubscriptionUpdate {
            active: Some(false),
            ..Default::default()
        };
        let err = store.update(&sub.id, "u2", pause).await.unwrap_err();
        assert!(matches!(err, AlertError::Unauthorized { .. }));

        let clear = SubscriptionUpdate {
            keywords: Some(Vec::new()),
            ..Default::default()
        };
        let err = store.update(&sub.id, "u1", clear).await.unwrap_err();
        assert!(matches!(err, AlertError::Store(_)));

        assert_eq!(store.get(&sub.id).await.unwrap(), Some(sub));
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_keeps_history() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let sub = subscription("u1", "Rust");
        store.save(sub.clone()).await.unwrap();
        store
            .record_delivery(record(&sub, "sent", Utc::now()))
            .await
            .unwrap();

        let err = store.delete(&sub.id, "u2").await.unwrap_err();
        assert!(matches!(err, AlertError::Unauthorized { .. }));
        assert!(store.get(&sub.id).await.unwrap().is_some());

        let removed = store.delete(&sub.id, "u1").await.unwrap();
        assert_eq!(removed.id, sub.id);
        assert!(store.get(&sub.id).await.unwrap().is_none());
        assert!(!store.subscription_path(&sub.id).exists());

        let err = store.delete(&sub.id, "u1").await.unwrap_err();
        assert!(matches!(err, AlertError::NotFound(_)));

        let reloaded = FileSubscriptionStore::new(dir.path().to_path_buf());
        reloaded.load_all().await.unwrap();
        assert!(reloaded.list_all().await.is_empty());
        assert_eq!(reloaded.history_for_owner("u1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_last_checked_unknown_id() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        assert!(store.update_last_checked("missing", Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_history_for_owner_newest_first() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let mine = subscription("u1", "Mine");
        let theirs = subscription("u2", "Theirs");
        let now = Utc::now();

        store.record_delivery(record(&mine, "old", now - Duration::hours(2))).await.unwrap();
        store.record_delivery(record(&theirs, "other", now)).await.unwrap();
        store.record_delivery(record(&mine, "new", now)).await.unwrap();

        let history = store.history_for_owner("u1", 10).await.unwrap();
        let titles: Vec<_> = history.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);

        assert_eq!(store.history_for_owner("u1", 1).await.unwrap().len(), 1);

        let reloaded = FileSubscriptionStore::new(dir.path().to_path_buf());
        reloaded.load_all().await.unwrap();
        assert_eq!(reloaded.history_for_owner("u1", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_history_cap() {
        let dir = tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().to_path_buf());
        let sub = subscription("u1", "Busy");
        let now = Utc::now();
        for i in 0..120 {
            store
                .record_delivery(record(&sub, &format!("r{i}"), now + Duration::seconds(i)))
                .await
                .unwrap();
        }
        let history = store.history_for_owner("u1", 1000).await.unwrap();
        assert_eq!(history.len(), MAX_HISTORY_PER_SUBSCRIPTION);
        assert_eq!(history[0].title, "r119");
    }
}
