use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use streamgenius_lib::config::ThemeId;
use streamgenius_lib::errors::SyncError;
use streamgenius_lib::model::{demo_channels, demo_movies, Channel, CustomerStatus};
use streamgenius_lib::state::{LocalState, CLOUD_BACKUP_KEY};
use streamgenius_lib::storage::{KeyValueStore, MemoryStore};
use streamgenius_lib::sync::{CloudSync, DocumentStore, SyncMode, MAX_BATCH_WRITES};

/// In-memory document database; can be switched to fail every call
#[derive(Default)]
struct FakeDocuments {
    docs: Mutex<BTreeMap<(String, String), Value>>,
    batches: Mutex<Vec<usize>>,
    offline: AtomicBool,
}

impl FakeDocuments {
    fn check(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("offline".into()));
        }
        Ok(())
    }

    fn count(&self, collection: &str) -> usize {
        self.docs.lock().unwrap().keys().filter(|(c, _)| c == collection).count()
    }
}

#[async_trait]
impl DocumentStore for FakeDocuments {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, SyncError> {
        self.check()?;
        Ok(self.docs.lock().unwrap().get(&(collection.to_string(), id.to_string())).cloned())
    }

    async fn set_document(&self, collection: &str, id: &str, data: &Value) -> Result<(), SyncError> {
        self.check()?;
        self.docs
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), data.clone());
        Ok(())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Value>, SyncError> {
        self.check()?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn batch_set(&self, collection: &str, docs: &[(String, Value)]) -> Result<(), SyncError> {
        self.check()?;
        self.batches.lock().unwrap().push(docs.len());
        let mut stored = self.docs.lock().unwrap();
        for (id, doc) in docs {
            stored.insert((collection.to_string(), id.clone()), doc.clone());
        }
        Ok(())
    }
}

fn channels(n: usize) -> Vec<Channel> {
    (0..n)
        .map(|i| Channel {
            id: format!("c{}", i),
            name: format!("Channel {}", i),
            group: "Bulk".into(),
            logo: String::new(),
            url: format!("http://x/{}.m3u8", i),
        })
        .collect()
}

#[tokio::test]
async fn test_fallback_backup_round_trip() {
    let local = LocalState::new(MemoryStore::new());
    let sync = CloudSync::initialize(None, local.clone());
    assert_eq!(sync.mode(), SyncMode::LocalFallback);

    assert!(!sync.pull_backup().await, "nothing saved yet");

    let mut config = local.load_config();
    config.theme = ThemeId::Goat;
    local.save_config(&config).unwrap();
    assert!(sync.push_backup().await);
    assert!(local.local_backup().unwrap().updated_at.is_some());

    config.theme = ThemeId::Sport;
    local.save_config(&config).unwrap();
    local.save_channels(&[]).unwrap();

    assert!(sync.pull_backup().await);
    assert_eq!(local.load_config().theme, ThemeId::Goat);
    assert_eq!(local.channels().len(), demo_channels().len());
}

#[tokio::test]
async fn test_partial_local_backup_restores_present_sections() {
    let local = LocalState::new(MemoryStore::new());
    local
        .store()
        .set_item(CLOUD_BACKUP_KEY, r#"{"config":{"appName":"Kurd24"},"channels":[]}"#)
        .unwrap();
    let sync = CloudSync::local_only(local.clone());

    assert!(sync.pull_backup().await);
    assert_eq!(local.load_config().app_name, "Kurd24");
    assert!(local.channels().is_empty());
    assert_eq!(local.movies(), demo_movies());
}

#[tokio::test]
async fn test_partial_remote_backup_replaces_config_wholesale() {
    let remote = Arc::new(FakeDocuments::default());
    let local = LocalState::new(MemoryStore::new());
    let mut config = local.load_config();
    config.theme = ThemeId::Sport;
    local.save_config(&config).unwrap();

    remote
        .set_document("app_data", "main", &serde_json::json!({ "config": { "appName": "Kurd24" } }))
        .await
        .unwrap();
    let sync = CloudSync::with_remote(remote.clone(), local.clone());
    assert!(sync.pull_backup().await);

    let restored = local.load_config();
    assert_eq!(restored.app_name, "Kurd24");
    // no merge: unspecified fields fall back to defaults
    assert_eq!(restored.theme, ThemeId::default());
    assert_eq!(local.channels(), demo_channels());

    remote.set_document("app_data", "main", &serde_json::json!({})).await.unwrap();
    assert!(!sync.pull_backup().await);
}

#[tokio::test]
async fn test_fallback_device_records() {
    let local = LocalState::new(MemoryStore::new());
    let sync = CloudSync::local_only(local.clone());

    let first = sync.register_device("DEV00001").await.unwrap();
    assert_eq!(first.status, CustomerStatus::Pending);
    let again = sync.register_device("DEV00001").await.unwrap();
    assert_eq!(again.created_at, first.created_at);
    assert!(again.last_active >= first.last_active);

    assert!(sync.grant_subscription("DEV00001", 30).await);
    let granted = sync.fetch_customer("DEV00001").await.unwrap();
    assert_eq!(granted.status, CustomerStatus::Active);
    let days = (granted.subscription_end.unwrap() - chrono::Utc::now()).num_days();
    assert!((29..=30).contains(&days));

    assert!(sync.set_status("DEV00001", CustomerStatus::Banned).await);
    assert!(!sync.set_status("UNKNOWN1", CustomerStatus::Banned).await);

    sync.register_device("DEV00002").await.unwrap();
    let all = sync.list_customers().await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].status, CustomerStatus::Banned);
}

#[tokio::test]
async fn test_fallback_channel_upload_upserts() {
    let local = LocalState::new(MemoryStore::new());
    let sync = CloudSync::local_only(local.clone());
    assert!(sync.upload_channels(&channels(3)).await);
    let mut renamed = channels(1);
    renamed[0].name = "Renamed".into();
    assert!(sync.upload_channels(&renamed).await);

    let stored = local.cloud_channels();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[0].name, "Renamed");
}

#[tokio::test]
async fn test_connected_operations_use_remote() {
    let remote = Arc::new(FakeDocuments::default());
    let local = LocalState::new(MemoryStore::new());
    let sync = CloudSync::with_remote(remote.clone(), local.clone());
    assert_eq!(sync.mode(), SyncMode::Connected);

    assert!(sync.push_backup().await);
    assert_eq!(remote.count("app_data"), 1);
    assert!(local.local_backup().is_none());

    sync.register_device("REMOTE01").await.unwrap();
    assert!(sync.grant_subscription("REMOTE01", 7).await);
    let customer = sync.fetch_customer("REMOTE01").await.unwrap();
    assert_eq!(customer.status, CustomerStatus::Active);
    assert!(local.mock_user("REMOTE01").is_none());
}

#[tokio::test]
async fn test_upload_capped_at_batch_limit() {
    let remote = Arc::new(FakeDocuments::default());
    let sync = CloudSync::with_remote(remote.clone(), LocalState::new(MemoryStore::new()));
    assert!(sync.upload_channels(&channels(MAX_BATCH_WRITES + 20)).await);
    assert_eq!(*remote.batches.lock().unwrap(), vec![MAX_BATCH_WRITES]);
    assert_eq!(remote.count("channels"), MAX_BATCH_WRITES);
}

#[tokio::test]
async fn test_remote_failure_reports_false_and_keeps_mode() {
    let remote = Arc::new(FakeDocuments::default());
    let local = LocalState::new(MemoryStore::new());
    let sync = CloudSync::with_remote(remote.clone(), local.clone());

    remote.offline.store(true, Ordering::SeqCst);
    assert!(!sync.push_backup().await);
    assert!(!sync.pull_backup().await);
    assert!(!sync.grant_subscription("X", 1).await);
    assert!(sync.register_device("X").await.is_none());
    assert!(sync.list_customers().await.is_empty());
    assert_eq!(sync.mode(), SyncMode::Connected);
    // no silent switch to local records
    assert!(local.local_backup().is_none());

    remote.offline.store(false, Ordering::SeqCst);
    assert!(sync.push_backup().await);
}

#[tokio::test]
async fn test_fallback_watch_sees_change_within_interval() {
    let local = LocalState::new(MemoryStore::new());
    let interval = Duration::from_millis(50);
    let sync = CloudSync::local_only(local).with_poll_interval(interval);
    sync.register_device("WATCH001").await.unwrap();

    let mut watch = sync.watch_device("WATCH001");
    assert!(sync.grant_subscription("WATCH001", 10).await);

    let seen = tokio::time::timeout(interval * 4, async {
        loop {
            if watch.current().map(|c| c.status) == Some(CustomerStatus::Active) {
                return true;
            }
            if !watch.changed().await {
                return false;
            }
        }
    })
    .await;
    assert_eq!(seen, Ok(true));
}

#[tokio::test]
async fn test_connected_watch_lists_customers() {
    let remote = Arc::new(FakeDocuments::default());
    let sync = CloudSync::with_remote(remote, LocalState::new(MemoryStore::new()))
        .with_poll_interval(Duration::from_millis(20));
    let mut watch = sync.watch_customers();
    sync.register_device("A0000001").await.unwrap();
    sync.register_device("B0000002").await.unwrap();

    let count = tokio::time::timeout(Duration::from_secs(2), async {
        while watch.current().len() < 2 {
            if !watch.changed().await {
                break;
            }
        }
        watch.current().len()
    })
    .await
    .unwrap();
    assert_eq!(count, 2);
    watch.cancel();
}
