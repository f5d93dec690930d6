//! Cloud sync adapter.
//!
//! The adapter runs in one of two modes chosen once by [`CloudSync::initialize`]:
//! connected to a remote document store, or local fallback where every
//! operation is served from namespaced local records. The mode never changes
//! afterwards; a failing remote call is logged and reported as `false`/`None`
//! and the next call simply tries the remote again.

pub mod firestore;
pub mod watch;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::errors::SyncError;
use crate::model::{Backup, BackupSections, Channel, Customer, CustomerStatus};
use crate::state::LocalState;
use crate::storage::KeyValueStore;

pub use firestore::{FirebaseDescriptor, FirestoreRest};

pub const USERS_COLLECTION: &str = "users";
pub const APP_DATA_COLLECTION: &str = "app_data";
pub const BACKUP_DOCUMENT: &str = "main";
pub const CHANNELS_COLLECTION: &str = "channels";
/// Per-request write limit of the remote store
pub const MAX_BATCH_WRITES: usize = 500;
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Minimal document database surface the adapter needs.
/// Documents are plain JSON objects.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, SyncError>;
    /// Create or fully replace a document
    async fn set_document(&self, collection: &str, id: &str, data: &Value) -> Result<(), SyncError>;
    async fn list_documents(&self, collection: &str) -> Result<Vec<Value>, SyncError>;
    /// Write several documents in one request
    async fn batch_set(&self, collection: &str, docs: &[(String, Value)]) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Connected,
    LocalFallback,
}

impl SyncMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            SyncMode::Connected => "Cloud connected",
            SyncMode::LocalFallback => "Local only",
        }
    }
}

pub struct CloudSync<S> {
    local: LocalState<S>,
    remote: Option<Arc<dyn DocumentStore>>,
    poll_interval: std::time::Duration,
}

impl<S> Clone for CloudSync<S> {
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            remote: self.remote.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<S: KeyValueStore> CloudSync<S> {
    /// Decide the mode from a connection descriptor. A missing or invalid
    /// descriptor selects local fallback.
    pub fn initialize(descriptor: Option<&str>, local: LocalState<S>) -> Self {
        let Some(raw) = descriptor.map(str::trim).filter(|d| !d.is_empty()) else {
            tracing::info!("No cloud descriptor configured, running in local fallback mode");
            return Self::local_only(local);
        };
        match FirebaseDescriptor::parse(raw) {
            Ok(descriptor) => {
                tracing::info!(project = %descriptor.project_id, "Cloud sync initialized");
                Self::with_remote(Arc::new(FirestoreRest::new(descriptor)), local)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize cloud sync, running in local fallback mode");
                Self::local_only(local)
            }
        }
    }

    /// Initialize from the descriptor stored in the app config
    pub fn from_config(local: LocalState<S>) -> Self {
        let config = local.load_config();
        Self::initialize(config.cloud_descriptor(), local)
    }

    pub fn with_remote(remote: Arc<dyn DocumentStore>, local: LocalState<S>) -> Self {
        Self {
            local,
            remote: Some(remote),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn local_only(local: LocalState<S>) -> Self {
        Self {
            local,
            remote: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn mode(&self) -> SyncMode {
        if self.remote.is_some() {
            SyncMode::Connected
        } else {
            SyncMode::LocalFallback
        }
    }

    pub fn local(&self) -> &LocalState<S> {
        &self.local
    }

    /// Upload config, channels and movies with a fresh `updatedAt`
    pub async fn push_backup(&self) -> bool {
        match self.try_push_backup().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Cloud save failed");
                false
            }
        }
    }

    async fn try_push_backup(&self) -> Result<(), SyncError> {
        let mut backup = self.local.snapshot();
        backup.updated_at = Some(Utc::now());
        match &self.remote {
            Some(remote) => {
                let body = serde_json::to_value(&backup).map_err(|e| SyncError::Decode(e.to_string()))?;
                remote.set_document(APP_DATA_COLLECTION, BACKUP_DOCUMENT, &body).await?;
            }
            None => self.local.save_local_backup(&backup)?,
        }
        tracing::info!(
            channels = backup.channels.len(),
            movies = backup.movies.len(),
            mode = self.mode().display_name(),
            "Backup saved"
        );
        Ok(())
    }

    /// Replace local config, channels and movies with the stored backup.
    /// Each section present in the backup replaces its local counterpart; absent ones are kept.
    /// Returns false when no backup exists, it holds no section, or it cannot be read.
    pub async fn pull_backup(&self) -> bool {
        match self.try_pull_backup().await {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!("No backup found");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Cloud load failed");
                false
            }
        }
    }

    async fn try_pull_backup(&self) -> Result<bool, SyncError> {
        let backup = match &self.remote {
            Some(remote) => match remote.get_document(APP_DATA_COLLECTION, BACKUP_DOCUMENT).await? {
                Some(doc) => {
                    serde_json::from_value::<BackupSections>(doc).map_err(|e| SyncError::Decode(e.to_string()))?
                }
                None => return Ok(false),
            },
            None => match self.local.local_backup() {
                Some(backup) => backup,
                None => return Ok(false),
            },
        };
        if backup.is_empty() {
            return Ok(false);
        }
        self.local.restore(&backup)?;
        tracing::info!(
            config = backup.config.is_some(),
            channels = backup.channels.as_ref().map(Vec::len),
            movies = backup.movies.as_ref().map(Vec::len),
            "Backup restored"
        );
        Ok(true)
    }

    pub async fn fetch_customer(&self, device_id: &str) -> Option<Customer> {
        match self.try_fetch_customer(device_id).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::error!(device = device_id, error = %e, "Failed to read device record");
                None
            }
        }
    }

    async fn try_fetch_customer(&self, device_id: &str) -> Result<Option<Customer>, SyncError> {
        match &self.remote {
            Some(remote) => match remote.get_document(USERS_COLLECTION, device_id).await? {
                Some(doc) => Ok(Some(decode_customer(doc)?)),
                None => Ok(None),
            },
            None => Ok(self.local.mock_user(device_id)),
        }
    }

    async fn store_customer(&self, customer: &Customer) -> Result<(), SyncError> {
        match &self.remote {
            Some(remote) => {
                let body = serde_json::to_value(customer).map_err(|e| SyncError::Decode(e.to_string()))?;
                remote.set_document(USERS_COLLECTION, &customer.device_id, &body).await
            }
            None => Ok(self.local.save_mock_user(customer)?),
        }
    }

    /// Record that `device_id` is alive: create a pending record on first
    /// sight, otherwise refresh `lastActive`
    pub async fn register_device(&self, device_id: &str) -> Option<Customer> {
        let result = async {
            let now = Utc::now();
            let customer = match self.try_fetch_customer(device_id).await? {
                Some(mut existing) => {
                    existing.last_active = now;
                    existing
                }
                None => {
                    tracing::info!(device = device_id, "Registering new device");
                    Customer::pending(device_id, now)
                }
            };
            self.store_customer(&customer).await?;
            Ok::<_, SyncError>(customer)
        }
        .await;
        match result {
            Ok(customer) => Some(customer),
            Err(e) => {
                tracing::error!(device = device_id, error = %e, "Device registration failed");
                None
            }
        }
    }

    /// Activate `device_id` for `days` days from now
    pub async fn grant_subscription(&self, device_id: &str, days: u32) -> bool {
        let result = async {
            let now = Utc::now();
            let mut customer = self
                .try_fetch_customer(device_id)
                .await?
                .unwrap_or_else(|| Customer::pending(device_id, now));
            customer.status = CustomerStatus::Active;
            customer.subscription_end = Some(now + Duration::days(i64::from(days)));
            self.store_customer(&customer).await
        }
        .await;
        match result {
            Ok(()) => {
                tracing::info!(device = device_id, days, "Subscription granted");
                true
            }
            Err(e) => {
                tracing::error!(device = device_id, error = %e, "Granting subscription failed");
                false
            }
        }
    }

    /// Change the status of an existing record (ban, unban, expire)
    pub async fn set_status(&self, device_id: &str, status: CustomerStatus) -> bool {
        let result = async {
            match self.try_fetch_customer(device_id).await? {
                Some(mut customer) => {
                    customer.status = status;
                    self.store_customer(&customer).await.map(|_| true)
                }
                None => Ok(false),
            }
        }
        .await;
        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(device = device_id, error = %e, "Updating status failed");
                false
            }
        }
    }

    pub async fn list_customers(&self) -> Vec<Customer> {
        match self.try_list_customers().await {
            Ok(customers) => customers,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list device records");
                Vec::new()
            }
        }
    }

    async fn try_list_customers(&self) -> Result<Vec<Customer>, SyncError> {
        match &self.remote {
            Some(remote) => {
                let mut customers: Vec<Customer> = remote
                    .list_documents(USERS_COLLECTION)
                    .await?
                    .into_iter()
                    .filter_map(|doc| match decode_customer(doc) {
                        Ok(c) => Some(c),
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping malformed device record");
                            None
                        }
                    })
                    .collect();
                customers.sort_by(|a, b| a.device_id.cmp(&b.device_id));
                Ok(customers)
            }
            None => Ok(self.local.mock_users()),
        }
    }

    /// Batch-upload imported channels. At most [`MAX_BATCH_WRITES`] are sent
    /// per call; callers with more must chunk.
    pub async fn upload_channels(&self, channels: &[Channel]) -> bool {
        if channels.len() > MAX_BATCH_WRITES {
            tracing::warn!(
                requested = channels.len(),
                limit = MAX_BATCH_WRITES,
                "Channel upload truncated to batch limit"
            );
        }
        let batch = &channels[..channels.len().min(MAX_BATCH_WRITES)];
        let result = async {
            match &self.remote {
                Some(remote) => {
                    let docs = batch
                        .iter()
                        .map(|c| {
                            serde_json::to_value(c)
                                .map(|v| (c.id.clone(), v))
                                .map_err(|e| SyncError::Decode(e.to_string()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    remote.batch_set(CHANNELS_COLLECTION, &docs).await
                }
                None => {
                    let mut stored = self.local.cloud_channels();
                    for channel in batch {
                        match stored.iter_mut().find(|c| c.id == channel.id) {
                            Some(existing) => *existing = channel.clone(),
                            None => stored.push(channel.clone()),
                        }
                    }
                    Ok(self.local.save_cloud_channels(&stored)?)
                }
            }
        }
        .await;
        match result {
            Ok(()) => {
                tracing::info!(count = batch.len(), "Uploaded channels");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Channel upload failed");
                false
            }
        }
    }
}

impl<S: KeyValueStore + watch::MaybeSend + watch::MaybeSync + 'static> CloudSync<S> {
    /// Follow one device record. Polls every poll interval in both modes.
    pub fn watch_device(&self, device_id: &str) -> watch::Watch<Option<Customer>> {
        let sync = self.clone();
        let device_id = device_id.to_string();
        watch::spawn_poll(self.poll_interval, move || {
            let sync = sync.clone();
            let device_id = device_id.clone();
            async move { sync.try_fetch_customer(&device_id).await.ok() }
        })
    }

    /// Follow the whole device collection
    pub fn watch_customers(&self) -> watch::Watch<Vec<Customer>> {
        let sync = self.clone();
        watch::spawn_poll(self.poll_interval, move || {
            let sync = sync.clone();
            async move { sync.try_list_customers().await.ok() }
        })
    }
}

fn decode_customer(doc: Value) -> Result<Customer, SyncError> {
    serde_json::from_value(doc).map_err(|e| SyncError::Decode(e.to_string()))
}
