//! Typed access to the persisted application state.
//!
//! Each entity lives as a JSON blob under a fixed key. Reads never fail:
//! an absent, unreadable or malformed blob yields the built-in default.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::activation::{self, SubscriptionStatus};
use crate::config::AppConfig;
use crate::errors::StoreError;
use crate::history::push_history;
use crate::model::{demo_channels, demo_movies, Backup, BackupSections, Channel, Customer, HistoryItem, Movie};
use crate::storage::KeyValueStore;

pub const CONFIG_KEY: &str = "streamgenius_config";
pub const CHANNELS_KEY: &str = "streamgenius_channels";
pub const MOVIES_KEY: &str = "streamgenius_movies";
pub const AUTH_KEY: &str = "streamgenius_auth";
pub const DEVICE_ID_KEY: &str = "streamgenius_device_id";
pub const LAST_WATCHED_KEY: &str = "streamgenius_last_watched";
pub const HISTORY_KEY: &str = "streamgenius_history";
pub const CLOUD_BACKUP_KEY: &str = "streamgenius_cloud_backup";
pub const CLOUD_CHANNELS_KEY: &str = "streamgenius_cloud_channels";
pub const MOCK_USER_PREFIX: &str = "streamgenius_mock_user_";

/// Handle over a shared key-value store
pub struct LocalState<S> {
    store: Arc<S>,
}

impl<S> Clone for LocalState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> LocalState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage read failed, using default");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Malformed stored value, using default");
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.store.set_item(key, &json)
    }

    pub fn load_config(&self) -> AppConfig {
        self.read_json(CONFIG_KEY).unwrap_or_default()
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<(), StoreError> {
        self.write_json(CONFIG_KEY, config)
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.read_json(CHANNELS_KEY).unwrap_or_else(demo_channels)
    }

    pub fn save_channels(&self, channels: &[Channel]) -> Result<(), StoreError> {
        self.write_json(CHANNELS_KEY, channels)
    }

    pub fn movies(&self) -> Vec<Movie> {
        self.read_json(MOVIES_KEY).unwrap_or_else(demo_movies)
    }

    pub fn save_movies(&self, movies: &[Movie]) -> Result<(), StoreError> {
        self.write_json(MOVIES_KEY, movies)
    }

    /// Identifier of this profile, generated and persisted on first use
    pub fn device_id(&self) -> String {
        if let Ok(Some(id)) = self.store.get_item(DEVICE_ID_KEY) {
            if !id.trim().is_empty() {
                return id;
            }
        }
        let id = activation::generate_device_id();
        if let Err(e) = self.store.set_item(DEVICE_ID_KEY, &id) {
            tracing::warn!(error = %e, "Could not persist device id");
        }
        id
    }

    /// Stored raw, not as JSON
    pub fn last_watched(&self) -> Option<String> {
        self.store.get_item(LAST_WATCHED_KEY).ok().flatten()
    }

    pub fn save_last_watched(&self, id: &str) -> Result<(), StoreError> {
        self.store.set_item(LAST_WATCHED_KEY, id)
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        self.read_json(HISTORY_KEY).unwrap_or_default()
    }

    pub fn add_to_history(&self, item: HistoryItem) -> Result<Vec<HistoryItem>, StoreError> {
        let mut history = self.history();
        push_history(&mut history, item);
        self.write_json(HISTORY_KEY, &history)?;
        Ok(history)
    }

    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.subscription_status_at(Utc::now())
    }

    pub fn subscription_status_at(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        let expiry = self
            .store
            .get_item(AUTH_KEY)
            .ok()
            .flatten()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
            .map(|d| d.with_timezone(&Utc));
        SubscriptionStatus::at(expiry, now)
    }

    /// Unlock `months` of subscription from now; returns the new expiry
    pub fn activate_subscription(&self, months: u32) -> Result<DateTime<Utc>, StoreError> {
        let expiry = activation::expiry_after(Utc::now(), months);
        self.store.set_item(AUTH_KEY, &expiry.to_rfc3339())?;
        tracing::info!(months, expiry = %expiry, "Subscription activated");
        Ok(expiry)
    }

    /// Validate `code` against this device and activate on success
    pub fn redeem_code(&self, code: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let device = self.device_id();
        match activation::validate(code, &device) {
            activation::Validation { valid: true, months: Some(months) } => {
                self.activate_subscription(months).map(Some)
            }
            _ => {
                tracing::info!(device = %device, "Rejected activation code");
                Ok(None)
            }
        }
    }

    pub fn snapshot(&self) -> Backup {
        Backup {
            config: self.load_config(),
            channels: self.channels(),
            movies: self.movies(),
            updated_at: None,
        }
    }

    /// Overwrite each section present in `backup` wholesale; absent sections are kept
    pub fn restore(&self, backup: &BackupSections) -> Result<(), StoreError> {
        if let Some(config) = &backup.config {
            self.save_config(config)?;
        }
        if let Some(channels) = &backup.channels {
            self.save_channels(channels)?;
        }
        if let Some(movies) = &backup.movies {
            self.save_movies(movies)?;
        }
        Ok(())
    }

    pub fn mock_user(&self, device_id: &str) -> Option<Customer> {
        self.read_json(&format!("{}{}", MOCK_USER_PREFIX, device_id))
    }

    pub fn save_mock_user(&self, customer: &Customer) -> Result<(), StoreError> {
        self.write_json(&format!("{}{}", MOCK_USER_PREFIX, customer.device_id), customer)
    }

    /// All mock user records, ordered by device id
    pub fn mock_users(&self) -> Vec<Customer> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list storage keys");
                return Vec::new();
            }
        };
        let mut users: Vec<Customer> = keys
            .iter()
            .filter(|k| k.starts_with(MOCK_USER_PREFIX))
            .filter_map(|k| self.read_json(k))
            .collect();
        users.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        users
    }

    pub fn local_backup(&self) -> Option<BackupSections> {
        self.read_json(CLOUD_BACKUP_KEY)
    }

    pub fn save_local_backup(&self, backup: &Backup) -> Result<(), StoreError> {
        self.write_json(CLOUD_BACKUP_KEY, backup)
    }

    /// Channels uploaded while cloud sync runs in local fallback mode
    pub fn cloud_channels(&self) -> Vec<Channel> {
        self.read_json(CLOUD_CHANNELS_KEY).unwrap_or_default()
    }

    pub fn save_cloud_channels(&self, channels: &[Channel]) -> Result<(), StoreError> {
        self.write_json(CLOUD_CHANNELS_KEY, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeId;
    use crate::model::HistoryKind;
    use crate::storage::MemoryStore;

    #[test]
    fn test_defaults_without_entries() {
        let state = LocalState::new(MemoryStore::new());
        assert_eq!(state.load_config(), AppConfig::default());
        assert_eq!(state.channels(), demo_channels());
        assert_eq!(state.movies(), demo_movies());
        assert!(state.history().is_empty());
        assert_eq!(state.last_watched(), None);
        assert!(!state.subscription_status().active);
    }

    #[test]
    fn test_config_round_trip() {
        let state = LocalState::new(MemoryStore::new());
        let mut config = AppConfig::default();
        config.app_name = "Kurd24".into();
        config.theme = ThemeId::Nawroz;
        config.require_subscription = false;
        state.save_config(&config).unwrap();
        assert_eq!(state.load_config(), config);
    }

    #[test]
    fn test_malformed_blob_falls_back() {
        let state = LocalState::new(MemoryStore::new());
        state.store().set_item(CONFIG_KEY, "{oops").unwrap();
        state.store().set_item(CHANNELS_KEY, "[1,2]").unwrap();
        assert_eq!(state.load_config(), AppConfig::default());
        assert_eq!(state.channels(), demo_channels());
    }

    #[test]
    fn test_device_id_is_stable() {
        let state = LocalState::new(MemoryStore::new());
        let first = state.device_id();
        assert_eq!(state.device_id(), first);
    }

    #[test]
    fn test_history_persisted() {
        let state = LocalState::new(MemoryStore::new());
        let channel = demo_channels().remove(0);
        state.add_to_history(HistoryItem::from_channel(&channel)).unwrap();
        state.add_to_history(HistoryItem::from_channel(&channel)).unwrap();
        let history = state.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, HistoryKind::Channel);
    }

    #[test]
    fn test_redeem_code_activates() {
        let state = LocalState::new(MemoryStore::new());
        let code = activation::generate(&state.device_id(), 6).unwrap();
        assert!(state.redeem_code("6-000000").unwrap().is_none());
        let expiry = state.redeem_code(&code).unwrap();
        assert!(expiry.is_some());
        assert!(state.subscription_status().active);
    }

    #[test]
    fn test_mock_users_listed() {
        let state = LocalState::new(MemoryStore::new());
        let now = Utc::now();
        state.save_mock_user(&Customer::pending("ZZZ", now)).unwrap();
        state.save_mock_user(&Customer::pending("AAA", now)).unwrap();
        let users = state.mock_users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].device_id, "AAA");
    }
}
