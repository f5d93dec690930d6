//! Remote-URL sync and JSON export.

use serde::Serialize;

use crate::errors::{StoreError, SyncError};
use crate::model::{Channel, Movie, RemotePayload};
use crate::config::AppConfig;
use crate::state::LocalState;
use crate::storage::KeyValueStore;

/// Export shape: the backup document without `updatedAt`
#[derive(Debug, Serialize)]
struct ExportDocument {
    config: AppConfig,
    channels: Vec<Channel>,
    movies: Vec<Movie>,
}

/// Merge a remote payload into local state: `config` overrides only the
/// fields it carries, channels and movies replace the local lists.
pub fn apply_remote_payload<S: KeyValueStore>(
    state: &LocalState<S>,
    payload: &RemotePayload,
) -> Result<(), StoreError> {
    if let Some(patch) = &payload.config {
        let merged = state.load_config().merged_with(patch);
        state.save_config(&merged)?;
    }
    if let Some(channels) = &payload.channels {
        state.save_channels(channels)?;
    }
    if let Some(movies) = &payload.movies {
        state.save_movies(movies)?;
    }
    Ok(())
}

async fn fetch_payload(url: &str) -> Result<RemotePayload, SyncError> {
    let response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::ServerError(status.as_u16(), "Failed to fetch".to_string()));
    }
    Ok(response.json::<RemotePayload>().await?)
}

/// Pull `{config, channels, movies}` from `url` into local state
pub async fn fetch_remote_database<S: KeyValueStore>(state: &LocalState<S>, url: &str) -> bool {
    let result = async {
        let payload = fetch_payload(url).await?;
        apply_remote_payload(state, &payload)?;
        Ok::<_, SyncError>(payload)
    }
    .await;
    match result {
        Ok(payload) => {
            tracing::info!(
                url,
                config = payload.config.is_some(),
                channels = payload.channels.as_ref().map(Vec::len),
                movies = payload.movies.as_ref().map(Vec::len),
                "Synced from remote URL"
            );
            true
        }
        Err(e) => {
            tracing::error!(url, error = %e, "Sync failed");
            false
        }
    }
}

/// Pretty JSON of config, channels and movies
pub fn export_database<S: KeyValueStore>(state: &LocalState<S>) -> Result<String, StoreError> {
    let snapshot = state.snapshot();
    let doc = ExportDocument {
        config: snapshot.config,
        channels: snapshot.channels,
        movies: snapshot.movies,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn export_file_name(now_millis: i64) -> String {
    format!("streamgenius_backup_{}.json", now_millis)
}

/// Write an export into `dir`; returns the file path
#[cfg(not(target_arch = "wasm32"))]
pub fn export_to_file<S: KeyValueStore>(
    state: &LocalState<S>,
    dir: &std::path::Path,
) -> Result<std::path::PathBuf, StoreError> {
    let json = export_database(state)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(chrono::Utc::now().timestamp_millis()));
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "Exported database");
    Ok(path)
}
