use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub logo: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Movie,
    Series,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Movie {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub poster: String,
    #[serde(default)]
    pub backdrop: String,
    pub url: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub rating: String,
    #[serde(default, rename = "type")]
    pub content_type: ContentType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Channel,
    Movie,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub title: String,
    #[serde(default)]
    pub image: String,
    pub url: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl HistoryItem {
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            id: channel.id.clone(),
            kind: HistoryKind::Channel,
            title: channel.name.clone(),
            image: channel.logo.clone(),
            url: channel.url.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn from_movie(movie: &Movie) -> Self {
        Self {
            id: movie.id.clone(),
            kind: HistoryKind::Movie,
            title: movie.title.clone(),
            image: movie.poster.clone(),
            url: movie.url.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerStatus {
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "expired")]
    Expired,
    #[default]
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "banned")]
    Banned,
}

impl CustomerStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "Active",
            CustomerStatus::Expired => "Expired",
            CustomerStatus::Pending => "Pending",
            CustomerStatus::Banned => "Banned",
        }
    }
}

/// Per-device subscription record.
/// Timestamps serialize as RFC 3339 strings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub device_id: String,
    #[serde(default)]
    pub status: CustomerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_end: Option<DateTime<Utc>>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Customer {
    /// A device seen for the first time
    pub fn pending(device_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.to_string(),
            status: CustomerStatus::Pending,
            subscription_end: None,
            last_active: now,
            created_at: now,
            name: None,
            location: None,
        }
    }

    /// Status as it should be shown at `now`: an active record past its end is expired
    pub fn effective_status(&self, now: DateTime<Utc>) -> CustomerStatus {
        match (self.status, self.subscription_end) {
            (CustomerStatus::Active, Some(end)) if end < now => CustomerStatus::Expired,
            (status, _) => status,
        }
    }
}

/// Full local state as pushed to, and pulled from, a remote document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub config: AppConfig,
    pub channels: Vec<Channel>,
    pub movies: Vec<Movie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A pulled backup document. Sections missing from the document are left alone on restore.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSections {
    #[serde(default)]
    pub config: Option<AppConfig>,
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
    #[serde(default)]
    pub movies: Option<Vec<Movie>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BackupSections {
    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.channels.is_none() && self.movies.is_none()
    }
}

impl From<Backup> for BackupSections {
    fn from(backup: Backup) -> Self {
        Self {
            config: Some(backup.config),
            channels: Some(backup.channels),
            movies: Some(backup.movies),
            updated_at: backup.updated_at,
        }
    }
}

/// Payload served by a remote sync URL; every section is optional
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RemotePayload {
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
    #[serde(default)]
    pub movies: Option<Vec<Movie>>,
}

pub fn demo_channels() -> Vec<Channel> {
    let local = "ئاسمانی و ناوخۆیی";
    vec![
        Channel {
            id: "zarok".into(),
            name: "زارۆک".into(),
            group: local.into(),
            logo: "https://upload.wikimedia.org/wikipedia/commons/thumb/6/6b/Zarok_TV_logo.png/640px-Zarok_TV_logo.png".into(),
            url: "https://zindikurmanci.zaroktv.com.tr/hls/0/stream.m3u8".into(),
        },
        Channel {
            id: "nrt".into(),
            name: "ئێن ئاڕ تی".into(),
            group: local.into(),
            logo: "https://upload.wikimedia.org/wikipedia/en/b/b3/NRT_HD_Logo.png".into(),
            url: "https://media.streambrothers.com:1936/8226/8226/playlist.m3u8".into(),
        },
        Channel {
            id: "mekke".into(),
            name: "مەکە".into(),
            group: local.into(),
            logo: "https://upload.wikimedia.org/wikipedia/commons/thumb/f/f3/Kaaba_mirror_edit_jj.jpg/1200px-Kaaba_mirror_edit_jj.jpg".into(),
            url: "https://media2.streambrothers.com:1936/8122/8122/chunklist_w300559019.m3u8".into(),
        },
        Channel {
            id: "varzish2".into(),
            name: "وەرزش 2".into(),
            group: local.into(),
            logo: String::new(),
            url: "https://lenz.splus.ir/PLTV/88888888/224/3221226845/index.m3u8".into(),
        },
        Channel {
            id: "ashti".into(),
            name: "ئاشتی قورئان".into(),
            group: "قورئانی پیرۆز".into(),
            logo: String::new(),
            url: "http://avrstream.com:1935/live/AshtiTV/playlist.m3u8".into(),
        },
    ]
}

pub fn demo_movies() -> Vec<Movie> {
    vec![Movie {
        id: "m1".into(),
        title: "Tears of Steel".into(),
        description: "A group of warriors and scientists gather at the \"Oude Kerk\" in Amsterdam to stage a crucial event from the past in a desperate attempt to rescue the world from destructive robots.".into(),
        poster: "https://upload.wikimedia.org/wikipedia/commons/f/f1/Tears_of_Steel_poster.jpg".into(),
        backdrop: "https://mango.blender.org/wp-content/uploads/2012/09/mango-vfx-breakdown-01.jpg".into(),
        url: "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8".into(),
        year: "2012".into(),
        genre: vec!["Sci-Fi".into(), "Action".into()],
        rating: "7.5".into(),
        content_type: ContentType::Movie,
    }]
}
