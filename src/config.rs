use serde::{Deserialize, Serialize};

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Visual theme of the front-end
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeId {
    #[default]
    Dark,
    GlossyWhite,
    Sport,
    Ramadan,
    Nawroz,
    BlackFriday,
    Goat,
}

/// Display metadata for a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub accent: &'static str,
    pub light: bool,
}

impl ThemeId {
    pub fn theme(&self) -> Theme {
        match self {
            ThemeId::Dark => Theme { name: "Classic Dark", accent: "indigo", light: false },
            ThemeId::GlossyWhite => Theme { name: "Glossy White", accent: "blue", light: true },
            ThemeId::Sport => Theme { name: "Sport Action", accent: "red", light: false },
            ThemeId::Ramadan => Theme { name: "Ramadan Gold", accent: "emerald", light: false },
            ThemeId::Nawroz => Theme { name: "Nawroz Spring", accent: "green", light: false },
            ThemeId::BlackFriday => Theme { name: "Black Friday", accent: "purple", light: false },
            ThemeId::Goat => Theme { name: "G.O.A.T Luxury", accent: "yellow", light: false },
        }
    }

    pub fn all() -> &'static [ThemeId] {
        &[
            ThemeId::Dark,
            ThemeId::GlossyWhite,
            ThemeId::Sport,
            ThemeId::Ramadan,
            ThemeId::Nawroz,
            ThemeId::BlackFriday,
            ThemeId::Goat,
        ]
    }
}

/// UI language
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ku,
    Ar,
}

impl Language {
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Ku => "Kurdî",
            Language::Ar => "العربية",
        }
    }

    /// Kurdish (Sorani) and Arabic are laid out right-to-left
    pub fn is_rtl(&self) -> bool {
        matches!(self, Language::Ku | Language::Ar)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default)]
    pub theme: ThemeId,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_movie_id: Option<String>,
    #[serde(default)]
    pub welcome_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_db_url: Option<String>,
    /// JSON connection descriptor for the cloud document store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_config: Option<String>,
    #[serde(default = "default_true")]
    pub require_subscription: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "StreamGenius".to_string(),
            theme: ThemeId::Dark,
            language: Language::En,
            admin_password: Some(DEFAULT_ADMIN_PASSWORD.to_string()),
            featured_movie_id: Some("demo-1".to_string()),
            welcome_message: "Welcome to your premium streaming experience.".to_string(),
            remote_db_url: None,
            firebase_config: None,
            require_subscription: true,
        }
    }
}

impl AppConfig {
    /// Password the admin screen compares against
    pub fn effective_admin_password(&self) -> &str {
        match self.admin_password.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_ADMIN_PASSWORD,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote_db_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn cloud_descriptor(&self) -> Option<&str> {
        self.firebase_config.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    /// Overlay the fields present in `patch` onto this config.
    /// Unknown or ill-typed fields leave the config untouched.
    pub fn merged_with(&self, patch: &serde_json::Value) -> Self {
        let mut base = match serde_json::to_value(self) {
            Ok(v) => v,
            Err(_) => return self.clone(),
        };
        if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_obj {
                base_obj.insert(k.clone(), v.clone());
            }
        }
        match serde_json::from_value(base) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring config patch with invalid fields");
                self.clone()
            }
        }
    }
}
