use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use nextstep_assist::llm::{BackendConfig, GEMINI_CHAT_BACKEND_ID};
use nextstep_assist::{DEFAULT_GREETING, SessionConfig, SuggestionTable};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REVEAL_INTERVAL_MS: u64 = 20;
pub const SETTINGS_DIRECTORY_NAME: &str = "nextstep";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "NEXTSTEP_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSettings {
    #[serde(default = "default_backend_id")]
    pub backend_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_reveal_interval_ms")]
    pub reveal_interval_ms: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Replaces the built-in quick-reply table when present.
    #[serde(default)]
    pub suggestions: Option<SuggestionTable>,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            backend_id: default_backend_id(),
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            reveal_interval_ms: default_reveal_interval_ms(),
            greeting: default_greeting(),
            suggestions: None,
        }
    }
}

impl WidgetSettings {
    pub fn to_backend_config(&self) -> BackendConfig {
        BackendConfig::new(&self.backend_id, &self.base_url)
    }

    /// Builds the session configuration, falling back to the built-in suggestion
    /// table when the configured one is invalid.
    pub fn session_config(&self) -> SessionConfig {
        let suggestions = match self.suggestions.clone().map(SuggestionTable::validated) {
            Some(Ok(table)) => table,
            Some(Err(error)) => {
                tracing::warn!(error = %error, "configured suggestion table rejected; using defaults");
                SuggestionTable::default()
            }
            None => SuggestionTable::default(),
        };

        SessionConfig {
            greeting: self.greeting.clone(),
            reveal_interval: Duration::from_millis(self.reveal_interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            suggestions,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn normalized(mut self) -> Self {
        self.backend_id = if self.backend_id.trim().is_empty() {
            default_backend_id()
        } else {
            self.backend_id.trim().to_string()
        };
        self.base_url = if self.base_url.trim().is_empty() {
            default_base_url()
        } else {
            self.base_url.trim().trim_end_matches('/').to_string()
        };
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = default_request_timeout_ms();
        }
        // A zero period would make the reveal ticker spin.
        if self.reveal_interval_ms == 0 {
            self.reveal_interval_ms = 1;
        }
        if self.greeting.trim().is_empty() {
            self.greeting = default_greeting();
        }

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<WidgetSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".nextstep"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<WidgetSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: WidgetSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> WidgetSettings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }

        // Missing files contribute nothing, so environment overrides still apply.
        let figment = Figment::from(Serialized::defaults(WidgetSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<WidgetSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = ?path,
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                WidgetSettings::default()
            }
        }
    }

    fn persist(&self, settings: &WidgetSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self
            .config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_backend_id() -> String {
    GEMINI_CHAT_BACKEND_ID.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_reveal_interval_ms() -> u64 {
    DEFAULT_REVEAL_INTERVAL_MS
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}
