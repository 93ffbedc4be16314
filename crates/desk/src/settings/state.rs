use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use lexhook_webhook::{DEFAULT_USER_AGENT, ReplyShape, TransportConfig};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::ingest::Category;

pub const SETTINGS_DIRECTORY_NAME: &str = "lexhook";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://proxpire.com/webhook/legal-query";
pub const DEFAULT_INGEST_ENDPOINT: &str = "https://proxpire.com/webhook/ingest-legal-document";
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_DELAY_NOTICE_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GREETING: &str = "Hi! I'm your assistant. Ask me anything!";

/// Chat webhook wiring for one conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    /// Deadline after which the pending request is cancelled.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Pending time after which the "taking longer than usual" notice shows.
    #[serde(default = "default_delay_notice_ms")]
    pub delay_notice_ms: u64,
    #[serde(default)]
    pub reply_shape: ReplyShape,
    /// Assistant line seeded into new transcripts. Empty disables it.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            response_timeout_ms: default_response_timeout_ms(),
            delay_notice_ms: default_delay_notice_ms(),
            reply_shape: ReplyShape::default(),
            greeting: default_greeting(),
        }
    }
}

impl ChatSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn delay_notice(&self) -> Duration {
        Duration::from_millis(self.delay_notice_ms)
    }

    pub fn greeting(&self) -> Option<&str> {
        let greeting = self.greeting.trim();
        (!greeting.is_empty()).then_some(greeting)
    }

    pub fn normalized(mut self) -> Self {
        self.endpoint = normalize_endpoint(&self.endpoint, DEFAULT_CHAT_ENDPOINT);
        if self.response_timeout_ms == 0 {
            self.response_timeout_ms = DEFAULT_RESPONSE_TIMEOUT_MS;
        }
        if self.delay_notice_ms == 0 {
            self.delay_notice_ms = DEFAULT_DELAY_NOTICE_MS;
        }
        self
    }
}

/// Ingestion webhook wiring and form defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSettings {
    #[serde(default = "default_ingest_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub default_category: Category,
    /// Lower-case extensions without dots. Empty accepts any file.
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            endpoint: default_ingest_endpoint(),
            default_category: Category::default(),
            accepted_extensions: default_accepted_extensions(),
        }
    }
}

impl IngestSettings {
    pub fn normalized(mut self) -> Self {
        self.endpoint = normalize_endpoint(&self.endpoint, DEFAULT_INGEST_ENDPOINT);
        self.accepted_extensions = self
            .accepted_extensions
            .into_iter()
            .map(|extension| extension.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|extension| !extension.is_empty())
            .collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl TransportSettings {
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig::new(
            Duration::from_millis(self.connect_timeout_ms),
            &self.user_agent,
        )
    }

    pub fn normalized(mut self) -> Self {
        if self.connect_timeout_ms == 0 {
            self.connect_timeout_ms = DEFAULT_CONNECT_TIMEOUT_MS;
        }
        self.user_agent = self.user_agent.trim().to_string();
        if self.user_agent.is_empty() {
            self.user_agent = default_user_agent();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub ingest: IngestSettings,
    #[serde(default)]
    pub transport: TransportSettings,
}

impl AppSettings {
    pub fn normalized(self) -> Self {
        Self {
            chat: self.chat.normalized(),
            ingest: self.ingest.normalized(),
            transport: self.transport.normalized(),
        }
    }
}

/// Where the loaded settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOrigin {
    /// No settings file exists yet.
    Defaults,
    /// Settings file merged over the defaults.
    File,
    /// The settings file could not be parsed and was ignored.
    InvalidFile,
}

/// Settings for one run of the client, bound to the file they persist to.
pub struct SettingsStore {
    path: PathBuf,
    settings: AppSettings,
    origin: SettingsOrigin,
}

impl SettingsStore {
    /// `<config dir>/lexhook/settings.json`, or `.lexhook/settings.json` when
    /// the platform has no config directory.
    pub fn default_config_path() -> PathBuf {
        match dirs::config_dir() {
            Some(config) => config.join(SETTINGS_DIRECTORY_NAME),
            None => PathBuf::from(".lexhook"),
        }
        .join(SETTINGS_FILE_NAME)
    }

    pub fn open(path: PathBuf) -> Self {
        let (settings, origin) = read_settings(&path);
        Self {
            path,
            settings,
            origin,
        }
    }

    pub fn open_default() -> Self {
        Self::open(Self::default_config_path())
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn origin(&self) -> SettingsOrigin {
        self.origin
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalizes `settings`, writes them and makes them current.
    pub fn save(&mut self, settings: AppSettings) -> Result<(), SettingsError> {
        let settings = settings.normalized();
        write_settings(&self.path, &settings)?;
        self.settings = settings;
        self.origin = SettingsOrigin::File;
        Ok(())
    }
}

fn read_settings(path: &Path) -> (AppSettings, SettingsOrigin) {
    let defaults = AppSettings::default().normalized();
    if !path.is_file() {
        tracing::info!(path = %path.display(), "no settings file, using defaults");
        return (defaults, SettingsOrigin::Defaults);
    }

    match Figment::from(Serialized::defaults(&defaults))
        .merge(Json::file(path))
        .extract::<AppSettings>()
    {
        Ok(settings) => {
            tracing::debug!(path = %path.display(), "loaded settings file");
            (settings.normalized(), SettingsOrigin::File)
        }
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "ignoring unreadable settings file"
            );
            (defaults, SettingsOrigin::InvalidFile)
        }
    }
}

/// Replaces `path` through a sibling temp file so readers never see a torn
/// settings file.
fn write_settings(path: &Path, settings: &AppSettings) -> Result<(), SettingsError> {
    if let Some(directory) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(directory).context(CreateDirectorySnafu {
            stage: "create-settings-directory",
            path: directory.to_path_buf(),
        })?;
    }

    let mut encoded = serde_json::to_string_pretty(settings).context(EncodeSnafu {
        stage: "encode-settings",
    })?;
    encoded.push('\n');

    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, encoded).context(WriteStagingSnafu {
        stage: "write-staging-file",
        path: staging.clone(),
    })?;
    std::fs::rename(&staging, path).context(ReplaceSnafu {
        stage: "replace-settings-file",
        path: path.to_path_buf(),
    })?;

    tracing::info!(path = %path.display(), "saved settings");
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot create settings directory {path:?} on `{stage}`: {source}"))]
    CreateDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode settings on `{stage}`: {source}"))]
    Encode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot write {path:?} on `{stage}`: {source}"))]
    WriteStaging {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot replace settings file {path:?} on `{stage}`: {source}"))]
    Replace {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn normalize_endpoint(endpoint: &str, fallback: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        fallback.to_string()
    } else {
        endpoint.to_string()
    }
}

fn default_chat_endpoint() -> String {
    DEFAULT_CHAT_ENDPOINT.to_string()
}

fn default_ingest_endpoint() -> String {
    DEFAULT_INGEST_ENDPOINT.to_string()
}

fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

fn default_delay_notice_ms() -> u64 {
    DEFAULT_DELAY_NOTICE_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accepted_extensions() -> Vec<String> {
    ["pdf", "doc", "docx", "txt"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
