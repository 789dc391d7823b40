mod defaults;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RelayError;
use defaults::*;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// WhatsApp channel config.
///
/// Session data is stored at `{data_dir}/whatsapp_session/`.
/// Pairing is done by scanning a QR code (like WhatsApp Web).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Name shown in the phone's "Linked devices" list.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Allowed phone numbers (e.g. `["5511999887766"]`). Empty = allow all.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            allowed_users: Vec::new(),
        }
    }
}

/// Webhook collaborator config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent to the user when the webhook answers with an unexpected body.
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            timeout_secs: default_timeout_secs(),
            fallback_message: default_fallback_message(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reconnect policy: linear backoff (`base_delay_secs × attempt`) up to `max_attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// HTTP API configuration -- outbound send and status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Bearer token for API authentication. Empty = no auth.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
            api_key: String::new(),
            send_timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), RelayError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Recognized: `WARELAY_WEBHOOK_URL`, `WARELAY_DATA_DIR`, `WARELAY_API_KEY`, `PORT`.
    /// Empty values are ignored; an unparsable `PORT` is an error.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("WARELAY_WEBHOOK_URL") {
            self.webhook.url = url;
        }
        if let Some(dir) = get("WARELAY_DATA_DIR") {
            self.relay.data_dir = dir;
        }
        if let Some(key) = get("WARELAY_API_KEY") {
            self.api.api_key = key;
        }
        if let Some(port) = get("PORT") {
            self.api.port = port
                .trim()
                .parse()
                .map_err(|e| RelayError::Config(format!("invalid PORT '{port}': {e}")))?;
        }
        Ok(())
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.webhook.url.trim().is_empty() {
            return Err(RelayError::Config("webhook.url must not be empty".into()));
        }
        if !self.webhook.url.starts_with("http://") && !self.webhook.url.starts_with("https://") {
            return Err(RelayError::Config(format!(
                "webhook.url must be an http(s) URL, got '{}'",
                self.webhook.url
            )));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(RelayError::Config("webhook.timeout_secs must be > 0".into()));
        }
        if self.api.send_timeout_secs == 0 {
            return Err(RelayError::Config("api.send_timeout_secs must be > 0".into()));
        }
        if self.reconnect.base_delay_secs == 0 {
            return Err(RelayError::Config(
                "reconnect.base_delay_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Expanded data directory.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.relay.data_dir))
    }

    /// Directory holding the WhatsApp session database.
    pub fn session_dir(&self) -> PathBuf {
        self.data_dir().join("whatsapp_session")
    }

    /// Directory for log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, RelayError> {
    let path = Path::new(path);
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| RelayError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}
