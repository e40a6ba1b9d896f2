//! Configuration management for the confession booth.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "confession-booth";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "booth.db";

/// Marker used by unfilled sample configuration values.
const PLACEHOLDER_MARKER: &str = "YOUR_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `BOOTH_`, sections split on `__`)
/// 2. TOML config file at `~/.config/confession-booth/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Branding shown by the front end and in notifications.
    pub app: AppConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Daily submission quota.
    pub quota: QuotaConfig,
    /// Text-generation provider.
    pub responder: ResponderConfig,
    /// Outward webhook notifications.
    pub notify: NotifyConfig,
    /// Remote mirror of the ledger.
    pub mirror: MirrorConfig,
    /// Identity lookup.
    pub identity: IdentityConfig,
}

/// Branding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name.
    pub name: String,
    /// Department name, used in notification footers.
    pub department: String,
    /// Version label.
    pub version: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/confession-booth/booth.db`
    pub database_path: Option<PathBuf>,
}

/// Daily quota configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Submissions allowed per identity per day without an override.
    pub normal_limit: u32,
    /// Absolute ceiling per identity per day once unlocked.
    pub max_limit: u32,
    /// Secret that raises an identity from the normal to the max limit.
    /// When unset, no override is ever accepted.
    pub override_secret: Option<String>,
}

/// Text-generation provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Interchangeable API keys, rotated on failure.
    pub api_keys: Vec<String>,
    /// Model identifier.
    pub model: String,
    /// Base URL of the generative language API.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Webhook notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Discord-style webhook URL. Notifications are skipped when unset.
    pub webhook_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Remote mirror configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Token for the GitHub contents API.
    pub github_token: Option<String>,
    /// Owner of the archive repository.
    pub repo_owner: Option<String>,
    /// Name of the archive repository.
    pub repo_name: Option<String>,
    /// GitHub API base URL.
    pub github_api_url: String,
    /// Bot token used to read the police channel back.
    pub discord_bot_token: Option<String>,
    /// Guild (server) the bot belongs to.
    pub discord_guild_id: Option<String>,
    /// Discord API base URL.
    pub discord_api_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Identity lookup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Endpoint returning `{"ip": "..."}`.
    pub lookup_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "CONFESSION BOOTH".to_string(),
            department: "Police Department".to_string(),
            version: "v1.0".to_string(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            normal_limit: 2,
            max_limit: 4,
            override_secret: None,
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: "gemini-2.0-flash-lite".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 20,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            repo_owner: None,
            repo_name: None,
            github_api_url: "https://api.github.com".to_string(),
            discord_bot_token: None,
            discord_guild_id: None,
            discord_api_url: "https://discord.com/api/v10".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            lookup_url: "https://api.ipify.org?format=json".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Stand-in for secrets in printed configuration.
pub const REDACTED: &str = "<redacted>";

/// Returns the value if it is set, non-blank and not a sample placeholder.
#[must_use]
pub fn configured(value: Option<&String>) -> Option<&str> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && !v.contains(PLACEHOLDER_MARKER))
}

fn url_pattern() -> Result<Regex> {
    Regex::new(r"^https?://[^\s/$.?#][^\s]*$").map_err(|e| Error::internal(e.to_string()))
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("BOOTH_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.quota.normal_limit == 0 {
            return Err(Error::config("quota.normal_limit must be greater than 0"));
        }

        if self.quota.max_limit < self.quota.normal_limit {
            return Err(Error::config(format!(
                "quota.max_limit ({}) cannot be less than quota.normal_limit ({})",
                self.quota.max_limit, self.quota.normal_limit
            )));
        }

        if self.responder.model.trim().is_empty() {
            return Err(Error::config("responder.model must not be empty"));
        }

        for (name, secs) in [
            ("responder.timeout_secs", self.responder.timeout_secs),
            ("notify.timeout_secs", self.notify.timeout_secs),
            ("mirror.timeout_secs", self.mirror.timeout_secs),
            ("identity.timeout_secs", self.identity.timeout_secs),
        ] {
            if secs == 0 {
                return Err(Error::config(format!("{name} must be greater than 0")));
            }
        }

        let pattern = url_pattern()?;
        let mut urls = vec![
            ("responder.base_url", Some(self.responder.base_url.as_str())),
            ("mirror.github_api_url", Some(self.mirror.github_api_url.as_str())),
            ("mirror.discord_api_url", Some(self.mirror.discord_api_url.as_str())),
            ("identity.lookup_url", Some(self.identity.lookup_url.as_str())),
        ];
        urls.push(("notify.webhook_url", self.webhook_url()));
        for (name, url) in urls {
            if let Some(url) = url {
                if !pattern.is_match(url) {
                    return Err(Error::config(format!("{name} is not a valid URL: {url}")));
                }
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// The webhook URL, if one is really configured.
    #[must_use]
    pub fn webhook_url(&self) -> Option<&str> {
        configured(self.notify.webhook_url.as_ref())
    }

    /// API keys with placeholders and blanks removed.
    #[must_use]
    pub fn api_keys(&self) -> Vec<String> {
        self.responder
            .api_keys
            .iter()
            .filter_map(|k| configured(Some(k)))
            .map(str::to_string)
            .collect()
    }

    /// Get the provider timeout as a Duration.
    #[must_use]
    pub fn responder_timeout(&self) -> Duration {
        Duration::from_secs(self.responder.timeout_secs)
    }

    /// Get the webhook timeout as a Duration.
    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify.timeout_secs)
    }

    /// Get the mirror timeout as a Duration.
    #[must_use]
    pub fn mirror_timeout(&self) -> Duration {
        Duration::from_secs(self.mirror.timeout_secs)
    }

    /// Get the identity lookup timeout as a Duration.
    #[must_use]
    pub fn identity_timeout(&self) -> Duration {
        Duration::from_secs(self.identity.timeout_secs)
    }

    /// Footer text for notifications.
    #[must_use]
    pub fn footer(&self) -> String {
        format!("{} - Confession Booth", self.app.department)
    }

    /// Copy with every credential replaced by [`REDACTED`].
    ///
    /// Unset values stay unset so the output still shows what is missing.
    #[must_use]
    pub fn redacted(&self) -> Self {
        fn mask(value: &mut Option<String>) {
            if value.is_some() {
                *value = Some(REDACTED.to_string());
            }
        }

        let mut copy = self.clone();
        mask(&mut copy.quota.override_secret);
        mask(&mut copy.notify.webhook_url);
        mask(&mut copy.mirror.github_token);
        mask(&mut copy.mirror.discord_bot_token);
        for key in &mut copy.responder.api_keys {
            *key = REDACTED.to_string();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.quota.normal_limit, 2);
        assert_eq!(config.quota.max_limit, 4);
        assert!(config.quota.override_secret.is_none());
        assert_eq!(config.responder.model, "gemini-2.0-flash-lite");
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn test_redacted_hides_credentials() {
        let mut config = Config::default();
        config.quota.override_secret = Some("open-sesame".to_string());
        config.responder.api_keys = vec!["AIza-one".to_string(), "AIza-two".to_string()];
        config.notify.webhook_url = Some("https://discord.com/api/webhooks/1/tok".to_string());
        config.mirror.github_token = Some("ghp_secret".to_string());
        config.mirror.repo_owner = Some("precinct".to_string());

        let redacted = config.redacted();
        let json = serde_json::to_string(&redacted).unwrap();
        for secret in ["open-sesame", "AIza-one", "AIza-two", "webhooks/1/tok", "ghp_secret"] {
            assert!(!json.contains(secret), "{secret} leaked");
        }
        assert_eq!(redacted.responder.api_keys.len(), 2);
        assert_eq!(redacted.mirror.repo_owner.as_deref(), Some("precinct"));
        assert!(redacted.mirror.discord_bot_token.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_normal_limit() {
        let mut config = Config::default();
        config.quota.normal_limit = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("normal_limit"));
    }

    #[test]
    fn test_validate_max_below_normal() {
        let mut config = Config::default();
        config.quota.normal_limit = 5;
        config.quota.max_limit = 3;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_limit (3)"));
    }

    #[test]
    fn test_validate_max_equal_normal_is_allowed() {
        let mut config = Config::default();
        config.quota.normal_limit = 3;
        config.quota.max_limit = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.mirror.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("mirror.timeout_secs"));
    }

    #[test]
    fn test_validate_bad_webhook_url() {
        let mut config = Config::default();
        config.notify.webhook_url = Some("not a url".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("notify.webhook_url"));
    }

    #[test]
    fn test_placeholder_webhook_is_unset() {
        let mut config = Config::default();
        config.notify.webhook_url = Some("YOUR_WEBHOOK_URL_HERE".to_string());

        assert!(config.webhook_url().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configured_filters_blank() {
        assert_eq!(configured(Some(&"  ".to_string())), None);
        assert_eq!(configured(None), None);
        assert_eq!(configured(Some(&" abc ".to_string())), Some("abc"));
    }

    #[test]
    fn test_api_keys_drop_placeholders() {
        let mut config = Config::default();
        config.responder.api_keys = vec![
            "k1".to_string(),
            "YOUR_KEY_HERE".to_string(),
            String::new(),
            "k2".to_string(),
        ];
        assert_eq!(config.api_keys(), vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("booth.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_timeouts() {
        let config = Config::default();
        assert_eq!(config.responder_timeout(), Duration::from_secs(20));
        assert_eq!(config.notify_timeout(), Duration::from_secs(10));
        assert_eq!(config.mirror_timeout(), Duration::from_secs(10));
        assert_eq!(config.identity_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_footer_uses_department() {
        let mut config = Config::default();
        config.app.department = "Metro PD".to_string();
        assert_eq!(config.footer(), "Metro PD - Confession Booth");
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("confession-booth"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_quota_config_deserialize() {
        let json = r#"{"normal_limit": 3, "max_limit": 6, "override_secret": "X"}"#;
        let quota: QuotaConfig = serde_json::from_str(json).unwrap();
        assert_eq!(quota.normal_limit, 3);
        assert_eq!(quota.max_limit, 6);
        assert_eq!(quota.override_secret.as_deref(), Some("X"));
    }

    #[test]
    fn test_responder_config_serialize() {
        let json = serde_json::to_string(&ResponderConfig::default()).unwrap();
        assert!(json.contains("api_keys"));
        assert!(json.contains("timeout_secs"));
    }
}
