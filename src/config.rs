//! Configuration and settings management
//!
//! Loads raw settings from environment variables (and an optional local file),
//! then validates them in a single pass so that every problem is reported at once.

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default Download Station port over plain HTTP
pub const DEFAULT_HTTP_PORT: u16 = 5000;
/// Default Download Station port over HTTPS
pub const DEFAULT_HTTPS_PORT: u16 = 5001;
/// Default root folder on the NAS for downloaded media
pub const DEFAULT_DOWNLOAD_DESTINATION: &str = "downloads/discord-media";
/// Default log level when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default append-only log file
pub const DEFAULT_LOG_FILE: &str = "discord_showcase_loader.log";
/// Timeout applied to every request sent to the NAS
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Age after which a NAS session is considered expired
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// How long a processed message id is remembered (seconds).
/// Default: 24 hours.
pub const PROCESSED_CACHE_TTL_SECS: u64 = 86_400;
/// Maximum number of remembered message ids.
pub const PROCESSED_CACHE_MAX_SIZE: u64 = 10_000;

/// Errors produced while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
    /// One or more settings are missing or malformed
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Unvalidated settings exactly as found in the environment.
///
/// Every field is optional text so that validation can report all
/// missing and malformed values together.
#[derive(Default, Clone, Deserialize)]
pub struct RawSettings {
    /// `DISCORD_BOT_TOKEN`
    pub discord_bot_token: Option<String>,
    /// `DISCORD_CHANNEL_IDS`
    pub discord_channel_ids: Option<String>,
    /// `SYNOLOGY_HOST`
    pub synology_host: Option<String>,
    /// `SYNOLOGY_PORT`
    pub synology_port: Option<String>,
    /// `SYNOLOGY_USERNAME`
    pub synology_username: Option<String>,
    /// `SYNOLOGY_PASSWORD`
    pub synology_password: Option<String>,
    /// `SYNOLOGY_USE_HTTPS`
    pub synology_use_https: Option<String>,
    /// `SYNOLOGY_ACCEPT_INVALID_CERTS`
    pub synology_accept_invalid_certs: Option<String>,
    /// `SYNOLOGY_TIMEOUT_SECS`
    pub synology_timeout_secs: Option<String>,
    /// `SYNOLOGY_SESSION_TTL_SECS`
    pub synology_session_ttl_secs: Option<String>,
    /// `DOWNLOAD_DESTINATION`
    pub download_destination: Option<String>,
    /// `LOG_LEVEL`
    pub log_level: Option<String>,
    /// `LOG_FILE`
    pub log_file: Option<String>,
}

/// Builds the layered configuration source.
///
/// `config/local` is optional and never checked into git. Environment
/// variables win; empty variables are treated as unset.
///
/// # Errors
///
/// Returns a `config::ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, config::ConfigError> {
    Config::builder()
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl RawSettings {
    /// Read raw settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Source` if the sources cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(build_config()?)
    }

    /// Read raw settings from an already built configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Source` if deserialization fails.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        Ok(config.try_deserialize()?)
    }

    /// Log level to use, available before validation so that validation
    /// errors can themselves be logged.
    #[must_use]
    pub fn log_level(&self) -> String {
        non_blank(self.log_level.as_deref())
            .map_or_else(|| DEFAULT_LOG_LEVEL.to_string(), str::to_lowercase)
    }

    /// Log file path, available before validation.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        PathBuf::from(non_blank(self.log_file.as_deref()).unwrap_or(DEFAULT_LOG_FILE))
    }

    /// Validate every setting and build the immutable [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` listing every missing or malformed setting.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let mut problems = Vec::new();

        let token = required(self.discord_bot_token.as_deref(), "DISCORD_BOT_TOKEN", &mut problems);
        let channel_ids = parse_channel_ids(self.discord_channel_ids.as_deref(), &mut problems);
        let host = required(self.synology_host.as_deref(), "SYNOLOGY_HOST", &mut problems);
        let username = required(self.synology_username.as_deref(), "SYNOLOGY_USERNAME", &mut problems);
        let password = required(self.synology_password.as_deref(), "SYNOLOGY_PASSWORD", &mut problems);

        let use_https = parse_flag(self.synology_use_https.as_deref(), "SYNOLOGY_USE_HTTPS", &mut problems);
        let accept_invalid_certs = parse_flag(
            self.synology_accept_invalid_certs.as_deref(),
            "SYNOLOGY_ACCEPT_INVALID_CERTS",
            &mut problems,
        );
        let port = parse_port(self.synology_port.as_deref(), use_https, &mut problems);
        let timeout = parse_secs(
            self.synology_timeout_secs.as_deref(),
            "SYNOLOGY_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
            &mut problems,
        );
        let session_ttl = parse_secs(
            self.synology_session_ttl_secs.as_deref(),
            "SYNOLOGY_SESSION_TTL_SECS",
            DEFAULT_SESSION_TTL_SECS,
            &mut problems,
        );

        let download_destination = non_blank(self.download_destination.as_deref())
            .map(|d| d.trim_end_matches('/'))
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DOWNLOAD_DESTINATION)
            .to_string();

        match (token, host, username, password) {
            (Some(token), Some(host), Some(username), Some(password)) if problems.is_empty() => {
                Ok(Settings {
                    discord_token: SecretString::new(token),
                    log_level: self.log_level(),
                    log_file: self.log_file(),
                    channel_ids,
                    download_destination,
                    synology: SynologySettings {
                        host,
                        port,
                        use_https,
                        username,
                        password: SecretString::new(password),
                        accept_invalid_certs,
                        timeout,
                        session_ttl,
                    },
                })
            }
            _ => Err(ConfigError::Invalid(problems)),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required(value: Option<&str>, key: &str, problems: &mut Vec<String>) -> Option<String> {
    let value = non_blank(value).map(ToString::to_string);
    if value.is_none() {
        problems.push(format!("Missing {key}"));
    }
    value
}

fn parse_channel_ids(raw: Option<&str>, problems: &mut Vec<String>) -> BTreeSet<u64> {
    let mut ids = BTreeSet::new();
    let Some(raw) = non_blank(raw) else {
        problems.push("Missing DISCORD_CHANNEL_IDS".to_string());
        return ids;
    };

    for token in raw
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        match token.parse::<u64>() {
            Ok(id) if id > 0 => {
                ids.insert(id);
            }
            _ => problems.push(format!("Invalid channel id in DISCORD_CHANNEL_IDS: {token}")),
        }
    }

    if ids.is_empty() && !problems.iter().any(|p| p.contains("DISCORD_CHANNEL_IDS")) {
        problems.push("Missing DISCORD_CHANNEL_IDS".to_string());
    }
    ids
}

fn parse_flag(raw: Option<&str>, key: &str, problems: &mut Vec<String>) -> bool {
    let Some(raw) = non_blank(raw) else {
        return false;
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            problems.push(format!("Invalid {key} (expected true or false): {raw}"));
            false
        }
    }
}

fn parse_port(raw: Option<&str>, use_https: bool, problems: &mut Vec<String>) -> u16 {
    let default = if use_https {
        DEFAULT_HTTPS_PORT
    } else {
        DEFAULT_HTTP_PORT
    };
    let Some(raw) = non_blank(raw) else {
        return default;
    };
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            problems.push(format!("Invalid SYNOLOGY_PORT (must be 1-65535): {raw}"));
            default
        }
    }
}

fn parse_secs(raw: Option<&str>, key: &str, default: u64, problems: &mut Vec<String>) -> Duration {
    let Some(raw) = non_blank(raw) else {
        return Duration::from_secs(default);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            problems.push(format!("Invalid {key} (must be a positive number of seconds): {raw}"));
            Duration::from_secs(default)
        }
    }
}

/// Validated application settings, immutable after startup
#[derive(Clone)]
pub struct Settings {
    /// Discord bot token
    pub discord_token: SecretString,
    /// Channels whose messages are inspected for media
    pub channel_ids: BTreeSet<u64>,
    /// Connection settings for the NAS
    pub synology: SynologySettings,
    /// Root folder on the NAS; each channel gets a subfolder below it
    pub download_destination: String,
    /// Log level filter
    pub log_level: String,
    /// Append-only log file
    pub log_file: PathBuf,
}

/// Connection settings for Synology Download Station
#[derive(Clone)]
pub struct SynologySettings {
    /// NAS hostname or IP address
    pub host: String,
    /// NAS port
    pub port: u16,
    /// Whether to talk HTTPS to the NAS
    pub use_https: bool,
    /// NAS account name
    pub username: String,
    /// NAS account password
    pub password: SecretString,
    /// Accept self-signed NAS certificates
    pub accept_invalid_certs: bool,
    /// Per-request timeout
    pub timeout: Duration,
    /// Session age after which a fresh login is performed
    pub session_ttl: Duration,
}

impl SynologySettings {
    /// URL scheme matching the transport flag
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        if self.use_https {
            "https"
        } else {
            "http"
        }
    }

    /// Base URL of the Web API, always ending with `/webapi/`
    #[must_use]
    pub fn api_base_url(&self) -> String {
        format!("{}://{}:{}/webapi/", self.scheme(), self.host, self.port)
    }
}

fn set_or_not(secret: &SecretString) -> &'static str {
    if secret.expose_secret().is_empty() {
        "not set"
    } else {
        "set"
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: Vec<String> = self.channel_ids.iter().map(ToString::to_string).collect();
        writeln!(f, "Discord Showcase Loader configuration:")?;
        writeln!(f, "  Discord token: {}", set_or_not(&self.discord_token))?;
        writeln!(f, "  Channel IDs: [{}]", channels.join(", "))?;
        writeln!(f, "  Synology: {}", self.synology)?;
        writeln!(f, "  Download destination: {}", self.download_destination)?;
        writeln!(f, "  Log level: {}", self.log_level)?;
        write!(f, "  Log file: {}", self.log_file.display())
    }
}

impl fmt::Display for SynologySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{} (user {}, password {}, invalid certs {}, timeout {}s)",
            self.scheme(),
            self.host,
            self.port,
            self.username,
            set_or_not(&self.password),
            if self.accept_invalid_certs {
                "accepted"
            } else {
                "rejected"
            },
            self.timeout.as_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RawSettings {
        RawSettings {
            discord_bot_token: Some("discord-token".to_string()),
            discord_channel_ids: Some("123,456".to_string()),
            synology_host: Some("nas.local".to_string()),
            synology_username: Some("admin".to_string()),
            synology_password: Some("hunter2".to_string()),
            ..RawSettings::default()
        }
    }

    fn problems(raw: RawSettings) -> Vec<String> {
        match raw.validate() {
            Err(ConfigError::Invalid(problems)) => problems,
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("validation should have failed"),
        }
    }

    #[test]
    fn test_all_missing_fields_reported_together() {
        let problems = problems(RawSettings::default());
        assert_eq!(
            problems,
            vec![
                "Missing DISCORD_BOT_TOKEN",
                "Missing DISCORD_CHANNEL_IDS",
                "Missing SYNOLOGY_HOST",
                "Missing SYNOLOGY_USERNAME",
                "Missing SYNOLOGY_PASSWORD",
            ]
        );
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let raw = RawSettings {
            synology_host: Some("   ".to_string()),
            ..complete()
        };
        assert_eq!(problems(raw), vec!["Missing SYNOLOGY_HOST"]);
    }

    #[test]
    fn test_defaults_applied() -> Result<(), ConfigError> {
        let settings = complete().validate()?;
        assert_eq!(settings.synology.port, DEFAULT_HTTP_PORT);
        assert!(!settings.synology.use_https);
        assert!(!settings.synology.accept_invalid_certs);
        assert_eq!(settings.synology.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(settings.download_destination, DEFAULT_DOWNLOAD_DESTINATION);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(settings.synology.api_base_url(), "http://nas.local:5000/webapi/");
        Ok(())
    }

    #[test]
    fn test_https_switches_default_port() -> Result<(), ConfigError> {
        let raw = RawSettings {
            synology_use_https: Some("TRUE".to_string()),
            ..complete()
        };
        let settings = raw.validate()?;
        assert_eq!(settings.synology.port, DEFAULT_HTTPS_PORT);
        assert_eq!(settings.synology.api_base_url(), "https://nas.local:5001/webapi/");

        let raw = RawSettings {
            synology_use_https: Some("yes".to_string()),
            synology_port: Some("8443".to_string()),
            ..complete()
        };
        assert_eq!(raw.validate()?.synology.port, 8443);
        Ok(())
    }

    #[test]
    fn test_malformed_values_reported_with_missing_ones() {
        let raw = RawSettings {
            discord_bot_token: None,
            synology_port: Some("70000".to_string()),
            synology_use_https: Some("maybe".to_string()),
            synology_timeout_secs: Some("0".to_string()),
            ..complete()
        };
        let problems = problems(raw);
        assert_eq!(problems.len(), 4);
        assert!(problems.contains(&"Missing DISCORD_BOT_TOKEN".to_string()));
        assert!(problems.iter().any(|p| p.starts_with("Invalid SYNOLOGY_PORT")));
        assert!(problems.iter().any(|p| p.starts_with("Invalid SYNOLOGY_USE_HTTPS")));
        assert!(problems.iter().any(|p| p.starts_with("Invalid SYNOLOGY_TIMEOUT_SECS")));
    }

    #[test]
    fn test_channel_id_parsing() -> Result<(), ConfigError> {
        let raw = RawSettings {
            discord_channel_ids: Some("333; 444, 555 666".to_string()),
            ..complete()
        };
        let ids = raw.validate()?.channel_ids;
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![333, 444, 555, 666]);

        let raw = RawSettings {
            discord_channel_ids: Some("abc, 777".to_string()),
            ..complete()
        };
        assert_eq!(
            problems(raw),
            vec!["Invalid channel id in DISCORD_CHANNEL_IDS: abc"]
        );

        let raw = RawSettings {
            discord_channel_ids: Some(" , ;".to_string()),
            ..complete()
        };
        assert_eq!(problems(raw), vec!["Missing DISCORD_CHANNEL_IDS"]);
        Ok(())
    }

    #[test]
    fn test_destination_trailing_slash_trimmed() -> Result<(), ConfigError> {
        let raw = RawSettings {
            download_destination: Some("media/discord/".to_string()),
            ..complete()
        };
        assert_eq!(raw.validate()?.download_destination, "media/discord");
        Ok(())
    }

    #[test]
    fn test_summary_redacts_secrets() -> Result<(), ConfigError> {
        let summary = complete().validate()?.to_string();
        assert!(summary.contains("Discord token: set"));
        assert!(summary.contains("password set"));
        assert!(summary.contains("http://nas.local:5000"));
        assert!(!summary.contains("discord-token"));
        assert!(!summary.contains("hunter2"));
        Ok(())
    }

    #[test]
    fn test_from_config_reads_lowercase_keys() -> Result<(), Box<dyn std::error::Error>> {
        let config = Config::builder()
            .set_override("discord_bot_token", "token")?
            .set_override("discord_channel_ids", "42")?
            .set_override("synology_host", "10.0.0.2")?
            .set_override("synology_username", "user")?
            .set_override("synology_password", "pass")?
            .set_override("log_level", "DEBUG")?
            .build()?;

        let settings = RawSettings::from_config(config)?.validate()?;
        assert!(settings.channel_ids.contains(&42));
        assert_eq!(settings.synology.host, "10.0.0.2");
        assert_eq!(settings.log_level, "debug");
        Ok(())
    }
}
