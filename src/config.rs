//! Configuration management for Citycast
//!
//! Loads settings from TOML file at ~/.citycast/config.toml

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication and session configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Feeling-lucky draw configuration
    #[serde(default)]
    pub lucky: LuckyConfig,

    /// Data directory (defaults to ~/.citycast)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".citycast"))
        .unwrap_or_else(|| PathBuf::from(".citycast"))
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 8081)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server host (default: 127.0.0.1 - localhost only)
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8081
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Authentication, cookie and session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Appended to passwords and secret answers before hashing.
    /// Changing it invalidates every stored credential.
    #[serde(default)]
    pub pepper: String,

    /// Mixed into session tokens at login
    #[serde(default)]
    pub session_pepper: String,

    /// HMAC key for the session cookie.
    /// If unset, a random key is generated at startup and sessions do not
    /// survive a restart.
    #[serde(default)]
    pub cookie_secret: Option<String>,

    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// How long a session stays valid after login
    #[serde(default = "default_validity_hours")]
    pub session_validity_hours: u32,

    /// Interval between expired-session sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_minutes: u32,
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_validity_hours() -> u32 {
    6
}

fn default_sweep_interval() -> u32 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            pepper: String::new(),
            session_pepper: String::new(),
            cookie_secret: None,
            cookie_name: default_cookie_name(),
            session_validity_hours: default_validity_hours(),
            sweep_interval_minutes: default_sweep_interval(),
        }
    }
}

impl AuthConfig {
    pub fn validity_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_validity_hours as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_minutes as u64 * 60)
    }
}

/// Feeling-lucky draw configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LuckyConfig {
    /// Step subtracted on every draw. Must share no factor with the city count.
    #[serde(default = "default_decrement")]
    pub decrement: i64,
}

fn default_decrement() -> i64 {
    7
}

impl Default for LuckyConfig {
    fn default() -> Self {
        LuckyConfig {
            decrement: default_decrement(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            lucky: LuckyConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_path(path.as_ref());

        if !expanded_path.exists() {
            return Err(CoreError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.auth.session_validity_hours == 0 {
            return Err(CoreError::Config(
                "auth.session_validity_hours must be at least 1".to_string(),
            ));
        }
        if self.auth.sweep_interval_minutes == 0 {
            return Err(CoreError::Config(
                "auth.sweep_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.auth.cookie_name.is_empty() {
            return Err(CoreError::Config("auth.cookie_name is empty".to_string()));
        }
        if self.lucky.decrement < 1 {
            return Err(CoreError::Config(
                "lucky.decrement must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the data directory, expanding ~ if present
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    /// Path of the SQLite database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("citycast.db")
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> SocketAddr {
        use std::net::ToSocketAddrs;

        format!("{}:{}", self.server.host, self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], self.server.port)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CITYCAST_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CITYCAST_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(data_dir) = std::env::var("CITYCAST_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(secret) = std::env::var("CITYCAST_COOKIE_SECRET") {
            self.auth.cookie_secret = if secret.is_empty() { None } else { Some(secret) };
        }
        if let Ok(pepper) = std::env::var("CITYCAST_PEPPER") {
            self.auth.pepper = pepper;
        }
        if let Ok(pepper) = std::env::var("CITYCAST_SESSION_PEPPER") {
            self.auth.session_pepper = pepper;
        }
    }

    /// Create a default configuration file at the given path.
    ///
    /// Fresh random secrets are written so that a new install never runs on
    /// empty peppers.
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let content = format!(
            r#"# Citycast Configuration

[server]
# Port to listen on (default: 8081)
port = 8081

# Host to bind to
# "127.0.0.1" = localhost only (recommended behind a reverse proxy)
# "0.0.0.0" = all interfaces
host = "127.0.0.1"

[auth]
# Appended to passwords and secret answers before hashing.
# Changing it invalidates every registered account.
pepper = "{pepper}"

# Mixed into session tokens at login
session_pepper = "{session_pepper}"

# HMAC key for the session cookie
cookie_secret = "{cookie_secret}"

cookie_name = "session"

# Sessions older than this are rejected and swept
session_validity_hours = 6

# How often expired sessions are removed
sweep_interval_minutes = 60

[lucky]
# Step used by the feeling-lucky draw.
# Must share no common factor with the number of imported cities.
decrement = 7
"#,
            pepper = random_secret(),
            session_pepper = random_secret(),
            cookie_secret = random_secret(),
        );

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// 32 random alphanumeric characters
pub fn random_secret() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.auth.session_validity_hours, 6);
        assert_eq!(config.auth.sweep_interval_minutes, 60);
        assert_eq!(config.auth.cookie_name, "session");
        assert!(config.auth.cookie_secret.is_none());
        assert_eq!(config.lucky.decrement, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9000
host = "0.0.0.0"

[auth]
pepper = "p"
cookie_secret = "s3cret"
session_validity_hours = 2
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.pepper, "p");
        assert_eq!(config.auth.cookie_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.session_validity_hours, 2);
        // omitted fields fall back to defaults
        assert_eq!(config.auth.sweep_interval_minutes, 60);
        assert_eq!(config.lucky.decrement, 7);
        assert_eq!(config.auth.validity_window(), chrono::Duration::hours(2));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.auth.session_validity_hours = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_create_default_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_default(&path).unwrap();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.auth.pepper.len(), 32);
        assert_ne!(config.auth.pepper, config.auth.session_pepper);
        assert!(config.auth.cookie_secret.is_some());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
