//! Configuration System
//!
//! Handles loading connection and logging settings from TOML files and
//! environment variables. Environment variables override file values.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{OrmError, OrmResult};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Database queries run against; sent as the `database` parameter
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Verify TLS certificates when `secure` is set
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Use https
    #[serde(default)]
    pub secure: bool,

    /// Maximum concurrent requests per connection handle
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long to wait for a free connection before failing
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_ms: u64,

    /// Log every statement at info level
    #[serde(default)]
    pub log_statements: bool,

    /// Reject inserts, deletes and DDL before they reach the server
    #[serde(default)]
    pub readonly: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8123
}

fn default_database() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_verify_ssl() -> bool {
    true
}

fn default_max_connections() -> usize {
    10
}

fn default_pool_timeout() -> u64 {
    30_000 // 30 seconds
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: None,
            password: None,
            timeout_secs: default_timeout(),
            verify_ssl: default_verify_ssl(),
            secure: false,
            max_connections: default_max_connections(),
            pool_timeout_ms: default_pool_timeout(),
            log_statements: false,
            readonly: false,
        }
    }
}

impl ConnectionConfig {
    /// Default settings pointed at `database`
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Server root URL, e.g. `http://localhost:8123/`
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_timeout_ms)
    }

    /// Reject settings no request could succeed with
    pub fn validate(&self) -> OrmResult<()> {
        if self.host.is_empty() {
            return Err(OrmError::Config("host must not be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(OrmError::Config("database must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(OrmError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(OrmError::Config("timeout must be positive".to_string()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(OrmError::Config(
                "password given without a user".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("clickhouse-orm").join("config.toml")),
            Some(PathBuf::from("./clickhouse-orm.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        let conn = &mut self.connection;

        if let Ok(host) = std::env::var("CLICKHOUSE_ORM_HOST") {
            conn.host = host;
        }
        if let Ok(port) = std::env::var("CLICKHOUSE_ORM_PORT") {
            if let Ok(p) = port.parse() {
                conn.port = p;
            }
        }
        if let Ok(database) = std::env::var("CLICKHOUSE_ORM_DATABASE") {
            conn.database = database;
        }
        if let Ok(user) = std::env::var("CLICKHOUSE_ORM_USER") {
            conn.user = Some(user);
        }
        if let Ok(password) = std::env::var("CLICKHOUSE_ORM_PASSWORD") {
            conn.password = Some(password);
        }
        if let Ok(timeout) = std::env::var("CLICKHOUSE_ORM_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                conn.timeout_secs = t;
            }
        }
        if let Ok(verify) = std::env::var("CLICKHOUSE_ORM_VERIFY_SSL") {
            if let Some(v) = parse_bool(&verify) {
                conn.verify_ssl = v;
            }
        }
        if let Ok(secure) = std::env::var("CLICKHOUSE_ORM_SECURE") {
            if let Some(v) = parse_bool(&secure) {
                conn.secure = v;
            }
        }
        if let Ok(max) = std::env::var("CLICKHOUSE_ORM_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse() {
                conn.max_connections = m;
            }
        }
        if let Ok(timeout) = std::env::var("CLICKHOUSE_ORM_POOL_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                conn.pool_timeout_ms = t;
            }
        }
        if let Ok(readonly) = std::env::var("CLICKHOUSE_ORM_READONLY") {
            if let Some(v) = parse_bool(&readonly) {
                conn.readonly = v;
            }
        }
        if let Ok(log) = std::env::var("CLICKHOUSE_ORM_LOG_STATEMENTS") {
            if let Some(v) = parse_bool(&log) {
                conn.log_statements = v;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("CLICKHOUSE_ORM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CLICKHOUSE_ORM_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

impl From<ConfigError> for OrmError {
    fn from(e: ConfigError) -> Self {
        OrmError::Config(e.to_string())
    }
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# clickhouse-orm configuration
#
# Environment variables override these settings:
# - CLICKHOUSE_ORM_HOST
# - CLICKHOUSE_ORM_PORT
# - CLICKHOUSE_ORM_DATABASE
# - CLICKHOUSE_ORM_USER
# - CLICKHOUSE_ORM_PASSWORD
# - CLICKHOUSE_ORM_TIMEOUT
# - CLICKHOUSE_ORM_VERIFY_SSL
# - CLICKHOUSE_ORM_SECURE
# - CLICKHOUSE_ORM_MAX_CONNECTIONS
# - CLICKHOUSE_ORM_POOL_TIMEOUT
# - CLICKHOUSE_ORM_READONLY
# - CLICKHOUSE_ORM_LOG_STATEMENTS
# - CLICKHOUSE_ORM_LOG_LEVEL
# - CLICKHOUSE_ORM_LOG_FORMAT

[connection]
# Server host and HTTP port
host = "localhost"
port = 8123

# Database queries run against
database = "default"

# Credentials (basic auth); leave unset for the default user
# user = "default"
# password = ""

# Request timeout in seconds
timeout_secs = 60

# Use https, and whether to verify the server certificate
secure = false
verify_ssl = true

# Maximum concurrent requests per connection handle
max_connections = 10

# How long to wait for a free connection (ms)
pool_timeout_ms = 30000

# Log every statement at info level
log_statements = false

# Refuse inserts, deletes and DDL
readonly = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/clickhouse-orm.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.connection, ConnectionConfig::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[connection]\nhost = \"ch.internal\"\ndatabase = \"analytics\"\nsecure = true\nuser = \"reader\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.connection.host, "ch.internal");
        assert_eq!(config.connection.database, "analytics");
        assert_eq!(config.connection.user.as_deref(), Some("reader"));
        assert_eq!(config.connection.port, 8123);
        assert_eq!(config.connection.base_url(), "https://ch.internal:8123/");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nport = \"not a number\"").unwrap();
        let bad = Config::load(file.path());
        assert!(matches!(bad, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("CLICKHOUSE_ORM_DATABASE", "from_env");
        std::env::set_var("CLICKHOUSE_ORM_VERIFY_SSL", "false");
        std::env::set_var("CLICKHOUSE_ORM_POOL_TIMEOUT", "250");
        std::env::set_var("CLICKHOUSE_ORM_READONLY", "yes");
        let config = Config::from_env();
        for name in [
            "CLICKHOUSE_ORM_DATABASE",
            "CLICKHOUSE_ORM_VERIFY_SSL",
            "CLICKHOUSE_ORM_POOL_TIMEOUT",
            "CLICKHOUSE_ORM_READONLY",
        ] {
            std::env::remove_var(name);
        }

        assert_eq!(config.connection.database, "from_env");
        assert!(!config.connection.verify_ssl);
        assert_eq!(config.connection.pool_timeout(), Duration::from_millis(250));
        assert!(config.connection.readonly);
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::default().validate().is_ok());

        let config = ConnectionConfig {
            max_connections: 0,
            ..ConnectionConfig::default()
        };
        assert!(matches!(config.validate(), Err(OrmError::Config(_))));

        let config = ConnectionConfig {
            password: Some("secret".into()),
            ..ConnectionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
