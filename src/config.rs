use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound for every configured time span.
const MAX_SPAN_SECONDS: u64 = 10 * 365 * 86_400;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub sessions: SessionConfig,

    pub accounts: AccountConfig,

    pub mail: MailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Whether to re-hash passwords with the current argon2 params on login
    pub auto_migrate_password_hashes: bool,

    pub password_min_length: usize,

    pub password_max_length: usize,

    /// Login/password endpoint throttling and lockout policy.
    pub auth_throttle: AuthThrottleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthThrottleConfig {
    /// Max failed attempts in the window before lockout.
    pub max_attempts: u32,

    /// Rolling window for counting failures.
    pub window_seconds: u64,

    /// Temporary lockout duration once max attempts is reached.
    pub lockout_seconds: u64,

    /// Number of temporary lockouts after which the account is banned.
    /// Zero disables escalation.
    pub suspensions_before_ban: u32,

    /// Base delay after failed login attempts.
    pub login_base_delay_ms: u64,

    /// Maximum delay cap for failed login attempts.
    pub login_max_delay_ms: u64,

    /// Base delay after failed password-change attempts.
    pub password_base_delay_ms: u64,

    /// Maximum delay cap for failed password-change attempts.
    pub password_max_delay_ms: u64,
}

impl Default for AuthThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 5 * 60,
            lockout_seconds: 2 * 60,
            suspensions_before_ban: 3,
            login_base_delay_ms: 250,
            login_max_delay_ms: 1500,
            password_base_delay_ms: 300,
            password_max_delay_ms: 2000,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            auto_migrate_password_hashes: true,
            password_min_length: 8,
            password_max_length: 128,
            auth_throttle: AuthThrottleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of a regular login session.
    pub lifetime_minutes: u64,

    /// Lifetime of a session created with "remember me".
    pub remember_days: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_minutes: 120,
            remember_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Wrong activation codes accepted before the outstanding code is burnt.
    pub activation_max_attempts: u32,

    pub reset_code_ttl_minutes: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            activation_max_attempts: 5,
            reset_code_ttl_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,

    pub from_address: String,

    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_address: "no-reply@localhost".to_string(),
            from_name: "Warden".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub bind_address: String,

    pub port: u16,

    /// Externally reachable base URL, used when building activation and reset links.
    pub public_url: String,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Idle timeout of the cookie session carrying the login token.
    pub cookie_idle_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 6790,
            public_url: "http://localhost:6790".to_string(),
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            secure_cookies: true,
            cookie_idle_minutes: 60 * 24 * 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    /// Number of tokio worker threads. 0 uses the number of CPU cores.
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/warden.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 0,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("warden").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let throttle = &self.security.auth_throttle;
        if throttle.max_attempts == 0 {
            anyhow::bail!("security.auth_throttle.max_attempts must be > 0");
        }
        if throttle.lockout_seconds == 0 {
            anyhow::bail!("security.auth_throttle.lockout_seconds must be > 0");
        }
        if self.security.password_min_length > self.security.password_max_length {
            anyhow::bail!("security.password_min_length cannot exceed password_max_length");
        }
        if self.accounts.reset_code_ttl_minutes == 0 {
            anyhow::bail!("accounts.reset_code_ttl_minutes must be > 0");
        }
        if self.sessions.lifetime_minutes == 0 {
            anyhow::bail!("sessions.lifetime_minutes must be > 0");
        }
        let spans = [
            ("security.auth_throttle.window_seconds", throttle.window_seconds),
            ("security.auth_throttle.lockout_seconds", throttle.lockout_seconds),
            (
                "sessions.lifetime_minutes",
                self.sessions.lifetime_minutes.saturating_mul(60),
            ),
            (
                "sessions.remember_days",
                self.sessions.remember_days.saturating_mul(86_400),
            ),
            (
                "accounts.reset_code_ttl_minutes",
                self.accounts.reset_code_ttl_minutes.saturating_mul(60),
            ),
            (
                "server.cookie_idle_minutes",
                u64::try_from(self.server.cookie_idle_minutes)
                    .unwrap_or(u64::MAX)
                    .saturating_mul(60),
            ),
        ];
        for (key, secs) in spans {
            if secs > MAX_SPAN_SECONDS {
                anyhow::bail!("{key} must not exceed ten years");
            }
        }

        url::Url::parse(&self.server.public_url)
            .with_context(|| format!("Invalid server.public_url: {}", self.server.public_url))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security.auth_throttle.max_attempts, 5);
        assert_eq!(config.security.auth_throttle.lockout_seconds, 120);
        assert_eq!(config.accounts.reset_code_ttl_minutes, 60);
        assert_eq!(config.sessions.lifetime_minutes, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[security.auth_throttle]"));
        assert!(toml_str.contains("[accounts]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [security.auth_throttle]
            max_attempts = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.security.auth_throttle.max_attempts, 3);

        assert_eq!(config.security.auth_throttle.lockout_seconds, 120);
        assert_eq!(config.server.port, 6790);
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let mut config = Config::default();
        config.security.auth_throttle.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.security.password_min_length = 200;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.public_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_spans() {
        let mut config = Config::default();
        config.security.auth_throttle.lockout_seconds = 10_000_000_000_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sessions.remember_days = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.accounts.reset_code_ttl_minutes = u64::MAX / 2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.cookie_idle_minutes = -1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.security.auth_throttle.lockout_seconds = 365 * 86_400;
        assert!(config.validate().is_ok());
    }
}
