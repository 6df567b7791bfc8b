use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
    /// Startup connection attempts before giving up
    #[serde(default = "DatabaseConfig::default_connect_attempts")]
    pub connect_attempts: u32,
    /// Fixed delay between startup connection attempts
    #[serde(default = "DatabaseConfig::default_connect_retry_secs")]
    pub connect_retry_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Flush once this many events are buffered
    pub batch_size: usize,
    /// Flush once this long has passed since the previous flush
    pub flush_interval_ms: u64,
    /// Upper bound on a single event source read
    pub poll_timeout_ms: u64,
    /// Depth of the in-process ingest queue
    pub channel_capacity: usize,
    pub max_code_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Path to a MaxMind GeoLite2-City or GeoIP2-City .mmdb file
    pub geoip_city_db_path: Option<String>,
    /// Base URL of the user-agent classification service
    pub user_agent_service_url: Option<String>,
    /// Per-call timeout for either capability
    pub timeout_ms: u64,
    pub user_agent_cache_entries: u64,
}

impl DatabaseConfig {
    const fn default_max_connections() -> u32 {
        10
    }

    const fn default_connect_attempts() -> u32 {
        30
    }

    const fn default_connect_retry_secs() -> u64 {
        2
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            flush_interval_ms: 2000,
            poll_timeout_ms: 100,
            channel_capacity: 100_000,
            max_code_length: 50,
        }
    }
}

impl PipelineConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            geoip_city_db_path: None,
            user_agent_service_url: None,
            timeout_ms: 1000,
            user_agent_cache_entries: 10_000,
        }
    }
}

/// Read `key`, falling back to `default` when unset; set-but-invalid is an error
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{value}'")),
        Err(_) => Ok(default),
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./clickstream.db?mode=rwc".to_string());

        let database = DatabaseConfig {
            backend,
            url: database_url,
            max_connections: env_or(
                "DATABASE_MAX_CONNECTIONS",
                DatabaseConfig::default_max_connections(),
            )?,
            connect_attempts: env_or(
                "DATABASE_CONNECT_ATTEMPTS",
                DatabaseConfig::default_connect_attempts(),
            )?,
            connect_retry_secs: env_or(
                "DATABASE_CONNECT_RETRY_SECS",
                DatabaseConfig::default_connect_retry_secs(),
            )?,
        };

        let api_server = ServerConfig {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("API_PORT", 8080)?,
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            batch_size: env_or("BATCH_SIZE", defaults.batch_size)?,
            flush_interval_ms: env_or("BATCH_FLUSH_INTERVAL_MS", defaults.flush_interval_ms)?,
            poll_timeout_ms: env_or("POLL_TIMEOUT_MS", defaults.poll_timeout_ms)?,
            channel_capacity: env_or("INGEST_CHANNEL_CAPACITY", defaults.channel_capacity)?,
            max_code_length: env_or("MAX_CODE_LENGTH", defaults.max_code_length)?,
        };

        if pipeline.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1");
        }
        if pipeline.channel_capacity == 0 {
            anyhow::bail!("INGEST_CHANNEL_CAPACITY must be at least 1");
        }

        let lookup_defaults = LookupConfig::default();
        let lookup = LookupConfig {
            geoip_city_db_path: env_opt("GEOIP_CITY_DB"),
            user_agent_service_url: env_opt("USER_AGENT_SERVICE_URL"),
            timeout_ms: env_or("LOOKUP_TIMEOUT_MS", lookup_defaults.timeout_ms)?,
            user_agent_cache_entries: env_or(
                "USER_AGENT_CACHE_ENTRIES",
                lookup_defaults.user_agent_cache_entries,
            )?,
        };

        Ok(Config {
            database,
            api_server,
            pipeline,
            lookup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.batch_size, 5000);
        assert_eq!(pipeline.flush_interval(), Duration::from_secs(2));
        assert_eq!(pipeline.poll_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_lookup_defaults_to_one_second_timeout() {
        assert_eq!(LookupConfig::default().timeout_ms, 1000);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("CLICKSTREAM_TEST_GARBAGE_PORT", "eighty");
        let result: anyhow::Result<u16> = env_or("CLICKSTREAM_TEST_GARBAGE_PORT", 8080);
        assert!(result.is_err());
        std::env::remove_var("CLICKSTREAM_TEST_GARBAGE_PORT");
    }

    #[test]
    fn test_env_or_uses_default_when_unset() {
        let value: u64 = env_or("CLICKSTREAM_TEST_UNSET_VALUE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
