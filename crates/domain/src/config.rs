//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::model::NetworkTag;

const DEFAULT_NODE_PORT: u16 = 7890;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_LOOKUP_RETRIES: u32 = 10;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Bot-specific configuration (HTTP bind + registration database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    database_url: String,
    max_connections: Option<u32>,
    bind_address: String,
}

impl BotConfig {
    /// Loads only the environment variables required by the bot binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            max_connections: get_optional_number("DATABASE_MAX_CONNECTIONS")?,
            bind_address: get_required_var("BOT_BIND_ADDRESS")?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Pool size cap; the driver default applies when unset.
    pub fn max_connections(&self) -> Option<u32> {
        self.max_connections
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }
}

/// Node pools and timing knobs for the block watcher. Both networks must
/// list at least one host; an empty pool is a startup error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    main_hosts: Vec<String>,
    test_hosts: Vec<String>,
    node_port: u16,
    poll_interval_ms: u64,
    lookup_retries: u32,
    reconnect_delay_ms: u64,
}

impl WatcherConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// host lists plus optional tuning variables.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let main_hosts = parse_hosts(
            &get_required_var("NEM_MAIN_HOSTS")?,
            NetworkTag::Production,
        )?;
        let test_hosts = parse_hosts(&get_required_var("NEM_TEST_HOSTS")?, NetworkTag::Test)?;

        Ok(Self {
            main_hosts,
            test_hosts,
            node_port: get_number_or("NEM_NODE_PORT", DEFAULT_NODE_PORT)?,
            poll_interval_ms: get_number_or("NEM_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            lookup_retries: get_number_or("NEM_LOOKUP_RETRIES", DEFAULT_LOOKUP_RETRIES)?,
            reconnect_delay_ms: get_number_or(
                "NEM_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )?,
        })
    }

    pub fn hosts(&self, network: NetworkTag) -> &[String] {
        match network {
            NetworkTag::Production => &self.main_hosts,
            NetworkTag::Test => &self.test_hosts,
        }
    }

    pub fn node_port(&self) -> u16 {
        self.node_port
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lookup_retries(&self) -> u32 {
        self.lookup_retries
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn parse_hosts(raw: &str, network: NetworkTag) -> Result<Vec<String>, ConfigError> {
    let hosts: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect();
    if hosts.is_empty() {
        return Err(ConfigError::NoHosts { network });
    }
    Ok(hosts)
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    Ok(get_optional_number(key)?.unwrap_or(default))
}

fn get_optional_number<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    get_optional_var(key)
        .map(|raw| {
            raw.parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("NEM_PUSH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("no node hosts configured for the {network} network")]
    NoHosts { network: NetworkTag },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
