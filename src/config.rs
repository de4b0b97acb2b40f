//! Process configuration read from the environment (and `.env`).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::bus::NatsConfig;
use crate::mapping::MappingCache;
use crate::upstream::UpstreamConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} is required when STORE_BACKEND={1}")]
    Missing(&'static str, &'static str),
}

/// Where mapping rules, trusted services and tokens are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory { seed_file: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub host: String,
    pub port: u16,
    pub webhook_secret: String,
    pub nats: NatsConfig,
    pub store: StoreBackend,
    pub upstream: UpstreamConfig,
    pub mapping_cache_ttl: Duration,
}

impl AdapterConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let nats_defaults = NatsConfig::default();
        let nats = NatsConfig {
            url: text("NATS_URL", &nats_defaults.url),
            client_name: text("NATS_CLIENT_NAME", &nats_defaults.client_name),
            username: get("NATS_USER"),
            password: get("NATS_PASSWORD"),
            event_stream: text("NATS_EVENT_STREAM", &nats_defaults.event_stream),
            publish_timeout: secs(
                &get,
                "NATS_PUBLISH_TIMEOUT_SECS",
                nats_defaults.publish_timeout,
            )?,
            ..nats_defaults
        };

        let store = match text("STORE_BACKEND", "postgres").to_lowercase().as_str() {
            "postgres" => StoreBackend::Postgres {
                database_url: get("DATABASE_URL")
                    .ok_or(ConfigError::Missing("DATABASE_URL", "postgres"))?,
            },
            "memory" => StoreBackend::Memory {
                seed_file: get("SEED_FILE").map(PathBuf::from),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let upstream_defaults = UpstreamConfig::default();
        let upstream = UpstreamConfig {
            base_url: text("UPSTREAM_URL", &upstream_defaults.base_url),
            client_id: text("UPSTREAM_CLIENT_ID", ""),
            client_secret: text("UPSTREAM_CLIENT_SECRET", ""),
            timeout: secs(&get, "UPSTREAM_TIMEOUT_SECS", upstream_defaults.timeout)?,
        };

        Ok(Self {
            host: text("HOST", "0.0.0.0"),
            port: parse(&get, "PORT", 3001)?,
            webhook_secret: text("WEBHOOK_SECRET", ""),
            nats,
            store,
            upstream,
            mapping_cache_ttl: secs(&get, "MAPPING_CACHE_TTL_SECS", MappingCache::DEFAULT_TTL)?,
        })
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse(get, key, default.as_secs()).map(Duration::from_secs)
}
