//! Configuration module for the folio server.
//!
//! Loads configuration from environment variables (and `.env` if present).

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use url::Url;

/// Errors raised while reading configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Redis connection settings. Present only when `REDIS_URL` is set.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
    pub timeout: Duration,
}

/// Notion content database settings.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: String,
    pub database_id: String,
    pub api_url: Url,
}

/// Stripe checkout settings. Present only when `STRIPE_SECRET_KEY` is set.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_url: Url,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache backend. `None` disables caching entirely.
    pub redis: Option<RedisConfig>,

    pub notion: NotionConfig,
    pub stripe: Option<StripeConfig>,

    /// Public base URL of the site, used for checkout redirects.
    pub site_url: Url,

    /// Shared secret expected on `POST /api/cache/invalidate`.
    pub revalidate_secret: Option<String>,

    pub bind_addr: IpAddr,
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let redis = match var("REDIS_URL") {
            Some(url) => Some(RedisConfig {
                url,
                pool_size: parse_or(var("REDIS_POOL_SIZE"), "REDIS_POOL_SIZE", 8)?,
                timeout: Duration::from_millis(parse_or(
                    var("REDIS_TIMEOUT_MS"),
                    "REDIS_TIMEOUT_MS",
                    2000,
                )?),
            }),
            None => None,
        };

        let notion = NotionConfig {
            api_key: var("NOTION_API_KEY").ok_or(ConfigError::Missing("NOTION_API_KEY"))?,
            database_id: var("NOTION_DATABASE_ID")
                .ok_or(ConfigError::Missing("NOTION_DATABASE_ID"))?,
            api_url: parse_url(
                var("NOTION_API_URL"),
                "NOTION_API_URL",
                "https://api.notion.com/v1",
            )?,
        };

        let stripe = match var("STRIPE_SECRET_KEY") {
            Some(secret_key) => Some(StripeConfig {
                secret_key,
                api_url: parse_url(
                    var("STRIPE_API_URL"),
                    "STRIPE_API_URL",
                    "https://api.stripe.com/v1",
                )?,
            }),
            None => None,
        };

        Ok(Self {
            redis,
            notion,
            stripe,
            site_url: parse_url(var("SITE_URL"), "SITE_URL", "http://localhost:3000")?,
            revalidate_secret: var("REVALIDATE_SECRET"),
            bind_addr: parse_or(var("BIND_ADDR"), "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(var("PORT"), "PORT", 3000)?,
        })
    }

    /// Socket address the HTTP server listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<T>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_url(
    value: Option<String>,
    name: &'static str,
    default: &str,
) -> Result<Url, ConfigError> {
    // Url::join drops the last segment unless the base ends with a slash.
    let mut raw = value.unwrap_or_else(|| default.to_string());
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("NOTION_API_KEY", "secret_abc"),
        ("NOTION_DATABASE_ID", "db123"),
    ];

    #[test]
    fn test_defaults_without_optional_services() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert!(config.redis.is_none());
        assert!(config.stripe.is_none());
        assert!(config.revalidate_secret.is_none());
        assert_eq!(config.port, 3000);
        assert_eq!(config.notion.api_url.as_str(), "https://api.notion.com/v1/");
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_blank_redis_url_disables_cache() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("REDIS_URL", "   "));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert!(config.redis.is_none());
    }

    #[test]
    fn test_redis_settings() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("REDIS_URL", "redis://localhost:6379"));
        pairs.push(("REDIS_POOL_SIZE", "4"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        let redis = config.redis.unwrap();
        assert_eq!(redis.pool_size, 4);
        assert_eq!(redis.timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_missing_notion_key() {
        let err = Config::from_lookup(lookup(&[("NOTION_DATABASE_ID", "db")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NOTION_API_KEY")));
    }

    #[test]
    fn test_invalid_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
