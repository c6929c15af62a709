//! Runtime configuration (C12).
//!
//! Loaded once at process start from environment variables into a plain
//! struct. There is no settings-framework crate here by design: the rest of
//! the pipeline reads `RuntimeConfig` fields directly rather than re-reading
//! the environment per call.

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

/// Selects which backend the search layer's request-level cache (C6) uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    InMemory,
    Remote,
    NoOp,
}

impl CacheBackendKind {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_memory" => Ok(Self::InMemory),
            "remote" => Ok(Self::Remote),
            "noop" => Ok(Self::NoOp),
            other => Err(Error::config(format!(
                "unknown CACHE_BACKEND value: {other}"
            ))),
        }
    }
}

/// Selects the deterministic transformer's operating mode (§6 "Config
/// surface").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerMode {
    PunctuationOnly,
    NoOp,
    Http,
}

impl TransformerMode {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "punctuation_only" => Ok(Self::PunctuationOnly),
            "noop" => Ok(Self::NoOp),
            "http" => Ok(Self::Http),
            other => Err(Error::config(format!(
                "unknown TRANSFORMER_MODE value: {other}"
            ))),
        }
    }
}

/// Process-wide runtime configuration, assembled once via [`RuntimeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub database_url: String,

    pub cache_backend: CacheBackendKind,
    pub cache_ttl: Duration,
    pub cache_max_items: usize,
    pub cache_compression: bool,
    pub redis_url: Option<String>,

    pub provider_base_url: String,
    pub provider_api_key: String,
    pub provider_model: String,
    pub provider_timeout: Duration,

    pub transformer_mode: TransformerMode,

    pub response_optimizer_enabled: bool,

    pub log_level: String,
    pub log_format: String,

    pub corpus_rate_limit_per_min: u32,

    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_expiry_seconds: u64,
}

impl RuntimeConfig {
    /// Load configuration from environment variables, applying the same
    /// defaults the pipeline would use if a given variable is unset.
    /// Required values that are missing or malformed produce a
    /// [`Error::Config`] naming the offending key.
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| Error::config("DATABASE_URL is required"))?;

        let cache_backend = match env::var("CACHE_BACKEND") {
            Ok(v) => CacheBackendKind::from_str(&v)?,
            Err(_) => CacheBackendKind::InMemory,
        };
        let cache_ttl = Duration::from_secs(env_parse_or("CACHE_TTL_SECONDS", 60)?);
        let cache_max_items = env_parse_or("CACHE_MAX_ITEMS", 10_000)?;
        let cache_compression = env_parse_or("CACHE_COMPRESSION", false)?;
        let redis_url = env::var("REDIS_URL").ok();
        if cache_backend == CacheBackendKind::Remote && redis_url.is_none() {
            return Err(Error::config(
                "CACHE_BACKEND=remote requires REDIS_URL to be set",
            ));
        }

        let provider_base_url = env::var("PROVIDER_BASE_URL")
            .map_err(|_| Error::config("PROVIDER_BASE_URL is required"))?;
        let provider_api_key =
            env::var("PROVIDER_API_KEY").map_err(|_| Error::config("PROVIDER_API_KEY is required"))?;
        let provider_model = env::var("PROVIDER_MODEL").unwrap_or_else(|_| "default".to_string());
        let provider_timeout = Duration::from_secs(env_parse_or("PROVIDER_TIMEOUT_SECONDS", 30)?);

        let transformer_mode = match env::var("TRANSFORMER_MODE") {
            Ok(v) => TransformerMode::from_str(&v)?,
            Err(_) => TransformerMode::PunctuationOnly,
        };

        let response_optimizer_enabled = env_parse_or("RESPONSE_OPTIMIZER_ENABLED", false)?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

        let corpus_rate_limit_per_min = env_parse_or("CORPUS_RATE_LIMIT_PER_MIN", 10)?;

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| String::new());
        let jwt_algorithm = env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string());
        let jwt_expiry_seconds = env_parse_or("JWT_EXPIRY_SECONDS", 3600)?;

        Ok(Self {
            database_url,
            cache_backend,
            cache_ttl,
            cache_max_items,
            cache_compression,
            redis_url,
            provider_base_url,
            provider_api_key,
            provider_model,
            provider_timeout,
            transformer_mode,
            response_optimizer_enabled,
            log_level,
            log_format,
            corpus_rate_limit_per_min,
            jwt_secret,
            jwt_algorithm,
            jwt_expiry_seconds,
        })
    }
}

impl std::fmt::Display for RuntimeConfig {
    /// Secrets (`provider_api_key`, `jwt_secret`) are redacted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RuntimeConfig {{ database_url: {}, cache_backend: {:?}, provider_base_url: {}, provider_model: {}, transformer_mode: {:?}, log_level: {} }}",
            self.database_url,
            self.cache_backend,
            self.provider_base_url,
            self.provider_model,
            self.transformer_mode,
            self.log_level,
        )
    }
}

fn env_parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::config(format!("invalid value for {key}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_backend_parses_known_values() {
        assert_eq!(
            CacheBackendKind::from_str("in_memory").unwrap(),
            CacheBackendKind::InMemory
        );
        assert!(CacheBackendKind::from_str("bogus").is_err());
    }

    #[test]
    fn transformer_mode_parses_known_values() {
        assert_eq!(
            TransformerMode::from_str("punctuation_only").unwrap(),
            TransformerMode::PunctuationOnly
        );
        assert!(TransformerMode::from_str("bogus").is_err());
    }

    #[test]
    fn display_redacts_secrets() {
        let cfg = RuntimeConfig {
            database_url: "sqlite://test.db".into(),
            cache_backend: CacheBackendKind::InMemory,
            cache_ttl: Duration::from_secs(60),
            cache_max_items: 100,
            cache_compression: false,
            redis_url: None,
            provider_base_url: "https://example.com".into(),
            provider_api_key: "super-secret-key".into(),
            provider_model: "model-x".into(),
            provider_timeout: Duration::from_secs(30),
            transformer_mode: TransformerMode::PunctuationOnly,
            response_optimizer_enabled: false,
            log_level: "info".into(),
            log_format: "text".into(),
            corpus_rate_limit_per_min: 10,
            jwt_secret: "jwt-secret-value".into(),
            jwt_algorithm: "HS256".into(),
            jwt_expiry_seconds: 3600,
        };
        let rendered = cfg.to_string();
        assert!(!rendered.contains("super-secret-key"));
        assert!(!rendered.contains("jwt-secret-value"));
    }
}
