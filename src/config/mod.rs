use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
    pub saga: SagaConfig,
    pub reconciler: ReconcilerConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis. Без REDIS_URL кеш отключен
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Внешний сервис проверки токенов
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub service_url: String,
    pub timeout_ms: u64,
    pub cache_ttl_seconds: u64,
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Места хранятся в той же базе, что и бронирования.
    Local,
    /// Места принадлежат удаленному cinema-сервису.
    Remote,
}

impl FromStr for LedgerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(LedgerMode::Local),
            "remote" => Ok(LedgerMode::Remote),
            other => Err(format!("unknown ledger mode '{}'", other)),
        }
    }
}

// Настройки реестра мест
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub cinema_service_url: String,
}

// Таймауты шагов саги
#[derive(Debug, Clone, Deserialize)]
pub struct SagaConfig {
    pub step_timeout_ms: u64,
}

impl SagaConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

// Фоновый повтор неудавшихся компенсаций
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    pub interval_seconds: u64,
    pub batch_size: i64,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника пар ключ-значение.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            app: AppConfig {
                host: var("HOST", "0.0.0.0"),
                port: parse(&lookup, "PORT", "8080")?,
                environment: var("ENVIRONMENT", "development"),
                rust_log: var("RUST_LOG", "cinema_booking=debug,tower_http=debug"),
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                pool_size: parse(&lookup, "DB_POOL_SIZE", "20")?,
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            },
            auth: AuthConfig {
                service_url: var("AUTH_SERVICE_URL", "http://localhost:3001"),
                timeout_ms: parse(&lookup, "AUTH_TIMEOUT_MS", "3000")?,
                cache_ttl_seconds: parse(&lookup, "AUTH_CACHE_TTL_SECONDS", "60")?,
            },
            ledger: LedgerConfig {
                mode: parse(&lookup, "LEDGER_MODE", "local")?,
                cinema_service_url: var("CINEMA_SERVICE_URL", "http://localhost:3002"),
            },
            saga: SagaConfig {
                step_timeout_ms: parse(&lookup, "SAGA_STEP_TIMEOUT_MS", "5000")?,
            },
            reconciler: ReconcilerConfig {
                interval_seconds: parse(&lookup, "RECONCILE_INTERVAL_SECONDS", "30")?,
                batch_size: parse(&lookup, "RECONCILE_BATCH_SIZE", "100")?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse(&lookup, "CIRCUIT_BREAKER_FAILURE_THRESHOLD", "5")?,
                timeout_seconds: parse(&lookup, "CIRCUIT_BREAKER_TIMEOUT_SECONDS", "60")?,
            },
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/cinema")])).unwrap();

        assert_eq!(config.app.port, 8080);
        assert_eq!(config.database.pool_size, 20);
        assert_eq!(config.ledger.mode, LedgerMode::Local);
        assert_eq!(config.saga.step_timeout(), Duration::from_secs(5));
        assert!(config.redis.url.is_none());
        assert!(!config.app.is_production());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn invalid_number_names_the_key() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/cinema"),
            ("SAGA_STEP_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::Invalid { key: "SAGA_STEP_TIMEOUT_MS", value: "soon".to_string() }
        );
    }

    #[test]
    fn remote_ledger_mode_is_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/cinema"),
            ("LEDGER_MODE", "Remote"),
            ("REDIS_URL", "redis://127.0.0.1/"),
        ]))
        .unwrap();

        assert_eq!(config.ledger.mode, LedgerMode::Remote);
        assert_eq!(config.redis.url.as_deref(), Some("redis://127.0.0.1/"));
    }
}
