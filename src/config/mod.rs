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
    pub purchase: PurchaseConfig,
    pub features: FeatureFlags,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
    /// Сколько раз пробуем подключиться при старте, прежде чем сдаться.
    pub connect_retries: u32,
    pub connect_retry_interval_ms: u64,
    /// Максимальное ожидание блокировки строки пула внутри транзакции резерва.
    pub lock_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Только настройки базы, для вспомогательных бинарников (seed, stress).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(DatabaseConfig {
            url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            pool_size: parse_or(lookup, "DB_POOL_SIZE", 20)?,
            acquire_timeout_seconds: parse_or(lookup, "DB_ACQUIRE_TIMEOUT_SECONDS", 5)?,
            connect_retries: parse_or(lookup, "DB_CONNECT_RETRIES", 30)?,
            connect_retry_interval_ms: parse_or(lookup, "DB_CONNECT_RETRY_INTERVAL_MS", 1000)?,
            lock_timeout_ms: parse_or(lookup, "DB_LOCK_TIMEOUT_MS", 5000)?,
        })
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }
}

// Правила покупки
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseConfig {
    /// Количество билетов в заказе должно быть кратно этому числу.
    pub batch_size: u32,
}

// Feature flags для включения/выключения функциональности
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Монтирует POST /pools/{event_id}/reset. Только для стендов и стресс-тестов.
    pub enable_test_reset: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника ключей.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            app: AppConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 3000)?,
                environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: lookup("RUST_LOG")
                    .unwrap_or_else(|| "ticket_allocator=debug,tower_http=debug".to_string()),
                log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::Pretty)?,
            },
            database: DatabaseConfig::from_lookup(&lookup)?,
            purchase: PurchaseConfig {
                batch_size: parse_or(&lookup, "PURCHASE_BATCH_SIZE", 8)?,
            },
            features: FeatureFlags {
                enable_test_reset: parse_or(&lookup, "ENABLE_TEST_RESET", false)?,
            },
        };

        if config.purchase.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "PURCHASE_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if config.database.connect_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_CONNECT_RETRIES",
                value: "0".to_string(),
                reason: "must be at least one attempt".to_string(),
            });
        }

        Ok(config)
    }
}

pub(crate) fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
