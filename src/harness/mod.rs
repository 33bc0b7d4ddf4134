//! Consistency harness.
//!
//! Чёрный ящик поверх публичного контракта `POST /purchase`: сбрасывает пул,
//! параллельно стреляет покупками по одному или нескольким инстансам сервиса,
//! затем читает финальное состояние пула и журнала и сверяет инварианты.
//! В хранилище напрямую ходит только сброс перед прогоном и финальное чтение.

pub mod report;

pub use report::{verify, AttemptOutcome, HarnessReport};

use std::env;

use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::config::{parse_or, ConfigError};
use crate::store::{AllocationLedger, PoolStore};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("at least one target URL is required")]
    NoTargets,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Базовые URL инстансов, запросы раскидываются по ним по кругу.
    pub targets: Vec<String>,
    pub event_id: String,
    pub total: i64,
    pub quantity: i64,
    pub concurrency: usize,
    pub user_prefix: String,
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: Vec<String> = lookup("STRESS_TARGETS")
            .unwrap_or_else(|| "http://localhost:3000,http://localhost:3001".to_string())
            .split(',')
            .map(|t| t.trim().trim_end_matches('/').to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if targets.is_empty() {
            return Err(HarnessError::NoTargets);
        }

        Ok(HarnessConfig {
            targets,
            event_id: lookup("STRESS_EVENT_ID").unwrap_or_else(|| "EVENT004".to_string()),
            total: parse_or(&lookup, "STRESS_TOTAL", 80)?,
            quantity: parse_or(&lookup, "STRESS_QUANTITY", 8)?,
            concurrency: parse_or(&lookup, "STRESS_CONCURRENCY", 50)?,
            user_prefix: lookup("STRESS_USER_PREFIX").unwrap_or_else(|| "stress_user".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PurchaseReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    tickets: Vec<i64>,
    error: Option<String>,
}

pub struct ConsistencyHarness {
    config: HarnessConfig,
    client: reqwest::Client,
}

impl ConsistencyHarness {
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        if config.targets.is_empty() {
            return Err(HarnessError::NoTargets);
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self { config, client })
    }

    /// Полный прогон: сброс, нагрузка, финальное чтение и сверка.
    pub async fn run(&self, store: &PoolStore, ledger: &AllocationLedger) -> Result<HarnessReport, HarnessError> {
        let cfg = &self.config;
        info!(event_id = %cfg.event_id, total = cfg.total, "Resetting event state");
        store.reset(&cfg.event_id, cfg.total).await?;

        let outcomes = self.fire().await;

        let pool = store.get(&cfg.event_id).await?;
        let allocations = ledger.list_by_event(&cfg.event_id).await?;

        let report = verify(&outcomes, pool.as_ref(), &allocations);
        info!(
            successes = report.successes,
            rejections = report.rejections,
            duplicates = report.duplicate_tickets,
            oversold = report.oversold,
            "Consistency run finished"
        );
        Ok(report)
    }

    /// Стреляет `concurrency` покупками одновременно и ждёт, пока все завершатся.
    pub async fn fire(&self) -> Vec<AttemptOutcome> {
        let cfg = &self.config;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        info!(
            attempts = cfg.concurrency,
            instances = cfg.targets.len(),
            quantity = cfg.quantity,
            "Firing concurrent purchases"
        );

        let attempts = (0..cfg.concurrency).map(|i| {
            let target = &cfg.targets[i % cfg.targets.len()];
            let user_id = format!("{}_{}_{}", cfg.user_prefix, &run_id[..8], i + 1);
            self.buy_once(target, user_id)
        });

        join_all(attempts).await
    }

    async fn buy_once(&self, target: &str, user_id: String) -> AttemptOutcome {
        let body = serde_json::json!({
            "userId": user_id,
            "eventId": self.config.event_id,
            "quantity": self.config.quantity,
        });

        let response = match self
            .client
            .post(format!("{target}/purchase"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return AttemptOutcome::TransportFailed {
                    target: target.to_string(),
                    error: e.to_string(),
                }
            }
        };

        let status = response.status();
        // 5xx не говорит, закоммитилась ли выдача: исход неизвестен, как при обрыве связи
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return AttemptOutcome::TransportFailed {
                target: target.to_string(),
                error: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            };
        }

        match response.json::<PurchaseReply>().await {
            Ok(reply) if status.is_success() && reply.success => AttemptOutcome::Purchased {
                target: target.to_string(),
                user_id,
                tickets: reply.tickets,
            },
            Ok(reply) => AttemptOutcome::Rejected {
                target: target.to_string(),
                status: status.as_u16(),
                error: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            },
            Err(e) => AttemptOutcome::Rejected {
                target: target.to_string(),
                status: status.as_u16(),
                error: format!("unreadable response: {e}"),
            },
        }
    }
}
