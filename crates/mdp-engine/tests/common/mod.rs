//! Shared test fixtures
//!
//! In-memory store implementations mirroring the PostgreSQL semantics
//! (append-only bronze, freshness-guarded silver upsert), a static
//! credential resolver, and a small orders report target whose endpoints
//! point at a wiremock server.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use mdp_engine::auth::{AuthToken, CredentialResolver};
use mdp_engine::bronze::BronzeStore;
use mdp_engine::error::EngineResult;
use mdp_engine::http::{RequestSpec, RetryPolicy, RetryingInvoker};
use mdp_engine::job::PollSettings;
use mdp_engine::pipeline::types::{BronzeRecord, PartitionKey, SilverRecord};
use mdp_engine::pipeline::{PipelineOrchestrator, ReportTarget};
use mdp_engine::silver::{Normalizer, SilverStore};

/// Append-only in-memory bronze store
#[derive(Default)]
pub struct MemoryBronzeStore {
    records: Mutex<Vec<BronzeRecord>>,
}

impl MemoryBronzeStore {
    pub fn records(&self) -> Vec<BronzeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl BronzeStore for MemoryBronzeStore {
    async fn insert(&self, record: &BronzeRecord) -> EngineResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn fetch_partition(
        &self,
        target: &str,
        partition: &PartitionKey,
    ) -> EngineResult<Vec<BronzeRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target == target && r.partition() == *partition)
            .cloned()
            .collect())
    }
}

type SilverKey = (String, Uuid, DateTime<Utc>, String);

/// In-memory silver store with the same freshness guard as the SQL upsert:
/// an existing row is only overwritten by a strictly greater response_dttm.
#[derive(Default)]
pub struct MemorySilverStore {
    rows: Mutex<HashMap<SilverKey, SilverRecord>>,
}

impl MemorySilverStore {
    pub fn rows(&self) -> Vec<SilverRecord> {
        let mut rows: Vec<SilverRecord> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));
        rows
    }
}

#[async_trait]
impl SilverStore for MemorySilverStore {
    async fn upsert(&self, target: &str, rows: &[SilverRecord]) -> EngineResult<u64> {
        let mut stored = self.rows.lock().unwrap();
        let mut written = 0u64;

        for row in rows {
            let key = (
                target.to_string(),
                row.tenant_id,
                row.business_dttm,
                row.natural_key.clone(),
            );
            match stored.get(&key) {
                Some(existing) if existing.response_dttm >= row.response_dttm => {
                    // Stale or equal data is a silent no-op.
                }
                _ => {
                    stored.insert(key, row.clone());
                    written += 1;
                }
            }
        }

        Ok(written)
    }

    async fn replace_partition(
        &self,
        target: &str,
        partition: &PartitionKey,
        rows: &[SilverRecord],
    ) -> EngineResult<u64> {
        let mut stored = self.rows.lock().unwrap();
        stored.retain(|(t, tenant, business, _), _| {
            !(t == target && *tenant == partition.tenant_id && *business == partition.business_dttm)
        });

        for row in rows {
            stored.insert(
                (
                    target.to_string(),
                    row.tenant_id,
                    row.business_dttm,
                    row.natural_key.clone(),
                ),
                row.clone(),
            );
        }

        Ok(rows.len() as u64)
    }
}

/// Resolver returning a fixed credential, or none at all
pub struct StaticCredentialResolver {
    token: Option<AuthToken>,
}

impl StaticCredentialResolver {
    pub fn with_token() -> Self {
        Self {
            token: Some(AuthToken {
                token_id: "test-token-id".to_string(),
                token: "test-secret".to_string(),
            }),
        }
    }

    pub fn without_token() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, _tenant_id: Uuid) -> EngineResult<Option<AuthToken>> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct OrderRow {
    id: i64,
    value: i64,
}

/// Normalizer for the orders payload: a JSON array of `{id, value}`
/// entries, one silver row per entry, keyed by id. Malformed entries are
/// dropped; the valid remainder still goes through.
pub struct OrdersNormalizer;

impl Normalizer for OrdersNormalizer {
    fn normalize(
        &self,
        payload: &str,
        meta: &mdp_engine::silver::NormalizeMeta,
    ) -> Vec<SilverRecord> {
        let entries: Vec<serde_json::Value> = match serde_json::from_str(payload) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<OrderRow>(entry).ok())
            .map(|row| meta.row(row.id.to_string(), json!({ "value": row.value })))
            .collect()
    }
}

/// Orders report target pointing at a wiremock server
pub struct OrdersTarget {
    base_url: String,
    poll: PollSettings,
    normalizer: OrdersNormalizer,
}

impl OrdersTarget {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll: PollSettings {
                done_statuses: vec!["SUCCESS".to_string()],
                error_statuses: vec!["FAILED".to_string(), "FATAL".to_string()],
                poll_interval_secs: 0,
                poll_timeout_secs: 5,
            },
            normalizer: OrdersNormalizer,
        }
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll.poll_timeout_secs = secs;
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll.poll_interval_secs = secs;
        self
    }
}

impl ReportTarget for OrdersTarget {
    fn name(&self) -> &str {
        "orders"
    }

    fn poll_settings(&self) -> PollSettings {
        self.poll.clone()
    }

    fn submit_request(
        &self,
        partition: &PartitionKey,
        auth: &AuthToken,
    ) -> EngineResult<RequestSpec> {
        Ok(
            RequestSpec::new(reqwest::Method::POST, format!("{}/reports", self.base_url))
                .with_header("Authorization", format!("Bearer {}", auth.token))
                .with_params(json!({
                    "tenantId": partition.tenant_id.to_string(),
                    "businessDate": partition.business_dttm.to_rfc3339(),
                }))
                .with_body(json!({ "reportType": "ORDERS" })),
        )
    }

    fn status_request(&self, task_id: &str, auth: &AuthToken) -> EngineResult<RequestSpec> {
        Ok(RequestSpec::new(
            reqwest::Method::GET,
            format!("{}/reports/{}/status", self.base_url, task_id),
        )
        .with_header("Authorization", format!("Bearer {}", auth.token)))
    }

    fn download_request(&self, task_id: &str, auth: &AuthToken) -> EngineResult<RequestSpec> {
        Ok(RequestSpec::new(
            reqwest::Method::GET,
            format!("{}/reports/{}/download", self.base_url, task_id),
        )
        .with_header("Authorization", format!("Bearer {}", auth.token)))
    }

    fn normalizer(&self) -> &dyn Normalizer {
        &self.normalizer
    }
}

/// Invoker with retries enabled but zero backoff, for fast tests
pub fn fast_invoker() -> RetryingInvoker {
    RetryingInvoker::new(
        reqwest::Client::new(),
        RetryPolicy {
            max_attempts: 3,
            backoff_base_secs: 0,
            backoff_cap_secs: 0,
            ..RetryPolicy::default()
        },
    )
}

pub fn test_partition() -> PartitionKey {
    PartitionKey::new(
        "2024-06-01T00:00:00Z".parse().expect("valid timestamp"),
        Uuid::new_v4(),
    )
}

pub fn build_orchestrator(
    bronze: std::sync::Arc<MemoryBronzeStore>,
    silver: std::sync::Arc<MemorySilverStore>,
    resolver: StaticCredentialResolver,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(bronze, silver, std::sync::Arc::new(resolver), fast_invoker())
}
