//! Audit persister
//!
//! Turns one attempt's context into an immutable bronze row. This is the
//! one place where "log and continue" is forbidden: a failed audit insert
//! always propagates as a `Persistence` error, because the audit trail is
//! the system's only durable failure record.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::bronze::store::BronzeStore;
use crate::error::EngineResult;
use crate::pipeline::types::{BronzeRecord, PartitionKey, RunContext};

/// Parameter keys that never reach the audit table
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "token",
    "secret",
    "authorization",
    "password",
    "api_key",
    "apikey",
    "credential",
];

const REDACTED: &str = "***";

/// Everything known about one attempt at persist time
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// Raw request parameters; sanitized before persist
    pub request_parameters: Value,
    pub request_body: Option<Value>,
    pub response_code: i32,
    pub response_body: String,
    /// When the final request actually left this process
    pub send_dttm: DateTime<Utc>,
    /// When response headers arrived
    pub response_dttm: DateTime<Utc>,
    /// When the body was fully received
    pub receive_dttm: DateTime<Utc>,
}

impl AttemptContext {
    /// Context for a failure with no completed HTTP exchange
    pub fn failure(
        request_parameters: Value,
        request_body: Option<Value>,
        synthetic_code: i32,
        message: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            request_parameters,
            request_body,
            response_code: synthetic_code,
            response_body: message,
            send_dttm: now,
            response_dttm: now,
            receive_dttm: now,
        }
    }
}

/// Appends one immutable audit record per attempt
pub struct AuditPersister {
    store: Arc<dyn BronzeStore>,
}

impl AuditPersister {
    pub fn new(store: Arc<dyn BronzeStore>) -> Self {
        Self { store }
    }

    /// Persist one attempt; returns the new record's request uuid
    pub async fn persist(
        &self,
        target: &str,
        partition: &PartitionKey,
        run: &RunContext,
        attempt: AttemptContext,
    ) -> EngineResult<Uuid> {
        let record = BronzeRecord {
            request_uuid: Uuid::new_v4(),
            target: target.to_string(),
            tenant_id: partition.tenant_id,
            business_dttm: partition.business_dttm,
            send_dttm: attempt.send_dttm,
            response_dttm: attempt.response_dttm,
            receive_dttm: attempt.receive_dttm,
            response_code: attempt.response_code,
            response_body: attempt.response_body,
            request_parameters: sanitize_params(&attempt.request_parameters),
            request_body: attempt.request_body,
            run_uuid: run.run_uuid,
            run_dttm: run.run_dttm,
            run_schedule_dttm: run.run_schedule_dttm,
            inserted_at: Utc::now(),
        };

        self.store.insert(&record).await?;

        debug!(
            target = target,
            partition = %partition,
            request_uuid = %record.request_uuid,
            response_code = record.response_code,
            "Persisted bronze record"
        );

        Ok(record.request_uuid)
    }
}

/// Strip secret-bearing values from request parameters
///
/// Walks the JSON tree and replaces the value of any key whose name
/// contains a sensitive fragment. Structure is otherwise preserved so the
/// audit row still shows which parameters were sent.
pub fn sanitize_params(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sanitized = map
                .iter()
                .map(|(key, val)| {
                    let lowered = key.to_lowercase();
                    if SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lowered.contains(f)) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), sanitize_params(val))
                    }
                })
                .collect();
            Value::Object(sanitized)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_params).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_sensitive_keys() {
        let params = json!({
            "startDate": "2024-01-01",
            "accessToken": "oauth-secret-value",
            "Authorization": "Bearer abc",
            "api_key": "k-123",
            "pageSize": 100,
        });

        let sanitized = sanitize_params(&params);

        assert_eq!(sanitized["startDate"], "2024-01-01");
        assert_eq!(sanitized["pageSize"], 100);
        assert_eq!(sanitized["accessToken"], "***");
        assert_eq!(sanitized["Authorization"], "***");
        assert_eq!(sanitized["api_key"], "***");
    }

    #[test]
    fn test_sanitize_recurses_into_nested_structures() {
        let params = json!({
            "filters": [{"clientSecret": "s", "field": "clicks"}],
            "auth": {"refreshToken": "r", "region": "eu"},
        });

        let sanitized = sanitize_params(&params);

        assert_eq!(sanitized["filters"][0]["clientSecret"], "***");
        assert_eq!(sanitized["filters"][0]["field"], "clicks");
        assert_eq!(sanitized["auth"]["refreshToken"], "***");
        assert_eq!(sanitized["auth"]["region"], "eu");
    }

    #[test]
    fn test_sanitize_leaves_scalars_untouched() {
        assert_eq!(sanitize_params(&json!(null)), json!(null));
        assert_eq!(sanitize_params(&json!(42)), json!(42));
        assert_eq!(sanitize_params(&json!("plain")), json!("plain"));
    }

    #[test]
    fn test_failure_context_uses_synthetic_code() {
        let attempt =
            AttemptContext::failure(json!({"a": 1}), None, 504, "poll deadline".to_string());
        assert_eq!(attempt.response_code, 504);
        assert_eq!(attempt.response_body, "poll deadline");
        assert_eq!(attempt.response_dttm, attempt.receive_dttm);
        assert_eq!(attempt.send_dttm, attempt.response_dttm);
    }
}
