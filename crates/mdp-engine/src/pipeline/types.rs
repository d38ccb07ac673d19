//! Core types for the ingestion pipeline
//!
//! A [`PartitionKey`] is the unit of idempotency: every bronze and silver
//! row belongs to exactly one `(business instant, tenant)` bucket, and
//! re-running a partition can only append audit rows and refresh silver
//! rows with strictly fresher data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `(business instant, tenant)` bucket a pipeline run operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// The business instant the data describes (not when it was fetched)
    pub business_dttm: DateTime<Utc>,
    pub tenant_id: Uuid,
}

impl PartitionKey {
    pub fn new(business_dttm: DateTime<Utc>, tenant_id: Uuid) -> Self {
        Self {
            business_dttm,
            tenant_id,
        }
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            self.business_dttm.format("%Y-%m-%dT%H:%M:%SZ"),
            self.tenant_id
        )
    }
}

/// Identity and timing of one orchestrated pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_uuid: Uuid,
    /// When the run actually started
    pub run_dttm: DateTime<Utc>,
    /// When the hosting scheduler intended the run to start
    pub run_schedule_dttm: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_schedule_dttm: DateTime<Utc>) -> Self {
        Self {
            run_uuid: Uuid::new_v4(),
            run_dttm: Utc::now(),
            run_schedule_dttm,
        }
    }
}

/// Immutable audit record of one remote attempt (bronze)
///
/// One row per attempt, append-only, never updated or deleted. Failed
/// attempts are recorded too, with a synthetic status code, so every run
/// is inspectable without re-execution.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BronzeRecord {
    pub request_uuid: Uuid,
    /// Pipeline target this attempt belongs to
    pub target: String,
    pub tenant_id: Uuid,
    pub business_dttm: DateTime<Utc>,
    /// When the final request of the attempt actually left this process
    pub send_dttm: DateTime<Utc>,
    /// When response headers arrived
    pub response_dttm: DateTime<Utc>,
    /// When the body was fully received
    pub receive_dttm: DateTime<Utc>,
    pub response_code: i32,
    pub response_body: String,
    /// Sanitized request parameters (secrets stripped before persist)
    pub request_parameters: serde_json::Value,
    pub request_body: Option<serde_json::Value>,
    pub run_uuid: Uuid,
    /// When the run started
    pub run_dttm: DateTime<Utc>,
    /// When the run was scheduled to start
    pub run_schedule_dttm: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
}

impl BronzeRecord {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.business_dttm, self.tenant_id)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_code)
    }
}

/// One normalized, typed silver row
///
/// Exactly one row exists per `(partition, natural_key)`; later attempts
/// with a strictly greater `response_dttm` overwrite it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SilverRecord {
    pub tenant_id: Uuid,
    pub business_dttm: DateTime<Utc>,
    /// Business-identifying key within the partition
    pub natural_key: String,
    /// Bronze attempt this row was derived from
    pub request_uuid: Uuid,
    pub response_dttm: DateTime<Utc>,
    /// Target-specific typed fields, serialized
    pub fields: serde_json::Value,
}

impl SilverRecord {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.business_dttm, self.tenant_id)
    }
}

/// Result of one pipeline run, reported to the hosting scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Bronze and silver both completed; carries rows written to silver
    Success(u64),
    /// No successful bronze record exists yet; silver cleanly skipped
    Skipped,
    /// The run failed but the next scheduled attempt may succeed
    RetryableFailure(String),
    /// The run failed in a way retrying cannot fix (config, credentials)
    FatalFailure(String),
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunOutcome::RetryableFailure(_) | RunOutcome::FatalFailure(_)
        )
    }
}

/// Statistics collected over one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub rows_normalized: u64,
    pub rows_written: u64,
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunStats {
    pub fn start() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        let completed = Utc::now();
        self.completed_at = Some(completed);
        if let Some(started) = self.started_at {
            self.duration_secs = (completed - started).num_milliseconds() as f64 / 1000.0;
        }
    }
}
