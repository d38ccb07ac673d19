//! Per-target pipeline capabilities
//!
//! Each marketplace report type plugs into the engine as one
//! [`ReportTarget`]: three request-building hooks (submit, status,
//! download), the poll settings, response extractors, and the normalizer
//! that turns a raw payload into typed silver rows. Targets are resolved
//! statically at configuration time; there is no name-based dispatch.

use serde_json::Value;

use crate::auth::AuthToken;
use crate::error::EngineResult;
use crate::http::RequestSpec;
use crate::job::PollSettings;
use crate::pipeline::types::PartitionKey;
use crate::silver::normalize::Normalizer;

/// Capability hooks for one report target
///
/// Request builders are pure: they construct a [`RequestSpec`] from the
/// partition and credential, and the invoker rebuilds the actual HTTP
/// request from it on every retry attempt. A builder returns
/// `PipelineError::Configuration` when the target cannot form a valid
/// request, which fails the run fatally.
pub trait ReportTarget: Send + Sync {
    /// Stable identifier, used as the bronze/silver `target` column
    fn name(&self) -> &str;

    fn poll_settings(&self) -> PollSettings;

    /// Build the report submission request for a partition
    fn submit_request(
        &self,
        partition: &PartitionKey,
        auth: &AuthToken,
    ) -> EngineResult<RequestSpec>;

    /// Build the status check request for a submitted job
    fn status_request(&self, task_id: &str, auth: &AuthToken) -> EngineResult<RequestSpec>;

    /// Build the result download request for a finished job
    fn download_request(&self, task_id: &str, auth: &AuthToken) -> EngineResult<RequestSpec>;

    /// Extract the task id from a submit response body
    fn task_id(&self, submit_body: &Value) -> Option<String> {
        submit_body
            .get("taskId")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Extract the job status from a status response body
    fn job_status(&self, status_body: &Value) -> Option<String> {
        status_body
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// The normalizer deriving silver rows from this target's payloads
    fn normalizer(&self) -> &dyn Normalizer;
}
