//! Per-partition pipeline orchestrator
//!
//! One run covers exactly one `(business instant, tenant)` partition:
//!
//! 1. **Bronze stage** — resolve the tenant credential, drive the remote
//!    job (submit, poll, download), and persist an audit record for the
//!    final outcome whatever it was. Failures are audited with a synthetic
//!    status code so they are inspectable without re-running anything.
//! 2. **Silver stage** — pick the authoritative bronze record, normalize
//!    it, and upsert the rows. No successful bronze record yet means a
//!    clean `Skipped`, not an error.
//!
//! Partitions run independently and may run concurrently; the orchestrator
//! holds no cross-partition state. At-most-one-run-per-partition is the
//! hosting scheduler's contract: correctness survives duplicate runs
//! because bronze is append-only and silver upserts are commutative, only
//! efficiency suffers.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::{AuthToken, CredentialResolver};
use crate::bronze::{select_best, AttemptContext, AuditPersister, BronzeStore};
use crate::error::{EngineResult, PipelineError};
use crate::http::{InvokeResponse, RetryingInvoker};
use crate::job::JobPollingClient;
use crate::pipeline::target::ReportTarget;
use crate::pipeline::types::{PartitionKey, RunContext, RunOutcome, RunStats};
use crate::silver::{NormalizeMeta, SilverStore};

/// Orchestrates bronze and silver stages for one partition at a time
pub struct PipelineOrchestrator {
    bronze: Arc<dyn BronzeStore>,
    silver: Arc<dyn SilverStore>,
    resolver: Arc<dyn CredentialResolver>,
    invoker: RetryingInvoker,
}

impl PipelineOrchestrator {
    pub fn new(
        bronze: Arc<dyn BronzeStore>,
        silver: Arc<dyn SilverStore>,
        resolver: Arc<dyn CredentialResolver>,
        invoker: RetryingInvoker,
    ) -> Self {
        Self {
            bronze,
            silver,
            resolver,
            invoker,
        }
    }

    /// Run the full pipeline for one partition
    ///
    /// Returns `Err` only for persistence failures; every other failure is
    /// classified into the returned [`RunOutcome`] for the scheduler.
    pub async fn run(
        &self,
        target: &dyn ReportTarget,
        partition: &PartitionKey,
        schedule_dttm: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> EngineResult<RunOutcome> {
        let mut stats = RunStats::start();
        let run = RunContext::new(schedule_dttm);

        info!(
            target = target.name(),
            partition = %partition,
            run_uuid = %run.run_uuid,
            "Pipeline run started"
        );

        // Bronze stage: credentials first, fail fast without one. Only the
        // next scheduled trigger retries an auth failure.
        let Some(auth) = self.resolver.resolve(partition.tenant_id).await? else {
            warn!(
                target = target.name(),
                partition = %partition,
                "No credential for tenant, failing fast"
            );
            return Ok(RunOutcome::FatalFailure(format!(
                "no credential for tenant {}",
                partition.tenant_id
            )));
        };

        if let Some(failure) = self
            .bronze_stage(target, partition, &run, &auth, cancel)
            .await?
        {
            let message = failure.to_string();
            return Ok(if failure.is_fatal() {
                RunOutcome::FatalFailure(message)
            } else {
                RunOutcome::RetryableFailure(message)
            });
        }

        // Silver stage, driven entirely by the audited bronze state.
        let records = self.bronze.fetch_partition(target.name(), partition).await?;
        let Some(best) = select_best(&records) else {
            warn!(
                target = target.name(),
                partition = %partition,
                "No successful bronze record for partition, skipping silver"
            );
            return Ok(RunOutcome::Skipped);
        };

        let meta = NormalizeMeta {
            partition: *partition,
            request_uuid: best.request_uuid,
            response_dttm: best.response_dttm,
        };
        let rows = target.normalizer().normalize(&best.response_body, &meta);
        stats.rows_normalized = rows.len() as u64;

        let written = self.silver.upsert(target.name(), &rows).await?;
        stats.rows_written = written;
        stats.complete();

        info!(
            target = target.name(),
            partition = %partition,
            run_uuid = %run.run_uuid,
            rows_normalized = stats.rows_normalized,
            rows_written = stats.rows_written,
            duration_secs = stats.duration_secs,
            "Pipeline run completed"
        );

        Ok(RunOutcome::Success(written))
    }

    /// Drive the remote job and audit its terminal outcome
    ///
    /// Returns `Ok(None)` when a 2xx payload was downloaded and audited,
    /// `Ok(Some(err))` for an audited failure, and `Err` only when the
    /// audit insert itself failed.
    async fn bronze_stage(
        &self,
        target: &dyn ReportTarget,
        partition: &PartitionKey,
        run: &RunContext,
        auth: &AuthToken,
        cancel: CancellationToken,
    ) -> EngineResult<Option<PipelineError>> {
        let persister = AuditPersister::new(self.bronze.clone());

        // The submit spec also supplies the audited request parameters, so
        // build it up front; a builder failure is a configuration problem.
        let (request_parameters, request_body) = match target.submit_request(partition, auth) {
            Ok(spec) => (spec.params, spec.body),
            Err(e) => {
                persister
                    .persist(
                        target.name(),
                        partition,
                        run,
                        AttemptContext::failure(
                            Value::Null,
                            None,
                            e.synthetic_code(),
                            e.to_string(),
                        ),
                    )
                    .await?;
                return Ok(Some(e));
            }
        };

        match self.execute_remote_job(target, partition, auth, cancel).await {
            Ok(response) => {
                let attempt = AttemptContext {
                    request_parameters,
                    request_body,
                    response_code: response.status as i32,
                    response_body: response.body,
                    send_dttm: response.sent_at,
                    response_dttm: response.response_at,
                    receive_dttm: response.received_at,
                };
                persister.persist(target.name(), partition, run, attempt).await?;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    target = target.name(),
                    partition = %partition,
                    run_uuid = %run.run_uuid,
                    error = %e,
                    "Bronze stage failed"
                );
                persister
                    .persist(
                        target.name(),
                        partition,
                        run,
                        AttemptContext::failure(
                            request_parameters,
                            request_body,
                            e.synthetic_code(),
                            e.to_string(),
                        ),
                    )
                    .await?;
                Ok(Some(e))
            }
        }
    }

    async fn execute_remote_job(
        &self,
        target: &dyn ReportTarget,
        partition: &PartitionKey,
        auth: &AuthToken,
        cancel: CancellationToken,
    ) -> EngineResult<InvokeResponse> {
        let client = JobPollingClient::new(&self.invoker, target, auth, cancel);

        let mut handle = client.submit(partition).await?;
        client.poll(&mut handle).await?;
        client.download(&handle).await
    }
}
