//! Hosting scheduler
//!
//! Binds partition pipeline runs to an apalis job queue with PostgreSQL
//! storage. The queue layer owns the at-most-one-run-per-partition
//! contract and the bounded outer retry policy: a `RetryableFailure`
//! outcome is re-run up to the configured attempt count with a fixed
//! delay between attempts, then given up until the next scheduled
//! trigger. Fatal outcomes complete the job immediately.

use anyhow::Result;
use apalis::prelude::*;
use apalis_postgres::PostgresStorage;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::jobs::PipelineRunJob;
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::pipeline::target::ReportTarget;
use crate::pipeline::types::RunOutcome;

/// Shared state handed to every queue worker
pub struct SchedulerContext {
    pub orchestrator: PipelineOrchestrator,
    pub targets: HashMap<String, Arc<dyn ReportTarget>>,
    /// Bounded outer retry: total run attempts per queued job
    pub retry_attempts: u32,
    /// Fixed delay between those attempts
    pub retry_delay: Duration,
    /// Cancelling this token interrupts in-flight poll loops on shutdown
    pub shutdown: CancellationToken,
}

impl SchedulerContext {
    pub fn new(orchestrator: PipelineOrchestrator, config: &SchedulerConfig) -> Self {
        Self {
            orchestrator,
            targets: HashMap::new(),
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a report target under its name
    pub fn register(mut self, target: Arc<dyn ReportTarget>) -> Self {
        self.targets.insert(target.name().to_string(), target);
        self
    }
}

/// Job scheduler over apalis PostgreSQL storage
pub struct JobScheduler {
    config: SchedulerConfig,
    db: PgPool,
    context: Arc<SchedulerContext>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig, db: PgPool, context: Arc<SchedulerContext>) -> Self {
        Self {
            config,
            db,
            context,
        }
    }

    /// Enqueue one partition run
    pub async fn enqueue(&self, job: PipelineRunJob) -> Result<()> {
        let mut storage = PostgresStorage::new(&self.db);
        storage.push(job).await?;
        Ok(())
    }

    /// Start the queue workers
    pub async fn start(self) -> Result<JoinHandle<()>> {
        info!(
            worker_count = self.config.worker_count,
            retry_attempts = self.config.retry_attempts,
            retry_delay_secs = self.config.retry_delay_secs,
            "Starting job scheduler"
        );

        let storage: PostgresStorage<PipelineRunJob> = PostgresStorage::new(&self.db);
        let worker_count = self.config.worker_count;
        let context = self.context.clone();

        let handle = tokio::spawn(async move {
            info!(worker_count = worker_count, "Pipeline workers started");

            let mut monitor = Monitor::new();
            for _ in 0..worker_count {
                let storage = storage.clone();
                let context = context.clone();
                monitor = monitor.register(move |_index| {
                    WorkerBuilder::new("mdp-pipeline-worker")
                        .backend(storage.clone())
                        .data(context.clone())
                        .build(process_pipeline_job)
                });
            }

            if let Err(e) = monitor.run().await {
                error!("Pipeline worker error: {:?}", e);
            }
            info!("Pipeline workers stopped");
        });

        Ok(handle)
    }
}

/// Apalis entry point for one queued pipeline run
async fn process_pipeline_job(
    job: PipelineRunJob,
    context: Data<Arc<SchedulerContext>>,
) -> Result<()> {
    run_queued_job(&context, job).await
}

/// Execute one queued pipeline run under the bounded outer retry policy
///
/// Retryable failures are re-run up to `retry_attempts` times with
/// `retry_delay` between attempts; exhaustion completes the job with an
/// error log so only the next scheduled trigger tries again. Returning
/// `Err` is reserved for persistence failures, which the queue surfaces
/// as job failures.
pub async fn run_queued_job(context: &SchedulerContext, job: PipelineRunJob) -> Result<()> {
    let partition = job.partition();

    let Some(target) = context.targets.get(&job.target) else {
        // Unknown target is a configuration problem; retrying cannot fix it.
        error!(target = %job.target, partition = %partition, "No such report target registered");
        return Ok(());
    };

    for attempt in 1..=context.retry_attempts {
        let outcome = context
            .orchestrator
            .run(
                target.as_ref(),
                &partition,
                job.scheduled_at,
                context.shutdown.child_token(),
            )
            .await?;

        match outcome {
            RunOutcome::Success(rows) => {
                info!(target = %job.target, partition = %partition, rows_written = rows, "Run succeeded");
                return Ok(());
            }
            RunOutcome::Skipped => {
                info!(target = %job.target, partition = %partition, "Run skipped, no data yet");
                return Ok(());
            }
            RunOutcome::FatalFailure(reason) => {
                error!(
                    target = %job.target,
                    partition = %partition,
                    reason = %reason,
                    "Run failed fatally, waiting for next scheduled trigger"
                );
                return Ok(());
            }
            RunOutcome::RetryableFailure(reason) => {
                if attempt < context.retry_attempts {
                    warn!(
                        target = %job.target,
                        partition = %partition,
                        attempt = attempt,
                        max_attempts = context.retry_attempts,
                        reason = %reason,
                        "Run failed, retrying after delay"
                    );
                    if !context.retry_delay.is_zero() {
                        tokio::time::sleep(context.retry_delay).await;
                    }
                } else {
                    error!(
                        target = %job.target,
                        partition = %partition,
                        attempts = context.retry_attempts,
                        reason = %reason,
                        "Run attempts exhausted, waiting for next scheduled trigger"
                    );
                }
            }
        }
    }

    Ok(())
}
