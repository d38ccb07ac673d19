//! Remote long-running job lifecycle
//!
//! Third-party analytics APIs expose reports as asynchronous jobs:
//! submit a request, poll its status, then download the result. The
//! [`JobPollingClient`] drives that lifecycle as an explicit state machine:
//!
//! ```text
//! Submitted -> Polling -> { Done | Error | TimedOut }
//! ```
//!
//! `download` is legal only from `Done`. Reaching the poll deadline is a
//! normal, audited transition to `TimedOut`, not a crash. Every outbound
//! call goes through the retrying invoker, so transient 429/5xx churn is
//! invisible here.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthToken;
use crate::error::{EngineResult, PipelineError};
use crate::http::{InvokeResponse, RetryingInvoker};
use crate::pipeline::target::ReportTarget;
use crate::pipeline::types::PartitionKey;

/// States of a remote report job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Polling,
    Done,
    Error,
    TimedOut,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Done => "done",
            JobState::Error => "error",
            JobState::TimedOut => "timed_out",
        }
    }
}

/// Handle to one submitted remote job
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub task_id: String,
    pub state: JobState,
}

/// Poll loop settings, supplied per target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Remote status values that mean the job finished successfully
    pub done_statuses: Vec<String>,
    /// Remote status values that mean the job failed
    pub error_statuses: Vec<String>,
    /// Fixed sleep between status checks
    pub poll_interval_secs: u64,
    /// Hard deadline on the whole poll loop
    pub poll_timeout_secs: u64,
}

/// Drives one remote job through submit, poll, and download
///
/// Owns no state between calls; the cancellation token lets the
/// orchestrator interrupt a poll sleep cleanly on shutdown.
pub struct JobPollingClient<'a> {
    invoker: &'a RetryingInvoker,
    target: &'a dyn ReportTarget,
    auth: &'a AuthToken,
    cancel: CancellationToken,
}

impl<'a> JobPollingClient<'a> {
    pub fn new(
        invoker: &'a RetryingInvoker,
        target: &'a dyn ReportTarget,
        auth: &'a AuthToken,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            invoker,
            target,
            auth,
            cancel,
        }
    }

    /// Submit the report request and obtain a task id
    ///
    /// A response without a task id is fatal for this invocation and is
    /// surfaced to the orchestrator rather than retried here.
    pub async fn submit(&self, partition: &PartitionKey) -> EngineResult<JobHandle> {
        let spec = self.target.submit_request(partition, self.auth)?;
        let response = self.invoker.invoke(&spec).await?;
        let body = response.json()?;

        let task_id = self.target.task_id(&body).ok_or_else(|| {
            PipelineError::RemoteJob("submit response did not contain a task id".to_string())
        })?;

        info!(
            target = self.target.name(),
            partition = %partition,
            task_id = %task_id,
            "Remote job submitted"
        );

        Ok(JobHandle {
            task_id,
            state: JobState::Submitted,
        })
    }

    /// Poll until the job reaches a terminal state
    ///
    /// Terminates on a target-supplied done status (`Ok`, state `Done`),
    /// an error status (`Err(RemoteJob)`, state `Error`), the deadline
    /// (`Err(Timeout)`, state `TimedOut`), or cancellation (treated as
    /// deadline expiry).
    pub async fn poll(&self, handle: &mut JobHandle) -> EngineResult<()> {
        if !matches!(handle.state, JobState::Submitted | JobState::Polling) {
            return Err(PipelineError::Configuration(format!(
                "poll is not legal from state {}",
                handle.state.as_str()
            )));
        }

        let settings = self.target.poll_settings();
        let interval = Duration::from_secs(settings.poll_interval_secs);
        let deadline = Duration::from_secs(settings.poll_timeout_secs);
        let started = Instant::now();

        handle.state = JobState::Polling;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                handle.state = JobState::TimedOut;
                warn!(
                    target = self.target.name(),
                    task_id = %handle.task_id,
                    elapsed_secs = elapsed.as_secs(),
                    "Poll deadline exceeded"
                );
                return Err(PipelineError::Timeout {
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            let spec = self.target.status_request(&handle.task_id, self.auth)?;
            let response = self.invoker.invoke(&spec).await?;
            let body = response.json()?;

            match self.target.job_status(&body) {
                Some(status) if settings.done_statuses.contains(&status) => {
                    handle.state = JobState::Done;
                    info!(
                        target = self.target.name(),
                        task_id = %handle.task_id,
                        status = %status,
                        "Remote job completed"
                    );
                    return Ok(());
                }
                Some(status) if settings.error_statuses.contains(&status) => {
                    handle.state = JobState::Error;
                    return Err(PipelineError::RemoteJob(format!(
                        "job {} reported status {}",
                        handle.task_id, status
                    )));
                }
                status => {
                    debug!(
                        target = self.target.name(),
                        task_id = %handle.task_id,
                        status = ?status,
                        "Remote job still running"
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    handle.state = JobState::TimedOut;
                    warn!(
                        target = self.target.name(),
                        task_id = %handle.task_id,
                        "Poll loop cancelled"
                    );
                    return Err(PipelineError::Timeout {
                        elapsed_secs: started.elapsed().as_secs(),
                    });
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Download the finished report payload
    ///
    /// Only legal once `poll` has transitioned the handle to `Done`.
    pub async fn download(&self, handle: &JobHandle) -> EngineResult<InvokeResponse> {
        if handle.state != JobState::Done {
            return Err(PipelineError::Configuration(format!(
                "download is only legal from state done, job {} is {}",
                handle.task_id,
                handle.state.as_str()
            )));
        }

        let spec = self.target.download_request(&handle.task_id, self.auth)?;
        self.invoker.invoke(&spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_round_trip() {
        for state in [
            JobState::Submitted,
            JobState::Polling,
            JobState::Done,
            JobState::Error,
            JobState::TimedOut,
        ] {
            assert!(!state.as_str().is_empty());
        }
        assert_eq!(JobState::TimedOut.as_str(), "timed_out");
    }
}
