//! Job definitions for the hosting scheduler
//!
//! One queued job corresponds to one partition's pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::types::PartitionKey;

/// Queued request to run one partition's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunJob {
    /// Name of the registered report target to run
    pub target: String,
    pub tenant_id: Uuid,
    /// Business instant of the partition
    pub business_dttm: DateTime<Utc>,
    /// When the scheduler intended the run to start
    pub scheduled_at: DateTime<Utc>,
}

impl PipelineRunJob {
    pub fn new(target: impl Into<String>, tenant_id: Uuid, business_dttm: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            tenant_id,
            business_dttm,
            scheduled_at: Utc::now(),
        }
    }

    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.business_dttm, self.tenant_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_partition() {
        let tenant = Uuid::new_v4();
        let business: DateTime<Utc> = "2024-06-01T00:00:00Z".parse().unwrap();
        let job = PipelineRunJob::new("orders", tenant, business);

        assert_eq!(job.target, "orders");
        assert_eq!(job.partition(), PartitionKey::new(business, tenant));
    }

    #[test]
    fn test_job_serializes_round_trip() {
        let job = PipelineRunJob::new("traffic", Uuid::new_v4(), Utc::now());
        let json = serde_json::to_string(&job).unwrap();
        let back: PipelineRunJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target, job.target);
        assert_eq!(back.tenant_id, job.tenant_id);
    }
}
