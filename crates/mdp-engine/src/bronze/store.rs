//! Bronze persistence
//!
//! The audit table is append-only: inserts commit in their own transaction
//! and nothing ever updates or deletes a row.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::EngineResult;
use crate::pipeline::types::{BronzeRecord, PartitionKey};

/// Append-only store for bronze audit records
#[async_trait]
pub trait BronzeStore: Send + Sync {
    /// Append one attempt record; commits immediately
    async fn insert(&self, record: &BronzeRecord) -> EngineResult<()>;

    /// Fetch all attempt records for a target's partition
    async fn fetch_partition(
        &self,
        target: &str,
        partition: &PartitionKey,
    ) -> EngineResult<Vec<BronzeRecord>>;
}

/// Bronze store backed by the `bronze_responses` table
pub struct PgBronzeStore {
    pool: PgPool,
}

impl PgBronzeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BronzeStore for PgBronzeStore {
    async fn insert(&self, record: &BronzeRecord) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bronze_responses (
                request_uuid, target, tenant_id, business_dttm,
                send_dttm, response_dttm, receive_dttm, response_code,
                response_body, request_parameters, request_body,
                run_uuid, run_dttm, run_schedule_dttm, inserted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.request_uuid)
        .bind(&record.target)
        .bind(record.tenant_id)
        .bind(record.business_dttm)
        .bind(record.send_dttm)
        .bind(record.response_dttm)
        .bind(record.receive_dttm)
        .bind(record.response_code)
        .bind(&record.response_body)
        .bind(&record.request_parameters)
        .bind(&record.request_body)
        .bind(record.run_uuid)
        .bind(record.run_dttm)
        .bind(record.run_schedule_dttm)
        .bind(record.inserted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn fetch_partition(
        &self,
        target: &str,
        partition: &PartitionKey,
    ) -> EngineResult<Vec<BronzeRecord>> {
        let records = sqlx::query_as::<_, BronzeRecord>(
            r#"
            SELECT request_uuid, target, tenant_id, business_dttm,
                   send_dttm, response_dttm, receive_dttm, response_code,
                   response_body, request_parameters, request_body,
                   run_uuid, run_dttm, run_schedule_dttm, inserted_at
            FROM bronze_responses
            WHERE target = $1 AND tenant_id = $2 AND business_dttm = $3
            "#,
        )
        .bind(target)
        .bind(partition.tenant_id)
        .bind(partition.business_dttm)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
