//! Silver persistence
//!
//! Conflict resolution is expressed entirely through primary-key upsert
//! semantics: an existing `(target, partition, natural key)` row is
//! overwritten only by a strictly fresher `response_dttm`, so re-applying
//! the same or older data in any order is a no-op and the final state is
//! independent of apply order.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::EngineResult;
use crate::pipeline::types::{PartitionKey, SilverRecord};

/// Idempotent store for normalized silver rows
#[async_trait]
pub trait SilverStore: Send + Sync {
    /// Upsert a batch of rows; returns the number actually written
    /// (inserted or overwritten; stale rows count as silent no-ops)
    async fn upsert(&self, target: &str, rows: &[SilverRecord]) -> EngineResult<u64>;

    /// Replace every row of one partition in a single transaction
    ///
    /// The only path that deletes silver rows, used by explicit full-day
    /// backfills.
    async fn replace_partition(
        &self,
        target: &str,
        partition: &PartitionKey,
        rows: &[SilverRecord],
    ) -> EngineResult<u64>;
}

/// Silver store backed by the `silver_records` table
pub struct PgSilverStore {
    pool: PgPool,
}

impl PgSilverStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO silver_records (
        target, tenant_id, business_dttm, natural_key,
        request_uuid, response_dttm, fields, inserted_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
    ON CONFLICT (target, tenant_id, business_dttm, natural_key) DO UPDATE SET
        request_uuid = EXCLUDED.request_uuid,
        response_dttm = EXCLUDED.response_dttm,
        fields = EXCLUDED.fields,
        updated_at = NOW()
    WHERE silver_records.response_dttm < EXCLUDED.response_dttm
"#;

#[async_trait]
impl SilverStore for PgSilverStore {
    async fn upsert(&self, target: &str, rows: &[SilverRecord]) -> EngineResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for row in rows {
            let result = sqlx::query(UPSERT_SQL)
                .bind(target)
                .bind(row.tenant_id)
                .bind(row.business_dttm)
                .bind(&row.natural_key)
                .bind(row.request_uuid)
                .bind(row.response_dttm)
                .bind(&row.fields)
                .execute(&mut *tx)
                .await?;

            // Guarded conflicts where the stored row is fresher affect zero
            // rows, which is exactly the silent no-op the contract requires.
            written += result.rows_affected();
        }

        tx.commit().await?;

        Ok(written)
    }

    async fn replace_partition(
        &self,
        target: &str,
        partition: &PartitionKey,
        rows: &[SilverRecord],
    ) -> EngineResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM silver_records
            WHERE target = $1 AND tenant_id = $2 AND business_dttm = $3
            "#,
        )
        .bind(target)
        .bind(partition.tenant_id)
        .bind(partition.business_dttm)
        .execute(&mut *tx)
        .await?;

        let mut written = 0u64;
        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO silver_records (
                    target, tenant_id, business_dttm, natural_key,
                    request_uuid, response_dttm, fields, inserted_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
                "#,
            )
            .bind(target)
            .bind(row.tenant_id)
            .bind(row.business_dttm)
            .bind(&row.natural_key)
            .bind(row.request_uuid)
            .bind(row.response_dttm)
            .bind(&row.fields)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;

        Ok(written)
    }
}
