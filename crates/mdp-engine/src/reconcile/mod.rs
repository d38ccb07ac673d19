//! Time-series gap reconciliation
//!
//! Keeps partitioned tables contiguous: missing date (or date+hour) buckets
//! inside the existing `[min, max]` range are synthesized by copying the
//! nearest earlier available bucket forward, rewriting the bucket column
//! and nulling caller-specified volatile columns. Buckets are processed in
//! ascending order, so a just-synthesized bucket can itself be the source
//! for the next gap; fills only ever move forward. Existing buckets are
//! never mutated.

use chrono::{Days, NaiveDate};
use sqlx::PgPool;
use tracing::info;

use crate::error::{EngineResult, PipelineError};

/// One time bucket of a partitioned table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket {
    pub date: NaiveDate,
    /// Present for hourly tables, 0..=23
    pub hour: Option<i32>,
}

impl Bucket {
    pub fn daily(date: NaiveDate) -> Self {
        Self { date, hour: None }
    }

    pub fn hourly(date: NaiveDate, hour: i32) -> Self {
        Self {
            date,
            hour: Some(hour),
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.hour {
            Some(hour) => write!(f, "{} {:02}:00", self.date, hour),
            None => write!(f, "{}", self.date),
        }
    }
}

/// One synthesized bucket and the bucket its rows are copied from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillStep {
    pub missing: Bucket,
    pub source: Bucket,
}

/// Describes the table a reconciliation run operates on
#[derive(Debug, Clone)]
pub struct GapFillSpec {
    pub table: String,
    pub date_column: String,
    /// Set for hourly tables; the hour column becomes part of the bucket key
    pub hour_column: Option<String>,
    /// Columns carried verbatim onto synthesized rows
    pub copy_columns: Vec<String>,
    /// Subset of `copy_columns` nulled on synthesized rows (volatile values
    /// that must not be carried forward, e.g. request provenance)
    pub volatile_columns: Vec<String>,
    /// Subset of `copy_columns` replaced with an empty array instead of
    /// NULL, for NOT NULL list columns
    pub empty_list_columns: Vec<String>,
}

impl GapFillSpec {
    fn validate(&self) -> EngineResult<()> {
        let mut idents: Vec<&str> = vec![&self.table, &self.date_column];
        if let Some(ref hour) = self.hour_column {
            idents.push(hour);
        }
        idents.extend(self.copy_columns.iter().map(String::as_str));
        idents.extend(self.volatile_columns.iter().map(String::as_str));
        idents.extend(self.empty_list_columns.iter().map(String::as_str));

        for ident in idents {
            if !is_valid_identifier(ident) {
                return Err(PipelineError::Configuration(format!(
                    "invalid SQL identifier in gap fill spec: {:?}",
                    ident
                )));
            }
        }

        for volatile in self.volatile_columns.iter().chain(&self.empty_list_columns) {
            if !self.copy_columns.contains(volatile) {
                return Err(PipelineError::Configuration(format!(
                    "volatile column {:?} is not in copy_columns",
                    volatile
                )));
            }
        }

        for column in &self.empty_list_columns {
            if self.volatile_columns.contains(column) {
                return Err(PipelineError::Configuration(format!(
                    "column {:?} is both nulled and list-emptied",
                    column
                )));
            }
        }

        Ok(())
    }
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Plan forward carry-fill for daily buckets
pub fn plan_daily_fill(existing: &[NaiveDate]) -> Vec<FillStep> {
    let buckets: Vec<Bucket> = existing.iter().copied().map(Bucket::daily).collect();
    plan_fill(&buckets)
}

/// Plan forward carry-fill over a set of existing buckets
///
/// Missing buckets are the contiguous range between the minimum and
/// maximum existing bucket, minus the existing set. Each step's source is
/// the immediately preceding bucket in the contiguous sequence, which by
/// ascending processing order is always available (existing or already
/// synthesized).
pub fn plan_fill(existing: &[Bucket]) -> Vec<FillStep> {
    let mut sorted: Vec<Bucket> = existing.to_vec();
    sorted.sort();
    sorted.dedup();

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };

    let present: std::collections::HashSet<Bucket> = sorted.iter().copied().collect();
    let mut steps = Vec::new();

    let mut previous = *first;
    let mut current = next_bucket(*first);
    while current <= *last {
        if !present.contains(&current) {
            steps.push(FillStep {
                missing: current,
                source: previous,
            });
        }
        previous = current;
        current = next_bucket(current);
    }

    steps
}

fn next_bucket(bucket: Bucket) -> Bucket {
    match bucket.hour {
        None => Bucket::daily(bucket.date + Days::new(1)),
        Some(23) => Bucket::hourly(bucket.date + Days::new(1), 0),
        Some(hour) => Bucket::hourly(bucket.date, hour + 1),
    }
}

/// Detects and backfills missing time buckets, directly against the store
pub struct GapReconciler {
    pool: PgPool,
}

impl GapReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fill every gap in the table; returns rows inserted
    pub async fn reconcile(&self, spec: &GapFillSpec) -> EngineResult<u64> {
        spec.validate()?;

        let existing = self.fetch_existing_buckets(spec).await?;
        let steps = plan_fill(&existing);

        if steps.is_empty() {
            info!(table = %spec.table, "No gaps to reconcile");
            return Ok(0);
        }

        info!(
            table = %spec.table,
            existing_buckets = existing.len(),
            missing_buckets = steps.len(),
            "Reconciling gaps"
        );

        let mut inserted = 0u64;
        for step in &steps {
            let count = self.fill_bucket(spec, step).await?;
            info!(
                table = %spec.table,
                missing = %step.missing,
                source = %step.source,
                rows = count,
                "Synthesized bucket"
            );
            inserted += count;
        }

        Ok(inserted)
    }

    async fn fetch_existing_buckets(&self, spec: &GapFillSpec) -> EngineResult<Vec<Bucket>> {
        match spec.hour_column {
            Some(ref hour_column) => {
                let sql = format!(
                    r#"SELECT DISTINCT "{date}", "{hour}" FROM "{table}" ORDER BY 1, 2"#,
                    date = spec.date_column,
                    hour = hour_column,
                    table = spec.table,
                );
                let rows: Vec<(NaiveDate, i32)> =
                    sqlx::query_as(&sql).fetch_all(&self.pool).await?;
                Ok(rows
                    .into_iter()
                    .map(|(date, hour)| Bucket::hourly(date, hour))
                    .collect())
            }
            None => {
                let sql = format!(
                    r#"SELECT DISTINCT "{date}" FROM "{table}" ORDER BY 1"#,
                    date = spec.date_column,
                    table = spec.table,
                );
                let rows: Vec<(NaiveDate,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
                Ok(rows.into_iter().map(|(date,)| Bucket::daily(date)).collect())
            }
        }
    }

    async fn fill_bucket(&self, spec: &GapFillSpec, step: &FillStep) -> EngineResult<u64> {
        let sql = build_fill_sql(spec);

        let mut query = sqlx::query(&sql).bind(step.missing.date);
        if spec.hour_column.is_some() {
            query = query.bind(step.missing.hour.unwrap_or(0));
        }
        query = query.bind(step.source.date);
        if spec.hour_column.is_some() {
            query = query.bind(step.source.hour.unwrap_or(0));
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Build the copy-forward insert for one synthesized bucket
///
/// Bind order: missing date [, missing hour], source date [, source hour].
fn build_fill_sql(spec: &GapFillSpec) -> String {
    let mut insert_columns = vec![format!(r#""{}""#, spec.date_column)];
    let mut select_exprs = vec!["$1".to_string()];
    let mut next_bind = 2;

    if let Some(ref hour_column) = spec.hour_column {
        insert_columns.push(format!(r#""{}""#, hour_column));
        select_exprs.push(format!("${}", next_bind));
        next_bind += 1;
    }

    for column in &spec.copy_columns {
        insert_columns.push(format!(r#""{}""#, column));
        if spec.volatile_columns.contains(column) {
            select_exprs.push("NULL".to_string());
        } else if spec.empty_list_columns.contains(column) {
            select_exprs.push("'{}'".to_string());
        } else {
            select_exprs.push(format!(r#""{}""#, column));
        }
    }

    let mut filter = format!(r#""{}" = ${}"#, spec.date_column, next_bind);
    next_bind += 1;
    if let Some(ref hour_column) = spec.hour_column {
        filter.push_str(&format!(r#" AND "{}" = ${}"#, hour_column, next_bind));
    }

    format!(
        r#"INSERT INTO "{table}" ({columns}) SELECT {exprs} FROM "{table}" WHERE {filter}"#,
        table = spec.table,
        columns = insert_columns.join(", "),
        exprs = select_exprs.join(", "),
        filter = filter,
    )
}
