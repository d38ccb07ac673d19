//! MDP Engine Library
//!
//! Ingestion and materialization engine for slow, job-based reporting
//! APIs (submit a job, poll its status, download the result).
//!
//! # Overview
//!
//! Each run covers exactly one `(business instant, tenant)` partition and
//! flows through two stages:
//!
//! - **Bronze**: drive the remote job to completion with bounded HTTP
//!   retries and persist the raw outcome, success or failure, as an
//!   append-only audit record.
//! - **Silver**: pick the authoritative bronze record for the partition,
//!   normalize it through the target's [`silver::Normalizer`], and upsert
//!   the rows with a freshness guard so replays converge.
//!
//! A separate [`reconcile::GapReconciler`] carries silver data forward
//! into date buckets the remote service never produced.
//!
//! # Architecture
//!
//! New report types plug in by implementing [`pipeline::ReportTarget`]
//! (request construction plus a normalizer); everything else, including
//! retry discipline, auditing, selection, and idempotent writes, is
//! shared engine code. Storage sits behind the [`bronze::BronzeStore`]
//! and [`silver::SilverStore`] traits, with PostgreSQL implementations
//! for production and in-memory ones in the integration tests.
//!
//! # Example
//!
//! ```no_run
//! use mdp_engine::config::EngineConfig;
//! use mdp_engine::http::RetryingInvoker;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::load()?;
//!     let invoker = RetryingInvoker::from_config(&config)?;
//!     // wire stores and targets, then hand off to the scheduler
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod auth;
pub mod bronze;
pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod jobs;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod silver;

pub use config::EngineConfig;
pub use error::{EngineResult, PipelineError};
pub use pipeline::{PartitionKey, PipelineOrchestrator, ReportTarget, RunOutcome};
