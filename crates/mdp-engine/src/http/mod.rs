//! Outbound HTTP plumbing
//!
//! All calls to remote analytics APIs go through [`RetryingInvoker`], which
//! owns the retry/backoff discipline. Callers see either a completed 2xx
//! exchange or a typed error; in-flight retries are invisible to them.

mod retry;

pub use retry::{InvokeResponse, RequestSpec, RetryPolicy, RetryingInvoker};
