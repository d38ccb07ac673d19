//! MDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the MDP workspace.
//!
//! # Overview
//!
//! This crate provides the functionality used across all MDP workspace
//! members:
//!
//! - **Error Handling**: the shared `MdpError` and `Result` types
//! - **Logging**: centralized tracing initialization (`logging::init_logging`)

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{MdpError, Result};
