//! Error types shared across MDP crates

use thiserror::Error;

/// Result type alias for MDP operations
pub type Result<T> = std::result::Result<T, MdpError>;

/// Main error type for MDP
#[derive(Error, Debug)]
pub enum MdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
