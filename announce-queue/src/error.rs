//! Error types for announce-queue
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the announcement queue engine
#[derive(Error, Debug)]
pub enum Error {
    /// Operation addressed a zone that has no queue
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// Operation addressed an event that is not in the zone's queue
    #[error("Event {event} not found in zone {zone}")]
    EventNotFound { zone: String, event: String },

    /// Timer requested for an instant that has already passed
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed control message
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] announce_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the announce-queue Error
pub type Result<T> = std::result::Result<T, Error>;
