//! Error types and result handling for stream-uplink.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Errors split into two families: permanent defects (bad topic names,
//! schema mismatches, malformed records, misuse of a closed sender) and
//! transient transport conditions the caller may retry. Use
//! [`Error::is_retryable`] to tell them apart without matching on every
//! variant.
//!
//! # Example
//!
//! ```rust
//! use stream_uplink::{Error, Result};
//!
//! fn upload() -> Result<()> {
//!     Err(Error::Transport("connection reset".to_string()))
//! }
//!
//! match upload() {
//!     Ok(()) => println!("sent"),
//!     Err(e) if e.is_retryable() => eprintln!("will retry: {}", e),
//!     Err(e) => eprintln!("giving up: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for stream-uplink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, typically from an invalid config file or
    /// environment override.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Topic name does not match `[A-Za-z][A-Za-z0-9_]*`.
    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    /// Topic schemas are missing required structure (absent schema, or a
    /// sensor topic without its mandatory fields).
    #[error("Invalid topic definition: {0}")]
    InvalidTopicDefinition(String),

    /// The remote schema for the requested version is incompatible with the
    /// local one. Signals a schema-evolution defect; never retried.
    #[error("Schema validation failed for subject {subject}: {message}")]
    SchemaValidationFailed {
        /// Registry subject the mismatch was detected for
        subject: String,
        /// Description of the incompatibility
        message: String,
    },

    /// The schema registry could not be reached or answered with a server
    /// failure. Transient; retry by re-invoking resolution.
    #[error("Schema registry unavailable: {0}")]
    SchemaRegistryUnavailable(String),

    /// A record's runtime shape does not match its bound schema. Always a
    /// caller bug; never retried.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Credentials were rejected (HTTP 401/403). Surfaced distinctly so the
    /// caller can refresh credentials before retrying.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Network or server failure while talking to the upload endpoint or
    /// the broker. Transient; retryable by the caller.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Programmer error, such as sending on a closed sender.
    #[error("Illegal usage: {0}")]
    IllegalUsage(String),

    /// Avro schema parsing or datum encoding error from the Avro library.
    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    /// Kafka client or producer error from the direct backend.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding registry requests.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the operation that produced this error may succeed if simply
    /// retried: transport failures and registry outages are transient,
    /// everything else is a permanent defect.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::SchemaRegistryUnavailable(_) | Error::Kafka(_)
        )
    }
}

/// A convenient Result type alias for stream-uplink operations.
///
/// This is equivalent to `std::result::Result<T, stream_uplink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
