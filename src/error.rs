//! Error types for initial chunk placement.

use thiserror::Error;

/// Result type alias for placement operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for initial chunk placement.
///
/// Every variant is a synchronous return-path failure; nothing is retried
/// internally. Internal invariant violations are not represented here, they
/// abort via assertion instead of producing a corrupt layout.
#[derive(Error, Debug)]
pub enum Error {
    /// Illegal combination of request options (chunk count, presplit flag,
    /// shard distribution shape, conflicting zone/shard assignments).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The shard key does not have enough distinct values to produce the
    /// requested number of chunks.
    #[error(
        "the shard key does not have enough cardinality to make the required \
         number of chunks of {requested}, it can only make {achievable} chunks"
    )]
    InsufficientCardinality {
        /// Number of chunks the caller asked for.
        requested: usize,
        /// Number of chunks the available split points can support.
        achievable: usize,
    },

    /// A zone is set up in a way the chosen strategy cannot honor.
    #[error("zone {zone}: {reason}")]
    ZoneSetup {
        /// Label of the offending zone.
        zone: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The shard catalog snapshot could not be read or was unusable.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// The caller's operation context was cancelled; no partial result is
    /// returned.
    #[error("operation cancelled")]
    Cancelled,
}
