//! HTTP front end error types

use thiserror::Error;

/// Failures starting or running the HTTP front end
#[derive(Debug, Error)]
pub enum HttpError {
    /// `listen_address` did not parse, or the socket could not be bound
    /// (port in use, missing privileges)
    #[error("Failed to bind HTTP server to {address}: {source}")]
    BindError {
        address: String,
        source: std::io::Error,
    },

    /// The request timeout would cut a submission off before every provider
    /// has had its attempt
    #[error(
        "Request timeout of {request_timeout_secs}s must exceed the longest delivery pass of {longest_pass_secs}s"
    )]
    RequestTimeoutTooShort {
        request_timeout_secs: u64,
        longest_pass_secs: u64,
    },

    /// The accept loop stopped with an I/O error
    #[error("HTTP server error: {0}")]
    ServerError(String),
}
