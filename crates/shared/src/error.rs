//! Client-facing error types.

use thiserror::Error;

/// Error raised by the REST collaborators.
///
/// Three-way split so callers can distinguish "could not reach the server"
/// from "the server said no" from "the server answered something we could
/// not decode".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}
