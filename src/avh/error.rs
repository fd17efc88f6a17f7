//! Error types for the AVH REST client.

use thiserror::Error;

use crate::console::ConsoleError;

/// Errors raised by [`super::AvhClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AvhError {
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Error reported by the HTTP stack.
        message: String,
    },
    /// Raised when a request cannot be sent or its body cannot be read.
    #[error("{operation} request failed: {message}")]
    Http {
        /// Remote operation being performed.
        operation: &'static str,
        /// Error reported by the HTTP stack.
        message: String,
    },
    /// Raised when the service answers with a non-success status.
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        /// Remote operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        /// Remote operation being performed.
        operation: &'static str,
        /// Deserialiser message.
        message: String,
    },
    /// Raised when an authenticated call is made before logging in.
    #[error("not authenticated; log in before calling {operation}")]
    Unauthenticated {
        /// Remote operation that was attempted.
        operation: &'static str,
    },
    /// Raised when the console connection fails.
    #[error(transparent)]
    Console(#[from] ConsoleError),
}
