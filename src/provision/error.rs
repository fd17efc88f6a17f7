//! Errors surfaced by a provisioning run.

use thiserror::Error;

use crate::acceptance::TestError;
use crate::wait::WaitError;

/// Errors surfaced while provisioning and exercising an instance.
///
/// Variants raised after the instance was created carry a `message` that
/// already includes any teardown failure.
#[derive(Debug, Error)]
pub enum ProvisionError<FarmError>
where
    FarmError: std::error::Error + 'static,
{
    /// Raised when the API token is rejected.
    #[error("failed to authenticate: {0}")]
    Authenticate(#[source] FarmError),
    /// Raised when a catalog listing fails.
    #[error("failed to {operation}: {source}")]
    Catalog {
        /// Listing being fetched.
        operation: &'static str,
        /// Provider error.
        #[source]
        source: FarmError,
    },
    /// Raised when the account has no projects.
    #[error("no projects are available to this account")]
    NoProjects,
    /// Raised when no catalog model matches the requested board.
    #[error("no board model with a flavor starting with `{board}`")]
    BoardNotFound {
        /// Board identifier supplied by the caller.
        board: String,
    },
    /// Raised when the chosen model has no base software.
    #[error("no software is available for model `{model}`")]
    NoSoftware {
        /// Model identifier.
        model: String,
    },
    /// Raised when creating the instance fails. Nothing is deleted.
    #[error("failed to create instance: {0}")]
    Provision(#[source] FarmError),
    /// Raised when the instance does not reach the `on` state.
    #[error("instance did not boot: {message}")]
    Boot {
        /// Human-readable description of the failure.
        message: String,
        /// Wait failure.
        #[source]
        source: WaitError<FarmError>,
    },
    /// Raised when the firmware upload fails.
    #[error("firmware upload failed: {message}")]
    Upload {
        /// Human-readable description of the failure.
        message: String,
        /// Provider error.
        #[source]
        source: FarmError,
    },
    /// Raised when the reboot request fails.
    #[error("instance reboot failed: {message}")]
    Reboot {
        /// Human-readable description of the failure.
        message: String,
        /// Provider error.
        #[source]
        source: FarmError,
    },
    /// Raised when the acceptance test fails or exceeds its budget.
    #[error("acceptance test failed: {message}")]
    Test {
        /// Human-readable description of the failure.
        message: String,
        /// Test failure.
        #[source]
        source: TestError,
    },
    /// Raised when the whole run exceeds its budget.
    #[error("{message}")]
    Timeout {
        /// Budget in whole seconds.
        seconds: u64,
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when deleting the instance fails after every step succeeded.
    #[error("failed to delete instance: {0}")]
    Teardown(#[source] FarmError),
}

impl<FarmError> ProvisionError<FarmError>
where
    FarmError: std::error::Error + 'static,
{
    /// Returns the acceptance-test failure behind this error, if any.
    #[must_use]
    pub const fn test_failure(&self) -> Option<&TestError> {
        match self {
            Self::Test { source, .. } => Some(source),
            _ => None,
        }
    }
}
