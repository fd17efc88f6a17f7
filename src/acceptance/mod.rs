//! Acceptance tests run against a freshly flashed instance.
//!
//! A test is any value implementing [`AcceptanceTest`]: it receives the
//! authenticated device-farm handle, the instance and a deadline, and returns
//! `Ok(())` on pass. Tests described in definition files are built through a
//! [`TestRegistry`] keyed by the definition's `kind`.

mod console_pattern;
mod definition;
mod registry;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::time::Instant;

use crate::console::ConsoleError;
use crate::farm::{DeviceFarm, Instance};

pub use console_pattern::{CONSOLE_PATTERN_KIND, ConsolePatternTest};
pub use definition::TestDefinition;
pub use registry::{TestFactory, TestRegistry};

/// Future returned by [`AcceptanceTest::run`].
pub type TestFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TestError>> + Send + 'a>>;

/// Errors raised by acceptance tests and their definitions.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TestError {
    /// Raised by a test that ran to completion and observed a failure.
    #[error("{0}")]
    Failed(String),
    /// Raised when the test does not finish within its budget.
    #[error("test did not finish within {seconds} seconds")]
    Timeout {
        /// Budget in whole seconds.
        seconds: u64,
    },
    /// Raised when reading the console fails.
    #[error(transparent)]
    Console(#[from] ConsoleError),
    /// Raised when a device-farm call made by the test fails.
    #[error("device farm call failed: {0}")]
    Api(String),
    /// Raised when a console pattern does not compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        /// Pattern source.
        pattern: String,
        /// Compiler message.
        message: String,
    },
    /// Raised when a definition file cannot be read or parsed.
    #[error("invalid test definition {path}: {message}")]
    Definition {
        /// Definition file path.
        path: String,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when no factory is registered for a definition kind.
    #[error("unknown test kind `{kind}`")]
    UnknownKind {
        /// Kind named by the definition.
        kind: String,
    },
}

/// Capability implemented by acceptance tests.
pub trait AcceptanceTest<F: DeviceFarm>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Runs the test against `instance`, finishing before `deadline`.
    fn run<'a>(
        &'a self,
        farm: &'a F,
        instance: &'a Instance,
        deadline: Instant,
    ) -> TestFuture<'a>;
}
