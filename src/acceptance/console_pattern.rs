//! Built-in test that waits for a console line matching a pattern.

use regex::Regex;
use tokio::time::Instant;

use crate::console::wait_for_pattern;
use crate::farm::{DeviceFarm, Instance};

use super::{AcceptanceTest, TestDefinition, TestError, TestFuture};

/// Definition kind handled by [`ConsolePatternTest`].
pub const CONSOLE_PATTERN_KIND: &str = "console-pattern";

/// Passes once the instance console prints a line matching the pattern.
#[derive(Clone, Debug)]
pub struct ConsolePatternTest {
    name: String,
    pattern: Regex,
}

impl ConsolePatternTest {
    /// Compiles `pattern` into a test.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::InvalidPattern`] when the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, TestError> {
        let compiled = Regex::new(pattern).map_err(|err| TestError::InvalidPattern {
            pattern: pattern.to_owned(),
            message: err.to_string(),
        })?;
        Ok(Self {
            name: String::from(CONSOLE_PATTERN_KIND),
            pattern: compiled,
        })
    }

    /// Renames the test for log output.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the compiled pattern.
    #[must_use]
    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Builds the test from a definition carrying a `pattern` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Definition`] when `pattern` is missing and
    /// [`TestError::InvalidPattern`] when it does not compile.
    pub fn from_definition(definition: &TestDefinition) -> Result<Self, TestError> {
        let pattern = definition
            .param("pattern")
            .ok_or_else(|| TestError::Definition {
                path: definition.source().to_owned(),
                message: String::from("console-pattern tests require a `pattern` value"),
            })?;
        let name = definition.name.as_deref().unwrap_or(CONSOLE_PATTERN_KIND);
        Ok(Self::new(pattern)?.named(name))
    }
}

impl<F: DeviceFarm> AcceptanceTest<F> for ConsolePatternTest {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        farm: &'a F,
        instance: &'a Instance,
        deadline: Instant,
    ) -> TestFuture<'a> {
        Box::pin(async move {
            let endpoint = farm
                .console_endpoint(&instance.id)
                .await
                .map_err(|err| TestError::Api(err.to_string()))?;
            let mut console = farm
                .open_console(&endpoint)
                .await
                .map_err(|err| TestError::Api(err.to_string()))?;

            tracing::info!(pattern = %self.pattern, "waiting for console pattern");
            let outcome = wait_for_pattern(&mut console, &self.pattern, deadline).await;
            if let Err(err) = console.close().await {
                tracing::warn!(error = %err, "failed to close console");
            }
            let found = outcome?;
            tracing::info!(line = %found.line, "console pattern matched");
            Ok(())
        })
    }
}
