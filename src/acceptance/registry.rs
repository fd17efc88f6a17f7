//! Registry mapping definition kinds to test factories.

use std::collections::BTreeMap;
use std::fmt;

use crate::farm::DeviceFarm;

use super::{AcceptanceTest, CONSOLE_PATTERN_KIND, ConsolePatternTest, TestDefinition, TestError};

/// Builds a test from its definition.
pub type TestFactory<F> = fn(&TestDefinition) -> Result<Box<dyn AcceptanceTest<F>>, TestError>;

/// Factories keyed by definition `kind`.
pub struct TestRegistry<F>
where
    F: DeviceFarm,
{
    factories: BTreeMap<String, TestFactory<F>>,
}

impl<F> TestRegistry<F>
where
    F: DeviceFarm,
{
    /// Creates a registry with no factories.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Creates a registry holding the built-in test kinds.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(CONSOLE_PATTERN_KIND, console_pattern_factory::<F>);
        registry
    }

    /// Registers `factory` under `kind`, replacing any previous factory.
    pub fn register(&mut self, kind: impl Into<String>, factory: TestFactory<F>) {
        self.factories.insert(kind.into(), factory);
    }

    /// Returns the registered kinds in sorted order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds the test described by `definition`.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::UnknownKind`] when no factory matches and
    /// propagates factory errors.
    pub fn build(
        &self,
        definition: &TestDefinition,
    ) -> Result<Box<dyn AcceptanceTest<F>>, TestError> {
        let factory = self
            .factories
            .get(&definition.kind)
            .ok_or_else(|| TestError::UnknownKind {
                kind: definition.kind.clone(),
            })?;
        factory(definition)
    }
}

impl<F> Default for TestRegistry<F>
where
    F: DeviceFarm,
{
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl<F> fmt::Debug for TestRegistry<F>
where
    F: DeviceFarm,
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TestRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn console_pattern_factory<F>(
    definition: &TestDefinition,
) -> Result<Box<dyn AcceptanceTest<F>>, TestError>
where
    F: DeviceFarm,
{
    Ok(Box::new(ConsolePatternTest::from_definition(definition)?))
}
