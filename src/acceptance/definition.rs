//! Acceptance-test definition files.

use std::collections::BTreeMap;

use camino::Utf8Path;
use ortho_config::toml;
use serde::Deserialize;

use crate::ambient;

use super::TestError;

/// Declarative description of an acceptance test.
///
/// Definitions are TOML documents with a `kind`, an optional `name`, and
/// string parameters interpreted by the factory registered for the kind:
///
/// ```toml
/// name = "webserver banner"
/// kind = "console-pattern"
/// pattern = "STM32U5 Webserver Demonstration"
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct TestDefinition {
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Registry key selecting the test implementation.
    pub kind: String,
    /// Remaining string parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, String>,
    #[serde(skip)]
    source: String,
}

impl TestDefinition {
    /// Parses a definition from TOML text. `source` names the origin in
    /// error messages.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Definition`] when the text is not a valid
    /// definition.
    pub fn parse(contents: &str, source: &str) -> Result<Self, TestError> {
        let mut definition: Self =
            toml::from_str(contents).map_err(|err| TestError::Definition {
                path: source.to_owned(),
                message: err.to_string(),
            })?;
        if definition.kind.trim().is_empty() {
            return Err(TestError::Definition {
                path: source.to_owned(),
                message: String::from("`kind` must not be empty"),
            });
        }
        definition.source = source.to_owned();
        Ok(definition)
    }

    /// Reads and parses a definition file.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::Definition`] when the file cannot be read or
    /// parsed.
    pub fn load(path: &Utf8Path) -> Result<Self, TestError> {
        let contents = ambient::read_to_string(path).map_err(|message| TestError::Definition {
            path: path.to_string(),
            message,
        })?;
        Self::parse(&contents, path.as_str())
    }

    /// Looks up a string parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns where the definition was read from.
    #[must_use]
    pub const fn source(&self) -> &str {
        self.source.as_str()
    }
}
