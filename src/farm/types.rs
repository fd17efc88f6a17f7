//! Newtypes for device-farm identifiers to avoid stringly-typed code.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrows the raw value.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }
    };
}

newtype!(
    /// Identifier assigned to an instance by the device farm.
    InstanceId
);
newtype!(
    /// Identifier of a project that owns instances.
    ProjectId
);
newtype!(
    /// Lifecycle state reported for an instance (`on`, `off`, `error`, ...).
    InstanceState
);

impl InstanceState {
    /// State reported once the instance has booted.
    pub const ON: &'static str = "on";
    /// State reported once the instance has powered down.
    pub const OFF: &'static str = "off";
    /// Terminal failure state.
    pub const ERROR: &'static str = "error";

    /// Returns `true` when the device farm reports the instance as failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.as_str() == Self::ERROR
    }
}
