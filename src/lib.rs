//! Core library for the AVH firmware runner.
//!
//! The crate provisions an Arm Virtual Hardware instance through a
//! [`farm::DeviceFarm`], flashes a firmware image onto it, optionally runs an
//! acceptance test against its console, and always deletes the instance once
//! it exists (authenticate → create → boot → flash → reboot → test → delete).

mod ambient;

pub mod acceptance;
pub mod avh;
pub mod config;
pub mod console;
pub mod farm;
pub mod firmware;
pub mod logging;
pub mod provision;
pub mod test_support;
pub mod wait;

pub use acceptance::{AcceptanceTest, ConsolePatternTest, TestDefinition, TestError, TestRegistry};
pub use avh::{AvhClient, AvhError};
pub use config::{AvhConfig, ConfigError};
pub use console::{ConsoleError, LineScanner, PatternMatch, wait_for_pattern};
pub use farm::{DeviceFarm, Instance, InstanceId, InstanceState};
pub use firmware::{FirmwareError, FirmwareImage};
pub use provision::{
    ProvisionError, ProvisionRequest, ProvisioningWorkflow, RunOutcome, WorkflowSettings,
};
pub use wait::{WaitError, wait_for_state};
