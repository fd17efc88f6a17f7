//! Shared fixtures for provisioning BDD scenarios.

use avh_runner::test_support::{ScriptedFarm, ScriptedOutcome};
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub farm: ScriptedFarm,
    pub test: Option<ScriptedOutcome>,
    pub test_runs: usize,
    pub outcome: Option<ProvisionResult>,
}

#[derive(Clone, Debug)]
pub enum ProvisionResult {
    Success { test: Option<String> },
    Failure(String),
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    ProvisionContext {
        farm: ScriptedFarm::new(),
        test: None,
        test_runs: 0,
        outcome: None,
    }
}
