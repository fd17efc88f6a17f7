//! BDD step definitions for the provisioning workflow.

use avh_runner::farm::ApiToken;
use avh_runner::test_support::{FarmCall, ScriptedFarm, ScriptedOutcome, ScriptedTest, model};
use avh_runner::{AcceptanceTest, FirmwareImage, ProvisionRequest, ProvisioningWorkflow};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;

use super::test_helpers::{ProvisionContext, ProvisionResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a device farm offering the \"{board}\" board")]
fn farm_offering(provision_context: ProvisionContext, board: String) -> ProvisionContext {
    let flavor = board.trim();
    provision_context.farm.set_models(vec![
        model("Raspberry Pi 4", "rpi4b"),
        model(&format!("{flavor} board"), &format!("{flavor}-kit")),
    ]);
    provision_context
}

#[given("the instance reports states \"{states}\"")]
fn instance_states(provision_context: ProvisionContext, states: String) -> ProvisionContext {
    provision_context.farm.push_states(states.split(','));
    provision_context
}

#[given("the firmware upload fails")]
fn upload_fails(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.farm.fail_on(FarmCall::CreateImage);
    provision_context
}

#[given("the farm fails to delete instances")]
fn delete_fails(provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.farm.fail_on(FarmCall::DeleteInstance);
    provision_context
}

#[given("an acceptance test that fails with \"{message}\"")]
fn failing_test(mut provision_context: ProvisionContext, message: String) -> ProvisionContext {
    provision_context.test = Some(ScriptedOutcome::Fail(message));
    provision_context
}

#[given("an acceptance test that never finishes")]
fn hanging_test(mut provision_context: ProvisionContext) -> ProvisionContext {
    provision_context.test = Some(ScriptedOutcome::Hang);
    provision_context
}

#[when("I provision the \"{board}\" board with firmware \"{firmware}\"")]
fn provision(
    provision_context: ProvisionContext,
    board: String,
    firmware: String,
) -> Result<ProvisionContext, StepError> {
    // A paused clock lets boot polls and test budgets elapse instantly.
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    let ProvisionContext { farm, test, .. } = provision_context;

    let workflow = ProvisioningWorkflow::new(farm.clone());
    let request = ProvisionRequest {
        api_token: ApiToken::new("tok1"),
        board,
        firmware: FirmwareImage::from_bytes(firmware, b"\x7fELF".to_vec()),
    };
    let scripted = test.clone().map(ScriptedTest::new);

    let result = runtime.block_on(async {
        let acceptance = scripted
            .as_ref()
            .map(|built| built as &dyn AcceptanceTest<ScriptedFarm>);
        workflow.execute(&request, acceptance).await
    });

    let outcome = match result {
        Ok(outcome) => ProvisionResult::Success { test: outcome.test },
        Err(err) => ProvisionResult::Failure(err.to_string()),
    };

    Ok(ProvisionContext {
        farm,
        test,
        test_runs: scripted.as_ref().map_or(0, ScriptedTest::runs),
        outcome: Some(outcome),
    })
}

#[then("the run succeeds")]
fn run_succeeds(provision_context: &ProvisionContext) -> Result<(), StepError> {
    match &provision_context.outcome {
        Some(ProvisionResult::Success { .. }) => Ok(()),
        Some(ProvisionResult::Failure(err)) => Err(StepError::Assertion(format!(
            "run failed unexpectedly: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run fails mentioning \"{expected}\"")]
fn run_fails(provision_context: &ProvisionContext, expected: String) -> Result<(), StepError> {
    match &provision_context.outcome {
        Some(ProvisionResult::Failure(err)) if err.contains(&expected) => Ok(()),
        Some(ProvisionResult::Failure(err)) => Err(StepError::Assertion(format!(
            "expected error containing '{expected}', got '{err}'"
        ))),
        Some(ProvisionResult::Success { test }) => Err(StepError::Assertion(format!(
            "expected failure, run succeeded with test {test:?}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the firmware \"{name}\" was uploaded once")]
fn firmware_uploaded(provision_context: &ProvisionContext, name: String) -> Result<(), StepError> {
    let uploads = provision_context.farm.uploads();
    match uploads.as_slice() {
        [upload] if upload.name == name => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected one upload of {name}, got {other:?}"
        ))),
    }
}

#[then("no firmware was uploaded")]
fn no_upload(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let count = provision_context.farm.count(FarmCall::CreateImage);
    if count == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected no uploads, got {count}")))
    }
}

#[then("the acceptance test ran once")]
fn test_ran_once(provision_context: &ProvisionContext) -> Result<(), StepError> {
    if provision_context.test_runs == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one test run, got {}",
            provision_context.test_runs
        )))
    }
}

#[then("the instance is deleted exactly once")]
fn deleted_once(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let deleted = provision_context.farm.deleted();
    if deleted.len() == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exactly one delete, got {deleted:?}"
        )))
    }
}

#[then("no instance was created")]
fn nothing_created(provision_context: &ProvisionContext) -> Result<(), StepError> {
    let created = provision_context.farm.count(FarmCall::CreateInstance);
    let deleted = provision_context.farm.count(FarmCall::DeleteInstance);
    if created == 0 && deleted == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no lifecycle calls, got {created} creates and {deleted} deletes"
        )))
    }
}
