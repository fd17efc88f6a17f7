//! Unit tests for the provisioning workflow.

use std::time::Duration;

use rstest::rstest;
use tokio::time::Instant;

use super::*;
use crate::test_support::{
    FarmCall, SCRIPTED_INSTANCE_ID, ScriptedFarm, ScriptedOutcome, ScriptedTest, model,
};

fn request(board: &str) -> ProvisionRequest {
    ProvisionRequest {
        api_token: ApiToken::new("tok1"),
        board: board.to_owned(),
        firmware: FirmwareImage::from_bytes("fw.bin", b"firmware-bytes".to_vec()),
    }
}

fn workflow(farm: &ScriptedFarm) -> ProvisioningWorkflow<ScriptedFarm> {
    ProvisioningWorkflow::new(farm.clone())
}

#[tokio::test(start_paused = true)]
async fn provisions_flashes_and_deletes_in_order() {
    let farm = ScriptedFarm::new();

    let outcome = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(outcome.instance.id.as_str(), SCRIPTED_INSTANCE_ID);
    assert_eq!(outcome.test, None);
    assert_eq!(
        farm.calls(),
        vec![
            FarmCall::Authenticate,
            FarmCall::ListProjects,
            FarmCall::ListModels,
            FarmCall::ListModelSoftware,
            FarmCall::CreateInstance,
            FarmCall::InstanceState,
            FarmCall::CreateImage,
            FarmCall::RebootInstance,
            FarmCall::InstanceState,
            FarmCall::DeleteInstance,
        ]
    );
    assert_eq!(farm.token().as_deref(), Some("tok1"));
}

#[tokio::test(start_paused = true)]
async fn create_request_uses_first_project_model_and_software() {
    let farm = ScriptedFarm::new();

    workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    let created = farm.created();
    let [create] = created.as_slice() else {
        panic!("expected one create request, got {created:?}");
    };
    assert_eq!(create.project.as_str(), "project-1");
    assert_eq!(create.flavor, "stm32u5-b-u585i-iot02a");
    assert_eq!(create.os, "1.0.0");
    assert_eq!(create.osbuild, "build-1");
    assert!(
        create.name.starts_with("GHA-STM32U5 IoT Discovery Kit-"),
        "unexpected name: {}",
        create.name
    );
    assert_eq!(
        farm.software_queries(),
        vec![String::from("stm32u5-b-u585i-iot02a")]
    );
}

#[tokio::test(start_paused = true)]
async fn uploads_firmware_under_its_file_name() {
    let farm = ScriptedFarm::new();

    workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    let uploads = farm.uploads();
    let [upload] = uploads.as_slice() else {
        panic!("expected one upload, got {uploads:?}");
    };
    assert_eq!(upload.name, "fw.bin");
    assert_eq!(upload.kind, "fwbinary");
    assert_eq!(upload.encoding, "plain");
    assert_eq!(upload.instance.as_str(), SCRIPTED_INSTANCE_ID);
    assert_eq!(upload.payload, b"firmware-bytes");
}

#[tokio::test(start_paused = true)]
async fn waits_for_boot_before_and_after_reboot() {
    let farm = ScriptedFarm::new();
    farm.push_states(["creating", "booting", "on", "rebooting", "on"]);

    workflow(&farm)
        .with_poll_interval(Duration::from_secs(2))
        .execute(&request("stm32u5"), None)
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(farm.count(FarmCall::InstanceState), 5);
    let calls = farm.calls();
    let upload_at = calls
        .iter()
        .position(|call| *call == FarmCall::CreateImage)
        .unwrap_or_else(|| panic!("upload missing: {calls:?}"));
    let reboot_at = calls
        .iter()
        .position(|call| *call == FarmCall::RebootInstance)
        .unwrap_or_else(|| panic!("reboot missing: {calls:?}"));
    assert!(upload_at < reboot_at);
}

#[rstest]
#[case::first_flavor_prefix("stm32", "stm32u5-b-u585i-iot02a")]
#[case::exact_flavor("rpi4b", "rpi4b")]
fn selects_first_model_with_matching_flavor(#[case] board: &str, #[case] expected: &str) {
    let models = vec![
        model("Raspberry Pi 4", "rpi4b"),
        model("STM32U5 IoT Discovery Kit", "stm32u5-b-u585i-iot02a"),
        model("STM32H7", "stm32h7-nucleo"),
    ];
    let selected = select_model(&models, board).map(|found| found.flavor.as_str());
    assert_eq!(selected, Some(expected));
}

#[rstest]
#[case::unknown("esp32")]
#[case::case_sensitive("STM32U5")]
fn rejects_boards_without_matching_flavor(#[case] board: &str) {
    let models = vec![model("STM32U5 IoT Discovery Kit", "stm32u5-b-u585i-iot02a")];
    assert!(select_model(&models, board).is_none());
}

#[test]
fn formats_instance_names() {
    assert_eq!(
        instance_name("GHA", "rpi4b", 1_700_000_000_000, "a1b2c3d4"),
        "GHA-rpi4b-1700000000000-a1b2c3d4"
    );
}

#[test]
fn generated_names_are_unique() {
    let first = generate_instance_name("GHA", "rpi4b");
    let second = generate_instance_name("GHA", "rpi4b");
    assert_ne!(first, second);
    assert!(first.starts_with("GHA-rpi4b-"), "unexpected name: {first}");
}

#[tokio::test(start_paused = true)]
async fn missing_board_aborts_before_create() {
    let farm = ScriptedFarm::new();

    let err = workflow(&farm)
        .execute(&request("esp32"), None)
        .await
        .expect_err("unknown board should fail");

    assert!(
        matches!(err, ProvisionError::BoardNotFound { ref board } if board == "esp32"),
        "unexpected error: {err}"
    );
    assert_eq!(farm.count(FarmCall::CreateInstance), 0);
    assert!(farm.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_project_listing_is_fatal() {
    let farm = ScriptedFarm::new();
    farm.set_projects(Vec::new());

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("empty project listing should fail");

    assert!(matches!(err, ProvisionError::NoProjects), "unexpected error: {err}");
    assert_eq!(farm.count(FarmCall::ListModels), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_software_listing_is_fatal() {
    let farm = ScriptedFarm::new();
    farm.set_software(Vec::new());

    let err = workflow(&farm)
        .execute(&request("rpi"), None)
        .await
        .expect_err("empty software listing should fail");

    assert!(
        matches!(err, ProvisionError::NoSoftware { ref model } if model == "rpi4b"),
        "unexpected error: {err}"
    );
    assert_eq!(farm.count(FarmCall::CreateInstance), 0);
}

#[rstest]
#[case::authenticate(FarmCall::Authenticate)]
#[case::projects(FarmCall::ListProjects)]
#[case::models(FarmCall::ListModels)]
#[case::software(FarmCall::ListModelSoftware)]
#[case::create(FarmCall::CreateInstance)]
#[tokio::test(start_paused = true)]
async fn failures_before_creation_never_delete(#[case] failing: FarmCall) {
    let farm = ScriptedFarm::new();
    farm.fail_on(failing);

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("scripted failure should abort the run");

    let expected_variant = match failing {
        FarmCall::Authenticate => matches!(err, ProvisionError::Authenticate(_)),
        FarmCall::CreateInstance => matches!(err, ProvisionError::Provision(_)),
        _ => matches!(err, ProvisionError::Catalog { .. }),
    };
    assert!(expected_variant, "unexpected error: {err}");
    assert_eq!(farm.count(FarmCall::DeleteInstance), 0);
    assert_eq!(farm.calls().last(), Some(&failing));
}

#[tokio::test(start_paused = true)]
async fn instance_error_during_first_boot_deletes_instance() {
    let farm = ScriptedFarm::new();
    farm.push_states(["booting", "error"]);

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("instance error should fail the run");

    assert!(
        matches!(
            err,
            ProvisionError::Boot {
                source: WaitError::InstanceError { .. },
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert!(farm.uploads().is_empty());
    assert_eq!(farm.deleted(), vec![InstanceId::from(SCRIPTED_INSTANCE_ID)]);
}

#[tokio::test(start_paused = true)]
async fn instance_error_after_reboot_deletes_instance() {
    let farm = ScriptedFarm::new();
    farm.push_states(["on", "error"]);

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("instance error should fail the run");

    assert!(matches!(err, ProvisionError::Boot { .. }), "unexpected error: {err}");
    assert_eq!(farm.uploads().len(), 1);
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
}

#[tokio::test(start_paused = true)]
async fn boot_timeout_deletes_instance() {
    let farm = ScriptedFarm::new();
    farm.push_states(["booting"; 20]);

    let err = workflow(&farm)
        .with_boot_timeout(Duration::from_secs(5))
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("boot timeout should fail the run");

    assert!(
        matches!(
            err,
            ProvisionError::Boot {
                source: WaitError::Timeout { .. },
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
}

#[rstest]
#[case::upload(FarmCall::CreateImage)]
#[case::reboot(FarmCall::RebootInstance)]
#[tokio::test(start_paused = true)]
async fn failures_after_creation_delete_exactly_once(#[case] failing: FarmCall) {
    let farm = ScriptedFarm::new();
    farm.fail_on(failing);

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("scripted failure should fail the run");

    let expected_variant = match failing {
        FarmCall::CreateImage => matches!(err, ProvisionError::Upload { .. }),
        _ => matches!(err, ProvisionError::Reboot { .. }),
    };
    assert!(expected_variant, "unexpected error: {err}");
    assert_eq!(farm.deleted(), vec![InstanceId::from(SCRIPTED_INSTANCE_ID)]);
}

#[tokio::test(start_paused = true)]
async fn passing_test_is_reported_in_outcome() {
    let farm = ScriptedFarm::new();
    let test = ScriptedTest::new(ScriptedOutcome::Pass);

    let outcome = workflow(&farm)
        .execute(&request("stm32u5"), Some(&test))
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(outcome.test.as_deref(), Some("scripted"));
    assert_eq!(test.runs(), 1);
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
    assert_eq!(farm.calls().last(), Some(&FarmCall::DeleteInstance));
}

#[tokio::test(start_paused = true)]
async fn failing_test_deletes_instance_and_surfaces_reason() {
    let farm = ScriptedFarm::new();
    let test = ScriptedTest::new(ScriptedOutcome::Fail(String::from("banner missing")));

    let err = workflow(&farm)
        .execute(&request("stm32u5"), Some(&test))
        .await
        .expect_err("failing test should fail the run");

    assert_eq!(
        err.test_failure(),
        Some(&TestError::Failed(String::from("banner missing")))
    );
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_test_times_out_and_deletes_instance() {
    let farm = ScriptedFarm::new();
    let test = ScriptedTest::new(ScriptedOutcome::Hang);
    let started = Instant::now();

    let err = workflow(&farm)
        .with_test_timeout(Duration::from_secs(10))
        .execute(&request("stm32u5"), Some(&test))
        .await
        .expect_err("hanging test should fail the run");

    assert_eq!(err.test_failure(), Some(&TestError::Timeout { seconds: 10 }));
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn run_timeout_still_deletes_instance() {
    let farm = ScriptedFarm::new();
    let test = ScriptedTest::new(ScriptedOutcome::Hang);

    let err = workflow(&farm)
        .with_run_timeout(Duration::from_secs(20))
        .with_test_timeout(Duration::from_secs(600))
        .execute(&request("stm32u5"), Some(&test))
        .await
        .expect_err("run budget should expire");

    assert!(
        matches!(err, ProvisionError::Timeout { seconds: 20, .. }),
        "unexpected error: {err}"
    );
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
}

const UNBOUNDED: Duration = Duration::from_secs(u64::MAX);

type Widen = fn(ProvisioningWorkflow<ScriptedFarm>) -> ProvisioningWorkflow<ScriptedFarm>;

#[rstest]
#[case::test_budget(|flow: ProvisioningWorkflow<ScriptedFarm>| flow.with_test_timeout(UNBOUNDED))]
#[case::boot_budget(|flow: ProvisioningWorkflow<ScriptedFarm>| flow.with_boot_timeout(UNBOUNDED))]
#[case::run_budget(|flow: ProvisioningWorkflow<ScriptedFarm>| flow.with_run_timeout(UNBOUNDED))]
#[tokio::test(start_paused = true)]
async fn oversized_budgets_still_run_and_delete(#[case] widen: Widen) {
    let farm = ScriptedFarm::new();
    let test = ScriptedTest::new(ScriptedOutcome::Pass);

    let outcome = widen(workflow(&farm))
        .execute(&request("stm32u5"), Some(&test))
        .await
        .unwrap_or_else(|err| panic!("run should succeed: {err}"));

    assert_eq!(outcome.test.as_deref(), Some("scripted"));
    assert_eq!(test.runs(), 1);
    assert_eq!(farm.deleted(), vec![InstanceId::from(SCRIPTED_INSTANCE_ID)]);
}

#[tokio::test(start_paused = true)]
async fn oversized_test_budget_still_deletes_after_failure() {
    let farm = ScriptedFarm::new();
    let test = ScriptedTest::new(ScriptedOutcome::Fail(String::from("banner missing")));

    let err = workflow(&farm)
        .with_test_timeout(UNBOUNDED)
        .execute(&request("stm32u5"), Some(&test))
        .await
        .expect_err("failing test should fail the run");

    assert!(err.test_failure().is_some(), "unexpected error: {err}");
    assert_eq!(farm.deleted(), vec![InstanceId::from(SCRIPTED_INSTANCE_ID)]);
}

#[tokio::test(start_paused = true)]
async fn teardown_failure_after_success_is_reported() {
    let farm = ScriptedFarm::new();
    farm.fail_on(FarmCall::DeleteInstance);

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("failed delete should surface");

    assert!(matches!(err, ProvisionError::Teardown(_)), "unexpected error: {err}");
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_failure_after_failure_is_appended() {
    let farm = ScriptedFarm::new();
    farm.fail_on(FarmCall::CreateImage);
    farm.fail_on(FarmCall::DeleteInstance);

    let err = workflow(&farm)
        .execute(&request("stm32u5"), None)
        .await
        .expect_err("upload failure should surface");

    let ProvisionError::Upload { ref message, .. } = err else {
        panic!("expected upload error, got {err}");
    };
    assert!(
        message.contains("teardown also failed"),
        "message should note teardown failure: {message}"
    );
    assert_eq!(farm.count(FarmCall::DeleteInstance), 1);
}

#[test]
fn settings_follow_configuration() {
    let config = AvhConfig {
        endpoint: String::from("https://example.invalid/api"),
        test_timeout_secs: 5,
        run_timeout_secs: 60,
        boot_timeout_secs: 45,
        poll_interval_ms: 250,
        instance_name_prefix: String::from("CI"),
    };

    let settings = WorkflowSettings::from(&config);

    assert_eq!(settings.test_timeout, Duration::from_secs(5));
    assert_eq!(settings.run_timeout, Duration::from_secs(60));
    assert_eq!(settings.boot_timeout, Duration::from_secs(45));
    assert_eq!(settings.poll_interval, Duration::from_millis(250));
    assert_eq!(settings.instance_name_prefix, "CI");
}
