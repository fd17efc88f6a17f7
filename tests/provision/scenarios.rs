//! BDD scenarios for the provisioning workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(
    path = "tests/features/provision.feature",
    name = "Flash firmware and delete the instance after a clean run"
)]
fn scenario_clean_run(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Delete an instance that fails while booting"
)]
fn scenario_boot_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Delete the instance when the firmware upload fails"
)]
fn scenario_upload_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Report a failing acceptance test and still delete the instance"
)]
fn scenario_failing_test(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Time out a hanging acceptance test and still delete the instance"
)]
fn scenario_hanging_test(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Report teardown failure after a failed step"
)]
fn scenario_teardown_failure(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Refuse an unknown board without creating an instance"
)]
fn scenario_unknown_board(provision_context: ProvisionContext) {
    let _ = provision_context;
}
