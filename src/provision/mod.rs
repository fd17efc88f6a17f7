//! Provisions an instance, flashes firmware onto it and exercises it.
//!
//! The workflow authenticates, resolves the project, board model and base
//! software, creates an instance, waits for it to boot, uploads the firmware,
//! reboots, waits again and finally runs the optional acceptance test. Once
//! the instance exists it is deleted exactly once on every exit path,
//! including when the whole-run budget expires.

mod error;

use std::fmt::Display;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::time::timeout_at;
use uuid::Uuid;

use crate::acceptance::{AcceptanceTest, TestError};
use crate::config::{
    AvhConfig, DEFAULT_BOOT_TIMEOUT_SECS, DEFAULT_INSTANCE_NAME_PREFIX, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RUN_TIMEOUT_SECS, DEFAULT_TEST_TIMEOUT_SECS,
};
use crate::farm::{
    ApiToken, CreateInstanceRequest, DeviceFarm, Instance, InstanceId, InstanceState, Model,
};
use crate::firmware::FirmwareImage;
use crate::wait::{WaitError, deadline_after, wait_for_state};

pub use error::ProvisionError;

const NAME_SUFFIX_LEN: usize = 8;

/// Budgets and naming used by a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkflowSettings {
    /// Budget for the whole run, cleanup excluded.
    pub run_timeout: Duration,
    /// Budget for each wait on the `on` state.
    pub boot_timeout: Duration,
    /// Budget for the acceptance test.
    pub test_timeout: Duration,
    /// Interval between state polls.
    pub poll_interval: Duration,
    /// Prefix of generated instance names.
    pub instance_name_prefix: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            boot_timeout: Duration::from_secs(DEFAULT_BOOT_TIMEOUT_SECS),
            test_timeout: Duration::from_secs(DEFAULT_TEST_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            instance_name_prefix: DEFAULT_INSTANCE_NAME_PREFIX.to_owned(),
        }
    }
}

impl From<&AvhConfig> for WorkflowSettings {
    fn from(config: &AvhConfig) -> Self {
        Self {
            run_timeout: config.run_timeout(),
            boot_timeout: config.boot_timeout(),
            test_timeout: config.test_timeout(),
            poll_interval: config.poll_interval(),
            instance_name_prefix: config.instance_name_prefix.clone(),
        }
    }
}

/// Inputs of a single run.
#[derive(Clone, Debug)]
pub struct ProvisionRequest {
    /// API token exchanged for a session.
    pub api_token: ApiToken,
    /// Board identifier matched as a prefix of catalog flavors.
    pub board: String,
    /// Firmware flashed after the first boot.
    pub firmware: FirmwareImage,
}

/// Result of a successful run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOutcome {
    /// Instance that was provisioned and has since been deleted.
    pub instance: Instance,
    /// Name of the acceptance test that passed, when one ran.
    pub test: Option<String>,
}

/// Failure of a step that runs while the instance exists.
#[derive(Debug, Error)]
enum StageFailure<E>
where
    E: std::error::Error + 'static,
{
    #[error("{0}")]
    Boot(WaitError<E>),
    #[error("{0}")]
    Upload(E),
    #[error("{0}")]
    Reboot(E),
    #[error("{0}")]
    Test(TestError),
    #[error("run did not finish within {0} seconds")]
    RunTimeout(u64),
}

impl<E> StageFailure<E>
where
    E: std::error::Error + 'static,
{
    fn into_error(self, message: String) -> ProvisionError<E> {
        match self {
            Self::Boot(source) => ProvisionError::Boot { message, source },
            Self::Upload(source) => ProvisionError::Upload { message, source },
            Self::Reboot(source) => ProvisionError::Reboot { message, source },
            Self::Test(source) => ProvisionError::Test { message, source },
            Self::RunTimeout(seconds) => ProvisionError::Timeout { seconds, message },
        }
    }
}

/// Executes provisioning runs against a device farm.
#[derive(Debug)]
pub struct ProvisioningWorkflow<F> {
    farm: F,
    settings: WorkflowSettings,
}

impl<F> ProvisioningWorkflow<F>
where
    F: DeviceFarm,
{
    /// Creates a workflow with default settings.
    #[must_use]
    pub fn new(farm: F) -> Self {
        Self {
            farm,
            settings: WorkflowSettings::default(),
        }
    }

    /// Replaces every setting.
    #[must_use]
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Overrides the whole-run budget.
    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.settings.run_timeout = timeout;
        self
    }

    /// Overrides the budget for each boot wait.
    #[must_use]
    pub const fn with_boot_timeout(mut self, timeout: Duration) -> Self {
        self.settings.boot_timeout = timeout;
        self
    }

    /// Overrides the acceptance-test budget.
    #[must_use]
    pub const fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.settings.test_timeout = timeout;
        self
    }

    /// Overrides the state polling interval.
    ///
    /// This is primarily used by tests to keep polling scenarios short.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// Returns the device farm the workflow drives.
    #[must_use]
    pub const fn farm(&self) -> &F {
        &self.farm
    }

    /// Returns the active settings.
    #[must_use]
    pub const fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Runs the workflow and, when `test` is given, the acceptance test.
    ///
    /// Failures before the instance exists return without cleanup. Every
    /// later failure deletes the instance before returning; when that delete
    /// fails too, the note is appended to the error message. After a clean
    /// run a failed delete is reported as [`ProvisionError::Teardown`].
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when any step, the acceptance test, the
    /// run budget or the final delete fails.
    pub async fn execute(
        &self,
        request: &ProvisionRequest,
        test: Option<&dyn AcceptanceTest<F>>,
    ) -> Result<RunOutcome, ProvisionError<F::Error>> {
        let run_deadline = deadline_after(self.settings.run_timeout);

        let instance = match timeout_at(run_deadline, self.create_instance(request)).await {
            Ok(created) => created?,
            Err(_) => {
                let failure = StageFailure::RunTimeout(self.settings.run_timeout.as_secs());
                let message = failure.to_string();
                return Err(failure.into_error(message));
            }
        };
        tracing::info!(instance = %instance.id, name = %instance.name, "instance created");

        let stages = match timeout_at(run_deadline, self.exercise(&instance, request, test)).await
        {
            Ok(result) => result,
            Err(_) => Err(StageFailure::RunTimeout(self.settings.run_timeout.as_secs())),
        };

        match stages {
            Ok(test_name) => {
                self.farm
                    .delete_instance(&instance.id)
                    .await
                    .map_err(ProvisionError::Teardown)?;
                tracing::info!(instance = %instance.id, "instance deleted");
                Ok(RunOutcome {
                    instance,
                    test: test_name,
                })
            }
            Err(failure) => Err(self.fail_and_delete(&instance.id, failure).await),
        }
    }

    async fn create_instance(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Instance, ProvisionError<F::Error>> {
        self.farm
            .authenticate(&request.api_token)
            .await
            .map_err(ProvisionError::Authenticate)?;
        tracing::info!("authenticated");

        let projects = self
            .farm
            .list_projects()
            .await
            .map_err(|source| ProvisionError::Catalog {
                operation: "list projects",
                source,
            })?;
        let project = projects
            .into_iter()
            .next()
            .ok_or(ProvisionError::NoProjects)?;

        let models = self
            .farm
            .list_models()
            .await
            .map_err(|source| ProvisionError::Catalog {
                operation: "list models",
                source,
            })?;
        let model =
            select_model(&models, &request.board).ok_or_else(|| ProvisionError::BoardNotFound {
                board: request.board.clone(),
            })?;
        tracing::info!(board = %request.board, model = %model.name, flavor = %model.flavor, "board resolved");

        let software = self
            .farm
            .list_model_software(&model.model)
            .await
            .map_err(|source| ProvisionError::Catalog {
                operation: "list model software",
                source,
            })?;
        let base = software
            .into_iter()
            .next()
            .ok_or_else(|| ProvisionError::NoSoftware {
                model: model.model.clone(),
            })?;

        let create = CreateInstanceRequest {
            name: generate_instance_name(&self.settings.instance_name_prefix, &model.name),
            project: project.id,
            flavor: model.flavor.clone(),
            os: base.version,
            osbuild: base.buildid,
        };
        tracing::info!(name = %create.name, os = %create.os, "creating instance");
        self.farm
            .create_instance(&create)
            .await
            .map_err(ProvisionError::Provision)
    }

    async fn exercise(
        &self,
        instance: &Instance,
        request: &ProvisionRequest,
        test: Option<&dyn AcceptanceTest<F>>,
    ) -> Result<Option<String>, StageFailure<F::Error>> {
        self.await_boot(&instance.id)
            .await
            .map_err(StageFailure::Boot)?;
        tracing::info!(instance = %instance.id, "instance booted");

        let upload = request.firmware.upload_for(instance.id.clone());
        let image = self
            .farm
            .create_image(&upload)
            .await
            .map_err(StageFailure::Upload)?;
        tracing::info!(image = %image.id, name = %image.name, "firmware uploaded");

        self.farm
            .reboot_instance(&instance.id)
            .await
            .map_err(StageFailure::Reboot)?;
        self.await_boot(&instance.id)
            .await
            .map_err(StageFailure::Boot)?;
        tracing::info!(instance = %instance.id, "instance rebooted");

        let Some(acceptance) = test else {
            return Ok(None);
        };
        self.run_test(acceptance, instance)
            .await
            .map_err(StageFailure::Test)?;
        tracing::info!(test = acceptance.name(), "acceptance test passed");
        Ok(Some(acceptance.name().to_owned()))
    }

    async fn await_boot(&self, id: &InstanceId) -> Result<(), WaitError<F::Error>> {
        let deadline = deadline_after(self.settings.boot_timeout);
        wait_for_state(
            &self.farm,
            id,
            InstanceState::ON,
            self.settings.poll_interval,
            deadline,
        )
        .await
    }

    async fn run_test(
        &self,
        test: &dyn AcceptanceTest<F>,
        instance: &Instance,
    ) -> Result<(), TestError> {
        let budget = self.settings.test_timeout;
        let deadline = deadline_after(budget);
        tracing::info!(test = test.name(), "running acceptance test");
        timeout_at(deadline, test.run(&self.farm, instance, deadline))
            .await
            .unwrap_or(Err(TestError::Timeout {
                seconds: budget.as_secs(),
            }))
    }

    async fn fail_and_delete(
        &self,
        id: &InstanceId,
        failure: StageFailure<F::Error>,
    ) -> ProvisionError<F::Error> {
        let teardown_error = self.farm.delete_instance(id).await.err();
        if let Some(err) = teardown_error.as_ref() {
            tracing::error!(instance = %id, error = %err, "failed to delete instance");
        }
        let message = append_teardown_note(failure.to_string(), teardown_error.as_ref());
        failure.into_error(message)
    }
}

/// Returns the first model, in catalog order, whose flavor starts with
/// `board`. Matching is case sensitive.
#[must_use]
pub fn select_model<'a>(models: &'a [Model], board: &str) -> Option<&'a Model> {
    models.iter().find(|model| model.flavor.starts_with(board))
}

/// Formats an instance name as `<prefix>-<model>-<unix millis>-<suffix>`.
#[must_use]
pub fn instance_name(prefix: &str, model_name: &str, unix_millis: u128, suffix: &str) -> String {
    format!("{prefix}-{model_name}-{unix_millis}-{suffix}")
}

fn generate_instance_name(prefix: &str, model_name: &str) -> String {
    let unix_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(NAME_SUFFIX_LEN)
        .collect();
    instance_name(prefix, model_name, unix_millis, &suffix)
}

fn append_teardown_note<E: Display>(message: String, teardown_error: Option<&E>) -> String {
    if let Some(teardown) = teardown_error {
        format!("{message} (teardown also failed: {teardown})")
    } else {
        message
    }
}

#[cfg(test)]
mod tests;
