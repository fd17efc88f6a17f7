//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedFarm`] is an in-memory [`DeviceFarm`] that serves a fixed
//! catalog, replays queued instance states, records every call and fails on
//! demand. [`ScriptedTest`] is an acceptance test with a preset outcome.
//! [`EnvGuard`] serialises environment mutation for configuration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{StreamExt, future, stream};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::Instant;

use crate::acceptance::{AcceptanceTest, TestError, TestFuture};
use crate::console::ConsoleStream;
use crate::farm::{
    ApiToken, ConsoleEndpoint, CreateInstanceRequest, DeviceFarm, FarmFuture, Image, ImageUpload,
    Instance, InstanceId, InstanceState, Model, Project, ProjectId, Software,
};

/// Identifier given to every instance created by [`ScriptedFarm`].
pub const SCRIPTED_INSTANCE_ID: &str = "scripted-instance";

/// Remote operations recorded by [`ScriptedFarm`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FarmCall {
    /// `authenticate`
    Authenticate,
    /// `list_projects`
    ListProjects,
    /// `list_models`
    ListModels,
    /// `list_model_software`
    ListModelSoftware,
    /// `create_instance`
    CreateInstance,
    /// `instance_state`
    InstanceState,
    /// `create_image`
    CreateImage,
    /// `reboot_instance`
    RebootInstance,
    /// `delete_instance`
    DeleteInstance,
    /// `console_endpoint`
    ConsoleEndpoint,
    /// `open_console`
    OpenConsole,
}

/// Error returned by a call scripted to fail.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted {0:?} failure")]
pub struct ScriptedFarmError(pub FarmCall);

#[derive(Debug)]
struct FarmState {
    projects: Vec<Project>,
    models: Vec<Model>,
    software: Vec<Software>,
    states: VecDeque<InstanceState>,
    console_frames: Vec<Vec<u8>>,
    console_stays_open: bool,
    console_closes: usize,
    failures: BTreeSet<FarmCall>,
    calls: Vec<FarmCall>,
    token: Option<String>,
    created: Vec<CreateInstanceRequest>,
    uploads: Vec<ImageUpload>,
    deleted: Vec<InstanceId>,
    software_queries: Vec<String>,
}

impl Default for FarmState {
    fn default() -> Self {
        Self {
            projects: vec![Project {
                id: ProjectId::from("project-1"),
                name: String::from("Default Project"),
            }],
            models: vec![
                model("Raspberry Pi 4", "rpi4b"),
                model("STM32U5 IoT Discovery Kit", "stm32u5-b-u585i-iot02a"),
            ],
            software: vec![Software {
                version: String::from("1.0.0"),
                buildid: String::from("build-1"),
                filename: String::from("base.elf"),
            }],
            states: VecDeque::new(),
            console_frames: Vec::new(),
            console_stays_open: false,
            console_closes: 0,
            failures: BTreeSet::new(),
            calls: Vec::new(),
            token: None,
            created: Vec::new(),
            uploads: Vec::new(),
            deleted: Vec::new(),
            software_queries: Vec::new(),
        }
    }
}

/// Builds a catalog model whose `model` identifier equals its flavor.
#[must_use]
pub fn model(name: &str, flavor: &str) -> Model {
    Model {
        name: name.to_owned(),
        flavor: flavor.to_owned(),
        model: flavor.to_owned(),
        description: None,
    }
}

/// In-memory device farm driven by scripted responses.
#[derive(Clone, Debug, Default)]
pub struct ScriptedFarm {
    state: Arc<Mutex<FarmState>>,
}

impl ScriptedFarm {
    /// Creates a farm with a one-project, two-model, one-software catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, action: impl FnOnce(&mut FarmState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        action(&mut guard)
    }

    fn record(&self, call: FarmCall) -> Result<(), ScriptedFarmError> {
        self.with_state(|state| {
            state.calls.push(call);
            if state.failures.contains(&call) {
                Err(ScriptedFarmError(call))
            } else {
                Ok(())
            }
        })
    }

    /// Replaces the project listing.
    pub fn set_projects(&self, projects: Vec<Project>) {
        self.with_state(|state| state.projects = projects);
    }

    /// Replaces the model catalog.
    pub fn set_models(&self, models: Vec<Model>) {
        self.with_state(|state| state.models = models);
    }

    /// Replaces the software listing returned for every model.
    pub fn set_software(&self, software: Vec<Software>) {
        self.with_state(|state| state.software = software);
    }

    /// Queues states returned by successive polls. Once the queue is empty
    /// every poll reports `on`.
    pub fn push_states<'a>(&self, states: impl IntoIterator<Item = &'a str>) {
        self.with_state(|state| {
            state
                .states
                .extend(states.into_iter().map(InstanceState::from));
        });
    }

    /// Queues a console frame.
    pub fn push_console(&self, frame: &[u8]) {
        self.with_state(|state| state.console_frames.push(frame.to_vec()));
    }

    /// Keeps the console open after the queued frames instead of closing it.
    pub fn hold_console_open(&self) {
        self.with_state(|state| state.console_stays_open = true);
    }

    /// Makes every later `call` fail.
    pub fn fail_on(&self, call: FarmCall) {
        self.with_state(|state| {
            state.failures.insert(call);
        });
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<FarmCall> {
        self.with_state(|state| state.calls.clone())
    }

    /// Counts the recorded calls of one kind.
    #[must_use]
    pub fn count(&self, call: FarmCall) -> usize {
        self.with_state(|state| state.calls.iter().filter(|seen| **seen == call).count())
    }

    /// Returns the API token received by `authenticate`.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.with_state(|state| state.token.clone())
    }

    /// Returns every successful create request.
    #[must_use]
    pub fn created(&self) -> Vec<CreateInstanceRequest> {
        self.with_state(|state| state.created.clone())
    }

    /// Returns every successful image upload.
    #[must_use]
    pub fn uploads(&self) -> Vec<ImageUpload> {
        self.with_state(|state| state.uploads.clone())
    }

    /// Returns the instances passed to `delete_instance`.
    #[must_use]
    pub fn deleted(&self) -> Vec<InstanceId> {
        self.with_state(|state| state.deleted.clone())
    }

    /// Returns the model identifiers passed to `list_model_software`.
    #[must_use]
    pub fn software_queries(&self) -> Vec<String> {
        self.with_state(|state| state.software_queries.clone())
    }

    /// Returns how many opened consoles were explicitly closed.
    #[must_use]
    pub fn console_closes(&self) -> usize {
        self.with_state(|state| state.console_closes)
    }
}

impl DeviceFarm for ScriptedFarm {
    type Error = ScriptedFarmError;

    fn authenticate<'a>(&'a self, token: &'a ApiToken) -> FarmFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::Authenticate)?;
            self.with_state(|state| state.token = Some(token.expose().to_owned()));
            Ok(())
        })
    }

    fn list_projects(&self) -> FarmFuture<'_, Vec<Project>, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::ListProjects)?;
            Ok(self.with_state(|state| state.projects.clone()))
        })
    }

    fn list_models(&self) -> FarmFuture<'_, Vec<Model>, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::ListModels)?;
            Ok(self.with_state(|state| state.models.clone()))
        })
    }

    fn list_model_software<'a>(
        &'a self,
        model: &'a str,
    ) -> FarmFuture<'a, Vec<Software>, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::ListModelSoftware)?;
            Ok(self.with_state(|state| {
                state.software_queries.push(model.to_owned());
                state.software.clone()
            }))
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> FarmFuture<'a, Instance, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::CreateInstance)?;
            self.with_state(|state| state.created.push(request.clone()));
            Ok(Instance {
                id: InstanceId::from(SCRIPTED_INSTANCE_ID),
                name: request.name.clone(),
                state: InstanceState::from("creating"),
                flavor: request.flavor.clone(),
                os: request.os.clone(),
                osbuild: request.osbuild.clone(),
            })
        })
    }

    fn instance_state<'a>(
        &'a self,
        _id: &'a InstanceId,
    ) -> FarmFuture<'a, InstanceState, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::InstanceState)?;
            Ok(self.with_state(|state| {
                state
                    .states
                    .pop_front()
                    .unwrap_or_else(|| InstanceState::from(InstanceState::ON))
            }))
        })
    }

    fn create_image<'a>(&'a self, upload: &'a ImageUpload) -> FarmFuture<'a, Image, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::CreateImage)?;
            self.with_state(|state| state.uploads.push(upload.clone()));
            Ok(Image {
                id: String::from("scripted-image"),
                name: upload.name.clone(),
                status: Some(String::from("UPLOADED")),
            })
        })
    }

    fn reboot_instance<'a>(&'a self, _id: &'a InstanceId) -> FarmFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record(FarmCall::RebootInstance) })
    }

    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> FarmFuture<'a, (), Self::Error> {
        Box::pin(async move {
            // Deletion is recorded even when scripted to fail so tests can
            // count attempts.
            self.with_state(|state| state.deleted.push(id.clone()));
            self.record(FarmCall::DeleteInstance)
        })
    }

    fn console_endpoint<'a>(
        &'a self,
        id: &'a InstanceId,
    ) -> FarmFuture<'a, ConsoleEndpoint, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::ConsoleEndpoint)?;
            Ok(ConsoleEndpoint {
                url: format!("wss://console.invalid/{id}"),
            })
        })
    }

    fn open_console<'a>(
        &'a self,
        _endpoint: &'a ConsoleEndpoint,
    ) -> FarmFuture<'a, ConsoleStream, Self::Error> {
        Box::pin(async move {
            self.record(FarmCall::OpenConsole)?;
            let (frames, stays_open) =
                self.with_state(|state| (state.console_frames.clone(), state.console_stays_open));
            let replay = stream::iter(frames.into_iter().map(Ok));
            let console = if stays_open {
                ConsoleStream::new(replay.chain(stream::pending()))
            } else {
                ConsoleStream::new(replay)
            };
            let shared = Arc::clone(&self.state);
            Ok(console.with_close(move || {
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .console_closes += 1;
                future::ready(Ok(()))
            }))
        })
    }
}

/// Outcome produced by [`ScriptedTest`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptedOutcome {
    /// Return `Ok(())`.
    Pass,
    /// Return [`TestError::Failed`] with the message.
    Fail(String),
    /// Never complete.
    Hang,
}

/// Acceptance test with a preset outcome that counts its runs.
#[derive(Clone, Debug)]
pub struct ScriptedTest {
    outcome: ScriptedOutcome,
    runs: Arc<AtomicUsize>,
}

impl ScriptedTest {
    /// Creates a test that always produces `outcome`.
    #[must_use]
    pub fn new(outcome: ScriptedOutcome) -> Self {
        Self {
            outcome,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times the test has been started.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl<F: DeviceFarm> AcceptanceTest<F> for ScriptedTest {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run<'a>(
        &'a self,
        _farm: &'a F,
        _instance: &'a Instance,
        _deadline: Instant,
    ) -> TestFuture<'a> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                ScriptedOutcome::Pass => Ok(()),
                ScriptedOutcome::Fail(message) => Err(TestError::Failed(message.clone())),
                ScriptedOutcome::Hang => std::future::pending().await,
            }
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding [`ENV_LOCK`].
    /// A `None` value removes the variable.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
