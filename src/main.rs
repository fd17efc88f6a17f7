//! Binary entry point for the `avh-runner` CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::instrument::WithSubscriber;

use avh_runner::acceptance::{
    AcceptanceTest, ConsolePatternTest, TestDefinition, TestError, TestRegistry,
};
use avh_runner::avh::{AvhClient, AvhError};
use avh_runner::config::{AvhConfig, ConfigError};
use avh_runner::farm::ApiToken;
use avh_runner::firmware::{FirmwareError, FirmwareImage};
use avh_runner::logging::{self, Verbosity};
use avh_runner::provision::{
    ProvisionError, ProvisionRequest, ProvisioningWorkflow, RunOutcome, WorkflowSettings,
};

use cli::Cli;

type BoxedTest = Box<dyn AcceptanceTest<AvhClient>>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("firmware error: {0}")]
    Firmware(#[from] FirmwareError),
    #[error("acceptance test error: {0}")]
    Test(#[from] TestError),
    #[error("client error: {0}")]
    Client(AvhError),
    #[error("{0}")]
    Provision(#[from] ProvisionError<AvhError>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let dispatch = logging::dispatch(Verbosity::from_flag(cli.verbose));
    let exit_code = match run(cli, io::stdout()).with_subscriber(dispatch).await {
        Ok(_) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli, out: impl Write) -> Result<RunOutcome, CliError> {
    let config = resolve_config(&cli)?;
    let firmware = FirmwareImage::load(&cli.firmware)?;
    let test = build_test(&cli, &TestRegistry::with_builtin())?;
    let client = AvhClient::new(&config.endpoint).map_err(CliError::Client)?;
    let workflow = ProvisioningWorkflow::new(client).with_settings(WorkflowSettings::from(&config));

    let request = ProvisionRequest {
        api_token: ApiToken::new(cli.token),
        board: cli.board,
        firmware,
    };
    tracing::info!(board = %request.board, firmware = %request.firmware.name(), "starting run");
    let result = workflow.execute(&request, test.as_deref()).await;
    write_verdict(out, test.is_some(), &result);
    result.map_err(CliError::from)
}

fn resolve_config(cli: &Cli) -> Result<AvhConfig, CliError> {
    let mut config = AvhConfig::load_without_cli_args()?;
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut AvhConfig, cli: &Cli) {
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(seconds) = cli.timeout {
        config.test_timeout_secs = seconds;
    }
}

fn build_test(
    cli: &Cli,
    registry: &TestRegistry<AvhClient>,
) -> Result<Option<BoxedTest>, TestError> {
    match (&cli.script, &cli.expect) {
        (Some(path), _) => {
            let definition = TestDefinition::load(path)?;
            registry.build(&definition).map(Some)
        }
        (None, Some(pattern)) => Ok(Some(Box::new(ConsolePatternTest::new(pattern)?))),
        (None, None) => Ok(None),
    }
}

fn verdict<T, E>(test_ran: bool, result: &Result<T, ProvisionError<E>>) -> Option<String>
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(_) => test_ran.then(|| String::from("Test passed")),
        Err(err) => err
            .test_failure()
            .map(|failure| format!("Test failed: {failure}")),
    }
}

fn write_verdict<T, E>(
    mut target: impl Write,
    test_ran: bool,
    result: &Result<T, ProvisionError<E>>,
) where
    E: std::error::Error + 'static,
{
    if let Some(line) = verdict(test_ran, result) {
        writeln!(target, "{line}").ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
