//! Command-line interface definitions for the `avh-runner` binary.
//!
//! This module centralises the clap parser so both the main binary and the
//! build script can reuse it when generating the manual page.

use camino::Utf8PathBuf;
use clap::Parser;

/// Top-level CLI for the `avh-runner` binary.
#[derive(Debug, Parser)]
#[command(
    name = "avh-runner",
    version,
    about = "Provision an Arm Virtual Hardware instance, flash firmware and run an acceptance test",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// AVH API token exchanged for a session.
    #[arg(
        short = 't',
        long,
        env = "AVH_API_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub(crate) token: String,
    /// Board flavor prefix (for example `stm32u5` or `rpi4b`).
    ///
    /// The first catalog model whose flavor starts with this value is used.
    #[arg(short = 'b', long, value_name = "FLAVOR")]
    pub(crate) board: String,
    /// Firmware binary uploaded after the first boot.
    #[arg(short = 'f', long, value_name = "PATH")]
    pub(crate) firmware: Utf8PathBuf,
    /// Acceptance-test definition file (TOML with a `kind` key).
    #[arg(short = 's', long, value_name = "PATH", conflicts_with = "expect")]
    pub(crate) script: Option<Utf8PathBuf>,
    /// Pass once a console line matches this regular expression.
    #[arg(long, value_name = "REGEX", conflicts_with = "script")]
    pub(crate) expect: Option<String>,
    /// AVH API endpoint (defaults to `https://app.avh.arm.com/api`).
    #[arg(short = 'e', long, value_name = "URL")]
    pub(crate) endpoint: Option<String>,
    /// Acceptance-test budget in seconds (defaults to 30).
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    /// Log step progress and polled states to stderr.
    #[arg(short = 'v', long)]
    pub(crate) verbose: bool,
}
