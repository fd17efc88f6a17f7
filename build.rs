//! Renders the `avh-runner(1)` manual page into `OUT_DIR`.

use std::env;
use std::error::Error;
use std::io::{self, Write};

use camino::Utf8PathBuf;
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const MAN_PAGE: &str = "avh-runner.1";

fn out_dir() -> Result<Utf8PathBuf, Box<dyn Error>> {
    let raw = env::var_os("OUT_DIR")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;
    Utf8PathBuf::from_path_buf(raw.into()).map_err(|path| {
        format!("OUT_DIR is not valid UTF-8: {}", path.display()).into()
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let page = Man::new(cli::Cli::command())
        .title("AVH-RUNNER")
        .section("1");
    let mut rendered = Vec::new();
    page.render(&mut rendered)?;

    std::fs::write(out_dir()?.join(MAN_PAGE), rendered)?;
    Ok(())
}
