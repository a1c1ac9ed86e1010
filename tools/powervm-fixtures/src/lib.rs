pub mod canned;
pub mod config;
pub mod driver;
pub mod errors;
pub mod fakes;
pub mod fixtures;
pub mod logging;
pub mod runtime;
pub mod taskflow;
pub mod trace;
pub mod virt;

use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, HarnessConfig};
use errors::FixtureError;
use logging::{append_run_log, clear_run_logger, init_run_logger, JsonlLogger};
use runtime::{FileSystem, ProductionFileSystem};
use serde_json::json;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use trace::verify_trace;

#[derive(Debug, Clone, Parser)]
#[command(name = "powervm-fixtures")]
#[command(about = "Inspect task traces recorded by the driver test fixtures")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a recorded task trace against expected task descriptors.
    VerifyTrace {
        #[arg(long)]
        trace: PathBuf,
        /// Expected task name, in order. A trailing wildcard matches by prefix.
        #[arg(long = "expect")]
        expected: Vec<String>,
    },
    /// Print the effective harness configuration as TOML.
    ShowConfig,
}

pub fn run() -> Result<i32, FixtureError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let mut stdout = std::io::stdout();
    run_with(&args, &ProductionFileSystem, &mut stdout)
}

pub fn run_with(
    args: &[OsString],
    fs: &dyn FileSystem,
    out: &mut dyn Write,
) -> Result<i32, FixtureError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                write!(out, "{error}").map_err(|e| FixtureError::Io(e.to_string()))?;
                return Ok(0);
            }
            _ => return Err(FixtureError::Cli(error.to_string())),
        },
    };

    let cfg = load_config(cli.config.as_deref(), fs)?;
    let Some(path) = &cfg.logging.path else {
        return run_command(cli.command, &cfg, fs, out);
    };
    let mut logger = JsonlLogger::new(path);
    logger.max_payload_bytes = cfg.logging.max_payload_bytes;
    logger.budget_bytes = cfg.logging.budget_bytes;
    init_run_logger(logger);
    let result = run_command(cli.command, &cfg, fs, out);
    clear_run_logger();
    result
}

fn run_command(
    command: Command,
    cfg: &HarnessConfig,
    fs: &dyn FileSystem,
    out: &mut dyn Write,
) -> Result<i32, FixtureError> {
    match command {
        Command::VerifyTrace { trace, expected } => {
            match verify_trace(fs, &trace, &expected, cfg.wildcard()) {
                Ok(()) => {
                    writeln!(out, "trace matches: {} tasks", expected.len())
                        .map_err(|e| FixtureError::Io(e.to_string()))?;
                    Ok(0)
                }
                Err(FixtureError::Assertion(err)) => {
                    append_run_log(
                        "warn",
                        "cli.verify_trace.mismatch",
                        json!({ "trace": trace.display().to_string(), "error": err.to_string() }),
                    );
                    writeln!(out, "{err}").map_err(|e| FixtureError::Io(e.to_string()))?;
                    Ok(1)
                }
                Err(other) => Err(other),
            }
        }
        Command::ShowConfig => {
            let rendered =
                toml::to_string_pretty(cfg).map_err(|e| FixtureError::Io(e.to_string()))?;
            write!(out, "{rendered}").map_err(|e| FixtureError::Io(e.to_string()))?;
            Ok(0)
        }
    }
}
