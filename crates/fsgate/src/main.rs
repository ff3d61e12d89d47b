//! fsgate launcher
//!
//! Serves a policy-constrained view of the local filesystem to an MCP client
//! over stdio. stdout belongs to the protocol; all diagnostics go to stderr
//! and the rolling log file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fsgate_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "fsgate",
    version,
    about = "Policy-constrained filesystem access for MCP clients"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server on stdin/stdout
    Serve(cli::serve::ServeArgs),

    /// Validate the policy and print the effective allow/deny roots
    Check(cli::check::CheckArgs),
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Serve(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start tokio runtime")?;
            runtime.block_on(cli::serve::run(args))
        }
        Commands::Check(args) => cli::check::run(args),
    }
}

/// Install logging, dropping to stderr only when the log directory is
/// unusable. Returns every failure so the caller can report it.
fn start_logging<F>(verbose: bool, log_dir: Option<PathBuf>, mut init: F) -> Vec<anyhow::Error>
where
    F: FnMut(LogConfig<'_>) -> Result<()>,
{
    let mut failures = Vec::new();
    let has_dir = log_dir.is_some();

    if let Err(err) = init(LogConfig {
        app_name: "fsgate",
        verbose,
        log_dir,
    }) {
        failures.push(err);
        if has_dir {
            if let Err(err) = init(LogConfig {
                app_name: "fsgate",
                verbose,
                log_dir: None,
            }) {
                failures.push(err.context("stderr logging unavailable"));
            }
        }
    }
    failures
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Serve(args) => args.log_dir(),
        Commands::Check(_) => None,
    };

    for err in start_logging(cli.verbose, log_dir, fsgate_logging::init_logging) {
        eprintln!("Warning: {:#}", err);
    }

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<cli::HelpfulError>() {
                Some(helpful) => eprint!("{}", helpful),
                None => eprintln!("{:?}", err),
            }
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "fsgate",
            "-v",
            "serve",
            "--allow",
            "/data",
            "--allow",
            "/srv",
            "--deny",
            "/data/private",
            "--no-log-file",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.policy.allow.len(), 2);
                assert_eq!(args.policy.deny.len(), 1);
                assert!(args.log_dir().is_none());
            }
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_start_logging_falls_back_to_stderr() {
        let mut seen = Vec::new();
        let failures = start_logging(false, Some(PathBuf::from("/unwritable")), |config| {
            seen.push(config.log_dir.clone());
            match config.log_dir {
                Some(_) => Err(anyhow::anyhow!("cannot create log dir")),
                None => Ok(()),
            }
        });

        assert_eq!(seen, vec![Some(PathBuf::from("/unwritable")), None]);
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_start_logging_reports_failed_fallback() {
        let failures = start_logging(true, Some(PathBuf::from("/unwritable")), |_| {
            Err(anyhow::anyhow!("subscriber already set"))
        });

        assert_eq!(failures.len(), 2);
        assert!(format!("{:#}", failures[1]).starts_with("stderr logging unavailable"));
    }

    #[test]
    fn test_start_logging_without_dir_tries_once() {
        let mut calls = 0;
        let failures = start_logging(false, None, |_| {
            calls += 1;
            Err(anyhow::anyhow!("subscriber already set"))
        });

        assert_eq!(calls, 1);
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_comma_separated_roots() {
        let cli = Cli::try_parse_from(["fsgate", "check", "--allow", "/a,/b"]).unwrap();
        match cli.command {
            Commands::Check(args) => assert_eq!(args.policy.allow.len(), 2),
            other => panic!("expected check, got {:?}", other),
        }
    }
}
