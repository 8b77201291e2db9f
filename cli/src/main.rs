use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use sqinn_core::DEFAULT_MAX_FRAME_LEN;
use sqinn_sqlite::{DriverOptions, Interpreter, MEMORY_PATH, serve, sqlite_version};
use tracing::{info, warn};

mod config;
mod logging;
mod selftest;

use config::Config;
use logging::LogOptions;

const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "sqinn")]
#[command(about = "SQLite over binary-framed stdin/stdout")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    /// Without a subcommand, help is printed.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Log level: 0=off, 1=info, 2=debug.
    #[arg(long, global = true)]
    log_level: Option<u8>,
    /// Append log lines to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log to stderr.
    #[arg(long, global = true)]
    log_stderr: bool,
    /// YAML file with defaults for the options above and for `run`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read command frames from stdin and write reply frames to stdout.
    Run(RunArgs),
    /// Execute the built-in self-test and exit.
    Test,
    /// Print the sqinn version and exit.
    Version,
    /// Print the linked SQLite library version and exit.
    SqliteVersion,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Database opened at startup (default ":memory:").
    #[arg(long)]
    db: Option<String>,
    /// Start without a connection; the host sends OPEN itself.
    #[arg(long)]
    no_open: bool,
    /// Largest accepted command frame, in bytes.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_frame_size: Option<u32>,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Run(args)) => run_serve(&cli.global, args),
        Some(Command::Test) => run_selftest(&cli.global),
        Some(Command::Version) => {
            println!("sqinn v{PACKAGE_VERSION}");
            Ok(())
        }
        Some(Command::SqliteVersion) => {
            println!("{}", sqlite_version());
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map_err(|err| format!("Failed to print help: {err}")),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_serve(global: &GlobalArgs, args: RunArgs) -> Result<(), String> {
    let config = load_config(global)?;
    logging::init(&resolve_log_options(global, &config))?;
    info!("--- sqinn v{PACKAGE_VERSION} start ---");

    let options = DriverOptions {
        max_frame_len: args
            .max_frame_size
            .or(config.max_frame_size)
            .unwrap_or(DEFAULT_MAX_FRAME_LEN),
    };
    let mut interp = if args.no_open {
        Interpreter::new()
    } else {
        let db = args
            .db
            .or(config.db)
            .unwrap_or_else(|| MEMORY_PATH.to_string());
        Interpreter::open(&db).map_err(|err| format!("Failed to open database '{db}': {err}"))?
    };

    match interp.database_path() {
        Some(path) => info!(path, "serving database"),
        None => info!("serving without a connection until OPEN"),
    }

    let served = {
        let stdin = io::stdin();
        let stdout = io::stdout();
        serve(&mut interp, &mut stdin.lock(), &mut stdout.lock(), &options)
    };

    let outstanding = interp.handles().live();
    if outstanding > 0 {
        info!(outstanding, "finalizing statements left open by the host");
    }
    let closed = interp.shutdown();
    match &closed {
        Ok(stats) if stats.is_balanced() => {
            info!(
                allocated = stats.allocated,
                released = stats.released,
                "statement handles balanced"
            );
        }
        Ok(stats) => {
            warn!(
                allocated = stats.allocated,
                released = stats.released,
                live = stats.live,
                "statement handles unbalanced"
            );
        }
        Err(err) => warn!(error = %err, "database close failed"),
    }
    info!("--- sqinn v{PACKAGE_VERSION} exit ---");

    served.map_err(|err| err.to_string())?;
    closed.map_err(|err| format!("Failed to close database: {err}"))?;
    Ok(())
}

fn run_selftest(global: &GlobalArgs) -> Result<(), String> {
    let config = load_config(global)?;
    logging::init(&resolve_log_options(global, &config))?;
    info!("--- sqinn v{PACKAGE_VERSION} test start ---");

    let report = selftest::run().map_err(|err| format!("self-test failed: {err}"))?;

    info!(
        commands = report.commands,
        "--- sqinn v{PACKAGE_VERSION} test ok ---"
    );
    println!("test ok");
    Ok(())
}

fn load_config(global: &GlobalArgs) -> Result<Config, String> {
    match &global.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

/// Merges log flags over the config file; flags win.
fn resolve_log_options(global: &GlobalArgs, config: &Config) -> LogOptions {
    LogOptions {
        level: global.log_level.or(config.log_level).unwrap_or(0),
        file: global.log_file.clone().or_else(|| config.log_file.clone()),
        stderr: global.log_stderr || config.log_stderr.unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sqinn",
            "run",
            "--db",
            "app.db",
            "--log-level",
            "2",
            "--log-stderr",
        ])
        .unwrap();
        assert_eq!(cli.global.log_level, Some(2));
        assert!(cli.global.log_stderr);
        match cli.command {
            Some(Command::Run(args)) => {
                assert_eq!(args.db.as_deref(), Some("app.db"));
                assert!(!args.no_open);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["sqinn"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_zero_max_frame_size_rejected() {
        assert!(Cli::try_parse_from(["sqinn", "run", "--max-frame-size", "0"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let global = GlobalArgs {
            log_level: Some(1),
            log_file: None,
            log_stderr: false,
            config: None,
        };
        let config = Config {
            log_level: Some(2),
            log_file: Some(PathBuf::from("sqinn.log")),
            log_stderr: Some(true),
            ..Config::default()
        };
        let options = resolve_log_options(&global, &config);
        assert_eq!(
            options,
            LogOptions {
                level: 1,
                file: Some(PathBuf::from("sqinn.log")),
                stderr: true,
            }
        );
    }

    #[test]
    fn test_log_defaults_are_off() {
        let global = GlobalArgs {
            log_level: None,
            log_file: None,
            log_stderr: false,
            config: None,
        };
        let options = resolve_log_options(&global, &Config::default());
        assert_eq!(options, LogOptions::default());
        assert!(!options.is_enabled());
    }
}
