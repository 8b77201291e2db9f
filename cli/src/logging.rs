//! Log output for the binary.
//!
//! Stdout carries protocol frames, so log lines only ever go to a file or to
//! stderr.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how much to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// 0=off, 1=info, 2=debug. Anything else is off.
    pub level: u8,
    pub file: Option<PathBuf>,
    pub stderr: bool,
}

impl LogOptions {
    pub fn filter(&self) -> LevelFilter {
        match self.level {
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::OFF,
        }
    }

    /// True when the options would produce any output at all.
    pub fn is_enabled(&self) -> bool {
        self.filter() != LevelFilter::OFF && (self.file.is_some() || self.stderr)
    }
}

/// Installs the global subscriber. Does nothing when logging is off.
pub fn init(options: &LogOptions) -> Result<(), String> {
    if !options.is_enabled() {
        return Ok(());
    }

    let file_layer = match &options.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| format!("Failed to open log file '{}': {err}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = options
        .stderr
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(options.filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| format!("Failed to initialize logging: {err}"))
}
