//! Optional YAML configuration for the `sqinn` binary.
//!
//! Every field is optional; flags given on the command line take precedence
//! over values from the file.
//!
//! # Example YAML
//!
//! ```yaml
//! db: /var/lib/app/data.db
//! log_level: 1
//! log_file: /var/log/sqinn.log
//! log_stderr: false
//! max_frame_size: 16777216
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Defaults for the `run` and `test` subcommands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database opened at startup.
    pub db: Option<String>,
    /// Log level: 0=off, 1=info, 2=debug.
    pub log_level: Option<u8>,
    /// File that log lines are appended to.
    pub log_file: Option<PathBuf>,
    /// Also log to stderr.
    pub log_stderr: Option<bool>,
    /// Largest accepted command frame, in bytes.
    pub max_frame_size: Option<u32>,
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|err| format!("Failed to read config '{}': {err}", path.display()))?;
        let config: Config = serde_yaml::from_reader(BufReader::new(file))
            .map_err(|err| format!("Invalid config '{}': {err}", path.display()))?;
        if config.max_frame_size == Some(0) {
            return Err(format!(
                "Invalid config '{}': max_frame_size must be positive",
                path.display()
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), yaml).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
db: app.db
log_level: 2
log_file: /tmp/sqinn.log
log_stderr: true
max_frame_size: 1024
"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config,
            Config {
                db: Some("app.db".into()),
                log_level: Some(2),
                log_file: Some(PathBuf::from("/tmp/sqinn.log")),
                log_stderr: Some(true),
                max_frame_size: Some(1024),
            }
        );
    }

    #[test]
    fn test_load_partial_config() {
        let file = write_config("log_level: 1\n");
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.log_level, Some(1));
        assert!(config.db.is_none());
        assert!(config.log_stderr.is_none());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let file = write_config("database: app.db\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.contains("Invalid config"), "{err}");
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let file = write_config("max_frame_size: 0\n");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/sqinn.yml").unwrap_err();
        assert!(err.starts_with("Failed to read config"), "{err}");
    }
}
