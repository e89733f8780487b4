//! Process configuration.
//!
//! Built once at startup and passed by reference to constructors.

use directories::ProjectDirs;
use std::{env, num::ParseIntError, path::PathBuf, time::Duration};
use thiserror::Error;

/// Database path environment variable.
pub const ENV_DB: &str = "LEDGER_DB";

/// Lock wait bound environment variable, in milliseconds.
pub const ENV_BUSY_TIMEOUT_MS: &str = "LEDGER_BUSY_TIMEOUT_MS";

pub const DEFAULT_DB_FILE: &str = "ledger.sqlite3";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to locate user data directory")]
    DataDir,

    #[error("Unable to create data directory {0:?}")]
    CreateDataDir(PathBuf, #[source] std::io::Error),

    #[error("Invalid {ENV_BUSY_TIMEOUT_MS}: `{0}`")]
    BusyTimeout(String, #[source] ParseIntError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Path to the SQLite database holding the event log and the hourly buckets.
    pub db_path: PathBuf,

    /// How long a transaction waits for a competing writer before failing.
    pub busy_timeout: Duration,
}

impl Config {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Read configuration from the environment.
    ///
    /// - `LEDGER_DB` overrides the database path. The default lives in the user's data directory,
    ///   which is created if it does not exist.
    /// - `LEDGER_BUSY_TIMEOUT_MS` overrides the lock wait bound.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match var(ENV_DB).filter(|path| !path.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let busy_timeout = match var(ENV_BUSY_TIMEOUT_MS).filter(|ms| !ms.is_empty()) {
            Some(ms) => ms
                .trim()
                .parse()
                .map(Duration::from_millis)
                .map_err(|err| ConfigError::BusyTimeout(ms, err))?,
            None => DEFAULT_BUSY_TIMEOUT,
        };

        Ok(Self {
            db_path,
            busy_timeout,
        })
    }
}

fn default_db_path() -> Result<PathBuf, ConfigError> {
    let project_dir =
        ProjectDirs::from("design.contract", "DCD", "hourly-ledger").ok_or(ConfigError::DataDir)?;
    let data_dir = project_dir.data_dir();
    std::fs::create_dir_all(data_dir)
        .map_err(|err| ConfigError::CreateDataDir(data_dir.to_path_buf(), err))?;

    Ok(data_dir.join(DEFAULT_DB_FILE))
}
