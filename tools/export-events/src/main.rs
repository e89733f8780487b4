#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use hourly_ledger::errors::{ConfigError, LedgerError};
use hourly_ledger::{Config, Ledger};
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use ron::ser::PrettyConfig;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("Configuration error")]
    Config(#[from] ConfigError),

    #[error("Unable to read the event log")]
    Ledger(#[from] LedgerError),

    #[error("Unable to create {0:?}")]
    Create(PathBuf, #[source] io::Error),

    #[error("RON serialization error")]
    Ron(#[from] ron::Error),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

/// Write every deposit in the event log as pretty RON.
#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - LEDGER_DB is the path to the SQLite database. Overridden by `--db`."]
#[footer = "  - LEDGER_BUSY_TIMEOUT_MS bounds how long to wait for a competing writer."]
struct Args {
    /// Override the database path.
    db: Option<PathBuf>,

    /// Write to this file instead of stdout.
    #[short('o')]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Cli(_)) {
                eprintln!("{}", Args::HELP);
            }

            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Args = onlyargs::parse()?;

    let mut config = Config::from_env()?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    let events = Ledger::open(&config)?.events()?;

    let mut writer: Box<dyn Write> = match args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(&path).map_err(|err| Error::Create(path, err))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    ron::ser::to_writer_pretty(&mut writer, &events, PrettyConfig::default())?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}
