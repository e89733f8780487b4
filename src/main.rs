#![forbid(unsafe_code)]

use chrono::{DateTime, SecondsFormat, Utc};
use error_iter::ErrorIter as _;
use hourly_ledger::errors::{ConfigError, LedgerError};
use hourly_ledger::{Config, DepositAmount, Ledger};
use is_terminal::IsTerminal as _;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use std::io::{self, Write as _};
use std::{env, path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Record deposits and report hourly running totals.
#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - LEDGER_DB is the path to the SQLite database. Overridden by `--db`."]
#[footer = "      Default is \"ledger.sqlite3\" in the user's data directory."]
#[footer = "  - LEDGER_BUSY_TIMEOUT_MS bounds how long a transaction waits for a competing"]
#[footer = "      writer. Default is 5000."]
#[footer = "  - RUST_LOG sets the log filter. Default is \"info\"."]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Run the tool in the given mode.
    ///
    /// Available modes:
    /// - "historical" [default]
    /// - "deposit"
    /// - "rebuild"
    /// - "audit"
    mode: Option<String>,

    /// Deposit time, RFC 3339. Required by `deposit` mode.
    datetime: Option<String>,

    /// Deposit amount, a positive decimal. Required by `deposit` mode.
    amount: Option<String>,

    /// Start of the reporting window, RFC 3339. Required by `historical` mode.
    start: Option<String>,

    /// End of the reporting window, RFC 3339. Required by `historical` mode.
    end: Option<String>,

    /// Print results as JSON.
    json: bool,

    /// Override the database path.
    #[long]
    db: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Invalid tool mode. See `--help`")]
    Mode,

    #[error("Missing `--{0}` argument. See `--help`")]
    Missing(&'static str),

    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("Configuration error")]
    Config(#[from] ConfigError),

    #[error("Ledger error")]
    Ledger(#[from] LedgerError),

    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Audit found inconsistent buckets")]
    Audit,
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    Historical,
    Deposit,
    Rebuild,
    Audit,
}

fn main() -> ExitCode {
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    //
    // See: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/struct.EnvFilter.html#directives
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| io::stderr().is_terminal());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(term_color),
        )
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Args(_) | Error::Mode | Error::Missing(_)) {
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

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;
    let mode = Mode::try_from(args.mode.unwrap_or_else(|| "historical".to_string()))?;

    let mut config = Config::from_env()?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    info!("Database: `{}`", config.db_path.display());
    let ledger = Ledger::open(&config)?;

    let mut stdout = io::stdout().lock();

    match mode {
        Mode::Deposit => {
            let event_time = parse_datetime(args.datetime.ok_or(Error::Missing("datetime"))?)?;
            let amount = args
                .amount
                .ok_or(Error::Missing("amount"))?
                .parse::<DepositAmount>()
                .map_err(LedgerError::from)?;

            ledger.deposit(event_time, amount)?;
            info!("Deposited {amount} at {event_time}");
        }
        Mode::Historical => {
            let start = parse_datetime(args.start.ok_or(Error::Missing("start"))?)?;
            let end = parse_datetime(args.end.ok_or(Error::Missing("end"))?)?;

            let series = ledger.series(start, end)?;
            if args.json {
                serde_json::to_writer_pretty(&mut stdout, &series)?;
                writeln!(stdout)?;
            } else {
                for entry in series {
                    let time = entry.time.to_rfc3339_opts(SecondsFormat::Secs, true);
                    writeln!(stdout, "{time}  {}", entry.amount)?;
                }
            }
        }
        Mode::Rebuild => {
            let count = ledger.rebuild()?;
            writeln!(stdout, "Replayed {count} events")?;
        }
        Mode::Audit => {
            let report = ledger.audit()?;
            if args.json {
                serde_json::to_writer_pretty(&mut stdout, &report)?;
                writeln!(stdout)?;
            } else {
                writeln!(stdout, "Events:  {}", report.events)?;
                writeln!(stdout, "Buckets: {}", report.buckets)?;
                writeln!(stdout, "Total:   {}", report.total)?;
                writeln!(stdout, "Latest:  {}", report.latest)?;
                for mismatch in &report.mismatches {
                    warn!(
                        "Bucket {}: stored {:?}, expected {:?}",
                        mismatch.bucket_end, mismatch.stored, mismatch.expected,
                    );
                }
                for (earlier, later) in &report.non_monotonic {
                    warn!(
                        "Running total decreases from {} at {} to {} at {}",
                        earlier.cumulative_amount,
                        earlier.bucket_end,
                        later.cumulative_amount,
                        later.bucket_end,
                    );
                }
            }

            if !report.is_consistent() {
                return Err(Error::Audit);
            }
        }
    }

    Ok(())
}

/// Parse an RFC 3339 timestamp in any offset.
fn parse_datetime(input: String) -> Result<DateTime<Utc>, LedgerError> {
    Ok(DateTime::parse_from_rfc3339(input.trim())?.with_timezone(&Utc))
}

impl TryFrom<String> for Mode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "historical" => Ok(Self::Historical),
            "deposit" => Ok(Self::Deposit),
            "rebuild" => Ok(Self::Rebuild),
            "audit" => Ok(Self::Audit),
            _ => Err(Error::Mode),
        }
    }
}
