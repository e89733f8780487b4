//! Durable store backed by SQLite.
//!
//! Every transaction runs on its own connection. Write transactions begin with `BEGIN IMMEDIATE`,
//! which takes the database write lock up front, so two deposits can never both read a stale
//! running total. Read transactions are deferred and see a single WAL snapshot for their whole
//! lifetime. Lock waits are bounded by the configured busy timeout.
//!
//! Decimals are stored as canonical text. SQLite has no decimal type, so a deterministic scalar
//! function `dec_add(a, b)` is registered on every connection. This keeps the bucket upsert and the
//! forward propagation as single statements.

use super::{Store, StoreError, StoreTx};
use crate::amount::{Amount, AmountError, DepositAmount};
use crate::config::Config;
use crate::model::{Bucket, DepositEvent};
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS deposit_histories (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        amount TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS deposit_hourly (
        ts INTEGER PRIMARY KEY,
        amount TEXT NOT NULL
    ) WITHOUT ROWID;
";

const INSERT_HISTORY: &str = "INSERT INTO deposit_histories (ts, amount) VALUES (?1, ?2)";

// The `WHERE true` is required by SQLite to disambiguate `INSERT ... SELECT` from the upsert
// clause.
const UPSERT_HOURLY: &str = "
    INSERT INTO deposit_hourly (ts, amount)
        SELECT ?1, COALESCE((
            SELECT dec_add(amount, ?2)
                FROM deposit_hourly
                WHERE ts < ?1
                ORDER BY ts DESC LIMIT 1
            ), ?2)
        WHERE true
    ON CONFLICT (ts) DO UPDATE SET amount = dec_add(deposit_hourly.amount, ?2)
";

const UPDATE_POST_HOURLY: &str =
    "UPDATE deposit_hourly SET amount = dec_add(amount, ?2) WHERE ts > ?1";

const SELECT_BASELINE: &str =
    "SELECT ts, amount FROM deposit_hourly WHERE ts <= ?1 ORDER BY ts DESC LIMIT 1";

const SELECT_HOURLY: &str =
    "SELECT ts, amount FROM deposit_hourly WHERE ts > ?1 AND ts <= ?2 ORDER BY ts";

const SELECT_ALL_HOURLY: &str = "SELECT ts, amount FROM deposit_hourly ORDER BY ts";

const SELECT_HISTORIES: &str = "SELECT seq, ts, amount FROM deposit_histories ORDER BY seq";

const DELETE_HOURLY: &str = "DELETE FROM deposit_hourly";

/// Failures raised inside the `dec_add` SQL function.
#[derive(Debug, Error)]
enum DecAddError {
    #[error("`{0}` is not a valid decimal")]
    Parse(String, #[source] AmountError),

    #[error("Decimal overflow: {0} + {1}")]
    Overflow(Amount, Amount),
}

#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

/// A transaction owning its connection. Rolls back on drop unless committed.
#[derive(Debug)]
pub struct SqliteTx {
    conn: Connection,
    finished: bool,
}

impl SqliteStore {
    /// Open the database named by the configuration, creating tables as needed.
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        Self::open_path(&config.db_path, config.busy_timeout)
    }

    pub fn open_path<P>(path: P, busy_timeout: Duration) -> Result<Self, StoreError>
    where
        P: AsRef<Path>,
    {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        };

        debug!("Opening ledger database {:?}", store.path);
        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        register_functions(&conn)?;

        Ok(conn)
    }

    fn begin(&self, statement: &str) -> Result<SqliteTx, StoreError> {
        let conn = self.connect()?;
        conn.execute_batch(statement)
            .inspect_err(|err| error!("Failed to begin transaction: {err}"))?;

        Ok(SqliteTx {
            conn,
            finished: false,
        })
    }
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteTx;

    fn begin_write(&self) -> Result<Self::Tx<'_>, StoreError> {
        self.begin("BEGIN IMMEDIATE")
    }

    fn begin_read(&self) -> Result<Self::Tx<'_>, StoreError> {
        self.begin("BEGIN DEFERRED")
    }
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "dec_add",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let parse = |text: String| {
                text.parse::<Amount>()
                    .map_err(|err| DecAddError::Parse(text, err))
                    .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))
            };
            let lhs = parse(ctx.get::<String>(0)?)?;
            let rhs = parse(ctx.get::<String>(1)?)?;
            let sum = lhs.checked_add(rhs).ok_or_else(|| {
                rusqlite::Error::UserFunctionError(Box::new(DecAddError::Overflow(lhs, rhs)))
            })?;

            Ok(sum.to_canonical())
        },
    )
}

fn to_time(ts: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(ts, 0).ok_or(StoreError::CorruptTimestamp(ts))
}

fn to_amount(text: String) -> Result<Amount, StoreError> {
    text.parse()
        .map_err(|err| StoreError::CorruptAmount(text, err))
}

fn to_bucket((ts, amount): (i64, String)) -> Result<Bucket, StoreError> {
    Ok(Bucket::new(to_time(ts)?, to_amount(amount)?))
}

impl SqliteTx {
    fn select_buckets<P>(&self, sql: &str, params: P) -> Result<Vec<Bucket>, StoreError>
    where
        P: rusqlite::Params,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|err| error!("Failed to select buckets: {err}"))?;

        rows.into_iter().map(to_bucket).collect()
    }
}

impl StoreTx for SqliteTx {
    fn append_event(
        &mut self,
        event_time: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<u64, StoreError> {
        self.conn
            .prepare_cached(INSERT_HISTORY)?
            .execute(params![event_time.timestamp(), amount.amount().to_canonical()])
            .inspect_err(|err| error!("Failed to execute insert_history: {err}"))?;

        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn upsert_bucket(
        &mut self,
        bucket_end: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<(), StoreError> {
        self.conn
            .prepare_cached(UPSERT_HOURLY)?
            .execute(params![bucket_end.timestamp(), amount.amount().to_canonical()])
            .inspect_err(|err| error!("Failed to execute upsert_hourly: {err}"))?;

        Ok(())
    }

    fn propagate(
        &mut self,
        after: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<usize, StoreError> {
        let count = self
            .conn
            .prepare_cached(UPDATE_POST_HOURLY)?
            .execute(params![after.timestamp(), amount.amount().to_canonical()])
            .inspect_err(|err| error!("Failed to execute update_post_hourly: {err}"))?;

        Ok(count)
    }

    fn baseline(&mut self, at: DateTime<Utc>) -> Result<Option<Bucket>, StoreError> {
        Ok(self
            .select_buckets(SELECT_BASELINE, params![at.timestamp()])?
            .into_iter()
            .next())
    }

    fn buckets(
        &mut self,
        after: DateTime<Utc>,
        through: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, StoreError> {
        self.select_buckets(SELECT_HOURLY, params![after.timestamp(), through.timestamp()])
    }

    fn all_buckets(&mut self) -> Result<Vec<Bucket>, StoreError> {
        self.select_buckets(SELECT_ALL_HOURLY, [])
    }

    fn events(&mut self) -> Result<Vec<DepositEvent>, StoreError> {
        let mut stmt = self.conn.prepare_cached(SELECT_HISTORIES)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|err| error!("Failed to select histories: {err}"))?;

        rows.into_iter()
            .map(|(sequence, ts, amount)| {
                let amount = to_amount(amount)?;

                Ok(DepositEvent {
                    sequence: sequence as u64,
                    event_time: to_time(ts)?,
                    amount: DepositAmount::new(amount)
                        .map_err(|err| StoreError::CorruptAmount(amount.to_string(), err))?,
                })
            })
            .collect()
    }

    fn clear_buckets(&mut self) -> Result<(), StoreError> {
        let count = self
            .conn
            .prepare_cached(DELETE_HOURLY)?
            .execute([])
            .inspect_err(|err| error!("Failed to execute delete_hourly: {err}"))?;
        debug!("Cleared {count} buckets");

        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("COMMIT")
            .inspect_err(|err| error!("Failed to commit: {err}"))?;
        self.finished = true;

        Ok(())
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back transaction: {err}");
            }
        }
    }
}
