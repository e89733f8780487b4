//! The ledger engine.
//!
//! Each operation is exactly one store transaction. Deposits keep the hourly running totals correct
//! regardless of the order in which events arrive:
//!
//! 1. The event is appended to the event log.
//! 2. The target bucket is upserted. A new bucket is seeded with the running total of the latest
//!    earlier bucket.
//! 3. Every later bucket has the amount added to it, since their totals were computed without this
//!    (possibly back-dated) deposit.
//!
//! Reads return the sparse buckets of a window along with its baseline, and [`series`] expands them
//! into one total per hour.
//!
//! [`series`]: crate::series

use crate::amount::{AmountError, DepositAmount};
use crate::config::Config;
use crate::hour::{self, HourError};
use crate::model::{Bucket, DepositEvent, HourlyTotal};
use crate::series;
use crate::store::{SqliteStore, Store, StoreError, StoreTx};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

pub use self::audit::{AuditReport, BucketMismatch};

mod audit;

/// Broad classification of ledger failures, for callers that map errors to their own transport.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The caller supplied input that violates a precondition. Nothing was changed.
    Parameter,

    /// Storage failed. The transaction was rolled back and the call may be retried.
    Internal,
}

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Invalid amount")]
    Amount(#[from] AmountError),

    #[error("Invalid start and end date: {start} is after {end}")]
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid date")]
    Hour(#[from] HourError),

    #[error("Unable to parse date")]
    DateTime(#[from] chrono::ParseError),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Parameter error")]
    Parameter(#[from] ParameterError),

    #[error("Internal error")]
    Internal(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parameter(_) => ErrorKind::Parameter,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<AmountError> for LedgerError {
    fn from(value: AmountError) -> Self {
        Self::Parameter(value.into())
    }
}

impl From<HourError> for LedgerError {
    fn from(value: HourError) -> Self {
        Self::Parameter(value.into())
    }
}

impl From<chrono::ParseError> for LedgerError {
    fn from(value: chrono::ParseError) -> Self {
        Self::Parameter(value.into())
    }
}

#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
}

impl Ledger<SqliteStore> {
    /// Open the durable ledger described by `config`.
    pub fn open(config: &Config) -> Result<Self, LedgerError> {
        Ok(Self::new(SqliteStore::open(config)?))
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a deposit made at `event_time`.
    ///
    /// Sub-second precision is discarded. On error, neither the event log nor any bucket has been
    /// changed.
    pub fn deposit(
        &self,
        event_time: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<(), LedgerError> {
        let event_time = hour::to_seconds(event_time);
        let bucket_end = hour::bucket_end(event_time)?;

        let mut tx = self.store.begin_write()?;
        let sequence = tx.append_event(event_time, amount)?;
        apply(&mut tx, bucket_end, amount)?;
        tx.commit()?;

        debug!("Deposit #{sequence}: {amount} at {event_time} into bucket {bucket_end}");

        Ok(())
    }

    /// Sparse buckets covering `[start, end]`.
    ///
    /// The first row is the baseline: the latest bucket at or before `bucket_end(start)`, if any.
    /// It is followed by every bucket after that boundary up to and including `end`.
    pub fn historical(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, LedgerError> {
        if start > end {
            return Err(ParameterError::Range { start, end }.into());
        }
        let first = hour::bucket_end(start)?;

        let mut tx = self.store.begin_read()?;
        let baseline = tx.baseline(first)?;
        let rows = tx.buckets(first, end)?;
        tx.commit()?;

        debug!(
            "Historical {start} - {end}: baseline {:?}, {} buckets",
            baseline.map(|b| b.bucket_end),
            rows.len(),
        );

        Ok(baseline.into_iter().chain(rows).collect())
    }

    /// One running total per hour boundary in `[bucket_end(start), end]`.
    pub fn series(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HourlyTotal>, LedgerError> {
        let rows = self.historical(start, end)?;

        Ok(series::fill(start, end, &rows)?)
    }

    /// Every stored bucket, ascending.
    pub fn buckets(&self) -> Result<Vec<Bucket>, LedgerError> {
        let mut tx = self.store.begin_read()?;
        let buckets = tx.all_buckets()?;
        tx.commit()?;

        Ok(buckets)
    }

    /// The event log in append order.
    pub fn events(&self) -> Result<Vec<DepositEvent>, LedgerError> {
        let mut tx = self.store.begin_read()?;
        let events = tx.events()?;
        tx.commit()?;

        Ok(events)
    }

    /// Discard every bucket and replay the event log. Returns the number of events replayed.
    pub fn rebuild(&self) -> Result<usize, LedgerError> {
        let mut tx = self.store.begin_write()?;
        let events = tx.events()?;
        tx.clear_buckets()?;
        for event in &events {
            let bucket_end = hour::bucket_end(event.event_time)
                .map_err(|_| StoreError::CorruptTimestamp(event.event_time.timestamp()))?;
            apply(&mut tx, bucket_end, event.amount)?;
        }
        tx.commit()?;

        info!("Rebuilt buckets from {} events", events.len());

        Ok(events.len())
    }

    /// Check the stored buckets against the event log.
    pub fn audit(&self) -> Result<AuditReport, LedgerError> {
        let mut tx = self.store.begin_read()?;
        let events = tx.events()?;
        let buckets = tx.all_buckets()?;
        tx.commit()?;

        Ok(AuditReport::new(&events, &buckets)?)
    }
}

/// Add one deposit to the bucket table: upsert the target bucket, then carry the amount forward.
fn apply<T: StoreTx>(
    tx: &mut T,
    bucket_end: DateTime<Utc>,
    amount: DepositAmount,
) -> Result<(), StoreError> {
    tx.upsert_bucket(bucket_end, amount)?;
    let count = tx.propagate(bucket_end, amount)?;
    if count > 0 {
        debug!("Propagated {amount} to {count} buckets after {bucket_end}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::store::memory::{MemoryStore, MemoryTx};
    use rayon::prelude::*;
    use similar_asserts::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    pub(super) fn time(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn deposit(s: &str) -> DepositAmount {
        s.parse().unwrap()
    }

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn bucket(t: &str, a: &str) -> Bucket {
        Bucket::new(time(t), amount(a))
    }

    fn total(t: &str, a: &str) -> HourlyTotal {
        HourlyTotal {
            time: time(t),
            amount: amount(a),
        }
    }

    fn memory_ledger() -> Ledger<MemoryStore> {
        Ledger::new(MemoryStore::new())
    }

    fn sqlite_ledger() -> (tempfile::TempDir, Ledger<SqliteStore>) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("ledger.sqlite3"));

        (dir, Ledger::open(&config).unwrap())
    }

    fn put<S: Store>(ledger: &Ledger<S>, t: &str, a: &str) {
        ledger.deposit(time(t), deposit(a)).unwrap();
    }

    fn historical<S: Store>(ledger: &Ledger<S>, start: &str, end: &str) -> Vec<Bucket> {
        ledger.historical(time(start), time(end)).unwrap()
    }

    /// Run each scenario against both store implementations.
    macro_rules! store_tests {
        ($($name:ident),* $(,)?) => {
            mod memory_store {
                $(
                    #[test]
                    fn $name() {
                        super::$name(&super::memory_ledger());
                    }
                )*
            }

            mod sqlite_store {
                $(
                    #[test]
                    fn $name() {
                        let (_dir, ledger) = super::sqlite_ledger();
                        super::$name(&ledger);
                    }
                )*
            }
        };
    }

    store_tests!(
        out_of_order_same_hour,
        middle_insert,
        reverse_insert,
        forward_insert,
        back_dated_deposit_propagates,
        series_no_deposits,
        series_across_midnight,
        series_windows_before_and_after_deposits,
        round_trip_precision,
        deposit_truncates_subseconds,
        rebuild_is_idempotent,
    );

    fn out_of_order_same_hour<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-01T15:59:00Z", "10");
        put(ledger, "2020-01-01T15:56:00Z", "5");

        assert_eq!(
            ledger.buckets().unwrap(),
            vec![bucket("2020-01-01T16:00:00Z", "15")],
        );
    }

    fn middle_insert<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-01T15:55:00Z", "1");
        put(ledger, "2020-01-01T16:50:00Z", "2");
        put(ledger, "2020-01-01T15:56:00Z", "3");
        put(ledger, "2020-01-01T16:10:00Z", "4");

        assert_eq!(
            historical(ledger, "2020-01-01T15:00:00Z", "2020-01-01T17:00:00Z"),
            vec![
                bucket("2020-01-01T16:00:00Z", "4"),
                bucket("2020-01-01T17:00:00Z", "10"),
            ],
        );
    }

    fn reverse_insert<S: Store>(ledger: &Ledger<S>) {
        // 16:05 down to 15:56, one minute apart, amounts 1 through 10.
        let now = time("2020-01-01T16:05:00Z");
        for i in 0..10 {
            let t = now - chrono::TimeDelta::minutes(i);
            ledger.deposit(t, deposit(&(i + 1).to_string())).unwrap();
        }

        assert_eq!(
            historical(ledger, "2020-01-01T15:00:00Z", "2020-01-01T17:00:00Z"),
            vec![
                bucket("2020-01-01T16:00:00Z", "40"),
                bucket("2020-01-01T17:00:00Z", "55"),
            ],
        );
    }

    fn forward_insert<S: Store>(ledger: &Ledger<S>) {
        // 15:56 up to 16:05, one minute apart, amounts 1 through 10.
        let now = time("2020-01-01T15:56:00Z");
        for i in 0..10 {
            let t = now + chrono::TimeDelta::minutes(i);
            ledger.deposit(t, deposit(&(i + 1).to_string())).unwrap();
        }

        assert_eq!(
            historical(ledger, "2020-01-01T15:00:00Z", "2020-01-01T17:00:00Z"),
            vec![
                bucket("2020-01-01T16:00:00Z", "15"),
                bucket("2020-01-01T17:00:00Z", "55"),
            ],
        );
    }

    fn back_dated_deposit_propagates<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-01T10:30:00Z", "1");
        put(ledger, "2020-01-01T12:30:00Z", "2");
        put(ledger, "2020-01-01T14:30:00Z", "4");
        // Lands in a new bucket between existing ones.
        put(ledger, "2020-01-01T11:15:00Z", "0.5");
        // Lands before every bucket.
        put(ledger, "2020-01-01T08:00:00Z", "100");

        assert_eq!(
            ledger.buckets().unwrap(),
            vec![
                bucket("2020-01-01T08:00:00Z", "100"),
                bucket("2020-01-01T11:00:00Z", "101"),
                bucket("2020-01-01T12:00:00Z", "101.5"),
                bucket("2020-01-01T13:00:00Z", "103.5"),
                bucket("2020-01-01T15:00:00Z", "107.5"),
            ],
        );

        // The baseline for a window starting between buckets is the previous bucket.
        assert_eq!(
            historical(ledger, "2020-01-01T13:30:00Z", "2020-01-01T16:00:00Z"),
            vec![
                bucket("2020-01-01T13:00:00Z", "103.5"),
                bucket("2020-01-01T15:00:00Z", "107.5"),
            ],
        );
    }

    fn series_no_deposits<S: Store>(ledger: &Ledger<S>) {
        assert!(historical(ledger, "2020-01-01T15:00:00Z", "2020-01-01T17:00:00Z").is_empty());

        let series = ledger
            .series(time("2020-01-01T15:00:00Z"), time("2020-01-01T17:00:00Z"))
            .unwrap();
        assert_eq!(
            series,
            vec![
                total("2020-01-01T15:00:00Z", "0"),
                total("2020-01-01T16:00:00Z", "0"),
                total("2020-01-01T17:00:00Z", "0"),
            ],
        );
    }

    fn series_across_midnight<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-01T23:00:00Z", "10");

        let series = ledger
            .series(time("2020-01-01T23:00:00Z"), time("2020-01-02T02:00:00Z"))
            .unwrap();
        assert_eq!(
            series,
            vec![
                total("2020-01-01T23:00:00Z", "10"),
                total("2020-01-02T00:00:00Z", "10"),
                total("2020-01-02T01:00:00Z", "10"),
                total("2020-01-02T02:00:00Z", "10"),
            ],
        );
    }

    fn series_windows_before_and_after_deposits<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-02T12:10:00Z", "3");
        put(ledger, "2020-01-02T14:45:00Z", "4");

        let before = ledger
            .series(time("2020-01-01T00:00:00Z"), time("2020-01-01T03:00:00Z"))
            .unwrap();
        assert_eq!(before.len(), 4);
        assert!(before.iter().all(|entry| entry.amount.is_zero()));

        let after = ledger
            .series(time("2020-01-03T00:00:00Z"), time("2020-01-03T05:00:00Z"))
            .unwrap();
        assert_eq!(after.len(), 6);
        assert!(after.iter().all(|entry| entry.amount == amount("7")));

        let during = ledger
            .series(time("2020-01-02T12:00:00Z"), time("2020-01-02T15:00:00Z"))
            .unwrap();
        assert_eq!(
            during,
            vec![
                total("2020-01-02T12:00:00Z", "0"),
                total("2020-01-02T13:00:00Z", "3"),
                total("2020-01-02T14:00:00Z", "3"),
                total("2020-01-02T15:00:00Z", "7"),
            ],
        );
    }

    fn round_trip_precision<S: Store>(ledger: &Ledger<S>) {
        let a = deposit("12345678901.12345678");
        ledger.deposit(time("2020-01-01T15:59:59Z"), a).unwrap();

        let series = ledger
            .series(time("2020-01-01T15:00:00Z"), time("2020-01-01T16:00:00Z"))
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].amount, a.amount());
        assert_eq!(series[1].amount.to_string(), "12345678901.12345678");
    }

    fn deposit_truncates_subseconds<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-01T16:00:00.999Z", "1");

        let events = ledger.events().unwrap();
        assert_eq!(events[0].event_time, time("2020-01-01T16:00:00Z"));
        assert_eq!(
            ledger.buckets().unwrap(),
            vec![bucket("2020-01-01T16:00:00Z", "1")],
        );
    }

    fn rebuild_is_idempotent<S: Store>(ledger: &Ledger<S>) {
        put(ledger, "2020-01-01T10:30:00Z", "1");
        put(ledger, "2020-01-01T09:30:00Z", "2");
        put(ledger, "2020-01-01T12:00:00Z", "3");
        let before = ledger.buckets().unwrap();

        assert_eq!(ledger.rebuild().unwrap(), 3);
        assert_eq!(ledger.buckets().unwrap(), before);
        assert!(ledger.audit().unwrap().is_consistent());
    }

    #[test]
    fn test_invalid_range_is_parameter_error() {
        let ledger = memory_ledger();
        let err = ledger
            .historical(time("2020-01-01T17:00:00Z"), time("2020-01-01T15:00:00Z"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert!(matches!(
            err,
            LedgerError::Parameter(ParameterError::Range { .. })
        ));

        let err = ledger
            .series(time("2020-01-01T17:00:00Z"), time("2020-01-01T15:00:00Z"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
    }

    #[test]
    fn test_out_of_range_time_is_parameter_error() {
        let ledger = memory_ledger();
        let err = ledger
            .deposit(DateTime::<Utc>::MAX_UTC, deposit("1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parameter);
        assert!(ledger.events().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_amount_is_parameter_error() {
        for input in ["-1", "0", "NaN", "ten"] {
            let err = LedgerError::from(input.parse::<DepositAmount>().unwrap_err());
            assert_eq!(err.kind(), ErrorKind::Parameter, "{input}");
        }
    }

    /// A store that fails every forward propagation while `fail` is set.
    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    struct FlakyTx<'a> {
        inner: MemoryTx<'a>,
        fail: bool,
    }

    impl Store for FlakyStore {
        type Tx<'a> = FlakyTx<'a>;

        fn begin_write(&self) -> Result<Self::Tx<'_>, StoreError> {
            Ok(FlakyTx {
                inner: self.inner.begin_write()?,
                fail: self.fail.load(Ordering::Relaxed),
            })
        }

        fn begin_read(&self) -> Result<Self::Tx<'_>, StoreError> {
            Ok(FlakyTx {
                inner: self.inner.begin_read()?,
                fail: false,
            })
        }
    }

    impl StoreTx for FlakyTx<'_> {
        fn append_event(
            &mut self,
            event_time: DateTime<Utc>,
            amount: DepositAmount,
        ) -> Result<u64, StoreError> {
            self.inner.append_event(event_time, amount)
        }

        fn upsert_bucket(
            &mut self,
            bucket_end: DateTime<Utc>,
            amount: DepositAmount,
        ) -> Result<(), StoreError> {
            self.inner.upsert_bucket(bucket_end, amount)
        }

        fn propagate(
            &mut self,
            after: DateTime<Utc>,
            amount: DepositAmount,
        ) -> Result<usize, StoreError> {
            if self.fail {
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
            self.inner.propagate(after, amount)
        }

        fn baseline(&mut self, at: DateTime<Utc>) -> Result<Option<Bucket>, StoreError> {
            self.inner.baseline(at)
        }

        fn buckets(
            &mut self,
            after: DateTime<Utc>,
            through: DateTime<Utc>,
        ) -> Result<Vec<Bucket>, StoreError> {
            self.inner.buckets(after, through)
        }

        fn all_buckets(&mut self) -> Result<Vec<Bucket>, StoreError> {
            self.inner.all_buckets()
        }

        fn events(&mut self) -> Result<Vec<DepositEvent>, StoreError> {
            self.inner.events()
        }

        fn clear_buckets(&mut self) -> Result<(), StoreError> {
            self.inner.clear_buckets()
        }

        fn commit(self) -> Result<(), StoreError> {
            self.inner.commit()
        }
    }

    #[test]
    #[traced_test]
    fn test_failed_deposit_leaves_no_trace() {
        let ledger = Ledger::new(FlakyStore::default());
        put(&ledger, "2020-01-01T17:30:00Z", "10");
        let events_before = ledger.events().unwrap();
        let buckets_before = ledger.buckets().unwrap();

        ledger.store().fail.store(true, Ordering::Relaxed);
        let err = ledger
            .deposit(time("2020-01-01T15:00:00Z"), deposit("5"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(
            err,
            LedgerError::Internal(StoreError::Unavailable(_))
        ));

        // The event append and the bucket upsert both ran before the failure.
        assert_eq!(ledger.events().unwrap(), events_before);
        assert_eq!(ledger.buckets().unwrap(), buckets_before);

        // Retrying once the failure clears is safe.
        ledger.store().fail.store(false, Ordering::Relaxed);
        put(&ledger, "2020-01-01T15:00:00Z", "5");
        assert_eq!(
            ledger.buckets().unwrap(),
            vec![
                bucket("2020-01-01T15:00:00Z", "5"),
                bucket("2020-01-01T18:00:00Z", "15"),
            ],
        );
        assert!(logs_contain("Propagated 5 to 1 buckets"));
    }

    #[test]
    fn test_busy_database_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite3");
        let holder = SqliteStore::open_path(&path, Duration::from_secs(5)).unwrap();
        let store = SqliteStore::open_path(&path, Duration::from_millis(100)).unwrap();
        let ledger = Ledger::new(store);
        put(&ledger, "2020-01-01T17:30:00Z", "10");
        let events_before = ledger.events().unwrap();
        let buckets_before = ledger.buckets().unwrap();

        {
            let _held = holder.begin_write().unwrap();
            let err = ledger
                .deposit(time("2020-01-01T15:00:00Z"), deposit("5"))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Internal);
            assert!(matches!(err, LedgerError::Internal(StoreError::Sqlite(_))));

            // Readers are not blocked by a waiting writer.
            assert_eq!(ledger.buckets().unwrap(), buckets_before);
        }

        assert_eq!(ledger.events().unwrap(), events_before);
        assert_eq!(ledger.buckets().unwrap(), buckets_before);

        put(&ledger, "2020-01-01T15:00:00Z", "5");
        assert_eq!(
            ledger.buckets().unwrap(),
            vec![
                bucket("2020-01-01T15:00:00Z", "5"),
                bucket("2020-01-01T18:00:00Z", "15"),
            ],
        );
    }

    #[test]
    fn test_sqlite_overflow_rolls_back() {
        let (_dir, ledger) = sqlite_ledger();
        put(&ledger, "2020-01-01T15:30:00Z", "1");

        // A running total at the limit of `Decimal`, as left behind by some external writer.
        let conn = rusqlite::Connection::open(ledger.store().path()).unwrap();
        conn.execute(
            "INSERT INTO deposit_hourly (ts, amount) VALUES (?1, ?2)",
            rusqlite::params![
                time("2020-01-01T20:00:00Z").timestamp(),
                rust_decimal::Decimal::MAX.to_string(),
            ],
        )
        .unwrap();
        drop(conn);

        let events_before = ledger.events().unwrap();
        let buckets_before = ledger.buckets().unwrap();
        assert_eq!(buckets_before.len(), 2);

        let err = ledger
            .deposit(time("2020-01-01T10:00:00Z"), deposit("1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, LedgerError::Internal(StoreError::Sqlite(_))));

        assert_eq!(ledger.events().unwrap(), events_before);
        assert_eq!(ledger.buckets().unwrap(), buckets_before);
    }

    #[test]
    fn test_concurrent_deposits_memory() {
        let ledger = memory_ledger();
        let start = time("2020-01-01T00:00:00Z");

        (0..200_i64).into_par_iter().for_each(|i| {
            // Spread deposits over 12 hours, in no particular order.
            let t = start + chrono::TimeDelta::minutes((i * 37) % (12 * 60));
            ledger.deposit(t, deposit("0.25")).unwrap();
        });

        let report = ledger.audit().unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.total, amount("50"));
    }

    #[test]
    fn test_concurrent_deposits_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path().join("ledger.sqlite3"));
        config.busy_timeout = Duration::from_secs(30);
        let ledger = Ledger::open(&config).unwrap();
        let start = time("2020-01-01T00:00:00Z");

        (0..64_i64).into_par_iter().for_each(|i| {
            let t = start + chrono::TimeDelta::minutes((i * 53) % (6 * 60));
            ledger.deposit(t, deposit("1.5")).unwrap();
        });

        let report = ledger.audit().unwrap();
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.total, amount("96"));
        assert_eq!(ledger.events().unwrap().len(), 64);
    }
}
