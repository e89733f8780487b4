//! Transactional storage for the bucket table and the raw event log.
//!
//! The ledger only talks to storage through [`Store`] and [`StoreTx`]. Every ledger operation opens
//! exactly one transaction, and nothing it does becomes visible until [`StoreTx::commit`] returns.
//! Dropping a transaction without committing it rolls it back.

use crate::amount::{Amount, DepositAmount};
use crate::model::{Bucket, DepositEvent};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use self::{memory::MemoryStore, sqlite::SqliteStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Decimal overflow while adding {0} to a running total")]
    Overflow(Amount),

    #[error("Stored value `{0}` is not a valid decimal")]
    CorruptAmount(String, #[source] crate::amount::AmountError),

    #[error("Stored timestamp {0} is out of range")]
    CorruptTimestamp(i64),

    #[error("Store is unavailable: {0}")]
    Unavailable(String),
}

/// A source of serializable transactions.
pub trait Store {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    /// Begin a transaction that may write. Write transactions are serialized with respect to each
    /// other.
    fn begin_write(&self) -> Result<Self::Tx<'_>, StoreError>;

    /// Begin a read-only transaction over a consistent snapshot.
    fn begin_read(&self) -> Result<Self::Tx<'_>, StoreError>;
}

/// Operations available inside one transaction.
pub trait StoreTx {
    /// Append a deposit to the event log, returning its sequence number.
    fn append_event(
        &mut self,
        event_time: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<u64, StoreError>;

    /// Add `amount` to the bucket at `bucket_end`.
    ///
    /// A missing bucket is created with `amount` plus the running total of the latest bucket
    /// strictly before `bucket_end`.
    fn upsert_bucket(
        &mut self,
        bucket_end: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<(), StoreError>;

    /// Add `amount` to every bucket strictly after `after`. Returns the number of buckets touched.
    fn propagate(&mut self, after: DateTime<Utc>, amount: DepositAmount)
        -> Result<usize, StoreError>;

    /// The latest bucket with `bucket_end <= at`.
    fn baseline(&mut self, at: DateTime<Utc>) -> Result<Option<Bucket>, StoreError>;

    /// All buckets in `(after, through]`, ascending.
    fn buckets(
        &mut self,
        after: DateTime<Utc>,
        through: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, StoreError>;

    /// Every bucket, ascending.
    fn all_buckets(&mut self) -> Result<Vec<Bucket>, StoreError>;

    /// The whole event log in append order.
    fn events(&mut self) -> Result<Vec<DepositEvent>, StoreError>;

    /// Remove every bucket. Only used when rebuilding buckets from the event log.
    fn clear_buckets(&mut self) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;
}
