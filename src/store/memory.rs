//! In-memory store.
//!
//! A single lock is held for the whole lifetime of a transaction, which trivially makes every
//! transaction serializable. Writes are staged on a private copy of the tables and only published
//! by [`StoreTx::commit`], so a dropped transaction leaves no trace.

use super::{Store, StoreError, StoreTx};
use crate::amount::{Amount, DepositAmount};
use crate::model::{Bucket, DepositEvent};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

#[derive(Clone, Debug, Default)]
struct Tables {
    events: Vec<DepositEvent>,
    buckets: BTreeMap<DateTime<Utc>, Amount>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Debug)]
pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    staged: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self) -> MemoryTx<'_> {
        let guard = self.tables.lock();
        let staged = guard.clone();

        MemoryTx { guard, staged }
    }
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin_write(&self) -> Result<Self::Tx<'_>, StoreError> {
        Ok(self.begin())
    }

    fn begin_read(&self) -> Result<Self::Tx<'_>, StoreError> {
        Ok(self.begin())
    }
}

fn add(total: Amount, amount: DepositAmount) -> Result<Amount, StoreError> {
    total
        .checked_add(amount.amount())
        .ok_or(StoreError::Overflow(amount.amount()))
}

impl StoreTx for MemoryTx<'_> {
    fn append_event(
        &mut self,
        event_time: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<u64, StoreError> {
        let sequence = self.staged.events.len() as u64 + 1;
        self.staged.events.push(DepositEvent {
            sequence,
            event_time,
            amount,
        });

        Ok(sequence)
    }

    fn upsert_bucket(
        &mut self,
        bucket_end: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<(), StoreError> {
        let buckets = &mut self.staged.buckets;
        let total = match buckets.get(&bucket_end) {
            Some(total) => add(*total, amount)?,
            None => {
                let previous = buckets
                    .range(..bucket_end)
                    .next_back()
                    .map(|(_, total)| *total)
                    .unwrap_or_default();

                add(previous, amount)?
            }
        };
        buckets.insert(bucket_end, total);

        Ok(())
    }

    fn propagate(
        &mut self,
        after: DateTime<Utc>,
        amount: DepositAmount,
    ) -> Result<usize, StoreError> {
        let mut count = 0;
        for (_, total) in self.staged.buckets.range_mut((Excluded(after), Unbounded)) {
            *total = add(*total, amount)?;
            count += 1;
        }

        Ok(count)
    }

    fn baseline(&mut self, at: DateTime<Utc>) -> Result<Option<Bucket>, StoreError> {
        Ok(self
            .staged
            .buckets
            .range(..=at)
            .next_back()
            .map(|(end, total)| Bucket::new(*end, *total)))
    }

    fn buckets(
        &mut self,
        after: DateTime<Utc>,
        through: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, StoreError> {
        if through <= after {
            return Ok(Vec::new());
        }

        Ok(self
            .staged
            .buckets
            .range((Excluded(after), Included(through)))
            .map(|(end, total)| Bucket::new(*end, *total))
            .collect())
    }

    fn all_buckets(&mut self) -> Result<Vec<Bucket>, StoreError> {
        Ok(self
            .staged
            .buckets
            .iter()
            .map(|(end, total)| Bucket::new(*end, *total))
            .collect())
    }

    fn events(&mut self) -> Result<Vec<DepositEvent>, StoreError> {
        Ok(self.staged.events.clone())
    }

    fn clear_buckets(&mut self) -> Result<(), StoreError> {
        self.staged.buckets.clear();

        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.staged);

        Ok(())
    }
}
