//! Hour boundary arithmetic.
//!
//! Every deposit is attributed to exactly one hour boundary, its "bucket end". A deposit made at
//! `HH:00:00` belongs to `HH:00:00`, while a deposit made at `HH:00:01` rolls into the next hour.
//! The interval covered by a boundary is `(end - 1h, end]`.

use chrono::{DateTime, SubsecRound as _, TimeDelta, Utc};
use thiserror::Error;

/// One hour in seconds.
pub const ONE_HOUR: i64 = 60 * 60;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum HourError {
    #[error("DateTime {0} is outside of the supported range")]
    OutOfRange(DateTime<Utc>),
}

/// Truncate any sub-second precision. Ledger timestamps have second resolution.
pub fn to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(0)
}

/// Compute the hour boundary that `time` is attributed to.
///
/// `bucket_end = floor_to_hour(time - 1s) + 1h`
pub fn bucket_end(time: DateTime<Utc>) -> Result<DateTime<Utc>, HourError> {
    let secs = to_seconds(time).timestamp();
    let end = (secs - 1).div_euclid(ONE_HOUR) * ONE_HOUR + ONE_HOUR;

    DateTime::from_timestamp(end, 0).ok_or(HourError::OutOfRange(time))
}

/// Iterator over consecutive hour boundaries.
///
/// Starts at `bucket_end(start)` and steps one hour at a time while the boundary does not exceed
/// `end`.
#[derive(Clone, Debug)]
pub struct HourRange {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
}

impl HourRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, HourError> {
        Ok(Self {
            next: Some(bucket_end(start)?),
            end,
        })
    }
}

impl Iterator for HourRange {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|current| *current <= self.end)?;
        self.next = current.checked_add_signed(TimeDelta::hours(1));

        Some(current)
    }
}
