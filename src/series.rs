use crate::amount::Amount;
use crate::hour::{HourError, HourRange};
use crate::model::{Bucket, HourlyTotal};
use chrono::{DateTime, Utc};

/// Expand sparse buckets into one entry per hour boundary.
///
/// Emits every boundary from `bucket_end(start)` through the largest boundary not exceeding `end`.
/// `rows` must be sorted by `bucket_end`, as returned by [`Ledger::historical`]. Hours without a
/// stored bucket carry the most recent earlier total, or zero when there is none. The baseline row
/// may precede the first boundary; it only seeds the running value.
///
/// [`Ledger::historical`]: crate::ledger::Ledger::historical
pub fn fill(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rows: &[Bucket],
) -> Result<Vec<HourlyTotal>, HourError> {
    let mut rows = rows.iter().peekable();
    let mut current = Amount::ZERO;

    let series = HourRange::new(start, end)?
        .map(|time| {
            while let Some(row) = rows.next_if(|row| row.bucket_end <= time) {
                current = row.cumulative_amount;
            }

            HourlyTotal {
                time,
                amount: current,
            }
        })
        .collect();

    Ok(series)
}
