use crate::amount::Amount;
use crate::hour;
use crate::model::{Bucket, DepositEvent};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of checking the bucket table against the event log.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AuditReport {
    /// Number of events in the log.
    pub events: usize,

    /// Number of stored buckets.
    pub buckets: usize,

    /// Sum of every deposit in the log.
    pub total: Amount,

    /// Running total of the latest stored bucket, or zero when there are none.
    pub latest: Amount,

    /// Adjacent bucket pairs where the running total decreases.
    pub non_monotonic: Vec<(Bucket, Bucket)>,

    /// Buckets that differ from what a replay of the event log produces.
    pub mismatches: Vec<BucketMismatch>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BucketMismatch {
    pub bucket_end: DateTime<Utc>,
    pub stored: Option<Amount>,
    pub expected: Option<Amount>,
}

impl AuditReport {
    pub(super) fn new(events: &[DepositEvent], buckets: &[Bucket]) -> Result<Self, StoreError> {
        let expected = replay(events)?;
        let total = expected.values().next_back().copied().unwrap_or_default();
        let latest = buckets
            .last()
            .map(|bucket| bucket.cumulative_amount)
            .unwrap_or_default();

        let non_monotonic = buckets
            .windows(2)
            .filter(|pair| pair[0].cumulative_amount > pair[1].cumulative_amount)
            .map(|pair| (pair[0], pair[1]))
            .collect();

        let stored: BTreeMap<_, _> = buckets
            .iter()
            .map(|bucket| (bucket.bucket_end, bucket.cumulative_amount))
            .collect();
        let mut ends: Vec<_> = stored.keys().chain(expected.keys()).copied().collect();
        ends.sort_unstable();
        ends.dedup();

        let mismatches = ends
            .into_iter()
            .filter_map(|bucket_end| {
                let stored = stored.get(&bucket_end).copied();
                let expected = expected.get(&bucket_end).copied();

                (stored != expected).then_some(BucketMismatch {
                    bucket_end,
                    stored,
                    expected,
                })
            })
            .collect();

        Ok(Self {
            events: events.len(),
            buckets: buckets.len(),
            total,
            latest,
            non_monotonic,
            mismatches,
        })
    }

    /// True when the buckets are exactly what the event log implies.
    pub fn is_consistent(&self) -> bool {
        self.total == self.latest && self.non_monotonic.is_empty() && self.mismatches.is_empty()
    }
}

/// Running totals implied by the event log, keyed by bucket end.
fn replay(events: &[DepositEvent]) -> Result<BTreeMap<DateTime<Utc>, Amount>, StoreError> {
    let mut per_hour = BTreeMap::<DateTime<Utc>, Amount>::new();
    for event in events {
        let bucket_end = hour::bucket_end(event.event_time)
            .map_err(|_| StoreError::CorruptTimestamp(event.event_time.timestamp()))?;
        let sum = per_hour.entry(bucket_end).or_default();
        *sum = sum
            .checked_add(event.amount.amount())
            .ok_or(StoreError::Overflow(event.amount.amount()))?;
    }

    let mut running = Amount::ZERO;
    for sum in per_hour.values_mut() {
        running = running
            .checked_add(*sum)
            .ok_or(StoreError::Overflow(*sum))?;
        *sum = running;
    }

    Ok(per_hour)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn event(sequence: u64, t: &str, amount: &str) -> DepositEvent {
        DepositEvent {
            sequence,
            event_time: time(t),
            amount: amount.parse().unwrap(),
        }
    }

    fn bucket(t: &str, amount: &str) -> Bucket {
        Bucket::new(time(t), amount.parse().unwrap())
    }

    #[test]
    fn test_empty_ledger_is_consistent() {
        let report = AuditReport::new(&[], &[]).unwrap();
        assert!(report.is_consistent());
        assert!(report.total.is_zero());
    }

    #[test]
    fn test_consistent() {
        let events = [
            event(1, "2020-01-01T15:59:00Z", "10"),
            event(2, "2020-01-01T15:56:00Z", "5"),
            event(3, "2020-01-01T17:01:00Z", "1.5"),
        ];
        let buckets = [
            bucket("2020-01-01T16:00:00Z", "15"),
            bucket("2020-01-01T18:00:00Z", "16.5"),
        ];
        let report = AuditReport::new(&events, &buckets).unwrap();

        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.total, "16.5".parse().unwrap());
        assert_eq!((report.events, report.buckets), (3, 2));
    }

    #[test]
    fn test_detects_damage() {
        let events = [
            event(1, "2020-01-01T15:59:00Z", "10"),
            event(2, "2020-01-01T17:01:00Z", "1"),
        ];
        let buckets = [
            bucket("2020-01-01T16:00:00Z", "12"),
            bucket("2020-01-01T17:00:00Z", "11"),
        ];
        let report = AuditReport::new(&events, &buckets).unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.non_monotonic.len(), 1);
        assert_eq!(report.latest, "11".parse().unwrap());
        assert_eq!(
            report.mismatches,
            vec![
                BucketMismatch {
                    bucket_end: time("2020-01-01T16:00:00Z"),
                    stored: Some("12".parse().unwrap()),
                    expected: Some("10".parse().unwrap()),
                },
                BucketMismatch {
                    bucket_end: time("2020-01-01T17:00:00Z"),
                    stored: Some("11".parse().unwrap()),
                    expected: None,
                },
                BucketMismatch {
                    bucket_end: time("2020-01-01T18:00:00Z"),
                    stored: None,
                    expected: Some("11".parse().unwrap()),
                },
            ],
        );
    }
}
