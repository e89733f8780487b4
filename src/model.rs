use crate::amount::{Amount, DepositAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded deposit. Immutable once written to the event log.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DepositEvent {
    /// Append position in the event log.
    pub sequence: u64,
    pub event_time: DateTime<Utc>,
    pub amount: DepositAmount,
}

/// Running total of all deposits attributed to `bucket_end` or any earlier hour boundary.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Bucket {
    pub bucket_end: DateTime<Utc>,
    pub cumulative_amount: Amount,
}

/// One entry of a gap-filled hourly series.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HourlyTotal {
    #[serde(rename = "datetime")]
    pub time: DateTime<Utc>,
    pub amount: Amount,
}

impl Bucket {
    pub fn new(bucket_end: DateTime<Utc>, cumulative_amount: Amount) -> Self {
        Self {
            bucket_end,
            cumulative_amount,
        }
    }
}
