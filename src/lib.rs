#![forbid(unsafe_code)]

pub mod amount;
pub mod config;
pub mod errors;
pub mod hour;
pub mod ledger;
pub mod model;
pub mod series;
pub mod store;

pub use crate::amount::{Amount, DepositAmount};
pub use crate::config::Config;
pub use crate::ledger::{AuditReport, ErrorKind, Ledger};
pub use crate::model::{Bucket, DepositEvent, HourlyTotal};
