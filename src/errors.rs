//! Every public error type, in one place.

pub use crate::amount::AmountError;
pub use crate::config::ConfigError;
pub use crate::hour::HourError;
pub use crate::ledger::{LedgerError, ParameterError};
pub use crate::store::StoreError;
