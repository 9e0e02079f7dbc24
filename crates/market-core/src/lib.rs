//! Shared vocabulary of the market data pipeline: domain row types, the
//! metric catalog, validation helpers and quarter arithmetic.

pub mod error;
pub mod metrics;
pub mod types;
pub mod validate;

pub use error::EtlError;
pub use types::*;

pub type EtlResult<T> = Result<T, EtlError>;
