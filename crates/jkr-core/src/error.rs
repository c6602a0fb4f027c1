//! Error types for `jkr-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("site not found: {0}")]
  SiteNotFound(Uuid),

  #[error("validity period starts ({start}) after it ends ({end})")]
  InvalidPeriod { start: NaiveDate, end: NaiveDate },

  #[error("unknown {kind} code: {value:?}")]
  UnknownCode { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
