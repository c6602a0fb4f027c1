//! Error type for `jkr-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] jkr_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A customer reference already exists for this customer id.
  #[error("customer reference already exists: {0}")]
  DuplicateReference(String),

  #[error("site not found: {0}")]
  SiteNotFound(uuid::Uuid),

  #[error("customer reference not found: {0}")]
  ReferenceNotFound(String),

  #[error("contract not found: {0}")]
  ContractNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
