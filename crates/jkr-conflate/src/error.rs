//! Error types for the conflation engine.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{import::ImportReport, resolve::Strategy};

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("subsidy extract error: {0}")]
  Subsidy(#[from] csv::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("site not found: {0}")]
  SiteNotFound(Uuid),

  #[error("resolution plan has no site when {0}")]
  InvalidPlan(&'static str),
}

impl Error {
  /// Wrap any backend error. Used as `.map_err(Error::store)`.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a record was left out of a batch. Not an error: the batch goes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
  /// No site matched and creation was not allowed.
  NoMatch,
  /// One strategy matched several distinct sites.
  Ambiguous { strategy: Strategy, sites: Vec<Uuid> },
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SkipReason::NoMatch => f.write_str("no matching site"),
      SkipReason::Ambiguous { strategy, sites } => {
        write!(f, "{} sites matched by {strategy}", sites.len())
      }
    }
  }
}

/// A batch that stopped part way. `report` covers the records handled
/// before the failure.
#[derive(Debug, Error)]
#[error("import aborted after {} records: {source}", report.records)]
pub struct ImportError {
  pub report: ImportReport,
  #[source]
  pub source: Error,
}
