//! Engine options, deserialisable from the `[import]` table of the config
//! file.

use serde::{Deserialize, Serialize};

/// How records of one batch are grouped into transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
  /// Each record commits on its own. A failure rolls back that record and
  /// stops the batch; earlier records stay.
  #[default]
  PerRecord,
  /// All records share one transaction; any failure discards the lot.
  WholeBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
  /// Create a site when no existing one matches.
  pub allow_create: bool,
  /// Refresh matched sites and add changed contact parties.
  pub allow_update: bool,
  pub commit_mode:  CommitMode,
}

impl Default for ImportOptions {
  fn default() -> Self {
    Self {
      allow_create: true,
      allow_update: true,
      commit_mode:  CommitMode::PerRecord,
    }
  }
}
