//! The site conflation engine.
//!
//! Maps incoming customer records onto canonical sites and merges what the
//! records carry (building links, contact parties, contracts, pickup events)
//! without creating duplicates across repeated or overlapping imports.
//!
//! Everything here is generic over [`jkr_core::store::SiteStore`] and
//! [`jkr_core::store::BuildingRegistry`]; the engine never talks to a
//! database directly. Work is strictly sequential: each store call is
//! awaited before the next one starts.

pub mod bootstrap;
pub mod buildings;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod import;
pub mod parties;
pub mod progress;
pub mod resolve;

pub use bootstrap::{BootstrapReport, Bootstrapper, SubsidyExtract};
pub use buildings::{BuildingLookup, RegistryLookup};
pub use config::{CommitMode, ImportOptions};
pub use contracts::{ContractMerger, TermContractMerger};
pub use error::{Error, ImportError, Result, SkipReason};
pub use import::{ImportReport, Importer, Phase};
pub use progress::{LogProgress, NoProgress, Progress};
pub use resolve::{Resolution, Strategy, resolve_and_update};
