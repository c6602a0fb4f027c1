//! Batch import: one provider's customer records for one reporting period.
//!
//! A batch moves through four phases, each logged on entry:
//!
//! * [`Phase::Init`]: the interval counters are built over every record.
//! * [`Phase::ProvidersRegistered`]: the batch provider and every hauler
//!   named in the records exist in the store.
//! * [`Phase::RecordsImported`]: records are resolved and merged in order.
//! * [`Phase::Committed`]: all work is durable.
//!
//! How records map onto transactions is governed by
//! [`CommitMode`](crate::config::CommitMode).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use jkr_core::{
  period::BatchCounters,
  record::{CustomerId, CustomerRecord},
  site::Provider,
  store::SiteStore,
};
use serde::Serialize;
use strum::Display;
use tracing::{info, warn};

use crate::{
  Error, ImportError, Result, SkipReason,
  buildings::BuildingLookup,
  config::{CommitMode, ImportOptions},
  contracts::{ContractMerger, ContractOutcome, TermContractMerger},
  events::{EventOutcome, insert_events},
  parties::{PartyOutcome, reconcile},
  progress::Progress,
  resolve::{Resolution, resolve_and_update},
};

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
  Init,
  ProvidersRegistered,
  RecordsImported,
  Committed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
  pub customer_id: CustomerId,
  pub reason:      SkipReason,
}

/// Counts for one batch. On failure, covers the records handled so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
  /// Records processed, skipped ones included.
  pub records:             usize,
  pub matched:             usize,
  pub created:             usize,
  pub skipped:             Vec<SkippedRecord>,
  pub parties_created:     usize,
  pub contracts_created:   usize,
  pub contracts_updated:   usize,
  pub events_inserted:     usize,
  pub events_duplicate:    usize,
  /// Events and contract terms dropped for an unknown waste type.
  pub events_unknown_type: usize,
  /// Set when a whole-batch failure discarded every record counted above.
  pub rolled_back:         bool,
}

enum RecordOutcome {
  Skipped(SkipReason),
  Imported {
    created:   bool,
    party:     PartyOutcome,
    contracts: ContractOutcome,
    events:    EventOutcome,
  },
}

impl ImportReport {
  fn absorb(&mut self, record: &CustomerRecord, outcome: RecordOutcome) {
    self.records += 1;
    match outcome {
      RecordOutcome::Skipped(reason) => self.skipped.push(SkippedRecord {
        customer_id: record.customer_id.clone(),
        reason,
      }),
      RecordOutcome::Imported { created, party, contracts, events } => {
        if created {
          self.created += 1;
        } else {
          self.matched += 1;
        }
        if let PartyOutcome::Created(_) = party {
          self.parties_created += 1;
        }
        self.contracts_created += contracts.created;
        self.contracts_updated += contracts.updated;
        self.events_inserted += events.inserted;
        self.events_duplicate += events.duplicates;
        self.events_unknown_type += events.unknown_codes + contracts.unknown_codes;
      }
    }
  }
}

// ─── Importer ────────────────────────────────────────────────────────────────

/// Drives batch imports against a store.
pub struct Importer<S, L, M = TermContractMerger> {
  store:  S,
  lookup: L,
  merger: M,
}

impl<S, L> Importer<S, L>
where
  S: SiteStore,
  L: BuildingLookup,
{
  pub fn new(store: S, lookup: L) -> Self {
    Self { store, lookup, merger: TermContractMerger }
  }
}

impl<S, L, M> Importer<S, L, M>
where
  S: SiteStore,
  L: BuildingLookup,
  M: ContractMerger,
{
  pub fn with_merger(store: S, lookup: L, merger: M) -> Self {
    Self { store, lookup, merger }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Import `records`, reported by `provider_code` for the period
  /// `batch_start..=batch_end`.
  ///
  /// Records that match nothing (or too much) are skipped and listed in the
  /// report. A storage failure stops the batch; the returned
  /// [`ImportError`] carries the report up to that point, flagged
  /// `rolled_back` if the whole batch was discarded.
  pub async fn import_batch(
    &self,
    records: &[CustomerRecord],
    batch_start: NaiveDate,
    batch_end: NaiveDate,
    provider_code: &str,
    options: &ImportOptions,
    progress: &mut impl Progress,
  ) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();

    info!(phase = %Phase::Init, records = records.len(), provider = provider_code, "import started");
    let counters = BatchCounters::from_records(records);

    info!(phase = %Phase::ProvidersRegistered, "registering providers");
    if let Err(source) = self.register_providers(records, provider_code).await {
      return Err(ImportError { report, source });
    }

    info!(phase = %Phase::RecordsImported, mode = ?options.commit_mode, "importing records");
    let whole_batch = options.commit_mode == CommitMode::WholeBatch;
    let failed = |mut report: ImportReport, source: Error| {
      report.rolled_back = whole_batch;
      ImportError { report, source }
    };
    if whole_batch && let Err(source) = self.store.begin().await.map_err(Error::store) {
      return Err(ImportError { report, source });
    }

    for record in records {
      if !whole_batch && let Err(source) = self.store.begin().await.map_err(Error::store) {
        return Err(ImportError { report, source });
      }

      let outcome = self
        .import_record(record, &counters, batch_start, batch_end, options)
        .await;
      let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(source) => {
          warn!(customer = %record.customer_id, error = %source, "record failed, rolling back");
          self.rollback().await;
          return Err(failed(report, source));
        }
      };

      if !whole_batch && let Err(source) = self.store.commit().await.map_err(Error::store) {
        self.rollback().await;
        return Err(failed(report, source));
      }

      report.absorb(record, outcome);
      progress.tick();
    }

    if whole_batch && let Err(source) = self.store.commit().await.map_err(Error::store) {
      self.rollback().await;
      return Err(failed(report, source));
    }
    progress.complete();

    info!(
      phase = %Phase::Committed,
      records = report.records,
      matched = report.matched,
      created = report.created,
      skipped = report.skipped.len(),
      parties_created = report.parties_created,
      events_inserted = report.events_inserted,
      events_duplicate = report.events_duplicate,
      events_unknown_type = report.events_unknown_type,
      "import committed"
    );
    Ok(report)
  }

  /// Fetch-or-create the batch provider and every hauler in the records,
  /// in a transaction of its own.
  async fn register_providers(
    &self,
    records: &[CustomerRecord],
    provider_code: &str,
  ) -> Result<()> {
    let codes: BTreeSet<&str> = std::iter::once(provider_code)
      .chain(records.iter().map(|r| r.customer_id.system.as_str()))
      .collect();

    self.store.begin().await.map_err(Error::store)?;
    for code in codes {
      let known = match self.store.get_provider(code).await {
        Ok(known) => known,
        Err(e) => {
          self.rollback().await;
          return Err(Error::store(e));
        }
      };
      if known.is_none() {
        info!(provider = code, "registering new provider");
        if let Err(e) = self.store.add_provider(Provider::from_code(code)).await {
          self.rollback().await;
          return Err(Error::store(e));
        }
      }
    }
    self.store.commit().await.map_err(Error::store)
  }

  async fn import_record(
    &self,
    record: &CustomerRecord,
    counters: &BatchCounters,
    batch_start: NaiveDate,
    batch_end: NaiveDate,
    options: &ImportOptions,
  ) -> Result<RecordOutcome> {
    let resolution =
      resolve_and_update(&self.store, &self.lookup, record, counters, options).await?;

    let (site, created) = match resolution {
      Resolution::Unresolved(reason) => {
        warn!(customer = %record.customer_id, %reason, "record skipped");
        return Ok(RecordOutcome::Skipped(reason));
      }
      Resolution::Matched { site, .. } => (site, false),
      Resolution::Created { site } => (site, true),
    };

    let hauler = record.customer_id.system.as_str();
    let party = reconcile(&self.store, site.site_id, record, options.allow_update).await?;
    let contracts = self
      .merger
      .update_contracts_for_site(&self.store, site.site_id, record, Some(batch_end), hauler)
      .await?;
    let events = insert_events(
      &self.store,
      site.site_id,
      &record.events,
      batch_start,
      batch_end,
      hauler,
    )
    .await?;

    Ok(RecordOutcome::Imported { created, party, contracts, events })
  }

  /// Roll back after a failure that is already being reported.
  async fn rollback(&self) {
    if let Err(e) = self.store.rollback().await {
      warn!(error = %e, "rollback failed");
    }
  }
}
