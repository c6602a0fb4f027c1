//! Contract merge.

use std::future::Future;

use chrono::NaiveDate;
use jkr_core::{
  codes::WasteType, record::CustomerRecord, site::NewContract,
  store::SiteStore,
};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractOutcome {
  pub created:       usize,
  pub updated:       usize,
  pub unknown_codes: usize,
}

/// Brings a site's contracts in line with a resolved record. Called once
/// per record, after party reconciliation and before event insertion.
pub trait ContractMerger: Send + Sync {
  fn update_contracts_for_site<'a, S: SiteStore>(
    &'a self,
    store: &'a S,
    site_id: Uuid,
    record: &'a CustomerRecord,
    period_end: Option<NaiveDate>,
    provider: &'a str,
  ) -> impl Future<Output = Result<ContractOutcome>> + Send + 'a;
}

/// Merges the record's [`ContractTerm`](jkr_core::record::ContractTerm)s.
///
/// A contract is identified by (site, provider, waste type, start). Its end
/// is the term's own end or, failing that, the end of the reporting period.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermContractMerger;

impl ContractMerger for TermContractMerger {
  async fn update_contracts_for_site<'a, S: SiteStore>(
    &'a self,
    store: &'a S,
    site_id: Uuid,
    record: &'a CustomerRecord,
    period_end: Option<NaiveDate>,
    provider: &'a str,
  ) -> Result<ContractOutcome> {
    let mut outcome = ContractOutcome::default();
    if record.contracts.is_empty() {
      return Ok(outcome);
    }

    let mut current = store.site_contracts(site_id).await.map_err(Error::store)?;

    for term in &record.contracts {
      let Some(waste_type) = WasteType::from_code(&term.waste_type) else {
        warn!(%site_id, code = %term.waste_type, "unknown waste type, contract skipped");
        outcome.unknown_codes += 1;
        continue;
      };
      let end = term.end.or(period_end);

      let existing = current.iter().position(|c| {
        c.provider == provider
          && c.waste_type == waste_type
          && c.start == term.start
      });

      match existing {
        Some(i) if current[i].end == end => {}
        Some(i) => {
          store
            .set_contract_end(current[i].contract_id, end)
            .await
            .map_err(Error::store)?;
          current[i].end = end;
          outcome.updated += 1;
        }
        None => {
          let contract = store
            .add_contract(NewContract {
              site_id,
              provider: provider.to_owned(),
              waste_type,
              start: term.start,
              end,
            })
            .await
            .map_err(Error::store)?;
          current.push(contract);
          outcome.created += 1;
        }
      }
    }

    Ok(outcome)
  }
}
