//! Deriving sites straight from the building registry.
//!
//! Used once before the first hauler import, so that customer records have
//! sites to resolve against. Each phase runs in its own transaction; a
//! failure leaves the earlier phases committed.

use std::{
  collections::{BTreeMap, BTreeSet},
  fs::File,
  io,
  path::Path,
};

use chrono::NaiveDate;
use jkr_core::{
  period::ValidityPeriod,
  site::{Building, BuildingKind, NewSite, Site},
  store::{BuildingRegistry, SiteStore},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

// ─── Subsidy extract ─────────────────────────────────────────────────────────

/// One row of the subsidy registry extract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubsidyRow {
  #[serde(rename = "asiakasnumero")]
  pub customer_number: String,
  #[serde(rename = "prt")]
  pub building_id:     String,
}

/// The subsidy registry ("perusmaksurekisteri"): which buildings are billed
/// together under one customer number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsidyExtract {
  rows: Vec<SubsidyRow>,
}

impl SubsidyExtract {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let file = File::open(path)?;
    Self::from_reader(file)
  }

  /// Read a `;`-separated extract with an `asiakasnumero;prt` header. Other
  /// columns are ignored, as are rows with an empty field.
  pub fn from_reader(reader: impl io::Read) -> Result<Self> {
    let mut rdr = csv::ReaderBuilder::new()
      .delimiter(b';')
      .trim(csv::Trim::All)
      .flexible(true)
      .from_reader(reader);

    let mut rows = Vec::new();
    for row in rdr.deserialize::<SubsidyRow>() {
      let row = row?;
      if row.customer_number.is_empty() || row.building_id.is_empty() {
        continue;
      }
      rows.push(row);
    }
    Ok(Self { rows })
  }

  pub fn rows(&self) -> &[SubsidyRow] { &self.rows }

  /// Building ids grouped by customer number.
  pub fn groups(&self) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in &self.rows {
      groups
        .entry(row.customer_number.as_str())
        .or_default()
        .insert(row.building_id.as_str());
    }
    groups
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
  pub single_dwelling_sites: usize,
  pub subsidy_sites:         usize,
  /// Buildings merged into a site that already existed.
  pub subsidy_linked:        usize,
  pub subsidy_skipped:       usize,
  pub paired_sites:          usize,
  pub remaining_sites:       usize,
}

impl BootstrapReport {
  pub fn sites_created(&self) -> usize {
    self.single_dwelling_sites
      + self.subsidy_sites
      + self.paired_sites
      + self.remaining_sites
  }
}

// ─── Bootstrapper ────────────────────────────────────────────────────────────

pub struct Bootstrapper<S> {
  store: S,
}

impl<S> Bootstrapper<S>
where
  S: SiteStore + BuildingRegistry,
{
  pub fn new(store: S) -> Self { Self { store } }

  /// Create sites for every building not yet linked to one.
  ///
  /// New sites are valid from `snapshot_date` to `period_end`. Buildings
  /// count as inhabited if somebody lives there on `snapshot_date`.
  pub async fn bootstrap_sites(
    &self,
    snapshot_date: NaiveDate,
    period_end: Option<NaiveDate>,
    subsidy: Option<&SubsidyExtract>,
  ) -> Result<BootstrapReport> {
    let valid = ValidityPeriod { start: Some(snapshot_date), end: period_end };
    let mut report = BootstrapReport::default();

    self.begin().await?;
    let result = self.single_dwellings(snapshot_date, valid).await;
    report.single_dwelling_sites = self.finish(result).await?;
    info!(
      phase = "single_dwellings",
      sites = report.single_dwelling_sites,
      "bootstrap phase committed"
    );

    if let Some(extract) = subsidy {
      self.begin().await?;
      let result = self.subsidy_groups(extract, valid, &mut report).await;
      self.finish(result).await?;
      info!(
        phase = "subsidy",
        sites = report.subsidy_sites,
        linked = report.subsidy_linked,
        skipped = report.subsidy_skipped,
        "bootstrap phase committed"
      );
    }

    self.begin().await?;
    let result = self.paired(snapshot_date, valid).await;
    report.paired_sites = self.finish(result).await?;
    info!(
      phase = "paired",
      sites = report.paired_sites,
      "bootstrap phase committed"
    );

    self.begin().await?;
    let result = self.remaining(valid).await;
    report.remaining_sites = self.finish(result).await?;
    info!(
      phase = "remaining",
      sites = report.remaining_sites,
      "bootstrap phase committed"
    );

    Ok(report)
  }

  async fn begin(&self) -> Result<()> {
    SiteStore::begin(&self.store).await.map_err(Error::store)
  }

  /// Commit on success, roll back on failure.
  async fn finish<T>(&self, result: Result<T>) -> Result<T> {
    match result {
      Ok(value) => {
        SiteStore::commit(&self.store).await.map_err(Error::store)?;
        Ok(value)
      }
      Err(e) => {
        if let Err(rollback) = SiteStore::rollback(&self.store).await {
          warn!(error = %rollback, "rollback failed");
        }
        Err(e)
      }
    }
  }

  async fn uncovered(&self) -> Result<Vec<Building>> {
    self.store.uncovered_buildings().await.map_err(Error::store)
  }

  async fn site_for(
    &self,
    name: String,
    valid: ValidityPeriod,
    building_ids: &[String],
  ) -> Result<Site> {
    let site = self
      .store
      .add_site(NewSite { name, valid })
      .await
      .map_err(Error::store)?;
    self
      .store
      .link_buildings(site.site_id, building_ids)
      .await
      .map_err(Error::store)?;
    Ok(site)
  }

  async fn single_dwellings(
    &self,
    snapshot_date: NaiveDate,
    valid: ValidityPeriod,
  ) -> Result<usize> {
    let mut created = 0;
    for b in self.uncovered().await? {
      if b.kind() == BuildingKind::SingleDwelling && b.is_inhabited_on(snapshot_date) {
        self.site_for(site_name(&b), valid, &[b.building_id.clone()]).await?;
        created += 1;
      }
    }
    Ok(created)
  }

  async fn subsidy_groups(
    &self,
    extract: &SubsidyExtract,
    valid: ValidityPeriod,
    report: &mut BootstrapReport,
  ) -> Result<()> {
    for (customer, ids) in extract.groups() {
      let ids: Vec<String> = ids.into_iter().map(str::to_owned).collect();
      let buildings = self.store.get_buildings(&ids).await.map_err(Error::store)?;
      let Some(first) = buildings.first() else {
        continue;
      };
      let ids: Vec<String> = buildings.iter().map(|b| b.building_id.clone()).collect();

      let sites = self
        .store
        .find_sites_by_buildings(&ids, &valid)
        .await
        .map_err(Error::store)?;

      match sites.as_slice() {
        [] => {
          self.site_for(site_name(first), valid, &ids).await?;
          report.subsidy_sites += 1;
        }
        [site] => {
          let linked = self
            .store
            .site_buildings(site.site_id)
            .await
            .map_err(Error::store)?;
          let missing: Vec<String> =
            ids.into_iter().filter(|id| !linked.contains(id)).collect();
          if !missing.is_empty() {
            self
              .store
              .link_buildings(site.site_id, &missing)
              .await
              .map_err(Error::store)?;
            report.subsidy_linked += missing.len();
          }
        }
        _ => {
          warn!(
            customer,
            sites = sites.len(),
            "subsidy group spans several sites, skipped"
          );
          report.subsidy_skipped += 1;
        }
      }
    }
    Ok(())
  }

  async fn paired(
    &self,
    snapshot_date: NaiveDate,
    valid: ValidityPeriod,
  ) -> Result<usize> {
    let mut created = 0;
    for b in self.uncovered().await? {
      if b.kind() == BuildingKind::Paired && b.is_inhabited_on(snapshot_date) {
        let ids = [b.building_id.clone()];
        for _ in 0..2 {
          self.site_for(site_name(&b), valid, &ids).await?;
          created += 1;
        }
      }
    }
    Ok(created)
  }

  async fn remaining(&self, valid: ValidityPeriod) -> Result<usize> {
    let mut groups: BTreeMap<(Option<String>, String), Vec<Building>> =
      BTreeMap::new();
    for b in self.uncovered().await? {
      let key = b.address.building_key().unwrap_or_else(|| b.building_id.clone());
      groups.entry((b.property_id.clone(), key)).or_default().push(b);
    }

    let mut created = 0;
    for buildings in groups.into_values() {
      let ids: Vec<String> =
        buildings.iter().map(|b| b.building_id.clone()).collect();
      self.site_for(site_name(&buildings[0]), valid, &ids).await?;
      created += 1;
    }
    Ok(created)
  }
}

fn site_name(building: &Building) -> String {
  let line = building.address.street_line();
  if line.is_empty() { building.building_id.clone() } else { line }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_semicolon_extract() {
    let data = "asiakasnumero;prt;muuta\n\
                1001; 100000001A ;x\n\
                1001;100000002B;y\n\
                \n\
                1002;;z\n\
                1003;100000003C;\n";
    let extract = SubsidyExtract::from_reader(data.as_bytes()).unwrap();
    assert_eq!(extract.rows().len(), 3);

    let groups = extract.groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(
      groups["1001"].iter().copied().collect::<Vec<_>>(),
      vec!["100000001A", "100000002B"]
    );
  }

  #[test]
  fn missing_column_is_an_error() {
    let err = SubsidyExtract::from_reader("asiakasnumero\n1001\n".as_bytes()).unwrap_err();
    assert!(matches!(err, Error::Subsidy(_)));
  }
}
