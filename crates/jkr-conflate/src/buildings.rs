//! Building lookup: which registry buildings belong to a customer record.
//!
//! "Linked" buildings are certain enough to be confirmed for a site right
//! away. "Candidates" are plausible matches left for manual review.
//!
//! An identifier only confirms buildings when the record is its sole
//! claimant in the batch, as told by the [`BatchCounters`].

use std::{collections::BTreeMap, future::Future};

use jkr_core::{
  period::BatchCounters, record::CustomerRecord, site::Building,
  store::BuildingRegistry,
};

use crate::{Error, Result};

pub trait BuildingLookup: Send + Sync {
  /// Buildings that certainly belong to the record's site. `counters` covers
  /// the whole batch and tells shared identifiers from exclusive ones.
  fn find_linked_buildings<'a>(
    &'a self,
    record: &'a CustomerRecord,
    counters: &'a BatchCounters,
  ) -> impl Future<Output = Result<Vec<Building>>> + Send + 'a;

  /// Buildings that may belong to the record's site, ordered by id.
  fn find_candidate_buildings<'a>(
    &'a self,
    record: &'a CustomerRecord,
  ) -> impl Future<Output = Result<Vec<Building>>> + Send + 'a;
}

/// [`BuildingLookup`] backed by a [`BuildingRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryLookup<R> {
  registry: R,
}

impl<R: BuildingRegistry> RegistryLookup<R> {
  pub fn new(registry: R) -> Self { Self { registry } }

  pub fn registry(&self) -> &R { &self.registry }
}

impl<R: BuildingRegistry> BuildingLookup for RegistryLookup<R> {
  async fn find_linked_buildings(
    &self,
    record: &CustomerRecord,
    counters: &BatchCounters,
  ) -> Result<Vec<Building>> {
    if !record.buildings.is_empty() {
      let exclusive = record
        .buildings
        .iter()
        .all(|b| counters.buildings.count_overlaps(b, &record.valid) == 1);
      if !exclusive {
        return Ok(Vec::new());
      }
      let ids: Vec<String> = record.buildings.iter().cloned().collect();
      return self.registry.get_buildings(&ids).await.map_err(Error::store);
    }

    if !record.properties.is_empty() {
      let exclusive = record
        .properties
        .iter()
        .all(|p| counters.properties.count_overlaps(p, &record.valid) == 1);
      if !exclusive {
        return Ok(Vec::new());
      }
      let ids: Vec<String> = record.properties.iter().cloned().collect();
      return self
        .registry
        .buildings_on_properties(&ids)
        .await
        .map_err(Error::store);
    }

    if let Some(key) = record.holder.address.building_key()
      && counters.addresses.count_overlaps(&key, &record.valid) == 1
    {
      let found = self
        .registry
        .buildings_at_address(&key)
        .await
        .map_err(Error::store)?;
      if found.len() == 1 {
        return Ok(found);
      }
    }

    Ok(Vec::new())
  }

  async fn find_candidate_buildings(
    &self,
    record: &CustomerRecord,
  ) -> Result<Vec<Building>> {
    let mut found = BTreeMap::new();

    if !record.buildings.is_empty() {
      let ids: Vec<String> = record.buildings.iter().cloned().collect();
      for b in self.registry.get_buildings(&ids).await.map_err(Error::store)? {
        found.insert(b.building_id.clone(), b);
      }
    }

    if !record.properties.is_empty() {
      let ids: Vec<String> = record.properties.iter().cloned().collect();
      for b in self
        .registry
        .buildings_on_properties(&ids)
        .await
        .map_err(Error::store)?
      {
        found.insert(b.building_id.clone(), b);
      }
    }

    if let Some(key) = record.holder.address.building_key() {
      for b in self
        .registry
        .buildings_at_address(&key)
        .await
        .map_err(Error::store)?
      {
        found.insert(b.building_id.clone(), b);
      }
    }

    Ok(found.into_values().collect())
  }
}
