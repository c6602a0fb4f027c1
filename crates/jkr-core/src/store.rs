//! The `SiteStore` and `BuildingRegistry` traits.
//!
//! Both are implemented by storage backends (e.g. `jkr-store-sqlite`). The
//! conflation engine depends on these abstractions, not on any concrete
//! backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  codes::PartyRole,
  period::ValidityPeriod,
  record::{CustomerId, PartyInfo},
  site::{
    Building, Contract, CustomerReference, NewContract, NewParty,
    NewPickupEvent, NewSite, Party, PickupEvent, Provider, Site, SiteParty,
  },
};

// ─── SiteStore ───────────────────────────────────────────────────────────────

/// Transactional store of sites and everything attached to them.
///
/// Writes become durable only on [`SiteStore::commit`]; [`SiteStore::rollback`]
/// discards everything since the last `begin`. Calling `begin` while a
/// transaction is open is a no-op, as is `commit`/`rollback` without one.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait SiteStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Transactions ──────────────────────────────────────────────────────

  fn begin(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn commit(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn rollback(&self)
  -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Providers ─────────────────────────────────────────────────────────

  fn get_provider<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<Provider>, Self::Error>> + Send + 'a;

  fn add_provider(
    &self,
    provider: Provider,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Customer references ───────────────────────────────────────────────

  fn get_reference<'a>(
    &'a self,
    customer_id: &'a CustomerId,
  ) -> impl Future<Output = Result<Option<CustomerReference>, Self::Error>>
  + Send
  + 'a;

  /// Persist a new reference. Returns an error if one already exists for
  /// the same customer id.
  fn add_reference(
    &self,
    reference: CustomerReference,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace the stored contact snapshot and bump `updated_at`.
  fn refresh_reference<'a>(
    &'a self,
    customer_id: &'a CustomerId,
    holder: &'a PartyInfo,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Every reference bound to the site, ordered by customer id.
  fn site_references(
    &self,
    site_id: Uuid,
  ) -> impl Future<Output = Result<Vec<CustomerReference>, Self::Error>>
  + Send
  + '_;

  // ── Sites ─────────────────────────────────────────────────────────────

  fn add_site(
    &self,
    site: NewSite,
  ) -> impl Future<Output = Result<Site, Self::Error>> + Send + '_;

  fn get_site(
    &self,
    site_id: Uuid,
  ) -> impl Future<Output = Result<Option<Site>, Self::Error>> + Send + '_;

  /// Overwrite the stored name and validity of an existing site.
  fn update_site<'a>(
    &'a self,
    site: &'a Site,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Distinct sites valid during `during` and linked to any of `building_ids`.
  fn find_sites_by_buildings<'a>(
    &'a self,
    building_ids: &'a [String],
    during: &'a ValidityPeriod,
  ) -> impl Future<Output = Result<Vec<Site>, Self::Error>> + Send + 'a;

  /// Distinct sites valid during `during` and linked to a building standing
  /// on any of `property_ids`.
  fn find_sites_by_properties<'a>(
    &'a self,
    property_ids: &'a [String],
    during: &'a ValidityPeriod,
  ) -> impl Future<Output = Result<Vec<Site>, Self::Error>> + Send + 'a;

  /// Distinct sites valid during `during` and linked to a building whose
  /// normalised address key equals `address_key`.
  fn find_sites_by_address<'a>(
    &'a self,
    address_key: &'a str,
    during: &'a ValidityPeriod,
  ) -> impl Future<Output = Result<Vec<Site>, Self::Error>> + Send + 'a;

  /// Ids of buildings confirmed for the site.
  fn site_buildings(
    &self,
    site_id: Uuid,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Append confirmed building links; existing links are kept.
  fn link_buildings<'a>(
    &'a self,
    site_id: Uuid,
    building_ids: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Ids of unconfirmed candidate buildings for the site.
  fn site_candidates(
    &self,
    site_id: Uuid,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  fn add_candidates<'a>(
    &'a self,
    site_id: Uuid,
    building_ids: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Parties ───────────────────────────────────────────────────────────

  /// Parties associated with the site under `role`, from every provider.
  fn site_parties(
    &self,
    site_id: Uuid,
    role: PartyRole,
  ) -> impl Future<Output = Result<Vec<Party>, Self::Error>> + Send + '_;

  fn add_party(
    &self,
    party: NewParty,
  ) -> impl Future<Output = Result<Party, Self::Error>> + Send + '_;

  fn link_party(
    &self,
    link: SiteParty,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Pickup events ─────────────────────────────────────────────────────

  fn site_events(
    &self,
    site_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PickupEvent>, Self::Error>> + Send + '_;

  fn add_event(
    &self,
    event: NewPickupEvent,
  ) -> impl Future<Output = Result<PickupEvent, Self::Error>> + Send + '_;

  // ── Contracts ─────────────────────────────────────────────────────────

  fn site_contracts(
    &self,
    site_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Contract>, Self::Error>> + Send + '_;

  fn add_contract(
    &self,
    contract: NewContract,
  ) -> impl Future<Output = Result<Contract, Self::Error>> + Send + '_;

  fn set_contract_end(
    &self,
    contract_id: Uuid,
    end: Option<NaiveDate>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── BuildingRegistry ────────────────────────────────────────────────────────

/// Read access to the building registry, plus loading.
pub trait BuildingRegistry: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert or replace a building.
  fn add_building<'a>(
    &'a self,
    building: &'a Building,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The buildings with the given ids; unknown ids are ignored.
  fn get_buildings<'a>(
    &'a self,
    building_ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<Building>, Self::Error>> + Send + 'a;

  fn buildings_on_properties<'a>(
    &'a self,
    property_ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<Building>, Self::Error>> + Send + 'a;

  fn buildings_at_address<'a>(
    &'a self,
    address_key: &'a str,
  ) -> impl Future<Output = Result<Vec<Building>, Self::Error>> + Send + 'a;

  /// Buildings not yet confirmed for any site, ordered by building id.
  fn uncovered_buildings(
    &self,
  ) -> impl Future<Output = Result<Vec<Building>, Self::Error>> + Send + '_;
}
