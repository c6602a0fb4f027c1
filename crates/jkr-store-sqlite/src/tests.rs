//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, Utc};
use jkr_core::{
  codes::{PartyKind, PartyRole, WasteType},
  period::ValidityPeriod,
  record::{Address, CustomerId, PartyInfo},
  site::{
    Building, CustomerReference, NewContract, NewParty, NewPickupEvent,
    NewSite, Provider, SiteParty,
  },
  store::{BuildingRegistry, SiteStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn period(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ValidityPeriod {
  ValidityPeriod { start, end }
}

fn address(street: &str, number: &str, postal: &str) -> Address {
  Address {
    street:       Some(street.into()),
    house_number: Some(number.into()),
    apartment:    None,
    postal_code:  Some(postal.into()),
    post_office:  Some("Lahti".into()),
  }
}

fn building(id: &str, property: &str, addr: Address) -> Building {
  Building {
    building_id: id.into(),
    property_id: Some(property.into()),
    address:     addr,
    dwellings:   1,
    residents:   vec![period(Some(date(2015, 1, 1)), None)],
  }
}

async fn site(s: &SqliteStore, name: &str, valid: ValidityPeriod) -> Uuid {
  s.add_site(NewSite { name: name.into(), valid })
    .await
    .unwrap()
    .site_id
}

// ─── Providers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_provider() {
  let s = store().await;
  assert!(s.get_provider("LSJ").await.unwrap().is_none());

  s.add_provider(Provider { code: "LSJ".into(), name: "Salpakierto".into() })
    .await
    .unwrap();

  let fetched = s.get_provider("LSJ").await.unwrap().unwrap();
  assert_eq!(fetched.name, "Salpakierto");
}

// ─── Transactions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn rollback_discards_writes() {
  let s = store().await;

  s.begin().await.unwrap();
  let id = site(&s, "Kauppakatu 1", ValidityPeriod::unbounded()).await;
  s.rollback().await.unwrap();

  assert!(s.get_site(id).await.unwrap().is_none());
}

#[tokio::test]
async fn commit_keeps_writes() {
  let s = store().await;

  s.begin().await.unwrap();
  let id = site(&s, "Kauppakatu 1", ValidityPeriod::unbounded()).await;
  s.commit().await.unwrap();
  s.rollback().await.unwrap();

  assert!(s.get_site(id).await.unwrap().is_some());
}

#[tokio::test]
async fn nested_begin_is_noop() {
  let s = store().await;

  s.begin().await.unwrap();
  s.begin().await.unwrap();
  let id = site(&s, "Kauppakatu 1", ValidityPeriod::unbounded()).await;
  s.rollback().await.unwrap();

  assert!(s.get_site(id).await.unwrap().is_none());
}

// ─── Sites ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_site_overwrites_name_and_validity() {
  let s = store().await;
  let id = site(&s, "Old", period(Some(date(2023, 1, 1)), None)).await;

  let mut fetched = s.get_site(id).await.unwrap().unwrap();
  fetched.name = "New".into();
  fetched.valid.end = Some(date(2024, 12, 31));
  s.update_site(&fetched).await.unwrap();

  let again = s.get_site(id).await.unwrap().unwrap();
  assert_eq!(again.name, "New");
  assert_eq!(again.valid, period(Some(date(2023, 1, 1)), Some(date(2024, 12, 31))));
}

#[tokio::test]
async fn update_missing_site_errors() {
  let s = store().await;
  let mut ghost = s
    .add_site(NewSite { name: "x".into(), valid: ValidityPeriod::unbounded() })
    .await
    .unwrap();
  ghost.site_id = Uuid::new_v4();

  let err = s.update_site(&ghost).await.unwrap_err();
  assert!(matches!(err, Error::SiteNotFound(id) if id == ghost.site_id));
}

#[tokio::test]
async fn find_sites_by_building_respects_validity() {
  let s = store().await;
  let old = site(&s, "old", period(Some(date(2015, 1, 1)), Some(date(2019, 12, 31)))).await;
  let new = site(&s, "new", period(Some(date(2020, 1, 1)), None)).await;
  s.link_buildings(old, &["B1".to_owned()]).await.unwrap();
  s.link_buildings(new, &["B1".to_owned()]).await.unwrap();

  let during = period(Some(date(2024, 1, 1)), Some(date(2024, 6, 30)));
  let found = s.find_sites_by_buildings(&["B1".to_owned()], &during).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].site_id, new);

  let everything = ValidityPeriod::unbounded();
  let found = s.find_sites_by_buildings(&["B1".to_owned()], &everything).await.unwrap();
  assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn find_sites_is_distinct() {
  let s = store().await;
  let id = site(&s, "two buildings", ValidityPeriod::unbounded()).await;
  s.link_buildings(id, &["B1".to_owned(), "B2".to_owned()]).await.unwrap();

  let found = s
    .find_sites_by_buildings(&["B1".to_owned(), "B2".to_owned()], &ValidityPeriod::unbounded())
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn find_sites_with_no_ids_is_empty() {
  let s = store().await;
  let found = s
    .find_sites_by_buildings(&[], &ValidityPeriod::unbounded())
    .await
    .unwrap();
  assert!(found.is_empty());
}

#[tokio::test]
async fn find_sites_by_property_and_address() {
  let s = store().await;
  let addr = address("Kauppakatu", "1", "15140");
  s.add_building(&building("B1", "398-1-2-3", addr.clone())).await.unwrap();
  let id = site(&s, "Kauppakatu 1", ValidityPeriod::unbounded()).await;
  s.link_buildings(id, &["B1".to_owned()]).await.unwrap();

  let any = ValidityPeriod::unbounded();
  let by_property = s
    .find_sites_by_properties(&["398-1-2-3".to_owned()], &any)
    .await
    .unwrap();
  assert_eq!(by_property.len(), 1);

  let key = addr.building_key().unwrap();
  let by_address = s.find_sites_by_address(&key, &any).await.unwrap();
  assert_eq!(by_address.len(), 1);
  assert_eq!(by_address[0].site_id, id);

  let miss = s.find_sites_by_address("kauppakatu 2, 15140", &any).await.unwrap();
  assert!(miss.is_empty());
}

#[tokio::test]
async fn links_are_idempotent() {
  let s = store().await;
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;

  s.link_buildings(id, &["B2".to_owned(), "B1".to_owned()]).await.unwrap();
  s.link_buildings(id, &["B1".to_owned()]).await.unwrap();
  assert_eq!(s.site_buildings(id).await.unwrap(), vec!["B1", "B2"]);

  s.add_candidates(id, &["C1".to_owned()]).await.unwrap();
  s.add_candidates(id, &["C1".to_owned()]).await.unwrap();
  assert_eq!(s.site_candidates(id).await.unwrap(), vec!["C1"]);
}

// ─── References ──────────────────────────────────────────────────────────────

fn holder(name: &str) -> PartyInfo {
  PartyInfo {
    name:        name.into(),
    address:     address("Kauppakatu", "1", "15140"),
    business_id: None,
  }
}

#[tokio::test]
async fn reference_roundtrip_and_duplicate() {
  let s = store().await;
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;
  let customer = CustomerId::new("LSJ", "42");

  let reference = CustomerReference {
    customer_id: customer.clone(),
    site_id:     id,
    holder:      holder("Matti Meikäläinen"),
    updated_at:  Utc::now(),
  };
  s.add_reference(reference.clone()).await.unwrap();

  let fetched = s.get_reference(&customer).await.unwrap().unwrap();
  assert_eq!(fetched.site_id, id);
  assert_eq!(fetched.holder.name, "Matti Meikäläinen");

  let err = s.add_reference(reference).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateReference(_)));
}

#[tokio::test]
async fn refresh_reference_replaces_holder() {
  let s = store().await;
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;
  let customer = CustomerId::new("LSJ", "42");
  s.add_reference(CustomerReference {
    customer_id: customer.clone(),
    site_id:     id,
    holder:      holder("Old Name"),
    updated_at:  Utc::now(),
  })
  .await
  .unwrap();

  s.refresh_reference(&customer, &holder("New Name")).await.unwrap();
  let fetched = s.get_reference(&customer).await.unwrap().unwrap();
  assert_eq!(fetched.holder.name, "New Name");

  let missing = CustomerId::new("LSJ", "43");
  let err = s.refresh_reference(&missing, &holder("x")).await.unwrap_err();
  assert!(matches!(err, Error::ReferenceNotFound(_)));
}

#[tokio::test]
async fn site_references_lists_bound_customers() {
  let s = store().await;
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;
  let other = site(&s, "y", ValidityPeriod::unbounded()).await;
  for (system, number, site_id) in
    [("LSJ", "2", id), ("HAUL", "9", id), ("LSJ", "1", id), ("LSJ", "3", other)]
  {
    s.add_reference(CustomerReference {
      customer_id: CustomerId::new(system, number),
      site_id,
      holder:      holder("Matti Meikäläinen"),
      updated_at:  Utc::now(),
    })
    .await
    .unwrap();
  }

  let ids: Vec<String> = s
    .site_references(id)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.customer_id.to_string())
    .collect();
  assert_eq!(ids, vec!["HAUL/9", "LSJ/1", "LSJ/2"]);
  assert!(s.site_references(Uuid::new_v4()).await.unwrap().is_empty());
}

// ─── Parties ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn parties_are_filtered_by_role() {
  let s = store().await;
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;

  let party = s
    .add_party(NewParty {
      name:           "As Oy Esimerkki".into(),
      street_address: "Kauppakatu 1".into(),
      postal_code:    Some("15140".into()),
      post_office:    Some("Lahti".into()),
      business_id:    Some("1234567-8".into()),
      kind:           PartyKind::HousingAssociation,
      provider:       Some("LSJ".into()),
    })
    .await
    .unwrap();

  let link = SiteParty { site_id: id, party_id: party.party_id, role: PartyRole::Customer };
  s.link_party(link).await.unwrap();
  s.link_party(link).await.unwrap();

  let customers = s.site_parties(id, PartyRole::Customer).await.unwrap();
  assert_eq!(customers, vec![party]);
  assert!(s.site_parties(id, PartyRole::Owner).await.unwrap().is_empty());
}

// ─── Events and contracts ────────────────────────────────────────────────────

#[tokio::test]
async fn events_are_listed_in_date_order() {
  let s = store().await;
  s.add_provider(Provider::from_code("LSJ")).await.unwrap();
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;

  for (start, end) in [(date(2024, 2, 1), date(2024, 2, 29)), (date(2024, 1, 1), date(2024, 1, 31))] {
    s.add_event(NewPickupEvent {
      site_id:    id,
      waste_type: WasteType::Bio,
      start:      Some(start),
      end:        Some(end),
      count:      Some(4),
      mass:       Some(120.5),
      volume:     None,
      provider:   "LSJ".into(),
    })
    .await
    .unwrap();
  }

  let events = s.site_events(id).await.unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].start, Some(date(2024, 1, 1)));
  assert_eq!(events[1].mass, Some(120.5));
  assert_eq!(events[0].waste_type, WasteType::Bio);
}

#[tokio::test]
async fn event_requires_known_provider() {
  let s = store().await;
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;

  let result = s
    .add_event(NewPickupEvent {
      site_id:    id,
      waste_type: WasteType::Mixed,
      start:      None,
      end:        None,
      count:      None,
      mass:       None,
      volume:     None,
      provider:   "nobody".into(),
    })
    .await;
  assert!(matches!(result, Err(Error::Database(_))));
}

#[tokio::test]
async fn contract_end_can_be_moved() {
  let s = store().await;
  s.add_provider(Provider::from_code("LSJ")).await.unwrap();
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;

  let contract = s
    .add_contract(NewContract {
      site_id:    id,
      provider:   "LSJ".into(),
      waste_type: WasteType::Mixed,
      start:      Some(date(2024, 1, 1)),
      end:        Some(date(2024, 6, 30)),
    })
    .await
    .unwrap();

  s.set_contract_end(contract.contract_id, Some(date(2024, 12, 31))).await.unwrap();
  let contracts = s.site_contracts(id).await.unwrap();
  assert_eq!(contracts.len(), 1);
  assert_eq!(contracts[0].end, Some(date(2024, 12, 31)));

  let err = s.set_contract_end(Uuid::new_v4(), None).await.unwrap_err();
  assert!(matches!(err, Error::ContractNotFound(_)));
}

// ─── Building registry ───────────────────────────────────────────────────────

#[tokio::test]
async fn building_lookups() {
  let s = store().await;
  let addr = address("Kauppakatu", "1", "15140");
  s.add_building(&building("B2", "P1", addr.clone())).await.unwrap();
  s.add_building(&building("B1", "P1", addr.clone())).await.unwrap();
  s.add_building(&building("B3", "P2", address("Torikatu", "3", "15110"))).await.unwrap();

  let got = s.get_buildings(&["B3".to_owned(), "nope".to_owned()]).await.unwrap();
  assert_eq!(got.len(), 1);
  assert_eq!(got[0].address.street.as_deref(), Some("Torikatu"));

  let on_p1 = s.buildings_on_properties(&["P1".to_owned()]).await.unwrap();
  let ids: Vec<_> = on_p1.iter().map(|b| b.building_id.as_str()).collect();
  assert_eq!(ids, vec!["B1", "B2"]);

  let key = addr.building_key().unwrap();
  assert_eq!(s.buildings_at_address(&key).await.unwrap().len(), 2);
}

#[tokio::test]
async fn add_building_replaces_existing() {
  let s = store().await;
  let mut b = building("B1", "P1", address("Kauppakatu", "1", "15140"));
  s.add_building(&b).await.unwrap();

  b.dwellings = 2;
  s.add_building(&b).await.unwrap();

  let got = s.get_buildings(&["B1".to_owned()]).await.unwrap();
  assert_eq!(got, vec![b]);
}

#[tokio::test]
async fn uncovered_excludes_linked_buildings() {
  let s = store().await;
  for id in ["B3", "B1", "B2"] {
    s.add_building(&building(id, "P1", address("Kauppakatu", "1", "15140")))
      .await
      .unwrap();
  }
  let id = site(&s, "x", ValidityPeriod::unbounded()).await;
  s.link_buildings(id, &["B2".to_owned()]).await.unwrap();

  let uncovered = s.uncovered_buildings().await.unwrap();
  let ids: Vec<_> = uncovered.iter().map(|b| b.building_id.as_str()).collect();
  assert_eq!(ids, vec!["B1", "B3"]);
}
