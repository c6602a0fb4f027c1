//! Durable entities of the site register.
//!
//! A [`Site`] is the canonical physical location that buildings, parties,
//! contracts and pickup events hang off. Nothing in this subsystem ever
//! deletes a site or any of its associations; history stays valid for the
//! periods it describes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  codes::{PartyKind, PartyRole, WasteType},
  period::ValidityPeriod,
  record::{Address, CustomerId, PartyInfo},
};

// ─── Site ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
  pub site_id:    Uuid,
  pub name:       String,
  pub valid:      ValidityPeriod,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::SiteStore::add_site`]. The id and creation
/// timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSite {
  pub name:  String,
  pub valid: ValidityPeriod,
}

// ─── Buildings ───────────────────────────────────────────────────────────────

/// Classification used when deriving sites straight from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildingKind {
  SingleDwelling,
  /// Semi-detached house with exactly two dwellings.
  Paired,
  MultiUnit,
}

/// A building as known to the building registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
  /// Permanent building id ("PRT").
  pub building_id: String,
  pub property_id: Option<String>,
  pub address:     Address,
  /// Number of dwellings; 0 for non-residential buildings.
  #[serde(default)]
  pub dwellings:   u32,
  /// Periods during which somebody is registered as living in the building.
  #[serde(default)]
  pub residents:   Vec<ValidityPeriod>,
}

impl Building {
  pub fn kind(&self) -> BuildingKind {
    match self.dwellings {
      1 => BuildingKind::SingleDwelling,
      2 => BuildingKind::Paired,
      _ => BuildingKind::MultiUnit,
    }
  }

  pub fn is_inhabited_on(&self, date: NaiveDate) -> bool {
    self.residents.iter().any(|p| p.contains(date))
  }
}

// ─── Providers and references ────────────────────────────────────────────────

/// A data provider or hauler ("tiedontuottaja").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
  pub code: String,
  pub name: String,
}

impl Provider {
  /// A provider whose display name is its code; used for haulers first seen
  /// inside another provider's batch.
  pub fn from_code(code: impl Into<String>) -> Self {
    let code = code.into();
    Self { name: code.clone(), code }
  }
}

/// Durable binding from a customer id to the site it resolved to, with the
/// holder's contact data as last imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerReference {
  pub customer_id: CustomerId,
  pub site_id:     Uuid,
  pub holder:      PartyInfo,
  pub updated_at:  DateTime<Utc>,
}

// ─── Parties ─────────────────────────────────────────────────────────────────

/// A named party ("osapuoli"), tagged with the provider it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
  pub party_id:       Uuid,
  pub name:           String,
  pub street_address: String,
  pub postal_code:    Option<String>,
  pub post_office:    Option<String>,
  pub business_id:    Option<String>,
  pub kind:           PartyKind,
  pub provider:       Option<String>,
}

/// Input to [`crate::store::SiteStore::add_party`].
#[derive(Debug, Clone)]
pub struct NewParty {
  pub name:           String,
  pub street_address: String,
  pub postal_code:    Option<String>,
  pub post_office:    Option<String>,
  pub business_id:    Option<String>,
  pub kind:           PartyKind,
  pub provider:       Option<String>,
}

/// A (site, party, role) association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteParty {
  pub site_id:  Uuid,
  pub party_id: Uuid,
  pub role:     PartyRole,
}

// ─── Pickup events ───────────────────────────────────────────────────────────

/// One recorded emptying ("kuljetus") for a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupEvent {
  pub event_id:   Uuid,
  pub site_id:    Uuid,
  pub waste_type: WasteType,
  pub start:      Option<NaiveDate>,
  pub end:        Option<NaiveDate>,
  pub count:      Option<i64>,
  pub mass:       Option<f64>,
  pub volume:     Option<f64>,
  pub provider:   String,
}

impl PickupEvent {
  /// The de-duplication key within a site.
  pub fn key(&self) -> (WasteType, Option<NaiveDate>, Option<NaiveDate>) {
    (self.waste_type, self.start, self.end)
  }
}

/// Input to [`crate::store::SiteStore::add_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewPickupEvent {
  pub site_id:    Uuid,
  pub waste_type: WasteType,
  pub start:      Option<NaiveDate>,
  pub end:        Option<NaiveDate>,
  pub count:      Option<i64>,
  pub mass:       Option<f64>,
  pub volume:     Option<f64>,
  pub provider:   String,
}

// ─── Contracts ───────────────────────────────────────────────────────────────

/// An agreement ("sopimus") between a site and a provider for one fraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
  pub contract_id: Uuid,
  pub site_id:     Uuid,
  pub provider:    String,
  pub waste_type:  WasteType,
  pub start:       Option<NaiveDate>,
  pub end:         Option<NaiveDate>,
}

/// Input to [`crate::store::SiteStore::add_contract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
  pub site_id:    Uuid,
  pub provider:   String,
  pub waste_type: WasteType,
  pub start:      Option<NaiveDate>,
  pub end:        Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn building(dwellings: u32) -> Building {
    Building {
      building_id: "100000001A".into(),
      property_id: Some("398-1-2-3".into()),
      address: Address::default(),
      dwellings,
      residents: vec![ValidityPeriod {
        start: NaiveDate::from_ymd_opt(2020, 1, 1),
        end:   None,
      }],
    }
  }

  #[test]
  fn kind_by_dwelling_count() {
    assert_eq!(building(1).kind(), BuildingKind::SingleDwelling);
    assert_eq!(building(2).kind(), BuildingKind::Paired);
    assert_eq!(building(0).kind(), BuildingKind::MultiUnit);
    assert_eq!(building(12).kind(), BuildingKind::MultiUnit);
  }

  #[test]
  fn inhabited_on_snapshot() {
    let b = building(1);
    assert!(b.is_inhabited_on(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
    assert!(!b.is_inhabited_on(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()));
  }

  #[test]
  fn provider_name_defaults_to_code() {
    let p = Provider::from_code("1234567-8");
    assert_eq!(p.name, "1234567-8");
  }
}
