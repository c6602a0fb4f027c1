//! Validated customer records: the input side of an import batch.
//!
//! A [`CustomerRecord`] is what a provider-specific reader produces after
//! parsing and field validation. It is immutable from here on and lives only
//! for one batch pass.

use std::{collections::BTreeSet, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::period::ValidityPeriod;

// ─── Identity ────────────────────────────────────────────────────────────────

/// The opaque (provider, customer-number) pair identifying a customer within
/// one hauler's system.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CustomerId {
  /// Code of the hauler or sub-provider that issued the number.
  pub system: String,
  pub number: String,
}

impl CustomerId {
  pub fn new(system: impl Into<String>, number: impl Into<String>) -> Self {
    Self { system: system.into(), number: number.into() }
  }
}

impl fmt::Display for CustomerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.system, self.number)
  }
}

// ─── Address ─────────────────────────────────────────────────────────────────

/// A postal address as delivered by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub street:       Option<String>,
  pub house_number: Option<String>,
  /// Staircase and apartment, e.g. `"A 3"`.
  pub apartment:    Option<String>,
  pub postal_code:  Option<String>,
  pub post_office:  Option<String>,
}

impl Address {
  /// Street, house number and apartment joined by single spaces.
  pub fn street_line(&self) -> String {
    [&self.street, &self.house_number, &self.apartment]
      .into_iter()
      .flatten()
      .flat_map(|part| part.split_whitespace())
      .collect::<Vec<_>>()
      .join(" ")
  }

  /// Normalised building-level key (`"street number, postal_code"`,
  /// lower-case, apartment omitted). `None` when there is no street.
  pub fn building_key(&self) -> Option<String> {
    let street = normalize(self.street.as_deref()?);
    if street.is_empty() {
      return None;
    }
    let mut key = street;
    if let Some(number) = self.house_number.as_deref().map(normalize)
      && !number.is_empty()
    {
      key.push(' ');
      key.push_str(&number);
    }
    if let Some(postal) = self.postal_code.as_deref().map(normalize)
      && !postal.is_empty()
    {
      key.push_str(", ");
      key.push_str(&postal);
    }
    Some(key)
  }

  /// An address can be searched for only with both postal code and street.
  pub fn is_searchable(&self) -> bool {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    present(&self.postal_code) && present(&self.street)
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.street_line())
  }
}

fn normalize(s: &str) -> String {
  s.split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

// ─── Parties ─────────────────────────────────────────────────────────────────

/// Contact data of the waste holder as given in the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyInfo {
  pub name:        String,
  pub address:     Address,
  /// Finnish business id ("Y-tunnus"), if the holder is a company.
  pub business_id: Option<String>,
}

// ─── Events and contract terms ───────────────────────────────────────────────

/// One reported emptying, before its waste type is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickupEventInput {
  /// Raw waste-type code as written by the hauler.
  pub waste_type: String,
  pub start:      Option<NaiveDate>,
  pub end:        Option<NaiveDate>,
  pub count:      Option<i64>,
  /// Mass in tonnes.
  pub mass:       Option<f64>,
  /// Volume in cubic metres.
  pub volume:     Option<f64>,
}

/// A contracted waste fraction with its validity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerm {
  pub waste_type: String,
  pub start:      Option<NaiveDate>,
  pub end:        Option<NaiveDate>,
}

// ─── CustomerRecord ──────────────────────────────────────────────────────────

/// One provider's record for one customer over a reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
  pub customer_id: CustomerId,
  pub holder:      PartyInfo,
  /// Permanent building ids ("PRT") the record refers to.
  #[serde(default)]
  pub buildings:   BTreeSet<String>,
  /// Property ids ("kiinteistötunnus") the record refers to.
  #[serde(default)]
  pub properties:  BTreeSet<String>,
  #[serde(default)]
  pub valid:       ValidityPeriod,
  #[serde(default)]
  pub events:      Vec<PickupEventInput>,
  #[serde(default)]
  pub contracts:   Vec<ContractTerm>,
}

impl CustomerRecord {
  /// Convenience constructor with no identifiers, events or contracts.
  pub fn new(customer_id: CustomerId, holder: PartyInfo) -> Self {
    Self {
      customer_id,
      holder,
      buildings: BTreeSet::new(),
      properties: BTreeSet::new(),
      valid: ValidityPeriod::unbounded(),
      events: Vec::new(),
      contracts: Vec::new(),
    }
  }
}
