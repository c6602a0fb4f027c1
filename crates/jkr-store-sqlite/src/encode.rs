//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and dates as ISO 8601
//! (`YYYY-MM-DD`), which sort correctly as text. Structured fields (addresses,
//! contact snapshots, resident periods) are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};
use jkr_core::{
  codes::{PartyKind, WasteType},
  period::ValidityPeriod,
  record::{Address, CustomerId, PartyInfo},
  site::{Building, Contract, CustomerReference, Party, PickupEvent, Site},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: Option<NaiveDate>) -> Option<String> {
  d.map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn decode_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
  s.map(|s| {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
      .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
  })
  .transpose()
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_address(a: &Address) -> Result<String> {
  Ok(serde_json::to_string(a)?)
}

pub fn encode_party_info(p: &PartyInfo) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn encode_periods(periods: &[ValidityPeriod]) -> Result<String> {
  Ok(serde_json::to_string(periods)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawSite`]; keep the two in sync.
pub const SITE_COLUMNS: &str = "s.site_id, s.name, s.valid_start, s.valid_end, s.created_at";

/// Raw strings read directly from a `sites` row.
pub struct RawSite {
  pub site_id:     String,
  pub name:        String,
  pub valid_start: Option<String>,
  pub valid_end:   Option<String>,
  pub created_at:  String,
}

impl RawSite {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      site_id:     row.get(0)?,
      name:        row.get(1)?,
      valid_start: row.get(2)?,
      valid_end:   row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_site(self) -> Result<Site> {
    Ok(Site {
      site_id:    decode_uuid(&self.site_id)?,
      name:       self.name,
      valid:      ValidityPeriod {
        start: decode_date(self.valid_start.as_deref())?,
        end:   decode_date(self.valid_end.as_deref())?,
      },
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const BUILDING_COLUMNS: &str =
  "b.building_id, b.property_id, b.address_json, b.dwellings, b.residents_json";

/// Raw strings read directly from a `buildings` row.
pub struct RawBuilding {
  pub building_id:    String,
  pub property_id:    Option<String>,
  pub address_json:   String,
  pub dwellings:      i64,
  pub residents_json: String,
}

impl RawBuilding {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      building_id:    row.get(0)?,
      property_id:    row.get(1)?,
      address_json:   row.get(2)?,
      dwellings:      row.get(3)?,
      residents_json: row.get(4)?,
    })
  }

  pub fn into_building(self) -> Result<Building> {
    Ok(Building {
      building_id: self.building_id,
      property_id: self.property_id,
      address:     serde_json::from_str(&self.address_json)?,
      dwellings:   u32::try_from(self.dwellings).unwrap_or(0),
      residents:   serde_json::from_str(&self.residents_json)?,
    })
  }
}

/// Raw strings read directly from a `customer_references` row.
pub struct RawReference {
  pub system:      String,
  pub number:      String,
  pub site_id:     String,
  pub holder_json: String,
  pub updated_at:  String,
}

pub const REFERENCE_COLUMNS: &str = "system, number, site_id, holder_json, updated_at";

impl RawReference {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      system:      row.get(0)?,
      number:      row.get(1)?,
      site_id:     row.get(2)?,
      holder_json: row.get(3)?,
      updated_at:  row.get(4)?,
    })
  }

  pub fn into_reference(self) -> Result<CustomerReference> {
    Ok(CustomerReference {
      customer_id: CustomerId { system: self.system, number: self.number },
      site_id:     decode_uuid(&self.site_id)?,
      holder:      serde_json::from_str(&self.holder_json)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub const PARTY_COLUMNS: &str = "p.party_id, p.name, p.street_address, p.postal_code, \
                                 p.post_office, p.business_id, p.kind, p.provider";

/// Raw strings read directly from a `parties` row.
pub struct RawParty {
  pub party_id:       String,
  pub name:           String,
  pub street_address: String,
  pub postal_code:    Option<String>,
  pub post_office:    Option<String>,
  pub business_id:    Option<String>,
  pub kind:           String,
  pub provider:       Option<String>,
}

impl RawParty {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      party_id:       row.get(0)?,
      name:           row.get(1)?,
      street_address: row.get(2)?,
      postal_code:    row.get(3)?,
      post_office:    row.get(4)?,
      business_id:    row.get(5)?,
      kind:           row.get(6)?,
      provider:       row.get(7)?,
    })
  }

  pub fn into_party(self) -> Result<Party> {
    Ok(Party {
      party_id:       decode_uuid(&self.party_id)?,
      name:           self.name,
      street_address: self.street_address,
      postal_code:    self.postal_code,
      post_office:    self.post_office,
      business_id:    self.business_id,
      kind:           PartyKind::decode(&self.kind)?,
      provider:       self.provider,
    })
  }
}

/// Raw values read directly from a `pickup_events` row.
pub struct RawEvent {
  pub event_id:   String,
  pub site_id:    String,
  pub waste_type: String,
  pub start_date: Option<String>,
  pub end_date:   Option<String>,
  pub count:      Option<i64>,
  pub mass:       Option<f64>,
  pub volume:     Option<f64>,
  pub provider:   String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<PickupEvent> {
    Ok(PickupEvent {
      event_id:   decode_uuid(&self.event_id)?,
      site_id:    decode_uuid(&self.site_id)?,
      waste_type: WasteType::decode(&self.waste_type)?,
      start:      decode_date(self.start_date.as_deref())?,
      end:        decode_date(self.end_date.as_deref())?,
      count:      self.count,
      mass:       self.mass,
      volume:     self.volume,
      provider:   self.provider,
    })
  }
}

/// Raw strings read directly from a `contracts` row.
pub struct RawContract {
  pub contract_id: String,
  pub site_id:     String,
  pub provider:    String,
  pub waste_type:  String,
  pub start_date:  Option<String>,
  pub end_date:    Option<String>,
}

impl RawContract {
  pub fn into_contract(self) -> Result<Contract> {
    Ok(Contract {
      contract_id: decode_uuid(&self.contract_id)?,
      site_id:     decode_uuid(&self.site_id)?,
      provider:    self.provider,
      waste_type:  WasteType::decode(&self.waste_type)?,
      start:       decode_date(self.start_date.as_deref())?,
      end:         decode_date(self.end_date.as_deref())?,
    })
  }
}
