//! Fixed code tables: waste types, party roles and party kinds.

use std::{str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{Error, Result};

// ─── Waste types ─────────────────────────────────────────────────────────────

/// The waste fractions a pickup event or contract may refer to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
pub enum WasteType {
  #[strum(serialize = "Aluekeräys")]
  AreaCollection,
  #[strum(serialize = "Sekajäte")]
  Mixed,
  #[strum(serialize = "Energia")]
  Energy,
  #[strum(serialize = "Bio")]
  Bio,
  #[strum(serialize = "Kartonki")]
  Cardboard,
  #[strum(serialize = "Pahvi")]
  Paperboard,
  #[strum(serialize = "Metalli")]
  Metal,
  #[strum(serialize = "Lasi")]
  Glass,
  #[strum(serialize = "Paperi")]
  Paper,
  #[strum(serialize = "Muovi")]
  Plastic,
  #[strum(serialize = "Liete")]
  Sludge,
  #[strum(serialize = "Musta liete")]
  BlackSludge,
  #[strum(serialize = "Harmaa liete")]
  GreyWater,
}

/// Spellings some haulers use instead of the canonical names.
const WASTE_TYPE_ALIASES: &[(&str, WasteType)] = &[
  ("sekaj", WasteType::Mixed),
  ("biojäte", WasteType::Bio),
  ("kartonkipakkaus", WasteType::Cardboard),
  ("muovipakkaus", WasteType::Plastic),
  ("lasipakkaus", WasteType::Glass),
];

impl WasteType {
  /// Look up a provider-supplied code. Case-insensitive; accepts the known
  /// aliases. Returns `None` for anything outside the table.
  pub fn from_code(code: &str) -> Option<Self> {
    let wanted = code.trim().to_lowercase();
    if wanted.is_empty() {
      return None;
    }
    Self::iter()
      .find(|w| w.as_ref().to_lowercase() == wanted)
      .or_else(|| {
        WASTE_TYPE_ALIASES
          .iter()
          .find(|(alias, _)| *alias == wanted)
          .map(|(_, w)| *w)
      })
  }

  /// Decode the canonical name stored in the database.
  pub fn decode(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownCode {
      kind:  "waste type",
      value: s.to_owned(),
    })
  }
}

// ─── Party roles and kinds ───────────────────────────────────────────────────

/// The role a party plays for a site.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartyRole {
  /// The waste holder named on the hauler's customer record.
  Customer,
  Owner,
  Resident,
}

impl PartyRole {
  pub fn decode(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownCode {
      kind:  "party role",
      value: s.to_owned(),
    })
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartyKind {
  #[default]
  Person,
  Organization,
  HousingAssociation,
}

impl PartyKind {
  pub fn decode(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownCode {
      kind:  "party kind",
      value: s.to_owned(),
    })
  }
}

static HOUSING_ASSOCIATION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(as\.?\s*oy|asunto[\s-]?oy|asoy|bostads\s*ab)\b")
    .expect("housing association pattern is valid")
});

/// True if `name` looks like a Finnish or Swedish housing company name
/// ("As Oy Esimerkki", "Asunto-oy ...", "Bostads Ab ...").
pub fn is_housing_association(name: &str) -> bool {
  HOUSING_ASSOCIATION.is_match(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn waste_type_canonical_names() {
    assert_eq!(WasteType::from_code("Sekajäte"), Some(WasteType::Mixed));
    assert_eq!(WasteType::from_code("sekajäte"), Some(WasteType::Mixed));
    assert_eq!(WasteType::from_code("Musta liete"), Some(WasteType::BlackSludge));
    assert_eq!(WasteType::from_code(" Lasi "), Some(WasteType::Glass));
  }

  #[test]
  fn waste_type_aliases() {
    assert_eq!(WasteType::from_code("Sekaj"), Some(WasteType::Mixed));
    assert_eq!(WasteType::from_code("Biojäte"), Some(WasteType::Bio));
    assert_eq!(WasteType::from_code("Muovipakkaus"), Some(WasteType::Plastic));
  }

  #[test]
  fn waste_type_unknown() {
    assert_eq!(WasteType::from_code("Ydinjäte"), None);
    assert_eq!(WasteType::from_code(""), None);
  }

  #[test]
  fn waste_type_storage_name_decodes() {
    for w in WasteType::iter() {
      assert_eq!(WasteType::decode(w.as_ref()).unwrap(), w);
    }
    assert!(WasteType::decode("nope").is_err());
  }

  #[test]
  fn party_role_snake_case() {
    assert_eq!(PartyRole::Customer.as_ref(), "customer");
    assert_eq!(PartyRole::decode("owner").unwrap(), PartyRole::Owner);
    assert_eq!(
      PartyKind::HousingAssociation.as_ref(),
      "housing_association"
    );
  }

  #[test]
  fn housing_association_names() {
    assert!(is_housing_association("As Oy Lahden Helmi"));
    assert!(is_housing_association("AS. OY KOIVULA"));
    assert!(is_housing_association("Asunto-oy Rinne"));
    assert!(is_housing_association("Bostads Ab Solgården"));
    assert!(!is_housing_association("Kotkas Oy"));
    assert!(!is_housing_association("Matti Meikäläinen"));
  }
}
