//! Contact-party conflation for the waste holder of a record.
//!
//! Parties are scoped by provider: a hauler only ever compares against the
//! parties it supplied itself. Old associations are never removed, so a
//! changed holder shows up as an additional party on the site.

use jkr_core::{
  codes::{PartyKind, PartyRole, is_housing_association},
  record::{CustomerRecord, PartyInfo},
  site::{NewParty, Party, SiteParty},
  store::SiteStore,
};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyOutcome {
  Created(Uuid),
  Unchanged,
}

/// Classify a holder by name and business id.
pub fn party_kind(holder: &PartyInfo) -> PartyKind {
  if is_housing_association(&holder.name) {
    PartyKind::HousingAssociation
  } else if holder.business_id.as_deref().is_some_and(|id| !id.trim().is_empty()) {
    PartyKind::Organization
  } else {
    PartyKind::Person
  }
}

fn same_contact(party: &Party, holder: &PartyInfo) -> bool {
  party.name == holder.name && party.street_address == holder.address.street_line()
}

/// Make sure the record's holder is a customer party of `site_id`.
///
/// A new party is added when the provider has no customer party on the site
/// yet, or when `update_contacts` is set and none of its parties carries the
/// holder's current name and address.
pub async fn reconcile<S: SiteStore>(
  store: &S,
  site_id: Uuid,
  record: &CustomerRecord,
  update_contacts: bool,
) -> Result<PartyOutcome> {
  let provider = &record.customer_id.system;
  let existing: Vec<Party> = store
    .site_parties(site_id, PartyRole::Customer)
    .await
    .map_err(Error::store)?
    .into_iter()
    .filter(|p| p.provider.as_ref() == Some(provider))
    .collect();

  let exists = existing.iter().any(|p| same_contact(p, &record.holder));
  if !existing.is_empty() && (exists || !update_contacts) {
    return Ok(PartyOutcome::Unchanged);
  }

  let holder = &record.holder;
  let party = store
    .add_party(NewParty {
      name:           holder.name.clone(),
      street_address: holder.address.street_line(),
      postal_code:    holder.address.postal_code.clone(),
      post_office:    holder.address.post_office.clone(),
      business_id:    holder.business_id.clone(),
      kind:           party_kind(holder),
      provider:       Some(provider.clone()),
    })
    .await
    .map_err(Error::store)?;

  store
    .link_party(SiteParty {
      site_id,
      party_id: party.party_id,
      role: PartyRole::Customer,
    })
    .await
    .map_err(Error::store)?;

  debug!(%site_id, party_id = %party.party_id, kind = %party.kind, "customer party added");
  Ok(PartyOutcome::Created(party.party_id))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn holder(name: &str, business_id: Option<&str>) -> PartyInfo {
    PartyInfo {
      name:        name.into(),
      business_id: business_id.map(Into::into),
      ..PartyInfo::default()
    }
  }

  #[test]
  fn housing_association_wins_over_business_id() {
    let h = holder("As Oy Lahden Helmi", Some("1234567-8"));
    assert_eq!(party_kind(&h), PartyKind::HousingAssociation);
  }

  #[test]
  fn business_id_means_organization() {
    assert_eq!(party_kind(&holder("Kauppa Oy", Some("1234567-8"))), PartyKind::Organization);
    assert_eq!(party_kind(&holder("Kauppa Oy", Some(" "))), PartyKind::Person);
    assert_eq!(party_kind(&holder("Matti", None)), PartyKind::Person);
  }
}
