//! Identity resolution: which site does a customer record belong to?
//!
//! Resolution runs in three steps:
//!
//! 1. [`gather_candidates`] asks the store, strategy by strategy, for sites
//!    the record could refer to. Each strategy runs only if the previous ones
//!    found nothing.
//! 2. [`decide`] turns the candidates into a [`ResolutionPlan`]: a decision
//!    plus the ordered store operations that carry it out. It does no I/O.
//! 3. [`apply`] executes the plan.
//!
//! A strategy that yields more than one site is ambiguous; the record is
//! left unresolved rather than attached to an arbitrary pick. The exception
//! is a set of sibling sites, which share exactly the same confirmed
//! buildings (the halves of a semi-detached house). Among siblings the
//! record takes the oldest one its hauler has no customer on yet, or the
//! oldest one when every sibling is taken.

use chrono::Utc;
use jkr_core::{
  period::BatchCounters,
  record::CustomerRecord,
  site::{CustomerReference, NewSite, Site},
  store::SiteStore,
};
use serde::Serialize;
use strum::Display;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result, SkipReason, buildings::BuildingLookup, config::ImportOptions,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// The way a record was matched to an existing site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
  /// A stored customer reference for the same customer id.
  Reference,
  Buildings,
  Properties,
  Address,
}

/// What [`gather_candidates`] found.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidates {
  /// The customer id is already bound to this site.
  Reference(Site),
  /// The first strategy that returned anything, and what it returned.
  Found { strategy: Strategy, sites: Vec<Site> },
  /// Several sites linked to the same set of buildings, oldest first.
  Siblings { strategy: Strategy, sites: Vec<Sibling> },
  None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sibling {
  pub site:  Site,
  /// The record's hauler already has a customer bound to this site.
  pub taken: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
  Existing { site: Site, via: Strategy },
  Create,
  Unresolved(SkipReason),
}

/// One store mutation of a [`ResolutionPlan`].
#[derive(Debug, Clone, PartialEq)]
pub enum SiteOp {
  /// Replace the reference's contact snapshot with the record's holder.
  RefreshReference,
  /// Store the site with its refreshed name and widened validity.
  UpdateSite(Site),
  CreateSite(NewSite),
  /// Bind the record's customer id to the resolved site.
  BindReference,
  /// Look up buildings for a freshly created site and link or nominate them.
  AttachBuildings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionPlan {
  pub decision: Decision,
  pub ops:      Vec<SiteOp>,
}

/// The outcome of resolving one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  Matched { site: Site, via: Strategy },
  Created { site: Site },
  Unresolved(SkipReason),
}

impl Resolution {
  pub fn site(&self) -> Option<&Site> {
    match self {
      Resolution::Matched { site, .. } | Resolution::Created { site } => Some(site),
      Resolution::Unresolved(_) => None,
    }
  }
}

// ─── Gather ──────────────────────────────────────────────────────────────────

/// Query the store for sites the record could belong to. Only sites whose
/// validity overlaps the record's are considered by the search strategies.
pub async fn gather_candidates<S: SiteStore>(
  store: &S,
  record: &CustomerRecord,
) -> Result<Candidates> {
  if let Some(reference) = store
    .get_reference(&record.customer_id)
    .await
    .map_err(Error::store)?
  {
    let site = store
      .get_site(reference.site_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SiteNotFound(reference.site_id))?;
    return Ok(Candidates::Reference(site));
  }

  if !record.buildings.is_empty() {
    let ids: Vec<String> = record.buildings.iter().cloned().collect();
    let sites = store
      .find_sites_by_buildings(&ids, &record.valid)
      .await
      .map_err(Error::store)?;
    if !sites.is_empty() {
      return found(store, record, Strategy::Buildings, sites).await;
    }
  }

  if !record.properties.is_empty() {
    let ids: Vec<String> = record.properties.iter().cloned().collect();
    let sites = store
      .find_sites_by_properties(&ids, &record.valid)
      .await
      .map_err(Error::store)?;
    if !sites.is_empty() {
      return found(store, record, Strategy::Properties, sites).await;
    }
  }

  if record.holder.address.is_searchable()
    && let Some(key) = record.holder.address.building_key()
  {
    let sites = store
      .find_sites_by_address(&key, &record.valid)
      .await
      .map_err(Error::store)?;
    if !sites.is_empty() {
      return found(store, record, Strategy::Address, sites).await;
    }
  }

  Ok(Candidates::None)
}

/// Wrap what a strategy found, telling sibling sites apart from unrelated
/// ones.
async fn found<S: SiteStore>(
  store: &S,
  record: &CustomerRecord,
  strategy: Strategy,
  sites: Vec<Site>,
) -> Result<Candidates> {
  if sites.len() < 2 {
    return Ok(Candidates::Found { strategy, sites });
  }

  let mut links = Vec::with_capacity(sites.len());
  for site in &sites {
    let mut ids = store.site_buildings(site.site_id).await.map_err(Error::store)?;
    ids.sort();
    links.push(ids);
  }
  let shared = &links[0];
  if shared.is_empty() || links.iter().any(|ids| ids != shared) {
    return Ok(Candidates::Found { strategy, sites });
  }

  let hauler = &record.customer_id.system;
  let mut siblings = Vec::with_capacity(sites.len());
  for site in sites {
    let taken = store
      .site_references(site.site_id)
      .await
      .map_err(Error::store)?
      .iter()
      .any(|r| &r.customer_id.system == hauler);
    siblings.push(Sibling { site, taken });
  }
  Ok(Candidates::Siblings { strategy, sites: siblings })
}

// ─── Decide ──────────────────────────────────────────────────────────────────

/// Decide what to do with `record` given what the store already holds.
pub fn decide(
  record: &CustomerRecord,
  candidates: &Candidates,
  options: &ImportOptions,
) -> ResolutionPlan {
  match candidates {
    Candidates::Reference(site) => {
      let mut ops = vec![SiteOp::RefreshReference];
      if options.allow_update
        && let Some(updated) = refreshed_site(site, record)
      {
        ops.push(SiteOp::UpdateSite(updated));
      }
      ResolutionPlan {
        decision: Decision::Existing { site: site.clone(), via: Strategy::Reference },
        ops,
      }
    }

    Candidates::Found { strategy, sites } => match sites.as_slice() {
      [site] => bind_existing(site, *strategy, record, options),
      _ => ResolutionPlan {
        decision: Decision::Unresolved(SkipReason::Ambiguous {
          strategy: *strategy,
          sites:    sites.iter().map(|s| s.site_id).collect(),
        }),
        ops:      Vec::new(),
      },
    },

    Candidates::Siblings { strategy, sites } => {
      match sites.iter().find(|s| !s.taken).or(sites.first()) {
        Some(sibling) => bind_existing(&sibling.site, *strategy, record, options),
        None => ResolutionPlan {
          decision: Decision::Unresolved(SkipReason::NoMatch),
          ops:      Vec::new(),
        },
      }
    }

    Candidates::None if options.allow_create && is_locatable(record) => ResolutionPlan {
      decision: Decision::Create,
      ops:      vec![
        SiteOp::CreateSite(NewSite {
          name:  site_name(record),
          valid: record.valid,
        }),
        SiteOp::BindReference,
        SiteOp::AttachBuildings,
      ],
    },

    Candidates::None => ResolutionPlan {
      decision: Decision::Unresolved(SkipReason::NoMatch),
      ops:      Vec::new(),
    },
  }
}

fn bind_existing(
  site: &Site,
  strategy: Strategy,
  record: &CustomerRecord,
  options: &ImportOptions,
) -> ResolutionPlan {
  let mut ops = Vec::new();
  if options.allow_update
    && let Some(updated) = refreshed_site(site, record)
  {
    ops.push(SiteOp::UpdateSite(updated));
  }
  ops.push(SiteOp::BindReference);
  ResolutionPlan {
    decision: Decision::Existing { site: site.clone(), via: strategy },
    ops,
  }
}

/// A record with no building, no property and no searchable address could
/// never be found again except through its reference, so no site is created
/// for it.
fn is_locatable(record: &CustomerRecord) -> bool {
  !record.buildings.is_empty()
    || !record.properties.is_empty()
    || record.holder.address.is_searchable()
}

/// The site as the record describes it, or `None` if nothing would change.
fn refreshed_site(site: &Site, record: &CustomerRecord) -> Option<Site> {
  let name = record.holder.name.trim();
  let updated = Site {
    name: if name.is_empty() { site.name.clone() } else { name.to_owned() },
    valid: site.valid.cover(&record.valid),
    ..site.clone()
  };
  (updated != *site).then_some(updated)
}

fn site_name(record: &CustomerRecord) -> String {
  let name = record.holder.name.trim();
  if name.is_empty() {
    record.holder.address.street_line()
  } else {
    name.to_owned()
  }
}

// ─── Apply ───────────────────────────────────────────────────────────────────

/// Carry out `plan` against the store.
pub async fn apply<S, L>(
  store: &S,
  lookup: &L,
  record: &CustomerRecord,
  counters: &BatchCounters,
  plan: ResolutionPlan,
) -> Result<Resolution>
where
  S: SiteStore,
  L: BuildingLookup,
{
  let (mut site, via) = match plan.decision {
    Decision::Unresolved(reason) => return Ok(Resolution::Unresolved(reason)),
    Decision::Existing { site, via } => (Some(site), Some(via)),
    Decision::Create => (None, None),
  };

  for op in plan.ops {
    match op {
      SiteOp::RefreshReference => {
        store
          .refresh_reference(&record.customer_id, &record.holder)
          .await
          .map_err(Error::store)?;
      }
      SiteOp::UpdateSite(updated) => {
        store.update_site(&updated).await.map_err(Error::store)?;
        site = Some(updated);
      }
      SiteOp::CreateSite(new) => {
        site = Some(store.add_site(new).await.map_err(Error::store)?);
      }
      SiteOp::BindReference => {
        let site = resolved(&site, "binding a reference")?;
        store
          .add_reference(CustomerReference {
            customer_id: record.customer_id.clone(),
            site_id:     site.site_id,
            holder:      record.holder.clone(),
            updated_at:  Utc::now(),
          })
          .await
          .map_err(Error::store)?;
      }
      SiteOp::AttachBuildings => {
        let site_id = resolved(&site, "attaching buildings")?.site_id;
        attach_buildings(store, lookup, record, counters, site_id).await?;
      }
    }
  }

  let site = site.ok_or(Error::InvalidPlan("finishing resolution"))?;
  Ok(match via {
    Some(via) => Resolution::Matched { site, via },
    None => Resolution::Created { site },
  })
}

fn resolved<'a>(site: &'a Option<Site>, step: &'static str) -> Result<&'a Site> {
  site.as_ref().ok_or(Error::InvalidPlan(step))
}

async fn attach_buildings<S, L>(
  store: &S,
  lookup: &L,
  record: &CustomerRecord,
  counters: &BatchCounters,
  site_id: Uuid,
) -> Result<()>
where
  S: SiteStore,
  L: BuildingLookup,
{
  if !store.site_buildings(site_id).await.map_err(Error::store)?.is_empty() {
    return Ok(());
  }

  let linked = lookup.find_linked_buildings(record, counters).await?;
  if !linked.is_empty() {
    let ids: Vec<String> = linked.into_iter().map(|b| b.building_id).collect();
    debug!(%site_id, buildings = ids.len(), "linking buildings to new site");
    return store.link_buildings(site_id, &ids).await.map_err(Error::store);
  }

  if !store.site_candidates(site_id).await.map_err(Error::store)?.is_empty() {
    return Ok(());
  }

  let candidates = lookup.find_candidate_buildings(record).await?;
  if !candidates.is_empty() {
    let ids: Vec<String> = candidates.into_iter().map(|b| b.building_id).collect();
    debug!(%site_id, candidates = ids.len(), "nominating candidate buildings");
    store.add_candidates(site_id, &ids).await.map_err(Error::store)?;
  }
  Ok(())
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Resolve `record` to a site, creating or updating it as `options` allow.
pub async fn resolve_and_update<S, L>(
  store: &S,
  lookup: &L,
  record: &CustomerRecord,
  counters: &BatchCounters,
  options: &ImportOptions,
) -> Result<Resolution>
where
  S: SiteStore,
  L: BuildingLookup,
{
  let candidates = gather_candidates(store, record).await?;
  let plan = decide(record, &candidates, options);
  debug!(
    customer = %record.customer_id,
    decision = ?plan.decision,
    ops = plan.ops.len(),
    "resolution planned"
  );
  apply(store, lookup, record, counters, plan).await
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use jkr_core::{
    period::ValidityPeriod,
    record::{Address, CustomerId, PartyInfo},
  };

  use super::*;

  fn record() -> CustomerRecord {
    let mut r = CustomerRecord::new(
      CustomerId::new("HAUL", "1"),
      PartyInfo {
        name:        "Maija Meikäläinen".into(),
        address:     Address {
          street:       Some("Rautatienkatu".into()),
          house_number: Some("5".into()),
          postal_code:  Some("15110".into()),
          ..Address::default()
        },
        business_id: None,
      },
    );
    r.valid = ValidityPeriod {
      start: NaiveDate::from_ymd_opt(2024, 1, 1),
      end:   NaiveDate::from_ymd_opt(2024, 12, 31),
    };
    r
  }

  fn site(name: &str) -> Site {
    Site {
      site_id:    Uuid::new_v4(),
      name:       name.into(),
      valid:      ValidityPeriod {
        start: NaiveDate::from_ymd_opt(2023, 1, 1),
        end:   NaiveDate::from_ymd_opt(2023, 12, 31),
      },
      created_at: Utc::now(),
    }
  }

  #[test]
  fn reference_refreshes_and_widens() {
    let s = site("Old name");
    let plan = decide(&record(), &Candidates::Reference(s.clone()), &ImportOptions::default());

    assert_eq!(
      plan.decision,
      Decision::Existing { site: s.clone(), via: Strategy::Reference }
    );
    assert_eq!(plan.ops.len(), 2);
    assert_eq!(plan.ops[0], SiteOp::RefreshReference);
    let SiteOp::UpdateSite(updated) = &plan.ops[1] else {
      panic!("expected an update, got {:?}", plan.ops[1]);
    };
    assert_eq!(updated.name, "Maija Meikäläinen");
    assert_eq!(updated.valid.start, NaiveDate::from_ymd_opt(2023, 1, 1));
    assert_eq!(updated.valid.end, NaiveDate::from_ymd_opt(2024, 12, 31));
  }

  #[test]
  fn reference_without_update_only_refreshes() {
    let options = ImportOptions { allow_update: false, ..ImportOptions::default() };
    let plan = decide(&record(), &Candidates::Reference(site("x")), &options);
    assert_eq!(plan.ops, vec![SiteOp::RefreshReference]);
  }

  #[test]
  fn unchanged_site_is_not_rewritten() {
    let mut s = site("Maija Meikäläinen");
    s.valid = ValidityPeriod::unbounded();
    let plan = decide(&record(), &Candidates::Reference(s), &ImportOptions::default());
    assert_eq!(plan.ops, vec![SiteOp::RefreshReference]);
  }

  #[test]
  fn single_match_binds_reference() {
    let s = site("x");
    let candidates = Candidates::Found { strategy: Strategy::Properties, sites: vec![s.clone()] };
    let options = ImportOptions { allow_update: false, ..ImportOptions::default() };

    let plan = decide(&record(), &candidates, &options);
    assert_eq!(plan.decision, Decision::Existing { site: s, via: Strategy::Properties });
    assert_eq!(plan.ops, vec![SiteOp::BindReference]);
  }

  #[test]
  fn several_matches_are_ambiguous() {
    let (a, b) = (site("a"), site("b"));
    let candidates = Candidates::Found {
      strategy: Strategy::Address,
      sites:    vec![a.clone(), b.clone()],
    };

    let plan = decide(&record(), &candidates, &ImportOptions::default());
    assert_eq!(
      plan.decision,
      Decision::Unresolved(SkipReason::Ambiguous {
        strategy: Strategy::Address,
        sites:    vec![a.site_id, b.site_id],
      })
    );
    assert!(plan.ops.is_empty());
  }

  #[test]
  fn sibling_without_hauler_customer_is_preferred() {
    let (a, b) = (site("a"), site("b"));
    let candidates = Candidates::Siblings {
      strategy: Strategy::Buildings,
      sites:    vec![
        Sibling { site: a.clone(), taken: true },
        Sibling { site: b.clone(), taken: false },
      ],
    };
    let options = ImportOptions { allow_update: false, ..ImportOptions::default() };

    let plan = decide(&record(), &candidates, &options);
    assert_eq!(plan.decision, Decision::Existing { site: b, via: Strategy::Buildings });
    assert_eq!(plan.ops, vec![SiteOp::BindReference]);

    let all_taken = Candidates::Siblings {
      strategy: Strategy::Buildings,
      sites:    vec![
        Sibling { site: a.clone(), taken: true },
        Sibling { site: site("c"), taken: true },
      ],
    };
    let plan = decide(&record(), &all_taken, &options);
    assert_eq!(plan.decision, Decision::Existing { site: a, via: Strategy::Buildings });
  }

  #[test]
  fn nothing_found_creates_when_allowed() {
    let r = record();
    let plan = decide(&r, &Candidates::None, &ImportOptions::default());
    assert_eq!(plan.decision, Decision::Create);
    assert_eq!(
      plan.ops,
      vec![
        SiteOp::CreateSite(NewSite { name: "Maija Meikäläinen".into(), valid: r.valid }),
        SiteOp::BindReference,
        SiteOp::AttachBuildings,
      ]
    );
  }

  #[test]
  fn nothing_found_without_create_is_no_match() {
    let options = ImportOptions { allow_create: false, ..ImportOptions::default() };
    let plan = decide(&record(), &Candidates::None, &options);
    assert_eq!(plan.decision, Decision::Unresolved(SkipReason::NoMatch));
    assert!(plan.ops.is_empty());
  }

  #[test]
  fn record_without_identifiers_is_not_created() {
    let mut r = record();
    r.holder.address = Address::default();
    let plan = decide(&r, &Candidates::None, &ImportOptions::default());
    assert_eq!(plan.decision, Decision::Unresolved(SkipReason::NoMatch));

    r.properties.insert("398-1-2-3".into());
    let plan = decide(&r, &Candidates::None, &ImportOptions::default());
    assert_eq!(plan.decision, Decision::Create);
  }

  #[test]
  fn nameless_holder_names_site_by_address() {
    let mut r = record();
    r.holder.name = "  ".into();
    let plan = decide(&r, &Candidates::None, &ImportOptions::default());
    let SiteOp::CreateSite(new) = &plan.ops[0] else {
      panic!("expected a create");
    };
    assert_eq!(new.name, "Rautatienkatu 5");
  }
}
