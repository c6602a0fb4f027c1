//! Pickup-event insertion with per-site de-duplication.

use std::collections::HashSet;

use chrono::NaiveDate;
use jkr_core::{
  codes::WasteType, record::PickupEventInput, site::NewPickupEvent,
  store::SiteStore,
};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
  pub inserted:      usize,
  /// Events already present on the site with the same type and dates.
  pub duplicates:    usize,
  /// Events dropped because their waste type is not in the code table.
  pub unknown_codes: usize,
}

/// Insert `events` for `site_id`.
///
/// Missing dates fall back to the batch: the start to the event's own end,
/// then to `batch_start`; the end to `batch_end`. An event whose type and
/// effective dates match one already on the site, or one inserted earlier in
/// this call, is skipped.
pub async fn insert_events<S: SiteStore>(
  store: &S,
  site_id: Uuid,
  events: &[PickupEventInput],
  batch_start: NaiveDate,
  batch_end: NaiveDate,
  provider: &str,
) -> Result<EventOutcome> {
  let mut outcome = EventOutcome::default();
  if events.is_empty() {
    return Ok(outcome);
  }

  let mut seen: HashSet<_> = store
    .site_events(site_id)
    .await
    .map_err(Error::store)?
    .iter()
    .map(|e| e.key())
    .collect();

  for event in events {
    let Some(waste_type) = WasteType::from_code(&event.waste_type) else {
      warn!(%site_id, code = %event.waste_type, "unknown waste type, event skipped");
      outcome.unknown_codes += 1;
      continue;
    };

    let start = event.start.or(event.end).unwrap_or(batch_start);
    let end = event.end.unwrap_or(batch_end);

    if !seen.insert((waste_type, Some(start), Some(end))) {
      outcome.duplicates += 1;
      continue;
    }

    store
      .add_event(NewPickupEvent {
        site_id,
        waste_type,
        start: Some(start),
        end: Some(end),
        count: event.count,
        mass: event.mass,
        volume: event.volume,
        provider: provider.to_owned(),
      })
      .await
      .map_err(Error::store)?;
    outcome.inserted += 1;
  }

  Ok(outcome)
}
