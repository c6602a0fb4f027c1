//! Validity periods and per-identifier interval counting.
//!
//! Every customer record is valid over some (possibly open-ended) period.
//! Before a batch is resolved, the periods of all records are folded into
//! [`BatchCounters`], which answer "how many customers claim this building,
//! property or address at the same time". The counters are an immutable
//! snapshot: they are built once and only read afterwards.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, record::CustomerRecord};

// ─── ValidityPeriod ──────────────────────────────────────────────────────────

/// An inclusive date range. `None` on either side means unbounded.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct ValidityPeriod {
  pub start: Option<NaiveDate>,
  pub end:   Option<NaiveDate>,
}

impl ValidityPeriod {
  /// Build a period, rejecting ranges that end before they start.
  pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
    if let (Some(s), Some(e)) = (start, end)
      && s > e
    {
      return Err(Error::InvalidPeriod { start: s, end: e });
    }
    Ok(Self { start, end })
  }

  /// A period open on both sides.
  pub fn unbounded() -> Self { Self::default() }

  /// A period covering a single day.
  pub fn on(date: NaiveDate) -> Self {
    Self { start: Some(date), end: Some(date) }
  }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.start.is_none_or(|s| s <= date) && self.end.is_none_or(|e| date <= e)
  }

  /// True if the two periods share at least one day.
  pub fn overlaps(&self, other: &ValidityPeriod) -> bool {
    let starts_in_time = match (self.start, other.end) {
      (Some(s), Some(e)) => s <= e,
      _ => true,
    };
    let other_starts_in_time = match (other.start, self.end) {
      (Some(s), Some(e)) => s <= e,
      _ => true,
    };
    starts_in_time && other_starts_in_time
  }

  /// The smallest period covering both `self` and `other`.
  pub fn cover(&self, other: &ValidityPeriod) -> ValidityPeriod {
    let start = match (self.start, other.start) {
      (Some(a), Some(b)) => Some(a.min(b)),
      _ => None,
    };
    let end = match (self.end, other.end) {
      (Some(a), Some(b)) => Some(a.max(b)),
      _ => None,
    };
    ValidityPeriod { start, end }
  }
}

// ─── IntervalCounter ─────────────────────────────────────────────────────────

/// Records, per identifier, every period in which that identifier is
/// referenced. Intervals are kept in append order; there is no removal.
#[derive(Debug, Clone, Default)]
pub struct IntervalCounter {
  intervals: HashMap<String, Vec<ValidityPeriod>>,
}

impl IntervalCounter {
  pub fn new() -> Self { Self::default() }

  pub fn append(&mut self, identifier: impl Into<String>, period: ValidityPeriod) {
    self.intervals.entry(identifier.into()).or_default().push(period);
  }

  /// Number of recorded intervals for `identifier` that intersect `query`.
  pub fn count_overlaps(&self, identifier: &str, query: &ValidityPeriod) -> usize {
    self
      .intervals
      .get(identifier)
      .map(|periods| periods.iter().filter(|p| p.overlaps(query)).count())
      .unwrap_or(0)
  }

  /// Number of recorded intervals for `identifier` active on `date`.
  pub fn count_at(&self, identifier: &str, date: NaiveDate) -> usize {
    self.count_overlaps(identifier, &ValidityPeriod::on(date))
  }

  /// All intervals recorded for `identifier`, in append order.
  pub fn intervals(&self, identifier: &str) -> &[ValidityPeriod] {
    self.intervals.get(identifier).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Number of distinct identifiers seen.
  pub fn len(&self) -> usize { self.intervals.len() }

  pub fn is_empty(&self) -> bool { self.intervals.is_empty() }
}

// ─── BatchCounters ───────────────────────────────────────────────────────────

/// The three batch-wide counters, keyed by building id, property id and
/// building-level address.
#[derive(Debug, Clone, Default)]
pub struct BatchCounters {
  pub buildings:  IntervalCounter,
  pub properties: IntervalCounter,
  pub addresses:  IntervalCounter,
}

impl BatchCounters {
  /// Count every identifier referenced by every record of the batch.
  pub fn from_records<'a>(
    records: impl IntoIterator<Item = &'a CustomerRecord>,
  ) -> Self {
    let mut counters = Self::default();
    for record in records {
      for building in &record.buildings {
        counters.buildings.append(building.as_str(), record.valid);
      }
      for property in &record.properties {
        counters.properties.append(property.as_str(), record.valid);
      }
      if let Some(key) = record.holder.address.building_key() {
        counters.addresses.append(key, record.valid);
      }
    }
    counters
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  fn period(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ValidityPeriod {
    ValidityPeriod::new(start, end).unwrap()
  }

  #[test]
  fn new_rejects_reversed_range() {
    let err = ValidityPeriod::new(Some(d(2024, 2, 1)), Some(d(2024, 1, 1)));
    assert!(matches!(err, Err(Error::InvalidPeriod { .. })));
  }

  #[test]
  fn contains_is_inclusive_and_open_ended() {
    let p = period(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)));
    assert!(p.contains(d(2024, 1, 1)));
    assert!(p.contains(d(2024, 1, 31)));
    assert!(!p.contains(d(2024, 2, 1)));

    let open = period(None, Some(d(2024, 1, 31)));
    assert!(open.contains(d(1900, 1, 1)));
    assert!(ValidityPeriod::unbounded().contains(d(2999, 12, 31)));
  }

  #[test]
  fn overlaps_touching_and_disjoint() {
    let jan = period(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)));
    let feb = period(Some(d(2024, 2, 1)), Some(d(2024, 2, 29)));
    let from_jan_31 = period(Some(d(2024, 1, 31)), None);

    assert!(!jan.overlaps(&feb));
    assert!(jan.overlaps(&from_jan_31));
    assert!(from_jan_31.overlaps(&feb));
    assert!(ValidityPeriod::unbounded().overlaps(&jan));
  }

  #[test]
  fn cover_widens_to_unbounded() {
    let jan = period(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)));
    let later = period(Some(d(2024, 3, 1)), None);
    let covered = jan.cover(&later);
    assert_eq!(covered.start, Some(d(2024, 1, 1)));
    assert_eq!(covered.end, None);
  }

  #[test]
  fn count_at_matches_intervals_containing_instant() {
    let mut counter = IntervalCounter::new();
    counter.append("103", period(Some(d(2024, 1, 1)), Some(d(2024, 6, 30))));
    counter.append("103", period(Some(d(2024, 4, 1)), None));
    counter.append("103", period(None, Some(d(2023, 12, 31))));
    counter.append("other", ValidityPeriod::unbounded());

    let days = [d(2023, 6, 1), d(2024, 1, 1), d(2024, 5, 1), d(2025, 1, 1)];
    for day in days {
      let expected = counter
        .intervals("103")
        .iter()
        .filter(|p| p.contains(day))
        .count();
      assert_eq!(counter.count_at("103", day), expected, "at {day}");
    }
    assert_eq!(counter.count_at("103", d(2024, 5, 1)), 2);
    assert_eq!(counter.count_at("missing", d(2024, 5, 1)), 0);
  }

  #[test]
  fn count_overlaps_with_period_query() {
    let mut counter = IntervalCounter::new();
    counter.append("k", period(Some(d(2024, 1, 1)), Some(d(2024, 1, 31))));
    counter.append("k", period(Some(d(2024, 3, 1)), Some(d(2024, 3, 31))));

    let q1 = period(Some(d(2024, 1, 15)), Some(d(2024, 2, 15)));
    assert_eq!(counter.count_overlaps("k", &q1), 1);
    assert_eq!(counter.count_overlaps("k", &ValidityPeriod::unbounded()), 2);
    assert_eq!(counter.len(), 1);
  }

  #[test]
  fn batch_counters_cover_every_identifier() {
    use crate::record::{Address, CustomerId, PartyInfo};

    let holder = PartyInfo {
      name:        "Maija".into(),
      address:     Address {
        street:       Some("Kauppakatu".into()),
        house_number: Some("1".into()),
        postal_code:  Some("15140".into()),
        ..Address::default()
      },
      business_id: None,
    };
    let mut a = CustomerRecord::new(CustomerId::new("H", "1"), holder.clone());
    a.buildings.extend(["B1".to_owned(), "B2".to_owned()]);
    a.properties.insert("P1".into());
    let mut b = CustomerRecord::new(CustomerId::new("H", "2"), holder);
    b.properties.insert("P1".into());

    let counters = BatchCounters::from_records([&a, &b]);
    let any = ValidityPeriod::unbounded();
    assert_eq!(counters.buildings.count_overlaps("B1", &any), 1);
    assert_eq!(counters.buildings.len(), 2);
    assert_eq!(counters.properties.count_overlaps("P1", &any), 2);
    assert_eq!(counters.addresses.count_overlaps("kauppakatu 1, 15140", &any), 2);
  }
}
