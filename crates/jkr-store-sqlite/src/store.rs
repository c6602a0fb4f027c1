//! [`SqliteStore`], the SQLite implementation of [`SiteStore`] and
//! [`BuildingRegistry`].

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use jkr_core::{
  codes::PartyRole,
  period::ValidityPeriod,
  record::{CustomerId, PartyInfo},
  site::{
    Building, Contract, CustomerReference, NewContract, NewParty,
    NewPickupEvent, NewSite, Party, PickupEvent, Provider, Site, SiteParty,
  },
  store::{BuildingRegistry, SiteStore},
};

use crate::{
  Error, Result,
  encode::{
    BUILDING_COLUMNS, PARTY_COLUMNS, RawBuilding, RawContract, RawEvent,
    RawParty, RawReference, RawSite, REFERENCE_COLUMNS, SITE_COLUMNS,
    encode_address, encode_date, encode_dt, encode_party_info, encode_periods,
    encode_uuid,
  },
  schema::SCHEMA,
};

/// `WHERE` fragment restricting `s` to sites valid at some point of the
/// period bound to the numbered parameters `?{start}` and `?{end}`.
fn overlap_clause(start: usize, end: usize) -> String {
  format!(
    "(s.valid_start IS NULL OR ?{end} IS NULL OR s.valid_start <= ?{end})
     AND (s.valid_end IS NULL OR ?{start} IS NULL OR ?{start} <= s.valid_end)"
  )
}

/// `?1, ?2, …, ?count`.
fn placeholders(count: usize) -> String {
  (1..=count)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A site register backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted, and all
/// clones share the same open transaction.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("site register schema initialised");
    Ok(())
  }

  /// Run a site query whose first `ids.len()` parameters are the ids and
  /// whose last two are the validity period bounds.
  async fn query_sites_by_ids(
    &self,
    join_and_filter: &'static str,
    ids: &[String],
    during: &ValidityPeriod,
  ) -> Result<Vec<Site>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let n = ids.len();
    let sql = format!(
      "SELECT DISTINCT {SITE_COLUMNS}
       FROM sites s
       {join_and_filter} ({})
         AND {}
       ORDER BY s.created_at, s.site_id",
      placeholders(n),
      overlap_clause(n + 1, n + 2),
    );

    let mut params: Vec<Option<String>> = ids.iter().cloned().map(Some).collect();
    params.push(encode_date(during.start));
    params.push(encode_date(during.end));

    let raws: Vec<RawSite> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawSite::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSite::into_site).collect()
  }

  async fn query_buildings(
    &self,
    filter: String,
    params: Vec<String>,
  ) -> Result<Vec<Building>> {
    let sql = format!(
      "SELECT {BUILDING_COLUMNS} FROM buildings b {filter} ORDER BY b.building_id"
    );

    let raws: Vec<RawBuilding> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawBuilding::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBuilding::into_building).collect()
  }

  async fn insert_links(
    &self,
    table: &'static str,
    site_id: Uuid,
    building_ids: &[String],
  ) -> Result<()> {
    let site_str = encode_uuid(site_id);
    let ids = building_ids.to_vec();

    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "INSERT OR IGNORE INTO {table} (site_id, building_id) VALUES (?1, ?2)"
        ))?;
        for id in &ids {
          stmt.execute(rusqlite::params![site_str, id])?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_links(&self, table: &'static str, site_id: Uuid) -> Result<Vec<String>> {
    let site_str = encode_uuid(site_id);

    let ids = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT building_id FROM {table} WHERE site_id = ?1 ORDER BY building_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![site_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ids)
  }
}

// ─── SiteStore impl ──────────────────────────────────────────────────────────

impl SiteStore for SqliteStore {
  type Error = Error;

  // ── Transactions ──────────────────────────────────────────────────────────

  async fn begin(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        if conn.is_autocommit() {
          conn.execute_batch("BEGIN")?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn commit(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        if !conn.is_autocommit() {
          conn.execute_batch("COMMIT")?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn rollback(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        if !conn.is_autocommit() {
          conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Providers ─────────────────────────────────────────────────────────────

  async fn get_provider(&self, code: &str) -> Result<Option<Provider>> {
    let code = code.to_owned();

    let provider = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT code, name FROM providers WHERE code = ?1",
            rusqlite::params![code],
            |row| Ok(Provider { code: row.get(0)?, name: row.get(1)? }),
          )
          .optional()?)
      })
      .await?;
    Ok(provider)
  }

  async fn add_provider(&self, provider: Provider) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO providers (code, name) VALUES (?1, ?2)",
          rusqlite::params![provider.code, provider.name],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Customer references ───────────────────────────────────────────────────

  async fn get_reference(&self, customer_id: &CustomerId) -> Result<Option<CustomerReference>> {
    let system = customer_id.system.clone();
    let number = customer_id.number.clone();

    let raw: Option<RawReference> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {REFERENCE_COLUMNS}
               FROM customer_references WHERE system = ?1 AND number = ?2"
            ),
            rusqlite::params![system, number],
            RawReference::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawReference::into_reference).transpose()
  }

  async fn add_reference(&self, reference: CustomerReference) -> Result<()> {
    let key         = reference.customer_id.to_string();
    let system      = reference.customer_id.system;
    let number      = reference.customer_id.number;
    let site_str    = encode_uuid(reference.site_id);
    let holder_str  = encode_party_info(&reference.holder)?;
    let updated_str = encode_dt(reference.updated_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO customer_references (system, number, site_id, holder_json, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (system, number) DO NOTHING",
          rusqlite::params![system, number, site_str, holder_str, updated_str],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateReference(key));
    }
    Ok(())
  }

  async fn refresh_reference(&self, customer_id: &CustomerId, holder: &PartyInfo) -> Result<()> {
    let key         = customer_id.to_string();
    let system      = customer_id.system.clone();
    let number      = customer_id.number.clone();
    let holder_str  = encode_party_info(holder)?;
    let updated_str = encode_dt(Utc::now());

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE customer_references SET holder_json = ?3, updated_at = ?4
           WHERE system = ?1 AND number = ?2",
          rusqlite::params![system, number, holder_str, updated_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::ReferenceNotFound(key));
    }
    Ok(())
  }

  async fn site_references(&self, site_id: Uuid) -> Result<Vec<CustomerReference>> {
    let site_str = encode_uuid(site_id);

    let raws: Vec<RawReference> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REFERENCE_COLUMNS} FROM customer_references
           WHERE site_id = ?1 ORDER BY system, number"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![site_str], RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReference::into_reference).collect()
  }

  // ── Sites ─────────────────────────────────────────────────────────────────

  async fn add_site(&self, input: NewSite) -> Result<Site> {
    let site = Site {
      site_id:    Uuid::new_v4(),
      name:       input.name,
      valid:      input.valid,
      created_at: Utc::now(),
    };

    let id_str    = encode_uuid(site.site_id);
    let name      = site.name.clone();
    let start_str = encode_date(site.valid.start);
    let end_str   = encode_date(site.valid.end);
    let at_str    = encode_dt(site.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sites (site_id, name, valid_start, valid_end, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, name, start_str, end_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(site)
  }

  async fn get_site(&self, site_id: Uuid) -> Result<Option<Site>> {
    let id_str = encode_uuid(site_id);

    let raw: Option<RawSite> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SITE_COLUMNS} FROM sites s WHERE s.site_id = ?1"),
            rusqlite::params![id_str],
            RawSite::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSite::into_site).transpose()
  }

  async fn update_site(&self, site: &Site) -> Result<()> {
    let site_id   = site.site_id;
    let id_str    = encode_uuid(site.site_id);
    let name      = site.name.clone();
    let start_str = encode_date(site.valid.start);
    let end_str   = encode_date(site.valid.end);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sites SET name = ?2, valid_start = ?3, valid_end = ?4
           WHERE site_id = ?1",
          rusqlite::params![id_str, name, start_str, end_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::SiteNotFound(site_id));
    }
    Ok(())
  }

  async fn find_sites_by_buildings(
    &self,
    building_ids: &[String],
    during: &ValidityPeriod,
  ) -> Result<Vec<Site>> {
    self
      .query_sites_by_ids(
        "JOIN site_buildings sb ON sb.site_id = s.site_id
         WHERE sb.building_id IN",
        building_ids,
        during,
      )
      .await
  }

  async fn find_sites_by_properties(
    &self,
    property_ids: &[String],
    during: &ValidityPeriod,
  ) -> Result<Vec<Site>> {
    self
      .query_sites_by_ids(
        "JOIN site_buildings sb ON sb.site_id = s.site_id
         JOIN buildings b       ON b.building_id = sb.building_id
         WHERE b.property_id IN",
        property_ids,
        during,
      )
      .await
  }

  async fn find_sites_by_address(
    &self,
    address_key: &str,
    during: &ValidityPeriod,
  ) -> Result<Vec<Site>> {
    self
      .query_sites_by_ids(
        "JOIN site_buildings sb ON sb.site_id = s.site_id
         JOIN buildings b       ON b.building_id = sb.building_id
         WHERE b.address_key IN",
        &[address_key.to_owned()],
        during,
      )
      .await
  }

  async fn site_buildings(&self, site_id: Uuid) -> Result<Vec<String>> {
    self.query_links("site_buildings", site_id).await
  }

  async fn link_buildings(&self, site_id: Uuid, building_ids: &[String]) -> Result<()> {
    self.insert_links("site_buildings", site_id, building_ids).await
  }

  async fn site_candidates(&self, site_id: Uuid) -> Result<Vec<String>> {
    self.query_links("site_candidates", site_id).await
  }

  async fn add_candidates(&self, site_id: Uuid, building_ids: &[String]) -> Result<()> {
    self.insert_links("site_candidates", site_id, building_ids).await
  }

  // ── Parties ───────────────────────────────────────────────────────────────

  async fn site_parties(&self, site_id: Uuid, role: PartyRole) -> Result<Vec<Party>> {
    let site_str = encode_uuid(site_id);
    let role_str = role.as_ref().to_owned();

    let raws: Vec<RawParty> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PARTY_COLUMNS}
           FROM parties p
           JOIN site_parties sp ON sp.party_id = p.party_id
           WHERE sp.site_id = ?1 AND sp.role = ?2
           ORDER BY p.rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![site_str, role_str], RawParty::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawParty::into_party).collect()
  }

  async fn add_party(&self, input: NewParty) -> Result<Party> {
    let party = Party {
      party_id:       Uuid::new_v4(),
      name:           input.name,
      street_address: input.street_address,
      postal_code:    input.postal_code,
      post_office:    input.post_office,
      business_id:    input.business_id,
      kind:           input.kind,
      provider:       input.provider,
    };

    let id_str   = encode_uuid(party.party_id);
    let row      = party.clone();
    let kind_str = party.kind.as_ref().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO parties (
             party_id, name, street_address, postal_code, post_office,
             business_id, kind, provider
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            row.name,
            row.street_address,
            row.postal_code,
            row.post_office,
            row.business_id,
            kind_str,
            row.provider,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(party)
  }

  async fn link_party(&self, link: SiteParty) -> Result<()> {
    let site_str  = encode_uuid(link.site_id);
    let party_str = encode_uuid(link.party_id);
    let role_str  = link.role.as_ref().to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO site_parties (site_id, party_id, role) VALUES (?1, ?2, ?3)",
          rusqlite::params![site_str, party_str, role_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Pickup events ─────────────────────────────────────────────────────────

  async fn site_events(&self, site_id: Uuid) -> Result<Vec<PickupEvent>> {
    let site_str = encode_uuid(site_id);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, site_id, waste_type, start_date, end_date,
                  count, mass, volume, provider
           FROM pickup_events
           WHERE site_id = ?1
           ORDER BY start_date, end_date, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![site_str], |row| {
            Ok(RawEvent {
              event_id:   row.get(0)?,
              site_id:    row.get(1)?,
              waste_type: row.get(2)?,
              start_date: row.get(3)?,
              end_date:   row.get(4)?,
              count:      row.get(5)?,
              mass:       row.get(6)?,
              volume:     row.get(7)?,
              provider:   row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn add_event(&self, input: NewPickupEvent) -> Result<PickupEvent> {
    let event = PickupEvent {
      event_id:   Uuid::new_v4(),
      site_id:    input.site_id,
      waste_type: input.waste_type,
      start:      input.start,
      end:        input.end,
      count:      input.count,
      mass:       input.mass,
      volume:     input.volume,
      provider:   input.provider,
    };

    let id_str     = encode_uuid(event.event_id);
    let site_str   = encode_uuid(event.site_id);
    let waste_str  = event.waste_type.as_ref().to_owned();
    let start_str  = encode_date(event.start);
    let end_str    = encode_date(event.end);
    let (count, mass, volume) = (event.count, event.mass, event.volume);
    let provider   = event.provider.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO pickup_events (
             event_id, site_id, waste_type, start_date, end_date,
             count, mass, volume, provider
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str, site_str, waste_str, start_str, end_str, count, mass,
            volume, provider,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(event)
  }

  // ── Contracts ─────────────────────────────────────────────────────────────

  async fn site_contracts(&self, site_id: Uuid) -> Result<Vec<Contract>> {
    let site_str = encode_uuid(site_id);

    let raws: Vec<RawContract> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT contract_id, site_id, provider, waste_type, start_date, end_date
           FROM contracts
           WHERE site_id = ?1
           ORDER BY start_date, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![site_str], |row| {
            Ok(RawContract {
              contract_id: row.get(0)?,
              site_id:     row.get(1)?,
              provider:    row.get(2)?,
              waste_type:  row.get(3)?,
              start_date:  row.get(4)?,
              end_date:    row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContract::into_contract).collect()
  }

  async fn add_contract(&self, input: NewContract) -> Result<Contract> {
    let contract = Contract {
      contract_id: Uuid::new_v4(),
      site_id:     input.site_id,
      provider:    input.provider,
      waste_type:  input.waste_type,
      start:       input.start,
      end:         input.end,
    };

    let id_str    = encode_uuid(contract.contract_id);
    let site_str  = encode_uuid(contract.site_id);
    let provider  = contract.provider.clone();
    let waste_str = contract.waste_type.as_ref().to_owned();
    let start_str = encode_date(contract.start);
    let end_str   = encode_date(contract.end);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO contracts (contract_id, site_id, provider, waste_type, start_date, end_date)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, site_str, provider, waste_str, start_str, end_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(contract)
  }

  async fn set_contract_end(&self, contract_id: Uuid, end: Option<NaiveDate>) -> Result<()> {
    let id_str  = encode_uuid(contract_id);
    let end_str = encode_date(end);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE contracts SET end_date = ?2 WHERE contract_id = ?1",
          rusqlite::params![id_str, end_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::ContractNotFound(contract_id));
    }
    Ok(())
  }
}

// ─── BuildingRegistry impl ───────────────────────────────────────────────────

impl BuildingRegistry for SqliteStore {
  type Error = Error;

  async fn add_building(&self, building: &Building) -> Result<()> {
    let id           = building.building_id.clone();
    let property     = building.property_id.clone();
    let address_str  = encode_address(&building.address)?;
    let address_key  = building.address.building_key();
    let dwellings    = i64::from(building.dwellings);
    let residents    = encode_periods(&building.residents)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO buildings (
             building_id, property_id, address_json, address_key, dwellings, residents_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id, property, address_str, address_key, dwellings, residents],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_buildings(&self, building_ids: &[String]) -> Result<Vec<Building>> {
    if building_ids.is_empty() {
      return Ok(Vec::new());
    }
    let filter = format!("WHERE b.building_id IN ({})", placeholders(building_ids.len()));
    self.query_buildings(filter, building_ids.to_vec()).await
  }

  async fn buildings_on_properties(&self, property_ids: &[String]) -> Result<Vec<Building>> {
    if property_ids.is_empty() {
      return Ok(Vec::new());
    }
    let filter = format!("WHERE b.property_id IN ({})", placeholders(property_ids.len()));
    self.query_buildings(filter, property_ids.to_vec()).await
  }

  async fn buildings_at_address(&self, address_key: &str) -> Result<Vec<Building>> {
    self
      .query_buildings("WHERE b.address_key = ?1".to_owned(), vec![address_key.to_owned()])
      .await
  }

  async fn uncovered_buildings(&self) -> Result<Vec<Building>> {
    self
      .query_buildings(
        "WHERE NOT EXISTS (
           SELECT 1 FROM site_buildings sb WHERE sb.building_id = b.building_id
         )"
        .to_owned(),
        Vec::new(),
      )
      .await
  }
}
