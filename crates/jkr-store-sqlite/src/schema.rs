//! SQL schema for the site register.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS providers (
    code  TEXT PRIMARY KEY,
    name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sites (
    site_id      TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    valid_start  TEXT,            -- ISO 8601 date or NULL (unbounded)
    valid_end    TEXT,            -- ISO 8601 date or NULL (unbounded)
    created_at   TEXT NOT NULL
);

-- Building registry. residents_json holds a JSON array of validity periods.
CREATE TABLE IF NOT EXISTS buildings (
    building_id    TEXT PRIMARY KEY,
    property_id    TEXT,
    address_json   TEXT NOT NULL,
    address_key    TEXT,          -- normalised \"street number, postal\"
    dwellings      INTEGER NOT NULL DEFAULT 0,
    residents_json TEXT NOT NULL DEFAULT '[]'
);

-- Confirmed links are append-only.
CREATE TABLE IF NOT EXISTS site_buildings (
    site_id      TEXT NOT NULL REFERENCES sites(site_id),
    building_id  TEXT NOT NULL,
    PRIMARY KEY (site_id, building_id)
);

CREATE TABLE IF NOT EXISTS site_candidates (
    site_id      TEXT NOT NULL REFERENCES sites(site_id),
    building_id  TEXT NOT NULL,
    PRIMARY KEY (site_id, building_id)
);

CREATE TABLE IF NOT EXISTS customer_references (
    system       TEXT NOT NULL,
    number       TEXT NOT NULL,
    site_id      TEXT NOT NULL REFERENCES sites(site_id),
    holder_json  TEXT NOT NULL,   -- contact snapshot as last imported
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (system, number)
);

CREATE TABLE IF NOT EXISTS parties (
    party_id       TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    street_address TEXT NOT NULL,
    postal_code    TEXT,
    post_office    TEXT,
    business_id    TEXT,
    kind           TEXT NOT NULL DEFAULT 'person',
    provider       TEXT
);

CREATE TABLE IF NOT EXISTS site_parties (
    site_id   TEXT NOT NULL REFERENCES sites(site_id),
    party_id  TEXT NOT NULL REFERENCES parties(party_id),
    role      TEXT NOT NULL,
    PRIMARY KEY (site_id, party_id, role)
);

CREATE TABLE IF NOT EXISTS pickup_events (
    event_id    TEXT PRIMARY KEY,
    site_id     TEXT NOT NULL REFERENCES sites(site_id),
    waste_type  TEXT NOT NULL,
    start_date  TEXT,
    end_date    TEXT,
    count       INTEGER,
    mass        REAL,
    volume      REAL,
    provider    TEXT NOT NULL REFERENCES providers(code)
);

CREATE TABLE IF NOT EXISTS contracts (
    contract_id  TEXT PRIMARY KEY,
    site_id      TEXT NOT NULL REFERENCES sites(site_id),
    provider     TEXT NOT NULL REFERENCES providers(code),
    waste_type   TEXT NOT NULL,
    start_date   TEXT,
    end_date     TEXT
);

CREATE INDEX IF NOT EXISTS buildings_property_idx   ON buildings(property_id);
CREATE INDEX IF NOT EXISTS buildings_address_idx    ON buildings(address_key);
CREATE INDEX IF NOT EXISTS site_buildings_bld_idx   ON site_buildings(building_id);
CREATE INDEX IF NOT EXISTS pickup_events_site_idx   ON pickup_events(site_id);
CREATE INDEX IF NOT EXISTS contracts_site_idx       ON contracts(site_id);

PRAGMA user_version = 1;
";
