//! `jkr`: site register maintenance.
//!
//! Reads `jkr.toml` (or the path given with `--config`), layered under
//! `JKR_*` environment variables, opens the SQLite site register and runs
//! one of:
//!
//! ```
//! jkr load-buildings buildings.json
//! jkr bootstrap --snapshot 2024-01-01 --period-end 2024-12-31 --subsidy perusmaksu.csv
//! jkr import --provider LSJ --start 2024-01-01 --end 2024-03-31 records.json
//! ```
//!
//! Reports are printed to stdout as JSON; logs go to stderr.

use std::{
  fs,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use jkr_conflate::{
  Bootstrapper, CommitMode, ImportOptions, Importer, LogProgress,
  RegistryLookup, SubsidyExtract,
};
use jkr_core::{
  record::CustomerRecord,
  site::Building,
  store::{BuildingRegistry, SiteStore},
};
use jkr_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "jkr", version, about = "Waste collection site register")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "jkr.toml")]
  config: PathBuf,

  /// SQLite database; overrides `store_path` from the config file.
  #[arg(long, env = "JKR_STORE_PATH")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import a batch of validated customer records (JSON array).
  Import {
    records: PathBuf,

    /// Code of the provider that delivered the batch.
    #[arg(long)]
    provider: String,

    /// First day of the reporting period.
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the reporting period.
    #[arg(long)]
    end: NaiveDate,

    /// Never create sites; unmatched records are skipped.
    #[arg(long)]
    no_create: bool,

    /// Leave matched sites and contact parties as they are.
    #[arg(long)]
    no_update: bool,

    /// Run the whole batch in one transaction.
    #[arg(long)]
    whole_batch: bool,
  },

  /// Create sites for buildings not yet linked to any.
  Bootstrap {
    /// Date on which residency is evaluated; new sites start here.
    #[arg(long)]
    snapshot: NaiveDate,

    #[arg(long)]
    period_end: Option<NaiveDate>,

    /// Subsidy registry extract (`asiakasnumero;prt` CSV).
    #[arg(long)]
    subsidy: Option<PathBuf>,
  },

  /// Insert or replace registry buildings (JSON array).
  LoadBuildings { buildings: PathBuf },
}

// ─── Config file ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
  store_path:     PathBuf,
  import:         ImportOptions,
  /// Log import progress every this many records; 0 disables.
  progress_every: usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:     PathBuf::from("jkr.db"),
      import:         ImportOptions::default(),
      progress_every: 1000,
    }
  }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings: Settings = config::Config::builder()
    .add_source(config::File::from(cli.config.as_path()).required(false))
    .add_source(
      config::Environment::with_prefix("JKR")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")?;

  let store_path = expand_tilde(cli.store.as_deref().unwrap_or(&settings.store_path));
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Import {
      records,
      provider,
      start,
      end,
      no_create,
      no_update,
      whole_batch,
    } => {
      let mut options = settings.import;
      options.allow_create &= !no_create;
      options.allow_update &= !no_update;
      if whole_batch {
        options.commit_mode = CommitMode::WholeBatch;
      }

      let records: Vec<CustomerRecord> = read_json(&records)?;
      let importer = Importer::new(store.clone(), RegistryLookup::new(store));
      let mut progress = LogProgress::new(records.len(), settings.progress_every);

      match importer
        .import_batch(&records, start, end, &provider, &options, &mut progress)
        .await
      {
        Ok(report) => print_json(&report)?,
        Err(e) => {
          print_json(&e.report)?;
          return Err(e).context("import failed");
        }
      }
    }

    Command::Bootstrap { snapshot, period_end, subsidy } => {
      let extract = subsidy
        .as_deref()
        .map(|path| {
          SubsidyExtract::from_path(path)
            .with_context(|| format!("failed to read subsidy extract {path:?}"))
        })
        .transpose()?;

      let report = Bootstrapper::new(store)
        .bootstrap_sites(snapshot, period_end, extract.as_ref())
        .await
        .context("bootstrap failed")?;
      print_json(&report)?;
    }

    Command::LoadBuildings { buildings } => {
      let buildings: Vec<Building> = read_json(&buildings)?;
      load_buildings(&store, &buildings)
        .await
        .context("failed to load buildings")?;
      tracing::info!(count = buildings.len(), "buildings loaded");
    }
  }

  Ok(())
}

async fn load_buildings(
  store: &SqliteStore,
  buildings: &[Building],
) -> jkr_store_sqlite::Result<()> {
  store.begin().await?;
  for building in buildings {
    if let Err(e) = store.add_building(building).await {
      store.rollback().await?;
      return Err(e);
    }
  }
  store.commit().await
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let raw = fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  serde_json::from_str(&raw)
    .with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
