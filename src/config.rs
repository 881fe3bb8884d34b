//! Runtime settings: storage selection, fallback text and logging

use std::path::PathBuf;

use clap::Args;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::SqliteStore;
use crate::error::Result;
use crate::local::JsonFileStore;
use crate::store::Store;
use crate::template::FALLBACK;

/// Options shared by every subcommand. Each can also come from the
/// environment or a `.env` file.
#[derive(Debug, Args)]
pub struct Settings {
    /// Path to the SQLite database
    #[arg(short, long, global = true, env = "FUEL_LEDGER_DB", default_value = "fuel_ledger.db")]
    pub database: PathBuf,

    /// Keep data in a local JSON file instead of the database
    #[arg(short, long, global = true, env = "FUEL_LEDGER_LOCAL")]
    pub local: Option<PathBuf>,

    /// Text written in place of placeholders that cannot be resolved
    #[arg(long, global = true, env = "FUEL_LEDGER_FALLBACK", default_value = FALLBACK)]
    pub fallback: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "FUEL_LEDGER_LOG", default_value = "fuel_ledger=info")]
    pub log: String,
}

impl Settings {
    /// Logs go to stderr so report text on stdout can be piped
    pub fn init_logging(&self) {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| self.log.as_str().into()))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// The local file when one is configured, the database otherwise
    pub fn open_store(&self) -> Result<Box<dyn Store>> {
        match &self.local {
            Some(path) => {
                debug!(path = %path.display(), "using local store");
                Ok(Box::new(JsonFileStore::open(path)))
            }
            None => {
                debug!(path = %self.database.display(), "using database store");
                Ok(Box::new(SqliteStore::open(&self.database)?))
            }
        }
    }
}
