// Price Archive - Core Library
// Exposes the import/export pipelines for the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod record;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{Config, ExportMode, LogConfig, LogFormat};
pub use db::{
    aggregate_totals, close_database, for_each_price, insert_price, open_database, open_reader,
    setup_database, verify_count,
};
pub use error::{ErrorKind, PriceError, Result, RowError};
pub use export::{export_archive, export_archive_to, EXPORT_ENTRY};
pub use import::import_archive;
pub use record::{PriceRecord, PriceTotals, DATE_FORMAT};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
