use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use price_archive::{
    aggregate_totals, close_database, export_archive, import_archive, logging, open_database,
    setup_database, verify_count, Config,
};

#[derive(Debug, Parser)]
#[command(name = "price-archive")]
#[command(about = "Load ZIP archives of price CSVs into SQLite and export them back")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PRICES_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, env = "PRICES_DATABASE")]
    database: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the prices table if it does not exist
    Init,
    /// Import a ZIP archive of CSV files
    Import { archive: PathBuf },
    /// Export all records to a ZIP archive
    Export { output: PathBuf },
    /// Print aggregate totals
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    logging::init_logger(&config.log, cli.verbose);

    let mut conn = open_database(&config.database)
        .with_context(|| format!("Failed to open {}", config.database.display()))?;
    setup_database(&conn)?;

    match cli.command {
        Command::Init => {
            let count = verify_count(&conn)?;
            println!("Database ready: {} ({} records)", config.database.display(), count);
        }
        Command::Import { archive } => {
            let bytes = std::fs::read(&archive)
                .with_context(|| format!("Failed to read {}", archive.display()))?;
            let totals = import_archive(&mut conn, &bytes)
                .with_context(|| format!("Import of {} failed", archive.display()))?;
            println!("{}", serde_json::to_string(&totals)?);
        }
        Command::Export { output } => {
            let bytes = export_archive(&conn)?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} ({} bytes)", output.display(), bytes.len());
        }
        Command::Stats => {
            let totals = aggregate_totals(&conn)?;
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }

    close_database(conn)?;
    Ok(())
}
