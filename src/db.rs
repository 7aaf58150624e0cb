use crate::error::{PriceError, Result};
use crate::record::{PriceRecord, PriceTotals, DATE_FORMAT};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

const INSERT_PRICE: &str =
    "INSERT INTO prices (id, name, category, price, create_date) VALUES (?1, ?2, ?3, ?4, ?5)";

/// Open a file-backed database in WAL mode
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    // Enable WAL mode for crash recovery
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.busy_timeout(Duration::from_secs(5))?;

    tracing::info!(path = %path.display(), journal_mode = %mode, "Database opened");
    Ok(conn)
}

/// Read-only connection for long exports. Under WAL it sees the last committed
/// snapshot and never blocks the writer.
pub fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(Duration::from_secs(5))?;

    tracing::debug!(path = %path.display(), "Reader opened");
    Ok(conn)
}

/// Create the prices table if absent. Safe to call on every startup.
pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS prices (
            id INTEGER NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            price REAL NOT NULL,
            create_date TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_prices_category ON prices(category);",
    )?;

    Ok(())
}

pub fn insert_price(conn: &Connection, record: &PriceRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(INSERT_PRICE)?;
    stmt.execute(params![
        record.id,
        record.name,
        record.category,
        record.price,
        record.create_date.format(DATE_FORMAT).to_string(),
    ])?;

    Ok(())
}

/// Totals over the entire table, not just the latest batch
pub fn aggregate_totals(conn: &Connection) -> Result<PriceTotals> {
    let totals = conn.query_row(
        "SELECT
            COUNT(*) AS total_items,
            COUNT(DISTINCT category) AS total_categories,
            COALESCE(SUM(price), 0.0) AS total_price
         FROM prices",
        [],
        |row| {
            Ok(PriceTotals {
                total_items: row.get(0)?,
                total_categories: row.get(1)?,
                total_price: row.get(2)?,
            })
        },
    )?;

    Ok(totals)
}

/// Walk every stored record in engine order without collecting them.
///
/// Returns the number of records visited.
pub fn for_each_price<F>(conn: &Connection, mut visit: F) -> Result<usize>
where
    F: FnMut(PriceRecord) -> Result<()>,
{
    let mut stmt = conn.prepare("SELECT id, name, category, price, create_date FROM prices")?;
    let mut rows = stmt.query([])?;
    let mut visited = 0;

    while let Some(row) = rows.next()? {
        let raw_date: String = row.get(4)?;
        let create_date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).map_err(|e| {
            PriceError::CorruptRecord {
                message: format!("create_date {:?}: {}", raw_date, e),
            }
        })?;

        visit(PriceRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            price: row.get(3)?,
            create_date,
        })?;
        visited += 1;
    }

    Ok(visited)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get(0))?;

    Ok(count)
}

/// Close the connection, surfacing any error SQLite reports on close
pub fn close_database(conn: Connection) -> Result<()> {
    conn.close().map_err(|(_, e)| PriceError::Storage(e))?;
    tracing::info!("Database connection closed");
    Ok(())
}
