// Import Pipeline - ZIP of CSV files -> prices table
//
// One transaction covers the whole archive. Every early return drops the
// transaction, which rolls it back.

use crate::db;
use crate::error::{PriceError, Result, RowError};
use crate::record::{PriceRecord, PriceTotals};
use csv::{ReaderBuilder, StringRecord};
use rusqlite::Connection;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Load every CSV entry of `archive` and return totals over the whole table.
///
/// The first row of each entry is a header and is skipped. Nothing is
/// committed unless every row of every entry parses and inserts.
pub fn import_archive(conn: &mut Connection, archive: &[u8]) -> Result<PriceTotals> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(PriceError::InvalidArchive)?;
    tracing::info!(entries = zip.len(), bytes = archive.len(), "ZIP archive opened");

    let tx = conn.transaction()?;
    let mut inserted = 0;

    for index in 0..zip.len() {
        let entry = zip
            .by_index(index)
            .map_err(|e| PriceError::UnreadableEntry {
                entry: format!("#{}", index),
                message: e.to_string(),
            })?;

        if entry.is_dir() {
            tracing::debug!(entry = entry.name(), "Skipping directory entry");
            continue;
        }

        let name = entry.name().to_string();
        let rows = load_entry(&tx, &name, entry)?;
        tracing::info!(entry = %name, rows, "Entry loaded");
        inserted += rows;
    }

    // Read inside the transaction so the totals include this batch
    let totals = db::aggregate_totals(&tx)?;

    tx.commit().map_err(PriceError::Commit)?;
    tracing::info!(
        inserted,
        total_items = totals.total_items,
        total_categories = totals.total_categories,
        total_price = totals.total_price,
        "Import committed"
    );

    Ok(totals)
}

/// Parse one CSV entry and insert its rows. Returns the number of rows inserted.
fn load_entry<R: Read>(conn: &Connection, entry: &str, reader: R) -> Result<usize> {
    let mut csv = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header = csv.headers().map_err(|e| unreadable(entry, &e))?;
    if header.is_empty() {
        return Err(PriceError::UnreadableEntry {
            entry: entry.to_string(),
            message: "missing header row".to_string(),
        });
    }
    tracing::debug!(entry, header = ?header, "Header row skipped");

    let mut row = StringRecord::new();
    let mut inserted = 0;

    loop {
        match csv.read_record(&mut row) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if e.is_io_error() => return Err(unreadable(entry, &e)),
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                return Err(PriceError::InvalidRow {
                    entry: entry.to_string(),
                    line,
                    source: RowError::Malformed(e),
                });
            }
        }

        let line = row.position().map_or(0, |p| p.line());
        let record = PriceRecord::from_csv_row(&row).map_err(|source| {
            tracing::debug!(entry, line, error = %source, "Rejecting row");
            PriceError::InvalidRow {
                entry: entry.to_string(),
                line,
                source,
            }
        })?;

        db::insert_price(conn, &record)?;
        tracing::debug!(entry, line, id = record.id, "Row inserted");
        inserted += 1;
    }

    Ok(inserted)
}

fn unreadable(entry: &str, err: &csv::Error) -> PriceError {
    PriceError::UnreadableEntry {
        entry: entry.to_string(),
        message: err.to_string(),
    }
}
