// Export Pipeline - prices table -> ZIP containing data.csv
//
// Rows go from the SQLite cursor straight into the CSV writer, which writes
// into the archive entry. No full-table collection is built.

use crate::db;
use crate::error::{PriceError, Result};
use csv::{Terminator, WriterBuilder};
use rusqlite::Connection;
use std::io::{Cursor, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the single entry in an exported archive
pub const EXPORT_ENTRY: &str = "data.csv";

/// Build the complete archive in memory.
pub fn export_archive(conn: &Connection) -> Result<Vec<u8>> {
    let cursor = write_archive(conn, ZipWriter::new(Cursor::new(Vec::new())))?;
    Ok(cursor.into_inner())
}

/// Write the archive to a non-seekable sink as it is produced.
///
/// On error the sink may already hold a partial archive.
pub fn export_archive_to<W: Write>(conn: &Connection, sink: W) -> Result<()> {
    let mut sink = write_archive(conn, ZipWriter::new_stream(sink))?;
    sink.flush()?;
    Ok(())
}

fn write_archive<W: Write + Seek>(conn: &Connection, mut zip: ZipWriter<W>) -> Result<W> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(EXPORT_ENTRY, options)
        .map_err(PriceError::Archive)?;

    let rows = {
        let mut csv = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(&mut zip);

        let rows = db::for_each_price(conn, |record| {
            csv.write_record(record.to_csv_row())?;
            Ok(())
        })?;
        csv.flush()?;
        rows
    };

    let inner = zip.finish().map_err(PriceError::Archive)?;
    tracing::info!(rows, entry = EXPORT_ENTRY, "Export archive written");
    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_price, setup_database};
    use crate::record::PriceRecord;
    use chrono::NaiveDate;
    use std::io::Read;
    use zip::ZipArchive;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn read_entries(archive: &[u8]) -> Vec<(String, String)> {
        let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).unwrap();
            let mut body = String::new();
            file.read_to_string(&mut body).unwrap();
            entries.push((file.name().to_string(), body));
        }
        entries
    }

    fn record(id: i64, name: &str, category: &str, price: f64, day: u32) -> PriceRecord {
        PriceRecord {
            id,
            name: name.to_string(),
            category: category.to_string(),
            price,
            create_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        }
    }

    #[test]
    fn test_empty_table_exports_empty_entry() {
        let conn = memory_db();

        let archive = export_archive(&conn).unwrap();

        assert_eq!(read_entries(&archive), vec![("data.csv".to_string(), String::new())]);
    }

    #[test]
    fn test_export_row_format() {
        let conn = memory_db();
        insert_price(&conn, &record(1, "Widget", "Tools", 9.99, 15)).unwrap();

        let archive = export_archive(&conn).unwrap();

        let entries = read_entries(&archive);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, "1,Widget,Tools,9.99,2024-01-15T00:00:00Z\n");
    }

    #[test]
    fn test_export_quotes_fields_with_commas() {
        let conn = memory_db();
        insert_price(&conn, &record(2, "Widget, large", "Tools", 10.0, 2)).unwrap();

        let archive = export_archive(&conn).unwrap();

        let entries = read_entries(&archive);
        assert_eq!(
            entries[0].1,
            "2,\"Widget, large\",Tools,10.00,2024-01-02T00:00:00Z\n"
        );
    }

    #[test]
    fn test_export_contains_every_row() {
        let conn = memory_db();
        for id in 1..=25 {
            insert_price(&conn, &record(id, "Item", "Misc", id as f64, 1)).unwrap();
        }

        let archive = export_archive(&conn).unwrap();

        let body = &read_entries(&archive)[0].1;
        let mut ids: Vec<i64> = body
            .lines()
            .map(|line| line.split(',').next().unwrap().parse().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    }

    #[test]
    fn test_streamed_archive_is_readable() {
        let conn = memory_db();
        insert_price(&conn, &record(1, "Widget", "Tools", 9.99, 15)).unwrap();

        let mut sink = Vec::new();
        export_archive_to(&conn, &mut sink).unwrap();

        assert_eq!(
            read_entries(&sink),
            vec![(
                "data.csv".to_string(),
                "1,Widget,Tools,9.99,2024-01-15T00:00:00Z\n".to_string()
            )]
        );
    }

    #[test]
    fn test_export_without_table_is_storage_error() {
        let conn = Connection::open_in_memory().unwrap();

        let err = export_archive(&conn).unwrap_err();

        assert!(matches!(err, PriceError::Storage(_)));
    }
}
