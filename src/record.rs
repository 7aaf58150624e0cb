// Price records - CSV row <-> typed record

use crate::error::RowError;
use chrono::{NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use csv::StringRecord;
use serde::Serialize;

/// Input and storage format for `create_date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Number of columns in a data row: id, name, category, price, create_date
pub const COLUMN_COUNT: usize = 5;

/// One priced item
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub create_date: NaiveDate,
}

impl PriceRecord {
    /// Parse a data row in fixed column order.
    ///
    /// No trimming is applied; every column must be well-formed on its own.
    pub fn from_csv_row(row: &StringRecord) -> Result<Self, RowError> {
        if row.len() != COLUMN_COUNT {
            return Err(RowError::ColumnCount { found: row.len() });
        }

        let id = row[0].parse::<i64>().map_err(|_| RowError::Id {
            value: row[0].to_string(),
        })?;

        let price = parse_price(&row[3])?;

        let create_date = NaiveDate::parse_from_str(&row[4], DATE_FORMAT).map_err(|_| {
            RowError::Date {
                value: row[4].to_string(),
            }
        })?;

        Ok(PriceRecord {
            id,
            name: row[1].to_string(),
            category: row[2].to_string(),
            price,
            create_date,
        })
    }

    /// Export columns: price with two decimals, date as an RFC 3339 timestamp at UTC midnight
    pub fn to_csv_row(&self) -> [String; COLUMN_COUNT] {
        [
            self.id.to_string(),
            self.name.clone(),
            self.category.clone(),
            format!("{:.2}", self.price),
            format_timestamp(self.create_date),
        ]
    }
}

fn parse_price(value: &str) -> Result<f64, RowError> {
    let price = value.parse::<f64>().map_err(|_| RowError::Price {
        value: value.to_string(),
    })?;

    // f64 parsing accepts "NaN" and "inf"
    if !price.is_finite() {
        return Err(RowError::Price {
            value: value.to_string(),
        });
    }
    if price < 0.0 {
        return Err(RowError::NegativePrice { value: price });
    }

    Ok(price)
}

/// `2024-01-15` -> `2024-01-15T00:00:00Z`
pub fn format_timestamp(date: NaiveDate) -> String {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Aggregates over the whole `prices` table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceTotals {
    pub total_items: i64,
    pub total_categories: i64,
    pub total_price: f64,
}
