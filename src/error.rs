// Error taxonomy for the import/export pipelines

use thiserror::Error;

/// Why a single CSV data row was rejected
#[derive(Error, Debug)]
pub enum RowError {
    #[error("expected 5 columns, found {found}")]
    ColumnCount { found: usize },

    #[error("invalid id {value:?}")]
    Id { value: String },

    #[error("invalid price {value:?}")]
    Price { value: String },

    #[error("negative price {value}")]
    NegativePrice { value: f64 },

    #[error("invalid date {value:?} (expected YYYY-MM-DD)")]
    Date { value: String },

    #[error("malformed CSV row: {0}")]
    Malformed(#[source] csv::Error),
}

/// Broad class of a failure, used to pick the response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad upload, archive or row data. Nothing was persisted.
    ClientInput,
    /// Connection, transaction or query failure
    Storage,
    /// CSV or archive write failure during export
    Serialization,
    Internal,
}

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("upload rejected: {message}")]
    Upload { message: String },

    #[error("not a valid ZIP archive: {0}")]
    InvalidArchive(#[source] zip::result::ZipError),

    #[error("{entry}, line {line}: {source}")]
    InvalidRow {
        entry: String,
        line: u64,
        #[source]
        source: RowError,
    },

    #[error("cannot read archive entry {entry}: {message}")]
    UnreadableEntry { entry: String, message: String },

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] rusqlite::Error),

    #[error("stored record is corrupt: {message}")]
    CorruptRecord { message: String },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive write failed: {0}")]
    Archive(#[source] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl PriceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PriceError::Upload { .. }
            | PriceError::InvalidArchive(_)
            | PriceError::InvalidRow { .. } => ErrorKind::ClientInput,
            PriceError::Storage(_) | PriceError::Commit(_) | PriceError::CorruptRecord { .. } => {
                ErrorKind::Storage
            }
            PriceError::Csv(_) | PriceError::Archive(_) | PriceError::Io(_) => {
                ErrorKind::Serialization
            }
            PriceError::UnreadableEntry { .. } | PriceError::Config { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::ClientInput
    }
}

pub type Result<T> = std::result::Result<T, PriceError>;
