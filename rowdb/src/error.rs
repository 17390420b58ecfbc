use thiserror::Error;

#[derive(Error, Debug)]
pub enum RowDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No such field: {0}")]
    UnknownField(String),

    #[error("Type mismatch for field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Attempt to access a deleted row")]
    DeletedRow,

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("No connector bound to data source: {0}")]
    NoConnector(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RowDbError>;
