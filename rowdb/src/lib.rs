pub mod connector;
pub mod error;
pub mod row;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod text;
pub mod value;

pub use connector::{BinaryFileConnector, Connector, CsvFileConnector, DelimitedFileConnector};
pub use error::{Result, RowDbError};
pub use row::Row;
pub use schema::Schema;
pub use source::memory::MemoryDataSource;
pub use source::sql::SqlDataSource;
pub use source::DataSource;
pub use value::{Value, ValueType};
