//! Persistence backends for memory-backed sources.
//!
//! A connector knows how to write a source's full contents to its
//! target; the source decides *when* (explicit flush or the change
//! counter crossing its threshold). Saves are whole-file rewrites,
//! never incremental.

use crate::error::Result;
use crate::snapshot;
use crate::source::DataSource;
use crate::text;
use std::path::{Path, PathBuf};

pub trait Connector: Send + Sync {
    /// Persists the source's current contents to the target.
    fn save(&self, source: &dyn DataSource) -> Result<()>;

    /// The file this connector writes to.
    fn target(&self) -> &Path;
}

/// Persists as a binary snapshot.
pub struct BinaryFileConnector {
    path: PathBuf,
}

impl BinaryFileConnector {
    pub fn new(path: impl Into<PathBuf>) -> BinaryFileConnector {
        BinaryFileConnector { path: path.into() }
    }
}

impl Connector for BinaryFileConnector {
    fn save(&self, source: &dyn DataSource) -> Result<()> {
        snapshot::save_binary(source, &self.path)
    }

    fn target(&self) -> &Path {
        &self.path
    }
}

/// Persists in the delimited text format.
pub struct DelimitedFileConnector {
    path: PathBuf,
}

impl DelimitedFileConnector {
    pub fn new(path: impl Into<PathBuf>) -> DelimitedFileConnector {
        DelimitedFileConnector { path: path.into() }
    }
}

impl Connector for DelimitedFileConnector {
    fn save(&self, source: &dyn DataSource) -> Result<()> {
        text::save_delimited(source, &self.path)
    }

    fn target(&self) -> &Path {
        &self.path
    }
}

/// Persists as CSV, optionally restricted to a subset of fields.
/// Export only: CSV has no loader.
pub struct CsvFileConnector {
    path: PathBuf,
    delimiter: char,
    fields: Option<Vec<String>>,
}

impl CsvFileConnector {
    pub fn new(path: impl Into<PathBuf>) -> CsvFileConnector {
        CsvFileConnector {
            path: path.into(),
            delimiter: ',',
            fields: None,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> CsvFileConnector {
        self.delimiter = delimiter;
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> CsvFileConnector {
        self.fields = Some(fields);
        self
    }
}

impl Connector for CsvFileConnector {
    fn save(&self, source: &dyn DataSource) -> Result<()> {
        text::save_csv(source, &self.path, self.delimiter, self.fields.as_deref())
    }

    fn target(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::load_binary;
    use crate::source::memory::MemoryDataSource;
    use crate::text::load_delimited;
    use crate::value::{Value, ValueType};
    use pretty_assertions::assert_eq;

    fn sample() -> MemoryDataSource {
        let ds = MemoryDataSource::with_fields(
            "towns",
            &["name", "population"],
            &[ValueType::Str, ValueType::Int],
        )
        .unwrap();
        ds.set_auto_flush_threshold(-1);
        ds.append(vec!["Varna".into(), Value::Int(330_000)]).unwrap();
        ds
    }

    #[test]
    fn test_binary_connector_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towns.db");

        let ds = sample();
        ds.set_connector(Box::new(BinaryFileConnector::new(&path)));
        ds.flush().unwrap();
        assert_eq!(ds.has_changed(), 0);

        let loaded = load_binary(&path).unwrap();
        assert_eq!(
            loaded.lookup("NAME", &"Varna".into(), "POPULATION").unwrap(),
            Some(Value::Int(330_000))
        );
    }

    #[test]
    fn test_delimited_connector_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towns.txt");

        let ds = sample();
        ds.set_connector(Box::new(DelimitedFileConnector::new(&path)));
        ds.flush().unwrap();

        let loaded = load_delimited(&path).unwrap();
        assert_eq!(loaded.size().unwrap(), 1);
    }

    #[test]
    fn test_csv_connector_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towns.csv");

        let ds = sample();
        ds.set_connector(Box::new(
            CsvFileConnector::new(&path)
                .with_delimiter(';')
                .with_fields(vec!["NAME".to_string()]),
        ));
        ds.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "NAME\nVarna\n");
    }

    #[test]
    fn test_auto_flush_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towns.db");

        let ds = sample();
        ds.set_connector(Box::new(BinaryFileConnector::new(&path)));
        ds.set_auto_flush_threshold(2);
        // The pending append plus this one cross the threshold.
        ds.append(vec!["Ruse".into(), Value::Int(140_000)]).unwrap();

        assert!(path.exists());
        assert_eq!(load_binary(&path).unwrap().size().unwrap(), 2);
    }
}
