//! SQLite-backed data source.
//!
//! Each instance adapts one table of one connection. The schema is
//! introspected from the table itself, so the database is the single
//! source of truth for fields and types. Every read returns detached
//! result rows; all values travel through bound parameters and every
//! identifier is quoted, so neither data nor field names can smuggle
//! SQL into a statement.

use crate::error::{Result, RowDbError};
use crate::row::Row;
use crate::schema::Schema;
use crate::source::DataSource;
use crate::value::{Value, ValueType};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering::SeqCst};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct SqlDataSource {
    inner: Mutex<SqlInner>,
    changes: AtomicI64,
    auto_flush: AtomicI64,
}

struct SqlInner {
    conn: Connection,
    table: String,
    fields: Vec<String>,
    types: Vec<ValueType>,
    ordering_field: Option<String>,
    ascending: bool,
}

fn lock(mutex: &Mutex<SqlInner>) -> MutexGuard<'_, SqlInner> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Maps a declared SQL column type to the value vocabulary. Precision
/// suffixes like `VARCHAR(40)` are ignored; anything unrecognized is
/// treated as text.
fn sql_to_value_type(declared: &str) -> ValueType {
    let base = declared.split('(').next().unwrap_or("").trim().to_uppercase();
    match base.as_str() {
        "TEXT" | "VARCHAR" | "NVARCHAR" | "CLOB" => ValueType::Str,
        "CHAR" | "NCHAR" | "CHARACTER" => ValueType::Char,
        "BIT" | "BOOL" | "BOOLEAN" => ValueType::Bool,
        "TINYINT" => ValueType::Byte,
        "SMALLINT" | "INTEGER" | "INT" | "MEDIUMINT" => ValueType::Int,
        "BIGINT" => ValueType::Long,
        "FLOAT" => ValueType::Float,
        "REAL" | "DOUBLE" | "NUMERIC" | "DECIMAL" => ValueType::Double,
        _ => ValueType::Str,
    }
}

fn value_type_to_sql(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Str => "TEXT",
        ValueType::Char => "CHARACTER",
        ValueType::Bool => "BOOLEAN",
        ValueType::Byte => "TINYINT",
        ValueType::Int => "INTEGER",
        ValueType::Long => "BIGINT",
        ValueType::Float => "FLOAT",
        ValueType::Double => "DOUBLE",
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Int(v) => Sql::Integer(i64::from(*v)),
        Value::Long(v) => Sql::Integer(*v),
        Value::Float(v) => Sql::Real(f64::from(*v)),
        Value::Double(v) => Sql::Real(*v),
        Value::Str(v) => Sql::Text(v.clone()),
        Value::Char(v) => Sql::Text(v.to_string()),
        Value::Byte(v) => Sql::Integer(i64::from(*v)),
        Value::Bool(v) => Sql::Integer(i64::from(*v)),
    }
}

/// Converts a fetched SQLite value to the column's declared type.
/// Storage classes SQLite widened (integers in real columns and the
/// like) are narrowed back; anything unconvertible reads as null.
fn column_value(raw: rusqlite::types::Value, declared: ValueType) -> Value {
    use rusqlite::types::Value as Sql;
    match (declared, raw) {
        (_, Sql::Null) => Value::Null,
        (ValueType::Int, Sql::Integer(i)) => Value::Int(i as i32),
        (ValueType::Long, Sql::Integer(i)) => Value::Long(i),
        (ValueType::Float, Sql::Real(r)) => Value::Float(r as f32),
        (ValueType::Float, Sql::Integer(i)) => Value::Float(i as f32),
        (ValueType::Double, Sql::Real(r)) => Value::Double(r),
        (ValueType::Double, Sql::Integer(i)) => Value::Double(i as f64),
        (ValueType::Str, Sql::Text(s)) => Value::Str(s),
        (ValueType::Char, Sql::Text(s)) => s.chars().next().map_or(Value::Null, Value::Char),
        (ValueType::Byte, Sql::Integer(i)) => Value::Byte(i as u8),
        (ValueType::Bool, Sql::Integer(i)) => Value::Bool(i != 0),
        _ => Value::Null,
    }
}

impl SqlInner {
    fn introspect(conn: &Connection, table: &str) -> Result<(Vec<String>, Vec<ValueType>)> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let mut fields = Vec::new();
        let mut types = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            fields.push(name);
            types.push(sql_to_value_type(&declared));
        }
        if fields.is_empty() {
            return Err(RowDbError::Schema(format!("no such table: {table}")));
        }
        Ok((fields, types))
    }

    fn refresh_schema(&mut self) -> Result<()> {
        let (fields, types) = SqlInner::introspect(&self.conn, &self.table)?;
        self.fields = fields;
        self.types = types;
        Ok(())
    }

    /// Resolves a caller-supplied field name to the canonical column
    /// name from the introspected schema, so only known identifiers
    /// ever reach a statement.
    fn canonical(&self, field: &str) -> Result<(usize, &str)> {
        self.field_position(field)
            .map(|i| (i, self.fields[i].as_str()))
            .ok_or_else(|| RowDbError::UnknownField(field.to_string()))
    }

    fn field_position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.eq_ignore_ascii_case(field))
    }

    fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| quote_ident(f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn order_clause(&self) -> String {
        let Some(field) = &self.ordering_field else {
            return String::new();
        };
        let Some(pos) = self.field_position(field) else {
            return String::new();
        };
        let direction = if self.ascending { "ASC" } else { "DESC" };
        format!(" ORDER BY {} {}", quote_ident(&self.fields[pos]), direction)
    }

    /// `= ?` match or `IS NULL`, with the bound parameters to go with
    /// it.
    fn match_clause(&self, column: &str, value: &Value) -> (String, Vec<rusqlite::types::Value>) {
        if value.is_null() {
            (format!("{} IS NULL", quote_ident(column)), Vec::new())
        } else {
            (format!("{} = ?", quote_ident(column)), vec![to_sql_value(value)])
        }
    }

    fn fetch_rows(
        &self,
        sql: &str,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<Vec<Row>> {
        let fields = Arc::new(self.fields.clone());
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(self.types.len());
            for (i, ty) in self.types.iter().enumerate() {
                values.push(column_value(row.get::<_, rusqlite::types::Value>(i)?, *ty));
            }
            result.push(Row::result(Arc::clone(&fields), values));
        }
        Ok(result)
    }
}

impl SqlDataSource {
    /// Adapts an existing table in the database at `path`.
    pub fn open(path: &Path, table: &str) -> Result<SqlDataSource> {
        SqlDataSource::from_connection(Connection::open(path)?, table)
    }

    /// Creates the table (unless it already exists) in the database at
    /// `path` and adapts it.
    pub fn create(path: &Path, table: &str, schema: &Schema) -> Result<SqlDataSource> {
        SqlDataSource::create_on(Connection::open(path)?, table, schema)
    }

    /// Adapts an existing table over an already-open connection.
    pub fn from_connection(conn: Connection, table: &str) -> Result<SqlDataSource> {
        let (fields, types) = SqlInner::introspect(&conn, table)?;
        log::debug!("attached to table '{table}' with {} columns", fields.len());
        Ok(SqlDataSource {
            inner: Mutex::new(SqlInner {
                conn,
                table: table.to_string(),
                fields,
                types,
                ordering_field: None,
                ascending: true,
            }),
            changes: AtomicI64::new(0),
            auto_flush: AtomicI64::new(super::memory::DEFAULT_AUTO_FLUSH_THRESHOLD),
        })
    }

    /// Creates the table (unless it already exists) over an
    /// already-open connection and adapts it.
    pub fn create_on(conn: Connection, table: &str, schema: &Schema) -> Result<SqlDataSource> {
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .zip(schema.types())
            .map(|(field, ty)| format!("{} {}", quote_ident(field), value_type_to_sql(*ty)))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            columns.join(", ")
        );
        conn.execute(&sql, [])?;
        SqlDataSource::from_connection(conn, table)
    }

    pub fn begin_transaction(&self) -> Result<()> {
        lock(&self.inner).conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        lock(&self.inner).conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        lock(&self.inner).conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    pub fn auto_flush_threshold(&self) -> i64 {
        self.auto_flush.load(SeqCst)
    }

    /// Number of changes after which an open transaction is committed
    /// implicitly. Negative disables the check.
    pub fn set_auto_flush_threshold(&self, threshold: i64) {
        self.auto_flush.store(threshold, SeqCst);
    }

    fn record_changes(&self, n: i64) {
        if n == 0 {
            return;
        }
        let count = self.changes.fetch_add(n, SeqCst) + n;
        let threshold = self.auto_flush.load(SeqCst);
        if threshold >= 0 && count >= threshold {
            if let Err(e) = self.flush() {
                log::error!("auto-commit failed: {e}");
            }
        }
    }
}

impl DataSource for SqlDataSource {
    fn name(&self) -> String {
        lock(&self.inner).table.clone()
    }

    fn fields(&self) -> Vec<String> {
        lock(&self.inner).fields.clone()
    }

    fn types(&self) -> Vec<ValueType> {
        lock(&self.inner).types.clone()
    }

    fn field_index(&self, field: &str) -> Option<usize> {
        lock(&self.inner).field_position(field)
    }

    fn add_field(&self, field: &str, ty: ValueType) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            if inner.field_position(field).is_some() {
                return Err(RowDbError::Schema(format!("duplicate field name: {field}")));
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(&inner.table),
                quote_ident(field),
                value_type_to_sql(ty)
            );
            inner.conn.execute(&sql, [])?;
            inner.refresh_schema()?;
        }
        self.record_changes(1);
        Ok(())
    }

    fn delete_field(&self, field: &str) -> Result<bool> {
        {
            let mut inner = lock(&self.inner);
            let canonical = match inner.canonical(field) {
                Ok((_, name)) => name.to_string(),
                Err(_) => return Ok(false),
            };
            let sql = format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(&inner.table),
                quote_ident(&canonical)
            );
            inner.conn.execute(&sql, [])?;
            inner.refresh_schema()?;
        }
        self.record_changes(1);
        Ok(true)
    }

    fn query(&self, field: &str, value: &Value) -> Result<Vec<Row>> {
        let inner = lock(&self.inner);
        let (_, canonical) = inner.canonical(field)?;
        let (clause, params) = inner.match_clause(canonical, value);
        let sql = format!(
            "SELECT {} FROM {} WHERE {}{}",
            inner.column_list(),
            quote_ident(&inner.table),
            clause,
            inner.order_clause()
        );
        inner.fetch_rows(&sql, params)
    }

    fn get_first(&self, field: &str, value: &Value) -> Result<Option<Row>> {
        let inner = lock(&self.inner);
        let (_, canonical) = inner.canonical(field)?;
        let (clause, params) = inner.match_clause(canonical, value);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            inner.column_list(),
            quote_ident(&inner.table),
            clause
        );
        Ok(inner.fetch_rows(&sql, params)?.into_iter().next())
    }

    fn get_all(&self) -> Result<Vec<Row>> {
        let inner = lock(&self.inner);
        let sql = format!(
            "SELECT {} FROM {}{}",
            inner.column_list(),
            quote_ident(&inner.table),
            inner.order_clause()
        );
        inner.fetch_rows(&sql, Vec::new())
    }

    fn lookup(&self, key_field: &str, key: &Value, value_field: &str) -> Result<Option<Value>> {
        let inner = lock(&self.inner);
        let (_, key_col) = inner.canonical(key_field)?;
        let (value_pos, value_col) = inner.canonical(value_field)?;
        let declared = inner.types[value_pos];
        let (clause, params) = inner.match_clause(key_col, key);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            quote_ident(value_col),
            quote_ident(&inner.table),
            clause
        );
        let mut stmt = inner.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        match rows.next()? {
            Some(row) => Ok(Some(column_value(
                row.get::<_, rusqlite::types::Value>(0)?,
                declared,
            ))),
            None => Ok(None),
        }
    }

    fn set(&self, key_field: &str, key: &Value, field: &str, value: &Value) -> Result<usize> {
        let changed = {
            let inner = lock(&self.inner);
            let (_, key_col) = inner.canonical(key_field)?;
            let (_, set_col) = inner.canonical(field)?;
            let (clause, mut params) = inner.match_clause(key_col, key);
            params.insert(0, to_sql_value(value));
            let sql = format!(
                "UPDATE {} SET {} = ?1 WHERE {}",
                quote_ident(&inner.table),
                quote_ident(set_col),
                clause
            );
            let mut stmt = inner.conn.prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(params))?
        };
        self.record_changes(changed as i64);
        Ok(changed)
    }

    fn set_first(&self, _: &str, _: &Value, _: &str, _: &Value) -> Result<usize> {
        Err(RowDbError::Unsupported(
            "set_first is not available on SQL sources: result order is undefined",
        ))
    }

    fn delete(&self, key_field: &str, key: &Value) -> Result<usize> {
        let deleted = {
            let inner = lock(&self.inner);
            let (_, key_col) = inner.canonical(key_field)?;
            let (clause, params) = inner.match_clause(key_col, key);
            let sql = format!(
                "DELETE FROM {} WHERE {}",
                quote_ident(&inner.table),
                clause
            );
            let mut stmt = inner.conn.prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(params))?
        };
        self.record_changes(deleted as i64);
        Ok(deleted)
    }

    fn delete_first(&self, _: &str, _: &Value) -> Result<usize> {
        Err(RowDbError::Unsupported(
            "delete_first is not available on SQL sources: result order is undefined",
        ))
    }

    fn append(&self, values: Vec<Value>) -> Result<Row> {
        let row = {
            let inner = lock(&self.inner);
            if values.len() != inner.fields.len() {
                return Err(RowDbError::Schema(format!(
                    "illegal data length: {} (table has {} columns)",
                    values.len(),
                    inner.fields.len()
                )));
            }
            // SQLite would happily store a mistyped value and read it
            // back as null; reject it up front instead.
            for (i, value) in values.iter().enumerate() {
                let declared = inner.types[i];
                if !value.matches_type(declared) {
                    return Err(RowDbError::TypeMismatch {
                        field: inner.fields[i].clone(),
                        expected: declared.type_name().to_string(),
                        found: value.type_label().to_string(),
                    });
                }
            }
            let placeholders: Vec<String> =
                (1..=values.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&inner.table),
                inner.column_list(),
                placeholders.join(", ")
            );
            let mut stmt = inner.conn.prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(values.iter().map(to_sql_value)))?;
            Row::result(Arc::new(inner.fields.clone()), values)
        };
        self.record_changes(1);
        Ok(row)
    }

    fn size(&self) -> Result<usize> {
        let inner = lock(&self.inner);
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&inner.table));
        let count: i64 = inner.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear(&self) -> Result<()> {
        let cleared = {
            let inner = lock(&self.inner);
            let sql = format!("DELETE FROM {}", quote_ident(&inner.table));
            inner.conn.execute(&sql, [])?
        };
        self.record_changes(cleared as i64);
        Ok(())
    }

    fn changed(&self) {
        self.record_changes(1);
    }

    fn has_changed(&self) -> i64 {
        self.changes.load(SeqCst)
    }

    /// Commits the open transaction, if any. With an autocommit
    /// connection every statement is already durable, so only the
    /// counter is reset.
    fn flush(&self) -> Result<()> {
        {
            let inner = lock(&self.inner);
            if !inner.conn.is_autocommit() {
                inner.conn.execute_batch("COMMIT")?;
            }
        }
        self.changes.store(0, SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // The connection itself closes on drop.
        self.flush()
    }

    fn set_ordering_field(&self, field: Option<&str>) {
        let mut inner = lock(&self.inner);
        match field {
            Some(f) => match inner.field_position(f) {
                Some(pos) => {
                    let canonical = inner.fields[pos].clone();
                    inner.ordering_field = Some(canonical);
                }
                None => {
                    log::warn!("unknown ordering field '{f}' ignored");
                    inner.ordering_field = None;
                }
            },
            None => inner.ordering_field = None,
        }
    }

    fn ordering_field(&self) -> Option<String> {
        lock(&self.inner).ordering_field.clone()
    }

    fn set_order_ascending(&self, ascending: bool) {
        lock(&self.inner).ascending = ascending;
    }

    fn order_ascending(&self) -> bool {
        lock(&self.inner).ascending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn people() -> SqlDataSource {
        let conn = Connection::open_in_memory().unwrap();
        let schema = Schema::from_parts(
            &["name", "age", "active"],
            &[ValueType::Str, ValueType::Int, ValueType::Bool],
        )
        .unwrap();
        let ds = SqlDataSource::create_on(conn, "people", &schema).unwrap();
        ds.set_auto_flush_threshold(-1);
        ds
    }

    #[test]
    fn test_create_and_introspect() {
        let ds = people();
        assert_eq!(ds.name(), "people");
        assert_eq!(ds.fields(), vec!["NAME", "AGE", "ACTIVE"]);
        assert_eq!(
            ds.types(),
            vec![ValueType::Str, ValueType::Int, ValueType::Bool]
        );
        assert_eq!(ds.field_index("age"), Some(1));
        assert_eq!(ds.field_index("zzz"), None);
    }

    #[test]
    fn test_open_missing_table_fails() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            SqlDataSource::from_connection(conn, "nope"),
            Err(RowDbError::Schema(_))
        ));
    }

    #[test]
    fn test_append_query_round_trip() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();
        ds.append(vec!["Bob".into(), Value::Int(25), Value::Bool(false)])
            .unwrap();

        assert_eq!(ds.size().unwrap(), 2);
        let rows = ds.query("NAME", &"Ann".into()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_int("AGE").unwrap(), 30);
        assert!(rows[0].as_bool("ACTIVE").unwrap());
    }

    #[test]
    fn test_append_rejects_mistyped_values() {
        let ds = people();
        assert!(matches!(
            ds.append(vec!["Ann".into(), "thirty".into(), Value::Bool(true)]),
            Err(RowDbError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ds.append(vec!["Ann".into(), Value::Int(30)]),
            Err(RowDbError::Schema(_))
        ));
        // Null is assignable to any column.
        ds.append(vec!["Ann".into(), Value::Null, Value::Bool(true)])
            .unwrap();
        assert_eq!(ds.size().unwrap(), 1);
    }

    #[test]
    fn test_result_rows_are_read_only() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();
        let row = ds.get_first("NAME", &"Ann".into()).unwrap().unwrap();
        assert!(matches!(
            row.set_named("AGE", Value::Int(31)),
            Err(RowDbError::Unsupported(_))
        ));
        assert!(matches!(row.delete(), Err(RowDbError::Unsupported(_))));
    }

    #[test]
    fn test_set_and_delete() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();
        ds.append(vec!["Ann".into(), Value::Int(40), Value::Bool(true)])
            .unwrap();

        let changed = ds
            .set("NAME", &"Ann".into(), "ACTIVE", &Value::Bool(false))
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(
            ds.lookup("NAME", &"Ann".into(), "ACTIVE").unwrap(),
            Some(Value::Bool(false))
        );

        assert_eq!(ds.delete("NAME", &"Ann".into()).unwrap(), 2);
        assert_eq!(ds.size().unwrap(), 0);
    }

    #[test]
    fn test_positional_variants_unsupported() {
        let ds = people();
        assert!(matches!(
            ds.set_first("NAME", &"Ann".into(), "AGE", &Value::Int(1)),
            Err(RowDbError::Unsupported(_))
        ));
        assert!(matches!(
            ds.delete_first("NAME", &"Ann".into()),
            Err(RowDbError::Unsupported(_))
        ));
    }

    #[test]
    fn test_null_matching() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Null, Value::Bool(true)])
            .unwrap();
        ds.append(vec!["Bob".into(), Value::Int(25), Value::Bool(true)])
            .unwrap();

        let rows = ds.query("AGE", &Value::Null).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_str("NAME").unwrap(), "Ann");
        assert_eq!(rows[0].get_named("AGE").unwrap(), Value::Null);
    }

    #[test]
    fn test_ordering_applied_to_reads() {
        let ds = people();
        ds.append(vec!["Bob".into(), Value::Int(25), Value::Bool(true)])
            .unwrap();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();

        ds.set_ordering_field(Some("age"));
        let rows = ds.get_all().unwrap();
        assert_eq!(rows[0].as_int("AGE").unwrap(), 25);

        ds.set_order_ascending(false);
        let rows = ds.get_all().unwrap();
        assert_eq!(rows[0].as_int("AGE").unwrap(), 30);

        // Unknown ordering field is dropped, not stored.
        ds.set_ordering_field(Some("zzz"));
        assert_eq!(ds.ordering_field(), None);
    }

    #[test]
    fn test_quoting_defeats_hostile_values() {
        let ds = people();
        let hostile = "x'; DROP TABLE people; --";
        ds.append(vec![hostile.into(), Value::Int(1), Value::Bool(false)])
            .unwrap();
        assert_eq!(ds.size().unwrap(), 1);
        assert_eq!(
            ds.lookup("NAME", &hostile.into(), "AGE").unwrap(),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_add_and_delete_field() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();

        ds.add_field("score", ValueType::Double).unwrap();
        assert_eq!(ds.field_index("SCORE"), Some(3));
        assert_eq!(
            ds.lookup("NAME", &"Ann".into(), "SCORE").unwrap(),
            Some(Value::Null)
        );
        assert!(matches!(
            ds.add_field("score", ValueType::Double),
            Err(RowDbError::Schema(_))
        ));

        assert!(ds.delete_field("score").unwrap());
        assert_eq!(ds.field_index("SCORE"), None);
        assert!(!ds.delete_field("score").unwrap());
    }

    #[test]
    fn test_transactions() {
        let ds = people();
        ds.begin_transaction().unwrap();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();
        ds.rollback_transaction().unwrap();
        assert_eq!(ds.size().unwrap(), 0);

        ds.begin_transaction().unwrap();
        ds.append(vec!["Bob".into(), Value::Int(25), Value::Bool(true)])
            .unwrap();
        ds.flush().unwrap();
        assert_eq!(ds.size().unwrap(), 1);
        assert_eq!(ds.has_changed(), 0);
    }

    #[test]
    fn test_change_counter() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();
        ds.set("NAME", &"Ann".into(), "AGE", &Value::Int(31)).unwrap();
        assert_eq!(ds.has_changed(), 2);
        ds.flush().unwrap();
        assert_eq!(ds.has_changed(), 0);
    }

    #[test]
    fn test_clear() {
        let ds = people();
        ds.append(vec!["Ann".into(), Value::Int(30), Value::Bool(true)])
            .unwrap();
        ds.append(vec!["Bob".into(), Value::Int(25), Value::Bool(true)])
            .unwrap();
        ds.clear().unwrap();
        assert_eq!(ds.size().unwrap(), 0);
        assert_eq!(ds.has_changed(), 4);
    }
}
