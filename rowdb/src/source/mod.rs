pub mod memory;
pub mod sql;

use crate::error::Result;
use crate::row::Row;
use crate::value::{Value, ValueType};

/// The uniform contract over wildly different backing stores: an
/// in-memory list, a flat file loaded into memory, or a relational
/// table. Queries return snapshot lists of [`Row`] handles; mutations
/// feed a change counter that may trigger an implicit flush.
///
/// Implementations are thread-safe: the data source is the unit of
/// mutual exclusion and every operation is a blocking call that
/// completes before returning.
pub trait DataSource: Send + Sync {
    /// The name of the data source. May include spaces and special
    /// symbols; backed stores use the table name.
    fn name(&self) -> String;

    /// The available field names, upper-cased. References to fields
    /// elsewhere in the contract are case-insensitive.
    fn fields(&self) -> Vec<String>;

    /// The declared field types, parallel to [`fields`](Self::fields).
    fn types(&self) -> Vec<ValueType>;

    /// Position of a field, or `None` if unavailable. Never fails:
    /// callers frequently probe optimistically.
    fn field_index(&self, field: &str) -> Option<usize>;

    /// Adds a field to the table. Existing rows are initialized with
    /// the type's default value. Counts as a change.
    fn add_field(&self, field: &str, ty: ValueType) -> Result<()>;

    /// Deletes a field, dropping its slot from every row. Returns
    /// `false` if the field is unknown. Counts as a change.
    fn delete_field(&self, field: &str) -> Result<bool>;

    /// All rows whose `field` equals `value` (null matches null), as a
    /// snapshot taken at the time of the call. Ordered by the
    /// configured ordering field if one is set, else insertion order.
    fn query(&self, field: &str, value: &Value) -> Result<Vec<Row>>;

    /// The first row whose `field` equals `value`, in scan order.
    /// Unlike [`query`](Self::query), the configured ordering is NOT
    /// applied here: "first" means first encountered, not smallest.
    fn get_first(&self, field: &str, value: &Value) -> Result<Option<Row>>;

    /// Snapshot of every row, ordering applied as in [`query`](Self::query).
    fn get_all(&self) -> Result<Vec<Row>>;

    /// The value of `value_field` from the first row whose `key_field`
    /// equals `key`, or `None` if no row matches.
    fn lookup(&self, key_field: &str, key: &Value, value_field: &str) -> Result<Option<Value>>;

    /// Sets `field` to `value` for every row whose `key_field` equals
    /// `key`. Returns the number of rows changed.
    fn set(&self, key_field: &str, key: &Value, field: &str, value: &Value) -> Result<usize>;

    /// Sets `field` to `value` for the first matching row only.
    /// Optional; the SQL adapter reports it as unsupported.
    fn set_first(&self, key_field: &str, key: &Value, field: &str, value: &Value)
        -> Result<usize>;

    /// Sets the key field itself for every matching row.
    fn set_key(&self, key_field: &str, key: &Value, value: &Value) -> Result<usize> {
        self.set(key_field, key, key_field, value)
    }

    /// Sets the key field itself for the first matching row.
    fn set_key_first(&self, key_field: &str, key: &Value, value: &Value) -> Result<usize> {
        self.set_first(key_field, key, key_field, value)
    }

    /// Deletes every row whose `key_field` equals `key`. Returns the
    /// number of deletions made.
    fn delete(&self, key_field: &str, key: &Value) -> Result<usize>;

    /// Deletes the first matching row only. Optional; the SQL adapter
    /// reports it as unsupported.
    fn delete_first(&self, key_field: &str, key: &Value) -> Result<usize>;

    /// Appends a row. The data length must equal the schema length and
    /// every non-null value must match its column's declared type.
    fn append(&self, values: Vec<Value>) -> Result<Row>;

    /// Number of rows.
    fn size(&self) -> Result<usize>;

    /// Deletes all rows. Clearing N rows registers exactly N changes.
    fn clear(&self) -> Result<()>;

    /// Marks that a change has occurred. Called by every operation
    /// that mutates structure or row data; may trigger an implicit
    /// flush when the auto-flush threshold is crossed.
    fn changed(&self);

    /// A positive number if changes have been made since loading or
    /// the last flush, else 0. Not necessarily the exact change count.
    fn has_changed(&self) -> i64;

    /// Persists pending changes. For a buffered store this writes the
    /// whole source through its connector; for the SQL adapter it
    /// commits the active transaction. Either way the change counter
    /// afterwards reflects only changes that arrived during the write.
    fn flush(&self) -> Result<()>;

    /// Releases the data source; implies a final flush. Operation
    /// after close is undefined.
    fn close(&self) -> Result<()>;

    /// Field to order query results by, applied at read time only.
    fn set_ordering_field(&self, field: Option<&str>);

    fn ordering_field(&self) -> Option<String>;

    fn set_order_ascending(&self, ascending: bool);

    fn order_ascending(&self) -> bool;
}
