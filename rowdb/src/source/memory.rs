use crate::connector::Connector;
use crate::error::{Result, RowDbError};
use crate::row::Row;
use crate::schema::Schema;
use crate::source::DataSource;
use crate::value::{Value, ValueType};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering::SeqCst};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of accumulated changes that triggers an implicit flush when
/// no explicit threshold has been configured.
pub const DEFAULT_AUTO_FLUSH_THRESHOLD: i64 = 300;

/// The default, list-backed [`DataSource`]: rows are buffered in
/// memory and persisted as a whole through an optional [`Connector`].
///
/// Handles are cheap to clone and share one underlying store; the
/// store is the unit of mutual exclusion, so concurrent use from
/// multiple threads serializes on its internal lock.
#[derive(Clone)]
pub struct MemoryDataSource {
    core: Arc<Core>,
}

/// Shared state behind every handle and every live [`Row`].
pub(crate) struct Core {
    state: Mutex<State>,
    changes: AtomicI64,
    auto_flush: AtomicI64,
    // Separate lock so a flush (which re-enters the store through the
    // connector) never holds the state lock.
    connector: Mutex<Option<Box<dyn Connector>>>,
}

struct State {
    name: String,
    schema: Schema,
    rows: Vec<Arc<Slot>>,
    ordering_field: Option<String>,
    ascending: bool,
}

/// Storage for one row. The value vector is only touched while the
/// owning store's state lock is held; the liveness flag outlives the
/// row's membership in the store.
pub(crate) struct Slot {
    data: Mutex<Vec<Value>>,
    deleted: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unknown_field(field: &str) -> RowDbError {
    RowDbError::UnknownField(field.to_string())
}

/// Validates a full value array against the declared schema.
fn validate_row(schema: &Schema, values: &[Value]) -> Result<()> {
    if values.len() != schema.len() {
        return Err(RowDbError::Schema(format!(
            "illegal data length: {} (schema has {} fields)",
            values.len(),
            schema.len()
        )));
    }
    for (i, value) in values.iter().enumerate() {
        let declared = schema.types()[i];
        if !value.matches_type(declared) {
            return Err(RowDbError::TypeMismatch {
                field: schema.fields()[i].clone(),
                expected: declared.type_name().to_string(),
                found: value.type_label().to_string(),
            });
        }
    }
    Ok(())
}

/// Writes one cell, enforcing the stored-value type rule: the first
/// non-null value written to a slot pins the type enforced there
/// afterwards. Writing null over a pinned slot is rejected rather
/// than resetting the pin.
fn set_slot_value(schema: &Schema, slot: &Slot, index: usize, value: &Value) -> Result<()> {
    if index >= schema.len() {
        return Err(RowDbError::Schema(format!(
            "field index out of bounds: {index} (schema has {} fields)",
            schema.len()
        )));
    }
    let mut data = lock(&slot.data);
    let existing = &data[index];
    if !existing.is_null() && value.value_type() != existing.value_type() {
        return Err(RowDbError::TypeMismatch {
            field: schema.fields()[index].clone(),
            expected: existing.type_label().to_string(),
            found: value.type_label().to_string(),
        });
    }
    data[index] = value.clone();
    Ok(())
}

fn order_slots(slots: &mut [Arc<Slot>], index: usize, ascending: bool) {
    slots.sort_by(|a, b| {
        let va = lock(&a.data)[index].clone();
        let vb = lock(&b.data)[index].clone();
        let ord = va.compare(&vb).unwrap_or(std::cmp::Ordering::Equal);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
}

impl Slot {
    fn new(values: Vec<Value>) -> Arc<Slot> {
        Arc::new(Slot {
            data: Mutex::new(values),
            deleted: AtomicBool::new(false),
        })
    }

    fn matches(&self, index: usize, value: &Value) -> bool {
        lock(&self.data)[index] == *value
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(SeqCst)
    }
}

impl Core {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn name(&self) -> String {
        self.lock_state().name.clone()
    }

    /// Registers `n` changes and runs the auto-flush check. Called
    /// only after the state lock has been released.
    fn record_changes(self: &Arc<Self>, n: i64) {
        if n == 0 {
            return;
        }
        let count = self.changes.fetch_add(n, SeqCst) + n;
        let threshold = self.auto_flush.load(SeqCst);
        if threshold >= 0 && count >= threshold {
            if let Err(e) = Core::flush(self) {
                log::error!(
                    "auto-flush failed for data source '{}': {e}",
                    self.name()
                );
            }
        }
    }

    /// Saves the whole store through the bound connector. The counter
    /// is decremented by the pre-flush count only, so changes that
    /// land while the connector is writing are preserved.
    fn flush(core: &Arc<Core>) -> Result<()> {
        let connector = lock(&core.connector);
        let pending = core.changes.load(SeqCst);
        if pending == 0 {
            return Ok(());
        }
        let name = core.name();
        let Some(connector) = connector.as_ref() else {
            log::warn!("no connector set for data source '{name}'");
            return Err(RowDbError::NoConnector(name));
        };
        log::debug!("flushing data source '{name}': {pending} pending changes");
        let handle = MemoryDataSource {
            core: Arc::clone(core),
        };
        if let Err(e) = connector.save(&handle) {
            log::error!("could not flush data source '{name}': {e}");
            return Err(e);
        }
        core.changes.fetch_sub(pending, SeqCst);
        Ok(())
    }

    // ── Row delegation ───────────────────────────────────────────────
    // A row's state is logically part of the store's state, so every
    // row operation takes the store's lock.

    pub(crate) fn row_fields(&self) -> Vec<String> {
        self.lock_state().schema.fields().to_vec()
    }

    pub(crate) fn row_data(&self, slot: &Slot) -> Result<Vec<Value>> {
        let _state = self.lock_state();
        if slot.is_deleted() {
            return Err(RowDbError::DeletedRow);
        }
        Ok(lock(&slot.data).clone())
    }

    pub(crate) fn row_set_data(self: &Arc<Self>, slot: &Slot, values: Vec<Value>) -> Result<()> {
        {
            let state = self.lock_state();
            if slot.is_deleted() {
                return Err(RowDbError::DeletedRow);
            }
            validate_row(&state.schema, &values)?;
            *lock(&slot.data) = values;
        }
        self.record_changes(1);
        Ok(())
    }

    pub(crate) fn row_get(&self, slot: &Slot, index: usize) -> Result<Value> {
        let state = self.lock_state();
        if slot.is_deleted() {
            return Err(RowDbError::DeletedRow);
        }
        if index >= state.schema.len() {
            return Err(RowDbError::Schema(format!(
                "field index out of bounds: {index}"
            )));
        }
        Ok(lock(&slot.data)[index].clone())
    }

    pub(crate) fn row_get_named(&self, slot: &Slot, field: &str) -> Result<Value> {
        let state = self.lock_state();
        if slot.is_deleted() {
            return Err(RowDbError::DeletedRow);
        }
        let index = state.schema.field_index(field).ok_or_else(|| unknown_field(field))?;
        Ok(lock(&slot.data)[index].clone())
    }

    pub(crate) fn row_set(self: &Arc<Self>, slot: &Slot, index: usize, value: &Value) -> Result<()> {
        {
            let state = self.lock_state();
            if slot.is_deleted() {
                return Err(RowDbError::DeletedRow);
            }
            set_slot_value(&state.schema, slot, index, value)?;
        }
        self.record_changes(1);
        Ok(())
    }

    pub(crate) fn row_set_named(
        self: &Arc<Self>,
        slot: &Slot,
        field: &str,
        value: &Value,
    ) -> Result<()> {
        // Resolve and write under one lock acquisition: a schema
        // change in between could shift the resolved index onto a
        // different column.
        {
            let state = self.lock_state();
            if slot.is_deleted() {
                return Err(RowDbError::DeletedRow);
            }
            let index = state
                .schema
                .field_index(field)
                .ok_or_else(|| unknown_field(field))?;
            set_slot_value(&state.schema, slot, index, value)?;
        }
        self.record_changes(1);
        Ok(())
    }

    pub(crate) fn row_delete(self: &Arc<Self>, slot: &Arc<Slot>) -> Result<bool> {
        let removed = {
            let mut state = self.lock_state();
            match state.rows.iter().position(|s| Arc::ptr_eq(s, slot)) {
                Some(pos) => {
                    state.rows.remove(pos);
                    slot.deleted.store(true, SeqCst);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.record_changes(1);
        }
        Ok(removed)
    }
}

impl MemoryDataSource {
    pub fn new(name: &str, schema: Schema) -> MemoryDataSource {
        MemoryDataSource {
            core: Arc::new(Core {
                state: Mutex::new(State {
                    name: name.to_string(),
                    schema,
                    rows: Vec::new(),
                    ordering_field: None,
                    ascending: true,
                }),
                changes: AtomicI64::new(0),
                auto_flush: AtomicI64::new(DEFAULT_AUTO_FLUSH_THRESHOLD),
                connector: Mutex::new(None),
            }),
        }
    }

    pub fn with_fields(
        name: &str,
        fields: &[&str],
        types: &[ValueType],
    ) -> Result<MemoryDataSource> {
        Ok(MemoryDataSource::new(name, Schema::from_parts(fields, types)?))
    }

    /// Replaces the schema, discarding all rows. Existing row handles
    /// become deleted. Does not register a change.
    pub fn set_structure(&self, schema: Schema) {
        let mut state = self.core.lock_state();
        for slot in &state.rows {
            slot.deleted.store(true, SeqCst);
        }
        state.rows.clear();
        state.schema = schema;
    }

    pub fn set_name(&self, name: &str) {
        self.core.lock_state().name = name.to_string();
    }

    /// Binds the connector invoked by [`flush`](DataSource::flush).
    pub fn set_connector(&self, connector: Box<dyn Connector>) {
        *lock(&self.core.connector) = Some(connector);
    }

    pub fn has_connector(&self) -> bool {
        lock(&self.core.connector).is_some()
    }

    pub fn auto_flush_threshold(&self) -> i64 {
        self.core.auto_flush.load(SeqCst)
    }

    /// Number of changes that triggers an implicit flush. Negative
    /// disables auto-flush entirely.
    pub fn set_auto_flush_threshold(&self, threshold: i64) {
        self.core.auto_flush.store(threshold, SeqCst);
    }

    /// Reorders the underlying storage (not just query results) by a
    /// field. Returns `false` if the field is unknown. Does not count
    /// as a change: the row set is unaffected.
    pub fn sort(&self, field: &str, ascending: bool) -> bool {
        let mut state = self.core.lock_state();
        let Some(index) = state.schema.field_index(field) else {
            return false;
        };
        order_slots(&mut state.rows, index, ascending);
        true
    }

    /// Appends a row without registering a change; load paths restore
    /// persisted rows through this.
    pub(crate) fn append_silent(&self, values: Vec<Value>) -> Result<()> {
        let mut state = self.core.lock_state();
        validate_row(&state.schema, &values)?;
        state.rows.push(Slot::new(values));
        Ok(())
    }

    pub(crate) fn reset_changes(&self) {
        self.core.changes.store(0, SeqCst);
    }

    fn live_row(&self, slot: &Arc<Slot>) -> Row {
        Row::live(Arc::clone(&self.core), Arc::clone(slot))
    }
}

impl DataSource for MemoryDataSource {
    fn name(&self) -> String {
        self.core.name()
    }

    fn fields(&self) -> Vec<String> {
        self.core.lock_state().schema.fields().to_vec()
    }

    fn types(&self) -> Vec<ValueType> {
        self.core.lock_state().schema.types().to_vec()
    }

    fn field_index(&self, field: &str) -> Option<usize> {
        self.core.lock_state().schema.field_index(field)
    }

    fn add_field(&self, field: &str, ty: ValueType) -> Result<()> {
        {
            let mut state = self.core.lock_state();
            state.schema.add_field(field, ty)?;
            let default = ty.default_value();
            for slot in &state.rows {
                lock(&slot.data).push(default.clone());
            }
        }
        self.core.record_changes(1);
        Ok(())
    }

    fn delete_field(&self, field: &str) -> Result<bool> {
        {
            let mut state = self.core.lock_state();
            let Some(index) = state.schema.field_index(field) else {
                return Ok(false);
            };
            state.schema.remove_field(index);
            for slot in &state.rows {
                lock(&slot.data).remove(index);
            }
        }
        self.core.record_changes(1);
        Ok(true)
    }

    fn query(&self, field: &str, value: &Value) -> Result<Vec<Row>> {
        let state = self.core.lock_state();
        let index = state.schema.field_index(field).ok_or_else(|| unknown_field(field))?;
        let mut matched: Vec<Arc<Slot>> = state
            .rows
            .iter()
            .filter(|slot| slot.matches(index, value))
            .cloned()
            .collect();
        if let Some(ordering) = &state.ordering_field {
            if let Some(order_index) = state.schema.field_index(ordering) {
                order_slots(&mut matched, order_index, state.ascending);
            }
        }
        Ok(matched.iter().map(|slot| self.live_row(slot)).collect())
    }

    fn get_first(&self, field: &str, value: &Value) -> Result<Option<Row>> {
        let state = self.core.lock_state();
        let index = state.schema.field_index(field).ok_or_else(|| unknown_field(field))?;
        Ok(state
            .rows
            .iter()
            .find(|slot| slot.matches(index, value))
            .map(|slot| self.live_row(slot)))
    }

    fn get_all(&self) -> Result<Vec<Row>> {
        let state = self.core.lock_state();
        let mut slots: Vec<Arc<Slot>> = state.rows.clone();
        if let Some(ordering) = &state.ordering_field {
            if let Some(order_index) = state.schema.field_index(ordering) {
                order_slots(&mut slots, order_index, state.ascending);
            }
        }
        Ok(slots.iter().map(|slot| self.live_row(slot)).collect())
    }

    fn lookup(&self, key_field: &str, key: &Value, value_field: &str) -> Result<Option<Value>> {
        let state = self.core.lock_state();
        let key_index = state
            .schema
            .field_index(key_field)
            .ok_or_else(|| unknown_field(key_field))?;
        let value_index = state
            .schema
            .field_index(value_field)
            .ok_or_else(|| unknown_field(value_field))?;
        Ok(state
            .rows
            .iter()
            .find(|slot| slot.matches(key_index, key))
            .map(|slot| lock(&slot.data)[value_index].clone()))
    }

    fn set(&self, key_field: &str, key: &Value, field: &str, value: &Value) -> Result<usize> {
        let mut changed = 0;
        let mut failure = None;
        {
            let state = self.core.lock_state();
            let key_index = state
                .schema
                .field_index(key_field)
                .ok_or_else(|| unknown_field(key_field))?;
            let field_index = state
                .schema
                .field_index(field)
                .ok_or_else(|| unknown_field(field))?;
            for slot in &state.rows {
                if slot.matches(key_index, key) {
                    match set_slot_value(&state.schema, slot, field_index, value) {
                        Ok(()) => changed += 1,
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
        }
        self.core.record_changes(changed as i64);
        match failure {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }

    fn set_first(
        &self,
        key_field: &str,
        key: &Value,
        field: &str,
        value: &Value,
    ) -> Result<usize> {
        let result = {
            let state = self.core.lock_state();
            let key_index = state
                .schema
                .field_index(key_field)
                .ok_or_else(|| unknown_field(key_field))?;
            let field_index = state
                .schema
                .field_index(field)
                .ok_or_else(|| unknown_field(field))?;
            match state.rows.iter().find(|slot| slot.matches(key_index, key)) {
                Some(slot) => set_slot_value(&state.schema, slot, field_index, value).map(|_| 1),
                None => Ok(0),
            }
        };
        if let Ok(n) = &result {
            self.core.record_changes(*n as i64);
        }
        result
    }

    fn delete(&self, key_field: &str, key: &Value) -> Result<usize> {
        let deleted = {
            let mut state = self.core.lock_state();
            let key_index = state
                .schema
                .field_index(key_field)
                .ok_or_else(|| unknown_field(key_field))?;
            let mut deleted = 0;
            state.rows.retain(|slot| {
                if slot.matches(key_index, key) {
                    slot.deleted.store(true, SeqCst);
                    deleted += 1;
                    false
                } else {
                    true
                }
            });
            deleted
        };
        self.core.record_changes(deleted as i64);
        Ok(deleted)
    }

    fn delete_first(&self, key_field: &str, key: &Value) -> Result<usize> {
        let deleted = {
            let mut state = self.core.lock_state();
            let key_index = state
                .schema
                .field_index(key_field)
                .ok_or_else(|| unknown_field(key_field))?;
            match state.rows.iter().position(|slot| slot.matches(key_index, key)) {
                Some(pos) => {
                    let slot = state.rows.remove(pos);
                    slot.deleted.store(true, SeqCst);
                    1
                }
                None => 0,
            }
        };
        self.core.record_changes(deleted as i64);
        Ok(deleted)
    }

    fn append(&self, values: Vec<Value>) -> Result<Row> {
        let row = {
            let mut state = self.core.lock_state();
            validate_row(&state.schema, &values)?;
            let slot = Slot::new(values);
            state.rows.push(Arc::clone(&slot));
            self.live_row(&slot)
        };
        self.core.record_changes(1);
        Ok(row)
    }

    fn size(&self) -> Result<usize> {
        Ok(self.core.lock_state().rows.len())
    }

    fn clear(&self) -> Result<()> {
        let cleared = {
            let mut state = self.core.lock_state();
            for slot in &state.rows {
                slot.deleted.store(true, SeqCst);
            }
            let n = state.rows.len();
            state.rows.clear();
            n
        };
        self.core.record_changes(cleared as i64);
        Ok(())
    }

    fn changed(&self) {
        self.core.record_changes(1);
    }

    fn has_changed(&self) -> i64 {
        self.core.changes.load(SeqCst)
    }

    fn flush(&self) -> Result<()> {
        Core::flush(&self.core)
    }

    fn close(&self) -> Result<()> {
        // A final flush, except that a store that never had a
        // connector closes silently.
        match Core::flush(&self.core) {
            Err(RowDbError::NoConnector(_)) => Ok(()),
            other => other,
        }
    }

    fn set_ordering_field(&self, field: Option<&str>) {
        self.core.lock_state().ordering_field = field.map(|f| f.to_string());
    }

    fn ordering_field(&self) -> Option<String> {
        self.core.lock_state().ordering_field.clone()
    }

    fn set_order_ascending(&self, ascending: bool) {
        self.core.lock_state().ascending = ascending;
    }

    fn order_ascending(&self) -> bool {
        self.core.lock_state().ascending
    }
}
