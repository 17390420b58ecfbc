//! Row handles returned by data source reads.
//!
//! A row is either *live* (a view into a memory-backed store, where
//! writes go straight to shared state) or a detached *result* (a
//! snapshot of values fetched from an external engine, read-only by
//! construction).

use crate::error::{Result, RowDbError};
use crate::source::memory::{Core, Slot};
use crate::value::Value;
use std::sync::Arc;

pub struct Row(RowInner);

enum RowInner {
    Live {
        core: Arc<Core>,
        slot: Arc<Slot>,
    },
    Result {
        fields: Arc<Vec<String>>,
        data: Vec<Value>,
    },
}

impl Row {
    pub(crate) fn live(core: Arc<Core>, slot: Arc<Slot>) -> Row {
        Row(RowInner::Live { core, slot })
    }

    pub(crate) fn result(fields: Arc<Vec<String>>, data: Vec<Value>) -> Row {
        Row(RowInner::Result { fields, data })
    }

    /// Field names of the owning source, in declaration order.
    pub fn fields(&self) -> Vec<String> {
        match &self.0 {
            RowInner::Live { core, .. } => core.row_fields(),
            RowInner::Result { fields, .. } => fields.as_ref().clone(),
        }
    }

    /// Copies out the full value array.
    pub fn data(&self) -> Result<Vec<Value>> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_data(slot),
            RowInner::Result { data, .. } => Ok(data.clone()),
        }
    }

    /// Replaces the full value array. The values must match the
    /// schema; the write counts as one change.
    pub fn set_data(&self, values: Vec<Value>) -> Result<()> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_set_data(slot, values),
            RowInner::Result { .. } => Err(RowDbError::Unsupported(
                "result rows cannot be modified",
            )),
        }
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_get(slot, index),
            RowInner::Result { data, .. } => data.get(index).cloned().ok_or_else(|| {
                RowDbError::Schema(format!("field index out of bounds: {index}"))
            }),
        }
    }

    pub fn get_named(&self, field: &str) -> Result<Value> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_get_named(slot, field),
            RowInner::Result { fields, data } => {
                let index = result_field_index(fields, field)
                    .ok_or_else(|| RowDbError::UnknownField(field.to_string()))?;
                Ok(data[index].clone())
            }
        }
    }

    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_set(slot, index, &value),
            RowInner::Result { .. } => Err(RowDbError::Unsupported(
                "result rows cannot be modified",
            )),
        }
    }

    pub fn set_named(&self, field: &str, value: Value) -> Result<()> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_set_named(slot, field, &value),
            RowInner::Result { .. } => Err(RowDbError::Unsupported(
                "result rows cannot be modified",
            )),
        }
    }

    /// Removes this row from its source. Returns `false` when the row
    /// was already gone.
    pub fn delete(&self) -> Result<bool> {
        match &self.0 {
            RowInner::Live { core, slot } => core.row_delete(slot),
            RowInner::Result { .. } => Err(RowDbError::Unsupported(
                "result rows cannot be deleted",
            )),
        }
    }

    pub fn is_deleted(&self) -> bool {
        match &self.0 {
            RowInner::Live { slot, .. } => slot.is_deleted(),
            RowInner::Result { .. } => false,
        }
    }

    pub fn as_int(&self, field: &str) -> Result<i32> {
        match self.get_named(field)? {
            Value::Int(v) => Ok(v),
            other => Err(self.mismatch(field, "int", &other)),
        }
    }

    pub fn as_long(&self, field: &str) -> Result<i64> {
        match self.get_named(field)? {
            Value::Long(v) => Ok(v),
            other => Err(self.mismatch(field, "long", &other)),
        }
    }

    pub fn as_float(&self, field: &str) -> Result<f32> {
        match self.get_named(field)? {
            Value::Float(v) => Ok(v),
            other => Err(self.mismatch(field, "float", &other)),
        }
    }

    pub fn as_double(&self, field: &str) -> Result<f64> {
        match self.get_named(field)? {
            Value::Double(v) => Ok(v),
            other => Err(self.mismatch(field, "double", &other)),
        }
    }

    pub fn as_str(&self, field: &str) -> Result<String> {
        match self.get_named(field)? {
            Value::Str(v) => Ok(v),
            other => Err(self.mismatch(field, "string", &other)),
        }
    }

    pub fn as_char(&self, field: &str) -> Result<char> {
        match self.get_named(field)? {
            Value::Char(v) => Ok(v),
            other => Err(self.mismatch(field, "char", &other)),
        }
    }

    pub fn as_byte(&self, field: &str) -> Result<u8> {
        match self.get_named(field)? {
            Value::Byte(v) => Ok(v),
            other => Err(self.mismatch(field, "byte", &other)),
        }
    }

    pub fn as_bool(&self, field: &str) -> Result<bool> {
        match self.get_named(field)? {
            Value::Bool(v) => Ok(v),
            other => Err(self.mismatch(field, "boolean", &other)),
        }
    }

    fn mismatch(&self, field: &str, expected: &str, found: &Value) -> RowDbError {
        RowDbError::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.type_label().to_string(),
        }
    }
}

fn result_field_index(fields: &[String], field: &str) -> Option<usize> {
    fields.iter().position(|f| f.eq_ignore_ascii_case(field))
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data() {
            Ok(data) => f.debug_list().entries(data.iter()).finish(),
            Err(_) => f.write_str("<deleted row>"),
        }
    }
}
