use crate::error::{Result, RowDbError};
use crate::value::ValueType;
use serde::Serialize;

/// An ordered sequence of (field name, value type) pairs. Field names
/// are stored upper-cased and resolved case-insensitively; row values
/// are positional and match this order 1:1.
///
/// Duplicate names are not rejected; lookups resolve to the first
/// match, so a duplicated name shadows later columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    fields: Vec<String>,
    types: Vec<ValueType>,
}

impl Schema {
    pub fn new(fields: Vec<String>, types: Vec<ValueType>) -> Result<Schema> {
        if fields.len() != types.len() {
            return Err(RowDbError::Schema(format!(
                "fields.len() != types.len(): {} != {}",
                fields.len(),
                types.len()
            )));
        }
        let mut normalized = Vec::with_capacity(fields.len());
        for field in &fields {
            if field.is_empty() {
                return Err(RowDbError::Schema("empty field name".into()));
            }
            normalized.push(field.to_uppercase());
        }
        Ok(Schema {
            fields: normalized,
            types,
        })
    }

    /// Convenience constructor from borrowed name/type slices.
    pub fn from_parts(fields: &[&str], types: &[ValueType]) -> Result<Schema> {
        Schema::new(
            fields.iter().map(|f| f.to_string()).collect(),
            types.to_vec(),
        )
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn types(&self) -> &[ValueType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-insensitive position of a field, or `None`. Callers probe
    /// optimistically, so an unknown name is not an error here.
    pub fn field_index(&self, field: &str) -> Option<usize> {
        let upper = field.to_uppercase();
        self.fields.iter().position(|f| *f == upper)
    }

    pub fn type_at(&self, index: usize) -> Option<ValueType> {
        self.types.get(index).copied()
    }

    /// Append a column. The new name is normalized like any other.
    pub fn add_field(&mut self, field: &str, ty: ValueType) -> Result<()> {
        if field.is_empty() {
            return Err(RowDbError::Schema("empty field name".into()));
        }
        self.fields.push(field.to_uppercase());
        self.types.push(ty);
        Ok(())
    }

    /// Remove the column at `index`, keeping field/type order intact.
    pub fn remove_field(&mut self, index: usize) {
        self.fields.remove(index);
        self.types.remove(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Schema {
        Schema::from_parts(
            &["name", "age"],
            &[ValueType::Str, ValueType::Int],
        )
        .unwrap()
    }

    #[test]
    fn test_names_normalized_to_upper_case() {
        let schema = sample();
        assert_eq!(schema.fields(), &["NAME".to_string(), "AGE".to_string()]);
    }

    #[test]
    fn test_field_index_case_insensitive() {
        let schema = sample();
        assert_eq!(schema.field_index("name"), Some(0));
        assert_eq!(schema.field_index("Age"), Some(1));
        assert_eq!(schema.field_index("AGE"), Some(1));
    }

    #[test]
    fn test_unknown_field_returns_none() {
        let schema = sample();
        assert_eq!(schema.field_index("ZZZ"), None);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = Schema::from_parts(&["a", "b"], &[ValueType::Int]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_name_first_match_wins() {
        let schema = Schema::from_parts(
            &["x", "x"],
            &[ValueType::Int, ValueType::Str],
        )
        .unwrap();
        assert_eq!(schema.field_index("x"), Some(0));
    }

    #[test]
    fn test_add_and_remove_field() {
        let mut schema = sample();
        schema.add_field("score", ValueType::Double).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.field_index("SCORE"), Some(2));

        schema.remove_field(0);
        assert_eq!(schema.fields(), &["AGE".to_string(), "SCORE".to_string()]);
        assert_eq!(schema.types(), &[ValueType::Int, ValueType::Double]);
    }
}
