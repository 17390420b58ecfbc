use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// The closed set of column types a data source can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int,
    Long,
    Float,
    Double,
    #[serde(rename = "string")]
    Str,
    Char,
    Byte,
    #[serde(rename = "boolean")]
    Bool,
}

impl ValueType {
    /// The name used in the delimited text format's type line.
    /// `int`, `long`, `double`, `string` and `boolean` are the core
    /// vocabulary; the remaining names are emitted so that dumps of
    /// float/char/byte columns stay readable.
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Str => "string",
            ValueType::Char => "char",
            ValueType::Byte => "byte",
            ValueType::Bool => "boolean",
        }
    }

    /// Resolve a type name from the delimited text format.
    pub fn from_type_name(name: &str) -> Option<ValueType> {
        match name {
            "int" => Some(ValueType::Int),
            "long" => Some(ValueType::Long),
            "float" => Some(ValueType::Float),
            "double" => Some(ValueType::Double),
            "string" => Some(ValueType::Str),
            "char" => Some(ValueType::Char),
            "byte" => Some(ValueType::Byte),
            "boolean" => Some(ValueType::Bool),
            _ => None,
        }
    }

    /// The value a freshly added column is filled with. Only strings
    /// have a usable default instance; every other type starts absent.
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Str => Value::Str(String::new()),
            _ => Value::Null,
        }
    }

    /// Parse a text token into a value of this type.
    pub fn parse_value(&self, text: &str) -> std::result::Result<Value, String> {
        match self {
            ValueType::Int => text
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| format!("number format error: '{text}'")),
            ValueType::Long => text
                .parse::<i64>()
                .map(Value::Long)
                .map_err(|_| format!("number format error: '{text}'")),
            ValueType::Float => text
                .parse::<f32>()
                .map(Value::Float)
                .map_err(|_| format!("number format error: '{text}'")),
            ValueType::Double => text
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| format!("number format error: '{text}'")),
            ValueType::Str => Ok(Value::Str(text.to_string())),
            ValueType::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(format!("not a single character: '{text}'")),
                }
            }
            ValueType::Byte => text
                .parse::<u8>()
                .map(Value::Byte)
                .map_err(|_| format!("number format error: '{text}'")),
            ValueType::Bool => text
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| format!("not a boolean: '{text}'")),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One cell of a row. Equality is variant-strict (`Int(1) != Long(1)`)
/// and null-safe (`Null == Null`), matching the query semantics of the
/// data source contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Char(char),
    Byte(u8),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The declared type this value belongs to, or `None` for null.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueType::Int),
            Value::Long(_) => Some(ValueType::Long),
            Value::Float(_) => Some(ValueType::Float),
            Value::Double(_) => Some(ValueType::Double),
            Value::Str(_) => Some(ValueType::Str),
            Value::Char(_) => Some(ValueType::Char),
            Value::Byte(_) => Some(ValueType::Byte),
            Value::Bool(_) => Some(ValueType::Bool),
        }
    }

    /// Whether this value may be stored in a column of the given type.
    /// Null is assignable to every column.
    pub fn matches_type(&self, ty: ValueType) -> bool {
        match self.value_type() {
            None => true,
            Some(t) => t == ty,
        }
    }

    /// A short label for error messages.
    pub fn type_label(&self) -> &'static str {
        match self.value_type() {
            None => "null",
            Some(t) => t.type_name(),
        }
    }

    /// Ordering between values of the same variant; `Null` sorts before
    /// everything. Values of different variants do not compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).or(Some(Ordering::Equal)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b).or(Some(Ordering::Equal)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::Byte(a), Value::Byte(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Plain text rendering used by the text formats. Null renders as
    /// an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Char(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_equality_is_variant_strict() {
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Long(1));
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn test_compare_like_variants() {
        assert_eq!(
            Value::Int(1).compare(&Value::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Str("b".into()).compare(&Value::Str("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(1).compare(&Value::Long(2)), None);
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(Value::Null.compare(&Value::Int(-5)), Some(Ordering::Less));
        assert_eq!(
            Value::Int(-5).compare(&Value::Null),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_type_name_round_trip() {
        for ty in [
            ValueType::Int,
            ValueType::Long,
            ValueType::Float,
            ValueType::Double,
            ValueType::Str,
            ValueType::Char,
            ValueType::Byte,
            ValueType::Bool,
        ] {
            assert_eq!(ValueType::from_type_name(ty.type_name()), Some(ty));
        }
        assert_eq!(ValueType::from_type_name("varchar"), None);
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(ValueType::Int.parse_value("42"), Ok(Value::Int(42)));
        assert_eq!(
            ValueType::Bool.parse_value("true"),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            ValueType::Str.parse_value("hello"),
            Ok(Value::Str("hello".into()))
        );
        assert!(ValueType::Int.parse_value("forty-two").is_err());
    }

    #[test]
    fn test_default_value() {
        assert_eq!(ValueType::Str.default_value(), Value::Str(String::new()));
        assert_eq!(ValueType::Int.default_value(), Value::Null);
    }

    #[test]
    fn test_null_is_assignable_everywhere() {
        assert!(Value::Null.matches_type(ValueType::Int));
        assert!(Value::Int(1).matches_type(ValueType::Int));
        assert!(!Value::Int(1).matches_type(ValueType::Long));
    }

    #[test]
    fn test_json_rendering() {
        // Values serialize as their bare JSON counterparts, type names
        // as lower-case strings.
        let row = vec![
            Value::Str("Ann".into()),
            Value::Int(30),
            Value::Bool(true),
            Value::Null,
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"["Ann",30,true,null]"#
        );
        assert_eq!(
            serde_json::to_string(&ValueType::Str).unwrap(),
            r#""string""#
        );
    }
}
