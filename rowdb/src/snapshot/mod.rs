//! Versioned binary snapshots.
//!
//! Layout (all integers big-endian): a one-byte format version, the
//! field count, length-prefixed UTF-8 field names, one type tag per
//! field, the row count, then each row as one tagged value per column.
//! The snapshot carries schema and rows only; a loaded source takes
//! its name from the file it came from.

use crate::error::{Result, RowDbError};
use crate::source::memory::MemoryDataSource;
use crate::source::DataSource;
use crate::value::{Value, ValueType};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const SNAPSHOT_VERSION: u8 = 1;

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_LONG: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_CHAR: u8 = 6;
const TAG_BYTE: u8 = 7;
const TAG_BOOL: u8 = 8;

fn type_tag(ty: ValueType) -> u8 {
    match ty {
        ValueType::Int => TAG_INT,
        ValueType::Long => TAG_LONG,
        ValueType::Float => TAG_FLOAT,
        ValueType::Double => TAG_DOUBLE,
        ValueType::Str => TAG_STR,
        ValueType::Char => TAG_CHAR,
        ValueType::Byte => TAG_BYTE,
        ValueType::Bool => TAG_BOOL,
    }
}

fn tag_type(tag: u8) -> Result<ValueType> {
    match tag {
        TAG_INT => Ok(ValueType::Int),
        TAG_LONG => Ok(ValueType::Long),
        TAG_FLOAT => Ok(ValueType::Float),
        TAG_DOUBLE => Ok(ValueType::Double),
        TAG_STR => Ok(ValueType::Str),
        TAG_CHAR => Ok(ValueType::Char),
        TAG_BYTE => Ok(ValueType::Byte),
        TAG_BOOL => Ok(ValueType::Bool),
        other => Err(RowDbError::Snapshot(format!("unknown type tag: {other}"))),
    }
}

/// Writes a snapshot of the source.
pub fn write_snapshot<W: Write>(source: &dyn DataSource, out: &mut W) -> Result<()> {
    let fields = source.fields();
    let mut types = source.types();
    // The schema may shift between the two reads above; the field
    // list is authoritative for this snapshot.
    types.resize(fields.len(), ValueType::Str);

    out.write_all(&[SNAPSHOT_VERSION])?;
    out.write_all(&(fields.len() as u32).to_be_bytes())?;
    for field in &fields {
        write_str(out, field)?;
    }
    for ty in &types {
        out.write_all(&[type_tag(*ty)])?;
    }

    // Rows deleted or reshaped after the header was written are
    // normalized against the header's field count, so the snapshot
    // always reads back cleanly.
    let rows = source.get_all()?;
    let mut bodies = Vec::with_capacity(rows.len());
    for row in &rows {
        match row.data() {
            Ok(data) => bodies.push(data),
            Err(RowDbError::DeletedRow) => continue,
            Err(e) => return Err(e),
        }
    }
    out.write_all(&(bodies.len() as u32).to_be_bytes())?;
    for data in &bodies {
        for i in 0..fields.len() {
            write_value(out, data.get(i).unwrap_or(&Value::Null))?;
        }
    }
    Ok(())
}

/// Reads a snapshot into a fresh memory-backed source named `name`.
/// A version this build does not understand is fatal, as is any
/// truncation.
pub fn read_snapshot<R: Read>(input: &mut R, name: &str) -> Result<MemoryDataSource> {
    let version = read_u8(input)?;
    if version != SNAPSHOT_VERSION {
        return Err(RowDbError::Snapshot(format!(
            "unsupported snapshot version: {version} (expected {SNAPSHOT_VERSION})"
        )));
    }

    let field_count = read_u32(input)? as usize;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        fields.push(read_str(input)?);
    }
    let mut types = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        types.push(tag_type(read_u8(input)?)?);
    }

    let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let ds = MemoryDataSource::with_fields(name, &field_refs, &types)?;

    let row_count = read_u32(input)? as usize;
    for _ in 0..row_count {
        let mut values = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            values.push(read_value(input)?);
        }
        ds.append_silent(values)?;
    }
    ds.reset_changes();
    Ok(ds)
}

/// Saves a snapshot to a file, creating parent directories as needed.
pub fn save_binary(source: &dyn DataSource, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    write_snapshot(source, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Loads a snapshot file; the source is named after the file stem.
pub fn load_binary(path: &Path) -> Result<MemoryDataSource> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut reader = BufReader::new(File::open(path)?);
    read_snapshot(&mut reader, &name)
}

/// Creates an empty source with the given fields and writes its
/// snapshot to `path`, returning the source.
pub fn create_data_source(
    path: &Path,
    fields: &[&str],
    types: &[ValueType],
) -> Result<MemoryDataSource> {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ds = MemoryDataSource::with_fields(&name, fields, types)?;
    save_binary(&ds, path)?;
    Ok(ds)
}

fn write_str<W: Write>(out: &mut W, s: &str) -> Result<()> {
    out.write_all(&(s.len() as u32).to_be_bytes())?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

fn write_value<W: Write>(out: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.write_all(&[TAG_NULL])?,
        Value::Int(v) => {
            out.write_all(&[TAG_INT])?;
            out.write_all(&v.to_be_bytes())?;
        }
        Value::Long(v) => {
            out.write_all(&[TAG_LONG])?;
            out.write_all(&v.to_be_bytes())?;
        }
        Value::Float(v) => {
            out.write_all(&[TAG_FLOAT])?;
            out.write_all(&v.to_be_bytes())?;
        }
        Value::Double(v) => {
            out.write_all(&[TAG_DOUBLE])?;
            out.write_all(&v.to_be_bytes())?;
        }
        Value::Str(v) => {
            out.write_all(&[TAG_STR])?;
            write_str(out, v)?;
        }
        Value::Char(v) => {
            out.write_all(&[TAG_CHAR])?;
            out.write_all(&(*v as u32).to_be_bytes())?;
        }
        Value::Byte(v) => {
            out.write_all(&[TAG_BYTE, *v])?;
        }
        Value::Bool(v) => {
            out.write_all(&[TAG_BOOL, u8::from(*v)])?;
        }
    }
    Ok(())
}

fn read_value<R: Read>(input: &mut R) -> Result<Value> {
    let tag = read_u8(input)?;
    Ok(match tag {
        TAG_NULL => Value::Null,
        TAG_INT => Value::Int(i32::from_be_bytes(read_array(input)?)),
        TAG_LONG => Value::Long(i64::from_be_bytes(read_array(input)?)),
        TAG_FLOAT => Value::Float(f32::from_be_bytes(read_array(input)?)),
        TAG_DOUBLE => Value::Double(f64::from_be_bytes(read_array(input)?)),
        TAG_STR => Value::Str(read_str(input)?),
        TAG_CHAR => {
            let code = read_u32(input)?;
            let ch = char::from_u32(code).ok_or_else(|| {
                RowDbError::Snapshot(format!("invalid character code: {code}"))
            })?;
            Value::Char(ch)
        }
        TAG_BYTE => Value::Byte(read_u8(input)?),
        TAG_BOOL => Value::Bool(read_u8(input)? != 0),
        other => return Err(RowDbError::Snapshot(format!("unknown value tag: {other}"))),
    })
}

fn read_str<R: Read>(input: &mut R) -> Result<String> {
    let len = read_u32(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| RowDbError::Snapshot("invalid UTF-8 in string".to_string()))
}

fn read_u8<R: Read>(input: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    Ok(u32::from_be_bytes(read_array(input)?))
}

fn read_array<R: Read, const N: usize>(input: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn sample() -> MemoryDataSource {
        let ds = MemoryDataSource::with_fields(
            "mixed",
            &["s", "i", "l", "f", "d", "c", "b", "flag"],
            &[
                ValueType::Str,
                ValueType::Int,
                ValueType::Long,
                ValueType::Float,
                ValueType::Double,
                ValueType::Char,
                ValueType::Byte,
                ValueType::Bool,
            ],
        )
        .unwrap();
        ds.append(vec![
            "héllo".into(),
            Value::Int(-5),
            Value::Long(1 << 40),
            Value::Float(1.5),
            Value::Double(-2.25),
            Value::Char('Ω'),
            Value::Byte(200),
            Value::Bool(true),
        ])
        .unwrap();
        ds.append(vec![
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ])
        .unwrap();
        ds
    }

    #[test]
    fn test_snapshot_round_trip() {
        let ds = sample();
        let mut buf = Vec::new();
        write_snapshot(&ds, &mut buf).unwrap();

        let loaded = read_snapshot(&mut Cursor::new(buf), "mixed").unwrap();
        assert_eq!(loaded.fields(), ds.fields());
        assert_eq!(loaded.types(), ds.types());
        assert_eq!(loaded.size().unwrap(), 2);
        let original = ds.get_all().unwrap();
        let restored = loaded.get_all().unwrap();
        assert_eq!(restored[0].data().unwrap(), original[0].data().unwrap());
        assert_eq!(restored[1].data().unwrap(), original[1].data().unwrap());
        assert_eq!(loaded.has_changed(), 0);
    }

    #[test]
    fn test_unknown_version_is_fatal() {
        let ds = sample();
        let mut buf = Vec::new();
        write_snapshot(&ds, &mut buf).unwrap();
        buf[0] = 99;

        let result = read_snapshot(&mut Cursor::new(buf), "mixed");
        assert!(matches!(result, Err(RowDbError::Snapshot(_))));
    }

    #[test]
    fn test_truncated_snapshot_is_fatal() {
        let ds = sample();
        let mut buf = Vec::new();
        write_snapshot(&ds, &mut buf).unwrap();
        buf.truncate(buf.len() - 3);

        let result = read_snapshot(&mut Cursor::new(buf), "mixed");
        assert!(matches!(result, Err(RowDbError::Io(_))));
    }

    #[test]
    fn test_snapshot_stays_readable_under_field_changes() {
        let ds = MemoryDataSource::with_fields(
            "t",
            &["name", "extra"],
            &[ValueType::Str, ValueType::Str],
        )
        .unwrap();
        ds.set_auto_flush_threshold(-1);
        ds.append(vec!["Ann".into(), "x".into()]).unwrap();

        let toggler = {
            let ds = ds.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    ds.delete_field("extra").unwrap();
                    ds.add_field("extra", ValueType::Str).unwrap();
                }
            })
        };
        // Whatever interleaving the writer observes, the emitted
        // snapshot must parse: row arity always matches the header.
        for _ in 0..200 {
            let mut buf = Vec::new();
            write_snapshot(&ds, &mut buf).unwrap();
            read_snapshot(&mut Cursor::new(buf), "t").unwrap();
        }
        toggler.join().unwrap();
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("mixed.db");

        save_binary(&sample(), &path).unwrap();
        let loaded = load_binary(&path).unwrap();
        assert_eq!(loaded.name(), "mixed");
        assert_eq!(loaded.size().unwrap(), 2);
    }

    #[test]
    fn test_create_data_source_writes_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");

        let ds = create_data_source(&path, &["id", "name"], &[ValueType::Long, ValueType::Str])
            .unwrap();
        assert_eq!(ds.name(), "fresh");
        assert_eq!(ds.size().unwrap(), 0);

        let loaded = load_binary(&path).unwrap();
        assert_eq!(loaded.fields(), vec!["ID", "NAME"]);
        assert_eq!(loaded.size().unwrap(), 0);
    }
}
