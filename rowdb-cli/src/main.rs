use clap::{Parser, Subcommand, ValueEnum};
use rowdb::{
    snapshot, text, DataSource, MemoryDataSource, SqlDataSource, Value, ValueType,
};
use std::path::{Path, PathBuf};
use std::process;

/// rowdb CLI: inspect and edit rowdb data source files
#[derive(Parser)]
#[command(name = "rowdb", version, about)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table")]
    output: OutputFormat,

    /// Force the file format instead of guessing from the extension
    #[arg(long)]
    format: Option<FileFormat>,

    /// Table name, for SQLite-backed files
    #[arg(long)]
    table: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum FileFormat {
    Binary,
    Delimited,
    Csv,
    Sqlite,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty data source file
    Create {
        /// Target file
        file: PathBuf,
        /// Field definitions (e.g. --field NAME:string --field AGE:int)
        #[arg(long = "field", value_parser = parse_field_def, required = true)]
        fields: Vec<(String, ValueType)>,
    },

    /// Show field names and types
    Schema {
        /// Data source file
        file: PathBuf,
    },

    /// Print every row
    List {
        /// Data source file
        file: PathBuf,
        /// Order rows by this field
        #[arg(long)]
        order_by: Option<String>,
        /// Order descending instead of ascending
        #[arg(long)]
        descending: bool,
    },

    /// Print rows matching FIELD=VALUE
    Query {
        /// Data source file
        file: PathBuf,
        /// Match condition (e.g. NAME=Ann); use FIELD=null to match null
        #[arg(value_parser = parse_key_value)]
        condition: (String, String),
    },

    /// Print one value: the VALUE_FIELD of the first row matching FIELD=VALUE
    Lookup {
        /// Data source file
        file: PathBuf,
        /// Match condition (e.g. NAME=Ann)
        #[arg(value_parser = parse_key_value)]
        condition: (String, String),
        /// Field whose value to print
        value_field: String,
    },

    /// Append a row
    Append {
        /// Data source file
        file: PathBuf,
        /// Field values (e.g. --value NAME=Ann --value AGE=30); omitted
        /// fields are null
        #[arg(long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
    },

    /// Update matching rows: sets FIELD=VALUE on rows matching KEY_FIELD=KEY
    Set {
        /// Data source file
        file: PathBuf,
        /// Match condition (e.g. NAME=Ann)
        #[arg(value_parser = parse_key_value)]
        condition: (String, String),
        /// Assignment (e.g. AGE=31)
        #[arg(value_parser = parse_key_value)]
        assignment: (String, String),
    },

    /// Delete matching rows
    Delete {
        /// Data source file
        file: PathBuf,
        /// Match condition (e.g. NAME=Ann)
        #[arg(value_parser = parse_key_value)]
        condition: (String, String),
        /// Delete only the first match
        #[arg(long)]
        first: bool,
    },

    /// Add a field to the schema
    AddField {
        /// Data source file
        file: PathBuf,
        /// Field definition (e.g. SCORE:double)
        #[arg(value_parser = parse_field_def)]
        field: (String, ValueType),
    },

    /// Remove a field from the schema
    DeleteField {
        /// Data source file
        file: PathBuf,
        /// Field name
        field: String,
    },

    /// Rewrite a data source in another format
    Convert {
        /// Input file
        input: PathBuf,
        /// Output file (format guessed from extension unless --to is given)
        output: PathBuf,
        /// Output format
        #[arg(long)]
        to: Option<FileFormat>,
        /// CSV delimiter
        #[arg(long, default_value = ",")]
        delimiter: char,
        /// Restrict CSV output to these fields
        #[arg(long = "field")]
        fields: Vec<String>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_field_def(s: &str) -> Result<(String, ValueType), String> {
    let pos = s
        .find(':')
        .ok_or_else(|| format!("Invalid field definition: no ':' found in '{s}'"))?;
    let name = &s[..pos];
    let type_name = &s[pos + 1..];
    let ty = ValueType::from_type_name(type_name)
        .ok_or_else(|| format!("Unknown type name: '{type_name}'"))?;
    Ok((name.to_string(), ty))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

/// An opened source plus what it takes to write it back. SQLite files
/// are durable as they stand; the buffered formats are rewritten in
/// full after a mutating command.
enum Source {
    Buffered {
        ds: MemoryDataSource,
        format: FileFormat,
        path: PathBuf,
    },
    Sql(SqlDataSource),
}

impl Source {
    fn as_data_source(&self) -> &dyn DataSource {
        match self {
            Source::Buffered { ds, .. } => ds,
            Source::Sql(ds) => ds,
        }
    }

    fn persist(&self) -> rowdb::Result<()> {
        match self {
            Source::Buffered { ds, format, path } => match format {
                FileFormat::Binary => snapshot::save_binary(ds, path),
                FileFormat::Delimited => text::save_delimited(ds, path),
                _ => Ok(()),
            },
            Source::Sql(ds) => ds.flush(),
        }
    }
}

fn guess_format(path: &Path) -> Result<FileFormat, String> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "db" | "bin" | "dat" => Ok(FileFormat::Binary),
        "txt" | "tsv" => Ok(FileFormat::Delimited),
        "csv" => Ok(FileFormat::Csv),
        "sqlite" | "sqlite3" | "db3" => Ok(FileFormat::Sqlite),
        other => Err(format!(
            "Cannot guess format from extension '{other}'; use --format"
        )),
    }
}

fn open_source(path: &Path, cli_format: Option<FileFormat>, table: Option<&str>) -> Result<Source, Box<dyn std::error::Error>> {
    let format = match cli_format {
        Some(f) => f,
        None => guess_format(path)?,
    };
    match format {
        FileFormat::Binary => Ok(Source::Buffered {
            ds: snapshot::load_binary(path)?,
            format,
            path: path.to_path_buf(),
        }),
        FileFormat::Delimited => Ok(Source::Buffered {
            ds: text::load_delimited(path)?,
            format,
            path: path.to_path_buf(),
        }),
        FileFormat::Csv => Err("CSV is write-only; convert from another format instead".into()),
        FileFormat::Sqlite => {
            let table = table.ok_or("SQLite files need --table")?;
            Ok(Source::Sql(SqlDataSource::open(path, table)?))
        }
    }
}

/// Parses a command line token against the column's declared type.
/// The bare word `null` reads as null.
fn parse_typed(ds: &dyn DataSource, field: &str, raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let index = ds
        .field_index(field)
        .ok_or_else(|| format!("No such field: {field}"))?;
    if raw == "null" {
        return Ok(Value::Null);
    }
    let ty = ds.types()[index];
    Ok(ty.parse_value(raw)?)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Create { file, fields } => {
            let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
            let types: Vec<ValueType> = fields.iter().map(|(_, t)| *t).collect();
            let format = cli.format.map(Ok).unwrap_or_else(|| guess_format(&file))?;
            match format {
                FileFormat::Binary => {
                    snapshot::create_data_source(&file, &names, &types)?;
                }
                FileFormat::Delimited => {
                    let name = file
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let ds = MemoryDataSource::with_fields(&name, &names, &types)?;
                    text::save_delimited(&ds, &file)?;
                }
                FileFormat::Sqlite => {
                    let table = cli.table.as_deref().ok_or("SQLite files need --table")?;
                    let schema = rowdb::Schema::from_parts(&names, &types)?;
                    SqlDataSource::create(&file, table, &schema)?;
                }
                FileFormat::Csv => {
                    return Err("CSV is write-only; create another format instead".into());
                }
            }
            println!("Created {}", file.display());
        }

        Command::Schema { file } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            print_schema(ds, &cli.output);
        }

        Command::List {
            file,
            order_by,
            descending,
        } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            if let Some(field) = &order_by {
                ds.set_ordering_field(Some(field.as_str()));
                ds.set_order_ascending(!descending);
            }
            print_rows(ds, &ds.get_all()?, &cli.output)?;
        }

        Command::Query { file, condition } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            let value = parse_typed(ds, &condition.0, &condition.1)?;
            print_rows(ds, &ds.query(&condition.0, &value)?, &cli.output)?;
        }

        Command::Lookup {
            file,
            condition,
            value_field,
        } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            let key = parse_typed(ds, &condition.0, &condition.1)?;
            match ds.lookup(&condition.0, &key, &value_field)? {
                Some(value) => match cli.output {
                    OutputFormat::Table => println!("{value}"),
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&value)?)
                    }
                },
                None => return Err("No matching row".into()),
            }
        }

        Command::Append { file, values } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            let fields = ds.fields();
            let mut row = vec![Value::Null; fields.len()];
            for (field, raw) in &values {
                let index = ds
                    .field_index(field)
                    .ok_or_else(|| format!("No such field: {field}"))?;
                row[index] = parse_typed(ds, field, raw)?;
            }
            ds.append(row)?;
            source.persist()?;
            println!("Appended 1 row");
        }

        Command::Set {
            file,
            condition,
            assignment,
        } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            let key = parse_typed(ds, &condition.0, &condition.1)?;
            let value = parse_typed(ds, &assignment.0, &assignment.1)?;
            let changed = ds.set(&condition.0, &key, &assignment.0, &value)?;
            source.persist()?;
            println!("Updated {changed} row(s)");
        }

        Command::Delete {
            file,
            condition,
            first,
        } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            let key = parse_typed(ds, &condition.0, &condition.1)?;
            let deleted = if first {
                ds.delete_first(&condition.0, &key)?
            } else {
                ds.delete(&condition.0, &key)?
            };
            source.persist()?;
            println!("Deleted {deleted} row(s)");
        }

        Command::AddField { file, field } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            source.as_data_source().add_field(&field.0, field.1)?;
            source.persist()?;
            println!("Added field {}", field.0);
        }

        Command::DeleteField { file, field } => {
            let source = open_source(&file, cli.format, cli.table.as_deref())?;
            if !source.as_data_source().delete_field(&field)? {
                return Err(format!("No such field: {field}").into());
            }
            source.persist()?;
            println!("Deleted field {field}");
        }

        Command::Convert {
            input,
            output,
            to,
            delimiter,
            fields,
        } => {
            let source = open_source(&input, cli.format, cli.table.as_deref())?;
            let ds = source.as_data_source();
            let format = to.map(Ok).unwrap_or_else(|| guess_format(&output))?;
            let selection = if fields.is_empty() {
                None
            } else {
                Some(fields.as_slice())
            };
            match format {
                FileFormat::Binary => snapshot::save_binary(ds, &output)?,
                FileFormat::Delimited => text::save_delimited(ds, &output)?,
                FileFormat::Csv => text::save_csv(ds, &output, delimiter, selection)?,
                FileFormat::Sqlite => {
                    return Err("Converting into SQLite is not supported".into());
                }
            }
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}

fn print_schema(ds: &dyn DataSource, output: &OutputFormat) {
    let fields = ds.fields();
    let types = ds.types();
    match output {
        OutputFormat::Table => {
            println!("{}", ds.name());
            for (field, ty) in fields.iter().zip(&types) {
                println!("  {field}\t{ty}");
            }
        }
        OutputFormat::Json => {
            let columns: Vec<_> = fields
                .iter()
                .zip(&types)
                .map(|(field, ty)| serde_json::json!({ "field": field, "type": ty }))
                .collect();
            let value = serde_json::json!({ "name": ds.name(), "columns": columns });
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("ERROR:{e}"),
            }
        }
    }
}

fn print_rows(
    ds: &dyn DataSource,
    rows: &[rowdb::Row],
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Table => {
            println!("{}", ds.fields().join("\t"));
            for row in rows {
                let cells: Vec<String> = row.data()?.iter().map(Value::to_string).collect();
                println!("{}", cells.join("\t"));
            }
        }
        OutputFormat::Json => {
            let fields = ds.fields();
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let mut object = serde_json::Map::new();
                for (field, value) in fields.iter().zip(row.data()?) {
                    object.insert(field.clone(), serde_json::to_value(&value)?);
                }
                out.push(serde_json::Value::Object(object));
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
