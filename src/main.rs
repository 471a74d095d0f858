//! Purpose: `packrec` CLI entry point over a directory of record files.
//! Role: Binary crate root; parses args, runs table/dataset commands, emits JSON on stdout.
//! Invariants: Each command prints exactly one JSON document on stdout.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `api::to_exit_code`.
//! Invariants: Every opened table or dataset is released through `scoped`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::mem::size_of;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use packrec::api::{
    DEFAULT_CHUNK_SIZE, Dataset, Error, ErrorKind, FileBackend, PacketTable, Plain, RecordType,
    Status, TableOptions, decode_fixed, encode_fixed, to_exit_code,
};

mod store_paths;

use store_paths::{ObjectNameError, resolve_store_dir, validate_object_name};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

#[derive(Parser)]
#[command(
    name = "packrec",
    version,
    about = "Fixed-layout record tables and datasets backed by plain files",
    after_help = r#"EXAMPLES
  $ packrec table create ticks --record-size 4
  $ packrec table append ticks --as u32 1 2 3 4
  $ packrec table read ticks --as u32 --start 1 --count 2
  $ packrec dataset create names --record-size 8 --extent 2
  $ packrec dataset write names --as text alice bob
  $ packrec dataset read names --as text"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Store directory (default: $PACKREC_DIR, then ~/.packrec/store)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append-only packet tables
    #[command(subcommand)]
    Table(TableCommand),
    /// Fixed-extent datasets read and written whole
    #[command(subcommand)]
    Dataset(DatasetCommand),
}

#[derive(Subcommand)]
enum TableCommand {
    /// Create an empty table
    Create {
        name: String,
        #[arg(long, help = "Bytes per record")]
        record_size: usize,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        #[arg(long, help = "Compression level recorded with the table")]
        compression: Option<u32>,
    },
    /// Append values as records
    Append {
        name: String,
        #[command(flatten)]
        values: ValuesArg,
    },
    /// Read records starting at an absolute offset
    Read {
        name: String,
        #[arg(long = "as", value_enum)]
        kind: ValueKind,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, help = "Records to read (default: through the end)")]
        count: Option<usize>,
    },
    /// Show layout and record count
    Info { name: String },
}

#[derive(Subcommand)]
enum DatasetCommand {
    /// Create a zero-filled dataset
    Create {
        name: String,
        #[arg(long, help = "Bytes per record")]
        record_size: usize,
        #[arg(long, help = "Number of records")]
        extent: u64,
    },
    /// Replace the whole dataset
    Write {
        name: String,
        #[command(flatten)]
        values: ValuesArg,
    },
    /// Read the whole dataset
    Read {
        name: String,
        #[arg(long = "as", value_enum)]
        kind: ValueKind,
    },
}

#[derive(Args)]
struct ValuesArg {
    #[arg(long = "as", value_enum, help = "How to encode each value")]
    kind: ValueKind,
    #[arg(required = true, allow_hyphen_values = true)]
    values: Vec<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ValueKind {
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
    /// Fixed-width NUL-padded text, one value per record
    Text,
}

// Binds `$ty` to the numeric type selected by `$kind`, or evaluates `$text`.
macro_rules! dispatch_kind {
    ($kind:expr, $ty:ident => $numeric:expr, text => $text:expr) => {
        match $kind {
            ValueKind::U8 => {
                type $ty = u8;
                $numeric
            }
            ValueKind::U16 => {
                type $ty = u16;
                $numeric
            }
            ValueKind::U32 => {
                type $ty = u32;
                $numeric
            }
            ValueKind::U64 => {
                type $ty = u64;
                $numeric
            }
            ValueKind::I32 => {
                type $ty = i32;
                $numeric
            }
            ValueKind::I64 => {
                type $ty = i64;
                $numeric
            }
            ValueKind::F32 => {
                type $ty = f32;
                $numeric
            }
            ValueKind::F64 => {
                type $ty = f64;
                $numeric
            }
            ValueKind::Text => $text,
        }
    };
}

#[derive(Serialize)]
struct TableInfo {
    table: String,
    path: String,
    record_size: u64,
    records: u64,
    chunk_size: u64,
    compression: Option<u32>,
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let dir = resolve_store_dir(cli.dir);
    let backend = Arc::new(FileBackend::open(&dir)?);
    let output = match cli.command {
        Command::Table(command) => run_table(&backend, command)?,
        Command::Dataset(command) => run_dataset(&backend, command)?,
    };
    emit_json(&output);
    Ok(())
}

fn run_table(backend: &Arc<FileBackend>, command: TableCommand) -> Result<Value, Error> {
    match command {
        TableCommand::Create {
            name,
            record_size,
            chunk_size,
            compression,
        } => {
            check_name(&name)?;
            let mut options = TableOptions::new(chunk_size);
            if let Some(level) = compression {
                options = options.with_compression(level);
            }
            let table = PacketTable::create(
                Arc::clone(backend),
                &name,
                &RecordType::fixed(record_size),
                options,
            )?;
            table.scoped(|_| Ok(()))?;
            Ok(json!({
                "table": name,
                "path": object_path(backend, &name),
                "record_size": record_size,
                "chunk_size": chunk_size,
                "compression": compression,
            }))
        }
        TableCommand::Append { name, values } => {
            check_name(&name)?;
            let table = PacketTable::open(Arc::clone(backend), &name)?;
            table.scoped(|table| {
                let record_type = table.record_type()?;
                let appended = dispatch_kind!(values.kind, T => {
                    table.append(&parse_values::<T>(values.kind, &record_type, &values.values)?)?
                }, text => {
                    table.append(&encode_fixed(&values.values, record_type.size())?)?
                });
                Ok(json!({
                    "table": name,
                    "appended": appended,
                    "records": table.num_packets()?,
                }))
            })
        }
        TableCommand::Read {
            name,
            kind,
            start,
            count,
        } => {
            check_name(&name)?;
            let table = PacketTable::open(Arc::clone(backend), &name)?;
            table.scoped(|table| {
                let record_type = table.record_type()?;
                let count = read_window(table.num_packets()?, start, count)?;
                let records = dispatch_kind!(kind, T => {
                    check_width::<T>(kind, &record_type)?;
                    let mut out: Vec<T> = Vec::with_capacity(count);
                    table.read_packets(start, count, &mut out)?;
                    to_json(&out)?
                }, text => {
                    let width = record_type.size();
                    let len = count.checked_mul(width).ok_or_else(|| {
                        Error::new(ErrorKind::Usage).with_message(format!(
                            "{count} records of {width} bytes do not fit in memory"
                        ))
                    })?;
                    let mut raw: Vec<u8> = Vec::with_capacity(len);
                    table.read_packets(start, count, &mut raw)?;
                    let mut slots = vec![String::new(); count];
                    decode_fixed(&raw, width, &mut slots)?;
                    json!(slots)
                });
                Ok(json!({ "table": name, "start": start, "records": records }))
            })
        }
        TableCommand::Info { name } => {
            check_name(&name)?;
            let table = PacketTable::open(Arc::clone(backend), &name)?;
            table.scoped(|table| {
                let handle = table.handle().ok_or_else(Error::invalid_handle)?;
                let header = backend
                    .header(handle)
                    .map_err(|status| Error::from_status("read header", status))?;
                let info = TableInfo {
                    path: object_path(backend, &name),
                    table: name,
                    record_size: header.record_size,
                    records: header.records,
                    chunk_size: header.chunk_size,
                    compression: header.compression,
                };
                to_json(&info)
            })
        }
    }
}

fn run_dataset(backend: &Arc<FileBackend>, command: DatasetCommand) -> Result<Value, Error> {
    match command {
        DatasetCommand::Create {
            name,
            record_size,
            extent,
        } => {
            check_name(&name)?;
            let dataset =
                Dataset::create(Arc::clone(backend), &name, &RecordType::fixed(record_size), extent)?;
            dataset.scoped(|_| Ok(()))?;
            Ok(json!({
                "dataset": name,
                "path": object_path(backend, &name),
                "record_size": record_size,
                "extent": extent,
            }))
        }
        DatasetCommand::Write { name, values } => {
            check_name(&name)?;
            let dataset = Dataset::open(Arc::clone(backend), &name)?;
            dataset.scoped(|dataset| {
                let record_type = dataset.record_type()?;
                dispatch_kind!(values.kind, T => {
                    dataset.write(&parse_values::<T>(values.kind, &record_type, &values.values)?, &record_type)?
                }, text => {
                    dataset.write(&encode_fixed(&values.values, record_type.size())?, &record_type)?
                });
                Ok(json!({ "dataset": name, "written": dataset.extent()? }))
            })
        }
        DatasetCommand::Read { name, kind } => {
            check_name(&name)?;
            let dataset = Dataset::open(Arc::clone(backend), &name)?;
            dataset.scoped(|dataset| {
                let record_type = dataset.record_type()?;
                let extent = dataset.extent()?;
                let records = dispatch_kind!(kind, T => {
                    check_width::<T>(kind, &record_type)?;
                    let mut out: Vec<T> = Vec::with_capacity(extent);
                    dataset.read(&mut out, &record_type)?;
                    to_json(&out)?
                }, text => {
                    let mut slots = vec![String::new(); extent];
                    dataset.read(&mut slots, &RecordType::fixed_string(record_type.size()))?;
                    json!(slots)
                });
                Ok(json!({ "dataset": name, "records": records }))
            })
        }
    }
}

fn check_width<T: Plain>(kind: ValueKind, record_type: &RecordType) -> Result<(), Error> {
    if size_of::<T>() != record_type.size() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "--as {} values are {} bytes but records are {} bytes",
                kind_name(kind),
                size_of::<T>(),
                record_type.size()
            ))
            .with_hint("Pick a value kind matching the record size, or --as text."));
    }
    Ok(())
}

fn parse_values<T>(kind: ValueKind, record_type: &RecordType, raw: &[String]) -> Result<Vec<T>, Error>
where
    T: Plain + FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    check_width::<T>(kind, record_type)?;
    raw.iter()
        .map(|value| {
            value.parse::<T>().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid {} value '{value}'", kind_name(kind)))
                    .with_source(err)
            })
        })
        .collect()
}

fn kind_name(kind: ValueKind) -> String {
    kind.to_possible_value()
        .map(|value| value.get_name().to_string())
        .unwrap_or_else(|| format!("{kind:?}"))
}

fn check_name(name: &str) -> Result<(), Error> {
    validate_object_name(name).map_err(|err| {
        let message = match err {
            ObjectNameError::Empty => "object name is empty",
            ObjectNameError::ContainsPathSeparator => "object name contains a path separator",
        };
        Error::new(ErrorKind::Usage)
            .with_message(message)
            .with_hint("Use a bare name; set --dir to choose the directory.")
    })
}

fn object_path(backend: &FileBackend, name: &str) -> String {
    backend.object_path(name).display().to_string()
}

/// Resolves the record count for `table read`, rejecting windows past the end
/// before anything is allocated for them.
fn read_window(total: u64, start: u64, count: Option<usize>) -> Result<usize, Error> {
    let out_of_range = || {
        Error::from_status("read packets", Status::OUT_OF_RANGE)
            .with_message(format!("records {start}.. are past the end ({total} records)"))
    };
    if start > total {
        return Err(out_of_range());
    }
    match count {
        None => to_usize(total - start),
        Some(count) => match start.checked_add(count as u64) {
            Some(end) if end <= total => Ok(count),
            _ => Err(out_of_range()),
        },
    }
}

fn to_usize(value: u64) -> Result<usize, Error> {
    usize::try_from(value).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message(format!("{value} records do not fit in memory"))
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode json")
            .with_source(err)
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: &Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().map(str::to_string).unwrap_or_else(|| err.to_string())),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let (Some(available), Some(requested)) = (err.available(), err.requested()) {
        inner.insert("available".to_string(), json!(available));
        inner.insert("requested".to_string(), json!(requested));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status.code()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}
