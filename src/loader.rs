//! Columnar Loader
//!
//! Opens an uploaded tabular file and materializes it as one in-memory
//! relation registered under a fixed logical table name. The relation is
//! owned by whoever asked for it and is released when it goes out of scope.
//!
//! Supported formats (selected by extension only):
//! - delimited text (`.csv`, `.tsv`, `.txt`), separator detected from the header
//! - spreadsheets (`.xlsx`, `.xlsm`, `.xls`), first sheet, values only
//! - JSON record arrays (`.json`)
//! - Parquet (`.parquet`)

use crate::config::Settings;
use crate::error::{InsightError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use polars::prelude::*;
use polars::sql::SQLContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Candidate separators for delimited files, in priority order.
const DELIMITER_CANDIDATES: &[u8] = b",\t;|";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Delimited,
    Spreadsheet,
    Json,
    Parquet,
}

impl FileFormat {
    /// Pick the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(FileFormat::Delimited),
            "xlsx" | "xlsm" | "xls" => Ok(FileFormat::Spreadsheet),
            "json" => Ok(FileFormat::Json),
            "parquet" => Ok(FileFormat::Parquet),
            "" => Err(InsightError::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(InsightError::UnsupportedFormat(format!(".{}", other))),
        }
    }
}

/// Name and SQL-style type label of one relation column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub type_label: String,
}

/// In-memory queryable table backing one loaded file.
pub struct Relation {
    table_name: String,
    source: PathBuf,
    frame: DataFrame,
    context: SQLContext,
}

impl Relation {
    fn new(table_name: &str, source: &Path, frame: DataFrame) -> Self {
        let mut context = SQLContext::new();
        context.register(table_name, frame.clone().lazy());
        Self {
            table_name: table_name.to_string(),
            source: source.to_path_buf(),
            frame,
            context,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_names().iter().any(|c| *c == name)
    }

    /// Column names with their SQL-style type labels, in load order.
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.frame
            .get_columns()
            .iter()
            .map(|s| ColumnSchema {
                name: s.name().to_string(),
                type_label: sql_type_label(s.dtype()),
            })
            .collect()
    }

    /// Run a query against the registered tables and materialize the result.
    pub fn query(&mut self, sql: &str) -> Result<DataFrame> {
        debug!(table = %self.table_name, "running query: {}", sql);
        let plan = self
            .context
            .execute(sql)
            .map_err(|e| InsightError::Execution(e.to_string()))?;
        plan.collect()
            .map_err(|e| InsightError::Execution(e.to_string()))
    }

    /// Register an auxiliary frame next to the main table for follow-up queries.
    pub fn register_frame(&mut self, name: &str, frame: DataFrame) {
        self.context.register(name, frame.lazy());
    }

    /// First `limit` rows as JSON-safe records.
    pub fn sample(&self, limit: usize) -> Result<Vec<crate::execution::Record>> {
        crate::execution::dataframe_to_records(&self.frame.head(Some(limit)))
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("table_name", &self.table_name)
            .field("source", &self.source)
            .field("shape", &self.frame.shape())
            .finish_non_exhaustive()
    }
}

impl Drop for Relation {
    fn drop(&mut self) {
        debug!(
            table = %self.table_name,
            source = %self.source.display(),
            "released relation"
        );
    }
}

/// Loads files into relations. Built from the process settings.
#[derive(Debug, Clone)]
pub struct Loader {
    max_file_size: u64,
    infer_schema_rows: usize,
}

impl Loader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            max_file_size: settings.max_file_size,
            infer_schema_rows: settings.infer_schema_rows,
        }
    }

    /// Load `path` into a relation registered as `table_name`.
    pub fn load(&self, path: &Path, table_name: &str) -> Result<Relation> {
        let format = FileFormat::from_path(path)?;

        let size = std::fs::metadata(path)
            .map_err(|e| InsightError::Load(format!("cannot open {}: {}", path.display(), e)))?
            .len();
        if size > self.max_file_size {
            return Err(InsightError::Load(format!(
                "{} is {} bytes, limit is {} bytes",
                path.display(),
                size,
                self.max_file_size
            )));
        }

        info!("Loading {} as {:?} into table '{}'", path.display(), format, table_name);

        let frame = match format {
            FileFormat::Delimited => self.read_delimited(path),
            FileFormat::Spreadsheet => self.read_spreadsheet(path),
            FileFormat::Json => read_json(path),
            FileFormat::Parquet => read_parquet(path),
        }?;

        info!(
            "Loaded {} rows x {} columns from {}",
            frame.height(),
            frame.width(),
            path.display()
        );

        Ok(Relation::new(table_name, path, frame))
    }

    fn read_delimited(&self, path: &Path) -> Result<DataFrame> {
        let separator = detect_delimiter(path)?;
        LazyCsvReader::new(path)
            .with_has_header(true)
            .with_separator(separator)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(self.infer_schema_rows))
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| InsightError::Load(format!("failed to read {}: {}", path.display(), e)))
    }

    /// Spreadsheets are written row by row into a temporary delimited file
    /// and ingested from there. The temp file is removed when it drops.
    fn read_spreadsheet(&self, path: &Path) -> Result<DataFrame> {
        let staged = materialize_first_sheet(path)?;
        let frame = self.read_delimited(staged.path());
        drop(staged);
        frame
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| InsightError::Load(format!("cannot open {}: {}", path.display(), e)))
}

fn read_json(path: &Path) -> Result<DataFrame> {
    let file = open(path)?;
    JsonReader::new(file)
        .finish()
        .map_err(|e| InsightError::Load(format!("failed to read {}: {}", path.display(), e)))
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    LazyFrame::scan_parquet(path, ScanArgsParquet::default())
        .and_then(|lf| lf.collect())
        .map_err(|e| InsightError::Load(format!("failed to read {}: {}", path.display(), e)))
}

/// Detect the separator from the header line: the most frequent candidate
/// wins, comma when none appear.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = open(path)?;
    let mut header = String::new();
    BufReader::new(file)
        .read_line(&mut header)
        .map_err(|e| InsightError::Load(format!("failed to read {}: {}", path.display(), e)))?;
    Ok(delimiter_for_line(header.trim_end_matches(['\n', '\r'])))
}

fn delimiter_for_line(line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0usize;
    for &candidate in DELIMITER_CANDIDATES {
        let count = line.bytes().filter(|&b| b == candidate).count();
        if count > best_count {
            best_count = count;
            best = candidate;
        }
    }
    best
}

fn materialize_first_sheet(path: &Path) -> Result<NamedTempFile> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| InsightError::Load(format!("failed to open workbook {}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| InsightError::Load(format!("{} has no worksheets", path.display())))?
        .map_err(|e| InsightError::Load(format!("failed to read first sheet: {}", e)))?;

    let staged = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .map_err(|e| InsightError::Load(format!("failed to stage sheet: {}", e)))?;
    {
        let mut writer = csv::Writer::from_writer(staged.as_file());
        for row in range.rows() {
            let fields: Vec<String> = row.iter().map(cell_to_field).collect();
            writer
                .write_record(&fields)
                .map_err(|e| InsightError::Load(format!("failed to stage sheet row: {}", e)))?;
        }
        writer
            .flush()
            .map_err(|e| InsightError::Load(format!("failed to stage sheet: {}", e)))?;
    }

    debug!("Staged first sheet of {} at {}", path.display(), staged.path().display());
    Ok(staged)
}

/// Cell value as delimited text. Formulas are never evaluated: only the
/// cached value stored in the workbook is used.
fn cell_to_field(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

/// SQL-style label for a polars dtype, used by schema listings and the
/// numeric-column checks.
pub fn sql_type_label(dtype: &DataType) -> String {
    match dtype {
        DataType::Int8 => "TINYINT".to_string(),
        DataType::Int16 => "SMALLINT".to_string(),
        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::UInt8 => "UTINYINT".to_string(),
        DataType::UInt16 => "USMALLINT".to_string(),
        DataType::UInt32 => "UINTEGER".to_string(),
        DataType::UInt64 => "UBIGINT".to_string(),
        DataType::Float32 => "FLOAT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::String => "VARCHAR".to_string(),
        DataType::Date => "DATE".to_string(),
        DataType::Datetime(_, _) => "TIMESTAMP".to_string(),
        DataType::Time => "TIME".to_string(),
        DataType::Duration(_) => "INTERVAL".to_string(),
        other => other.to_string().to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a/b.CSV")).unwrap(), FileFormat::Delimited);
        assert_eq!(FileFormat::from_path(Path::new("b.tsv")).unwrap(), FileFormat::Delimited);
        assert_eq!(FileFormat::from_path(Path::new("b.xlsx")).unwrap(), FileFormat::Spreadsheet);
        assert_eq!(FileFormat::from_path(Path::new("b.json")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("b.parquet")).unwrap(), FileFormat::Parquet);
        assert!(matches!(
            FileFormat::from_path(Path::new("b.avro")),
            Err(InsightError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileFormat::from_path(Path::new("README")),
            Err(InsightError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_delimiter_detection() {
        assert_eq!(delimiter_for_line("id,name,amount"), b',');
        assert_eq!(delimiter_for_line("id\tname\tamount"), b'\t');
        assert_eq!(delimiter_for_line("id;name;amount"), b';');
        assert_eq!(delimiter_for_line("id|name"), b'|');
        assert_eq!(delimiter_for_line("single"), b',');
    }

    #[test]
    fn test_cell_to_field_values_only() {
        assert_eq!(cell_to_field(&Data::Empty), "");
        assert_eq!(cell_to_field(&Data::Float(3.0)), "3");
        assert_eq!(cell_to_field(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_field(&Data::Int(7)), "7");
        assert_eq!(cell_to_field(&Data::Bool(true)), "true");
        assert_eq!(cell_to_field(&Data::String("a b".to_string())), "a b");
    }

    #[test]
    fn test_unreadable_file_is_a_load_error() {
        let missing = Path::new("no/such/dir/data.csv");
        assert!(matches!(detect_delimiter(missing), Err(InsightError::Load(_))));
        assert!(matches!(read_json(Path::new("no/such/dir/data.json")), Err(InsightError::Load(_))));
    }

    #[test]
    fn test_sql_type_labels() {
        assert_eq!(sql_type_label(&DataType::Int64), "BIGINT");
        assert_eq!(sql_type_label(&DataType::Float64), "DOUBLE");
        assert_eq!(sql_type_label(&DataType::String), "VARCHAR");
        assert_eq!(sql_type_label(&DataType::Date), "DATE");
    }
}
