//! Schema introspection
//!
//! Column descriptors derived from a loaded relation, and the two text
//! renderings built from them: the prompt block handed to the SQL
//! translator and the listing shown next to a dataset.

use crate::error::Result;
use crate::loader::{sql_type_label, Relation};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Type-label fragments that mark a column as numeric.
pub const NUMERIC_TYPE_NAMES: [&str; 9] = [
    "BIGINT", "INTEGER", "SMALLINT", "TINYINT", "DOUBLE", "FLOAT", "DECIMAL", "NUMERIC", "HUGEINT",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl LogicalType {
    pub fn from_dtype(dtype: &DataType) -> Self {
        match dtype {
            DataType::Boolean => LogicalType::Boolean,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => LogicalType::Integer,
            DataType::Float32 | DataType::Float64 => LogicalType::Float,
            DataType::Date | DataType::Datetime(_, _) => LogicalType::Timestamp,
            _ => LogicalType::Text,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, LogicalType::Integer | LogicalType::Float)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    /// SQL-style type label, e.g. `BIGINT` or `VARCHAR`.
    pub dtype: String,
    pub non_null_count: usize,
    pub null_count: usize,
    pub distinct_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub columns: Vec<ColumnDescriptor>,
}

/// One entry of the UI-facing column listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnListing {
    pub name: String,
    #[serde(rename = "type")]
    pub type_label: String,
    pub nullable: bool,
    pub unique: usize,
    pub numeric: bool,
}

pub fn describe_relation(relation: &Relation) -> Result<DatasetProfile> {
    describe_frame(relation.frame())
}

/// Compute descriptors for every column, in load order.
pub fn describe_frame(frame: &DataFrame) -> Result<DatasetProfile> {
    let columns = frame
        .get_columns()
        .iter()
        .map(describe_series)
        .collect::<Result<Vec<_>>>()?;

    Ok(DatasetProfile {
        row_count: frame.height(),
        columns,
    })
}

fn describe_series(series: &Series) -> Result<ColumnDescriptor> {
    let logical_type = LogicalType::from_dtype(series.dtype());
    let null_count = series.null_count();
    let distinct_count = series.drop_nulls().n_unique()?;

    let mut descriptor = ColumnDescriptor {
        name: series.name().to_string(),
        logical_type,
        dtype: sql_type_label(series.dtype()),
        non_null_count: series.len() - null_count,
        null_count,
        distinct_count,
        min: None,
        max: None,
        mean: None,
    };

    if logical_type.is_numeric() {
        let values = series.cast(&DataType::Float64)?;
        let values = values.f64()?;
        descriptor.min = values.min();
        descriptor.max = values.max();
        descriptor.mean = values.mean();
    }

    Ok(descriptor)
}

impl DatasetProfile {
    pub fn column_names(&self) -> Vec<String> {
        column_names(&self.columns)
    }

    pub fn numeric_column_names(&self) -> Vec<String> {
        numeric_column_names(&self.columns)
    }

    pub fn format_for_prompt(&self) -> String {
        format_for_prompt(&self.columns)
    }

    pub fn format_for_listing(&self) -> Vec<ColumnListing> {
        format_for_listing(&self.columns)
    }
}

pub fn column_names(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

/// Columns whose type label contains one of [`NUMERIC_TYPE_NAMES`]
/// (case-insensitive).
pub fn numeric_column_names(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| is_numeric_label(&c.dtype))
        .map(|c| c.name.clone())
        .collect()
}

pub fn is_numeric_label(type_label: &str) -> bool {
    let upper = type_label.to_uppercase();
    NUMERIC_TYPE_NAMES.iter().any(|t| upper.contains(t))
}

/// One line per column:
/// `- name (type) - N non-null, M unique, range: [min, max]`.
/// Zero counts and a missing range drop their clause.
pub fn format_for_prompt(columns: &[ColumnDescriptor]) -> String {
    if columns.is_empty() {
        return "No schema available".to_string();
    }

    columns
        .iter()
        .map(|col| {
            let mut line = format!("- {} ({})", col.name, col.dtype);
            if col.non_null_count > 0 {
                line.push_str(&format!(" - {} non-null", col.non_null_count));
            }
            if col.distinct_count > 0 {
                line.push_str(&format!(", {} unique", col.distinct_count));
            }
            if let (Some(min), Some(max)) = (col.min, col.max) {
                line.push_str(&format!(", range: [{}, {}]", min, max));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_for_listing(columns: &[ColumnDescriptor]) -> Vec<ColumnListing> {
    columns
        .iter()
        .map(|col| ColumnListing {
            name: col.name.clone(),
            type_label: col.dtype.clone(),
            nullable: col.null_count > 0,
            unique: col.distinct_count,
            numeric: is_numeric_label(&col.dtype),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        df![
            "id" => [1i64, 2, 3, 4],
            "price" => [Some(2.5f64), None, Some(7.5), Some(5.0)],
            "city" => [Some("Paris"), Some("Oslo"), None, Some("Paris")],
            "active" => [true, false, true, true]
        ]
        .unwrap()
    }

    #[test]
    fn test_describe_frame_counts() {
        let profile = describe_frame(&sample_frame()).unwrap();
        assert_eq!(profile.row_count, 4);
        assert_eq!(profile.column_names(), vec!["id", "price", "city", "active"]);

        for col in &profile.columns {
            assert_eq!(col.non_null_count + col.null_count, profile.row_count);
        }

        let price = &profile.columns[1];
        assert_eq!(price.logical_type, LogicalType::Float);
        assert_eq!(price.dtype, "DOUBLE");
        assert_eq!(price.null_count, 1);
        assert_eq!(price.distinct_count, 3);
        assert_eq!(price.min, Some(2.5));
        assert_eq!(price.max, Some(7.5));
        assert_eq!(price.mean, Some(5.0));

        let city = &profile.columns[2];
        assert_eq!(city.logical_type, LogicalType::Text);
        assert_eq!(city.distinct_count, 2);
        assert!(city.min.is_none() && city.max.is_none() && city.mean.is_none());

        assert_eq!(profile.columns[3].logical_type, LogicalType::Boolean);
        assert!(profile.columns[3].mean.is_none());
    }

    #[test]
    fn test_numeric_columns_by_type_label() {
        let profile = describe_frame(&sample_frame()).unwrap();
        assert_eq!(profile.numeric_column_names(), vec!["id", "price"]);
        assert!(is_numeric_label("decimal(10,2)"));
        assert!(!is_numeric_label("VARCHAR"));
    }

    #[test]
    fn test_prompt_format() {
        let profile = describe_frame(&sample_frame()).unwrap();
        let prompt = profile.format_for_prompt();
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines[0], "- id (BIGINT) - 4 non-null, 4 unique, range: [1, 4]");
        assert_eq!(lines[1], "- price (DOUBLE) - 3 non-null, 3 unique, range: [2.5, 7.5]");
        assert_eq!(lines[2], "- city (VARCHAR) - 3 non-null, 2 unique");
    }

    #[test]
    fn test_prompt_omits_absent_clauses() {
        let col = ColumnDescriptor {
            name: "empty".to_string(),
            logical_type: LogicalType::Text,
            dtype: "VARCHAR".to_string(),
            non_null_count: 0,
            null_count: 3,
            distinct_count: 0,
            min: None,
            max: None,
            mean: None,
        };
        assert_eq!(format_for_prompt(&[col]), "- empty (VARCHAR)");
        assert_eq!(format_for_prompt(&[]), "No schema available");
    }

    #[test]
    fn test_listing() {
        let profile = describe_frame(&sample_frame()).unwrap();
        let listing = profile.format_for_listing();
        assert!(listing[1].nullable);
        assert!(listing[1].numeric);
        assert!(!listing[0].nullable);
        assert!(!listing[2].numeric);
        let json = serde_json::to_value(&listing[2]).unwrap();
        assert_eq!(json["type"], "VARCHAR");
    }
}
