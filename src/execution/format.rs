//! Result formatting for display: markdown tables and per-column summaries.

use crate::execution::result::Record;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_MARKDOWN_ROWS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub dtype: String,
    pub non_null_count: usize,
    pub null_count: usize,
    pub unique_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub column_stats: BTreeMap<String, ColumnStats>,
}

/// Render records as a markdown pipe table, showing at most `max_rows`.
pub fn to_markdown_table(records: &[Record], columns: Option<&[String]>, max_rows: usize) -> String {
    if records.is_empty() {
        return "*No results*".to_string();
    }

    let columns: Vec<String> = match columns {
        Some(cols) => cols.to_vec(),
        None => records[0].keys().cloned().collect(),
    };

    let header = format!("| {} |", columns.join(" | "));
    let separator = format!("| {} |", columns.iter().map(|_| "---").join(" | "));

    let mut lines = vec![header, separator];
    for record in records.iter().take(max_rows) {
        let cells = columns
            .iter()
            .map(|col| record.get(col).map(display_cell).unwrap_or_default())
            .join(" | ");
        lines.push(format!("| {} |", cells));
    }

    let mut table = lines.join("\n");
    if records.len() > max_rows {
        table.push_str(&format!("\n\n*Showing {} of {} rows*", max_rows, records.len()));
    }
    table
}

/// Per-column statistics over a record set. Numeric statistics are only
/// reported for columns whose non-null values are all numbers.
pub fn to_summary(records: &[Record], columns: Option<&[String]>) -> ResultSummary {
    if records.is_empty() {
        return ResultSummary {
            row_count: 0,
            column_count: 0,
            columns: Vec::new(),
            column_stats: BTreeMap::new(),
        };
    }

    let columns: Vec<String> = match columns {
        Some(cols) => cols.to_vec(),
        None => records[0].keys().cloned().collect(),
    };

    let column_stats = columns
        .iter()
        .map(|col| {
            let values: Vec<&Value> = records
                .iter()
                .map(|r| r.get(col).unwrap_or(&Value::Null))
                .collect();
            (col.clone(), column_stats(&values))
        })
        .collect();

    ResultSummary {
        row_count: records.len(),
        column_count: columns.len(),
        columns,
        column_stats,
    }
}

fn column_stats(values: &[&Value]) -> ColumnStats {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    let unique: HashSet<String> = present.iter().map(|v| v.to_string()).collect();
    let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
    let numeric = !present.is_empty() && numbers.len() == present.len();

    let mut stats = ColumnStats {
        dtype: infer_dtype(&present, numeric),
        non_null_count: present.len(),
        null_count: values.len() - present.len(),
        unique_count: unique.len(),
        min: None,
        max: None,
        mean: None,
        median: None,
    };

    if numeric {
        let mut sorted = numbers.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        stats.min = sorted.first().copied();
        stats.max = sorted.last().copied();
        stats.mean = Some(numbers.iter().sum::<f64>() / numbers.len() as f64);
        stats.median = Some(median_of_sorted(&sorted));
    }

    stats
}

fn infer_dtype(present: &[&Value], numeric: bool) -> String {
    if numeric {
        if present.iter().all(|v| v.is_i64() || v.is_u64()) {
            "int64".to_string()
        } else {
            "float64".to_string()
        }
    } else if !present.is_empty() && present.iter().all(|v| v.is_boolean()) {
        "bool".to_string()
    } else {
        "object".to_string()
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
