//! Query-text helpers shared by every chart strategy.
//!
//! All caller-supplied column names reach generated SQL through
//! [`quote_ident`].

use crate::charts::Aggregation;
use crate::error::{InsightError, Result};
use crate::execution::result::any_value_to_json;
use crate::loader::Relation;
use polars::prelude::*;
use serde_json::Value;
use strsim::jaro_winkler;

/// Placeholder value column meaning "count rows".
pub const ROW_COUNT: &str = "count";

/// Minimum similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Wrap an identifier in double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Aggregate expression for a value column. The row-count placeholder
/// counts `row_key`, which must be non-null on every counted row: under
/// `GROUP BY` the engine evaluates `COUNT(*)` to the number of groups.
pub fn value_expr(value_col: &str, agg: Aggregation, row_key: &str) -> String {
    if value_col == ROW_COUNT {
        format!("COUNT({})", row_key)
    } else {
        format!("{}({})", agg.sql_function(), quote_ident(value_col))
    }
}

/// Axis label for an aggregated value column.
pub fn value_label(value_col: &str, agg: Aggregation) -> String {
    if value_col == ROW_COUNT {
        "Count".to_string()
    } else {
        format!("{}({})", agg, value_col)
    }
}

/// Fail with `InvalidParameter` naming `param` when `column` is not in the
/// relation.
pub fn ensure_column(relation: &Relation, param: &str, column: &str) -> Result<()> {
    if relation.has_column(column) {
        return Ok(());
    }

    let available = relation.column_names();
    let reason = match closest_column(column, &available) {
        Some(candidate) => format!("column '{}' not found, did you mean '{}'?", column, candidate),
        None => format!(
            "column '{}' not found, available columns: {}",
            column,
            available.join(", ")
        ),
    };
    Err(InsightError::invalid_param(param, reason))
}

/// Like [`ensure_column`], and additionally require a numeric dtype.
pub fn ensure_numeric_column(relation: &Relation, param: &str, column: &str) -> Result<()> {
    ensure_column(relation, param, column)?;
    let dtype = relation.frame().column(column)?.dtype().clone();
    if dtype.is_numeric() {
        Ok(())
    } else {
        Err(InsightError::invalid_param(
            param,
            format!("column '{}' is not numeric ({})", column, dtype),
        ))
    }
}

pub fn closest_column<'a>(name: &str, candidates: &'a [String]) -> Option<&'a str> {
    let needle = name.to_lowercase();
    candidates
        .iter()
        .map(|c| (jaro_winkler(&needle, &c.to_lowercase()), c))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.as_str())
}

/// Column of a result frame as `f64`s, nulls kept as `None`.
pub fn f64_values(frame: &DataFrame, idx: usize) -> Result<Vec<Option<f64>>> {
    let series = frame.select_at_idx(idx).ok_or_else(|| {
        InsightError::Execution(format!("result has no column at position {}", idx))
    })?;
    series_f64(series)
}

pub fn series_f64(series: &Series) -> Result<Vec<Option<f64>>> {
    let values = series.cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

/// First-row scalar of a result column as `f64`.
pub fn scalar_f64(frame: &DataFrame, idx: usize) -> Result<Option<f64>> {
    Ok(f64_values(frame, idx)?.into_iter().next().flatten())
}

/// Column of a result frame rendered as display labels. Nulls stay `None`.
pub fn label_values(frame: &DataFrame, idx: usize) -> Result<Vec<Option<String>>> {
    let series = frame.select_at_idx(idx).ok_or_else(|| {
        InsightError::Execution(format!("result has no column at position {}", idx))
    })?;
    series_labels(series)
}

pub fn series_labels(series: &Series) -> Result<Vec<Option<String>>> {
    (0..series.len())
        .map(|i| {
            let value = series.get(i)?;
            Ok(match any_value_to_json(&value) {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("amount"), "\"amount\"");
        assert_eq!(quote_ident("order date"), "\"order date\"");
        assert_eq!(quote_ident("select"), "\"select\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_value_expr() {
        let key = quote_ident("region");
        assert_eq!(value_expr("count", Aggregation::Mean, &key), "COUNT(\"region\")");
        assert_eq!(value_expr("sales", Aggregation::Sum, &key), "SUM(\"sales\")");
        assert_eq!(value_expr("sales", Aggregation::Mean, &key), "AVG(\"sales\")");
        assert_eq!(value_expr("sales", Aggregation::Median, &key), "MEDIAN(\"sales\")");
    }

    #[test]
    fn test_value_label() {
        assert_eq!(value_label("count", Aggregation::Sum), "Count");
        assert_eq!(value_label("sales", Aggregation::Mean), "mean(sales)");
    }

    #[test]
    fn test_closest_column() {
        let columns = vec!["category".to_string(), "amount".to_string()];
        assert_eq!(closest_column("Categroy", &columns), Some("category"));
        assert_eq!(closest_column("zzz", &columns), None);
    }
}
