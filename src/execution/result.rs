//! Query Outcome - normalized, JSON-safe result of one guarded execution

use crate::error::{InsightError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row: column name -> JSON scalar, in result column order.
pub type Record = serde_json::Map<String, Value>;

/// Outcome of a guarded execution. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Success {
        rows: Vec<Record>,
        columns: Vec<String>,
        row_count: usize,
        elapsed_seconds: f64,
        /// The SQL that actually ran, including an appended LIMIT.
        executed_sql: String,
    },
    Failure {
        reason: String,
        attempted_sql: String,
    },
}

impl QueryOutcome {
    pub fn failure(reason: impl Into<String>, attempted_sql: impl Into<String>) -> Self {
        QueryOutcome::Failure {
            reason: reason.into(),
            attempted_sql: attempted_sql.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success { .. })
    }

    pub fn rows(&self) -> &[Record] {
        match self {
            QueryOutcome::Success { rows, .. } => rows,
            QueryOutcome::Failure { .. } => &[],
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            QueryOutcome::Success { columns, .. } => columns,
            QueryOutcome::Failure { .. } => &[],
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Success { row_count, .. } => *row_count,
            QueryOutcome::Failure { .. } => 0,
        }
    }

    /// The SQL this outcome is attributable to.
    pub fn sql(&self) -> &str {
        match self {
            QueryOutcome::Success { executed_sql, .. } => executed_sql,
            QueryOutcome::Failure { attempted_sql, .. } => attempted_sql,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryOutcome::Success { .. } => None,
            QueryOutcome::Failure { reason, .. } => Some(reason),
        }
    }
}

/// Convert a DataFrame to JSON-safe records. Missing and NaN values become
/// `null`; temporal values become ISO-8601 strings.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<Record>> {
    let columns = df.get_columns();
    let mut rows = Vec::with_capacity(df.height());

    for row_idx in 0..df.height() {
        let mut row = Record::new();
        for series in columns {
            let value = series
                .get(row_idx)
                .map_err(|e| InsightError::Execution(format!("Failed to get value: {}", e)))?;
            row.insert(series.name().to_string(), any_value_to_json(&value));
        }
        rows.push(row);
    }

    Ok(rows)
}

pub fn any_value_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(i) => Value::Number((*i).into()),
        AnyValue::Int16(i) => Value::Number((*i).into()),
        AnyValue::Int32(i) => Value::Number((*i).into()),
        AnyValue::Int64(i) => Value::Number((*i).into()),
        AnyValue::UInt8(u) => Value::Number((*u).into()),
        AnyValue::UInt16(u) => Value::Number((*u).into()),
        AnyValue::UInt32(u) => Value::Number((*u).into()),
        AnyValue::UInt64(u) => Value::Number((*u).into()),
        AnyValue::Float32(f) => float_to_json(*f as f64),
        AnyValue::Float64(f) => float_to_json(*f),
        AnyValue::Date(days) => date_to_iso(*days)
            .map(Value::String)
            .unwrap_or(Value::Null),
        AnyValue::Datetime(v, unit, _) => datetime_to_iso(*v, *unit)
            .map(Value::String)
            .unwrap_or(Value::Null),
        AnyValue::Time(nanos) => time_to_iso(*nanos)
            .map(Value::String)
            .unwrap_or(Value::Null),
        other => Value::String(other.to_string()),
    }
}

/// Non-finite floats have no JSON representation.
pub fn float_to_json(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub fn date_to_iso(days_since_epoch: i32) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let date = epoch.checked_add_signed(chrono::Duration::days(days_since_epoch as i64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

pub fn datetime_to_iso(value: i64, unit: TimeUnit) -> Option<String> {
    let dt: DateTime<Utc> = match unit {
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(value),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value)?,
    };
    Some(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn time_to_iso(nanos_since_midnight: i64) -> Option<String> {
    let secs = u32::try_from(nanos_since_midnight / 1_000_000_000).ok()?;
    let nanos = u32::try_from(nanos_since_midnight % 1_000_000_000).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
    Some(time.format("%H:%M:%S%.f").to_string())
}
