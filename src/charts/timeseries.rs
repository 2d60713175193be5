//! Time-series charts: values aggregated per day, week or month bucket,
//! optionally split into one trace per group.
//!
//! Timestamps are truncated to their bucket with polars temporal
//! expressions and staged as an auxiliary table; the aggregation itself
//! runs as a query over that table.

use crate::charts::query::{ensure_column, f64_values, label_values, quote_ident, series_labels, value_label, ROW_COUNT};
use crate::charts::{ChartSpec, ChartSummary, ChartType, Frequency, TimeseriesParams, TimeseriesSummary};
use crate::error::{InsightError, Result};
use crate::execution::result::float_to_json;
use crate::loader::Relation;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde_json::{json, Value};

/// Auxiliary table holding bucketed rows.
const BUCKET_TABLE: &str = "time_buckets";

const TS_COLUMN: &str = "ts";

const BUCKET_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Parse a textual timestamp. RFC 3339 offsets are normalized to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Polars truncation interval for a bucket frequency. Week buckets start
/// on Monday.
fn every(freq: Frequency) -> &'static str {
    match freq {
        Frequency::Day => "1d",
        Frequency::Week => "1w",
        Frequency::Month => "1mo",
    }
}

/// The time column as a naive millisecond `Datetime` series named `ts`.
/// Text values go through [`parse_timestamp`]; a non-null value that does
/// not parse is an error.
fn timestamp_series(column: &Series) -> Result<Series> {
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);
    let mut ts = match column.dtype() {
        DataType::Date | DataType::Datetime(_, _) => column.cast(&target)?,
        DataType::String => {
            let millis = column
                .str()?
                .into_iter()
                .map(|raw| match raw {
                    None => Ok(None),
                    Some(raw) => parse_timestamp(raw)
                        .map(|ts| Some(ts.and_utc().timestamp_millis()))
                        .ok_or_else(|| {
                            InsightError::invalid_param(
                                "time_col",
                                format!("value '{}' in column '{}' is not a timestamp", raw, column.name()),
                            )
                        }),
                })
                .collect::<Result<Vec<Option<i64>>>>()?;
            Series::new(TS_COLUMN, millis).cast(&target)?
        }
        other => {
            return Err(InsightError::invalid_param(
                "time_col",
                format!("column '{}' has type {} and holds no timestamps", column.name(), other),
            ))
        }
    };
    ts.rename(TS_COLUMN);
    Ok(ts)
}

/// Add the `bucket` label column to a frame holding `ts`, keeping only rows
/// inside the inclusive `range`.
pub fn bucket_frame(
    staged: DataFrame,
    freq: Frequency,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<DataFrame> {
    let mut lazy = staged.lazy();
    if let Some((start, end)) = range {
        let millis = col(TS_COLUMN).cast(DataType::Int64);
        lazy = lazy.filter(
            millis
                .clone()
                .gt_eq(lit(start.and_utc().timestamp_millis()))
                .and(millis.lt_eq(lit(end.and_utc().timestamp_millis()))),
        );
    }
    let bucketed = lazy
        .with_column(
            col(TS_COLUMN)
                .dt()
                .truncate(lit(every(freq)), "0ns".to_string())
                .dt()
                .strftime(BUCKET_FORMAT)
                .alias("bucket"),
        )
        .collect()?;
    Ok(bucketed)
}

fn parse_time_range(range: &[String]) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let [start, end] = range else {
        return Err(InsightError::invalid_param(
            "time_range",
            format!("expected [start, end], got {} values", range.len()),
        ));
    };
    let parse = |raw: &String| {
        parse_timestamp(raw).ok_or_else(|| {
            InsightError::invalid_param("time_range", format!("'{}' is not a timestamp", raw))
        })
    };
    Ok((parse(start)?, parse(end)?))
}

/// Percent change from `previous` to `last`; `0` when `previous` is zero.
pub fn pct_change(previous: f64, last: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (last - previous) / previous * 100.0
    }
}

pub fn summarize(values: &[Option<f64>], data_points: usize) -> TimeseriesSummary {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let (max_value, min_value, mean_value) = if present.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (
            present.iter().copied().fold(f64::MIN, f64::max),
            present.iter().copied().fold(f64::MAX, f64::min),
            present.iter().sum::<f64>() / present.len() as f64,
        )
    };

    let pct = match values {
        [.., Some(previous), Some(last)] => Some(pct_change(*previous, *last)),
        _ => None,
    };

    TimeseriesSummary {
        max_value,
        min_value,
        mean_value,
        data_points,
        pct_change: pct,
    }
}

pub fn generate(relation: &mut Relation, params: &TimeseriesParams) -> Result<ChartSpec> {
    ensure_column(relation, "time_col", &params.time_col)?;
    if params.value_col != ROW_COUNT {
        ensure_column(relation, "value_col", &params.value_col)?;
    }
    if let Some(group_by) = &params.group_by {
        ensure_column(relation, "group_by", group_by)?;
    }
    let range = params.time_range.as_deref().map(parse_time_range).transpose()?;

    let mut notes = Vec::new();
    if let Some(raw) = &params.time_range {
        notes.push(format!("Time range: {} to {}", raw[0], raw[1]));
    }

    let staged = stage_buckets(relation, params, range)?;
    relation.register_frame(BUCKET_TABLE, staged);

    let value = if params.value_col == ROW_COUNT {
        "COUNT(bucket)".to_string()
    } else {
        format!("{}({})", params.agg.sql_function(), quote_ident("agg_source"))
    };
    let sql = match params.group_by {
        Some(_) => format!(
            "SELECT bucket, series_label, {value} AS agg_value FROM {table} \
             WHERE bucket IS NOT NULL AND series_label IS NOT NULL \
             GROUP BY bucket, series_label ORDER BY bucket, series_label",
            value = value,
            table = BUCKET_TABLE,
        ),
        None => format!(
            "SELECT bucket, {value} AS agg_value FROM {table} \
             WHERE bucket IS NOT NULL GROUP BY bucket ORDER BY bucket",
            value = value,
            table = BUCKET_TABLE,
        ),
    };
    let aggregated = relation.query(&sql)?;

    let buckets: Vec<String> = label_values(&aggregated, 0)?.into_iter().flatten().collect();
    let values = f64_values(&aggregated, aggregated.width() - 1)?;

    let traces = match params.group_by {
        Some(_) => {
            let series = label_values(&aggregated, 1)?;
            grouped_traces(&buckets, &series, &values)
        }
        None => vec![json!({
            "type": "scatter",
            "mode": "lines+markers",
            "name": params.value_col,
            "x": buckets,
            "y": values.iter().map(|v| v.map(float_to_json).unwrap_or(Value::Null)).collect::<Vec<_>>(),
            "line": { "width": 2, "color": "#007aff" },
            "marker": { "size": 4 },
        })],
    };

    let layout = json!({
        "title": params.title.clone().unwrap_or_else(|| format!("{} over time", params.value_col)),
        "xaxis": { "title": "Date", "type": "date" },
        "yaxis": { "title": value_label(&params.value_col, params.agg) },
        "template": "plotly_white",
        "hovermode": "x unified",
    });

    let meta = json!({
        "time_col": params.time_col,
        "value_col": params.value_col,
        "freq": params.freq,
        "aggregation": params.agg,
        "group_by": params.group_by,
        "notes": notes,
    });

    let summary = summarize(&values, aggregated.height());
    Ok(ChartSpec::new(
        ChartType::Timeseries,
        traces,
        layout,
        meta,
        ChartSummary::Timeseries(summary),
    ))
}

/// Build the auxiliary frame `(ts, series_label?, agg_source?, bucket)`.
/// Rows outside the range are dropped; a null timestamp gives a null bucket.
fn stage_buckets(
    relation: &Relation,
    params: &TimeseriesParams,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<DataFrame> {
    let frame = relation.frame();
    let mut columns = vec![timestamp_series(frame.column(&params.time_col)?)?];
    if let Some(group_by) = &params.group_by {
        let labels = series_labels(frame.column(group_by)?)?;
        columns.push(Series::new("series_label", labels));
    }
    if params.value_col != ROW_COUNT {
        let mut source = frame.column(&params.value_col)?.clone();
        source.rename("agg_source");
        columns.push(source);
    }

    bucket_frame(DataFrame::new(columns)?, params.freq, range)
}

/// One trace per series, in order of first appearance.
fn grouped_traces(buckets: &[String], series: &[Option<String>], values: &[Option<f64>]) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    for name in series.iter().flatten() {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }

    order
        .into_iter()
        .map(|name| {
            let points: Vec<(&String, Value)> = buckets
                .iter()
                .zip(series)
                .zip(values)
                .filter(|((_, s), _)| s.as_deref() == Some(name.as_str()))
                .map(|((b, _), v)| (b, v.map(float_to_json).unwrap_or(Value::Null)))
                .collect();
            json!({
                "type": "scatter",
                "mode": "lines+markers",
                "name": name,
                "x": points.iter().map(|(b, _)| b).collect::<Vec<_>>(),
                "y": points.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
                "line": { "width": 2 },
                "marker": { "size": 4 },
            })
        })
        .collect()
}
