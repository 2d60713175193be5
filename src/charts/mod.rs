//! Chart Aggregation Engine
//!
//! Each chart request loads the file into a private relation, runs one or
//! more templated aggregation queries against it and assembles a
//! renderer-agnostic [`ChartSpec`]. The relation is released when
//! [`ChartEngine::generate`] returns, on success and on error alike.

pub mod categorical;
pub mod correlation;
pub mod distribution;
pub mod query;
pub mod timeseries;

use crate::config::Settings;
use crate::error::{InsightError, Result};
use crate::loader::Loader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Timeseries,
    Pie,
    Distribution,
    Heatmap,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Timeseries => "timeseries",
            ChartType::Pie => "pie",
            ChartType::Distribution => "distribution",
            ChartType::Heatmap => "heatmap",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bar" => Ok(ChartType::Bar),
            "timeseries" => Ok(ChartType::Timeseries),
            "pie" => Ok(ChartType::Pie),
            "distribution" => Ok(ChartType::Distribution),
            "heatmap" => Ok(ChartType::Heatmap),
            other => Err(InsightError::UnsupportedChartType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Aggregation {
    #[default]
    Sum,
    Count,
    Mean,
    Median,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
        }
    }

    pub fn sql_function(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Count => "COUNT",
            Aggregation::Mean => "AVG",
            Aggregation::Median => "MEDIAN",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Aggregation {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "count" => Ok(Aggregation::Count),
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            _ => Err(format!(
                "unknown aggregation '{}', expected one of sum, count, mean, median",
                value
            )),
        }
    }
}

impl From<Aggregation> for String {
    fn from(agg: Aggregation) -> Self {
        agg.as_str().to_string()
    }
}

/// Time bucket granularity: day, week (starting Monday) or month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    #[default]
    Day,
    Week,
    Month,
}

impl Frequency {
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Day => "D",
            Frequency::Week => "W",
            Frequency::Month => "M",
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.to_uppercase().as_str() {
            "D" => Ok(Frequency::Day),
            "W" => Ok(Frequency::Week),
            "M" => Ok(Frequency::Month),
            _ => Err(format!("unknown frequency '{}', expected one of D, W, M", value)),
        }
    }
}

impl From<Frequency> for String {
    fn from(freq: Frequency) -> Self {
        freq.code().to_string()
    }
}

fn default_value_col() -> String {
    query::ROW_COUNT.to_string()
}

fn default_top_k() -> usize {
    8
}

/// Parameters shared by bar and pie charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalParams {
    pub category_col: String,
    #[serde(default = "default_value_col")]
    pub value_col: String,
    #[serde(default)]
    pub agg: Aggregation,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub title: Option<String>,
}

impl CategoricalParams {
    pub fn new(category_col: impl Into<String>) -> Self {
        Self {
            category_col: category_col.into(),
            value_col: default_value_col(),
            agg: Aggregation::default(),
            top_k: default_top_k(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesParams {
    pub time_col: String,
    #[serde(default = "default_value_col")]
    pub value_col: String,
    #[serde(default)]
    pub freq: Frequency,
    #[serde(default)]
    pub agg: Aggregation,
    #[serde(default)]
    pub group_by: Option<String>,
    /// Inclusive `[start, end]` filter on the raw timestamps.
    #[serde(default)]
    pub time_range: Option<Vec<String>>,
    #[serde(default)]
    pub title: Option<String>,
}

impl TimeseriesParams {
    pub fn new(time_col: impl Into<String>) -> Self {
        Self {
            time_col: time_col.into(),
            value_col: default_value_col(),
            freq: Frequency::default(),
            agg: Aggregation::default(),
            group_by: None,
            time_range: None,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionParams {
    pub value_col: String,
    /// Bucket count. Derived from the data when absent.
    #[serde(default)]
    pub bins: Option<usize>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeatmapParams {
    /// Columns to correlate. All numeric columns when absent.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A chart request: the chart type tag plus its typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chart_type", rename_all = "lowercase")]
pub enum ChartRequest {
    Bar(CategoricalParams),
    Timeseries(TimeseriesParams),
    Pie(CategoricalParams),
    Distribution(DistributionParams),
    Heatmap(HeatmapParams),
}

impl ChartRequest {
    pub fn chart_type(&self) -> ChartType {
        match self {
            ChartRequest::Bar(_) => ChartType::Bar,
            ChartRequest::Timeseries(_) => ChartType::Timeseries,
            ChartRequest::Pie(_) => ChartType::Pie,
            ChartRequest::Distribution(_) => ChartType::Distribution,
            ChartRequest::Heatmap(_) => ChartType::Heatmap,
        }
    }

    /// Parse a request object such as
    /// `{"chart_type": "bar", "category_col": "region", "top_k": 5}`.
    ///
    /// A missing or unknown `chart_type` is `UnsupportedChartType`; bad
    /// parameters are `InvalidParameter`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let tag = value
            .get("chart_type")
            .and_then(Value::as_str)
            .ok_or_else(|| InsightError::UnsupportedChartType("missing chart_type".to_string()))?;
        let chart_type = ChartType::from_str(tag)?;

        Ok(match chart_type {
            ChartType::Bar => ChartRequest::Bar(parse_params(chart_type, value)?),
            ChartType::Timeseries => ChartRequest::Timeseries(parse_params(chart_type, value)?),
            ChartType::Pie => ChartRequest::Pie(parse_params(chart_type, value)?),
            ChartType::Distribution => ChartRequest::Distribution(parse_params(chart_type, value)?),
            ChartType::Heatmap => ChartRequest::Heatmap(parse_params(chart_type, value)?),
        })
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(chart_type: ChartType, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| InsightError::invalid_param(chart_type.as_str(), e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSummary {
    pub total_value: f64,
    pub top_value: f64,
    pub categories_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieSummary {
    pub total_value: f64,
    pub categories_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesSummary {
    pub max_value: f64,
    pub min_value: f64,
    pub mean_value: f64,
    pub data_points: usize,
    /// Percent change between the last two points; `0` when the earlier one is zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pct_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub col1: String,
    pub col2: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapSummary {
    pub columns_count: usize,
    pub top_correlations: Vec<CorrelationPair>,
}

/// Derived statistics attached to a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartSummary {
    Bar(BarSummary),
    Timeseries(TimeseriesSummary),
    Distribution(DistributionSummary),
    Heatmap(HeatmapSummary),
    Pie(PieSummary),
}

/// Renderer-agnostic chart payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_id: String,
    pub chart_type: ChartType,
    pub traces: Vec<Value>,
    pub layout: Value,
    /// Generation parameters plus a `notes` array of advisories.
    pub meta: Value,
    pub summary: ChartSummary,
}

impl ChartSpec {
    pub fn new(
        chart_type: ChartType,
        traces: Vec<Value>,
        layout: Value,
        meta: Value,
        summary: ChartSummary,
    ) -> Self {
        Self {
            chart_id: uuid::Uuid::new_v4().to_string(),
            chart_type,
            traces,
            layout,
            meta,
            summary,
        }
    }

    pub fn notes(&self) -> Vec<&str> {
        self.meta
            .get("notes")
            .and_then(Value::as_array)
            .map(|notes| notes.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Entry point for chart generation. Holds no loaded data between calls.
pub struct ChartEngine {
    loader: Loader,
    table_name: String,
}

impl ChartEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            loader: Loader::new(settings),
            table_name: settings.table_name.clone(),
        }
    }

    pub fn generate(&self, source: &Path, request: &ChartRequest) -> Result<ChartSpec> {
        let mut relation = self.loader.load(source, &self.table_name)?;
        info!("Generating {} chart from {}", request.chart_type(), source.display());

        let spec = match request {
            ChartRequest::Bar(params) => categorical::generate(&mut relation, ChartType::Bar, params),
            ChartRequest::Pie(params) => categorical::generate(&mut relation, ChartType::Pie, params),
            ChartRequest::Timeseries(params) => timeseries::generate(&mut relation, params),
            ChartRequest::Distribution(params) => distribution::generate(&mut relation, params),
            ChartRequest::Heatmap(params) => correlation::generate(&mut relation, params),
        }?;

        info!(
            chart_id = %spec.chart_id,
            "Generated {} chart with {} traces",
            spec.chart_type,
            spec.traces.len()
        );
        Ok(spec)
    }
}
