use polars::prelude::*;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use tabular_insight::charts::distribution::MAX_BINS;
use tabular_insight::charts::{
    CategoricalParams, ChartEngine, ChartRequest, ChartSummary, ChartType, DistributionParams,
    Frequency, HeatmapParams, TimeseriesParams,
};
use tabular_insight::config::Settings;
use tabular_insight::error::InsightError;
use tempfile::TempDir;

fn write_parquet(dir: &Path, name: &str, mut df: DataFrame) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    ParquetWriter::new(&mut file).finish(&mut df).unwrap();
    path
}

fn write_csv(dir: &Path, name: &str, mut df: DataFrame) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(&mut df).unwrap();
    path
}

fn repeated(pairs: &[(&str, usize)]) -> Vec<String> {
    pairs
        .iter()
        .flat_map(|(label, n)| std::iter::repeat(label.to_string()).take(*n))
        .collect()
}

fn numbers(value: &Value) -> Vec<f64> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect()
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

fn engine() -> ChartEngine {
    ChartEngine::new(&Settings::default())
}

#[test]
fn test_bar_top_k_collapses_remainder_into_others() {
    let dir = TempDir::new().unwrap();
    let categories = repeated(&[("A", 10), ("B", 7), ("C", 2), ("D", 1)]);
    let path = write_parquet(dir.path(), "cats.parquet", df!["category" => categories].unwrap());

    let mut params = CategoricalParams::new("category");
    params.top_k = 2;
    let spec = engine().generate(&path, &ChartRequest::Bar(params)).unwrap();

    assert_eq!(spec.chart_type, ChartType::Bar);
    assert_eq!(spec.traces.len(), 1);
    assert_eq!(strings(&spec.traces[0]["x"]), vec!["A", "B", "Others"]);
    assert_eq!(numbers(&spec.traces[0]["y"]), vec![10.0, 7.0, 3.0]);
    assert!(spec.notes().is_empty());
    assert_eq!(spec.layout["title"], "category Distribution");

    match spec.summary {
        ChartSummary::Bar(summary) => {
            assert_eq!(summary.total_value, 20.0);
            assert_eq!(summary.top_value, 10.0);
            assert_eq!(summary.categories_count, 3);
        }
        other => panic!("unexpected summary {:?}", other),
    }
}

#[test]
fn test_bar_excludes_null_categories() {
    let dir = TempDir::new().unwrap();
    let df = df![
        "category" => [Some("A"), Some("A"), Some("A"), None, None, None, None, None, Some("B")]
    ]
    .unwrap();
    let path = write_parquet(dir.path(), "nulls.parquet", df);

    let mut params = CategoricalParams::new("category");
    params.top_k = 1;
    let spec = engine().generate(&path, &ChartRequest::Bar(params)).unwrap();

    assert_eq!(strings(&spec.traces[0]["x"]), vec!["A", "Others"]);
    assert_eq!(numbers(&spec.traces[0]["y"]), vec![3.0, 1.0]);
    match spec.summary {
        ChartSummary::Bar(summary) => assert_eq!(summary.total_value, 4.0),
        other => panic!("unexpected summary {:?}", other),
    }
}

#[test]
fn test_bar_sums_value_column() {
    let dir = TempDir::new().unwrap();
    let df = df![
        "region" => ["north", "south", "north", "east"],
        "sales" => [5.0f64, 20.0, 7.0, 1.0]
    ]
    .unwrap();
    let path = write_parquet(dir.path(), "sales.parquet", df);

    let request = ChartRequest::from_json(
        r#"{"chart_type": "bar", "category_col": "region", "value_col": "sales", "top_k": 2}"#,
    )
    .unwrap();
    let spec = engine().generate(&path, &request).unwrap();
    assert_eq!(strings(&spec.traces[0]["x"]), vec!["south", "north", "Others"]);
    assert_eq!(numbers(&spec.traces[0]["y"]), vec![20.0, 12.0, 1.0]);
    assert_eq!(spec.layout["yaxis"]["title"], "sum(sales)");
}

#[test]
fn test_pie_notes_dominant_others() {
    let dir = TempDir::new().unwrap();
    let categories: Vec<String> = (0..10).map(|i| format!("c{}", i)).collect();
    let path = write_parquet(dir.path(), "many.parquet", df!["kind" => categories].unwrap());

    let mut params = CategoricalParams::new("kind");
    params.top_k = 2;
    let spec = engine().generate(&path, &ChartRequest::Pie(params)).unwrap();

    assert_eq!(spec.chart_type, ChartType::Pie);
    assert_eq!(spec.traces[0]["type"], "pie");
    assert_eq!(numbers(&spec.traces[0]["values"]), vec![1.0, 1.0, 8.0]);
    assert_eq!(spec.notes(), vec!["Too many categories, consider using bar chart instead"]);
    match spec.summary {
        ChartSummary::Pie(summary) => {
            assert_eq!(summary.total_value, 10.0);
            assert_eq!(summary.categories_count, 3);
        }
        other => panic!("unexpected summary {:?}", other),
    }
}

#[test]
fn test_unknown_column_names_the_parameter() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(dir.path(), "cats.parquet", df!["category" => ["a", "b"]].unwrap());

    let err = engine()
        .generate(&path, &ChartRequest::Bar(CategoricalParams::new("categroy")))
        .unwrap_err();
    match err {
        InsightError::InvalidParameter { param, reason } => {
            assert_eq!(param, "category_col");
            assert!(reason.contains("did you mean 'category'"), "{}", reason);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_distribution_zero_iqr_falls_back_to_sqrt_bins() {
    let dir = TempDir::new().unwrap();
    let mut values = vec![5.0f64; 15];
    values.push(9.0);
    let path = write_parquet(dir.path(), "values.parquet", df!["v" => values].unwrap());

    let params = DistributionParams { value_col: "v".to_string(), bins: None, title: None };
    let spec = engine().generate(&path, &ChartRequest::Distribution(params)).unwrap();

    assert_eq!(spec.meta["bins"], 4);
    assert_eq!(spec.notes(), vec!["Auto-calculated bins: 4"]);
    let counts = numbers(&spec.traces[0]["y"]);
    assert_eq!(counts, vec![15.0, 0.0, 0.0, 1.0]);
    assert_eq!(numbers(&spec.traces[0]["x"]), vec![5.0, 6.0, 7.0, 8.0]);

    let shapes = spec.layout["shapes"].as_array().unwrap();
    assert_eq!(shapes.len(), 2);
    assert_eq!(shapes[0]["line"]["color"], "red");
    assert_eq!(shapes[1]["line"]["color"], "green");

    match spec.summary {
        ChartSummary::Distribution(summary) => {
            assert_eq!(summary.count, 16);
            assert_eq!(summary.min, 5.0);
            assert_eq!(summary.max, 9.0);
            assert_eq!(summary.median, 5.0);
            assert!((summary.mean - 5.25).abs() < 1e-9);
        }
        other => panic!("unexpected summary {:?}", other),
    }
}

#[test]
fn test_distribution_explicit_bins_place_maximum_in_last_bucket() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(dir.path(), "values.parquet", df!["v" => [1i64, 2, 3, 4]].unwrap());

    let params = DistributionParams { value_col: "v".to_string(), bins: Some(2), title: Some("Spread".to_string()) };
    let spec = engine().generate(&path, &ChartRequest::Distribution(params)).unwrap();

    assert_eq!(numbers(&spec.traces[0]["y"]), vec![2.0, 2.0]);
    assert!(spec.notes().is_empty());
    assert_eq!(spec.layout["title"], "Spread");
}

#[test]
fn test_distribution_rejects_out_of_range_bins() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(dir.path(), "values.parquet", df!["v" => [1i64, 2, 3, 4]].unwrap());

    for bins in [0, MAX_BINS + 1, usize::MAX / 4] {
        let params = DistributionParams { value_col: "v".to_string(), bins: Some(bins), title: None };
        let err = engine().generate(&path, &ChartRequest::Distribution(params)).unwrap_err();
        assert!(matches!(err, InsightError::InvalidParameter { ref param, .. } if param == "bins"));
    }

    let params = DistributionParams { value_col: "v".to_string(), bins: Some(MAX_BINS), title: None };
    let spec = engine().generate(&path, &ChartRequest::Distribution(params)).unwrap();
    assert_eq!(numbers(&spec.traces[0]["y"]).iter().sum::<f64>(), 4.0);
}

#[test]
fn test_distribution_requires_numeric_column() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(dir.path(), "text.parquet", df!["name" => ["a", "b"]].unwrap());

    let params = DistributionParams { value_col: "name".to_string(), bins: None, title: None };
    let err = engine().generate(&path, &ChartRequest::Distribution(params)).unwrap_err();
    assert!(matches!(err, InsightError::InvalidParameter { ref param, .. } if param == "value_col"));
}

#[test]
fn test_heatmap_needs_two_numeric_columns() {
    let dir = TempDir::new().unwrap();
    let df = df![
        "amount" => [1.0f64, 2.0, 3.0],
        "name" => ["a", "b", "c"]
    ]
    .unwrap();
    let path = write_parquet(dir.path(), "one.parquet", df);

    let err = engine()
        .generate(&path, &ChartRequest::Heatmap(HeatmapParams::default()))
        .unwrap_err();
    assert!(matches!(err, InsightError::InsufficientColumns(_)));
}

#[test]
fn test_heatmap_ranks_correlations() {
    let dir = TempDir::new().unwrap();
    let df = df![
        "a" => [1.0f64, 2.0, 3.0, 4.0, 5.0],
        "b" => [2i64, 4, 6, 8, 10],
        "c" => [5.0f64, 3.0, 4.0, 1.0, 2.0],
        "label" => ["v", "w", "x", "y", "z"]
    ]
    .unwrap();
    let path = write_parquet(dir.path(), "corr.parquet", df);

    let spec = engine()
        .generate(&path, &ChartRequest::Heatmap(HeatmapParams::default()))
        .unwrap();

    assert_eq!(strings(&spec.traces[0]["x"]), vec!["a", "b", "c"]);
    assert_eq!(spec.traces[0]["text"][0][1], "1.00");
    assert_eq!(spec.layout["width"], 690);
    assert_eq!(spec.notes(), vec!["Auto-selected 3 numeric columns"]);

    match spec.summary {
        ChartSummary::Heatmap(summary) => {
            assert_eq!(summary.columns_count, 3);
            assert_eq!(summary.top_correlations.len(), 3);
            let top = &summary.top_correlations[0];
            assert_eq!((top.col1.as_str(), top.col2.as_str()), ("a", "b"));
            assert!((top.correlation - 1.0).abs() < 1e-9);
        }
        other => panic!("unexpected summary {:?}", other),
    }
}

fn daily_sales(dir: &Path) -> PathBuf {
    let df = df![
        "day" => ["2024-01-01", "2024-01-01", "2024-01-02", "2024-01-08"],
        "amount" => [10i64, 5, 7, 3],
        "region" => ["north", "south", "north", "south"]
    ]
    .unwrap();
    write_csv(dir, "sales.csv", df)
}

#[test]
fn test_timeseries_daily_buckets() {
    let dir = TempDir::new().unwrap();
    let path = daily_sales(dir.path());

    let mut params = TimeseriesParams::new("day");
    params.value_col = "amount".to_string();
    let spec = engine().generate(&path, &ChartRequest::Timeseries(params)).unwrap();

    assert_eq!(spec.traces.len(), 1);
    assert_eq!(
        strings(&spec.traces[0]["x"]),
        vec!["2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z", "2024-01-08T00:00:00Z"]
    );
    assert_eq!(numbers(&spec.traces[0]["y"]), vec![15.0, 7.0, 3.0]);
    assert_eq!(spec.layout["title"], "amount over time");

    match spec.summary {
        ChartSummary::Timeseries(summary) => {
            assert_eq!(summary.data_points, 3);
            assert_eq!(summary.max_value, 15.0);
            assert_eq!(summary.min_value, 3.0);
            let pct = summary.pct_change.unwrap();
            assert!((pct - (3.0 - 7.0) / 7.0 * 100.0).abs() < 1e-9);
        }
        other => panic!("unexpected summary {:?}", other),
    }
}

#[test]
fn test_timeseries_weekly_counts() {
    let dir = TempDir::new().unwrap();
    let path = daily_sales(dir.path());

    let mut params = TimeseriesParams::new("day");
    params.freq = Frequency::Week;
    let spec = engine().generate(&path, &ChartRequest::Timeseries(params)).unwrap();

    assert_eq!(
        strings(&spec.traces[0]["x"]),
        vec!["2024-01-01T00:00:00Z", "2024-01-08T00:00:00Z"]
    );
    assert_eq!(numbers(&spec.traces[0]["y"]), vec![3.0, 1.0]);
    assert_eq!(spec.layout["yaxis"]["title"], "Count");
}

#[test]
fn test_timeseries_groups_and_range() {
    let dir = TempDir::new().unwrap();
    let path = daily_sales(dir.path());

    let request = ChartRequest::from_json(
        r#"{"chart_type": "timeseries", "time_col": "day", "value_col": "amount",
            "group_by": "region", "time_range": ["2024-01-01", "2024-01-02"]}"#,
    )
    .unwrap();
    let spec = engine().generate(&path, &request).unwrap();

    let names: Vec<&str> = spec.traces.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["north", "south"]);
    assert_eq!(numbers(&spec.traces[0]["y"]), vec![10.0, 7.0]);
    assert_eq!(strings(&spec.traces[1]["x"]), vec!["2024-01-01T00:00:00Z"]);
    assert_eq!(spec.notes(), vec!["Time range: 2024-01-01 to 2024-01-02"]);
}

#[test]
fn test_chart_ids_are_fresh() {
    let dir = TempDir::new().unwrap();
    let path = write_parquet(dir.path(), "cats.parquet", df!["c" => ["x", "y"]].unwrap());
    let request = ChartRequest::Bar(CategoricalParams::new("c"));

    let first = engine().generate(&path, &request).unwrap();
    let second = engine().generate(&path, &request).unwrap();
    assert_ne!(first.chart_id, second.chart_id);
}

#[test]
fn test_unknown_chart_type_is_rejected() {
    let err = ChartRequest::from_json(r#"{"chart_type": "radar", "columns": ["a"]}"#).unwrap_err();
    assert!(matches!(err, InsightError::UnsupportedChartType(ref t) if t == "radar"));
}
