//! Correlation heatmap over numeric columns.

use crate::charts::query::{ensure_numeric_column, f64_values, quote_ident};
use crate::charts::{ChartSpec, ChartSummary, ChartType, CorrelationPair, HeatmapParams, HeatmapSummary};
use crate::error::{InsightError, Result};
use crate::execution::result::float_to_json;
use crate::loader::Relation;
use crate::metadata::is_numeric_label;
use itertools::Itertools;
use serde_json::{json, Value};

pub const MAX_COLUMNS: usize = 20;
pub const TOP_PAIRS: usize = 5;

/// Pearson correlation over rows where both values are present. `None`
/// with fewer than two such rows or zero variance.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

pub fn correlation_matrix(columns: &[Vec<Option<f64>>]) -> Vec<Vec<Option<f64>>> {
    columns
        .iter()
        .map(|x| columns.iter().map(|y| pearson(x, y)).collect())
        .collect()
}

/// Off-diagonal pairs ranked by absolute correlation, strongest first.
pub fn top_pairs(names: &[String], matrix: &[Vec<Option<f64>>], limit: usize) -> Vec<CorrelationPair> {
    (0..names.len())
        .tuple_combinations()
        .filter_map(|(i, j)| {
            matrix[i][j].map(|correlation| CorrelationPair {
                col1: names[i].clone(),
                col2: names[j].clone(),
                correlation,
            })
        })
        .sorted_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()))
        .take(limit)
        .collect()
}

pub fn generate(relation: &mut Relation, params: &HeatmapParams) -> Result<ChartSpec> {
    let mut notes = Vec::new();

    let mut columns = match &params.columns {
        Some(columns) => {
            for column in columns {
                ensure_numeric_column(relation, "columns", column)?;
            }
            columns.clone()
        }
        None => {
            let numeric: Vec<String> = relation
                .schema()
                .into_iter()
                .filter(|c| is_numeric_label(&c.type_label))
                .map(|c| c.name)
                .collect();
            notes.push(format!("Auto-selected {} numeric columns", numeric.len()));
            numeric
        }
    };

    if columns.len() < 2 {
        return Err(InsightError::InsufficientColumns(format!(
            "at least 2 numeric columns required for correlation matrix, found {}",
            columns.len()
        )));
    }
    if columns.len() > MAX_COLUMNS {
        notes.push("Too many columns, consider dimensionality reduction or select key columns".to_string());
        columns.truncate(MAX_COLUMNS);
    }

    let sql = format!(
        "SELECT {} FROM {}",
        columns.iter().map(|c| quote_ident(c)).join(", "),
        quote_ident(relation.table_name())
    );
    let frame = relation.query(&sql)?;
    let values = (0..columns.len())
        .map(|idx| f64_values(&frame, idx))
        .collect::<Result<Vec<_>>>()?;

    let matrix = correlation_matrix(&values);
    let z: Vec<Vec<Value>> = matrix
        .iter()
        .map(|row| row.iter().map(|v| v.map(float_to_json).unwrap_or(Value::Null)).collect())
        .collect();
    let text: Vec<Vec<String>> = matrix
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| v.map(|r| format!("{:.2}", r)).unwrap_or_else(|| "nan".to_string()))
                .collect()
        })
        .collect();

    let trace = json!({
        "type": "heatmap",
        "z": z,
        "x": columns,
        "y": columns,
        "colorscale": "RdBu",
        "zmid": 0,
        "zmin": -1,
        "zmax": 1,
        "text": text,
        "texttemplate": "%{text}",
        "textfont": { "size": 10 },
        "hovertemplate": "X: %{x}<br>Y: %{y}<br>Correlation: %{z:.3f}<extra></extra>",
    });

    let size = 600 + columns.len() * 30;
    let layout = json!({
        "title": params.title.clone().unwrap_or_else(|| "Correlation Matrix".to_string()),
        "xaxis": { "title": "", "side": "bottom" },
        "yaxis": { "title": "" },
        "template": "plotly_white",
        "width": size,
        "height": size,
    });

    let summary = HeatmapSummary {
        columns_count: columns.len(),
        top_correlations: top_pairs(&columns, &matrix, TOP_PAIRS),
    };
    let meta = json!({ "columns": columns, "notes": notes });

    Ok(ChartSpec::new(
        ChartType::Heatmap,
        vec![trace],
        layout,
        meta,
        ChartSummary::Heatmap(summary),
    ))
}
