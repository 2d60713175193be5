//! Histogram of one numeric column with mean and median reference lines.

use crate::charts::query::{ensure_numeric_column, f64_values, quote_ident, scalar_f64, series_f64};
use crate::charts::{ChartSpec, ChartSummary, ChartType, DistributionParams, DistributionSummary};
use crate::error::{InsightError, Result};
use crate::loader::Relation;
use serde_json::json;
use tracing::debug;

const MIN_AUTO_BINS: usize = 10;
const MAX_AUTO_BINS: usize = 50;

/// Upper bound on a caller-supplied bucket count.
pub const MAX_BINS: usize = 1000;

/// Linear-interpolated quantile of sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Freedman-Diaconis bin count clamped to `[10, 50]`; `round(sqrt(n))`
/// when the IQR is zero.
pub fn auto_bins(count: usize, min: f64, max: f64, iqr: f64) -> usize {
    let n = count as f64;
    if iqr > 0.0 {
        let bin_width = 2.0 * iqr / n.cbrt();
        (((max - min) / bin_width) as usize).clamp(MIN_AUTO_BINS, MAX_AUTO_BINS)
    } else {
        (n.sqrt().round() as usize).max(1)
    }
}

/// Spread bucket counts over `0..bins`, folding indexes past the end (the
/// maximum itself) into the last bucket.
pub fn fill_bins(indexes: &[Option<f64>], counts: &[Option<f64>], bins: usize) -> Vec<u64> {
    let mut filled = vec![0u64; bins];
    for (index, count) in indexes.iter().zip(counts) {
        let (Some(index), Some(count)) = (index, count) else {
            continue;
        };
        let slot = (index.max(0.0) as usize).min(bins - 1);
        filled[slot] += *count as u64;
    }
    filled
}

pub fn generate(relation: &mut Relation, params: &DistributionParams) -> Result<ChartSpec> {
    ensure_numeric_column(relation, "value_col", &params.value_col)?;
    match params.bins {
        Some(0) => return Err(InsightError::invalid_param("bins", "must be at least 1")),
        Some(bins) if bins > MAX_BINS => {
            return Err(InsightError::invalid_param(
                "bins",
                format!("{} exceeds the maximum of {}", bins, MAX_BINS),
            ))
        }
        _ => {}
    }

    let table = quote_ident(relation.table_name());
    let column = quote_ident(&params.value_col);

    let stats_sql = format!(
        "SELECT MIN({c}) AS min_value, MAX({c}) AS max_value, AVG({c}) AS mean_value, \
         MEDIAN({c}) AS median_value, STDDEV({c}) AS std_value, COUNT(*) AS value_count \
         FROM {t} WHERE {c} IS NOT NULL",
        c = column,
        t = table,
    );
    let stats = relation.query(&stats_sql)?;
    let count = scalar_f64(&stats, 5)?.unwrap_or(0.0) as usize;
    if count == 0 {
        return Err(InsightError::invalid_param(
            "value_col",
            format!("column '{}' has no non-null values", params.value_col),
        ));
    }
    let min = scalar_f64(&stats, 0)?.unwrap_or(0.0);
    let max = scalar_f64(&stats, 1)?.unwrap_or(0.0);
    let mean = scalar_f64(&stats, 2)?.unwrap_or(0.0);
    let median = scalar_f64(&stats, 3)?.unwrap_or(0.0);
    let std = scalar_f64(&stats, 4)?.unwrap_or(0.0);

    let mut notes = Vec::new();
    let bins = match params.bins {
        Some(bins) => bins,
        None => {
            let mut values: Vec<f64> = series_f64(relation.frame().column(&params.value_col)?)?
                .into_iter()
                .flatten()
                .collect();
            values.sort_by(|a, b| a.total_cmp(b));
            let iqr = match (quantile(&values, 0.75), quantile(&values, 0.25)) {
                (Some(q3), Some(q1)) => q3 - q1,
                _ => 0.0,
            };
            let bins = auto_bins(count, min, max, iqr);
            debug!("IQR {} over {} values gives {} bins", iqr, count, bins);
            notes.push(format!("Auto-calculated bins: {}", bins));
            bins
        }
    };

    let span = max - min;
    let bin_width = if span > 0.0 { span / bins as f64 } else { 1.0 };

    let histogram_sql = format!(
        "WITH binned AS (\
           SELECT FLOOR((CAST({c} AS DOUBLE) - ({min})) / ({width})) AS bin_index \
           FROM {t} WHERE {c} IS NOT NULL\
         ) \
         SELECT bin_index, COUNT(bin_index) AS bin_count FROM binned \
         GROUP BY bin_index ORDER BY bin_index",
        c = column,
        t = table,
        min = min,
        width = bin_width,
    );
    let histogram = relation.query(&histogram_sql)?;
    let counts = fill_bins(&f64_values(&histogram, 0)?, &f64_values(&histogram, 1)?, bins);
    let starts: Vec<f64> = (0..bins).map(|i| min + i as f64 * bin_width).collect();

    let trace = json!({
        "type": "bar",
        "x": starts,
        "y": counts,
        "marker": { "color": "#007aff" },
        "name": "Frequency",
    });

    let shapes = json!([
        {
            "type": "line",
            "x0": mean, "x1": mean,
            "y0": 0, "y1": 1,
            "yref": "paper",
            "line": { "color": "red", "width": 2, "dash": "dash" },
            "name": "Mean",
        },
        {
            "type": "line",
            "x0": median, "x1": median,
            "y0": 0, "y1": 1,
            "yref": "paper",
            "line": { "color": "green", "width": 2, "dash": "dash" },
            "name": "Median",
        },
    ]);

    let layout = json!({
        "title": params.title.clone().unwrap_or_else(|| format!("Distribution of {}", params.value_col)),
        "xaxis": { "title": params.value_col },
        "yaxis": { "title": "Frequency" },
        "template": "plotly_white",
        "shapes": shapes,
    });

    let meta = json!({
        "value_col": params.value_col,
        "bins": bins,
        "bin_width": bin_width,
        "notes": notes,
    });

    Ok(ChartSpec::new(
        ChartType::Distribution,
        vec![trace],
        layout,
        meta,
        ChartSummary::Distribution(DistributionSummary {
            min,
            max,
            mean,
            median,
            std,
            count,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile(&sorted, 0.5), Some(2.5));
        assert_eq!(quantile(&sorted, 0.75), Some(3.25));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_auto_bins_zero_iqr_uses_sqrt() {
        assert_eq!(auto_bins(16, 0.0, 10.0, 0.0), 4);
        assert_eq!(auto_bins(10, 0.0, 10.0, 0.0), 3);
        assert_eq!(auto_bins(1, 5.0, 5.0, 0.0), 1);
    }

    #[test]
    fn test_auto_bins_is_clamped() {
        // width = 2 * 1 / 1000^(1/3) = 0.2, range 1 gives 5 -> clamped up
        assert_eq!(auto_bins(1000, 0.0, 1.0, 1.0), MIN_AUTO_BINS);
        // range 100 gives 500 -> clamped down
        assert_eq!(auto_bins(1000, 0.0, 100.0, 1.0), MAX_AUTO_BINS);
        // range 4.1 gives 20.5
        assert_eq!(auto_bins(1000, 0.0, 4.1, 1.0), 20);
    }

    #[test]
    fn test_fill_bins_folds_maximum_into_last() {
        let indexes = [Some(0.0), Some(2.0), Some(4.0)];
        let counts = [Some(3.0), Some(1.0), Some(2.0)];
        assert_eq!(fill_bins(&indexes, &counts, 4), vec![3, 0, 1, 2]);
    }
}
