//! Bar and pie charts: top-K ranking of an aggregated value per category,
//! with the remainder collapsed into an "Others" group.

use crate::charts::query::{
    ensure_column, f64_values, label_values, quote_ident, scalar_f64, value_expr, value_label, ROW_COUNT,
};
use crate::charts::{BarSummary, CategoricalParams, ChartSpec, ChartSummary, ChartType, PieSummary};
use crate::error::{InsightError, Result};
use crate::execution::result::float_to_json;
use crate::loader::Relation;
use serde_json::{json, Value};
use tracing::debug;

pub const OTHERS_LABEL: &str = "Others";

/// Share of the total above which the Others group triggers an advisory.
const OTHERS_NOTE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TopK {
    pub groups: Vec<(String, f64)>,
    /// Value of the synthetic Others group, when positive.
    pub others: Option<f64>,
    pub total: f64,
}

impl TopK {
    pub fn others_ratio(&self) -> f64 {
        match self.others {
            Some(others) if self.total > 0.0 => others / self.total,
            _ => 0.0,
        }
    }

    /// Groups followed by Others, if present.
    pub fn entries(&self) -> Vec<(String, f64)> {
        let mut entries = self.groups.clone();
        if let Some(others) = self.others {
            entries.push((OTHERS_LABEL.to_string(), others));
        }
        entries
    }
}

/// Collapse everything outside the already-ranked `top` groups into one
/// Others value: `total - sum(top)`, kept only when positive.
pub fn collapse_top_k(top: Vec<(String, f64)>, total: f64) -> TopK {
    let top_sum: f64 = top.iter().map(|(_, v)| v).sum();
    let others = total - top_sum;
    TopK {
        groups: top,
        others: (others > 0.0).then_some(others),
        total,
    }
}

pub fn generate(relation: &mut Relation, chart_type: ChartType, params: &CategoricalParams) -> Result<ChartSpec> {
    ensure_column(relation, "category_col", &params.category_col)?;
    if params.value_col != ROW_COUNT {
        ensure_column(relation, "value_col", &params.value_col)?;
    }
    if params.top_k == 0 {
        return Err(InsightError::invalid_param("top_k", "must be at least 1"));
    }

    let table = quote_ident(relation.table_name());
    let category = quote_ident(&params.category_col);
    let value = value_expr(&params.value_col, params.agg, &category);

    let ranking_sql = format!(
        "SELECT {category} AS category_label, {value} AS agg_value \
         FROM {table} WHERE {category} IS NOT NULL \
         GROUP BY {category} \
         ORDER BY agg_value DESC, category_label \
         LIMIT {top_k}",
        category = category,
        value = value,
        table = table,
        top_k = params.top_k,
    );
    let ranked = relation.query(&ranking_sql)?;
    let labels = label_values(&ranked, 0)?;
    let values = f64_values(&ranked, 1)?;
    let top: Vec<(String, f64)> = labels
        .into_iter()
        .zip(values)
        .map(|(label, value)| (label.unwrap_or_default(), value.unwrap_or(0.0)))
        .collect();

    let total_sql = format!(
        "SELECT {value} AS agg_total FROM {table} WHERE {category} IS NOT NULL",
        value = value,
        table = table,
        category = category,
    );
    let total = scalar_f64(&relation.query(&total_sql)?, 0)?.unwrap_or(0.0);

    let collapsed = collapse_top_k(top, total);
    debug!(
        "Ranked {} groups of {}, others={:?}",
        collapsed.groups.len(),
        params.category_col,
        collapsed.others
    );

    let mut notes = Vec::new();
    if collapsed.others_ratio() > OTHERS_NOTE_RATIO {
        notes.push(match chart_type {
            ChartType::Pie => "Too many categories, consider using bar chart instead",
            _ => "Too many categories, Top-K chart may not be representative",
        });
    }

    let entries = collapsed.entries();
    let labels: Vec<&str> = entries.iter().map(|(l, _)| l.as_str()).collect();
    let values: Vec<Value> = entries.iter().map(|(_, v)| float_to_json(*v)).collect();
    let title = params
        .title
        .clone()
        .unwrap_or_else(|| format!("{} Distribution", params.category_col));

    let meta = json!({
        "category_col": params.category_col,
        "value_col": params.value_col,
        "aggregation": params.agg,
        "top_k": params.top_k,
        "notes": notes,
    });

    let spec = match chart_type {
        ChartType::Pie => ChartSpec::new(
            ChartType::Pie,
            vec![json!({
                "type": "pie",
                "labels": labels,
                "values": values,
                "textinfo": "label+percent",
                "hovertemplate": "<b>%{label}</b><br>Value: %{value}<br>Percent: %{percent}<extra></extra>",
            })],
            json!({ "title": title, "template": "plotly_white" }),
            meta,
            ChartSummary::Pie(PieSummary {
                total_value: collapsed.total,
                categories_count: entries.len(),
            }),
        ),
        _ => {
            let text: Vec<String> = entries.iter().map(|(_, v)| format!("{:.2}", v)).collect();
            let top_value = entries.iter().map(|(_, v)| *v).fold(0.0, f64::max);
            ChartSpec::new(
                ChartType::Bar,
                vec![json!({
                    "type": "bar",
                    "x": labels,
                    "y": values,
                    "marker": { "color": "#007aff" },
                    "text": text,
                    "textposition": "auto",
                })],
                json!({
                    "title": title,
                    "xaxis": { "title": params.category_col },
                    "yaxis": { "title": value_label(&params.value_col, params.agg) },
                    "template": "plotly_white",
                }),
                meta,
                ChartSummary::Bar(BarSummary {
                    total_value: collapsed.total,
                    top_value,
                    categories_count: entries.len(),
                }),
            )
        }
    };

    Ok(spec)
}
