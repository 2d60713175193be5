//! SQL Engine
//!
//! Guarded execution of a single query string against one uploaded file:
//! policy check, lazy load of the owned relation, row cap, timing, and
//! normalization of the result into JSON-safe records.
//!
//! Every problem with the query itself (rejection, unknown column, load
//! failure) comes back as a `QueryOutcome::Failure`; nothing is raised past
//! `execute`.

use crate::config::{check_max_rows, Settings};
use crate::error::Result;
use crate::execution::{dataframe_to_records, QueryOutcome, Record};
use crate::loader::{ColumnSchema, Loader, Relation};
use crate::safety_guardrails::{has_limit_clause, strip_trailing_semicolon, validate, Verdict};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Executes guarded queries against one file. Owns at most one relation,
/// loaded on first use and released when the executor is dropped or closed.
pub struct SqlEngine {
    source: PathBuf,
    table_name: String,
    loader: Loader,
    relation: Option<Relation>,
}

impl SqlEngine {
    pub fn new(source: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            source: source.into(),
            table_name: settings.table_name.clone(),
            loader: Loader::new(settings),
            relation: None,
        }
    }

    /// Run `f` with a fresh executor for `source`. The relation is released
    /// when `f` returns or unwinds.
    pub fn scoped<T>(
        source: impl Into<PathBuf>,
        settings: &Settings,
        f: impl FnOnce(&mut SqlEngine) -> T,
    ) -> T {
        let mut engine = SqlEngine::new(source, settings);
        f(&mut engine)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn is_loaded(&self) -> bool {
        self.relation.is_some()
    }

    /// Load the relation if it is not loaded yet.
    pub fn relation(&mut self) -> Result<&mut Relation> {
        let relation = match self.relation.take() {
            Some(relation) => relation,
            None => self.loader.load(&self.source, &self.table_name)?,
        };
        Ok(self.relation.insert(relation))
    }

    /// Release the relation now. A later call loads it again.
    pub fn close(&mut self) {
        if self.relation.take().is_some() {
            debug!("Closed executor for {}", self.source.display());
        }
    }

    /// Validate, cap and run `sql`, returning a structured outcome.
    pub fn execute(&mut self, sql: &str, max_rows: usize) -> QueryOutcome {
        if let Verdict::Rejected(reason) = validate(sql) {
            return QueryOutcome::failure(reason, sql);
        }
        if let Err(e) = check_max_rows(max_rows) {
            return QueryOutcome::failure(e.to_string(), sql);
        }

        match self.run(sql, max_rows) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Query failed: {} ({})", e, sql);
                QueryOutcome::failure(e.to_string(), sql)
            }
        }
    }

    fn run(&mut self, sql: &str, max_rows: usize) -> Result<QueryOutcome> {
        let relation = self.relation()?;
        let executed_sql = apply_row_cap(sql, max_rows);

        let start_time = Instant::now();
        let frame = relation.query(&executed_sql)?;
        let elapsed_seconds = start_time.elapsed().as_secs_f64();

        // Backstop for limits the LIMIT check cannot see, e.g. a LIMIT that
        // only applies to a subquery.
        let frame = if frame.height() > max_rows {
            frame.head(Some(max_rows))
        } else {
            frame
        };

        let columns: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = dataframe_to_records(&frame)?;

        info!(
            "Query returned {} rows in {:.4}s",
            rows.len(),
            elapsed_seconds
        );

        Ok(QueryOutcome::Success {
            row_count: rows.len(),
            rows,
            columns,
            elapsed_seconds,
            executed_sql,
        })
    }

    /// Column names and SQL type labels of the loaded relation.
    pub fn schema(&mut self) -> Result<Vec<ColumnSchema>> {
        Ok(self.relation()?.schema())
    }

    /// First `limit` rows of the loaded relation.
    pub fn sample(&mut self, limit: usize) -> Result<Vec<Record>> {
        self.relation()?.sample(limit)
    }
}

/// Append `LIMIT max_rows` when the query has no LIMIT of its own. An
/// existing limit is left untouched.
pub fn apply_row_cap(sql: &str, max_rows: usize) -> String {
    let body = strip_trailing_semicolon(sql);
    if has_limit_clause(body) {
        body.to_string()
    } else {
        format!("{} LIMIT {}", body, max_rows)
    }
}
