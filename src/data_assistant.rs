//! Data Assistant
//!
//! Answers questions about one uploaded file:
//! 1. profile the file and translate the question into SQL
//! 2. run the SQL through the guarded executor
//! 3. optionally explain the result in plain language
//!
//! Explanation is best-effort: its failure never fails the answer.

use crate::config::Settings;
use crate::error::Result;
use crate::execution::QueryOutcome;
use crate::llm::{LlmClient, Nl2SqlConverter, QueryExplainer, ResultExplainer, SqlTranslator};
use crate::metadata::{describe_relation, DatasetProfile};
use crate::query_journal::{EntryKind, JournalEntry, QueryJournal};
use crate::sql_engine::SqlEngine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Response to one natural-language question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub sql_generated: String,
    pub outcome: QueryOutcome,
    pub explanation: Option<String>,
}

pub fn explanation_fallback(error: &str) -> String {
    format!(
        "Results retrieved successfully. (Explanation generation failed: {})",
        error
    )
}

pub struct DataAssistant {
    settings: Settings,
    translator: Arc<dyn SqlTranslator>,
    explainer: Arc<dyn ResultExplainer>,
    journal: QueryJournal,
}

impl DataAssistant {
    pub fn new(
        settings: Settings,
        translator: Arc<dyn SqlTranslator>,
        explainer: Arc<dyn ResultExplainer>,
    ) -> Self {
        Self {
            settings,
            translator,
            explainer,
            journal: QueryJournal::default(),
        }
    }

    /// Assistant backed by the configured LLM endpoint.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let translator = Nl2SqlConverter::new(LlmClient::new(&settings)?);
        let explainer = QueryExplainer::new(LlmClient::new(&settings)?);
        Ok(Self::new(settings, Arc::new(translator), Arc::new(explainer)))
    }

    pub fn with_journal(mut self, journal: QueryJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> &QueryJournal {
        &self.journal
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Column descriptors of `file`.
    pub fn profile(&self, file: &Path) -> Result<DatasetProfile> {
        SqlEngine::scoped(file, &self.settings, |engine| describe_relation(engine.relation()?))
    }

    /// Translate `question`, execute it against `file` and optionally explain
    /// the rows. Translation and load failures are errors; a rejected or
    /// failing query comes back as a `Failure` outcome.
    pub async fn ask(
        &self,
        file: &Path,
        question: &str,
        max_rows: Option<usize>,
        explain: bool,
    ) -> Result<AskResponse> {
        info!("Answering question for {}: {}", file.display(), question);
        let max_rows = max_rows.unwrap_or(self.settings.default_max_rows);

        let mut engine = SqlEngine::new(file, &self.settings);
        let profile = match engine.relation().and_then(|relation| describe_relation(relation)) {
            Ok(profile) => profile,
            Err(e) => {
                self.record_error(question, &e.to_string());
                return Err(e);
            }
        };
        // released while the translator runs; `execute` loads it again
        engine.close();

        let sql = match self
            .translator
            .translate(question, &profile.columns, engine.table_name())
            .await
        {
            Ok(sql) => sql,
            Err(e) => {
                self.record_error(question, &e.to_string());
                return Err(e);
            }
        };
        info!("Generated SQL: {}", sql);

        let outcome = engine.execute(&sql, max_rows);
        engine.close();

        let explanation = if explain && outcome.is_success() {
            match self.explainer.explain(question, &sql, outcome.rows()).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Explanation failed: {}", e);
                    Some(explanation_fallback(&e.to_string()))
                }
            }
        } else {
            None
        };

        self.journal.record(
            JournalEntry::new(EntryKind::Query)
                .with_question(question)
                .with_outcome(&outcome),
        );

        Ok(AskResponse {
            question: question.to_string(),
            sql_generated: sql,
            outcome,
            explanation,
        })
    }

    /// Run literal SQL against `file`. Only successful queries are journaled.
    pub fn run_sql(&self, file: &Path, sql: &str, max_rows: Option<usize>) -> QueryOutcome {
        let max_rows = max_rows.unwrap_or(self.settings.default_max_rows);
        let outcome = SqlEngine::scoped(file, &self.settings, |engine| engine.execute(sql, max_rows));

        if outcome.is_success() {
            self.journal
                .record(JournalEntry::new(EntryKind::DirectSql).with_outcome(&outcome));
        }
        outcome
    }

    fn record_error(&self, question: &str, error: &str) {
        self.journal.record(
            JournalEntry::new(EntryKind::Error)
                .with_question(question)
                .with_error(error),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_text() {
        assert_eq!(
            explanation_fallback("LLM error: timeout"),
            "Results retrieved successfully. (Explanation generation failed: LLM error: timeout)"
        );
    }
}
