//! Query Journal
//!
//! In-memory record of questions and queries run through the data assistant.

use crate::execution::QueryOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

pub const DEFAULT_JOURNAL_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Natural-language question answered through a generated query.
    Query,
    /// Literal SQL supplied by the caller.
    DirectSql,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub question: Option<String>,
    pub sql: Option<String>,
    pub success: bool,
    pub row_count: usize,
    pub elapsed_seconds: Option<f64>,
    pub error: Option<String>,
}

impl JournalEntry {
    pub fn new(kind: EntryKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            question: None,
            sql: None,
            success: false,
            row_count: 0,
            elapsed_seconds: None,
            error: None,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.success = false;
        self
    }

    /// Fill outcome fields. A failed outcome turns the entry into an error.
    pub fn with_outcome(mut self, outcome: &QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Success { row_count, elapsed_seconds, executed_sql, .. } => {
                self.sql = Some(executed_sql.clone());
                self.success = true;
                self.row_count = *row_count;
                self.elapsed_seconds = Some(*elapsed_seconds);
            }
            QueryOutcome::Failure { reason, attempted_sql } => {
                self.kind = EntryKind::Error;
                self.sql = Some(attempted_sql.clone());
                self = self.with_error(reason.clone());
            }
        }
        self
    }
}

/// Bounded, shareable journal. Oldest entries are dropped past capacity.
#[derive(Clone)]
pub struct QueryJournal {
    entries: Arc<RwLock<VecDeque<JournalEntry>>>,
    capacity: usize,
}

impl QueryJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, entry: JournalEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<JournalEntry> {
        if let Ok(entries) = self.entries.read() {
            entries.iter().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<JournalEntry> {
        if let Ok(entries) = self.entries.read() {
            let skip = entries.len().saturating_sub(n);
            entries.iter().skip(skip).cloned().collect()
        } else {
            Vec::new()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl Default for QueryJournal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_drops_oldest() {
        let journal = QueryJournal::new(2);
        for q in ["a", "b", "c"] {
            journal.record(JournalEntry::new(EntryKind::Query).with_question(q));
        }
        let questions: Vec<Option<String>> = journal.entries().into_iter().map(|e| e.question).collect();
        assert_eq!(questions, vec![Some("b".to_string()), Some("c".to_string())]);
    }

    #[test]
    fn test_recent() {
        let journal = QueryJournal::default();
        assert!(journal.is_empty());
        for q in ["a", "b", "c"] {
            journal.record(JournalEntry::new(EntryKind::DirectSql).with_sql(q));
        }
        let recent = journal.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].sql.as_deref(), Some("c"));
        assert_eq!(journal.recent(10).len(), 3);
    }

    #[test]
    fn test_entry_from_outcome() {
        let failed = JournalEntry::new(EntryKind::Query)
            .with_outcome(&QueryOutcome::failure("forbidden keyword: DROP", "DROP TABLE data"));
        assert_eq!(failed.kind, EntryKind::Error);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("forbidden keyword: DROP"));

        let ok = JournalEntry::new(EntryKind::Query).with_outcome(&QueryOutcome::Success {
            rows: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            elapsed_seconds: 0.01,
            executed_sql: "SELECT 1 LIMIT 10".to_string(),
        });
        assert!(ok.success);
        assert_eq!(ok.kind, EntryKind::Query);
        assert_eq!(ok.sql.as_deref(), Some("SELECT 1 LIMIT 10"));
    }
}
