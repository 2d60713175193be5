pub mod charts;
pub mod config;
pub mod data_assistant;
pub mod error;
pub mod execution;
pub mod llm;
pub mod loader;
pub mod metadata;
pub mod query_journal;
pub mod safety_guardrails;
pub mod sql_engine;

pub use charts::{ChartEngine, ChartRequest, ChartSpec, ChartType};
pub use config::Settings;
pub use data_assistant::{AskResponse, DataAssistant};
pub use error::{InsightError, Result};
pub use execution::{QueryOutcome, Record};
pub use loader::{Loader, Relation};
pub use metadata::{ColumnDescriptor, DatasetProfile, LogicalType};
pub use safety_guardrails::{validate, Verdict};
pub use sql_engine::SqlEngine;
