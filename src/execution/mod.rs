//! Execution Module - normalized query outcomes and their display formats

pub mod format;
pub mod result;

pub use format::{to_markdown_table, to_summary, ColumnStats, ResultSummary};
pub use result::{dataframe_to_records, QueryOutcome, Record};
