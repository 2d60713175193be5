//! Safety Guardrails
//!
//! Static policy check on a candidate query before it reaches the engine.
//! Pure and stateless. This is a keyword scan, not a parser: a deny-listed
//! word inside a string literal is rejected, and a statement crafted to hide
//! a mutation from the scan is not caught. The engine only ever sees a
//! private, read-only, per-call relation, so that residual risk is accepted.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Keywords that reject a query wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: [&str; 11] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "MERGE",
    "EXECUTE", "EXEC",
];

lazy_static! {
    static ref FORBIDDEN_PATTERNS: Vec<(&'static str, Regex)> = FORBIDDEN_KEYWORDS
        .iter()
        .map(|kw| (*kw, keyword_pattern(kw)))
        .collect();
    static ref LIMIT_PATTERN: Regex = keyword_pattern("LIMIT");
}

fn keyword_pattern(keyword: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", keyword)).expect("keyword pattern is a valid regex")
}

/// Result of the policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    Rejected(String),
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verdict::Ok)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Ok => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }
}

/// Check `sql` against the read-only policy:
/// 1. no deny-listed keyword as a whole word (any case)
/// 2. must start with SELECT or WITH
/// 3. at most one statement (one trailing `;` is tolerated)
pub fn validate(sql: &str) -> Verdict {
    for (keyword, pattern) in FORBIDDEN_PATTERNS.iter() {
        if pattern.is_match(sql) {
            warn!("Rejected query containing {}: {}", keyword, sql);
            return Verdict::Rejected(format!("forbidden keyword: {}", keyword));
        }
    }

    let normalized = sql.trim().to_uppercase();
    if !normalized.starts_with("SELECT") && !normalized.starts_with("WITH") {
        warn!("Rejected non-SELECT query: {}", sql);
        return Verdict::Rejected("only SELECT queries are allowed".to_string());
    }

    if strip_trailing_semicolon(sql).contains(';') {
        warn!("Rejected multi-statement query: {}", sql);
        return Verdict::Rejected("multiple statements are not allowed".to_string());
    }

    Verdict::Ok
}

/// Whether the query already carries a LIMIT clause (whole word, any case).
pub fn has_limit_clause(sql: &str) -> bool {
    LIMIT_PATTERN.is_match(sql)
}

/// Trim whitespace and remove at most one trailing `;`.
pub fn strip_trailing_semicolon(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}
