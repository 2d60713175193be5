//! Process-wide settings, built once at startup and passed into the
//! executor, chart engine and LLM client constructors.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed logical identifier every loaded file is registered under.
pub const DEFAULT_TABLE_NAME: &str = "data";

/// Upper bound for a caller-requested row cap.
pub const MAX_ROWS_CEILING: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model_name: String,
    pub llm_timeout_secs: u64,
    pub table_name: String,
    pub default_max_rows: usize,
    pub max_file_size: u64,
    pub infer_schema_rows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_timeout_secs: 60,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            default_max_rows: 100,
            max_file_size: 10 * 1024 * 1024, // 10MB
            infer_schema_rows: 1000,
        }
    }
}

impl Settings {
    /// Load settings from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars().collect())
    }

    /// Build settings from an explicit variable map. Keys are matched
    /// case-insensitively; unknown keys are ignored.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();
        let mut settings = Settings::default();

        if let Some(v) = vars.get("LLM_API_KEY") {
            settings.llm_api_key = v.clone();
        }
        if let Some(v) = vars.get("LLM_BASE_URL") {
            settings.llm_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = vars.get("LLM_MODEL_NAME") {
            settings.llm_model_name = v.clone();
        }
        if let Some(v) = vars.get("LLM_TIMEOUT_SECS") {
            settings.llm_timeout_secs = parse_var("LLM_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = vars.get("TABLE_NAME") {
            settings.table_name = v.clone();
        }
        if let Some(v) = vars.get("DEFAULT_MAX_ROWS") {
            settings.default_max_rows = parse_var("DEFAULT_MAX_ROWS", v)?;
        }
        if let Some(v) = vars.get("MAX_FILE_SIZE") {
            settings.max_file_size = parse_var("MAX_FILE_SIZE", v)?;
        }
        if let Some(v) = vars.get("INFER_SCHEMA_ROWS") {
            settings.infer_schema_rows = parse_var("INFER_SCHEMA_ROWS", v)?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        check_max_rows(self.default_max_rows)
            .map_err(|_| InsightError::Config(format!(
                "DEFAULT_MAX_ROWS must be between 1 and {}, got {}",
                MAX_ROWS_CEILING, self.default_max_rows
            )))?;
        if self.table_name.trim().is_empty() {
            return Err(InsightError::Config("TABLE_NAME must not be empty".to_string()));
        }
        if self.infer_schema_rows == 0 {
            return Err(InsightError::Config("INFER_SCHEMA_ROWS must be positive".to_string()));
        }
        Ok(())
    }
}

/// Row caps are accepted in `[1, MAX_ROWS_CEILING]`.
pub fn check_max_rows(max_rows: usize) -> Result<usize> {
    if max_rows == 0 || max_rows > MAX_ROWS_CEILING {
        return Err(InsightError::invalid_param(
            "max_rows",
            format!("must be between 1 and {}", MAX_ROWS_CEILING),
        ));
    }
    Ok(max_rows)
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| InsightError::Config(format!("{} has an invalid value: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_apply_without_variables() {
        let settings = Settings::from_vars(HashMap::new()).unwrap();
        assert_eq!(settings.table_name, "data");
        assert_eq!(settings.default_max_rows, 100);
        assert_eq!(settings.llm_base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_variables_are_case_insensitive() {
        let settings = Settings::from_vars(vars(&[
            ("llm_model_name", "local-model"),
            ("LLM_BASE_URL", "http://localhost:11434/v1/"),
        ]))
        .unwrap();
        assert_eq!(settings.llm_model_name, "local-model");
        assert_eq!(settings.llm_base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_out_of_range_max_rows_is_rejected() {
        let err = Settings::from_vars(vars(&[("DEFAULT_MAX_ROWS", "5000")])).unwrap_err();
        assert!(matches!(err, InsightError::Config(_)));

        let err = Settings::from_vars(vars(&[("DEFAULT_MAX_ROWS", "many")])).unwrap_err();
        assert!(matches!(err, InsightError::Config(_)));
    }

    #[test]
    fn test_check_max_rows_bounds() {
        assert!(check_max_rows(0).is_err());
        assert_eq!(check_max_rows(1).unwrap(), 1);
        assert_eq!(check_max_rows(1000).unwrap(), 1000);
        assert!(check_max_rows(1001).is_err());
    }
}
