//! LLM collaborators: natural-language to SQL translation and plain-language
//! explanation of query results, over an OpenAI-compatible chat endpoint.

use crate::config::Settings;
use crate::error::{InsightError, Result};
use crate::execution::Record;
use crate::metadata::{format_for_prompt, ColumnDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Rows of a result included verbatim in the explanation prompt.
pub const EXPLAIN_PREVIEW_ROWS: usize = 10;

/// Turns a question into one SQL query over the named table.
#[async_trait]
pub trait SqlTranslator: Send + Sync {
    async fn translate(
        &self,
        question: &str,
        columns: &[ColumnDescriptor],
        table_name: &str,
    ) -> Result<String>;
}

/// Explains a result set in answer to the question that produced it.
#[async_trait]
pub trait ResultExplainer: Send + Sync {
    async fn explain(&self, question: &str, sql: &str, rows: &[Record]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model_name: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .map_err(|e| InsightError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: settings.llm_api_key.clone(),
            base_url: settings.llm_base_url.trim_end_matches('/').to_string(),
            model_name: settings.llm_model_name.clone(),
            http,
        })
    }

    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Send a chat completion request and return the first choice's content.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model_name,
            "messages": messages,
            "temperature": temperature,
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        debug!("Calling {} with model {}", self.chat_endpoint(), self.model_name);
        let response = self
            .http
            .post(self.chat_endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Llm(format!("LLM API call failed: {}", e)))?
            .error_for_status()
            .map_err(|e| InsightError::Llm(format!("LLM API returned an error: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InsightError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InsightError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

pub struct Nl2SqlConverter {
    client: LlmClient,
}

impl Nl2SqlConverter {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    pub fn build_prompt(question: &str, columns: &[ColumnDescriptor], table_name: &str) -> Vec<ChatMessage> {
        let system = format!(
            r#"You are an expert SQL query generator.

Task: Convert natural language questions to SQL queries.

Table: {table}
Columns:
{columns}

Requirements:
1. Generate ONLY the SQL query, no explanations
2. Use double quotes for column names with spaces: "column name"
3. Filter NULL values with a WHERE clause when appropriate
4. Use aggregation functions (COUNT, SUM, AVG, etc.) where they answer the question
5. Add ORDER BY and LIMIT when relevant
6. Return the query on a single line
7. Do NOT end the query with a semicolon

Examples:
Q: How many rows are there?
A: SELECT COUNT(*) AS row_count FROM {table}

Q: What's the average of the sales column?
A: SELECT AVG("sales") AS avg_sales FROM {table} WHERE "sales" IS NOT NULL"#,
            table = table_name,
            columns = format_for_prompt(columns),
        );

        vec![ChatMessage::system(system), ChatMessage::user(question)]
    }
}

/// Strip surrounding markdown code fences and one trailing `;`.
pub fn clean_sql(raw: &str) -> String {
    let mut sql = raw.trim();
    if let Some(rest) = sql.strip_prefix("```sql") {
        sql = rest;
    } else if let Some(rest) = sql.strip_prefix("```") {
        sql = rest;
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest;
    }
    let sql = sql.trim();
    sql.strip_suffix(';').unwrap_or(sql).trim_end().to_string()
}

#[async_trait]
impl SqlTranslator for Nl2SqlConverter {
    async fn translate(
        &self,
        question: &str,
        columns: &[ColumnDescriptor],
        table_name: &str,
    ) -> Result<String> {
        let messages = Self::build_prompt(question, columns, table_name);
        let raw = self.client.complete(&messages, 0.1, Some(500)).await?;
        let sql = clean_sql(&raw);
        if sql.is_empty() {
            return Err(InsightError::Llm("LLM returned an empty query".to_string()));
        }
        Ok(sql)
    }
}

pub struct QueryExplainer {
    client: LlmClient,
}

impl QueryExplainer {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// JSON preview of the first rows, with a note on how many were left out.
    pub fn preview(rows: &[Record]) -> Result<String> {
        let shown = &rows[..rows.len().min(EXPLAIN_PREVIEW_ROWS)];
        let mut preview = serde_json::to_string_pretty(shown)?;
        if rows.len() > EXPLAIN_PREVIEW_ROWS {
            preview.push_str(&format!("\n... ({} more rows)", rows.len() - EXPLAIN_PREVIEW_ROWS));
        }
        Ok(preview)
    }

    pub fn build_prompt(question: &str, sql: &str, rows: &[Record]) -> Result<Vec<ChatMessage>> {
        let prompt = format!(
            r#"You are a data analyst assistant. Explain the SQL query results in natural language.

User Question: {question}

SQL Query Executed:
{sql}

Query Results:
{results}

Total Rows: {total}

Task: Answer the user's question directly in 2-3 sentences, citing the key numbers from the results."#,
            question = question,
            sql = sql,
            results = Self::preview(rows)?,
            total = rows.len(),
        );
        Ok(vec![ChatMessage::user(prompt)])
    }
}

#[async_trait]
impl ResultExplainer for QueryExplainer {
    async fn explain(&self, question: &str, sql: &str, rows: &[Record]) -> Result<String> {
        let messages = Self::build_prompt(question, sql, rows)?;
        let explanation = self.client.complete(&messages, 0.3, Some(300)).await?;
        Ok(explanation.trim().to_string())
    }
}
