use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabular_insight::charts::{ChartEngine, ChartRequest};
use tabular_insight::config::{check_max_rows, Settings};
use tabular_insight::data_assistant::DataAssistant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabular-insight")]
#[command(about = "Guarded SQL and chart aggregation over uploaded tabular files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the column profile of a file and its prompt rendering
    Schema {
        file: PathBuf,
    },

    /// Run a read-only SQL query against a file (table name: data)
    Sql {
        file: PathBuf,
        sql: String,

        /// Row cap, 1-1000 (default: DEFAULT_MAX_ROWS)
        #[arg(long)]
        max_rows: Option<usize>,
    },

    /// Answer a natural-language question using the configured LLM
    Ask {
        file: PathBuf,
        question: String,

        #[arg(long)]
        max_rows: Option<usize>,

        /// Skip the plain-language explanation
        #[arg(long)]
        no_explain: bool,
    },

    /// Build a chart from a JSON request, e.g. '{"chart_type":"bar","category_col":"region"}'
    Chart {
        file: PathBuf,
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    info!("tabular-insight starting...");

    let output = match args.command {
        Command::Schema { file } => {
            let assistant = DataAssistant::from_settings(settings)?;
            let profile = assistant.profile(&file)?;
            serde_json::json!({
                "row_count": profile.row_count,
                "columns": profile.columns,
                "listing": profile.format_for_listing(),
                "prompt": profile.format_for_prompt(),
            })
        }
        Command::Sql { file, sql, max_rows } => {
            if let Some(n) = max_rows {
                check_max_rows(n)?;
            }
            let assistant = DataAssistant::from_settings(settings)?;
            serde_json::to_value(assistant.run_sql(&file, &sql, max_rows))?
        }
        Command::Ask { file, question, max_rows, no_explain } => {
            if let Some(n) = max_rows {
                check_max_rows(n)?;
            }
            let assistant = DataAssistant::from_settings(settings)?;
            let response = assistant.ask(&file, &question, max_rows, !no_explain).await?;
            serde_json::to_value(response)?
        }
        Command::Chart { file, request } => {
            let request = ChartRequest::from_json(&request)?;
            let spec = ChartEngine::new(&settings).generate(&file, &request)?;
            serde_json::to_value(spec)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
