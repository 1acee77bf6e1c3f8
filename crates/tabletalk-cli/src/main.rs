//! TableTalk: chat with tabular data.
//!
//! Load a CSV file or a SQLite database, then ask questions in natural
//! language; the core translates them into bounded read-only SQL, executes,
//! and suggests a chart for the result.

mod repl;
mod sample;
mod table;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tabletalk_core::synthesize::CandidateQuery;
use tabletalk_core::validate::{validate, Policy, Verdict};
use tabletalk_core::{
    execute, recommend, Analyst, DataSource, EngineConfig, QueryIntent, Session,
};
use tabletalk_sqlite::SqliteSource;

#[derive(Parser)]
#[command(name = "tabletalk", version, about = "Ask questions about tabular data")]
struct Cli {
    /// SQLite database file to analyze.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// CSV file to load (into an in-memory table, or into --db if given).
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Table name used when loading a CSV file.
    #[arg(long, global = true, default_value = "data")]
    table: String,

    /// Model provider: openai, anthropic, ollama, or mock:<reply>.
    /// Defaults to whichever provider has credentials in the environment.
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat,
    /// Ask a single question and exit.
    Ask {
        /// The question, in plain language.
        question: Vec<String>,
    },
    /// Run one SQL statement through the validator and the bounded engine.
    Query {
        /// The SQL statement.
        sql: Vec<String>,
    },
    /// Show the introspected schema of the loaded data.
    Schema,
    /// Write a deterministic sample sales dataset as CSV.
    Sample {
        /// Output path.
        #[arg(long, default_value = "sample_sales.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = EngineConfig::from_env();

    match &cli.command {
        Command::Sample { out } => {
            let rows = sample::write_sample_sales(out)?;
            println!(
                "{} {} rows to {}",
                "wrote".green(),
                rows,
                out.display()
            );
            Ok(())
        }
        Command::Schema => {
            let source = open_source(&cli)?;
            let session = Session::new(source, &config).context("could not read schema")?;
            print_schema(&session);
            Ok(())
        }
        Command::Query { sql } => {
            let statement = sql.join(" ");
            if statement.trim().is_empty() {
                bail!("no SQL given");
            }
            let source = open_source(&cli)?;
            let session = Session::new(source, &config).context("could not read schema")?;
            run_query(&session, &statement, &config).await
        }
        Command::Ask { question } => {
            let utterance = question.join(" ");
            if utterance.trim().is_empty() {
                bail!("no question given");
            }
            let source = open_source(&cli)?;
            let mut session = Session::new(source, &config).context("could not read schema")?;
            let analyst = Analyst::new(create_model(&cli)?, config);
            match analyst.ask(&utterance, &mut session).await {
                Ok(outcome) => {
                    print_outcome(&outcome);
                    Ok(())
                }
                Err(err) => {
                    eprintln!("{} {err}", "error:".red().bold());
                    std::process::exit(1);
                }
            }
        }
        Command::Chat => {
            let source = open_source(&cli)?;
            let session = Session::new(source, &config).context("could not read schema")?;
            let analyst = Analyst::new(create_model(&cli)?, config);
            repl::run(analyst, session).await
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn open_source(cli: &Cli) -> Result<Box<dyn DataSource>> {
    let source = match (&cli.db, &cli.csv) {
        (Some(db), maybe_csv) => {
            let source = SqliteSource::open(db)
                .map_err(|e| anyhow!("cannot open {}: {e}", db.display()))?;
            if let Some(csv) = maybe_csv {
                source
                    .ingest_csv(csv, &cli.table)
                    .map_err(|e| anyhow!("cannot load {}: {e}", csv.display()))?;
            }
            source
        }
        (None, Some(csv)) => {
            let source = SqliteSource::in_memory().map_err(|e| anyhow!("{e}"))?;
            source
                .ingest_csv(csv, &cli.table)
                .map_err(|e| anyhow!("cannot load {}: {e}", csv.display()))?;
            source
        }
        (None, None) => bail!("no data source; pass --db <file> and/or --csv <file>"),
    };
    Ok(Box::new(source))
}

fn create_model(cli: &Cli) -> Result<std::sync::Arc<dyn tabletalk_core::LanguageModel>> {
    let provider = cli
        .provider
        .clone()
        .unwrap_or_else(detect_provider);
    tracing::info!(provider = %provider, "using model provider");
    tabletalk_llm::create_model(&provider)
}

/// Pick a provider from whatever credentials are present.
fn detect_provider() -> String {
    let has = |name: &str| {
        std::env::var(name)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    };
    if has(tabletalk_llm::OPENAI_API_KEY_ENV) {
        "openai".to_string()
    } else if has(tabletalk_llm::ANTHROPIC_API_KEY_ENV) {
        "anthropic".to_string()
    } else {
        "ollama".to_string()
    }
}

fn print_schema(session: &Session) {
    for table in &session.schema().tables {
        let rows = table
            .approx_rows
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{} {} ({} rows)",
            "table".cyan().bold(),
            table.name.bold(),
            rows
        );
        for column in &table.columns {
            let nullable = if column.nullable { ", nullable" } else { "" };
            let samples = if column.samples.is_empty() {
                String::new()
            } else {
                let rendered: Vec<String> =
                    column.samples.iter().map(|s| s.render()).collect();
                format!("  e.g. {}", rendered.join(", ").dimmed())
            };
            println!(
                "  {} ({}{}){}",
                column.name,
                column.kind.as_str().yellow(),
                nullable,
                samples
            );
        }
    }
}

/// The SQL passthrough path: user-supplied statements still go through the
/// validator and the bounded engine, never around them.
async fn run_query(session: &Session, statement: &str, config: &EngineConfig) -> Result<()> {
    let candidate = CandidateQuery {
        sql: statement.to_string(),
        dialect: tabletalk_core::Dialect::Sqlite,
        intent: QueryIntent::Select,
        explanation: String::new(),
    };
    let policy = Policy::from(config);
    let sanitized = match validate(&candidate, session.schema(), &policy) {
        Verdict::Accepted { sanitized } => sanitized,
        Verdict::Rejected { violation } => bail!("query rejected: {violation}"),
    };
    let result = execute::execute(session.source(), &sanitized, config)
        .await
        .map_err(|e| anyhow!("{e}"))?;
    table::print_result(&result);
    if let Some(chart) = recommend(&result, config) {
        table::print_chart_hint(&chart);
    }
    Ok(())
}

fn print_outcome(outcome: &tabletalk_core::AskOutcome) {
    println!("{}", outcome.explanation.green());
    println!("{} {}", "sql:".dimmed(), outcome.query.dimmed());
    table::print_result(&outcome.result);
    if let Some(chart) = &outcome.chart {
        table::print_chart_hint(chart);
    }
}
