//! Integration tests for the complete TableTalk pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - SQLite introspection → prompt → synthesis → validation → execution
//! - Safety refusals before anything reaches the engine
//! - Truncation and chart annotation on real query results
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;
use tabletalk_core::{
    Analyst, ChartKind, DataSource, EngineConfig, ExecutionFailure, Scalar, Session,
    TranslationError, Violation,
};
use tabletalk_llm::MockModel;
use tabletalk_sqlite::SqliteSource;

fn sales_source() -> SqliteSource {
    let source = SqliteSource::in_memory().expect("in-memory sqlite");
    source
        .execute_batch(
            "CREATE TABLE sales (
                 sold_on TEXT NOT NULL,
                 product TEXT NOT NULL,
                 region TEXT NOT NULL,
                 sales_amount REAL NOT NULL
             );
             INSERT INTO sales VALUES
                 ('2024-01-01', 'Product A', 'West', 12000.0),
                 ('2024-01-02', 'Product B', 'East', 9500.0),
                 ('2024-01-03', 'Product A', 'North', 7200.0),
                 ('2024-01-04', 'Product C', 'West', 3100.0);",
        )
        .expect("seed data");
    source
}

fn analyst_with_reply(reply: &str, config: EngineConfig) -> Analyst {
    Analyst::new(Arc::new(MockModel::always(reply)), config)
}

// ============================================================================
// End-to-end translation
// ============================================================================

#[tokio::test]
async fn test_total_sales_by_region_end_to_end() {
    let config = EngineConfig::default();
    let mut session = Session::new(Box::new(sales_source()), &config).unwrap();
    let analyst = analyst_with_reply(
        "```sql\nSELECT region, SUM(sales_amount) AS total_sales FROM sales GROUP BY region\n```\n\
         Explanation: total sales for each region",
        config,
    );

    let outcome = analyst
        .ask("show total sales by region", &mut session)
        .await
        .unwrap();

    assert_eq!(outcome.explanation, "total sales for each region");
    assert!(outcome.query.contains("GROUP BY region"));
    assert_eq!(outcome.result.columns, vec!["region", "total_sales"]);
    assert_eq!(outcome.result.row_count, 3);
    let west = outcome
        .result
        .rows
        .iter()
        .find(|row| row[0] == Scalar::Text("West".to_string()))
        .expect("West row");
    assert_eq!(west[1], Scalar::Float(15_100.0));

    let chart = outcome.chart.expect("bar chart");
    assert_eq!(chart.kind, ChartKind::Bar);
    assert_eq!(chart.x.as_deref(), Some("region"));
    assert_eq!(chart.y, vec!["total_sales".to_string()]);
}

#[tokio::test]
async fn test_destructive_request_is_refused_before_execution() {
    let config = EngineConfig::default();
    let mut session = Session::new(Box::new(sales_source()), &config).unwrap();
    let analyst = analyst_with_reply(
        "```sql\nDELETE FROM sales\n```\nExplanation: removes all rows",
        config,
    );

    let err = analyst
        .ask("delete all records", &mut session)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TranslationError::Rejected(Violation::NotReadOnly(_))
    ));

    // Nothing reached the engine: the table is intact.
    let guard = session.source().checkout();
    let rows = guard
        .query(
            "SELECT COUNT(*) FROM sales",
            10,
            std::time::Duration::from_secs(5),
        )
        .unwrap();
    assert_eq!(rows.rows[0][0], Scalar::Int(4));
}

#[tokio::test]
async fn test_unknown_column_surfaces_the_identifier() {
    let config = EngineConfig::default();
    let mut session = Session::new(Box::new(sales_source()), &config).unwrap();
    let analyst = analyst_with_reply(
        "```sql\nSELECT profit FROM sales\n```\nExplanation: profit per row",
        config,
    );

    let err = analyst.ask("show profit", &mut session).await.unwrap_err();
    match err {
        TranslationError::Rejected(Violation::UnknownIdentifier(name)) => {
            assert_eq!(name, "profit")
        }
        other => panic!("expected UnknownIdentifier, got {other:?}"),
    }
}

// ============================================================================
// Bounded execution
// ============================================================================

#[tokio::test]
async fn test_unlimited_query_truncates_at_the_ceiling() {
    let source = SqliteSource::in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE big (n INTEGER);
             INSERT INTO big
             WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 10000)
             SELECT x FROM c;",
        )
        .unwrap();

    let config = EngineConfig {
        row_ceiling: 500,
        ..EngineConfig::default()
    };
    let mut session = Session::new(Box::new(source), &config).unwrap();
    let analyst = analyst_with_reply(
        "```sql\nSELECT n FROM big\n```\nExplanation: every value",
        config,
    );

    let outcome = analyst.ask("show everything", &mut session).await.unwrap();
    assert!(outcome.result.truncated);
    assert_eq!(outcome.result.row_count, 500);
    assert_eq!(outcome.result.rows.len(), 500);
}

#[tokio::test]
async fn test_runaway_query_times_out() {
    let config = EngineConfig {
        exec_timeout: std::time::Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let mut session = Session::new(Box::new(sales_source()), &config).unwrap();
    // A recursive scan that never reaches its first output row.
    let analyst = analyst_with_reply(
        "```sql\nWITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
         SELECT COUNT(x) AS total FROM c LIMIT 1\n```\nExplanation: counts forever",
        config,
    );

    let err = analyst.ask("count forever", &mut session).await.unwrap_err();
    assert!(matches!(
        err,
        TranslationError::Execution(ExecutionFailure::ExecutionTimeout)
    ));
}

// ============================================================================
// Synthesis retry and failure
// ============================================================================

#[tokio::test]
async fn test_prose_reply_recovers_on_retry() {
    let config = EngineConfig::default();
    let mut session = Session::new(Box::new(sales_source()), &config).unwrap();
    let model = Arc::new(MockModel::new(vec![
        "You probably want sales grouped by product.".to_string(),
        "```sql\nSELECT product, SUM(sales_amount) AS total FROM sales GROUP BY product\n```\n\
         Explanation: totals per product"
            .to_string(),
    ]));
    let analyst = Analyst::new(model.clone(), config);

    let outcome = analyst
        .ask("totals per product", &mut session)
        .await
        .unwrap();
    assert_eq!(outcome.result.row_count, 3);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_unparseable_replies_surface_synthesis_failure() {
    let config = EngineConfig::default();
    let mut session = Session::new(Box::new(sales_source()), &config).unwrap();
    let analyst = analyst_with_reply("I am not able to help with that.", config);

    let err = analyst.ask("anything", &mut session).await.unwrap_err();
    assert!(matches!(err, TranslationError::Synthesis(_)));
}

// ============================================================================
// CSV ingestion feeding the pipeline
// ============================================================================

#[tokio::test]
async fn test_csv_file_to_line_chart() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "day,revenue").unwrap();
    for i in 1..=9 {
        writeln!(file, "2024-02-0{i},{}", 100 * i).unwrap();
    }
    file.flush().unwrap();

    let source = SqliteSource::in_memory().unwrap();
    source.ingest_csv(file.path(), "revenue").unwrap();

    let config = EngineConfig::default();
    let mut session = Session::new(Box::new(source), &config).unwrap();
    let analyst = analyst_with_reply(
        "```sql\nSELECT day, revenue FROM revenue ORDER BY day\n```\n\
         Explanation: revenue per day",
        config,
    );

    let outcome = analyst.ask("revenue over time", &mut session).await.unwrap();
    assert_eq!(outcome.result.row_count, 9);
    // Text dates are promoted to timestamps, so the annotator sees a time axis.
    assert!(matches!(outcome.result.rows[0][0], Scalar::Timestamp(_)));
    let chart = outcome.chart.expect("line chart");
    assert_eq!(chart.kind, ChartKind::Line);
    assert_eq!(chart.x.as_deref(), Some("day"));
}

// ============================================================================
// Determinism
// ============================================================================

#[tokio::test]
async fn test_same_question_yields_identical_sanitized_query() {
    let config = EngineConfig::default();
    let reply = "```sql\nSELECT region FROM sales LIMIT 5\n```\nExplanation: regions";

    let mut first_session = Session::new(Box::new(sales_source()), &config).unwrap();
    let first = analyst_with_reply(reply, config.clone())
        .ask("list regions", &mut first_session)
        .await
        .unwrap();

    let mut second_session = Session::new(Box::new(sales_source()), &config).unwrap();
    let second = analyst_with_reply(reply, config)
        .ask("list regions", &mut second_session)
        .await
        .unwrap();

    assert_eq!(first.query, second.query);
    assert_eq!(first.chart, second.chart);
}
