//! Session state and the `ask` entry point.
//!
//! A session owns the conversation history and the active data-source handle
//! for one user's interaction lifetime. History is append-only and capped;
//! requests borrow the session mutably, which serializes in-flight requests
//! per session and keeps append ordering deterministic. Cancellation is
//! drop-based: abandoning the returned future discards the in-flight work.

use crate::annotate::{recommend, ChartRecommendation};
use crate::config::EngineConfig;
use crate::error::{ExecutionFailure, SchemaError, TranslationError};
use crate::execute::{execute, ResultSet};
use crate::prompt::compose;
use crate::schema::{introspect, SchemaDescription};
use crate::source::{DataSource, Dialect, SharedSource};
use crate::synthesize::{LanguageModel, Synthesizer};
use crate::validate::{validate, Policy, Verdict};
use crate::{ConversationTurn, Role};
use std::sync::Arc;
use uuid::Uuid;

/// Scope owning conversation history and the active source.
pub struct Session {
    pub id: Uuid,
    history: Vec<ConversationTurn>,
    source: SharedSource,
    schema: SchemaDescription,
    dialect: Dialect,
}

impl Session {
    /// Open a session over a data source, taking the schema snapshot.
    pub fn new(source: Box<dyn DataSource>, config: &EngineConfig) -> Result<Self, SchemaError> {
        let dialect = source.dialect();
        let shared = SharedSource::new(source);
        let schema = {
            let guard = shared.checkout();
            introspect(guard.as_ref(), config)?
        };
        tracing::info!(tables = schema.tables.len(), "session opened");
        Ok(Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
            source: shared,
            schema,
            dialect,
        })
    }

    /// Swap in a different data source; the schema snapshot is rebuilt and
    /// the conversation continues.
    pub fn replace_source(
        &mut self,
        source: Box<dyn DataSource>,
        config: &EngineConfig,
    ) -> Result<(), SchemaError> {
        self.dialect = source.dialect();
        let shared = SharedSource::new(source);
        self.schema = {
            let guard = shared.checkout();
            introspect(guard.as_ref(), config)?
        };
        self.source = shared;
        Ok(())
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    fn push_turn(&mut self, turn: ConversationTurn, cap: usize) {
        self.history.push(turn);
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(..excess);
        }
    }
}

/// Everything `ask` hands back on success. The result set is owned by the
/// caller; a missing chart means "tabular result only".
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub explanation: String,
    pub query: String,
    pub result: ResultSet,
    pub chart: Option<ChartRecommendation>,
}

/// The caller-facing API: one entry point into the translation core.
pub struct Analyst {
    model: Arc<dyn LanguageModel>,
    config: EngineConfig,
}

impl Analyst {
    pub fn new(model: Arc<dyn LanguageModel>, config: EngineConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Translate, validate, execute, and annotate one utterance.
    ///
    /// Retry policy: synthesis gets one automatic retry inside the
    /// synthesizer; validation failures never retry; a lost connection is
    /// re-established and the same sanitized query retried exactly once.
    pub async fn ask(
        &self,
        utterance: &str,
        session: &mut Session,
    ) -> Result<AskOutcome, TranslationError> {
        if session.schema.is_empty() {
            return Err(SchemaError::EmptySchema.into());
        }

        let prompt = compose(
            utterance,
            &session.schema,
            &session.history,
            session.dialect,
            &self.config,
        );

        let synthesizer = Synthesizer::new(self.model.as_ref(), self.config.model_timeout);
        let candidate = match synthesizer.synthesize(&prompt, session.dialect).await {
            Ok(candidate) => candidate,
            Err(failure) => {
                session.push_turn(ConversationTurn::user(utterance), self.config.history_cap);
                return Err(failure.into());
            }
        };

        let policy = Policy::from(&self.config);
        let sanitized = match validate(&candidate, &session.schema, &policy) {
            Verdict::Accepted { sanitized } => sanitized,
            Verdict::Rejected { violation } => {
                tracing::info!(%violation, "candidate query rejected");
                session.push_turn(ConversationTurn::user(utterance), self.config.history_cap);
                session.push_turn(
                    ConversationTurn::assistant(
                        &format!("Query rejected: {violation}"),
                        Some(candidate.sql.clone()),
                        None,
                    ),
                    self.config.history_cap,
                );
                return Err(violation.into());
            }
        };

        let result = match execute(&session.source, &sanitized, &self.config).await {
            Ok(result) => result,
            Err(ExecutionFailure::ConnectionLost) => {
                tracing::warn!("connection lost, reconnecting for one retry");
                {
                    let mut guard = session.source.checkout();
                    guard.reconnect().map_err(|_| {
                        TranslationError::Execution(ExecutionFailure::ConnectionLost)
                    })?;
                }
                match execute(&session.source, &sanitized, &self.config).await {
                    Ok(result) => result,
                    Err(err) => {
                        session
                            .push_turn(ConversationTurn::user(utterance), self.config.history_cap);
                        return Err(err.into());
                    }
                }
            }
            Err(err) => {
                session.push_turn(ConversationTurn::user(utterance), self.config.history_cap);
                return Err(err.into());
            }
        };

        let chart = recommend(&result, &self.config);

        session.push_turn(ConversationTurn::user(utterance), self.config.history_cap);
        session.push_turn(
            ConversationTurn::assistant(
                &candidate.explanation,
                Some(sanitized.clone()),
                Some(result.summary()),
            ),
            self.config.history_cap,
        );

        Ok(AskOutcome {
            explanation: candidate.explanation,
            query: sanitized,
            result,
            chart,
        })
    }
}

impl ConversationTurn {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            text: text.to_string(),
            query: None,
            result_summary: None,
            at: chrono::Utc::now(),
        }
    }

    pub fn assistant(text: &str, query: Option<String>, result_summary: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.to_string(),
            query,
            result_summary,
            at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, SourceError, Violation};
    use crate::source::{RawColumn, RawRows, RawTable};
    use crate::value::Scalar;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct OneShotModel(String);

    #[async_trait]
    impl LanguageModel for OneShotModel {
        async fn complete(&self, _prompt: &str, _t: Duration) -> Result<String, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct SalesSource {
        lose_connections: AtomicUsize,
        reconnected: AtomicBool,
    }

    impl SalesSource {
        fn healthy() -> Self {
            Self {
                lose_connections: AtomicUsize::new(0),
                reconnected: AtomicBool::new(false),
            }
        }

        fn flaky(failures: usize) -> Self {
            Self {
                lose_connections: AtomicUsize::new(failures),
                reconnected: AtomicBool::new(false),
            }
        }
    }

    impl DataSource for SalesSource {
        fn introspect(&self, _n: usize) -> Result<Vec<RawTable>, SourceError> {
            Ok(vec![RawTable {
                name: "sales".to_string(),
                columns: vec![
                    RawColumn {
                        name: "region".to_string(),
                        declared_type: None,
                        nullable: false,
                        samples: vec![Scalar::Text("West".into()), Scalar::Text("East".into())],
                    },
                    RawColumn {
                        name: "sales_amount".to_string(),
                        declared_type: Some("REAL".to_string()),
                        nullable: false,
                        samples: vec![Scalar::Float(12.0)],
                    },
                ],
                approx_rows: Some(4),
            }])
        }

        fn query(
            &self,
            _sql: &str,
            _max_rows: usize,
            _timeout: Duration,
        ) -> Result<RawRows, SourceError> {
            if self.lose_connections.load(Ordering::SeqCst) > 0 {
                self.lose_connections.fetch_sub(1, Ordering::SeqCst);
                return Err(SourceError::ConnectionLost("dropped".into()));
            }
            Ok(RawRows {
                columns: vec!["region".to_string(), "total".to_string()],
                rows: vec![
                    vec![Scalar::Text("West".into()), Scalar::Float(12_000.0)],
                    vec![Scalar::Text("East".into()), Scalar::Float(9_500.0)],
                ],
            })
        }

        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn reconnect(&mut self) -> Result<(), SourceError> {
            self.reconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    const GOOD_REPLY: &str = "```sql\nSELECT region, SUM(sales_amount) AS total FROM sales GROUP BY region\n```\nExplanation: total sales per region";

    fn analyst(reply: &str) -> Analyst {
        Analyst::new(
            Arc::new(OneShotModel(reply.to_string())),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ask_end_to_end() {
        let mut session =
            Session::new(Box::new(SalesSource::healthy()), &EngineConfig::default()).unwrap();
        let outcome = analyst(GOOD_REPLY)
            .ask("show total sales by region", &mut session)
            .await
            .unwrap();

        assert_eq!(outcome.explanation, "total sales per region");
        assert!(outcome.query.contains("LIMIT 1001"));
        assert_eq!(outcome.result.row_count, 2);
        let chart = outcome.chart.expect("bar chart expected");
        assert_eq!(chart.x.as_deref(), Some("region"));
        assert_eq!(chart.y, vec!["total".to_string()]);

        // Both turns recorded, assistant turn carries query and summary.
        assert_eq!(session.history().len(), 2);
        assert!(session.history()[1].query.is_some());
        assert_eq!(
            session.history()[1].result_summary.as_deref(),
            Some("2 rows")
        );
    }

    #[tokio::test]
    async fn test_destructive_utterance_never_reaches_engine() {
        let mut session =
            Session::new(Box::new(SalesSource::healthy()), &EngineConfig::default()).unwrap();
        let reply = "```sql\nDELETE FROM sales\n```\nExplanation: removes everything";
        let err = analyst(reply)
            .ask("delete all records", &mut session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranslationError::Rejected(Violation::NotReadOnly(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_lost_retries_once() {
        let mut session =
            Session::new(Box::new(SalesSource::flaky(1)), &EngineConfig::default()).unwrap();
        let outcome = analyst(GOOD_REPLY)
            .ask("totals by region", &mut session)
            .await
            .unwrap();
        assert_eq!(outcome.result.row_count, 2);
    }

    #[tokio::test]
    async fn test_repeated_connection_loss_is_terminal() {
        let mut session =
            Session::new(Box::new(SalesSource::flaky(5)), &EngineConfig::default()).unwrap();
        let err = analyst(GOOD_REPLY)
            .ask("totals by region", &mut session)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranslationError::Execution(ExecutionFailure::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let mut config = EngineConfig::default();
        config.history_cap = 4;
        let mut session = Session::new(Box::new(SalesSource::healthy()), &config).unwrap();
        let analyst = Analyst::new(Arc::new(OneShotModel(GOOD_REPLY.to_string())), config);
        for i in 0..6 {
            analyst
                .ask(&format!("question {i}"), &mut session)
                .await
                .unwrap();
        }
        assert_eq!(session.history().len(), 4);
        // Oldest turns were dropped, newest retained.
        assert!(session.history().last().unwrap().text.contains("per region"));
    }
}
