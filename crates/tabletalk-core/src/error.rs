//! Error taxonomy for the translation pipeline.
//!
//! Every failure is recoverable at the `ask` boundary; nothing here is
//! allowed to propagate as an unhandled fault. Execution failures carry the
//! underlying driver error as a `source` for logs, but their display text is
//! sanitized so raw driver internals never reach the end user.

use std::time::Duration;

/// Failure reported by a data-source adapter.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("connection to the data source was lost")]
    ConnectionLost(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("query exceeded the execution timeout")]
    Timeout,
}

/// Failure while building a schema snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("data source cannot be queried")]
    SourceUnavailable(#[source] SourceError),
    #[error("no columns discoverable in the data source")]
    EmptySchema,
}

/// Failure from the language-model capability.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model API error: {0}")]
    Api(String),
    #[error("model network error: {0}")]
    Network(String),
    #[error("model call exceeded {0:?}")]
    Timeout(Duration),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Failure to turn an utterance into a candidate query.
///
/// `raw` carries the model text that could not be parsed, for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisFailure {
    #[error("model did not return a parseable query")]
    Unparseable { raw: String },
    #[error("model call failed")]
    Model(#[source] ModelError),
}

/// The specific rule a candidate query violated, in the order rules are
/// checked. The first violation wins; later rules are not evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("query could not be parsed: {0}")]
    Malformed(String),
    #[error("only single read-only statements are allowed, got {0}")]
    NotReadOnly(String),
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("unsafe join: {0}")]
    UnsafeJoin(String),
}

/// Failure during bounded execution of a sanitized query.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("query exceeded the execution timeout")]
    ExecutionTimeout,
    #[error("query execution failed")]
    ExecutionError(#[source] SourceError),
    #[error("connection to the data source was lost")]
    ConnectionLost,
}

/// Terminal error for one `ask` request.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("could not translate the question into a query")]
    Synthesis(#[from] SynthesisFailure),
    #[error("query rejected: {0}")]
    Rejected(#[from] Violation),
    #[error(transparent)]
    Execution(#[from] ExecutionFailure),
}

impl TranslationError {
    /// Short stable name of the failure kind, for callers that render errors
    /// without matching on the full enum.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslationError::Schema(SchemaError::SourceUnavailable(_)) => "SourceUnavailable",
            TranslationError::Schema(SchemaError::EmptySchema) => "EmptySchema",
            TranslationError::Synthesis(_) => "SynthesisFailure",
            TranslationError::Rejected(Violation::UnknownIdentifier(_)) => "UnknownIdentifier",
            TranslationError::Rejected(Violation::UnsafeJoin(_)) => "UnsafeJoin",
            TranslationError::Rejected(_) => "ValidationRejected",
            TranslationError::Execution(ExecutionFailure::ExecutionTimeout) => "ExecutionTimeout",
            TranslationError::Execution(ExecutionFailure::ExecutionError(_)) => "ExecutionError",
            TranslationError::Execution(ExecutionFailure::ConnectionLost) => "ConnectionLost",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display_is_sanitized() {
        let err = ExecutionFailure::ExecutionError(SourceError::QueryFailed(
            "SQLITE_ERROR: near \"FRM\": syntax error in 'SELECT * FRM t'".to_string(),
        ));
        // Driver detail stays in the source chain, not in the display text.
        assert_eq!(err.to_string(), "query execution failed");
    }

    #[test]
    fn test_kind_names() {
        let err = TranslationError::Rejected(Violation::UnknownIdentifier("profit".into()));
        assert_eq!(err.kind(), "UnknownIdentifier");
        let err = TranslationError::Execution(ExecutionFailure::ConnectionLost);
        assert_eq!(err.kind(), "ConnectionLost");
    }
}
