//! TableTalk core: natural-language to SQL translation and bounded execution.
//!
//! The pipeline takes an ambiguous user utterance plus a live schema,
//! produces a syntactically and semantically valid query (or refuses
//! safely), executes it with resource bounds, and annotates the result well
//! enough to drive automatic visualization.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       TRANSLATION PIPELINE                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  DataSource ──► Introspector ──► Prompt Composer ──► Synthesizer │
//! │      ▲              (schema)       (history, budget)     │       │
//! │      │                                                   ▼       │
//! │  Execution Engine ◄────────────── Safety Validator ◄─ Candidate  │
//! │      │            sanitized query      (pure check)              │
//! │      ▼                                                           │
//! │  Result Annotator ──► caller (explanation, rows, chart hint)     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The model only ever proposes; the validator and the engine decide what
//! runs. A candidate query cannot reach the execution engine without an
//! accepted verdict, and everything the model touches is bounded by a
//! timeout and a row ceiling.
//!
//! The two external capabilities, the language model and the data source,
//! are narrow traits ([`LanguageModel`], [`DataSource`]), so the core's
//! correctness properties are testable with deterministic stubs.

pub mod annotate;
pub mod config;
pub mod error;
pub mod execute;
pub mod prompt;
pub mod schema;
pub mod session;
pub mod source;
pub mod synthesize;
pub mod validate;
pub mod value;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use annotate::{recommend, ChartKind, ChartRecommendation};
pub use config::EngineConfig;
pub use error::{
    ExecutionFailure, ModelError, SchemaError, SourceError, SynthesisFailure, TranslationError,
    Violation,
};
pub use execute::ResultSet;
pub use schema::{introspect, ColumnInfo, SchemaDescription, TableSchema};
pub use session::{Analyst, AskOutcome, Session};
pub use source::{DataSource, Dialect, RawColumn, RawRows, RawTable, SharedSource};
pub use synthesize::{CandidateQuery, LanguageModel, QueryIntent};
pub use validate::{validate, Policy, Verdict};
pub use value::{ColumnKind, Scalar};

/// One entry in a session's conversation history. Appended monotonically,
/// never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    /// Query attached to an assistant turn that executed one.
    pub query: Option<String>,
    /// Short result summary attached to an assistant turn.
    pub result_summary: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}
