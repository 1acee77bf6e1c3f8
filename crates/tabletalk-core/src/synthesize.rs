//! Query synthesis.
//!
//! Invokes the language-model capability and parses its reply into a
//! [`CandidateQuery`]. The model is untrusted: it only ever proposes; the
//! validator and the execution engine decide what runs.
//!
//! Parsing is deliberately lenient (a query wrapped in prose or formatting
//! is still extracted), but a reply with no recognizable query block fails
//! explicitly rather than degrading silently. One retry with a stricter
//! reformulation is attempted before surfacing `SynthesisFailure` with the
//! raw model text attached.

use crate::error::{ModelError, SynthesisFailure};
use crate::prompt::{reformulate, ComposedPrompt};
use crate::source::Dialect;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// The single narrow capability the core needs from a model provider:
/// text in, text out, bounded by a timeout. Provider-specific payloads live
/// in adapters outside this crate.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError>;
}

/// Declared shape of a candidate query, derived from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Select,
    Aggregate,
    Filter,
}

/// A parsed model proposal. Lives for one request; never persisted unless
/// the caller accepts it.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub sql: String,
    pub dialect: Dialect,
    pub intent: QueryIntent,
    pub explanation: String,
}

pub struct Synthesizer<'m> {
    model: &'m dyn LanguageModel,
    timeout: Duration,
}

impl<'m> Synthesizer<'m> {
    pub fn new(model: &'m dyn LanguageModel, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// One synthesis attempt plus one strict retry on parse failure.
    pub async fn synthesize(
        &self,
        prompt: &ComposedPrompt,
        dialect: Dialect,
    ) -> Result<CandidateQuery, SynthesisFailure> {
        let reply = self
            .model
            .complete(&prompt.text, self.timeout)
            .await
            .map_err(SynthesisFailure::Model)?;

        if let Some(candidate) = parse_reply(&reply, dialect) {
            return Ok(candidate);
        }

        tracing::debug!("model reply had no query block, retrying with reformulation");
        let strict = reformulate(prompt, &reply);
        let retry = self
            .model
            .complete(&strict, self.timeout)
            .await
            .map_err(SynthesisFailure::Model)?;

        parse_reply(&retry, dialect).ok_or(SynthesisFailure::Unparseable { raw: retry })
    }
}

/// Extract a query and explanation from a model reply.
///
/// Extraction order: a fenced ```sql block, then any fenced block whose body
/// reads as a query, then bare SELECT-prefixed text.
pub fn parse_reply(reply: &str, dialect: Dialect) -> Option<CandidateQuery> {
    let sql = extract_sql(reply)?;
    let explanation = extract_explanation(reply)
        .unwrap_or_else(|| "Query translated from your question.".to_string());
    let intent = classify_intent(&sql);
    Some(CandidateQuery {
        sql,
        dialect,
        intent,
        explanation,
    })
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(\w*)[ \t]*\r?\n(.*?)```").expect("static regex")
    })
}

fn extract_sql(reply: &str) -> Option<String> {
    // Fenced ```sql block first.
    for cap in fence_regex().captures_iter(reply) {
        let lang = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        if lang.eq_ignore_ascii_case("sql") {
            let body = cap[2].trim();
            if !body.is_empty() {
                return Some(clean_statement(body));
            }
        }
    }
    // Any fenced block whose body reads as a query.
    for cap in fence_regex().captures_iter(reply) {
        let body = cap[2].trim();
        if looks_like_query(body) {
            return Some(clean_statement(body));
        }
    }
    // Bare statement in prose: take from the first SELECT keyword to the end
    // of the statement. WITH is not matched here because the word is too
    // common in prose; CTE queries are expected inside a fence.
    if let Some(found) = keyword_regex().find(reply) {
        let tail = &reply[found.start()..];
        let end = tail
            .find(';')
            .map(|i| i + 1)
            .unwrap_or_else(|| tail.find("\n\n").unwrap_or(tail.len()));
        let body = tail[..end].trim();
        if looks_like_query(body) {
            return Some(clean_statement(body));
        }
    }
    None
}

fn keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bselect\b").expect("static regex"))
}

fn looks_like_query(body: &str) -> bool {
    let upper = body.trim_start().to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}

fn clean_statement(body: &str) -> String {
    // Drop comment lines the model may interleave; keep one statement.
    let joined: String = body
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    joined.trim().trim_end_matches(';').trim().to_string()
}

fn extract_explanation(reply: &str) -> Option<String> {
    for line in reply.lines() {
        let trimmed = line.trim().trim_start_matches("--").trim();
        let lower = trimmed.to_lowercase();
        if let Some(rest) = lower
            .starts_with("explanation:")
            .then(|| trimmed["explanation:".len()..].trim())
        {
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    None
}

fn classify_intent(sql: &str) -> QueryIntent {
    let upper = sql.to_uppercase();
    const AGGREGATES: &[&str] = &["GROUP BY", "COUNT(", "SUM(", "AVG(", "MIN(", "MAX("];
    if AGGREGATES.iter().any(|a| upper.contains(a)) {
        QueryIntent::Aggregate
    } else if upper.contains(" WHERE ") {
        QueryIntent::Filter
    } else {
        QueryIntent::Select
    }
}
