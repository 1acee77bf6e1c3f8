//! Prompt composition.
//!
//! Builds the translation request from the utterance, the schema snapshot,
//! recent conversation turns, and the output-format contract. Construction is
//! deterministic given identical inputs; the only nondeterminism in the
//! pipeline is the model call itself.
//!
//! When the rendered schema exceeds the token budget, truncation proceeds in
//! a fixed order: sample values drop first, then trailing columns, then whole
//! tables, least-recently-referenced first. A table named in the current
//! utterance is never dropped.

use crate::config::EngineConfig;
use crate::schema::{SchemaDescription, TableSchema};
use crate::source::Dialect;
use crate::{ConversationTurn, Role};

/// A composed request payload, ready for the model.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub text: String,
    /// Tables omitted by budget truncation, for diagnostics.
    pub dropped_tables: Vec<String>,
}

/// Rough token estimate; four bytes per token is close enough for budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4 + 1
}

const INSTRUCTIONS: &str = "\
You translate questions about tabular data into a single read-only SQL query.

Rules:
- Use only the tables and columns listed below.
- Produce exactly one SELECT statement; never modify data or schema.
- Prefer aggregates over raw dumps when the question asks for totals or trends.
- Include a LIMIT clause when returning raw rows.

Respond with a fenced ```sql code block containing the query, followed by one
line starting with \"Explanation:\" that says in plain language what the query
returns.";

pub fn compose(
    utterance: &str,
    schema: &SchemaDescription,
    history: &[ConversationTurn],
    dialect: Dialect,
    config: &EngineConfig,
) -> ComposedPrompt {
    let recent: Vec<&ConversationTurn> = history
        .iter()
        .rev()
        .take(config.history_window)
        .rev()
        .collect();

    // Keep-priority per table: named in the utterance beats named in a recent
    // turn (newer mentions rank higher) beats never mentioned. Among
    // unmentioned tables, later-declared ones drop first.
    let ranked_drop_order = drop_order(schema, utterance, &recent);

    let mut dropped_tables: Vec<String> = Vec::new();
    let mut with_samples = true;
    let mut column_cap: Option<usize> = None;
    let mut omitted: usize = 0;

    let text = loop {
        let kept: Vec<&TableSchema> = schema
            .tables
            .iter()
            .filter(|t| !dropped_tables.iter().any(|d| d == &t.name))
            .collect();
        let text = render(
            utterance,
            &kept,
            &recent,
            dialect,
            with_samples,
            column_cap,
        );
        if estimate_tokens(&text) <= config.prompt_token_budget {
            break text;
        }

        // Truncation ladder: samples, then columns, then whole tables.
        if with_samples {
            with_samples = false;
            continue;
        }
        match column_cap {
            None => {
                column_cap = Some(12);
                continue;
            }
            Some(cap) if cap > 5 => {
                column_cap = Some(if cap > 8 { 8 } else { 5 });
                continue;
            }
            _ => {}
        }
        if omitted < ranked_drop_order.len() {
            dropped_tables.push(ranked_drop_order[omitted].clone());
            omitted += 1;
            continue;
        }
        // Nothing left to trim; send what we have.
        break text;
    };

    if !dropped_tables.is_empty() {
        tracing::debug!(
            dropped = dropped_tables.len(),
            "schema truncated to fit the prompt budget"
        );
    }

    ComposedPrompt {
        text,
        dropped_tables,
    }
}

/// Reformulation appended after an unparseable reply; quotes the reply so the
/// model can see what went wrong.
pub fn reformulate(original: &ComposedPrompt, invalid_reply: &str) -> String {
    let preview: String = invalid_reply.chars().take(2_000).collect();
    format!(
        "{}\n\n---\nYour previous reply did not contain a usable SQL query.\n\
         Reply again with ONLY a fenced ```sql code block holding one SELECT\n\
         statement, then a single \"Explanation:\" line. No other text.\n\n\
         Previous reply (truncated):\n{}\n",
        original.text, preview
    )
}

fn drop_order(
    schema: &SchemaDescription,
    utterance: &str,
    recent: &[&ConversationTurn],
) -> Vec<String> {
    let utterance_lower = utterance.to_lowercase();
    let mut candidates: Vec<(usize, usize, String)> = Vec::new();
    for (decl_idx, table) in schema.tables.iter().enumerate() {
        let name_lower = table.name.to_lowercase();
        if utterance_lower.contains(&name_lower) {
            continue; // pinned
        }
        // Higher = mentioned more recently; 0 = never mentioned.
        let recency = recent
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn.text.to_lowercase().contains(&name_lower))
            .map(|(i, _)| i + 1)
            .max()
            .unwrap_or(0);
        candidates.push((recency, decl_idx, table.name.clone()));
    }
    // Drop the stalest first; among equals, the later-declared table.
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    candidates.into_iter().map(|(_, _, name)| name).collect()
}

fn render(
    utterance: &str,
    tables: &[&TableSchema],
    recent: &[&ConversationTurn],
    dialect: Dialect,
    with_samples: bool,
    column_cap: Option<usize>,
) -> String {
    let mut out = String::new();
    out.push_str(INSTRUCTIONS);
    out.push_str("\n\nDialect: ");
    out.push_str(dialect.as_str());
    out.push_str("\n\nTables:\n");

    for table in tables {
        let rows = table
            .approx_rows
            .map(|r| format!("~{r} rows"))
            .unwrap_or_else(|| "row count unknown".to_string());
        out.push_str(&format!("  {} ({rows}):\n", table.name));
        let cap = column_cap.unwrap_or(usize::MAX);
        for column in table.columns.iter().take(cap) {
            let nullable = if column.nullable { ", nullable" } else { "" };
            out.push_str(&format!("    - {} ({}{nullable})", column.name, column.kind));
            if with_samples && !column.samples.is_empty() {
                let samples: Vec<String> =
                    column.samples.iter().map(|s| s.render()).collect();
                out.push_str(&format!(": e.g. {}", samples.join(", ")));
            }
            out.push('\n');
        }
        if table.columns.len() > cap {
            out.push_str(&format!(
                "    … and {} more columns\n",
                table.columns.len() - cap
            ));
        }
    }

    if !recent.is_empty() {
        out.push_str("\nRecent conversation:\n");
        for turn in recent {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push_str(&format!("  {role}: {}\n", turn.text));
            if let Some(query) = &turn.query {
                out.push_str(&format!("    (query: {query})\n"));
            }
        }
    }

    out.push_str("\nQuestion: ");
    out.push_str(utterance);
    out.push('\n');
    out
}
