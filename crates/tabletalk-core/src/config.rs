//! Engine configuration.
//!
//! The core consumes this configuration, it does not own it: callers build an
//! [`EngineConfig`] however they like (CLI flags, env vars, tests) and pass it
//! in. `from_env` resolves the documented env vars with clamped parses; an
//! unset or empty var falls back to the default.

use std::time::Duration;

pub const ROW_CEILING_ENV: &str = "TABLETALK_ROW_CEILING";
pub const EXEC_TIMEOUT_SECS_ENV: &str = "TABLETALK_EXEC_TIMEOUT_SECS";
pub const MODEL_TIMEOUT_SECS_ENV: &str = "TABLETALK_LLM_TIMEOUT_SECS";
pub const TOKEN_BUDGET_ENV: &str = "TABLETALK_PROMPT_TOKEN_BUDGET";
pub const HISTORY_WINDOW_ENV: &str = "TABLETALK_HISTORY_WINDOW";

const DEFAULT_ROW_CEILING: u64 = 1_000;
const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;
// Generous enough for local models to respond.
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TOKEN_BUDGET: usize = 2_048;
const DEFAULT_HISTORY_WINDOW: usize = 8;
const DEFAULT_HISTORY_CAP: usize = 24;

/// Tunables consumed by the pipeline. All bounds are externally supplied.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard ceiling on returned rows; injected as LIMIT when absent.
    pub row_ceiling: u64,
    /// Outer bound on one query execution.
    pub exec_timeout: Duration,
    /// Outer bound on one language-model call.
    pub model_timeout: Duration,
    /// Approximate token budget for the composed prompt.
    pub prompt_token_budget: usize,
    /// How many recent turns the prompt includes.
    pub history_window: usize,
    /// How many turns a session retains.
    pub history_cap: usize,
    /// Sample values kept per column in the schema snapshot.
    pub sample_values: usize,
    /// Distinct-count threshold for calling a column categorical.
    pub categorical_max_cardinality: usize,
    /// Distinct/rows ratio threshold for calling a column categorical.
    pub categorical_row_fraction: f64,
    /// Maximum nesting depth of subqueries before rejection.
    pub max_subquery_depth: usize,
    /// Categorical columns beyond this make a result unplottable.
    pub max_categorical_dims: usize,
    /// Minimum rows before a lone numeric column suggests a histogram.
    pub histogram_min_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_ceiling: DEFAULT_ROW_CEILING,
            exec_timeout: Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS),
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            prompt_token_budget: DEFAULT_TOKEN_BUDGET,
            history_window: DEFAULT_HISTORY_WINDOW,
            history_cap: DEFAULT_HISTORY_CAP,
            sample_values: 5,
            categorical_max_cardinality: 20,
            categorical_row_fraction: 0.05,
            max_subquery_depth: 2,
            max_categorical_dims: 2,
            histogram_min_rows: 20,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the `TABLETALK_*` env vars.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            row_ceiling: env_u64(ROW_CEILING_ENV, defaults.row_ceiling, 1, 1_000_000),
            exec_timeout: Duration::from_secs(env_u64(
                EXEC_TIMEOUT_SECS_ENV,
                defaults.exec_timeout.as_secs(),
                1,
                3_600,
            )),
            model_timeout: Duration::from_secs(env_u64(
                MODEL_TIMEOUT_SECS_ENV,
                defaults.model_timeout.as_secs(),
                1,
                3_600,
            )),
            prompt_token_budget: env_usize(
                TOKEN_BUDGET_ENV,
                defaults.prompt_token_budget,
                256,
                1_000_000,
            ),
            history_window: env_usize(HISTORY_WINDOW_ENV, defaults.history_window, 0, 200),
            ..defaults
        }
    }
}

fn env_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                return default;
            }
            match v.parse::<u64>() {
                Ok(parsed) => parsed.clamp(min, max),
                Err(_) => {
                    tracing::warn!(var = name, value = v, "ignoring unparseable env override");
                    default
                }
            }
        }
        Err(_) => default,
    }
}

fn env_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    env_u64(name, default as u64, min as u64, max as u64) as usize
}
