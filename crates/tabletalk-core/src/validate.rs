//! Static safety validation of candidate queries.
//!
//! This is the last line of defense before model-proposed text reaches a live
//! database, so it is a pure function with no side effects: parse the
//! candidate, check it against the schema snapshot and the policy, and either
//! reject with the specific violated rule or hand back a sanitized statement.
//!
//! Rules are enforced in a fixed order and the first violation wins:
//!   1. a single read-only statement,
//!   2. every referenced table and column exists (case-insensitive),
//!   3. a row limit at or below the ceiling (injected or clamped, never a
//!      reason to reject),
//!   4. bounded subquery depth and no unconstrained multi-table joins.

use crate::config::EngineConfig;
use crate::error::Violation;
use crate::schema::SchemaDescription;
use crate::synthesize::CandidateQuery;
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, GroupByExpr, Join, JoinConstraint, JoinOperator, Query,
    Select, SelectItem, SetExpr, Statement, TableFactor, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;

/// The slice of configuration the validator consumes.
#[derive(Debug, Clone)]
pub struct Policy {
    pub row_ceiling: u64,
    pub max_subquery_depth: usize,
}

impl From<&EngineConfig> for Policy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            row_ceiling: config.row_ceiling,
            max_subquery_depth: config.max_subquery_depth,
        }
    }
}

/// Outcome of validation. An accepted verdict carries the sanitized text that
/// is the only thing allowed to reach the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted { sanitized: String },
    Rejected { violation: Violation },
}

impl Verdict {
    pub fn rejected(violation: Violation) -> Self {
        Verdict::Rejected { violation }
    }
}

pub fn validate(
    candidate: &CandidateQuery,
    schema: &SchemaDescription,
    policy: &Policy,
) -> Verdict {
    let dialect = GenericDialect {};
    let mut statements = match Parser::parse_sql(&dialect, &candidate.sql) {
        Ok(statements) => statements,
        Err(err) => return Verdict::rejected(Violation::Malformed(err.to_string())),
    };

    // Rule 1: exactly one statement, and it must be a plain query.
    if statements.is_empty() {
        return Verdict::rejected(Violation::Malformed("empty statement".to_string()));
    }
    if statements.len() > 1 {
        return Verdict::rejected(Violation::MultipleStatements);
    }
    let mut statement = statements.remove(0);
    let query = match &mut statement {
        Statement::Query(query) => query,
        other => return Verdict::rejected(Violation::NotReadOnly(statement_kind(other))),
    };
    if !query.locks.is_empty() {
        return Verdict::rejected(Violation::NotReadOnly("SELECT with locking".to_string()));
    }

    let mut scope = Scope::from_schema(schema);

    // Rule 2: identifiers; rule 4: depth and join safety. Both walk the AST,
    // collected here so the first violation in check order is reported.
    if let Err(violation) = check_query(query, 0, policy, &mut scope) {
        return Verdict::rejected(violation);
    }

    // Rule 3: bounding, never rejection. An explicit limit at or below the
    // ceiling passes the original text through byte-identical, which keeps
    // re-validation of sanitized queries idempotent. An absent or oversized
    // limit is rewritten to one past the ceiling: the engine fetches up to
    // the ceiling and uses the extra row to flag truncation.
    match effective_limit(query) {
        Some(limit) if limit <= policy.row_ceiling => Verdict::Accepted {
            sanitized: candidate.sql.clone(),
        },
        _ => {
            tracing::debug!(ceiling = policy.row_ceiling, "bounding query row limit");
            query.limit = Some(Expr::Value(Value::Number(
                (policy.row_ceiling + 1).to_string(),
                false,
            )));
            Verdict::Accepted {
                sanitized: statement.to_string(),
            }
        }
    }
}

fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

fn effective_limit(query: &Query) -> Option<u64> {
    match query.limit.as_ref()? {
        Expr::Value(Value::Number(n, _)) => n.parse::<u64>().ok(),
        // A non-literal limit cannot be checked against the ceiling, so it is
        // treated as absent and rewritten.
        _ => None,
    }
}

/// Identifier scope: schema tables and columns plus names introduced by the
/// query itself (aliases, CTEs, derived-table outputs).
struct Scope {
    tables: HashSet<String>,
    columns: HashSet<String>,
    introduced: HashSet<String>,
}

impl Scope {
    fn from_schema(schema: &SchemaDescription) -> Self {
        let mut tables = HashSet::new();
        let mut columns = HashSet::new();
        for table in &schema.tables {
            tables.insert(table.name.to_lowercase());
            for column in &table.columns {
                columns.insert(column.name.to_lowercase());
            }
        }
        Self {
            tables,
            columns,
            introduced: HashSet::new(),
        }
    }

    fn introduce(&mut self, name: &str) {
        self.introduced.insert(name.to_lowercase());
    }

    fn knows_table(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.tables.contains(&lower) || self.introduced.contains(&lower)
    }

    fn knows_column(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.columns.contains(&lower) || self.introduced.contains(&lower)
    }
}

fn check_query(
    query: &Query,
    depth: usize,
    policy: &Policy,
    scope: &mut Scope,
) -> Result<(), Violation> {
    if depth > policy.max_subquery_depth {
        return Err(Violation::UnsafeJoin(format!(
            "subquery nesting deeper than {}",
            policy.max_subquery_depth
        )));
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            // The CTE name and its declared columns are in scope inside the
            // CTE body as well (recursive CTEs reference themselves).
            scope.introduce(&cte.alias.name.value);
            for column in &cte.alias.columns {
                scope.introduce(&column.value);
            }
            check_query(&cte.query, depth + 1, policy, scope)?;
            introduce_projection_names(&cte.query, scope);
        }
    }
    check_set_expr(&query.body, depth, policy, scope)?;
    for order in &query.order_by {
        check_expr(&order.expr, depth, policy, scope)?;
    }
    Ok(())
}

fn check_set_expr(
    body: &SetExpr,
    depth: usize,
    policy: &Policy,
    scope: &mut Scope,
) -> Result<(), Violation> {
    match body {
        SetExpr::Select(select) => check_select(select, depth, policy, scope),
        SetExpr::Query(query) => check_query(query, depth, policy, scope),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left, depth, policy, scope)?;
            check_set_expr(right, depth, policy, scope)
        }
        SetExpr::Values(_) => Ok(()),
        other => Err(Violation::Malformed(format!(
            "unsupported query body: {other}"
        ))),
    }
}

fn check_select(
    select: &Select,
    depth: usize,
    policy: &Policy,
    scope: &mut Scope,
) -> Result<(), Violation> {
    if select.into.is_some() {
        return Err(Violation::NotReadOnly("SELECT INTO".to_string()));
    }

    // Register FROM items first so qualified column references resolve.
    for table in &select.from {
        register_table_factor(&table.relation, depth, policy, scope)?;
        for join in &table.joins {
            register_table_factor(&join.relation, depth, policy, scope)?;
        }
    }

    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => check_expr(expr, depth, policy, scope)?,
            SelectItem::ExprWithAlias { expr, alias } => {
                check_expr(expr, depth, policy, scope)?;
                scope.introduce(&alias.value);
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let qualifier = name.to_string();
                if !scope.knows_table(&qualifier) {
                    return Err(Violation::UnknownIdentifier(qualifier));
                }
            }
            SelectItem::Wildcard(_) => {}
        }
    }

    if let Some(selection) = &select.selection {
        check_expr(selection, depth, policy, scope)?;
    }
    if let GroupByExpr::Expressions(exprs) = &select.group_by {
        for expr in exprs {
            check_expr(expr, depth, policy, scope)?;
        }
    }
    if let Some(having) = &select.having {
        check_expr(having, depth, policy, scope)?;
    }

    check_join_safety(select)
}

fn register_table_factor(
    factor: &TableFactor,
    depth: usize,
    policy: &Policy,
    scope: &mut Scope,
) -> Result<(), Violation> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let table_name = name.to_string();
            if !scope.knows_table(&table_name) {
                return Err(Violation::UnknownIdentifier(table_name));
            }
            if let Some(alias) = alias {
                scope.introduce(&alias.name.value);
            }
            Ok(())
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            check_query(subquery, depth + 1, policy, scope)?;
            if let Some(alias) = alias {
                scope.introduce(&alias.name.value);
                for column in &alias.columns {
                    scope.introduce(&column.value);
                }
            }
            // Output names of the derived table become referenceable.
            introduce_projection_names(subquery, scope);
            Ok(())
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            register_table_factor(&table_with_joins.relation, depth, policy, scope)?;
            for join in &table_with_joins.joins {
                register_table_factor(&join.relation, depth, policy, scope)?;
            }
            Ok(())
        }
        other => Err(Violation::Malformed(format!(
            "unsupported table expression: {other}"
        ))),
    }
}

fn introduce_projection_names(query: &Query, scope: &mut Scope) {
    if let SetExpr::Select(select) = query.body.as_ref() {
        for item in &select.projection {
            match item {
                SelectItem::ExprWithAlias { alias, .. } => scope.introduce(&alias.value),
                SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                    scope.introduce(&ident.value)
                }
                _ => {}
            }
        }
    }
}

fn check_join_safety(select: &Select) -> Result<(), Violation> {
    let constrained = select.selection.is_some();
    // Comma-separated FROM list with no WHERE clause is a cartesian product.
    if select.from.len() > 1 && !constrained {
        return Err(Violation::UnsafeJoin(
            "multiple tables without a join condition".to_string(),
        ));
    }
    for table in &select.from {
        for join in &table.joins {
            if join_is_unconstrained(join) && !constrained {
                return Err(Violation::UnsafeJoin(
                    "join without a join condition".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn join_is_unconstrained(join: &Join) -> bool {
    match &join.join_operator {
        JoinOperator::Inner(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint) => matches!(constraint, JoinConstraint::None),
        JoinOperator::CrossJoin => true,
        _ => false,
    }
}

fn check_expr(
    expr: &Expr,
    depth: usize,
    policy: &Policy,
    scope: &mut Scope,
) -> Result<(), Violation> {
    match expr {
        Expr::Identifier(ident) => {
            if scope.knows_column(&ident.value) || scope.knows_table(&ident.value) {
                Ok(())
            } else {
                Err(Violation::UnknownIdentifier(ident.value.clone()))
            }
        }
        Expr::CompoundIdentifier(parts) => {
            if let (Some(qualifier), Some(column)) = (parts.first(), parts.last()) {
                if !scope.knows_table(&qualifier.value) {
                    return Err(Violation::UnknownIdentifier(qualifier.value.clone()));
                }
                if !scope.knows_column(&column.value) {
                    return Err(Violation::UnknownIdentifier(column.value.clone()));
                }
            }
            Ok(())
        }
        Expr::BinaryOp { left, right, .. } => {
            check_expr(left, depth, policy, scope)?;
            check_expr(right, depth, policy, scope)
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => check_expr(expr, depth, policy, scope),
        Expr::Cast { expr, .. } => check_expr(expr, depth, policy, scope),
        Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr) => check_expr(expr, depth, policy, scope),
        Expr::Between {
            expr, low, high, ..
        } => {
            check_expr(expr, depth, policy, scope)?;
            check_expr(low, depth, policy, scope)?;
            check_expr(high, depth, policy, scope)
        }
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            check_expr(expr, depth, policy, scope)?;
            check_expr(pattern, depth, policy, scope)
        }
        Expr::InList { expr, list, .. } => {
            check_expr(expr, depth, policy, scope)?;
            for item in list {
                check_expr(item, depth, policy, scope)?;
            }
            Ok(())
        }
        Expr::InSubquery { expr, subquery, .. } => {
            check_expr(expr, depth, policy, scope)?;
            check_query(subquery, depth + 1, policy, scope)
        }
        Expr::Subquery(subquery) => check_query(subquery, depth + 1, policy, scope),
        Expr::Exists { subquery, .. } => check_query(subquery, depth + 1, policy, scope),
        Expr::Function(function) => {
            for arg in &function.args {
                let arg_expr = match arg {
                    FunctionArg::Named { arg, .. } => arg,
                    FunctionArg::Unnamed(arg) => arg,
                };
                if let FunctionArgExpr::Expr(expr) = arg_expr {
                    check_expr(expr, depth, policy, scope)?;
                }
            }
            Ok(())
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                check_expr(operand, depth, policy, scope)?;
            }
            for expr in conditions.iter().chain(results.iter()) {
                check_expr(expr, depth, policy, scope)?;
            }
            if let Some(else_result) = else_result {
                check_expr(else_result, depth, policy, scope)?;
            }
            Ok(())
        }
        Expr::Tuple(exprs) => {
            for expr in exprs {
                check_expr(expr, depth, policy, scope)?;
            }
            Ok(())
        }
        Expr::Extract { expr, .. } => check_expr(expr, depth, policy, scope),
        // Literals and anything exotic carry no identifiers worth chasing.
        _ => Ok(()),
    }
}
