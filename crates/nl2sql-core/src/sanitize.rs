//! SQL extraction and safety policy
//!
//! Translator output is treated as untrusted input. A candidate passes only if,
//! after fence removal, it parses as exactly one statement of an allowed kind
//! whose relations are all schema-qualified tables of the descriptor (or CTEs
//! the statement defines itself). Anything that cannot be classified is rejected.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use sqlparser::ast::{ObjectName, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::{dialect_from_str, Dialect, GenericDialect};
use sqlparser::parser::Parser;

use crate::error::{PipelineError, Result, UnsafeReason};
use crate::schema::SchemaDescriptor;
use crate::translate::CandidateStatement;

const FENCE: &str = "```";

/// SQL text that satisfied the safety policy; the only input the executor accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStatement {
    sql: String,
    mutating: bool,
}

impl ValidatedStatement {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// True for INSERT/UPDATE/DELETE admitted under `allow_mutation`
    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    pub fn into_string(self) -> String {
        self.sql
    }
}

impl From<&ValidatedStatement> for CandidateStatement {
    fn from(statement: &ValidatedStatement) -> Self {
        CandidateStatement::new(statement.as_str())
    }
}

/// Applies the safety policy for one schema
pub struct Sanitizer {
    schema: Arc<SchemaDescriptor>,
    allow_mutation: bool,
}

impl Sanitizer {
    pub fn new(schema: Arc<SchemaDescriptor>, allow_mutation: bool) -> Self {
        Self {
            schema,
            allow_mutation,
        }
    }

    pub fn sanitize(&self, candidate: &CandidateStatement) -> Result<ValidatedStatement> {
        let sql = extract_sql(candidate.as_str()).map_err(PipelineError::UnsafeStatement)?;
        let mutating = self.classify(sql).map_err(PipelineError::UnsafeStatement)?;
        Ok(ValidatedStatement {
            sql: sql.to_string(),
            mutating,
        })
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        dialect_from_str(&self.schema.dialect).unwrap_or_else(|| Box::new(GenericDialect {}))
    }

    /// Returns whether the statement mutates data
    fn classify(&self, sql: &str) -> std::result::Result<bool, UnsafeReason> {
        let dialect = self.dialect();
        let statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| UnsafeReason::Unparseable(e.to_string()))?;

        let statement = match statements.as_slice() {
            [] => return Err(UnsafeReason::Empty),
            [single] => single,
            many => return Err(UnsafeReason::StackedStatements(many.len())),
        };

        let mutating = match statement {
            Statement::Query(_) => false,
            Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. }
                if self.allow_mutation =>
            {
                true
            }
            other => return Err(UnsafeReason::DisallowedStatement(statement_kind(other))),
        };

        self.check_relations(statement)?;
        Ok(mutating)
    }

    fn check_relations(&self, statement: &Statement) -> std::result::Result<(), UnsafeReason> {
        let ctes: HashSet<String> = match statement {
            Statement::Query(query) => query
                .with
                .iter()
                .flat_map(|with| with.cte_tables.iter())
                .map(|cte| cte.alias.name.value.to_lowercase())
                .collect(),
            _ => HashSet::new(),
        };

        let mut checker = RelationChecker {
            schema: &self.schema,
            ctes,
        };
        match statement.visit(&mut checker) {
            ControlFlow::Break(reason) => Err(reason),
            ControlFlow::Continue(()) => Ok(()),
        }
    }
}

/// Walks every table factor and relation name of a statement.
///
/// Plain table references must name a descriptor table or a CTE. Anything
/// that calls into the engine (table functions, `LATERAL f()`, `UNNEST`,
/// PIVOT) is rejected, including a call whose name shadows a CTE.
struct RelationChecker<'a> {
    schema: &'a SchemaDescriptor,
    ctes: HashSet<String>,
}

impl Visitor for RelationChecker<'_> {
    type Break = UnsafeReason;

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<UnsafeReason> {
        match table_factor {
            TableFactor::Table { name, args: None, .. } => self.check_name(name),
            TableFactor::Table { name, .. } | TableFactor::Function { name, .. } => {
                ControlFlow::Break(UnsafeReason::UnknownRelation(format!("{}()", lowercase(name))))
            }
            TableFactor::Derived { .. } | TableFactor::NestedJoin { .. } => ControlFlow::Continue(()),
            other => ControlFlow::Break(UnsafeReason::UnknownRelation(other.to_string())),
        }
    }

    // INSERT targets reach here without a table factor
    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<UnsafeReason> {
        self.check_name(relation)
    }
}

impl RelationChecker<'_> {
    fn check_name(&self, name: &ObjectName) -> ControlFlow<UnsafeReason> {
        let qualified = lowercase(name);
        let known = self.schema.is_qualified_table(&qualified)
            || (name.0.len() == 1 && self.ctes.contains(&qualified));
        if known {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(UnsafeReason::UnknownRelation(qualified))
        }
    }
}

fn lowercase(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// Leading keyword of a statement, e.g. `DROP`
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}

/// Trim, remove one surrounding code fence if present, trim again
pub fn extract_sql(text: &str) -> std::result::Result<&str, UnsafeReason> {
    let text = text.trim();
    let sql = if text.starts_with(FENCE) {
        strip_fence(text)?.trim()
    } else {
        text
    };

    if sql.is_empty() {
        return Err(UnsafeReason::Empty);
    }
    Ok(sql)
}

/// Opening line is the marker plus an optional language tag; the closing
/// marker must sit alone on the last line; the body may not contain markers.
fn strip_fence(text: &str) -> std::result::Result<&str, UnsafeReason> {
    let rest = &text[FENCE.len()..];
    let (opening, body) = rest.split_once('\n').ok_or(UnsafeReason::MalformedFence)?;

    let tag = opening.trim();
    let tag_ok = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-'));
    if !tag_ok {
        return Err(UnsafeReason::MalformedFence);
    }

    let inner = body
        .strip_suffix(FENCE)
        .ok_or(UnsafeReason::MalformedFence)?;
    if !(inner.is_empty() || inner.ends_with('\n')) || inner.contains(FENCE) {
        return Err(UnsafeReason::MalformedFence);
    }
    Ok(inner)
}
