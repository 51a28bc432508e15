//! SQL parsing and classification.
//!
//! Uses sqlparser-rs with the Snowflake dialect. Anything that cannot be parsed
//! is rated destructive.

use sqlparser::ast::{Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;

use super::{Classification, SafetyLevel, StatementKind};

type Rating = (SafetyLevel, StatementKind);

/// SQL classifier bound to the Snowflake dialect.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: SnowflakeDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    pub fn new() -> Self {
        Self {
            dialect: SnowflakeDialect {},
        }
    }

    /// Classifies every statement in `sql` and keeps the most dangerous rating.
    pub fn classify(&self, sql: &str) -> Classification {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                return Classification::with_note(
                    SafetyLevel::Destructive,
                    StatementKind::Unknown,
                    format!("Could not parse SQL: {e}"),
                )
            }
        };

        match statements.as_slice() {
            [] => Classification::with_note(
                SafetyLevel::Destructive,
                StatementKind::Unknown,
                "Empty SQL statement",
            ),
            [single] => {
                let (level, kind) = rate_statement(single);
                Classification::new(level, kind)
            }
            many => {
                let (level, kind) = many
                    .iter()
                    .map(rate_statement)
                    .fold((SafetyLevel::Safe, StatementKind::Select), worst);
                Classification::new(level, StatementKind::Multiple(Box::new(kind)))
            }
        }
    }
}

/// Classifies SQL without keeping a classifier around.
pub fn classify_sql(sql: &str) -> Classification {
    SqlClassifier::new().classify(sql)
}

/// Keeps the more dangerous rating; ties keep the first.
fn worst(a: Rating, b: Rating) -> Rating {
    if b.0 > a.0 {
        b
    } else {
        a
    }
}

fn rate_statement(statement: &Statement) -> Rating {
    use SafetyLevel::*;

    match statement {
        Statement::Query(query) => rate_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            // EXPLAIN ANALYZE runs the statement.
            let level = if *analyze {
                rate_statement(statement).0
            } else {
                Safe
            };
            (level, StatementKind::Explain)
        }
        Statement::ExplainTable { .. } => (Safe, StatementKind::Explain),
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. } => (Safe, StatementKind::Show),

        Statement::Insert { .. } => (Mutating, StatementKind::Insert),
        Statement::Update { .. } => (Mutating, StatementKind::Update),
        Statement::Merge { .. } => (Mutating, StatementKind::Merge),

        Statement::Delete { .. } => (Destructive, StatementKind::Delete),
        Statement::Drop { .. } => (Destructive, StatementKind::Drop),
        Statement::Truncate { .. } => (Destructive, StatementKind::Truncate),
        Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => (Destructive, StatementKind::Alter),
        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateStage { .. } => (Destructive, StatementKind::Create),
        Statement::Grant { .. } => (Destructive, StatementKind::Grant),
        Statement::Revoke { .. } => (Destructive, StatementKind::Revoke),

        _ => (Destructive, StatementKind::Unknown),
    }
}

/// Rates a query, including CTEs and subqueries that may hide mutations.
fn rate_query(query: &Query) -> Rating {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| rate_query(&cte.query));

    ctes.fold(rate_set_expr(&query.body), worst)
}

fn rate_set_expr(set_expr: &SetExpr) -> Rating {
    match set_expr {
        SetExpr::Select(select) => select
            .from
            .iter()
            .map(rate_table_with_joins)
            .fold((SafetyLevel::Safe, StatementKind::Select), worst),
        SetExpr::Query(query) => rate_query(query),
        SetExpr::SetOperation { left, right, .. } => worst(rate_set_expr(left), rate_set_expr(right)),
        SetExpr::Values(_) | SetExpr::Table(_) => (SafetyLevel::Safe, StatementKind::Select),
        SetExpr::Insert(statement) | SetExpr::Update(statement) => rate_statement(statement),
        #[allow(unreachable_patterns)]
        _ => (SafetyLevel::Destructive, StatementKind::Unknown),
    }
}

fn rate_table_with_joins(twj: &TableWithJoins) -> Rating {
    twj.joins
        .iter()
        .map(|join| rate_table_factor(&join.relation))
        .fold(rate_table_factor(&twj.relation), worst)
}

fn rate_table_factor(factor: &TableFactor) -> Rating {
    match factor {
        TableFactor::Derived { subquery, .. } => rate_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => rate_table_with_joins(table_with_joins),
        _ => (SafetyLevel::Safe, StatementKind::Select),
    }
}
