//! Parse and format boundary around `sqlparser`.
//!
//! Rewrite rules never share AST nodes: each rule formats its input to text and
//! parses it again, so every helper here works on owned values.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Ident, Join, Query, SetExpr, Statement, TableFactor};
use sqlparser::dialect::{Dialect, DuckDbDialect, GenericDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use super::dialect::MdlDialect;
use crate::error::{Error, Result};

/// Dialect used for parsing and formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    DuckDb,
    Generic,
    Postgres,
}

impl SqlDialect {
    /// The `sqlparser` dialect, extended with lambdas and subscripted field access.
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::DuckDb => Box::new(MdlDialect(DuckDbDialect {})),
            SqlDialect::Generic => Box::new(MdlDialect(GenericDialect {})),
            SqlDialect::Postgres => Box::new(MdlDialect(PostgreSqlDialect {})),
        }
    }
}

impl std::str::FromStr for SqlDialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" => Ok(SqlDialect::DuckDb),
            "generic" => Ok(SqlDialect::Generic),
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            other => Err(Error::malformed(format!("unknown SQL dialect: {}", other))),
        }
    }
}

/// Parse exactly one statement.
pub fn parse_statement(dialect: SqlDialect, sql: &str) -> Result<Statement> {
    let dialect = dialect.parser_dialect();
    let mut statements = Parser::parse_sql(dialect.as_ref(), sql)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        n => Err(Error::malformed(format!(
            "expected exactly one statement, found {}",
            n
        ))),
    }
}

pub fn format_statement(statement: &Statement) -> String {
    statement.to_string()
}

pub fn parse_expr(dialect: SqlDialect, sql: &str) -> Result<Expr> {
    let dialect = dialect.parser_dialect();
    let expr = Parser::new(dialect.as_ref()).try_with_sql(sql)?.parse_expr()?;
    Ok(expr)
}

pub fn parse_query(dialect: SqlDialect, sql: &str) -> Result<Query> {
    match parse_statement(dialect, sql)? {
        Statement::Query(query) => Ok(*query),
        other => Err(Error::malformed(format!("expected a query, found: {}", other))),
    }
}

/// Parse `sql` as a query whose body is a single SELECT and hand back its first FROM item.
fn first_from(dialect: SqlDialect, sql: &str) -> Result<sqlparser::ast::TableWithJoins> {
    let query = parse_query(dialect, sql)?;
    match *query.body {
        SetExpr::Select(select) => select
            .from
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(format!("missing FROM clause: {}", sql))),
        _ => Err(Error::malformed(format!("expected a SELECT: {}", sql))),
    }
}

/// Build a join node from its SQL text, e.g. `LEFT JOIN "x" ON a.id = "x".bk`.
pub fn parse_join(dialect: SqlDialect, join_sql: &str) -> Result<Join> {
    let sql = format!("SELECT * FROM __anchor {}", join_sql);
    first_from(dialect, &sql)?
        .joins
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed(format!("not a join clause: {}", join_sql)))
}

/// Build a table factor from its SQL text, e.g. `"rollup_cte" AS r`.
pub fn parse_table_factor(dialect: SqlDialect, factor_sql: &str) -> Result<TableFactor> {
    let sql = format!("SELECT * FROM {}", factor_sql);
    Ok(first_from(dialect, &sql)?.relation)
}

/// Double-quoted identifier text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quoted(name: &str) -> Ident {
    Ident::with_quote('"', name)
}

/// Single-quoted string literal text.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
