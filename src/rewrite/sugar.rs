//! Qualifies bare column references with the relation they resolve to.

use sqlparser::ast::{Expr, Statement};

use super::walker::{walk_query, RewriteHooks};
use super::Rule;
use crate::analyzer::{Analysis, StatementAnalyzer};
use crate::error::Result;
use crate::mdl::{Catalog, SessionContext};
use crate::sql::parse::{parse_expr, SqlDialect};

pub struct SyntacticSugarRule {
    dialect: SqlDialect,
}

impl SyntacticSugarRule {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }
}

impl Rule for SyntacticSugarRule {
    fn name(&self) -> &'static str {
        "syntactic_sugar"
    }

    fn apply(
        &self,
        statement: Statement,
        session: &SessionContext,
        catalog: &Catalog,
    ) -> Result<Statement> {
        let mut query = match statement {
            Statement::Query(query) => query,
            other => return Ok(other),
        };
        let analysis = StatementAnalyzer::new(catalog, session).analyze_query(&query)?;
        if analysis.selects().iter().all(|s| s.columns.is_empty()) {
            return Ok(Statement::Query(query));
        }
        walk_query(
            &mut query,
            &mut Qualifier {
                dialect: self.dialect,
                analysis: &analysis,
            },
        )?;
        Ok(Statement::Query(query))
    }
}

struct Qualifier<'r> {
    dialect: SqlDialect,
    analysis: &'r Analysis,
}

impl RewriteHooks for Qualifier<'_> {
    fn expression(&mut self, select: usize, expr: &mut Expr) -> Result<bool> {
        let Expr::Identifier(ident) = expr else {
            return Ok(false);
        };
        let name = ident.to_string();
        let Some(qualifier) = self
            .analysis
            .selects()
            .get(select)
            .and_then(|s| s.columns.get(&name))
        else {
            return Ok(false);
        };
        *expr = parse_expr(self.dialect, &format!("{}.{}", qualifier, name))?;
        Ok(true)
    }
}
