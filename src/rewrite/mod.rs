//! SQL rewrite pipeline.
//!
//! A statement goes through an ordered list of [`Rule`]s:
//! 1. `metric_view`: metrics, cumulative metrics, views and `roll_up` relations become CTEs
//! 2. `syntactic_sugar` (off by default): bare columns get qualified
//! 3. `accio`: models become CTEs and relationship paths read synthesized CTEs
//!
//! Between rules the statement is formatted and parsed again, so every rule
//! analyzes exactly the text the previous rule produced.

mod accio;
mod metric_sql;
mod metric_view;
mod model_sql;
mod order;
mod registry;
mod relationship_cte;
mod sugar;
mod walker;

use std::fmt;
use std::str::FromStr;

use sqlparser::ast::Statement;
use tracing::debug;

pub use accio::AccioRule;
pub use metric_view::MetricViewRule;
pub use model_sql::model_dependencies;
pub use registry::CteRegistry;
pub use sugar::SyntacticSugarRule;

use crate::error::{Error, Result};
use crate::mdl::{Catalog, SessionContext};
use crate::sql::parse::{format_statement, parse_statement, SqlDialect};

/// Default prefix of synthesized CTE names.
pub const DEFAULT_CTE_PREFIX: &str = "rs_";

/// One rewrite pass over a statement.
pub trait Rule {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        statement: Statement,
        session: &SessionContext,
        catalog: &Catalog,
    ) -> Result<Statement>;
}

/// The rules a pipeline can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    MetricView,
    SyntacticSugar,
    Accio,
}

impl RuleKind {
    /// `metric_view` then `accio`.
    pub fn defaults() -> Vec<RuleKind> {
        vec![RuleKind::MetricView, RuleKind::Accio]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::MetricView => "metric_view",
            RuleKind::SyntacticSugar => "syntactic_sugar",
            RuleKind::Accio => "accio",
        }
    }

    pub fn build(&self, dialect: SqlDialect, cte_prefix: &str) -> Box<dyn Rule + Send + Sync> {
        match self {
            RuleKind::MetricView => Box::new(MetricViewRule::new(dialect, cte_prefix)),
            RuleKind::SyntacticSugar => Box::new(SyntacticSugarRule::new(dialect)),
            RuleKind::Accio => Box::new(AccioRule::new(dialect, cte_prefix)),
        }
    }
}

impl FromStr for RuleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "metric_view" | "metric_view_sql_rewrite" => Ok(RuleKind::MetricView),
            "syntactic_sugar" => Ok(RuleKind::SyntacticSugar),
            "accio" | "accio_sql_rewrite" => Ok(RuleKind::Accio),
            other => Err(Error::malformed(format!("unknown rewrite rule: {}", other))),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses SQL, runs the configured rules in order and formats the result.
pub struct SqlRewriter {
    dialect: SqlDialect,
    rules: Vec<Box<dyn Rule + Send + Sync>>,
}

impl SqlRewriter {
    /// The default pipeline for `dialect`.
    pub fn new(dialect: SqlDialect) -> Self {
        Self::with_rules(dialect, &RuleKind::defaults(), DEFAULT_CTE_PREFIX)
    }

    pub fn with_rules(dialect: SqlDialect, rules: &[RuleKind], cte_prefix: &str) -> Self {
        Self {
            dialect,
            rules: rules
                .iter()
                .map(|kind| kind.build(dialect, cte_prefix))
                .collect(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn rewrite(&self, sql: &str, session: &SessionContext, catalog: &Catalog) -> Result<String> {
        let mut statement = parse_statement(self.dialect, sql)?;
        for rule in &self.rules {
            let input = format_statement(&statement);
            statement = parse_statement(self.dialect, &input)?;
            statement = rule.apply(statement, session, catalog)?;
            debug!(
                rule = rule.name(),
                input = %input,
                output = %statement,
                "applied rewrite rule"
            );
        }
        Ok(format_statement(&statement))
    }
}

impl Default for SqlRewriter {
    fn default() -> Self {
        Self::new(SqlDialect::default())
    }
}

/// Rewrite `sql` with the default pipeline and dialect.
pub fn rewrite(sql: &str, session: &SessionContext, catalog: &Catalog) -> Result<String> {
    SqlRewriter::default().rewrite(sql, session, catalog)
}
