//! Model and relationship expansion.
//!
//! Every model the statement touches becomes a CTE named after the model, model
//! table references point at those CTEs, and relationship paths and array
//! functions read from synthesized CTEs joined back onto their relation.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use sqlparser::ast::{Expr, ObjectName, Select, Statement, TableFactor, TableWithJoins};
use tracing::trace;

use super::model_sql::model_cte_body;
use super::order::{prepend_ctes, CteNode};
use super::relationship_cte::{CteTarget, RelationshipCtes};
use super::walker::{walk_query, RewriteHooks};
use super::Rule;
use crate::analyzer::{Analysis, StatementAnalyzer, TableKind};
use crate::error::{Error, Result};
use crate::mdl::{Catalog, SessionContext};
use crate::sql::parse::{parse_join, parse_query, quote_ident, quoted, SqlDialect};

pub struct AccioRule {
    dialect: SqlDialect,
    cte_prefix: String,
}

impl AccioRule {
    pub fn new(dialect: SqlDialect, cte_prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            cte_prefix: cte_prefix.into(),
        }
    }

    fn model_ctes(
        &self,
        catalog: &Catalog,
        analysis: &Analysis,
        defined: &HashSet<String>,
    ) -> Result<Vec<CteNode>> {
        let mut pending: IndexSet<String> = analysis
            .models()
            .filter(|m| !defined.contains(*m))
            .map(str::to_string)
            .collect();
        let mut nodes = Vec::new();
        let mut i = 0;
        while i < pending.len() {
            let name = pending[i].clone();
            i += 1;
            let model = catalog
                .model(&name)
                .ok_or_else(|| Error::not_found(format!("model {} not found", name)))?;
            let body = model_cte_body(catalog, self.dialect, model)?;
            let node = cte_node(self.dialect, &name, &body)?;
            for table in &node.references {
                if *table != name && !defined.contains(table) && catalog.model(table).is_some() {
                    pending.insert(table.clone());
                }
            }
            trace!(model = %name, "model CTE");
            nodes.push(node);
        }
        Ok(nodes)
    }
}

fn cte_node(dialect: SqlDialect, name: &str, body: &str) -> Result<CteNode> {
    let query = parse_query(dialect, body)?;
    CteNode::new(name, format!("{} AS ({})", quote_ident(name), body), &query)
}

impl Rule for AccioRule {
    fn name(&self) -> &'static str {
        "accio"
    }

    fn apply(
        &self,
        statement: Statement,
        session: &SessionContext,
        catalog: &Catalog,
    ) -> Result<Statement> {
        let mut query = match statement {
            Statement::Query(query) => *query,
            other => return Ok(other),
        };

        let analysis = StatementAnalyzer::new(catalog, session).analyze_query(&query)?;
        let defined: HashSet<String> = query
            .with
            .iter()
            .flat_map(|w| w.cte_tables.iter())
            .map(|cte| cte.alias.name.value.clone())
            .collect();

        let mut relationship_ctes = RelationshipCtes::new(catalog, self.dialect, &self.cte_prefix);
        let mut targets = Vec::with_capacity(analysis.selects().len());
        for select in analysis.selects() {
            let mut by_key: IndexMap<String, CteTarget> = IndexMap::new();
            for call in &select.array_calls {
                if !by_key.contains_key(&call.key) {
                    by_key.insert(call.key.clone(), relationship_ctes.array_call(call)?);
                }
            }
            for path in select.paths.iter().filter(|p| p.needs_rewrite()) {
                if !by_key.contains_key(&path.key) {
                    by_key.insert(path.key.clone(), relationship_ctes.path(path)?);
                }
            }
            assign_join_aliases(&mut by_key);
            targets.push(by_key);
        }

        let model_nodes = self.model_ctes(catalog, &analysis, &defined)?;
        let relationship_nodes = relationship_ctes
            .into_ctes()
            .into_iter()
            .map(|(name, body)| cte_node(self.dialect, &name, &body))
            .collect::<Result<Vec<_>>>()?;
        if model_nodes.is_empty() && relationship_nodes.is_empty() {
            return Ok(Statement::Query(Box::new(query)));
        }

        let mut expander = Expander {
            dialect: self.dialect,
            analysis: &analysis,
            targets: &targets,
        };
        walk_query(&mut query, &mut expander)?;

        let nodes = model_nodes.into_iter().chain(relationship_nodes).collect();
        let query = prepend_ctes(self.dialect, query, nodes)?;
        Ok(Statement::Query(Box::new(query)))
    }
}

/// Walk hooks that point model references at model CTEs and swap relationship
/// expressions for synthesized CTE columns.
struct Expander<'r> {
    dialect: SqlDialect,
    analysis: &'r Analysis,
    targets: &'r [IndexMap<String, CteTarget>],
}

impl RewriteHooks for Expander<'_> {
    fn table_factor(&mut self, ordinal: usize, factor: &mut TableFactor) -> Result<()> {
        let Some((TableKind::Model, model)) = self.analysis.table_binding(ordinal) else {
            return Ok(());
        };
        if let TableFactor::Table { name, .. } = factor {
            *name = ObjectName(vec![quoted(model)]);
        }
        Ok(())
    }

    fn expression(&mut self, select: usize, expr: &mut Expr) -> Result<bool> {
        let Some(targets) = self.targets.get(select).filter(|t| !t.is_empty()) else {
            return Ok(false);
        };
        match targets.get(&expr.to_string()) {
            Some(target) => {
                *expr = target.replacement(self.dialect)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn select(&mut self, ordinal: usize, select: &mut Select) -> Result<()> {
        let Some(targets) = self.targets.get(ordinal) else {
            return Ok(());
        };
        let mut joins: IndexMap<&str, &CteTarget> = IndexMap::new();
        for target in targets.values() {
            joins.entry(target.alias.as_str()).or_insert(target);
        }

        for target in joins.values() {
            let join = parse_join(self.dialect, &target.join_sql())?;
            let from = select
                .from
                .iter_mut()
                .find(|from| exposes(from, &target.qualifier))
                .ok_or_else(|| {
                    Error::not_found(format!(
                        "relation {} not found for joining {}",
                        target.qualifier, target.cte
                    ))
                })?;
            from.joins.push(join);
        }
        Ok(())
    }
}

/// Give every (CTE, relation) pair of one SELECT its own join alias.
///
/// The first relation reading a CTE joins it under its own name; further
/// relations get `<cte>_1`, `<cte>_2`, ...
fn assign_join_aliases(targets: &mut IndexMap<String, CteTarget>) {
    let mut aliases: HashMap<(String, String), String> = HashMap::new();
    let mut uses: HashMap<String, usize> = HashMap::new();
    for target in targets.values_mut() {
        let key = (target.cte.clone(), target.qualifier.clone());
        let alias = aliases.entry(key).or_insert_with(|| {
            let n = uses.entry(target.cte.clone()).or_insert(0);
            let alias = match *n {
                0 => target.cte.clone(),
                n => format!("{}_{}", target.cte, n),
            };
            *n += 1;
            alias
        });
        target.alias = alias.clone();
    }
}

/// Whether `from` has a relation answering to `qualifier`.
fn exposes(from: &TableWithJoins, qualifier: &str) -> bool {
    std::iter::once(&from.relation)
        .chain(from.joins.iter().map(|j| &j.relation))
        .any(|factor| match factor {
            TableFactor::Table { name, alias, .. } => match alias {
                Some(alias) => alias.name.to_string() == qualifier,
                None => name.to_string() == qualifier,
            },
            TableFactor::Derived {
                alias: Some(alias), ..
            }
            | TableFactor::NestedJoin {
                alias: Some(alias), ..
            } => alias.name.to_string() == qualifier,
            _ => false,
        })
}
