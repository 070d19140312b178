//! Expands metrics, cumulative metrics, views and `roll_up` relations into CTEs.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use sqlparser::ast::{ObjectName, Query, Statement, TableFactor};
use tracing::trace;

use super::metric_sql::{cumulative_metric_cte_body, metric_cte_body};
use super::order::{prepend_ctes, CteNode};
use super::registry::CteRegistry;
use super::walker::{walk_query, RewriteHooks};
use super::Rule;
use crate::analyzer::{MetricRollupInfo, StatementAnalyzer, TableKind};
use crate::error::{Error, Result};
use crate::mdl::{Catalog, CatalogObject, SessionContext};
use crate::sql::parse::{parse_query, quote_ident, quoted, SqlDialect};

pub struct MetricViewRule {
    dialect: SqlDialect,
    cte_prefix: String,
}

impl MetricViewRule {
    pub fn new(dialect: SqlDialect, cte_prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            cte_prefix: cte_prefix.into(),
        }
    }
}

impl Rule for MetricViewRule {
    fn name(&self) -> &'static str {
        "metric_view"
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

        let mut expansion = Expansion {
            catalog,
            session,
            dialect: self.dialect,
            registry: CteRegistry::new(self.cte_prefix.as_str()),
            defined: query
                .with
                .iter()
                .flat_map(|w| w.cte_tables.iter())
                .map(|cte| cte.alias.name.value.clone())
                .collect(),
            seen: HashSet::new(),
            pending: VecDeque::new(),
            ctes: IndexMap::new(),
        };
        let renamed = expansion.rewrite_query(&mut query)?;
        expansion.drain()?;
        if !renamed && expansion.ctes.is_empty() {
            return Ok(Statement::Query(Box::new(query)));
        }

        let query = prepend_ctes(self.dialect, query, expansion.ctes.into_values().collect())?;
        Ok(Statement::Query(Box::new(query)))
    }
}

enum Pending {
    Object(String),
    Rollup(String, MetricRollupInfo),
}

/// State of one rule invocation.
struct Expansion<'a> {
    catalog: &'a Catalog,
    session: &'a SessionContext,
    dialect: SqlDialect,
    registry: CteRegistry,
    /// CTE names the statement already defines at the top level.
    defined: HashSet<String>,
    seen: HashSet<String>,
    pending: VecDeque<Pending>,
    ctes: IndexMap<String, CteNode>,
}

impl<'a> Expansion<'a> {
    /// Point metric, cumulative metric, view and rollup relations of `query` at their
    /// CTEs and queue those CTEs. Returns whether any relation was renamed.
    fn rewrite_query(&mut self, query: &mut Query) -> Result<bool> {
        let analysis = StatementAnalyzer::new(self.catalog, self.session).analyze_query(query)?;

        let mut renames = HashMap::new();
        for (ordinal, (kind, name)) in &analysis.table_bindings {
            match kind {
                TableKind::Model => self.reach(name),
                TableKind::Metric | TableKind::CumulativeMetric | TableKind::View => {
                    renames.insert(*ordinal, name.clone());
                    self.reach(name);
                }
                TableKind::MetricRollup => {
                    let info = analysis.metric_rollup(name).ok_or_else(|| {
                        Error::not_found(format!("metric rollup {} not found", name))
                    })?;
                    let cte = self.registry.name_for(name);
                    renames.insert(*ordinal, cte.clone());
                    if self.seen.insert(cte.clone()) {
                        self.pending.push_back(Pending::Rollup(cte, info.clone()));
                    }
                }
            }
        }
        for model in analysis.models() {
            self.reach(model);
        }

        if renames.is_empty() {
            return Ok(false);
        }
        walk_query(query, &mut Renamer { renames: &renames })?;
        Ok(true)
    }

    /// Queue the CTE of `name` if it is a metric, cumulative metric or view, following
    /// model base objects and relationships.
    fn reach(&mut self, name: &str) {
        if self.defined.contains(name) || !self.seen.insert(name.to_string()) {
            return;
        }
        let catalog = self.catalog;
        match catalog.object(name) {
            Some(CatalogObject::Model(model)) => {
                if let Some(base) = &model.base_object {
                    self.reach(base);
                }
                for relationship in model
                    .columns
                    .iter()
                    .filter_map(|c| c.relationship.as_deref())
                    .filter_map(|r| catalog.relationship(r))
                {
                    for target in &relationship.models {
                        self.reach(target);
                    }
                }
            }
            Some(_) => self.pending.push_back(Pending::Object(name.to_string())),
            None => {}
        }
    }

    fn drain(&mut self) -> Result<()> {
        let catalog = self.catalog;
        while let Some(item) = self.pending.pop_front() {
            let (name, body) = match item {
                Pending::Rollup(cte, info) => {
                    let metric = catalog
                        .metric(&info.metric)
                        .ok_or_else(|| Error::not_found(format!("Metric not found: {}", info.metric)))?;
                    let body = metric_cte_body(catalog, self.dialect, metric, Some(&info))?;
                    (cte, body)
                }
                Pending::Object(name) => {
                    let body = match catalog.object(&name) {
                        Some(CatalogObject::Metric(metric)) => {
                            metric_cte_body(catalog, self.dialect, metric, None)?
                        }
                        Some(CatalogObject::CumulativeMetric(cumulative)) => {
                            cumulative_metric_cte_body(catalog, cumulative)?
                        }
                        Some(CatalogObject::View(view)) => {
                            let mut body = parse_query(self.dialect, &view.statement)?;
                            self.rewrite_query(&mut body)?;
                            body.to_string()
                        }
                        _ => continue,
                    };
                    (name, body)
                }
            };
            trace!(cte = %name, "metric view CTE");
            self.define(name, body)?;
        }
        Ok(())
    }

    fn define(&mut self, name: String, body: String) -> Result<()> {
        let query = parse_query(self.dialect, &body)?;
        let node = CteNode::new(
            name.clone(),
            format!("{} AS ({})", quote_ident(&name), body),
            &query,
        )?;
        for table in &node.references {
            self.reach(table);
        }
        self.ctes.insert(name, node);
        Ok(())
    }
}

/// Replaces bound table factors with a reference to their CTE, keeping aliases.
struct Renamer<'r> {
    renames: &'r HashMap<usize, String>,
}

impl RewriteHooks for Renamer<'_> {
    fn table_factor(&mut self, ordinal: usize, factor: &mut TableFactor) -> Result<()> {
        let Some(target) = self.renames.get(&ordinal) else {
            return Ok(());
        };
        if let TableFactor::Table { name, args, .. } = factor {
            *name = ObjectName(vec![quoted(target)]);
            *args = None;
        }
        Ok(())
    }
}
