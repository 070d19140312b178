//! Dependency ordering of the CTEs emitted ahead of a rewritten query.

use std::collections::BTreeSet;

use indexmap::IndexSet;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use sqlparser::ast::{Query, TableFactor};

use super::walker::{walk_query, RewriteHooks};
use crate::error::{Error, Result};
use crate::sql::parse::{parse_query, SqlDialect};

/// One CTE definition as SQL text plus the table names its body reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CteNode {
    pub name: String,
    /// `"name" AS (body)`.
    pub sql: String,
    pub references: IndexSet<String>,
}

impl CteNode {
    pub fn new(name: impl Into<String>, sql: impl Into<String>, body: &Query) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            sql: sql.into(),
            references: referenced_tables(body)?,
        })
    }
}

/// Last name part of every table factor in `query`, subqueries included.
pub(crate) fn referenced_tables(query: &Query) -> Result<IndexSet<String>> {
    struct Collector(IndexSet<String>);

    impl RewriteHooks for Collector {
        fn table_factor(&mut self, _ordinal: usize, factor: &mut TableFactor) -> Result<()> {
            if let TableFactor::Table { name, args: None, .. } = factor {
                if let Some(last) = name.0.last() {
                    self.0.insert(last.value.clone());
                }
            }
            Ok(())
        }
    }

    let mut collector = Collector(IndexSet::new());
    let mut query = query.clone();
    walk_query(&mut query, &mut collector)?;
    Ok(collector.0)
}

/// Order `nodes` so every CTE follows the CTEs it reads.
///
/// Among the CTEs that are ready, the one given first wins, so the input order
/// is kept wherever dependencies allow.
pub(crate) fn order_ctes(nodes: Vec<CteNode>) -> Result<Vec<CteNode>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
    for (i, node) in nodes.iter().enumerate() {
        for (j, dep) in nodes.iter().enumerate() {
            if i != j && node.references.contains(&dep.name) {
                graph.add_edge(indices[j], indices[i], ());
            }
        }
    }

    let mut in_degree: Vec<usize> = indices
        .iter()
        .map(|&idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for next in graph.neighbors_directed(indices[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = (0..nodes.len())
            .filter(|i| !order.contains(i))
            .map(|i| nodes[i].name.as_str())
            .collect();
        return Err(Error::Cycle(format!(
            "found cycle between CTEs: {}",
            stuck.join(", ")
        )));
    }

    let mut slots: Vec<Option<CteNode>> = nodes.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Put `generated` CTEs ahead of `query`, together with the query's own WITH list.
///
/// A CTE the query already defines wins over a generated one of the same name.
pub(crate) fn prepend_ctes(
    dialect: SqlDialect,
    mut query: Query,
    generated: Vec<CteNode>,
) -> Result<Query> {
    let mut nodes = generated;
    let mut recursive = false;
    if let Some(with) = query.with.take() {
        recursive = with.recursive;
        for cte in with.cte_tables {
            let name = cte.alias.name.value.clone();
            nodes.retain(|n| n.name != name);
            nodes.push(CteNode::new(name, cte.to_string(), &cte.query)?);
        }
    }
    if nodes.is_empty() {
        return Ok(query);
    }

    let ordered = order_ctes(nodes)?;
    let sql = format!(
        "WITH {}{} {}",
        if recursive { "RECURSIVE " } else { "" },
        ordered
            .iter()
            .map(|n| n.sql.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        query
    );
    parse_query(dialect, &sql)
}
