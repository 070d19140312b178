//! Data lineage: which fields of which entities a calculated field reads.
//!
//! Results keep first-discovery order. For every dotted path the terminal field
//! comes first, then the join keys of each relationship walked, in the order
//! they appear in the join condition.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::analyzer::RelationshipResolver;
use crate::error::{Error, Result};
use crate::mdl::{Catalog, CatalogObject};
use crate::sql::parse::{parse_expr, SqlDialect};
use crate::sql::walk::for_each_path;

/// Required fields per entity, in discovery order.
pub type RequiredFields = IndexMap<String, IndexSet<String>>;

pub struct DataLineage<'a> {
    catalog: &'a Catalog,
    dialect: SqlDialect,
}

impl<'a> DataLineage<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            dialect: SqlDialect::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Fields required to compute `entity.field`.
    pub fn required_fields_of(&self, entity: &str, field: &str) -> Result<RequiredFields> {
        self.required_fields([(entity, field)])
    }

    /// Union of the fields required by every `(entity, field)` target.
    ///
    /// Each target entity is present in the result, with an empty set when nothing
    /// else of it is needed.
    pub fn required_fields<'t>(
        &self,
        targets: impl IntoIterator<Item = (&'t str, &'t str)>,
    ) -> Result<RequiredFields> {
        let mut walk = Walk {
            catalog: self.catalog,
            dialect: self.dialect,
            path: Vec::new(),
            done: HashSet::new(),
            fields: IndexMap::new(),
            reads: IndexMap::new(),
        };
        for (entity, field) in targets {
            debug!(entity, field, "resolving lineage target");
            walk.require(entity, field)?;
            walk.fields.entry(entity.to_string()).or_default();
        }
        check_entity_cycles(&walk.reads)?;
        Ok(walk.fields)
    }
}

/// State of one lineage request.
struct Walk<'a> {
    catalog: &'a Catalog,
    dialect: SqlDialect,
    /// `(entity, field)` pairs on the current resolution path.
    path: Vec<(String, String)>,
    done: HashSet<(String, String)>,
    fields: RequiredFields,
    /// Other entities each resolved field reads, in resolution order.
    reads: IndexMap<(String, String), IndexSet<String>>,
}

impl Walk<'_> {
    fn record(&mut self, entity: &str, field: &str) {
        self.fields
            .entry(entity.to_string())
            .or_default()
            .insert(field.to_string());
    }

    fn require(&mut self, entity: &str, field: &str) -> Result<()> {
        let key = (entity.to_string(), field.to_string());
        if self.path.contains(&key) {
            return Err(Error::cycle(entity, field));
        }
        if self.done.contains(&key) {
            return Ok(());
        }
        self.path.push(key.clone());
        let reads = self.resolve(entity, field)?;
        self.path.pop();

        let reads: IndexSet<String> = reads.into_iter().filter(|e| e != entity).collect();
        if !reads.is_empty() {
            self.reads.insert(key.clone(), reads);
        }
        self.done.insert(key);
        Ok(())
    }

    /// Record what `entity.field` reads and return the entities it reads from.
    fn resolve(&mut self, entity: &str, field: &str) -> Result<IndexSet<String>> {
        let catalog = self.catalog;
        let missing = || Error::not_found(format!("column {}.{} not found", entity, field));
        match catalog.object(entity) {
            Some(CatalogObject::Model(model)) => {
                let column = model.column(field).ok_or_else(missing)?;
                if column.is_relationship() {
                    return Ok(IndexSet::new());
                }
                let context = model.base_object.as_deref().unwrap_or(&model.name);
                match (column.expression(), &model.base_object) {
                    (Some(expression), _) => self.expression(context, expression),
                    (None, Some(base)) => self.read_base(base, field),
                    (None, None) => Ok(IndexSet::new()),
                }
            }
            Some(CatalogObject::Metric(metric)) => {
                let column = metric.column(field).ok_or_else(missing)?;
                match column.expression() {
                    Some(expression) => self.expression(&metric.base_object, expression),
                    None => self.read_base(&metric.base_object, field),
                }
            }
            Some(CatalogObject::CumulativeMetric(cumulative)) => {
                let reference = if field == cumulative.measure.name {
                    &cumulative.measure.ref_column
                } else if field == cumulative.window.name {
                    &cumulative.window.ref_column
                } else {
                    return Err(missing());
                };
                self.read_base(&cumulative.base_object, reference)
            }
            Some(CatalogObject::View(view)) => Err(Error::unsupported(format!(
                "lineage of view {} is not supported",
                view.name
            ))),
            None => Err(Error::not_found(format!("entity {} not found", entity))),
        }
    }

    fn read_base(&mut self, base: &str, field: &str) -> Result<IndexSet<String>> {
        self.record(base, field);
        self.require(base, field)?;
        Ok(IndexSet::from([base.to_string()]))
    }

    /// Resolve every path of `expression` against `context`.
    fn expression(&mut self, context: &str, expression: &str) -> Result<IndexSet<String>> {
        let expr = parse_expr(self.dialect, expression)?;
        let infos = RelationshipResolver::new(self.catalog).analyze(&expr, context)?;

        let mut reads = IndexSet::from([context.to_string()]);
        for info in infos {
            if info.relationships.is_empty() {
                let Some(column) = info.parts.first() else {
                    continue;
                };
                if info.parts.len() == 1 && self.catalog.column_type(context, column).is_some() {
                    self.record(context, column);
                    self.require(context, column)?;
                }
                continue;
            }

            if let (Some(target), Some(column)) = (info.target_model(), info.terminal_column()) {
                self.record(target, column);
                self.require(target, column)?;
            }
            for relationship in &info.relationships {
                reads.insert(relationship.target().to_string());
                let condition = parse_expr(self.dialect, &relationship.condition)?;
                let mut keys = Vec::new();
                for_each_path(&condition, &mut |_, parts| {
                    if let [model, column] = parts.as_slice() {
                        if let (Some(model), Some(column)) = (model.name(), column.name()) {
                            keys.push((model.to_string(), column.to_string()));
                        }
                    }
                });
                for (model, column) in keys {
                    self.record(&model, &column);
                    self.require(&model, &column)?;
                }
            }
        }
        Ok(reads)
    }
}

/// Entities whose required fields read each other cannot be materialized in any
/// order. Names the first resolved field that takes part in such a loop.
fn check_entity_cycles(reads: &IndexMap<(String, String), IndexSet<String>>) -> Result<()> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for ((entity, _), targets) in reads {
        let from = *nodes
            .entry(entity.as_str())
            .or_insert_with(|| graph.add_node(entity.as_str()));
        for target in targets {
            let to = *nodes
                .entry(target.as_str())
                .or_insert_with(|| graph.add_node(target.as_str()));
            graph.update_edge(from, to, ());
        }
    }

    for ((entity, field), targets) in reads {
        let from = nodes[entity.as_str()];
        if targets
            .iter()
            .any(|t| has_path_connecting(&graph, nodes[t.as_str()], from, None))
        {
            return Err(Error::cycle(entity, field));
        }
    }
    Ok(())
}
