//! Indexed, read-only view over a [`Manifest`].

use std::collections::HashMap;
use std::fmt;

use super::types::{Column, CumulativeMetric, DateSpine, Metric, Model, Relationship, View};
use super::Manifest;
use crate::error::{Error, Result};

/// Fully qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogSchemaTableName {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl CatalogSchemaTableName {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for CatalogSchemaTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Default catalog and schema for unqualified table references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub catalog: String,
    pub schema: String,
}

impl SessionContext {
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
        }
    }

    /// Qualify a one- to three-part name. Longer names are not table references.
    pub fn qualify(&self, parts: &[String]) -> Option<CatalogSchemaTableName> {
        match parts {
            [table] => Some(CatalogSchemaTableName::new(&self.catalog, &self.schema, table)),
            [schema, table] => Some(CatalogSchemaTableName::new(&self.catalog, schema, table)),
            [catalog, schema, table] => Some(CatalogSchemaTableName::new(catalog, schema, table)),
            _ => None,
        }
    }
}

/// Any named object a table reference can resolve to.
#[derive(Debug, Clone, Copy)]
pub enum CatalogObject<'a> {
    Model(&'a Model),
    Metric(&'a Metric),
    CumulativeMetric(&'a CumulativeMetric),
    View(&'a View),
}

impl<'a> CatalogObject<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            CatalogObject::Model(m) => &m.name,
            CatalogObject::Metric(m) => &m.name,
            CatalogObject::CumulativeMetric(m) => &m.name,
            CatalogObject::View(v) => &v.name,
        }
    }
}

/// The metadata catalog.
///
/// All lookups are by exact name and return `None` on a miss; callers decide
/// whether absence is an error.
#[derive(Debug, Clone)]
pub struct Catalog {
    manifest: Manifest,
    models: HashMap<String, usize>,
    relationships: HashMap<String, usize>,
    metrics: HashMap<String, usize>,
    cumulative_metrics: HashMap<String, usize>,
    views: HashMap<String, usize>,
}

fn index_by_name<T>(items: &[T], name: impl Fn(&T) -> &str) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (name(item).to_string(), i))
        .collect()
}

impl Catalog {
    /// Index a manifest. Fails if a relationship does not name exactly two models.
    pub fn new(manifest: Manifest) -> Result<Self> {
        if let Some(bad) = manifest.relationships.iter().find(|r| r.models.len() != 2) {
            return Err(Error::malformed(format!(
                "relationship {} should have exactly 2 models",
                bad.name
            )));
        }

        Ok(Self {
            models: index_by_name(&manifest.models, |m| &m.name),
            relationships: index_by_name(&manifest.relationships, |r| &r.name),
            metrics: index_by_name(&manifest.metrics, |m| &m.name),
            cumulative_metrics: index_by_name(&manifest.cumulative_metrics, |m| &m.name),
            views: index_by_name(&manifest.views, |v| &v.name),
            manifest,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(Manifest::from_json(json)?)
    }

    pub fn catalog(&self) -> &str {
        &self.manifest.catalog
    }

    pub fn schema(&self) -> &str {
        &self.manifest.schema
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn date_spine(&self) -> &DateSpine {
        &self.manifest.date_spine
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name).map(|&i| &self.manifest.models[i])
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships
            .get(name)
            .map(|&i| &self.manifest.relationships[i])
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name).map(|&i| &self.manifest.metrics[i])
    }

    pub fn cumulative_metric(&self, name: &str) -> Option<&CumulativeMetric> {
        self.cumulative_metrics
            .get(name)
            .map(|&i| &self.manifest.cumulative_metrics[i])
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name).map(|&i| &self.manifest.views[i])
    }

    /// The table name if the reference points into this catalog's catalog and schema.
    fn local_name<'n>(&self, name: &'n CatalogSchemaTableName) -> Option<&'n str> {
        (name.catalog == self.manifest.catalog && name.schema == self.manifest.schema)
            .then_some(name.table.as_str())
    }

    pub fn model_by_table(&self, name: &CatalogSchemaTableName) -> Option<&Model> {
        self.local_name(name).and_then(|t| self.model(t))
    }

    pub fn metric_by_table(&self, name: &CatalogSchemaTableName) -> Option<&Metric> {
        self.local_name(name).and_then(|t| self.metric(t))
    }

    pub fn cumulative_metric_by_table(
        &self,
        name: &CatalogSchemaTableName,
    ) -> Option<&CumulativeMetric> {
        self.local_name(name).and_then(|t| self.cumulative_metric(t))
    }

    pub fn view_by_table(&self, name: &CatalogSchemaTableName) -> Option<&View> {
        self.local_name(name).and_then(|t| self.view(t))
    }

    /// Resolve a name to whichever object kind carries it.
    pub fn object(&self, name: &str) -> Option<CatalogObject<'_>> {
        self.model(name)
            .map(CatalogObject::Model)
            .or_else(|| self.metric(name).map(CatalogObject::Metric))
            .or_else(|| self.cumulative_metric(name).map(CatalogObject::CumulativeMetric))
            .or_else(|| self.view(name).map(CatalogObject::View))
    }

    pub fn list_models(&self) -> &[Model] {
        &self.manifest.models
    }

    pub fn list_relationships(&self) -> &[Relationship] {
        &self.manifest.relationships
    }

    pub fn list_metrics(&self) -> &[Metric] {
        &self.manifest.metrics
    }

    pub fn list_cumulative_metrics(&self) -> &[CumulativeMetric] {
        &self.manifest.cumulative_metrics
    }

    pub fn list_views(&self) -> &[View] {
        &self.manifest.views
    }

    /// Names of every cached model, metric and cumulative metric.
    pub fn list_cached(&self) -> Vec<&str> {
        let models = self.manifest.models.iter().filter(|m| m.cached).map(|m| m.name.as_str());
        let metrics = self.manifest.metrics.iter().filter(|m| m.cached).map(|m| m.name.as_str());
        let cumulative = self
            .manifest
            .cumulative_metrics
            .iter()
            .filter(|m| m.cached)
            .map(|m| m.name.as_str());
        models.chain(metrics).chain(cumulative).collect()
    }

    /// Column lookup searching model columns, then metric columns.
    pub fn column(&self, entity: &str, column: &str) -> Option<&Column> {
        self.model(entity)
            .and_then(|m| m.column(column))
            .or_else(|| self.metric(entity).and_then(|m| m.column(column)))
    }

    /// Relationship-valued column of a model.
    pub fn relationship_column(&self, model: &str, column: &str) -> Option<&Column> {
        self.model(model)
            .and_then(|m| m.column(column))
            .filter(|c| c.is_relationship())
    }

    /// Declared type of any entity's output column, cumulative metrics included.
    pub fn column_type(&self, entity: &str, column: &str) -> Option<String> {
        if let Some(c) = self.column(entity, column) {
            return Some(c.data_type.clone());
        }
        self.cumulative_metric(entity).and_then(|cm| {
            cm.columns()
                .into_iter()
                .find(|c| c.name == column)
                .map(|c| c.data_type)
        })
    }

    /// Output column names of a model, metric or cumulative metric.
    pub fn column_names(&self, entity: &str) -> Vec<String> {
        match self.object(entity) {
            Some(CatalogObject::Model(m)) => m.columns.iter().map(|c| c.name.clone()).collect(),
            Some(CatalogObject::Metric(m)) => m.columns().map(|c| c.name.clone()).collect(),
            Some(CatalogObject::CumulativeMetric(cm)) => {
                cm.columns().into_iter().map(|c| c.name).collect()
            }
            _ => Vec::new(),
        }
    }
}
