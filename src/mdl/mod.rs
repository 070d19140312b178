//! Metadata catalog (MDL).
//!
//! A [`Manifest`] is the plain-data description of models, relationships,
//! metrics, cumulative metrics and views. [`Catalog`] indexes a manifest for
//! name lookups and is immutable after construction, so one catalog can be
//! shared by reference across concurrent rewrite requests.

mod catalog;
pub mod macros;
pub mod types;

pub use catalog::{Catalog, CatalogObject, CatalogSchemaTableName, SessionContext};
pub use macros::{Macro, Parameter, ParameterType};
pub use types::{
    is_temporal_type, Column, CumulativeMetric, DateSpine, JoinType, Measure, Metric, Model,
    Ordering, Relationship, SortKey, TimeGrain, TimeUnit, View, Window,
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Plain-data catalog definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub catalog: String,
    pub schema: String,
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub cumulative_metrics: Vec<CumulativeMetric>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub macros: Vec<Macro>,
    #[serde(default)]
    pub date_spine: DateSpine,
}

impl Manifest {
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            ..Default::default()
        }
    }

    /// Decode a JSON manifest. Macro definitions are validated while decoding.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_cumulative_metric(mut self, metric: CumulativeMetric) -> Self {
        self.cumulative_metrics.push(metric);
        self
    }

    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    pub fn with_macro(mut self, m: Macro) -> Self {
        self.macros.push(m);
        self
    }

    pub fn with_date_spine(mut self, date_spine: DateSpine) -> Self {
        self.date_spine = date_spine;
        self
    }
}
