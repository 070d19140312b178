//! Result of analyzing one statement.

use indexmap::{IndexMap, IndexSet};
use sqlparser::ast::{Expr, Function};

use crate::mdl::{CatalogSchemaTableName, Relationship, TimeGrain, TimeUnit};

/// A `roll_up(metric, grain, unit)` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRollupInfo {
    pub metric: String,
    pub time_grain: TimeGrain,
    pub unit: TimeUnit,
}

/// What a catalog-resident table reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Model,
    Metric,
    CumulativeMetric,
    View,
    /// A `roll_up(..)` function relation; the bound name is its signature.
    MetricRollup,
}

/// One relationship hop inside a query-level path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// Relationship-valued column name.
    pub column: String,
    /// Relationship oriented from the current model.
    pub relationship: Relationship,
    /// Subscript applied to a to-many hop, as SQL text.
    pub index: Option<String>,
}

impl PathStep {
    pub fn is_to_many(&self) -> bool {
        !self.relationship.join_type.is_to_one()
    }

    /// The hop yields an array, not a row.
    pub fn yields_array(&self) -> bool {
        self.is_to_many() && self.index.is_none()
    }
}

/// A relationship path used in a query expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUsage {
    /// SQL text of the expression node, used as the replacement key.
    pub key: String,
    /// SQL qualifier of the originating relation.
    pub qualifier: String,
    /// Model the path starts from.
    pub base_model: String,
    pub steps: Vec<PathStep>,
    /// Parts read after the last hop, as SQL text.
    pub terminal: Vec<String>,
}

impl PathUsage {
    /// Signature of the first `n` hops, e.g. `People.books[1].author`.
    pub fn signature(&self, n: usize) -> String {
        let mut out = self.base_model.clone();
        for step in &self.steps[..n] {
            out.push('.');
            out.push_str(&step.column);
            if let Some(index) = &step.index {
                out.push('[');
                out.push_str(index);
                out.push(']');
            }
        }
        out
    }

    pub fn last_step(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Paths ending in an unindexed to-many hop produce an array.
    pub fn yields_array(&self) -> bool {
        self.terminal.is_empty() && self.last_step().is_some_and(PathStep::yields_array)
    }

    /// Whether any hop picks one element of a to-many relationship.
    pub fn is_indexed(&self) -> bool {
        self.steps.iter().any(|s| s.index.is_some())
    }

    /// Whether the rewriter replaces this path.
    pub fn needs_rewrite(&self) -> bool {
        !self.terminal.is_empty() || self.yields_array() || self.is_indexed()
    }
}

/// Array function applied to a relationship array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayFunction {
    Transform,
    Filter,
    ArraySort,
    Slice,
    /// `array_count` and friends, with the SQL aggregate they map to.
    Aggregate(&'static str),
}

impl ArrayFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "transform" => ArrayFunction::Transform,
            "filter" => ArrayFunction::Filter,
            "array_sort" => ArrayFunction::ArraySort,
            "slice" => ArrayFunction::Slice,
            "array_count" => ArrayFunction::Aggregate("count"),
            "array_sum" => ArrayFunction::Aggregate("sum"),
            "array_avg" => ArrayFunction::Aggregate("avg"),
            "array_min" => ArrayFunction::Aggregate("min"),
            "array_max" => ArrayFunction::Aggregate("max"),
            "array_bool_or" => ArrayFunction::Aggregate("bool_or"),
            "array_every" => ArrayFunction::Aggregate("every"),
            _ => return None,
        };
        Some(function)
    }

    /// Whether the result is still an array of target-model keys.
    pub fn keeps_elements(&self) -> bool {
        matches!(
            self,
            ArrayFunction::Filter | ArrayFunction::ArraySort | ArrayFunction::Slice
        )
    }

    pub fn yields_array(&self) -> bool {
        !matches!(self, ArrayFunction::Aggregate(_))
    }
}

/// Input array of an [`ArrayCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayInput {
    Relationship(PathUsage),
    Call(Box<ArrayCall>),
}

/// An array function call over a to-many relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayCall {
    pub key: String,
    pub function: ArrayFunction,
    pub input: ArrayInput,
    pub call: Function,
}

impl ArrayCall {
    /// The path at the bottom of a chain of calls.
    pub fn root_path(&self) -> &PathUsage {
        match &self.input {
            ArrayInput::Relationship(path) => path,
            ArrayInput::Call(inner) => inner.root_path(),
        }
    }

    /// Model of the array elements, if the array still holds target-model keys.
    pub fn element_model(&self) -> Option<String> {
        if !self.function.keeps_elements() {
            return None;
        }
        self.input_element_model()
    }

    pub fn input_element_model(&self) -> Option<String> {
        match &self.input {
            ArrayInput::Relationship(path) => path
                .last_step()
                .map(|s| s.relationship.target().to_string()),
            ArrayInput::Call(inner) => inner.element_model(),
        }
    }
}

/// Relationship usage recorded for one SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectAnalysis {
    pub paths: Vec<PathUsage>,
    pub array_calls: Vec<ArrayCall>,
    /// GROUP BY expressions with ordinals replaced by the select item they point at.
    pub group_by: Vec<Expr>,
    /// Bare column references and the qualifier of the relation they resolve to.
    pub columns: IndexMap<String, String>,
}

/// Analysis of one statement against the catalog.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub(crate) tables: IndexSet<CatalogSchemaTableName>,
    pub(crate) table_bindings: IndexMap<usize, (TableKind, String)>,
    pub(crate) model_refs: IndexSet<String>,
    pub(crate) models: IndexSet<String>,
    pub(crate) relationships: IndexSet<String>,
    pub(crate) metrics: IndexSet<String>,
    pub(crate) cumulative_metrics: IndexSet<String>,
    pub(crate) views: IndexSet<String>,
    pub(crate) metric_rollups: IndexMap<String, MetricRollupInfo>,
    pub(crate) selects: Vec<SelectAnalysis>,
}

impl Analysis {
    /// Every table reference that is not a CTE, catalog-qualified.
    pub fn tables(&self) -> impl Iterator<Item = &CatalogSchemaTableName> {
        self.tables.iter()
    }

    /// Catalog object bound to the n-th table factor of the walk.
    pub fn table_binding(&self, ordinal: usize) -> Option<(TableKind, &str)> {
        self.table_bindings
            .get(&ordinal)
            .map(|(kind, name)| (*kind, name.as_str()))
    }

    /// Models named directly in FROM.
    pub fn model_refs(&self) -> impl Iterator<Item = &str> {
        self.model_refs.iter().map(String::as_str)
    }

    /// Models used by the statement, directly or through relationships and metrics.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(String::as_str)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &str> {
        self.relationships.iter().map(String::as_str)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(String::as_str)
    }

    pub fn cumulative_metrics(&self) -> impl Iterator<Item = &str> {
        self.cumulative_metrics.iter().map(String::as_str)
    }

    pub fn views(&self) -> impl Iterator<Item = &str> {
        self.views.iter().map(String::as_str)
    }

    /// Rollup bindings keyed by the SQL text of the function relation.
    pub fn metric_rollups(&self) -> impl Iterator<Item = (&str, &MetricRollupInfo)> {
        self.metric_rollups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn metric_rollup(&self, signature: &str) -> Option<&MetricRollupInfo> {
        self.metric_rollups.get(signature)
    }

    /// Per-SELECT results in walk order.
    pub fn selects(&self) -> &[SelectAnalysis] {
        &self.selects
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.metric_rollups.is_empty()
    }
}
