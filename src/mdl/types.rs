//! Catalog entity types.
//!
//! These are plain data, deserialized from a JSON manifest with camelCase keys.
//! Builder-style constructors exist for assembling catalogs in code and tests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// Columns and models
// =============================================================================

/// A column of a model or metric.
///
/// Exactly one of these holds: physical (no expression, no relationship),
/// calculated (expression set) or relationship-valued (relationship set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_calculated: bool,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            relationship: None,
            is_calculated: false,
            not_null: false,
            expression: None,
            description: None,
        }
    }

    /// Relationship-valued column; its type names the target model.
    pub fn relationship(
        name: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            relationship: Some(relationship.into()),
            ..Self::new(name, target)
        }
    }

    /// Calculated column evaluated from `expression`.
    pub fn calculated(
        name: impl Into<String>,
        data_type: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            is_calculated: true,
            expression: Some(expression.into()),
            ..Self::new(name, data_type)
        }
    }

    /// Attach an expression without flagging the column as calculated.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// The expression, if present and non-blank.
    pub fn expression(&self) -> Option<&str> {
        self.expression
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    pub fn is_relationship(&self) -> bool {
        self.relationship.is_some()
    }

    pub fn is_physical(&self) -> bool {
        self.relationship.is_none() && self.expression().is_none()
    }
}

/// A named virtual table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_object: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Model {
    /// Model backed by a SQL statement.
    pub fn new(name: impl Into<String>, ref_sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ref_sql: Some(ref_sql.into()),
            base_object: None,
            columns: Vec::new(),
            primary_key: None,
            cached: false,
            refresh_time: None,
            description: None,
        }
    }

    /// Model defined on top of another catalog object.
    pub fn on_base_object(name: impl Into<String>, base_object: impl Into<String>) -> Self {
        Self {
            ref_sql: None,
            base_object: Some(base_object.into()),
            ..Self::new(name, "")
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn with_cache(mut self, refresh_time: impl Into<String>) -> Self {
        self.cached = true;
        self.refresh_time = Some(refresh_time.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// =============================================================================
// Relationships
// =============================================================================

/// Cardinality of a relationship, read from the first model to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl JoinType {
    pub fn reverse(self) -> Self {
        match self {
            JoinType::OneToMany => JoinType::ManyToOne,
            JoinType::ManyToOne => JoinType::OneToMany,
            other => other,
        }
    }

    pub fn is_to_one(self) -> bool {
        matches!(self, JoinType::OneToOne | JoinType::ManyToOne)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinType::OneToOne => "ONE_TO_ONE",
            JoinType::OneToMany => "ONE_TO_MANY",
            JoinType::ManyToOne => "MANY_TO_ONE",
            JoinType::ManyToMany => "MANY_TO_MANY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ordering {
    #[default]
    Asc,
    Desc,
}

impl Ordering {
    pub fn as_sql(self) -> &'static str {
        match self {
            Ordering::Asc => "ASC",
            Ordering::Desc => "DESC",
        }
    }
}

/// Ordering applied to the array a to-many relationship produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub name: String,
    #[serde(default)]
    pub ordering: Ordering,
}

impl SortKey {
    pub fn new(name: impl Into<String>, ordering: Ordering) -> Self {
        Self {
            name: name.into(),
            ordering,
        }
    }
}

/// A typed join definition between exactly two models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub name: String,
    pub models: Vec<String>,
    pub join_type: JoinType,
    pub condition: String,
    #[serde(default)]
    pub sort_keys: Vec<SortKey>,
    #[serde(skip)]
    pub reversed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Relationship {
    pub fn new(
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        join_type: JoinType,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            models: vec![from.into(), to.into()],
            join_type,
            condition: condition.into(),
            sort_keys: Vec::new(),
            reversed: false,
            description: None,
        }
    }

    pub fn with_sort_key(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    /// Swap the model pair and invert the join type.
    pub fn reverse(&self) -> Self {
        Self {
            models: self.models.iter().rev().cloned().collect(),
            join_type: self.join_type.reverse(),
            reversed: !self.reversed,
            ..self.clone()
        }
    }

    /// Orient the relationship so that `target` is its second model.
    pub fn reverse_if_needed(&self, target: &str) -> Self {
        if self.target() == target {
            self.clone()
        } else {
            self.reverse()
        }
    }

    pub fn source(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or_default()
    }

    pub fn target(&self) -> &str {
        self.models.get(1).map(String::as_str).unwrap_or_default()
    }
}

// =============================================================================
// Metrics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    /// Lower-case unit name as accepted by `date_trunc`.
    pub fn as_sql(self) -> &'static str {
        match self {
            TimeUnit::Year => "year",
            TimeUnit::Quarter => "quarter",
            TimeUnit::Month => "month",
            TimeUnit::Week => "week",
            TimeUnit::Day => "day",
            TimeUnit::Hour => "hour",
            TimeUnit::Minute => "minute",
            TimeUnit::Second => "second",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YEAR" => Ok(TimeUnit::Year),
            "QUARTER" => Ok(TimeUnit::Quarter),
            "MONTH" => Ok(TimeUnit::Month),
            "WEEK" => Ok(TimeUnit::Week),
            "DAY" => Ok(TimeUnit::Day),
            "HOUR" => Ok(TimeUnit::Hour),
            "MINUTE" => Ok(TimeUnit::Minute),
            "SECOND" => Ok(TimeUnit::Second),
            _ => Err(Error::malformed(format!("unsupported time unit: {}", s))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_sql().to_ascii_uppercase())
    }
}

/// A time column of a metric that `roll_up` may truncate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeGrain {
    pub name: String,
    pub ref_column: String,
    #[serde(default)]
    pub date_parts: Vec<TimeUnit>,
}

impl TimeGrain {
    pub fn new(name: impl Into<String>, ref_column: impl Into<String>, date_parts: Vec<TimeUnit>) -> Self {
        Self {
            name: name.into(),
            ref_column: ref_column.into(),
            date_parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub base_object: String,
    #[serde(default)]
    pub dimension: Vec<Column>,
    #[serde(default)]
    pub measure: Vec<Column>,
    #[serde(default)]
    pub time_grain: Vec<TimeGrain>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, base_object: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_object: base_object.into(),
            dimension: Vec::new(),
            measure: Vec::new(),
            time_grain: Vec::new(),
            cached: false,
            refresh_time: None,
            description: None,
        }
    }

    pub fn with_dimension(mut self, column: Column) -> Self {
        self.dimension.push(column);
        self
    }

    pub fn with_measure(mut self, column: Column) -> Self {
        self.measure.push(column);
        self
    }

    pub fn with_time_grain(mut self, grain: TimeGrain) -> Self {
        self.time_grain.push(grain);
        self
    }

    /// Dimensions followed by measures.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.dimension.iter().chain(self.measure.iter())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns().find(|c| c.name == name)
    }

    pub fn time_grain(&self, name: &str) -> Option<&TimeGrain> {
        self.time_grain.iter().find(|g| g.name == name)
    }
}

/// The single aggregation of a cumulative metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub operator: String,
    pub ref_column: String,
}

impl Measure {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        operator: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            operator: operator.into(),
            ref_column: ref_column.into(),
        }
    }
}

/// Time axis of a cumulative metric, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub name: String,
    pub ref_column: String,
    pub time_unit: TimeUnit,
    pub start: String,
    pub end: String,
}

impl Window {
    pub fn new(
        name: impl Into<String>,
        ref_column: impl Into<String>,
        time_unit: TimeUnit,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ref_column: ref_column.into(),
            time_unit,
            start: start.into(),
            end: end.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeMetric {
    pub name: String,
    pub base_object: String,
    pub measure: Measure,
    pub window: Window,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CumulativeMetric {
    pub fn new(
        name: impl Into<String>,
        base_object: impl Into<String>,
        measure: Measure,
        window: Window,
    ) -> Self {
        Self {
            name: name.into(),
            base_object: base_object.into(),
            measure,
            window,
            cached: false,
            refresh_time: None,
            description: None,
        }
    }

    /// Output columns: the window column then the measure column.
    pub fn columns(&self) -> Vec<Column> {
        vec![
            Column::new(&self.window.name, "DATE"),
            Column::new(&self.measure.name, &self.measure.data_type),
        ]
    }
}

/// Calendar used to materialize cumulative metric periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateSpine {
    pub unit: TimeUnit,
    pub start: String,
    pub end: String,
}

impl Default for DateSpine {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Day,
            start: "1970-01-01".to_string(),
            end: "2077-12-31".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub name: String,
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl View {
    pub fn new(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statement: statement.into(),
            description: None,
        }
    }
}

/// Whether a type name denotes a date or timestamp.
pub fn is_temporal_type(data_type: &str) -> bool {
    let upper = data_type.trim().to_ascii_uppercase();
    upper == "DATE" || upper.starts_with("TIMESTAMP")
}
