//! OBML semantic model types: data objects, dimensions, measures, metrics, joins.
//!
//! Field shapes and aliases follow OBML's documented YAML spelling (camelCase
//! on the wire, snake_case in Rust) the way `serde(rename = ...)` maps every
//! other OBML field in this crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Abstract column type, independent of any physical dialect type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Time,
    Json,
    Array,
}

/// Grain at which a time dimension can be truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrain {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeGrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGrain::Year => "year",
            TimeGrain::Quarter => "quarter",
            TimeGrain::Month => "month",
            TimeGrain::Week => "week",
            TimeGrain::Day => "day",
            TimeGrain::Hour => "hour",
            TimeGrain::Minute => "minute",
            TimeGrain::Second => "second",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(alias = "many-to-one", alias = "many_to_one")]
    ManyToOne,
    #[serde(alias = "one-to-one", alias = "one_to_one")]
    OneToOne,
    #[serde(alias = "many-to-many", alias = "many_to_many")]
    ManyToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Sum,
    Count,
    CountDistinct,
    Min,
    Max,
    Avg,
    Median,
    Mode,
    ListAgg,
    AnyValue,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::CountDistinct => "count_distinct",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Avg => "avg",
            AggregationType::Median => "median",
            AggregationType::Mode => "mode",
            AggregationType::ListAgg => "listagg",
            AggregationType::AnyValue => "any_value",
        }
    }
}

/// A column reference inside a data object (used for join keys and measure columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataColumnRef {
    #[serde(default)]
    pub view: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObjectColumn {
    pub name: String,
    #[serde(rename = "type", default = "default_string_type")]
    pub data_type: DataType,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_string_type() -> DataType {
    DataType::String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataObjectJoin {
    pub join_type: JoinType,
    pub join_to: String,
    pub cardinality: Cardinality,
    pub columns_from: Vec<String>,
    pub columns_to: Vec<String>,
    /// Opt-in joins used only when a query explicitly requests them by name.
    #[serde(default)]
    pub secondary: bool,
    #[serde(default)]
    pub path_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub code: String,
    pub columns: Vec<DataObjectColumn>,
    #[serde(default)]
    pub joins: Vec<DataObjectJoin>,
}

impl DataObject {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultType {
    Categorical,
    Numeric,
    Temporal,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub data_object: String,
    pub column: String,
    #[serde(default)]
    pub result_type: Option<ResultType>,
    #[serde(default)]
    pub time_grain: Option<TimeGrain>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterValue {
    pub column: String,
    #[serde(default)]
    pub equals: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureFilter {
    pub column: String,
    pub equals: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithinGroup {
    pub order_by_column: String,
    #[serde(default)]
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub aggregation: AggregationType,
    /// Columns-based measure: one or more column refs (multi-field for
    /// composite-key COUNT DISTINCT).
    #[serde(default)]
    pub columns: Vec<DataColumnRef>,
    /// Expression-based measure: an OBML formula referencing `{[Column]}` tokens.
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub filter: Option<MeasureFilter>,
    #[serde(default)]
    pub within_group: Option<WithinGroup>,
    #[serde(default)]
    pub allow_fan_out: bool,
    /// Apply DISTINCT to the aggregation's argument(s).
    #[serde(default)]
    pub distinct: bool,
    /// Grand-total measure: computed once over the whole result set rather
    /// than per dimension row, via the total wrapper's window-function pass.
    #[serde(default)]
    pub total: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// An arithmetic formula over `{[Measure]}`/`{[Metric]}` tokens.
    pub formula: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_format_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticModel {
    /// OBML schema version this model was authored against. Carried through
    /// untouched by every pipeline stage; nothing in this crate branches on
    /// it today, but it is part of the model's own identity and round-trips.
    #[serde(default = "default_format_version")]
    pub format_version: String,
    pub data_objects: BTreeMap<String, DataObject>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, Dimension>,
    #[serde(default)]
    pub measures: BTreeMap<String, Measure>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Metric>,
}

impl Default for SemanticModel {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            data_objects: BTreeMap::new(),
            dimensions: BTreeMap::new(),
            measures: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }
}

impl SemanticModel {
    /// All identifier->kind pairs across the four global namespaces, in a
    /// stable iteration order, used by both the uniqueness check and
    /// "did you mean" suggestion scoring.
    pub fn all_identifiers(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.data_objects
            .keys()
            .map(|n| (n.as_str(), "dataObject"))
            .chain(self.dimensions.keys().map(|n| (n.as_str(), "dimension")))
            .chain(self.measures.keys().map(|n| (n.as_str(), "measure")))
            .chain(self.metrics.keys().map(|n| (n.as_str(), "metric")))
    }

    /// A dimension, measure or metric by name, regardless of kind -- used by
    /// order-by resolution, which accepts any selectable field name.
    pub fn is_known_field(&self, name: &str) -> bool {
        self.dimensions.contains_key(name)
            || self.measures.contains_key(name)
            || self.metrics.contains_key(name)
    }

    pub fn qualified_table(&self, object_name: &str) -> Option<(Option<&str>, Option<&str>, &str)> {
        self.data_objects
            .get(object_name)
            .map(|o| (o.database.as_deref(), o.schema.as_deref(), o.code.as_str()))
    }
}
