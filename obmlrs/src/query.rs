//! The typed query object clients submit to the compiler: which
//! dimensions/measures to select, filters, ordering, and any secondary join
//! paths to take. Deserializes from either JSON or YAML -- the wire format is
//! just "a mapping", so callers pick whichever serializer suits them.

use serde::{Deserialize, Serialize};

/// A dimension reference as it appears in `select.dimensions`: either a bare
/// name (`Revenue.OrderDate`) or a name with an explicit grain override
/// (`Revenue.OrderDate:month`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRef {
    pub name: String,
    pub grain: Option<crate::model::TimeGrain>,
}

impl DimensionRef {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((name, grain)) => DimensionRef {
                name: name.to_string(),
                grain: parse_grain(grain),
            },
            None => DimensionRef {
                name: raw.to_string(),
                grain: None,
            },
        }
    }
}

fn parse_grain(raw: &str) -> Option<crate::model::TimeGrain> {
    use crate::model::TimeGrain::*;
    match raw.to_ascii_lowercase().as_str() {
        "year" => Some(Year),
        "quarter" => Some(Quarter),
        "month" => Some(Month),
        "week" => Some(Week),
        "day" => Some(Day),
        "hour" => Some(Hour),
        "minute" => Some(Minute),
        "second" => Some(Second),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for DimensionRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(DimensionRef::parse(&raw))
    }
}

impl Serialize for DimensionRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match &self.grain {
            Some(g) => serializer.serialize_str(&format!("{}:{}", self.name, grain_str(*g))),
            None => serializer.serialize_str(&self.name),
        }
    }
}

fn grain_str(g: crate::model::TimeGrain) -> &'static str {
    use crate::model::TimeGrain::*;
    match g {
        Year => "year",
        Quarter => "quarter",
        Month => "month",
        Week => "week",
        Day => "day",
        Hour => "hour",
        Minute => "minute",
        Second => "second",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySelect {
    #[serde(default)]
    pub dimensions: Vec<DimensionRef>,
    #[serde(default)]
    pub measures: Vec<String>,
}

/// Filter comparison operator. OBML accepts both a verbose spelling and a
/// short symbolic one for most operators; both deserialize to the same
/// variant so callers can use whichever they like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[serde(alias = "=")]
    Equals,
    #[serde(rename = "notequals", alias = "!=")]
    NotEquals,
    #[serde(alias = ">")]
    GreaterThan,
    #[serde(alias = ">=")]
    GreaterThanOrEquals,
    #[serde(alias = "<")]
    LessThan,
    #[serde(alias = "<=")]
    LessThanOrEquals,
    #[serde(rename = "inlist", alias = "in")]
    InList,
    #[serde(rename = "notinlist", alias = "not_in")]
    NotInList,
    #[serde(rename = "set", alias = "is_not_null")]
    IsNotNull,
    #[serde(rename = "notset", alias = "is_null")]
    IsNull,
    #[serde(alias = "contains")]
    Contains,
    #[serde(rename = "notcontains", alias = "not_contains")]
    NotContains,
    #[serde(alias = "starts_with")]
    StartsWith,
    #[serde(alias = "ends_with")]
    EndsWith,
    #[serde(alias = "like")]
    Like,
    #[serde(rename = "notlike", alias = "not_like")]
    NotLike,
    #[serde(alias = "between")]
    Between,
    #[serde(rename = "notbetween", alias = "not_between")]
    NotBetween,
    /// Relative date range: "last 7 days", "next 2 months", etc. The value
    /// carries a `RelativeRange` object rather than a scalar.
    #[serde(alias = "relative")]
    Relative,
}

fn default_include_current() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeRange {
    pub unit: crate::ast::DateUnit,
    pub count: i64,
    #[serde(default)]
    pub future: bool,
    /// Accepted as either `include_current` or `includeCurrent` on the wire;
    /// defaults to `true` when omitted.
    #[serde(
        alias = "includeCurrent",
        default = "default_include_current"
    )]
    pub include_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    /// Field name: a dimension, measure, or bare column name.
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub relative: Option<RelativeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Asc
    }
}

/// An order-by target: either a 1-based position into the select list, or a
/// named dimension/measure/metric field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderByField {
    Position(u32),
    Named(String),
}

impl<'de> Deserialize<'de> for OrderByField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u32),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(OrderByField::Position(n)),
            Raw::Str(s) => match s.parse::<u32>() {
                Ok(n) => Ok(OrderByField::Position(n)),
                Err(_) => Ok(OrderByField::Named(s)),
            },
        }
    }
}

impl Serialize for OrderByField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            OrderByField::Position(n) => serializer.serialize_u32(*n),
            OrderByField::Named(s) => serializer.serialize_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOrderBy {
    pub field: OrderByField,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Opts a query into a specific secondary join path between two data
/// objects, disambiguating which of possibly several `pathName`d secondary
/// joins to traverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsePathName {
    pub source: String,
    pub target: String,
    pub path_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub select: QuerySelect,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default)]
    pub having: Vec<QueryFilter>,
    #[serde(default)]
    pub order_by: Vec<QueryOrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub use_path_names: Vec<UsePathName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimension_ref_with_grain() {
        let d = DimensionRef::parse("OrderDate:month");
        assert_eq!(d.name, "OrderDate");
        assert_eq!(d.grain, Some(crate::model::TimeGrain::Month));
    }

    #[test]
    fn parses_bare_dimension_ref() {
        let d = DimensionRef::parse("OrderDate");
        assert_eq!(d.name, "OrderDate");
        assert_eq!(d.grain, None);
    }

    #[test]
    fn deserializes_query_with_symbolic_operators() {
        let json = r#"{
            "select": {"dimensions": ["OrderDate"], "measures": ["Revenue"]},
            "filters": [{"field": "Status", "operator": "!=", "value": "cancelled"}],
            "orderBy": [{"field": 1, "direction": "desc"}],
            "limit": 10
        }"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert_eq!(q.filters[0].operator, FilterOperator::NotEquals);
        assert_eq!(q.order_by[0].field, OrderByField::Position(1));
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn deserializes_verbose_operators() {
        let json = r#"{
            "select": {"dimensions": [], "measures": []},
            "filters": [
                {"field": "A", "operator": "inlist", "value": [1,2]},
                {"field": "B", "operator": "notset"}
            ]
        }"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert_eq!(q.filters[0].operator, FilterOperator::InList);
        assert_eq!(q.filters[1].operator, FilterOperator::IsNull);
    }
}
