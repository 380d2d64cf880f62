//! The physicalized intermediate form a `Query` resolves into: dimensions and
//! measures pinned to concrete data objects/columns, filters translated into
//! AST expressions, and the join path needed to reach every referenced
//! object. Planners (star/CFL) and the total wrapper consume this, never the
//! raw `Query`.

use std::collections::{BTreeMap, HashSet};

use crate::ast::Expr;
use crate::graph::JoinStep;
use crate::model::{AggregationType, TimeGrain};
use crate::query::UsePathName;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDimension {
    pub name: String,
    pub object_name: String,
    pub column_name: String,
    pub source_column: String,
    pub grain: Option<TimeGrain>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMeasure {
    pub name: String,
    /// Empty for metrics, which carry their shape in `expression` instead of
    /// a single aggregation.
    pub aggregation: Option<AggregationType>,
    pub expression: Expr,
    pub is_expression: bool,
    pub total: bool,
    /// Names of the measures a metric formula references, in the order they
    /// first appear, for planners that need to reason about cross-fact
    /// composition.
    pub component_measures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFilter {
    pub expr: Expr,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub base_object: Option<String>,
    pub required_objects: HashSet<String>,
    pub dimensions: Vec<ResolvedDimension>,
    pub measures: Vec<ResolvedMeasure>,
    /// Data objects that at least one selected measure/metric draws from.
    pub measure_source_objects: HashSet<String>,
    /// Resolved component measures referenced by metric formulas, keyed by
    /// measure name, so planners can substitute them without re-resolving.
    pub metric_components: BTreeMap<String, ResolvedMeasure>,
    pub join_steps: Vec<JoinStep>,
    pub where_filters: Vec<ResolvedFilter>,
    pub having_filters: Vec<ResolvedFilter>,
    pub order_by: Vec<(Expr, bool)>,
    pub limit: Option<u64>,
    pub use_path_names: Vec<UsePathName>,
    /// Set once measures are known to span more than one source object --
    /// triggers the composite-fact planner instead of the star planner.
    pub requires_cfl: bool,
}

impl ResolvedQuery {
    /// Every data object a resolved measure draws from, used by the CFL
    /// planner to partition measures into per-fact "legs".
    pub fn fact_tables(&self) -> Vec<&str> {
        let mut objs: Vec<&str> = self.measure_source_objects.iter().map(|s| s.as_str()).collect();
        objs.sort_unstable();
        objs
    }

    pub fn has_totals(&self) -> bool {
        self.measures.iter().any(|m| m.total)
            || self.metric_components.values().any(|m| m.total)
    }
}
