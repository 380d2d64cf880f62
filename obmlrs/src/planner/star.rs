//! Star schema planner: a single fact table joined to its dimension tables,
//! one `GROUP BY` over the selected dimensions. This is the common case --
//! the composite-fact planner only kicks in once measures span more than
//! one source object.

use crate::ast::{Expr, From, FromSource, Join, OrderByItem, Select};
use crate::graph::JoinGraph;
use crate::model::SemanticModel;
use crate::resolved::ResolvedQuery;

/// Recursively replace bare `ColumnRef` placeholders that name a metric
/// component measure with that component's own aggregate expression.
pub fn substitute_measure_refs(
    expr: &Expr,
    components: &std::collections::BTreeMap<String, crate::resolved::ResolvedMeasure>,
) -> Expr {
    match expr {
        Expr::ColumnRef { table: None, name } => {
            if let Some(component) = components.get(name) {
                component.expression.clone()
            } else {
                expr.clone()
            }
        }
        Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
            op: *op,
            left: Box::new(substitute_measure_refs(left, components)),
            right: Box::new(substitute_measure_refs(right, components)),
        },
        Expr::UnaryOp { op, expr: inner } => Expr::UnaryOp {
            op: *op,
            expr: Box::new(substitute_measure_refs(inner, components)),
        },
        other => other.clone(),
    }
}

pub struct StarSchemaPlanner;

impl StarSchemaPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, resolved: &ResolvedQuery, model: &SemanticModel) -> Select {
        let mut select = Select::default();

        let Some(base_name) = &resolved.base_object else {
            return select;
        };
        if !model.data_objects.contains_key(base_name) {
            return select;
        }

        let graph = JoinGraph::build(model, &Default::default());

        for dim in &resolved.dimensions {
            let col = Expr::qualified_col(dim.object_name.clone(), dim.source_column.clone());
            let col = match dim.grain {
                Some(grain) => Expr::TimeGrain { column: Box::new(col), grain },
                None => col,
            };
            select.columns.push(col.aliased(dim.name.clone()));
        }

        for measure in &resolved.measures {
            let expr = if measure.component_measures.is_empty() {
                measure.expression.clone()
            } else {
                substitute_measure_refs(&measure.expression, &resolved.metric_components)
            };
            select.columns.push(expr.aliased(measure.name.clone()));
        }

        select.from = Some(From {
            source: FromSource::Table(base_name.clone()),
            alias: Some(base_name.clone()),
        });

        for step in &resolved.join_steps {
            if !model.data_objects.contains_key(&step.to_object) {
                continue;
            }
            let Ok(on_expr) = graph.build_join_condition(step) else {
                continue;
            };
            select.joins.push(Join {
                join_type: step.as_ast_join_kind(),
                source: FromSource::Table(step.to_object.clone()),
                alias: Some(step.to_object.clone()),
                on: on_expr,
            });
        }

        for wf in &resolved.where_filters {
            select.where_.push(wf.expr.clone());
        }

        for dim in &resolved.dimensions {
            let col = Expr::qualified_col(dim.object_name.clone(), dim.source_column.clone());
            let col = match dim.grain {
                Some(grain) => Expr::TimeGrain { column: Box::new(col), grain },
                None => col,
            };
            select.group_by.push(col);
        }

        for hf in &resolved.having_filters {
            select.having.push(hf.expr.clone());
        }

        for (expr, desc) in &resolved.order_by {
            select.order_by.push(OrderByItem {
                expr: expr.clone(),
                desc: *desc,
                nulls_last: false,
            });
        }

        select.limit = resolved.limit;
        select
    }
}

impl Default for StarSchemaPlanner {
    fn default() -> Self {
        Self::new()
    }
}
