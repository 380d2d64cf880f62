//! Wraps a planner's `Select` with a `base` CTE + outer window-function
//! query whenever a measure is marked `total: true` (a grand total computed
//! once over the whole result set rather than per dimension row).
//!
//! Window functions can't coexist with the planner's own `GROUP BY` on
//! already-grouped rows, so the per-group aggregate becomes a CTE column and
//! the outer query re-aggregates it with `AGG(x) OVER ()`.

use std::collections::HashSet;

use crate::ast::{Expr, From, FromSource, OrderByItem, Select};
use crate::error::{ObmlError, Result};
use crate::model::AggregationType;
use crate::resolved::{ResolvedMeasure, ResolvedQuery};

const UNSUPPORTED_TOTAL_AGGS: [AggregationType; 4] = [
    AggregationType::Median,
    AggregationType::Mode,
    AggregationType::ListAgg,
    AggregationType::AnyValue,
];

fn reagg_func(aggregation: AggregationType) -> Result<AggregationType> {
    if UNSUPPORTED_TOTAL_AGGS.contains(&aggregation) {
        return Err(ObmlError::Planning(format!(
            "aggregation '{}' does not support total: true (cannot be re-aggregated via window functions)",
            aggregation.as_str()
        )));
    }
    Ok(match aggregation {
        AggregationType::Sum | AggregationType::Count | AggregationType::CountDistinct | AggregationType::Avg => {
            AggregationType::Sum
        }
        AggregationType::Min => AggregationType::Min,
        AggregationType::Max => AggregationType::Max,
        _ => AggregationType::Sum,
    })
}

fn is_avg_total(measure: &ResolvedMeasure) -> bool {
    measure.total && measure.aggregation == Some(AggregationType::Avg)
}

fn avg_sum_alias(name: &str) -> String {
    format!("{name}__sum")
}

fn avg_count_alias(name: &str) -> String {
    format!("{name}__count")
}

fn build_total_window(measure: &ResolvedMeasure) -> Result<Expr> {
    if is_avg_total(measure) {
        return Ok(Expr::BinaryOp {
            op: crate::ast::BinOp::Div,
            left: Box::new(window_sum(avg_sum_alias(&measure.name))),
            right: Box::new(window_sum(avg_count_alias(&measure.name))),
        });
    }
    let reagg = reagg_func(measure.aggregation.unwrap_or(AggregationType::Sum))?;
    Ok(Expr::WindowFunction {
        agg: reagg,
        args: vec![Expr::col(measure.name.clone())],
        distinct: false,
        partition_by: vec![],
        order_by: vec![],
    })
}

fn window_sum(col: String) -> Expr {
    Expr::WindowFunction {
        agg: AggregationType::Sum,
        args: vec![Expr::col(col)],
        distinct: false,
        partition_by: vec![],
        order_by: vec![],
    }
}

fn metrics_with_total_components(resolved: &ResolvedQuery) -> HashSet<String> {
    let mut names = HashSet::new();
    for m in &resolved.measures {
        if m.component_measures.is_empty() {
            continue;
        }
        for comp_name in &m.component_measures {
            if let Some(comp) = resolved.metric_components.get(comp_name) {
                if comp.total {
                    names.insert(m.name.clone());
                    break;
                }
            }
        }
    }
    names
}

fn substitute_metric_refs(expr: &Expr, resolved: &ResolvedQuery) -> Result<Expr> {
    if let Expr::ColumnRef { table: None, name } = expr {
        if let Some(comp) = resolved.metric_components.get(name) {
            return if comp.total {
                build_total_window(comp)
            } else {
                Ok(Expr::col(comp.name.clone()))
            };
        }
    }
    if let Expr::BinaryOp { op, left, right } = expr {
        return Ok(Expr::BinaryOp {
            op: *op,
            left: Box::new(substitute_metric_refs(left, resolved)?),
            right: Box::new(substitute_metric_refs(right, resolved)?),
        });
    }
    Ok(expr.clone())
}

fn get_alias(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::AliasedExpr { alias, .. } => Some(alias),
        _ => None,
    }
}

fn remap_order_by_expr(expr: &Expr) -> Expr {
    match expr {
        Expr::ColumnRef { table: Some(_), name } => Expr::col(name.clone()),
        other => other.clone(),
    }
}

fn build_avg_helpers_base_col(measure: &ResolvedMeasure, kind: &str) -> Expr {
    let inner_args = match &measure.expression {
        Expr::FunctionCall { args, .. } if !args.is_empty() => args.clone(),
        _ => vec![Expr::col(measure.name.clone())],
    };
    let agg = if kind == "sum" { AggregationType::Sum } else { AggregationType::Count };
    let alias = if kind == "sum" {
        avg_sum_alias(&measure.name)
    } else {
        avg_count_alias(&measure.name)
    };
    Expr::FunctionCall {
        agg,
        args: inner_args,
        distinct: false,
        order_by: None,
        separator: None,
    }
    .aliased(alias)
}

/// Wrap `select` with a `base` CTE + outer window-function query if any
/// measure (direct or metric component) is marked `total: true`. Returns
/// `select` unchanged otherwise.
pub fn wrap_with_totals(select: Select, resolved: &ResolvedQuery) -> Result<Select> {
    if !resolved.has_totals() {
        return Ok(select);
    }

    let decompose_metrics = metrics_with_total_components(resolved);

    let direct_measure_names: HashSet<&str> = resolved
        .measures
        .iter()
        .filter(|m| m.component_measures.is_empty())
        .map(|m| m.name.as_str())
        .collect();

    let mut base_columns: Vec<Expr> = Vec::new();
    for col_node in &select.columns {
        let alias = get_alias(col_node);
        if let Some(alias) = alias.filter(|a| decompose_metrics.contains(**a)) {
            let metric = resolved.measures.iter().find(|m| m.name == alias);
            if let Some(metric) = metric {
                for comp_name in &metric.component_measures {
                    if direct_measure_names.contains(comp_name.as_str()) {
                        continue;
                    }
                    if let Some(comp) = resolved.metric_components.get(comp_name) {
                        if is_avg_total(comp) {
                            base_columns.push(build_avg_helpers_base_col(comp, "sum"));
                            base_columns.push(build_avg_helpers_base_col(comp, "count"));
                        } else {
                            base_columns.push(comp.expression.clone().aliased(comp.name.clone()));
                        }
                    }
                }
            }
        } else if let Some(alias) = alias {
            let is_avg = resolved
                .measures
                .iter()
                .find(|m| m.name == alias && m.component_measures.is_empty())
                .map(is_avg_total)
                .unwrap_or(false);
            if is_avg {
                let measure = resolved.measures.iter().find(|m| m.name == alias).unwrap();
                base_columns.push(build_avg_helpers_base_col(measure, "sum"));
                base_columns.push(build_avg_helpers_base_col(measure, "count"));
            } else {
                base_columns.push(col_node.clone());
            }
        } else {
            base_columns.push(col_node.clone());
        }
    }

    let base_cte_query = Select {
        ctes: vec![],
        columns: base_columns,
        from: select.from.clone(),
        joins: select.joins.clone(),
        where_: select.where_.clone(),
        group_by: select.group_by.clone(),
        having: select.having.clone(),
        order_by: vec![],
        limit: None,
        offset: None,
    };

    let base_cte = crate::ast::Cte {
        name: "base".to_string(),
        query: crate::ast::CteBody::Select(base_cte_query),
    };

    let mut outer_columns: Vec<Expr> = Vec::new();
    for dim in &resolved.dimensions {
        outer_columns.push(Expr::col(dim.name.clone()).aliased(dim.name.clone()));
    }

    for m in &resolved.measures {
        if !m.component_measures.is_empty() {
            if decompose_metrics.contains(&m.name) {
                let metric_expr = substitute_metric_refs(&m.expression, resolved)?;
                outer_columns.push(metric_expr.aliased(m.name.clone()));
            } else {
                outer_columns.push(Expr::col(m.name.clone()).aliased(m.name.clone()));
            }
        } else if m.total {
            outer_columns.push(build_total_window(m)?.aliased(m.name.clone()));
        } else {
            outer_columns.push(Expr::col(m.name.clone()).aliased(m.name.clone()));
        }
    }

    let outer_order_by: Vec<OrderByItem> = select
        .order_by
        .iter()
        .map(|ob| OrderByItem {
            expr: remap_order_by_expr(&ob.expr),
            desc: ob.desc,
            nulls_last: ob.nulls_last,
        })
        .collect();

    let mut all_ctes = select.ctes.clone();
    all_ctes.push(base_cte);

    Ok(Select {
        ctes: all_ctes,
        columns: outer_columns,
        from: Some(From {
            source: FromSource::Table("base".to_string()),
            alias: Some("base".to_string()),
        }),
        joins: vec![],
        where_: vec![],
        group_by: vec![],
        having: vec![],
        order_by: outer_order_by,
        limit: select.limit,
        offset: select.offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, FromSource};

    fn sum_measure(name: &str, total: bool) -> ResolvedMeasure {
        ResolvedMeasure {
            name: name.to_string(),
            aggregation: Some(AggregationType::Sum),
            expression: Expr::FunctionCall {
                agg: AggregationType::Sum,
                args: vec![Expr::col("amount")],
                distinct: false,
                order_by: None,
                separator: None,
            },
            is_expression: false,
            total,
            component_measures: vec![],
        }
    }

    #[test]
    fn no_totals_returns_unchanged() {
        let select = Select {
            columns: vec![Expr::col("x").aliased("x")],
            ..Default::default()
        };
        let resolved = ResolvedQuery {
            measures: vec![sum_measure("Revenue", false)],
            ..Default::default()
        };
        let out = wrap_with_totals(select.clone(), &resolved).unwrap();
        assert_eq!(out, select);
    }

    #[test]
    fn total_sum_wraps_in_base_cte_with_window() {
        let select = Select {
            columns: vec![Expr::FunctionCall {
                agg: AggregationType::Sum,
                args: vec![Expr::col("amount")],
                distinct: false,
                order_by: None,
                separator: None,
            }
            .aliased("Revenue")],
            from: Some(From { source: FromSource::Table("Orders".to_string()), alias: Some("Orders".to_string()) }),
            ..Default::default()
        };
        let resolved = ResolvedQuery {
            measures: vec![sum_measure("Revenue", true)],
            ..Default::default()
        };
        let out = wrap_with_totals(select, &resolved).unwrap();
        assert_eq!(out.ctes.len(), 1);
        assert_eq!(out.ctes[0].name, "base");
        match &out.columns[0] {
            Expr::AliasedExpr { expr, alias } => {
                assert_eq!(alias, "Revenue");
                assert!(matches!(**expr, Expr::WindowFunction { agg: AggregationType::Sum, .. }));
            }
            _ => panic!("expected aliased window function"),
        }
    }

    #[test]
    fn unsupported_total_agg_errors() {
        let select = Select::default();
        let mut measure = sum_measure("Tally", true);
        measure.aggregation = Some(AggregationType::Median);
        let resolved = ResolvedQuery { measures: vec![measure], ..Default::default() };
        assert!(wrap_with_totals(select, &resolved).is_err());
    }

    #[test]
    fn avg_total_splits_into_sum_and_count_helpers() {
        let select = Select {
            columns: vec![Expr::FunctionCall {
                agg: AggregationType::Avg,
                args: vec![Expr::col("amount")],
                distinct: false,
                order_by: None,
                separator: None,
            }
            .aliased("AvgOrder")],
            ..Default::default()
        };
        let mut measure = sum_measure("AvgOrder", true);
        measure.aggregation = Some(AggregationType::Avg);
        measure.expression = Expr::FunctionCall {
            agg: AggregationType::Avg,
            args: vec![Expr::col("amount")],
            distinct: false,
            order_by: None,
            separator: None,
        };
        let resolved = ResolvedQuery { measures: vec![measure], ..Default::default() };
        let out = wrap_with_totals(select, &resolved).unwrap();
        let base_cte = &out.ctes[0];
        match &base_cte.query {
            crate::ast::CteBody::Select(s) => assert_eq!(s.columns.len(), 2),
            _ => panic!("expected select cte"),
        }
        match &out.columns[0] {
            Expr::AliasedExpr { expr, .. } => {
                assert!(matches!(**expr, Expr::BinaryOp { op: BinOp::Div, .. }));
            }
            _ => panic!(),
        }
    }
}
