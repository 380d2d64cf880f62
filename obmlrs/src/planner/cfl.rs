//! Composite Fact Layer planner: when a query's measures come from more
//! than one fact object, stitches them together with a `UNION ALL` CTE
//! (one leg per fact, NULL-padded for the other facts' measures) and
//! re-aggregates over the union in an outer query. A single-fact query
//! delegates straight to the star planner -- CFL is strictly the multi-fact
//! case.

use std::collections::{BTreeMap, HashSet};

use crate::ast::{BinOp, Cte, CteBody, Expr, From, FromSource, Join, Literal, OrderByItem, Select, UnionAll};
use crate::graph::JoinGraph;
use crate::model::{AggregationType, SemanticModel};
use crate::resolved::{ResolvedMeasure, ResolvedQuery};

use super::star::StarSchemaPlanner;

const COMPOSITE_CTE_NAME: &str = "composite_01";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CflPlanningError(pub String);

pub struct CflPlanner;

impl CflPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, resolved: &ResolvedQuery, model: &SemanticModel) -> Result<Select, CflPlanningError> {
        self.validate(resolved, model)?;

        let (groups, cross_fact) = self.group_measures_by_object(resolved, model);

        if groups.len() <= 1 && cross_fact.is_empty() {
            return Ok(StarSchemaPlanner::new().plan(resolved, model));
        }

        Ok(self.plan_union_all(resolved, model, groups, cross_fact))
    }

    fn validate(&self, resolved: &ResolvedQuery, model: &SemanticModel) -> Result<(), CflPlanningError> {
        let mut errors = Vec::new();
        for dim in &resolved.dimensions {
            if !model.data_objects.contains_key(&dim.object_name) {
                errors.push(format!(
                    "Dimension '{}' references unknown data object '{}'",
                    dim.name, dim.object_name
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CflPlanningError(errors.join("; ")))
        }
    }

    /// Groups resolved measures (expanding metrics into their component
    /// measures) by the data object each one's columns come from. Multi-field
    /// measures whose fields span more than one object go to `cross_fact`
    /// instead, but still seed an (initially empty) leg for every object they
    /// touch so the join-path search reaches them.
    fn group_measures_by_object(
        &self,
        resolved: &ResolvedQuery,
        model: &SemanticModel,
    ) -> (BTreeMap<String, Vec<ResolvedMeasure>>, Vec<ResolvedMeasure>) {
        let mut groups: BTreeMap<String, Vec<ResolvedMeasure>> = BTreeMap::new();
        let mut cross_fact = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for measure in &resolved.measures {
            if !measure.component_measures.is_empty() {
                for comp_name in &measure.component_measures {
                    if !seen.insert(comp_name.clone()) {
                        continue;
                    }
                    let Some(comp) = resolved.metric_components.get(comp_name) else {
                        continue;
                    };
                    let obj_name = model
                        .measures
                        .get(comp_name)
                        .and_then(|m| m.columns.first())
                        .and_then(|c| c.view.clone())
                        .or_else(|| resolved.base_object.clone())
                        .unwrap_or_default();
                    groups.entry(obj_name).or_default().push(comp.clone());
                }
                continue;
            }

            if !seen.insert(measure.name.clone()) {
                continue;
            }
            let model_measure = model.measures.get(&measure.name);
            let Some(model_measure) = model_measure.filter(|m| !m.columns.is_empty()) else {
                let obj_name = resolved.base_object.clone().unwrap_or_default();
                groups.entry(obj_name).or_default().push(measure.clone());
                continue;
            };

            let field_objects: HashSet<&str> = model_measure
                .columns
                .iter()
                .filter_map(|c| c.view.as_deref())
                .collect();

            if field_objects.len() > 1 {
                cross_fact.push(measure.clone());
                for obj in field_objects {
                    groups.entry(obj.to_string()).or_default();
                }
            } else {
                let obj_name = model_measure
                    .columns
                    .first()
                    .and_then(|c| c.view.clone())
                    .or_else(|| resolved.base_object.clone())
                    .unwrap_or_default();
                groups.entry(obj_name).or_default().push(measure.clone());
            }
        }

        (groups, cross_fact)
    }

    fn is_multi_field(measure: &ResolvedMeasure) -> bool {
        matches!(&measure.expression, Expr::FunctionCall { args, .. } if args.len() > 1)
    }

    fn multi_field_cte_alias(measure_name: &str, idx: usize) -> String {
        format!("{measure_name}__f{idx}")
    }

    /// The bare column inside `AGG(column)` -- the raw per-row value each
    /// UNION ALL leg contributes before the outer query re-aggregates it.
    fn unwrap_aggregation(measure: &ResolvedMeasure) -> Expr {
        match &measure.expression {
            Expr::FunctionCall { args, .. } if !args.is_empty() => args[0].clone(),
            other => other.clone(),
        }
    }

    fn build_outer_metric_expr(&self, metric: &ResolvedMeasure, resolved: &ResolvedQuery) -> Expr {
        self.substitute_outer_refs(&metric.expression, resolved)
    }

    fn substitute_outer_refs(&self, expr: &Expr, resolved: &ResolvedQuery) -> Expr {
        if let Expr::ColumnRef { table: None, name } = expr {
            if let Some(comp) = resolved.metric_components.get(name) {
                let (mut agg, mut distinct) = (comp.aggregation.unwrap_or(AggregationType::Sum), false);
                if agg == AggregationType::CountDistinct {
                    agg = AggregationType::Count;
                    distinct = true;
                }
                if let Expr::FunctionCall { distinct: d, .. } = &comp.expression {
                    distinct = distinct || *d;
                }
                return Expr::FunctionCall {
                    agg,
                    args: vec![Expr::col(comp.name.clone())],
                    distinct,
                    order_by: None,
                    separator: None,
                };
            }
        }
        if let Expr::BinaryOp { op, left, right } = expr {
            return Expr::BinaryOp {
                op: *op,
                left: Box::new(self.substitute_outer_refs(left, resolved)),
                right: Box::new(self.substitute_outer_refs(right, resolved)),
            };
        }
        expr.clone()
    }

    /// `COUNT(DISTINCT CAST(f0 AS VARCHAR) || '|' || CAST(f1 AS VARCHAR) ...)`
    /// for a multi-field measure's outer re-aggregation -- the per-field CTE
    /// columns are pipe-concatenated into a single composite key first.
    fn build_outer_concat_count(&self, measure_name: &str, n_fields: usize, agg: AggregationType, distinct: bool) -> Expr {
        let parts: Vec<Expr> = (0..n_fields)
            .map(|i| Expr::Cast {
                expr: Box::new(Expr::col(Self::multi_field_cte_alias(measure_name, i))),
                data_type: "VARCHAR".to_string(),
            })
            .collect();
        let mut concat = parts[0].clone();
        for part in &parts[1..] {
            concat = Expr::BinaryOp {
                op: BinOp::Concat,
                left: Box::new(concat),
                right: Box::new(Expr::BinaryOp {
                    op: BinOp::Concat,
                    left: Box::new(Expr::Literal(Literal::Str("|".to_string()))),
                    right: Box::new(part.clone()),
                }),
            };
        }
        Expr::FunctionCall {
            agg,
            args: vec![concat],
            distinct,
            order_by: None,
            separator: None,
        }
    }

    fn plan_union_all(
        &self,
        resolved: &ResolvedQuery,
        model: &SemanticModel,
        groups: BTreeMap<String, Vec<ResolvedMeasure>>,
        cross_fact: Vec<ResolvedMeasure>,
    ) -> Select {
        let mut path_keys = HashSet::new();
        for upn in &resolved.use_path_names {
            path_keys.insert(crate::graph::PathNameKey {
                source: upn.source.clone(),
                target: upn.target.clone(),
                path_name: upn.path_name.clone(),
            });
        }
        let graph = JoinGraph::build(model, &path_keys);

        let mut all_measures: Vec<ResolvedMeasure> = Vec::new();
        for measures in groups.values() {
            all_measures.extend(measures.iter().cloned());
        }
        all_measures.extend(cross_fact.iter().cloned());

        let mut union_legs: Vec<Select> = Vec::new();
        for (obj_name, measures) in &groups {
            let mut leg = Select::default();
            let this_names: HashSet<&str> = measures.iter().map(|m| m.name.as_str()).collect();

            for dim in &resolved.dimensions {
                let col = Expr::qualified_col(dim.object_name.clone(), dim.source_column.clone());
                let col = match dim.grain {
                    Some(grain) => Expr::TimeGrain { column: Box::new(col), grain },
                    None => col,
                };
                leg.columns.push(col.aliased(dim.name.clone()));
            }

            for m in &all_measures {
                if Self::is_multi_field(m) {
                    if let Expr::FunctionCall { args, .. } = &m.expression {
                        for (i, arg) in args.iter().enumerate() {
                            let alias = Self::multi_field_cte_alias(&m.name, i);
                            let arg_table = match arg {
                                Expr::ColumnRef { table, .. } => table.as_deref(),
                                _ => None,
                            };
                            let value = if arg_table == Some(obj_name.as_str()) {
                                arg.clone()
                            } else {
                                Expr::null()
                            };
                            leg.columns.push(value.aliased(alias));
                        }
                    }
                } else if this_names.contains(m.name.as_str()) {
                    leg.columns.push(Self::unwrap_aggregation(m).aliased(m.name.clone()));
                } else {
                    leg.columns.push(Expr::null().aliased(m.name.clone()));
                }
            }

            if model.data_objects.contains_key(obj_name) {
                leg.from = Some(From {
                    source: FromSource::Table(obj_name.clone()),
                    alias: Some(obj_name.clone()),
                });
            }

            let required: HashSet<String> = resolved
                .dimensions
                .iter()
                .map(|d| d.object_name.clone())
                .filter(|o| o != obj_name)
                .collect();
            let mut targets: Vec<String> = required.into_iter().collect();
            targets.sort_unstable();
            if !targets.is_empty() {
                if let Ok(steps) = graph.find_join_path(obj_name, &targets) {
                    for step in steps {
                        if !model.data_objects.contains_key(&step.to_object) {
                            continue;
                        }
                        let Ok(on_expr) = graph.build_join_condition(&step) else {
                            continue;
                        };
                        leg.joins.push(Join {
                            join_type: step.as_ast_join_kind(),
                            source: FromSource::Table(step.to_object.clone()),
                            alias: Some(step.to_object.clone()),
                            on: on_expr,
                        });
                    }
                }
            }

            union_legs.push(leg);
        }

        let union_cte = Cte {
            name: COMPOSITE_CTE_NAME.to_string(),
            query: CteBody::UnionAll(UnionAll { queries: union_legs }),
        };

        let mut outer = Select::default();
        for dim in &resolved.dimensions {
            outer.columns.push(Expr::col(dim.name.clone()).aliased(dim.name.clone()));
        }

        let mut seen_names: HashSet<String> = HashSet::new();
        for m in &all_measures {
            seen_names.insert(m.name.clone());
            let (mut agg, mut distinct) = (m.aggregation.unwrap_or(AggregationType::Sum), false);
            if agg == AggregationType::CountDistinct {
                agg = AggregationType::Count;
                distinct = true;
            }
            if let Expr::FunctionCall { distinct: d, .. } = &m.expression {
                distinct = distinct || *d;
            }

            let agg_expr = if Self::is_multi_field(m) {
                let n_fields = match &m.expression {
                    Expr::FunctionCall { args, .. } => args.len(),
                    _ => 1,
                };
                self.build_outer_concat_count(&m.name, n_fields, agg, distinct)
            } else {
                Expr::FunctionCall {
                    agg,
                    args: vec![Expr::col(m.name.clone())],
                    distinct,
                    order_by: None,
                    separator: None,
                }
            };
            outer.columns.push(agg_expr.aliased(m.name.clone()));
        }

        for m in &resolved.measures {
            if !m.component_measures.is_empty() && !seen_names.contains(&m.name) {
                let expr = self.build_outer_metric_expr(m, resolved);
                outer.columns.push(expr.aliased(m.name.clone()));
            }
        }

        outer.from = Some(From {
            source: FromSource::Table(COMPOSITE_CTE_NAME.to_string()),
            alias: Some(COMPOSITE_CTE_NAME.to_string()),
        });

        for dim in &resolved.dimensions {
            outer.group_by.push(Expr::col(dim.name.clone()));
        }

        for (expr, desc) in &resolved.order_by {
            outer.order_by.push(OrderByItem {
                expr: expr.strip_table_qualifiers(),
                desc: *desc,
                nulls_last: false,
            });
        }
        outer.limit = resolved.limit;
        outer.ctes = vec![union_cte];

        outer
    }
}

impl Default for CflPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataObject, DataObjectColumn, DataType};
    use std::collections::BTreeMap as Map;

    fn two_fact_model() -> SemanticModel {
        let mut data_objects = Map::new();
        data_objects.insert(
            "Orders".to_string(),
            DataObject {
                database: None,
                schema: None,
                code: "orders".to_string(),
                columns: vec![DataObjectColumn { name: "amount".into(), data_type: DataType::Decimal, description: None }],
                joins: vec![],
            },
        );
        data_objects.insert(
            "Returns".to_string(),
            DataObject {
                database: None,
                schema: None,
                code: "returns".to_string(),
                columns: vec![DataObjectColumn { name: "refund_amount".into(), data_type: DataType::Decimal, description: None }],
                joins: vec![],
            },
        );
        SemanticModel { data_objects, ..Default::default() }
    }

    fn measure(view: &str, col: &str) -> crate::model::Measure {
        crate::model::Measure {
            aggregation: AggregationType::Sum,
            columns: vec![crate::model::DataColumnRef { view: Some(view.to_string()), column: col.to_string() }],
            expression: None,
            filter: None,
            within_group: None,
            allow_fan_out: false,
            distinct: false,
            total: false,
            description: None,
        }
    }

    #[test]
    fn single_fact_delegates_to_star() {
        let mut model = two_fact_model();
        model.measures.insert("Revenue".to_string(), measure("Orders", "amount"));
        let resolved = ResolvedQuery {
            base_object: Some("Orders".to_string()),
            measures: vec![ResolvedMeasure {
                name: "Revenue".to_string(),
                aggregation: Some(AggregationType::Sum),
                expression: Expr::qualified_col("Orders", "amount"),
                is_expression: false,
                total: false,
                component_measures: vec![],
            }],
            measure_source_objects: HashSet::from(["Orders".to_string()]),
            ..Default::default()
        };
        let select = CflPlanner::new().plan(&resolved, &model).unwrap();
        assert!(select.ctes.is_empty());
    }

    #[test]
    fn multi_fact_builds_union_all_cte() {
        let mut model = two_fact_model();
        model.measures.insert("Revenue".to_string(), measure("Orders", "amount"));
        model.measures.insert("Refunds".to_string(), measure("Returns", "refund_amount"));
        let resolved = ResolvedQuery {
            base_object: Some("Orders".to_string()),
            dimensions: vec![],
            measures: vec![
                ResolvedMeasure {
                    name: "Revenue".to_string(),
                    aggregation: Some(AggregationType::Sum),
                    expression: Expr::FunctionCall {
                        agg: AggregationType::Sum,
                        args: vec![Expr::qualified_col("Orders", "amount")],
                        distinct: false,
                        order_by: None,
                        separator: None,
                    },
                    is_expression: false,
                    total: false,
                    component_measures: vec![],
                },
                ResolvedMeasure {
                    name: "Refunds".to_string(),
                    aggregation: Some(AggregationType::Sum),
                    expression: Expr::FunctionCall {
                        agg: AggregationType::Sum,
                        args: vec![Expr::qualified_col("Returns", "refund_amount")],
                        distinct: false,
                        order_by: None,
                        separator: None,
                    },
                    is_expression: false,
                    total: false,
                    component_measures: vec![],
                },
            ],
            measure_source_objects: HashSet::from(["Orders".to_string(), "Returns".to_string()]),
            requires_cfl: true,
            ..Default::default()
        };
        let select = CflPlanner::new().plan(&resolved, &model).unwrap();
        assert_eq!(select.ctes.len(), 1);
        match &select.ctes[0].query {
            CteBody::UnionAll(u) => assert_eq!(u.queries.len(), 2),
            _ => panic!("expected union all"),
        }
    }

    #[test]
    fn order_by_strips_table_qualifier_from_outer_query() {
        let mut model = two_fact_model();
        model.measures.insert("Revenue".to_string(), measure("Orders", "amount"));
        model.measures.insert("Refunds".to_string(), measure("Returns", "refund_amount"));
        let resolved = ResolvedQuery {
            base_object: Some("Orders".to_string()),
            measures: vec![
                ResolvedMeasure {
                    name: "Revenue".to_string(),
                    aggregation: Some(AggregationType::Sum),
                    expression: Expr::FunctionCall {
                        agg: AggregationType::Sum,
                        args: vec![Expr::qualified_col("Orders", "amount")],
                        distinct: false,
                        order_by: None,
                        separator: None,
                    },
                    is_expression: false,
                    total: false,
                    component_measures: vec![],
                },
                ResolvedMeasure {
                    name: "Refunds".to_string(),
                    aggregation: Some(AggregationType::Sum),
                    expression: Expr::FunctionCall {
                        agg: AggregationType::Sum,
                        args: vec![Expr::qualified_col("Returns", "refund_amount")],
                        distinct: false,
                        order_by: None,
                        separator: None,
                    },
                    is_expression: false,
                    total: false,
                    component_measures: vec![],
                },
            ],
            measure_source_objects: HashSet::from(["Orders".to_string(), "Returns".to_string()]),
            requires_cfl: true,
            order_by: vec![(Expr::qualified_col("Orders", "amount"), true)],
            ..Default::default()
        };
        let select = CflPlanner::new().plan(&resolved, &model).unwrap();
        assert_eq!(select.order_by.len(), 1);
        assert_eq!(select.order_by[0].expr, Expr::col("amount"));
    }
}
