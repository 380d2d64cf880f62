//! Query resolution: turns a typed `Query` into a `ResolvedQuery` against a
//! `SemanticModel` -- the bridge between "what the caller asked for" and
//! "what the planners can build SQL from".

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ast::{BinOp, Expr, Literal, UnOp};
use crate::diagnostics::{suggest, Diagnostic, Diagnostics};
use crate::expr_parser;
use crate::graph::{JoinGraph, PathNameKey};
use crate::model::{AggregationType, Measure, SemanticModel};
use crate::query::{FilterOperator, OrderByField, Query, QueryFilter};
use crate::resolved::{ResolvedDimension, ResolvedFilter, ResolvedMeasure, ResolvedQuery};

/// Marker function name for a "contains" filter's `Expr::Call`. The renderer
/// intercepts this name and routes it through `Dialect::render_string_contains`
/// instead of rendering it as a literal SQL function call.
pub(crate) const STRING_CONTAINS_FN: &str = "__string_contains";

pub struct QueryResolver;

impl QueryResolver {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip(self, query, model))]
    pub fn resolve(&self, query: &Query, model: &SemanticModel) -> Result<ResolvedQuery, Diagnostics> {
        let mut diags = Diagnostics::new();
        let mut result = ResolvedQuery {
            limit: query.limit,
            use_path_names: query.use_path_names.clone(),
            ..Default::default()
        };

        // Global column name -> (owning object, physical column) lookup.
        // OBML requires column names to be unique across the whole model.
        let mut global_columns: HashMap<String, (String, String)> = HashMap::new();
        for (obj_name, obj) in &model.data_objects {
            for col in &obj.columns {
                global_columns.insert(col.name.clone(), (obj_name.clone(), col.name.clone()));
            }
        }

        // 1. Dimensions.
        for dim_ref in &query.select.dimensions {
            if let Some(resolved) = self.resolve_dimension(dim_ref, model, &mut diags) {
                result.required_objects.insert(resolved.object_name.clone());
                result.dimensions.push(resolved);
            }
        }

        // 2. Measures and metrics.
        for name in &query.select.measures {
            if let Some(measure) =
                self.resolve_measure(name, model, &global_columns, &mut diags, Some(&mut result))
            {
                let sources = self.measure_source_objects(name, model, &global_columns);
                result.measure_source_objects.extend(sources.iter().cloned());
                result.required_objects.extend(sources);
                result.measures.push(measure);
            }
        }

        // 3. Base object.
        result.base_object = self.select_base_object(&result, model);
        if let Some(base) = &result.base_object {
            result.required_objects.insert(base.clone());
        }

        // 4. CFL trigger.
        if result.measure_source_objects.len() > 1 {
            result.requires_cfl = true;
        }

        // 5. Validate usePathNames before building the join graph.
        let mut path_keys: HashSet<PathNameKey> = HashSet::new();
        for upn in &query.use_path_names {
            let Some(source_obj) = model.data_objects.get(&upn.source) else {
                diags.push(
                    Diagnostic::new(
                        "UNKNOWN_DATA_OBJECT",
                        format!("usePathNames references unknown data object '{}'", upn.source),
                    )
                    .at("usePathNames"),
                );
                continue;
            };
            if !model.data_objects.contains_key(&upn.target) {
                diags.push(
                    Diagnostic::new(
                        "UNKNOWN_DATA_OBJECT",
                        format!("usePathNames references unknown data object '{}'", upn.target),
                    )
                    .at("usePathNames"),
                );
                continue;
            }
            let found = source_obj
                .joins
                .iter()
                .any(|j| j.join_to == upn.target && j.secondary && j.path_name.as_deref() == Some(upn.path_name.as_str()));
            if !found {
                diags.push(
                    Diagnostic::new(
                        "UNKNOWN_PATH_NAME",
                        format!(
                            "No secondary join with pathName '{}' from '{}' to '{}'",
                            upn.path_name, upn.source, upn.target
                        ),
                    )
                    .at("usePathNames"),
                );
                continue;
            }
            path_keys.insert(PathNameKey {
                source: upn.source.clone(),
                target: upn.target.clone(),
                path_name: upn.path_name.clone(),
            });
        }

        // 6a. Resolve filter fields up front so the objects they touch are
        // folded into required_objects before the join path is built --
        // filter fields may join additional objects into the path.
        let mut resolved_where: Vec<(Option<String>, ResolvedFilter)> = Vec::new();
        for qf in &query.filters {
            if let Some((owner, f)) = self.resolve_filter(qf, model, &global_columns, &mut diags) {
                if let Some(obj) = &owner {
                    result.required_objects.insert(obj.clone());
                }
                resolved_where.push((owner, f));
            }
        }
        let mut resolved_having: Vec<(Option<String>, ResolvedFilter)> = Vec::new();
        for qf in &query.having {
            if let Some((owner, f)) = self.resolve_filter(qf, model, &global_columns, &mut diags) {
                if let Some(obj) = &owner {
                    result.required_objects.insert(obj.clone());
                }
                resolved_having.push((owner, f));
            }
        }

        // 6b. Join paths.
        if diags.is_empty() {
            if let Some(base) = result.base_object.clone() {
                let mut targets: Vec<String> = result
                    .required_objects
                    .iter()
                    .filter(|o| **o != base)
                    .cloned()
                    .collect();
                targets.sort_unstable();
                if !targets.is_empty() {
                    let graph = JoinGraph::build(model, &path_keys);
                    match graph.find_join_path(&base, &targets) {
                        Ok(steps) => result.join_steps = steps,
                        Err(e) => {
                            for target in &targets {
                                if !graph.find_join_path(&base, std::slice::from_ref(target)).is_ok() {
                                    if let Some((Some(owner), _)) = resolved_where
                                        .iter()
                                        .chain(resolved_having.iter())
                                        .find(|(owner, _)| owner.as_deref() == Some(target.as_str()))
                                    {
                                        diags.push(Diagnostic::new(
                                            "UNREACHABLE_FILTER_FIELD",
                                            format!(
                                                "Filter field on data object '{owner}' cannot be joined to base object '{base}'"
                                            ),
                                        ));
                                    }
                                }
                            }
                            diags.push(Diagnostic::new("NO_JOIN_PATH", e.to_string()));
                        }
                    }
                }
            }
        }

        // 7. Filters.
        for (_, f) in resolved_where {
            result.where_filters.push(f);
        }
        for (_, f) in resolved_having {
            result.having_filters.push(f);
        }

        // 8. Order by.
        for ob in &query.order_by {
            if let Some(expr) = self.resolve_order_by_field(&ob.field, &result, &mut diags) {
                let desc = matches!(ob.direction, crate::query::SortDirection::Desc);
                result.order_by.push((expr, desc));
            }
        }

        // 9. Limit is pass-through only (already carried into `result` above
        // from `query.limit`): a query that leaves it unset stays unbounded.
        // `limit=0`/negative is rejected at the query type layer, not here.

        diags.into_result(result)
    }

    fn resolve_dimension(
        &self,
        dim_ref: &crate::query::DimensionRef,
        model: &SemanticModel,
        diags: &mut Diagnostics,
    ) -> Option<ResolvedDimension> {
        let dim = match model.dimensions.get(&dim_ref.name) {
            Some(d) => d,
            None => {
                diags.push(
                    Diagnostic::new("UNKNOWN_DIMENSION", format!("Unknown dimension '{}'", dim_ref.name))
                        .at("select.dimensions")
                        .suggest(suggest(&dim_ref.name, model.dimensions.keys())),
                );
                return None;
            }
        };
        model.data_objects.get(&dim.data_object)?;
        Some(ResolvedDimension {
            name: dim_ref.name.clone(),
            object_name: dim.data_object.clone(),
            column_name: dim.column.clone(),
            source_column: dim.column.clone(),
            grain: dim_ref.grain.or(dim.time_grain),
        })
    }

    fn resolve_measure(
        &self,
        name: &str,
        model: &SemanticModel,
        global_columns: &HashMap<String, (String, String)>,
        diags: &mut Diagnostics,
        result: Option<&mut ResolvedQuery>,
    ) -> Option<ResolvedMeasure> {
        if let Some(measure) = model.measures.get(name) {
            let expr = self.build_measure_expr(measure, model, global_columns);
            return Some(ResolvedMeasure {
                name: name.to_string(),
                aggregation: Some(measure.aggregation),
                expression: expr,
                is_expression: measure.expression.is_some(),
                total: measure.total,
                component_measures: Vec::new(),
            });
        }
        if let Some(metric) = model.metrics.get(name) {
            return self.resolve_metric(name, &metric.formula, model, global_columns, diags, result);
        }
        diags.push(
            Diagnostic::new("UNKNOWN_MEASURE", format!("Unknown measure '{name}'"))
                .at("select.measures")
                .suggest(suggest(
                    name,
                    model.measures.keys().chain(model.metrics.keys()),
                )),
        );
        None
    }

    fn build_measure_expr(
        &self,
        measure: &Measure,
        model: &SemanticModel,
        global_columns: &HashMap<String, (String, String)>,
    ) -> Expr {
        if measure.expression.is_some() {
            return self.expand_expression(measure, global_columns);
        }

        let mut args: Vec<Expr> = Vec::new();
        for col_ref in &measure.columns {
            let obj_name = col_ref.view.clone().unwrap_or_default();
            let obj = model.data_objects.get(&obj_name);
            let has_col = obj.map(|o| o.has_column(&col_ref.column)).unwrap_or(false);
            if has_col {
                args.push(Expr::qualified_col(obj_name, col_ref.column.clone()));
            } else {
                args.push(Expr::col(col_ref.column.clone()));
            }
        }
        if args.is_empty() {
            args.push(Expr::Literal(Literal::Int(1)));
        }

        if let Some(filter) = &measure.filter {
            let filter_obj = measure.columns.first().and_then(|c| c.view.clone());
            let filter_col = match filter_obj {
                Some(obj) => Expr::qualified_col(obj, filter.column.clone()),
                None => Expr::col(filter.column.clone()),
            };
            let cond = Expr::BinaryOp {
                op: BinOp::Eq,
                left: Box::new(filter_col),
                right: Box::new(json_literal(&filter.equals)),
            };
            args = args
                .into_iter()
                .map(|a| Expr::CaseExpr {
                    branches: vec![(cond.clone(), a)],
                    else_expr: Some(Box::new(Expr::null())),
                })
                .collect();
        }

        let (agg, distinct) = if measure.aggregation == AggregationType::CountDistinct {
            (AggregationType::Count, true)
        } else {
            (measure.aggregation, measure.distinct)
        };

        let order_by = measure.within_group.as_ref().map(|wg| {
            (
                Box::new(Expr::col(wg.order_by_column.clone())),
                wg.desc,
            )
        });

        Expr::FunctionCall {
            agg,
            args,
            distinct,
            order_by,
            separator: None,
        }
    }

    fn expand_expression(
        &self,
        measure: &Measure,
        global_columns: &HashMap<String, (String, String)>,
    ) -> Expr {
        let formula = measure.expression.clone().unwrap_or_default();
        let rendered = expr_parser::substitute_refs(&formula, |name| {
            global_columns
                .get(name)
                .map(|(obj, col)| format!("{obj}.{col}"))
        })
        .unwrap_or(formula);

        let (agg, distinct) = if measure.aggregation == AggregationType::CountDistinct {
            (AggregationType::Count, true)
        } else {
            (measure.aggregation, measure.distinct)
        };

        Expr::FunctionCall {
            agg,
            args: vec![Expr::RawSql(rendered)],
            distinct,
            order_by: None,
            separator: None,
        }
    }

    fn resolve_metric(
        &self,
        name: &str,
        formula: &str,
        model: &SemanticModel,
        global_columns: &HashMap<String, (String, String)>,
        diags: &mut Diagnostics,
        mut result: Option<&mut ResolvedQuery>,
    ) -> Option<ResolvedMeasure> {
        let component_names = expr_parser::extract_refs(formula);
        for comp_name in &component_names {
            let already_known = result
                .as_deref()
                .map(|r| r.metric_components.contains_key(comp_name))
                .unwrap_or(true);
            if !already_known {
                if let Some(comp) =
                    self.resolve_measure(comp_name, model, global_columns, diags, None)
                {
                    if let Some(r) = result.as_deref_mut() {
                        r.metric_components.insert(comp_name.clone(), comp);
                    }
                }
            }
        }

        let formula_ast = match expr_parser::parse_formula(formula) {
            Ok(ast) => ast,
            Err(e) => {
                diags.push(
                    Diagnostic::new(
                        "INVALID_METRIC_EXPRESSION",
                        format!("Metric '{name}' has invalid expression: {e}"),
                    )
                    .at(format!("metrics.{name}.formula")),
                );
                return None;
            }
        };

        Some(ResolvedMeasure {
            name: name.to_string(),
            aggregation: None,
            expression: formula_to_expr(&formula_ast),
            is_expression: true,
            total: false,
            component_measures: component_names,
        })
    }

    fn measure_source_objects(
        &self,
        name: &str,
        model: &SemanticModel,
        global_columns: &HashMap<String, (String, String)>,
    ) -> HashSet<String> {
        let mut out = HashSet::new();
        if let Some(measure) = model.measures.get(name) {
            for col_ref in &measure.columns {
                if let Some(view) = &col_ref.view {
                    out.insert(view.clone());
                }
            }
            if let Some(expr) = &measure.expression {
                for col_name in expr_parser::extract_refs(expr) {
                    if let Some((obj_name, _)) = global_columns.get(&col_name) {
                        out.insert(obj_name.clone());
                    }
                }
            }
            return out;
        }
        if let Some(metric) = model.metrics.get(name) {
            for ref_name in expr_parser::extract_refs(&metric.formula) {
                out.extend(self.measure_source_objects(&ref_name, model, global_columns));
            }
        }
        out
    }

    fn select_base_object(&self, result: &ResolvedQuery, model: &SemanticModel) -> Option<String> {
        if !result.measure_source_objects.is_empty() {
            let mut best: Option<&str> = None;
            let mut best_joins: i64 = -1;
            let mut sorted: Vec<&String> = result.measure_source_objects.iter().collect();
            sorted.sort();
            for obj_name in sorted {
                let n = model.data_objects.get(obj_name).map(|o| o.joins.len()).unwrap_or(0) as i64;
                if n > best_joins {
                    best = Some(obj_name);
                    best_joins = n;
                }
            }
            if let Some(b) = best {
                return Some(b.to_string());
            }
        }

        let mut sorted: Vec<&String> = result.required_objects.iter().collect();
        sorted.sort();
        for obj_name in &sorted {
            if model.data_objects.get(*obj_name).map(|o| !o.joins.is_empty()).unwrap_or(false) {
                return Some((*obj_name).clone());
            }
        }
        if let Some(first) = sorted.first() {
            return Some((*first).clone());
        }
        model.data_objects.keys().next().cloned()
    }

    /// Resolves a filter's `field` to a column expression and the data
    /// object it belongs to, so the caller can fold that object into
    /// `required_objects` before the join path is built. Accepts dimension
    /// names (WHERE and HAVING), measure names (HAVING only, per measure
    /// aggregation), and bare global column names.
    fn resolve_filter_field(
        &self,
        field: &str,
        model: &SemanticModel,
        global_columns: &HashMap<String, (String, String)>,
        diags: &mut Diagnostics,
    ) -> Option<(Option<String>, Expr)> {
        if let Some(dim) = model.dimensions.get(field) {
            return Some((
                Some(dim.data_object.clone()),
                Expr::qualified_col(dim.data_object.clone(), dim.column.clone()),
            ));
        }
        if let Some(measure) = model.measures.get(field) {
            let expr = self.build_measure_expr(measure, model, global_columns);
            let sources = self.measure_source_objects(field, model, global_columns);
            return Some((sources.into_iter().next(), expr));
        }
        if model.metrics.contains_key(field) {
            // Metrics reference measures by name; the filter applies to the
            // already-computed output column rather than a fresh expression.
            return Some((None, Expr::col(field.to_string())));
        }
        if let Some((obj_name, col_name)) = global_columns.get(field) {
            return Some((
                Some(obj_name.clone()),
                Expr::qualified_col(obj_name.clone(), col_name.clone()),
            ));
        }
        diags.push(
            Diagnostic::new("UNKNOWN_FILTER_FIELD", format!("Unknown filter field '{field}'"))
                .at("filters")
                .suggest(suggest(
                    field,
                    model
                        .dimensions
                        .keys()
                        .chain(model.measures.keys())
                        .chain(model.metrics.keys()),
                )),
        );
        None
    }

    fn resolve_filter(
        &self,
        qf: &QueryFilter,
        model: &SemanticModel,
        global_columns: &HashMap<String, (String, String)>,
        diags: &mut Diagnostics,
    ) -> Option<(Option<String>, ResolvedFilter)> {
        let (owner, col_expr) = self.resolve_filter_field(&qf.field, model, global_columns, diags)?;
        let expr = self.build_filter_expr(col_expr, qf, diags)?;
        Some((owner, ResolvedFilter { expr }))
    }

    fn build_filter_expr(&self, col: Expr, qf: &QueryFilter, diags: &mut Diagnostics) -> Option<Expr> {
        let val = qf.value.clone().unwrap_or(serde_json::Value::Null);
        match qf.operator {
            FilterOperator::Equals => Some(Expr::BinaryOp {
                op: BinOp::Eq,
                left: Box::new(col),
                right: Box::new(json_literal(&val)),
            }),
            FilterOperator::NotEquals => Some(Expr::BinaryOp {
                op: BinOp::Neq,
                left: Box::new(col),
                right: Box::new(json_literal(&val)),
            }),
            FilterOperator::GreaterThan => Some(Expr::BinaryOp {
                op: BinOp::Gt,
                left: Box::new(col),
                right: Box::new(json_literal(&val)),
            }),
            FilterOperator::GreaterThanOrEquals => Some(Expr::BinaryOp {
                op: BinOp::Gte,
                left: Box::new(col),
                right: Box::new(json_literal(&val)),
            }),
            FilterOperator::LessThan => Some(Expr::BinaryOp {
                op: BinOp::Lt,
                left: Box::new(col),
                right: Box::new(json_literal(&val)),
            }),
            FilterOperator::LessThanOrEquals => Some(Expr::BinaryOp {
                op: BinOp::Lte,
                left: Box::new(col),
                right: Box::new(json_literal(&val)),
            }),
            FilterOperator::InList => Some(Expr::InList {
                expr: Box::new(col),
                list: json_list(&val),
                negated: false,
            }),
            FilterOperator::NotInList => Some(Expr::InList {
                expr: Box::new(col),
                list: json_list(&val),
                negated: true,
            }),
            FilterOperator::IsNotNull => Some(Expr::IsNull {
                expr: Box::new(col),
                negated: true,
            }),
            FilterOperator::IsNull => Some(Expr::IsNull {
                expr: Box::new(col),
                negated: false,
            }),
            FilterOperator::Contains => Some(Expr::Call {
                name: STRING_CONTAINS_FN.to_string(),
                args: vec![col, Expr::Literal(Literal::Str(json_str(&val)))],
            }),
            FilterOperator::StartsWith => Some(Expr::BinaryOp {
                op: BinOp::Like,
                left: Box::new(col),
                right: Box::new(Expr::Literal(Literal::Str(format!("{}%", json_str(&val))))),
            }),
            FilterOperator::EndsWith => Some(Expr::BinaryOp {
                op: BinOp::Like,
                left: Box::new(col),
                right: Box::new(Expr::Literal(Literal::Str(format!("%{}", json_str(&val))))),
            }),
            FilterOperator::NotContains => Some(Expr::UnaryOp {
                op: UnOp::Not,
                expr: Box::new(Expr::Call {
                    name: STRING_CONTAINS_FN.to_string(),
                    args: vec![col, Expr::Literal(Literal::Str(json_str(&val)))],
                }),
            }),
            FilterOperator::Like => Some(Expr::BinaryOp {
                op: BinOp::Like,
                left: Box::new(col),
                right: Box::new(Expr::Literal(Literal::Str(json_str(&val)))),
            }),
            FilterOperator::NotLike => Some(Expr::UnaryOp {
                op: UnOp::Not,
                expr: Box::new(Expr::BinaryOp {
                    op: BinOp::Like,
                    left: Box::new(col),
                    right: Box::new(Expr::Literal(Literal::Str(json_str(&val)))),
                }),
            }),
            FilterOperator::Between => {
                let list = json_list(&val);
                if list.len() >= 2 {
                    Some(Expr::Between {
                        expr: Box::new(col),
                        low: Box::new(list[0].clone()),
                        high: Box::new(list[1].clone()),
                        negated: false,
                    })
                } else {
                    diags.push(Diagnostic::new(
                        "INVALID_FILTER_VALUE",
                        format!("'{}' between filter requires a two-element array", qf.field),
                    ));
                    None
                }
            }
            FilterOperator::NotBetween => {
                let list = json_list(&val);
                if list.len() >= 2 {
                    Some(Expr::Between {
                        expr: Box::new(col),
                        low: Box::new(list[0].clone()),
                        high: Box::new(list[1].clone()),
                        negated: true,
                    })
                } else {
                    diags.push(Diagnostic::new(
                        "INVALID_FILTER_VALUE",
                        format!("'{}' between filter requires a two-element array", qf.field),
                    ));
                    None
                }
            }
            FilterOperator::Relative => {
                let Some(range) = &qf.relative else {
                    diags.push(Diagnostic::new(
                        "INVALID_RELATIVE_FILTER",
                        format!("Relative filter for '{}' requires a 'relative' object", qf.field),
                    ));
                    return None;
                };
                Some(Expr::RelativeDateRange {
                    column: Box::new(col),
                    unit: range.unit,
                    count: range.count,
                    future: range.future,
                    include_current: range.include_current,
                })
            }
        }
    }

    fn resolve_order_by_field(
        &self,
        field: &OrderByField,
        result: &ResolvedQuery,
        diags: &mut Diagnostics,
    ) -> Option<Expr> {
        match field {
            OrderByField::Position(n) => {
                let idx = *n as usize;
                if idx == 0 {
                    diags.push(Diagnostic::new(
                        "INVALID_ORDER_BY",
                        "order by position must be 1-based".to_string(),
                    ));
                    return None;
                }
                let combined_len = result.dimensions.len() + result.measures.len();
                if idx > combined_len {
                    diags.push(Diagnostic::new(
                        "INVALID_ORDER_BY",
                        format!("order by position {idx} is out of range (select list has {combined_len} items)"),
                    ));
                    return None;
                }
                // A numeric position stays a literal ordinal in the rendered
                // `ORDER BY`, not the inlined dimension/measure expression --
                // the position has already been range-checked above.
                Some(Expr::Literal(Literal::Int(idx as i64)))
            }
            OrderByField::Named(name) => {
                if let Some(dim) = result.dimensions.iter().find(|d| &d.name == name) {
                    return Some(Expr::qualified_col(dim.object_name.clone(), dim.source_column.clone()));
                }
                if let Some(meas) = result.measures.iter().find(|m| &m.name == name) {
                    return Some(meas.expression.clone());
                }
                diags.push(
                    Diagnostic::new("UNKNOWN_ORDER_BY_FIELD", format!("Unknown order by field '{name}'"))
                        .at("orderBy")
                        .suggest(suggest(
                            name,
                            result
                                .dimensions
                                .iter()
                                .map(|d| d.name.as_str())
                                .chain(result.measures.iter().map(|m| m.name.as_str())),
                        )),
                );
                None
            }
        }
    }
}

impl Default for QueryResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn formula_to_expr(ast: &expr_parser::FormulaAst) -> Expr {
    use expr_parser::{FormulaAst, FormulaOp};
    match ast {
        FormulaAst::Ref(name) => Expr::col(name.clone()),
        FormulaAst::Number(n) => Expr::Literal(Literal::Float(*n)),
        FormulaAst::Neg(inner) => Expr::UnaryOp {
            op: crate::ast::UnOp::Neg,
            expr: Box::new(formula_to_expr(inner)),
        },
        FormulaAst::Binary { op, left, right } => Expr::BinaryOp {
            op: match op {
                FormulaOp::Add => BinOp::Add,
                FormulaOp::Sub => BinOp::Sub,
                FormulaOp::Mul => BinOp::Mul,
                FormulaOp::Div => BinOp::Div,
            },
            left: Box::new(formula_to_expr(left)),
            right: Box::new(formula_to_expr(right)),
        },
    }
}

fn json_literal(v: &serde_json::Value) -> Expr {
    match v {
        serde_json::Value::Null => Expr::null(),
        serde_json::Value::Bool(b) => Expr::Literal(Literal::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expr::Literal(Literal::Int(i))
            } else {
                Expr::Literal(Literal::Float(n.as_f64().unwrap_or_default()))
            }
        }
        serde_json::Value::String(s) => Expr::Literal(Literal::Str(s.clone())),
        other => Expr::Literal(Literal::Str(other.to_string())),
    }
}

fn json_str(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_list(v: &serde_json::Value) -> Vec<Expr> {
    match v {
        serde_json::Value::Array(items) => items.iter().map(json_literal).collect(),
        other => vec![json_literal(other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AggregationType, DataObject, DataObjectColumn, DataType, Dimension};
    use crate::query::{DimensionRef, QuerySelect};
    use std::collections::BTreeMap;

    fn make_model() -> SemanticModel {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            "Orders".to_string(),
            DataObject {
                database: None,
                schema: Some("public".to_string()),
                code: "orders".to_string(),
                columns: vec![
                    DataObjectColumn { name: "order_id".into(), data_type: DataType::Integer, description: None },
                    DataObjectColumn { name: "amount".into(), data_type: DataType::Decimal, description: None },
                ],
                joins: vec![],
            },
        );
        let mut dimensions = BTreeMap::new();
        dimensions.insert(
            "OrderId".to_string(),
            Dimension {
                data_object: "Orders".to_string(),
                column: "order_id".to_string(),
                result_type: None,
                time_grain: None,
                description: None,
            },
        );
        let mut measures = BTreeMap::new();
        measures.insert(
            "Revenue".to_string(),
            Measure {
                aggregation: AggregationType::Sum,
                columns: vec![crate::model::DataColumnRef { view: Some("Orders".to_string()), column: "amount".to_string() }],
                expression: None,
                filter: None,
                within_group: None,
                allow_fan_out: false,
                distinct: false,
                total: false,
                description: None,
            },
        );
        SemanticModel {
            format_version: "1.0".to_string(),
            data_objects,
            dimensions,
            measures,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn resolves_simple_star_query() {
        let model = make_model();
        let query = Query {
            select: QuerySelect {
                dimensions: vec![DimensionRef::parse("OrderId")],
                measures: vec!["Revenue".to_string()],
            },
            ..Default::default()
        };
        let resolved = QueryResolver::new().resolve(&query, &model).unwrap();
        assert_eq!(resolved.dimensions.len(), 1);
        assert_eq!(resolved.measures.len(), 1);
        assert_eq!(resolved.base_object.as_deref(), Some("Orders"));
        assert!(!resolved.requires_cfl);
    }

    #[test]
    fn contains_filter_defers_to_dialect_via_call_node() {
        let model = make_model();
        let query = Query {
            select: QuerySelect {
                dimensions: vec![DimensionRef::parse("OrderId")],
                measures: vec!["Revenue".to_string()],
            },
            filters: vec![QueryFilter {
                field: "OrderId".to_string(),
                operator: FilterOperator::Contains,
                value: Some(serde_json::json!("abc")),
                relative: None,
            }],
            ..Default::default()
        };
        let resolved = QueryResolver::new().resolve(&query, &model).unwrap();
        let filter = &resolved.where_filters[0];
        match &filter.expr {
            Expr::Call { name, args } => {
                assert_eq!(name, STRING_CONTAINS_FN);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a string-contains Call node, got {other:?}"),
        }
    }

    #[test]
    fn flags_unknown_measure() {
        let model = make_model();
        let query = Query {
            select: QuerySelect { dimensions: vec![], measures: vec!["Bogus".to_string()] },
            ..Default::default()
        };
        let err = QueryResolver::new().resolve(&query, &model).unwrap_err();
        assert_eq!(err.0[0].code, "UNKNOWN_MEASURE");
    }
}
