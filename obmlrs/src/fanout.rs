//! Fanout detection: flags join paths that would multiply rows under a
//! measure's aggregation, producing an inflated sum/count/avg.
//!
//! A step fans out when it's many-to-many (always), or many-to-one but
//! traversed backwards (i.e. walked as one-to-many from the measure's
//! perspective). One-to-one and forward many-to-one steps never fan out.

use std::collections::{HashMap, HashSet};

use crate::graph::JoinStep;
use crate::model::{Cardinality, SemanticModel};
use crate::resolved::ResolvedQuery;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FanoutError(pub String);

fn step_causes_fanout(step: &JoinStep) -> bool {
    match step.cardinality {
        Cardinality::ManyToMany => true,
        Cardinality::ManyToOne => step.reversed,
        Cardinality::OneToOne => false,
    }
}

/// Check every selected measure (and metric component) for fanout along the
/// resolved join path; `allow_fan_out` on a model measure opts it out.
pub fn detect_fanout(resolved: &ResolvedQuery, model: &SemanticModel) -> Result<(), FanoutError> {
    if resolved.join_steps.is_empty() {
        return Ok(());
    }

    let mut to_check: Vec<&str> = Vec::new();
    for m in &resolved.measures {
        if m.component_measures.is_empty() {
            to_check.push(&m.name);
        } else {
            to_check.extend(m.component_measures.iter().map(String::as_str));
        }
    }
    let mut seen = HashSet::new();
    let unique: Vec<&str> = to_check.into_iter().filter(|n| seen.insert(*n)).collect();

    let mut global_columns: HashMap<&str, &str> = HashMap::new();
    for (obj_name, obj) in &model.data_objects {
        for col in &obj.columns {
            global_columns.insert(&col.name, obj_name);
        }
    }

    let mut errors = Vec::new();
    for measure_name in unique {
        let Some(model_measure) = model.measures.get(measure_name) else {
            continue;
        };
        if model_measure.allow_fan_out {
            continue;
        }

        let mut source_objects: HashSet<&str> = HashSet::new();
        for cref in &model_measure.columns {
            if let Some(view) = &cref.view {
                source_objects.insert(view.as_str());
            }
        }
        if let Some(expr) = &model_measure.expression {
            for col_name in crate::expr_parser::extract_refs(expr) {
                if let Some(obj_name) = global_columns.get(col_name.as_str()) {
                    source_objects.insert(obj_name);
                }
            }
        }
        if source_objects.is_empty() {
            continue;
        }

        for step in &resolved.join_steps {
            if !step_causes_fanout(step) {
                continue;
            }
            let multiplied_object = if step.reversed {
                step.to_object.as_str()
            } else {
                step.from_object.as_str()
            };
            if source_objects.contains(multiplied_object) {
                errors.push(format!(
                    "Measure '{measure_name}' has fanout: join from '{}' to '{}' ({:?}{}) causes row multiplication",
                    step.from_object,
                    step.to_object,
                    step.cardinality,
                    if step.reversed { ", reversed" } else { "" }
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(FanoutError(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::JoinStep;
    use crate::model::{DataObject, DataObjectColumn, DataType, JoinType, Measure};
    use crate::resolved::ResolvedMeasure;
    use std::collections::BTreeMap;

    fn model_with_measure(allow_fan_out: bool) -> SemanticModel {
        let mut data_objects = BTreeMap::new();
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
        let mut measures = BTreeMap::new();
        measures.insert(
            "Revenue".to_string(),
            Measure {
                aggregation: crate::model::AggregationType::Sum,
                columns: vec![crate::model::DataColumnRef { view: Some("Orders".to_string()), column: "amount".to_string() }],
                expression: None,
                filter: None,
                within_group: None,
                allow_fan_out,
                distinct: false,
                total: false,
                description: None,
            },
        );
        SemanticModel {
            format_version: "1.0".to_string(),
            data_objects,
            dimensions: BTreeMap::new(),
            measures,
            metrics: BTreeMap::new(),
        }
    }

    fn resolved_with_step(reversed: bool, cardinality: Cardinality) -> ResolvedQuery {
        ResolvedQuery {
            measures: vec![ResolvedMeasure {
                name: "Revenue".to_string(),
                aggregation: Some(crate::model::AggregationType::Sum),
                expression: crate::ast::Expr::null(),
                is_expression: false,
                total: false,
                component_measures: vec![],
            }],
            join_steps: vec![JoinStep {
                from_object: "Orders".to_string(),
                to_object: "Customers".to_string(),
                join_type: JoinType::Left,
                cardinality,
                columns_from: vec!["customer_id".to_string()],
                columns_to: vec!["customer_id".to_string()],
                reversed,
                secondary: false,
                path_name: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn many_to_many_always_fans_out() {
        let model = model_with_measure(false);
        let resolved = resolved_with_step(false, Cardinality::ManyToMany);
        assert!(detect_fanout(&resolved, &model).is_err());
    }

    #[test]
    fn reversed_many_to_one_fans_out() {
        let model = model_with_measure(false);
        let resolved = resolved_with_step(true, Cardinality::ManyToOne);
        assert!(detect_fanout(&resolved, &model).is_err());
    }

    #[test]
    fn forward_many_to_one_is_safe() {
        let model = model_with_measure(false);
        let resolved = resolved_with_step(false, Cardinality::ManyToOne);
        assert!(detect_fanout(&resolved, &model).is_ok());
    }

    #[test]
    fn allow_fan_out_escape_hatch() {
        let model = model_with_measure(true);
        let resolved = resolved_with_step(true, Cardinality::ManyToOne);
        assert!(detect_fanout(&resolved, &model).is_ok());
    }
}
