//! Reference resolver: turns a raw OBML mapping into a `SemanticModel`,
//! checking that every `dataObject`/column reference named by a dimension,
//! measure or join actually exists and offering "did you mean" suggestions
//! when it doesn't.
//!
//! Structural properties of the model as a whole (global uniqueness, cycles,
//! multipath joins) are the `validator` module's job, not this one's -- this
//! module only resolves names to the things they point at.

use crate::diagnostics::{suggest, Diagnostic, Diagnostics};
use crate::model::SemanticModel;

pub struct ReferenceResolver;

impl ReferenceResolver {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw YAML text into a `SemanticModel` and resolve every
    /// dimension/measure/join reference against it.
    #[tracing::instrument(skip(self, raw))]
    pub fn resolve(&self, raw: &str) -> Result<SemanticModel, Diagnostics> {
        let mut value: serde_yaml::Value = match serde_yaml::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                let mut diags = Diagnostics::new();
                diags.push(Diagnostic::new("MALFORMED_MODEL", e.to_string()));
                return Err(diags);
            }
        };

        // Each top-level collection must be a mapping keyed by display name.
        // A scalar or sequence there is a structural error, not a type error
        // serde should reject the whole document over -- swap it for an
        // empty mapping so the rest of the model can still be checked.
        let mut diags = Diagnostics::new();
        if let serde_yaml::Value::Mapping(map) = &mut value {
            for (key, code) in [
                ("dataObjects", "DATA_OBJECT_PARSE_ERROR"),
                ("dimensions", "DIMENSION_PARSE_ERROR"),
                ("measures", "MEASURE_PARSE_ERROR"),
                ("metrics", "METRIC_PARSE_ERROR"),
            ] {
                let k = serde_yaml::Value::String(key.to_string());
                if let Some(v) = map.get(&k) {
                    if !matches!(v, serde_yaml::Value::Mapping(_) | serde_yaml::Value::Null) {
                        diags.push(
                            Diagnostic::new(
                                code,
                                format!(
                                    "'{key}' must be a mapping keyed by display name, found a {}",
                                    yaml_kind(v)
                                ),
                            )
                            .at(key.to_string()),
                        );
                        map.insert(k, serde_yaml::Value::Mapping(Default::default()));
                    }
                }
            }
        }

        let model: SemanticModel = match serde_yaml::from_value(value) {
            Ok(m) => m,
            Err(e) => {
                diags.push(Diagnostic::new("MALFORMED_MODEL", e.to_string()));
                return Err(diags);
            }
        };
        diags.extend(self.resolve_model(&model));
        diags.into_result(model)
    }

    /// Check a parsed model's references without re-parsing YAML -- used by
    /// the registry when a model is constructed programmatically.
    pub fn resolve_model(&self, model: &SemanticModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let object_names: Vec<&str> = model.data_objects.keys().map(|s| s.as_str()).collect();

        for (dim_name, dim) in &model.dimensions {
            self.check_object_column(
                &mut diags,
                model,
                &object_names,
                &dim.data_object,
                &dim.column,
                &format!("dimensions.{dim_name}"),
                "dimension",
            );
        }

        for (measure_name, measure) in &model.measures {
            for (i, col_ref) in measure.columns.iter().enumerate() {
                if let Some(obj_name) = &col_ref.view {
                    self.check_object_column(
                        &mut diags,
                        model,
                        &object_names,
                        obj_name,
                        &col_ref.column,
                        &format!("measures.{measure_name}.columns[{i}]"),
                        "measure",
                    );
                }
            }
            if let Some(filter) = &measure.filter {
                // Filter columns are resolved against the measure's own object(s)
                // lazily at query time once the base object is known; here we
                // only check that *some* data object carries the column name,
                // since OBML requires globally-unique column names.
                if !model
                    .data_objects
                    .values()
                    .any(|o| o.has_column(&filter.column))
                {
                    diags.push(
                        Diagnostic::new(
                            "UNKNOWN_COLUMN",
                            format!(
                                "Measure '{measure_name}' filter references unknown column '{}'",
                                filter.column
                            ),
                        )
                        .at(format!("measures.{measure_name}.filter"))
                        .suggest(suggest(
                            &filter.column,
                            model.data_objects.values().flat_map(|o| o.column_names()),
                        )),
                    );
                }
            }
        }

        let known_columns: Vec<&str> = model
            .data_objects
            .values()
            .flat_map(|o| o.column_names())
            .collect();
        for (measure_name, measure) in &model.measures {
            if let Some(expression) = &measure.expression {
                for col_name in crate::expr_parser::extract_refs(expression) {
                    if !known_columns.contains(&col_name.as_str()) {
                        diags.push(
                            Diagnostic::new(
                                "UNKNOWN_COLUMN_IN_EXPRESSION",
                                format!(
                                    "Measure '{measure_name}' expression references unknown column '{col_name}'"
                                ),
                            )
                            .at(format!("measures.{measure_name}.expression"))
                            .suggest(suggest(&col_name, &known_columns)),
                        );
                    }
                }
            }
        }

        let measure_names: Vec<&str> = model.measures.keys().map(|s| s.as_str()).collect();
        for (metric_name, metric) in &model.metrics {
            for ref_name in crate::expr_parser::extract_refs(&metric.formula) {
                if !model.measures.contains_key(&ref_name) && !model.metrics.contains_key(&ref_name) {
                    diags.push(
                        Diagnostic::new(
                            "UNKNOWN_MEASURE_REF",
                            format!(
                                "Metric '{metric_name}' formula references unknown measure '{ref_name}'"
                            ),
                        )
                        .at(format!("metrics.{metric_name}.formula"))
                        .suggest(suggest(&ref_name, &measure_names)),
                    );
                }
            }
        }

        for (join_obj_name, obj) in &model.data_objects {
            for (i, join) in obj.joins.iter().enumerate() {
                if !model.data_objects.contains_key(&join.join_to) {
                    diags.push(
                        Diagnostic::new(
                            "UNKNOWN_JOIN_TARGET",
                            format!(
                                "Data object '{join_obj_name}' join[{i}] references unknown data object '{}'",
                                join.join_to
                            ),
                        )
                        .at(format!("dataObjects.{join_obj_name}.joins[{i}]"))
                        .suggest(suggest(&join.join_to, &object_names)),
                    );
                }
            }
        }

        diags
    }

    fn check_object_column(
        &self,
        diags: &mut Diagnostics,
        model: &SemanticModel,
        object_names: &[&str],
        obj_name: &str,
        col_name: &str,
        path: &str,
        kind: &str,
    ) {
        match model.data_objects.get(obj_name) {
            None => {
                diags.push(
                    Diagnostic::new(
                        "UNKNOWN_DATA_OBJECT",
                        format!(
                            "{}'s data object '{obj_name}' does not exist",
                            kind_title(kind)
                        ),
                    )
                    .at(path.to_string())
                    .suggest(suggest(obj_name, object_names)),
                );
            }
            Some(obj) => {
                if !obj.has_column(col_name) {
                    diags.push(
                        Diagnostic::new(
                            "UNKNOWN_COLUMN",
                            format!(
                                "{}'s column '{col_name}' does not exist on data object '{obj_name}'",
                                kind_title(kind)
                            ),
                        )
                        .at(path.to_string())
                        .suggest(suggest(col_name, obj.column_names())),
                    );
                }
            }
        }
    }
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn yaml_kind(v: &serde_yaml::Value) -> &'static str {
    match v {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "boolean",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "scalar",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

fn kind_title(kind: &str) -> String {
    let mut c = kind.chars();
    match c.next() {
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_YAML: &str = r#"
dataObjects:
  Customers:
    code: customers
    schema: public
    columns:
      - {name: customer_id, type: integer}
      - {name: name, type: string}
dimensions:
  CustomerName:
    dataObject: Customers
    column: name
"#;

    #[test]
    fn resolves_clean_model() {
        let resolver = ReferenceResolver::new();
        let model = resolver.resolve(MODEL_YAML).unwrap();
        assert_eq!(model.data_objects.len(), 1);
        assert_eq!(model.dimensions.len(), 1);
    }

    #[test]
    fn flags_unknown_data_object_with_suggestion() {
        let bad = MODEL_YAML.replace("dataObject: Customers", "dataObject: Custmers");
        let resolver = ReferenceResolver::new();
        let err = resolver.resolve(&bad).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert_eq!(err.0[0].code, "UNKNOWN_DATA_OBJECT");
        assert_eq!(err.0[0].suggestions, vec!["Customers".to_string()]);
    }

    #[test]
    fn flags_unknown_column() {
        let bad = MODEL_YAML.replace("column: name", "column: full_name");
        let resolver = ReferenceResolver::new();
        let err = resolver.resolve(&bad).unwrap_err();
        assert_eq!(err.0[0].code, "UNKNOWN_COLUMN");
    }

    #[test]
    fn scalar_dimensions_section_is_a_structured_error() {
        let bad = "dataObjects: {}\ndimensions: not-a-mapping\n";
        let resolver = ReferenceResolver::new();
        let err = resolver.resolve(bad).unwrap_err();
        assert_eq!(err.0[0].code, "DIMENSION_PARSE_ERROR");
    }

    #[test]
    fn sequence_measures_section_is_a_structured_error() {
        let bad = "dataObjects: {}\nmeasures: [a, b]\n";
        let resolver = ReferenceResolver::new();
        let err = resolver.resolve(bad).unwrap_err();
        assert_eq!(err.0[0].code, "MEASURE_PARSE_ERROR");
    }
}
