//! OBML: a semantic-layer query compiler. Translates a `Query` against an
//! OBML `SemanticModel` into dialect-specific SQL for postgres, snowflake,
//! clickhouse, databricks and dremio.
//!
//! The pipeline: reference resolution -> semantic validation -> query
//! resolution -> fanout detection -> planning (star or composite-fact) ->
//! total wrapping -> dialect rendering. `ModelRegistry` caches a model after
//! the first two (one-time, relatively expensive) stages; `compile()` runs
//! only the per-query stages against an already-cached model.

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod expr_parser;
pub mod fanout;
pub mod graph;
pub mod loader;
pub mod model;
pub mod planner;
pub mod query;
pub mod query_resolver;
pub mod registry;
pub mod resolved;
pub mod resolver;
pub mod total_wrapper;
pub mod validator;

pub use config::ObmlConfig;
pub use error::{ObmlError, Result};
pub use model::SemanticModel;
pub use query::Query;
pub use registry::{DimensionInfo, MeasureInfo, ModelDescription, ModelRegistry, ModelSummary};
pub use resolved::ResolvedQuery;

/// The result of compiling one `Query` against one `SemanticModel`: the
/// rendered SQL plus enough shape information for a caller to describe the
/// result set without re-deriving it from the query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationResult {
    pub sql: String,
    pub dialect: String,
    pub fact_tables: Vec<String>,
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
    /// Non-fatal notices accumulated during compilation. Always empty in
    /// this crate today -- kept as an extension point for a future external
    /// SQL-syntax post-validator, which is out of scope here.
    pub warnings: Vec<String>,
}

/// Compile `query` against `model`, rendering for `dialect_name`. Pure and
/// single-threaded: no I/O, no timers, no background tasks. Callers that
/// keep a model registered in a `ModelRegistry` should fetch its `Arc`
/// via `ModelRegistry::get` and pass it here; `compile` itself never touches
/// the registry, so it never blocks on the registry lock.
#[tracing::instrument(skip(model, query))]
pub fn compile(model: &SemanticModel, query: &Query, dialect_name: &str) -> Result<CompilationResult> {
    tracing::debug!("resolving query against model");
    let resolved = query_resolver::QueryResolver::new()
        .resolve(query, model)
        .map_err(ObmlError::QueryResolution)?;

    tracing::debug!("checking for row-multiplying joins");
    fanout::detect_fanout(&resolved, model).map_err(|e| ObmlError::Fanout(e.0))?;

    tracing::debug!(cfl = resolved.requires_cfl, "planning query");
    let select = planner::plan(&resolved, model)?;

    let select = if resolved.has_totals() {
        tracing::debug!("wrapping plan with total-window pass");
        total_wrapper::wrap_with_totals(select, &resolved)?
    } else {
        select
    };

    tracing::debug!(dialect = dialect_name, "rendering sql");
    let dialect = dialect::resolve(dialect_name)?;
    let renderer = dialect::Renderer::new(dialect.as_ref(), model);
    let sql = renderer.render(&select)?;

    Ok(CompilationResult {
        sql,
        dialect: dialect_name.to_string(),
        fact_tables: resolved
            .fact_tables()
            .into_iter()
            .map(str::to_string)
            .collect(),
        dimensions: resolved.dimensions.iter().map(|d| d.name.clone()).collect(),
        measures: resolved.measures.iter().map(|m| m.name.clone()).collect(),
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_YAML: &str = r#"
dataObjects:
  Orders:
    code: orders
    schema: public
    columns:
      - {name: order_id, type: integer}
      - {name: customer_id, type: integer}
      - {name: amount, type: decimal}
      - {name: order_date, type: timestamp}
dimensions:
  OrderDate:
    dataObject: Orders
    column: order_date
    timeGrain: day
measures:
  Revenue:
    aggregation: sum
    columns:
      - {view: Orders, column: amount}
"#;

    fn query() -> Query {
        serde_json::from_str(r#"{"select": {"dimensions": ["OrderDate"], "measures": ["Revenue"]}}"#)
            .unwrap()
    }

    #[test]
    fn compiles_a_simple_query_to_postgres() {
        let model: SemanticModel = serde_yaml::from_str(MODEL_YAML).unwrap();
        let result = compile(&model, &query(), "postgres").unwrap();
        assert!(result.sql.to_uppercase().contains("SELECT"));
        assert_eq!(result.dialect, "postgres");
        assert_eq!(result.fact_tables, vec!["Orders".to_string()]);
    }

    #[test]
    fn compiles_through_a_registered_model() {
        let registry = ModelRegistry::new();
        let id = registry.load(MODEL_YAML).unwrap();
        let model = registry.get(&id).unwrap();
        let result = compile(&model, &query(), "snowflake").unwrap();
        assert_eq!(result.measures, vec!["Revenue".to_string()]);
    }

    #[test]
    fn unknown_dialect_is_an_error() {
        let model: SemanticModel = serde_yaml::from_str(MODEL_YAML).unwrap();
        assert!(compile(&model, &query(), "mysql").is_err());
    }
}
