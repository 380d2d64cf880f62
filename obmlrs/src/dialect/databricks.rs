//! Databricks SQL dialect -- Spark SQL semantics, backtick identifiers.

use super::{Dialect, DialectCapabilities};
use crate::error::{ObmlError, Result};
use crate::model::TimeGrain;

#[derive(Debug, Default, Clone, Copy)]
pub struct DatabricksDialect;

impl Dialect for DatabricksDialect {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            supports_arrays: true,
            ..Default::default()
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn render_time_grain(&self, column_sql: &str, grain: TimeGrain) -> String {
        format!("date_trunc('{}', {column_sql})", grain.as_str())
    }

    /// Databricks has no ILIKE; lower-case both sides instead.
    fn render_string_contains(&self, column_sql: &str, pattern_sql: &str) -> String {
        format!("(lower({column_sql}) LIKE ('%' || lower({pattern_sql}) || '%'))")
    }

    fn compile_median(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("median({arg_sql})"))
    }

    fn compile_mode(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("mode({arg_sql})"))
    }

    /// Databricks has no `ORDER BY` inside `COLLECT_LIST`/`COLLECT_SET`; only
    /// self-ordering via `SORT_ARRAY` is supported.
    fn compile_listagg(
        &self,
        arg_sql: &str,
        distinct: bool,
        order_by: Option<(&str, bool)>,
        separator: Option<&str>,
    ) -> Result<String> {
        let sep = separator.unwrap_or(",").replace('\'', "''");
        let collect_fn = if distinct { "COLLECT_SET" } else { "COLLECT_LIST" };
        let mut inner = format!("{collect_fn}({arg_sql})");
        if let Some((ob_sql, desc)) = order_by {
            if ob_sql != arg_sql {
                return Err(ObmlError::Dialect(format!(
                    "Databricks LISTAGG does not support ORDER BY on a different column (aggregated: {arg_sql}, order by: {ob_sql})"
                )));
            }
            inner = if desc {
                format!("SORT_ARRAY({inner}, false)")
            } else {
                format!("SORT_ARRAY({inner})")
            };
        }
        Ok(format!("ARRAY_JOIN({inner}, '{sep}')"))
    }

    fn current_date_sql(&self) -> String {
        "current_date()".to_string()
    }

    fn date_add_sql(&self, date_sql: &str, unit: &str, count: i64) -> Result<String> {
        match unit {
            "day" => Ok(format!("date_add({date_sql}, {count})")),
            "week" => Ok(format!("date_add({date_sql}, {})", count * 7)),
            "month" => Ok(format!("add_months({date_sql}, {count})")),
            "year" => Ok(format!("add_months({date_sql}, {})", count * 12)),
            other => Err(ObmlError::Dialect(format!(
                "unsupported unit '{other}' for Databricks date arithmetic"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_part_table_ref_by_default() {
        let d = DatabricksDialect;
        assert_eq!(d.format_table_ref(Some("catalog"), Some("schema"), "orders"), "catalog.schema.orders");
    }

    #[test]
    fn backtick_quoting() {
        let d = DatabricksDialect;
        assert_eq!(d.quote_identifier("weird`name"), "`weird``name`");
    }

    #[test]
    fn week_unit_multiplies_days() {
        let d = DatabricksDialect;
        assert_eq!(d.date_add_sql("x", "week", 2).unwrap(), "date_add(x, 14)");
    }
}
