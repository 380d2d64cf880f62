//! Snowflake dialect -- QUALIFY, case-sensitive identifiers, semi-structured
//! types, and `UNION ALL BY NAME` column matching.

use super::{Dialect, DialectCapabilities};
use crate::error::Result;
use crate::model::TimeGrain;

#[derive(Debug, Default, Clone, Copy)]
pub struct SnowflakeDialect;

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            supports_qualify: true,
            supports_arrays: true,
            supports_window_filters: true,
            supports_ilike: true,
            supports_time_travel: true,
            supports_semi_structured: true,
            ..Default::default()
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn render_time_grain(&self, column_sql: &str, grain: TimeGrain) -> String {
        format!("DATE_TRUNC('{}', {column_sql})", grain.as_str())
    }

    fn render_string_contains(&self, column_sql: &str, pattern_sql: &str) -> String {
        format!("CONTAINS({column_sql}, {pattern_sql})")
    }

    fn compile_median(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("MEDIAN({arg_sql})"))
    }

    fn compile_mode(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("MODE({arg_sql})"))
    }

    fn compile_listagg(
        &self,
        arg_sql: &str,
        distinct: bool,
        order_by: Option<(&str, bool)>,
        separator: Option<&str>,
    ) -> Result<String> {
        let sep = separator.unwrap_or(",").replace('\'', "''");
        let distinct_sql = if distinct { "DISTINCT " } else { "" };
        let mut call = format!("LISTAGG({distinct_sql}{arg_sql}, '{sep}')");
        if let Some((ob_sql, desc)) = order_by {
            let dir = if desc { "DESC" } else { "ASC" };
            call.push_str(&format!(" WITHIN GROUP (ORDER BY {ob_sql} {dir})"));
        }
        Ok(call)
    }

    /// Snowflake supports native multi-arg `COUNT(col1, col2)`.
    fn compile_multi_field_count(&self, arg_sqls: &[String], distinct: bool) -> String {
        let args_sql = arg_sqls.join(", ");
        if distinct {
            format!("COUNT(DISTINCT {args_sql})")
        } else {
            format!("COUNT({args_sql})")
        }
    }

    /// Snowflake matches union legs by column name rather than position.
    fn compile_union_all(&self, legs: &[String]) -> String {
        legs.join("\nUNION ALL BY NAME\n")
    }

    fn current_date_sql(&self) -> String {
        "CURRENT_DATE()".to_string()
    }

    fn date_add_sql(&self, date_sql: &str, unit: &str, count: i64) -> Result<String> {
        Ok(format!("DATEADD('{}', {count}, {date_sql})", unit.to_lowercase()))
    }
}
