//! PostgreSQL dialect -- strict GROUP BY, `date_trunc`, ILIKE.

use super::{Dialect, DialectCapabilities};
use crate::error::Result;
use crate::model::TimeGrain;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            supports_arrays: true,
            supports_ilike: true,
            ..Default::default()
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn format_table_ref(&self, _database: Option<&str>, schema: Option<&str>, code: &str) -> String {
        match schema {
            Some(s) => format!("{s}.{code}"),
            None => code.to_string(),
        }
    }

    fn render_time_grain(&self, column_sql: &str, grain: TimeGrain) -> String {
        format!("date_trunc('{}', {column_sql})", grain.as_str())
    }

    fn render_string_contains(&self, column_sql: &str, pattern_sql: &str) -> String {
        format!("({column_sql} ILIKE ('%' || {pattern_sql} || '%'))")
    }

    fn compile_median(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("PERCENTILE_DISC(0.5) WITHIN GROUP (ORDER BY {arg_sql})"))
    }

    fn compile_mode(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("MODE() WITHIN GROUP (ORDER BY {arg_sql})"))
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
        let mut inner = format!("{distinct_sql}{arg_sql}, '{sep}'");
        if let Some((ob_sql, desc)) = order_by {
            let dir = if desc { "DESC" } else { "ASC" };
            inner.push_str(&format!(" ORDER BY {ob_sql} {dir}"));
        }
        Ok(format!("STRING_AGG({inner})"))
    }

    fn current_date_sql(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn date_add_sql(&self, date_sql: &str, unit: &str, count: i64) -> Result<String> {
        Ok(format!("{date_sql} + INTERVAL '{count} {unit}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_with_doubled_inner_quotes() {
        let d = PostgresDialect;
        assert_eq!(d.quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn two_part_table_ref_drops_database() {
        let d = PostgresDialect;
        assert_eq!(d.format_table_ref(Some("db"), Some("public"), "orders"), "public.orders");
    }

    #[test]
    fn time_grain_uses_date_trunc() {
        let d = PostgresDialect;
        assert_eq!(d.render_time_grain("\"created_at\"", TimeGrain::Month), "date_trunc('month', \"created_at\")");
    }
}
