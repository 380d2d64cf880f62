//! ClickHouse dialect -- custom date functions, array-based aggregations.

use super::{Dialect, DialectCapabilities};
use crate::error::{ObmlError, Result};
use crate::model::TimeGrain;

fn grain_function(grain: TimeGrain) -> &'static str {
    match grain {
        TimeGrain::Year => "toStartOfYear",
        TimeGrain::Quarter => "toStartOfQuarter",
        TimeGrain::Month => "toStartOfMonth",
        TimeGrain::Week => "toMonday",
        TimeGrain::Day => "toDate",
        TimeGrain::Hour => "toStartOfHour",
        TimeGrain::Minute => "toStartOfMinute",
        TimeGrain::Second => "toStartOfSecond",
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClickHouseDialect;

impl Dialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
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

    /// ClickHouse: two-part `schema.code` -- OBML's `schema` maps to a
    /// ClickHouse database.
    fn format_table_ref(&self, _database: Option<&str>, schema: Option<&str>, code: &str) -> String {
        match schema {
            Some(s) => format!("{s}.{code}"),
            None => code.to_string(),
        }
    }

    fn render_time_grain(&self, column_sql: &str, grain: TimeGrain) -> String {
        format!("{}({column_sql})", grain_function(grain))
    }

    fn render_cast(&self, expr_sql: &str, target_type: &str) -> String {
        let func = match target_type.to_uppercase().as_str() {
            "INT" | "INTEGER" => Some("toInt64"),
            "FLOAT" => Some("toFloat64"),
            "STRING" => Some("toString"),
            "DATE" => Some("toDate"),
            _ => None,
        };
        match func {
            Some(f) => format!("{f}({expr_sql})"),
            None => format!("CAST({expr_sql} AS {target_type})"),
        }
    }

    fn render_string_contains(&self, column_sql: &str, pattern_sql: &str) -> String {
        format!("({column_sql} ILIKE ('%' || {pattern_sql} || '%'))")
    }

    fn compile_median(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("quantile(0.5)({arg_sql})"))
    }

    fn compile_mode(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("topK(1)({arg_sql})[1]"))
    }

    fn compile_any_value(&self, arg_sql: &str) -> String {
        format!("any({arg_sql})")
    }

    /// ClickHouse has no `ORDER BY` inside aggregate functions; only
    /// self-ordering (sorting the aggregated column itself) is supported,
    /// via `arraySort`/`arrayReverseSort`. Ordering by a different column
    /// is rejected rather than silently ignored.
    fn compile_listagg(
        &self,
        arg_sql: &str,
        distinct: bool,
        order_by: Option<(&str, bool)>,
        separator: Option<&str>,
    ) -> Result<String> {
        let sep = separator.unwrap_or(",").replace('\'', "''");
        let group_fn = if distinct { "groupUniqArray" } else { "groupArray" };
        let mut inner = format!("{group_fn}({arg_sql})");
        if let Some((ob_sql, desc)) = order_by {
            if ob_sql != arg_sql {
                return Err(ObmlError::Dialect(format!(
                    "ClickHouse LISTAGG does not support ORDER BY on a different column (aggregated: {arg_sql}, order by: {ob_sql})"
                )));
            }
            let sort_fn = if desc { "arrayReverseSort" } else { "arraySort" };
            inner = format!("{sort_fn}({inner})");
        }
        Ok(format!("arrayStringConcat({inner}, '{sep}')"))
    }

    fn current_date_sql(&self) -> String {
        "today()".to_string()
    }

    fn date_add_sql(&self, date_sql: &str, unit: &str, count: i64) -> Result<String> {
        let func = match unit {
            "day" => "addDays",
            "week" => "addWeeks",
            "month" => "addMonths",
            "year" => "addYears",
            other => {
                return Err(ObmlError::Dialect(format!(
                    "unsupported unit '{other}' for ClickHouse date arithmetic"
                )))
            }
        };
        Ok(format!("{func}({date_sql}, {count})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_part_table_ref() {
        let d = ClickHouseDialect;
        assert_eq!(d.format_table_ref(Some("db"), Some("analytics"), "events"), "analytics.events");
    }

    #[test]
    fn median_uses_quantile() {
        let d = ClickHouseDialect;
        assert_eq!(d.compile_median("\"amount\"").unwrap(), "quantile(0.5)(\"amount\")");
    }

    #[test]
    fn mode_uses_topk() {
        let d = ClickHouseDialect;
        assert_eq!(d.compile_mode("\"status\"").unwrap(), "topK(1)(\"status\")[1]");
    }

    #[test]
    fn listagg_rejects_cross_column_order() {
        let d = ClickHouseDialect;
        let err = d.compile_listagg("\"a\"", false, Some(("\"b\"", false)), None);
        assert!(err.is_err());
    }

    #[test]
    fn any_value_maps_to_any() {
        let d = ClickHouseDialect;
        assert_eq!(d.compile_any_value("\"x\""), "any(\"x\")");
    }
}
