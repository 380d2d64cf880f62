//! Dremio dialect -- reduced function surface, no MODE aggregation.

use super::{Dialect, DialectCapabilities};
use crate::error::{ObmlError, Result};
use crate::model::TimeGrain;

#[derive(Debug, Default, Clone, Copy)]
pub struct DremioDialect;

impl Dialect for DremioDialect {
    fn name(&self) -> &'static str {
        "dremio"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities::default()
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn render_time_grain(&self, column_sql: &str, grain: TimeGrain) -> String {
        format!("DATE_TRUNC('{}', {column_sql})", grain.as_str())
    }

    fn render_string_contains(&self, column_sql: &str, pattern_sql: &str) -> String {
        format!("(LOWER({column_sql}) LIKE ('%' || LOWER({pattern_sql}) || '%'))")
    }

    fn compile_mode(&self, _arg_sql: &str) -> Result<String> {
        Err(ObmlError::Dialect("Dremio does not support MODE aggregation".to_string()))
    }

    fn current_date_sql(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn date_add_sql(&self, date_sql: &str, unit: &str, count: i64) -> Result<String> {
        Ok(format!("DATE_ADD({date_sql}, INTERVAL '{count}' {})", unit.to_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_part_table_ref_by_default() {
        let d = DremioDialect;
        assert_eq!(d.format_table_ref(Some("space"), Some("folder"), "orders"), "space.folder.orders");
    }

    #[test]
    fn mode_is_unsupported() {
        let d = DremioDialect;
        assert!(d.compile_mode("x").is_err());
    }
}
