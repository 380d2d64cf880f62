//! SQL dialect abstractions: a capability-gated trait per backend plus a
//! structural renderer that walks the dialect-agnostic [`Select`] tree built
//! by the planners.
//!
//! Dialects only override the pieces that actually differ across backends
//! (identifier quoting, table qualification, time-grain truncation,
//! median/mode/listagg compilation, relative-date arithmetic). Everything
//! else -- the shape of `SELECT`/`FROM`/`JOIN`/`WHERE`/`GROUP BY`/`ORDER BY`,
//! operator precedence, literal escaping -- is rendered once here and shared.

use std::collections::HashSet;

use crate::ast::{
    BinOp, Cte, CteBody, Expr, From, FromSource, Join, JoinKind, Literal, OrderByItem, Select,
    UnOp, UnionAll,
};
use crate::error::{ObmlError, Result};
use crate::model::{SemanticModel, TimeGrain};

pub mod clickhouse;
pub mod databricks;
pub mod dremio;
pub mod postgres;
pub mod snowflake;

pub use clickhouse::ClickHouseDialect;
pub use databricks::DatabricksDialect;
pub use dremio::DremioDialect;
pub use postgres::PostgresDialect;
pub use snowflake::SnowflakeDialect;

/// Flags describing what SQL features a dialect supports. Not all of these
/// are consulted by the renderer today (`supports_qualify`/`supports_time_travel`/
/// `supports_semi_structured` describe surface area OBML doesn't yet compile
/// into) but they're part of the dialect's documented contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    pub supports_cte: bool,
    pub supports_qualify: bool,
    pub supports_arrays: bool,
    pub supports_window_filters: bool,
    pub supports_ilike: bool,
    pub supports_time_travel: bool,
    pub supports_semi_structured: bool,
}

impl Default for DialectCapabilities {
    fn default() -> Self {
        DialectCapabilities {
            supports_cte: true,
            supports_qualify: false,
            supports_arrays: false,
            supports_window_filters: false,
            supports_ilike: false,
            supports_time_travel: false,
            supports_semi_structured: false,
        }
    }
}

/// Per-backend SQL rendering rules. Default methods implement the lowest
/// common denominator (ANSI-ish SQL); a dialect overrides only where its
/// engine disagrees.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> DialectCapabilities;

    fn quote_identifier(&self, name: &str) -> String;

    /// Qualify a physical table reference. OBML's `database`/`schema`/`code`
    /// triple collapses to two or three parts depending on the backend.
    fn format_table_ref(&self, database: Option<&str>, schema: Option<&str>, code: &str) -> String {
        let mut parts = Vec::new();
        if let Some(d) = database {
            parts.push(d.to_string());
        }
        if let Some(s) = schema {
            parts.push(s.to_string());
        }
        parts.push(code.to_string());
        parts.join(".")
    }

    /// Wrap an already-rendered column expression to truncate it to `grain`.
    fn render_time_grain(&self, column_sql: &str, grain: TimeGrain) -> String;

    fn render_cast(&self, expr_sql: &str, target_type: &str) -> String {
        format!("CAST({expr_sql} AS {target_type})")
    }

    /// Render a `column CONTAINS pattern`-style predicate used by the
    /// `contains`/`startsWith`/`endsWith` filter operators.
    fn render_string_contains(&self, column_sql: &str, pattern_sql: &str) -> String {
        format!("({column_sql} LIKE ('%' || {pattern_sql} || '%'))")
    }

    fn current_date_sql(&self) -> String;
    fn date_add_sql(&self, date_sql: &str, unit: &str, count: i64) -> Result<String>;

    /// COUNT over more than one field. Most engines don't accept multiple
    /// arguments to COUNT, so the portable default concatenates them;
    /// Snowflake overrides this with native multi-arg `COUNT(a, b)`.
    fn compile_multi_field_count(&self, arg_sqls: &[String], distinct: bool) -> String {
        let parts: Vec<String> = arg_sqls
            .iter()
            .map(|a| format!("CAST({a} AS VARCHAR)"))
            .collect();
        let concat = parts.join(" || '|' || ");
        if distinct {
            format!("COUNT(DISTINCT {concat})")
        } else {
            format!("COUNT({concat})")
        }
    }

    fn compile_median(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("MEDIAN({arg_sql})"))
    }

    fn compile_mode(&self, arg_sql: &str) -> Result<String> {
        Ok(format!("MODE() WITHIN GROUP (ORDER BY {arg_sql})"))
    }

    fn compile_any_value(&self, arg_sql: &str) -> String {
        format!("ANY_VALUE({arg_sql})")
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

    /// Join multiple already-rendered `SELECT`s with `UNION ALL`. Snowflake
    /// overrides this with `UNION ALL BY NAME`.
    fn compile_union_all(&self, legs: &[String]) -> String {
        legs.join("\nUNION ALL\n")
    }
}

fn bin_op_sql(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Eq => "=",
        BinOp::Neq => "<>",
        BinOp::Gt => ">",
        BinOp::Gte => ">=",
        BinOp::Lt => "<",
        BinOp::Lte => "<=",
        BinOp::Like => "LIKE",
        BinOp::ILike => "ILIKE",
        BinOp::Concat => "||",
    }
}

/// Walks a dialect-agnostic [`Select`]/[`Expr`] tree and renders it to a SQL
/// string for one target `Dialect`, resolving `FromSource::Table` names
/// against the semantic model's data objects (CTE names fall through as
/// bare identifiers).
pub struct Renderer<'a> {
    dialect: &'a dyn Dialect,
    model: &'a SemanticModel,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn Dialect, model: &'a SemanticModel) -> Self {
        Renderer { dialect, model }
    }

    pub fn render(&self, select: &Select) -> Result<String> {
        self.render_select(select, &HashSet::new())
    }

    fn render_select(&self, node: &Select, outer_ctes: &HashSet<String>) -> Result<String> {
        let mut ctes = outer_ctes.clone();
        for cte in &node.ctes {
            ctes.insert(cte.name.clone());
        }

        let mut parts: Vec<String> = Vec::new();

        if !node.ctes.is_empty() {
            let mut cte_parts = Vec::new();
            for cte in &node.ctes {
                let body_sql = match &cte.query {
                    CteBody::Select(s) => self.render_select(s, &ctes)?,
                    CteBody::UnionAll(u) => self.render_union_all(u, &ctes)?,
                };
                cte_parts.push(format!(
                    "{} AS (\n{}\n)",
                    self.dialect.quote_identifier(&cte.name),
                    body_sql
                ));
            }
            parts.push(format!("WITH {}", cte_parts.join(",\n")));
        }

        if node.columns.is_empty() {
            parts.push("SELECT *".to_string());
        } else {
            let cols = node
                .columns
                .iter()
                .map(|c| self.render_expr(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            parts.push(format!("SELECT {cols}"));
        }

        if let Some(from) = &node.from {
            parts.push(format!("FROM {}", self.render_from(from, &ctes)?));
        }

        for join in &node.joins {
            parts.push(self.render_join(join, &ctes)?);
        }

        if !node.where_.is_empty() {
            let conj = self.render_conjunction(&node.where_)?;
            parts.push(format!("WHERE {conj}"));
        }

        if !node.group_by.is_empty() {
            let groups = node
                .group_by
                .iter()
                .map(|g| self.render_expr(g))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            parts.push(format!("GROUP BY {groups}"));
        }

        if !node.having.is_empty() {
            let conj = self.render_conjunction(&node.having)?;
            parts.push(format!("HAVING {conj}"));
        }

        if !node.order_by.is_empty() {
            let orders = node
                .order_by
                .iter()
                .map(|o| self.render_order_by(o))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            parts.push(format!("ORDER BY {orders}"));
        }

        if let Some(limit) = node.limit {
            parts.push(format!("LIMIT {limit}"));
        }
        if let Some(offset) = node.offset {
            parts.push(format!("OFFSET {offset}"));
        }

        Ok(parts.join("\n"))
    }

    fn render_conjunction(&self, exprs: &[Expr]) -> Result<String> {
        let rendered = exprs
            .iter()
            .map(|e| self.render_expr(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join(" AND "))
    }

    fn render_union_all(&self, node: &UnionAll, outer_ctes: &HashSet<String>) -> Result<String> {
        let legs = node
            .queries
            .iter()
            .map(|q| self.render_select(q, outer_ctes))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.dialect.compile_union_all(&legs))
    }

    fn render_table_name(&self, name: &str, ctes: &HashSet<String>) -> String {
        if ctes.contains(name) {
            return self.dialect.quote_identifier(name);
        }
        match self.model.data_objects.get(name) {
            Some(obj) => self.dialect.format_table_ref(
                obj.database.as_deref(),
                obj.schema.as_deref(),
                &obj.code,
            ),
            None => self.dialect.quote_identifier(name),
        }
    }

    fn render_from_source(&self, source: &FromSource, ctes: &HashSet<String>) -> Result<String> {
        match source {
            FromSource::Table(name) => Ok(self.render_table_name(name, ctes)),
            FromSource::Subquery(select) => {
                Ok(format!("(\n{}\n)", self.render_select(select, ctes)?))
            }
        }
    }

    fn render_from(&self, node: &From, ctes: &HashSet<String>) -> Result<String> {
        let mut sql = self.render_from_source(&node.source, ctes)?;
        if let Some(alias) = &node.alias {
            sql.push_str(&format!(" AS {}", self.dialect.quote_identifier(alias)));
        }
        Ok(sql)
    }

    fn render_join(&self, node: &Join, ctes: &HashSet<String>) -> Result<String> {
        let mut source = self.render_from_source(&node.source, ctes)?;
        if let Some(alias) = &node.alias {
            source.push_str(&format!(" AS {}", self.dialect.quote_identifier(alias)));
        }
        let kw = match node.join_type {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        };
        let on_sql = self.render_expr(&node.on)?;
        Ok(format!("{kw} JOIN {source} ON {on_sql}"))
    }

    fn render_order_by(&self, node: &OrderByItem) -> Result<String> {
        let mut sql = self.render_expr(&node.expr)?;
        sql.push_str(if node.desc { " DESC" } else { " ASC" });
        if node.nulls_last {
            sql.push_str(" NULLS LAST");
        }
        Ok(sql)
    }

    fn render_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(true) => "TRUE".to_string(),
            Literal::Bool(false) => "FALSE".to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn render_expr(&self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Literal(lit) => Ok(self.render_literal(lit)),
            Expr::Star => Ok("*".to_string()),
            Expr::ColumnRef { table: None, name } => Ok(self.dialect.quote_identifier(name)),
            Expr::ColumnRef { table: Some(t), name } => Ok(format!(
                "{}.{}",
                self.dialect.quote_identifier(t),
                self.dialect.quote_identifier(name)
            )),
            Expr::AliasedExpr { expr, alias } => Ok(format!(
                "{} AS {}",
                self.render_expr(expr)?,
                self.dialect.quote_identifier(alias)
            )),
            Expr::FunctionCall {
                agg,
                args,
                distinct,
                order_by,
                separator,
            } => self.render_function_call(*agg, args, *distinct, order_by.as_deref(), separator.as_deref()),
            Expr::BinaryOp { op, left, right } => Ok(format!(
                "({} {} {})",
                self.render_expr(left)?,
                bin_op_sql(*op),
                self.render_expr(right)?
            )),
            Expr::UnaryOp { op, expr } => {
                let kw = match op {
                    UnOp::Neg => "-",
                    UnOp::Not => "NOT",
                };
                Ok(format!("({kw} {})", self.render_expr(expr)?))
            }
            Expr::IsNull { expr, negated } => {
                let kw = if *negated { "IS NOT NULL" } else { "IS NULL" };
                Ok(format!("({} {kw})", self.render_expr(expr)?))
            }
            Expr::InList { expr, list, negated } => {
                let vals = list
                    .iter()
                    .map(|v| self.render_expr(v))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ");
                let kw = if *negated { "NOT IN" } else { "IN" };
                Ok(format!("({} {kw} ({vals}))", self.render_expr(expr)?))
            }
            Expr::CaseExpr { branches, else_expr } => {
                let mut sql = String::from("CASE");
                for (when, then) in branches {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.render_expr(when)?,
                        self.render_expr(then)?
                    ));
                }
                if let Some(e) = else_expr {
                    sql.push_str(&format!(" ELSE {}", self.render_expr(e)?));
                }
                sql.push_str(" END");
                Ok(sql)
            }
            Expr::Cast { expr, data_type } => {
                Ok(self.dialect.render_cast(&self.render_expr(expr)?, data_type))
            }
            Expr::SubqueryExpr { query } => {
                Ok(format!("(\n{}\n)", self.render_select(query, &HashSet::new())?))
            }
            Expr::RawSql(sql) => Ok(sql.clone()),
            Expr::Between { expr, low, high, negated } => {
                let kw = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                Ok(format!(
                    "({} {kw} {} AND {})",
                    self.render_expr(expr)?,
                    self.render_expr(low)?,
                    self.render_expr(high)?
                ))
            }
            Expr::RelativeDateRange {
                column,
                unit,
                count,
                future,
                include_current,
            } => self.render_relative_date_range(column, *unit, *count, *future, *include_current),
            Expr::WindowFunction {
                agg,
                args,
                distinct,
                partition_by,
                order_by,
            } => self.render_window_function(*agg, args, *distinct, partition_by, order_by),
            Expr::TimeGrain { column, grain } => {
                let col_sql = self.render_expr(column)?;
                Ok(self.dialect.render_time_grain(&col_sql, *grain))
            }
            Expr::Call { name, args } if name == crate::query_resolver::STRING_CONTAINS_FN => {
                let column_sql = self.render_expr(&args[0])?;
                let pattern_sql = self.render_expr(&args[1])?;
                Ok(self.dialect.render_string_contains(&column_sql, &pattern_sql))
            }
            Expr::Call { name, args } => {
                let args_sql = args
                    .iter()
                    .map(|a| self.render_expr(a))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ");
                Ok(format!("{name}({args_sql})"))
            }
        }
    }

    fn render_function_call(
        &self,
        agg: crate::model::AggregationType,
        args: &[Expr],
        distinct: bool,
        order_by: Option<&(Box<Expr>, bool)>,
        separator: Option<&str>,
    ) -> Result<String> {
        use crate::model::AggregationType::*;

        if matches!(agg, Count) && args.len() > 1 {
            let args_sql = args
                .iter()
                .map(|a| self.render_expr(a))
                .collect::<Result<Vec<_>>>()?;
            return Ok(self.dialect.compile_multi_field_count(&args_sql, distinct));
        }

        let arg_sql = match args.first() {
            Some(a) => self.render_expr(a)?,
            None => "*".to_string(),
        };

        match agg {
            Sum => Ok(format!("SUM({arg_sql})")),
            Count => {
                if distinct {
                    Ok(format!("COUNT(DISTINCT {arg_sql})"))
                } else {
                    Ok(format!("COUNT({arg_sql})"))
                }
            }
            CountDistinct => Ok(format!("COUNT(DISTINCT {arg_sql})")),
            Min => Ok(format!("MIN({arg_sql})")),
            Max => Ok(format!("MAX({arg_sql})")),
            Avg => Ok(format!("AVG({arg_sql})")),
            Median => self.dialect.compile_median(&arg_sql),
            Mode => self.dialect.compile_mode(&arg_sql),
            AnyValue => Ok(self.dialect.compile_any_value(&arg_sql)),
            ListAgg => {
                let ob = match order_by {
                    Some((expr, desc)) => Some((self.render_expr(expr)?, *desc)),
                    None => None,
                };
                self.dialect.compile_listagg(
                    &arg_sql,
                    distinct,
                    ob.as_ref().map(|(s, d)| (s.as_str(), *d)),
                    separator,
                )
            }
        }
    }

    fn render_window_function(
        &self,
        agg: crate::model::AggregationType,
        args: &[Expr],
        distinct: bool,
        partition_by: &[Expr],
        order_by: &[OrderByItem],
    ) -> Result<String> {
        let func_sql = self.render_function_call(agg, args, distinct, None, None)?;
        let mut over_parts = Vec::new();
        if !partition_by.is_empty() {
            let pb = partition_by
                .iter()
                .map(|p| self.render_expr(p))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            over_parts.push(format!("PARTITION BY {pb}"));
        }
        if !order_by.is_empty() {
            let ob = order_by
                .iter()
                .map(|o| self.render_order_by(o))
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            over_parts.push(format!("ORDER BY {ob}"));
        }
        Ok(format!("{func_sql} OVER ({})", over_parts.join(" ")))
    }

    fn render_relative_date_range(
        &self,
        column: &Expr,
        unit: crate::ast::DateUnit,
        count: i64,
        future: bool,
        include_current: bool,
    ) -> Result<String> {
        let col_sql = self.render_expr(column)?;
        let base = self.dialect.current_date_sql();
        let unit_str = match unit {
            crate::ast::DateUnit::Day => "day",
            crate::ast::DateUnit::Week => "week",
            crate::ast::DateUnit::Month => "month",
            crate::ast::DateUnit::Year => "year",
        };

        let (start, end) = if future {
            let start = if include_current {
                base.clone()
            } else {
                self.dialect.date_add_sql(&base, "day", 1)?
            };
            let end = self.dialect.date_add_sql(&start, unit_str, count)?;
            (start, end)
        } else {
            let end = if include_current {
                self.dialect.date_add_sql(&base, "day", 1)?
            } else {
                base.clone()
            };
            let start = self.dialect.date_add_sql(&end, unit_str, -count)?;
            (start, end)
        };

        Ok(format!("({col_sql} >= {start} AND {col_sql} < {end})"))
    }
}

/// Look up a dialect implementation by its registered name.
pub fn resolve(name: &str) -> Result<Box<dyn Dialect>> {
    match name {
        "postgres" => Ok(Box::new(PostgresDialect)),
        "snowflake" => Ok(Box::new(SnowflakeDialect)),
        "clickhouse" => Ok(Box::new(ClickHouseDialect)),
        "databricks" => Ok(Box::new(DatabricksDialect)),
        "dremio" => Ok(Box::new(DremioDialect)),
        other => Err(ObmlError::Dialect(format!(
            "unsupported dialect '{other}'. available: clickhouse, databricks, dremio, postgres, snowflake"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expr, From, FromSource, Select};
    use crate::model::{DataObject, DataObjectColumn, DataType};
    use std::collections::BTreeMap;

    fn model_with_orders() -> SemanticModel {
        let mut data_objects = BTreeMap::new();
        data_objects.insert(
            "Orders".to_string(),
            DataObject {
                database: Some("analytics".to_string()),
                schema: Some("public".to_string()),
                code: "orders".to_string(),
                columns: vec![DataObjectColumn {
                    name: "amount".into(),
                    data_type: DataType::Decimal,
                    description: None,
                }],
                joins: vec![],
            },
        );
        SemanticModel { data_objects, ..Default::default() }
    }

    #[test]
    fn postgres_uses_two_part_table_ref() {
        let model = model_with_orders();
        let dialect = PostgresDialect;
        let mut select = Select::default();
        select.columns.push(Expr::qualified_col("Orders", "amount").aliased("amount"));
        select.from = Some(From {
            source: FromSource::Table("Orders".to_string()),
            alias: Some("Orders".to_string()),
        });
        let sql = Renderer::new(&dialect, &model).render(&select).unwrap();
        assert!(sql.contains("FROM public.orders AS \"Orders\""));
    }

    #[test]
    fn snowflake_uses_three_part_table_ref() {
        let model = model_with_orders();
        let dialect = SnowflakeDialect;
        let mut select = Select::default();
        select.from = Some(From {
            source: FromSource::Table("Orders".to_string()),
            alias: Some("Orders".to_string()),
        });
        let sql = Renderer::new(&dialect, &model).render(&select).unwrap();
        assert!(sql.contains("FROM analytics.public.orders"));
    }

    #[test]
    fn cte_name_is_not_table_qualified() {
        let model = model_with_orders();
        let dialect = PostgresDialect;
        let base_select = Select::default();
        let mut outer = Select::default();
        outer.ctes.push(Cte { name: "base".to_string(), query: CteBody::Select(base_select) });
        outer.from = Some(From { source: FromSource::Table("base".to_string()), alias: None });
        let sql = Renderer::new(&dialect, &model).render(&outer).unwrap();
        assert!(sql.contains("FROM \"base\""));
        assert!(!sql.contains("public.base"));
    }

    #[test]
    fn binary_op_renders_parenthesized() {
        let model = SemanticModel::default();
        let dialect = PostgresDialect;
        let expr = Expr::BinaryOp {
            op: BinOp::Gt,
            left: Box::new(Expr::col("amount")),
            right: Box::new(Expr::Literal(Literal::Int(10))),
        };
        let sql = Renderer::new(&dialect, &model).render_expr(&expr).unwrap();
        assert_eq!(sql, "(\"amount\" > 10)");
    }

    #[test]
    fn string_contains_call_dispatches_per_dialect() {
        let model = SemanticModel::default();
        let contains = Expr::Call {
            name: crate::query_resolver::STRING_CONTAINS_FN.to_string(),
            args: vec![Expr::col("name"), Expr::Literal(Literal::Str("abc".to_string()))],
        };

        let postgres = Renderer::new(&PostgresDialect, &model).render_expr(&contains).unwrap();
        assert!(postgres.contains("ILIKE"));

        let snowflake = Renderer::new(&SnowflakeDialect, &model).render_expr(&contains).unwrap();
        assert!(snowflake.starts_with("CONTAINS("));
    }
}
