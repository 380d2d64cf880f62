//! The dialect-agnostic SQL AST every planner stage builds and every dialect
//! renderer walks. Nodes are immutable once built -- there is no in-place
//! mutation API, only construction and substitution-via-rebuild.

use std::collections::BTreeMap;

use crate::model::{AggregationType, TimeGrain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The full set of expression node kinds the planners and the dialect
/// renderer agree on.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Star,
    ColumnRef {
        table: Option<String>,
        name: String,
    },
    AliasedExpr {
        expr: Box<Expr>,
        alias: String,
    },
    FunctionCall {
        agg: AggregationType,
        args: Vec<Expr>,
        distinct: bool,
        /// Present only for LISTAGG-style measures; the ordering key and
        /// separator live alongside the aggregation rather than as args.
        order_by: Option<(Box<Expr>, bool)>,
        separator: Option<String>,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnOp,
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    CaseExpr {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        data_type: String,
    },
    SubqueryExpr {
        query: Box<Select>,
    },
    RawSql(String),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    RelativeDateRange {
        column: Box<Expr>,
        unit: DateUnit,
        count: i64,
        /// "past" counts backward from the anchor, "future" forward.
        future: bool,
        include_current: bool,
    },
    WindowFunction {
        agg: AggregationType,
        args: Vec<Expr>,
        distinct: bool,
        /// Partition/order are empty for the total-wrapper's bare `OVER()`.
        partition_by: Vec<Expr>,
        order_by: Vec<OrderByItem>,
    },
    /// A dimension column truncated to a reporting grain. Left dialect-agnostic
    /// at planning time since the truncation function (`date_trunc`,
    /// `toStartOfMonth`, ...) differs per dialect.
    TimeGrain {
        column: Box<Expr>,
        grain: TimeGrain,
    },
    /// A named, free-form SQL function call for dialect-specific rendering
    /// paths (string-contains wrappers, cast helpers) that don't fit the
    /// aggregation-typed `FunctionCall` above.
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn null() -> Expr {
        Expr::Literal(Literal::Null)
    }

    pub fn col(name: impl Into<String>) -> Expr {
        Expr::ColumnRef {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified_col(table: impl Into<String>, name: impl Into<String>) -> Expr {
        Expr::ColumnRef {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn aliased(self, alias: impl Into<String>) -> Expr {
        Expr::AliasedExpr {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Recursively substitute every bare (unqualified) `ColumnRef` matching
    /// `name` with `replacement`. Used to inline metric component
    /// placeholders produced by the query resolver's formula parser.
    pub fn substitute(&self, name: &str, replacement: &Expr) -> Expr {
        match self {
            Expr::ColumnRef { table: None, name: n } if n == name => replacement.clone(),
            Expr::AliasedExpr { expr, alias } => Expr::AliasedExpr {
                expr: Box::new(expr.substitute(name, replacement)),
                alias: alias.clone(),
            },
            Expr::FunctionCall {
                agg,
                args,
                distinct,
                order_by,
                separator,
            } => Expr::FunctionCall {
                agg: *agg,
                args: args.iter().map(|a| a.substitute(name, replacement)).collect(),
                distinct: *distinct,
                order_by: order_by
                    .as_ref()
                    .map(|(e, d)| (Box::new(e.substitute(name, replacement)), *d)),
                separator: separator.clone(),
            },
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.substitute(name, replacement)),
                right: Box::new(right.substitute(name, replacement)),
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op: *op,
                expr: Box::new(expr.substitute(name, replacement)),
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.substitute(name, replacement)),
                negated: *negated,
            },
            Expr::InList { expr, list, negated } => Expr::InList {
                expr: Box::new(expr.substitute(name, replacement)),
                list: list.iter().map(|e| e.substitute(name, replacement)).collect(),
                negated: *negated,
            },
            Expr::CaseExpr { branches, else_expr } => Expr::CaseExpr {
                branches: branches
                    .iter()
                    .map(|(w, t)| (w.substitute(name, replacement), t.substitute(name, replacement)))
                    .collect(),
                else_expr: else_expr
                    .as_ref()
                    .map(|e| Box::new(e.substitute(name, replacement))),
            },
            Expr::Cast { expr, data_type } => Expr::Cast {
                expr: Box::new(expr.substitute(name, replacement)),
                data_type: data_type.clone(),
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(expr.substitute(name, replacement)),
                low: Box::new(low.substitute(name, replacement)),
                high: Box::new(high.substitute(name, replacement)),
                negated: *negated,
            },
            Expr::WindowFunction {
                agg,
                args,
                distinct,
                partition_by,
                order_by,
            } => Expr::WindowFunction {
                agg: *agg,
                args: args.iter().map(|a| a.substitute(name, replacement)).collect(),
                distinct: *distinct,
                partition_by: partition_by.iter().map(|a| a.substitute(name, replacement)).collect(),
                order_by: order_by.clone(),
            },
            Expr::TimeGrain { column, grain } => Expr::TimeGrain {
                column: Box::new(column.substitute(name, replacement)),
                grain: *grain,
            },
            Expr::Call { name: fname, args } => Expr::Call {
                name: fname.clone(),
                args: args.iter().map(|a| a.substitute(name, replacement)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Recursively drop the table qualifier from every `ColumnRef` in this
    /// expression. Used when an expression built against the underlying
    /// per-leg tables (e.g. a query's `ORDER BY`) is relocated to sit on top
    /// of a CTE, whose columns are unqualified aliases.
    pub fn strip_table_qualifiers(&self) -> Expr {
        match self {
            Expr::ColumnRef { name, .. } => Expr::col(name.clone()),
            Expr::AliasedExpr { expr, alias } => Expr::AliasedExpr {
                expr: Box::new(expr.strip_table_qualifiers()),
                alias: alias.clone(),
            },
            Expr::FunctionCall {
                agg,
                args,
                distinct,
                order_by,
                separator,
            } => Expr::FunctionCall {
                agg: *agg,
                args: args.iter().map(Expr::strip_table_qualifiers).collect(),
                distinct: *distinct,
                order_by: order_by
                    .as_ref()
                    .map(|(e, d)| (Box::new(e.strip_table_qualifiers()), *d)),
                separator: separator.clone(),
            },
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.strip_table_qualifiers()),
                right: Box::new(right.strip_table_qualifiers()),
            },
            Expr::UnaryOp { op, expr } => Expr::UnaryOp {
                op: *op,
                expr: Box::new(expr.strip_table_qualifiers()),
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.strip_table_qualifiers()),
                negated: *negated,
            },
            Expr::InList { expr, list, negated } => Expr::InList {
                expr: Box::new(expr.strip_table_qualifiers()),
                list: list.iter().map(Expr::strip_table_qualifiers).collect(),
                negated: *negated,
            },
            Expr::CaseExpr { branches, else_expr } => Expr::CaseExpr {
                branches: branches
                    .iter()
                    .map(|(w, t)| (w.strip_table_qualifiers(), t.strip_table_qualifiers()))
                    .collect(),
                else_expr: else_expr.as_ref().map(|e| Box::new(e.strip_table_qualifiers())),
            },
            Expr::Cast { expr, data_type } => Expr::Cast {
                expr: Box::new(expr.strip_table_qualifiers()),
                data_type: data_type.clone(),
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(expr.strip_table_qualifiers()),
                low: Box::new(low.strip_table_qualifiers()),
                high: Box::new(high.strip_table_qualifiers()),
                negated: *negated,
            },
            Expr::WindowFunction {
                agg,
                args,
                distinct,
                partition_by,
                order_by,
            } => Expr::WindowFunction {
                agg: *agg,
                args: args.iter().map(Expr::strip_table_qualifiers).collect(),
                distinct: *distinct,
                partition_by: partition_by.iter().map(Expr::strip_table_qualifiers).collect(),
                order_by: order_by.clone(),
            },
            Expr::TimeGrain { column, grain } => Expr::TimeGrain {
                column: Box::new(column.strip_table_qualifiers()),
                grain: *grain,
            },
            Expr::Call { name, args } => Expr::Call {
                name: name.clone(),
                args: args.iter().map(Expr::strip_table_qualifiers).collect(),
            },
            other => other.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub desc: bool,
    pub nulls_last: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Table(String),
    Subquery(Box<Select>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct From {
    pub source: FromSource,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinKind,
    pub source: FromSource,
    pub alias: Option<String>,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CteBody {
    Select(Select),
    UnionAll(UnionAll),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: CteBody,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub ctes: Vec<Cte>,
    pub columns: Vec<Expr>,
    pub from: Option<From>,
    pub joins: Vec<Join>,
    pub where_: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionAll {
    pub queries: Vec<Select>,
}

/// A tiny helper some planner stages use to pass extra per-field NULL-padded
/// helper columns (the CFL planner's multi-field `{measure}__f{i}` columns)
/// alongside a measure without threading a third parallel Vec everywhere.
pub type HelperColumns = BTreeMap<String, Expr>;
