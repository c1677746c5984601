//! Filter predicate expressions for scan resolution.
//!
//! Expressions are used for:
//! - the partition filter string handed to the metastore
//! - local partition pruning against typed partition values
//! - bucket resolution from cluster-key equalities
//! - the prewhere / where split handed back to the caller
//!
//! Columns are referenced by name. Hive column names are case-insensitive but
//! the metastore reports them lower-cased, so names are compared verbatim.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// Equal to (=)
    Eq,
    /// Not equal to (!=)
    NotEq,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    LtEq,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    GtEq,
}

impl ComparisonOp {
    /// Operator with its operands swapped (`a < b` == `b > a`).
    pub fn flip(&self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::NotEq => Self::NotEq,
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
        }
    }

    fn holds(&self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::NotEq => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::LtEq => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::GtEq => ord != Ordering::Less,
        }
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
        }
    }
}

/// Literal values for comparisons and typed partition values.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    /// Date: days since 1970-01-01
    Date(i32),
}

/// `v` as `f64`, if the conversion is lossless.
fn exact_f64(v: i64) -> Option<f64> {
    let f = v as f64;
    // 2^63 saturates back to i64::MAX
    (f != 9_223_372_036_854_775_808.0 && f as i64 == v).then_some(f)
}

impl LiteralValue {
    pub fn is_null(&self) -> bool {
        matches!(self, LiteralValue::Null)
    }

    /// Compare two literals of compatible types.
    ///
    /// Returns `None` for NULLs, for type combinations that have no
    /// meaningful order (e.g. a string against a number), and for integers
    /// compared with floats when the integer has no exact `f64` form.
    pub fn compare(&self, other: &LiteralValue) -> Option<Ordering> {
        use LiteralValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Int64(a), Int64(b)) => Some(a.cmp(b)),
            (Float64(a), Float64(b)) => a.partial_cmp(b),
            (Int64(a), Float64(b)) => exact_f64(*a)?.partial_cmp(b),
            (Float64(a), Int64(b)) => a.partial_cmp(&exact_f64(*b)?),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Convert days since epoch to a calendar date.
    pub fn date_from_days(days: i32) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
    }

    /// Days since epoch for a calendar date.
    pub fn days_from_date(date: NaiveDate) -> i32 {
        date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
    }
}

impl From<i64> for LiteralValue {
    fn from(v: i64) -> Self {
        LiteralValue::Int64(v)
    }
}

impl From<i32> for LiteralValue {
    fn from(v: i32) -> Self {
        LiteralValue::Int64(v as i64)
    }
}

impl From<f64> for LiteralValue {
    fn from(v: f64) -> Self {
        LiteralValue::Float64(v)
    }
}

impl From<bool> for LiteralValue {
    fn from(v: bool) -> Self {
        LiteralValue::Boolean(v)
    }
}

impl From<&str> for LiteralValue {
    fn from(v: &str) -> Self {
        LiteralValue::String(v.to_string())
    }
}

impl From<String> for LiteralValue {
    fn from(v: String) -> Self {
        LiteralValue::String(v)
    }
}

impl std::fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "'{}'", v.replace('\'', "\\'")),
            Self::Date(days) => match Self::date_from_days(*days) {
                Some(date) => write!(f, "'{}'", date.format("%Y-%m-%d")),
                None => write!(f, "date({})", days),
            },
        }
    }
}

/// Filter expression.
///
/// Expressions are immutable trees combined via boolean operators. `And`
/// and `Or` built through [`Expression::and`] / [`Expression::or`] are
/// flattened, so a conjunction is never nested directly inside another.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Always true (no filtering)
    AlwaysTrue,
    /// Always false (no results)
    AlwaysFalse,
    /// Logical NOT
    Not(Box<Expression>),
    /// Logical AND of multiple expressions
    And(Vec<Expression>),
    /// Logical OR of multiple expressions
    Or(Vec<Expression>),
    /// IS NULL check
    IsNull { column: String },
    /// IS NOT NULL check
    IsNotNull { column: String },
    /// Comparison of a column against a literal
    Comparison {
        column: String,
        op: ComparisonOp,
        value: LiteralValue,
    },
    /// IN list check
    In {
        column: String,
        values: Vec<LiteralValue>,
    },
    /// NOT IN list check
    NotIn {
        column: String,
        values: Vec<LiteralValue>,
    },
}

impl Expression {
    pub fn compare(column: impl Into<String>, op: ComparisonOp, value: impl Into<LiteralValue>) -> Self {
        Self::Comparison {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Comparison written literal-first (`5 = k`), normalised to column-first.
    pub fn compare_reversed(
        value: impl Into<LiteralValue>,
        op: ComparisonOp,
        column: impl Into<String>,
    ) -> Self {
        Self::compare(column, op.flip(), value)
    }

    pub fn eq(column: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::compare(column, ComparisonOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::compare(column, ComparisonOp::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::compare(column, ComparisonOp::Lt, value)
    }

    pub fn lt_eq(column: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::compare(column, ComparisonOp::LtEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::compare(column, ComparisonOp::Gt, value)
    }

    pub fn gt_eq(column: impl Into<String>, value: impl Into<LiteralValue>) -> Self {
        Self::compare(column, ComparisonOp::GtEq, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull {
            column: column.into(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull {
            column: column.into(),
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<LiteralValue>) -> Self {
        Self::In {
            column: column.into(),
            values,
        }
    }

    pub fn not_in_list(column: impl Into<String>, values: Vec<LiteralValue>) -> Self {
        Self::NotIn {
            column: column.into(),
            values,
        }
    }

    /// Create a logical AND of expressions.
    pub fn and(exprs: Vec<Expression>) -> Self {
        // Flatten nested ANDs and filter out AlwaysTrue
        let mut flattened = Vec::new();
        for expr in exprs {
            match expr {
                Expression::AlwaysTrue => continue,
                Expression::AlwaysFalse => return Expression::AlwaysFalse,
                Expression::And(inner) => flattened.extend(inner),
                other => flattened.push(other),
            }
        }

        match flattened.len() {
            0 => Expression::AlwaysTrue,
            1 => flattened.swap_remove(0),
            _ => Expression::And(flattened),
        }
    }

    /// Create a logical OR of expressions.
    pub fn or(exprs: Vec<Expression>) -> Self {
        // Flatten nested ORs and filter out AlwaysFalse
        let mut flattened = Vec::new();
        for expr in exprs {
            match expr {
                Expression::AlwaysFalse => continue,
                Expression::AlwaysTrue => return Expression::AlwaysTrue,
                Expression::Or(inner) => flattened.extend(inner),
                other => flattened.push(other),
            }
        }

        match flattened.len() {
            0 => Expression::AlwaysFalse,
            1 => flattened.swap_remove(0),
            _ => Expression::Or(flattened),
        }
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, Expression::AlwaysTrue)
    }

    pub fn is_always_false(&self) -> bool {
        matches!(self, Expression::AlwaysFalse)
    }

    /// Split into top-level conjuncts. `AlwaysTrue` has none.
    pub fn into_conjuncts(self) -> Vec<Expression> {
        match self {
            Expression::AlwaysTrue => Vec::new(),
            Expression::And(exprs) => exprs
                .into_iter()
                .flat_map(Expression::into_conjuncts)
                .collect(),
            other => vec![other],
        }
    }

    /// Combine conjuncts back into one expression; `None` when empty.
    pub fn combine_conjuncts(conjuncts: Vec<Expression>) -> Option<Expression> {
        match Expression::and(conjuncts) {
            Expression::AlwaysTrue => None,
            expr => Some(expr),
        }
    }

    /// Get all column names referenced by this expression, sorted and deduplicated.
    pub fn referenced_columns(&self) -> BTreeSet<&str> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, columns: &mut BTreeSet<&'a str>) {
        match self {
            Expression::AlwaysTrue | Expression::AlwaysFalse => {}
            Expression::Not(inner) => inner.collect_columns(columns),
            Expression::And(exprs) | Expression::Or(exprs) => {
                for expr in exprs {
                    expr.collect_columns(columns);
                }
            }
            Expression::IsNull { column }
            | Expression::IsNotNull { column }
            | Expression::Comparison { column, .. }
            | Expression::In { column, .. }
            | Expression::NotIn { column, .. } => {
                columns.insert(column.as_str());
            }
        }
    }

    /// True if the expression references at least one column and every
    /// referenced column satisfies `is_key`.
    pub fn references_only(&self, is_key: impl Fn(&str) -> bool) -> bool {
        let columns = self.referenced_columns();
        !columns.is_empty() && columns.iter().all(|c| is_key(c))
    }

    /// Evaluate under SQL three-valued logic.
    ///
    /// `lookup` supplies values for known columns. Returns `None` when the
    /// outcome cannot be decided: an unknown column, a NULL operand, or
    /// incomparable types.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Option<LiteralValue>) -> Option<bool> {
        match self {
            Expression::AlwaysTrue => Some(true),
            Expression::AlwaysFalse => Some(false),
            Expression::Not(inner) => inner.evaluate(lookup).map(|v| !v),
            Expression::And(exprs) => {
                let mut result = Some(true);
                for expr in exprs {
                    match expr.evaluate(lookup) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => result = None,
                    }
                }
                result
            }
            Expression::Or(exprs) => {
                let mut result = Some(false);
                for expr in exprs {
                    match expr.evaluate(lookup) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => result = None,
                    }
                }
                result
            }
            Expression::IsNull { column } => lookup(column).map(|v| v.is_null()),
            Expression::IsNotNull { column } => lookup(column).map(|v| !v.is_null()),
            Expression::Comparison { column, op, value } => {
                let actual = lookup(column)?;
                actual.compare(value).map(|ord| op.holds(ord))
            }
            Expression::In { column, values } => {
                let actual = lookup(column)?;
                evaluate_membership(&actual, values)
            }
            Expression::NotIn { column, values } => {
                let actual = lookup(column)?;
                evaluate_membership(&actual, values).map(|v| !v)
            }
        }
    }
}

fn evaluate_membership(actual: &LiteralValue, values: &[LiteralValue]) -> Option<bool> {
    let mut result = Some(false);
    for value in values {
        match actual.compare(value) {
            Some(Ordering::Equal) => return Some(true),
            Some(_) => {}
            None => result = None,
        }
    }
    result
}

/// Render an expression in the Hive metastore partition filter grammar.
///
/// Only comparisons and AND/OR/NOT of comparisons are expressible. Conjuncts
/// of a top-level AND that cannot be expressed are dropped: the resulting
/// filter is weaker than `expr`, so the metastore still returns a superset of
/// the matching partitions. Returns `None` when nothing is expressible.
pub fn metastore_filter(expr: &Expression) -> Option<String> {
    let parts: Vec<String> = expr
        .clone()
        .into_conjuncts()
        .iter()
        .filter_map(render_metastore)
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(parts.join(" and ")),
    }
}

fn render_metastore(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Comparison { column, op, value } => {
            let op = match op {
                ComparisonOp::NotEq => "<>".to_string(),
                other => other.to_string(),
            };
            match value {
                LiteralValue::Null | LiteralValue::Float64(_) => None,
                LiteralValue::String(s) => Some(format!("{} {} \"{}\"", column, op, s.replace('"', "\\\""))),
                LiteralValue::Date(days) => {
                    let date = LiteralValue::date_from_days(*days)?;
                    Some(format!("{} {} \"{}\"", column, op, date.format("%Y-%m-%d")))
                }
                other => Some(format!("{} {} {}", column, op, other)),
            }
        }
        // A disjunction is only expressible when every branch is
        Expression::Or(exprs) => {
            let parts: Option<Vec<String>> = exprs.iter().map(render_metastore).collect();
            parts.map(|p| format!("({})", p.join(" or ")))
        }
        Expression::And(exprs) => {
            let parts: Option<Vec<String>> = exprs.iter().map(render_metastore).collect();
            parts.map(|p| format!("({})", p.join(" and ")))
        }
        Expression::Not(inner) => render_metastore(inner).map(|s| format!("not ({})", s)),
        _ => None,
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::AlwaysTrue => write!(f, "TRUE"),
            Expression::AlwaysFalse => write!(f, "FALSE"),
            Expression::Not(inner) => write!(f, "NOT ({})", inner),
            Expression::And(exprs) => {
                let parts: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(" AND "))
            }
            Expression::Or(exprs) => {
                let parts: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(" OR "))
            }
            Expression::IsNull { column } => write!(f, "{} IS NULL", column),
            Expression::IsNotNull { column } => write!(f, "{} IS NOT NULL", column),
            Expression::Comparison { column, op, value } => {
                write!(f, "{} {} {}", column, op, value)
            }
            Expression::In { column, values } => {
                let vals: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} IN ({})", column, vals.join(", "))
            }
            Expression::NotIn { column, values } => {
                let vals: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{} NOT IN ({})", column, vals.join(", "))
            }
        }
    }
}
