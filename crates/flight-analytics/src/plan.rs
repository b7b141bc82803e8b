//! Lazy query plans.
//!
//! A [`QueryPlan`] accumulates relational steps (filter, derive, join,
//! projection, aggregation) over a named source relation and only turns
//! into SQL when a [`Session`](crate::Session) materializes it. Each step
//! checks its column references against the plan's tracked output schema,
//! so a bad reference fails while the plan is being built and names the
//! source table.

use crate::error::{AnalyticsError, Result};
use std::fmt::{self, Write as _};

/// Binary operators supported in plan expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl BinaryOp {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
}

/// Scalar, aggregate and window expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(String),
    /// Integer literal
    Int(i64),
    /// Floating-point literal
    Float(f64),
    /// String literal
    Str(String),
    /// `NULL`
    Null,
    /// `left op right`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `NOT expr`
    Not(Box<Expr>),
    /// `expr IS NULL`
    IsNull(Box<Expr>),
    /// `TRIM(expr)`
    Trim(Box<Expr>),
    /// `COALESCE(..)`
    Coalesce(Vec<Expr>),
    /// `CASE WHEN .. THEN .. ELSE .. END`, first matching branch wins
    Case {
        /// `(condition, value)` pairs in match order
        branches: Vec<(Expr, Expr)>,
        /// `ELSE` value
        otherwise: Box<Expr>,
    },
    /// `None` argument means `COUNT(*)`
    Aggregate {
        /// Aggregate function
        func: AggFunc,
        /// Argument, if any
        arg: Option<Box<Expr>>,
    },
    /// `ntile(buckets) OVER (ORDER BY order_by)`
    Ntile {
        /// Bucket count
        buckets: u32,
        /// Ordering expression
        order_by: Box<Expr>,
        /// Order descending
        descending: bool,
    },
    /// Uniform draw in `[0, 1)` derived from a seeded hash of the arguments
    UnitHash {
        /// Hash seed
        seed: u64,
        /// Hashed expressions
        args: Vec<Expr>,
    },
}

/// Reference a column.
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Literal value.
pub fn lit(value: impl Into<Expr>) -> Expr {
    value.into()
}

/// `TRIM(expr)`
pub fn trim(expr: Expr) -> Expr {
    Expr::Trim(Box::new(expr))
}

/// `COUNT(*)`
pub const fn count() -> Expr {
    Expr::Aggregate {
        func: AggFunc::Count,
        arg: None,
    }
}

/// `SUM(expr)`
pub fn sum(expr: Expr) -> Expr {
    Expr::Aggregate {
        func: AggFunc::Sum,
        arg: Some(Box::new(expr)),
    }
}

/// `AVG(expr)`
pub fn avg(expr: Expr) -> Expr {
    Expr::Aggregate {
        func: AggFunc::Avg,
        arg: Some(Box::new(expr)),
    }
}

/// `NTILE(buckets) OVER (ORDER BY expr [DESC])`
pub fn ntile(buckets: u32, order_by: Expr, descending: bool) -> Expr {
    Expr::Ntile {
        buckets,
        order_by: Box::new(order_by),
        descending,
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, other: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// `self = other`
    #[must_use]
    pub fn equals(self, other: Self) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: Self) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`
    #[must_use]
    pub fn ge(self, other: Self) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: Self) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`
    #[must_use]
    pub fn le(self, other: Self) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `self IS NULL`
    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    /// `self IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self) -> Self {
        Self::Not(Box::new(self.is_null()))
    }

    /// Exclusive range check: `lower < self AND self < upper`.
    #[must_use]
    pub fn between_exclusive(self, lower: f64, upper: f64) -> Self {
        self.clone().gt(lit(lower)).and(self.lt(lit(upper)))
    }

    /// Inclusive range check: `lower <= self AND self <= upper`.
    #[must_use]
    pub fn between_inclusive(self, lower: impl Into<Self>, upper: impl Into<Self>) -> Self {
        self.clone().ge(lower.into()).and(self.le(upper.into()))
    }

    /// Fold a list of predicates with `AND`; `None` for an empty list.
    pub fn all(predicates: impl IntoIterator<Item = Self>) -> Option<Self> {
        predicates.into_iter().reduce(Self::and)
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Column(name) => out.push(name),
            Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Null => {}
            Self::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Not(e) | Self::IsNull(e) | Self::Trim(e) => e.collect_columns(out),
            Self::Coalesce(args) | Self::UnitHash { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Self::Case {
                branches,
                otherwise,
            } => {
                for (when, then) in branches {
                    when.collect_columns(out);
                    then.collect_columns(out);
                }
                otherwise.collect_columns(out);
            }
            Self::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.collect_columns(out);
                }
            }
            Self::Ntile { order_by, .. } => order_by.collect_columns(out),
        }
    }

    /// Column names referenced anywhere in the expression.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }
}

/// Quote an identifier for SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for SQL.
pub(crate) fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Reject names that are not plain `[A-Za-z_][A-Za-z0-9_]*` identifiers.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AnalyticsError::InvalidParameter(format!(
            "'{name}' is not a valid table or column name"
        )))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => f.write_str(&quote_ident(name)),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) if v.is_finite() => write!(f, "{v:?}"),
            Self::Float(v) => write!(f, "CAST('{v}' AS DOUBLE)"),
            Self::Str(v) => f.write_str(&quote_str(v)),
            Self::Null => f.write_str("NULL"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.as_sql()),
            Self::Not(e) => write!(f, "(NOT {e})"),
            Self::IsNull(e) => write!(f, "({e} IS NULL)"),
            Self::Trim(e) => write!(f, "trim({e})"),
            Self::Coalesce(args) => {
                f.write_str("coalesce(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Case {
                branches,
                otherwise,
            } => {
                f.write_str("CASE")?;
                for (when, then) in branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                write!(f, " ELSE {otherwise} END")
            }
            Self::Aggregate { func, arg } => match (func, arg) {
                (AggFunc::Count, None) => f.write_str("count(*)"),
                (AggFunc::Count, Some(arg)) => write!(f, "count({arg})"),
                (AggFunc::Sum, Some(arg)) => write!(f, "sum({arg})"),
                (AggFunc::Avg, Some(arg)) => write!(f, "avg({arg})"),
                (AggFunc::Sum | AggFunc::Avg, None) => f.write_str("NULL"),
            },
            Self::Ntile {
                buckets,
                order_by,
                descending,
            } => {
                let direction = if *descending { "DESC" } else { "ASC" };
                write!(f, "ntile({buckets}) OVER (ORDER BY {order_by} {direction})")
            }
            Self::UnitHash { seed, args } => {
                write!(f, "(CAST(hash({seed}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                f.write_str(") % 1000000 AS DOUBLE) / 1000000.0)")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Step {
    Filter(Expr),
    Project(Vec<(String, Expr)>),
    Aggregate {
        keys: Vec<(String, Expr)>,
        aggregates: Vec<(String, Expr)>,
    },
    LeftJoin {
        right: Box<QueryPlan>,
        left_on: String,
        right_on: String,
        columns: Vec<String>,
    },
}

/// A lazily evaluated relational query over one source relation.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Logical table name, used in error messages
    source: String,
    /// Physical relation scanned (a cached copy when the table is resident)
    relation: String,
    columns: Vec<String>,
    steps: Vec<Step>,
    order_by: Vec<(String, bool)>,
    limit: Option<usize>,
}

impl QueryPlan {
    /// Plan scanning `relation` with the given output columns.
    pub(crate) fn scan(source: &str, relation: &str, columns: Vec<String>) -> Self {
        Self {
            source: source.to_string(),
            relation: relation.to_string(),
            columns,
            steps: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Logical name of the table the plan reads.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Output columns, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether `name` is in the output schema.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    fn check_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(AnalyticsError::SchemaMismatch {
                table: self.source.clone(),
                column: name.to_string(),
            })
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<()> {
        expr.columns()
            .into_iter()
            .try_for_each(|c| self.check_column(c))
    }

    fn check_open(&self) -> Result<()> {
        if self.order_by.is_empty() && self.limit.is_none() {
            Ok(())
        } else {
            Err(AnalyticsError::InvalidParameter(format!(
                "plan over '{}' is already ordered or limited; add ordering last",
                self.source
            )))
        }
    }

    /// Fail with [`AnalyticsError::SchemaMismatch`] unless every column exists.
    pub fn require(self, columns: &[&str]) -> Result<Self> {
        columns.iter().try_for_each(|c| self.check_column(c))?;
        Ok(self)
    }

    /// Keep rows matching `predicate`. Rows where it is NULL are dropped.
    pub fn filter(mut self, predicate: Expr) -> Result<Self> {
        self.check_open()?;
        self.check_expr(&predicate)?;
        self.steps.push(Step::Filter(predicate));
        Ok(self)
    }

    /// Add a computed column, or replace an existing one in place.
    pub fn derive(mut self, name: &str, expr: Expr) -> Result<Self> {
        self.check_open()?;
        validate_identifier(name)?;
        self.check_expr(&expr)?;
        let mut projection: Vec<(String, Expr)> =
            self.columns.iter().map(|c| (c.clone(), col(c))).collect();
        match projection.iter_mut().find(|(c, _)| c == name) {
            Some(slot) => slot.1 = expr,
            None => {
                projection.push((name.to_string(), expr));
                self.columns.push(name.to_string());
            }
        }
        self.steps.push(Step::Project(projection));
        Ok(self)
    }

    /// Keep only the named columns, in the given order.
    pub fn select(mut self, columns: &[&str]) -> Result<Self> {
        self.check_open()?;
        columns.iter().try_for_each(|c| self.check_column(c))?;
        self.steps.push(Step::Project(
            columns.iter().map(|c| ((*c).to_string(), col(c))).collect(),
        ));
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        Ok(self)
    }

    /// Left join `right`, pulling `columns` from it. Unmatched rows keep NULLs.
    pub fn left_join(
        mut self,
        right: &Self,
        left_on: &str,
        right_on: &str,
        columns: &[&str],
    ) -> Result<Self> {
        self.check_open()?;
        self.check_column(left_on)?;
        right.check_column(right_on)?;
        for column in columns {
            right.check_column(column)?;
            if self.has_column(column) {
                return Err(AnalyticsError::InvalidParameter(format!(
                    "join with '{}' would duplicate column '{column}'",
                    right.source
                )));
            }
        }
        self.steps.push(Step::LeftJoin {
            right: Box::new(right.clone()),
            left_on: left_on.to_string(),
            right_on: right_on.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        });
        self.columns
            .extend(columns.iter().map(|c| (*c).to_string()));
        Ok(self)
    }

    /// Group by `keys` and compute `aggregates`. No keys means one global row.
    pub fn aggregate(
        mut self,
        keys: Vec<(&str, Expr)>,
        aggregates: Vec<(&str, Expr)>,
    ) -> Result<Self> {
        self.check_open()?;
        let mut output = Vec::with_capacity(keys.len() + aggregates.len());
        for (name, expr) in keys.iter().chain(aggregates.iter()) {
            validate_identifier(name)?;
            self.check_expr(expr)?;
            output.push((*name).to_string());
        }
        self.steps.push(Step::Aggregate {
            keys: keys
                .into_iter()
                .map(|(n, e)| (n.to_string(), e))
                .collect(),
            aggregates: aggregates
                .into_iter()
                .map(|(n, e)| (n.to_string(), e))
                .collect(),
        });
        self.columns = output;
        Ok(self)
    }

    /// Order the final output. `true` means descending.
    pub fn order_by(mut self, keys: &[(&str, bool)]) -> Result<Self> {
        for (name, _) in keys {
            self.check_column(name)?;
        }
        self.order_by
            .extend(keys.iter().map(|(n, d)| ((*n).to_string(), *d)));
        Ok(self)
    }

    /// Cap the row count. Terminal, like ordering.
    #[must_use]
    pub const fn limit(mut self, rows: usize) -> Self {
        self.limit = Some(rows);
        self
    }

    /// Render the plan as a single SQL statement.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", quote_ident(&self.relation));
        for (depth, step) in self.steps.iter().enumerate() {
            sql = render_step(step, &sql, depth);
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, desc)| {
                    format!("{} {}", quote_ident(c), if *desc { "DESC" } else { "ASC" })
                })
                .collect();
            sql = format!("SELECT * FROM ({sql}) AS o ORDER BY {}", keys.join(", "));
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        sql
    }
}

fn render_projection(items: &[(String, Expr)]) -> String {
    items
        .iter()
        .map(|(name, expr)| match expr {
            Expr::Column(c) if c == name => quote_ident(name),
            _ => format!("{expr} AS {}", quote_ident(name)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_step(step: &Step, input: &str, depth: usize) -> String {
    let alias = format!("s{depth}");
    match step {
        Step::Filter(predicate) => {
            format!("SELECT * FROM ({input}) AS {alias} WHERE {predicate}")
        }
        Step::Project(items) => {
            format!("SELECT {} FROM ({input}) AS {alias}", render_projection(items))
        }
        Step::Aggregate { keys, aggregates } => {
            let mut items = keys.clone();
            items.extend(aggregates.iter().cloned());
            let mut sql = format!("SELECT {} FROM ({input}) AS {alias}", render_projection(&items));
            if !keys.is_empty() {
                let positions: Vec<String> = (1..=keys.len()).map(|i| i.to_string()).collect();
                let _ = write!(sql, " GROUP BY {}", positions.join(", "));
            }
            sql
        }
        Step::LeftJoin {
            right,
            left_on,
            right_on,
            columns,
        } => {
            let right_cols: Vec<String> = columns
                .iter()
                .map(|c| format!("r.{}", quote_ident(c)))
                .collect();
            format!(
                "SELECT l.*, {} FROM ({input}) AS l LEFT JOIN ({}) AS r ON l.{} = r.{}",
                right_cols.join(", "),
                right.to_sql(),
                quote_ident(left_on),
                quote_ident(right_on),
            )
        }
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flights() -> QueryPlan {
        QueryPlan::scan(
            "flights",
            "flights",
            vec!["year".into(), "depdelay".into(), "arrdelay".into(), "uniquecarrier".into()],
        )
    }

    #[test]
    fn test_expr_rendering() {
        let e = col("depdelay").between_exclusive(15.0, 240.0);
        assert_eq!(e.to_string(), r#"(("depdelay" > 15.0) AND ("depdelay" < 240.0))"#);

        let gain = col("depdelay") - col("arrdelay");
        assert_eq!(gain.to_string(), r#"("depdelay" - "arrdelay")"#);

        assert_eq!(lit("O'Hare").to_string(), "'O''Hare'");
        assert_eq!(col("x").is_not_null().to_string(), r#"(NOT ("x" IS NULL))"#);
        assert_eq!(
            ntile(10, col("prediction"), true).to_string(),
            r#"ntile(10) OVER (ORDER BY "prediction" DESC)"#
        );
        assert_eq!(lit(f64::INFINITY).to_string(), "CAST('inf' AS DOUBLE)");
    }

    #[test]
    fn test_unknown_column_is_schema_mismatch() {
        let err = flights().filter(col("distance").is_not_null()).unwrap_err();
        match err {
            AnalyticsError::SchemaMismatch { table, column } => {
                assert_eq!(table, "flights");
                assert_eq!(column, "distance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_derive_tracks_columns() {
        let plan = flights()
            .derive("gain", col("depdelay") - col("arrdelay"))
            .unwrap()
            .derive("year", col("year") + lit(1))
            .unwrap();
        assert_eq!(plan.columns().last().map(String::as_str), Some("gain"));
        assert_eq!(plan.columns().len(), 5);
        let sql = plan.to_sql();
        assert!(sql.contains(r#"("year" + 1) AS "year""#));
    }

    #[test]
    fn test_aggregate_replaces_schema() {
        let plan = flights()
            .aggregate(
                vec![("carrier", col("uniquecarrier"))],
                vec![("flights", count()), ("mean_dep", avg(col("depdelay")))],
            )
            .unwrap();
        assert_eq!(plan.columns(), ["carrier", "flights", "mean_dep"]);
        assert!(plan.to_sql().ends_with("GROUP BY 1"));
        assert!(plan.filter(col("depdelay").gt(lit(0.0))).is_err());
    }

    #[test]
    fn test_ordering_is_terminal() {
        let plan = flights().order_by(&[("year", false)]).unwrap().limit(5);
        assert!(plan.to_sql().ends_with(r#"ORDER BY "year" ASC LIMIT 5"#));
        assert!(plan.select(&["year"]).is_err());
    }

    #[test]
    fn test_join_rejects_duplicate_columns() {
        let airlines = QueryPlan::scan(
            "airlines",
            "airlines",
            vec!["code".into(), "year".into()],
        );
        assert!(flights()
            .left_join(&airlines, "uniquecarrier", "code", &["year"])
            .is_err());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("summary_2008").is_ok());
        assert!(validate_identifier("2008_summary").is_err());
        assert!(validate_identifier("x; DROP TABLE flights").is_err());
        assert!(validate_identifier("").is_err());
    }
}
