//! Ordinary least squares over a plan.
//!
//! The engine computes the sufficient statistics (counts, sums, cross
//! products) in one grouped pass per categorical level; only those
//! aggregates come back to the process. The normal equations are then
//! assembled with treatment coding for the categorical term and handed to
//! `nalgebra` for a Cholesky solve.

use crate::error::{AnalyticsError, Result};
use crate::features::columns::{DEPDELAY, DISTANCE, GAIN, PREDICTION, UNIQUECARRIER};
use crate::plan::{col, count, lit, sum, Expr, QueryPlan};
use crate::session::Session;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fmt::{self, Write as _};
use tracing::{debug, info};

/// Pivots below this fraction of their diagonal entry mark a rank-deficient design.
const PIVOT_TOLERANCE: f64 = 1e-10;

const INTERCEPT: &str = "(Intercept)";

/// Response and predictors of a linear model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFormula {
    /// Response column
    pub response: String,
    /// Numeric predictor columns
    pub numeric: Vec<String>,
    /// Treatment-coded factor; its first level in sort order is the baseline
    pub categorical: Option<String>,
}

impl ModelFormula {
    /// `gain ~ distance + depdelay + uniquecarrier`
    pub fn gain() -> Self {
        Self {
            response: GAIN.to_string(),
            numeric: vec![DISTANCE.to_string(), DEPDELAY.to_string()],
            categorical: Some(UNIQUECARRIER.to_string()),
        }
    }

    fn level_expr(&self) -> Expr {
        match &self.categorical {
            Some(factor) => Expr::Coalesce(vec![col(factor), lit("")]),
            None => lit(""),
        }
    }
}

impl fmt::Display for ModelFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<&str> = self
            .numeric
            .iter()
            .chain(self.categorical.iter())
            .map(String::as_str)
            .collect();
        write!(f, "{} ~ {}", self.response, terms.join(" + "))
    }
}

/// Sufficient statistics for one level of the categorical term.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelStatistics {
    /// Level value, `""` for a null carrier
    pub level: String,
    /// Row count
    pub n: f64,
    /// Σx per numeric predictor
    pub sx: Vec<f64>,
    /// Σx_i·x_j, full k×k, row-major
    pub sxx: Vec<f64>,
    /// Σx_i·y
    pub sxy: Vec<f64>,
    /// Σy
    pub sy: f64,
    /// Σy²
    pub syy: f64,
}

/// One fitted coefficient with its inference statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficient {
    /// Term name
    pub term: String,
    /// Estimate
    pub estimate: f64,
    /// Standard error
    pub std_error: f64,
    /// t statistic
    pub t_value: f64,
    /// Two-sided Student-t p value
    pub p_value: f64,
}

/// OLS trainer.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    formula: ModelFormula,
}

impl LinearRegression {
    /// Trainer for `formula`.
    pub const fn new(formula: ModelFormula) -> Self {
        Self { formula }
    }

    /// Aggregation plan producing one row of [`LevelStatistics`] per level.
    pub fn sufficient_statistics(&self, train: &QueryPlan) -> Result<QueryPlan> {
        let f = &self.formula;
        let y = col(&f.response);
        let xs: Vec<Expr> = f.numeric.iter().map(|c| col(c)).collect();

        let not_null = Expr::all(
            std::iter::once(y.clone().is_not_null())
                .chain(xs.iter().map(|x| x.clone().is_not_null())),
        )
        .unwrap_or_else(|| lit(1).equals(lit(1)));

        let mut names = vec!["n".to_string()];
        let mut exprs = vec![count()];
        for (i, x) in xs.iter().enumerate() {
            names.push(format!("sx{i}"));
            exprs.push(sum(x.clone()));
        }
        for i in 0..xs.len() {
            for j in i..xs.len() {
                names.push(format!("sxx{i}_{j}"));
                exprs.push(sum(xs[i].clone() * xs[j].clone()));
            }
        }
        for (i, x) in xs.iter().enumerate() {
            names.push(format!("sxy{i}"));
            exprs.push(sum(x.clone() * y.clone()));
        }
        names.push("sy".to_string());
        exprs.push(sum(y.clone()));
        names.push("syy".to_string());
        exprs.push(sum(y.clone() * y));

        let aggregates = names.iter().map(String::as_str).zip(exprs).collect();
        train
            .clone()
            .filter(not_null)?
            .aggregate(vec![("level", f.level_expr())], aggregates)?
            .order_by(&[("level", false)])
    }

    /// Fit the model over `train`.
    pub fn fit(&self, session: &Session, train: &QueryPlan) -> Result<FittedModel> {
        let k = self.formula.numeric.len();
        let plan = self.sufficient_statistics(train)?;
        let stats = session.query_map(&plan, |row| {
            let value = |idx: usize| -> duckdb::Result<f64> {
                Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(0.0))
            };
            let level: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            let mut idx = 2;
            let mut sx = Vec::with_capacity(k);
            for _ in 0..k {
                sx.push(value(idx)?);
                idx += 1;
            }
            let mut sxx = vec![0.0; k * k];
            for i in 0..k {
                for j in i..k {
                    let v = value(idx)?;
                    sxx[i * k + j] = v;
                    sxx[j * k + i] = v;
                    idx += 1;
                }
            }
            let mut sxy = Vec::with_capacity(k);
            for _ in 0..k {
                sxy.push(value(idx)?);
                idx += 1;
            }
            Ok(LevelStatistics {
                level,
                n: n as f64,
                sx,
                sxx,
                sxy,
                sy: value(idx)?,
                syy: value(idx + 1)?,
            })
        })?;
        debug!(levels = stats.len(), "Collected sufficient statistics");

        let model = FittedModel::from_statistics(self.formula.clone(), &stats)?;
        info!(
            formula = %model.formula,
            observations = model.observations,
            coefficients = model.coefficients.len(),
            r_squared = model.r_squared,
            "Fitted linear regression"
        );
        Ok(model)
    }
}

/// Normal equations factored by Cholesky after scaling to a unit diagonal.
struct NormalEquations {
    scale: DVector<f64>,
    factor: Cholesky<f64, Dyn>,
}

impl NormalEquations {
    /// Factor `xtx`, or return the index of the first term that is a linear
    /// combination of the terms before it.
    fn factor(xtx: &DMatrix<f64>) -> std::result::Result<Self, usize> {
        let p = xtx.nrows();
        let scale = xtx.diagonal().map(f64::sqrt);
        if let Some(j) = scale.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(j);
        }
        let scaled = DMatrix::from_fn(p, p, |r, c| xtx[(r, c)] / (scale[r] * scale[c]));
        match scaled.clone().cholesky() {
            Some(factor) if well_conditioned(&factor) => Ok(Self { scale, factor }),
            _ => Err(first_dependent_term(&scaled)),
        }
    }

    fn solve(&self, rhs: &DVector<f64>) -> DVector<f64> {
        self.factor
            .solve(&rhs.component_div(&self.scale))
            .component_div(&self.scale)
    }

    /// Diagonal of the inverse of the unscaled matrix.
    fn inverse_diagonal(&self) -> DVector<f64> {
        self.factor
            .inverse()
            .diagonal()
            .component_div(&self.scale.component_mul(&self.scale))
    }
}

/// Every pivot, relative to its diagonal entry, clears the tolerance.
fn well_conditioned(factor: &Cholesky<f64, Dyn>) -> bool {
    factor
        .l_dirty()
        .diagonal()
        .iter()
        .all(|d| d * d > PIVOT_TOLERANCE)
}

/// Smallest leading block that fails to factor; its last row is the culprit.
fn first_dependent_term(scaled: &DMatrix<f64>) -> usize {
    let p = scaled.nrows();
    (1..=p)
        .find(|&j| {
            scaled
                .view((0, 0), (j, j))
                .clone_owned()
                .cholesky()
                .is_none_or(|f| !well_conditioned(&f))
        })
        .map_or(p - 1, |j| j - 1)
}

/// A fitted linear regression. Read-only once built.
#[derive(Debug, Clone)]
pub struct FittedModel {
    formula: ModelFormula,
    coefficients: Vec<Coefficient>,
    /// Every level seen in training, baseline first
    levels: Vec<String>,
    observations: i64,
    degrees_of_freedom: i64,
    r_squared: f64,
    rmse: f64,
    residual_std_error: f64,
}

impl FittedModel {
    /// Solve the normal equations from per-level statistics.
    pub fn from_statistics(formula: ModelFormula, stats: &[LevelStatistics]) -> Result<Self> {
        let k = formula.numeric.len();
        let mut stats: Vec<&LevelStatistics> = stats.iter().filter(|s| s.n > 0.0).collect();
        stats.sort_by(|a, b| a.level.cmp(&b.level));

        let n: f64 = stats.iter().map(|s| s.n).sum();
        if n == 0.0 {
            return Err(AnalyticsError::Fit("training set is empty".to_string()));
        }
        let p = 1 + k + stats.len() - 1;
        if n <= p as f64 {
            return Err(AnalyticsError::Fit(format!(
                "{n} observations cannot determine {p} coefficients"
            )));
        }

        let mut xtx = DMatrix::<f64>::zeros(p, p);
        let mut xty = DVector::<f64>::zeros(p);
        let mut yy = 0.0;
        for (g, s) in stats.iter().enumerate() {
            xtx[(0, 0)] += s.n;
            xty[0] += s.sy;
            yy += s.syy;
            for i in 0..k {
                xtx[(0, 1 + i)] += s.sx[i];
                xty[1 + i] += s.sxy[i];
                for j in 0..k {
                    xtx[(1 + i, 1 + j)] += s.sxx[i * k + j];
                }
            }
            if g > 0 {
                let d = k + g;
                xtx[(d, d)] += s.n;
                xtx[(0, d)] += s.n;
                xty[d] += s.sy;
                for i in 0..k {
                    xtx[(1 + i, d)] += s.sx[i];
                }
            }
        }
        for r in 0..p {
            for c in (r + 1)..p {
                xtx[(c, r)] = xtx[(r, c)];
            }
        }

        let mut terms = vec![INTERCEPT.to_string()];
        terms.extend(formula.numeric.iter().cloned());
        if let Some(factor) = &formula.categorical {
            terms.extend(stats.iter().skip(1).map(|s| {
                let level = if s.level.is_empty() { "(blank)" } else { &s.level };
                format!("{factor}_{level}")
            }));
        }

        let normal = NormalEquations::factor(&xtx).map_err(|pivot| {
            AnalyticsError::Fit(format!(
                "design matrix is rank deficient at term '{}'",
                terms[pivot]
            ))
        })?;
        let beta = normal.solve(&xty);
        let inverse_diagonal = normal.inverse_diagonal();

        let fitted_ss = beta.dot(&(&xtx * &beta));
        let sse = (yy - 2.0 * beta.dot(&xty) + fitted_ss).max(0.0);
        let mean = xty[0] / n;
        let sst = yy - n * mean * mean;

        let df = n - p as f64;
        let sigma2 = sse / df;
        let t_dist = StudentsT::new(0.0, 1.0, df).map_err(|e| AnalyticsError::Fit(e.to_string()))?;

        let coefficients = terms
            .into_iter()
            .enumerate()
            .map(|(j, term)| {
                let std_error = (sigma2 * inverse_diagonal[j]).max(0.0).sqrt();
                let estimate = beta[j];
                let t_value = if std_error > 0.0 {
                    estimate / std_error
                } else if estimate == 0.0 {
                    0.0
                } else {
                    f64::INFINITY.copysign(estimate)
                };
                let p_value = if t_value.is_finite() {
                    2.0 * (1.0 - t_dist.cdf(t_value.abs()))
                } else {
                    0.0
                };
                Coefficient {
                    term,
                    estimate,
                    std_error,
                    t_value,
                    p_value,
                }
            })
            .collect();

        Ok(Self {
            formula,
            coefficients,
            levels: stats.iter().map(|s| s.level.clone()).collect(),
            observations: n as i64,
            degrees_of_freedom: df as i64,
            r_squared: if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN },
            rmse: (sse / n).sqrt(),
            residual_std_error: sigma2.sqrt(),
        })
    }

    /// Formula the model was fitted with.
    pub const fn formula(&self) -> &ModelFormula {
        &self.formula
    }

    /// Coefficients in term order: intercept, numeric, then levels.
    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    /// Estimate for a term such as `distance` or `uniquecarrier_UA`.
    pub fn coefficient(&self, term: &str) -> Option<f64> {
        self.coefficients
            .iter()
            .find(|c| c.term == term)
            .map(|c| c.estimate)
    }

    /// Training levels, baseline first.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Rows used in the fit.
    pub const fn observations(&self) -> i64 {
        self.observations
    }

    /// Coefficient of determination; NaN for a constant response.
    pub const fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// Root mean squared training error.
    pub const fn rmse(&self) -> f64 {
        self.rmse
    }

    /// Level-specific offset from the baseline; 0 for the baseline and
    /// for levels never seen in training.
    fn level_offset(&self, level: &str) -> f64 {
        let k = self.formula.numeric.len();
        self.levels
            .iter()
            .position(|l| l == level)
            .filter(|&g| g > 0)
            .map_or(0.0, |g| self.coefficients[k + g].estimate)
    }

    /// Score one record locally.
    pub fn predict(&self, numeric: &[f64], level: Option<&str>) -> Result<f64> {
        let k = self.formula.numeric.len();
        if numeric.len() != k {
            return Err(AnalyticsError::InvalidParameter(format!(
                "expected {k} numeric predictors, got {}",
                numeric.len()
            )));
        }
        let linear: f64 = self.coefficients[1..=k]
            .iter()
            .zip(numeric)
            .map(|(c, x)| c.estimate * x)
            .sum();
        Ok(self.coefficients[0].estimate + linear + self.level_offset(level.unwrap_or("")))
    }

    /// Prediction as a plan expression.
    pub fn prediction_expr(&self) -> Expr {
        let k = self.formula.numeric.len();
        let mut expr = lit(self.coefficients[0].estimate);
        for (c, x) in self.coefficients[1..=k].iter().zip(&self.formula.numeric) {
            expr = expr + lit(c.estimate) * col(x);
        }
        if self.levels.len() > 1 {
            let branches = self
                .levels
                .iter()
                .enumerate()
                .skip(1)
                .map(|(g, level)| {
                    (
                        self.formula.level_expr().equals(lit(level.as_str())),
                        lit(self.coefficients[k + g].estimate),
                    )
                })
                .collect();
            expr = expr
                + Expr::Case {
                    branches,
                    otherwise: Box::new(lit(0.0)),
                };
        }
        expr
    }

    /// Add a `prediction` column to `plan`.
    pub fn score(&self, plan: QueryPlan) -> Result<QueryPlan> {
        plan.derive(PREDICTION, self.prediction_expr())
    }

    /// Categorical levels in `plan` the model never saw, with row counts.
    pub fn unseen_levels(&self, session: &Session, plan: &QueryPlan) -> Result<Vec<(String, i64)>> {
        if self.formula.categorical.is_none() {
            return Ok(Vec::new());
        }
        let levels = plan
            .clone()
            .aggregate(vec![("level", self.formula.level_expr())], vec![("rows", count())])?
            .order_by(&[("level", false)])?;
        let counts = session.query_map(&levels, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        Ok(counts
            .into_iter()
            .filter(|(level, _)| !self.levels.contains(level))
            .collect())
    }

    /// Printable summary, one line per element.
    pub fn summary_lines(&self) -> Vec<String> {
        let width = self
            .coefficients
            .iter()
            .map(|c| c.term.len())
            .max()
            .unwrap_or(0)
            .max(INTERCEPT.len());

        let mut lines = vec![
            format!("Call: lm({})", self.formula),
            String::new(),
            "Coefficients:".to_string(),
            format!(
                "{:<width$} {:>12} {:>12} {:>9} {:>10}",
                "", "Estimate", "Std. Error", "t value", "Pr(>|t|)"
            ),
        ];
        for c in &self.coefficients {
            lines.push(format!(
                "{:<width$} {:>12.6} {:>12.6} {:>9.3} {:>10.4}",
                c.term, c.estimate, c.std_error, c.t_value, c.p_value
            ));
        }
        lines.push(String::new());
        lines.push(format!(
            "Residual standard error: {:.4} on {} degrees of freedom",
            self.residual_std_error, self.degrees_of_freedom
        ));
        lines.push(format!("R-Squared: {:.4}", self.r_squared));
        lines.push(format!("Root Mean Squared Error: {:.4}", self.rmse));
        lines.push(format!("Observations: {}", self.observations));
        lines
    }

    /// Summary as a single block of text.
    pub fn summary(&self) -> String {
        let mut text = String::new();
        for line in self.summary_lines() {
            let _ = writeln!(text, "{line}");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::FromRow;

    /// 17850 = lcm(3, 50, 17, 7) rows, so the noise term (driven by
    /// `range % 7`, mean zero) is exactly orthogonal to every regressor and
    /// OLS recovers the generating coefficients.
    fn training_session() -> Session {
        let session = Session::in_memory().unwrap();
        session
            .conn
            .execute_batch(
                r#"
                CREATE TABLE train AS
                WITH base AS (
                    SELECT
                        range AS r,
                        CASE range % 3 WHEN 0 THEN 'AA' WHEN 1 THEN 'UA' ELSE 'DL' END AS uniquecarrier,
                        CAST(100 + (range % 50) * 37 AS DOUBLE) AS distance,
                        CAST(16 + (range % 17) * 11 AS DOUBLE) AS depdelay,
                        CAST(range % 7 AS DOUBLE) - 3.0 AS noise
                    FROM range(17850)
                )
                SELECT
                    uniquecarrier,
                    distance,
                    depdelay,
                    2.0 + 0.01 * distance + 0.2 * depdelay
                        + CASE uniquecarrier WHEN 'DL' THEN -3.0 WHEN 'UA' THEN 4.0 ELSE 0.0 END
                        + noise AS gain
                FROM base;
                "#,
            )
            .unwrap();
        session
    }

    fn fit(session: &Session) -> FittedModel {
        let train = session.table("train").unwrap();
        LinearRegression::new(ModelFormula::gain())
            .fit(session, &train)
            .unwrap()
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-5)
    }

    #[test]
    fn test_recovers_generating_coefficients() {
        let session = training_session();
        let model = fit(&session);

        assert_eq!(model.levels(), ["AA", "DL", "UA"]);
        assert_eq!(model.observations(), 17850);
        assert!(close(model.coefficient(INTERCEPT), 2.0));
        assert!(close(model.coefficient("distance"), 0.01));
        assert!(close(model.coefficient("depdelay"), 0.2));
        assert!(close(model.coefficient("uniquecarrier_DL"), -3.0));
        assert!(close(model.coefficient("uniquecarrier_UA"), 4.0));
        assert!(model.coefficient("uniquecarrier_AA").is_none());
        assert!((model.rmse() - 2.0).abs() < 1e-6);
        assert!(model.r_squared() > 0.0 && model.r_squared() < 1.0);

        let depdelay = &model.coefficients()[2];
        assert!(depdelay.std_error > 0.0);
        assert!(depdelay.p_value < 1e-6);
    }

    #[test]
    fn test_score_matches_local_prediction() {
        struct Scored {
            carrier: String,
            distance: f64,
            depdelay: f64,
            prediction: f64,
        }
        impl FromRow for Scored {
            fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
                Ok(Self {
                    carrier: row.get(0)?,
                    distance: row.get(1)?,
                    depdelay: row.get(2)?,
                    prediction: row.get(4)?,
                })
            }
        }

        let session = training_session();
        let model = fit(&session);
        let scored = model
            .score(session.table("train").unwrap())
            .unwrap()
            .limit(50);
        let rows: Vec<Scored> = session.collect(&scored).unwrap();
        assert_eq!(rows.len(), 50);
        for row in rows {
            let local = model
                .predict(&[row.distance, row.depdelay], Some(&row.carrier))
                .unwrap();
            assert!((local - row.prediction).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unseen_level_scores_at_baseline() {
        let session = training_session();
        let model = fit(&session);
        let baseline = model.predict(&[500.0, 30.0], Some("AA")).unwrap();
        assert_eq!(model.predict(&[500.0, 30.0], Some("ZZ")).unwrap(), baseline);
        assert_eq!(model.predict(&[500.0, 30.0], None).unwrap(), baseline);
        assert!(model.predict(&[500.0], None).is_err());

        session
            .conn
            .execute_batch("INSERT INTO train VALUES ('ZZ', 500.0, 30.0, 1.0), ('ZZ', 600.0, 40.0, 2.0)")
            .unwrap();
        let unseen = model
            .unseen_levels(&session, &session.table("train").unwrap())
            .unwrap();
        assert_eq!(unseen, vec![("ZZ".to_string(), 2)]);
    }

    #[test]
    fn test_rank_deficient_design_fails() {
        let session = Session::in_memory().unwrap();
        session
            .conn
            .execute_batch(
                "CREATE TABLE train AS SELECT 'AA' AS uniquecarrier, CAST(500 AS DOUBLE) AS distance,
                 CAST(range AS DOUBLE) AS depdelay, CAST(range * 2 AS DOUBLE) AS gain
                 FROM range(100)",
            )
            .unwrap();
        let train = session.table("train").unwrap();
        match LinearRegression::new(ModelFormula::gain()).fit(&session, &train) {
            Err(AnalyticsError::Fit(message)) => assert!(message.contains("distance"), "{message}"),
            other => panic!("unexpected: {:?}", other.map(|m| m.summary())),
        }
    }

    #[test]
    fn test_empty_or_tiny_training_set_fails() {
        let formula = ModelFormula::gain();
        assert!(matches!(
            FittedModel::from_statistics(formula.clone(), &[]),
            Err(AnalyticsError::Fit(_))
        ));

        let tiny = LevelStatistics {
            level: "AA".to_string(),
            n: 3.0,
            sx: vec![1500.0, 90.0],
            sxx: vec![800_000.0, 45_000.0, 45_000.0, 2_900.0],
            sxy: vec![15_000.0, 900.0],
            sy: 30.0,
            syy: 320.0,
        };
        assert!(matches!(
            FittedModel::from_statistics(formula, &[tiny]),
            Err(AnalyticsError::Fit(_))
        ));
    }

    #[test]
    fn test_summary_lists_every_term() {
        let session = training_session();
        let model = fit(&session);
        let summary = model.summary();
        assert!(summary.starts_with("Call: lm(gain ~ distance + depdelay + uniquecarrier)"));
        for term in [INTERCEPT, "distance", "depdelay", "uniquecarrier_DL", "uniquecarrier_UA"] {
            assert!(summary.contains(term), "missing {term}");
        }
        assert!(summary.contains("Observations: 17850"));
    }

    #[test]
    fn test_normal_equations_unscale_solution() {
        // Badly scaled but well conditioned: columns differ by 10^4.
        let xtx = DMatrix::from_row_slice(2, 2, &[4.0, 2.0e4, 2.0e4, 3.0e8]);
        let normal = NormalEquations::factor(&xtx).unwrap();
        let beta = normal.solve(&DVector::from_vec(vec![21.0, 305_000.0]));
        assert!((beta[0] - 0.25).abs() < 1e-9, "{beta}");
        assert!((beta[1] - 0.001).abs() < 1e-12, "{beta}");

        let inverse = xtx.clone().try_inverse().unwrap();
        let diagonal = normal.inverse_diagonal();
        assert!((diagonal[0] - inverse[(0, 0)]).abs() < 1e-9);
        assert!((diagonal[1] - inverse[(1, 1)]).abs() < 1e-15);
    }

    #[test]
    fn test_normal_equations_report_dependent_term() {
        // Third column is the sum of the first two.
        let x = DMatrix::from_row_slice(4, 3, &[
            1.0, 0.0, 1.0, //
            0.0, 1.0, 1.0, //
            1.0, 1.0, 2.0, //
            2.0, 1.0, 3.0,
        ]);
        let xtx = x.transpose() * &x;
        assert_eq!(NormalEquations::factor(&xtx).err(), Some(2));

        let zero_column = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(NormalEquations::factor(&zero_column).err(), Some(1));
    }
}
