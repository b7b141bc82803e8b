//! Model evaluation summaries.
//!
//! Everything here scores lazily and only materializes aggregates: decile
//! tables have at most ten rows per subset and carrier tables one row per
//! airline.

use crate::error::Result;
use crate::features::columns::{DESCRIPTION, GAIN, PREDICTION};
use crate::model::FittedModel;
use crate::partition::Partitions;
use crate::plan::{avg, col, count, lit, ntile, QueryPlan};
use crate::rows::{CARRIER_COLUMNS, DECILE_COLUMNS, SCORED_COLUMNS};
use crate::session::Session;
use flight_domain::{CarrierSummary, DecileSummary, ScoredRecord, SubsetDeciles};
use tracing::info;

/// Carriers with fewer scored flights than this are left out of the carrier plot.
pub const DEFAULT_MIN_CARRIER_FLIGHTS: i64 = 10_000;

const DECILES: u32 = 10;

/// Scores datasets with a fitted model and summarizes the results.
pub struct Evaluator<'a> {
    session: &'a Session,
    model: &'a FittedModel,
    min_carrier_flights: i64,
}

impl<'a> Evaluator<'a> {
    /// Evaluator with the default carrier threshold.
    pub const fn new(session: &'a Session, model: &'a FittedModel) -> Self {
        Self {
            session,
            model,
            min_carrier_flights: DEFAULT_MIN_CARRIER_FLIGHTS,
        }
    }

    /// Override the carrier summary threshold.
    #[must_use]
    pub const fn with_min_carrier_flights(mut self, min: i64) -> Self {
        self.min_carrier_flights = min;
        self
    }

    /// Per-record predictions, still lazy.
    pub fn predictions(&self, plan: &QueryPlan) -> Result<QueryPlan> {
        self.model.score(plan.clone())
    }

    /// Pull up to `limit` scored records for inspection.
    pub fn collect_predictions(&self, plan: &QueryPlan, limit: usize) -> Result<Vec<ScoredRecord>> {
        let scored = self
            .predictions(plan)?
            .select(&SCORED_COLUMNS)?
            .limit(limit);
        self.session.collect(&scored)
    }

    /// Mean actual gain per predicted-gain decile. Decile 1 holds the highest
    /// predictions; bucket sizes differ by at most one row.
    pub fn deciles(&self, plan: &QueryPlan) -> Result<Vec<DecileSummary>> {
        let summary = self
            .predictions(plan)?
            .derive("decile", ntile(DECILES, col(PREDICTION), true))?
            .aggregate(
                vec![(DECILE_COLUMNS[0], col("decile"))],
                vec![
                    (DECILE_COLUMNS[1], avg(col(GAIN))),
                    (DECILE_COLUMNS[2], avg(col(PREDICTION))),
                    (DECILE_COLUMNS[3], count()),
                ],
            )?
            .order_by(&[(DECILE_COLUMNS[0], false)])?;
        self.session.collect(&summary)
    }

    /// Decile tables for every subset of a partition.
    pub fn subset_deciles(&self, partitions: &Partitions) -> Result<Vec<SubsetDeciles>> {
        partitions
            .iter()
            .map(|(subset, plan)| {
                let deciles = self.deciles(plan)?;
                info!(subset, buckets = deciles.len(), "Computed decile summary");
                Ok(SubsetDeciles {
                    subset: subset.to_string(),
                    deciles,
                })
            })
            .collect()
    }

    /// Actual vs predicted gain per airline, excluding airlines below the
    /// flight-count threshold. Sorted by mean actual gain, highest first.
    pub fn carrier_summary(&self, plan: &QueryPlan) -> Result<Vec<CarrierSummary>> {
        let summary = self
            .predictions(plan)?
            .aggregate(
                vec![(CARRIER_COLUMNS[0], col(DESCRIPTION))],
                vec![
                    (CARRIER_COLUMNS[1], avg(col(GAIN))),
                    (CARRIER_COLUMNS[2], avg(col(PREDICTION))),
                    (CARRIER_COLUMNS[3], count()),
                ],
            )?
            .filter(col(CARRIER_COLUMNS[3]).ge(lit(self.min_carrier_flights)))?
            .order_by(&[(CARRIER_COLUMNS[1], true), (CARRIER_COLUMNS[0], false)])?;
        let carriers: Vec<CarrierSummary> = self.session.collect(&summary)?;
        info!(
            carriers = carriers.len(),
            min_flights = self.min_carrier_flights,
            "Computed carrier summary"
        );
        Ok(carriers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::{leg, session_with};
    use crate::features::FeaturePipeline;
    use crate::model::{LinearRegression, ModelFormula};
    use crate::partition::Partitioner;
    use flight_domain::{FilterBounds, FlightRecord, YearRange};

    /// Legs spread over three carriers with gain rising with distance.
    fn legs(count: i32) -> Vec<FlightRecord> {
        (0..count)
            .map(|i| {
                let carrier = ["AA", "UA", "DH"][(i % 3) as usize];
                let mut leg = leg(2005, Some(carrier), None, None);
                let dep = 20.0 + f64::from(i % 40) * 3.0;
                let distance = 200.0 + f64::from(i % 23) * 90.0;
                let gain = distance / 100.0 + f64::from(i % 5) - 2.0;
                leg.depdelay = Some(dep);
                leg.arrdelay = Some(dep - gain);
                leg.distance = Some(distance);
                leg.month = 1 + i % 12;
                leg
            })
            .collect()
    }

    fn fitted(session: &Session) -> (QueryPlan, FittedModel) {
        let years = YearRange::new(2003, 2007).unwrap();
        let data = FeaturePipeline::training(FilterBounds::default(), years)
            .build(session)
            .unwrap();
        let model = LinearRegression::new(ModelFormula::gain())
            .fit(session, &data)
            .unwrap();
        (data, model)
    }

    #[test]
    fn test_deciles_partition_ranks_evenly() {
        let session = session_with(&legs(1003));
        let (data, model) = fitted(&session);
        let deciles = Evaluator::new(&session, &model).deciles(&data).unwrap();

        assert_eq!(deciles.len(), 10);
        assert_eq!(deciles.iter().map(|d| d.rows).sum::<i64>(), 1003);
        for (i, d) in deciles.iter().enumerate() {
            assert_eq!(d.decile, i as i64 + 1);
            assert!(d.rows == 100 || d.rows == 101, "decile {} has {}", d.decile, d.rows);
        }
        // Highest predictions land in decile 1.
        for pair in deciles.windows(2) {
            assert!(pair[0].mean_prediction >= pair[1].mean_prediction);
        }
        assert!(deciles[0].mean_gain > deciles[9].mean_gain);
    }

    #[test]
    fn test_subset_deciles_cover_each_subset() {
        let session = session_with(&legs(600));
        let (data, model) = fitted(&session);
        let parts = Partitioner::train_valid(5555, 0.8).unwrap().split(&data).unwrap();
        let tables = Evaluator::new(&session, &model).subset_deciles(&parts).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].subset, "train");
        assert_eq!(tables[1].subset, "valid");
        let rows: i64 = tables
            .iter()
            .flat_map(|t| t.deciles.iter().map(|d| d.rows))
            .sum();
        assert_eq!(rows, 600);
    }

    #[test]
    fn test_carrier_threshold_excludes_small_groups() {
        let mut flights = legs(300);
        flights.extend(
            (0..5).map(|i| leg(2006, Some("ZZ"), Some(30.0 + f64::from(i)), Some(20.0))),
        );
        let session = session_with(&flights);
        let (data, model) = fitted(&session);

        let evaluator = Evaluator::new(&session, &model).with_min_carrier_flights(100);
        let carriers = evaluator.carrier_summary(&data).unwrap();
        assert_eq!(carriers.len(), 3);
        assert!(carriers.iter().all(|c| c.flights >= 100));
        assert!(carriers.iter().all(|c| c.description.is_some()));
        for pair in carriers.windows(2) {
            assert!(pair[0].mean_gain >= pair[1].mean_gain);
        }

        let everyone = Evaluator::new(&session, &model)
            .with_min_carrier_flights(1)
            .carrier_summary(&data)
            .unwrap();
        assert_eq!(everyone.len(), 4);
        let unknown = everyone.iter().find(|c| c.description.is_none()).unwrap();
        assert_eq!(unknown.flights, 5);

        // Default threshold is 10,000 flights.
        assert!(Evaluator::new(&session, &model).carrier_summary(&data).unwrap().is_empty());
    }

    #[test]
    fn test_empty_input_gives_empty_summaries() {
        let session = session_with(&legs(300));
        let (data, model) = fitted(&session);
        let nothing = data.filter(col(GAIN).gt(lit(1_000_000.0))).unwrap();

        let evaluator = Evaluator::new(&session, &model).with_min_carrier_flights(1);
        assert!(evaluator.deciles(&nothing).unwrap().is_empty());
        assert!(evaluator.carrier_summary(&nothing).unwrap().is_empty());
        assert!(evaluator.collect_predictions(&nothing, 10).unwrap().is_empty());
    }

    #[test]
    fn test_collect_predictions() {
        let session = session_with(&legs(90));
        let (data, model) = fitted(&session);
        let rows = Evaluator::new(&session, &model)
            .collect_predictions(&data, 7)
            .unwrap();
        assert_eq!(rows.len(), 7);
        for row in rows {
            assert_eq!(row.gain, row.depdelay - row.arrdelay);
            let expected = model
                .predict(&[row.distance, row.depdelay], row.uniquecarrier.as_deref())
                .unwrap();
            assert!((row.prediction.unwrap() - expected).abs() < 1e-9);
        }
    }
}
