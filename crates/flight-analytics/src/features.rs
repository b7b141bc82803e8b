//! Modeling dataset construction.
//!
//! Filters raw flight legs to the delay window being modeled, optionally
//! repairs carrier codes, attaches the airline description and derives
//! `gain`. The result is a lazy [`QueryPlan`]; nothing executes here.

use crate::error::Result;
use crate::plan::{col, lit, trim, Expr, QueryPlan};
use crate::session::Session;
use flight_domain::{CarrierCorrection, CarrierMatch, FilterBounds, YearRange};

/// Column names of the source and modeling tables.
pub mod columns {
    #![allow(missing_docs)]

    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const CRSARRTIME: &str = "crsarrtime";
    pub const UNIQUECARRIER: &str = "uniquecarrier";
    pub const ORIGIN: &str = "origin";
    pub const DEST: &str = "dest";
    pub const DEPDELAY: &str = "depdelay";
    pub const ARRDELAY: &str = "arrdelay";
    pub const DISTANCE: &str = "distance";
    pub const CODE: &str = "code";
    pub const DESCRIPTION: &str = "description";
    pub const GAIN: &str = "gain";
    pub const PREDICTION: &str = "prediction";
}

use columns::{
    ARRDELAY, CODE, CRSARRTIME, DEPDELAY, DESCRIPTION, DEST, DISTANCE, GAIN, MONTH, ORIGIN,
    UNIQUECARRIER, YEAR,
};

/// Flight legs source table.
pub const FLIGHTS_TABLE: &str = "flights";
/// Carrier reference table.
pub const AIRLINES_TABLE: &str = "airlines";
/// Airport reference table.
pub const AIRPORTS_TABLE: &str = "airports";

/// Flight columns the modeling plan reads.
const REQUIRED_FLIGHT_COLUMNS: [&str; 9] = [
    YEAR,
    MONTH,
    CRSARRTIME,
    UNIQUECARRIER,
    ORIGIN,
    DEST,
    DEPDELAY,
    ARRDELAY,
    DISTANCE,
];

/// Columns kept for model training.
pub const TRAINING_COLUMNS: [&str; 8] = [
    YEAR,
    MONTH,
    ARRDELAY,
    DEPDELAY,
    DISTANCE,
    UNIQUECARRIER,
    DESCRIPTION,
    GAIN,
];

/// Columns kept for scoring; adds the route so results can be rolled up.
pub const SCORING_COLUMNS: [&str; 10] = [
    YEAR,
    MONTH,
    ARRDELAY,
    DEPDELAY,
    DISTANCE,
    UNIQUECARRIER,
    DESCRIPTION,
    GAIN,
    ORIGIN,
    DEST,
];

/// Builder for the modeling dataset plan.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    bounds: FilterBounds,
    years: YearRange,
    corrections: Vec<CarrierCorrection>,
    projection: &'static [&'static str],
}

impl FeaturePipeline {
    /// Training pass: no carrier corrections.
    pub fn training(bounds: FilterBounds, years: YearRange) -> Self {
        Self {
            bounds,
            years,
            corrections: Vec::new(),
            projection: &TRAINING_COLUMNS,
        }
    }

    /// Scoring pass for a single year, with carrier corrections applied
    /// before the airline join.
    pub fn scoring(
        bounds: FilterBounds,
        year: i32,
        corrections: Vec<CarrierCorrection>,
    ) -> Self {
        Self {
            bounds,
            years: YearRange::single(year),
            corrections,
            projection: &SCORING_COLUMNS,
        }
    }

    /// Replace the correction rules.
    #[must_use]
    pub fn with_corrections(mut self, corrections: Vec<CarrierCorrection>) -> Self {
        self.corrections = corrections;
        self
    }

    /// Correction rules in match order.
    pub fn corrections(&self) -> &[CarrierCorrection] {
        &self.corrections
    }

    /// Years admitted by the filter.
    pub const fn years(&self) -> YearRange {
        self.years
    }

    /// Predicate selecting rows eligible for modeling.
    pub fn eligibility(&self) -> Expr {
        let b = &self.bounds;
        col(DEPDELAY)
            .is_not_null()
            .and(col(ARRDELAY).is_not_null())
            .and(col(DISTANCE).is_not_null())
            .and(col(DEPDELAY).between_exclusive(b.depdelay.lower, b.depdelay.upper))
            .and(col(ARRDELAY).between_exclusive(b.arrdelay.lower, b.arrdelay.upper))
            .and(col(YEAR).between_inclusive(self.years.first, self.years.last))
    }

    /// Carrier expression with correction rules applied, or `None` when there
    /// are no rules.
    pub fn corrected_carrier(&self) -> Option<Expr> {
        if self.corrections.is_empty() {
            return None;
        }
        let branches = self
            .corrections
            .iter()
            .map(|rule| {
                let carrier = match &rule.carrier {
                    CarrierMatch::Blank => col(UNIQUECARRIER)
                        .is_null()
                        .or(trim(col(UNIQUECARRIER)).equals(lit(""))),
                    CarrierMatch::Code(code) => col(UNIQUECARRIER).equals(lit(code.as_str())),
                };
                let when = carrier.and(col(CRSARRTIME).equals(lit(rule.crsarrtime)));
                (when, lit(rule.replacement.as_str()))
            })
            .collect();
        Some(Expr::Case {
            branches,
            otherwise: Box::new(col(UNIQUECARRIER)),
        })
    }

    /// Build the lazy modeling dataset.
    pub fn build(&self, session: &Session) -> Result<QueryPlan> {
        let flights = session
            .table(FLIGHTS_TABLE)?
            .require(&REQUIRED_FLIGHT_COLUMNS)?;
        let airlines = session
            .table(AIRLINES_TABLE)?
            .require(&[CODE, DESCRIPTION])?
            .select(&[CODE, DESCRIPTION])?;

        let mut plan = flights.filter(self.eligibility())?;
        if let Some(carrier) = self.corrected_carrier() {
            plan = plan.derive(UNIQUECARRIER, carrier)?;
        }
        plan.left_join(&airlines, UNIQUECARRIER, CODE, &[DESCRIPTION])?
            .derive(GAIN, col(DEPDELAY) - col(ARRDELAY))?
            .select(self.projection)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rows::FromRow;
    use flight_domain::{Airline, FlightRecord};

    pub(crate) fn leg(year: i32, carrier: Option<&str>, dep: Option<f64>, arr: Option<f64>) -> FlightRecord {
        FlightRecord {
            year,
            month: 7,
            dayofmonth: 4,
            deptime: Some(1015),
            crsdeptime: 1000,
            arrtime: Some(1230),
            crsarrtime: 1215,
            uniquecarrier: carrier.map(str::to_string),
            flightnum: 42,
            origin: "ORD".to_string(),
            dest: "LGA".to_string(),
            depdelay: dep,
            arrdelay: arr,
            distance: Some(733.0),
        }
    }

    pub(crate) fn session_with(flights: &[FlightRecord]) -> Session {
        let session = Session::in_memory().unwrap();
        session.create_source_tables().unwrap();
        session
            .ingest_airlines(&[
                Airline::new("AA", "American Airlines Inc."),
                Airline::new("DH", "Independence Air"),
                Airline::new("UA", "United Air Lines Inc."),
            ])
            .unwrap();
        session.ingest_flights(flights).unwrap();
        session
    }

    struct Modeled {
        year: i32,
        carrier: Option<String>,
        description: Option<String>,
        depdelay: f64,
        arrdelay: f64,
        gain: f64,
    }

    impl FromRow for Modeled {
        fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
            Ok(Self {
                year: row.get(0)?,
                carrier: row.get(5)?,
                description: row.get(6)?,
                depdelay: row.get(3)?,
                arrdelay: row.get(2)?,
                gain: row.get(7)?,
            })
        }
    }

    fn training() -> FeaturePipeline {
        FeaturePipeline::training(FilterBounds::default(), YearRange::new(2003, 2007).unwrap())
    }

    #[test]
    fn test_passing_row_yields_gain() {
        let mut aa = leg(2005, Some("AA"), Some(20.0), Some(5.0));
        aa.distance = Some(500.0);
        let session = session_with(&[aa]);

        let plan = training().build(&session).unwrap();
        assert_eq!(plan.columns(), TRAINING_COLUMNS);
        let rows: Vec<Modeled> = session.collect(&plan).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].gain, 15.0);
        assert_eq!(rows[0].description.as_deref(), Some("American Airlines Inc."));
    }

    #[test]
    fn test_filters_hold_for_every_row() {
        let mut no_distance = leg(2004, Some("AA"), Some(30.0), Some(10.0));
        no_distance.distance = None;
        let session = session_with(&[
            leg(2005, Some("AA"), Some(10.0), Some(5.0)),
            leg(2005, Some("AA"), Some(15.0), Some(5.0)),
            leg(2005, Some("AA"), Some(240.0), Some(5.0)),
            leg(2005, Some("AA"), Some(60.0), Some(-60.0)),
            leg(2005, Some("AA"), Some(60.0), Some(360.0)),
            leg(2005, Some("AA"), None, Some(5.0)),
            leg(2005, Some("AA"), Some(60.0), None),
            leg(2002, Some("AA"), Some(60.0), Some(5.0)),
            leg(2008, Some("AA"), Some(60.0), Some(5.0)),
            no_distance,
            leg(2003, Some("UA"), Some(16.0), Some(-59.0)),
            leg(2007, Some("AA"), Some(239.0), Some(359.0)),
        ]);

        let rows: Vec<Modeled> = session.collect(&training().build(&session).unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.depdelay > 15.0 && row.depdelay < 240.0);
            assert!(row.arrdelay > -60.0 && row.arrdelay < 360.0);
            assert!((2003..=2007).contains(&row.year));
            assert_eq!(row.gain, row.depdelay - row.arrdelay);
        }
    }

    #[test]
    fn test_unmatched_carrier_keeps_null_description() {
        let session = session_with(&[leg(2006, Some("ZZ"), Some(45.0), Some(30.0))]);
        let rows: Vec<Modeled> = session.collect(&training().build(&session).unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].carrier.as_deref(), Some("ZZ"));
        assert!(rows[0].description.is_none());
    }

    #[test]
    fn test_scoring_pass_remaps_blank_carrier() {
        let mut blank = leg(2008, Some(""), Some(40.0), Some(25.0));
        blank.crsarrtime = 351;
        let mut null = leg(2008, None, Some(40.0), Some(25.0));
        null.crsarrtime = 351;
        let other_time = leg(2008, None, Some(40.0), Some(25.0));
        let session = session_with(&[blank, null, other_time]);

        let scoring = FeaturePipeline::scoring(
            FilterBounds::default(),
            2008,
            CarrierCorrection::defaults_2008(),
        );
        let plan = scoring.build(&session).unwrap();
        assert_eq!(plan.columns(), SCORING_COLUMNS);

        let mut rows: Vec<Modeled> = session.collect(&plan).unwrap();
        rows.sort_by(|a, b| a.carrier.cmp(&b.carrier));
        assert_eq!(rows.len(), 3);
        assert!(rows[0].carrier.is_none());
        assert!(rows[0].description.is_none());
        for row in &rows[1..] {
            assert_eq!(row.carrier.as_deref(), Some("DH"));
            assert_eq!(row.description.as_deref(), Some("Independence Air"));
        }
    }

    #[test]
    fn test_training_pass_leaves_carriers_alone() {
        let mut blank = leg(2005, None, Some(40.0), Some(25.0));
        blank.crsarrtime = 351;
        let session = session_with(&[blank]);
        let rows: Vec<Modeled> = session.collect(&training().build(&session).unwrap()).unwrap();
        assert!(rows[0].carrier.is_none());
    }

    #[test]
    fn test_schema_mismatch_names_table() {
        let session = Session::in_memory().unwrap();
        session
            .conn
            .execute_batch(
                "CREATE TABLE flights (year INTEGER, month INTEGER);
                 CREATE TABLE airlines (code VARCHAR, description VARCHAR);",
            )
            .unwrap();
        match training().build(&session) {
            Err(crate::AnalyticsError::SchemaMismatch { table, .. }) => {
                assert_eq!(table, "flights");
            }
            other => panic!("unexpected: {:?}", other.map(|p| p.to_sql())),
        }
    }
}
