//! # Pipeline Configuration
//!
//! Environment-based configuration for a pipeline run.

use crate::error::{AnalyticsError, Result};
use crate::evaluate::DEFAULT_MIN_CARRIER_FLIGHTS;
use crate::plan::validate_identifier;
use crate::reports::DEFAULT_ROLLUP_TABLE;
use crate::session::SessionConfig;
use flight_domain::{CarrierCorrection, FilterBounds, YearRange};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default seed for the train/valid split.
pub const DEFAULT_SEED: u64 = 5555;

/// Default share of modeling rows in the `train` subset.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

/// Default dashboard bundle location.
pub const DEFAULT_ARTIFACT_PATH: &str = "flights_pred_2008.json";

/// Pipeline run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Compute session address and engine options
    pub session: SessionConfig,

    /// Years used to fit the model
    pub train_years: YearRange,

    /// Year scored with the fitted model
    pub scoring_year: i32,

    /// Delay bounds for both passes
    pub bounds: FilterBounds,

    /// Partition seed
    pub seed: u64,

    /// Share of rows in `train`; the rest go to `valid`
    pub train_ratio: f64,

    /// Carrier summary threshold
    pub min_carrier_flights: i64,

    /// Table the route rollup is written to
    pub output_table: String,

    /// Dashboard bundle path
    pub artifact_path: PathBuf,

    /// Carrier code overrides for the scoring pass
    pub corrections: Vec<CarrierCorrection>,

    /// Also apply `corrections` to the training pass
    pub correct_training_carriers: bool,
}

impl PipelineConfig {
    /// Load configuration from `FLIGHTS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut session = SessionConfig::new(
            &lookup("FLIGHTS_MASTER").unwrap_or(defaults.session.master),
        );
        if let Some(options) = lookup("FLIGHTS_ENGINE_OPTIONS") {
            session.options = parse_engine_options(&options)?;
        }

        let config = Self {
            session,
            train_years: match lookup("FLIGHTS_TRAIN_YEARS") {
                Some(years) => years.parse()?,
                None => defaults.train_years,
            },
            scoring_year: parse_var(&lookup, "FLIGHTS_SCORING_YEAR")?
                .unwrap_or(defaults.scoring_year),
            bounds: defaults.bounds,
            seed: parse_var(&lookup, "FLIGHTS_SEED")?.unwrap_or(defaults.seed),
            train_ratio: parse_var(&lookup, "FLIGHTS_TRAIN_RATIO")?
                .unwrap_or(defaults.train_ratio),
            min_carrier_flights: parse_var(&lookup, "FLIGHTS_MIN_CARRIER_FLIGHTS")?
                .unwrap_or(defaults.min_carrier_flights),
            output_table: lookup("FLIGHTS_OUTPUT_TABLE").unwrap_or(defaults.output_table),
            artifact_path: lookup("FLIGHTS_ARTIFACT_PATH")
                .map_or(defaults.artifact_path, PathBuf::from),
            corrections: defaults.corrections,
            correct_training_carriers: lookup("FLIGHTS_CORRECT_TRAINING_CARRIERS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.correct_training_carriers),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail later in the run.
    pub fn validate(&self) -> Result<()> {
        YearRange::new(self.train_years.first, self.train_years.last)?;
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "train ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        if self.min_carrier_flights < 0 {
            return Err(AnalyticsError::InvalidParameter(format!(
                "min carrier flights must not be negative, got {}",
                self.min_carrier_flights
            )));
        }
        validate_identifier(&self.output_table)?;
        if self.session.master.is_empty() {
            return Err(AnalyticsError::InvalidParameter(
                "master address is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::local(),
            train_years: YearRange {
                first: 2003,
                last: 2007,
            },
            scoring_year: 2008,
            bounds: FilterBounds::default(),
            seed: DEFAULT_SEED,
            train_ratio: DEFAULT_TRAIN_RATIO,
            min_carrier_flights: DEFAULT_MIN_CARRIER_FLIGHTS,
            output_table: DEFAULT_ROLLUP_TABLE.to_string(),
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            corrections: CarrierCorrection::defaults_2008(),
            correct_training_carriers: false,
        }
    }
}

/// Parse `key=value,key=value` engine options.
pub fn parse_engine_options(raw: &str) -> Result<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(parse_engine_option)
        .collect()
}

/// Parse a single `key=value` engine option.
pub fn parse_engine_option(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(AnalyticsError::InvalidParameter(format!(
            "engine option '{pair}' is not key=value"
        ))),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|_| {
                AnalyticsError::InvalidParameter(format!("{key} has invalid value '{raw}'"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.train_years, YearRange::new(2003, 2007).unwrap());
        assert_eq!(config.scoring_year, 2008);
        assert_eq!(config.seed, 5555);
        assert_eq!(config.min_carrier_flights, 10_000);
        assert_eq!(config.output_table, "summary_2008");
        assert_eq!(config.corrections.len(), 3);
        assert!(!config.correct_training_carriers);
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("FLIGHTS_MASTER", "/data/flights.duckdb"),
            ("FLIGHTS_ENGINE_OPTIONS", "threads=4, memory_limit=2GB"),
            ("FLIGHTS_TRAIN_YEARS", "2004-2006"),
            ("FLIGHTS_SCORING_YEAR", "2007"),
            ("FLIGHTS_SEED", "42"),
            ("FLIGHTS_TRAIN_RATIO", "0.7"),
            ("FLIGHTS_MIN_CARRIER_FLIGHTS", "500"),
            ("FLIGHTS_OUTPUT_TABLE", "summary_2007"),
            ("FLIGHTS_ARTIFACT_PATH", "out/pred.json"),
            ("FLIGHTS_CORRECT_TRAINING_CARRIERS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.session.master, "/data/flights.duckdb");
        assert_eq!(config.session.options["threads"], "4");
        assert_eq!(config.session.options["memory_limit"], "2GB");
        assert_eq!(config.train_years, YearRange::new(2004, 2006).unwrap());
        assert_eq!(config.scoring_year, 2007);
        assert_eq!(config.seed, 42);
        assert_eq!(config.min_carrier_flights, 500);
        assert_eq!(config.output_table, "summary_2007");
        assert_eq!(config.artifact_path, PathBuf::from("out/pred.json"));
        assert!(config.correct_training_carriers);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(PipelineConfig::from_lookup(lookup(&[("FLIGHTS_TRAIN_YEARS", "2007-2003")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("FLIGHTS_TRAIN_RATIO", "1.0")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("FLIGHTS_SEED", "abc")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("FLIGHTS_OUTPUT_TABLE", "drop table")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("FLIGHTS_ENGINE_OPTIONS", "threads")])).is_err());
    }

    #[test]
    fn test_validate_catches_inverted_years() {
        let config = PipelineConfig {
            train_years: YearRange {
                first: 2008,
                last: 2003,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalyticsError::Domain(_))
        ));
    }

    #[test]
    fn test_engine_option_parsing() {
        let options = parse_engine_options(" threads=2 ,,access_mode=READ_WRITE").unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options["access_mode"], "READ_WRITE");
        assert!(parse_engine_option("=1").is_err());
    }
}
