//! Flight leg generation.

use crate::reference::{reference_airlines, reference_airports, CARRIERS};
use flight_domain::{Airline, Airport, CarrierCorrection, FlightRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Minutes in a day.
const DAY_MINUTES: i32 = 24 * 60;

/// Share of flown legs that leave early or less than 15 minutes late.
const ON_TIME_SHARE: f64 = 0.45;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Invalid year range: {first} to {last}")]
    InvalidYears { first: i32, last: i32 },

    #[error("Invalid rate '{name}': {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("Distribution error: {0}")]
    Distribution(String),
}

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub seed: u64,
    pub first_year: i32,
    pub last_year: i32,
    pub flights_per_month: usize,
    /// Blank-carrier legs added per month of the last year.
    pub blank_carrier_legs: usize,
    pub cancellation_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 5555,
            first_year: 2003,
            last_year: 2008,
            flights_per_month: 2_000,
            blank_carrier_legs: 30,
            cancellation_rate: 0.02,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.first_year > self.last_year {
            return Err(SimulatorError::InvalidYears {
                first: self.first_year,
                last: self.last_year,
            });
        }
        if !(0.0..1.0).contains(&self.cancellation_rate) {
            return Err(SimulatorError::InvalidRate {
                name: "cancellation_rate",
                value: self.cancellation_rate,
            });
        }
        Ok(())
    }
}

/// Airlines, airports and flights produced in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDataset {
    pub airlines: Vec<Airline>,
    pub airports: Vec<Airport>,
    pub flights: Vec<FlightRecord>,
}

/// Seeded flight leg generator.
///
/// Expected gain grows with distance and departure delay and shifts by
/// carrier, so a linear model on those terms has something to find.
pub struct FlightGenerator {
    config: SimulatorConfig,
    airports: Vec<Airport>,
    rng: StdRng,
    late_departure: LogNormal<f64>,
    noise: Normal<f64>,
}

impl FlightGenerator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let late_departure =
            LogNormal::new(3.0, 0.9).map_err(|e| SimulatorError::Distribution(e.to_string()))?;
        let noise =
            Normal::new(0.0, 4.0).map_err(|e| SimulatorError::Distribution(e.to_string()))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            airports: reference_airports(),
            config,
            late_departure,
            noise,
        })
    }

    pub const fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Generate every year and month in the configured range.
    pub fn generate(&mut self) -> SyntheticDataset {
        let months = (self.config.last_year - self.config.first_year + 1) * 12;
        let mut flights = Vec::with_capacity(
            usize::try_from(months).unwrap_or(0) * self.config.flights_per_month,
        );

        for year in self.config.first_year..=self.config.last_year {
            for month in 1..=12 {
                for _ in 0..self.config.flights_per_month {
                    let carrier = self.rng.gen_range(0..CARRIERS.len());
                    let (code, _, shift) = CARRIERS[carrier];
                    let arrival = self.rng.gen_range(420..DAY_MINUTES);
                    let leg = self.leg(year, month, Some(code.to_string()), shift, arrival);
                    flights.push(leg);
                }
                if year == self.config.last_year {
                    self.blank_carrier_legs(year, month, &mut flights);
                }
            }
            debug!(year, flights = flights.len(), "Generated year");
        }

        info!(
            flights = flights.len(),
            first_year = self.config.first_year,
            last_year = self.config.last_year,
            seed = self.config.seed,
            "Generated synthetic dataset"
        );

        SyntheticDataset {
            airlines: reference_airlines(),
            airports: self.airports.clone(),
            flights,
        }
    }

    /// Legs with a blank carrier code whose scheduled arrival identifies the
    /// airline under the default correction rules.
    fn blank_carrier_legs(&mut self, year: i32, month: i32, flights: &mut Vec<FlightRecord>) {
        let rules = CarrierCorrection::defaults_2008();
        for i in 0..self.config.blank_carrier_legs {
            let rule = &rules[i % rules.len()];
            let shift = CARRIERS
                .iter()
                .find(|(code, _, _)| *code == rule.replacement)
                .map_or(0.0, |(_, _, shift)| *shift);
            let carrier = if i % 2 == 0 { Some(String::new()) } else { None };
            let arrival = from_hhmm(rule.crsarrtime);
            flights.push(self.leg(year, month, carrier, shift, arrival));
        }
    }

    fn leg(
        &mut self,
        year: i32,
        month: i32,
        carrier: Option<String>,
        shift: f64,
        crs_arrival: i32,
    ) -> FlightRecord {
        let origin = self.rng.gen_range(0..self.airports.len());
        let mut dest = self.rng.gen_range(0..self.airports.len() - 1);
        if dest >= origin {
            dest += 1;
        }
        let distance = self.airports[origin]
            .distance_miles_to(&self.airports[dest])
            .round();

        // Block time at roughly 450 mph plus taxi.
        let block = (distance / 7.5).round() as i32 + 25;
        let crs_departure = (crs_arrival - block).rem_euclid(DAY_MINUTES);

        let cancelled = self.rng.gen_bool(self.config.cancellation_rate);
        let (depdelay, arrdelay) = if cancelled {
            (None, None)
        } else {
            let dep = if self.rng.gen_bool(ON_TIME_SHARE) {
                f64::from(self.rng.gen_range(-10..15))
            } else {
                15.0 + self.late_departure.sample(&mut self.rng).round()
            };
            let gain = shift + 0.004 * distance + 0.03 * dep + self.noise.sample(&mut self.rng);
            (Some(dep), Some((dep - gain).round()))
        };

        FlightRecord {
            year,
            month,
            dayofmonth: self.rng.gen_range(1..=28),
            deptime: depdelay.map(|d| to_hhmm(crs_departure + d as i32)),
            crsdeptime: to_hhmm(crs_departure),
            arrtime: arrdelay.map(|d| to_hhmm(crs_arrival + d as i32)),
            crsarrtime: to_hhmm(crs_arrival),
            uniquecarrier: carrier,
            flightnum: self.rng.gen_range(1..4000),
            origin: self.airports[origin].faa.clone(),
            dest: self.airports[dest].faa.clone(),
            depdelay,
            arrdelay,
            distance: Some(distance),
        }
    }
}

/// Minutes after midnight, wrapped to one day, as `hhmm`.
fn to_hhmm(minutes: i32) -> i32 {
    let m = minutes.rem_euclid(DAY_MINUTES);
    (m / 60) * 100 + m % 60
}

fn from_hhmm(hhmm: i32) -> i32 {
    (hhmm / 100) * 60 + hhmm % 100
}
