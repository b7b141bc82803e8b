//! # Flight Gain Analytics - Domain Model
//!
//! Source records, filter bounds, carrier correction rules and the summary
//! rows produced by the modeling pipeline. These types are shared by the
//! analytics engine, the synthetic data generator and the CLI.

use serde::{Deserialize, Serialize};

// =============================================================================
// SOURCE RECORDS
// =============================================================================

/// One flight leg as stored in the `flights` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub year: i32,
    pub month: i32,
    pub dayofmonth: i32,
    pub deptime: Option<i32>,
    pub crsdeptime: i32,
    pub arrtime: Option<i32>,
    pub crsarrtime: i32,
    pub uniquecarrier: Option<String>,
    pub flightnum: i32,
    pub origin: String,
    pub dest: String,
    pub depdelay: Option<f64>,
    pub arrdelay: Option<f64>,
    pub distance: Option<f64>,
}

impl FlightRecord {
    /// Minutes made up in flight, when both delays are known.
    #[must_use]
    pub fn gain(&self) -> Option<f64> {
        Some(self.depdelay? - self.arrdelay?)
    }

    /// Whether the carrier code is missing or blank.
    #[must_use]
    pub fn has_blank_carrier(&self) -> bool {
        self.uniquecarrier
            .as_deref()
            .is_none_or(|code| code.trim().is_empty())
    }
}

/// Carrier code to airline name mapping (`airlines` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    pub code: String,
    pub description: String,
}

impl Airline {
    pub fn new(code: &str, description: &str) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
        }
    }
}

/// Airport reference row (`airports` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub faa: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Airport {
    pub fn new(faa: &str, name: &str, lat: f64, lon: f64) -> Self {
        Self {
            faa: faa.to_string(),
            name: name.to_string(),
            lat,
            lon,
        }
    }

    /// Great-circle distance to another airport in statute miles (Haversine formula)
    #[must_use]
    pub fn distance_miles_to(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_MI: f64 = 3958.8;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_MI * c
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// Exclusive lower/upper bound pair in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenInterval {
    pub lower: f64,
    pub upper: f64,
}

impl OpenInterval {
    /// Build an interval, rejecting empty or non-finite ranges.
    pub fn new(lower: f64, upper: f64) -> Result<Self, DomainError> {
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(DomainError::InvalidBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower && value < self.upper
    }
}

/// Delay bounds applied before modeling. Both ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBounds {
    pub depdelay: OpenInterval,
    pub arrdelay: OpenInterval,
}

impl Default for FilterBounds {
    fn default() -> Self {
        Self {
            depdelay: OpenInterval {
                lower: 15.0,
                upper: 240.0,
            },
            arrdelay: OpenInterval {
                lower: -60.0,
                upper: 360.0,
            },
        }
    }
}

impl FilterBounds {
    /// Reference check for a single record, mirroring the query filters.
    #[must_use]
    pub fn admits(&self, record: &FlightRecord, years: YearRange) -> bool {
        match (record.depdelay, record.arrdelay, record.distance) {
            (Some(dep), Some(arr), Some(_)) => {
                self.depdelay.contains(dep)
                    && self.arrdelay.contains(arr)
                    && years.contains(record.year)
            }
            _ => false,
        }
    }
}

/// Inclusive range of years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub first: i32,
    pub last: i32,
}

impl YearRange {
    pub fn new(first: i32, last: i32) -> Result<Self, DomainError> {
        if first > last {
            return Err(DomainError::InvalidYearRange { first, last });
        }
        Ok(Self { first, last })
    }

    #[must_use]
    pub const fn single(year: i32) -> Self {
        Self {
            first: year,
            last: year,
        }
    }

    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        year >= self.first && year <= self.last
    }
}

impl std::str::FromStr for YearRange {
    type Err = DomainError;

    /// Parses `2003-2007` or a single `2008`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |v: &str| {
            v.trim()
                .parse::<i32>()
                .map_err(|_| DomainError::Parse(format!("invalid year '{v}'")))
        };
        match s.split_once('-') {
            Some((first, last)) => Self::new(parse(first)?, parse(last)?),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

// =============================================================================
// CARRIER CORRECTIONS
// =============================================================================

/// Which carrier codes a correction rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum CarrierMatch {
    /// Null or whitespace-only carrier code
    Blank,
    /// Exactly this carrier code
    Code(String),
}

impl CarrierMatch {
    #[must_use]
    pub fn matches(&self, carrier: Option<&str>) -> bool {
        match self {
            Self::Blank => carrier.is_none_or(|c| c.trim().is_empty()),
            Self::Code(code) => carrier == Some(code.as_str()),
        }
    }
}

/// Exact-match override of a carrier code, keyed by scheduled arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierCorrection {
    pub carrier: CarrierMatch,
    pub crsarrtime: i32,
    pub replacement: String,
}

impl CarrierCorrection {
    pub fn blank(crsarrtime: i32, replacement: &str) -> Self {
        Self {
            carrier: CarrierMatch::Blank,
            crsarrtime,
            replacement: replacement.to_string(),
        }
    }

    #[must_use]
    pub fn matches(&self, record: &FlightRecord) -> bool {
        record.crsarrtime == self.crsarrtime
            && self.carrier.matches(record.uniquecarrier.as_deref())
    }

    /// Rules applied to the 2008 scoring pass, where those legs carry a
    /// reused or missing carrier code.
    #[must_use]
    pub fn defaults_2008() -> Vec<Self> {
        vec![
            Self::blank(351, "DH"),
            Self::blank(2255, "TZ"),
            Self::blank(1505, "HP"),
        ]
    }

    /// Apply an ordered rule list; the first matching rule wins.
    #[must_use]
    pub fn apply<'a>(rules: &'a [Self], record: &'a FlightRecord) -> Option<&'a str> {
        rules
            .iter()
            .find(|rule| rule.matches(record))
            .map(|rule| rule.replacement.as_str())
            .or(record.uniquecarrier.as_deref())
    }
}

// =============================================================================
// PIPELINE OUTPUTS
// =============================================================================

/// Modeling record with its prediction, as pulled for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub year: i32,
    pub month: i32,
    pub uniquecarrier: Option<String>,
    pub description: Option<String>,
    pub depdelay: f64,
    pub arrdelay: f64,
    pub distance: f64,
    pub gain: f64,
    pub prediction: Option<f64>,
}

/// Mean actual gain for one predicted-gain decile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecileSummary {
    /// 1 holds the highest predictions, 10 the lowest
    pub decile: i64,
    pub mean_gain: f64,
    pub mean_prediction: f64,
    pub rows: i64,
}

/// Decile table for one partition subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetDeciles {
    pub subset: String,
    pub deciles: Vec<DecileSummary>,
}

/// Actual vs predicted gain for one airline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierSummary {
    pub description: Option<String>,
    pub mean_gain: f64,
    pub mean_prediction: f64,
    pub flights: i64,
}

/// Route-level rollup row (`summary_2008`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRollup {
    pub origin: String,
    pub dest: String,
    pub carrier: Option<String>,
    pub airline: Option<String>,
    pub flights: i64,
    pub distance: f64,
    pub avg_dep_delay: f64,
    pub avg_arr_delay: f64,
    pub avg_gain: f64,
    pub pred_gain: Option<f64>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid bounds: ({lower}, {upper})")]
    InvalidBounds { lower: f64, upper: f64 },

    #[error("Invalid year range: {first}-{last}")]
    InvalidYearRange { first: i32, last: i32 },

    #[error("Parse error: {0}")]
    Parse(String),
}
