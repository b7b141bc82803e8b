//! Row mapping for materialized result sets.

use duckdb::Row;
use flight_domain::{Airport, CarrierSummary, DecileSummary, RouteRollup, ScoredRecord};

/// Build a value from one result row. Columns are read by position, in the
/// order of the `*_COLUMNS` projection paired with each type.
pub trait FromRow: Sized {
    /// Read the current row.
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self>;
}

/// `airports` projection shipped to the dashboard.
pub const AIRPORT_COLUMNS: [&str; 4] = ["name", "faa", "lat", "lon"];

impl FromRow for Airport {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            faa: row.get(1)?,
            lat: row.get(2)?,
            lon: row.get(3)?,
        })
    }
}

/// Decile summary columns.
pub const DECILE_COLUMNS: [&str; 4] = ["decile", "mean_gain", "mean_prediction", "rows"];

impl FromRow for DecileSummary {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            decile: row.get(0)?,
            mean_gain: row.get(1)?,
            mean_prediction: row.get::<_, Option<f64>>(2)?.unwrap_or(f64::NAN),
            rows: row.get(3)?,
        })
    }
}

/// Carrier summary columns.
pub const CARRIER_COLUMNS: [&str; 4] = ["description", "mean_gain", "mean_prediction", "flights"];

impl FromRow for CarrierSummary {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            description: row.get(0)?,
            mean_gain: row.get(1)?,
            mean_prediction: row.get::<_, Option<f64>>(2)?.unwrap_or(f64::NAN),
            flights: row.get(3)?,
        })
    }
}

/// Route rollup columns, as persisted.
pub const ROUTE_ROLLUP_COLUMNS: [&str; 10] = [
    "origin",
    "dest",
    "carrier",
    "airline",
    "flights",
    "distance",
    "avg_dep_delay",
    "avg_arr_delay",
    "avg_gain",
    "pred_gain",
];

impl FromRow for RouteRollup {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            origin: row.get(0)?,
            dest: row.get(1)?,
            carrier: row.get(2)?,
            airline: row.get(3)?,
            flights: row.get(4)?,
            distance: row.get(5)?,
            avg_dep_delay: row.get(6)?,
            avg_arr_delay: row.get(7)?,
            avg_gain: row.get(8)?,
            pred_gain: row.get(9)?,
        })
    }
}

/// Scored record columns.
pub const SCORED_COLUMNS: [&str; 9] = [
    "year",
    "month",
    "uniquecarrier",
    "description",
    "depdelay",
    "arrdelay",
    "distance",
    "gain",
    "prediction",
];

impl FromRow for ScoredRecord {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            year: row.get(0)?,
            month: row.get(1)?,
            uniquecarrier: row.get(2)?,
            description: row.get(3)?,
            depdelay: row.get(4)?,
            arrdelay: row.get(5)?,
            distance: row.get(6)?,
            gain: row.get(7)?,
            prediction: row.get(8)?,
        })
    }
}
