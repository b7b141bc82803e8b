//! Source table creation and bulk loading.

use crate::error::Result;
use crate::plan::{quote_ident, quote_str, validate_identifier};
use crate::session::Session;
use duckdb::params;
use flight_domain::{Airline, Airport, FlightRecord};
use std::path::Path;
use tracing::info;

impl Session {
    /// Create the `flights`, `airlines` and `airports` tables if absent.
    pub fn create_source_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Flight legs fact table
            CREATE TABLE IF NOT EXISTS flights (
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                dayofmonth INTEGER NOT NULL,
                deptime INTEGER,
                crsdeptime INTEGER NOT NULL,
                arrtime INTEGER,
                crsarrtime INTEGER NOT NULL,
                uniquecarrier VARCHAR,
                flightnum INTEGER NOT NULL,
                origin VARCHAR NOT NULL,
                dest VARCHAR NOT NULL,
                depdelay DOUBLE,
                arrdelay DOUBLE,
                distance DOUBLE
            );

            -- Carrier reference
            CREATE TABLE IF NOT EXISTS airlines (
                code VARCHAR PRIMARY KEY,
                description VARCHAR NOT NULL
            );

            -- Airport reference
            CREATE TABLE IF NOT EXISTS airports (
                faa VARCHAR PRIMARY KEY,
                name VARCHAR NOT NULL,
                lat DOUBLE NOT NULL,
                lon DOUBLE NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Bulk append flight legs.
    pub fn ingest_flights(&self, flights: &[FlightRecord]) -> Result<usize> {
        let mut appender = self.conn.appender("flights")?;
        for f in flights {
            appender.append_row(params![
                f.year,
                f.month,
                f.dayofmonth,
                f.deptime,
                f.crsdeptime,
                f.arrtime,
                f.crsarrtime,
                f.uniquecarrier,
                f.flightnum,
                f.origin,
                f.dest,
                f.depdelay,
                f.arrdelay,
                f.distance,
            ])?;
        }
        appender.flush()?;
        info!(rows = flights.len(), "Ingested flights");
        Ok(flights.len())
    }

    /// Bulk append carrier descriptions.
    pub fn ingest_airlines(&self, airlines: &[Airline]) -> Result<usize> {
        let mut appender = self.conn.appender("airlines")?;
        for a in airlines {
            appender.append_row(params![a.code, a.description])?;
        }
        appender.flush()?;
        info!(rows = airlines.len(), "Ingested airlines");
        Ok(airlines.len())
    }

    /// Bulk append airports.
    pub fn ingest_airports(&self, airports: &[Airport]) -> Result<usize> {
        let mut appender = self.conn.appender("airports")?;
        for a in airports {
            appender.append_row(params![a.faa, a.name, a.lat, a.lon])?;
        }
        appender.flush()?;
        info!(rows = airports.len(), "Ingested airports");
        Ok(airports.len())
    }

    /// Replace `table` with the contents of a headered CSV file. `NA` cells
    /// load as NULL, matching the public on-time performance extracts.
    pub fn import_csv<P: AsRef<Path>>(&mut self, table: &str, path: P) -> Result<i64> {
        validate_identifier(table)?;
        self.uncache_table(table)?;
        let path = path.as_ref().display().to_string();
        self.conn.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv_auto({}, header = true, nullstr = 'NA')",
            quote_ident(table),
            quote_str(&path),
        ))?;
        let rows = self.count(&self.table(table)?)?;
        info!(table, %path, rows, "Imported CSV");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_create_and_ingest() {
        let session = Session::in_memory().unwrap();
        session.create_source_tables().unwrap();
        session.create_source_tables().unwrap();

        session
            .ingest_airlines(&[Airline::new("AA", "American Airlines Inc.")])
            .unwrap();
        session
            .ingest_airports(&[Airport::new("JFK", "John F Kennedy Intl", 40.64, -73.78)])
            .unwrap();
        session
            .ingest_flights(&[FlightRecord {
                year: 2005,
                month: 3,
                dayofmonth: 9,
                deptime: None,
                crsdeptime: 700,
                arrtime: None,
                crsarrtime: 905,
                uniquecarrier: None,
                flightnum: 12,
                origin: "JFK".to_string(),
                dest: "BOS".to_string(),
                depdelay: None,
                arrdelay: None,
                distance: Some(187.0),
            }])
            .unwrap();

        for table in ["flights", "airlines", "airports"] {
            let plan = session.table(table).unwrap();
            assert_eq!(session.count(&plan).unwrap(), 1, "{table}");
        }
        assert_eq!(session.table("flights").unwrap().columns().len(), 14);
    }

    #[test]
    fn test_import_csv_normalizes_na() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("airlines.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Code,Description").unwrap();
        writeln!(file, "AA,American Airlines Inc.").unwrap();
        writeln!(file, "ZZ,NA").unwrap();
        drop(file);

        let mut session = Session::in_memory().unwrap();
        assert_eq!(session.import_csv("airlines", &path).unwrap(), 2);

        let plan = session.table("airlines").unwrap();
        assert_eq!(plan.columns(), ["code", "description"]);
        let missing = plan.filter(crate::plan::col("description").is_null()).unwrap();
        assert_eq!(session.count(&missing).unwrap(), 1);
    }
}
