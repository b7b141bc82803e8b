//! Route rollup, dashboard bundle and report rendering.

use crate::error::{AnalyticsError, Result};
use crate::features::columns::{
    ARRDELAY, DEPDELAY, DESCRIPTION, DEST, DISTANCE, GAIN, ORIGIN, PREDICTION, UNIQUECARRIER,
};
use crate::features::AIRPORTS_TABLE;
use crate::model::FittedModel;
use crate::plan::{avg, col, count, QueryPlan};
use crate::rows::{AIRPORT_COLUMNS, ROUTE_ROLLUP_COLUMNS};
use crate::session::Session;
use chrono::{DateTime, Utc};
use flight_domain::{Airport, CarrierSummary, RouteRollup, SubsetDeciles};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Default name of the persisted rollup table.
pub const DEFAULT_ROLLUP_TABLE: &str = "summary_2008";

/// Route/carrier rollup over a scored plan.
pub fn route_rollup(scored: &QueryPlan) -> Result<QueryPlan> {
    let [origin, dest, carrier, airline, flights, distance, dep, arr, gain, pred] =
        ROUTE_ROLLUP_COLUMNS;
    scored.clone().aggregate(
        vec![
            (origin, col(ORIGIN)),
            (dest, col(DEST)),
            (carrier, col(UNIQUECARRIER)),
            (airline, col(DESCRIPTION)),
        ],
        vec![
            (flights, count()),
            (distance, avg(col(DISTANCE))),
            (dep, avg(col(DEPDELAY))),
            (arr, avg(col(ARRDELAY))),
            (gain, avg(col(GAIN))),
            (pred, avg(col(PREDICTION))),
        ],
    )
}

/// Airport reference projection shipped with the dashboard bundle.
pub fn airport_projection(session: &Session) -> Result<QueryPlan> {
    session
        .table(AIRPORTS_TABLE)?
        .select(&AIRPORT_COLUMNS)?
        .order_by(&[("faa", false)])
}

/// Everything the dashboard needs, serialized as one local file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardBundle {
    /// Pipeline run that produced the bundle
    pub run_id: Uuid,
    /// Creation time
    pub generated_at: DateTime<Utc>,
    /// Route rollup rows
    pub pred_data: Vec<RouteRollup>,
    /// Airport projection
    pub airports: Vec<Airport>,
    /// Model summary text, one line per element
    pub model_summary: Vec<String>,
}

impl DashboardBundle {
    /// Pull the persisted rollup, the airport projection and the model
    /// summary into local memory.
    pub fn collect(
        session: &Session,
        rollup_table: &str,
        model: &FittedModel,
        run_id: Uuid,
    ) -> Result<Self> {
        let rollup = session
            .table(rollup_table)?
            .require(&ROUTE_ROLLUP_COLUMNS)?
            .select(&ROUTE_ROLLUP_COLUMNS)?
            .order_by(&[("origin", false), ("dest", false), ("carrier", false)])?;
        let pred_data: Vec<RouteRollup> = session.collect(&rollup)?;
        let airports: Vec<Airport> = session.collect(&airport_projection(session)?)?;

        info!(
            routes = pred_data.len(),
            airports = airports.len(),
            "Collected dashboard bundle"
        );

        Ok(Self {
            run_id,
            generated_at: Utc::now(),
            pred_data,
            airports,
            model_summary: model.summary_lines(),
        })
    }

    /// Write the bundle as JSON, replacing any existing file.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), "Wrote dashboard bundle");
        Ok(())
    }

    /// Read a bundle written by [`DashboardBundle::write_to`].
    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(AnalyticsError::from)
    }
}

/// Render evaluation results as Markdown.
pub fn render_markdown(
    model: &FittedModel,
    deciles: &[SubsetDeciles],
    carriers: &[CarrierSummary],
    rollup_table: &str,
    rollup_rows: i64,
) -> String {
    let mut md = String::new();
    md.push_str("# Flight Gain Model Report\n\n");
    md.push_str(&format!("**Generated:** {}\n\n", Utc::now().to_rfc3339()));

    md.push_str("## Model Summary\n\n```text\n");
    md.push_str(&model.summary());
    md.push_str("```\n\n");

    if !deciles.is_empty() {
        md.push_str("## Gain by Predicted Decile\n\n");
        let mut header = String::from("| Decile |");
        let mut rule = String::from("|--------|");
        for table in deciles {
            header.push_str(&format!(" {} |", table.subset));
            rule.push_str("--------|");
        }
        md.push_str(&header);
        md.push('\n');
        md.push_str(&rule);
        md.push('\n');
        let buckets = deciles.iter().map(|t| t.deciles.len()).max().unwrap_or(0);
        for i in 0..buckets {
            md.push_str(&format!("| {} |", i + 1));
            for table in deciles {
                match table.deciles.get(i) {
                    Some(d) => md.push_str(&format!(" {:.2} |", d.mean_gain)),
                    None => md.push_str(" - |"),
                }
            }
            md.push('\n');
        }
        md.push('\n');
    }

    if !carriers.is_empty() {
        md.push_str("## Gain by Airline\n\n");
        md.push_str("| Airline | Flights | Actual Gain | Predicted Gain |\n");
        md.push_str("|---------|---------|-------------|----------------|\n");
        for c in carriers {
            md.push_str(&format!(
                "| {} | {} | {:.2} | {:.2} |\n",
                c.description.as_deref().unwrap_or("Unknown"),
                c.flights,
                c.mean_gain,
                c.mean_prediction
            ));
        }
        md.push('\n');
    }

    md.push_str(&format!(
        "Route rollup persisted to `{rollup_table}` ({rollup_rows} rows).\n"
    ));
    md
}
