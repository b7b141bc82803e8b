//! End-to-end batch run: connect, cache, build features, split, fit,
//! evaluate, persist the rollup and export the dashboard bundle.
//!
//! Every stage runs inside its own tracing span and tags its errors with the
//! stage name, so a failed run reports where it stopped.

use crate::config::PipelineConfig;
use crate::error::{AnalyticsError, Result, StageContext};
use crate::evaluate::Evaluator;
use crate::features::{FeaturePipeline, AIRLINES_TABLE, FLIGHTS_TABLE};
use crate::model::{FittedModel, LinearRegression, ModelFormula};
use crate::partition::Partitioner;
use crate::plan::QueryPlan;
use crate::reports::{render_markdown, route_rollup, DashboardBundle};
use crate::session::Session;
use flight_domain::{CarrierSummary, SubsetDeciles};
use std::fmt::Write;
use std::path::PathBuf;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Subset the model is fitted on.
const TRAIN_SUBSET: &str = "train";

/// Source tables made resident before the features are built.
const CACHED_TABLES: [&str; 2] = [FLIGHTS_TABLE, AIRLINES_TABLE];

/// Results of a completed run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Run identifier, also written to the bundle
    pub run_id: Uuid,
    /// Fitted model
    pub model: FittedModel,
    /// Row count per partition subset
    pub subset_rows: Vec<(String, i64)>,
    /// Decile table per subset
    pub deciles: Vec<SubsetDeciles>,
    /// Scoring-year airline summary
    pub carriers: Vec<CarrierSummary>,
    /// Scoring-year carrier levels absent from training, scored at baseline
    pub unseen_levels: Vec<(String, i64)>,
    /// Rows in the scoring dataset
    pub scored_rows: i64,
    /// Table holding the route rollup
    pub output_table: String,
    /// Rows written to `output_table`
    pub rollup_rows: i64,
    /// Dashboard bundle location
    pub artifact_path: PathBuf,
}

impl PipelineOutcome {
    /// Markdown report of the run.
    pub fn to_markdown(&self) -> String {
        let mut md = render_markdown(
            &self.model,
            &self.deciles,
            &self.carriers,
            &self.output_table,
            self.rollup_rows,
        );

        md.push_str("\n## Run Details\n\n");
        let _ = writeln!(md, "- **Run ID:** {}", self.run_id);
        for (subset, rows) in &self.subset_rows {
            let _ = writeln!(md, "- **{subset} rows:** {rows}");
        }
        let _ = writeln!(md, "- **Scored rows:** {}", self.scored_rows);
        let _ = writeln!(md, "- **Dashboard bundle:** `{}`", self.artifact_path.display());
        if !self.unseen_levels.is_empty() {
            let levels: Vec<String> = self
                .unseen_levels
                .iter()
                .map(|(level, rows)| format!("{} ({rows})", display_level(level)))
                .collect();
            let _ = writeln!(
                md,
                "- **Carriers scored at baseline:** {}",
                levels.join(", ")
            );
        }
        md
    }
}

fn display_level(level: &str) -> &str {
    if level.is_empty() { "(blank)" } else { level }
}

/// Linear batch runner over a [`PipelineConfig`].
pub struct FlightPipeline {
    config: PipelineConfig,
}

impl FlightPipeline {
    /// Runner for `config`.
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run configuration.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the configuration, open a session and run every stage.
    pub fn run(&self) -> Result<PipelineOutcome> {
        self.config.validate().stage("config")?;
        let mut session = info_span!("stage", name = "connect")
            .in_scope(|| Session::connect(&self.config.session))
            .stage("connect")?;
        self.run_with(&mut session)
    }

    /// Run every stage on an already open session.
    pub fn run_with(&self, session: &mut Session) -> Result<PipelineOutcome> {
        let config = &self.config;
        let run_id = Uuid::now_v7();
        let _run = info_span!("pipeline", %run_id).entered();
        info!(
            master = session.master(),
            train_years = ?config.train_years,
            scoring_year = config.scoring_year,
            seed = config.seed,
            "Starting pipeline run"
        );

        info_span!("stage", name = "cache")
            .in_scope(|| -> Result<_> {
                for table in CACHED_TABLES {
                    session.cache_table(table)?;
                }
                Ok(())
            })
            .stage("cache")?;

        let (training, scoring) = info_span!("stage", name = "features")
            .in_scope(|| self.feature_plans(session))
            .stage("features")?;

        let (partitions, subset_rows) = info_span!("stage", name = "partition")
            .in_scope(|| -> Result<_> {
                let partitions =
                    Partitioner::train_valid(config.seed, config.train_ratio)?.split(&training)?;
                let mut subset_rows = Vec::with_capacity(partitions.len());
                for (subset, plan) in partitions.iter() {
                    let rows = session.count(plan)?;
                    info!(subset, rows, "Partitioned modeling data");
                    subset_rows.push((subset.to_string(), rows));
                }
                if let Some((subset, _)) = subset_rows.iter().find(|(_, rows)| *rows == 0) {
                    return Err(AnalyticsError::InvalidPartition(format!(
                        "subset '{subset}' is empty after filtering"
                    )));
                }
                Ok((partitions, subset_rows))
            })
            .stage("partition")?;

        let model = info_span!("stage", name = "train")
            .in_scope(|| -> Result<_> {
                let train = partitions.subset(TRAIN_SUBSET)?;
                LinearRegression::new(ModelFormula::gain()).fit(session, train)
            })
            .stage("train")?;

        let (deciles, carriers, unseen_levels, scored_rows) = info_span!("stage", name = "evaluate")
            .in_scope(|| -> Result<_> {
                let evaluator = Evaluator::new(session, &model)
                    .with_min_carrier_flights(config.min_carrier_flights);
                let deciles = evaluator.subset_deciles(&partitions)?;
                let carriers = evaluator.carrier_summary(&scoring)?;
                let unseen = model.unseen_levels(session, &scoring)?;
                for (level, rows) in &unseen {
                    warn!(
                        level = display_level(level),
                        rows, "Carrier not seen in training, scored at baseline"
                    );
                }
                let scored_rows = session.count(&scoring)?;
                Ok((deciles, carriers, unseen, scored_rows))
            })
            .stage("evaluate")?;

        let rollup_rows = info_span!("stage", name = "report")
            .in_scope(|| -> Result<_> {
                let rollup = route_rollup(&model.score(scoring)?)?;
                session.save_table(&rollup, &config.output_table)
            })
            .stage("report")?;

        info_span!("stage", name = "export")
            .in_scope(|| -> Result<_> {
                DashboardBundle::collect(session, &config.output_table, &model, run_id)?
                    .write_to(&config.artifact_path)
            })
            .stage("export")?;

        info!(
            rollup_rows,
            scored_rows,
            r_squared = model.r_squared(),
            "Pipeline run complete"
        );

        Ok(PipelineOutcome {
            run_id,
            model,
            subset_rows,
            deciles,
            carriers,
            unseen_levels,
            scored_rows,
            output_table: config.output_table.clone(),
            rollup_rows,
            artifact_path: config.artifact_path.clone(),
        })
    }

    /// Lazy training and scoring datasets.
    fn feature_plans(&self, session: &Session) -> Result<(QueryPlan, QueryPlan)> {
        let config = &self.config;
        let mut training = FeaturePipeline::training(config.bounds, config.train_years);
        if config.correct_training_carriers {
            training = training.with_corrections(config.corrections.clone());
        } else if !config.corrections.is_empty() {
            warn!(
                rules = config.corrections.len(),
                "Carrier corrections apply to the scoring pass only"
            );
        }
        let scoring = FeaturePipeline::scoring(
            config.bounds,
            config.scoring_year,
            config.corrections.clone(),
        );
        Ok((training.build(session)?, scoring.build(session)?))
    }
}
