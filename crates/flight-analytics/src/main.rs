//! # Flight Notebook CLI
//!
//! Runs the delay-gain pipeline, or seeds a database file with synthetic data.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use flight_analytics::config::parse_engine_option;
use flight_analytics::{FlightPipeline, PipelineConfig, Session, SessionConfig};
use flight_simulator::{FlightGenerator, SimulatorConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "flight_notebook=info,flight_analytics=info";

#[derive(Parser, Debug)]
#[command(name = "flight-notebook", version)]
#[command(about = "Model how much flight delay is made up in the air")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline against an existing database
    Run(RunArgs),
    /// Write a synthetic dataset into a database file
    Seed(SeedArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Database file, or `local` for an in-memory engine
    #[arg(long)]
    master: Option<String>,

    /// Engine option passed through unmodified (repeatable)
    #[arg(long = "engine-option", value_name = "KEY=VALUE")]
    engine_options: Vec<String>,

    /// Table the route rollup is written to
    #[arg(long)]
    output_table: Option<String>,

    /// Dashboard bundle path
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// Write the Markdown report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,

    /// Partition seed
    #[arg(long)]
    seed: Option<u64>,

    /// Minimum scored flights for an airline to be reported
    #[arg(long)]
    min_carrier_flights: Option<i64>,
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// Database file to create
    #[arg(long)]
    out: PathBuf,

    /// Legs generated per month
    #[arg(long, default_value = "2000")]
    flights_per_month: usize,

    #[arg(long, default_value = "2003")]
    first_year: i32,

    #[arg(long, default_value = "2008")]
    last_year: i32,

    /// Generator seed
    #[arg(long, default_value = "5555")]
    seed: u64,

    /// Replace the database file if it exists
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!(version = flight_analytics::VERSION, "Starting flight-notebook");

    match cli.command {
        Command::Run(args) => run(args),
        Command::Seed(args) => seed(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::from_env().context("Invalid FLIGHTS_* configuration")?;
    if let Some(master) = args.master {
        config.session.master = master;
    }
    for pair in &args.engine_options {
        let (key, value) = parse_engine_option(pair)?;
        config.session.options.insert(key, value);
    }
    if let Some(table) = args.output_table {
        config.output_table = table;
    }
    if let Some(path) = args.artifact {
        config.artifact_path = path;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(min) = args.min_carrier_flights {
        config.min_carrier_flights = min;
    }
    config.validate()?;

    let outcome = FlightPipeline::new(config).run()?;
    let report = outcome.to_markdown();

    match args.report {
        Some(path) => {
            std::fs::write(&path, report)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Wrote report");
        }
        None => print!("{report}"),
    }
    Ok(())
}

fn seed(args: SeedArgs) -> Result<()> {
    if args.out.exists() {
        if !args.force {
            bail!("{} already exists (use --force to replace it)", args.out.display());
        }
        std::fs::remove_file(&args.out)
            .with_context(|| format!("Failed to remove {}", args.out.display()))?;
    }

    let mut generator = FlightGenerator::new(SimulatorConfig {
        seed: args.seed,
        first_year: args.first_year,
        last_year: args.last_year,
        flights_per_month: args.flights_per_month,
        ..SimulatorConfig::default()
    })?;
    let data = generator.generate();

    let master = args.out.to_string_lossy();
    let session = Session::connect(&SessionConfig::new(&master))?;
    session.create_source_tables()?;
    let airlines = session.ingest_airlines(&data.airlines)?;
    let airports = session.ingest_airports(&data.airports)?;
    let flights = session.ingest_flights(&data.flights)?;

    info!(
        out = %args.out.display(),
        flights,
        airlines,
        airports,
        "Seeded database"
    );
    Ok(())
}
