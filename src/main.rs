//! CLI entry point for the bus punctuality pipeline.
//!
//! `schedule` builds stop-level punctuality for one region and day,
//! `aggregate` rolls a stop-level file up to a geography level, and `run`
//! does both.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bus_metrics::analyzers::analyzer::{analyze, analyze_geography};
use bus_metrics::config::PipelineConfig;
use bus_metrics::loaders::timetable::RouteType;
use bus_metrics::output::print_pretty;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bus_metrics")]
#[command(about = "Bus punctuality from timetable and realtime data", long_about = None)]
struct Cli {
    /// TOML config file; CLI flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build stop-level punctuality for one region and day
    Schedule {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Aggregate stop-level punctuality to a geography level
    Aggregate {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        geography: GeographyArgs,

        /// Stop-level punctuality file (defaults to the run's own output)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Build the schedule, then aggregate it
    Run {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        geography: GeographyArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Region name used in input and output file names
    #[arg(short, long)]
    region: Option<String>,

    /// Target day, YYYYMMDD
    #[arg(short, long)]
    date: Option<String>,

    /// Restrict the timetable to a window of hours
    #[arg(long)]
    partial_timetable: bool,

    /// Window start in hours of day
    #[arg(long)]
    time_from: Option<f64>,

    /// Window end in hours of day
    #[arg(long)]
    time_to: Option<f64>,

    /// GTFS route types to keep, comma separated
    #[arg(long, value_delimiter = ',')]
    route_types: Vec<u16>,

    /// Also write pings without a trip to a separate file
    #[arg(long)]
    output_unlabelled_bulk: bool,

    #[arg(long)]
    timetable_dir: Option<PathBuf>,

    #[arg(long)]
    realtime_dir: Option<PathBuf>,

    #[arg(long)]
    stops_path: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl RunArgs {
    fn apply(self, config: &mut PipelineConfig) -> bus_metrics::error::Result<()> {
        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(date) = self.date {
            config.date = date;
        }
        config.partial_timetable |= self.partial_timetable;
        if let Some(from) = self.time_from {
            config.time_from = from;
        }
        if let Some(to) = self.time_to {
            config.time_to = to;
        }
        if !self.route_types.is_empty() {
            config.route_types = self.route_types.into_iter().map(RouteType::from).collect();
        }
        config.output_unlabelled_bulk |= self.output_unlabelled_bulk;
        if let Some(dir) = self.timetable_dir {
            config.timetable_dir = dir;
        }
        if let Some(dir) = self.realtime_dir {
            config.realtime_dir = dir;
        }
        if let Some(path) = self.stops_path {
            config.stops_path = path;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        config.normalise_date()
    }
}

#[derive(Args)]
struct GeographyArgs {
    /// Geography level configured under `[boundaries]`
    #[arg(short, long, default_value = "lsoa")]
    geography: String,

    /// Emit zero rows for lookup units without any stops
    #[arg(long)]
    full_coverage: bool,

    #[arg(long)]
    lookup_path: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn aggregate(config: &PipelineConfig, geography: &GeographyArgs, input: &Path) -> Result<()> {
    let (path, report) =
        analyze_geography(config, &geography.geography, input, geography.full_coverage)
            .with_context(|| format!("failed to aggregate to {}", geography.geography))?;
    info!(
        path = %path.display(),
        units = report.rows.len(),
        "Aggregation complete"
    );
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bus_metrics.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bus_metrics.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("RUST_LOG")
                .from_env_lossy(),
        );

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .with_env_var("RUST_LOG_JSON")
                .from_env_lossy(),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Schedule { run } => {
            run.apply(&mut config).context("invalid run options")?;
            let summary = analyze(&config).context("schedule run failed")?;
            print_pretty(&summary);
        }
        Commands::Aggregate {
            run,
            geography,
            input,
        } => {
            run.apply(&mut config).context("invalid run options")?;
            if let Some(path) = &geography.lookup_path {
                config.lookup_path = path.clone();
            }
            let input = input.unwrap_or_else(|| config.stop_punctuality_path());
            aggregate(&config, &geography, &input)?;
        }
        Commands::Run { run, geography } => {
            run.apply(&mut config).context("invalid run options")?;
            if let Some(path) = &geography.lookup_path {
                config.lookup_path = path.clone();
            }
            let summary = analyze(&config).context("schedule run failed")?;
            print_pretty(&summary);
            aggregate(&config, &geography, &config.stop_punctuality_path())?;
        }
    }

    Ok(())
}
