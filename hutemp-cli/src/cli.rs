use anyhow::{Context, Result, bail};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use std::path::PathBuf;
use tracing::{info, warn};

use hutemp_core::{
    Config, ForecastRequest, Location, Policy, SourceId, WeightChoice,
    calibrate::{calibrate, calibration_cities},
    export::{ReportRow, save_zip, write_report},
    nearest::{MIN_GRID_STEP, hungary_grid, load_locations, reference_cities},
    pipeline::{run_forecast, station_report},
    provider::{hungaromet::HungaroMetFeed, source_from_config},
    window::{date_range, parse_date},
};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "hutemp", version, about = "National temperature extremes for Hungary")]
pub struct Cli {
    /// Debug logs on stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively edit the configuration file.
    Configure,

    /// Extremes from the configured default source.
    Show {
        /// Target date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
    },

    /// Forecast extremes for a climatological day.
    Forecast {
        /// Target date (YYYY-MM-DD); tomorrow if absent.
        #[arg(long)]
        date: Option<String>,

        /// Scan every ensemble member instead of weighting deterministic models.
        #[arg(long)]
        ensemble: bool,

        /// Derive model weights from the previous day's errors.
        #[arg(long, conflicts_with = "ensemble")]
        calibrate: bool,

        /// Comma separated Open-Meteo model ids; configured models if absent.
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,

        /// JSON file with locations to query.
        #[arg(long, conflicts_with = "grid")]
        locations: Option<PathBuf>,

        /// Query a regular grid over Hungary with this spacing in degrees.
        #[arg(long)]
        grid: Option<f64>,
    },

    /// Observed extremes from the HungaroMet daily station report.
    Stations {
        /// Report date (YYYY-MM-DD); yesterday if absent.
        #[arg(long)]
        date: Option<String>,

        /// Also store the original ZIP in this directory.
        #[arg(long)]
        save_zip: Option<PathBuf>,
    },

    /// Calibrate model weights against the archive.
    Calibrate {
        /// Lookback date (YYYY-MM-DD); yesterday if absent.
        #[arg(long)]
        date: Option<String>,
    },

    /// Spreadsheet of station extremes, one row per date.
    Report {
        /// First date (YYYY-MM-DD).
        #[arg(long)]
        from: String,

        /// Last date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        to: String,

        /// Output CSV file.
        #[arg(long)]
        out: PathBuf,

        /// Also store every original ZIP in this directory.
        #[arg(long)]
        save_zip: Option<PathBuf>,
    },
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse `--date`, or shift today by `offset_days` when it is absent.
fn resolve_date(date: Option<&str>, offset_days: i64) -> Result<NaiveDate> {
    match date {
        Some(raw) => Ok(parse_date(raw)?),
        None => {
            let days = Days::new(offset_days.unsigned_abs());
            let shifted = if offset_days >= 0 {
                today().checked_add_days(days)
            } else {
                today().checked_sub_days(days)
            };
            shifted.context("Default date is out of range")
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let json = self.json;

        match self.command {
            Command::Configure => configure(),
            Command::Show { date } => {
                let config = Config::load()?;
                match config.default_source_id()? {
                    SourceId::Forecast => forecast(&config, date, false, false, vec![], None, None, json).await,
                    SourceId::Ensemble => forecast(&config, date, true, false, vec![], None, None, json).await,
                    SourceId::Stations => stations(&config, date, None, json).await,
                }
            }
            Command::Forecast { date, ensemble, calibrate, models, locations, grid } => {
                let config = Config::load()?;
                forecast(&config, date, ensemble, calibrate, models, locations, grid, json).await
            }
            Command::Stations { date, save_zip } => {
                let config = Config::load()?;
                stations(&config, date, save_zip, json).await
            }
            Command::Calibrate { date } => {
                let config = Config::load()?;
                run_calibration(&config, date, json).await
            }
            Command::Report { from, to, out, save_zip } => {
                let config = Config::load()?;
                report(&config, &from, &to, out, save_zip).await
            }
        }
    }
}

fn resolve_locations(config: &Config, file: Option<PathBuf>, grid: Option<f64>) -> Result<Vec<Location>> {
    let locations = match (file, grid) {
        (Some(path), _) => load_locations(&path)?,
        (None, Some(step)) => {
            if !step.is_finite() || step < MIN_GRID_STEP {
                bail!("Grid spacing must be at least {MIN_GRID_STEP} degrees, got {step}");
            }
            hungary_grid(step, &reference_cities())
        }
        (None, None) => config.locations()?,
    };

    if locations.is_empty() {
        bail!("No locations to query");
    }

    Ok(locations)
}

#[allow(clippy::too_many_arguments)]
async fn forecast(
    config: &Config,
    date: Option<String>,
    ensemble: bool,
    calibrate: bool,
    models: Vec<String>,
    locations: Option<PathBuf>,
    grid: Option<f64>,
    json: bool,
) -> Result<()> {
    let date = resolve_date(date.as_deref(), 1)?;
    let policy = if ensemble { Policy::EnsembleScan } else { Policy::Weighted };

    let models = match (models.is_empty(), policy) {
        (false, _) => models,
        (true, Policy::Weighted) => config.models.clone(),
        (true, Policy::EnsembleScan) => config.ensemble_models.clone(),
    };
    if models.is_empty() {
        bail!("No models configured.\nHint: pass --models or run `hutemp configure`.");
    }

    let defaults = config.weights_for(&models)?;
    let weights = if calibrate {
        let lookback = date_before(today())?;
        WeightChoice::Calibrate { lookback, defaults }
    } else {
        WeightChoice::Fixed(defaults)
    };

    let request = ForecastRequest {
        date,
        policy,
        models,
        locations: resolve_locations(config, locations, grid)?,
        weights,
        chunk_size: config.http.chunk_size,
    };
    info!(%date, locations = request.locations.len(), models = ?request.models, "forecast request");

    let source = source_from_config(config)?;
    let report = run_forecast(source.as_ref(), &request).await?;

    output::print_forecast(&report, json)
}

async fn stations(config: &Config, date: Option<String>, save_to: Option<PathBuf>, json: bool) -> Result<()> {
    let date = resolve_date(date.as_deref(), -1)?;
    let feed = HungaroMetFeed::new(config.endpoints.stations_url.clone(), config.http.timeout())?;

    let (zip_bytes, report) = station_report(&feed, date, &config.focus_city).await?;

    if let Some(dir) = save_to {
        let path = save_zip(&dir, date, &zip_bytes)?;
        info!(path = %path.display(), "original ZIP saved");
    }

    output::print_stations(&report, json)
}

async fn run_calibration(config: &Config, date: Option<String>, json: bool) -> Result<()> {
    let lookback = resolve_date(date.as_deref(), -1)?;
    let defaults = config.weights_for(&config.models)?;
    let source = source_from_config(config)?;

    let calibration = calibrate(
        source.as_ref(),
        &calibration_cities(),
        &config.models,
        lookback,
        &defaults,
        config.http.chunk_size,
    )
    .await;

    output::print_calibration(&calibration, json)
}

async fn report(
    config: &Config,
    from: &str,
    to: &str,
    out: PathBuf,
    save_to: Option<PathBuf>,
) -> Result<()> {
    let dates = date_range(parse_date(from)?, parse_date(to)?)?;
    let feed = HungaroMetFeed::new(config.endpoints.stations_url.clone(), config.http.timeout())?;

    let mut rows = Vec::with_capacity(dates.len());
    let mut skipped = 0;

    for date in dates {
        match station_report(&feed, date, &config.focus_city).await {
            Ok((zip_bytes, report)) => {
                if let Some(dir) = &save_to {
                    save_zip(dir, date, &zip_bytes)?;
                }
                rows.push(ReportRow::from(&report));
            }
            Err(err) => {
                skipped += 1;
                warn!(%date, error = %format!("{err:#}"), "date skipped");
            }
        }
    }

    write_report(&out, &rows)?;
    println!("Wrote {} rows to {} ({} dates skipped)", rows.len(), out.display(), skipped);

    Ok(())
}

fn date_before(date: NaiveDate) -> Result<NaiveDate> {
    date.pred_opt().context("Lookback date is out of range")
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let sources: Vec<&str> = SourceId::all().iter().map(|s| s.as_str()).collect();
    let start = config
        .default_source_id()
        .ok()
        .and_then(|id| SourceId::all().iter().position(|s| *s == id))
        .unwrap_or(0);
    let source = Select::new("Default source:", sources).with_starting_cursor(start).prompt()?;
    config.set_default_source(SourceId::try_from(source)?);

    let models = Text::new("Forecast models (comma separated):")
        .with_default(&config.models.join(","))
        .prompt()?;
    config.models = split_list(&models);

    let ensemble_models = Text::new("Ensemble models (comma separated):")
        .with_default(&config.ensemble_models.join(","))
        .prompt()?;
    config.ensemble_models = split_list(&ensemble_models);

    config.focus_city = Text::new("City for station report details:")
        .with_default(&config.focus_city)
        .prompt()?;

    config.http.chunk_size = CustomType::<usize>::new("Locations per request:")
        .with_default(config.http.chunk_size)
        .prompt()?;

    config.http.timeout_secs = CustomType::<u64>::new("Request timeout (seconds):")
        .with_default(config.http.timeout_secs)
        .prompt()?;

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());

    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}
