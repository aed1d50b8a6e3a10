//! End-to-end requests: window, fetch, reduce.
//!
//! Each request is an immutable value; nothing is cached between runs.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    calibrate::{Calibration, calibrate, calibration_cities},
    model::{Extremes, Location, ModelWeights},
    provider::{Feed, SeriesSource, fetch_series, hungaromet::{DailyStationReport, HungaroMetFeed}},
    reduce::{per_location_extremes, scan_extremes, weighted_extremes},
    window::ClimatologicalWindow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Per-location weighted model minima and maxima.
    Weighted,
    /// Absolute extremes over every ensemble member sample.
    EnsembleScan,
}

impl Policy {
    pub fn feed(&self) -> Feed {
        match self {
            Policy::Weighted => Feed::Forecast,
            Policy::EnsembleScan => Feed::Ensemble,
        }
    }
}

#[derive(Debug, Clone)]
pub enum WeightChoice {
    Fixed(ModelWeights),
    /// Calibrate against the archive on `lookback`, falling back to `defaults`.
    Calibrate { lookback: NaiveDate, defaults: ModelWeights },
}

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub date: NaiveDate,
    pub policy: Policy,
    pub models: Vec<String>,
    pub locations: Vec<Location>,
    pub weights: WeightChoice,
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastReport {
    pub window: ClimatologicalWindow,
    pub policy: Policy,
    pub national: Extremes,
    pub per_location: Vec<(Location, Extremes)>,
    /// Weights used by the weighted policy.
    pub calibration: Option<Calibration>,
    pub chunks_total: usize,
    pub chunks_failed: usize,
}

async fn resolve_weights(source: &dyn SeriesSource, request: &ForecastRequest) -> Calibration {
    match &request.weights {
        WeightChoice::Fixed(weights) => Calibration::fixed(weights.clone()),
        WeightChoice::Calibrate { lookback, defaults } => {
            calibrate(
                source,
                &calibration_cities(),
                &request.models,
                *lookback,
                defaults,
                request.chunk_size,
            )
            .await
        }
    }
}

pub async fn run_forecast(source: &dyn SeriesSource, request: &ForecastRequest) -> Result<ForecastReport> {
    let window = ClimatologicalWindow::for_date(request.date)?;

    let outcome = fetch_series(
        source,
        request.policy.feed(),
        &request.models,
        &request.locations,
        &window,
        request.chunk_size,
    )
    .await;

    if outcome.is_degraded() {
        warn!(
            failed = outcome.chunks_failed,
            total = outcome.chunks_total,
            "some chunks failed, extremes cover the remaining locations only"
        );
    }

    let (national, calibration) = match request.policy {
        Policy::Weighted => {
            let calibration = resolve_weights(source, request).await;
            let national = weighted_extremes(&outcome.series, &calibration.weights);
            (national, Some(calibration))
        }
        Policy::EnsembleScan => (scan_extremes(&outcome.series), None),
    };

    let national = national.with_context(|| {
        format!("No temperature samples between {} and {}", window.start, window.end)
    })?;

    info!(
        date = %request.date,
        min = national.min.value,
        min_at = %national.min.location_name,
        max = national.max.value,
        max_at = %national.max.location_name,
        "national extremes"
    );

    Ok(ForecastReport {
        window,
        policy: request.policy,
        per_location: per_location_extremes(&outcome.series),
        national,
        calibration,
        chunks_total: outcome.chunks_total,
        chunks_failed: outcome.chunks_failed,
    })
}

/// Download and reduce the HungaroMet report of `date`. Returns the raw ZIP too.
pub async fn station_report(
    feed: &HungaroMetFeed,
    date: NaiveDate,
    focus_city: &str,
) -> Result<(Vec<u8>, DailyStationReport)> {
    let (zip_bytes, records) = feed.fetch_records(date).await?;

    let report = DailyStationReport::from_records(date, &records, focus_city)
        .with_context(|| format!("No station readings in the report of {date}"))?;

    Ok((zip_bytes, report))
}
