//! Model weights from yesterday's errors.
//!
//! Each model's hourly forecast at a few reference cities is compared with the archived
//! reanalysis for the same window. The weight of a model is its inverse mean absolute error,
//! normalised over all models. Calibration never fails: any problem falls back to the
//! default weights and is reported in the returned [`Calibration`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::{
    model::{Location, LocationSeries, ModelWeights},
    nearest::reference_cities,
    provider::{Feed, SeriesSource, fetch_series},
    reduce::is_missing,
    window::ClimatologicalWindow,
};

/// Lower bound on MAE so that a perfect model does not get an infinite weight.
const MIN_MAE: f64 = 0.05;

/// Model id requested from the archive feed.
pub const ARCHIVE_MODEL: &str = "best_match";

const CALIBRATION_CITIES: &[&str] = &["Budapest", "Debrecen", "Szeged", "Miskolc", "Pécs", "Győr"];

/// The reference cities models are scored at.
pub fn calibration_cities() -> Vec<Location> {
    reference_cities()
        .into_iter()
        .filter(|c| CALIBRATION_CITIES.contains(&c.name.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeightSource {
    Fixed,
    Calibrated { lookback: NaiveDate, mae: BTreeMap<String, f64> },
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub weights: ModelWeights,
    pub source: WeightSource,
}

impl Calibration {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, WeightSource::Fallback { .. })
    }

    pub fn fixed(weights: ModelWeights) -> Self {
        Self { weights, source: WeightSource::Fixed }
    }

    fn fallback(defaults: &ModelWeights, reason: String) -> Self {
        warn!(reason = %reason, "model calibration failed, using default weights");
        Self { weights: defaults.clone(), source: WeightSource::Fallback { reason } }
    }
}

type SampleKey<'a> = (&'a str, DateTime<Utc>);

fn observations(series: &[LocationSeries]) -> HashMap<SampleKey<'_>, f64> {
    series
        .iter()
        .filter(|s| s.member.is_none())
        .flat_map(|s| {
            s.samples
                .iter()
                .filter(|x| !is_missing(x.temperature_c))
                .map(move |x| ((s.location.name.as_str(), x.time), x.temperature_c))
        })
        .collect()
}

/// Mean absolute error of each model against the observations, over matching
/// (location, hour) pairs. Models with no overlap are left out.
pub fn mean_absolute_errors(
    forecasts: &[LocationSeries],
    observed: &[LocationSeries],
) -> BTreeMap<String, f64> {
    let truth = observations(observed);
    let mut acc: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for s in forecasts.iter().filter(|s| s.member.is_none()) {
        for sample in s.samples.iter().filter(|x| !is_missing(x.temperature_c)) {
            if let Some(obs) = truth.get(&(s.location.name.as_str(), sample.time)) {
                let entry = acc.entry(s.model.clone()).or_insert((0.0, 0));
                entry.0 += (sample.temperature_c - obs).abs();
                entry.1 += 1;
            }
        }
    }

    acc.into_iter().map(|(model, (sum, n))| (model, sum / n as f64)).collect()
}

/// Normalised inverse-MAE weights.
pub fn weights_from_errors(mae: &BTreeMap<String, f64>) -> Option<ModelWeights> {
    ModelWeights::normalized(mae.iter().map(|(m, e)| (m.clone(), 1.0 / e.max(MIN_MAE)))).ok()
}

/// Calibrate `models` on the climatological day `lookback` at the `references` cities.
pub async fn calibrate(
    source: &dyn SeriesSource,
    references: &[Location],
    models: &[String],
    lookback: NaiveDate,
    defaults: &ModelWeights,
    chunk_size: usize,
) -> Calibration {
    let window = match ClimatologicalWindow::for_date(lookback) {
        Ok(w) => w,
        Err(err) => return Calibration::fallback(defaults, err.to_string()),
    };

    let observed = fetch_series(
        source,
        Feed::Archive,
        &[ARCHIVE_MODEL.to_string()],
        references,
        &window,
        chunk_size,
    )
    .await;
    if observed.is_degraded() {
        return Calibration::fallback(defaults, "archive observations unavailable".to_string());
    }

    let forecasts = fetch_series(source, Feed::Forecast, models, references, &window, chunk_size).await;
    if forecasts.is_degraded() {
        return Calibration::fallback(defaults, "model forecasts unavailable".to_string());
    }

    let mae = mean_absolute_errors(&forecasts.series, &observed.series);

    if let Some(missing) = models.iter().find(|m| !mae.contains_key(*m)) {
        return Calibration::fallback(defaults, format!("no overlapping samples for model '{missing}'"));
    }

    match weights_from_errors(&mae) {
        Some(weights) => {
            info!(%lookback, ?mae, "model weights calibrated");
            Calibration { weights, source: WeightSource::Calibrated { lookback, mae } }
        }
        None => Calibration::fallback(defaults, "no usable model errors".to_string()),
    }
}
