use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::WeightsError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// A named point for which temperature series are requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self { name: name.into(), coordinates: Coordinates::new(latitude, longitude) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub temperature_c: f64,
}

/// Hourly temperatures of one location for one model (or ensemble member).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSeries {
    pub location: Location,
    pub model: String,
    /// Ensemble member label, e.g. "member07". `None` for the main run.
    pub member: Option<String>,
    pub samples: Vec<Sample>,
}

/// Normalised weight per model id. Weights are in [0, 1] and sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    weights: BTreeMap<String, f64>,
}

impl ModelWeights {
    const SUM_TOLERANCE: f64 = 1e-6;

    /// Validate an explicit weight table.
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self, WeightsError> {
        if weights.is_empty() {
            return Err(WeightsError::Empty);
        }

        for (model, w) in &weights {
            if !w.is_finite() || !(0.0..=1.0).contains(w) {
                return Err(WeightsError::OutOfRange { model: model.clone(), weight: *w });
            }
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(WeightsError::BadSum(sum));
        }

        Ok(Self { weights })
    }

    /// Scale arbitrary non-negative scores so they sum to 1.
    pub fn normalized<I, K>(scores: I) -> Result<Self, WeightsError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let scores: BTreeMap<String, f64> =
            scores.into_iter().map(|(k, v)| (k.into(), v)).collect();

        if scores.is_empty() {
            return Err(WeightsError::Empty);
        }

        if let Some((model, w)) = scores.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(WeightsError::OutOfRange { model: model.clone(), weight: *w });
        }

        let total: f64 = scores.values().sum();
        if total <= 0.0 {
            return Err(WeightsError::BadSum(total));
        }

        Self::new(scores.into_iter().map(|(k, v)| (k, v / total)).collect())
    }

    /// Equal weight for every model.
    pub fn uniform<I, K>(models: I) -> Result<Self, WeightsError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::normalized(models.into_iter().map(|m| (m, 1.0)))
    }

    pub fn get(&self, model: &str) -> Option<f64> {
        self.weights.get(model).copied()
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremeResult {
    pub value: f64,
    pub location_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub coordinates: Option<Coordinates>,
}

/// A minimum together with a maximum over the same pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extremes {
    pub min: ExtremeResult,
    pub max: ExtremeResult,
}
