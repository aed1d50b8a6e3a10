//! Core library for the `hutemp` CLI.
//!
//! This crate defines:
//! - Climatological day windows (18:00 UTC to 18:00 UTC)
//! - Feeds: Open-Meteo forecast/ensemble/archive series and HungaroMet station reports
//! - Reductions to national and per-city temperature extremes
//! - Model weight calibration, nearest-city labelling and spreadsheet export
//! - Configuration handling
//!
//! It is used by `hutemp-cli`, but can also be reused by other binaries or services.

pub mod calibrate;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod nearest;
pub mod pipeline;
pub mod provider;
pub mod reduce;
pub mod window;

pub use config::{Config, Endpoints, HttpConfig};
pub use error::{ReduceError, StationFeedError, WeightsError, WindowError};
pub use model::{Coordinates, ExtremeResult, Extremes, Location, LocationSeries, ModelWeights, Sample};
pub use pipeline::{ForecastReport, ForecastRequest, Policy, WeightChoice};
pub use provider::{Feed, SeriesSource, SourceId};
pub use window::ClimatologicalWindow;
