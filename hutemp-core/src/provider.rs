use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};
use tracing::{debug, warn};

use crate::{
    Config,
    model::{Location, LocationSeries},
    provider::openmeteo::OpenMeteoSource,
    window::ClimatologicalWindow,
};

pub mod hungaromet;
pub mod openmeteo;

/// Where national extremes are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Deterministic model runs, combined with model weights.
    Forecast,
    /// Every ensemble member, scanned for absolute extremes.
    Ensemble,
    /// HungaroMet synoptic station reports.
    Stations,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Forecast => "forecast",
            SourceId::Ensemble => "ensemble",
            SourceId::Stations => "stations",
        }
    }

    pub const fn all() -> &'static [SourceId] {
        &[SourceId::Forecast, SourceId::Ensemble, SourceId::Stations]
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for SourceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "forecast" => Ok(SourceId::Forecast),
            "ensemble" => Ok(SourceId::Ensemble),
            "stations" => Ok(SourceId::Stations),
            _ => Err(anyhow::anyhow!(
                "Unknown source '{value}'. Supported sources: forecast, ensemble, stations."
            )),
        }
    }
}

/// Endpoint family of a gridded series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Forecast,
    Ensemble,
    Archive,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Forecast => "forecast",
            Feed::Ensemble => "ensemble",
            Feed::Archive => "archive",
        }
    }
}

/// One batched request: a chunk of locations, one model, one window.
#[derive(Debug, Clone, Copy)]
pub struct ChunkQuery<'a> {
    pub feed: Feed,
    pub model: &'a str,
    pub locations: &'a [Location],
    pub window: &'a ClimatologicalWindow,
}

#[async_trait]
pub trait SeriesSource: Send + Sync + Debug {
    /// Fetch the in-window series of every location in the chunk.
    async fn fetch_chunk(&self, query: &ChunkQuery<'_>) -> anyhow::Result<Vec<LocationSeries>>;
}

/// Series collected for a request, plus what had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub series: Vec<LocationSeries>,
    pub chunks_total: usize,
    pub chunks_failed: usize,
}

impl FetchOutcome {
    pub fn is_degraded(&self) -> bool {
        self.chunks_failed > 0
    }
}

/// Fetch every location for every model, `chunk_size` locations per request.
///
/// A chunk that fails contributes nothing; there is no retry.
pub async fn fetch_series(
    source: &dyn SeriesSource,
    feed: Feed,
    models: &[String],
    locations: &[Location],
    window: &ClimatologicalWindow,
    chunk_size: usize,
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    for model in models {
        for chunk in locations.chunks(chunk_size.max(1)) {
            outcome.chunks_total += 1;

            let query = ChunkQuery { feed, model, locations: chunk, window };

            match source.fetch_chunk(&query).await {
                Ok(series) => {
                    debug!(
                        feed = feed.as_str(),
                        model = %model,
                        locations = chunk.len(),
                        series = series.len(),
                        "chunk fetched"
                    );
                    outcome.series.extend(series);
                }
                Err(err) => {
                    outcome.chunks_failed += 1;
                    warn!(
                        feed = feed.as_str(),
                        model = %model,
                        first_location = %chunk[0].name,
                        error = %format!("{err:#}"),
                        "chunk skipped"
                    );
                }
            }
        }
    }

    outcome
}

/// Construct the Open-Meteo source from config.
pub fn source_from_config(config: &Config) -> anyhow::Result<Box<dyn SeriesSource>> {
    let source = OpenMeteoSource::new(config.endpoints.clone(), config.http.timeout())?;
    Ok(Box::new(source))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::Sample;
    use chrono::TimeDelta;
    use std::collections::HashMap;

    /// In-memory source; locations named in `failing` make their whole chunk fail.
    #[derive(Debug, Default)]
    pub struct FakeSource {
        pub temps: HashMap<(Feed, String, String), Vec<f64>>,
        pub members: usize,
        pub failing: Vec<String>,
    }

    impl FakeSource {
        pub fn with(mut self, feed: Feed, model: &str, location: &str, temps: &[f64]) -> Self {
            self.temps.insert((feed, model.to_string(), location.to_string()), temps.to_vec());
            self
        }
    }

    #[async_trait]
    impl SeriesSource for FakeSource {
        async fn fetch_chunk(&self, query: &ChunkQuery<'_>) -> anyhow::Result<Vec<LocationSeries>> {
            if query.locations.iter().any(|l| self.failing.contains(&l.name)) {
                anyhow::bail!("simulated network failure");
            }

            let members: Vec<Option<String>> = if self.members == 0 {
                vec![None]
            } else {
                (1..=self.members).map(|i| Some(format!("member{i:02}"))).collect()
            };

            let mut out = Vec::new();
            for loc in query.locations {
                let key = (query.feed, query.model.to_string(), loc.name.clone());
                let Some(temps) = self.temps.get(&key) else { continue };

                for (m, member) in members.iter().enumerate() {
                    out.push(LocationSeries {
                        location: loc.clone(),
                        model: query.model.to_string(),
                        member: member.clone(),
                        samples: temps
                            .iter()
                            .enumerate()
                            .map(|(i, t)| Sample {
                                time: query.window.start + TimeDelta::hours(i as i64),
                                temperature_c: t - m as f64,
                            })
                            .collect(),
                    });
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSource;
    use super::*;
    use crate::{model::Location, reduce::scan_extremes};
    use chrono::NaiveDate;

    fn window() -> ClimatologicalWindow {
        ClimatologicalWindow::for_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()).unwrap()
    }

    #[test]
    fn source_id_as_str_roundtrip() {
        for id in SourceId::all() {
            let parsed = SourceId::try_from(id.as_str()).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_source_error() {
        let err = SourceId::try_from("grib").unwrap_err();
        assert!(err.to_string().contains("Unknown source"));
    }

    #[tokio::test]
    async fn locations_are_split_into_chunks_per_model() {
        let locations: Vec<Location> =
            (0..5).map(|i| Location::new(format!("L{i}"), 47.0, 19.0 + i as f64)).collect();
        let source = FakeSource::default();
        let models = vec!["a".to_string(), "b".to_string()];

        let outcome =
            fetch_series(&source, Feed::Forecast, &models, &locations, &window(), 2).await;

        assert_eq!(outcome.chunks_total, 6);
        assert_eq!(outcome.chunks_failed, 0);
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn failed_chunk_does_not_sink_the_reduction() {
        let locations = vec![
            Location::new("Debrecen", 47.53, 21.63),
            Location::new("Zabar", 48.15, 20.05),
            Location::new("Budapest", 47.50, 19.04),
        ];
        let source = FakeSource { failing: vec!["Zabar".into()], ..Default::default() }
            .with(Feed::Forecast, "icon", "Debrecen", &[-5.2, 0.0])
            .with(Feed::Forecast, "icon", "Zabar", &[-13.8])
            .with(Feed::Forecast, "icon", "Budapest", &[1.0, -1.0]);

        let outcome =
            fetch_series(&source, Feed::Forecast, &["icon".to_string()], &locations, &window(), 1)
                .await;

        assert_eq!(outcome.chunks_failed, 1);
        assert!(outcome.is_degraded());

        let e = scan_extremes(&outcome.series).unwrap();
        assert_eq!(e.min.value, -5.2);
        assert_eq!(e.min.location_name, "Debrecen");
        assert_eq!(e.max.value, 1.0);
        assert_eq!(e.max.location_name, "Budapest");
    }

    #[tokio::test]
    async fn zero_chunk_size_is_treated_as_one() {
        let locations = vec![Location::new("A", 47.0, 19.0), Location::new("B", 47.0, 20.0)];
        let source = FakeSource::default();

        let outcome =
            fetch_series(&source, Feed::Forecast, &["m".to_string()], &locations, &window(), 0).await;

        assert_eq!(outcome.chunks_total, 2);
    }
}
