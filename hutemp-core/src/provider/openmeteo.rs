use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tracing::debug;

use crate::{
    config::Endpoints,
    model::{Location, LocationSeries, Sample},
    provider::{ChunkQuery, Feed},
    window::ClimatologicalWindow,
};

use super::SeriesSource;

const TEMPERATURE_KEY: &str = "temperature_2m";

#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    endpoints: Endpoints,
    http: Client,
}

impl OpenMeteoSource {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Open-Meteo")?;

        Ok(Self { endpoints, http })
    }

    fn url_for(&self, feed: Feed) -> &str {
        match feed {
            Feed::Forecast => &self.endpoints.forecast_url,
            Feed::Ensemble => &self.endpoints.ensemble_url,
            Feed::Archive => &self.endpoints.archive_url,
        }
    }
}

/// Query parameters of one batched Open-Meteo request.
pub fn query_params(query: &ChunkQuery<'_>) -> Vec<(&'static str, String)> {
    let join = |f: fn(&Location) -> f64| {
        query.locations.iter().map(|l| format!("{:.4}", f(l))).collect::<Vec<_>>().join(",")
    };

    vec![
        ("latitude", join(|l| l.coordinates.latitude)),
        ("longitude", join(|l| l.coordinates.longitude)),
        ("hourly", TEMPERATURE_KEY.to_string()),
        ("models", query.model.to_string()),
        ("start_date", query.window.start_date().format("%Y-%m-%d").to_string()),
        ("end_date", query.window.end_date().format("%Y-%m-%d").to_string()),
        ("timezone", "UTC".to_string()),
    ]
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    time: Vec<String>,
    #[serde(flatten)]
    values: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    hourly: OmHourly,
}

/// A single location yields one object, several locations yield an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OmBody {
    Many(Vec<OmResponse>),
    One(Box<OmResponse>),
}

impl OmBody {
    fn into_vec(self) -> Vec<OmResponse> {
        match self {
            OmBody::Many(v) => v,
            OmBody::One(r) => vec![*r],
        }
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map(|ndt| ndt.and_utc())
        .with_context(|| format!("Invalid timestamp '{raw}' in Open-Meteo response"))
}

/// Member label for an hourly key: `temperature_2m` is the main run,
/// `temperature_2m_member05` is ensemble member 5.
fn member_label(key: &str) -> Option<Option<String>> {
    let rest = key.strip_prefix(TEMPERATURE_KEY)?;
    if rest.is_empty() {
        return Some(None);
    }
    rest.strip_prefix('_').map(|m| Some(m.to_string()))
}

/// Turn a response body into one series per location and member, keeping only
/// non-null samples inside `window`.
pub fn parse_body(
    body: &str,
    locations: &[Location],
    model: &str,
    window: &ClimatologicalWindow,
) -> Result<Vec<LocationSeries>> {
    let parsed: OmBody =
        serde_json::from_str(body).context("Failed to parse Open-Meteo JSON")?;
    let responses = parsed.into_vec();

    if responses.len() != locations.len() {
        return Err(anyhow!(
            "Open-Meteo returned {} locations, requested {}",
            responses.len(),
            locations.len()
        ));
    }

    let mut out = Vec::new();

    for (response, location) in responses.into_iter().zip(locations) {
        let times = response
            .hourly
            .time
            .iter()
            .map(|t| parse_time(t))
            .collect::<Result<Vec<_>>>()?;

        let mut keys: Vec<&String> = response.hourly.values.keys().collect();
        keys.sort();

        for key in keys {
            let Some(member) = member_label(key) else { continue };

            let values: Vec<Option<f64>> =
                serde_json::from_value(response.hourly.values[key].clone())
                    .with_context(|| format!("Field '{key}' is not a numeric array"))?;

            if values.len() != times.len() {
                return Err(anyhow!(
                    "Field '{key}' has {} values for {} timestamps",
                    values.len(),
                    times.len()
                ));
            }

            let samples = times
                .iter()
                .zip(values)
                .filter_map(|(time, v)| v.map(|t| Sample { time: *time, temperature_c: t }))
                .filter(|s| window.contains(s.time) && s.temperature_c.is_finite())
                .collect();

            out.push(LocationSeries {
                location: location.clone(),
                model: model.to_string(),
                member,
                samples,
            });
        }
    }

    Ok(out)
}

#[async_trait]
impl SeriesSource for OpenMeteoSource {
    async fn fetch_chunk(&self, query: &ChunkQuery<'_>) -> Result<Vec<LocationSeries>> {
        if query.locations.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.url_for(query.feed);
        debug!(url, model = query.model, locations = query.locations.len(), "Open-Meteo request");

        let res = self
            .http
            .get(url)
            .query(&query_params(query))
            .send()
            .await
            .with_context(|| format!("Failed to send request to Open-Meteo ({})", query.feed.as_str()))?;

        let status = res.status();
        let body = res.text().await.context("Failed to read Open-Meteo response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Open-Meteo {} request failed with status {}: {}",
                query.feed.as_str(),
                status,
                truncate_body(&body),
            ));
        }

        parse_body(&body, query.locations, query.model, query.window)
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
