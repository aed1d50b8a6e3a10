//! Reductions from per-location temperature series to national extremes.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::{
    error::ReduceError,
    model::{Coordinates, ExtremeResult, Extremes, Location, LocationSeries, ModelWeights},
};

/// Sentinel used by station feeds for a missing reading.
pub const MISSING_SENTINEL: f64 = -999.0;

pub fn is_missing(value: f64) -> bool {
    !value.is_finite() || value == MISSING_SENTINEL
}

/// One value competing for the minimum or maximum.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub value: f64,
    pub location_name: &'a str,
    pub timestamp: Option<DateTime<Utc>>,
    pub coordinates: Option<Coordinates>,
}

impl Candidate<'_> {
    fn to_result(&self) -> ExtremeResult {
        ExtremeResult {
            value: self.value,
            location_name: self.location_name.to_string(),
            timestamp: self.timestamp,
            coordinates: self.coordinates,
        }
    }
}

/// Running min/max where the earliest candidate wins ties.
#[derive(Debug, Default)]
struct Tracker<'a> {
    min: Option<Candidate<'a>>,
    max: Option<Candidate<'a>>,
}

impl<'a> Tracker<'a> {
    fn offer_min(&mut self, c: Candidate<'a>) {
        if is_missing(c.value) {
            return;
        }
        if self.min.as_ref().is_none_or(|m| c.value.total_cmp(&m.value) == Ordering::Less) {
            self.min = Some(c);
        }
    }

    fn offer_max(&mut self, c: Candidate<'a>) {
        if is_missing(c.value) {
            return;
        }
        if self.max.as_ref().is_none_or(|m| c.value.total_cmp(&m.value) == Ordering::Greater) {
            self.max = Some(c);
        }
    }

    fn finish(self) -> Result<Extremes, ReduceError> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Ok(Extremes { min: min.to_result(), max: max.to_result() }),
            _ => Err(ReduceError::EmptyInput),
        }
    }
}

/// Reduce separate minimum and maximum candidate pools.
///
/// Missing values are dropped first. Fails if either pool has no valid value left.
pub fn extremes_of<'a>(
    min_pool: impl IntoIterator<Item = Candidate<'a>>,
    max_pool: impl IntoIterator<Item = Candidate<'a>>,
) -> Result<Extremes, ReduceError> {
    let mut tracker = Tracker::default();
    min_pool.into_iter().for_each(|c| tracker.offer_min(c));
    max_pool.into_iter().for_each(|c| tracker.offer_max(c));
    tracker.finish()
}

fn sample_candidates(series: &LocationSeries) -> impl Iterator<Item = Candidate<'_>> {
    series.samples.iter().map(move |s| Candidate {
        value: s.temperature_c,
        location_name: &series.location.name,
        timestamp: Some(s.time),
        coordinates: Some(series.location.coordinates),
    })
}

/// Absolute extremes over every sample of every member at every location.
pub fn scan_extremes(series: &[LocationSeries]) -> Result<Extremes, ReduceError> {
    let pool = || series.iter().flat_map(sample_candidates);
    extremes_of(pool(), pool())
}

/// Extremes of each location separately, in first-seen location order.
pub fn per_location_extremes(series: &[LocationSeries]) -> Vec<(Location, Extremes)> {
    let mut locations: Vec<&Location> = Vec::new();
    for s in series {
        if !locations.contains(&&s.location) {
            locations.push(&s.location);
        }
    }

    locations
        .into_iter()
        .filter_map(|loc| {
            let pool =
                || series.iter().filter(move |s| &s.location == loc).flat_map(sample_candidates);
            extremes_of(pool(), pool()).ok().map(|e| (loc.clone(), e))
        })
        .collect()
}

fn valid_min_max(series: &LocationSeries) -> Option<(f64, f64)> {
    series
        .samples
        .iter()
        .map(|s| s.temperature_c)
        .filter(|v| !is_missing(*v))
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Weighted daily (min, max) for one location.
///
/// Models without a weight or without data are skipped and the remaining weights are
/// rescaled so they still sum to 1.
fn weighted_location(
    location: &Location,
    series: &[LocationSeries],
    weights: &ModelWeights,
) -> Option<(f64, f64)> {
    let mut weight_sum = 0.0;
    let mut lo_sum = 0.0;
    let mut hi_sum = 0.0;

    for s in series.iter().filter(|s| &s.location == location && s.member.is_none()) {
        let Some(w) = weights.get(&s.model).filter(|w| *w > 0.0) else {
            continue;
        };
        let Some((lo, hi)) = valid_min_max(s) else {
            continue;
        };
        weight_sum += w;
        lo_sum += w * lo;
        hi_sum += w * hi;
    }

    (weight_sum > 0.0).then(|| (lo_sum / weight_sum, hi_sum / weight_sum))
}

/// National extremes from per-location weighted model minima and maxima.
pub fn weighted_extremes(
    series: &[LocationSeries],
    weights: &ModelWeights,
) -> Result<Extremes, ReduceError> {
    let mut locations: Vec<&Location> = Vec::new();
    for s in series {
        if !locations.contains(&&s.location) {
            locations.push(&s.location);
        }
    }

    let combined: Vec<(&Location, f64, f64)> = locations
        .into_iter()
        .filter_map(|loc| weighted_location(loc, series, weights).map(|(lo, hi)| (loc, lo, hi)))
        .collect();

    extremes_of(
        combined.iter().map(|(loc, lo, _)| location_candidate(loc, *lo)),
        combined.iter().map(|(loc, _, hi)| location_candidate(loc, *hi)),
    )
}

fn location_candidate(location: &Location, value: f64) -> Candidate<'_> {
    Candidate {
        value,
        location_name: &location.name,
        timestamp: None,
        coordinates: Some(location.coordinates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 14, 18, 0, 0).unwrap()
    }

    fn series(name: &str, model: &str, member: Option<&str>, temps: &[f64]) -> LocationSeries {
        LocationSeries {
            location: Location::new(name, 47.0, 19.0 + name.len() as f64 / 10.0),
            model: model.to_string(),
            member: member.map(str::to_string),
            samples: temps
                .iter()
                .enumerate()
                .map(|(i, t)| Sample { time: t0() + TimeDelta::hours(i as i64), temperature_c: *t })
                .collect(),
        }
    }

    #[test]
    fn scan_picks_coldest_and_warmest_location() {
        let input = vec![
            series("Debrecen", "icon", None, &[-5.2]),
            series("Zabar", "icon", None, &[-13.8]),
            series("Budapest", "icon", None, &[1.0]),
        ];

        let e = scan_extremes(&input).unwrap();
        assert_eq!(e.min.value, -13.8);
        assert_eq!(e.min.location_name, "Zabar");
        assert_eq!(e.max.value, 1.0);
        assert_eq!(e.max.location_name, "Budapest");
    }

    #[test]
    fn scan_is_tight_and_reports_timestamp() {
        let input = vec![
            series("Eger", "icon", Some("member01"), &[3.0, -2.0, 7.5]),
            series("Eger", "icon", Some("member02"), &[2.0, -4.5, 6.0]),
            series("Pécs", "icon", Some("member01"), &[4.0, 1.0, 9.25]),
        ];

        let e = scan_extremes(&input).unwrap();
        let all: Vec<f64> =
            input.iter().flat_map(|s| s.samples.iter().map(|x| x.temperature_c)).collect();

        assert!(all.iter().all(|v| e.min.value <= *v && e.max.value >= *v));
        assert!(all.contains(&e.min.value));
        assert!(all.contains(&e.max.value));
        assert_eq!(e.min.timestamp, Some(t0() + TimeDelta::hours(1)));
        assert_eq!(e.max.location_name, "Pécs");
        assert_eq!(e.max.timestamp, Some(t0() + TimeDelta::hours(2)));
    }

    #[test]
    fn scan_is_idempotent() {
        let input = vec![
            series("A", "m", None, &[1.0, 1.0, -3.0]),
            series("B", "m", None, &[-3.0, 5.0]),
        ];
        let first = scan_extremes(&input).unwrap();
        let second = scan_extremes(&input).unwrap();
        assert_eq!(first, second);
        // earliest candidate wins the tie at -3.0
        assert_eq!(first.min.location_name, "A");
    }

    #[test]
    fn missing_values_never_win() {
        let input = vec![series("A", "m", None, &[f64::NAN, -999.0, 2.0, f64::NEG_INFINITY, 4.0])];
        let e = scan_extremes(&input).unwrap();
        assert_eq!(e.min.value, 2.0);
        assert_eq!(e.max.value, 4.0);
    }

    #[test]
    fn empty_pool_is_an_error() {
        assert_eq!(scan_extremes(&[]), Err(ReduceError::EmptyInput));

        let only_missing = vec![series("A", "m", None, &[-999.0, f64::NAN])];
        assert_eq!(scan_extremes(&only_missing), Err(ReduceError::EmptyInput));

        let weights = ModelWeights::uniform(["m"]).unwrap();
        assert_eq!(weighted_extremes(&only_missing, &weights), Err(ReduceError::EmptyInput));
    }

    #[test]
    fn weighted_policy_combines_model_minima_and_maxima() {
        let weights = ModelWeights::normalized([("ecmwf", 3.0), ("icon", 1.0)]).unwrap();
        let input = vec![
            series("Szeged", "ecmwf", None, &[-2.0, 8.0]),
            series("Szeged", "icon", None, &[-6.0, 4.0]),
            series("Miskolc", "ecmwf", None, &[-4.0, 2.0]),
            series("Miskolc", "icon", None, &[-4.0, 6.0]),
        ];

        let e = weighted_extremes(&input, &weights).unwrap();
        // Szeged: min 0.75*-2 + 0.25*-6 = -3.0, max 0.75*8 + 0.25*4 = 7.0
        // Miskolc: min -4.0, max 0.75*2 + 0.25*6 = 3.0
        assert_eq!(e.min.location_name, "Miskolc");
        assert!((e.min.value + 4.0).abs() < 1e-9);
        assert_eq!(e.max.location_name, "Szeged");
        assert!((e.max.value - 7.0).abs() < 1e-9);
        assert_eq!(e.min.timestamp, None);
    }

    #[test]
    fn weighted_policy_rescales_when_a_model_is_missing() {
        let weights = ModelWeights::normalized([("ecmwf", 1.0), ("icon", 1.0)]).unwrap();
        let input = vec![series("Győr", "icon", None, &[-1.0, 3.0])];

        let e = weighted_extremes(&input, &weights).unwrap();
        assert_eq!(e.min.value, -1.0);
        assert_eq!(e.max.value, 3.0);
    }

    #[test]
    fn weighted_policy_ignores_ensemble_members_and_unweighted_models() {
        let weights = ModelWeights::uniform(["icon"]).unwrap();
        let input = vec![
            series("Győr", "icon", None, &[0.0, 2.0]),
            series("Győr", "icon", Some("member01"), &[-20.0, 30.0]),
            series("Győr", "gfs", None, &[-10.0, 10.0]),
        ];

        let e = weighted_extremes(&input, &weights).unwrap();
        assert_eq!(e.min.value, 0.0);
        assert_eq!(e.max.value, 2.0);
    }

    #[test]
    fn per_location_keeps_input_order() {
        let input = vec![
            series("B", "m", None, &[1.0, 2.0]),
            series("A", "m", None, &[-1.0]),
            series("B", "n", None, &[0.5]),
        ];

        let per = per_location_extremes(&input);
        assert_eq!(per.len(), 2);
        assert_eq!(per[0].0.name, "B");
        assert_eq!(per[0].1.min.value, 0.5);
        assert_eq!(per[0].1.max.value, 2.0);
        assert_eq!(per[1].0.name, "A");
    }
}
