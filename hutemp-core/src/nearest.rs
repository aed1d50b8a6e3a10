//! Nearest reference city lookup and location lists.
//!
//! Distances are squared Euclidean in degrees, not geodesic. Over an area the size of Hungary
//! the ranking is close enough for labelling grid points with a place name.

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::model::{Coordinates, Location};

/// Hungarian county seats and other well-known measuring sites.
const REFERENCE_CITIES: &[(&str, f64, f64)] = &[
    ("Budapest", 47.4979, 19.0402),
    ("Debrecen", 47.5316, 21.6273),
    ("Szeged", 46.2530, 20.1414),
    ("Miskolc", 48.1035, 20.7784),
    ("Pécs", 46.0727, 18.2323),
    ("Győr", 47.6875, 17.6504),
    ("Nyíregyháza", 47.9495, 21.7244),
    ("Kecskemét", 46.8964, 19.6897),
    ("Székesfehérvár", 47.1860, 18.4221),
    ("Szombathely", 47.2307, 16.6218),
    ("Szolnok", 47.1621, 20.1825),
    ("Tatabánya", 47.5692, 18.4048),
    ("Kaposvár", 46.3594, 17.7968),
    ("Békéscsaba", 46.6736, 21.0877),
    ("Zalaegerszeg", 46.8417, 16.8416),
    ("Eger", 47.9025, 20.3772),
    ("Veszprém", 47.0930, 17.9110),
    ("Salgótarján", 48.0935, 19.7999),
    ("Szekszárd", 46.3474, 18.7062),
    ("Sopron", 47.6817, 16.5845),
    ("Siófok", 46.9041, 18.0580),
    ("Baja", 46.1803, 18.9555),
    ("Zabar", 48.1500, 20.0500),
    ("Kékestető", 47.8728, 20.0094),
];

/// Bounding box of Hungary used for grid generation: (south, west, north, east).
pub const HUNGARY_BOUNDS: (f64, f64, f64, f64) = (45.75, 16.10, 48.60, 22.90);

pub fn reference_cities() -> Vec<Location> {
    REFERENCE_CITIES
        .iter()
        .map(|(name, lat, lon)| Location::new(*name, *lat, *lon))
        .collect()
}

fn squared_distance(a: Coordinates, b: Coordinates) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlon = a.longitude - b.longitude;
    dlat * dlat + dlon * dlon
}

/// Reference location closest to `point`. The first of equally close references wins.
pub fn nearest_city(point: Coordinates, references: &[Location]) -> Option<&Location> {
    references
        .iter()
        .fold(None::<(&Location, f64)>, |best, candidate| {
            let d = squared_distance(point, candidate.coordinates);
            match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((candidate, d)),
            }
        })
        .map(|(loc, _)| loc)
}

/// Give every unnamed location the name of its nearest reference city.
pub fn label_grid(points: Vec<Location>, references: &[Location]) -> Vec<Location> {
    points
        .into_iter()
        .map(|mut p| {
            if p.name.trim().is_empty() {
                if let Some(city) = nearest_city(p.coordinates, references) {
                    p.name = format!(
                        "{} ({:.2}, {:.2})",
                        city.name, p.coordinates.latitude, p.coordinates.longitude
                    );
                }
            }
            p
        })
        .collect()
}

/// Finest grid spacing accepted by [`hungary_grid`], in degrees.
pub const MIN_GRID_STEP: f64 = 0.05;

/// Regular lat/lon grid over [`HUNGARY_BOUNDS`], labelled with the nearest reference city.
///
/// The grid covers the bounding box, not the border, so points near the corners fall in
/// neighbouring countries and still carry the name of the closest Hungarian city. Steps
/// finer than [`MIN_GRID_STEP`] give an empty grid.
pub fn hungary_grid(step_deg: f64, references: &[Location]) -> Vec<Location> {
    if !step_deg.is_finite() || step_deg < MIN_GRID_STEP {
        return Vec::new();
    }

    let (south, west, north, east) = HUNGARY_BOUNDS;
    // Keeps the far edge when the span is a whole number of steps.
    let steps = |span: f64| (span / step_deg + 1e-9).floor() as usize;
    let rows = steps(north - south);
    let cols = steps(east - west);

    let points = (0..=rows)
        .flat_map(|r| (0..=cols).map(move |c| (r, c)))
        .map(|(r, c)| Location::new("", south + r as f64 * step_deg, west + c as f64 * step_deg))
        .collect();

    label_grid(points, references)
}

/// Load `[{"name": .., "latitude": .., "longitude": ..}]` from disk.
pub fn load_locations(path: &Path) -> Result<Vec<Location>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read locations file: {}", path.display()))?;

    let locations: Vec<Location> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse locations file: {}", path.display()))?;

    Ok(locations)
}
