use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    model::{ExtremeResult, Extremes},
    provider::hungaromet::{DailyStationReport, file_name_for},
};

/// One spreadsheet row: national and focus-city extremes of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub national_min_c: f64,
    pub national_min_location: String,
    pub national_max_c: f64,
    pub national_max_location: String,
    pub city: String,
    pub city_min_c: Option<f64>,
    pub city_min_location: Option<String>,
    pub city_max_c: Option<f64>,
    pub city_max_location: Option<String>,
}

impl ReportRow {
    pub fn new(date: NaiveDate, national: &Extremes, city: &str, city_extremes: Option<&Extremes>) -> Self {
        let part = |pick: fn(&Extremes) -> &ExtremeResult| {
            city_extremes.map(pick).map(|e| (e.value, e.location_name.clone())).unzip()
        };
        let (city_min_c, city_min_location) = part(|e| &e.min);
        let (city_max_c, city_max_location) = part(|e| &e.max);

        Self {
            date,
            national_min_c: national.min.value,
            national_min_location: national.min.location_name.clone(),
            national_max_c: national.max.value,
            national_max_location: national.max.location_name.clone(),
            city: city.to_string(),
            city_min_c,
            city_min_location,
            city_max_c,
            city_max_location,
        }
    }
}

impl From<&DailyStationReport> for ReportRow {
    fn from(report: &DailyStationReport) -> Self {
        Self::new(report.date, &report.national, &report.focus_city, report.city.as_ref())
    }
}

/// Write rows as a CSV spreadsheet with a header line.
pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;

    for row in rows {
        writer.serialize(row).context("Failed to write report row")?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush report file: {}", path.display()))?;

    Ok(())
}

/// Store the original daily ZIP under its published file name inside `dir`.
pub fn save_zip(dir: &Path, date: NaiveDate, zip_bytes: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let path = dir.join(file_name_for(date));
    fs::write(&path, zip_bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}
