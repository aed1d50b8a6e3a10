//! HungaroMet synoptic daily reports.
//!
//! Each day is published as `HABP_1D_<YYYYMMDD>.csv.zip`, a ZIP holding one semicolon
//! separated CSV. Minimum and maximum temperatures sit in fixed columns, use a comma as
//! decimal separator and `-999` for a missing reading.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{
    io::{Cursor, Read},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    error::{ReduceError, StationFeedError},
    model::{Coordinates, Extremes},
    provider::openmeteo::truncate_body,
    reduce::{Candidate, extremes_of, is_missing},
};

const NUMBER_COL: usize = 1;
const NAME_COL: usize = 2;
const MIN_COL: usize = 10;
const MAX_COL: usize = 12;

pub fn file_name_for(date: NaiveDate) -> String {
    format!("HABP_1D_{}.csv.zip", date.format("%Y%m%d"))
}

#[derive(Debug, Clone)]
pub struct HungaroMetFeed {
    base_url: String,
    http: Client,
}

impl HungaroMetFeed {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for HungaroMet")?;

        Ok(Self { base_url: base_url.into(), http })
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{}", file_name_for(date))
    }

    /// Download the raw daily ZIP.
    pub async fn download(&self, date: NaiveDate) -> Result<Vec<u8>> {
        let url = self.url_for(date);
        debug!(url = %url, "HungaroMet request");

        let res = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to HungaroMet ({url})"))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!(
                "HungaroMet request for {} failed with status {}: {}",
                date,
                status,
                truncate_body(&body),
            ));
        }

        let bytes = res.bytes().await.context("Failed to read HungaroMet ZIP body")?;
        info!(%date, bytes = bytes.len(), "station report downloaded");

        Ok(bytes.to_vec())
    }

    /// Download, unpack and parse the report of `date`.
    pub async fn fetch_records(&self, date: NaiveDate) -> Result<(Vec<u8>, Vec<StationRecord>)> {
        let zip_bytes = self.download(date).await?;
        let expected = file_name_for(date);
        let csv_text = extract_csv(&zip_bytes, expected.strip_suffix(".zip"))
            .with_context(|| format!("Failed to unpack {expected}"))?;
        let records = parse_stations(&csv_text)
            .with_context(|| format!("Failed to parse stations in {expected}"))?;

        Ok((zip_bytes, records))
    }
}

/// Read the CSV out of a report ZIP, preferring `expected_name` and falling back to the
/// first `.csv` entry. Invalid UTF-8 is replaced rather than rejected.
pub fn extract_csv(zip_bytes: &[u8], expected_name: Option<&str>) -> Result<String, StationFeedError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))?;

    let mut index = expected_name.and_then(|name| archive.index_for_name(name));
    if index.is_none() {
        for i in 0..archive.len() {
            if archive.by_index(i)?.name().to_lowercase().ends_with(".csv") {
                index = Some(i);
                break;
            }
        }
    }
    let index = index.ok_or(StationFeedError::NoCsv)?;

    let mut entry = archive.by_index(index)?;
    let name = entry.name().to_string();
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw).map_err(|e| StationFeedError::EntryRead(name, e))?;

    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// One row of the daily report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub number: String,
    pub name: String,
    pub min_c: Option<f64>,
    pub max_c: Option<f64>,
    pub coordinates: Option<Coordinates>,
}

impl StationRecord {
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.number)
    }
}

/// Comma-decimal number; empty cells and the `-999` sentinel are missing.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.replace(',', ".").parse::<f64>().ok().filter(|v| !is_missing(*v))
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| names.contains(&h.trim().to_lowercase().as_str()))
}

pub fn parse_stations(csv_text: &str) -> Result<Vec<StationRecord>, StationFeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers()?.clone();
    let lat_col = find_column(&headers, &["lat", "latitude"]);
    let lon_col = find_column(&headers, &["lon", "longitude"]);

    let mut records = Vec::new();
    let mut short_rows = 0;

    for (i, row) in reader.records().enumerate() {
        let row = row?;

        if row.iter().all(|f| f.is_empty()) {
            continue;
        }
        // Cells past the end of a truncated row are read as missing.
        if row.len() <= MAX_COL {
            short_rows += 1;
            debug!(row = i + 1, columns = row.len(), "short station row");
        }
        let cell = |col: usize| row.get(col).unwrap_or("");

        let coordinates = match (lat_col, lon_col) {
            (Some(la), Some(lo)) => row
                .get(la)
                .and_then(parse_decimal)
                .zip(row.get(lo).and_then(parse_decimal))
                .map(|(lat, lon)| Coordinates::new(lat, lon)),
            _ => None,
        };

        records.push(StationRecord {
            number: cell(NUMBER_COL).to_string(),
            name: cell(NAME_COL).to_string(),
            min_c: parse_decimal(cell(MIN_COL)),
            max_c: parse_decimal(cell(MAX_COL)),
            coordinates,
        });
    }

    if short_rows > 0 {
        warn!(short_rows, expected_columns = MAX_COL + 1, "station rows with missing temperature columns");
    }

    Ok(records)
}

/// National extremes of one report, plus the extremes of one city's stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStationReport {
    pub date: NaiveDate,
    pub national: Extremes,
    pub focus_city: String,
    pub city: Option<Extremes>,
    pub city_stations: Vec<StationRecord>,
}

impl DailyStationReport {
    pub fn from_records(
        date: NaiveDate,
        records: &[StationRecord],
        focus_city: &str,
    ) -> Result<Self, ReduceError> {
        let national = station_extremes(records.iter())?;

        let needle = focus_city.to_lowercase();
        let mut city_stations: Vec<StationRecord> = records
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        city_stations.sort_by(|a, b| a.name.cmp(&b.name));

        let city = station_extremes(city_stations.iter()).ok();

        Ok(Self { date, national, focus_city: focus_city.to_string(), city, city_stations })
    }
}

/// Minimum over the stations' daily minima and maximum over their daily maxima.
pub fn station_extremes<'a>(
    records: impl Iterator<Item = &'a StationRecord>,
) -> Result<Extremes, ReduceError> {
    let names: Vec<(&StationRecord, String)> = records.map(|r| (r, r.display_name())).collect();

    let pool = |pick: fn(&StationRecord) -> Option<f64>| {
        names.iter().filter_map(move |(r, name)| {
            pick(r).map(|value| Candidate {
                value,
                location_name: name.as_str(),
                timestamp: None,
                coordinates: r.coordinates,
            })
        })
    };

    extremes_of(pool(|r| r.min_c), pool(|r| r.max_c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const HEADER: &str = "Time;StationNumber;StationName;Latitude;Longitude;Elevation;r;Q_r;rau;Q_rau;tn;Q_tn;tx;Q_tx";

    fn report() -> String {
        [
            HEADER,
            "20240115;12843;Budapest-Lőrinc;47,4333;19,1833;139;0;;0;;-6,1;;3,4;",
            "20240115;12839;Budapest-Pestszentlőrinc;47,43;19,18;138;0;;0;;-999;;2,9;",
            "20240115;12772;Miskolc;48,1;20,77;233;0;;0;;-8,0;;1,2;",
            "20240115;12892;Zabar;48,15;20,05;320;0;;0;;-13,8;;-999;",
            "20240115;12882;Debrecen;47,48;21,61;108;0;;0;;-5,2;;4,1;",
        ]
        .join("\n")
    }

    fn zipped(name: &str, contents: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn file_name_uses_compact_date() {
        assert_eq!(file_name_for(date()), "HABP_1D_20240115.csv.zip");
    }

    #[test]
    fn url_joins_base_and_file_name() {
        let feed = HungaroMetFeed::new("https://example.org/daily/csv", Duration::from_secs(5)).unwrap();
        assert_eq!(feed.url_for(date()), "https://example.org/daily/csv/HABP_1D_20240115.csv.zip");
    }

    #[test]
    fn comma_decimal_and_sentinel() {
        assert_eq!(parse_decimal("3,4"), Some(3.4));
        assert_eq!(parse_decimal(" -12,5 "), Some(-12.5));
        assert_eq!(parse_decimal("-999"), None);
        assert_eq!(parse_decimal("-999,0"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
    }

    #[test]
    fn row_with_sentinel_minimum_keeps_maximum() {
        let csv = format!("{HEADER}\n20240115;12345;Budapest;47,5;19,0;100;0;;0;;-999;;3,4;");
        let records = parse_stations(&csv).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number, "12345");
        assert_eq!(records[0].name, "Budapest");
        assert_eq!(records[0].min_c, None);
        assert_eq!(records[0].max_c, Some(3.4));
        assert_eq!(records[0].coordinates, Some(Coordinates::new(47.5, 19.0)));
    }

    #[test]
    fn coordinates_are_optional() {
        let csv = "Time;No;Name;a;b;c;d;e;f;g;tn;h;tx\n20240115;1;Sopron;;;;;;;;-1,0;;5,0";
        let records = parse_stations(csv).unwrap();
        assert_eq!(records[0].coordinates, None);
        assert_eq!(records[0].max_c, Some(5.0));
    }

    #[test]
    fn truncated_row_does_not_drop_the_others() {
        let csv = [
            HEADER,
            "20240115;12892;Zabar;48,15;20,05;320;0;;0;;-13,8;;-999;",
            "20240115;1;Truncated;1;2",
            "20240115;12882;Debrecen;47,48;21,61;108;0;;0;;-5,2;;4,1;",
        ]
        .join("\n");
        let records = parse_stations(&csv).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].name, "Truncated");
        assert_eq!(records[1].min_c, None);
        assert_eq!(records[1].max_c, None);

        let report = DailyStationReport::from_records(date(), &records, "Budapest").unwrap();
        assert_eq!(report.national.min.value, -13.8);
        assert_eq!(report.national.max.value, 4.1);
    }

    #[test]
    fn national_and_city_extremes() {
        let records = parse_stations(&report()).unwrap();
        let report = DailyStationReport::from_records(date(), &records, "budapest").unwrap();

        assert_eq!(report.national.min.value, -13.8);
        assert_eq!(report.national.min.location_name, "Zabar (12892)");
        assert_eq!(report.national.max.value, 4.1);
        assert_eq!(report.national.max.location_name, "Debrecen (12882)");

        let city = report.city.unwrap();
        assert_eq!(city.min.value, -6.1);
        assert_eq!(city.max.value, 3.4);
        assert_eq!(report.city_stations.len(), 2);
        assert_eq!(report.city_stations[0].name, "Budapest-Lőrinc");
    }

    #[test]
    fn city_without_stations_is_none() {
        let records = parse_stations(&report()).unwrap();
        let report = DailyStationReport::from_records(date(), &records, "Szeged").unwrap();
        assert!(report.city.is_none());
        assert!(report.city_stations.is_empty());
    }

    #[test]
    fn report_without_readings_is_empty_input() {
        let csv = format!("{HEADER}\n20240115;1;X;;;;;;;;-999;;-999;");
        let records = parse_stations(&csv).unwrap();
        let err = DailyStationReport::from_records(date(), &records, "Budapest").unwrap_err();
        assert_eq!(err, ReduceError::EmptyInput);
    }

    #[test]
    fn extract_prefers_expected_entry() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("readme.csv", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"wrong").unwrap();
        writer.start_file("HABP_1D_20240115.csv", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"right").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(extract_csv(&bytes, Some("HABP_1D_20240115.csv")).unwrap(), "right");
        assert_eq!(extract_csv(&bytes, Some("other.csv")).unwrap(), "wrong");
        assert_eq!(extract_csv(&bytes, None).unwrap(), "wrong");
    }

    #[test]
    fn extract_without_csv_fails() {
        let bytes = zipped("notes.txt", "hello");
        assert!(matches!(extract_csv(&bytes, None), Err(StationFeedError::NoCsv)));
        assert!(matches!(extract_csv(b"not a zip", None), Err(StationFeedError::Zip(_))));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("a.csv", SimpleFileOptions::default()).unwrap();
        writer.write_all(&[b'P', 0xE9, b'c', b's']).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let text = extract_csv(&bytes, None).unwrap();
        assert!(text.starts_with('P'));
        assert!(text.contains('\u{FFFD}'));
    }
}
