//! Climatological day boundaries.
//!
//! A climatological day for date `D` runs from 18:00 UTC on `D - 1` to 18:00 UTC on `D`,
//! so the dawn minimum and the afternoon maximum of `D` land in the same window.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WindowError;

const BOUNDARY_HOUR: u32 = 18;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimatologicalWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ClimatologicalWindow {
    pub fn for_date(date: NaiveDate) -> Result<Self, WindowError> {
        let previous = date
            .checked_sub_days(Days::new(1))
            .ok_or(WindowError::OutOfRange(date))?;

        let boundary = NaiveTime::from_hms_opt(BOUNDARY_HOUR, 0, 0)
            .ok_or(WindowError::OutOfRange(date))?;

        Ok(Self {
            date,
            start: previous.and_time(boundary).and_utc(),
            end: date.and_time(boundary).and_utc(),
        })
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// First calendar day touched by the window (for `start_date` query parameters).
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Last calendar day touched by the window (for `end_date` query parameters).
    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

/// Parse a user-supplied `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, WindowError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| WindowError::InvalidDate(input.to_string()))
}

/// Every date from `from` to `to`, both inclusive.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, WindowError> {
    if from > to {
        return Err(WindowError::ReversedRange { from, to });
    }

    Ok(from.iter_days().take_while(|d| *d <= to).collect())
}
