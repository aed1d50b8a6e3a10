use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Date {0} is out of the supported calendar range")]
    OutOfRange(NaiveDate),

    #[error("Date range is reversed: {from} is after {to}")]
    ReversedRange { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Error, PartialEq)]
pub enum ReduceError {
    #[error("No valid temperature samples to reduce")]
    EmptyInput,
}

#[derive(Debug, Error, PartialEq)]
pub enum WeightsError {
    #[error("Model weight table is empty")]
    Empty,

    #[error("Weight {weight} for model '{model}' is outside [0, 1]")]
    OutOfRange { model: String, weight: f64 },

    #[error("Model weights sum to {0}, expected 1")]
    BadSum(f64),
}

#[derive(Debug, Error)]
pub enum StationFeedError {
    #[error("Failed to open ZIP archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to read ZIP entry '{0}'")]
    EntryRead(String, #[source] std::io::Error),

    #[error("No CSV file found in ZIP archive")]
    NoCsv,

    #[error("Failed to parse station CSV")]
    Csv(#[from] csv::Error),
}
