use anyhow::Result;
use serde::Serialize;
use std::fmt::Write;

use hutemp_core::{
    ExtremeResult, ForecastReport, Policy,
    calibrate::{Calibration, WeightSource},
    provider::hungaromet::DailyStationReport,
};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn extreme_line(label: &str, e: &ExtremeResult) -> String {
    let mut line = format!("  {label:<8} {:>6.1} °C  {}", e.value, e.location_name);
    if let Some(ts) = e.timestamp {
        let _ = write!(line, "  at {}", ts.format("%Y-%m-%d %H:%M UTC"));
    }
    line
}

pub fn format_forecast(report: &ForecastReport) -> String {
    let policy = match report.policy {
        Policy::Weighted => "weighted models",
        Policy::EnsembleScan => "ensemble scan",
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Climatological day {} ({} to {}), {policy}",
        report.window.date,
        report.window.start.format("%Y-%m-%d %H:%M UTC"),
        report.window.end.format("%Y-%m-%d %H:%M UTC"),
    );
    let _ = writeln!(out, "{}", extreme_line("Minimum", &report.national.min));
    let _ = writeln!(out, "{}", extreme_line("Maximum", &report.national.max));

    if let Some(calibration) = &report.calibration {
        let weights: Vec<String> =
            calibration.weights.iter().map(|(m, w)| format!("{m}={w:.2}")).collect();
        let _ = writeln!(out, "Weights: {}", weights.join(", "));
    }

    if report.chunks_failed > 0 {
        let _ = writeln!(
            out,
            "Warning: {} of {} requests failed, extremes cover the remaining locations only",
            report.chunks_failed, report.chunks_total
        );
    }

    if !report.per_location.is_empty() {
        let _ = writeln!(out, "\n  {:<28} {:>7} {:>7}", "Location", "Min", "Max");
        for (location, e) in &report.per_location {
            let _ = writeln!(out, "  {:<28} {:>7.1} {:>7.1}", location.name, e.min.value, e.max.value);
        }
    }

    out
}

pub fn format_stations(report: &DailyStationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "HungaroMet station report {}", report.date);
    let _ = writeln!(out, "{}", extreme_line("Minimum", &report.national.min));
    let _ = writeln!(out, "{}", extreme_line("Maximum", &report.national.max));

    match &report.city {
        Some(city) => {
            let _ = writeln!(out, "\n{}", report.focus_city);
            let _ = writeln!(out, "{}", extreme_line("Minimum", &city.min));
            let _ = writeln!(out, "{}", extreme_line("Maximum", &city.max));

            let _ = writeln!(out, "\n  {:<28} {:>6} {:>7} {:>7}", "Station", "Code", "Min", "Max");
            for s in &report.city_stations {
                let fmt = |v: Option<f64>| v.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    out,
                    "  {:<28} {:>6} {:>7} {:>7}",
                    s.name,
                    s.number,
                    fmt(s.min_c),
                    fmt(s.max_c)
                );
            }
        }
        None => {
            let _ = writeln!(out, "\nNo readings from {} stations", report.focus_city);
        }
    }

    out
}

pub fn format_calibration(calibration: &Calibration) -> String {
    let mut out = String::new();

    match &calibration.source {
        WeightSource::Calibrated { lookback, mae } => {
            let _ = writeln!(out, "Model weights calibrated on {lookback}");
            for (model, w) in calibration.weights.iter() {
                let err = mae.get(model).copied().unwrap_or(f64::NAN);
                let _ = writeln!(out, "  {model:<24} weight {w:.3}  MAE {err:.2} °C");
            }
        }
        WeightSource::Fallback { reason } => {
            let _ = writeln!(out, "Calibration failed ({reason}), default weights:");
            for (model, w) in calibration.weights.iter() {
                let _ = writeln!(out, "  {model:<24} weight {w:.3}");
            }
        }
        WeightSource::Fixed => {
            let _ = writeln!(out, "Fixed model weights:");
            for (model, w) in calibration.weights.iter() {
                let _ = writeln!(out, "  {model:<24} weight {w:.3}");
            }
        }
    }

    out
}

pub fn print_forecast(report: &ForecastReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    print!("{}", format_forecast(report));
    Ok(())
}

pub fn print_stations(report: &DailyStationReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    print!("{}", format_stations(report));
    Ok(())
}

pub fn print_calibration(calibration: &Calibration, json: bool) -> Result<()> {
    if json {
        return print_json(calibration);
    }
    print!("{}", format_calibration(calibration));
    Ok(())
}
