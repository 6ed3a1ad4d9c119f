//! Export utilities for trend analyses.
//!
//! # Supported Formats
//!
//! | Format | Use Case |
//! |--------|----------|
//! | CSV | Per-bar trend tables, summary records, feature tables |
//! | JSON | Structured output of any analysis record |
//!
//! Undefined values are written as empty CSV cells.

use crate::analytics::{ResultFormatter, SummaryStatistics};
use crate::error::Result;
use crate::features::FeatureTable;
use crate::trends::TrendAnalysis;
use crate::types::Bar;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column names of the per-bar trend table.
pub const TREND_COLUMNS: [&str; 18] = [
    "Date",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "Smoothed",
    "Trend",
    "n_Trend",
    "Max_Drawdown",
    "ATR",
    "max_TR",
    "min_TR",
    "Ratio",
    "ICAGR",
    "Bliss",
    "Trend_Start",
    "Trend_End",
];

/// Configuration for exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Date format for CSV exports.
    pub date_format: String,
    /// Whether to include headers in CSV.
    pub include_headers: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            include_headers: true,
        }
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write plain OHLCV bars in the layout `load_csv` reads.
pub fn write_bars_csv(bars: &[Bar], path: impl AsRef<Path>, config: &ExportConfig) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    if config.include_headers {
        writeln!(writer, "Date,Open,High,Low,Close,Volume")?;
    }
    for bar in bars {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            bar.timestamp.format(&config.date_format),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the per-bar trend table.
///
/// Segment metrics appear on the first bar of each segment only.
pub fn write_trends_csv(
    analysis: &TrendAnalysis,
    path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    if config.include_headers {
        writeln!(writer, "{}", TREND_COLUMNS.join(","))?;
    }

    for row in &analysis.rows {
        let m = row.metrics;
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            row.timestamp.format(&config.date_format),
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
            row.smoothed,
            row.trend.to_numeric(),
            row.n_trend,
            cell(m.map(|m| m.max_drawdown)),
            cell(m.map(|m| m.atr)),
            cell(m.map(|m| m.max_tr)),
            cell(m.map(|m| m.min_tr)),
            cell(m.map(|m| m.ratio)),
            cell(m.map(|m| m.icagr)),
            cell(m.and_then(|m| m.bliss)),
            row.trend_start.format(&config.date_format),
            row.trend_end.format(&config.date_format),
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one summary record.
pub fn write_summary_csv(summary: &SummaryStatistics, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", ResultFormatter::csv_header())?;
    writeln!(writer, "{}", ResultFormatter::to_csv_line(summary))?;

    writer.flush()?;
    Ok(())
}

/// Write summary records of many tickers, one row each.
pub fn write_summaries_csv(
    summaries: &[(String, SummaryStatistics)],
    path: impl AsRef<Path>,
) -> Result<()> {
    write_summaries(summaries, BufWriter::new(File::create(path)?))
}

/// Write summary records of many tickers to any writer.
///
/// Tickers are quoted when needed, so names holding the delimiter stay in
/// their column.
pub fn write_summaries<W: Write>(summaries: &[(String, SummaryStatistics)], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["ticker"];
    header.extend(ResultFormatter::csv_header().split(','));
    writer.write_record(&header)?;

    for (ticker, summary) in summaries {
        let mut record = vec![ticker.clone()];
        record.extend(ResultFormatter::csv_fields(summary));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a feature table with a leading date column.
pub fn write_features_csv(
    table: &FeatureTable,
    path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    if config.include_headers {
        writeln!(writer, "Date,{}", table.names().join(","))?;
    }

    for (i, timestamp) in table.timestamps.iter().enumerate() {
        let values: Vec<String> = table.columns.iter().map(|c| cell(c.values[i])).collect();
        writeln!(
            writer,
            "{},{}",
            timestamp.format(&config.date_format),
            values.join(",")
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Write any serializable record as pretty JSON.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
