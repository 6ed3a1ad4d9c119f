//! Price data loading, cleaning and resampling.

use crate::error::{Result, TrendError};
use crate::types::Bar;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// One row of a vendor price file.
///
/// Headers of the common end-of-day layouts are accepted: Sharadar SEP
/// (`ticker,date,open,...`), Quandl EOD (`Date,Open,...,Adj_Close`) and
/// plain exports. Unknown columns are ignored. The ticker column is optional;
/// when present it keeps the series of different tickers apart.
#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(alias = "Ticker", default)]
    ticker: Option<String>,
    #[serde(alias = "Date", alias = "DATE", alias = "timestamp")]
    date: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume", alias = "vol", default)]
    volume: f64,
}

/// Data source configuration.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Date format string (e.g. "%Y-%m-%d"). Common formats are tried when unset.
    pub date_format: Option<String>,
    /// Whether the CSV has headers.
    pub has_headers: bool,
    /// CSV delimiter. Auto-detected when unset.
    pub delimiter: Option<u8>,
    /// Skip invalid rows instead of failing.
    pub skip_invalid: bool,
    /// Reject bars that break the price invariants.
    pub validate_bars: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            has_headers: true,
            delimiter: None,
            skip_invalid: true,
            validate_bars: true,
        }
    }
}

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Date layouts found in end-of-day price files.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d/%m/%Y", "%m/%d/%Y"];

/// Timestamp layouts, for files that carry a time of day.
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"];

/// Guess the delimiter from the first lines of a file.
///
/// A candidate qualifies when it splits every sampled line into the same
/// number of fields, at least five. The widest split wins; comma otherwise.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let sample: Vec<String> = BufReader::new(File::open(path)?)
        .lines()
        .take(5)
        .map_while(|l| l.ok())
        .collect();

    let fields = |delim: u8| -> Option<usize> {
        let mut widths = sample
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delim).count() + 1);
        let first = widths.next()?;
        (first >= 5 && widths.all(|w| w == first)).then_some(first)
    };

    let detected = CANDIDATE_DELIMITERS
        .iter()
        .filter_map(|&d| fields(d).map(|n| (d, n)))
        .max_by_key(|&(_, n)| n)
        .map_or(b',', |(d, _)| d);

    debug!("Detected delimiter {:?}", detected as char);
    Ok(detected)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Parse a bar date. The explicit format is tried first, then the known
/// timestamp and date layouts.
fn parse_datetime(s: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    let datetimes = format.into_iter().chain(DATETIME_FORMATS);
    for fmt in datetimes {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    let dates = format.into_iter().chain(DATE_FORMATS);
    for fmt in dates {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(midnight(d));
        }
    }

    Err(TrendError::DataError(format!("Unrecognized date '{}'", s)))
}

/// Decode the rows of a price file, each with its ticker when the file has one.
fn read_rows(path: &Path, config: &DataConfig) -> Result<Vec<(Option<String>, Bar)>> {
    info!("Loading data from: {}", path.display());

    let delimiter = match config.delimiter {
        Some(d) => d,
        None => detect_delimiter(path)?,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(config.has_headers)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    let mut skipped = 0;

    for (index, result) in reader.deserialize::<PriceRow>().enumerate() {
        let row_num = index + 1;
        let row = match result {
            Ok(r) => r,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(TrendError::CsvError(e)),
        };

        let timestamp = match parse_datetime(&row.date, config.date_format.as_deref()) {
            Ok(ts) => ts,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let bar = Bar::new(timestamp, row.open, row.high, row.low, row.close, row.volume);

        if config.validate_bars {
            if let Some(problem) = bar.invariant_violation() {
                if config.skip_invalid {
                    debug!("Skipping row {}: {}", row_num, problem);
                    skipped += 1;
                    continue;
                }
                return Err(TrendError::DataError(format!(
                    "Invalid bar at row {}: {}",
                    row_num, problem
                )));
            }
        }

        let ticker = row
            .ticker
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        rows.push((ticker, bar));
    }

    if skipped > 0 {
        warn!("Skipped {} invalid rows in {}", skipped, path.display());
    }
    Ok(rows)
}

/// Sort one ticker's bars by time and drop duplicate timestamps, keeping the
/// first occurrence.
fn into_series(mut bars: Vec<Bar>, name: &str) -> Result<Vec<Bar>> {
    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    if bars.len() < before {
        warn!("Removed {} duplicate timestamps from {}", before - bars.len(), name);
    }

    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Err(TrendError::NoData);
    };
    info!(
        "Loaded {} bars of {} from {} to {}",
        bars.len(),
        name,
        first.timestamp.format("%Y-%m-%d"),
        last.timestamp.format("%Y-%m-%d")
    );
    Ok(bars)
}

fn file_symbol(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("SERIES")
        .to_string()
}

/// Load one price series from a CSV file.
///
/// Bars are sorted by timestamp and duplicate timestamps are dropped (first
/// occurrence kept). A file whose ticker column names more than one ticker is
/// rejected; use [`load_tickers`] for those.
pub fn load_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let rows = read_rows(path, config)?;

    let tickers: BTreeSet<&str> = rows.iter().filter_map(|(t, _)| t.as_deref()).collect();
    if tickers.len() > 1 {
        let names: Vec<&str> = tickers.into_iter().collect();
        return Err(TrendError::DataError(format!(
            "{} holds {} tickers ({}); load it per ticker",
            path.display(),
            names.len(),
            names.join(", ")
        )));
    }

    let name = match tickers.first() {
        Some(ticker) => ticker.to_string(),
        None => file_symbol(path),
    };
    into_series(rows.into_iter().map(|(_, bar)| bar).collect(), &name)
}

/// Load a price file holding one or many tickers, one series per ticker.
///
/// Rows are grouped by the ticker column; rows without a ticker belong to the
/// file stem. Each series is sorted and de-duplicated like [`load_csv`].
pub fn load_tickers(
    path: impl AsRef<Path>,
    config: &DataConfig,
) -> Result<HashMap<String, Vec<Bar>>> {
    let path = path.as_ref();
    let rows = read_rows(path, config)?;
    if rows.is_empty() {
        return Err(TrendError::NoData);
    }

    let mut grouped: HashMap<String, Vec<Bar>> = HashMap::new();
    for (ticker, bar) in rows {
        let key = ticker.unwrap_or_else(|| file_symbol(path));
        grouped.entry(key).or_default().push(bar);
    }

    grouped
        .into_iter()
        .map(|(ticker, bars)| {
            let series = into_series(bars, &ticker)?;
            Ok((ticker, series))
        })
        .collect()
}

/// Load every file matching `pattern` in `dir`, keyed by file stem.
///
/// Files that fail to load are logged and skipped; the call fails only when
/// nothing loads and at least one file failed.
pub fn load_dir(
    dir: impl AsRef<Path>,
    pattern: &str,
    config: &DataConfig,
) -> Result<HashMap<String, Vec<Bar>>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(TrendError::DataError(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let glob_pattern = dir.join(pattern);
    let glob_pattern = glob_pattern.to_string_lossy();
    info!("Loading files matching: {}", glob_pattern);

    let paths = glob::glob(&glob_pattern).map_err(|e| {
        TrendError::DataError(format!("Invalid glob pattern '{}': {}", pattern, e))
    })?;

    let mut result = HashMap::new();
    let mut errors = 0;

    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Glob error: {}", e);
                errors += 1;
                continue;
            }
        };
        let Some(symbol) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            warn!("Could not derive a symbol from {}", path.display());
            errors += 1;
            continue;
        };

        match load_csv(&path, config) {
            Ok(bars) => {
                result.insert(symbol, bars);
            }
            Err(e) => {
                warn!("Failed to load {}: {}", path.display(), e);
                errors += 1;
            }
        }
    }

    if result.is_empty() && errors > 0 {
        return Err(TrendError::DataError(format!(
            "No files loaded from {}. {} errors occurred.",
            dir.display(),
            errors
        )));
    }

    info!(
        "Loaded {} symbols from {} ({} errors)",
        result.len(),
        dir.display(),
        errors
    );
    Ok(result)
}

/// Load `<dir>/<ticker>.csv` for every ticker of a universe table.
///
/// Keys are `EXCHANGE/TICKER`. Missing or unreadable files are logged and
/// skipped; an empty result is `NoData`.
pub fn load_universe(
    dir: impl AsRef<Path>,
    universe: &BTreeMap<String, Vec<String>>,
    config: &DataConfig,
) -> Result<HashMap<String, Vec<Bar>>> {
    let dir = dir.as_ref();
    let mut result = HashMap::new();

    for (exchange, tickers) in universe {
        for ticker in tickers {
            let path = dir.join(format!("{}.csv", ticker));
            match load_csv(&path, config) {
                Ok(bars) => {
                    result.insert(format!("{}/{}", exchange, ticker), bars);
                }
                Err(e) => warn!("Skipping {}/{}: {}", exchange, ticker, e),
            }
        }
    }

    if result.is_empty() {
        return Err(TrendError::NoData);
    }
    info!("Loaded {} universe tickers from {}", result.len(), dir.display());
    Ok(result)
}

/// Check the series the trend pipeline runs on.
///
/// Requires at least two bars, every bar satisfying the price invariants, and
/// strictly increasing timestamps.
pub fn validate_series(bars: &[Bar]) -> Result<()> {
    if bars.len() < 2 {
        return Err(TrendError::InsufficientData {
            required: 2,
            actual: bars.len(),
        });
    }
    for bar in bars {
        if let Some(problem) = bar.invariant_violation() {
            return Err(TrendError::DataInvariant(problem));
        }
    }
    check_ordering(bars)
}

fn check_ordering(bars: &[Bar]) -> Result<()> {
    if let Some(pair) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(TrendError::DataInvariant(format!(
            "timestamps not strictly increasing: {} then {}",
            pair[0].timestamp, pair[1].timestamp
        )));
    }
    Ok(())
}

/// Repair common defects of vendor price data.
///
/// Rows without positive volume are dropped. Low and high are reset to the
/// min/max of the four prices (clipped at 0) and rows with no positive high
/// are dropped. Zero opens and closes are filled from each other, or from the
/// high when both are zero; a zero low becomes the smallest other price.
/// Missing opens are filled from the close, then the high; missing closes from
/// the low.
pub fn clean_prices(bars: &[Bar]) -> Vec<Bar> {
    let mut cleaned = Vec::with_capacity(bars.len());

    for bar in bars {
        if !(bar.volume.is_finite() && bar.volume > 0.0) {
            continue;
        }
        let mut b = bar.clone();
        let prices = [b.open, b.high, b.low, b.close];
        // f64::min/max skip NaN operands
        let low = prices.iter().copied().fold(f64::NAN, f64::min);
        let high = prices.iter().copied().fold(f64::NAN, f64::max);
        b.low = low.max(0.0);
        b.high = high.max(0.0);
        if !(b.high > 0.0) {
            continue;
        }

        if b.open == 0.0 {
            b.open = b.close;
        }
        if b.close == 0.0 {
            b.close = b.open;
        }
        if b.open == 0.0 && b.close == 0.0 {
            b.open = b.high;
            b.close = b.high;
        }
        if b.low == 0.0 {
            b.low = [b.open, b.high, b.close]
                .iter()
                .copied()
                .fold(f64::NAN, f64::min);
        }

        if b.open.is_nan() {
            b.open = b.close;
        }
        if b.open.is_nan() {
            b.open = b.high;
        }
        if b.close.is_nan() {
            b.close = b.low;
        }
        cleaned.push(b);
    }

    if cleaned.len() < bars.len() {
        debug!("Cleaning dropped {} of {} bars", bars.len() - cleaned.len(), bars.len());
    }
    cleaned
}

/// Strict check of cleaned prices: positive volume, positive finite prices,
/// open and close inside the low-high range, strictly increasing timestamps.
pub fn check_prices(bars: &[Bar]) -> Result<()> {
    for bar in bars {
        if !(bar.volume > 0.0) {
            return Err(TrendError::DataInvariant(format!(
                "non-positive volume {} at {}",
                bar.volume, bar.timestamp
            )));
        }
        if let Some(problem) = bar.invariant_violation() {
            return Err(TrendError::DataInvariant(problem));
        }
    }
    check_ordering(bars)
}

/// Friday ending the week of `timestamp`.
fn week_ending_friday(timestamp: DateTime<Utc>) -> NaiveDate {
    let date = timestamp.date_naive();
    let to_friday = (4 + 7 - date.weekday().num_days_from_monday() as i64) % 7;
    date + Duration::days(to_friday)
}

/// Resample daily bars to weekly bars labelled by the week-ending Friday.
///
/// Open is the first open, high the max high, low the min low, close the last
/// close and volume the sum. Weeks without bars are skipped.
pub fn to_weekly(bars: &[Bar]) -> Vec<Bar> {
    let mut weeks: BTreeMap<NaiveDate, Vec<&Bar>> = BTreeMap::new();
    for bar in bars {
        weeks.entry(week_ending_friday(bar.timestamp)).or_default().push(bar);
    }

    weeks
        .into_iter()
        .filter_map(|(friday, mut week)| {
            week.sort_by_key(|b| b.timestamp);
            let first = week.first()?;
            let last = week.last()?;
            let high = week.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let low = week.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let volume = week.iter().map(|b| b.volume).sum();
            Some(Bar::new(midnight(friday), first.open, high, low, last.close, volume))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Weekday};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Volume").unwrap();
        writeln!(file, "2024-01-01,100,105,98,102,1000").unwrap();
        writeln!(file, "2024-01-02,102,108,101,107,1200").unwrap();
        writeln!(file, "2024-01-03,107,110,105,108,1100").unwrap();
        writeln!(file, "2024-01-04,108,109,103,104,900").unwrap();
        writeln!(file, "2024-01-05,104,106,100,105,1000").unwrap();
        file
    }

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume,
        )
    }

    #[test]
    fn test_load_csv() {
        let file = create_test_csv();
        let bars = load_csv(file.path(), &DataConfig::default()).unwrap();

        assert_eq!(bars.len(), 5);
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[4].close, 105.0);
    }

    #[test]
    fn test_load_csv_sorts_and_dedups() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "date,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-03,10,11,9,10,5").unwrap();
        writeln!(file, "2024-01-01,10,11,9,10,5").unwrap();
        writeln!(file, "2024-01-03,20,21,19,20,5").unwrap();
        writeln!(file, "2024-01-02,10,11,9,10,5").unwrap();

        let bars = load_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(bars.len(), 3);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(bars[2].close, 10.0);
    }

    #[test]
    fn test_load_csv_skips_or_fails_invalid_rows() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Volume").unwrap();
        writeln!(file, "2024-01-01,100,105,98,102,1000").unwrap();
        writeln!(file, "2024-01-02,102,100,101,107,1200").unwrap();
        writeln!(file, "not-a-date,102,108,101,107,1200").unwrap();
        writeln!(file, "2024-01-04,108,109,103,104,900").unwrap();

        let bars = load_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(bars.len(), 2);

        let strict = DataConfig {
            skip_invalid: false,
            ..Default::default()
        };
        assert!(load_csv(file.path(), &strict).is_err());
    }

    #[test]
    fn test_load_csv_empty_is_no_data() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Volume").unwrap();
        assert!(matches!(
            load_csv(file.path(), &DataConfig::default()),
            Err(TrendError::NoData)
        ));
    }

    #[test]
    fn test_load_sharadar_layout() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "ticker,date,open,high,low,close,volume,closeadj,closeunadj,lastupdated").unwrap();
        writeln!(file, "AAPL,2024-01-03,184.2,185.9,183.4,184.3,58414460,183.9,184.3,2024-01-03").unwrap();
        writeln!(file, "AAPL,2024-01-02,187.2,188.4,183.9,185.6,82488670,185.2,185.6,2024-01-02").unwrap();

        let bars = load_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 185.6);
        assert_eq!(bars[1].volume, 58414460.0);
    }

    fn create_two_ticker_csv() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "ticker,date,open,high,low,close,volume").unwrap();
        writeln!(file, "AAPL,2024-01-02,180,183,179,181,1000").unwrap();
        writeln!(file, "HLIX,2024-01-02,2.0,2.1,1.9,2.05,500").unwrap();
        writeln!(file, "AAPL,2024-01-03,181,184,180,182,1100").unwrap();
        writeln!(file, "HLIX,2024-01-03,2.05,2.2,2.0,2.1,600").unwrap();
        writeln!(file, "HLIX,2024-01-04,2.1,2.3,2.0,2.2,700").unwrap();
        file
    }

    #[test]
    fn test_load_csv_rejects_mixed_tickers() {
        let file = create_two_ticker_csv();
        let err = load_csv(file.path(), &DataConfig::default()).unwrap_err();
        match err {
            TrendError::DataError(msg) => assert!(msg.contains("AAPL, HLIX")),
            other => panic!("expected DataError, got {:?}", other),
        }
    }

    #[test]
    fn test_load_tickers_splits_series() {
        let file = create_two_ticker_csv();
        let series = load_tickers(file.path(), &DataConfig::default()).unwrap();

        assert_eq!(series.len(), 2);
        let aapl: Vec<f64> = series["AAPL"].iter().map(|b| b.close).collect();
        assert_eq!(aapl, vec![181.0, 182.0]);
        let hlix: Vec<f64> = series["HLIX"].iter().map(|b| b.close).collect();
        assert_eq!(hlix, vec![2.05, 2.1, 2.2]);
    }

    #[test]
    fn test_load_tickers_without_ticker_column() {
        let file = create_test_csv();
        let series = load_tickers(file.path(), &DataConfig::default()).unwrap();
        let stem = file.path().file_stem().unwrap().to_str().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[stem].len(), 5);
    }

    #[test]
    fn test_date_parsing() {
        let dt = parse_datetime("2024-01-15", None).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 15));

        let dt = parse_datetime("2024-01-15 09:30:00", None).unwrap();
        assert_eq!((dt.hour(), dt.minute()), (9, 30));

        let dt = parse_datetime("20240115", None).unwrap();
        assert_eq!(dt.day(), 15);

        let dt = parse_datetime("15.01.2024", Some("%d.%m.%Y")).unwrap();
        assert_eq!((dt.month(), dt.day()), (1, 15));

        assert!(parse_datetime("yesterday", None).is_err());
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "Date;Open;High;Low;Close;Volume").unwrap();
        writeln!(file, "2024-01-01;100;105;98;102;1000").unwrap();
        writeln!(file, "2024-01-02;102;108;101;107;1200").unwrap();

        assert_eq!(detect_delimiter(file.path()).unwrap(), b';');
        let bars = load_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn test_load_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_content = "Date,Open,High,Low,Close,Volume\n2024-01-02,100.0,105.0,99.0,103.0,1000000\n";
        for symbol in &["AAPL", "MSFT"] {
            std::fs::write(temp_dir.path().join(format!("{}.csv", symbol)), csv_content).unwrap();
        }
        std::fs::write(temp_dir.path().join("readme.txt"), "not a csv").unwrap();

        let result = load_dir(temp_dir.path(), "*.csv", &DataConfig::default()).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.contains_key("AAPL"));
        assert!(result.contains_key("MSFT"));
    }

    #[test]
    fn test_load_dir_not_a_directory() {
        let temp_file = NamedTempFile::new().unwrap();
        assert!(load_dir(temp_file.path(), "*.csv", &DataConfig::default()).is_err());
    }

    #[test]
    fn test_load_universe_keys_by_exchange() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_content = "Date,Open,High,Low,Close,Volume\n2024-01-02,100.0,105.0,99.0,103.0,10\n";
        std::fs::write(temp_dir.path().join("AAPL.csv"), csv_content).unwrap();
        std::fs::write(temp_dir.path().join("ABX.csv"), csv_content).unwrap();

        let mut universe = BTreeMap::new();
        universe.insert("XNAS".to_string(), vec!["AAPL".to_string(), "MISSING".to_string()]);
        universe.insert("XTSE".to_string(), vec!["ABX".to_string()]);

        let data = load_universe(temp_dir.path(), &universe, &DataConfig::default()).unwrap();
        let mut keys: Vec<&String> = data.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["XNAS/AAPL", "XTSE/ABX"]);

        let empty: BTreeMap<String, Vec<String>> = BTreeMap::new();
        assert!(load_universe(temp_dir.path(), &empty, &DataConfig::default()).is_err());
    }

    #[test]
    fn test_validate_series() {
        let good = vec![bar(1, 10.0, 11.0, 9.0, 10.5, 0.0), bar(2, 10.5, 12.0, 10.0, 11.0, 5.0)];
        assert!(validate_series(&good).is_ok());

        assert!(matches!(
            validate_series(&good[..1]),
            Err(TrendError::InsufficientData { required: 2, actual: 1 })
        ));

        let reversed = vec![good[1].clone(), good[0].clone()];
        assert!(matches!(
            validate_series(&reversed),
            Err(TrendError::DataInvariant(_))
        ));

        let bad_range = vec![good[0].clone(), bar(2, 13.0, 12.0, 10.0, 11.0, 5.0)];
        assert!(matches!(
            validate_series(&bad_range),
            Err(TrendError::DataInvariant(_))
        ));
    }

    #[test]
    fn test_clean_prices_repairs_ranges() {
        let bars = vec![
            bar(1, 10.0, 10.5, 9.0, 11.0, 100.0),
            bar(2, 10.0, 11.0, 9.0, 10.0, 0.0),
            bar(3, 0.0, 0.0, 0.0, 0.0, 100.0),
        ];
        let cleaned = clean_prices(&bars);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].high, 11.0);
        assert_eq!(cleaned[0].low, 9.0);
        assert!(check_prices(&cleaned).is_ok());
    }

    #[test]
    fn test_clean_prices_fills_zero_and_missing() {
        let bars = vec![
            bar(1, 0.0, 12.0, 9.0, 11.0, 100.0),
            bar(2, 10.0, 12.0, 0.0, 0.0, 100.0),
            bar(3, 0.0, 12.0, 0.0, 0.0, 100.0),
            bar(4, f64::NAN, 12.0, 9.0, 11.0, 100.0),
            bar(5, 10.0, 12.0, 9.0, f64::NAN, 100.0),
        ];
        let cleaned = clean_prices(&bars);
        assert_eq!(cleaned.len(), 5);

        // The zero open dragged the reset low to 0
        assert_eq!(cleaned[0].open, 11.0);
        assert_eq!(cleaned[0].low, 11.0);

        assert_eq!(cleaned[1].close, 10.0);
        assert_eq!(cleaned[1].low, 10.0);

        assert_eq!((cleaned[2].open, cleaned[2].close), (12.0, 12.0));
        assert_eq!(cleaned[2].low, 12.0);

        assert_eq!(cleaned[3].open, 11.0);
        assert_eq!(cleaned[4].close, 9.0);

        assert!(check_prices(&cleaned).is_ok());
    }

    #[test]
    fn test_check_prices_requires_volume() {
        let bars = vec![bar(1, 10.0, 11.0, 9.0, 10.5, 0.0), bar(2, 10.5, 12.0, 10.0, 11.0, 5.0)];
        assert!(matches!(check_prices(&bars), Err(TrendError::DataInvariant(_))));
        assert!(check_prices(&bars[1..]).is_ok());
    }

    #[test]
    fn test_to_weekly_labels_friday() {
        // 2024-01-01 is a Monday; the weekend rolls into the next week
        let bars: Vec<Bar> = (1..=10)
            .map(|d| bar(d, 10.0 + d as f64, 20.0 + d as f64, 5.0 + d as f64, 11.0 + d as f64, 1.0))
            .collect();
        let weekly = to_weekly(&bars);

        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].timestamp.weekday(), Weekday::Fri);
        assert_eq!(weekly[0].timestamp.day(), 5);
        assert_eq!(weekly[1].timestamp.day(), 12);

        let first = &weekly[0];
        assert_eq!(first.open, 11.0);
        assert_eq!(first.close, 16.0);
        assert_eq!(first.high, 25.0);
        assert_eq!(first.low, 6.0);
        assert_eq!(first.volume, 5.0);
        assert_eq!(weekly[1].open, 16.0);
        assert_eq!(weekly[1].volume, 5.0);
    }

    #[test]
    fn test_week_ending_friday() {
        let friday = Utc.with_ymd_and_hms(2024, 1, 5, 16, 0, 0).unwrap();
        assert_eq!(week_ending_friday(friday).day(), 5);
        let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        assert_eq!(week_ending_friday(saturday).day(), 12);
    }
}
