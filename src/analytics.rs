//! Series-level summary statistics and report formatting.

use crate::error::{Result, TrendError};
use crate::metrics::{annualized_log_growth, DAYS_PER_YEAR};
use crate::trends::TrendAnalysis;
use crate::types::TrendDirection;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Summary of all trend segments of one series.
///
/// The first eight fields describe the distribution of segment lengths in
/// bars. Serialized names match the summary record columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Number of segments.
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single segment.
    pub std: Option<f64>,
    pub min: f64,
    #[serde(rename = "25%")]
    pub q25: f64,
    #[serde(rename = "50%")]
    pub q50: f64,
    #[serde(rename = "75%")]
    pub q75: f64,
    pub max: f64,
    /// Smoothing sigma, when the pipeline smoothed the series itself.
    pub sd: Option<f64>,
    /// Number of bars.
    pub n_days: usize,
    /// Segments per year of bars.
    pub trend_freq: f64,
    /// Product of segment ratios.
    #[serde(rename = "Ratio")]
    pub ratio: f64,
    /// Annualized growth of the compounded ratio over the whole series.
    #[serde(rename = "ICAGR")]
    pub icagr: f64,
    #[serde(rename = "mean_ICAGR")]
    pub mean_icagr: f64,
    /// Number of segments with negative ICAGR.
    #[serde(rename = "neg_ICAGR")]
    pub neg_icagr: usize,
    pub neg_freq: f64,
    #[serde(rename = "Bliss")]
    pub bliss: Option<f64>,
    #[serde(rename = "mean_Bliss")]
    pub mean_bliss: Option<f64>,
    #[serde(rename = "Max_Drawdown")]
    pub max_drawdown: f64,
}

/// Linear-interpolated quantile of sorted values.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let rank = quantile * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Reduce per-segment metrics to series-level statistics.
pub fn summarize(analysis: &TrendAnalysis) -> Result<SummaryStatistics> {
    if analysis.segments.is_empty() {
        return Err(TrendError::InsufficientData {
            required: 2,
            actual: analysis.len(),
        });
    }

    let mut lengths: Vec<f64> = analysis
        .segments
        .iter()
        .map(|s| s.bar_count() as f64)
        .collect();
    let mean_length = mean(&lengths).unwrap_or(0.0);
    let std_length = sample_std(&lengths);
    lengths.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let metrics: Vec<_> = analysis.segments.iter().map(|s| s.metrics).collect();
    let count = metrics.len();

    let ratio: f64 = metrics.iter().map(|m| m.ratio).product();
    let icagr = annualized_log_growth(ratio, analysis.total_days());

    let icagrs: Vec<f64> = metrics.iter().map(|m| m.icagr).collect();
    let mean_icagr = mean(&icagrs).unwrap_or(0.0);
    let neg_icagr = icagrs.iter().filter(|&&v| v < 0.0).count();
    let last_segment = analysis
        .segments
        .iter()
        .map(|s| s.number)
        .max()
        .unwrap_or(count);
    let neg_freq = neg_icagr as f64 / last_segment as f64;

    let defined_bliss: Vec<f64> = metrics.iter().filter_map(|m| m.bliss).collect();
    let mean_bliss = mean(&defined_bliss);

    let max_drawdown = metrics
        .iter()
        .map(|m| m.max_drawdown)
        .fold(0.0, f64::max);
    let bliss = if max_drawdown > 0.0 {
        Some(icagr / max_drawdown)
    } else {
        None
    };

    let n_days = analysis.len();

    Ok(SummaryStatistics {
        count,
        mean: mean_length,
        std: std_length,
        min: lengths[0],
        q25: percentile(&lengths, 0.25),
        q50: percentile(&lengths, 0.5),
        q75: percentile(&lengths, 0.75),
        max: lengths[lengths.len() - 1],
        sd: analysis.params.map(|p| p.sigma),
        n_days,
        trend_freq: DAYS_PER_YEAR * count as f64 / n_days as f64,
        ratio,
        icagr,
        mean_icagr,
        neg_icagr,
        neg_freq,
        bliss,
        mean_bliss,
        max_drawdown,
    })
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn csv_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a summary report for one series to stdout.
    pub fn print_report(ticker: &str, analysis: &TrendAnalysis, summary: &SummaryStatistics) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", format!(" TREND SUMMARY: {} ", ticker).bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        if let (Some(first), Some(last)) = (analysis.rows.first(), analysis.rows.last()) {
            println!(
                "  Period:          {} to {}",
                first.timestamp.format("%Y-%m-%d"),
                last.timestamp.format("%Y-%m-%d")
            );
        }
        println!("  Bars:            {:>12}", summary.n_days);
        println!("  Smoothing sd:    {:>12}", fmt_opt(summary.sd, 1));
        println!("  Trends:          {:>12}", summary.count);
        println!("  Trends / year:   {:>12.2}", summary.trend_freq);
        println!();

        println!("{}", "Trend Length (bars)".bold().underline());
        println!("  Mean:            {:>12.2}", summary.mean);
        println!("  Std:             {:>12}", fmt_opt(summary.std, 2));
        println!(
            "  Min / Median / Max: {} / {} / {}",
            summary.min, summary.q50, summary.max
        );
        println!();

        println!("{}", "Growth and Risk".bold().underline());
        println!(
            "  Total Ratio:     {:>12.4}  {}",
            summary.ratio,
            Self::format_signed(summary.icagr)
        );
        println!("  ICAGR:           {:>12.4}", summary.icagr);
        println!("  Mean ICAGR:      {:>12.4}", summary.mean_icagr);
        println!(
            "  Negative trends: {:>12}  ({:.1}%)",
            summary.neg_icagr,
            summary.neg_freq * 100.0
        );
        println!("  Max Drawdown:    {:>12.2}%", summary.max_drawdown * 100.0);
        println!("  Bliss:           {:>12}", fmt_opt(summary.bliss, 3));
        println!("  Mean Bliss:      {:>12}", fmt_opt(summary.mean_bliss, 3));
        println!();

        println!("{}", "═".repeat(60).blue());
    }

    /// Format a growth value with color.
    fn format_signed(value: f64) -> String {
        if value >= 0.0 {
            format!("(+{:.2})", value).green().to_string()
        } else {
            format!("({:.2})", value).red().to_string()
        }
    }

    /// Print the segments of an analysis as a table.
    pub fn print_segments(analysis: &TrendAnalysis, limit: usize) {
        if analysis.segments.is_empty() {
            println!("No trends.");
            return;
        }

        let shown = if limit > 0 && limit < analysis.segments.len() {
            &analysis.segments[..limit]
        } else {
            &analysis.segments[..]
        };

        let mut builder = Builder::new();
        builder.push_record([
            "#", "Trend", "Start", "End", "Bars", "Ratio", "ICAGR", "Max DD %", "Bliss", "ATR %",
        ]);
        for s in shown {
            let direction = match s.direction {
                TrendDirection::Up => "UP".green().to_string(),
                TrendDirection::Down => "DOWN".red().to_string(),
                TrendDirection::Neutral => "-".to_string(),
            };
            builder.push_record([
                s.number.to_string(),
                direction,
                s.start_time.format("%Y-%m-%d").to_string(),
                s.end_time.format("%Y-%m-%d").to_string(),
                s.bar_count().to_string(),
                format!("{:.4}", s.metrics.ratio),
                format!("{:.3}", s.metrics.icagr),
                format!("{:.2}", s.metrics.max_drawdown * 100.0),
                fmt_opt(s.metrics.bliss, 3),
                format!("{:.2}", s.metrics.atr * 100.0),
            ]);
        }

        let table = builder.build().with(Style::rounded()).to_string();
        println!("{}", table);
        if shown.len() < analysis.segments.len() {
            println!("... {} more trends", analysis.segments.len() - shown.len());
        }
    }

    /// Print summaries of many tickers as a table.
    pub fn print_table(summaries: &[(String, SummaryStatistics)]) {
        let mut builder = Builder::new();
        builder.push_record([
            "Ticker", "Bars", "Trends", "Trends/yr", "Ratio", "ICAGR", "Neg %", "Max DD %", "Bliss",
        ]);

        for (ticker, s) in summaries {
            builder.push_record([
                ticker.clone(),
                s.n_days.to_string(),
                s.count.to_string(),
                format!("{:.2}", s.trend_freq),
                format!("{:.4}", s.ratio),
                format!("{:.3}", s.icagr),
                format!("{:.1}", s.neg_freq * 100.0),
                format!("{:.2}", s.max_drawdown * 100.0),
                fmt_opt(s.bliss, 3),
            ]);
        }

        let table = builder.build().with(Style::rounded()).to_string();
        println!("{}", table);
    }

    /// Export a summary to JSON.
    pub fn to_json(summary: &SummaryStatistics) -> String {
        serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get CSV header of the summary record.
    pub fn csv_header() -> &'static str {
        "count,mean,std,min,25%,50%,75%,max,sd,n_days,trend_freq,Ratio,ICAGR,mean_ICAGR,neg_ICAGR,neg_freq,Bliss,mean_Bliss,Max_Drawdown"
    }

    /// Export a summary as a CSV line. Undefined values are empty.
    pub fn to_csv_line(summary: &SummaryStatistics) -> String {
        Self::csv_fields(summary).join(",")
    }

    /// Summary record fields in header order.
    pub fn csv_fields(summary: &SummaryStatistics) -> Vec<String> {
        vec![
            summary.count.to_string(),
            summary.mean.to_string(),
            csv_opt(summary.std),
            summary.min.to_string(),
            summary.q25.to_string(),
            summary.q50.to_string(),
            summary.q75.to_string(),
            summary.max.to_string(),
            csv_opt(summary.sd),
            summary.n_days.to_string(),
            summary.trend_freq.to_string(),
            summary.ratio.to_string(),
            summary.icagr.to_string(),
            summary.mean_icagr.to_string(),
            summary.neg_icagr.to_string(),
            summary.neg_freq.to_string(),
            csv_opt(summary.bliss),
            csv_opt(summary.mean_bliss),
            summary.max_drawdown.to_string(),
        ]
    }
}
