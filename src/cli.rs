//! Command-line interface for trend analysis.

use trendscope::analytics::{summarize, ResultFormatter, SummaryStatistics};
use trendscope::config::AnalysisFileConfig;
use trendscope::data::{
    check_prices, clean_prices, load_csv, load_dir, load_tickers, load_universe, to_weekly,
    validate_series, DataConfig,
};
use trendscope::error::{Result, TrendError};
use trendscope::export::{
    write_bars_csv, write_features_csv, write_summaries, write_summaries_csv, write_trends_csv,
    ExportConfig,
};
use trendscope::features::{compute_features, FeatureConfig};
use trendscope::smoothing::SmoothingParams;
use trendscope::trends::{analyze_many, filter_weak_trends, find_trends, TrendAnalysis};
use trendscope::types::{Bar, TrendDirection};

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Trendscope - trend segmentation and trend quality metrics for price series.
#[derive(Parser)]
#[command(name = "trendscope")]
#[command(version)]
#[command(about = "Segment price series into trends and score each trend")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Gaussian smoothing options.
#[derive(Args, Clone, Copy)]
pub struct SmoothingArgs {
    /// Gaussian standard deviation in bars
    #[arg(long, default_value = "20")]
    pub sigma: f64,

    /// Kernel width in bars (widened to 4 * sigma when smaller)
    #[arg(long, default_value = "10000")]
    pub kernel_width: usize,

    /// Smooth twice
    #[arg(long)]
    pub double_pass: bool,
}

impl SmoothingArgs {
    fn params(&self) -> SmoothingParams {
        SmoothingParams::new(self.sigma, self.kernel_width, self.double_pass)
    }
}

/// Data preparation options.
#[derive(Args, Clone, Copy)]
pub struct PrepareArgs {
    /// Repair vendor data before analysis
    #[arg(long)]
    pub clean: bool,

    /// Resample daily bars to weeks ending on Friday
    #[arg(long)]
    pub weekly: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Segment one price series into trends
    Trends {
        /// Path to CSV data file
        #[arg(short, long)]
        data: PathBuf,

        #[command(flatten)]
        smoothing: SmoothingArgs,

        #[command(flatten)]
        prepare: PrepareArgs,

        /// Neutralize trends with an ICAGR below this value
        #[arg(long)]
        min_icagr: Option<f64>,

        /// Write the per-bar trend table to this CSV file
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Number of trends shown in the text table (0 for all)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Summarize trends of one file, a directory or a configured universe
    Summary {
        /// Path to a CSV data file, one series per ticker
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Directory of CSV data files
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Glob pattern for files in the directory
        #[arg(long, default_value = "*.csv")]
        pattern: String,

        /// Configuration file whose universe selects the tickers in `--dir`
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        smoothing: SmoothingArgs,

        #[command(flatten)]
        prepare: PrepareArgs,

        /// Write the summaries to this CSV file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Compute rolling price features
    Features {
        /// Path to CSV data file
        #[arg(short, long)]
        data: PathBuf,

        /// Rolling windows in bars [default: 5,20,60,120]
        #[arg(short, long, value_delimiter = ',')]
        windows: Option<Vec<usize>>,

        /// Highest power of the log change [default: 4]
        #[arg(long)]
        max_order: Option<usize>,

        /// Configuration file whose [features] section sets the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output CSV file
        #[arg(short, long, default_value = "features.csv")]
        export: PathBuf,
    },

    /// Repair a vendor price file and write the cleaned bars
    Clean {
        /// Path to CSV data file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        export: PathBuf,
    },

    /// Validate a data file
    Validate {
        /// Path to CSV data file
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short = 'f', long, default_value = "trendscope.toml")]
        file: PathBuf,
    },

    /// Run an analysis from a configuration file
    RunConfig {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Trends {
            data,
            smoothing,
            prepare,
            min_icagr,
            export,
            limit,
        } => run_trends(
            data,
            &smoothing.params(),
            *prepare,
            *min_icagr,
            export.as_deref(),
            *limit,
            cli.output,
        ),

        Commands::Summary {
            data,
            dir,
            pattern,
            config,
            smoothing,
            prepare,
            export,
        } => {
            let series = load_series(
                data.as_deref(),
                dir.as_deref(),
                pattern,
                config.as_deref(),
                *prepare,
            )?;
            run_summary(
                series,
                &smoothing.params(),
                *prepare,
                export.as_deref(),
                cli.output,
            )
        }

        Commands::Features {
            data,
            windows,
            max_order,
            config,
            export,
        } => {
            let mut features = match config {
                Some(path) => AnalysisFileConfig::load(path)?.feature_config()?,
                None => FeatureConfig::default(),
            };
            if let Some(windows) = windows {
                features.windows = windows.clone();
            }
            if let Some(max_order) = max_order {
                features.max_order = *max_order;
            }
            run_features(data, &features, export, cli.output)
        }

        Commands::Clean { data, export } => clean_data(data, export),

        Commands::Validate { data } => validate_data(data),

        Commands::Init { file } => init_config(file),

        Commands::RunConfig { config } => run_from_config(config, cli.output),
    }
}

/// Optionally clean and resample loaded bars.
fn prepare_bars(bars: Vec<Bar>, prepare: PrepareArgs) -> Result<Vec<Bar>> {
    let mut bars = bars;
    if prepare.clean {
        bars = clean_prices(&bars);
        check_prices(&bars)?;
    }
    if prepare.weekly {
        bars = to_weekly(&bars);
        info!("Resampled to {} weekly bars", bars.len());
    }
    Ok(bars)
}

fn loader_config(prepare: PrepareArgs) -> DataConfig {
    DataConfig {
        validate_bars: !prepare.clean,
        ..Default::default()
    }
}

fn ticker_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("SERIES")
        .to_string()
}

fn run_trends(
    data_path: &Path,
    params: &SmoothingParams,
    prepare: PrepareArgs,
    min_icagr: Option<f64>,
    export: Option<&Path>,
    limit: usize,
    output: OutputFormat,
) -> Result<()> {
    let bars = load_csv(data_path, &loader_config(prepare))?;
    let bars = prepare_bars(bars, prepare)?;

    let analysis = find_trends(&bars, params)?;
    let summary = summarize(&analysis)?;
    let analysis = match min_icagr {
        Some(threshold) => filter_weak_trends(&analysis, threshold),
        None => analysis,
    };

    if let Some(path) = export {
        write_trends_csv(&analysis, path, &ExportConfig::default())?;
        info!("Wrote trend table to {}", path.display());
    }

    match output {
        OutputFormat::Text => {
            let ticker = ticker_name(data_path);
            ResultFormatter::print_report(&ticker, &analysis, &summary);
            ResultFormatter::print_segments(&analysis, limit);
            if min_icagr.is_some() {
                print_filter_note(&analysis);
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "summary": summary,
                "segments": analysis.segments,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Csv => {
            println!("{}", ResultFormatter::csv_header());
            println!("{}", ResultFormatter::to_csv_line(&summary));
        }
    }

    Ok(())
}

fn print_filter_note(analysis: &TrendAnalysis) {
    let neutral = analysis
        .rows
        .iter()
        .filter(|r| r.trend == TrendDirection::Neutral)
        .count();
    println!(
        "Weak-trend filter: {} of {} bars neutral",
        neutral,
        analysis.len()
    );
}

/// Load the series named by the summary options.
fn load_series(
    data: Option<&Path>,
    dir: Option<&Path>,
    pattern: &str,
    config: Option<&Path>,
    prepare: PrepareArgs,
) -> Result<HashMap<String, Vec<Bar>>> {
    let data_config = loader_config(prepare);

    if let (Some(config_path), Some(dir)) = (config, dir) {
        let file_config = AnalysisFileConfig::load(config_path)?;
        if !file_config.universe.is_empty() {
            let universe_config = DataConfig {
                validate_bars: data_config.validate_bars,
                ..file_config.data_config()?
            };
            return load_universe(dir, &file_config.universe, &universe_config);
        }
    }
    if let Some(dir) = dir {
        return load_dir(dir, pattern, &data_config);
    }
    if let Some(path) = data {
        return load_tickers(path, &data_config);
    }

    Err(TrendError::ConfigError(
        "pass --data, --dir, or --dir with --config".to_string(),
    ))
}

fn run_summary(
    series: HashMap<String, Vec<Bar>>,
    params: &SmoothingParams,
    prepare: PrepareArgs,
    export: Option<&Path>,
    output: OutputFormat,
) -> Result<()> {
    let mut prepared = HashMap::with_capacity(series.len());
    for (ticker, bars) in series {
        match prepare_bars(bars, prepare) {
            Ok(bars) => {
                prepared.insert(ticker, bars);
            }
            Err(e) => warn!("Skipping {}: {}", ticker, e),
        }
    }

    let results = analyze_many(&prepared, params);
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    let summaries: Vec<(String, SummaryStatistics)> = results
        .into_iter()
        .filter_map(|(ticker, result)| result.ok().map(|t| (ticker, t.summary)))
        .collect();

    if summaries.is_empty() {
        return Err(TrendError::NoData);
    }

    if let Some(path) = export {
        write_summaries_csv(&summaries, path)?;
        info!("Wrote {} summaries to {}", summaries.len(), path.display());
    }

    print_summaries(&summaries, output)?;
    if failed > 0 && output == OutputFormat::Text {
        println!("{} series could not be analysed (run with -v for details)", failed);
    }

    Ok(())
}

fn print_summaries(summaries: &[(String, SummaryStatistics)], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => ResultFormatter::print_table(summaries),
        OutputFormat::Json => {
            let by_ticker: BTreeMap<&str, &SummaryStatistics> =
                summaries.iter().map(|(t, s)| (t.as_str(), s)).collect();
            println!("{}", serde_json::to_string_pretty(&by_ticker)?);
        }
        OutputFormat::Csv => write_summaries(summaries, std::io::stdout().lock())?,
    }
    Ok(())
}

fn run_features(
    data_path: &Path,
    features: &FeatureConfig,
    export: &Path,
    output: OutputFormat,
) -> Result<()> {
    let bars = load_csv(data_path, &DataConfig::default())?;
    let table = compute_features(&bars, features)?;
    write_features_csv(&table, export, &ExportConfig::default())?;

    match output {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "rows": table.len(),
                "columns": table.names(),
                "path": export.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            println!(
                "Wrote {} feature columns over {} bars to {}",
                table.columns.len(),
                table.len(),
                export.display()
            );
        }
    }

    Ok(())
}

fn clean_data(data_path: &Path, export: &Path) -> Result<()> {
    let config = DataConfig {
        validate_bars: false,
        ..Default::default()
    };
    let bars = load_csv(data_path, &config)?;
    let cleaned = clean_prices(&bars);
    check_prices(&cleaned)?;
    write_bars_csv(&cleaned, export, &ExportConfig::default())?;

    println!(
        "Cleaned {}: kept {} of {} bars, written to {}",
        data_path.display(),
        cleaned.len(),
        bars.len(),
        export.display()
    );
    Ok(())
}

fn validate_data(data_path: &Path) -> Result<()> {
    println!("Validating data file: {}", data_path.display());

    let bars = load_csv(data_path, &DataConfig::default())?;

    println!("\nData Summary:");
    println!("  Rows: {}", bars.len());
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        println!("  Start: {}", first.timestamp);
        println!("  End: {}", last.timestamp);

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let min_price = closes.iter().copied().fold(f64::INFINITY, f64::min);
        let max_price = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        println!("  Price Range: {:.2} - {:.2}", min_price, max_price);
    }

    validate_series(&bars)?;
    match check_prices(&bars) {
        Ok(()) => println!("\nValidation: PASSED"),
        Err(e) => println!("\nValidation: PASSED for trend analysis ({})", e),
    }
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    fs::write(path, AnalysisFileConfig::example())?;
    println!("Created example configuration: {}", path.display());
    Ok(())
}

fn run_from_config(config_path: &Path, output: OutputFormat) -> Result<()> {
    let config = AnalysisFileConfig::load(config_path)?;
    let params = config.smoothing_params()?;
    let data_config = config.data_config()?;
    let prepare = PrepareArgs {
        clean: config.data.clean,
        weekly: config.data.weekly,
    };

    let series = if let Some(dir) = &config.data.dir {
        if config.universe.is_empty() {
            load_dir(dir, &config.data.pattern, &data_config)?
        } else {
            load_universe(dir, &config.universe, &data_config)?
        }
    } else if let Some(path) = &config.data.path {
        let path = Path::new(path);
        let bars = prepare_bars(load_csv(path, &data_config)?, prepare)?;
        if let Some(export) = &config.features.export {
            let table = compute_features(&bars, &config.feature_config()?)?;
            write_features_csv(&table, export, &ExportConfig::default())?;
            info!("Wrote {} feature columns to {}", table.columns.len(), export);
        }
        let analysis = find_trends(&bars, &params)?;
        let summary = summarize(&analysis)?;
        let analysis = match config.filter.min_icagr {
            Some(threshold) => filter_weak_trends(&analysis, threshold),
            None => analysis,
        };
        return match output {
            OutputFormat::Text => {
                ResultFormatter::print_report(&ticker_name(path), &analysis, &summary);
                ResultFormatter::print_segments(&analysis, 0);
                Ok(())
            }
            _ => print_summaries(&[(ticker_name(path), summary)], output),
        };
    } else {
        return Err(TrendError::ConfigError(
            "configuration needs [data] path or dir".to_string(),
        ));
    };

    run_summary(series, &params, prepare, None, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_trends() {
        let cli = Cli::try_parse_from([
            "trendscope",
            "trends",
            "-d",
            "test.csv",
            "--sigma",
            "10",
            "--min-icagr",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Trends {
                smoothing,
                min_icagr,
                ..
            } => {
                assert_eq!(smoothing.sigma, 10.0);
                assert_eq!(smoothing.kernel_width, 10_000);
                assert_eq!(min_icagr, Some(0.5));
            }
            _ => panic!("expected trends command"),
        }
    }

    #[test]
    fn test_cli_parse_features_windows() {
        let cli = Cli::try_parse_from([
            "trendscope", "-o", "json", "features", "-d", "a.csv", "-w", "5,10",
        ])
        .unwrap();
        assert!(cli.output == OutputFormat::Json);
        match cli.command {
            Commands::Features {
                windows, max_order, ..
            } => {
                assert_eq!(windows, Some(vec![5, 10]));
                assert_eq!(max_order, None);
            }
            _ => panic!("expected features command"),
        }
    }

    #[test]
    fn test_cli_parse_features_config() {
        let cli = Cli::try_parse_from([
            "trendscope", "features", "-d", "a.csv", "-c", "trendscope.toml", "--max-order", "6",
        ])
        .unwrap();
        match cli.command {
            Commands::Features {
                windows,
                max_order,
                config,
                ..
            } => {
                assert_eq!(windows, None);
                assert_eq!(max_order, Some(6));
                assert_eq!(config, Some(PathBuf::from("trendscope.toml")));
            }
            _ => panic!("expected features command"),
        }
    }

    #[test]
    fn test_cli_parse_summary_dir() {
        let cli = Cli::try_parse_from(["trendscope", "-vv", "summary", "--dir", "data/", "--weekly"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Summary { prepare, .. } if prepare.weekly));
    }
}
