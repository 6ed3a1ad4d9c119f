//! Configuration file support for trend analyses.
//!
//! Allows loading analysis settings from TOML files for reproducibility.

use crate::data::DataConfig;
use crate::error::{Result, TrendError};
use crate::features::FeatureConfig;
use crate::smoothing::SmoothingParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete analysis configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisFileConfig {
    /// Smoothing settings.
    #[serde(default)]
    pub smoothing: SmoothingSettings,
    /// Weak-trend filter settings.
    #[serde(default)]
    pub filter: FilterSettings,
    /// Data settings.
    #[serde(default)]
    pub data: DataSettings,
    /// Rolling feature settings.
    #[serde(default)]
    pub features: FeatureSettings,
    /// Tickers per exchange.
    #[serde(default)]
    pub universe: BTreeMap<String, Vec<String>>,
}

/// Smoothing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingSettings {
    /// Gaussian standard deviation in bars.
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Requested kernel width (widened to `4 * sigma` when smaller).
    #[serde(default = "default_kernel_width")]
    pub kernel_width: usize,
    /// Smooth the smoothed series a second time.
    #[serde(default)]
    pub double_pass: bool,
}

fn default_sigma() -> f64 { 20.0 }
fn default_kernel_width() -> usize { 10_000 }

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            sigma: default_sigma(),
            kernel_width: default_kernel_width(),
            double_pass: false,
        }
    }
}

/// Weak-trend filter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Neutralize segments with an ICAGR below this value.
    #[serde(default)]
    pub min_icagr: Option<f64>,
}

/// Rolling feature settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Rolling window lengths in bars.
    #[serde(default = "default_windows")]
    pub windows: Vec<usize>,
    /// Highest power of the log change.
    #[serde(default = "default_max_order")]
    pub max_order: usize,
    /// Feature table written by `run-config` for a single-file analysis.
    pub export: Option<String>,
}

fn default_windows() -> Vec<usize> { FeatureConfig::default().windows }
fn default_max_order() -> usize { FeatureConfig::default().max_order }

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            max_order: default_max_order(),
            export: None,
        }
    }
}

/// Data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Path to a single data file.
    pub path: Option<String>,
    /// Directory of data files.
    pub dir: Option<String>,
    /// Glob pattern for files in `dir`.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Date format in CSV.
    pub date_format: Option<String>,
    /// CSV delimiter; auto-detected when unset.
    pub delimiter: Option<char>,
    /// Repair vendor data before analysis.
    #[serde(default)]
    pub clean: bool,
    /// Resample daily bars to weeks ending on Friday.
    #[serde(default)]
    pub weekly: bool,
}

fn default_pattern() -> String { "*.csv".to_string() }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            path: None,
            dir: None,
            pattern: default_pattern(),
            date_format: None,
            delimiter: None,
            clean: false,
            weekly: false,
        }
    }
}

impl AnalysisFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: AnalysisFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TrendError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validated smoothing parameters.
    pub fn smoothing_params(&self) -> Result<SmoothingParams> {
        let params = SmoothingParams::new(
            self.smoothing.sigma,
            self.smoothing.kernel_width,
            self.smoothing.double_pass,
        );
        params.validate()?;
        Ok(params)
    }

    /// Validated feature settings.
    pub fn feature_config(&self) -> Result<FeatureConfig> {
        if self.features.windows.contains(&0) {
            return Err(TrendError::ConfigError(
                "feature windows must be positive".to_string(),
            ));
        }
        if self.features.max_order == 0 {
            return Err(TrendError::ConfigError(
                "feature max_order must be at least 1".to_string(),
            ));
        }
        Ok(FeatureConfig {
            windows: self.features.windows.clone(),
            max_order: self.features.max_order,
        })
    }

    /// Loader settings for the configured data.
    ///
    /// Cleaning repairs bars the loader would otherwise reject, so bar
    /// validation is disabled when `clean` is set.
    pub fn data_config(&self) -> Result<DataConfig> {
        let delimiter = match self.data.delimiter {
            Some(c) if c.is_ascii() => Some(c as u8),
            Some(c) => {
                return Err(TrendError::ConfigError(format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    c
                )))
            }
            None => None,
        };

        Ok(DataConfig {
            date_format: self.data.date_format.clone(),
            delimiter,
            validate_bars: !self.data.clean,
            ..Default::default()
        })
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Trendscope Analysis Configuration File

[smoothing]
sigma = 20.0            # Gaussian sd in bars
kernel_width = 10000    # widened to 4 * sigma when smaller
double_pass = false

[filter]
# min_icagr = 0.5       # neutralize trends growing slower than this

[data]
path = "data/AAPL.csv"
# dir = "data/"
pattern = "*.csv"
# date_format = "%Y-%m-%d"
# delimiter = ","
clean = false
weekly = false

[features]
windows = [5, 20, 60, 120]
max_order = 4
# export = "features.csv"  # written by run-config for a single file

[universe]
XNAS = ["AAPL", "AAL", "ACIW"]
XTSE = ["ABX", "AEM"]
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AnalysisFileConfig::default();
        assert_eq!(config.smoothing.sigma, 20.0);
        assert_eq!(config.smoothing.kernel_width, 10_000);
        assert!(config.filter.min_icagr.is_none());
        assert_eq!(config.data.pattern, "*.csv");
        assert!(config.universe.is_empty());
    }

    #[test]
    fn test_load_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[smoothing]
sigma = 5.0
double_pass = true

[filter]
min_icagr = 0.25

[data]
path = "prices.csv"
delimiter = ";"
clean = true

[universe]
XLON = ["ABF", "ADM"]
"#
        )
        .unwrap();

        let config = AnalysisFileConfig::load(file.path()).unwrap();
        assert_eq!(config.smoothing.sigma, 5.0);
        assert_eq!(config.smoothing.kernel_width, 10_000);
        assert!(config.smoothing.double_pass);
        assert_eq!(config.filter.min_icagr, Some(0.25));
        assert_eq!(config.data.path.as_deref(), Some("prices.csv"));
        assert_eq!(config.feature_config().unwrap(), FeatureConfig::default());
        assert_eq!(config.universe["XLON"], vec!["ABF", "ADM"]);

        let data = config.data_config().unwrap();
        assert_eq!(data.delimiter, Some(b';'));
        assert!(!data.validate_bars);
    }

    #[test]
    fn test_smoothing_params_validated() {
        let mut config = AnalysisFileConfig::default();
        assert_eq!(config.smoothing_params().unwrap(), SmoothingParams::default());

        config.smoothing.sigma = -1.0;
        assert!(matches!(
            config.smoothing_params(),
            Err(TrendError::ConfigError(_))
        ));

        config.smoothing.sigma = 1e18;
        assert!(matches!(
            config.smoothing_params(),
            Err(TrendError::ConfigError(_))
        ));
    }

    #[test]
    fn test_feature_settings_loaded() {
        let config: AnalysisFileConfig = toml::from_str(
            r#"
[features]
windows = [10, 30]
max_order = 2
export = "out/features.csv"
"#,
        )
        .unwrap();

        let features = config.feature_config().unwrap();
        assert_eq!(features.windows, vec![10, 30]);
        assert_eq!(features.max_order, 2);
        assert_eq!(config.features.export.as_deref(), Some("out/features.csv"));

        let mut bad = config.clone();
        bad.features.max_order = 0;
        assert!(matches!(bad.feature_config(), Err(TrendError::ConfigError(_))));
        bad.features.max_order = 2;
        bad.features.windows.push(0);
        assert!(bad.feature_config().is_err());
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let mut config = AnalysisFileConfig::default();
        config.data.delimiter = Some('¦');
        assert!(config.data_config().is_err());
    }

    #[test]
    fn test_save_config() {
        let mut config = AnalysisFileConfig::default();
        config.filter.min_icagr = Some(1.5);
        config
            .universe
            .insert("XNAS".to_string(), vec!["AAPL".to_string()]);
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let loaded = AnalysisFileConfig::load(file.path()).unwrap();
        assert_eq!(loaded.filter.min_icagr, Some(1.5));
        assert_eq!(loaded.universe, config.universe);
    }

    #[test]
    fn test_example_config() {
        let example = AnalysisFileConfig::example();
        assert!(example.contains("[smoothing]"));
        assert!(example.contains("[universe]"));

        let parsed: AnalysisFileConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed.universe.len(), 2);
        assert_eq!(parsed.features.windows, vec![5, 20, 60, 120]);
    }
}
