//! Rolling price features.
//!
//! # Feature Columns
//!
//! - **Changes**: `Ch` is the log change of the close (0 on the first bar),
//!   `Ch2`..`ChN` its powers.
//! - **Technical**, per window `w`: `SMA_w` of the close, `sigma2_SMA_w`
//!   (rolling mean of `Ch2`), `skew_SMA_w`, `kurt_SMA_w`, `Support_w`
//!   (rolling min low) and `Resistance_w` (rolling max high).
//!
//! Rolling windows are partial at the start of the series. Values that are
//! undefined (a zero variance, for instance) are back-filled from the next
//! defined value of the same column.
//!
//! # Example
//!
//! ```no_run
//! use trendscope::data::{load_csv, DataConfig};
//! use trendscope::features::{compute_features, FeatureConfig};
//!
//! let bars = load_csv("data/AAPL.csv", &DataConfig::default()).unwrap();
//! let table = compute_features(&bars, &FeatureConfig::default()).unwrap();
//! let sma = table.column("SMA_20").unwrap();
//! ```

use crate::error::{Result, TrendError};
use crate::types::Bar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for feature generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Rolling window lengths in bars.
    pub windows: Vec<usize>,
    /// Highest power of the log change.
    pub max_order: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            windows: vec![5, 20, 60, 120],
            max_order: 4,
        }
    }
}

/// One named feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    /// One value per bar; `None` where undefined.
    pub values: Vec<Option<f64>>,
}

/// Feature columns aligned with the bars they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub timestamps: Vec<DateTime<Utc>>,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureTable {
    fn new(bars: &[Bar]) -> Self {
        Self {
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            columns: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Column names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Values of a column by name.
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    fn push(&mut self, name: String, values: Vec<f64>) {
        let mut values: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| v.is_finite().then_some(v))
            .collect();
        back_fill(&mut values);
        self.columns.push(FeatureColumn { name, values });
    }
}

/// Fill each undefined value with the next defined one.
fn back_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
}

/// Log close-to-close changes, 0 on the first bar.
fn log_changes(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                0.0
            } else {
                let change = (bar.close / bars[i - 1].close).ln();
                if change.is_finite() {
                    change
                } else {
                    0.0
                }
            }
        })
        .collect()
}

/// Apply `f` to the trailing window ending at every index.
fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            f(&values[start..=i])
        })
        .collect()
}

fn window_mean(w: &[f64]) -> f64 {
    w.iter().sum::<f64>() / w.len() as f64
}

/// Log changes and their powers up to `max_order`.
pub fn add_changes(bars: &[Bar], max_order: usize) -> FeatureTable {
    let mut table = FeatureTable::new(bars);
    let ch = log_changes(bars);

    for order in 2..=max_order {
        let powered = ch.iter().map(|c| c.powi(order as i32)).collect();
        table.push(format!("Ch{}", order), powered);
    }
    table.push("Ch".to_string(), ch);
    table.columns.rotate_right(1);
    table
}

/// Changes up to the fourth power plus rolling technical features.
pub fn add_technical(bars: &[Bar], windows: &[usize]) -> Result<FeatureTable> {
    compute_features(
        bars,
        &FeatureConfig {
            windows: windows.to_vec(),
            max_order: 4,
        },
    )
}

/// Changes up to `config.max_order` plus rolling technical features for
/// every window of `config`.
pub fn compute_features(bars: &[Bar], config: &FeatureConfig) -> Result<FeatureTable> {
    let windows = config.windows.as_slice();
    if let Some(&bad) = windows.iter().find(|&&w| w == 0) {
        return Err(TrendError::ConfigError(format!(
            "feature window must be positive, got {}",
            bad
        )));
    }

    let mut table = add_changes(bars, config.max_order);
    let ch = log_changes(bars);
    let ch2: Vec<f64> = ch.iter().map(|c| c.powi(2)).collect();
    let ch3: Vec<f64> = ch.iter().map(|c| c.powi(3)).collect();
    let ch4: Vec<f64> = ch.iter().map(|c| c.powi(4)).collect();
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();

    for &w in windows {
        table.push(format!("SMA_{}", w), rolling(&close, w, window_mean));
    }
    let mut sigma2 = Vec::with_capacity(windows.len());
    for &w in windows {
        let s2 = rolling(&ch2, w, window_mean);
        table.push(format!("sigma2_SMA_{}", w), s2.clone());
        sigma2.push(s2);
    }
    for (&w, s2) in windows.iter().zip(&sigma2) {
        let m3 = rolling(&ch3, w, window_mean);
        let skew = m3.iter().zip(s2).map(|(m, s)| m / s.powf(1.5)).collect();
        table.push(format!("skew_SMA_{}", w), skew);
    }
    for (&w, s2) in windows.iter().zip(&sigma2) {
        let m4 = rolling(&ch4, w, window_mean);
        let kurt = m4.iter().zip(s2).map(|(m, s)| m / s.powi(2) - 3.0).collect();
        table.push(format!("kurt_SMA_{}", w), kurt);
    }
    for &w in windows {
        let support = rolling(&low, w, |v| v.iter().copied().fold(f64::INFINITY, f64::min));
        table.push(format!("Support_{}", w), support);
    }
    for &w in windows {
        let resistance =
            rolling(&high, w, |v| v.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        table.push(format!("Resistance_{}", w), resistance);
    }

    debug!(
        "Computed {} feature columns over {} bars",
        table.columns.len(),
        table.len()
    );
    Ok(table)
}
