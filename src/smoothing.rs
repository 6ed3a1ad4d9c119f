//! Gaussian low-pass filtering of close prices.
//!
//! Trend detection runs on a smoothed close so that short-term noise does not
//! create spurious peaks and valleys. The filter is a normalized discrete
//! Gaussian applied as a same-length convolution; edges are handled by
//! half-sample symmetric reflection (`d c b a | a b c d | d c b a`), repeated
//! as often as needed when the kernel is longer than the series.
//!
//! # Example
//!
//! ```
//! use trendscope::smoothing::smooth;
//!
//! let closes = vec![10.0, 11.0, 10.5, 12.0, 11.5, 13.0];
//! let smoothed = smooth(&closes, 1.0, 5, false).unwrap();
//! assert_eq!(smoothed.len(), closes.len());
//! ```

use crate::error::{Result, TrendError};
use crate::types::Bar;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest kernel the smoother builds, in bars.
pub const MAX_KERNEL_WIDTH: usize = 1_000_000;

/// Parameters of the Gaussian smoother.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingParams {
    /// Standard deviation of the kernel, in bars.
    pub sigma: f64,
    /// Kernel length in bars. Raised to `ceil(4 * sigma)` when shorter.
    pub kernel_width: usize,
    /// Apply the filter a second time to its own output.
    pub double_pass: bool,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            sigma: 20.0,
            kernel_width: 10_000,
            double_pass: false,
        }
    }
}

impl SmoothingParams {
    pub fn new(sigma: f64, kernel_width: usize, double_pass: bool) -> Self {
        Self {
            sigma,
            kernel_width,
            double_pass,
        }
    }

    /// Reject a non-positive or non-finite sigma and kernels longer than
    /// [`MAX_KERNEL_WIDTH`].
    pub fn validate(&self) -> Result<()> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(TrendError::ConfigError(format!(
                "smoothing sigma must be positive, got {}",
                self.sigma
            )));
        }
        check_width(self.effective_width())
    }

    /// Kernel length actually used.
    pub fn effective_width(&self) -> usize {
        effective_width(self.kernel_width, self.sigma)
    }
}

fn check_width(width: usize) -> Result<()> {
    if width > MAX_KERNEL_WIDTH {
        return Err(TrendError::ConfigError(format!(
            "kernel width {} exceeds the limit of {} bars",
            width, MAX_KERNEL_WIDTH
        )));
    }
    Ok(())
}

/// Kernel length after clamping to at least `4 * sigma`.
pub fn effective_width(kernel_width: usize, sigma: f64) -> usize {
    let min_width = (4.0 * sigma).ceil().max(1.0) as usize;
    kernel_width.max(min_width)
}

/// Build a normalized (sum = 1) discrete Gaussian window.
pub fn gaussian_kernel(width: usize, sigma: f64) -> Result<Vec<f64>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(TrendError::ConfigError(format!(
            "smoothing sigma must be positive, got {}",
            sigma
        )));
    }
    if width == 0 {
        return Err(TrendError::ConfigError(
            "kernel width must be at least 1".to_string(),
        ));
    }
    check_width(width)?;

    let center = (width as f64 - 1.0) / 2.0;
    let two_var = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..width)
        .map(|k| {
            let n = k as f64 - center;
            (-(n * n) / two_var).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for w in kernel.iter_mut() {
        *w /= sum;
    }
    Ok(kernel)
}

/// Map an out-of-range position onto `0..len` by symmetric reflection.
fn reflect_index(pos: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let m = pos.rem_euclid(period) as usize;
    if m < len {
        m
    } else {
        2 * len - 1 - m
    }
}

/// Same-length convolution with reflected edges.
///
/// For even kernel lengths the origin sits at `len / 2 - 1` of the reversed
/// kernel, so `[0.5, 0.5]` averages each value with its successor.
pub fn convolve_reflect(values: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 || kernel.is_empty() {
        return values.to_vec();
    }

    let reversed: Vec<f64> = kernel.iter().rev().copied().collect();
    let size = reversed.len();
    let offset = if size % 2 == 1 { size / 2 } else { size / 2 - 1 } as isize;

    (0..n)
        .map(|i| {
            let base = i as isize - offset;
            reversed
                .iter()
                .enumerate()
                .map(|(j, w)| w * values[reflect_index(base + j as isize, n)])
                .sum()
        })
        .collect()
}

/// Smooth a sequence with a Gaussian kernel.
pub fn smooth(values: &[f64], sigma: f64, kernel_width: usize, double_pass: bool) -> Result<Vec<f64>> {
    let params = SmoothingParams::new(sigma, kernel_width, double_pass);
    params.validate()?;

    let width = params.effective_width();
    let kernel = gaussian_kernel(width, sigma)?;
    debug!(
        "Smoothing {} values (sigma={}, width={}, double_pass={})",
        values.len(),
        sigma,
        width,
        double_pass
    );

    let once = convolve_reflect(values, &kernel);
    if double_pass {
        Ok(convolve_reflect(&once, &kernel))
    } else {
        Ok(once)
    }
}

/// Smooth the close column of a price series.
pub fn smooth_series(bars: &[Bar], params: &SmoothingParams) -> Result<Vec<f64>> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    smooth(&closes, params.sigma, params.kernel_width, params.double_pass)
}
