//! Peak and valley detection on a smoothed series.
//!
//! Every detected extremum closes a trend: a peak ends an uptrend and a valley
//! ends a downtrend. The tail of the series after the last detected extremum
//! is closed by a synthetic extremum at the final index, chosen by
//! [`TerminalRule`].

use crate::error::{Result, TrendError};
use crate::types::ExtremumKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Detected extrema of a smoothed series, including the terminal one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    /// Sorted peak indices.
    pub peaks: Vec<usize>,
    /// Sorted valley indices.
    pub valleys: Vec<usize>,
    /// Kind of the synthetic extremum appended at the last index.
    pub terminal: ExtremumKind,
    /// Length of the series the extrema were detected on.
    pub len: usize,
}

impl Extrema {
    /// All extrema in chronological order.
    pub fn ordered(&self) -> Vec<(usize, ExtremumKind)> {
        let mut all: Vec<(usize, ExtremumKind)> = self
            .peaks
            .iter()
            .map(|&i| (i, ExtremumKind::Peak))
            .chain(self.valleys.iter().map(|&i| (i, ExtremumKind::Valley)))
            .collect();
        all.sort_by_key(|&(i, _)| i);
        all
    }

    /// Number of extrema, terminal included.
    pub fn count(&self) -> usize {
        self.peaks.len() + self.valleys.len()
    }
}

/// Decision table for the synthetic final extremum.
///
/// | peaks | valleys | rule          | appended |
/// |-------|---------|---------------|----------|
/// | none  | none    | `MonotonicUp` / `MonotonicDown` by last vs first value | peak / valley |
/// | some  | none    | `AfterPeak`   | valley   |
/// | none  | some    | `AfterValley` | peak     |
/// | some  | some    | whichever set holds the larger maximum index | the other kind |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalRule {
    /// No extrema and the series ends above where it started.
    MonotonicUp,
    /// No extrema and the series ends at or below where it started.
    MonotonicDown,
    /// The last detected extremum is a peak.
    AfterPeak,
    /// The last detected extremum is a valley.
    AfterValley,
}

impl TerminalRule {
    /// Pick the rule for the given detections.
    pub fn decide(peaks: &[usize], valleys: &[usize], smoothed: &[f64]) -> Self {
        match (peaks.iter().max(), valleys.iter().max()) {
            (None, None) => {
                let first = smoothed.first().copied().unwrap_or(0.0);
                let last = smoothed.last().copied().unwrap_or(0.0);
                if last > first {
                    TerminalRule::MonotonicUp
                } else {
                    TerminalRule::MonotonicDown
                }
            }
            (Some(_), None) => TerminalRule::AfterPeak,
            (None, Some(_)) => TerminalRule::AfterValley,
            (Some(p), Some(v)) => {
                if v > p {
                    TerminalRule::AfterValley
                } else {
                    TerminalRule::AfterPeak
                }
            }
        }
    }

    /// Kind of the extremum appended at the last index.
    pub fn terminal_kind(&self) -> ExtremumKind {
        match self {
            TerminalRule::MonotonicUp | TerminalRule::AfterValley => ExtremumKind::Peak,
            TerminalRule::MonotonicDown | TerminalRule::AfterPeak => ExtremumKind::Valley,
        }
    }
}

/// Indices of local maxima.
///
/// A maximum needs a strict rise into it and a strict fall out of it. A flat
/// top is reported once, at its midpoint (rounded down). The first and last
/// index are never reported.
pub fn local_maxima(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    let mut maxima = Vec::new();
    if n < 3 {
        return maxima;
    }

    let mut i = 1;
    while i < n - 1 {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                let left = i;
                let right = ahead - 1;
                maxima.push((left + right) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    maxima
}

/// Indices of local minima.
pub fn local_minima(values: &[f64]) -> Vec<usize> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    local_maxima(&negated)
}

/// Find peaks and valleys and close the series with a terminal extremum.
pub fn find_extrema(smoothed: &[f64]) -> Result<Extrema> {
    let len = smoothed.len();
    if len < 2 {
        return Err(TrendError::InsufficientData {
            required: 2,
            actual: len,
        });
    }

    let mut peaks = local_maxima(smoothed);
    let mut valleys = local_minima(smoothed);

    let rule = TerminalRule::decide(&peaks, &valleys, smoothed);
    let terminal = rule.terminal_kind();
    match terminal {
        ExtremumKind::Peak => peaks.push(len - 1),
        ExtremumKind::Valley => valleys.push(len - 1),
    }

    debug!(
        "Found {} peaks and {} valleys over {} bars (terminal rule {:?})",
        peaks.len(),
        valleys.len(),
        len,
        rule
    );

    Ok(Extrema {
        peaks,
        valleys,
        terminal,
        len,
    })
}
