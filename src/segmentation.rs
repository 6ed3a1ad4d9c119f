//! Trend labelling and segment boundaries.
//!
//! A bar inherits the direction of the next extremum at or after it: bars up
//! to and including a peak are an uptrend, bars up to and including a valley
//! are a downtrend. Segment boundaries sit one bar after each extremum.

use crate::error::{Result, TrendError};
use crate::extrema::Extrema;
use crate::types::TrendDirection;
use serde::{Deserialize, Serialize};

/// Position of one trend segment within the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentBounds {
    /// Ordinal number, 1-based.
    pub number: usize,
    /// First bar index.
    pub start: usize,
    /// Last bar index (inclusive).
    pub end: usize,
    pub direction: TrendDirection,
}

/// Per-bar labels and the breakpoints that delimit segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    /// Direction of every bar.
    pub labels: Vec<TrendDirection>,
    /// Sorted segment starts, beginning with 0 and ending with the series length.
    pub breakpoints: Vec<usize>,
}

impl Segmentation {
    /// Segments in chronological order, numbered from 1.
    pub fn segments(&self) -> Vec<SegmentBounds> {
        self.breakpoints
            .windows(2)
            .enumerate()
            .map(|(b, w)| SegmentBounds {
                number: b + 1,
                start: w[0],
                end: w[1] - 1,
                direction: self.labels[w[0]],
            })
            .collect()
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.breakpoints.len().saturating_sub(1)
    }
}

/// Label every bar and compute segment breakpoints.
pub fn segment(extrema: &Extrema) -> Result<Segmentation> {
    let len = extrema.len;
    if len == 0 {
        return Err(TrendError::InsufficientData {
            required: 2,
            actual: 0,
        });
    }

    let ordered = extrema.ordered();
    if let Some(&(bad, _)) = ordered.iter().find(|(i, _)| *i >= len) {
        return Err(TrendError::DataInvariant(format!(
            "extremum index {} outside series of {} bars",
            bad, len
        )));
    }

    let mut marks: Vec<Option<TrendDirection>> = vec![None; len];
    for &(i, kind) in &ordered {
        marks[i] = Some(kind.closes_trend());
    }

    // Backward fill from each extremum to the bar after the previous one
    let mut labels = vec![TrendDirection::Neutral; len];
    let mut current: Option<TrendDirection> = None;
    for i in (0..len).rev() {
        if let Some(direction) = marks[i] {
            current = Some(direction);
        }
        match current {
            Some(direction) => labels[i] = direction,
            None => {
                return Err(TrendError::DataInvariant(format!(
                    "bar {} is not closed by any extremum",
                    i
                )))
            }
        }
    }

    let mut breakpoints: Vec<usize> = std::iter::once(0)
        .chain(ordered.iter().map(|&(i, _)| i + 1))
        .collect();
    breakpoints.sort_unstable();
    breakpoints.dedup();

    Ok(Segmentation {
        labels,
        breakpoints,
    })
}
