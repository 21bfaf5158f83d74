use super::{Result, TrackingError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub counts: Vec<usize>,
    /// `counts.len() + 1` bin edges
    pub edges: Vec<f64>,
    pub bin_size: f64,
}

/// Upper bound on the number of bins a histogram may allocate
pub const MAX_BINS: usize = 1_000_000;

/// Histogram with fixed-width bins starting at the smallest value.
///
/// NaNs and infinities are ignored. The last bin is closed on the right.
pub fn histogram(values: &[f64], bin_size: f64) -> Result<Histogram> {
    if !bin_size.is_finite() || bin_size <= 0.0 {
        return Err(TrackingError::InvalidParameter(format!(
            "bin_size must be positive, got {}",
            bin_size
        )));
    }

    let data: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if data.is_empty() {
        return Err(TrackingError::EmptyInput("histogram values".to_string()));
    }

    let vmin = data.iter().copied().fold(f64::INFINITY, f64::min);
    let mut vmax = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if vmin == vmax {
        vmax = vmin + 1.0;
    }

    let span = ((vmax - vmin) / bin_size).ceil();
    if !span.is_finite() || span > MAX_BINS as f64 {
        return Err(TrackingError::InvalidParameter(format!(
            "bin_size {} gives more than {} bins",
            bin_size, MAX_BINS
        )));
    }
    let bins = (span as usize).max(1);
    let edges: Vec<f64> = (0..=bins).map(|i| vmin + i as f64 * bin_size).collect();

    let mut counts = vec![0usize; bins];
    for value in data {
        let index = ((value - vmin) / bin_size).floor() as usize;
        counts[index.min(bins - 1)] += 1;
    }

    Ok(Histogram {
        counts,
        edges,
        bin_size,
    })
}

/// Mean squared displacement for lags `1..=min(limit, n - 1)`.
///
/// Rows are `[x, y]` or `[x, y, z]`; NaN displacements are skipped.
pub fn msd(positions: &[Vec<f64>], limit: usize) -> Result<Vec<f64>> {
    if positions.len() < 2 {
        return Err(TrackingError::TooFewPositions(positions.len()));
    }

    let dims = positions[0].len();
    if let Some(row) = positions
        .iter()
        .find(|row| row.len() != dims || !(2..=3).contains(&row.len()))
    {
        return Err(TrackingError::DimensionMismatch { found: row.len() });
    }

    let limit = limit.min(positions.len() - 1);
    let result = (1..=limit)
        .map(|lag| {
            (0..dims)
                .map(|d| {
                    let squares: Vec<f64> = positions[lag..]
                        .iter()
                        .zip(positions.iter())
                        .map(|(later, earlier)| (later[d] - earlier[d]).powi(2))
                        .filter(|v| !v.is_nan())
                        .collect();
                    if squares.is_empty() {
                        f64::NAN
                    } else {
                        squares.iter().sum::<f64>() / squares.len() as f64
                    }
                })
                .sum()
        })
        .collect();

    Ok(result)
}
