//! Per-channel statistics of the raw (time-domain) block.

use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Mean, population standard deviation and maximum of each channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDomainStats {
    /// Mean of each channel.
    pub means: Array1<f64>,
    /// Population (ddof = 0) standard deviation of each channel.
    pub std_devs: Array1<f64>,
    /// Maximum sample of each channel.
    pub maxs: Array1<f64>,
}

impl TimeDomainStats {
    /// Compute all three statistics for a time × channel block.
    pub fn from_block(block: ArrayView2<'_, f64>) -> Self {
        Self {
            means: mean_time(block),
            std_devs: std_dev_time(block),
            maxs: max_time(block),
        }
    }

    /// Statistics for `n_channels` channels with every value NaN.
    pub fn nan(n_channels: usize) -> Self {
        Self {
            means: Array1::from_elem(n_channels, f64::NAN),
            std_devs: Array1::from_elem(n_channels, f64::NAN),
            maxs: Array1::from_elem(n_channels, f64::NAN),
        }
    }
}

/// Mean of each channel over time.
pub fn mean_time(block: ArrayView2<'_, f64>) -> Array1<f64> {
    block
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::from_elem(block.ncols(), f64::NAN))
}

/// Population standard deviation of each channel over time.
pub fn std_dev_time(block: ArrayView2<'_, f64>) -> Array1<f64> {
    if block.nrows() == 0 {
        return Array1::from_elem(block.ncols(), f64::NAN);
    }
    block.std_axis(Axis(0), 0.0)
}

/// Maximum of each channel over time.
pub fn max_time(block: ArrayView2<'_, f64>) -> Array1<f64> {
    block.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &x| acc.max(x))
}
