//! Cell condenser.
//!
//! Reduces one time-window × channel-group cell of a raw block to:
//!
//! - one averaged magnitude spectrum (outlier channels excluded),
//! - the standard deviation of the retained magnitudes,
//! - the mean and maximum magnitude of every channel in the cell,
//! - a peak-bin candidate for the file-level peak frequency.
//!
//! Statistics that mix channels (spectrum, std-dev, peak sums) only see the
//! channels the [`OutlierRule`] kept. The peak frequency follows the same
//! rule: a single loud channel cannot move a file's peak. Per-channel
//! statistics cover every channel, outliers included, since they are reported
//! per channel.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::outlier::OutlierRule;
use crate::spectral::SpectralTransform;

/// Kind of numerical anomaly found in a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellIssue {
    /// Every channel was rejected; the cell spectrum and std-dev are NaN.
    AllChannelsRejected,
    /// At least one channel had a non-finite spectrum norm.
    NonFiniteInput,
}

/// A recoverable anomaly recorded for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellWarning {
    /// Time window index within the file.
    pub window: usize,
    /// Channel group index.
    pub group: usize,
    /// What went wrong.
    pub issue: CellIssue,
}

/// Largest summed-magnitude bin seen so far.
///
/// Folded across cells with [`PeakAccumulator::offer`]; ties keep the first
/// value seen, matching a strict `>` comparison in visiting order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakAccumulator {
    /// Summed magnitude at the peak bin.
    pub value: f64,
    /// Peak frequency in Hz.
    pub frequency: f64,
}

impl Default for PeakAccumulator {
    fn default() -> Self {
        Self { value: 0.0, frequency: 0.0 }
    }
}

impl PeakAccumulator {
    /// Keep the candidate if it is strictly larger than the current peak.
    #[must_use]
    pub fn offer(self, candidate: PeakAccumulator) -> Self {
        if candidate.value > self.value {
            candidate
        } else {
            self
        }
    }
}

/// Everything computed for one cell.
#[derive(Debug, Clone)]
pub struct CellResult {
    /// Average magnitude per frequency bin over retained channels.
    pub spectrum: Array1<f64>,
    /// Standard deviation of the retained channels' magnitudes.
    pub std_dev: f64,
    /// Mean magnitude of each channel in the group.
    pub channel_means: Array1<f64>,
    /// Maximum magnitude of each channel in the group.
    pub channel_maxs: Array1<f64>,
    /// Group-relative indices of the rejected channels, ascending.
    pub outliers: Vec<usize>,
    /// Peak candidate of this cell.
    pub peak: PeakAccumulator,
    /// Anomalies found while condensing.
    pub issues: Vec<CellIssue>,
}

/// Condenses individual cells with a shared transform and outlier rule.
#[derive(Debug)]
pub struct CellCondenser<'a> {
    transform: &'a SpectralTransform,
    rule: &'a dyn OutlierRule,
    nyquist: f64,
    num_freq_bins: usize,
}

impl<'a> CellCondenser<'a> {
    /// Create a condenser.
    ///
    /// `num_freq_bins` is the per-window bin count used to convert a peak bin
    /// index to Hz (`bin * nyquist / num_freq_bins`).
    pub fn new(
        transform: &'a SpectralTransform,
        rule: &'a dyn OutlierRule,
        nyquist: f64,
        num_freq_bins: usize,
    ) -> Self {
        Self { transform, rule, nyquist, num_freq_bins }
    }

    /// Width in Hz of one frequency bin for peak reporting.
    pub fn bin_width(&self) -> f64 {
        if self.num_freq_bins == 0 {
            return 0.0;
        }
        self.nyquist / self.num_freq_bins as f64
    }

    /// Condense one cell (`time × channels-in-group`).
    pub fn condense(&self, cell: ArrayView2<'_, f64>) -> Result<CellResult, TransformError> {
        let spectrum = self.transform.rfft(cell)?;
        let magnitude: Array2<f64> = spectrum.mapv(|z| z.norm());
        let (n_freq, n_ch) = magnitude.dim();

        let mut issues = Vec::new();

        let norms: Vec<f64> = magnitude
            .columns()
            .into_iter()
            .map(|col| col.iter().map(|m| m * m).sum::<f64>().sqrt())
            .collect();
        if norms.iter().any(|n| !n.is_finite()) {
            issues.push(CellIssue::NonFiniteInput);
        }

        let mut rejected = vec![false; n_ch];
        for &c in &self.rule.classify_outliers(&norms) {
            if let Some(flag) = rejected.get_mut(c) {
                *flag = true;
            }
        }
        let retained: Vec<usize> = (0..n_ch).filter(|&c| !rejected[c]).collect();
        let outliers: Vec<usize> = (0..n_ch).filter(|&c| rejected[c]).collect();

        let (cell_spectrum, std_dev, peak) = if retained.is_empty() {
            issues.push(CellIssue::AllChannelsRejected);
            (Array1::from_elem(n_freq, f64::NAN), f64::NAN, PeakAccumulator::default())
        } else {
            let kept = magnitude.select(Axis(1), &retained);
            let sums = kept.sum_axis(Axis(1));
            let cell_spectrum = &sums / retained.len() as f64;
            let std_dev = kept.std(0.0);
            (cell_spectrum, std_dev, self.peak_candidate(&sums))
        };

        let channel_means = magnitude
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(n_ch, f64::NAN));
        let channel_maxs = magnitude.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &m| acc.max(m));

        Ok(CellResult {
            spectrum: cell_spectrum,
            std_dev,
            channel_means,
            channel_maxs,
            outliers,
            peak,
            issues,
        })
    }

    /// First bin with the largest summed magnitude.
    fn peak_candidate(&self, sums: &Array1<f64>) -> PeakAccumulator {
        let mut best_bin = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (bin, &value) in sums.iter().enumerate() {
            if value > best_value {
                best_value = value;
                best_bin = bin;
            }
        }
        PeakAccumulator { value: best_value, frequency: best_bin as f64 * self.bin_width() }
    }
}
