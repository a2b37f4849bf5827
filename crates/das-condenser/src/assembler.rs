//! Per-file tensor assembly.
//!
//! [`TensorAssembler`] tiles one raw block into time windows × channel groups,
//! condenses every cell with a [`CellCondenser`], and folds the per-cell
//! results into the file's spectral tensor and statistics. Cells are visited
//! exactly once, window-major.

use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use tracing::{debug, warn};

use crate::condenser::{CellCondenser, CellWarning, PeakAccumulator};
use crate::config::CondenserConfig;
use crate::error::{CondenserError, CondenserResult, TransformError};
use crate::indices::{channel_group_range, time_window_range};
use crate::outlier::OutlierRule;
use crate::spectral::SpectralTransform;
use crate::stats::TimeDomainStats;

/// Everything condensed out of one file.
#[derive(Debug, Clone)]
pub struct FileProducts {
    /// Binned spectral tensor, shape `[windows, groups, condensed_bins]`.
    pub spect: Array3<f64>,
    /// Cell standard deviations, shape `[windows, groups]`.
    pub std_devs: Array2<f64>,
    /// Mean transform magnitude per channel, averaged over windows.
    pub channel_means: Array1<f64>,
    /// Running maximum transform magnitude per channel.
    pub channel_maxs: Array1<f64>,
    /// Frequency (Hz) of the strongest summed bin over the whole file.
    pub peak_freq: f64,
    /// Raw-sample statistics per channel.
    pub time_stats: TimeDomainStats,
    /// Degenerate cells encountered while condensing.
    pub warnings: Vec<CellWarning>,
}

/// Builds [`FileProducts`] from raw blocks for a fixed configuration.
#[derive(Debug)]
pub struct TensorAssembler {
    transform: SpectralTransform,
    rule: Box<dyn OutlierRule>,
    num_windows: usize,
    num_groups: usize,
    num_channels: usize,
    time_window: usize,
    group_size: usize,
    num_freq_bins: usize,
    bin_size: usize,
}

impl TensorAssembler {
    /// Prepare an assembler; the configuration must already be valid.
    pub fn new(config: &CondenserConfig) -> CondenserResult<Self> {
        config.validate()?;
        Ok(Self {
            transform: SpectralTransform::new(config.time_window)?,
            rule: config.outlier_rule(),
            num_windows: config.num_time_windows(),
            num_groups: config.num_channel_groups(),
            num_channels: config.num_channels(),
            time_window: config.time_window,
            group_size: config.ch_group_size,
            num_freq_bins: config.num_freq_bins(),
            bin_size: config.bin_size,
        })
    }

    /// Time windows per file.
    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    /// Channel groups per file.
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Channels per file.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Frequency bins per cell after binning.
    pub fn num_condensed_bins(&self) -> usize {
        self.num_freq_bins / self.bin_size
    }

    /// Condense a selected block (`time × channels`).
    ///
    /// The block must have exactly the configured number of channels and at
    /// least `windows × time_window` rows; extra trailing rows are ignored.
    pub fn assemble(&self, block: ArrayView2<'_, f64>, nyquist: f64) -> CondenserResult<FileProducts> {
        if !(nyquist.is_finite() && nyquist > 0.0) {
            return Err(TransformError::InvalidSamplingRate(2.0 * nyquist).into());
        }
        let used = self.num_windows * self.time_window;
        let (n_time, n_ch) = block.dim();
        if n_ch != self.num_channels || n_time < used {
            return Err(CondenserError::shape_mismatch(
                "raw block",
                vec![used, self.num_channels],
                vec![n_time, n_ch],
            ));
        }
        let block = block.slice(s![..used, ..]);

        let condenser =
            CellCondenser::new(&self.transform, self.rule.as_ref(), nyquist, self.num_freq_bins);

        let mut spect = Array3::<f64>::zeros((self.num_windows, self.num_groups, self.num_freq_bins));
        let mut std_devs = Array2::<f64>::zeros((self.num_windows, self.num_groups));
        let mut mean_sums = Array1::<f64>::zeros(self.num_channels);
        let mut channel_maxs = Array1::<f64>::zeros(self.num_channels);
        let mut peak = PeakAccumulator::default();
        let mut warnings = Vec::new();

        for w in 0..self.num_windows {
            let rows = time_window_range(w, self.time_window);
            for g in 0..self.num_groups {
                let cols = channel_group_range(g, self.num_groups, self.group_size, self.num_channels);
                let cell = condenser.condense(block.slice(s![rows.clone(), cols.clone()]))?;

                spect.slice_mut(s![w, g, ..]).assign(&cell.spectrum);
                std_devs[[w, g]] = cell.std_dev;

                let mut sums = mean_sums.slice_mut(s![cols.clone()]);
                sums += &cell.channel_means;
                channel_maxs
                    .slice_mut(s![cols])
                    .zip_mut_with(&cell.channel_maxs, |acc, &m| *acc = acc.max(m));
                peak = peak.offer(cell.peak);

                for issue in cell.issues {
                    warn!(window = w, group = g, ?issue, "degenerate cell");
                    warnings.push(CellWarning { window: w, group: g, issue });
                }
            }
        }

        let channel_means = mean_sums / self.num_windows as f64;
        let spect = bin_frequencies(&spect, self.bin_size);
        let time_stats = TimeDomainStats::from_block(block);

        debug!(
            windows = self.num_windows,
            groups = self.num_groups,
            bins = spect.len_of(Axis(2)),
            peak_freq = peak.frequency,
            "assembled file tensor"
        );

        Ok(FileProducts {
            spect,
            std_devs,
            channel_means,
            channel_maxs,
            peak_freq: peak.frequency,
            time_stats,
            warnings,
        })
    }
}

/// Average each run of `bin_size` adjacent frequency bins (last axis).
///
/// Trailing bins that do not fill a whole run are dropped. `bin_size` of 0 or
/// 1 returns a copy.
pub fn bin_frequencies(spect: &Array3<f64>, bin_size: usize) -> Array3<f64> {
    if bin_size <= 1 {
        return spect.clone();
    }
    let (n_w, n_g, n_f) = spect.dim();
    let n_out = n_f / bin_size;
    let mut out = Array3::<f64>::zeros((n_w, n_g, n_out));
    for b in 0..n_out {
        let run = spect.slice(s![.., .., b * bin_size..(b + 1) * bin_size]);
        let summed = run.sum_axis(Axis(2));
        out.slice_mut(s![.., .., b]).assign(&(summed / bin_size as f64));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TilingPolicy;
    use approx::assert_abs_diff_eq;

    fn checkerboard(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(t, c)| if (t + c) % 2 == 0 { -1.0 } else { 1.0 })
    }

    fn checkerboard_config() -> CondenserConfig {
        CondenserConfig::builder()
            .channels(0, 7)
            .time_samples(0, 9)
            .sampling_rate(20.0)
            .time_window(2)
            .ch_group_size(2)
            .bin_size(1)
            .build()
    }

    #[test]
    fn checkerboard_file() {
        let assembler = TensorAssembler::new(&checkerboard_config()).unwrap();
        let data = checkerboard(10, 8);
        let out = assembler.assemble(data.view(), 10.0).unwrap();

        assert_eq!(out.spect.dim(), (5, 4, 2));
        for v in out.spect.slice(s![.., .., 0]).iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
        }
        for v in out.spect.slice(s![.., .., 1]).iter() {
            assert_abs_diff_eq!(*v, 2.0, epsilon = 1e-12);
        }
        for v in out.std_devs.iter() {
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-12);
        }
        for (m, x) in out.channel_means.iter().zip(out.channel_maxs.iter()) {
            assert_abs_diff_eq!(*m, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(*x, 2.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(out.peak_freq, 5.0, epsilon = 1e-12);
        assert!(out.warnings.is_empty());
        assert!(out.time_stats.means.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn remainder_channels_join_last_group() {
        let config = CondenserConfig::builder()
            .channels(0, 6)
            .time_samples(0, 9)
            .sampling_rate(20.0)
            .time_window(2)
            .ch_group_size(3)
            .bin_size(1)
            .build();
        let assembler = TensorAssembler::new(&config).unwrap();
        assert_eq!(assembler.num_groups(), 3);
        let out = assembler.assemble(checkerboard(10, 7).view(), 10.0).unwrap();
        assert_eq!(out.spect.dim(), (5, 3, 2));
        assert_eq!(out.channel_maxs.len(), 7);
    }

    #[test]
    fn truncated_tiling_ignores_trailing_rows() {
        let config = CondenserConfig::builder()
            .channels(0, 3)
            .time_samples(0, 10)
            .sampling_rate(20.0)
            .time_window(2)
            .ch_group_size(2)
            .bin_size(1)
            .tiling(TilingPolicy::Truncate)
            .build();
        let assembler = TensorAssembler::new(&config).unwrap();
        let out = assembler.assemble(checkerboard(11, 4).view(), 10.0).unwrap();
        assert_eq!(out.spect.dim(), (5, 2, 2));
    }

    #[test]
    fn wrong_channel_count_is_shape_mismatch() {
        let assembler = TensorAssembler::new(&checkerboard_config()).unwrap();
        let err = assembler.assemble(checkerboard(10, 6).view(), 10.0).unwrap_err();
        assert!(matches!(err, CondenserError::ShapeMismatch { what: "raw block", .. }));
    }

    #[test]
    fn invalid_nyquist_is_rejected() {
        let assembler = TensorAssembler::new(&checkerboard_config()).unwrap();
        assert!(assembler.assemble(checkerboard(10, 8).view(), 0.0).is_err());
    }

    #[test]
    fn binning_averages_adjacent_bins() {
        let spect = Array3::from_shape_fn((1, 2, 6), |(_, g, f)| (g * 10 + f) as f64);
        let binned = bin_frequencies(&spect, 3);
        assert_eq!(binned.dim(), (1, 2, 2));
        assert_abs_diff_eq!(binned[[0, 0, 0]], 1.0);
        assert_abs_diff_eq!(binned[[0, 0, 1]], 4.0);
        assert_abs_diff_eq!(binned[[0, 1, 1]], 14.0);
    }

    #[test]
    fn binning_drops_trailing_bins_and_identity_for_one() {
        let spect = Array3::from_shape_fn((1, 1, 5), |(_, _, f)| f as f64);
        assert_eq!(bin_frequencies(&spect, 2).dim(), (1, 1, 2));
        assert_eq!(bin_frequencies(&spect, 1), spect);
    }
}
