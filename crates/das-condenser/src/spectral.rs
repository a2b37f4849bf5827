//! Spectral transform of time × channel blocks.
//!
//! Computes the one-sided (non-negative frequency) discrete Fourier transform
//! along the time axis of a 2D block, column by column, keeping the channel
//! axis intact. For `T` input rows the output has `T/2 + 1` rows.

use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

use crate::error::TransformError;

/// Real-input forward FFT along axis 0, planned once for a fixed length.
///
/// Blocks of any other length are still accepted; they are planned on the fly.
#[derive(Clone)]
pub struct SpectralTransform {
    len: usize,
    fft: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralTransform").field("len", &self.len).finish()
    }
}

impl SpectralTransform {
    /// Plan a transform for blocks of `len` time samples.
    pub fn new(len: usize) -> Result<Self, TransformError> {
        if len == 0 {
            return Err(TransformError::EmptyTimeAxis);
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        Ok(Self { len, fft })
    }

    /// Planned time length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; a zero-length transform cannot be planned.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of output rows for the planned length.
    pub fn num_output_bins(&self) -> usize {
        self.len / 2 + 1
    }

    /// One-sided DFT of `block` along the time axis.
    ///
    /// Output shape: `(T/2 + 1, channels)`.
    pub fn rfft(&self, block: ArrayView2<'_, f64>) -> Result<Array2<Complex64>, TransformError> {
        let (n_time, n_ch) = block.dim();
        if n_time == 0 {
            return Err(TransformError::EmptyTimeAxis);
        }

        let fft = if n_time == self.len {
            Arc::clone(&self.fft)
        } else {
            FftPlanner::new().plan_fft_forward(n_time)
        };

        let n_out = n_time / 2 + 1;
        let mut out = Array2::zeros((n_out, n_ch));
        let mut buffer = vec![Complex64::new(0.0, 0.0); n_time];
        let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        for (col_in, mut col_out) in block.columns().into_iter().zip(out.columns_mut()) {
            for (slot, &x) in buffer.iter_mut().zip(col_in.iter()) {
                *slot = Complex64::new(x, 0.0);
            }
            fft.process_with_scratch(&mut buffer, &mut scratch);
            for (dst, src) in col_out.iter_mut().zip(buffer.iter()) {
                *dst = *src;
            }
        }

        Ok(out)
    }
}

/// One-sided DFT of `block` along the time axis, planning a fresh transform.
pub fn rfft(block: ArrayView2<'_, f64>) -> Result<Array2<Complex64>, TransformError> {
    SpectralTransform::new(block.nrows())?.rfft(block)
}

/// Frequency in Hz of each row of [`rfft`] output: `bin * fs / n_time`.
pub fn rfft_frequencies(fs: f64, n_time: usize) -> Result<Array1<f64>, TransformError> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(TransformError::InvalidSamplingRate(fs));
    }
    if n_time == 0 {
        return Err(TransformError::EmptyTimeAxis);
    }
    let step = fs / n_time as f64;
    Ok(Array1::from_shape_fn(n_time / 2 + 1, |bin| bin as f64 * step))
}

/// Nyquist frequency for a sample spacing `dt` (seconds).
pub fn nyquist_from_spacing(dt: f64) -> Result<f64, TransformError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(TransformError::InvalidSamplingRate(1.0 / dt));
    }
    Ok((1.0 / dt) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use std::f64::consts::PI;

    #[test]
    fn output_dimensions() {
        let block = Array2::<f64>::zeros((10, 3));
        assert_eq!(rfft(block.view()).unwrap().dim(), (6, 3));
        let block = Array2::<f64>::zeros((9, 2));
        assert_eq!(rfft(block.view()).unwrap().dim(), (5, 2));
    }

    #[test]
    fn constant_column_is_pure_dc() {
        let block = Array2::from_elem((8, 2), 1.5);
        let spec = rfft(block.view()).unwrap();
        assert_abs_diff_eq!(spec[[0, 0]].re, 12.0, epsilon = 1e-12);
        for bin in 1..spec.nrows() {
            assert_abs_diff_eq!(spec[[bin, 1]].norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn alternating_signal_lands_on_last_bin() {
        let block = Array2::from_shape_fn((2, 1), |(t, _)| if t % 2 == 0 { -1.0 } else { 1.0 });
        let spec = rfft(block.view()).unwrap();
        assert_abs_diff_eq!(spec[[0, 0]].norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spec[[1, 0]].norm(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn sinusoid_peaks_at_expected_bin() {
        let fs = 100.0;
        let n = 200;
        let block = Array2::from_shape_fn((n, 1), |(t, _)| (2.0 * PI * 10.0 * t as f64 / fs).sin());
        let spec = rfft(block.view()).unwrap();
        let freqs = rfft_frequencies(fs, n).unwrap();
        let peak = spec
            .column(0)
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
            .map(|(i, _)| i)
            .unwrap();
        assert_abs_diff_eq!(freqs[peak], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn planned_and_adhoc_lengths_agree() {
        let transform = SpectralTransform::new(16).unwrap();
        let block = Array2::from_shape_fn((12, 2), |(t, c)| (t * (c + 1)) as f64);
        let planned = transform.rfft(block.view()).unwrap();
        let adhoc = rfft(block.view()).unwrap();
        assert_eq!(planned.dim(), (7, 2));
        for (a, b) in planned.iter().zip(adhoc.iter()) {
            assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn empty_block_is_rejected() {
        let block = Array2::<f64>::zeros((0, 4));
        assert!(matches!(rfft(block.view()), Err(TransformError::EmptyTimeAxis)));
    }

    #[test]
    fn frequency_axis_spacing() {
        let freqs = rfft_frequencies(500.0, 1000).unwrap();
        assert_eq!(freqs.len(), 501);
        assert_abs_diff_eq!(freqs[1], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(freqs[500], 250.0, epsilon = 1e-9);
    }

    #[test]
    fn nyquist_from_sample_spacing() {
        assert_abs_diff_eq!(nyquist_from_spacing(0.002).unwrap(), 250.0, epsilon = 1e-9);
        assert!(nyquist_from_spacing(0.0).is_err());
    }
}
