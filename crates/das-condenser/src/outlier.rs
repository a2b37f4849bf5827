//! Outlier channel classification.
//!
//! The cell condenser reduces every channel of a cell to one scalar (the
//! Euclidean norm of its spectrum) and asks an [`OutlierRule`] which channels
//! to leave out of the cell average. Two rules are provided:
//!
//! - [`IqrRule`]: Tukey fences at `k` interquartile ranges beyond Q1/Q3
//!   (quartiles linearly interpolated, as NumPy's `percentile` does).
//! - [`MadRule`]: median ± `threshold` robust sigmas, where
//!   `sigma = 1.4826 · MAD`; tolerates up to 50% contamination.
//!
//! Non-finite norms are always classified as outliers.

use std::fmt::Debug;

/// Strategy deciding which channels of a cell are outliers.
pub trait OutlierRule: Debug + Send + Sync {
    /// Return the indices into `norms` that are outliers.
    ///
    /// Order and repeats do not matter, and indices past the end of `norms`
    /// are ignored.
    fn classify_outliers(&self, norms: &[f64]) -> Vec<usize>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Interquartile-range fence rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrRule {
    factor: f64,
}

impl IqrRule {
    /// Rule with fences `factor · IQR` beyond the quartiles.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// Fence multiplier.
    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl Default for IqrRule {
    fn default() -> Self {
        Self { factor: 1.5 }
    }
}

impl OutlierRule for IqrRule {
    fn classify_outliers(&self, norms: &[f64]) -> Vec<usize> {
        let sorted = sorted_finite(norms);
        if sorted.is_empty() {
            return (0..norms.len()).collect();
        }
        let q1 = percentile_sorted(&sorted, 25.0);
        let q3 = percentile_sorted(&sorted, 75.0);
        let cutoff = self.factor * (q3 - q1);
        let (low, high) = (q1 - cutoff, q3 + cutoff);

        norms
            .iter()
            .enumerate()
            .filter(|(_, &v)| !v.is_finite() || v > high || v < low)
            .map(|(i, _)| i)
            .collect()
    }

    fn name(&self) -> &'static str {
        "iqr"
    }
}

/// Scale factor converting MAD to σ for Gaussian distributions.
/// MAD = 0.6745 * σ → σ = MAD / 0.6745 = 1.4826 * MAD
const MAD_SCALE: f64 = 1.4826;

/// Median absolute deviation rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MadRule {
    threshold: f64,
}

impl MadRule {
    /// Rule flagging values more than `threshold` robust sigmas from the median.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Threshold in robust sigmas.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for MadRule {
    fn default() -> Self {
        Self { threshold: 3.0 }
    }
}

impl OutlierRule for MadRule {
    fn classify_outliers(&self, norms: &[f64]) -> Vec<usize> {
        let sorted = sorted_finite(norms);
        if sorted.is_empty() {
            return (0..norms.len()).collect();
        }
        let med = percentile_sorted(&sorted, 50.0);
        let sigma = MAD_SCALE * median_absolute_deviation(&sorted, med);

        norms
            .iter()
            .enumerate()
            .filter(|(_, &v)| {
                if !v.is_finite() {
                    return true;
                }
                let deviation = (v - med).abs();
                if sigma > 1e-15 {
                    deviation > self.threshold * sigma
                } else {
                    // Zero-MAD case: more than half the values coincide, any
                    // deviation from them is an outlier.
                    deviation > 1e-15
                }
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn name(&self) -> &'static str {
        "mad"
    }
}

/// Finite values of `data`, sorted ascending.
fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Percentile `q` (0..=100) of sorted, non-empty data with linear interpolation
/// between closest ranks.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Compute MAD (Median Absolute Deviation) given precomputed median.
fn median_absolute_deviation(data: &[f64], med: f64) -> f64 {
    let mut deviations: Vec<f64> = data.iter().map(|x| (x - med).abs()).collect();
    deviations.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(&deviations, 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_matches_linear_interpolation() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile_sorted(&data, 25.0) - 1.75).abs() < 1e-12);
        assert!((percentile_sorted(&data, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile_sorted(&data, 75.0) - 3.25).abs() < 1e-12);
        assert!((percentile_sorted(&[5.0], 75.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn iqr_uniform_norms_have_no_outliers() {
        let norms = vec![2.0; 8];
        assert!(IqrRule::default().classify_outliers(&norms).is_empty());
    }

    #[test]
    fn iqr_flags_high_and_low_channels() {
        let norms = [10.0, 11.0, 9.5, 10.5, 100.0, 10.2, 0.01, 9.8];
        let out = IqrRule::default().classify_outliers(&norms);
        assert_eq!(out, vec![4, 6]);
    }

    #[test]
    fn iqr_small_groups_are_degenerate_but_defined() {
        assert!(IqrRule::default().classify_outliers(&[3.0]).is_empty());
        assert!(IqrRule::default().classify_outliers(&[1.0, 50.0]).is_empty());
    }

    #[test]
    fn non_finite_norms_are_outliers() {
        let norms = [1.0, f64::NAN, 1.1, f64::INFINITY, 0.9];
        assert_eq!(IqrRule::default().classify_outliers(&norms), vec![1, 3]);
        assert_eq!(MadRule::default().classify_outliers(&norms), vec![1, 3]);
    }

    #[test]
    fn all_non_finite_flags_everything() {
        let norms = [f64::NAN, f64::NAN];
        assert_eq!(IqrRule::default().classify_outliers(&norms), vec![0, 1]);
    }

    #[test]
    fn mad_flags_single_spike() {
        let mut norms = vec![1.0; 20];
        norms[7] = 40.0;
        assert_eq!(MadRule::default().classify_outliers(&norms), vec![7]);
    }

    #[test]
    fn mad_resists_heavy_contamination() {
        // 30% of channels are hot; mean/std fences would be dragged along.
        let norms: Vec<f64> = (0..20)
            .map(|i| if i % 3 == 0 { 50.0 } else { 1.0 + 0.01 * i as f64 })
            .collect();
        let out = MadRule::default().classify_outliers(&norms);
        assert_eq!(out, vec![0, 3, 6, 9, 12, 15, 18]);
    }

    #[test]
    fn rule_names() {
        assert_eq!(IqrRule::default().name(), "iqr");
        assert_eq!(MadRule::default().name(), "mad");
    }
}
