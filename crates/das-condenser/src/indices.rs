//! Index calculators.
//!
//! Pure arithmetic deriving tile counts from raw dimensions, plus the
//! half-open ranges each channel group and time window covers. Bounds passed
//! in are inclusive indices, as written in acquisition parameter files.

use std::ops::Range;

/// Number of channel groups covering `first..=last` with groups of `group_size`.
///
/// The last group absorbs any remainder, so this is `ceil(n / group_size)`.
/// Returns 0 when `group_size == 0` or the range is reversed.
pub fn num_channel_groups(first: usize, last: usize, group_size: usize) -> usize {
    if group_size == 0 || first > last {
        return 0;
    }
    let n = last - first + 1;
    let groups = n / group_size;
    if n % group_size != 0 {
        groups + 1
    } else {
        groups
    }
}

/// Number of full time windows in `first..=last` with windows of `window_size`.
///
/// A trailing partial window is silently dropped; callers that need exact
/// tiling check it through [`CondenserConfig::validate`].
///
/// [`CondenserConfig::validate`]: crate::config::CondenserConfig::validate
pub fn num_time_windows(first: usize, last: usize, window_size: usize) -> usize {
    if window_size == 0 || first > last {
        return 0;
    }
    (last - first + 1) / window_size
}

/// Frequency bins of a *single* time window: `floor((total / 2) / windows) + 1`.
pub fn num_freq_bins(total_time_samples: usize, num_time_windows: usize) -> usize {
    if num_time_windows == 0 {
        return 0;
    }
    let half = total_time_samples as f64 / 2.0;
    (half / num_time_windows as f64).floor() as usize + 1
}

/// Column range (relative to the first configured channel) of group `k`.
///
/// The final group extends to `n_channels` so remainder channels are covered.
pub fn channel_group_range(
    k: usize,
    num_groups: usize,
    group_size: usize,
    n_channels: usize,
) -> Range<usize> {
    let start = k * group_size;
    let end = if k + 1 == num_groups {
        n_channels
    } else {
        (start + group_size).min(n_channels)
    };
    start..end
}

/// Row range (relative to the first configured sample) of window `w`.
pub fn time_window_range(w: usize, window_size: usize) -> Range<usize> {
    let start = w * window_size;
    start..start + window_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_groups_match_reference_counts() {
        assert_eq!(num_channel_groups(1, 10, 1), 10);
        assert_eq!(num_channel_groups(0, 2431, 100), 25);
        assert_eq!(num_channel_groups(0, 2399, 100), 24);
        assert_eq!(num_channel_groups(0, 7, 2), 4);
    }

    #[test]
    fn channel_groups_zero_size() {
        assert_eq!(num_channel_groups(0, 10, 0), 0);
    }

    #[test]
    fn time_windows_match_reference_counts() {
        assert_eq!(num_time_windows(1, 10, 1), 10);
        assert_eq!(num_time_windows(0, 29_999, 1000), 30);
        assert_eq!(num_time_windows(0, 29_949, 1000), 29);
        assert_eq!(num_time_windows(0, 10, 0), 0);
    }

    #[test]
    fn freq_bins_match_reference_counts() {
        assert_eq!(num_freq_bins(10, 1), 6);
        assert_eq!(num_freq_bins(30_000, 30), 501);
        assert_eq!(num_freq_bins(10, 5), 2);
        assert_eq!(num_freq_bins(9, 3), 2);
        assert_eq!(num_freq_bins(10, 0), 0);
    }

    #[test]
    fn last_group_absorbs_remainder() {
        let n = 2432;
        let groups = num_channel_groups(0, n - 1, 100);
        assert_eq!(channel_group_range(0, groups, 100, n), 0..100);
        assert_eq!(channel_group_range(23, groups, 100, n), 2300..2400);
        assert_eq!(channel_group_range(24, groups, 100, n), 2400..2432);
    }

    #[test]
    fn window_ranges_are_contiguous() {
        assert_eq!(time_window_range(0, 1000), 0..1000);
        assert_eq!(time_window_range(3, 1000), 3000..4000);
    }
}
