//! Index arrays stored next to the combined tensor.
//!
//! Consumers locate a tensor cell without recomputing anything:
//!
//! - channel index: `[n_groups, start_0, end_0, start_1, end_1, ...]`, absolute
//!   channel numbers, ends inclusive;
//! - time index: `[window_len_s, n_windows, t_0, t_1, ...]` as `f64`, window
//!   starts in whole microseconds since the Unix epoch (UTC);
//! - frequency index: `[n_bins, bin_width_hz, nyquist_hz]`.
//!
//! Window starts step by the window length inside a file. Each file's first
//! window starts at the file's own start plus the offset of the first
//! condensed sample, so there is a gap between files whenever the condensed
//! span is shorter than the file.
//!
//! [`ArtifactLayout`] goes the other way and recovers every array shape from
//! the three index arrays alone.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::CondenserConfig;
use crate::error::ArtifactError;
use crate::indices;

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

/// Channel index array for groups of `group_size` over `first..=last`.
///
/// The last group ends at `last` even when it is short.
pub fn channel_index_array(first: usize, last: usize, group_size: usize) -> Array1<i64> {
    let n_groups = indices::num_channel_groups(first, last, group_size);
    let mut out = Vec::with_capacity(2 * n_groups + 1);
    out.push(n_groups as i64);
    for k in 0..n_groups {
        let start = first + k * group_size;
        let end = if k + 1 == n_groups { last } else { start + group_size - 1 };
        out.push(start as i64);
        out.push(end as i64);
    }
    Array1::from(out)
}

/// Window start timestamps of the combined tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIndex {
    /// Length of one time window.
    pub window_len_us: i64,
    /// Start of every window, in tensor row order.
    pub starts: Vec<DateTime<Utc>>,
}

impl TimeIndex {
    /// Build `num_windows` contiguous windows from `start`.
    pub fn new(start: DateTime<Utc>, window_len: Duration, num_windows: usize) -> Self {
        let window_len_us = window_len.num_microseconds().unwrap_or(i64::MAX);
        let starts = (0..num_windows).map(|i| start + steps(window_len_us, i)).collect();
        Self { window_len_us, starts }
    }

    /// Build `windows_per_file` contiguous windows for every file, the first
    /// one at `file_start + offset`.
    pub fn per_file(
        file_starts: &[DateTime<Utc>],
        offset: Duration,
        window_len: Duration,
        windows_per_file: usize,
    ) -> Self {
        let window_len_us = window_len.num_microseconds().unwrap_or(i64::MAX);
        let starts = file_starts
            .iter()
            .flat_map(|&file_start| {
                let first = file_start + offset;
                (0..windows_per_file).map(move |i| first + steps(window_len_us, i))
            })
            .collect();
        Self { window_len_us, starts }
    }

    /// Window length in (possibly fractional) seconds.
    pub fn window_len_secs(&self) -> f64 {
        self.window_len_us as f64 / 1e6
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// `true` when there are no windows.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Flatten into the stored `[window_len_s, n, t_0_us, ...]` form.
    pub fn to_array(&self) -> Array1<f64> {
        let mut out = Vec::with_capacity(self.starts.len() + 2);
        out.push(self.window_len_secs());
        out.push(self.starts.len() as f64);
        out.extend(self.starts.iter().map(|t| t.timestamp_micros() as f64));
        Array1::from(out)
    }

    /// Parse the stored form back, checking its internal consistency.
    pub fn from_array(array: &Array1<f64>) -> Result<Self, ArtifactError> {
        if array.len() < 2 {
            return Err(ArtifactError::malformed("time_inds", "shorter than its 2-element header"));
        }
        let secs = array[0];
        if !(secs.is_finite() && secs >= 0.0) {
            return Err(ArtifactError::malformed("time_inds", format!("window length {secs} s")));
        }
        let window_len_us = (secs * 1e6).round() as i64;

        let count = whole(array[1])
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ArtifactError::malformed("time_inds", "window count is not a non-negative integer"))?;
        if array.len() != count + 2 {
            return Err(ArtifactError::malformed(
                "time_inds",
                format!("header announces {count} windows, found {}", array.len() - 2),
            ));
        }
        let starts = array
            .iter()
            .skip(2)
            .map(|&us| {
                whole(us)
                    .and_then(|us| Utc.timestamp_micros(us).single())
                    .ok_or_else(|| ArtifactError::malformed("time_inds", format!("bad timestamp {us}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { window_len_us, starts })
    }
}

/// `i` window lengths, saturating instead of overflowing.
fn steps(window_len_us: i64, i: usize) -> Duration {
    let i = i64::try_from(i).unwrap_or(i64::MAX);
    Duration::microseconds(window_len_us.saturating_mul(i))
}

/// `value` as an integer when it is one and is exactly representable.
fn whole(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() <= MAX_EXACT_F64).then(|| value as i64)
}

/// Duration of `samples` samples at `sampling_rate`, rounded to 1 µs.
pub fn window_duration(samples: usize, sampling_rate: f64) -> Duration {
    let micros = (samples as f64 * 1e6 / sampling_rate).round() as i64;
    Duration::microseconds(micros)
}

/// Time index for files starting at `file_starts`, condensed with `config`.
pub fn time_index_array(config: &CondenserConfig, file_starts: &[DateTime<Utc>]) -> TimeIndex {
    TimeIndex::per_file(
        file_starts,
        window_duration(config.first_time_sample, config.sampling_rate),
        window_duration(config.time_window, config.sampling_rate),
        config.num_time_windows(),
    )
}

/// Frequency index `[n_bins, nyquist / n_bins, nyquist]`.
pub fn freq_index_array(num_bins: usize, nyquist: f64) -> Array1<f64> {
    let width = if num_bins == 0 { 0.0 } else { nyquist / num_bins as f64 };
    Array1::from(vec![num_bins as f64, width, nyquist])
}

/// Shapes of every array in a combined artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    /// Files combined.
    pub num_files: usize,
    /// Time windows per file.
    pub windows_per_file: usize,
    /// Channel groups.
    pub num_groups: usize,
    /// Channels.
    pub num_channels: usize,
    /// Frequency bins per cell (after binning).
    pub num_bins: usize,
}

impl ArtifactLayout {
    /// Layout implied by a configuration.
    pub fn from_config(config: &CondenserConfig, num_files: usize) -> Self {
        Self {
            num_files,
            windows_per_file: config.num_time_windows(),
            num_groups: config.num_channel_groups(),
            num_channels: config.num_channels(),
            num_bins: config.num_condensed_freq_bins(),
        }
    }

    /// Recover the layout from the three index arrays and the file count.
    pub fn from_index_arrays(
        num_files: usize,
        time_inds: &Array1<f64>,
        channel_inds: &Array1<i64>,
        freq_inds: &Array1<f64>,
    ) -> Result<Self, ArtifactError> {
        let time = TimeIndex::from_array(time_inds)?;
        if num_files == 0 || time.len() % num_files != 0 {
            return Err(ArtifactError::malformed(
                "time_inds",
                format!("{} windows cannot be split over {num_files} files", time.len()),
            ));
        }

        let num_groups = match channel_inds.get(0) {
            Some(&n) if n >= 0 && channel_inds.len() == 2 * n as usize + 1 => n as usize,
            _ => return Err(ArtifactError::malformed("channel_inds", "length does not match group count")),
        };
        let num_channels = if num_groups == 0 {
            0
        } else {
            let span = channel_inds[2 * num_groups] - channel_inds[1] + 1;
            usize::try_from(span)
                .map_err(|_| ArtifactError::malformed("channel_inds", "last channel precedes first"))?
        };

        if freq_inds.len() != 3 || !(freq_inds[0] >= 0.0 && freq_inds[0].fract() == 0.0) {
            return Err(ArtifactError::malformed("freq_inds", "expected [n_bins, width, nyquist]"));
        }

        Ok(Self {
            num_files,
            windows_per_file: time.len() / num_files,
            num_groups,
            num_channels,
            num_bins: freq_inds[0] as usize,
        })
    }

    /// Shape of the combined spectral tensor.
    pub fn tensor_shape(&self) -> [usize; 3] {
        [self.num_files * self.windows_per_file, self.num_groups, self.num_bins]
    }

    /// Shape of the cell std-devs, indexed `[file, window, group]`.
    pub fn std_shape(&self) -> [usize; 3] {
        [self.num_files, self.windows_per_file, self.num_groups]
    }

    /// Shape of every per-file, per-channel statistic.
    pub fn channel_stats_shape(&self) -> [usize; 2] {
        [self.num_files, self.num_channels]
    }
}
