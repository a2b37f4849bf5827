//! Condenser configuration.
//!
//! [`CondenserConfig`] is the single, immutable description of how raw blocks
//! are tiled, transformed, and aggregated. It is passed by reference into the
//! [`TensorAssembler`](crate::assembler::TensorAssembler) and the
//! [`MultiFileAggregator`](crate::aggregate::MultiFileAggregator) constructors
//! and is serializable to / from JSON.
//!
//! # Example
//!
//! ```rust
//! use das_condenser::config::CondenserConfig;
//!
//! let cfg = CondenserConfig::builder()
//!     .channels(0, 2431)
//!     .time_samples(0, 29_999)
//!     .sampling_rate(500.0)
//!     .ch_group_size(100)
//!     .time_window(1000)
//!     .bin_size(3)
//!     .build();
//! cfg.validate().expect("config is valid");
//!
//! assert_eq!(cfg.num_channel_groups(), 25);
//! assert_eq!(cfg.num_time_windows(), 30);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::indices;
use crate::outlier::{IqrRule, MadRule, OutlierRule};
use crate::schedule::FileSchedule;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// How a sample range that is not a multiple of `time_window` is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TilingPolicy {
    /// Reject uneven tilings (and uneven frequency binning) at validation time.
    #[default]
    Strict,
    /// Drop the trailing partial window and any trailing frequency bins that
    /// do not fill a whole `bin_size` group.
    Truncate,
}

/// What the aggregator does when one file cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The whole aggregation fails on the first unreadable file.
    #[default]
    Abort,
    /// The file's rows are NaN-filled, it is listed as skipped, and the run continues.
    SkipAndLog,
}

/// Outlier classification strategy used by the cell condenser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Interquartile-range fence: outside `[Q1 - k·IQR, Q3 + k·IQR]`.
    Iqr {
        /// Fence multiplier, 1.5 for the classic rule.
        factor: f64,
    },
    /// Median absolute deviation: `|x - median| > threshold · 1.4826 · MAD`.
    Mad {
        /// Threshold in estimated standard deviations.
        threshold: f64,
    },
}

impl Default for OutlierMethod {
    fn default() -> Self {
        OutlierMethod::Iqr { factor: 1.5 }
    }
}

impl OutlierMethod {
    /// Instantiate the rule this method describes.
    pub fn build(&self) -> Box<dyn OutlierRule> {
        match *self {
            OutlierMethod::Iqr { factor } => Box::new(IqrRule::new(factor)),
            OutlierMethod::Mad { threshold } => Box::new(MadRule::new(threshold)),
        }
    }
}

// ---------------------------------------------------------------------------
// CondenserConfig
// ---------------------------------------------------------------------------

/// Complete configuration for a condensation run.
///
/// Channel and time-sample bounds are inclusive indices into the raw files,
/// matching the way acquisition parameters are usually written down
/// (`first_channel = 0`, `last_channel = 2431`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CondenserConfig {
    /// Index of the first channel to read. Default: **0**.
    pub first_channel: usize,

    /// Index of the last channel to read (inclusive). Default: **2431**.
    pub last_channel: usize,

    /// Index of the first time sample to read. Default: **0**.
    pub first_time_sample: usize,

    /// Index of the last time sample to read (inclusive). Default: **29999**.
    pub last_time_sample: usize,

    /// Sampling rate in Hz, used when a source does not report its own.
    /// Default: **500**.
    pub sampling_rate: f64,

    /// Channels per channel group. Default: **100**.
    pub ch_group_size: usize,

    /// Time samples per time window. Default: **1000**.
    pub time_window: usize,

    /// Adjacent frequency bins averaged together after the transform.
    /// Default: **3**.
    pub bin_size: usize,

    /// Handling of uneven tilings. Default: [`TilingPolicy::Strict`].
    #[serde(default)]
    pub tiling: TilingPolicy,

    /// Handling of unreadable files. Default: [`FailurePolicy::Abort`].
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Outlier rejection strategy. Default: IQR with factor 1.5.
    #[serde(default)]
    pub outlier: OutlierMethod,

    /// Condense files on the rayon thread pool. Default: **false**.
    #[serde(default)]
    pub parallel: bool,

    /// Timestamp / file-name scheme of the input files.
    #[serde(default)]
    pub schedule: FileSchedule,
}

impl Default for CondenserConfig {
    fn default() -> Self {
        Self {
            first_channel: 0,
            last_channel: 2431,
            first_time_sample: 0,
            last_time_sample: 29_999,
            sampling_rate: 500.0,
            ch_group_size: 100,
            time_window: 1000,
            bin_size: 3,
            tiling: TilingPolicy::Strict,
            failure_policy: FailurePolicy::Abort,
            outlier: OutlierMethod::default(),
            parallel: false,
            schedule: FileSchedule::default(),
        }
    }
}

/// Builder for [`CondenserConfig`].
#[derive(Debug, Default)]
pub struct CondenserConfigBuilder {
    config: CondenserConfig,
}

impl CondenserConfigBuilder {
    /// Create a new builder starting from the defaults.
    pub fn new() -> Self {
        Self { config: CondenserConfig::default() }
    }

    /// Set the inclusive channel range.
    pub fn channels(mut self, first: usize, last: usize) -> Self {
        self.config.first_channel = first;
        self.config.last_channel = last;
        self
    }

    /// Set the inclusive time-sample range.
    pub fn time_samples(mut self, first: usize, last: usize) -> Self {
        self.config.first_time_sample = first;
        self.config.last_time_sample = last;
        self
    }

    /// Set the sampling rate in Hz.
    pub fn sampling_rate(mut self, rate: f64) -> Self {
        self.config.sampling_rate = rate;
        self
    }

    /// Set the channel group size.
    pub fn ch_group_size(mut self, size: usize) -> Self {
        self.config.ch_group_size = size;
        self
    }

    /// Set the time window size in samples.
    pub fn time_window(mut self, size: usize) -> Self {
        self.config.time_window = size;
        self
    }

    /// Set the frequency binning factor.
    pub fn bin_size(mut self, size: usize) -> Self {
        self.config.bin_size = size;
        self
    }

    /// Set the tiling policy.
    pub fn tiling(mut self, policy: TilingPolicy) -> Self {
        self.config.tiling = policy;
        self
    }

    /// Set the failure policy.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Set the outlier method.
    pub fn outlier(mut self, method: OutlierMethod) -> Self {
        self.config.outlier = method;
        self
    }

    /// Enable/disable per-file parallelism.
    pub fn parallel(mut self, enable: bool) -> Self {
        self.config.parallel = enable;
        self
    }

    /// Set the file schedule.
    pub fn schedule(mut self, schedule: FileSchedule) -> Self {
        self.config.schedule = schedule;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> CondenserConfig {
        self.config
    }
}

impl CondenserConfig {
    /// Create a new config builder.
    pub fn builder() -> CondenserConfigBuilder {
        CondenserConfigBuilder::new()
    }

    /// Load a [`CondenserConfig`] from a JSON file and validate it.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: CondenserConfig = serde_json::from_str(&contents).map_err(|source| {
            ConfigError::ParseError { path: path.to_path_buf(), source }
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as pretty-printed JSON, creating parent
    /// directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Number of channels in the configured range.
    pub fn num_channels(&self) -> usize {
        self.last_channel.saturating_sub(self.first_channel) + 1
    }

    /// Number of time samples in the configured range.
    pub fn num_time_samples(&self) -> usize {
        self.last_time_sample.saturating_sub(self.first_time_sample) + 1
    }

    /// Number of channel groups per file.
    pub fn num_channel_groups(&self) -> usize {
        indices::num_channel_groups(self.first_channel, self.last_channel, self.ch_group_size)
    }

    /// Number of full time windows per file.
    pub fn num_time_windows(&self) -> usize {
        indices::num_time_windows(self.first_time_sample, self.last_time_sample, self.time_window)
    }

    /// Samples actually condensed per file (full windows only).
    pub fn used_time_samples(&self) -> usize {
        self.num_time_windows() * self.time_window
    }

    /// Frequency bins of one window before binning.
    pub fn num_freq_bins(&self) -> usize {
        indices::num_freq_bins(self.used_time_samples(), self.num_time_windows())
    }

    /// Frequency bins stored per cell after averaging `bin_size` neighbours.
    pub fn num_condensed_freq_bins(&self) -> usize {
        if self.bin_size == 0 {
            return 0;
        }
        self.num_freq_bins() / self.bin_size
    }

    /// Default nyquist frequency derived from `sampling_rate`.
    pub fn nyquist(&self) -> f64 {
        self.sampling_rate / 2.0
    }

    /// Build the configured outlier rule.
    pub fn outlier_rule(&self) -> Box<dyn OutlierRule> {
        self.outlier.build()
    }

    /// Validate all fields and return the first problem found.
    ///
    /// # Validated invariants
    ///
    /// - Group, window and bin sizes are non-zero.
    /// - Ranges are ordered (`first <= last`).
    /// - The sample range holds at least one full window.
    /// - `sampling_rate` is positive and finite.
    /// - Outlier parameters are positive and finite.
    /// - Under [`TilingPolicy::Strict`] the window tiles the sample range
    ///   exactly and `bin_size` divides the per-window bin count.
    /// - The last condensed sample lies within one scheduled file, so
    ///   windows of consecutive files never overlap in time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ch_group_size == 0 {
            return Err(ConfigError::invalid_value("ch_group_size", "must be > 0"));
        }
        if self.time_window == 0 {
            return Err(ConfigError::invalid_value("time_window", "must be > 0"));
        }
        if self.bin_size == 0 {
            return Err(ConfigError::invalid_value("bin_size", "must be > 0"));
        }
        if self.first_channel > self.last_channel {
            return Err(ConfigError::invalid_value(
                "first_channel",
                "must be <= last_channel",
            ));
        }
        if self.first_time_sample > self.last_time_sample {
            return Err(ConfigError::invalid_value(
                "first_time_sample",
                "must be <= last_time_sample",
            ));
        }
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return Err(ConfigError::invalid_value(
                "sampling_rate",
                "must be positive and finite",
            ));
        }
        match self.outlier {
            OutlierMethod::Iqr { factor } if !(factor.is_finite() && factor > 0.0) => {
                return Err(ConfigError::invalid_value("outlier.factor", "must be > 0.0"));
            }
            OutlierMethod::Mad { threshold } if !(threshold.is_finite() && threshold > 0.0) => {
                return Err(ConfigError::invalid_value("outlier.threshold", "must be > 0.0"));
            }
            _ => {}
        }

        let samples = self.num_time_samples();
        if samples < self.time_window {
            return Err(ConfigError::invalid_value(
                "time_window",
                format!("larger than the {samples} configured time samples"),
            ));
        }

        let num_freq_bins = self.num_freq_bins();
        if self.bin_size > num_freq_bins {
            return Err(ConfigError::invalid_value(
                "bin_size",
                format!("larger than the {num_freq_bins} frequency bins of one window"),
            ));
        }

        if self.tiling == TilingPolicy::Strict {
            let remainder = samples % self.time_window;
            if remainder != 0 {
                return Err(ConfigError::UnevenTiling {
                    samples,
                    window: self.time_window,
                    remainder,
                });
            }
            if num_freq_bins % self.bin_size != 0 {
                return Err(ConfigError::UnevenBinning {
                    num_freq_bins,
                    bin_size: self.bin_size,
                });
            }
        }

        self.schedule.validate()?;

        let span = (self.last_time_sample + 1) as f64 / self.sampling_rate;
        let file_secs = f64::from(self.schedule.file_duration_secs);
        if span > file_secs {
            return Err(ConfigError::invalid_value(
                "last_time_sample",
                format!("ends {span} s into the file, past the {file_secs} s file duration"),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
