//! DAS Spectral Condenser
//!
//! Condenses long distributed acoustic sensing recordings (time samples ×
//! channels) into a compact 3D spectral tensor `[window, channel group,
//! frequency bin]` plus descriptive statistics, and stacks many files into one
//! indexed artifact.
//!
//! # Pipeline
//!
//! - **Spectral transform**: one-sided FFT along time, per channel
//! - **Cell condenser**: outlier channels rejected, magnitudes averaged per cell
//! - **Tensor assembler**: every window × group cell of a file, frequency binning
//! - **Aggregator**: many files from a [`BlockSource`], index arrays, `.npz` output
//!
//! # Example
//!
//! ```rust,no_run
//! use das_condenser::{CondenserConfig, MultiFileAggregator, NpyDirectorySource};
//! use std::path::Path;
//!
//! let config = CondenserConfig::builder()
//!     .channels(0, 2431)
//!     .time_samples(0, 29_999)
//!     .sampling_rate(500.0)
//!     .build();
//!
//! let source = NpyDirectorySource::new("/data/das").with_sampling_rate(500.0);
//! let aggregator = MultiFileAggregator::new(&config, &source)?;
//! let artifact = aggregator.aggregate_schedule()?;
//! artifact.write_npz(Path::new("combined.npz"))?;
//! # Ok::<(), das_condenser::CondenserError>(())
//! ```

pub mod aggregate;
pub mod artifact;
pub mod assembler;
pub mod condenser;
pub mod config;
pub mod error;
pub mod index_arrays;
pub mod indices;
pub mod outlier;
pub mod schedule;
pub mod source;
pub mod spectral;
pub mod stats;

// Re-export main types for convenience
pub use aggregate::MultiFileAggregator;
pub use artifact::{CombinedArtifact, FileCellWarning};
pub use assembler::{bin_frequencies, FileProducts, TensorAssembler};
pub use condenser::{CellCondenser, CellIssue, CellResult, CellWarning, PeakAccumulator};
pub use config::{
    CondenserConfig, CondenserConfigBuilder, FailurePolicy, OutlierMethod, TilingPolicy,
};
pub use error::{
    ArtifactError, CondenserError, CondenserResult, ConfigError, SourceError, TransformError,
};
pub use index_arrays::{
    channel_index_array, freq_index_array, time_index_array, ArtifactLayout, TimeIndex,
};
pub use outlier::{IqrRule, MadRule, OutlierRule};
pub use schedule::{FileSchedule, ScheduledFile};
pub use source::{BlockSource, MemorySource, NpyDirectorySource, RawBlock};
pub use spectral::{rfft, rfft_frequencies, SpectralTransform};
pub use stats::TimeDomainStats;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::MultiFileAggregator;
    pub use crate::artifact::CombinedArtifact;
    pub use crate::config::{CondenserConfig, FailurePolicy, TilingPolicy};
    pub use crate::error::{CondenserError, CondenserResult};
    pub use crate::source::{BlockSource, NpyDirectorySource, RawBlock};
}
