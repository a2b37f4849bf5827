//! Error types for the DAS condenser.
//!
//! Every module that can fail returns one of the module-level error types
//! defined here; orchestration code ([`crate::aggregate`], the CLI) works with
//! the top-level [`CondenserError`], which every other type converts into via
//! [`From`].
//!
//! ## Hierarchy
//!
//! ```text
//! CondenserError (top-level)
//! ├── ConfigError    (configuration validation / file loading)
//! ├── SourceError    (raw block loading, I/O, format)
//! ├── ArtifactError  (combined archive write / read)
//! └── TransformError (spectral transform preconditions)
//! ```

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CondenserResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type CondenserResult<T> = Result<T, CondenserError>;

// ---------------------------------------------------------------------------
// CondenserError — top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for the condensation pipeline.
#[derive(Debug, Error)]
pub enum CondenserError {
    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A raw block could not be loaded.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The combined artifact could not be written or read.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// The spectral transform rejected its input.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// A block or array does not have the shape the configuration implies.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which array was being checked.
        what: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// No file identifiers were supplied to the aggregator.
    #[error("No input files were given")]
    NoInputFiles,
}

impl CondenserError {
    /// Construct a [`CondenserError::ShapeMismatch`].
    pub fn shape_mismatch(what: &'static str, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        CondenserError::ShapeMismatch { what, expected, actual }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`CondenserConfig`].
///
/// [`CondenserConfig`]: crate::config::CondenserConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The configured sample range is not an exact multiple of the window.
    #[error(
        "time_window {window} does not evenly divide the {samples} configured time samples \
         ({remainder} left over)"
    )]
    UnevenTiling {
        /// Number of configured samples.
        samples: usize,
        /// Configured window size.
        window: usize,
        /// Samples left over after the last full window.
        remainder: usize,
    },

    /// `bin_size` does not evenly divide the per-window frequency bin count.
    #[error("bin_size {bin_size} does not evenly divide the {num_freq_bins} frequency bins of one window")]
    UnevenBinning {
        /// Frequency bins per window.
        num_freq_bins: usize,
        /// Configured bin size.
        bin_size: usize,
    },

    /// A configuration file could not be read or written.
    #[error("Cannot access config file `{path}`: {source}")]
    FileRead {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors produced while loading a raw block from a [`BlockSource`].
///
/// [`BlockSource`]: crate::source::BlockSource
#[derive(Debug, Error)]
pub enum SourceError {
    /// The requested file does not exist.
    #[error("Data not found at `{path}`")]
    NotFound {
        /// Path that was expected to contain data.
        path: PathBuf,
    },

    /// A low-level I/O error while reading a data file.
    #[error("I/O error reading `{path}`: {source}")]
    Io {
        /// Path being read when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file was found but its contents could not be decoded.
    #[error("Invalid data format in `{path}`: {message}")]
    InvalidFormat {
        /// Path of the malformed file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// An in-memory source has no block under this identifier.
    #[error("Unknown block identifier `{0}`")]
    UnknownId(String),

    /// The configured channel or sample range falls outside the block.
    #[error("Range {what} {first}..={last} is outside the block ({available} available)")]
    RangeOutOfBounds {
        /// `"channel"` or `"sample"`.
        what: &'static str,
        /// First requested index.
        first: usize,
        /// Last requested index (inclusive).
        last: usize,
        /// Length of the block along that axis.
        available: usize,
    },
}

impl SourceError {
    /// Construct a [`SourceError::InvalidFormat`].
    pub fn invalid_format<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        SourceError::InvalidFormat { path: path.into(), message: msg.into() }
    }

    /// Construct a [`SourceError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SourceError::Io { path: path.into(), source }
    }
}

// ---------------------------------------------------------------------------
// ArtifactError
// ---------------------------------------------------------------------------

/// Errors produced while writing or reading the combined `.npz` artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// File could not be created or opened.
    #[error("Cannot access artifact `{path}`: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The npz writer failed.
    #[error("Cannot write array `{name}`: {source}")]
    Write {
        /// Array being written.
        name: &'static str,
        /// Underlying writer error.
        #[source]
        source: ndarray_npy::WriteNpzError,
    },

    /// The npz reader failed.
    #[error("Cannot read array `{name}`: {source}")]
    Read {
        /// Array being read.
        name: String,
        /// Underlying reader error.
        #[source]
        source: ndarray_npy::ReadNpzError,
    },

    /// A required array is missing from the archive.
    #[error("Array `{0}` is missing from the archive")]
    MissingArray(&'static str),

    /// The index arrays are inconsistent with each other or with the tensor.
    #[error("Malformed index array `{name}`: {reason}")]
    MalformedIndex {
        /// Name of the index array.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ArtifactError {
    /// Construct a [`ArtifactError::MalformedIndex`].
    pub fn malformed<S: Into<String>>(name: &'static str, reason: S) -> Self {
        ArtifactError::MalformedIndex { name, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// TransformError
// ---------------------------------------------------------------------------

/// Errors from the spectral transform.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The block has no time samples.
    #[error("Cannot transform a block with zero time samples")]
    EmptyTimeAxis,

    /// The sampling rate is not a positive finite number.
    #[error("Sampling rate must be positive and finite, got {0}")]
    InvalidSamplingRate(f64),
}
