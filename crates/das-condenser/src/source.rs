//! Raw block sources.
//!
//! The condenser never touches instrument formats directly. A [`BlockSource`]
//! turns a file identifier into a [`RawBlock`] (time × channel samples plus the
//! sampling rate when the format records one). Readers for vendor formats live
//! outside this crate and implement the trait.

use ndarray::{s, Array2, ArrayView2};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::CondenserConfig;
use crate::error::SourceError;

/// One loaded file: rows are time samples, columns are channels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    /// Samples, `[time, channel]`.
    pub data: Array2<f64>,
    /// Sampling rate reported by the file, if any.
    pub sampling_rate: Option<f64>,
}

impl RawBlock {
    /// Wrap samples without a recorded sampling rate.
    pub fn new(data: Array2<f64>) -> Self {
        Self { data, sampling_rate: None }
    }

    /// Attach a sampling rate.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = Some(rate);
        self
    }

    /// View of the configured channel and time-sample ranges.
    pub fn select(&self, config: &CondenserConfig) -> Result<ArrayView2<'_, f64>, SourceError> {
        let (n_time, n_ch) = self.data.dim();
        if config.last_time_sample >= n_time {
            return Err(SourceError::RangeOutOfBounds {
                what: "sample",
                first: config.first_time_sample,
                last: config.last_time_sample,
                available: n_time,
            });
        }
        if config.last_channel >= n_ch {
            return Err(SourceError::RangeOutOfBounds {
                what: "channel",
                first: config.first_channel,
                last: config.last_channel,
                available: n_ch,
            });
        }
        Ok(self.data.slice(s![
            config.first_time_sample..=config.last_time_sample,
            config.first_channel..=config.last_channel
        ]))
    }

    /// Nyquist frequency from the recorded rate, else from `fallback_rate`.
    pub fn nyquist(&self, fallback_rate: f64) -> f64 {
        self.sampling_rate.unwrap_or(fallback_rate) / 2.0
    }
}

/// Anything that can produce raw blocks by identifier.
pub trait BlockSource: Send + Sync {
    /// Load the block named `id`.
    fn load(&self, id: &str) -> Result<RawBlock, SourceError>;

    /// Short description for logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// NpyDirectorySource
// ---------------------------------------------------------------------------

/// Reads `<root>/<id>` as a 2-D `.npy` array (`float64` or `float32`).
///
/// NPY files carry no sampling rate, so the directory-wide `sampling_rate`
/// given at construction is attached to every block.
#[derive(Debug, Clone)]
pub struct NpyDirectorySource {
    root: PathBuf,
    sampling_rate: Option<f64>,
}

impl NpyDirectorySource {
    /// Source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), sampling_rate: None }
    }

    /// Attach a sampling rate to every block read.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = Some(rate);
        self
    }

    /// Directory blocks are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the file for `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl BlockSource for NpyDirectorySource {
    fn load(&self, id: &str) -> Result<RawBlock, SourceError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(SourceError::NotFound { path });
        }
        let data = load_npy_2d(&path)?;
        debug!(path = %path.display(), shape = ?data.dim(), "loaded block");
        Ok(RawBlock { data, sampling_rate: self.sampling_rate })
    }

    fn name(&self) -> &str {
        "NpyDirectorySource"
    }
}

/// Load a 2-D NPY array as `f64`, widening `f32` files.
fn load_npy_2d(path: &Path) -> Result<Array2<f64>, SourceError> {
    use ndarray_npy::ReadNpyExt;

    let open = || File::open(path).map_err(|e| SourceError::io(path, e));
    match Array2::<f64>::read_npy(open()?) {
        Ok(arr) => Ok(arr),
        Err(f64_err) => Array2::<f32>::read_npy(open()?)
            .map(|arr| arr.mapv(f64::from))
            .map_err(|_| SourceError::invalid_format(path, format!("NPY read error: {f64_err}"))),
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Serves blocks held in memory, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    blocks: HashMap<String, RawBlock>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `block` under `id`, replacing any previous one.
    pub fn insert(&mut self, id: impl Into<String>, block: RawBlock) {
        self.blocks.insert(id.into(), block);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_block(mut self, id: impl Into<String>, block: RawBlock) -> Self {
        self.insert(id, block);
        self
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// `true` when no block is stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockSource for MemorySource {
    fn load(&self, id: &str) -> Result<RawBlock, SourceError> {
        self.blocks
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::UnknownId(id.to_owned()))
    }

    fn name(&self) -> &str {
        "MemorySource"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use ndarray_npy::WriteNpyExt;
    use tempfile::tempdir;

    fn small_config() -> CondenserConfig {
        CondenserConfig::builder()
            .channels(1, 3)
            .time_samples(2, 5)
            .time_window(2)
            .ch_group_size(2)
            .bin_size(1)
            .build()
    }

    #[test]
    fn select_applies_ranges() {
        let block = RawBlock::new(Array2::from_shape_fn((8, 5), |(t, c)| (t * 10 + c) as f64));
        let view = block.select(&small_config()).unwrap();
        assert_eq!(view.dim(), (4, 3));
        assert_eq!(view[[0, 0]], 21.0);
        assert_eq!(view[[3, 2]], 53.0);
    }

    #[test]
    fn select_out_of_range_is_error() {
        let block = RawBlock::new(Array2::zeros((4, 5)));
        assert!(matches!(
            block.select(&small_config()),
            Err(SourceError::RangeOutOfBounds { what: "sample", available: 4, .. })
        ));
        let block = RawBlock::new(Array2::zeros((8, 3)));
        assert!(matches!(
            block.select(&small_config()),
            Err(SourceError::RangeOutOfBounds { what: "channel", .. })
        ));
    }

    #[test]
    fn nyquist_prefers_recorded_rate() {
        let block = RawBlock::new(Array2::zeros((2, 2)));
        assert_eq!(block.nyquist(500.0), 250.0);
        assert_eq!(block.with_sampling_rate(1000.0).nyquist(500.0), 500.0);
    }

    #[test]
    fn npy_directory_reads_f64_and_f32() {
        let dir = tempdir().unwrap();
        let a = Array2::from_shape_fn((3, 2), |(t, c)| (t + c) as f64);
        a.write_npy(File::create(dir.path().join("a.npy")).unwrap()).unwrap();
        let b = Array2::from_shape_fn((3, 2), |(t, c)| (t * c) as f32);
        b.write_npy(File::create(dir.path().join("b.npy")).unwrap()).unwrap();

        let source = NpyDirectorySource::new(dir.path()).with_sampling_rate(500.0);
        let block_a = source.load("a.npy").unwrap();
        assert_eq!(block_a.data, a);
        assert_eq!(block_a.sampling_rate, Some(500.0));
        let block_b = source.load("b.npy").unwrap();
        assert_eq!(block_b.data, b.mapv(f64::from));
    }

    #[test]
    fn npy_directory_missing_and_garbage_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("junk.npy"), b"not an npy file").unwrap();
        let source = NpyDirectorySource::new(dir.path());
        assert!(matches!(source.load("absent.npy"), Err(SourceError::NotFound { .. })));
        assert!(matches!(source.load("junk.npy"), Err(SourceError::InvalidFormat { .. })));
    }

    #[test]
    fn memory_source_lookup() {
        let source = MemorySource::new().with_block("x", RawBlock::new(Array2::zeros((2, 2))));
        assert_eq!(source.len(), 1);
        assert!(source.load("x").is_ok());
        assert!(matches!(source.load("y"), Err(SourceError::UnknownId(id)) if id == "y"));
    }
}
