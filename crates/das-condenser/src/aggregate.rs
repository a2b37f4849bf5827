//! Multi-file aggregation.
//!
//! [`MultiFileAggregator`] condenses an ordered list of files from a
//! [`BlockSource`] and stacks the per-file products into one
//! [`CombinedArtifact`]. File `i` occupies tensor rows
//! `i·windows..(i+1)·windows`. Cell std-devs are indexed `[file, window,
//! group]` and per-channel statistics are stacked one row per file.
//!
//! When the `parallel` feature is enabled and [`CondenserConfig::parallel`]
//! is set, files are condensed on the rayon pool and copied into their
//! (disjoint) slices afterwards. The output is identical to a sequential run.

use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, Array3, Axis};
use tracing::{info, warn};

use crate::artifact::{CombinedArtifact, FileCellWarning};
use crate::assembler::{FileProducts, TensorAssembler};
use crate::config::{CondenserConfig, FailurePolicy};
use crate::error::{CondenserError, CondenserResult};
use crate::index_arrays::{channel_index_array, freq_index_array, time_index_array, ArtifactLayout};
use crate::source::BlockSource;
use crate::stats::TimeDomainStats;

/// Condensed products of one file and the nyquist frequency used for it.
type Condensed = CondenserResult<(FileProducts, f64)>;

/// Condenses and stacks many files.
pub struct MultiFileAggregator<'a> {
    config: &'a CondenserConfig,
    source: &'a dyn BlockSource,
    assembler: TensorAssembler,
}

impl std::fmt::Debug for MultiFileAggregator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiFileAggregator")
            .field("source", &self.source.name())
            .field("assembler", &self.assembler)
            .finish()
    }
}

impl<'a> MultiFileAggregator<'a> {
    /// Validate `config` and prepare an aggregator reading from `source`.
    pub fn new(config: &'a CondenserConfig, source: &'a dyn BlockSource) -> CondenserResult<Self> {
        let assembler = TensorAssembler::new(config)?;
        Ok(Self { config, source, assembler })
    }

    /// Aggregate every file of the configured schedule.
    pub fn aggregate_schedule(&self) -> CondenserResult<CombinedArtifact> {
        let (ids, starts): (Vec<String>, Vec<DateTime<Utc>>) = self
            .config
            .schedule
            .files()?
            .into_iter()
            .map(|f| (f.name, f.start))
            .unzip();
        self.aggregate_at(&ids, &starts)
    }

    /// Aggregate `ids` in order, the first file starting at the schedule start.
    pub fn aggregate(&self, ids: &[String]) -> CondenserResult<CombinedArtifact> {
        let start = self.config.schedule.start()?;
        self.aggregate_from(ids, start)
    }

    /// Aggregate `ids` in order, the first file starting at `start` and each
    /// following one a file duration later.
    pub fn aggregate_from(&self, ids: &[String], start: DateTime<Utc>) -> CondenserResult<CombinedArtifact> {
        let step = self.config.schedule.file_duration();
        let mut starts = Vec::with_capacity(ids.len());
        let mut current = start;
        for _ in ids {
            starts.push(current);
            current = current + step;
        }
        self.aggregate_at(ids, &starts)
    }

    /// Aggregate `ids` in order; file `i` starts at `starts[i]`.
    fn aggregate_at(&self, ids: &[String], starts: &[DateTime<Utc>]) -> CondenserResult<CombinedArtifact> {
        if ids.is_empty() {
            return Err(CondenserError::NoInputFiles);
        }
        info!(
            files = ids.len(),
            source = self.source.name(),
            parallel = self.config.parallel,
            "aggregating"
        );

        let layout = ArtifactLayout::from_config(self.config, ids.len());
        let mut stack = Stack::allocate(&layout);

        if self.config.parallel {
            let results = self.condense_all_parallel(ids);
            for (i, (id, result)) in ids.iter().zip(results).enumerate() {
                self.settle(&mut stack, i, id, result)?;
            }
        } else {
            for (i, id) in ids.iter().enumerate() {
                let result = self.condense_one(id);
                self.settle(&mut stack, i, id, result)?;
            }
        }

        if stack.skipped.len() == ids.len() {
            warn!("every input file was skipped; the artifact is entirely NaN");
        }
        let nyquist = stack.nyquist.unwrap_or_else(|| self.config.nyquist());
        let time = time_index_array(self.config, starts);

        info!(
            files = ids.len(),
            skipped = stack.skipped.len(),
            warnings = stack.warnings.len(),
            "aggregation finished"
        );

        Ok(CombinedArtifact {
            n_files: ids.len(),
            time_inds: time.to_array(),
            freq_inds: freq_index_array(layout.num_bins, nyquist),
            channel_inds: channel_index_array(
                self.config.first_channel,
                self.config.last_channel,
                self.config.ch_group_size,
            ),
            big_tens: stack.big_tens,
            ch_stds: stack.ch_stds,
            ch_means: stack.ch_means,
            ch_maxs: stack.ch_maxs,
            peak_freqs: stack.peak_freqs,
            means_t: stack.means_t,
            stds_t: stack.stds_t,
            maxs_t: stack.maxs_t,
            skipped_files: stack.skipped,
            warnings: stack.warnings,
        })
    }

    /// Load, select and condense one file.
    fn condense_one(&self, id: &str) -> Condensed {
        let block = self.source.load(id)?;
        let nyquist = block.nyquist(self.config.sampling_rate);
        let selected = block.select(self.config)?;
        let products = self.assembler.assemble(selected, nyquist)?;
        Ok((products, nyquist))
    }

    #[cfg(feature = "parallel")]
    fn condense_all_parallel(&self, ids: &[String]) -> Vec<Condensed> {
        use rayon::prelude::*;
        ids.par_iter().map(|id| self.condense_one(id)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn condense_all_parallel(&self, ids: &[String]) -> Vec<Condensed> {
        warn!("built without the `parallel` feature; condensing sequentially");
        ids.iter().map(|id| self.condense_one(id)).collect()
    }

    /// Store a file's products, or apply the failure policy to its error.
    fn settle(&self, stack: &mut Stack, index: usize, id: &str, result: Condensed) -> CondenserResult<()> {
        match result {
            Ok((products, nyquist)) => {
                info!(file = id, peak_freq = products.peak_freq, "condensed file");
                if nyquist != self.config.nyquist() {
                    warn!(
                        file = id,
                        recorded_rate = 2.0 * nyquist,
                        configured_rate = self.config.sampling_rate,
                        "recorded sampling rate differs from the configured one; \
                         window timestamps still use the configured rate"
                    );
                }
                stack.nyquist.get_or_insert(nyquist);
                stack.store(index, products);
                Ok(())
            }
            Err(CondenserError::Source(err)) if self.config.failure_policy == FailurePolicy::SkipAndLog => {
                warn!(file = id, error = %err, "skipping unreadable file");
                stack.fill_nan(index);
                stack.skipped.push(index);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Combined arrays under construction.
struct Stack {
    windows: usize,
    big_tens: Array3<f64>,
    ch_stds: Array3<f64>,
    ch_means: Array2<f64>,
    ch_maxs: Array2<f64>,
    peak_freqs: Array1<f64>,
    means_t: Array2<f64>,
    stds_t: Array2<f64>,
    maxs_t: Array2<f64>,
    skipped: Vec<usize>,
    warnings: Vec<FileCellWarning>,
    nyquist: Option<f64>,
}

impl Stack {
    fn allocate(layout: &ArtifactLayout) -> Self {
        let stats = (layout.num_files, layout.num_channels);
        let [rows, groups, bins] = layout.tensor_shape();
        Self {
            windows: layout.windows_per_file,
            big_tens: Array3::zeros((rows, groups, bins)),
            ch_stds: Array3::zeros((layout.num_files, layout.windows_per_file, groups)),
            ch_means: Array2::zeros(stats),
            ch_maxs: Array2::zeros(stats),
            peak_freqs: Array1::zeros(layout.num_files),
            means_t: Array2::zeros(stats),
            stds_t: Array2::zeros(stats),
            maxs_t: Array2::zeros(stats),
            skipped: Vec::new(),
            warnings: Vec::new(),
            nyquist: None,
        }
    }

    fn rows(&self, index: usize) -> std::ops::Range<usize> {
        index * self.windows..(index + 1) * self.windows
    }

    fn store(&mut self, index: usize, products: FileProducts) {
        let rows = self.rows(index);
        self.big_tens.slice_mut(s![rows, .., ..]).assign(&products.spect);
        self.ch_stds.index_axis_mut(Axis(0), index).assign(&products.std_devs);
        self.ch_means.row_mut(index).assign(&products.channel_means);
        self.ch_maxs.row_mut(index).assign(&products.channel_maxs);
        self.peak_freqs[index] = products.peak_freq;
        self.store_time_stats(index, &products.time_stats);
        self.warnings.extend(
            products
                .warnings
                .into_iter()
                .map(|warning| FileCellWarning { file: index, warning }),
        );
    }

    fn store_time_stats(&mut self, index: usize, stats: &TimeDomainStats) {
        self.means_t.row_mut(index).assign(&stats.means);
        self.stds_t.row_mut(index).assign(&stats.std_devs);
        self.maxs_t.row_mut(index).assign(&stats.maxs);
    }

    fn fill_nan(&mut self, index: usize) {
        let rows = self.rows(index);
        self.big_tens.slice_mut(s![rows, .., ..]).fill(f64::NAN);
        self.ch_stds.index_axis_mut(Axis(0), index).fill(f64::NAN);
        self.ch_means.row_mut(index).fill(f64::NAN);
        self.ch_maxs.row_mut(index).fill(f64::NAN);
        self.peak_freqs[index] = f64::NAN;
        let nan = TimeDomainStats::nan(self.means_t.ncols());
        self.store_time_stats(index, &nan);
    }
}
