//! Combined artifact of a condensation run and its `.npz` form.
//!
//! Array names in the archive:
//!
//! | name            | dtype | shape                         |
//! |-----------------|-------|-------------------------------|
//! | `n_files`       | i64   | `()`                          |
//! | `time_inds`     | f64   | `(2 + files·windows,)`        |
//! | `freq_inds`     | f64   | `(3,)`                        |
//! | `channel_inds`  | i64   | `(2·groups + 1,)`             |
//! | `big_tens`      | f64   | `(files·windows, groups, bins)` |
//! | `ch_stds`       | f64   | `(files, windows, groups)`    |
//! | `ch_means`      | f64   | `(files, channels)`           |
//! | `ch_maxs`       | f64   | `(files, channels)`           |
//! | `peak_freqs`    | f64   | `(files,)`                    |
//! | `means_t`       | f64   | `(files, channels)`           |
//! | `stds_t`        | f64   | `(files, channels)`           |
//! | `maxs_t`        | f64   | `(files, channels)`           |
//! | `skipped_files` | i64   | `(skipped,)`                  |
//! | `cell_warnings` | i64   | `(warnings, 4)`               |

use ndarray::{arr0, Array0, Array1, Array2, Array3, ArrayBase, DataOwned, Dimension};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement};
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::condenser::{CellIssue, CellWarning};
use crate::error::ArtifactError;
use crate::index_arrays::{ArtifactLayout, TimeIndex};

/// A cell warning tagged with the file it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCellWarning {
    /// Position of the file in the aggregation order.
    pub file: usize,
    /// The cell warning.
    pub warning: CellWarning,
}

/// Everything produced by one aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedArtifact {
    /// Number of files combined (skipped files included).
    pub n_files: usize,
    /// Stored time index, see [`TimeIndex`].
    pub time_inds: Array1<f64>,
    /// `[n_bins, bin_width, nyquist]`.
    pub freq_inds: Array1<f64>,
    /// `[n_groups, start_0, end_0, ...]`.
    pub channel_inds: Array1<i64>,
    /// Combined spectral tensor.
    pub big_tens: Array3<f64>,
    /// Cell standard deviations, `[file, window, group]`.
    pub ch_stds: Array3<f64>,
    /// Per-file mean transform magnitude per channel.
    pub ch_means: Array2<f64>,
    /// Per-file maximum transform magnitude per channel.
    pub ch_maxs: Array2<f64>,
    /// Per-file peak frequency in Hz.
    pub peak_freqs: Array1<f64>,
    /// Per-file raw-sample mean per channel.
    pub means_t: Array2<f64>,
    /// Per-file raw-sample standard deviation per channel.
    pub stds_t: Array2<f64>,
    /// Per-file raw-sample maximum per channel.
    pub maxs_t: Array2<f64>,
    /// Positions of files that could not be read (NaN-filled).
    pub skipped_files: Vec<usize>,
    /// Degenerate cells.
    pub warnings: Vec<FileCellWarning>,
}

impl CombinedArtifact {
    /// Shapes implied by the index arrays.
    pub fn layout(&self) -> Result<ArtifactLayout, ArtifactError> {
        ArtifactLayout::from_index_arrays(self.n_files, &self.time_inds, &self.channel_inds, &self.freq_inds)
    }

    /// Parsed time index.
    pub fn time_index(&self) -> Result<TimeIndex, ArtifactError> {
        TimeIndex::from_array(&self.time_inds)
    }

    /// Check every array against the shapes the index arrays imply.
    pub fn check_shapes(&self) -> Result<(), ArtifactError> {
        let layout = self.layout()?;
        let tensor = layout.tensor_shape();
        let stds = layout.std_shape();
        let stats = layout.channel_stats_shape();
        let files = [layout.num_files];
        let checks: [(&'static str, &[usize], &[usize]); 8] = [
            ("big_tens", self.big_tens.shape(), &tensor),
            ("ch_stds", self.ch_stds.shape(), &stds),
            ("ch_means", self.ch_means.shape(), &stats),
            ("ch_maxs", self.ch_maxs.shape(), &stats),
            ("means_t", self.means_t.shape(), &stats),
            ("stds_t", self.stds_t.shape(), &stats),
            ("maxs_t", self.maxs_t.shape(), &stats),
            ("peak_freqs", self.peak_freqs.shape(), &files),
        ];
        for (name, actual, expected) in checks {
            if actual != expected {
                return Err(ArtifactError::malformed(
                    name,
                    format!("shape {actual:?} does not match index-derived {expected:?}"),
                ));
            }
        }
        Ok(())
    }

    /// Write every array into an uncompressed `.npz` archive at `path`.
    pub fn write_npz(&self, path: &Path) -> Result<(), ArtifactError> {
        let file = File::create(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
        let mut npz = NpzWriter::new(file);

        let skipped: Array1<i64> = self.skipped_files.iter().map(|&i| i as i64).collect();
        let warnings = self.warnings_array();

        add(&mut npz, "n_files", &arr0(self.n_files as i64))?;
        add(&mut npz, "time_inds", &self.time_inds)?;
        add(&mut npz, "freq_inds", &self.freq_inds)?;
        add(&mut npz, "channel_inds", &self.channel_inds)?;
        add(&mut npz, "big_tens", &self.big_tens)?;
        add(&mut npz, "ch_stds", &self.ch_stds)?;
        add(&mut npz, "ch_means", &self.ch_means)?;
        add(&mut npz, "ch_maxs", &self.ch_maxs)?;
        add(&mut npz, "peak_freqs", &self.peak_freqs)?;
        add(&mut npz, "means_t", &self.means_t)?;
        add(&mut npz, "stds_t", &self.stds_t)?;
        add(&mut npz, "maxs_t", &self.maxs_t)?;
        add(&mut npz, "skipped_files", &skipped)?;
        add(&mut npz, "cell_warnings", &warnings)?;
        npz.finish().map_err(|source| ArtifactError::Write { name: "(archive)", source })?;

        info!(path = %path.display(), files = self.n_files, "wrote combined artifact");
        Ok(())
    }

    /// Read an archive written by [`write_npz`](Self::write_npz).
    pub fn read_npz(path: &Path) -> Result<Self, ArtifactError> {
        let file = File::open(path).map_err(|source| ArtifactError::Io { path: path.to_path_buf(), source })?;
        let mut npz = NpzReader::new(file).map_err(|source| ArtifactError::Read {
            name: path.display().to_string(),
            source,
        })?;
        let names = npz.names().map_err(|source| ArtifactError::Read {
            name: path.display().to_string(),
            source,
        })?;

        let n_files: Array0<i64> = read(&mut npz, &names, "n_files")?;
        let skipped: Array1<i64> = read(&mut npz, &names, "skipped_files")?;
        let warnings: Array2<i64> = read(&mut npz, &names, "cell_warnings")?;

        let artifact = Self {
            n_files: usize::try_from(n_files.into_scalar())
                .map_err(|_| ArtifactError::malformed("n_files", "negative"))?,
            time_inds: read(&mut npz, &names, "time_inds")?,
            freq_inds: read(&mut npz, &names, "freq_inds")?,
            channel_inds: read(&mut npz, &names, "channel_inds")?,
            big_tens: read(&mut npz, &names, "big_tens")?,
            ch_stds: read(&mut npz, &names, "ch_stds")?,
            ch_means: read(&mut npz, &names, "ch_means")?,
            ch_maxs: read(&mut npz, &names, "ch_maxs")?,
            peak_freqs: read(&mut npz, &names, "peak_freqs")?,
            means_t: read(&mut npz, &names, "means_t")?,
            stds_t: read(&mut npz, &names, "stds_t")?,
            maxs_t: read(&mut npz, &names, "maxs_t")?,
            skipped_files: skipped.iter().map(|&i| i as usize).collect(),
            warnings: parse_warnings(&warnings)?,
        };
        artifact.check_shapes()?;
        Ok(artifact)
    }

    fn warnings_array(&self) -> Array2<i64> {
        let mut out = Array2::<i64>::zeros((self.warnings.len(), 4));
        for (mut row, w) in out.rows_mut().into_iter().zip(&self.warnings) {
            row[0] = w.file as i64;
            row[1] = w.warning.window as i64;
            row[2] = w.warning.group as i64;
            row[3] = issue_code(w.warning.issue);
        }
        out
    }
}

fn issue_code(issue: CellIssue) -> i64 {
    match issue {
        CellIssue::AllChannelsRejected => 0,
        CellIssue::NonFiniteInput => 1,
    }
}

fn parse_warnings(array: &Array2<i64>) -> Result<Vec<FileCellWarning>, ArtifactError> {
    if array.ncols() != 4 && array.nrows() != 0 {
        return Err(ArtifactError::malformed("cell_warnings", "expected 4 columns"));
    }
    array
        .rows()
        .into_iter()
        .map(|row| {
            let issue = match row[3] {
                0 => CellIssue::AllChannelsRejected,
                1 => CellIssue::NonFiniteInput,
                other => return Err(ArtifactError::malformed("cell_warnings", format!("unknown issue code {other}"))),
            };
            Ok(FileCellWarning {
                file: row[0] as usize,
                warning: CellWarning { window: row[1] as usize, group: row[2] as usize, issue },
            })
        })
        .collect()
}

fn add<S, D>(npz: &mut NpzWriter<File>, name: &'static str, array: &ArrayBase<S, D>) -> Result<(), ArtifactError>
where
    S: ndarray::Data,
    S::Elem: ndarray_npy::WritableElement,
    D: Dimension,
{
    npz.add_array(name, array).map_err(|source| ArtifactError::Write { name, source })
}

/// Read `key`, whether the archive lists it with or without the `.npy` suffix.
fn read<S, D>(npz: &mut NpzReader<File>, names: &[String], key: &'static str) -> Result<ArrayBase<S, D>, ArtifactError>
where
    S: DataOwned,
    S::Elem: ReadableElement,
    D: Dimension,
{
    let index = names
        .iter()
        .position(|n| n == key || n.strip_suffix(".npy") == Some(key))
        .ok_or(ArtifactError::MissingArray(key))?;
    npz.by_index(index).map_err(|source| ArtifactError::Read { name: key.to_owned(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_arrays::{channel_index_array, freq_index_array};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn tiny_artifact() -> CombinedArtifact {
        let start = Utc.with_ymd_and_hms(2019, 4, 26, 20, 54, 0).unwrap();
        let time = TimeIndex::new(start, Duration::seconds(2), 4);
        CombinedArtifact {
            n_files: 2,
            time_inds: time.to_array(),
            freq_inds: freq_index_array(3, 250.0),
            channel_inds: channel_index_array(0, 4, 2),
            big_tens: Array3::from_shape_fn((4, 3, 3), |(w, g, b)| (w * 100 + g * 10 + b) as f64),
            ch_stds: Array3::from_elem((2, 2, 3), 0.5),
            ch_means: Array2::from_elem((2, 5), 1.0),
            ch_maxs: Array2::from_elem((2, 5), 2.0),
            peak_freqs: Array1::from(vec![5.0, f64::NAN]),
            means_t: Array2::zeros((2, 5)),
            stds_t: Array2::ones((2, 5)),
            maxs_t: Array2::from_elem((2, 5), 3.0),
            skipped_files: vec![1],
            warnings: vec![FileCellWarning {
                file: 0,
                warning: CellWarning { window: 1, group: 2, issue: CellIssue::AllChannelsRejected },
            }],
        }
    }

    #[test]
    fn shapes_agree_with_index_arrays() {
        tiny_artifact().check_shapes().unwrap();
    }

    #[test]
    fn shape_disagreement_is_reported() {
        let mut artifact = tiny_artifact();
        artifact.ch_means = Array2::zeros((2, 4));
        assert!(matches!(
            artifact.check_shapes(),
            Err(ArtifactError::MalformedIndex { name: "ch_means", .. })
        ));
    }

    #[test]
    fn flat_std_devs_are_rejected() {
        let mut artifact = tiny_artifact();
        artifact.ch_stds = Array3::from_elem((1, 4, 3), 0.5);
        assert!(matches!(
            artifact.check_shapes(),
            Err(ArtifactError::MalformedIndex { name: "ch_stds", .. })
        ));
    }

    #[test]
    fn npz_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("combined.npz");
        let artifact = tiny_artifact();
        artifact.write_npz(&path).unwrap();

        let loaded = CombinedArtifact::read_npz(&path).unwrap();
        assert_eq!(loaded.n_files, 2);
        assert_eq!(loaded.big_tens, artifact.big_tens);
        assert_eq!(loaded.time_inds, artifact.time_inds);
        assert_eq!(loaded.time_inds[0], 2.0);
        assert_eq!(loaded.ch_stds, artifact.ch_stds);
        assert_eq!(loaded.skipped_files, vec![1]);
        assert_eq!(loaded.warnings, artifact.warnings);
        assert_eq!(loaded.peak_freqs[0], 5.0);
        assert!(loaded.peak_freqs[1].is_nan());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            CombinedArtifact::read_npz(&dir.path().join("absent.npz")),
            Err(ArtifactError::Io { .. })
        ));
    }
}
