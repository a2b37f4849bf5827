//! File-backed pipeline: `.npy` blocks on disk, aggregation driven by the
//! schedule, `.npz` artifact written and read back.

use chrono::{TimeZone, Utc};
use das_condenser::prelude::*;
use das_condenser::{ArtifactLayout, FileSchedule};
use ndarray::Array2;
use ndarray_npy::WriteNpyExt;
use std::fs::File;
use std::path::Path;
use tempfile::tempdir;

fn schedule() -> FileSchedule {
    FileSchedule {
        year: 2021,
        month: 12,
        day: 31,
        hour_start: 23,
        min_start: 58,
        hour_end: 23,
        min_end: 59,
        ..FileSchedule::default()
    }
}

fn config(schedule: FileSchedule) -> CondenserConfig {
    CondenserConfig::builder()
        .channels(2, 9)
        .time_samples(0, 59)
        .sampling_rate(10.0)
        .time_window(20)
        .ch_group_size(3)
        .bin_size(1)
        .schedule(schedule)
        .build()
}

fn write_block(dir: &Path, name: &str, seed: usize) {
    let data = Array2::from_shape_fn((60, 12), |(t, c)| ((t * 13 + c * 7 + seed) % 17) as f32 - 8.0);
    data.write_npy(File::create(dir.join(name)).unwrap()).unwrap();
}

#[test]
fn schedule_to_npz_and_back() {
    let input = tempdir().unwrap();
    let cfg = config(schedule());
    let files = cfg.schedule.files().unwrap();
    assert_eq!(files.len(), 2);
    for (i, f) in files.iter().enumerate() {
        write_block(input.path(), &f.name, i);
    }

    let source = NpyDirectorySource::new(input.path());
    let artifact = MultiFileAggregator::new(&cfg, &source)
        .unwrap()
        .aggregate_schedule()
        .unwrap();

    // 8 channels in groups of 3: 2..=4, 5..=7, 8..=9.
    assert_eq!(artifact.channel_inds.to_vec(), vec![3, 2, 4, 5, 7, 8, 9]);
    assert_eq!(artifact.big_tens.dim(), (6, 3, 11));
    assert_eq!(artifact.ch_stds.dim(), (2, 3, 3));
    assert_eq!(artifact.ch_means.dim(), (2, 8));

    let time = artifact.time_index().unwrap();
    assert_eq!(time.window_len_secs(), 2.0);
    assert_eq!(time.starts[0], Utc.with_ymd_and_hms(2021, 12, 31, 23, 58, 0).unwrap());
    assert_eq!(time.starts[2], Utc.with_ymd_and_hms(2021, 12, 31, 23, 58, 4).unwrap());
    // The second file restarts at its own minute, not right after the first
    // file's last condensed window.
    assert_eq!(time.starts[3], Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 0).unwrap());
    assert_eq!(time.starts[5], Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 4).unwrap());
    assert_eq!(artifact.time_inds[0], 2.0);

    let out = tempdir().unwrap();
    let path = out.path().join("combined.npz");
    artifact.write_npz(&path).unwrap();
    let loaded = CombinedArtifact::read_npz(&path).unwrap();
    assert_eq!(loaded, artifact);

    let layout = loaded.layout().unwrap();
    assert_eq!(layout, ArtifactLayout::from_config(&cfg, 2));
}

#[test]
fn missing_file_skipped_under_skip_policy() {
    let input = tempdir().unwrap();
    let mut cfg = config(schedule());
    cfg.failure_policy = FailurePolicy::SkipAndLog;
    let files = cfg.schedule.files().unwrap();
    write_block(input.path(), &files[1].name, 1);

    let source = NpyDirectorySource::new(input.path());
    let artifact = MultiFileAggregator::new(&cfg, &source)
        .unwrap()
        .aggregate_schedule()
        .unwrap();

    assert_eq!(artifact.skipped_files, vec![0]);
    assert!(artifact.ch_means.row(0).iter().all(|v| v.is_nan()));
    assert!(artifact.ch_means.row(1).iter().all(|v| v.is_finite()));
}

#[test]
fn missing_file_aborts_by_default() {
    let input = tempdir().unwrap();
    let cfg = config(schedule());
    let source = NpyDirectorySource::new(input.path());
    let err = MultiFileAggregator::new(&cfg, &source)
        .unwrap()
        .aggregate_schedule()
        .unwrap_err();
    assert!(matches!(err, CondenserError::Source(_)));
}

#[test]
fn block_narrower_than_channel_range_is_a_source_error() {
    let input = tempdir().unwrap();
    let cfg = config(FileSchedule { min_start: 59, ..schedule() });
    let narrow = Array2::<f64>::zeros((60, 5));
    let name = cfg.schedule.files().unwrap()[0].name.clone();
    narrow.write_npy(File::create(input.path().join(&name)).unwrap()).unwrap();

    let source = NpyDirectorySource::new(input.path());
    let err = MultiFileAggregator::new(&cfg, &source)
        .unwrap()
        .aggregate(&[name])
        .unwrap_err();
    assert!(matches!(err, CondenserError::Source(_)));
}
