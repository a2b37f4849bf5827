//! Command implementations.

use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use ndarray::Axis;
use tabled::{settings::Style, Table, Tabled};
use tracing::{info, warn};

use das_condenser::{
    CombinedArtifact, CondenserConfig, FailurePolicy, MultiFileAggregator, NpyDirectorySource,
};

use crate::{CondenseArgs, InitConfigArgs, InspectArgs};

/// Key/value row of the artifact summary table
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Per-file row of the inspect table
#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Peak (Hz)")]
    peak: String,
    #[tabled(rename = "Mean |X|")]
    mean_magnitude: String,
    #[tabled(rename = "Max |X|")]
    max_magnitude: String,
    #[tabled(rename = "Warnings")]
    warnings: usize,
    #[tabled(rename = "Skipped")]
    skipped: bool,
}

/// Execute the condense command
pub fn condense(args: CondenseArgs) -> Result<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            CondenserConfig::from_json(path)
                .with_context(|| format!("loading configuration {}", path.display()))?
        }
        None => {
            info!("No configuration file provided, using defaults");
            CondenserConfig::default()
        }
    };
    if args.parallel {
        config.parallel = true;
    }
    if args.skip_unreadable {
        config.failure_policy = FailurePolicy::SkipAndLog;
    }

    let mut source = NpyDirectorySource::new(&args.input_dir);
    if let Some(rate) = args.file_sampling_rate {
        source = source.with_sampling_rate(rate);
    }

    let aggregator = MultiFileAggregator::new(&config, &source).context("invalid configuration")?;
    let artifact = if args.files.is_empty() {
        aggregator.aggregate_schedule()
    } else {
        aggregator.aggregate(&args.files)
    }
    .context("condensation failed")?;

    if !artifact.skipped_files.is_empty() {
        warn!("{} of {} files were skipped", artifact.skipped_files.len(), artifact.n_files);
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    artifact
        .write_npz(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("Wrote {} ({} files, tensor {:?})", args.output.display(), artifact.n_files, artifact.big_tens.dim());
    Ok(())
}

/// Execute the inspect command
pub fn inspect(args: InspectArgs) -> Result<()> {
    let artifact = CombinedArtifact::read_npz(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    println!("{}", Table::new(summary_rows(&artifact)?).with(Style::rounded()));

    if args.files {
        println!("{}", Table::new(file_rows(&artifact)).with(Style::rounded()));
    }
    Ok(())
}

/// Execute the init-config command
pub fn init_config(args: InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.path.display());
    }
    CondenserConfig::default()
        .to_json(&args.path)
        .with_context(|| format!("writing {}", args.path.display()))?;
    println!("Wrote default configuration to {}", args.path.display());
    Ok(())
}

fn summary_rows(artifact: &CombinedArtifact) -> Result<Vec<SummaryRow>> {
    let layout = artifact.layout()?;
    let time = artifact.time_index()?;
    let span = match (time.starts.first(), time.starts.last()) {
        (Some(first), Some(last)) => format!(
            "{} .. {}",
            first.to_rfc3339_opts(SecondsFormat::Micros, true),
            last.to_rfc3339_opts(SecondsFormat::Micros, true)
        ),
        _ => "-".to_owned(),
    };

    let row = |field, value: String| SummaryRow { field, value };
    Ok(vec![
        row("Files", artifact.n_files.to_string()),
        row("Skipped", format!("{:?}", artifact.skipped_files)),
        row("Tensor shape", format!("{:?}", layout.tensor_shape())),
        row("Channels", layout.num_channels.to_string()),
        row("Channel groups", layout.num_groups.to_string()),
        row("Windows per file", layout.windows_per_file.to_string()),
        row("Window length (s)", time.window_len_secs().to_string()),
        row("Time span (UTC)", span),
        row("Frequency bins", layout.num_bins.to_string()),
        row("Bin width (Hz)", format!("{:.4}", artifact.freq_inds[1])),
        row("Nyquist (Hz)", format!("{:.3}", artifact.freq_inds[2])),
        row("Cell warnings", artifact.warnings.len().to_string()),
    ])
}

fn file_rows(artifact: &CombinedArtifact) -> Vec<FileRow> {
    artifact
        .ch_means
        .axis_iter(Axis(0))
        .zip(artifact.ch_maxs.axis_iter(Axis(0)))
        .enumerate()
        .map(|(i, (means, maxs))| FileRow {
            index: i,
            peak: format!("{:.3}", artifact.peak_freqs[i]),
            mean_magnitude: format!("{:.4}", means.mean().unwrap_or(f64::NAN)),
            max_magnitude: format!("{:.4}", maxs.fold(f64::NEG_INFINITY, |a, &b| a.max(b))),
            warnings: artifact.warnings.iter().filter(|w| w.file == i).count(),
            skipped: artifact.skipped_files.contains(&i),
        })
        .collect()
}
