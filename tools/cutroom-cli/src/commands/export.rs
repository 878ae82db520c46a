//! Trim and export a clip.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use cutroom_common::clock::{format_timestamp, JobClock};
use cutroom_common::config::{AppConfig, FidelityPreference};
use cutroom_export_engine::progress::{ExportProgress, ProgressCallback};
use cutroom_export_engine::runner::{run_export, ExportToolkit};
use cutroom_media_model::estimate::{estimate_encoded_size, estimate_trimmed_size, format_bytes};
use cutroom_media_model::job::{ExportJob, StrategyChoice, StrategyKind};
use cutroom_media_model::source::Resolution;

pub struct ExportArgs {
    pub path: PathBuf,
    pub start: f64,
    pub end: Option<f64>,
    pub resolution: String,
    pub strategy: StrategyChoice,
    pub fidelity: Option<FidelityPreference>,
    pub output: Option<PathBuf>,
}

/// Sidecar written next to the output as `<output>.export.json`.
#[derive(Debug, Serialize)]
struct ExportReport {
    source: PathBuf,
    output: Option<PathBuf>,
    strategy: Option<StrategyKind>,
    start_secs: f64,
    end_secs: f64,
    resolution: String,
    bytes: Option<u64>,
    estimated_bytes: Option<u64>,
    frames_encoded: Option<u64>,
    elapsed_secs: f64,
    finished_at: String,
    error_kind: Option<&'static str>,
    error: Option<String>,
}

pub async fn run(config: &AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    let (source, range) = super::load_window(config, &args.path, args.start, args.end).await?;
    let resolution = Resolution::parse(&args.resolution)?;
    let job = ExportJob::new(source, range, resolution)
        .with_strategy(args.strategy)
        .with_fidelity(args.fidelity.unwrap_or(config.export.fidelity));

    println!("Exporting: {}", job.source.path.display());
    println!(
        "  Window: {} - {}",
        format_timestamp(job.range.start()),
        format_timestamp(job.range.end())
    );
    println!("  Resolution: {}", job.resolution.label());

    let toolkit = ExportToolkit::ffmpeg(config).await;
    let clock = JobClock::start();
    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        match p.percent {
            Some(percent) => print!(
                "\r  {:?}: {percent:.1}% ({} frames, ETA: {:.0}s)    ",
                p.stage, p.frames_encoded, p.eta_secs
            ),
            None => print!("\r  {:?} ({} frames)    ", p.stage, p.frames_encoded),
        }
        let _ = std::io::stdout().flush();
    });

    let result = run_export(&job, &toolkit, Some(progress_cb)).await;
    println!();

    match result {
        Ok(outcome) => {
            let output_path = write_artifact(
                &outcome.artifact.bytes,
                &outcome.artifact.suggested_file_name,
                &job,
                args.output.as_deref(),
            )?;
            let estimate = match outcome.summary.strategy {
                StrategyKind::CodecPipeline => {
                    estimate_encoded_size(config.export.bitrate_bps, job.range.len_secs())
                }
                _ => estimate_trimmed_size(job.source.byte_size, &job.range),
            };

            println!("Export complete: {}", output_path.display());
            println!("  Strategy: {}", outcome.summary.strategy.as_str());
            println!(
                "  Size: {} (estimated {})",
                format_bytes(outcome.summary.bytes),
                format_bytes(estimate)
            );

            let report = ExportReport {
                source: job.source.path.clone(),
                output: Some(output_path.clone()),
                strategy: Some(outcome.summary.strategy),
                start_secs: outcome.summary.start_secs,
                end_secs: outcome.summary.end_secs,
                resolution: job.resolution.label(),
                bytes: Some(outcome.summary.bytes),
                estimated_bytes: Some(estimate),
                frames_encoded: Some(outcome.summary.frames_encoded),
                elapsed_secs: outcome.summary.elapsed_secs,
                finished_at: outcome.summary.finished_at,
                error_kind: None,
                error: None,
            };
            write_report(&output_path, &report)?;
            Ok(())
        }
        Err(e) => {
            let fallback = job.suggested_file_name(job.source.container, false);
            let target = output_target(&job, args.output.as_deref(), &fallback);
            let report = ExportReport {
                source: job.source.path.clone(),
                output: None,
                strategy: None,
                start_secs: job.range.start(),
                end_secs: job.range.end(),
                resolution: job.resolution.label(),
                bytes: None,
                estimated_bytes: None,
                frames_encoded: None,
                elapsed_secs: clock.elapsed_secs(),
                finished_at: JobClock::now_wall(),
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
            };
            if let Err(report_err) = write_report(&target, &report) {
                tracing::warn!(error = %report_err, "Failed to write export report");
            }
            Err(anyhow::anyhow!("Export failed ({}): {e}", e.kind()))
        }
    }
}

/// Resolve where the output goes: an explicit file, a directory, or the source directory.
fn output_target(job: &ExportJob, output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => job
            .source
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(file_name),
    }
}

fn write_artifact(
    bytes: &[u8],
    file_name: &str,
    job: &ExportJob,
    output: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let path = output_target(job, output, file_name);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&path, bytes)?;
    Ok(path)
}

fn write_report(output_path: &Path, report: &ExportReport) -> anyhow::Result<()> {
    let mut name = output_path.as_os_str().to_owned();
    name.push(".export.json");
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(PathBuf::from(name), json)?;
    Ok(())
}
