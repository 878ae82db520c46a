mod support;

use std::sync::{Arc, Mutex};

use cutroom_common::config::FidelityPreference;
use cutroom_export_engine::frame::FrameLedger;
use cutroom_export_engine::progress::ExportStage;
use cutroom_export_engine::runner::{run_export, ExportToolkit};
use cutroom_export_engine::transcoder::{Transcoder, TranscoderRuntime};
use cutroom_media_model::job::{ExportJob, StrategyChoice, StrategyKind};
use cutroom_media_model::range::TimeRange;
use cutroom_media_model::source::Resolution;

use support::{
    fast_settings, range, source, FakeCaptureBackend, InMemoryTranscoder, SyntheticCodecBackend,
};

async fn ready_runtime() -> Arc<TranscoderRuntime> {
    let runtime = Arc::new(TranscoderRuntime::new());
    runtime
        .init(|| async { Ok(Arc::new(InMemoryTranscoder::default()) as Arc<dyn Transcoder>) })
        .await
        .unwrap();
    runtime
}

fn fixture(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("cutroom-runner-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, "DUR=10.000").unwrap();
    path
}

fn toolkit(runtime: Arc<TranscoderRuntime>) -> ExportToolkit {
    let frames: Vec<f64> = (0..10).map(f64::from).collect();
    ExportToolkit::new(fast_settings())
        .with_transcoder(runtime)
        .with_codec(Arc::new(SyntheticCodecBackend::new(frames, FrameLedger::new())))
        .with_capture(Arc::new(FakeCaptureBackend::new()))
}

#[tokio::test]
async fn auto_prefers_stream_copy() {
    let src = source(fixture("auto.mp4"), "video/mp4", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 2.0, 4.0), Resolution::Original);

    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let outcome = run_export(
        &job,
        &toolkit(ready_runtime().await),
        Some(Box::new(move |p| sink.lock().unwrap().push(p.stage))),
    )
    .await
    .unwrap();

    assert_eq!(outcome.summary.strategy, StrategyKind::ExternalTranscoder);
    assert_eq!(outcome.summary.bytes, outcome.artifact.len() as u64);
    let stages = stages.lock().unwrap();
    assert_eq!(stages.first(), Some(&ExportStage::Preparing));
    assert_eq!(stages.last(), Some(&ExportStage::Complete));
}

#[tokio::test]
async fn resize_selects_codec_pipeline() {
    let src = source(fixture("resize.mp4"), "video/mp4", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 3.0, 6.0), Resolution::parse("360p").unwrap());

    let outcome = run_export(&job, &toolkit(ready_runtime().await), None)
        .await
        .unwrap();
    assert_eq!(outcome.summary.strategy, StrategyKind::CodecPipeline);
    assert_eq!(outcome.summary.frames_encoded, 4);
}

#[tokio::test]
async fn accuracy_preference_skips_stream_copy() {
    let src = source(fixture("accurate.mp4"), "video/mp4", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 3.0, 6.0), Resolution::Original)
        .with_fidelity(FidelityPreference::Accuracy);

    let outcome = run_export(&job, &toolkit(ready_runtime().await), None)
        .await
        .unwrap();
    assert_eq!(outcome.summary.strategy, StrategyKind::CodecPipeline);
}

#[tokio::test]
async fn unloaded_transcoder_is_not_offered() {
    let src = source(fixture("cold.mp4"), "video/mp4", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 3.0, 6.0), Resolution::Original);

    let outcome = run_export(&job, &toolkit(Arc::new(TranscoderRuntime::new())), None)
        .await
        .unwrap();
    assert_eq!(outcome.summary.strategy, StrategyKind::CodecPipeline);
}

#[tokio::test]
async fn failure_is_terminal_and_not_retried() {
    let src = source(fixture("late.mp4"), "video/mp4", 30.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 20.0, 25.0), Resolution::Original)
        .with_strategy(StrategyChoice::Only(StrategyKind::CodecPipeline));

    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let err = run_export(
        &job,
        &toolkit(ready_runtime().await),
        Some(Box::new(move |p| sink.lock().unwrap().push(p.stage))),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "no_frames_in_range");
    let stages = stages.lock().unwrap();
    assert_eq!(stages.last(), Some(&ExportStage::Failed));
    assert_eq!(
        stages.iter().filter(|s| s.is_terminal()).count(),
        1,
        "exactly one terminal notification"
    );
}

#[tokio::test]
async fn foreign_range_is_rejected_before_selection() {
    let src = source(fixture("foreign.mp4"), "video/mp4", 10.0, 1);
    let job = ExportJob::new(src, TimeRange::new(3.0, 1).unwrap(), Resolution::Original);

    let err = run_export(&job, &toolkit(ready_runtime().await), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_range");
}
