mod support;

use std::sync::Arc;

use cutroom_export_engine::codec::{CodecPipelineStrategy, VideoCodec};
use cutroom_export_engine::frame::FrameLedger;
use cutroom_export_engine::progress::ProgressReporter;
use cutroom_export_engine::strategy::ExportStrategy;
use cutroom_media_model::job::ExportJob;
use cutroom_media_model::range::TimeRange;
use cutroom_media_model::source::Resolution;

use support::{fast_settings, range, source, Fault, SyntheticCodecBackend};

fn ten_second_frames() -> Vec<f64> {
    (0..10).map(f64::from).collect()
}

#[tokio::test]
async fn only_in_window_frames_are_encoded() {
    let ledger = FrameLedger::new();
    let backend = Arc::new(SyntheticCodecBackend::new(ten_second_frames(), ledger.clone()));
    let src = source("/media/holiday.webm", "video/webm", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 3.0, 6.0), Resolution::Original);

    let mut strategy = CodecPipelineStrategy::new(backend.clone(), fast_settings(), ledger.clone());
    let artifact = strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap();

    let log = backend.log.lock().unwrap();
    assert_eq!(log.timestamps, vec![3.0, 4.0, 5.0, 6.0]);
    assert!(log.flushed);

    let stats = strategy.stats();
    assert_eq!(stats.frames_decoded, 10);
    assert_eq!(stats.frames_in_window, 4);
    assert_eq!(stats.frames_dropped, 6);
    assert_eq!(stats.frames_encoded, 4);

    assert_eq!(artifact.mime_type, "video/webm");
    assert_eq!(artifact.suggested_file_name, "holiday-trimmed.webm");
    assert_eq!(artifact.bytes, vec![3, 4, 5, 6, b'E', b'N', b'D']);

    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.issued(), 10);
    assert_eq!(backend.tracker.open_count(), 0);
}

#[tokio::test]
async fn stream_shorter_than_container_is_no_frames_in_range() {
    let ledger = FrameLedger::new();
    let backend = Arc::new(SyntheticCodecBackend::new(ten_second_frames(), ledger.clone()));
    // Container claims 30s, but the stream only carries 10s of frames.
    let src = source("clip.mp4", "video/mp4", 30.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 20.0, 25.0), Resolution::Original);

    let mut strategy = CodecPipelineStrategy::new(backend.clone(), fast_settings(), ledger.clone());
    let err = strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "no_frames_in_range");
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(backend.tracker.open_count(), 0);
    assert!(backend.log.lock().unwrap().config.is_none());
}

#[test]
fn request_past_a_ten_second_source_is_no_frames_in_range() {
    let src = source("clip.mp4", "video/mp4", 10.0, 1);
    let err = TimeRange::requested(src.duration_secs, src.fps, 20.0, 25.0).unwrap_err();
    assert_eq!(err.kind(), "no_frames_in_range");

    let kept = TimeRange::requested(src.duration_secs, src.fps, 8.0, 25.0).unwrap();
    assert_eq!((kept.start(), kept.end()), (8.0, 10.0));
}

#[tokio::test]
async fn decoder_failure_releases_everything() {
    let ledger = FrameLedger::new();
    let backend = Arc::new(
        SyntheticCodecBackend::new(ten_second_frames(), ledger.clone())
            .with_fault(Fault::DecodeAt(5)),
    );
    let src = source("clip.webm", "video/webm", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 0.0, 9.0), Resolution::Original);

    let mut strategy = CodecPipelineStrategy::new(backend.clone(), fast_settings(), ledger.clone());
    let err = strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "decoder_error");
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(backend.tracker.open_count(), 0);
}

#[tokio::test]
async fn encoder_failure_wins_and_releases_everything() {
    let ledger = FrameLedger::new();
    let backend = Arc::new(
        SyntheticCodecBackend::new(ten_second_frames(), ledger.clone())
            .with_fault(Fault::EncodeAt(2)),
    );
    let src = source("clip.webm", "video/webm", 10.0, 1);
    let job = ExportJob::new(src.clone(), range(&src, 0.0, 9.0), Resolution::Original);

    let mut strategy = CodecPipelineStrategy::new(backend.clone(), fast_settings(), ledger.clone());
    let err = strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "encoder_error");
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(backend.tracker.open_count(), 0);
    assert!(!backend.log.lock().unwrap().flushed);
}

#[tokio::test]
async fn key_frames_follow_fixed_cadence() {
    let ledger = FrameLedger::new();
    let timestamps: Vec<f64> = (0..70).map(|i| f64::from(i) / 30.0).collect();
    let backend = Arc::new(SyntheticCodecBackend::new(timestamps, ledger.clone()));
    let src = source("clip.mp4", "video/mp4", 70.0 / 30.0, 30);
    let job = ExportJob::new(src.clone(), range(&src, 0.0, src.duration_secs), Resolution::Original);

    let mut strategy = CodecPipelineStrategy::new(backend.clone(), fast_settings(), ledger.clone());
    strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap();

    let log = backend.log.lock().unwrap();
    let keys: Vec<usize> = log
        .key_frames
        .iter()
        .enumerate()
        .filter(|(_, key)| **key)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(keys, vec![0, 30, 60]);
}

#[tokio::test]
async fn encoder_is_configured_from_first_frame_or_requested_size() {
    let ledger = FrameLedger::new();
    let backend = Arc::new(SyntheticCodecBackend::new(ten_second_frames(), ledger.clone()));
    let src = source("clip.mp4", "video/mp4", 10.0, 1);
    let job = ExportJob::new(
        src.clone(),
        range(&src, 1.0, 2.0),
        Resolution::parse("640x360").unwrap(),
    );

    let mut strategy = CodecPipelineStrategy::new(backend.clone(), fast_settings(), ledger.clone());
    strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap();

    let log = backend.log.lock().unwrap();
    let config = log.config.as_ref().unwrap();
    assert_eq!((config.input_width, config.input_height), (4, 2));
    assert_eq!((config.output_width, config.output_height), (640, 360));
    assert_eq!(config.bitrate_bps, 2_000_000);
    assert_eq!(config.codec, VideoCodec::Vp8);
}

#[tokio::test]
async fn in_flight_frames_stay_bounded() {
    let ledger = FrameLedger::new();
    let timestamps: Vec<f64> = (0..200).map(|i| f64::from(i) / 30.0).collect();
    let backend = Arc::new(SyntheticCodecBackend::new(timestamps, ledger.clone()));
    let src = source("clip.webm", "video/webm", 200.0 / 30.0, 30);
    let job = ExportJob::new(src.clone(), range(&src, 0.0, src.duration_secs), Resolution::Original);

    let settings = fast_settings();
    let depth = settings.queue_depth;
    let mut strategy = CodecPipelineStrategy::new(backend.clone(), settings, ledger.clone());
    strategy
        .export(&job, &ProgressReporter::silent())
        .await
        .unwrap();

    // Queue contents, plus one frame held by each stage.
    assert!(backend.log.lock().unwrap().max_outstanding <= depth + 2);
    assert_eq!(ledger.outstanding(), 0);
}
