//! Check export capabilities.

use cutroom_common::config::AppConfig;
use cutroom_export_engine::ffmpeg::command_exists;
use cutroom_export_engine::runner::ExportToolkit;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Cutroom System Check");
    println!("{}", "=".repeat(50));

    for binary in [&config.transcoder.ffmpeg, &config.transcoder.ffprobe] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[MISSING] {binary} not found on PATH");
        }
    }

    let toolkit = ExportToolkit::ffmpeg(config).await;
    let (caps, _) = toolkit.capabilities().await;

    println!();
    let report = [
        ("Stream copy (external transcoder)", caps.transcoder_ready),
        ("Codec pipeline (decode/encode)", caps.codec_primitives),
        ("Canvas capture (real-time)", caps.capture_surface),
    ];
    for (label, available) in report {
        let mark = if available { "OK" } else { "--" };
        println!("[{mark}] {label}");
    }

    println!();
    if report.iter().any(|(_, available)| *available) {
        println!("At least one export strategy is available. Cutroom is ready.");
    } else {
        println!("No export strategy is available. Install ffmpeg and retry.");
    }

    Ok(())
}
