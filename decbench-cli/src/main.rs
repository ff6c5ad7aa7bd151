//! decbench CLI entrypoint.
//!
//! ```bash
//! decbench video.mp4
//! decbench --max-streams 8 --target-fps 30 video.mp4
//! decbench --csv-file results.csv rtsp://camera.local/live
//! decbench --json video.mp4 > result.json
//! ```

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use decbench_core::{
    BenchError, BenchmarkConfig, BenchmarkResult, Result, SourceInfo, StreamTestResult,
    media::is_rtsp_url,
};
use decbench_engine::BenchmarkRunner;
use decbench_ffmpeg::FfmpegBackend;

#[derive(Parser, Debug)]
#[command(
    name = "decbench",
    version,
    about = "Measures how many video streams a CPU can software-decode in real time",
    after_help = "Supported codecs: H.264, H.265/HEVC, VP9, AV1\n\
                  Supported inputs: local files, RTSP streams (rtsp://)\n\n\
                  Examples:\n  \
                  decbench video.mp4\n  \
                  decbench --max-streams 8 video.mp4\n  \
                  decbench -f 30 -m 4 rtsp://camera.local/live\n  \
                  decbench --csv-file results.csv --json-out result.json video.mp4"
)]
struct Cli {
    /// Path to a video file or an RTSP URL.
    source: String,

    /// Maximum number of streams to test (default: CPU thread count).
    #[arg(short = 'm', long = "max-streams", value_parser = clap::value_parser!(u32).range(1..))]
    max_streams: Option<u32>,

    /// Target FPS for the real-time threshold (default: the source's FPS).
    #[arg(short = 'f', long = "target-fps")]
    target_fps: Option<f64>,

    /// Measurement window per stream count, in seconds.
    #[arg(short = 'd', long = "duration", default_value_t = 10.0)]
    duration: f64,

    /// System CPU usage ceiling in percent for a test to pass.
    #[arg(long = "cpu-threshold", default_value_t = 85.0)]
    cpu_threshold: f64,

    /// Packet channel capacity per stream.
    #[arg(long = "queue-capacity", default_value_t = 32, value_parser = clap::value_parser!(usize))]
    queue_capacity: usize,

    /// Export per-test results to a CSV file.
    #[arg(short = 'c', long = "csv-file")]
    csv_file: Option<PathBuf>,

    /// Append log output to a file.
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<PathBuf>,

    /// Emit the benchmark result as JSON on stdout instead of text.
    #[arg(long = "json", default_value_t = false)]
    json: bool,

    /// Also write the benchmark result JSON to a file.
    #[arg(long = "json-out")]
    json_out: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("Warning: failed to initialize logging: {err}");
    }

    match run(cli) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(err.error_code() as i32);
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> std::io::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(ansi_enabled)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
            .init();
    } else {
        registry.init();
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    if !is_rtsp_url(&cli.source) && !Path::new(&cli.source).exists() {
        return Err(BenchError::Config(format!("File not found: {}", cli.source)));
    }

    let source = decbench_ffmpeg::probe_source(&cli.source)?;
    if !source.codec.is_supported() {
        return Err(BenchError::UnsupportedCodec(source.codec.name().to_string()));
    }

    let host = decbench_monitor::host_info();
    let emit_json = cli.json;

    if !emit_json {
        print_header(&host, &source);
        println!("Testing...");
    }

    let backend = Arc::new(FfmpegBackend::new(
        cli.source.clone(),
        source.is_live_stream,
        host.thread_count,
    ));
    let runner = BenchmarkRunner::new(backend, config, source, host);

    let mut cpu = decbench_monitor::create_cpu_sampler();
    let mut memory = decbench_monitor::create_memory_gauge();

    let mut print_record = |record: &StreamTestResult| {
        if !emit_json {
            println!("{}", format_test_line(record));
            tracing::info!(
                stream_count = record.stream_count,
                frames = ?record.per_stream_frames,
                "decoded frames per stream"
            );
        }
    };
    let result = runner.run(
        cpu.as_mut(),
        memory.as_mut(),
        Some(&mut print_record),
    );

    if !result.success {
        return Err(BenchError::Topology(result.error_message.clone()));
    }

    if emit_json {
        println!("{}", render_json(&result)?);
    } else {
        print_summary(&result);
    }

    if let Some(path) = &cli.json_out {
        std::fs::write(path, render_json(&result)?)
            .map_err(|e| BenchError::Export(format!("Failed to write {}: {e}", path.display())))?;
    }

    if let Some(path) = &cli.csv_file {
        export_csv(&result, path)?;
        tracing::info!(path = %path.display(), "CSV results exported");
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<BenchmarkConfig> {
    if cli.duration <= 0.0 {
        return Err(BenchError::Config(
            "duration must be a positive number of seconds".into(),
        ));
    }
    if let Some(fps) = cli.target_fps
        && fps <= 0.0
    {
        return Err(BenchError::Config(
            "target fps must be a positive number".into(),
        ));
    }

    let config = BenchmarkConfig {
        max_streams: cli.max_streams,
        target_fps: cli.target_fps,
        measurement_duration: Duration::from_secs_f64(cli.duration),
        cpu_threshold: cli.cpu_threshold,
        queue_capacity: cli.queue_capacity,
    };
    config.validate()?;
    Ok(config)
}

// ─── Console output ──────────────────────────────────────────────────────

fn print_header(host: &decbench_core::HostInfo, source: &SourceInfo) {
    println!(
        "CPU: {} ({} threads, {} MB RAM)",
        host.cpu_name, host.thread_count, host.total_memory_mb
    );
    let source_label = if source.is_live_stream { "Source" } else { "File" };
    println!("{source_label}: {}", source.path);
    println!(
        "Video: {} {}, {:.0}fps{}",
        source.resolution_label(),
        source.codec.name(),
        source.fps,
        if source.is_live_stream { " (live)" } else { "" }
    );
    println!();
}

fn format_test_line(record: &StreamTestResult) -> String {
    let stream_word = if record.stream_count == 1 {
        "stream: "
    } else {
        "streams:"
    };
    let mut line = format!(
        "{:>2} {} {:>5.0}fps (min:{:.0}/avg:{:.0}/max:{:.0}) (CPU: {:>2.0}%) {}",
        record.stream_count,
        stream_word,
        record.fps_per_stream,
        record.min_fps,
        record.fps_per_stream,
        record.max_fps,
        record.cpu_usage,
        record.status_symbol(),
    );
    if !record.passed {
        line.push(' ');
        line.push_str(record.failure_reason());
    }
    line
}

fn print_summary(result: &BenchmarkResult) {
    println!();
    if result.max_streams > 0 {
        println!(
            "Result: Maximum {} concurrent stream{} can be decoded in real-time",
            result.max_streams,
            if result.max_streams == 1 { "" } else { "s" }
        );
    } else {
        println!("Result: Could not achieve real-time decoding even with 1 stream");
    }
}

// ─── Machine output ──────────────────────────────────────────────────────

fn render_json(result: &BenchmarkResult) -> Result<String> {
    serde_json::to_string_pretty(result)
        .map_err(|e| BenchError::Export(format!("JSON serialization failed: {e}")))
}

fn export_csv(result: &BenchmarkResult, path: &Path) -> Result<()> {
    let mut out = String::from(
        "stream_count,avg_fps,min_fps,max_fps,cpu_usage,memory_mb,fps_passed,cpu_passed,passed\n",
    );
    for test in &result.test_results {
        let mut line = String::new();
        let _ = write!(
            line,
            "{},{:.3},{:.3},{:.3},{:.2},{},{},{},{}",
            test.stream_count,
            test.fps_per_stream,
            test.min_fps,
            test.max_fps,
            test.cpu_usage,
            test.memory_mb,
            test.fps_passed,
            test.cpu_passed,
            test.passed
        );
        out.push_str(&line);
        out.push('\n');
    }
    std::fs::write(path, out)
        .map_err(|e| BenchError::Export(format!("Failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StreamTestResult {
        StreamTestResult {
            stream_count: 2,
            fps_per_stream: 29.95,
            min_fps: 29.4,
            max_fps: 30.5,
            per_stream_fps: vec![29.4, 30.5],
            per_stream_frames: vec![294, 305],
            cpu_usage: 43.2,
            memory_mb: 210,
            fps_passed: true,
            cpu_passed: true,
            passed: true,
        }
    }

    #[test]
    fn test_line_shape() {
        let line = format_test_line(&record());
        assert!(line.contains("streams:"), "line: {line}");
        assert!(line.contains("(min:29/avg:30/max:31)") || line.contains("(min:29/avg:30/max:30)"),
            "line: {line}");
        assert!(line.contains("(CPU: 43%)"), "line: {line}");
        assert!(line.ends_with('\u{2713}'), "line: {line}");
    }

    #[test]
    fn failed_line_carries_reason() {
        let mut failing = record();
        failing.fps_passed = false;
        failing.passed = false;
        let line = format_test_line(&failing);
        assert!(line.ends_with("FPS below target"), "line: {line}");
    }

    #[test]
    fn csv_export_columns() {
        let result = BenchmarkResult {
            cpu_name: "Test CPU".into(),
            thread_count: 8,
            total_system_memory_mb: 16_384,
            video_path: "video.mp4".into(),
            video_resolution: "1080p".into(),
            codec_name: "H.264".into(),
            video_fps: 30.0,
            is_live_stream: false,
            target_fps: 30.0,
            test_results: vec![record()],
            max_streams: 2,
            success: true,
            error_message: String::new(),
        };

        let dir = std::env::temp_dir().join(format!(
            "decbench_csv_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("results.csv");

        export_csv(&result, &path).expect("export");
        let content = std::fs::read_to_string(&path).expect("read back");
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "stream_count,avg_fps,min_fps,max_fps,cpu_usage,memory_mb,fps_passed,cpu_passed,passed"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("2,29.950,29.400,30.500,43.20,210,"), "row: {row}");
        assert!(row.ends_with("true,true,true"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let mut cli = Cli::parse_from(["decbench", "video.mp4"]);
        cli.duration = 0.0;
        assert!(build_config(&cli).is_err());

        let mut cli = Cli::parse_from(["decbench", "video.mp4"]);
        cli.target_fps = Some(-30.0);
        assert!(build_config(&cli).is_err());

        let cli = Cli::parse_from(["decbench", "-m", "4", "-f", "25", "video.mp4"]);
        let config = build_config(&cli).expect("valid");
        assert_eq!(config.max_streams, Some(4));
        assert_eq!(config.target_fps, Some(25.0));
        assert_eq!(config.measurement_duration, Duration::from_secs(10));
    }
}
