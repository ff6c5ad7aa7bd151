//! Benchmark result types.

use serde::Serialize;

/// Result of testing one stream count.
#[derive(Debug, Clone, Serialize)]
pub struct StreamTestResult {
    pub stream_count: u32,
    /// Average FPS across all streams (total frames / elapsed / streams).
    pub fps_per_stream: f64,
    /// Minimum per-stream FPS; the pass criterion uses this.
    pub min_fps: f64,
    /// Maximum per-stream FPS.
    pub max_fps: f64,
    /// FPS for each individual stream.
    pub per_stream_fps: Vec<f64>,
    /// Frame count for each individual stream.
    pub per_stream_frames: Vec<i64>,
    /// Average system CPU usage in percent over the window.
    pub cpu_usage: f64,
    /// Process resident memory in MB at the end of the window.
    pub memory_mb: u64,
    pub fps_passed: bool,
    pub cpu_passed: bool,
    pub passed: bool,
}

impl StreamTestResult {
    pub fn status_symbol(&self) -> &'static str {
        if self.passed { "\u{2713}" } else { "\u{2717}" }
    }

    pub fn failure_reason(&self) -> &'static str {
        if self.passed {
            ""
        } else if !self.fps_passed {
            "FPS below target"
        } else if !self.cpu_passed {
            "CPU threshold exceeded"
        } else {
            "Unknown"
        }
    }
}

/// Overall benchmark result.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    // Host
    pub cpu_name: String,
    pub thread_count: u32,
    pub total_system_memory_mb: u64,

    // Source
    pub video_path: String,
    pub video_resolution: String,
    pub codec_name: String,
    pub video_fps: f64,
    pub is_live_stream: bool,

    /// Target FPS the sweep tested against.
    pub target_fps: f64,

    /// One record per stream count tested, in execution order.
    pub test_results: Vec<StreamTestResult>,

    /// Highest stream count that passed both criteria.
    pub max_streams: u32,

    pub success: bool,
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(passed: bool, fps_passed: bool, cpu_passed: bool) -> StreamTestResult {
        StreamTestResult {
            stream_count: 1,
            fps_per_stream: 30.0,
            min_fps: 30.0,
            max_fps: 30.0,
            per_stream_fps: vec![30.0],
            per_stream_frames: vec![300],
            cpu_usage: 10.0,
            memory_mb: 100,
            fps_passed,
            cpu_passed,
            passed,
        }
    }

    #[test]
    fn failure_reason_prefers_fps() {
        assert_eq!(record(true, true, true).failure_reason(), "");
        assert_eq!(record(false, false, true).failure_reason(), "FPS below target");
        assert_eq!(
            record(false, true, false).failure_reason(),
            "CPU threshold exceeded"
        );
    }

    #[test]
    fn serializes_expected_fields() {
        let json = serde_json::to_value(record(true, true, true)).expect("serialize");
        assert_eq!(json["stream_count"], 1);
        assert!(json["passed"].as_bool().unwrap());
        assert!(json.get("per_stream_frames").is_some());
    }
}
