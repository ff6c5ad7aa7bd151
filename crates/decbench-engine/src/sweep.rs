//! Sweep controller — walks stream counts upward, binary searches after
//! the first failure, and assembles the final benchmark report.

use std::sync::Arc;

use decbench_core::{
    BenchmarkConfig, BenchmarkResult, CpuSampler, HostInfo, MediaBackend, MemoryGauge, SourceInfo,
    StreamTestResult,
};
use tracing::{info, warn};

use crate::harness::run_test_point;

/// Coarse schedule: powers of two up to 16 (with 12 inserted), then steps
/// of 4 from 20, always ending at `max_streams`.
pub fn stream_counts_schedule(max_streams: u32) -> Vec<u32> {
    let mut counts = Vec::new();

    let mut n = 1;
    while n <= 16 && n <= max_streams {
        counts.push(n);
        n *= 2;
    }

    if max_streams >= 12 && !counts.contains(&12) {
        counts.push(12);
    }

    let mut n = 20;
    while n <= max_streams {
        counts.push(n);
        n += 4;
    }

    if !counts.contains(&max_streams) {
        counts.push(max_streams);
    }

    counts.sort_unstable();
    counts
}

/// Progress callback invoked once per completed sweep record.
pub type ProgressFn<'a> = &'a mut dyn FnMut(&StreamTestResult);

/// Drives the full concurrency sweep for one source.
pub struct BenchmarkRunner<B: MediaBackend> {
    backend: Arc<B>,
    config: BenchmarkConfig,
    source: SourceInfo,
    host: HostInfo,
}

impl<B: MediaBackend> BenchmarkRunner<B> {
    pub fn new(
        backend: Arc<B>,
        config: BenchmarkConfig,
        source: SourceInfo,
        host: HostInfo,
    ) -> Self {
        Self {
            backend,
            config,
            source,
            host,
        }
    }

    /// Run the sweep.  Threshold failures terminate the ascending walk and
    /// trigger the binary search; harness errors abort the whole run with
    /// the first message seen.
    pub fn run(
        &self,
        cpu: &mut dyn CpuSampler,
        memory: &mut dyn MemoryGauge,
        mut progress: Option<ProgressFn<'_>>,
    ) -> BenchmarkResult {
        let target_fps = self.config.target_fps.unwrap_or(self.source.fps);
        let max_streams = self.config.max_streams.unwrap_or(self.host.thread_count);

        let mut result = BenchmarkResult {
            cpu_name: self.host.cpu_name.clone(),
            thread_count: self.host.thread_count,
            total_system_memory_mb: self.host.total_memory_mb,
            video_path: self.source.path.clone(),
            video_resolution: self.source.resolution_label(),
            codec_name: self.source.codec.name().to_string(),
            video_fps: self.source.fps,
            is_live_stream: self.source.is_live_stream,
            target_fps,
            test_results: Vec::new(),
            max_streams: 0,
            success: false,
            error_message: String::new(),
        };

        info!(
            source = %self.source.path,
            target_fps,
            max_streams,
            duration_s = self.config.measurement_duration.as_secs_f64(),
            "starting concurrency sweep"
        );

        let mut last_passing = 0u32;

        for count in stream_counts_schedule(max_streams) {
            let record = match self.test_point(count, target_fps, cpu, memory, &mut progress) {
                Ok(record) => record,
                Err(message) => {
                    warn!(stream_count = count, error = %message, "sweep aborted");
                    result.error_message = message;
                    return result;
                }
            };
            let passed = record.passed;
            result.test_results.push(record);

            if passed {
                last_passing = count;
                continue;
            }

            // First failure: bracket the exact limit between the last pass
            // and this point.
            if last_passing > 0 && count - last_passing > 1 {
                let mut low = last_passing + 1;
                let mut high = count - 1;

                while low <= high {
                    let mid = low + (high - low) / 2;
                    let record = match self.test_point(mid, target_fps, cpu, memory, &mut progress)
                    {
                        Ok(record) => record,
                        Err(message) => {
                            warn!(stream_count = mid, error = %message, "sweep aborted");
                            result.error_message = message;
                            return result;
                        }
                    };
                    let passed = record.passed;
                    result.test_results.push(record);

                    if passed {
                        last_passing = mid;
                        low = mid + 1;
                    } else {
                        high = mid - 1;
                    }
                }
            }
            break;
        }

        result.max_streams = last_passing;
        result.success = true;
        info!(max_streams = last_passing, "sweep complete");
        result
    }

    fn test_point(
        &self,
        stream_count: u32,
        target_fps: f64,
        cpu: &mut dyn CpuSampler,
        memory: &mut dyn MemoryGauge,
        progress: &mut Option<ProgressFn<'_>>,
    ) -> std::result::Result<StreamTestResult, String> {
        match run_test_point(
            &self.backend,
            stream_count,
            target_fps,
            &self.config,
            self.host.thread_count,
            cpu,
            memory,
        ) {
            Ok(record) => {
                if let Some(callback) = progress.as_mut() {
                    callback(&record);
                }
                Ok(record)
            }
            Err(err) => Err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedCpu, FixedMemory, ScriptedCpu, SyntheticBackend, SyntheticConfig};
    use decbench_core::VideoCodec;
    use std::time::Duration;

    #[test]
    fn schedule_shape() {
        assert_eq!(stream_counts_schedule(1), vec![1]);
        assert_eq!(stream_counts_schedule(3), vec![1, 2, 3]);
        assert_eq!(stream_counts_schedule(16), vec![1, 2, 4, 8, 12, 16]);
        assert_eq!(
            stream_counts_schedule(30),
            vec![1, 2, 4, 8, 12, 16, 20, 24, 28, 30]
        );
        assert_eq!(
            stream_counts_schedule(24),
            vec![1, 2, 4, 8, 12, 16, 20, 24]
        );
    }

    fn source_info() -> SourceInfo {
        SourceInfo {
            path: "synthetic.mp4".into(),
            codec: VideoCodec::H264,
            width: 1280,
            height: 720,
            fps: 30.0,
            duration_seconds: 60.0,
            total_frames: 1800,
            video_stream_index: 0,
            is_live_stream: false,
        }
    }

    fn host(cores: u32) -> HostInfo {
        HostInfo {
            cpu_name: "Synthetic CPU".into(),
            thread_count: cores,
            total_memory_mb: 16_384,
        }
    }

    fn runner(
        cfg: SyntheticConfig,
        bench: BenchmarkConfig,
        cores: u32,
    ) -> BenchmarkRunner<SyntheticBackend> {
        BenchmarkRunner::new(
            Arc::new(SyntheticBackend::new(cfg)),
            bench,
            source_info(),
            host(cores),
        )
    }

    fn quick_config(max_streams: u32, window_ms: u64) -> BenchmarkConfig {
        BenchmarkConfig {
            max_streams: Some(max_streams),
            target_fps: Some(30.0),
            measurement_duration: Duration::from_millis(window_ms),
            queue_capacity: 2,
            ..BenchmarkConfig::default()
        }
    }

    #[test]
    fn fps_failure_triggers_binary_search() {
        // Per-frame cost scales with stream count at 13.5 ms per stream:
        // 1 and 2 streams hold 30 fps, 3 caps near 24.7, 4 near 18.5.
        let cfg = SyntheticConfig {
            per_stream_cost: Duration::from_micros(13_500),
            ..SyntheticConfig::default()
        };
        let mut counts_seen = Vec::new();
        let result = runner(cfg, quick_config(8, 1_500), 16).run(
            &mut FixedCpu(20.0),
            &mut FixedMemory(128),
            Some(&mut |record: &StreamTestResult| counts_seen.push(record.stream_count)),
        );

        assert!(result.success, "error: {}", result.error_message);
        // Coarse 1, 2, 4 plus the single binary probe at 3.
        assert_eq!(counts_seen, vec![1, 2, 4, 3]);
        assert_eq!(result.test_results.len(), 4);
        assert_eq!(result.max_streams, 2);
        assert!(!result.test_results[2].fps_passed);
        assert!(result.test_results[2].min_fps < 25.0);
    }

    #[test]
    fn cpu_threshold_stops_the_ascent() {
        // FPS always passes; CPU rises with each tested count and crosses
        // the 50% threshold on the third point.
        let bench = BenchmarkConfig {
            cpu_threshold: 50.0,
            ..quick_config(8, 300)
        };
        let result = runner(SyntheticConfig::default(), bench, 16).run(
            &mut ScriptedCpu::new(vec![20.0, 35.0, 55.0, 48.0]),
            &mut FixedMemory(128),
            None,
        );

        assert!(result.success);
        // 1 (pass), 2 (pass), 4 (cpu fail) → binary search probes 3.
        assert_eq!(result.test_results.len(), 4);
        let failing = &result.test_results[2];
        assert_eq!(failing.stream_count, 4);
        assert!(failing.fps_passed);
        assert!(!failing.cpu_passed);
        assert_eq!(result.max_streams, 3);
    }

    #[test]
    fn harness_error_aborts_with_message() {
        let cfg = SyntheticConfig {
            live_end_after: Some(2),
            ..SyntheticConfig::default()
        };
        let result = runner(cfg, quick_config(4, 300), 16).run(
            &mut FixedCpu(10.0),
            &mut FixedMemory(128),
            None,
        );
        assert!(!result.success);
        assert!(
            result.error_message.contains("Stream ended"),
            "got: {}",
            result.error_message
        );
        assert_eq!(result.max_streams, 0);
    }

    #[test]
    fn all_points_passing_reports_max() {
        let result = runner(SyntheticConfig::default(), quick_config(4, 250), 16).run(
            &mut FixedCpu(15.0),
            &mut FixedMemory(128),
            None,
        );
        assert!(result.success);
        assert_eq!(result.max_streams, 4);
        // Schedule for 4: 1, 2, 4.
        assert_eq!(result.test_results.len(), 3);
        assert_eq!(result.target_fps, 30.0);
        assert_eq!(result.codec_name, "H.264");
        assert_eq!(result.video_resolution, "720p");
    }

    #[test]
    fn first_point_failing_yields_zero_without_search() {
        let cfg = SyntheticConfig {
            per_stream_cost: Duration::from_millis(60),
            ..SyntheticConfig::default()
        };
        let result = runner(cfg, quick_config(8, 400), 16).run(
            &mut FixedCpu(10.0),
            &mut FixedMemory(128),
            None,
        );
        assert!(result.success);
        assert_eq!(result.max_streams, 0);
        assert_eq!(result.test_results.len(), 1);
    }
}
