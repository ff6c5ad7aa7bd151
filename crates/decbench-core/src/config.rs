//! Benchmark run configuration.

use std::time::Duration;

/// Tunable parameters for one benchmark invocation.
///
/// `max_streams` and `target_fps` default to host- and source-derived values
/// (logical CPU count and the source's native frame rate) when unset.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Maximum number of concurrent streams to test.
    pub max_streams: Option<u32>,
    /// Target frames per second each stream must sustain.
    pub target_fps: Option<f64>,
    /// Measurement window per stream count.
    pub measurement_duration: Duration,
    /// System CPU usage ceiling in percent for a test to pass.
    pub cpu_threshold: f64,
    /// Packet channel capacity per stream.
    pub queue_capacity: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            max_streams: None,
            target_fps: None,
            measurement_duration: Duration::from_secs(10),
            cpu_threshold: 85.0,
            queue_capacity: 32,
        }
    }
}

impl BenchmarkConfig {
    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(n) = self.max_streams
            && n == 0
        {
            return Err(crate::BenchError::Config(
                "max streams must be a positive integer".into(),
            ));
        }
        if let Some(fps) = self.target_fps
            && fps <= 0.0
        {
            return Err(crate::BenchError::Config(
                "target fps must be a positive number".into(),
            ));
        }
        if self.measurement_duration.is_zero() {
            return Err(crate::BenchError::Config(
                "measurement duration must be non-zero".into(),
            ));
        }
        if self.cpu_threshold <= 0.0 || self.cpu_threshold > 100.0 {
            return Err(crate::BenchError::Config(
                "cpu threshold must be in (0, 100]".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(crate::BenchError::Config(
                "queue capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
