//! Measurement harness — one barrier-synchronized test per stream count.
//!
//! The controller arrives at the start barrier together with every decode
//! worker, samples CPU over a fixed window, release-stores the stop flag
//! immediately before reading the CPU counters (so the reading covers
//! exactly the active window), then joins decoders before readers and
//! aggregates per-stream statistics into one sweep record.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Instant;

use decbench_core::{
    BenchError, BenchmarkConfig, CpuSampler, MediaBackend, MemoryGauge, Result, StreamTestResult,
};
use tracing::{debug, info};

use crate::pool::DecoderPool;
use crate::stream::StreamStats;
use crate::thread_topology::ThreadTopology;

/// A test passes on FPS when every stream reaches this fraction of the
/// target — 2% tolerance for timing overhead in real-time paced decoding.
pub const FPS_PASS_RATIO: f64 = 0.98;

/// Run one stream-count test and produce its sweep record.
///
/// Topology choice: per-stream threads below the core count, the shared
/// pool at or above it.  Any per-stream fatal error aborts the point with
/// the first message seen.
pub fn run_test_point<B: MediaBackend>(
    backend: &Arc<B>,
    stream_count: u32,
    target_fps: f64,
    config: &BenchmarkConfig,
    cores: u32,
    cpu: &mut dyn CpuSampler,
    memory: &mut dyn MemoryGauge,
) -> Result<StreamTestResult> {
    let stop = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(stream_count as usize + 1));
    let use_pool = stream_count >= cores;

    debug!(stream_count, target_fps, use_pool, "starting test point");

    let topology = if use_pool {
        // Worker count = stream count keeps per-stream pacing; readers
        // share R = cores threads.
        let pool = DecoderPool::launch(
            backend,
            stream_count,
            target_fps,
            config.queue_capacity,
            stream_count,
            cores,
            &barrier,
            &stop,
        );
        if let Some((id, message)) = pool.init_error() {
            let err = BenchError::Stream {
                id,
                message: message.to_string(),
            };
            // Release the workers blocked on the barrier, then tear down.
            barrier.wait();
            stop.store(true, Ordering::Release);
            pool.join();
            return Err(err);
        }
        Topology::Pool(pool)
    } else {
        Topology::Threads(ThreadTopology::launch(
            backend,
            stream_count,
            target_fps,
            config.queue_capacity,
            &barrier,
            &stop,
        ))
    };

    barrier.wait();

    cpu.begin();
    let window_start = Instant::now();
    std::thread::sleep(config.measurement_duration);
    stop.store(true, Ordering::Release);

    let cpu_usage = cpu.usage_percent();
    let memory_mb = memory.resident_mb();
    let elapsed = window_start.elapsed().as_secs_f64();

    let stats = topology.join();

    if let Some(failed) = stats.iter().find(|s| s.error.is_some()) {
        return Err(BenchError::Stream {
            id: failed.stream_id,
            message: failed.error.clone().unwrap_or_default(),
        });
    }

    let result = aggregate(
        &stats,
        stream_count,
        target_fps,
        elapsed,
        cpu_usage,
        memory_mb,
        config.cpu_threshold,
    );
    info!(
        stream_count,
        min_fps = format!("{:.2}", result.min_fps),
        cpu = format!("{:.1}", result.cpu_usage),
        passed = result.passed,
        "test point finished"
    );
    Ok(result)
}

enum Topology<B: MediaBackend> {
    Threads(ThreadTopology),
    Pool(DecoderPool<B>),
}

impl<B: MediaBackend> Topology<B> {
    fn join(self) -> Vec<StreamStats> {
        match self {
            Self::Threads(topology) => topology.join(),
            Self::Pool(pool) => pool.join(),
        }
    }
}

fn aggregate(
    stats: &[StreamStats],
    stream_count: u32,
    target_fps: f64,
    elapsed: f64,
    cpu_usage: f64,
    memory_mb: u64,
    cpu_threshold: f64,
) -> StreamTestResult {
    let per_stream_frames: Vec<i64> = stats.iter().map(|s| s.frames).collect();
    let per_stream_fps: Vec<f64> = per_stream_frames
        .iter()
        .map(|&frames| {
            if elapsed > 0.0 {
                frames as f64 / elapsed
            } else {
                0.0
            }
        })
        .collect();

    let total_frames: i64 = per_stream_frames.iter().sum();
    let min_fps = per_stream_fps.iter().copied().fold(f64::INFINITY, f64::min);
    let min_fps = if min_fps.is_finite() { min_fps } else { 0.0 };
    let max_fps = per_stream_fps.iter().copied().fold(0.0, f64::max);
    let fps_per_stream = if elapsed > 0.0 && stream_count > 0 {
        total_frames as f64 / elapsed / stream_count as f64
    } else {
        0.0
    };

    let fps_passed = min_fps >= target_fps * FPS_PASS_RATIO;
    let cpu_passed = cpu_usage <= cpu_threshold;

    StreamTestResult {
        stream_count,
        fps_per_stream,
        min_fps,
        max_fps,
        per_stream_fps,
        per_stream_frames,
        cpu_usage,
        memory_mb,
        fps_passed,
        cpu_passed,
        passed: fps_passed && cpu_passed,
    }
}
