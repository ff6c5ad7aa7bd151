//! Shared types and traits used across crate boundaries.
//!
//! This crate is the neutral home for the contracts between the FFmpeg
//! backend (`decbench-ffmpeg`), the concurrency engine (`decbench-engine`),
//! the platform monitors (`decbench-monitor`) and the CLI, so none of them
//! depend on each other directly.

pub mod config;
pub mod error;
pub mod media;
pub mod monitor;
pub mod report;

pub use config::BenchmarkConfig;
pub use error::{BenchError, Result};
pub use media::{
    MediaBackend, PacketSource, ReadOutcome, SourceInfo, StreamDecoder, SubmitOutcome, VideoCodec,
};
pub use monitor::{CpuSampler, HostInfo, MemoryGauge};
pub use report::{BenchmarkResult, StreamTestResult};
