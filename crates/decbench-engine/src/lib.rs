//! Concurrency engine — packet transport, decode topologies, measurement.
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐  PacketQueue  ┌─────────┐
//! │ Reader │──────────────►│ Decoder │   × N streams
//! └────────┘   (bounded)   └─────────┘
//! ```
//!
//! Two execution topologies drive the N streams:
//!
//! - [`thread_topology`]: one reader thread and one decoder thread per
//!   stream, used while the stream count is below the core count.
//! - [`pool`]: a fixed set of reader workers plus one decode worker per
//!   stream, used at high stream counts where `2N` threads would swamp the
//!   scheduler with sleep/wake syscalls.
//!
//! Each decoder obeys the real-time [`pacing`] clock so the benchmark
//! measures real-time capacity rather than burst throughput.  The
//! [`harness`] runs one barrier-synchronized measurement window per stream
//! count and the [`sweep`] controller walks stream counts upward, binary
//! searching after the first failure.

mod decode;
pub mod harness;
pub mod packet_queue;
pub mod pacing;
pub mod pool;
mod reader;
pub mod stream;
pub mod sweep;
pub mod thread_topology;

#[cfg(test)]
pub(crate) mod testing;

pub use harness::run_test_point;
pub use packet_queue::{PacketQueue, Slot};
pub use sweep::BenchmarkRunner;
