//! Synthetic media backend and monitor fakes for engine tests.
//!
//! The decoder "cost" is a sleep proportional to the stream count of the
//! test, modelling the way software decode slows down as streams contend
//! for the same cores.  This lets the harness and sweep tests reproduce
//! pass/fail transitions deterministically without any codec library.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use decbench_core::{
    BenchError, CpuSampler, MediaBackend, MemoryGauge, PacketSource, ReadOutcome, Result,
    StreamDecoder, SubmitOutcome,
};

#[derive(Debug, Clone)]
pub(crate) struct SyntheticConfig {
    /// Per-frame decode cost contributed by each concurrent stream.
    pub per_stream_cost: Duration,
    /// Flat per-frame decode cost.
    pub fixed_cost: Duration,
    /// File mode: packets between loop seams (0 = endless, no seams).
    pub packets_per_loop: u32,
    /// Live mode: terminal end of stream after this many packets.
    pub live_end_after: Option<u32>,
    /// Fail `open_stream` for the k-th and later streams of a test.
    pub fail_open_at: Option<u32>,
    /// Every k-th submit buffers its frame instead of producing it.
    pub need_more_every: Option<u32>,
    /// Every k-th packet belongs to a non-video substream.
    pub non_video_every: Option<u32>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            per_stream_cost: Duration::ZERO,
            fixed_cost: Duration::ZERO,
            packets_per_loop: 0,
            live_end_after: None,
            fail_open_at: None,
            need_more_every: None,
            non_video_every: None,
        }
    }
}

pub(crate) struct SyntheticBackend {
    config: SyntheticConfig,
    opened: AtomicU32,
    flush_count: Arc<AtomicU32>,
}

impl SyntheticBackend {
    pub(crate) fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            opened: AtomicU32::new(0),
            flush_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Total `flush_buffers` calls across every decoder of this backend.
    pub(crate) fn flush_count(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.flush_count)
    }
}

impl MediaBackend for SyntheticBackend {
    type Packet = u64;
    type Source = SyntheticSource;
    type Decoder = SyntheticDecoder;

    fn open_stream(&self, stream_count: u32) -> Result<(Self::Source, Self::Decoder)> {
        let index = self.opened.fetch_add(1, Ordering::Relaxed) % stream_count.max(1);
        if let Some(fail_at) = self.config.fail_open_at
            && index >= fail_at
        {
            return Err(BenchError::SourceOpen("synthetic open failure".into()));
        }

        let source = SyntheticSource {
            seq: 0,
            since_loop: 0,
            config: self.config.clone(),
        };
        let decoder = SyntheticDecoder {
            cost: self.config.fixed_cost + self.config.per_stream_cost * stream_count,
            submits: 0,
            buffered: 0,
            need_more_every: self.config.need_more_every,
            flush_count: Arc::clone(&self.flush_count),
        };
        Ok((source, decoder))
    }
}

pub(crate) struct SyntheticSource {
    seq: u64,
    since_loop: u32,
    config: SyntheticConfig,
}

impl PacketSource for SyntheticSource {
    type Packet = u64;

    fn next_packet(&mut self) -> ReadOutcome<u64> {
        if let Some(end) = self.config.live_end_after
            && self.seq >= u64::from(end)
        {
            return ReadOutcome::EndOfStream;
        }

        if self.config.packets_per_loop > 0 && self.since_loop >= self.config.packets_per_loop {
            self.since_loop = 0;
            return ReadOutcome::LoopSeam;
        }

        let seq = self.seq;
        self.seq += 1;
        self.since_loop += 1;

        if let Some(every) = self.config.non_video_every
            && seq % u64::from(every) == 0
            && seq > 0
        {
            return ReadOutcome::NonVideo;
        }
        ReadOutcome::Packet(seq)
    }
}

pub(crate) struct SyntheticDecoder {
    cost: Duration,
    submits: u64,
    buffered: u32,
    need_more_every: Option<u32>,
    flush_count: Arc<AtomicU32>,
}

impl StreamDecoder for SyntheticDecoder {
    type Packet = u64;

    fn submit(&mut self, _packet: &u64) -> Result<SubmitOutcome> {
        if !self.cost.is_zero() {
            std::thread::sleep(self.cost);
        }
        self.submits += 1;
        if let Some(every) = self.need_more_every
            && self.submits % u64::from(every) == 0
        {
            self.buffered += 1;
            return Ok(SubmitOutcome::NeedMore);
        }
        Ok(SubmitOutcome::Frame)
    }

    fn flush_buffers(&mut self) {
        self.buffered = 0;
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    fn drain(&mut self) -> Result<bool> {
        if self.buffered > 0 {
            self.buffered -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

// ─── Monitor fakes ───────────────────────────────────────────────────────

/// CPU sampler reporting one fixed value.
pub(crate) struct FixedCpu(pub f64);

impl CpuSampler for FixedCpu {
    fn begin(&mut self) {}

    fn usage_percent(&mut self) -> f64 {
        self.0
    }
}

/// CPU sampler replaying a sequence, one value per measurement window.
pub(crate) struct ScriptedCpu {
    values: Vec<f64>,
    index: usize,
}

impl ScriptedCpu {
    pub(crate) fn new(values: Vec<f64>) -> Self {
        Self { values, index: 0 }
    }
}

impl CpuSampler for ScriptedCpu {
    fn begin(&mut self) {}

    fn usage_percent(&mut self) -> f64 {
        let value = self
            .values
            .get(self.index)
            .copied()
            .unwrap_or_else(|| self.values.last().copied().unwrap_or(0.0));
        self.index += 1;
        value
    }
}

pub(crate) struct FixedMemory(pub u64);

impl MemoryGauge for FixedMemory {
    fn resident_mb(&mut self) -> u64 {
        self.0
    }

    fn total_system_mb(&mut self) -> u64 {
        self.0 * 16
    }
}
