//! Pooled topology for high stream counts.
//!
//! `R = cores` reader workers and `W` decode workers service N streams,
//! cutting the OS thread count from `2N + 1` to `R + W + 1`.  The harness
//! keeps `W = N` so each decode worker still owns exactly one stream in
//! steady state and pacing fidelity matches the per-stream topology; the
//! saving is all on the I/O side, where `sleep_until` wakeups are not the
//! cost — reader syscalls are.
//!
//! Worker 0 owns the shared-timeline handshake: after the barrier it stamps
//! the common start time and every stream's initial deadline, then
//! release-stores `init_done`; the other workers acquire-load it before
//! reading either.  Reader workers that find every assigned queue full
//! sleep on a shared condvar woken by the channels' space callbacks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use decbench_core::{MediaBackend, StreamDecoder, SubmitOutcome};
use tracing::trace;

use crate::decode::{drain_decoder, run_single_stream};
use crate::pacing::{
    LAG_TOLERANCE, PUBLISH_BATCH, PaceClock, frame_interval_ns, now_ns, sleep_until_ns,
};
use crate::packet_queue::{PacketQueue, Slot};
use crate::reader::{ReaderLane, StepOutcome};
use crate::stream::{StreamShared, StreamStats};

/// Pop timeout inside the multi-stream scan; short so one starved stream
/// cannot stall its worker's other streams.
const SCAN_POP_TIMEOUT: Duration = Duration::from_millis(1);

/// Backoff when a scheduled stream produced nothing (queue empty).
const STARVED_BACKOFF: Duration = Duration::from_micros(500);

/// Safety timeout on the reader workers' condvar wait.
const READER_WAIT: Duration = Duration::from_millis(10);

/// Wakes pooled reader workers when a consumer pops (creating space) or at
/// shutdown.
struct ReaderSignal {
    guard: Mutex<()>,
    condvar: Condvar,
}

impl ReaderSignal {
    fn new() -> Self {
        Self {
            guard: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn notify_one(&self) {
        self.condvar.notify_one();
    }

    fn notify_all(&self) {
        self.condvar.notify_all();
    }

    fn wait(&self, timeout: Duration) {
        let guard = self.guard.lock().unwrap();
        let _unused = self.condvar.wait_timeout(guard, timeout).unwrap();
    }
}

/// One stream as seen by its decode worker.
struct DecodeLane<B: MediaBackend> {
    shared: Arc<StreamShared>,
    queue: Arc<PacketQueue<B::Packet>>,
    decoder: B::Decoder,
}

pub struct DecoderPool<B: MediaBackend> {
    shareds: Vec<Arc<StreamShared>>,
    workers: Vec<JoinHandle<Vec<StreamStats>>>,
    readers: Vec<JoinHandle<()>>,
    signal: Arc<ReaderSignal>,
    init_error: Option<(u32, String)>,
    _backend: std::marker::PhantomData<B>,
}

impl<B: MediaBackend> DecoderPool<B> {
    /// Build N stream contexts and spawn the worker and reader threads.
    ///
    /// On a per-stream construction error the pool still spawns its decode
    /// workers — every barrier participant must arrive — but they return
    /// without doing work; the harness reads [`DecoderPool::init_error`]
    /// and tears the pool down.
    pub fn launch(
        backend: &Arc<B>,
        stream_count: u32,
        target_fps: f64,
        queue_capacity: usize,
        worker_count: u32,
        reader_count: u32,
        barrier: &Arc<Barrier>,
        stop: &Arc<AtomicBool>,
    ) -> Self {
        let anchor = Instant::now();
        let interval_ns = frame_interval_ns(target_fps);
        let signal = Arc::new(ReaderSignal::new());

        let mut shareds = Vec::with_capacity(stream_count as usize);
        let mut decode_lanes: Vec<DecodeLane<B>> = Vec::with_capacity(stream_count as usize);
        let mut reader_lanes: Vec<ReaderLane<B::Source>> =
            Vec::with_capacity(stream_count as usize);
        let mut init_error = None;

        for id in 0..stream_count {
            let (source, decoder) = match backend.open_stream(stream_count) {
                Ok(pair) => pair,
                Err(err) => {
                    init_error = Some((id, err.to_string()));
                    break;
                }
            };

            let shared = Arc::new(StreamShared::new(id));
            let queue = Arc::new(PacketQueue::new(queue_capacity));
            {
                let signal = Arc::clone(&signal);
                queue.set_space_callback(move || signal.notify_one());
            }

            reader_lanes.push(ReaderLane::new(
                source,
                Arc::clone(&queue),
                Arc::clone(&shared),
            ));
            decode_lanes.push(DecodeLane {
                shared: Arc::clone(&shared),
                queue,
                decoder,
            });
            shareds.push(shared);
        }

        let init_failed = init_error.is_some();
        let start_ns_cell = Arc::new(AtomicU64::new(0));
        let init_done = Arc::new(AtomicBool::new(false));

        // Round-robin dedicated assignment of decode lanes to workers.
        let mut worker_lanes: Vec<Vec<DecodeLane<B>>> =
            (0..worker_count).map(|_| Vec::new()).collect();
        for (index, lane) in decode_lanes.into_iter().enumerate() {
            worker_lanes[index % worker_count as usize].push(lane);
        }

        let workers = worker_lanes
            .into_iter()
            .enumerate()
            .map(|(worker_id, lanes)| {
                let barrier = Arc::clone(barrier);
                let stop = Arc::clone(stop);
                let start_ns_cell = Arc::clone(&start_ns_cell);
                let init_done = Arc::clone(&init_done);
                let all_shareds = shareds.clone();

                std::thread::Builder::new()
                    .name(format!("decode-worker-{worker_id}"))
                    .spawn(move || {
                        decode_worker(
                            worker_id as u32,
                            lanes,
                            all_shareds,
                            init_failed,
                            anchor,
                            interval_ns,
                            &start_ns_cell,
                            &init_done,
                            &barrier,
                            &stop,
                        )
                    })
                    .expect("spawn decode worker")
            })
            .collect();

        let readers = if init_failed {
            Vec::new()
        } else if reader_count >= stream_count {
            // 1:1 fallback — pooling readers would not save any threads.
            reader_lanes
                .into_iter()
                .map(|lane| {
                    let stop = Arc::clone(stop);
                    std::thread::Builder::new()
                        .name(format!("reader-{}", lane.shared_id()))
                        .spawn(move || lane.into_dedicated(&stop))
                        .expect("spawn reader thread")
                })
                .collect()
        } else {
            let mut grouped: Vec<Vec<ReaderLane<B::Source>>> =
                (0..reader_count).map(|_| Vec::new()).collect();
            for (index, lane) in reader_lanes.into_iter().enumerate() {
                grouped[index % reader_count as usize].push(lane);
            }
            grouped
                .into_iter()
                .enumerate()
                .map(|(reader_id, lanes)| {
                    let stop = Arc::clone(stop);
                    let signal = Arc::clone(&signal);
                    std::thread::Builder::new()
                        .name(format!("reader-worker-{reader_id}"))
                        .spawn(move || reader_worker(lanes, &signal, &stop))
                        .expect("spawn reader worker")
                })
                .collect()
        };

        Self {
            shareds,
            workers,
            readers,
            signal,
            init_error,
            _backend: std::marker::PhantomData,
        }
    }

    /// Stream id and message of the first per-stream construction failure.
    pub fn init_error(&self) -> Option<(u32, &str)> {
        self.init_error
            .as_ref()
            .map(|(id, message)| (*id, message.as_str()))
    }

    pub fn shareds(&self) -> &[Arc<StreamShared>] {
        &self.shareds
    }

    /// Join decode workers first (so they stop popping), wake and join the
    /// reader threads, and collect per-stream statistics in stream order.
    pub fn join(self) -> Vec<StreamStats> {
        let mut stats: Vec<StreamStats> = self
            .workers
            .into_iter()
            .flat_map(|handle| handle.join().expect("decode worker panicked"))
            .collect();

        self.signal.notify_all();
        for handle in self.readers {
            handle.join().expect("reader thread panicked");
        }

        stats.sort_by_key(|s| s.stream_id);
        stats
    }
}

// ─── Decode workers ──────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn decode_worker<B: MediaBackend>(
    worker_id: u32,
    lanes: Vec<DecodeLane<B>>,
    all_shareds: Vec<Arc<StreamShared>>,
    init_failed: bool,
    anchor: Instant,
    interval_ns: u64,
    start_ns_cell: &AtomicU64,
    init_done: &AtomicBool,
    barrier: &Barrier,
    stop: &AtomicBool,
) -> Vec<StreamStats> {
    barrier.wait();

    if init_failed {
        return Vec::new();
    }

    // Worker 0 publishes the common timeline; everyone else waits for it.
    if worker_id == 0 {
        let start_ns = now_ns(anchor);
        start_ns_cell.store(start_ns, Ordering::Relaxed);
        for shared in &all_shareds {
            shared.store_next_frame_ns(start_ns);
        }
        init_done.store(true, Ordering::Release);
    } else {
        while !init_done.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }
    let start_ns = start_ns_cell.load(Ordering::Relaxed);

    let mut lanes = lanes;
    match lanes.len() {
        0 => Vec::new(),
        // Steady-state shape: one stream per worker, same loop as the
        // per-stream topology.
        1 => {
            let Some(mut lane) = lanes.pop() else {
                return Vec::new();
            };
            let (frames, clock) = run_single_stream(
                &mut lane.decoder,
                &lane.queue,
                &lane.shared,
                stop,
                anchor,
                start_ns,
                interval_ns,
            );
            vec![StreamStats {
                stream_id: lane.shared.id,
                frames,
                lag_count: clock.lag_count,
                max_lag_ms: clock.max_lag_ms,
                error: lane.shared.error(),
            }]
        }
        _ => multi_stream_scan(lanes, anchor, start_ns, interval_ns, stop),
    }
}

/// Scan state for one stream on the multi-stream path.
struct ScanLane<B: MediaBackend> {
    inner: DecodeLane<B>,
    clock: PaceClock,
    total_frames: i64,
}

/// Service several streams from one worker, keeping each on its own pacing
/// deadline.
fn multi_stream_scan<B: MediaBackend>(
    lanes: Vec<DecodeLane<B>>,
    anchor: Instant,
    start_ns: u64,
    interval_ns: u64,
    stop: &AtomicBool,
) -> Vec<StreamStats> {
    let tolerance_ns = LAG_TOLERANCE.as_nanos() as u64;
    let mut lanes: Vec<ScanLane<B>> = lanes
        .into_iter()
        .map(|inner| ScanLane {
            inner,
            clock: PaceClock::new(start_ns, interval_ns),
            total_frames: 0,
        })
        .collect();

    while !stop.load(Ordering::Relaxed) {
        let mut now = now_ns(anchor);
        let mut earliest_next: Option<u64> = None;
        let mut any_active = false;
        let mut any_starved = false;

        for lane in lanes.iter_mut() {
            let shared = &lane.inner.shared;
            if shared.is_finished() || shared.has_error() {
                continue;
            }
            any_active = true;

            if shared.is_ready(now) && shared.try_claim() {
                let got_frame = drain_until_frame(lane, anchor, stop);
                lane.inner.shared.release();
                let shared = &lane.inner.shared;
                if !got_frame && !shared.is_finished() && !shared.has_error() {
                    any_starved = true;
                }
                now = now_ns(anchor);
            }

            let shared = &lane.inner.shared;
            if !shared.is_finished() && !shared.has_error() {
                let next = lane.clock.next_frame_ns();
                earliest_next = Some(earliest_next.map_or(next, |e| e.min(next)));
            }
        }

        if !any_active {
            break;
        }

        let now = now_ns(anchor);
        if any_starved {
            std::thread::sleep(STARVED_BACKOFF);
        } else if let Some(earliest) = earliest_next
            && earliest > now + tolerance_ns
        {
            sleep_until_ns(anchor, earliest);
        }
    }

    lanes
        .into_iter()
        .map(|mut lane| {
            if !lane.inner.shared.has_error() {
                lane.total_frames += drain_decoder(&mut lane.inner.decoder);
            }
            lane.inner.shared.publish_frames(lane.total_frames);
            StreamStats {
                stream_id: lane.inner.shared.id,
                frames: lane.total_frames,
                lag_count: lane.clock.lag_count,
                max_lag_ms: lane.clock.max_lag_ms,
                error: lane.inner.shared.error(),
            }
        })
        .collect()
}

/// Pop and submit packets until one frame is produced or the channel has
/// nothing to give.  Pacing advances on success but never sleeps here; the
/// scan loop owns the sleeping.
fn drain_until_frame<B: MediaBackend>(
    lane: &mut ScanLane<B>,
    anchor: Instant,
    stop: &AtomicBool,
) -> bool {
    while !stop.load(Ordering::Relaxed) {
        let slot = match lane.inner.queue.pop(SCAN_POP_TIMEOUT) {
            Some(slot) => slot,
            None => {
                if lane.inner.queue.is_eof() {
                    lane.inner.shared.mark_finished();
                }
                return false;
            }
        };

        let packet = match slot {
            Slot::Flush => {
                lane.inner.decoder.flush_buffers();
                continue;
            }
            Slot::Packet(packet) => packet,
        };

        match lane.inner.decoder.submit(&packet) {
            Err(err) => {
                lane.inner.shared.set_error(err.to_string());
                return false;
            }
            Ok(SubmitOutcome::NeedMore) => continue,
            Ok(SubmitOutcome::Frame) => {
                lane.total_frames += 1;
                if lane.total_frames % PUBLISH_BATCH == 0 {
                    lane.inner.shared.publish_frames(lane.total_frames);
                }
                // Advance the deadline; the scan loop decides when to sleep.
                let _ = lane.clock.on_frame(now_ns(anchor));
                lane.inner
                    .shared
                    .store_next_frame_ns(lane.clock.next_frame_ns());
                return true;
            }
        }
    }
    false
}

// ─── Reader workers ──────────────────────────────────────────────────────

/// Service a round-robin subset of sources, one packet per source per scan.
/// A scan where nothing made progress parks on the condvar until a consumer
/// pop frees queue space.
fn reader_worker<S: decbench_core::PacketSource>(
    mut lanes: Vec<ReaderLane<S>>,
    signal: &ReaderSignal,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        let mut any_active = false;
        let mut any_did_work = false;

        for lane in lanes.iter_mut() {
            match lane.step() {
                StepOutcome::Queued | StepOutcome::Skipped => {
                    any_active = true;
                    any_did_work = true;
                }
                StepOutcome::QueueFull => {
                    any_active = true;
                }
                StepOutcome::Done => {}
            }
        }

        if !any_active {
            break;
        }
        if !any_did_work {
            signal.wait(READER_WAIT);
        }
    }

    trace!("reader worker stopping");
    for lane in lanes.iter_mut() {
        lane.finish();
    }
}
