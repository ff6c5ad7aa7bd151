//! Single-stream paced decode loop.
//!
//! Shared by the per-stream thread topology and the pool's single-stream
//! fast path: pop with a long timeout for efficient idle blocking, decode,
//! pace, publish counters in batches, and drain buffered frames once the
//! loop exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use decbench_core::{StreamDecoder, SubmitOutcome};

use crate::pacing::{PUBLISH_BATCH, PaceAction, PaceClock, now_ns, sleep_until_ns};
use crate::packet_queue::{PacketQueue, Slot};
use crate::stream::StreamShared;

/// Pop timeout on the single-stream path; bounds stop-flag reaction while
/// letting an idle consumer block instead of spinning.
const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Run one stream at the target pace until stop, EOF or error.
///
/// Returns the final frame total (drained frames included).  The final
/// counter publish happens before return, so it is ordered before the
/// controller's post-join read.
pub(crate) fn run_single_stream<D: StreamDecoder>(
    decoder: &mut D,
    queue: &PacketQueue<D::Packet>,
    shared: &StreamShared,
    stop: &AtomicBool,
    anchor: Instant,
    start_ns: u64,
    interval_ns: u64,
) -> (i64, PaceClock) {
    let mut clock = PaceClock::new(start_ns, interval_ns);
    let mut total: i64 = 0;

    loop {
        if total % PUBLISH_BATCH == 0 && stop.load(Ordering::Relaxed) {
            break;
        }

        let slot = match queue.pop(POP_TIMEOUT) {
            Some(slot) => slot,
            None => {
                if queue.is_eof() {
                    // Reader error, if any, is already on the shared slot.
                    shared.mark_finished();
                    break;
                }
                continue;
            }
        };

        let packet = match slot {
            Slot::Flush => {
                decoder.flush_buffers();
                continue;
            }
            Slot::Packet(packet) => packet,
        };

        match decoder.submit(&packet) {
            Err(err) => {
                shared.set_error(err.to_string());
                break;
            }
            Ok(SubmitOutcome::NeedMore) => continue,
            Ok(SubmitOutcome::Frame) => {
                total += 1;
                if total % PUBLISH_BATCH == 0 {
                    shared.publish_frames(total);
                }
                match clock.on_frame(now_ns(anchor)) {
                    PaceAction::SleepUntil(target_ns) => sleep_until_ns(anchor, target_ns),
                    PaceAction::OnTime => {}
                }
                shared.store_next_frame_ns(clock.next_frame_ns());
            }
        }
    }

    total += drain_decoder(decoder);
    shared.publish_frames(total);
    (total, clock)
}

/// Collect frames still buffered in the codec.  Drain failures end the
/// drain without invalidating the run.
pub(crate) fn drain_decoder<D: StreamDecoder>(decoder: &mut D) -> i64 {
    let mut drained = 0;
    while let Ok(true) = decoder.drain() {
        drained += 1;
    }
    drained
}
