//! Software decoder wrapper over `avcodec`.
//!
//! Thin contract around the send-packet / receive-frame state machine.
//! Hardware acceleration is never requested and codec-internal threading
//! is capped by the caller, so the benchmark measures pure CPU software
//! decoding.

use std::ptr;

use ffmpeg_sys_next::*;

use decbench_core::{BenchError, Result, StreamDecoder, SubmitOutcome};

use crate::ffi::{EAGAIN, check_ffmpeg, error_string};
use crate::packet::OwnedPacket;

pub struct FfmpegStreamDecoder {
    codec_ctx: *mut AVCodecContext,
    frame: *mut AVFrame,
    /// Set once the null packet has been sent during drain.
    draining: bool,
}

// SAFETY: the decoder is owned by exactly one worker at a time; the raw
// pointers are never shared.
unsafe impl Send for FfmpegStreamDecoder {}

impl FfmpegStreamDecoder {
    /// Build a decoder from codec parameters delivered by the reader —
    /// the source is never reopened.
    ///
    /// `thread_count` caps codec-internal threads (1 at high stream
    /// counts so streams do not oversubscribe each other's cores).
    ///
    /// # Safety
    /// `codec_params` must point to valid codec parameters that outlive
    /// this call.
    pub unsafe fn open_from_params(
        codec_params: *const AVCodecParameters,
        thread_count: i32,
    ) -> Result<Self> {
        if codec_params.is_null() {
            return Err(BenchError::Decode("Missing codec parameters".into()));
        }

        let codec_id = unsafe { (*codec_params).codec_id };
        // SAFETY: avcodec_find_decoder accepts any codec id.
        let codec = unsafe { avcodec_find_decoder(codec_id) };
        if codec.is_null() {
            return Err(BenchError::UnsupportedCodec(format!("{codec_id:?}")));
        }

        let mut codec_ctx = unsafe { avcodec_alloc_context3(codec) };
        if codec_ctx.is_null() {
            return Err(BenchError::Decode("Failed to allocate codec context".into()));
        }

        let ret = unsafe { avcodec_parameters_to_context(codec_ctx, codec_params) };
        if let Err(e) = check_ffmpeg(ret, "avcodec_parameters_to_context") {
            unsafe { avcodec_free_context(&mut codec_ctx) };
            return Err(BenchError::Decode(format!("{e}")));
        }

        // Software decoding only; the caller budgets codec threads.
        unsafe {
            (*codec_ctx).thread_count = thread_count.max(1);
            (*codec_ctx).thread_type = if thread_count > 1 {
                FF_THREAD_FRAME as i32
            } else {
                0
            };
        }

        let ret = unsafe { avcodec_open2(codec_ctx, codec, ptr::null_mut()) };
        if let Err(e) = check_ffmpeg(ret, "avcodec_open2") {
            unsafe { avcodec_free_context(&mut codec_ctx) };
            return Err(BenchError::Decode(format!("{e}")));
        }

        let frame = unsafe { av_frame_alloc() };
        if frame.is_null() {
            unsafe { avcodec_free_context(&mut codec_ctx) };
            return Err(BenchError::Decode("Failed to allocate frame".into()));
        }

        Ok(Self {
            codec_ctx,
            frame,
            draining: false,
        })
    }

    /// Pull one frame if available.  `Ok(true)` on a frame, `Ok(false)` on
    /// EAGAIN/EOF, `Err` on a real decode failure.
    fn receive_one(&mut self) -> Result<bool> {
        // SAFETY: codec_ctx and frame are valid and owned.
        let ret = unsafe { avcodec_receive_frame(self.codec_ctx, self.frame) };
        if ret == 0 {
            // The pixel data itself is irrelevant to the benchmark.
            unsafe { av_frame_unref(self.frame) };
            return Ok(true);
        }
        if ret == AVERROR(EAGAIN) || ret == AVERROR_EOF {
            return Ok(false);
        }
        Err(BenchError::Decode(format!(
            "receive_frame error: {}",
            error_string(ret)
        )))
    }
}

impl StreamDecoder for FfmpegStreamDecoder {
    type Packet = OwnedPacket;

    fn submit(&mut self, packet: &OwnedPacket) -> Result<SubmitOutcome> {
        // SAFETY: both pointers are valid; send_packet does not take
        // ownership of the packet.
        let ret = unsafe { avcodec_send_packet(self.codec_ctx, packet.as_ptr()) };
        // EAGAIN means buffered frames must be received first — back
        // pressure, not an error.
        if ret < 0 && ret != AVERROR(EAGAIN) {
            return Err(BenchError::Decode(format!(
                "send_packet error: {}",
                error_string(ret)
            )));
        }

        if self.receive_one()? {
            Ok(SubmitOutcome::Frame)
        } else {
            Ok(SubmitOutcome::NeedMore)
        }
    }

    fn flush_buffers(&mut self) {
        // SAFETY: codec_ctx is valid and owned.
        unsafe { avcodec_flush_buffers(self.codec_ctx) };
        self.draining = false;
    }

    fn drain(&mut self) -> Result<bool> {
        if !self.draining {
            // SAFETY: the null packet enters drain mode.
            let ret = unsafe { avcodec_send_packet(self.codec_ctx, ptr::null()) };
            if ret < 0 && ret != AVERROR_EOF {
                return Err(BenchError::Decode(format!(
                    "drain send_packet error: {}",
                    error_string(ret)
                )));
            }
            self.draining = true;
        }
        self.receive_one()
    }
}

impl Drop for FfmpegStreamDecoder {
    fn drop(&mut self) {
        // SAFETY: both were allocated in open_from_params and owned here.
        unsafe {
            av_frame_free(&mut self.frame);
            avcodec_free_context(&mut self.codec_ctx);
        }
    }
}
