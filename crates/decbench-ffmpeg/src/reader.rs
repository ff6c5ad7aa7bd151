//! FFmpeg packet reader — produces compressed video packets from one
//! source.
//!
//! Owns the demuxer exclusively; the decode side never touches it.  On
//! file-mode end of input the reader seeks back to the start and reports a
//! loop seam so the consumer can flush stale reference frames; live-mode
//! end of input is terminal.

use std::ptr;

use ffmpeg_sys_next::*;

use decbench_core::{BenchError, PacketSource, ReadOutcome, Result};

use crate::ffi::{OptionDict, check_ffmpeg, error_string, to_cstring};
use crate::packet::OwnedPacket;

pub struct FfmpegPacketReader {
    fmt_ctx: *mut AVFormatContext,
    /// Reused across `av_read_frame` calls; cloned into each [`OwnedPacket`].
    packet: *mut AVPacket,
    video_stream_index: i32,
    is_live: bool,
}

// SAFETY: the reader is owned by exactly one thread at a time and the raw
// pointers are never shared.
unsafe impl Send for FfmpegPacketReader {}

impl FfmpegPacketReader {
    /// Open a source and locate its first video substream.
    pub fn open(source: &str, is_live: bool) -> Result<Self> {
        let c_path = to_cstring(source).map_err(BenchError::SourceOpen)?;
        let mut options = if is_live {
            OptionDict::rtsp()
        } else {
            OptionDict::empty()
        };

        let mut fmt_ctx: *mut AVFormatContext = ptr::null_mut();
        // SAFETY: c_path is a valid C string; fmt_ctx/options are outputs.
        let ret = unsafe {
            avformat_open_input(
                &mut fmt_ctx,
                c_path.as_ptr(),
                ptr::null(),
                options.as_mut_ptr(),
            )
        };
        check_ffmpeg(ret, "avformat_open_input")
            .map_err(|e| BenchError::SourceOpen(format!("{e}")))?;

        // SAFETY: fmt_ctx is valid from here on; close it on every error
        // path before returning.
        let ret = unsafe { avformat_find_stream_info(fmt_ctx, ptr::null_mut()) };
        if let Err(e) = check_ffmpeg(ret, "avformat_find_stream_info") {
            unsafe { avformat_close_input(&mut fmt_ctx) };
            return Err(BenchError::SourceOpen(format!("{e}")));
        }

        let nb_streams = unsafe { (*fmt_ctx).nb_streams };
        let mut video_stream_index = -1;
        for i in 0..nb_streams {
            let stream = unsafe { &*(*(*fmt_ctx).streams.add(i as usize)) };
            if unsafe { (*stream.codecpar).codec_type } == AVMediaType::AVMEDIA_TYPE_VIDEO {
                video_stream_index = i as i32;
                break;
            }
        }
        if video_stream_index < 0 {
            unsafe { avformat_close_input(&mut fmt_ctx) };
            return Err(BenchError::SourceOpen("No video stream found".into()));
        }

        let packet = unsafe { av_packet_alloc() };
        if packet.is_null() {
            unsafe { avformat_close_input(&mut fmt_ctx) };
            return Err(BenchError::SourceOpen("Failed to allocate packet".into()));
        }

        tracing::debug!(source, video_stream_index, is_live, "reader opened");

        Ok(Self {
            fmt_ctx,
            packet,
            video_stream_index,
            is_live,
        })
    }

    /// Codec parameters of the video substream, for decoder construction.
    ///
    /// Valid for the lifetime of the reader.
    pub fn codec_parameters(&self) -> *const AVCodecParameters {
        // SAFETY: video_stream_index was validated in open().
        unsafe {
            let stream = &*(*(*self.fmt_ctx).streams.add(self.video_stream_index as usize));
            stream.codecpar
        }
    }

    fn seek_to_start(&mut self) -> std::result::Result<(), String> {
        // SAFETY: fmt_ctx is valid and owned.
        let ret = unsafe {
            av_seek_frame(
                self.fmt_ctx,
                self.video_stream_index,
                0,
                AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret >= 0 {
            return Ok(());
        }
        let ret = unsafe { avformat_seek_file(self.fmt_ctx, -1, i64::MIN, 0, i64::MAX, 0) };
        if ret < 0 {
            return Err(format!("Failed to seek to start: {}", error_string(ret)));
        }
        Ok(())
    }
}

impl PacketSource for FfmpegPacketReader {
    type Packet = OwnedPacket;

    fn next_packet(&mut self) -> ReadOutcome<OwnedPacket> {
        // SAFETY: both pointers are valid and exclusively owned.
        let ret = unsafe { av_read_frame(self.fmt_ctx, self.packet) };

        if ret < 0 {
            if ret == AVERROR_EOF {
                if self.is_live {
                    return ReadOutcome::EndOfStream;
                }
                // File mode: rewind and let the consumer flush its decoder
                // before packets of the next loop arrive.
                return match self.seek_to_start() {
                    Ok(()) => ReadOutcome::LoopSeam,
                    Err(message) => ReadOutcome::Error(message),
                };
            }
            return ReadOutcome::Error(format!("Read error: {}", error_string(ret)));
        }

        let stream_index = unsafe { (*self.packet).stream_index };
        if stream_index != self.video_stream_index {
            unsafe { av_packet_unref(self.packet) };
            return ReadOutcome::NonVideo;
        }

        // SAFETY: self.packet holds a valid packet from av_read_frame.
        let cloned = unsafe { OwnedPacket::from_clone(self.packet) };
        unsafe { av_packet_unref(self.packet) };
        match cloned {
            Some(packet) => ReadOutcome::Packet(packet),
            None => ReadOutcome::Error("Failed to clone packet".into()),
        }
    }
}

impl Drop for FfmpegPacketReader {
    fn drop(&mut self) {
        // SAFETY: both were allocated in open() and are owned here.
        unsafe {
            av_packet_free(&mut self.packet);
            if !self.fmt_ctx.is_null() {
                avformat_close_input(&mut self.fmt_ctx);
            }
        }
    }
}
