//! Source metadata probing via FFmpeg's `avformat`.
//!
//! Opens a file or RTSP URL, finds the first video substream, and extracts
//! the codec/resolution/framerate metadata needed to configure the sweep.

use std::ptr;

use ffmpeg_sys_next::*;

use decbench_core::{BenchError, Result, SourceInfo, VideoCodec, media::is_rtsp_url};

use crate::ffi::{OptionDict, check_ffmpeg, to_cstring};

/// RAII guard for `AVFormatContext` — ensures cleanup on all exit paths.
struct FormatGuard {
    ctx: *mut AVFormatContext,
}

impl Drop for FormatGuard {
    fn drop(&mut self) {
        if !self.ctx.is_null() {
            // SAFETY: ctx was allocated by avformat_open_input.
            unsafe {
                avformat_close_input(&mut self.ctx);
            }
        }
    }
}

pub(crate) fn codec_from_id(codec_id: AVCodecID) -> VideoCodec {
    match codec_id {
        AVCodecID::AV_CODEC_ID_H264 => VideoCodec::H264,
        AVCodecID::AV_CODEC_ID_HEVC => VideoCodec::H265,
        AVCodecID::AV_CODEC_ID_VP9 => VideoCodec::Vp9,
        AVCodecID::AV_CODEC_ID_AV1 => VideoCodec::Av1,
        _ => VideoCodec::Unknown,
    }
}

/// Probe a source and return its video stream metadata.
///
/// Live RTSP sources are opened with TCP transport and a 5-second socket
/// timeout; their duration and frame count remain zero.
pub fn probe_source(source: &str) -> Result<SourceInfo> {
    let is_live = is_rtsp_url(source);
    let c_path = to_cstring(source).map_err(BenchError::Probe)?;
    let mut options = if is_live {
        OptionDict::rtsp()
    } else {
        OptionDict::empty()
    };

    let mut fmt_ctx: *mut AVFormatContext = ptr::null_mut();
    // SAFETY: c_path is a valid C string; fmt_ctx and options are outputs.
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

    let guard = FormatGuard { ctx: fmt_ctx };

    // SAFETY: fmt_ctx is valid (open succeeded).
    let ret = unsafe { avformat_find_stream_info(guard.ctx, ptr::null_mut()) };
    check_ffmpeg(ret, "avformat_find_stream_info")
        .map_err(|e| BenchError::Probe(format!("{e}")))?;

    // First video substream.
    let nb_streams = unsafe { (*guard.ctx).nb_streams };
    let mut video_index: i32 = -1;
    for i in 0..nb_streams {
        // SAFETY: i < nb_streams; each stream pointer is valid.
        let stream = unsafe { &*(*(*guard.ctx).streams.add(i as usize)) };
        let codecpar = unsafe { &*stream.codecpar };
        if codecpar.codec_type == AVMediaType::AVMEDIA_TYPE_VIDEO {
            video_index = i as i32;
            break;
        }
    }
    if video_index < 0 {
        return Err(BenchError::Probe("No video stream found".into()));
    }

    let stream = unsafe { &*(*(*guard.ctx).streams.add(video_index as usize)) };
    let codecpar = unsafe { &*stream.codecpar };

    // Framerate: prefer avg_frame_rate, fall back to r_frame_rate.
    let fps = rational_to_f64(stream.avg_frame_rate)
        .or_else(|| rational_to_f64(stream.r_frame_rate))
        .ok_or_else(|| BenchError::Probe("Could not determine video frame rate".into()))?;

    // Duration: container duration is in AV_TIME_BASE units.
    let container_duration = unsafe { (*guard.ctx).duration };
    let duration_seconds = if container_duration != AV_NOPTS_VALUE && container_duration > 0 {
        container_duration as f64 / AV_TIME_BASE as f64
    } else if stream.duration != AV_NOPTS_VALUE && stream.duration > 0 {
        stream.duration as f64 * rational_to_f64(stream.time_base).unwrap_or(0.0)
    } else {
        0.0
    };

    let total_frames = if stream.nb_frames > 0 {
        stream.nb_frames
    } else if duration_seconds > 0.0 {
        (duration_seconds * fps).round() as i64
    } else {
        0
    };

    let codec = codec_from_id(codecpar.codec_id);
    let info = SourceInfo {
        path: source.to_string(),
        codec,
        width: codecpar.width.max(0) as u32,
        height: codecpar.height.max(0) as u32,
        fps,
        duration_seconds,
        total_frames,
        video_stream_index: video_index,
        is_live_stream: is_live,
    };

    tracing::info!(
        source,
        codec = codec.name(),
        width = info.width,
        height = info.height,
        fps = format!("{fps:.3}"),
        duration_s = format!("{duration_seconds:.2}"),
        live = is_live,
        "probed source"
    );

    Ok(info)
}

fn rational_to_f64(r: AVRational) -> Option<f64> {
    if r.num > 0 && r.den > 0 {
        Some(r.num as f64 / r.den as f64)
    } else {
        None
    }
}
